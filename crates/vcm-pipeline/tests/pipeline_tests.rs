//! End-to-end lifecycle tests over the assembled pipeline
//!
//! Everything runs against in-memory doubles; the semantics under test are
//! the cross-crate ones: content-addressed paramsets driving task identity,
//! at-most-once execution, and crash recovery through release.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::Notify;
use vcm_engine::{ExecuteOutcome, SegmentationTaskKey, TaskState};
use vcm_paramset::{ParamContent, ParamSetError};
use vcm_pipeline::{Pipeline, PipelineError};
use vcm_segment::{RawMask, Segmenter, SegmenterError};
use vcm_test_utils::{
    cube, flat_image, init_tracing, raw_mask, volume_info, InMemoryContentStore, InMemoryVolumes,
    ScriptedSegmenter,
};
use vcm_volume::{SessionId, VolumeId, VolumeImage, VolumeInfo, VolumeShape};

struct Rig {
    volumes: Arc<InMemoryVolumes>,
    segmenter: Arc<ScriptedSegmenter>,
    pipeline: Arc<Pipeline>,
}

fn rig() -> Rig {
    init_tracing();
    let volumes = Arc::new(InMemoryVolumes::new());
    let segmenter = Arc::new(ScriptedSegmenter::new());
    let store = Arc::new(InMemoryContentStore::new());
    let pipeline = Arc::new(Pipeline::new(
        volumes.clone(),
        segmenter.clone(),
        store,
    ));
    Rig {
        volumes,
        segmenter,
        pipeline,
    }
}

fn seed_volume(rig: &Rig, shape: VolumeShape) -> VolumeId {
    let id = VolumeId::new();
    rig.volumes
        .insert(volume_info(id, SessionId::new(), shape), flat_image(&shape, 500));
    id
}

fn cellpose_content(diameter: u32) -> ParamContent {
    let mut content = ParamContent::new();
    content.insert("segmentation_method".into(), json!("cellpose-3d"));
    content.insert("diameter".into(), json!(diameter));
    content
}

#[tokio::test]
async fn segmentation_runs_once_and_replays() {
    let rig = rig();
    let shape = VolumeShape::new(8, 8, 8);
    let volume = seed_volume(&rig, shape);
    rig.segmenter
        .script(volume, vec![raw_mask(1, cube([1, 1, 1], 2))]);

    let params = rig
        .pipeline
        .register_paramset("prod", 1, "", cellpose_content(8))
        .unwrap();
    let task = rig.pipeline.declare_segmentation(volume, params);

    let outcome = rig.pipeline.execute(&task).await.unwrap();
    assert!(matches!(outcome, ExecuteOutcome::Completed(_)));
    assert_eq!(rig.pipeline.task_state(&task), Some(TaskState::Done));
    assert_eq!(rig.segmenter.calls(), 1);

    // A second execute replays the stored row without recomputing.
    let replay = rig.pipeline.execute(&task).await.unwrap();
    assert!(matches!(replay, ExecuteOutcome::AlreadyDone(_)));
    assert_eq!(replay.result(), outcome.result());
    assert_eq!(rig.segmenter.calls(), 1);

    let key = SegmentationTaskKey::new(volume, params);
    let seg = rig.pipeline.results().segmentation(&key).unwrap();
    assert_eq!(seg.masks().len(), 1);
    assert_eq!(seg.masks()[0].voxel_count(), 8);
    assert_eq!(seg.masks()[0].confidence(), 1.0);
}

#[tokio::test]
async fn distinct_paramsets_make_distinct_tasks() {
    let rig = rig();
    let shape = VolumeShape::new(8, 8, 8);
    let volume = seed_volume(&rig, shape);
    rig.segmenter
        .script(volume, vec![raw_mask(1, cube([0, 0, 0], 2))]);

    let narrow = rig
        .pipeline
        .register_paramset("narrow", 1, "", cellpose_content(8))
        .unwrap();
    let wide = rig
        .pipeline
        .register_paramset("wide", 1, "", cellpose_content(12))
        .unwrap();
    assert_ne!(narrow, wide);

    let task_narrow = rig.pipeline.declare_segmentation(volume, narrow);
    let task_wide = rig.pipeline.declare_segmentation(volume, wide);
    assert_ne!(task_narrow, task_wide);

    rig.pipeline.execute(&task_narrow).await.unwrap();
    rig.pipeline.execute(&task_wide).await.unwrap();

    assert_eq!(rig.segmenter.calls(), 2);
    assert_eq!(rig.pipeline.results().segmentation_count(), 2);
}

#[test]
fn paramset_name_cannot_rebind() {
    let rig = rig();
    let first = rig
        .pipeline
        .register_paramset("prod", 1, "", cellpose_content(8))
        .unwrap();
    // Same name, same content: idempotent.
    let again = rig
        .pipeline
        .register_paramset("prod", 1, "", cellpose_content(8))
        .unwrap();
    assert_eq!(first, again);

    let err = rig
        .pipeline
        .register_paramset("prod", 2, "", cellpose_content(9))
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::ParamSet(ParamSetError::Conflict { .. })
    ));
}

#[test]
fn malformed_match_tuning_is_rejected_at_registration() {
    let rig = rig();
    let mut content = cellpose_content(8);
    content.insert("match.distance_tolerance".into(), json!(-3.0));
    let err = rig
        .pipeline
        .register_paramset("bad", 1, "", content)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[tokio::test]
async fn concurrent_executes_share_one_computation() {
    let rig = rig();
    let shape = VolumeShape::new(8, 8, 8);
    let volume = seed_volume(&rig, shape);
    rig.segmenter
        .script(volume, vec![raw_mask(1, cube([0, 0, 0], 2))]);

    let params = rig
        .pipeline
        .register_paramset("prod", 1, "", cellpose_content(8))
        .unwrap();
    let task = rig.pipeline.declare_segmentation(volume, params);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pipeline = rig.pipeline.clone();
        let task = task.clone();
        handles.push(tokio::spawn(async move { pipeline.execute(&task).await }));
    }

    let mut completed = 0;
    for handle in handles {
        if matches!(handle.await.unwrap().unwrap(), ExecuteOutcome::Completed(_)) {
            completed += 1;
        }
    }

    assert_eq!(completed, 1);
    assert_eq!(rig.segmenter.calls(), 1);
    assert_eq!(rig.pipeline.results().segmentation_count(), 1);
}

#[tokio::test]
async fn failed_segmenter_requeues_then_recovers() {
    let rig = rig();
    let shape = VolumeShape::new(8, 8, 8);
    let volume = seed_volume(&rig, shape);
    rig.segmenter
        .script(volume, vec![raw_mask(1, cube([0, 0, 0], 2))]);
    rig.segmenter.inject_failures(1);

    let params = rig
        .pipeline
        .register_paramset("prod", 1, "", cellpose_content(8))
        .unwrap();
    let task = rig.pipeline.declare_segmentation(volume, params);

    let err = rig.pipeline.execute(&task).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(rig.pipeline.task_state(&task), Some(TaskState::Pending));
    assert_eq!(rig.pipeline.task_record(&task).unwrap().attempts, 1);
    assert_eq!(rig.pipeline.results().segmentation_count(), 0);

    let outcome = rig.pipeline.execute(&task).await.unwrap();
    assert!(matches!(outcome, ExecuteOutcome::Completed(_)));
    assert_eq!(rig.pipeline.task_record(&task).unwrap().attempts, 2);
    assert_eq!(rig.segmenter.calls(), 2);
}

#[tokio::test]
async fn unknown_volume_is_a_permanent_failure() {
    let rig = rig();
    let volume = VolumeId::new();

    let params = rig
        .pipeline
        .register_paramset("prod", 1, "", cellpose_content(8))
        .unwrap();
    let task = rig.pipeline.declare_segmentation(volume, params);

    let err = rig.pipeline.execute(&task).await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(rig.pipeline.task_state(&task), Some(TaskState::Pending));
    assert_eq!(rig.pipeline.results().segmentation_count(), 0);
}

/// Blocks its first call at a gate so the test can abort the worker mid-run.
struct GatedSegmenter {
    started: Notify,
    gate: Notify,
    gated: AtomicBool,
    masks: Vec<RawMask>,
}

impl GatedSegmenter {
    fn new(masks: Vec<RawMask>) -> Arc<Self> {
        Arc::new(Self {
            started: Notify::new(),
            gate: Notify::new(),
            gated: AtomicBool::new(true),
            masks,
        })
    }
}

#[async_trait]
impl Segmenter for GatedSegmenter {
    async fn segment(
        &self,
        _info: &VolumeInfo,
        _image: &VolumeImage,
        _params: &ParamContent,
    ) -> Result<Vec<RawMask>, SegmenterError> {
        if self.gated.swap(false, Ordering::SeqCst) {
            self.started.notify_one();
            self.gate.notified().await;
        }
        Ok(self.masks.clone())
    }
}

#[tokio::test]
async fn aborted_worker_leaves_claim_until_released() {
    init_tracing();
    let volumes = Arc::new(InMemoryVolumes::new());
    let segmenter = GatedSegmenter::new(vec![raw_mask(1, cube([0, 0, 0], 2))]);
    let store = Arc::new(InMemoryContentStore::new());
    let pipeline = Arc::new(Pipeline::new(
        volumes.clone(),
        segmenter.clone(),
        store,
    ));

    let shape = VolumeShape::new(8, 8, 8);
    let volume = VolumeId::new();
    volumes.insert(
        volume_info(volume, SessionId::new(), shape),
        flat_image(&shape, 100),
    );

    let params = pipeline
        .register_paramset("prod", 1, "", cellpose_content(8))
        .unwrap();
    let task = pipeline.declare_segmentation(volume, params);

    let worker = {
        let pipeline = pipeline.clone();
        let task = task.clone();
        tokio::spawn(async move { pipeline.execute(&task).await })
    };
    segmenter.started.notified().await;
    worker.abort();
    assert!(worker.await.unwrap_err().is_cancelled());

    // The hard-killed worker left its claim and nothing else.
    assert_eq!(pipeline.task_state(&task), Some(TaskState::Running));
    assert_eq!(pipeline.results().segmentation_count(), 0);

    // Recovery: an explicit release, then a normal re-execute.
    pipeline.release(&task).unwrap();
    assert_eq!(pipeline.task_state(&task), Some(TaskState::Pending));

    let outcome = pipeline.execute(&task).await.unwrap();
    assert!(matches!(outcome, ExecuteOutcome::Completed(_)));
    assert_eq!(pipeline.task_record(&task).unwrap().attempts, 2);
    assert_eq!(pipeline.results().segmentation_count(), 1);
}
