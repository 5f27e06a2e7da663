//! The task runner wired into the execution engine
//!
//! Translates a claimed [`TaskRecord`] into the actual computation and maps
//! component failures onto the engine's retry taxonomy. The mapping is the
//! retry policy: backend and model outages come back retryable, everything
//! the input caused does not.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use vcm_engine::{
    MatchTaskKey, ResultStore, SegmentationTaskKey, TaskError, TaskId, TaskOutput, TaskRecord,
    TaskRunner,
};
use vcm_match::{MatchConfig, MatchError, VolumeMatcher};
use vcm_paramset::ParamSetRegistry;
use vcm_segment::{SegmentError, SegmentationComponent, SegmenterError};
use vcm_volume::{Segmentation, VolumeError};

/// Runs segmentation and match tasks against the wired components
pub struct PipelineRunner {
    registry: Arc<ParamSetRegistry>,
    segmentation: SegmentationComponent,
    results: Arc<ResultStore>,
}

impl PipelineRunner {
    /// Wire a runner over the shared registry, components and result store
    pub fn new(
        registry: Arc<ParamSetRegistry>,
        segmentation: SegmentationComponent,
        results: Arc<ResultStore>,
    ) -> Self {
        Self {
            registry,
            segmentation,
            results,
        }
    }

    async fn run_segmentation(&self, key: &SegmentationTaskKey) -> Result<TaskOutput, TaskError> {
        let params = self
            .registry
            .get(key.paramset)
            .map_err(|err| TaskError::data(err.to_string()))?;
        let masks = self
            .segmentation
            .segment(key.volume, &params)
            .await
            .map_err(segment_task_error)?;
        Ok(TaskOutput::Segmentation(masks))
    }

    fn run_match(&self, key: &MatchTaskKey) -> Result<TaskOutput, TaskError> {
        let params = self
            .registry
            .get(key.paramset())
            .map_err(|err| TaskError::data(err.to_string()))?;
        let config = MatchConfig::from_content(params.content())
            .map_err(|err| TaskError::data(err.to_string()))?;

        let mut members = Vec::with_capacity(key.members().len());
        for volume in key.members() {
            let seg_key = SegmentationTaskKey::new(*volume, key.paramset());
            let segmentation = self.results.segmentation(&seg_key).ok_or_else(|| {
                TaskError::data(format!(
                    "volume {volume} has no committed segmentation under {}",
                    key.paramset().short()
                ))
            })?;
            members.push(segmentation);
        }
        debug!(members = members.len(), "loaded match inputs");

        let refs: Vec<&Segmentation> = members.iter().map(Arc::as_ref).collect();
        let outcome = VolumeMatcher::new(config)
            .match_volumes(&refs)
            .map_err(match_task_error)?;
        Ok(TaskOutput::Match(outcome))
    }
}

#[async_trait]
impl TaskRunner for PipelineRunner {
    async fn run(&self, task: &TaskRecord) -> Result<TaskOutput, TaskError> {
        match &task.id {
            TaskId::Segmentation(key) => self.run_segmentation(key).await,
            TaskId::Match(key) => self.run_match(key),
        }
    }
}

fn segment_task_error(err: SegmentError) -> TaskError {
    let reason = err.to_string();
    match err {
        SegmentError::Volume(VolumeError::Backend(_))
        | SegmentError::Model(SegmenterError::Unavailable { .. }) => TaskError::external(reason),
        SegmentError::Volume(VolumeError::UnknownVolume(_))
        | SegmentError::Model(SegmenterError::Rejected { .. })
        | SegmentError::OutOfBounds { .. }
        | SegmentError::DuplicateLabel { .. } => TaskError::data(reason),
    }
}

fn match_task_error(err: MatchError) -> TaskError {
    let reason = err.to_string();
    match err {
        MatchError::Registration { .. } => TaskError::registration(reason),
        MatchError::InsufficientVolumes { .. }
        | MatchError::DuplicateMember { .. }
        | MatchError::Config(_) => TaskError::data(reason),
    }
}
