//! The assembled pipeline facade

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use vcm_engine::{
    DeclareError, EngineError, ExecuteOutcome, ExecutionEngine, GroupId, ResultStore,
    SegmentationTaskKey, TaskId, TaskRecord, TaskState,
};
use vcm_match::MatchConfig;
use vcm_paramset::{ParamContent, ParamSetError, ParamSetId, ParamSetRegistry};
use vcm_publish::{ContentStore, Namespace, PublishConfig, PublishError, Publisher, UploadRecord};
use vcm_segment::{SegmentationComponent, Segmenter};
use vcm_volume::{VolumeError, VolumeId, VolumeProvider};

use crate::runner::PipelineRunner;

/// Failures surfaced by the pipeline facade
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Paramset registration or lookup failed
    #[error(transparent)]
    ParamSet(#[from] ParamSetError),

    /// Match tuning keys in a parameter bundle are malformed
    #[error(transparent)]
    Config(#[from] vcm_match::ConfigError),

    /// Task declaration rejected
    #[error(transparent)]
    Declare(#[from] DeclareError),

    /// Engine operation failed
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Volume provider failed while preparing a publication
    #[error(transparent)]
    Volume(#[from] VolumeError),

    /// Publication failed
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Publication requested for a segmentation that never committed
    #[error("no committed segmentation for {0}")]
    SegmentationMissing(SegmentationTaskKey),
}

impl PipelineError {
    /// Whether repeating the same call can succeed without new input
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Engine(EngineError::Task(err)) => err.is_retryable(),
            Self::Publish(err) => err.is_retryable(),
            Self::Volume(VolumeError::Backend(_)) => true,
            _ => false,
        }
    }
}

/// One wired instance of the whole system
///
/// Owns the paramset registry, the execution engine with its result store,
/// and the publisher; the volume provider, segmenter and content store are
/// the injected capability boundaries. Every operation delegates to the
/// owning component, so the semantics (content-addressed paramsets,
/// at-most-once execution, idempotent publication) are exactly those of the
/// component crates.
pub struct Pipeline {
    registry: Arc<ParamSetRegistry>,
    engine: ExecutionEngine,
    provider: Arc<dyn VolumeProvider>,
    publisher: Publisher,
}

impl Pipeline {
    /// Assemble a pipeline with default publication tuning
    pub fn new(
        provider: Arc<dyn VolumeProvider>,
        segmenter: Arc<dyn Segmenter>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        Self::with_publish_config(provider, segmenter, store, PublishConfig::default())
    }

    /// Assemble a pipeline with explicit publication tuning
    pub fn with_publish_config(
        provider: Arc<dyn VolumeProvider>,
        segmenter: Arc<dyn Segmenter>,
        store: Arc<dyn ContentStore>,
        publish: PublishConfig,
    ) -> Self {
        let registry = Arc::new(ParamSetRegistry::new());
        let results = Arc::new(ResultStore::new());
        let runner = Arc::new(PipelineRunner::new(
            Arc::clone(&registry),
            SegmentationComponent::new(Arc::clone(&provider), segmenter),
            Arc::clone(&results),
        ));
        info!("pipeline assembled");
        Self {
            registry,
            engine: ExecutionEngine::new(results, runner),
            provider,
            publisher: Publisher::new(store, publish),
        }
    }

    /// Register a parameter bundle, returning its content-addressed id
    ///
    /// Matching tuning is read from the same bundle under the `match.*`
    /// keys, so one id pins the full processing behaviour.
    pub fn register_paramset(
        &self,
        name: &str,
        version: u32,
        description: &str,
        content: ParamContent,
    ) -> Result<ParamSetId, PipelineError> {
        // Reject malformed match tuning at registration, not at execution.
        MatchConfig::from_content(&content)?;
        Ok(self.registry.register(name, version, description, content)?)
    }

    /// The paramset registry
    #[must_use]
    pub fn paramsets(&self) -> &Arc<ParamSetRegistry> {
        &self.registry
    }

    /// Declare a segmentation task; idempotent
    pub fn declare_segmentation(&self, volume: VolumeId, paramset: ParamSetId) -> TaskId {
        self.engine.declare_segmentation_task(volume, paramset)
    }

    /// Declare a match task over completed segmentations; idempotent
    pub fn declare_match(
        &self,
        group: GroupId,
        paramset: ParamSetId,
        members: impl IntoIterator<Item = VolumeId>,
    ) -> Result<TaskId, PipelineError> {
        Ok(self.engine.declare_match_task(group, paramset, members)?)
    }

    /// Execute a declared task to completion or failure
    pub async fn execute(&self, task: &TaskId) -> Result<ExecuteOutcome, PipelineError> {
        Ok(self.engine.execute(task).await?)
    }

    /// Return a claimed task to `Pending` after a crashed worker
    pub fn release(&self, task: &TaskId) -> Result<(), PipelineError> {
        Ok(self.engine.release(task)?)
    }

    /// Lifecycle state of a task
    #[must_use]
    pub fn task_state(&self, task: &TaskId) -> Option<TaskState> {
        self.engine.state(task)
    }

    /// Full bookkeeping record of a task
    #[must_use]
    pub fn task_record(&self, task: &TaskId) -> Option<TaskRecord> {
        self.engine.record(task)
    }

    /// Committed results, shared with the engine
    #[must_use]
    pub fn results(&self) -> &Arc<ResultStore> {
        self.engine.results()
    }

    /// Publish a committed segmentation with its source image
    ///
    /// The target channel comes from the volume's acquisition metadata; the
    /// mask labels land in the derived label channel next to it.
    pub async fn publish(
        &self,
        key: &SegmentationTaskKey,
        collection: &str,
        experiment: &str,
    ) -> Result<UploadRecord, PipelineError> {
        let segmentation = self
            .results()
            .segmentation(key)
            .ok_or(PipelineError::SegmentationMissing(*key))?;
        let info = self.provider.info(key.volume).await?;
        let image = self.provider.image(key.volume).await?;
        let namespace = Namespace::new(collection, experiment, info.channel);
        let record = self
            .publisher
            .publish(&segmentation, &image, &namespace)
            .await?;
        Ok(record)
    }

    /// The publication record for a segmentation, if one exists
    #[must_use]
    pub fn upload_record(&self, key: &SegmentationTaskKey) -> Option<UploadRecord> {
        let segmentation = self.results().segmentation(key)?;
        self.publisher.record(segmentation.id())
    }
}
