//! Error types for the execution engine
//!
//! Two layers, matching when the caller can act:
//! - [`DeclareError`]: rejected synchronously at declaration time; the
//!   caller fixes the request and retries.
//! - [`TaskError`]: a claimed execution failed; the task is back in
//!   `Pending` and [`TaskError::is_retryable`] says whether calling
//!   `execute` again can help without new input.

use vcm_volume::VolumeId;

use crate::state::TransitionError;
use crate::store::CommitError;
use crate::task::{GroupId, TaskId};

/// Declaration-time rejections
#[derive(Debug, thiserror::Error)]
pub enum DeclareError {
    /// The identical key was already declared under a different group label
    #[error("task {task} already declared under group '{existing}'")]
    Conflict { task: TaskId, existing: GroupId },

    /// The request can never form a valid task
    #[error("invalid task: {0}")]
    InvalidTask(String),

    /// A member volume has no committed Segmentation under the bound ParamSet
    #[error("volume {volume} has no completed segmentation under the bound paramset")]
    UnmetDependency { volume: VolumeId },
}

/// Execution failures, classified for retry policy
///
/// The engine guarantees the task is back in `Pending` when one of these
/// surfaces; whether and when to call `execute` again is the caller's
/// decision.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Resource exhaustion or other passing condition; retry allowed
    #[error("transient failure: {reason}")]
    Transient { reason: String },

    /// Input or produced data is malformed; retrying without new input fails identically
    #[error("data failure: {reason}")]
    Data { reason: String },

    /// Segmenter or content store unavailable; retry allowed with backoff
    #[error("external service failure: {reason}")]
    ExternalService { reason: String },

    /// Volume registration did not converge; fails identically until input changes
    #[error("registration failure: {reason}")]
    Registration { reason: String },
}

impl TaskError {
    /// Whether calling `execute` again can succeed without new input
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient { .. } | Self::ExternalService { .. }
        )
    }

    /// Build a transient failure
    #[inline]
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    /// Build a data failure
    #[inline]
    pub fn data(reason: impl Into<String>) -> Self {
        Self::Data {
            reason: reason.into(),
        }
    }

    /// Build an external-service failure
    #[inline]
    pub fn external(reason: impl Into<String>) -> Self {
        Self::ExternalService {
            reason: reason.into(),
        }
    }

    /// Build a registration failure
    #[inline]
    pub fn registration(reason: impl Into<String>) -> Self {
        Self::Registration {
            reason: reason.into(),
        }
    }
}

impl From<CommitError> for TaskError {
    fn from(err: CommitError) -> Self {
        Self::Data {
            reason: err.to_string(),
        }
    }
}

/// Unified error surface of engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Declaration rejected
    #[error(transparent)]
    Declare(#[from] DeclareError),

    /// Execution failed; task reverted to `Pending`
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Illegal lifecycle transition requested
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// No task declared under this id
    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    /// A `Done` task has no stored result row
    #[error("task {0} is done but has no result row")]
    ResultMissing(TaskId),
}
