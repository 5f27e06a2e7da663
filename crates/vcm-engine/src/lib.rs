//! Task registry, lifecycle state machine and at-most-once execution
//!
//! # Core Concepts
//!
//! - **Task**: a declared unit of work, identified by what it computes
//!   (volume + ParamSet for segmentation, member set + ParamSet for
//!   matching) rather than by who asked for it
//! - **Claim**: the atomic `Pending -> Running` transition; exactly one
//!   worker per task wins it
//! - **Commit**: the all-or-nothing write of a task's result rows into the
//!   [`ResultStore`], coupled to the `Running -> Done` transition
//! - **Release**: operator recovery that reverts `Running -> Pending` after
//!   a crash or abort, making the task executable again
//!
//! Workers race `execute` freely; the engine guarantees the computation
//! runs once, result rows appear atomically, and failed attempts leave no
//! partial state behind.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod engine;
mod error;
mod state;
mod store;
mod task;

pub use engine::{ExecuteOutcome, ExecutionEngine, TaskOutput, TaskResultRef, TaskRunner};
pub use error::{DeclareError, EngineError, TaskError};
pub use state::{allowed_transitions, validate_transition, TaskState, TransitionError};
pub use store::{CommitError, MatchId, ResultStore, VolumeMatch};
pub use task::{GroupId, MatchTaskKey, SegmentationTaskKey, TaskId, TaskKind, TaskRecord};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
