//! The task state machine
//!
//! Three states, four legal transitions. The claim transition
//! (`Pending -> Running`) is the only mutual-exclusion point in the whole
//! pipeline; everything else follows from it.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a declared task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Declared, not claimed by any worker
    Pending,
    /// Claimed by exactly one worker
    Running,
    /// Result rows committed; terminal
    Done,
}

/// Error for an illegal state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal task transition: {from:?} -> {to:?}")]
pub struct TransitionError {
    /// State the task was in
    pub from: TaskState,
    /// State the transition asked for
    pub to: TaskState,
}

/// Validates a task state transition
///
/// # Errors
/// Returns [`TransitionError`] if the transition is not legal.
pub fn validate_transition(from: TaskState, to: TaskState) -> Result<(), TransitionError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// All states reachable in one step from `from`
#[must_use]
pub fn allowed_transitions(from: TaskState) -> Vec<TaskState> {
    use TaskState::*;
    match from {
        Pending => vec![Running],
        Running => vec![Done, Pending],
        Done => vec![],
    }
}

fn allowed(from: TaskState, to: TaskState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}
