use proptest::prelude::*;
use vcm_engine::{allowed_transitions, validate_transition, TaskState};

#[test]
fn test_pending_transitions() {
    assert!(validate_transition(TaskState::Pending, TaskState::Running).is_ok());

    // Invalid
    assert!(validate_transition(TaskState::Pending, TaskState::Done).is_err());
    assert!(validate_transition(TaskState::Pending, TaskState::Pending).is_err());
}

#[test]
fn test_running_transitions() {
    // Commit and release both leave Running.
    assert!(validate_transition(TaskState::Running, TaskState::Done).is_ok());
    assert!(validate_transition(TaskState::Running, TaskState::Pending).is_ok());

    assert!(validate_transition(TaskState::Running, TaskState::Running).is_err());
}

#[test]
fn test_done_is_terminal() {
    assert!(validate_transition(TaskState::Done, TaskState::Pending).is_err());
    assert!(validate_transition(TaskState::Done, TaskState::Running).is_err());
    assert!(validate_transition(TaskState::Done, TaskState::Done).is_err());
    assert!(allowed_transitions(TaskState::Done).is_empty());
}

proptest! {
    #[test]
    fn prop_all_transitions_are_subset_of_allowed(
        from in prop_oneof![
            Just(TaskState::Pending),
            Just(TaskState::Running),
            Just(TaskState::Done),
        ],
        to in prop_oneof![
            Just(TaskState::Pending),
            Just(TaskState::Running),
            Just(TaskState::Done),
        ]
    ) {
        let res = validate_transition(from, to);
        let allowed = allowed_transitions(from);

        if res.is_ok() {
            prop_assert!(allowed.contains(&to));
        } else {
            prop_assert!(!allowed.contains(&to));
        }
    }
}
