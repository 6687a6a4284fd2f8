//! Node state machine
//!
//! `Pending` is never re-entered and `Complete` is terminal. `Blocked` is left
//! only through external input.

use crate::error::StateMachineError;
use crate::types::NodeState;

/// Validate a state transition
pub fn validate_transition(from: NodeState, to: NodeState) -> Result<(), StateMachineError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StateMachineError { from, to })
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: NodeState) -> &'static [NodeState] {
    match from {
        NodeState::Pending => &[
            NodeState::Searching,
            NodeState::Calculating,
            NodeState::Blocked,
        ],
        NodeState::Searching => &[
            NodeState::Complete,
            NodeState::NeedsBreakdown,
            NodeState::Blocked,
        ],
        NodeState::NeedsBreakdown | NodeState::Calculating => {
            &[NodeState::Complete, NodeState::Blocked]
        }
        NodeState::Blocked => &[NodeState::Complete],
        NodeState::Complete => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_state() -> impl Strategy<Value = NodeState> {
        prop_oneof![
            Just(NodeState::Pending),
            Just(NodeState::Searching),
            Just(NodeState::NeedsBreakdown),
            Just(NodeState::Calculating),
            Just(NodeState::Complete),
            Just(NodeState::Blocked),
        ]
    }

    #[test]
    fn search_path() {
        assert!(validate_transition(NodeState::Pending, NodeState::Searching).is_ok());
        assert!(validate_transition(NodeState::Searching, NodeState::NeedsBreakdown).is_ok());
        assert!(validate_transition(NodeState::NeedsBreakdown, NodeState::Complete).is_ok());
    }

    #[test]
    fn complete_is_terminal() {
        assert!(allowed_transitions(NodeState::Complete).is_empty());
        assert!(validate_transition(NodeState::Complete, NodeState::Blocked).is_err());
    }

    #[test]
    fn blocked_only_completes() {
        assert!(validate_transition(NodeState::Blocked, NodeState::Complete).is_ok());
        assert!(validate_transition(NodeState::Blocked, NodeState::Searching).is_err());
    }

    proptest! {
        #[test]
        fn prop_pending_never_reentered(from in any_state()) {
            prop_assert!(validate_transition(from, NodeState::Pending).is_err());
        }

        #[test]
        fn prop_result_matches_table(from in any_state(), to in any_state()) {
            let allowed = allowed_transitions(from).contains(&to);
            prop_assert_eq!(validate_transition(from, to).is_ok(), allowed);
        }
    }
}
