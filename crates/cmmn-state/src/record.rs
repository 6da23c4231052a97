//! # Transition Records and Outcomes

use serde::{Deserialize, Serialize};

use cmmn_core::Timestamp;

/// Record of one applied transition, appended to the case's log.
///
/// Notification-only transitions (state unchanged) are recorded too, with
/// equal `from_state` and `to_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Business id of the plan item or case file item.
    pub subject: String,
    /// Transition name.
    pub transition: String,
    /// State before the transition.
    pub from_state: String,
    /// State after the transition.
    pub to_state: String,
    /// When the transition was applied.
    pub timestamp: Timestamp,
}

/// Result of requesting a transition.
///
/// Requests that are not defined for the current state are reported as
/// `Disallowed` and leave the graph untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome<S> {
    /// The transition was applied.
    Applied {
        /// State before.
        from: S,
        /// State after.
        to: S,
    },
    /// The transition is not defined for the current state.
    Disallowed {
        /// The unchanged state.
        state: S,
        /// The rejected transition name.
        transition: &'static str,
    },
    /// The transition is defined but its guard did not hold.
    GuardRejected {
        /// The unchanged state.
        state: S,
        /// The rejected transition name.
        transition: &'static str,
    },
}

impl<S: Copy> TransitionOutcome<S> {
    /// Whether the transition was applied.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// The state after the request.
    pub fn state(&self) -> S {
        match self {
            Self::Applied { to, .. } => *to,
            Self::Disallowed { state, .. } | Self::GuardRejected { state, .. } => *state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlanItemState;

    #[test]
    fn test_outcome_state() {
        let applied = TransitionOutcome::Applied {
            from: PlanItemState::Available,
            to: PlanItemState::Active,
        };
        assert!(applied.is_applied());
        assert_eq!(applied.state(), PlanItemState::Active);

        let refused = TransitionOutcome::Disallowed {
            state: PlanItemState::Completed,
            transition: "start",
        };
        assert!(!refused.is_applied());
        assert_eq!(refused.state(), PlanItemState::Completed);
    }

    #[test]
    fn test_record_serializes() {
        let record = TransitionRecord {
            subject: "assemble".into(),
            transition: "start".into(),
            from_state: "AVAILABLE".into(),
            to_state: "ACTIVE".into(),
            timestamp: cmmn_core::Timestamp::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["to_state"], "ACTIVE");
    }
}
