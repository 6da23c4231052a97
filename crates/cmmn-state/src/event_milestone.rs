//! # Milestone / Event Listener Lifecycle
//!
//! ```text
//! INITIAL ──create──▶ AVAILABLE ──occur──▶ COMPLETED
//!                        │  ▲
//!     (parent)suspend    ▼  │ (parent)resume
//!                     SUSPENDED
//!
//! INITIAL | AVAILABLE | SUSPENDED ──terminate / parentTerminate──▶ TERMINATED
//! ```

use crate::state::PlanItemState::{self, *};
use crate::transition::Transition;

/// States a milestone or event listener may occupy.
pub const STATES: &[PlanItemState] = &[Initial, Available, Suspended, Completed, Terminated];

/// Transitions a milestone or event listener responds to.
pub const TRANSITIONS: &[Transition] = &[
    Transition::Create,
    Transition::Occur,
    Transition::Suspend,
    Transition::ParentSuspend,
    Transition::Resume,
    Transition::ParentResume,
    Transition::Terminate,
    Transition::ParentTerminate,
];

/// Target state of `transition` from `state`, or `None` if undefined.
pub fn next(
    state: PlanItemState,
    transition: Transition,
    prior: Option<PlanItemState>,
) -> Option<PlanItemState> {
    use Transition as T;
    match (state, transition) {
        (Initial, T::Create) => Some(Available),
        (Available, T::Occur) => Some(Completed),
        (Available, T::Suspend | T::ParentSuspend) => Some(Suspended),
        (Suspended, T::Resume | T::ParentResume) => prior.filter(|p| *p == Available),
        (Initial | Available | Suspended, T::Terminate | T::ParentTerminate) => Some(Terminated),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occur_completes() {
        assert_eq!(next(Available, Transition::Occur, None), Some(Completed));
        assert_eq!(next(Initial, Transition::Occur, None), None);
    }

    #[test]
    fn test_suspend_resume() {
        assert_eq!(next(Available, Transition::Suspend, None), Some(Suspended));
        assert_eq!(
            next(Suspended, Transition::ParentResume, Some(Available)),
            Some(Available)
        );
        assert_eq!(next(Suspended, Transition::Resume, None), None);
    }

    #[test]
    fn test_terminate_from_any_open_state() {
        for s in [Initial, Available, Suspended] {
            assert_eq!(next(s, Transition::ParentTerminate, None), Some(Terminated));
        }
        assert_eq!(next(Completed, Transition::Terminate, None), None);
    }

    #[test]
    fn test_terminal_states_are_closed() {
        for t in Transition::ALL {
            assert_eq!(next(Completed, t, Some(Available)), None);
            assert_eq!(next(Terminated, t, Some(Available)), None);
        }
    }
}
