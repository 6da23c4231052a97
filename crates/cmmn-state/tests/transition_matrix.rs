//! # Lifecycle Transition Matrix
//!
//! Exhaustive state × transition matrix for every plan-item lifecycle.
//! Every pair listed in the expected table must be allowed with exactly the
//! listed target; every other pair must be undefined.

use cmmn_state::{Category, PlanItemState, Transition};

use PlanItemState as S;
use Transition as T;

fn assert_matrix(category: Category, prior: PlanItemState, expected: &[(S, T, S)]) {
    for &from in category.states() {
        for t in Transition::ALL {
            let actual = category.next(from, t, Some(prior));
            let wanted = expected
                .iter()
                .find(|(f, tr, _)| *f == from && *tr == t)
                .map(|(_, _, to)| *to);
            assert_eq!(
                actual, wanted,
                "{category}: {from} --{t}--> expected {wanted:?}, got {actual:?}"
            );
        }
    }
}

// =========================================================================
// Case root: 7 states
// =========================================================================

#[test]
fn test_case_transition_matrix_exhaustive() {
    let expected = [
        (S::Initial, T::Create, S::Active),
        (S::Active, T::Complete, S::Completed),
        (S::Active, T::Terminate, S::Terminated),
        (S::Active, T::Fault, S::Failed),
        (S::Active, T::Suspend, S::Suspended),
        (S::Suspended, T::ReActivate, S::Active),
        (S::Suspended, T::Close, S::Closed),
    ];
    assert_matrix(Category::Case, S::Active, &expected);
}

// =========================================================================
// Stage / Task: 9 states
// =========================================================================

#[test]
fn test_stage_task_transition_matrix_exhaustive() {
    let expected = [
        (S::Initial, T::Create, S::Available),
        (S::Available, T::Start, S::Active),
        (S::Available, T::Enable, S::Enabled),
        (S::Available, T::ParentSuspend, S::Suspended),
        (S::Available, T::Exit, S::Terminated),
        (S::Enabled, T::ManualStart, S::Active),
        (S::Enabled, T::Disable, S::Disabled),
        (S::Enabled, T::Suspend, S::Suspended),
        (S::Enabled, T::ParentSuspend, S::Suspended),
        (S::Enabled, T::Exit, S::Terminated),
        (S::Disabled, T::ReEnable, S::Enabled),
        (S::Disabled, T::Exit, S::Terminated),
        (S::Active, T::Complete, S::Completed),
        (S::Active, T::Fault, S::Failed),
        (S::Active, T::Terminate, S::Terminated),
        (S::Active, T::Exit, S::Terminated),
        (S::Active, T::Suspend, S::Suspended),
        (S::Active, T::ParentSuspend, S::Suspended),
        (S::Suspended, T::Resume, S::Enabled),
        (S::Suspended, T::ParentResume, S::Enabled),
        (S::Suspended, T::Exit, S::Terminated),
        (S::Failed, T::ReActivate, S::Active),
        (S::Failed, T::Exit, S::Terminated),
    ];
    assert_matrix(Category::StageTask, S::Enabled, &expected);
}

// =========================================================================
// Milestone / EventListener: 5 states
// =========================================================================

#[test]
fn test_event_milestone_transition_matrix_exhaustive() {
    let expected = [
        (S::Initial, T::Create, S::Available),
        (S::Initial, T::Terminate, S::Terminated),
        (S::Initial, T::ParentTerminate, S::Terminated),
        (S::Available, T::Occur, S::Completed),
        (S::Available, T::Suspend, S::Suspended),
        (S::Available, T::ParentSuspend, S::Suspended),
        (S::Available, T::Terminate, S::Terminated),
        (S::Available, T::ParentTerminate, S::Terminated),
        (S::Suspended, T::Resume, S::Available),
        (S::Suspended, T::ParentResume, S::Available),
        (S::Suspended, T::Terminate, S::Terminated),
        (S::Suspended, T::ParentTerminate, S::Terminated),
    ];
    assert_matrix(Category::EventMilestone, S::Available, &expected);
}

#[test]
fn test_every_target_is_in_declared_state_set() {
    for category in Category::ALL {
        for &from in category.states() {
            for t in Transition::ALL {
                for &prior in category.states() {
                    if let Some(to) = category.next(from, t, Some(prior)) {
                        assert!(category.contains(to), "{category}: {from} --{t}--> {to}");
                    }
                }
            }
        }
    }
}

#[test]
fn test_terminal_states_have_no_exits() {
    for category in Category::ALL {
        for &from in category.states().iter().filter(|s| s.is_terminal()) {
            for t in Transition::ALL {
                assert_eq!(category.next(from, t, Some(S::Active)), None);
            }
        }
    }
}
