//! # Stage / Task Lifecycle
//!
//! ```text
//!                 create            start
//! INITIAL ──────────▶ AVAILABLE ───────────────────────▶ ACTIVE ──complete──▶ COMPLETED
//!                        │ enable                         ▲  │ fault
//!                        ▼            manualStart         │  ▼
//!                      ENABLED ───────────────────────────┘ FAILED ──reActivate──▶ ACTIVE
//!                        │ ▲
//!                disable ▼ │ reEnable
//!                      DISABLED
//!
//! AVAILABLE | ENABLED | ACTIVE ──(parent)suspend──▶ SUSPENDED ──(parent)resume──▶ prior state
//! AVAILABLE | ENABLED | DISABLED | ACTIVE | SUSPENDED | FAILED ──exit──▶ TERMINATED
//! ACTIVE ──terminate──▶ TERMINATED
//! ```
//!
//! `suspend` is only defined from ENABLED and ACTIVE; `parentSuspend` is also
//! defined from AVAILABLE. The completion of a non-blocking task on creation
//! and repetition resets are engine-driven and do not appear here.

use crate::state::PlanItemState;
use crate::transition::Transition;

use crate::state::PlanItemState::*;

/// States a stage or task may occupy.
pub const STATES: &[PlanItemState] = &[
    Initial, Available, Enabled, Disabled, Active, Failed, Suspended, Completed, Terminated,
];

/// Transitions a stage or task responds to.
pub const TRANSITIONS: &[Transition] = &[
    Transition::Create,
    Transition::Start,
    Transition::Enable,
    Transition::ReEnable,
    Transition::Disable,
    Transition::ManualStart,
    Transition::Resume,
    Transition::ParentResume,
    Transition::ReActivate,
    Transition::Fault,
    Transition::Suspend,
    Transition::ParentSuspend,
    Transition::Exit,
    Transition::Terminate,
    Transition::Complete,
];

/// Target state of `transition` from `state`, or `None` if undefined.
///
/// `prior` is the state recorded before suspension; resumption without one
/// is undefined.
pub fn next(
    state: PlanItemState,
    transition: Transition,
    prior: Option<PlanItemState>,
) -> Option<PlanItemState> {
    use Transition as T;
    match (state, transition) {
        (Initial, T::Create) => Some(Available),

        (Available, T::Start) => Some(Active),
        (Available, T::Enable) => Some(Enabled),
        (Available, T::ParentSuspend) => Some(Suspended),

        (Enabled, T::ManualStart) => Some(Active),
        (Enabled, T::Disable) => Some(Disabled),
        (Enabled, T::Suspend | T::ParentSuspend) => Some(Suspended),

        (Disabled, T::ReEnable) => Some(Enabled),

        (Active, T::Complete) => Some(Completed),
        (Active, T::Fault) => Some(Failed),
        (Active, T::Terminate) => Some(Terminated),
        (Active, T::Suspend | T::ParentSuspend) => Some(Suspended),

        (Suspended, T::Resume | T::ParentResume) => {
            prior.filter(|p| STATES.contains(p) && *p != Suspended && !p.is_terminal())
        }

        (Failed, T::ReActivate) => Some(Active),

        (Available | Enabled | Disabled | Active | Suspended | Failed, T::Exit) => Some(Terminated),

        _ => None,
    }
}
