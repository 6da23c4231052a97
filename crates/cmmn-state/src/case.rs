//! # Case Root Lifecycle
//!
//! ```text
//! INITIAL ──create──▶ ACTIVE ──complete──▶ COMPLETED
//!                      │ │ │
//!                fault │ │ └──terminate──▶ TERMINATED
//!                      ▼ │
//!                  FAILED│ suspend
//!                        ▼
//!                    SUSPENDED ──close──▶ CLOSED
//!                        │
//!                        └──reActivate──▶ ACTIVE
//! ```
//!
//! `complete` is additionally guarded by the engine: it only applies when no
//! child is ACTIVE and every required child permits completion.

use crate::state::PlanItemState::{self, *};
use crate::transition::Transition;

/// States a case root may occupy.
pub const STATES: &[PlanItemState] = &[
    Initial, Active, Completed, Failed, Suspended, Terminated, Closed,
];

/// Transitions a case root responds to.
pub const TRANSITIONS: &[Transition] = &[
    Transition::Create,
    Transition::Complete,
    Transition::Terminate,
    Transition::Fault,
    Transition::Suspend,
    Transition::ReActivate,
    Transition::Close,
];

/// Target state of `transition` from `state`, or `None` if undefined.
pub fn next(state: PlanItemState, transition: Transition) -> Option<PlanItemState> {
    use Transition as T;
    match (state, transition) {
        (Initial, T::Create) => Some(Active),
        (Active, T::Complete) => Some(Completed),
        (Active, T::Terminate) => Some(Terminated),
        (Active, T::Fault) => Some(Failed),
        (Active, T::Suspend) => Some(Suspended),
        (Suspended, T::ReActivate) => Some(Active),
        (Suspended, T::Close) => Some(Closed),
        _ => None,
    }
}
