//! # cmmn-state — Lifecycle State Machines
//!
//! Pure transition tables for the four lifecycles of the case engine. No
//! module here knows about the plan-item graph; the engine consults these
//! tables before applying a transition and performs the side effects itself.
//!
//! ## Machines
//!
//! | Category | States | Module |
//! |----------|--------|--------|
//! | Case root | INITIAL, ACTIVE, COMPLETED, FAILED, SUSPENDED, TERMINATED, CLOSED | [`case`] |
//! | Stage / Task | INITIAL, AVAILABLE, ENABLED, DISABLED, ACTIVE, FAILED, SUSPENDED, COMPLETED, TERMINATED | [`stage_task`] |
//! | Milestone / EventListener | INITIAL, AVAILABLE, SUSPENDED, COMPLETED, TERMINATED | [`event_milestone`] |
//! | Case file item | INITIAL, AVAILABLE, DISCARDED | [`case_file_item`] |
//!
//! Plan-item machines share one [`PlanItemState`] vocabulary; each
//! [`Category`] only ever produces states from its own declared set.
//!
//! A transition that is not defined for the current state is not an error:
//! the table yields `None` and the engine reports
//! [`TransitionOutcome::Disallowed`].

pub mod case;
pub mod case_file_item;
pub mod category;
pub mod error;
pub mod event_milestone;
pub mod record;
pub mod stage_task;
pub mod state;
pub mod transition;

// ─── Plan item re-exports ───────────────────────────────────────────

pub use category::Category;
pub use state::PlanItemState;
pub use transition::Transition;

// ─── Case file re-exports ───────────────────────────────────────────

pub use case_file_item::{CaseFileItemState, FileItemTransition};

// ─── Shared re-exports ──────────────────────────────────────────────

pub use error::StateError;
pub use record::{TransitionOutcome, TransitionRecord};
