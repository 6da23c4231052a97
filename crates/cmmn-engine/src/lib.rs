//! # cmmn-engine — Case Execution Engine
//!
//! Runs case instances: a plan-item tree (case root, stages, tasks,
//! milestones, event listeners) gated by a network of entry and exit
//! sentries, over a case file of typed data.
//!
//! ## Architecture
//!
//! - **Arena graph** (`graph.rs`): one [`CaseGraph`] per case instance owns
//!   every plan item, sentry, on-part and case file item. Elements refer to
//!   each other by index handles, so there are no reference cycles.
//!
//! - **Transitions** (`engine.rs`): [`CaseGraph::fire`] checks the
//!   lifecycle table from `cmmn-state`, applies the change, notifies
//!   observers and runs every resulting transition on the same call stack.
//!   The whole cascade is atomic.
//!
//! - **Sentries** (`sentry.rs`): on-parts observe transitions of plan
//!   items and case file items; a sentry whose on-parts and if-part all
//!   hold runs its entry or exit action.
//!
//! - **Propagation** (`propagation.rs`, `repetition.rs`): auto-completion,
//!   suspend/resume and exit cascades, parent activation, repetition.
//!
//! - **Collaborators** (`context.rs`): predicates, task implementations,
//!   the repetition instantiator and an optional change sink are passed in
//!   through an [`ExecutionContext`], never looked up globally.
//!
//! - **Blueprints** (`definition.rs`): YAML case definitions assembled
//!   into fresh graphs.
//!
//! - **Registry** (`registry.rs`): per-case serialization of mutations,
//!   with optional persistence through a [`GraphStore`].
//!
//! ## Crate Policy
//!
//! - No `unsafe` code.
//! - No `.unwrap()` outside tests; every failure is an [`EngineError`].
//! - Disallowed transitions are reported as
//!   [`TransitionOutcome::Disallowed`](cmmn_state::TransitionOutcome), not
//!   as errors.

pub mod case_file;
pub mod config;
pub mod context;
pub mod definition;
pub mod engine;
pub mod error;
pub mod graph;
pub mod propagation;
pub mod registry;
pub mod repetition;
pub mod rule;
pub mod sentry;
pub mod sub_case;
pub mod task_service;

// ─── Graph re-exports ───────────────────────────────────────────────

pub use graph::{
    CaseGraph, CaseRootData, CaseTaskBinding, Element, FileItemId, ItemId, MilestoneData,
    OnPartId, PlanItem, PlanItemKind, SentryId, StageData, SuspendOrigin, TaskData, TaskKind,
};
pub use sentry::{IfPart, OnPart, OnPartSource, Sentry, SentryKind};

// ─── Case file re-exports ───────────────────────────────────────────

pub use case_file::{Attachment, CaseFile, CaseFileItem, FileOutcome, Property, PropertyType};

// ─── Execution re-exports ───────────────────────────────────────────

pub use config::{EngineConfig, UnresolvedPredicatePolicy};
pub use context::{
    ChangeEvent, ChangeSink, ExecutionContext, ImplementationRegistry, RecordingSink, Subject,
    TaskInstantiator, TaskStart,
};
pub use engine::Outcome;
pub use repetition::CloneInstantiator;
pub use rule::{PredicateRegistry, Rule};
pub use task_service::CaseWorker;

// ─── Definition and storage re-exports ──────────────────────────────

pub use definition::{Blueprint, CaseDefinition};
pub use error::{EngineError, StoreError};
pub use registry::{CaseRegistry, GraphStore, JsonFileStore, MemoryStore};
