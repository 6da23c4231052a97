//! # Engine Errors
//!
//! Every variant is local to one case instance. An error returned from an
//! externally triggered operation means the case graph was restored to its
//! state before the call.
//!
//! Requesting a transition that is undefined for the current state is not
//! an error; see [`TransitionOutcome::Disallowed`](cmmn_state::TransitionOutcome).

use thiserror::Error;

use cmmn_core::{CaseId, CoreError};
use cmmn_state::StateError;

/// Error raised by the case engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Entry sentry on a case root or event listener, or exit sentry on a
    /// milestone or event listener.
    #[error("{kind} sentry {sentry} cannot attach to {element} {item}")]
    InvalidSentryAttachment {
        /// Sentry business id.
        sentry: String,
        /// `entry` or `exit`.
        kind: &'static str,
        /// Target business id.
        item: String,
        /// Target element kind.
        element: &'static str,
    },

    /// A container already holds a child with this business id.
    #[error("{container} already contains a child with cmId {cm_id}")]
    DuplicateChildId {
        /// Container business id.
        container: String,
        /// Colliding business id.
        cm_id: String,
    },

    /// The case file already holds an item with this business id.
    #[error("case file already contains an item with cmId {cm_id}")]
    DuplicateFileItemId {
        /// Colliding business id.
        cm_id: String,
    },

    /// Linking these case file items would make an item its own ancestor.
    #[error("case file item {child} cannot become a child of {parent}: cycle")]
    FileItemCycle {
        /// Intended parent business id.
        parent: String,
        /// Intended child business id.
        child: String,
    },

    /// A rule or if-part names a predicate that is not registered.
    #[error("predicate {name:?} is not registered")]
    UnresolvedPredicate {
        /// Predicate name.
        name: String,
    },

    /// No process runner or sub-case factory is registered for a task.
    #[error("no implementation registered for task {cm_id}")]
    UnresolvedImplementation {
        /// Task business id.
        cm_id: String,
    },

    /// A process runner reported a failure while starting.
    #[error("implementation of task {cm_id} failed to start: {reason}")]
    ImplementationFailed {
        /// Task business id.
        cm_id: String,
        /// Runner diagnostic.
        reason: String,
    },

    /// Plan item handle out of range.
    #[error("unknown plan item #{id}")]
    UnknownItem {
        /// Arena index.
        id: usize,
    },

    /// Sentry handle out of range.
    #[error("unknown sentry #{id}")]
    UnknownSentry {
        /// Arena index.
        id: usize,
    },

    /// OnPart handle out of range.
    #[error("unknown on-part #{id}")]
    UnknownOnPart {
        /// Arena index.
        id: usize,
    },

    /// Case file item handle out of range.
    #[error("unknown case file item #{id}")]
    UnknownFileItem {
        /// Arena index.
        id: usize,
    },

    /// No element carries this business id.
    #[error("no element with cmId {cm_id}")]
    UnknownCmId {
        /// Business id looked up.
        cm_id: String,
    },

    /// An on-part listens for a transition its source never performs.
    #[error("{subject} ({category}) never performs transition {transition}")]
    CategoryMismatch {
        /// Source business id.
        subject: String,
        /// Source lifecycle category.
        category: &'static str,
        /// Requested transition.
        transition: &'static str,
    },

    /// The registry holds no case with this id.
    #[error("no case {case_id}")]
    UnknownCase {
        /// Case id looked up.
        case_id: CaseId,
    },

    /// Children can only be added to a case root or a stage.
    #[error("{cm_id} is not a stage or case root")]
    NotAContainer {
        /// Business id of the would-be parent.
        cm_id: String,
    },

    /// The task is not a case task, or its sub-case has not been started.
    #[error("task {task} has no running sub-case")]
    NoSubCase {
        /// Task business id.
        task: String,
    },

    /// A single cascade nested deeper than the configured bound.
    #[error("transition cascade exceeded depth limit of {limit}")]
    CascadeDepthExceeded {
        /// Configured limit.
        limit: usize,
    },

    /// Claim or unclaim refused.
    #[error("worker {worker} cannot claim/unclaim task {task}: {reason}")]
    ClaimRejected {
        /// Task business id.
        task: String,
        /// Worker id.
        worker: String,
        /// Refusal reason.
        reason: &'static str,
    },

    /// A case definition is inconsistent.
    #[error("invalid case definition: {0}")]
    Definition(String),

    /// Engine configuration could not be loaded.
    #[error("invalid engine configuration: {0}")]
    Config(String),

    /// Graph store failure.
    #[error("graph store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid identifier or timestamp.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Invalid lifecycle vocabulary.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Error raised by a [`GraphStore`](crate::registry::GraphStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Graph (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
