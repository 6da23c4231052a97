//! # Execution Context
//!
//! Every transition runs against an [`ExecutionContext`] that bundles the
//! external collaborators the engine calls into mid-cascade:
//!
//! - [`PredicateRegistry`] for rules and if-parts.
//! - [`ImplementationRegistry`] for process tasks and case tasks.
//! - A [`TaskInstantiator`] producing repetition instances.
//! - An optional [`ChangeSink`] observing every applied transition.
//! - The [`EngineConfig`].
//!
//! The context is shared, read-only state; one context may serve any
//! number of case instances concurrently.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use cmmn_core::{CaseId, CmId};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::graph::{CaseGraph, FileItemId, ItemId};
use crate::repetition::CloneInstantiator;
use crate::rule::PredicateRegistry;

// ─── Implementations ─────────────────────────────────────────────────

/// What a process runner is told when its task starts.
#[derive(Debug, Clone)]
pub struct TaskStart {
    /// Case holding the task.
    pub case_id: CaseId,
    /// The task's handle.
    pub task: ItemId,
    /// The task's business id (a repetition instance reports its own).
    pub cm_id: CmId,
}

/// Starts the external process behind a process task.
pub type ProcessRunner = Arc<dyn Fn(&TaskStart) -> Result<(), String> + Send + Sync>;

/// Builds a fresh sub-case graph for a case task.
pub type SubCaseFactory = Arc<dyn Fn(CaseId) -> Result<CaseGraph, EngineError> + Send + Sync>;

/// A registered task implementation.
#[derive(Clone)]
pub enum Implementation {
    /// Backs a process task.
    Process(ProcessRunner),
    /// Backs a case task.
    SubCase(SubCaseFactory),
}

/// Task business id → implementation.
///
/// Repetition instances resolve through their original's business id.
#[derive(Clone, Default)]
pub struct ImplementationRegistry {
    entries: BTreeMap<String, Implementation>,
}

impl ImplementationRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a process runner for the process task `cm_id`.
    pub fn register_process(
        &mut self,
        cm_id: impl Into<String>,
        runner: impl Fn(&TaskStart) -> Result<(), String> + Send + Sync + 'static,
    ) {
        self.entries
            .insert(cm_id.into(), Implementation::Process(Arc::new(runner)));
    }

    /// Register a sub-case factory for the case task `cm_id`.
    pub fn register_sub_case(
        &mut self,
        cm_id: impl Into<String>,
        factory: impl Fn(CaseId) -> Result<CaseGraph, EngineError> + Send + Sync + 'static,
    ) {
        self.entries
            .insert(cm_id.into(), Implementation::SubCase(Arc::new(factory)));
    }

    /// Process runner for `cm_id`.
    pub fn process(&self, cm_id: &str) -> Option<&ProcessRunner> {
        match self.entries.get(cm_id) {
            Some(Implementation::Process(runner)) => Some(runner),
            _ => None,
        }
    }

    /// Sub-case factory for `cm_id`.
    pub fn sub_case(&self, cm_id: &str) -> Option<&SubCaseFactory> {
        match self.entries.get(cm_id) {
            Some(Implementation::SubCase(factory)) => Some(factory),
            _ => None,
        }
    }

    /// Whether anything is registered for `cm_id`.
    pub fn contains(&self, cm_id: &str) -> bool {
        self.entries.contains_key(cm_id)
    }
}

impl std::fmt::Debug for ImplementationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| {
                let kind = match v {
                    Implementation::Process(_) => "process",
                    Implementation::SubCase(_) => "sub_case",
                };
                (k, kind)
            }))
            .finish()
    }
}

// ─── Repetition ──────────────────────────────────────────────────────

/// Produces repetition instances of a task.
///
/// The instance is added to the graph in INITIAL, next to the original; the
/// engine then drives it through creation.
pub trait TaskInstantiator: Send + Sync {
    /// Add instance number `n` of `task` to `graph`.
    fn instantiate(&self, graph: &mut CaseGraph, task: ItemId, n: u32) -> Result<ItemId, EngineError>;
}

// ─── Change Notification ─────────────────────────────────────────────

/// The element a change event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    /// A plan item.
    PlanItem(ItemId),
    /// A case file item.
    FileItem(FileItemId),
}

/// Emitted after every applied transition, including notification-only
/// transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Case holding the element.
    pub case_id: CaseId,
    /// The element.
    pub subject: Subject,
    /// The element's business id.
    pub cm_id: String,
    /// Transition name.
    pub transition: String,
    /// State after the transition.
    pub new_state: String,
}

/// Consumer of change events (UI push, audit log, REST hooks).
pub trait ChangeSink: Send + Sync {
    /// Called synchronously, mid-cascade; must not block.
    fn publish(&self, event: &ChangeEvent);
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ChangeEvent>>,
}

impl RecordingSink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events.
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().clone()
    }

    /// Drop all recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl ChangeSink for RecordingSink {
    fn publish(&self, event: &ChangeEvent) {
        self.events.lock().push(event.clone());
    }
}

// ─── Context ─────────────────────────────────────────────────────────

/// Collaborators and configuration shared by every transition.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Rule and if-part predicates.
    pub predicates: PredicateRegistry,
    /// Process runners and sub-case factories.
    pub implementations: ImplementationRegistry,
    /// Repetition instance producer.
    pub instantiator: Arc<dyn TaskInstantiator>,
    /// Optional change consumer.
    pub sink: Option<Arc<dyn ChangeSink>>,
    /// Engine tunables.
    pub config: EngineConfig,
}

impl ExecutionContext {
    /// Built-in predicates, no implementations, cloning instantiator, no sink.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            predicates: PredicateRegistry::with_builtins(),
            implementations: ImplementationRegistry::new(),
            instantiator: Arc::new(CloneInstantiator),
            sink: None,
            config,
        }
    }

    /// Attach a change sink.
    pub fn with_sink(mut self, sink: Arc<dyn ChangeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace the repetition instantiator.
    pub fn with_instantiator(mut self, instantiator: Arc<dyn TaskInstantiator>) -> Self {
        self.instantiator = instantiator;
        self
    }

    /// Build an event for later publication; `None` when no sink listens.
    pub(crate) fn capture(&self, event: impl FnOnce() -> ChangeEvent) -> Option<ChangeEvent> {
        self.sink.as_ref().map(|_| event())
    }

    pub(crate) fn publish(&self, events: impl IntoIterator<Item = ChangeEvent>) {
        if let Some(sink) = &self.sink {
            for event in events {
                sink.publish(&event);
            }
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("predicates", &self.predicates)
            .field("implementations", &self.implementations)
            .field("sink", &self.sink.is_some())
            .field("config", &self.config)
            .finish()
    }
}
