//! # Case Registry and Graph Stores
//!
//! The registry owns every live case graph, one `Mutex` per case behind a
//! registry-level `RwLock`. Operations on one case are serialized; unrelated
//! cases proceed in parallel. Locks are `parking_lot` and are never held
//! across anything but the synchronous cascade.
//!
//! With a [`GraphStore`] configured, a case is saved after every successful
//! operation and loaded on first access. A failed operation saves nothing:
//! the graph was already restored in memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use cmmn_core::CaseId;

use crate::context::ExecutionContext;
use crate::error::{EngineError, StoreError};
use crate::graph::CaseGraph;

// ─── Graph stores ────────────────────────────────────────────────────

/// Durable home of case graphs. A save is a full commit of one graph.
pub trait GraphStore: Send + Sync {
    /// The stored graph for `id`, if any.
    fn load(&self, id: CaseId) -> Result<Option<CaseGraph>, StoreError>;
    /// Store `graph`, replacing any previous version.
    fn save(&self, graph: &CaseGraph) -> Result<(), StoreError>;
    /// Forget `id`. Deleting an absent case is not an error.
    fn delete(&self, id: CaseId) -> Result<(), StoreError>;
}

/// Graphs serialized to JSON strings in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<CaseId, String>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored graphs.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GraphStore for MemoryStore {
    fn load(&self, id: CaseId) -> Result<Option<CaseGraph>, StoreError> {
        match self.data.read().get(&id) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, graph: &CaseGraph) -> Result<(), StoreError> {
        let json = serde_json::to_string(graph)?;
        self.data.write().insert(graph.id, json);
        Ok(())
    }

    fn delete(&self, id: CaseId) -> Result<(), StoreError> {
        self.data.write().remove(&id);
        Ok(())
    }
}

/// One pretty-printed JSON file per case: `<dir>/<uuid>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// A store rooted at `dir`, created if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: CaseId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_uuid()))
    }
}

impl GraphStore for JsonFileStore {
    fn load(&self, id: CaseId) -> Result<Option<CaseGraph>, StoreError> {
        let path = self.path(id);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    fn save(&self, graph: &CaseGraph) -> Result<(), StoreError> {
        let path = self.path(graph.id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(graph)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, id: CaseId) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ─── Registry ────────────────────────────────────────────────────────

type Slot = Arc<Mutex<CaseGraph>>;

/// Live case graphs keyed by case id.
#[derive(Default)]
pub struct CaseRegistry {
    cases: RwLock<HashMap<CaseId, Slot>>,
    store: Option<Arc<dyn GraphStore>>,
}

impl CaseRegistry {
    /// A registry without persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry saving to `store`.
    pub fn with_store(store: Arc<dyn GraphStore>) -> Self {
        Self {
            cases: RwLock::new(HashMap::new()),
            store: Some(store),
        }
    }

    /// Register `graph` under its id, replacing any previous graph.
    pub fn insert(&self, graph: CaseGraph) -> Result<CaseId, EngineError> {
        let id = graph.id;
        if let Some(store) = &self.store {
            store.save(&graph)?;
        }
        self.cases.write().insert(id, Arc::new(Mutex::new(graph)));
        tracing::debug!(case = %id, "case registered");
        Ok(id)
    }

    /// Run `f` with exclusive access to case `id`.
    ///
    /// The graph is saved before the operation commits. If `f` or the save
    /// fails the graph is restored and no change events reach the sink of
    /// `ctx`.
    pub fn with_case<R>(
        &self,
        id: CaseId,
        ctx: &ExecutionContext,
        f: impl FnOnce(&mut CaseGraph) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let slot = self.slot(id)?;
        let mut graph = slot.lock();
        let result = graph.atomically(|graph| {
            let value = f(graph)?;
            if let Some(store) = &self.store {
                store.save(graph)?;
            }
            Ok(value)
        })?;
        graph.flush_events(ctx);
        Ok(result)
    }

    /// Snapshot of case `id`.
    pub fn get(&self, id: CaseId) -> Result<CaseGraph, EngineError> {
        Ok(self.slot(id)?.lock().clone())
    }

    /// Drop case `id` from memory and from the store. Returns whether the
    /// case was known.
    pub fn remove(&self, id: CaseId) -> Result<bool, EngineError> {
        let removed = self.cases.write().remove(&id).is_some();
        let stored = match &self.store {
            Some(store) => {
                let stored = store.load(id)?.is_some();
                store.delete(id)?;
                stored
            }
            None => false,
        };
        tracing::debug!(case = %id, "case removed");
        Ok(removed || stored)
    }

    /// Ids of the cases in memory, sorted.
    pub fn ids(&self) -> Vec<CaseId> {
        let mut ids: Vec<CaseId> = self.cases.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of cases in memory.
    pub fn len(&self) -> usize {
        self.cases.read().len()
    }

    /// Whether no case is in memory.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: CaseId) -> Result<Slot, EngineError> {
        if let Some(slot) = self.cases.read().get(&id) {
            return Ok(Arc::clone(slot));
        }
        let Some(store) = &self.store else {
            return Err(EngineError::UnknownCase { case_id: id });
        };
        let graph = store.load(id)?.ok_or(EngineError::UnknownCase { case_id: id })?;
        let mut cases = self.cases.write();
        let slot = cases
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(graph)));
        Ok(Arc::clone(slot))
    }
}

impl std::fmt::Debug for CaseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseRegistry")
            .field("cases", &self.ids())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}
