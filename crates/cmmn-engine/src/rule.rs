//! # Rules and the Predicate Registry
//!
//! Rules (required, repetition, manual activation) and if-parts are named
//! predicates evaluated against one case file item. Predicates are
//! registered by name at startup, usually by the blueprint assembler; the
//! engine never interprets a rule name itself.
//!
//! A name that is not registered evaluates to `false` under the default
//! [`UnresolvedPredicatePolicy::FailClosed`]. That silently disables
//! "required" and "manual activation" semantics for the affected item, so
//! every fail-closed evaluation is logged at `warn`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::case_file::CaseFileItem;
use crate::config::UnresolvedPredicatePolicy;
use crate::error::EngineError;
use crate::graph::FileItemId;

/// A named predicate bound to its case file item context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Registered predicate name.
    pub predicate: String,
    /// Case file item passed to the predicate.
    pub context: FileItemId,
}

impl Rule {
    /// Bind `predicate` to `context`.
    pub fn new(predicate: impl Into<String>, context: FileItemId) -> Self {
        Self {
            predicate: predicate.into(),
            context,
        }
    }
}

/// Boolean evaluation over one case file item.
pub type Predicate = Arc<dyn Fn(&CaseFileItem) -> bool + Send + Sync>;

/// Name → predicate lookup table.
#[derive(Clone, Default)]
pub struct PredicateRegistry {
    predicates: BTreeMap<String, Predicate>,
}

impl PredicateRegistry {
    /// Name of the built-in predicate that always holds.
    pub const ALWAYS: &'static str = "always";
    /// Name of the built-in predicate that never holds.
    pub const NEVER: &'static str = "never";

    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-ins `always` and `never`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Self::ALWAYS, |_| true);
        registry.register(Self::NEVER, |_| false);
        registry
    }

    /// Register (or replace) a predicate.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        predicate: impl Fn(&CaseFileItem) -> bool + Send + Sync + 'static,
    ) {
        self.predicates.insert(name.into(), Arc::new(predicate));
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.predicates.keys().map(String::as_str)
    }

    /// Evaluate `name` against `item`, applying `policy` when the name is
    /// not registered.
    pub fn evaluate(
        &self,
        name: &str,
        item: &CaseFileItem,
        policy: UnresolvedPredicatePolicy,
    ) -> Result<bool, EngineError> {
        match self.predicates.get(name) {
            Some(predicate) => Ok(predicate(item)),
            None => match policy {
                UnresolvedPredicatePolicy::FailClosed => {
                    tracing::warn!(
                        predicate = name,
                        context = %item.cm_id,
                        "unresolved predicate evaluates to false"
                    );
                    Ok(false)
                }
                UnresolvedPredicatePolicy::Error => Err(EngineError::UnresolvedPredicate {
                    name: name.to_string(),
                }),
            },
        }
    }
}

impl std::fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.predicates.keys()).finish()
    }
}
