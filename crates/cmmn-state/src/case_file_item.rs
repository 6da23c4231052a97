//! # Case File Item Lifecycle
//!
//! ```text
//! INITIAL ──create──▶ AVAILABLE ──delete──▶ DISCARDED
//!                      │    ▲
//!                      └────┘ update, replace, addChild, removeChild,
//!                             addReference, removeReference
//! ```
//!
//! The same-state transitions exist so that observers learn about data
//! changes.

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Lifecycle state of a case file item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseFileItemState {
    /// Declared, not yet created.
    Initial,
    /// Holds data.
    Available,
    /// Deleted.
    Discarded,
}

impl CaseFileItemState {
    /// Every state.
    pub const ALL: [CaseFileItemState; 3] = [Self::Initial, Self::Available, Self::Discarded];

    /// Canonical SCREAMING name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "INITIAL",
            Self::Available => "AVAILABLE",
            Self::Discarded => "DISCARDED",
        }
    }

    /// Parse a canonical state name.
    pub fn from_name(name: &str) -> Result<Self, StateError> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == name)
            .ok_or_else(|| StateError::UnknownState {
                name: name.to_string(),
            })
    }

    /// Target state of `transition`, or `None` if undefined.
    pub fn next(&self, transition: FileItemTransition) -> Option<CaseFileItemState> {
        use FileItemTransition as T;
        match (self, transition) {
            (Self::Initial, T::Create) => Some(Self::Available),
            (Self::Available, T::Delete) => Some(Self::Discarded),
            (Self::Available, t) if t.is_data_change() => Some(Self::Available),
            _ => None,
        }
    }
}

impl std::fmt::Display for CaseFileItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named case-file-item transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileItemTransition {
    /// INITIAL → AVAILABLE.
    Create,
    /// A property or attachment changed.
    Update,
    /// The property set was replaced.
    Replace,
    /// A child item was attached.
    AddChild,
    /// A child item was detached.
    RemoveChild,
    /// A reference to another item was added.
    AddReference,
    /// A reference to another item was removed.
    RemoveReference,
    /// AVAILABLE → DISCARDED.
    Delete,
}

impl FileItemTransition {
    /// Every transition.
    pub const ALL: [FileItemTransition; 8] = [
        Self::Create,
        Self::Update,
        Self::Replace,
        Self::AddChild,
        Self::RemoveChild,
        Self::AddReference,
        Self::RemoveReference,
        Self::Delete,
    ];

    /// Canonical camelCase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::AddChild => "addChild",
            Self::RemoveChild => "removeChild",
            Self::AddReference => "addReference",
            Self::RemoveReference => "removeReference",
            Self::Delete => "delete",
        }
    }

    /// Parse a canonical transition name.
    pub fn from_name(name: &str) -> Result<Self, StateError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == name)
            .ok_or_else(|| StateError::UnknownTransition {
                name: name.to_string(),
            })
    }

    /// Same-state transition that only notifies observers.
    pub fn is_data_change(&self) -> bool {
        !matches!(self, Self::Create | Self::Delete)
    }
}

impl std::fmt::Display for FileItemTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
