//! # Case File
//!
//! The case's data: named items holding typed properties, attachments,
//! child items and references. Each item has its own small lifecycle
//! (INITIAL → AVAILABLE → DISCARDED) and is observed by the on-parts that
//! listen to it.
//!
//! ## Operations
//!
//! Every data operation fires its lifecycle transition so observers learn
//! about the change. An operation on an item that is not AVAILABLE (or, for
//! `create`, not INITIAL) reports `Disallowed` and leaves the data as it
//! was.
//!
//! | Operation               | Transition        |
//! |-------------------------|-------------------|
//! | `create_file_item`      | `create`          |
//! | `set_property`          | `update`          |
//! | `replace_properties`    | `replace`         |
//! | `add_attachment`        | `update`          |
//! | `add_file_child`        | `addChild`        |
//! | `remove_file_child`     | `removeChild`     |
//! | `add_file_reference`    | `addReference`    |
//! | `remove_file_reference` | `removeReference` |
//! | `delete_file_item`      | `delete`          |

use serde::{Deserialize, Serialize};

use cmmn_core::{CmId, Timestamp};
use cmmn_state::{CaseFileItemState, FileItemTransition, TransitionOutcome};

use crate::context::{ExecutionContext, Subject};
use crate::engine::Cascade;
use crate::error::EngineError;
use crate::graph::{CaseGraph, FileItemId, OnPartId};
use crate::sentry::Signal;

/// Outcome of a case file operation.
pub type FileOutcome = TransitionOutcome<CaseFileItemState>;

// ─── Properties ──────────────────────────────────────────────────────

/// Declared type of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    String,
    Boolean,
    Integer,
    Decimal,
    DateTime,
    Date,
    Time,
}

/// A typed name/value pair. Values are stored in their textual form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Property name, unique within its item.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub kind: PropertyType,
    /// Textual value.
    pub value: String,
}

impl Property {
    /// A property of any type.
    pub fn new(name: impl Into<String>, kind: PropertyType, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            value: value.into(),
        }
    }

    /// A string property.
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, PropertyType::String, value)
    }

    /// A boolean property.
    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Self::new(name, PropertyType::Boolean, value.to_string())
    }

    /// An integer property.
    pub fn integer(name: impl Into<String>, value: i64) -> Self {
        Self::new(name, PropertyType::Integer, value.to_string())
    }

    /// The value as a boolean, if it is declared and parses as one.
    pub fn as_bool(&self) -> Option<bool> {
        match self.kind {
            PropertyType::Boolean => self.value.parse().ok(),
            _ => None,
        }
    }

    /// The value as an integer, if it is declared and parses as one.
    pub fn as_i64(&self) -> Option<i64> {
        match self.kind {
            PropertyType::Integer => self.value.parse().ok(),
            _ => None,
        }
    }

    /// The value as a float, for integer and decimal properties.
    pub fn as_f64(&self) -> Option<f64> {
        match self.kind {
            PropertyType::Integer | PropertyType::Decimal => self.value.parse().ok(),
            _ => None,
        }
    }

    /// The value as a UTC timestamp, for date-time properties.
    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self.kind {
            PropertyType::DateTime => Timestamp::parse(&self.value).ok(),
            _ => None,
        }
    }
}

/// Binary content attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub created_on: Timestamp,
    pub created_by: String,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl Attachment {
    /// An attachment holding `data`, created now.
    pub fn new(
        name: impl Into<String>,
        media_type: impl Into<String>,
        created_by: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            size: data.len() as u64,
            path: None,
            created_on: Timestamp::now(),
            created_by: created_by.into(),
            data,
        }
    }
}

// ─── Items ───────────────────────────────────────────────────────────

/// One record of case data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseFileItem {
    /// Business id, unique within the case file.
    pub cm_id: CmId,
    /// Display name.
    pub name: String,
    /// Lifecycle state.
    pub state: CaseFileItemState,
    /// Typed properties, in insertion order.
    pub properties: Vec<Property>,
    /// Attachments, in insertion order.
    pub attachments: Vec<Attachment>,
    /// Containing item, if any.
    pub parent: Option<FileItemId>,
    /// Contained items.
    pub children: Vec<FileItemId>,
    /// Referenced items.
    pub references: Vec<FileItemId>,
    /// On-parts observing this item.
    pub observers: Vec<OnPartId>,
}

impl CaseFileItem {
    /// An empty item in INITIAL.
    pub fn new(cm_id: CmId, name: &str) -> Self {
        Self {
            cm_id,
            name: name.to_string(),
            state: CaseFileItemState::Initial,
            properties: Vec::new(),
            attachments: Vec::new(),
            parent: None,
            children: Vec::new(),
            references: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Property `name`, if set.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Insert `property`, replacing any property of the same name.
    pub fn upsert_property(&mut self, property: Property) {
        match self.properties.iter_mut().find(|p| p.name == property.name) {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
    }
}

/// The items of one case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseFile {
    /// Display name (the case's name).
    pub name: String,
    items: Vec<CaseFileItem>,
}

impl CaseFile {
    /// An empty case file.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            items: Vec::new(),
        }
    }

    /// Add `item`, rejecting a business id already in use.
    pub fn insert(&mut self, item: CaseFileItem) -> Result<FileItemId, EngineError> {
        if self.find(item.cm_id.as_str()).is_some() {
            return Err(EngineError::DuplicateFileItemId {
                cm_id: item.cm_id.to_string(),
            });
        }
        self.items.push(item);
        Ok(FileItemId(self.items.len() - 1))
    }

    /// Item `id`.
    pub fn get(&self, id: FileItemId) -> Result<&CaseFileItem, EngineError> {
        self.items
            .get(id.0)
            .ok_or(EngineError::UnknownFileItem { id: id.0 })
    }

    pub(crate) fn get_mut(&mut self, id: FileItemId) -> Result<&mut CaseFileItem, EngineError> {
        self.items
            .get_mut(id.0)
            .ok_or(EngineError::UnknownFileItem { id: id.0 })
    }

    /// Handle of the item with business id `cm_id`.
    pub fn find(&self, cm_id: &str) -> Option<FileItemId> {
        self.items
            .iter()
            .position(|item| item.cm_id.as_str() == cm_id)
            .map(FileItemId)
    }

    /// Every item, in insertion order.
    pub fn items(&self) -> &[CaseFileItem] {
        &self.items
    }
}

// ─── Operations ──────────────────────────────────────────────────────

impl CaseGraph {
    /// Create file item `id` (INITIAL → AVAILABLE).
    pub fn create_file_item(&mut self, ctx: &ExecutionContext, id: FileItemId) -> Result<FileOutcome, EngineError> {
        self.file_operation(ctx, id, FileItemTransition::Create, |_| Ok(()))
    }

    /// Set one property, replacing any of the same name.
    pub fn set_property(
        &mut self,
        ctx: &ExecutionContext,
        id: FileItemId,
        property: Property,
    ) -> Result<FileOutcome, EngineError> {
        self.file_operation(ctx, id, FileItemTransition::Update, |graph| {
            graph.file_item_mut(id)?.upsert_property(property);
            Ok(())
        })
    }

    /// Replace every property.
    pub fn replace_properties(
        &mut self,
        ctx: &ExecutionContext,
        id: FileItemId,
        properties: Vec<Property>,
    ) -> Result<FileOutcome, EngineError> {
        self.file_operation(ctx, id, FileItemTransition::Replace, |graph| {
            graph.file_item_mut(id)?.properties = properties;
            Ok(())
        })
    }

    /// Append an attachment.
    pub fn add_attachment(
        &mut self,
        ctx: &ExecutionContext,
        id: FileItemId,
        attachment: Attachment,
    ) -> Result<FileOutcome, EngineError> {
        self.file_operation(ctx, id, FileItemTransition::Update, |graph| {
            graph.file_item_mut(id)?.attachments.push(attachment);
            Ok(())
        })
    }

    /// Make `child` a child of `parent`, moving it from any previous parent.
    /// Fails with `FileItemCycle` if `child` is `parent` or one of its
    /// ancestors.
    pub fn add_file_child(
        &mut self,
        ctx: &ExecutionContext,
        parent: FileItemId,
        child: FileItemId,
    ) -> Result<FileOutcome, EngineError> {
        self.file_operation(ctx, parent, FileItemTransition::AddChild, |graph| {
            let mut ancestor = Some(parent);
            while let Some(id) = ancestor {
                if id == child {
                    return Err(EngineError::FileItemCycle {
                        parent: graph.file_item(parent)?.cm_id.to_string(),
                        child: graph.file_item(child)?.cm_id.to_string(),
                    });
                }
                ancestor = graph.file_item(id)?.parent;
            }
            if let Some(previous) = graph.file_item(child)?.parent.filter(|p| *p != parent) {
                graph.file_item_mut(previous)?.children.retain(|c| *c != child);
            }
            graph.file_item_mut(child)?.parent = Some(parent);
            let children = &mut graph.file_item_mut(parent)?.children;
            if !children.contains(&child) {
                children.push(child);
            }
            Ok(())
        })
    }

    /// Detach `child` from `parent`.
    pub fn remove_file_child(
        &mut self,
        ctx: &ExecutionContext,
        parent: FileItemId,
        child: FileItemId,
    ) -> Result<FileOutcome, EngineError> {
        self.file_operation(ctx, parent, FileItemTransition::RemoveChild, |graph| {
            let item = graph.file_item_mut(child)?;
            if item.parent == Some(parent) {
                item.parent = None;
            }
            graph.file_item_mut(parent)?.children.retain(|c| *c != child);
            Ok(())
        })
    }

    /// Add a reference from `id` to `target`.
    pub fn add_file_reference(
        &mut self,
        ctx: &ExecutionContext,
        id: FileItemId,
        target: FileItemId,
    ) -> Result<FileOutcome, EngineError> {
        self.file_operation(ctx, id, FileItemTransition::AddReference, |graph| {
            graph.file_item(target)?;
            let references = &mut graph.file_item_mut(id)?.references;
            if !references.contains(&target) {
                references.push(target);
            }
            Ok(())
        })
    }

    /// Remove the reference from `id` to `target`.
    pub fn remove_file_reference(
        &mut self,
        ctx: &ExecutionContext,
        id: FileItemId,
        target: FileItemId,
    ) -> Result<FileOutcome, EngineError> {
        self.file_operation(ctx, id, FileItemTransition::RemoveReference, |graph| {
            graph.file_item_mut(id)?.references.retain(|r| *r != target);
            Ok(())
        })
    }

    /// Discard item `id` (AVAILABLE → DISCARDED). Its data is kept.
    pub fn delete_file_item(&mut self, ctx: &ExecutionContext, id: FileItemId) -> Result<FileOutcome, EngineError> {
        self.file_operation(ctx, id, FileItemTransition::Delete, |_| Ok(()))
    }

    fn file_operation(
        &mut self,
        ctx: &ExecutionContext,
        id: FileItemId,
        transition: FileItemTransition,
        change: impl FnOnce(&mut CaseGraph) -> Result<(), EngineError>,
    ) -> Result<FileOutcome, EngineError> {
        let outcome = self.atomically(|graph| {
            let state = graph.file_item(id)?.state;
            if state.next(transition).is_none() {
                tracing::debug!(
                    case = %graph.id,
                    item = %graph.file_item(id)?.cm_id,
                    state = state.as_str(),
                    transition = transition.as_str(),
                    "file transition not defined for state"
                );
                return Ok(FileOutcome::Disallowed {
                    state,
                    transition: transition.as_str(),
                });
            }
            change(graph)?;
            Cascade::new(graph, ctx).file_transition(id, transition)
        })?;
        self.flush_events(ctx);
        Ok(outcome)
    }
}

impl Cascade<'_, '_> {
    /// Apply `transition` to file item `id` and notify its observers.
    pub(crate) fn file_transition(
        &mut self,
        id: FileItemId,
        transition: FileItemTransition,
    ) -> Result<FileOutcome, EngineError> {
        let item = self.graph.file_item_mut(id)?;
        let from = item.state;
        let Some(to) = from.next(transition) else {
            return Ok(FileOutcome::Disallowed {
                state: from,
                transition: transition.as_str(),
            });
        };
        item.state = to;
        let cm_id = item.cm_id.to_string();
        let observers = item.observers.clone();

        tracing::debug!(
            case = %self.graph.id,
            item = %cm_id,
            transition = transition.as_str(),
            from = from.as_str(),
            to = to.as_str(),
            "file transition applied"
        );
        metrics::counter!(
            "cmmn_transitions_total",
            "category" => "case-file-item",
            "transition" => transition.as_str()
        )
        .increment(1);
        self.record(Subject::FileItem(id), cm_id, transition.as_str(), from.as_str(), to.as_str());
        self.notify(observers, Signal::FileItem(transition))?;
        Ok(FileOutcome::Applied { from, to })
    }
}
