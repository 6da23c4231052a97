//! # Sentries, On-Parts and If-Parts
//!
//! A sentry gates one plan item. It holds any number of on-parts, each
//! observing one source (a plan item or a case file item) for one
//! transition, and at most one if-part, a named predicate over a case file
//! item.
//!
//! ## Criteria
//!
//! A sentry's criteria hold iff every on-part is satisfied (vacuously true
//! for none) AND the if-part evaluates true (vacuously true if absent).
//!
//! ## Notification
//!
//! Each notification from a source sets the observing on-part's satisfied
//! flag to whether the notified transition is the one it listens for, then
//! re-checks the owning sentry. A satisfied sentry runs its action:
//!
//! - **Entry**: an AVAILABLE milestone occurs; an AVAILABLE stage or task is
//!   enabled (manual activation) or started. A task past AVAILABLE that is
//!   repeatable spawns a repetition instance. Finally an INITIAL parent
//!   stage is created.
//! - **Exit**: an ACTIVE case root terminates; an ACTIVE stage or task exits.
//!
//! A sentry whose action is still running ignores notifications caused by
//! that action.

use serde::{Deserialize, Serialize};

use cmmn_core::CmId;
use cmmn_state::{FileItemTransition, PlanItemState, Transition};

use crate::engine::Cascade;
use crate::error::EngineError;
use crate::graph::{Element, FileItemId, ItemId, OnPartId, SentryId};

// ─── Types ───────────────────────────────────────────────────────────

/// Entry or exit criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentryKind {
    /// Gates activation.
    Entry,
    /// Gates termination.
    Exit,
}

impl SentryKind {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
        }
    }
}

/// A readiness gate attached to one plan item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentry {
    /// Business id.
    pub cm_id: CmId,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Entry or exit.
    pub kind: SentryKind,
    /// The gated plan item.
    pub attached_to: ItemId,
    /// Observers composing the criteria.
    pub on_parts: Vec<OnPartId>,
    /// Optional guard.
    pub if_part: Option<IfPart>,
    /// Result of the last criteria check.
    pub satisfied: bool,
    #[serde(skip)]
    pub(crate) firing: bool,
}

impl Sentry {
    pub(crate) fn new(cm_id: CmId, kind: SentryKind, attached_to: ItemId) -> Self {
        Self {
            cm_id,
            name: None,
            kind,
            attached_to,
            on_parts: Vec::new(),
            if_part: None,
            satisfied: false,
            firing: false,
        }
    }
}

/// Named predicate guarding a sentry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IfPart {
    /// Registered predicate name.
    pub predicate: String,
    /// Case file item passed to the predicate.
    pub context: FileItemId,
}

impl IfPart {
    /// Bind `predicate` to `context`.
    pub fn new(predicate: impl Into<String>, context: FileItemId) -> Self {
        Self {
            predicate: predicate.into(),
            context,
        }
    }
}

/// What an on-part observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum OnPartSource {
    /// A plan item transition.
    Element {
        /// Observed plan item.
        item: ItemId,
        /// Awaited transition.
        transition: Transition,
    },
    /// A case file item transition.
    FileItem {
        /// Observed case file item.
        item: FileItemId,
        /// Awaited transition.
        transition: FileItemTransition,
    },
}

impl OnPartSource {
    /// Whether a notification carrying `signal` is the awaited one.
    pub(crate) fn listens_for(&self, signal: Signal) -> bool {
        match (self, signal) {
            (Self::Element { transition, .. }, Signal::Element(t)) => *transition == t,
            (Self::FileItem { transition, .. }, Signal::FileItem(t)) => *transition == t,
            _ => false,
        }
    }
}

/// Observer binding a sentry to one source transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnPart {
    /// Owning sentry.
    pub sentry: SentryId,
    /// Observed source and awaited transition.
    pub source: OnPartSource,
    /// Whether the last notification was the awaited transition.
    pub satisfied: bool,
}

impl OnPart {
    pub(crate) fn new(sentry: SentryId, source: OnPartSource) -> Self {
        Self {
            sentry,
            source,
            satisfied: false,
        }
    }
}

/// Transition delivered to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Element(Transition),
    FileItem(FileItemTransition),
}

impl Signal {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Element(t) => t.as_str(),
            Self::FileItem(t) => t.as_str(),
        }
    }
}

// ─── Evaluation ──────────────────────────────────────────────────────

impl Cascade<'_, '_> {
    /// Deliver `signal` to each observer, in registration order.
    pub(crate) fn notify(&mut self, observers: Vec<OnPartId>, signal: Signal) -> Result<(), EngineError> {
        for on_part in observers {
            self.update_on_part(on_part, signal)?;
        }
        Ok(())
    }

    fn update_on_part(&mut self, id: OnPartId, signal: Signal) -> Result<(), EngineError> {
        let on_part = self.graph.on_part_mut(id)?;
        on_part.satisfied = on_part.source.listens_for(signal);
        let sentry = on_part.sentry;
        self.check_criteria(sentry)
    }

    /// Whether every on-part is satisfied and the if-part holds.
    pub(crate) fn criteria_hold(&self, id: SentryId) -> Result<bool, EngineError> {
        let sentry = self.graph.sentry(id)?;
        for on_part in &sentry.on_parts {
            if !self.graph.on_part(*on_part)?.satisfied {
                return Ok(false);
            }
        }
        match &sentry.if_part {
            Some(if_part) => self.evaluate(&if_part.predicate, if_part.context),
            None => Ok(true),
        }
    }

    /// Whether `item` may proceed past AVAILABLE on creation: it has no entry
    /// sentry, or one of its entry sentries holds.
    pub(crate) fn entry_gate_open(&self, item: ItemId) -> Result<bool, EngineError> {
        let mut gated = false;
        for sentry in &self.graph.item(item)?.sentries {
            if self.graph.sentry(*sentry)?.kind != SentryKind::Entry {
                continue;
            }
            if self.criteria_hold(*sentry)? {
                return Ok(true);
            }
            gated = true;
        }
        Ok(!gated)
    }

    fn check_criteria(&mut self, id: SentryId) -> Result<(), EngineError> {
        if self.graph.sentry(id)?.firing {
            return Ok(());
        }
        let satisfied = self.criteria_hold(id)?;
        let case_id = self.graph.id;
        let sentry = self.graph.sentry_mut(id)?;
        sentry.satisfied = satisfied;
        if !satisfied {
            return Ok(());
        }
        sentry.firing = true;
        let (kind, item) = (sentry.kind, sentry.attached_to);
        tracing::debug!(
            case = %case_id,
            sentry = %sentry.cm_id,
            kind = kind.as_str(),
            "sentry satisfied"
        );
        metrics::counter!("cmmn_sentries_fired_total", "kind" => kind.as_str()).increment(1);

        let result = match kind {
            SentryKind::Entry => self.entry_action(item),
            SentryKind::Exit => self.exit_action(item),
        };
        self.graph.sentry_mut(id)?.firing = false;
        result
    }

    fn entry_action(&mut self, id: ItemId) -> Result<(), EngineError> {
        let item = self.graph.item(id)?;
        let (element, state, parent) = (item.element(), item.state, item.parent);

        match (element, state) {
            (Element::Milestone, PlanItemState::Available) => {
                self.transition(id, Transition::Occur)?;
            }
            (e, PlanItemState::Available) if e.is_stage_or_task() => {
                let next = if self.is_manual(id)? {
                    Transition::Enable
                } else {
                    Transition::Start
                };
                self.transition(id, next)?;
            }
            (e, s) if e.is_task() && s != PlanItemState::Initial => {
                if self.is_repeatable(id)? {
                    self.spawn_repetition(id)?;
                }
            }
            _ => {}
        }

        if let Some(parent) = parent {
            let container = self.graph.item(parent)?;
            if container.element() == Element::Stage && container.state == PlanItemState::Initial {
                self.transition(parent, Transition::Create)?;
            }
        }
        Ok(())
    }

    fn exit_action(&mut self, id: ItemId) -> Result<(), EngineError> {
        let item = self.graph.item(id)?;
        if item.state != PlanItemState::Active {
            return Ok(());
        }
        let transition = match item.element() {
            Element::CaseRoot => Transition::Terminate,
            e if e.is_stage_or_task() => Transition::Exit,
            _ => return Ok(()),
        };
        self.transition(id, transition)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_part_listens_for_exact_transition() {
        let source = OnPartSource::Element {
            item: ItemId(1),
            transition: Transition::Complete,
        };
        assert!(source.listens_for(Signal::Element(Transition::Complete)));
        assert!(!source.listens_for(Signal::Element(Transition::Start)));
        assert!(!source.listens_for(Signal::FileItem(FileItemTransition::Create)));
    }

    #[test]
    fn test_file_on_part_listens_for_file_transition() {
        let source = OnPartSource::FileItem {
            item: FileItemId(0),
            transition: FileItemTransition::Update,
        };
        assert!(source.listens_for(Signal::FileItem(FileItemTransition::Update)));
        assert!(!source.listens_for(Signal::Element(Transition::Create)));
    }

    #[test]
    fn test_sentry_kind_names() {
        assert_eq!(SentryKind::Entry.as_str(), "entry");
        assert_eq!(SentryKind::Exit.as_str(), "exit");
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(Signal::Element(Transition::ManualStart).as_str(), "manualStart");
        assert_eq!(Signal::FileItem(FileItemTransition::AddChild).as_str(), "addChild");
    }
}
