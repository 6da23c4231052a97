//! # Case Graph
//!
//! The arena holding one case instance: plan items, sentries, on-parts and
//! the case file. Elements refer to each other by index handles
//! ([`ItemId`], [`SentryId`], [`OnPartId`], [`FileItemId`]); containers own
//! their children through the arena and children name their container by
//! handle only.
//!
//! The case root always lives at [`ItemId::ROOT`].
//!
//! ## Construction
//!
//! Builders on this type assemble the structure (`add_item`,
//! `add_sentry`, `add_on_part`, `add_file_item`). They validate the
//! invariants that must hold before the first transition: unique sibling
//! business ids, legal sentry attachment, on-parts listening for
//! transitions their source can perform. Lifecycle changes go exclusively
//! through [`CaseGraph::fire`] and the case file operations, so observer
//! notification is never bypassed.

use serde::{Deserialize, Serialize};

use cmmn_core::{CaseId, CmId};
use cmmn_state::{Category, PlanItemState, TransitionRecord};

use crate::case_file::{CaseFile, CaseFileItem};
use crate::context::ChangeEvent;
use crate::error::EngineError;
use crate::rule::Rule;
use crate::sentry::{IfPart, OnPart, OnPartSource, Sentry, SentryKind};

// ─── Handles ─────────────────────────────────────────────────────────

/// Handle of a plan item within one [`CaseGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub usize);

impl ItemId {
    /// The case root.
    pub const ROOT: ItemId = ItemId(0);
}

/// Handle of a sentry within one [`CaseGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SentryId(pub usize);

/// Handle of an on-part within one [`CaseGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OnPartId(pub usize);

/// Handle of a case file item within one [`CaseGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileItemId(pub usize);

// ─── Plan Items ──────────────────────────────────────────────────────

/// Who put an item into its suspended condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendOrigin {
    /// The item was suspended directly.
    Own,
    /// A suspending container cascaded down to the item.
    Parent,
}

/// A node of the plan-item tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanItem {
    /// Business id, unique among the container's children.
    pub cm_id: CmId,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Current lifecycle state.
    pub state: PlanItemState,
    /// State recorded when the item was suspended.
    pub state_before_suspend: Option<PlanItemState>,
    /// Whether the item is currently suspended (directly or by its container).
    pub suspended: bool,
    /// Who suspended the item.
    pub suspend_origin: Option<SuspendOrigin>,
    /// Containing stage or case root; `None` for the root.
    pub parent: Option<ItemId>,
    /// Sentries attached to this item.
    pub sentries: Vec<SentryId>,
    /// On-parts observing this item.
    pub observers: Vec<OnPartId>,
    /// Variant data.
    pub kind: PlanItemKind,
}

impl PlanItem {
    /// Lifecycle category of this item.
    pub fn category(&self) -> Category {
        self.kind.category()
    }

    /// Data-free variant discriminant.
    pub fn element(&self) -> Element {
        self.kind.element()
    }
}

/// Variant-specific plan item data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "element", rename_all = "snake_case")]
pub enum PlanItemKind {
    /// The case root.
    CaseRoot(CaseRootData),
    /// A stage.
    Stage(StageData),
    /// A human, process or case task.
    Task(TaskData),
    /// A milestone.
    Milestone(MilestoneData),
    /// An event listener.
    EventListener,
}

impl PlanItemKind {
    /// Lifecycle category.
    pub fn category(&self) -> Category {
        match self {
            Self::CaseRoot(_) => Category::Case,
            Self::Stage(_) | Self::Task(_) => Category::StageTask,
            Self::Milestone(_) | Self::EventListener => Category::EventMilestone,
        }
    }

    /// Data-free discriminant.
    pub fn element(&self) -> Element {
        match self {
            Self::CaseRoot(_) => Element::CaseRoot,
            Self::Stage(_) => Element::Stage,
            Self::Task(task) => match task.kind {
                TaskKind::Human => Element::HumanTask,
                TaskKind::Process => Element::ProcessTask,
                TaskKind::Case { .. } => Element::CaseTask,
            },
            Self::Milestone(_) => Element::Milestone,
            Self::EventListener => Element::EventListener,
        }
    }

    /// Element kind for diagnostics.
    pub fn label(&self) -> &'static str {
        self.element().label()
    }

    /// Children of a container, empty for leaves.
    pub fn children(&self) -> &[ItemId] {
        match self {
            Self::CaseRoot(root) => &root.children,
            Self::Stage(stage) => &stage.children,
            _ => &[],
        }
    }

    /// Whether the item may own children.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::CaseRoot(_) | Self::Stage(_))
    }

    /// The auto-complete flag of a container.
    pub fn auto_complete(&self) -> bool {
        match self {
            Self::CaseRoot(root) => root.auto_complete,
            Self::Stage(stage) => stage.auto_complete,
            _ => false,
        }
    }

    /// The required rule, if the variant carries one.
    pub fn required_rule(&self) -> Option<&Rule> {
        match self {
            Self::Stage(stage) => stage.required.as_ref(),
            Self::Task(task) => task.required.as_ref(),
            Self::Milestone(milestone) => milestone.required.as_ref(),
            _ => None,
        }
    }

    /// The manual activation rule, if the variant carries one.
    pub fn manual_activation_rule(&self) -> Option<&Rule> {
        match self {
            Self::Stage(stage) => stage.manual_activation.as_ref(),
            Self::Task(task) => task.manual_activation.as_ref(),
            _ => None,
        }
    }

    /// The repetition rule, if the variant carries one.
    pub fn repetition_rule(&self) -> Option<&Rule> {
        match self {
            Self::Stage(stage) => stage.repetition.as_ref(),
            Self::Task(task) => task.repetition.as_ref(),
            Self::Milestone(milestone) => milestone.repetition.as_ref(),
            _ => None,
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<ItemId>> {
        match self {
            Self::CaseRoot(root) => Some(&mut root.children),
            Self::Stage(stage) => Some(&mut stage.children),
            _ => None,
        }
    }
}

/// Plan item variant without its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    /// The case root.
    CaseRoot,
    /// A stage.
    Stage,
    /// A human task.
    HumanTask,
    /// A process task.
    ProcessTask,
    /// A case task.
    CaseTask,
    /// A milestone.
    Milestone,
    /// An event listener.
    EventListener,
}

impl Element {
    /// Human-readable kind.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CaseRoot => "case",
            Self::Stage => "stage",
            Self::HumanTask => "human task",
            Self::ProcessTask => "process task",
            Self::CaseTask => "case task",
            Self::Milestone => "milestone",
            Self::EventListener => "event listener",
        }
    }

    /// Any task kind.
    pub fn is_task(&self) -> bool {
        matches!(self, Self::HumanTask | Self::ProcessTask | Self::CaseTask)
    }

    /// A stage or any task kind.
    pub fn is_stage_or_task(&self) -> bool {
        *self == Self::Stage || self.is_task()
    }
}

/// Link from a sub-case back to the case task that started it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseTaskBinding {
    /// The case holding the case task.
    pub parent_case: CaseId,
    /// The case task's business id.
    pub task: CmId,
}

/// Case root data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseRootData {
    /// Top-level plan items, in creation order.
    pub children: Vec<ItemId>,
    /// Complete automatically once no child blocks completion.
    pub auto_complete: bool,
    /// Set when this case runs as the sub-case of a case task.
    pub case_task: Option<CaseTaskBinding>,
}

/// Stage data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageData {
    /// Contained plan items, in creation order.
    pub children: Vec<ItemId>,
    /// Complete automatically once no child blocks completion.
    pub auto_complete: bool,
    /// Whether the parent must wait for this stage.
    pub required: Option<Rule>,
    /// Whether activation waits for a manual start.
    pub manual_activation: Option<Rule>,
    /// Whether a completion starts another cycle; absent means always.
    pub repetition: Option<Rule>,
    /// Number of additional cycles allowed.
    pub max_repetitions: u32,
    /// Cycles already repeated.
    pub current_repetition: u32,
}

impl StageData {
    /// A stage with the given auto-complete flag and no rules.
    pub fn new(auto_complete: bool) -> Self {
        Self {
            auto_complete,
            ..Self::default()
        }
    }

    /// Attach a required rule.
    pub fn with_required(mut self, rule: Rule) -> Self {
        self.required = Some(rule);
        self
    }

    /// Attach a manual activation rule.
    pub fn with_manual_activation(mut self, rule: Rule) -> Self {
        self.manual_activation = Some(rule);
        self
    }

    /// Allow `max` additional cycles, optionally gated by `rule`.
    pub fn with_repetition(mut self, max: u32, rule: Option<Rule>) -> Self {
        self.max_repetitions = max;
        self.repetition = rule;
        self
    }
}

/// What starting a task runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskKind {
    /// Work done by a case worker.
    Human,
    /// An external process started through the implementation registry.
    Process,
    /// A sub-case built by the implementation registry.
    Case {
        /// The running sub-case, once started.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sub_case: Option<Box<CaseGraph>>,
    },
}

/// Task data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskData {
    /// Human, process or case task.
    pub kind: TaskKind,
    /// Non-blocking tasks complete as soon as they are created.
    pub blocking: bool,
    /// Whether the parent must wait for this task.
    pub required: Option<Rule>,
    /// Whether a new entry criterion spawns another instance.
    pub repetition: Option<Rule>,
    /// Whether activation waits for a manual start.
    pub manual_activation: Option<Rule>,
    /// Worker who claimed the task.
    pub claimant: Option<String>,
    /// Role a worker needs to claim the task.
    pub role: Option<String>,
    /// Original task, for repetition instances.
    pub instance_of: Option<ItemId>,
}

impl TaskData {
    fn of_kind(kind: TaskKind) -> Self {
        Self {
            kind,
            blocking: true,
            required: None,
            repetition: None,
            manual_activation: None,
            claimant: None,
            role: None,
            instance_of: None,
        }
    }

    /// A blocking human task.
    pub fn human() -> Self {
        Self::of_kind(TaskKind::Human)
    }

    /// A blocking process task.
    pub fn process() -> Self {
        Self::of_kind(TaskKind::Process)
    }

    /// A blocking case task.
    pub fn case() -> Self {
        Self::of_kind(TaskKind::Case { sub_case: None })
    }

    /// Make the task non-blocking.
    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self
    }

    /// Attach a required rule.
    pub fn with_required(mut self, rule: Rule) -> Self {
        self.required = Some(rule);
        self
    }

    /// Attach a repetition rule.
    pub fn with_repetition(mut self, rule: Rule) -> Self {
        self.repetition = Some(rule);
        self
    }

    /// Attach a manual activation rule.
    pub fn with_manual_activation(mut self, rule: Rule) -> Self {
        self.manual_activation = Some(rule);
        self
    }

    /// Restrict claiming to workers holding `role`.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// Milestone data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MilestoneData {
    /// Whether the container waits for this milestone.
    pub required: Option<Rule>,
    /// Whether the milestone may be reached repeatedly.
    pub repetition: Option<Rule>,
}

// ─── Case Graph ──────────────────────────────────────────────────────

/// One case instance: plan-item tree, sentry network and case file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseGraph {
    /// Case instance id.
    pub id: CaseId,
    pub(crate) items: Vec<PlanItem>,
    pub(crate) sentries: Vec<Sentry>,
    pub(crate) on_parts: Vec<OnPart>,
    pub(crate) file: CaseFile,
    pub(crate) log: Vec<TransitionRecord>,
    /// Change events of the running operation, published once it commits.
    #[serde(skip)]
    pub(crate) pending: Vec<ChangeEvent>,
    /// Nesting of `atomically` calls currently open on this graph.
    #[serde(skip)]
    pub(crate) open_operations: usize,
}

impl CaseGraph {
    /// A new case in INITIAL with an empty case file.
    pub fn new(id: CaseId, cm_id: &str, name: &str, auto_complete: bool) -> Result<Self, EngineError> {
        let root = PlanItem {
            cm_id: CmId::new(cm_id)?,
            name: name.to_string(),
            description: None,
            state: PlanItemState::Initial,
            state_before_suspend: None,
            suspended: false,
            suspend_origin: None,
            parent: None,
            sentries: Vec::new(),
            observers: Vec::new(),
            kind: PlanItemKind::CaseRoot(CaseRootData {
                auto_complete,
                ..CaseRootData::default()
            }),
        };
        Ok(Self {
            id,
            items: vec![root],
            sentries: Vec::new(),
            on_parts: Vec::new(),
            file: CaseFile::new(name),
            log: Vec::new(),
            pending: Vec::new(),
            open_operations: 0,
        })
    }

    // ── Builders ─────────────────────────────────────────────────────

    /// Append a plan item to `parent`, in INITIAL.
    pub fn add_item(
        &mut self,
        parent: ItemId,
        cm_id: &str,
        name: &str,
        kind: PlanItemKind,
    ) -> Result<ItemId, EngineError> {
        let cm_id = CmId::new(cm_id)?;
        if matches!(kind, PlanItemKind::CaseRoot(_)) {
            return Err(EngineError::NotAContainer {
                cm_id: cm_id.to_string(),
            });
        }
        let container = self.item(parent)?;
        if !container.kind.is_container() {
            return Err(EngineError::NotAContainer {
                cm_id: container.cm_id.to_string(),
            });
        }
        if self.child_by_cm_id(parent, cm_id.as_str()).is_some() {
            return Err(EngineError::DuplicateChildId {
                container: container.cm_id.to_string(),
                cm_id: cm_id.to_string(),
            });
        }
        let id = ItemId(self.items.len());
        self.items.push(PlanItem {
            cm_id,
            name: name.to_string(),
            description: None,
            state: PlanItemState::Initial,
            state_before_suspend: None,
            suspended: false,
            suspend_origin: None,
            parent: Some(parent),
            sentries: Vec::new(),
            observers: Vec::new(),
            kind,
        });
        if let Some(children) = self.items[parent.0].kind.children_mut() {
            children.push(id);
        }
        Ok(id)
    }

    /// Set an item's description.
    pub fn set_description(&mut self, item: ItemId, description: impl Into<String>) -> Result<(), EngineError> {
        self.item_mut(item)?.description = Some(description.into());
        Ok(())
    }

    /// Add a case file item in INITIAL.
    pub fn add_file_item(&mut self, cm_id: &str, name: &str) -> Result<FileItemId, EngineError> {
        self.file.insert(CaseFileItem::new(CmId::new(cm_id)?, name))
    }

    /// Attach a sentry to `item`.
    ///
    /// Entry sentries may not attach to the case root or an event listener;
    /// exit sentries may not attach to a milestone or an event listener.
    pub fn add_sentry(
        &mut self,
        cm_id: &str,
        kind: SentryKind,
        item: ItemId,
    ) -> Result<SentryId, EngineError> {
        let cm_id = CmId::new(cm_id)?;
        let target = self.item(item)?;
        let illegal = match kind {
            SentryKind::Entry => matches!(
                target.kind,
                PlanItemKind::CaseRoot(_) | PlanItemKind::EventListener
            ),
            SentryKind::Exit => matches!(
                target.kind,
                PlanItemKind::Milestone(_) | PlanItemKind::EventListener
            ),
        };
        if illegal {
            return Err(EngineError::InvalidSentryAttachment {
                sentry: cm_id.to_string(),
                kind: kind.as_str(),
                item: target.cm_id.to_string(),
                element: target.kind.label(),
            });
        }
        let id = SentryId(self.sentries.len());
        self.sentries.push(Sentry::new(cm_id, kind, item));
        self.items[item.0].sentries.push(id);
        Ok(id)
    }

    /// Name a sentry.
    pub fn set_sentry_name(&mut self, sentry: SentryId, name: impl Into<String>) -> Result<(), EngineError> {
        self.sentry_mut(sentry)?.name = Some(name.into());
        Ok(())
    }

    /// Add an on-part to `sentry` and register it as an observer of its source.
    pub fn add_on_part(&mut self, sentry: SentryId, source: OnPartSource) -> Result<OnPartId, EngineError> {
        self.sentry(sentry)?;
        match source {
            OnPartSource::Element { item, transition } => {
                let subject = self.item(item)?;
                let category = subject.category();
                if !category.recognizes(transition) {
                    return Err(EngineError::CategoryMismatch {
                        subject: subject.cm_id.to_string(),
                        category: category.as_str(),
                        transition: transition.as_str(),
                    });
                }
            }
            OnPartSource::FileItem { item, .. } => {
                self.file_item(item)?;
            }
        }
        let id = OnPartId(self.on_parts.len());
        self.on_parts.push(OnPart::new(sentry, source));
        self.sentries[sentry.0].on_parts.push(id);
        self.register_observer(source, id)?;
        Ok(id)
    }

    /// Set (or replace) the if-part of `sentry`.
    pub fn set_if_part(&mut self, sentry: SentryId, if_part: IfPart) -> Result<(), EngineError> {
        self.file_item(if_part.context)?;
        self.sentry_mut(sentry)?.if_part = Some(if_part);
        Ok(())
    }

    /// Register `on_part` as an additional observer of `item`.
    pub fn add_observer(&mut self, item: ItemId, on_part: OnPartId) -> Result<(), EngineError> {
        self.on_part(on_part)?;
        let observers = &mut self.item_mut(item)?.observers;
        if !observers.contains(&on_part) {
            observers.push(on_part);
        }
        Ok(())
    }

    fn register_observer(&mut self, source: OnPartSource, on_part: OnPartId) -> Result<(), EngineError> {
        match source {
            OnPartSource::Element { item, .. } => self.item_mut(item)?.observers.push(on_part),
            OnPartSource::FileItem { item, .. } => self.file_item_mut(item)?.observers.push(on_part),
        }
        Ok(())
    }

    // ── Lookups ──────────────────────────────────────────────────────

    /// The case root.
    pub fn root(&self) -> &PlanItem {
        &self.items[ItemId::ROOT.0]
    }

    /// Business id of the case root.
    pub fn cm_id(&self) -> &CmId {
        &self.root().cm_id
    }

    /// Lifecycle state of the case root.
    pub fn root_state(&self) -> PlanItemState {
        self.root().state
    }

    /// Plan item by handle.
    pub fn item(&self, id: ItemId) -> Result<&PlanItem, EngineError> {
        self.items.get(id.0).ok_or(EngineError::UnknownItem { id: id.0 })
    }

    pub(crate) fn item_mut(&mut self, id: ItemId) -> Result<&mut PlanItem, EngineError> {
        self.items.get_mut(id.0).ok_or(EngineError::UnknownItem { id: id.0 })
    }

    /// Lifecycle state by handle.
    pub fn state(&self, id: ItemId) -> Result<PlanItemState, EngineError> {
        Ok(self.item(id)?.state)
    }

    /// Children of a container (empty for leaves).
    pub fn children(&self, id: ItemId) -> Result<&[ItemId], EngineError> {
        Ok(self.item(id)?.kind.children())
    }

    /// Sentry by handle.
    pub fn sentry(&self, id: SentryId) -> Result<&Sentry, EngineError> {
        self.sentries.get(id.0).ok_or(EngineError::UnknownSentry { id: id.0 })
    }

    /// Number of sentries, including those of repetition instances.
    pub fn sentry_count(&self) -> usize {
        self.sentries.len()
    }

    pub(crate) fn sentry_mut(&mut self, id: SentryId) -> Result<&mut Sentry, EngineError> {
        self.sentries.get_mut(id.0).ok_or(EngineError::UnknownSentry { id: id.0 })
    }

    /// On-part by handle.
    pub fn on_part(&self, id: OnPartId) -> Result<&OnPart, EngineError> {
        self.on_parts.get(id.0).ok_or(EngineError::UnknownOnPart { id: id.0 })
    }

    pub(crate) fn on_part_mut(&mut self, id: OnPartId) -> Result<&mut OnPart, EngineError> {
        self.on_parts.get_mut(id.0).ok_or(EngineError::UnknownOnPart { id: id.0 })
    }

    /// Case file item by handle.
    pub fn file_item(&self, id: FileItemId) -> Result<&CaseFileItem, EngineError> {
        self.file.get(id)
    }

    pub(crate) fn file_item_mut(&mut self, id: FileItemId) -> Result<&mut CaseFileItem, EngineError> {
        self.file.get_mut(id)
    }

    /// The case file.
    pub fn case_file(&self) -> &CaseFile {
        &self.file
    }

    /// Case file item by business id.
    pub fn find_file_item(&self, cm_id: &str) -> Option<FileItemId> {
        self.file.find(cm_id)
    }

    /// Transition log, oldest first.
    pub fn log(&self) -> &[TransitionRecord] {
        &self.log
    }

    /// Direct child of `container` with business id `cm_id`.
    pub fn child_by_cm_id(&self, container: ItemId, cm_id: &str) -> Option<ItemId> {
        self.items
            .get(container.0)?
            .kind
            .children()
            .iter()
            .copied()
            .find(|c| self.items[c.0].cm_id.as_str() == cm_id)
    }

    /// Plan items reachable from the root, in tree order (pre-order).
    pub fn walk(&self) -> Vec<ItemId> {
        self.walk_from(ItemId::ROOT)
    }

    /// `id` and its descendants, in tree order.
    pub fn walk_from(&self, id: ItemId) -> Vec<ItemId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(item) = self.items.get(next.0) else {
                continue;
            };
            out.push(next);
            stack.extend(item.kind.children().iter().rev().copied());
        }
        out
    }

    /// First plan item in tree order with business id `cm_id`.
    pub fn find(&self, cm_id: &str) -> Option<ItemId> {
        self.walk()
            .into_iter()
            .find(|id| self.items[id.0].cm_id.as_str() == cm_id)
    }

    /// Like [`find`](Self::find), failing with `UnknownCmId`.
    pub fn require(&self, cm_id: &str) -> Result<ItemId, EngineError> {
        self.find(cm_id).ok_or_else(|| EngineError::UnknownCmId {
            cm_id: cm_id.to_string(),
        })
    }

    /// Remove `id` from its container's children and clear its parent link.
    /// The item stays in the arena but is no longer reachable from the root,
    /// and the on-parts of its sentries stop observing their sources.
    pub(crate) fn detach(&mut self, id: ItemId) -> Result<(), EngineError> {
        let Some(parent) = self.item(id)?.parent else {
            return Ok(());
        };
        if let Some(children) = self.item_mut(parent)?.kind.children_mut() {
            children.retain(|c| *c != id);
        }
        self.item_mut(id)?.parent = None;

        for sentry in self.item(id)?.sentries.clone() {
            for on_part in self.sentry(sentry)?.on_parts.clone() {
                let source = self.on_part(on_part)?.source;
                let observers = match source {
                    OnPartSource::Element { item, .. } => &mut self.item_mut(item)?.observers,
                    OnPartSource::FileItem { item, .. } => &mut self.file_item_mut(item)?.observers,
                };
                observers.retain(|o| *o != on_part);
            }
        }
        Ok(())
    }

    /// Bind this case as the sub-case of a case task.
    pub fn bind_to_case_task(&mut self, binding: CaseTaskBinding) {
        if let PlanItemKind::CaseRoot(root) = &mut self.items[ItemId::ROOT.0].kind {
            root.case_task = Some(binding);
        }
    }

    /// The case task this case runs under, if any.
    pub fn case_task(&self) -> Option<&CaseTaskBinding> {
        match &self.root().kind {
            PlanItemKind::CaseRoot(root) => root.case_task.as_ref(),
            _ => None,
        }
    }

    /// The running sub-case of a case task.
    pub fn sub_case(&self, task: ItemId) -> Result<&CaseGraph, EngineError> {
        let item = self.item(task)?;
        match &item.kind {
            PlanItemKind::Task(TaskData {
                kind: TaskKind::Case {
                    sub_case: Some(sub),
                },
                ..
            }) => Ok(&**sub),
            _ => Err(EngineError::NoSubCase {
                task: item.cm_id.to_string(),
            }),
        }
    }

    pub(crate) fn sub_case_mut(&mut self, task: ItemId) -> Result<&mut CaseGraph, EngineError> {
        let item = self.item_mut(task)?;
        let cm_id = item.cm_id.to_string();
        match &mut item.kind {
            PlanItemKind::Task(TaskData {
                kind: TaskKind::Case {
                    sub_case: Some(sub),
                },
                ..
            }) => Ok(&mut **sub),
            _ => Err(EngineError::NoSubCase { task: cm_id }),
        }
    }
}
