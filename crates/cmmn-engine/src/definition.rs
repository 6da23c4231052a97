//! # Case Definitions (Blueprints)
//!
//! A blueprint is a YAML case definition that the assembler turns into a
//! fresh [`CaseGraph`] per case instance:
//!
//! ```yaml
//! id: release
//! name: Component Release
//! auto_complete: true
//! file_items:
//!   - id: specs
//!     properties:
//!       - { name: approved, type: boolean, value: "false" }
//! predicates:
//!   - { name: approved, property: approved, op: equals, value: "true" }
//! plan_items:
//!   - id: review
//!     kind: human_task
//!     required: { predicate: always, context: specs }
//! sentries:
//!   - id: afterReview
//!     kind: entry
//!     item: publish
//!     on_parts:
//!       - { item: review, transition: complete }
//!     if_part: { predicate: approved, context: specs }
//! ```
//!
//! Plan items are addressed by business id, resolved in tree order; the
//! first match wins. Every reference is checked when the blueprint is
//! loaded, so a blueprint that loads always instantiates.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use cmmn_core::CaseId;
use cmmn_state::{FileItemTransition, Transition};

use crate::case_file::{CaseFileItem, Property};
use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::graph::{CaseGraph, FileItemId, ItemId, MilestoneData, PlanItemKind, StageData, TaskData};
use crate::rule::{PredicateRegistry, Rule};
use crate::sentry::{IfPart, OnPartSource, SentryKind};

// ─── Definition types ────────────────────────────────────────────────

/// A whole case: its file, plan, sentries, predicates and sub-cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseDefinition {
    /// Business id of the case root.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether the case completes on its own.
    #[serde(default)]
    pub auto_complete: bool,
    #[serde(default)]
    pub file_items: Vec<FileItemDef>,
    #[serde(default)]
    pub predicates: Vec<PredicateDef>,
    #[serde(default)]
    pub plan_items: Vec<PlanItemDef>,
    #[serde(default)]
    pub sentries: Vec<SentryDef>,
    #[serde(default)]
    pub sub_cases: Vec<SubCaseDef>,
}

/// A case file item and its initial properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileItemDef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
}

/// Plan item element kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanItemKindDef {
    Stage,
    HumanTask,
    ProcessTask,
    CaseTask,
    Milestone,
    EventListener,
}

/// A plan item; only stages have children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanItemDef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: PlanItemKindDef,
    /// Stages only.
    #[serde(default)]
    pub auto_complete: bool,
    /// Tasks only.
    #[serde(default = "default_blocking")]
    pub blocking: bool,
    #[serde(default)]
    pub required: Option<RuleDef>,
    #[serde(default)]
    pub manual_activation: Option<RuleDef>,
    #[serde(default)]
    pub repetition: Option<RuleDef>,
    /// Stages only: further cycles after the first.
    #[serde(default)]
    pub max_repetitions: u32,
    /// Tasks only.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub children: Vec<PlanItemDef>,
}

fn default_blocking() -> bool {
    true
}

/// A predicate bound to a case file item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDef {
    pub predicate: String,
    /// Business id of the case file item.
    pub context: String,
}

/// A sentry and its parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SentryDef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub kind: SentryKind,
    /// Business id of the gated plan item.
    pub item: String,
    #[serde(default)]
    pub on_parts: Vec<OnPartDef>,
    #[serde(default)]
    pub if_part: Option<RuleDef>,
}

/// One on-part: exactly one of `item` and `file_item`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OnPartDef {
    #[serde(default)]
    pub item: Option<String>,
    #[serde(default)]
    pub file_item: Option<String>,
    /// Transition name (`complete`, `manualStart`, `update`, …).
    pub transition: String,
}

/// Property comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Equals,
    NotEquals,
    Present,
    Absent,
}

/// A predicate comparing one property of its context item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredicateDef {
    pub name: String,
    pub property: String,
    pub op: ComparisonOp,
    #[serde(default)]
    pub value: Option<String>,
}

impl PredicateDef {
    /// Evaluate against `item`.
    pub fn matches(&self, item: &CaseFileItem) -> bool {
        let actual = item.property(&self.property).map(|p| p.value.as_str());
        match self.op {
            ComparisonOp::Present => actual.is_some(),
            ComparisonOp::Absent => actual.is_none(),
            ComparisonOp::Equals => actual.is_some() && actual == self.value.as_deref(),
            ComparisonOp::NotEquals => actual.is_none() || actual != self.value.as_deref(),
        }
    }
}

/// The case run by a case task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubCaseDef {
    /// Business id of the case task.
    pub task: String,
    pub case: CaseDefinition,
}

// ─── Blueprint ───────────────────────────────────────────────────────

/// A validated case definition.
#[derive(Debug, Clone)]
pub struct Blueprint {
    definition: Arc<CaseDefinition>,
}

impl Blueprint {
    /// Validate `definition`.
    pub fn new(definition: CaseDefinition) -> Result<Self, EngineError> {
        let blueprint = Self {
            definition: Arc::new(definition),
        };
        blueprint.validate()?;
        Ok(blueprint)
    }

    /// Parse and validate a YAML definition.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, EngineError> {
        let definition: CaseDefinition =
            serde_yaml::from_str(yaml).map_err(|e| EngineError::Definition(e.to_string()))?;
        Self::new(definition)
    }

    /// Read, parse and validate a YAML definition file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Definition(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&yaml)
    }

    /// The underlying definition.
    pub fn definition(&self) -> &CaseDefinition {
        &self.definition
    }

    /// Check every reference, recursively through sub-cases.
    pub fn validate(&self) -> Result<(), EngineError> {
        validate_definition(&self.definition)
    }

    /// Build a fresh case graph in INITIAL with id `id`.
    pub fn instantiate(&self, id: CaseId) -> Result<CaseGraph, EngineError> {
        assemble(&self.definition, id)
    }

    /// Install the declared predicates and sub-case factories, recursively.
    pub fn register(&self, ctx: &mut ExecutionContext) {
        register_definition(&self.definition, ctx);
    }
}

// ─── Assembly ────────────────────────────────────────────────────────

fn assemble(def: &CaseDefinition, id: CaseId) -> Result<CaseGraph, EngineError> {
    let mut graph = CaseGraph::new(id, &def.id, &def.name, def.auto_complete)?;

    for file_item in &def.file_items {
        let name = file_item.name.as_deref().unwrap_or(&file_item.id);
        let handle = graph.add_file_item(&file_item.id, name)?;
        let item = graph.file_item_mut(handle)?;
        for property in &file_item.properties {
            item.upsert_property(property.clone());
        }
    }

    for plan_item in &def.plan_items {
        add_plan_item(&mut graph, ItemId::ROOT, plan_item)?;
    }

    for sentry in &def.sentries {
        add_sentry(&mut graph, sentry)?;
    }
    Ok(graph)
}

fn add_plan_item(graph: &mut CaseGraph, parent: ItemId, def: &PlanItemDef) -> Result<ItemId, EngineError> {
    let required = rule(graph, def.required.as_ref())?;
    let manual = rule(graph, def.manual_activation.as_ref())?;
    let repetition = rule(graph, def.repetition.as_ref())?;

    let kind = match def.kind {
        PlanItemKindDef::Stage => {
            let mut stage = StageData::new(def.auto_complete).with_repetition(def.max_repetitions, repetition);
            stage.required = required;
            stage.manual_activation = manual;
            PlanItemKind::Stage(stage)
        }
        PlanItemKindDef::HumanTask | PlanItemKindDef::ProcessTask | PlanItemKindDef::CaseTask => {
            let mut task = match def.kind {
                PlanItemKindDef::HumanTask => TaskData::human(),
                PlanItemKindDef::ProcessTask => TaskData::process(),
                _ => TaskData::case(),
            };
            task.blocking = def.blocking;
            task.required = required;
            task.manual_activation = manual;
            task.repetition = repetition;
            task.role = def.role.clone();
            PlanItemKind::Task(task)
        }
        PlanItemKindDef::Milestone => PlanItemKind::Milestone(MilestoneData {
            required,
            repetition,
        }),
        PlanItemKindDef::EventListener => PlanItemKind::EventListener,
    };

    if def.kind != PlanItemKindDef::Stage && !def.children.is_empty() {
        return Err(EngineError::Definition(format!(
            "{} is not a stage and cannot have children",
            def.id
        )));
    }

    let name = def.name.as_deref().unwrap_or(&def.id);
    let id = graph.add_item(parent, &def.id, name, kind)?;
    if let Some(description) = &def.description {
        graph.set_description(id, description.clone())?;
    }
    for child in &def.children {
        add_plan_item(graph, id, child)?;
    }
    Ok(id)
}

fn add_sentry(graph: &mut CaseGraph, def: &SentryDef) -> Result<(), EngineError> {
    let item = graph.find(&def.item).ok_or_else(|| {
        EngineError::Definition(format!("sentry {} gates unknown plan item {}", def.id, def.item))
    })?;
    let sentry = graph.add_sentry(&def.id, def.kind, item)?;
    if let Some(name) = &def.name {
        graph.set_sentry_name(sentry, name.clone())?;
    }

    for on_part in &def.on_parts {
        let source = match (&on_part.item, &on_part.file_item) {
            (Some(item), None) => OnPartSource::Element {
                item: graph.find(item).ok_or_else(|| {
                    EngineError::Definition(format!("sentry {} observes unknown plan item {item}", def.id))
                })?,
                transition: Transition::from_name(&on_part.transition)?,
            },
            (None, Some(file_item)) => OnPartSource::FileItem {
                item: file_item_handle(graph, file_item)?,
                transition: FileItemTransition::from_name(&on_part.transition)?,
            },
            _ => {
                return Err(EngineError::Definition(format!(
                    "on-part of sentry {} needs exactly one of item and file_item",
                    def.id
                )))
            }
        };
        graph.add_on_part(sentry, source)?;
    }

    if let Some(if_part) = rule(graph, def.if_part.as_ref())? {
        graph.set_if_part(sentry, IfPart::new(if_part.predicate, if_part.context))?;
    }
    Ok(())
}

fn rule(graph: &CaseGraph, def: Option<&RuleDef>) -> Result<Option<Rule>, EngineError> {
    match def {
        Some(def) => Ok(Some(Rule::new(
            def.predicate.clone(),
            file_item_handle(graph, &def.context)?,
        ))),
        None => Ok(None),
    }
}

fn file_item_handle(graph: &CaseGraph, cm_id: &str) -> Result<FileItemId, EngineError> {
    graph
        .find_file_item(cm_id)
        .ok_or_else(|| EngineError::Definition(format!("unknown case file item {cm_id}")))
}

// ─── Validation ──────────────────────────────────────────────────────

fn validate_definition(def: &CaseDefinition) -> Result<(), EngineError> {
    let graph = assemble(def, CaseId::new())?;

    let declared = |name: &str| {
        name == PredicateRegistry::ALWAYS
            || name == PredicateRegistry::NEVER
            || def.predicates.iter().any(|p| p.name == name)
    };
    let mut used: Vec<(&str, &str)> = Vec::new();
    collect_rules(&def.plan_items, &mut used);
    for sentry in &def.sentries {
        if let Some(if_part) = &sentry.if_part {
            used.push((sentry.id.as_str(), if_part.predicate.as_str()));
        }
    }
    for (owner, predicate) in used {
        if !declared(predicate) {
            return Err(EngineError::Definition(format!(
                "{owner} uses undeclared predicate {predicate}"
            )));
        }
    }

    for predicate in &def.predicates {
        let needs_value = matches!(predicate.op, ComparisonOp::Equals | ComparisonOp::NotEquals);
        if needs_value && predicate.value.is_none() {
            return Err(EngineError::Definition(format!(
                "predicate {} compares without a value",
                predicate.name
            )));
        }
    }

    let mut case_tasks = Vec::new();
    collect_case_tasks(&def.plan_items, &mut case_tasks);
    for sub in &def.sub_cases {
        if !case_tasks.contains(&sub.task.as_str()) {
            return Err(EngineError::Definition(format!(
                "sub-case declared for {}, which is not a case task",
                sub.task
            )));
        }
        validate_definition(&sub.case)?;
    }
    for task in case_tasks {
        if !def.sub_cases.iter().any(|s| s.task == task) {
            return Err(EngineError::Definition(format!("case task {task} has no sub-case")));
        }
    }

    tracing::debug!(
        case = %def.id,
        plan_items = graph.walk().len(),
        sentries = graph.sentry_count(),
        "blueprint validated"
    );
    Ok(())
}

fn collect_rules<'a>(items: &'a [PlanItemDef], out: &mut Vec<(&'a str, &'a str)>) {
    for item in items {
        for r in [&item.required, &item.manual_activation, &item.repetition]
            .into_iter()
            .flatten()
        {
            out.push((item.id.as_str(), r.predicate.as_str()));
        }
        collect_rules(&item.children, out);
    }
}

fn collect_case_tasks<'a>(items: &'a [PlanItemDef], out: &mut Vec<&'a str>) {
    for item in items {
        if item.kind == PlanItemKindDef::CaseTask {
            out.push(item.id.as_str());
        }
        collect_case_tasks(&item.children, out);
    }
}

// ─── Registration ────────────────────────────────────────────────────

fn register_definition(def: &CaseDefinition, ctx: &mut ExecutionContext) {
    for predicate in &def.predicates {
        let predicate = predicate.clone();
        ctx.predicates
            .register(predicate.name.clone(), move |item| predicate.matches(item));
    }
    for sub in &def.sub_cases {
        let case = Arc::new(sub.case.clone());
        let factory_case = Arc::clone(&case);
        ctx.implementations
            .register_sub_case(sub.task.clone(), move |id| assemble(&factory_case, id));
        register_definition(&case, ctx);
    }
}
