//! # Simulate Subcommand
//!
//! Instantiates a blueprint, creates the case, and replays a YAML script of
//! steps against it:
//!
//! ```yaml
//! workers:
//!   - { id: alice, name: Alice, roles: [engineer] }
//! steps:
//!   - { step: claim, task: recordCommissionData, worker: alice }
//!   - { step: fire, item: recordCommissionData, transition: complete }
//!   - step: file
//!     item: specifications
//!     op: set_property
//!     property: { name: revision, type: boolean, value: "true" }
//!   - step: sub_case
//!     task: createSpecifications
//!     steps:
//!       - { step: fire, item: draftSpecifications, transition: complete }
//! ```
//!
//! Every process task declared in the blueprint gets a runner that only
//! logs its start. A step that is not applied (disallowed or guard
//! rejected) is reported and makes the run exit with 1; a step that fails
//! aborts the run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};

use cmmn_core::CaseId;
use cmmn_engine::definition::{PlanItemDef, PlanItemKindDef};
use cmmn_engine::{
    Blueprint, CaseDefinition, CaseGraph, CaseWorker, EngineConfig, EngineError,
    ExecutionContext, FileItemId, PlanItemKind, Property, TaskKind,
};
use cmmn_state::{CaseFileItemState, PlanItemState, Transition, TransitionOutcome};

/// Arguments for the `cmmn simulate` subcommand.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Blueprint to instantiate.
    #[arg(value_name = "BLUEPRINT")]
    pub blueprint: PathBuf,

    /// Script of steps to apply once the case is created.
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Print the final case as JSON instead of a state tree.
    #[arg(long)]
    pub json: bool,
}

// ─── Script ──────────────────────────────────────────────────────────

/// Workers and the steps they drive.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    #[serde(default)]
    pub workers: Vec<CaseWorker>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Script {
    /// Parse a YAML script.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("failed to parse script")
    }

    /// Read and parse a YAML script file.
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?;
        Self::from_yaml_str(&yaml)
    }
}

/// One scripted operation. Items and tasks are addressed by business id.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Request a plan-item transition.
    Fire { item: String, transition: String },
    /// Operate on a case file item.
    File {
        item: String,
        op: FileOp,
        #[serde(default)]
        property: Option<Property>,
        #[serde(default)]
        properties: Vec<Property>,
        /// Business id of the other file item for child and reference ops.
        #[serde(default)]
        target: Option<String>,
    },
    /// Claim a task for a worker.
    Claim { task: String, worker: String },
    /// Release a worker's claim.
    Unclaim { task: String, worker: String },
    /// Apply nested steps to the sub-case of a case task.
    SubCase { task: String, steps: Vec<Step> },
}

/// Case file operation of a `file` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOp {
    Create,
    SetProperty,
    ReplaceProperties,
    AddChild,
    RemoveChild,
    AddReference,
    RemoveReference,
    Delete,
}

// ─── Report ──────────────────────────────────────────────────────────

/// Final state of a simulated case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub case_id: CaseId,
    pub cm_id: String,
    pub state: PlanItemState,
    pub items: Vec<ItemReport>,
    pub file_items: Vec<FileItemReport>,
    /// Number of recorded transitions.
    pub transitions: usize,
}

/// One plan item below the root.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub cm_id: String,
    pub kind: &'static str,
    pub state: PlanItemState,
    /// Distance from the case root.
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_case: Option<Box<CaseReport>>,
}

/// One case file item.
#[derive(Debug, Clone, Serialize)]
pub struct FileItemReport {
    pub cm_id: String,
    pub state: CaseFileItemState,
    pub properties: Vec<Property>,
}

impl CaseReport {
    /// Snapshot `graph`, descending into running sub-cases.
    pub fn new(graph: &CaseGraph) -> Result<Self, EngineError> {
        let mut items = Vec::new();
        for id in graph.walk().into_iter().skip(1) {
            let item = graph.item(id)?;
            let mut depth = 0;
            let mut parent = item.parent;
            while let Some(p) = parent {
                depth += 1;
                parent = graph.item(p)?.parent;
            }
            let (claimant, sub_case) = match &item.kind {
                PlanItemKind::Task(task) => {
                    let sub_case = match &task.kind {
                        TaskKind::Case { sub_case: Some(sub) } => Some(Box::new(Self::new(sub)?)),
                        _ => None,
                    };
                    (task.claimant.clone(), sub_case)
                }
                _ => (None, None),
            };
            items.push(ItemReport {
                cm_id: item.cm_id.to_string(),
                kind: item.kind.label(),
                state: item.state,
                depth,
                claimant,
                sub_case,
            });
        }

        let file_items = graph
            .case_file()
            .items()
            .iter()
            .map(|item| FileItemReport {
                cm_id: item.cm_id.to_string(),
                state: item.state,
                properties: item.properties.clone(),
            })
            .collect();

        Ok(Self {
            case_id: graph.id,
            cm_id: graph.cm_id().to_string(),
            state: graph.root_state(),
            items,
            file_items,
            transitions: graph.log().len(),
        })
    }

    /// Render as an indented state tree.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, indent: usize) {
        let pad = "  ".repeat(indent);
        out.push_str(&format!("{pad}{} (case) {}\n", self.cm_id, self.state));
        for item in &self.items {
            let pad = "  ".repeat(indent + item.depth);
            out.push_str(&format!("{pad}{} ({}) {}", item.cm_id, item.kind, item.state));
            if let Some(claimant) = &item.claimant {
                out.push_str(&format!(" [{claimant}]"));
            }
            out.push('\n');
            if let Some(sub) = &item.sub_case {
                sub.render_into(out, indent + item.depth + 1);
            }
        }
        for file_item in &self.file_items {
            out.push_str(&format!("{pad}  file {} {}", file_item.cm_id, file_item.state));
            for property in &file_item.properties {
                out.push_str(&format!(" {}={}", property.name, property.value));
            }
            out.push('\n');
        }
    }
}

// ─── Run ─────────────────────────────────────────────────────────────

/// Result of a simulation.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub report: CaseReport,
    /// Steps that were not applied, as `step N: reason`.
    pub skipped: Vec<String>,
}

/// Execute the simulate subcommand.
///
/// Returns exit code: 0 when every step applied, 1 otherwise.
pub fn run_simulate(args: &SimulateArgs, config: EngineConfig) -> Result<u8> {
    let blueprint = Blueprint::load(&args.blueprint)
        .with_context(|| format!("failed to load blueprint {}", args.blueprint.display()))?;
    let script = match &args.script {
        Some(path) => Script::load(path)?,
        None => Script::default(),
    };

    let simulation = simulate(&blueprint, &script, config)?;
    for skipped in &simulation.skipped {
        println!("SKIP: {skipped}");
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&simulation.report)?);
    } else {
        print!("{}", simulation.report.render());
    }
    Ok(if simulation.skipped.is_empty() { 0 } else { 1 })
}

/// Create a case from `blueprint` and apply `script` to it.
pub fn simulate(blueprint: &Blueprint, script: &Script, config: EngineConfig) -> Result<Simulation> {
    let mut ctx = ExecutionContext::new(config);
    blueprint.register(&mut ctx);
    register_process_stubs(blueprint.definition(), &mut ctx);
    let workers: BTreeMap<&str, &CaseWorker> =
        script.workers.iter().map(|w| (w.id.as_str(), w)).collect();

    let mut graph = blueprint
        .instantiate(CaseId::new())
        .context("failed to instantiate blueprint")?;
    graph.create(&ctx).context("failed to create case")?;
    tracing::info!(case = %graph.id, blueprint = %graph.cm_id(), "case created");

    let mut skipped = Vec::new();
    for (i, step) in script.steps.iter().enumerate() {
        let mut notes = Vec::new();
        apply(&mut graph, &ctx, &workers, step, &mut notes)
            .with_context(|| format!("step {} failed", i + 1))?;
        skipped.extend(notes.into_iter().map(|note| format!("step {}: {note}", i + 1)));
    }

    Ok(Simulation {
        report: CaseReport::new(&graph)?,
        skipped,
    })
}

fn apply(
    graph: &mut CaseGraph,
    ctx: &ExecutionContext,
    workers: &BTreeMap<&str, &CaseWorker>,
    step: &Step,
    skipped: &mut Vec<String>,
) -> Result<(), EngineError> {
    match step {
        Step::Fire { item, transition } => {
            let transition = Transition::from_name(transition)?;
            let outcome = graph.fire_by_cm_id(ctx, item, transition)?;
            note_outcome(item, outcome, skipped);
        }
        Step::File {
            item,
            op,
            property,
            properties,
            target,
        } => {
            let id = file_item(graph, item)?;
            let outcome = match op {
                FileOp::Create => graph.create_file_item(ctx, id)?,
                FileOp::SetProperty => {
                    let property = property.clone().ok_or_else(|| {
                        EngineError::Definition(format!("set_property on {item} needs a property"))
                    })?;
                    graph.set_property(ctx, id, property)?
                }
                FileOp::ReplaceProperties => graph.replace_properties(ctx, id, properties.clone())?,
                FileOp::AddChild => {
                    let other = target_item(graph, item, target.as_deref())?;
                    graph.add_file_child(ctx, id, other)?
                }
                FileOp::RemoveChild => {
                    let other = target_item(graph, item, target.as_deref())?;
                    graph.remove_file_child(ctx, id, other)?
                }
                FileOp::AddReference => {
                    let other = target_item(graph, item, target.as_deref())?;
                    graph.add_file_reference(ctx, id, other)?
                }
                FileOp::RemoveReference => {
                    let other = target_item(graph, item, target.as_deref())?;
                    graph.remove_file_reference(ctx, id, other)?
                }
                FileOp::Delete => graph.delete_file_item(ctx, id)?,
            };
            note_outcome(item, outcome, skipped);
        }
        Step::Claim { task, worker } => {
            let id = graph.require(task)?;
            graph.claim(id, lookup_worker(workers, worker)?)?;
        }
        Step::Unclaim { task, worker } => {
            let id = graph.require(task)?;
            graph.unclaim(id, lookup_worker(workers, worker)?)?;
        }
        Step::SubCase { task, steps } => {
            let id = graph.require(task)?;
            graph.with_sub_case(ctx, id, |sub| {
                for step in steps {
                    apply(sub, ctx, workers, step, skipped)?;
                }
                Ok(())
            })?;
        }
    }
    Ok(())
}

fn note_outcome<S: Copy + std::fmt::Display>(
    item: &str,
    outcome: TransitionOutcome<S>,
    skipped: &mut Vec<String>,
) {
    match outcome {
        TransitionOutcome::Applied { from, to } => {
            tracing::info!(item, %from, %to, "step applied");
        }
        TransitionOutcome::Disallowed { state, transition } => {
            skipped.push(format!("{item}: {transition} is not defined in state {state}"));
        }
        TransitionOutcome::GuardRejected { state, transition } => {
            skipped.push(format!("{item}: {transition} rejected in state {state}"));
        }
    }
}

fn file_item(graph: &CaseGraph, cm_id: &str) -> Result<FileItemId, EngineError> {
    graph
        .find_file_item(cm_id)
        .ok_or_else(|| EngineError::UnknownCmId {
            cm_id: cm_id.to_string(),
        })
}

fn target_item(graph: &CaseGraph, item: &str, target: Option<&str>) -> Result<FileItemId, EngineError> {
    let target = target
        .ok_or_else(|| EngineError::Definition(format!("file step on {item} needs a target")))?;
    file_item(graph, target)
}

fn lookup_worker<'w>(
    workers: &BTreeMap<&str, &'w CaseWorker>,
    id: &str,
) -> Result<&'w CaseWorker, EngineError> {
    workers
        .get(id)
        .copied()
        .ok_or_else(|| EngineError::Definition(format!("script declares no worker {id}")))
}

/// Register a logging runner for every process task in `definition` and
/// its sub-cases.
fn register_process_stubs(definition: &CaseDefinition, ctx: &mut ExecutionContext) {
    fn visit(item: &PlanItemDef, ctx: &mut ExecutionContext) {
        if item.kind == PlanItemKindDef::ProcessTask {
            ctx.implementations.register_process(item.id.clone(), |start| {
                tracing::info!(case = %start.case_id, task = %start.cm_id, "process task started");
                Ok(())
            });
        }
        for child in &item.children {
            visit(child, ctx);
        }
    }

    for item in &definition.plan_items {
        visit(item, ctx);
    }
    for sub_case in &definition.sub_cases {
        register_process_stubs(&sub_case.case, ctx);
    }
}
