//! # Repetition
//!
//! Two kinds of repetition:
//!
//! - **Task instances.** An entry sentry firing against a repeatable task
//!   that is already past AVAILABLE appends a sibling instance
//!   `<cmId>#<n>` (n from 2). The [`TaskInstantiator`] builds it; the
//!   engine then drives it from AVAILABLE to ENABLED or ACTIVE.
//! - **Stage cycles.** A repeatable stage under its repetition cap that
//!   completes is reset in place: the whole subtree returns to INITIAL,
//!   sentry flags inside it are cleared, the counter is incremented and the
//!   stage is created again.

use cmmn_state::{PlanItemState, Transition};

use crate::context::TaskInstantiator;
use crate::engine::Cascade;
use crate::error::EngineError;
use crate::graph::{CaseGraph, ItemId, PlanItemKind, TaskData, TaskKind};
use crate::sentry::{OnPartSource, SentryKind};

// ─── Instantiator ────────────────────────────────────────────────────

/// Builds repetition instances by copying the original task.
///
/// The copy takes the original's rules, description, blocking flag, role,
/// task kind and exit sentries (fresh sentries observing the same sources),
/// and is observed by every on-part observing the original. It never takes
/// entry sentries: the original stays the trigger. The claimant and any
/// running sub-case are not copied.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloneInstantiator;

impl TaskInstantiator for CloneInstantiator {
    fn instantiate(&self, graph: &mut CaseGraph, task: ItemId, n: u32) -> Result<ItemId, EngineError> {
        let original = graph.item(task)?.clone();
        let PlanItemKind::Task(data) = &original.kind else {
            return Err(EngineError::Definition(format!(
                "{} is not a task and cannot be repeated",
                original.cm_id
            )));
        };
        let parent = original.parent.ok_or_else(|| {
            EngineError::Definition(format!("{} has no container", original.cm_id))
        })?;

        let kind = match data.kind {
            TaskKind::Case { .. } => TaskKind::Case { sub_case: None },
            ref other => other.clone(),
        };
        let copy = TaskData {
            kind,
            claimant: None,
            instance_of: Some(task),
            ..data.clone()
        };
        let cm_id = original.cm_id.instance(n);
        let id = graph.add_item(parent, cm_id.as_str(), &original.name, PlanItemKind::Task(copy))?;
        if let Some(description) = &original.description {
            graph.set_description(id, description.clone())?;
        }

        for sentry_id in &original.sentries {
            let sentry = graph.sentry(*sentry_id)?.clone();
            if sentry.kind != SentryKind::Exit {
                continue;
            }
            let copy = graph.add_sentry(sentry.cm_id.instance(n).as_str(), SentryKind::Exit, id)?;
            if let Some(name) = sentry.name {
                graph.set_sentry_name(copy, name)?;
            }
            if let Some(if_part) = sentry.if_part {
                graph.set_if_part(copy, if_part)?;
            }
            for on_part in &sentry.on_parts {
                let source: OnPartSource = graph.on_part(*on_part)?.source;
                graph.add_on_part(copy, source)?;
            }
        }

        for on_part in &original.observers {
            graph.add_observer(id, *on_part)?;
        }
        Ok(id)
    }
}

// ─── Cascade steps ───────────────────────────────────────────────────

impl Cascade<'_, '_> {
    /// Append and activate a new instance of the repeatable task `id`.
    pub(crate) fn spawn_repetition(&mut self, id: ItemId) -> Result<(), EngineError> {
        let original = match &self.graph.item(id)?.kind {
            PlanItemKind::Task(task) => task.instance_of.unwrap_or(id),
            _ => return Ok(()),
        };
        // Instances detached by an earlier stage cycle no longer count.
        let Some(parent) = self.graph.item(original)?.parent else {
            return Ok(());
        };
        let existing = self
            .graph
            .children(parent)?
            .iter()
            .filter(|child| {
                matches!(&self.graph.items[child.0].kind, PlanItemKind::Task(t) if t.instance_of == Some(original))
            })
            .count();
        let cap = self.ctx.config.max_repetition_instances;
        if existing >= cap {
            tracing::warn!(
                case = %self.graph.id,
                task = %self.graph.item(original)?.cm_id,
                cap,
                "repetition instance cap reached, not spawning"
            );
            return Ok(());
        }

        let n = u32::try_from(existing + 2)
            .map_err(|_| EngineError::Config(format!("repetition count {existing} out of range")))?;
        let instance = self.ctx.instantiator.instantiate(self.graph, original, n)?;
        tracing::debug!(
            case = %self.graph.id,
            instance = %self.graph.item(instance)?.cm_id,
            "repetition instance spawned"
        );

        self.set_state(instance, PlanItemState::Available, Transition::Create)?;
        let next = if self.is_manual(instance)? {
            Transition::Enable
        } else {
            Transition::Start
        };
        self.transition(instance, next)?;
        Ok(())
    }

    /// Return `stage` and its subtree to INITIAL for the next cycle.
    ///
    /// Task repetition instances inside the subtree are detached and stop
    /// observing anything. Sentry and on-part flags inside the subtree are
    /// cleared and the stage's counter is incremented. No transitions are
    /// recorded.
    pub(crate) fn reset_for_repetition(&mut self, stage: ItemId) -> Result<(), EngineError> {
        let subtree = self.graph.walk_from(stage);
        for &id in &subtree {
            let is_instance =
                matches!(&self.graph.item(id)?.kind, PlanItemKind::Task(t) if t.instance_of.is_some());
            if id != stage && is_instance {
                self.graph.detach(id)?;
            }
        }

        for id in self.graph.walk_from(stage) {
            let item = self.graph.item_mut(id)?;
            item.state = PlanItemState::Initial;
            item.state_before_suspend = None;
            item.suspended = false;
            item.suspend_origin = None;
            match &mut item.kind {
                PlanItemKind::Stage(data) if id == stage => data.current_repetition += 1,
                PlanItemKind::Stage(data) => data.current_repetition = 0,
                PlanItemKind::Task(data) => {
                    data.claimant = None;
                    if let TaskKind::Case { sub_case } = &mut data.kind {
                        *sub_case = None;
                    }
                }
                _ => {}
            }
            let sentries = item.sentries.clone();
            for sentry_id in sentries {
                let sentry = self.graph.sentry_mut(sentry_id)?;
                sentry.satisfied = false;
                for on_part in sentry.on_parts.clone() {
                    self.graph.on_part_mut(on_part)?.satisfied = false;
                }
            }
        }

        let item = self.graph.item(stage)?;
        if let PlanItemKind::Stage(data) = &item.kind {
            tracing::debug!(
                case = %self.graph.id,
                stage = %item.cm_id,
                repetition = data.current_repetition,
                max = data.max_repetitions,
                "stage reset for repetition"
            );
        }
        Ok(())
    }
}
