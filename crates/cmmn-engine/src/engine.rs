//! # Transition Engine
//!
//! [`CaseGraph::fire`] is the entry point for every plan-item transition.
//! One call runs one cascade to completion on the caller's stack:
//!
//! ```text
//! fire ─▶ table check ─▶ set state ─▶ log + change event
//!                                   ─▶ notify observers ─▶ sentry checks ─▶ sentry actions ─▶ fire …
//!                                   ─▶ parent auto-completion ─▶ fire …
//!        ─▶ variant side effects (create children, start implementation, suspend/resume cascade, …)
//! ```
//!
//! ## Guarantees
//!
//! - **Atomic.** If any step fails, the graph is restored to its state
//!   before the call.
//! - **Bounded.** Nesting is limited by `EngineConfig::max_cascade_depth`.
//! - **Explicit no-ops.** A transition undefined for the current state
//!   reports `Disallowed` and changes nothing; a case `complete` blocked by
//!   its children reports `GuardRejected`.

use cmmn_core::Timestamp;
use cmmn_state::{Category, PlanItemState, Transition, TransitionOutcome, TransitionRecord};

use crate::context::{ChangeEvent, ExecutionContext, Subject};
use crate::error::EngineError;
use crate::graph::{CaseGraph, Element, ItemId, PlanItemKind, SuspendOrigin};
use crate::rule::Rule;
use crate::sentry::Signal;

/// Outcome of a plan-item transition request.
pub type Outcome = TransitionOutcome<PlanItemState>;

// ─── Public API ──────────────────────────────────────────────────────

impl CaseGraph {
    /// Request `transition` on `item` and run the resulting cascade.
    ///
    /// On `Applied`, `to` is the item's state once the cascade has settled
    /// (a non-blocking task reports COMPLETED for `create`).
    pub fn fire(
        &mut self,
        ctx: &ExecutionContext,
        item: ItemId,
        transition: Transition,
    ) -> Result<Outcome, EngineError> {
        let outcome = self.atomically(|graph| Cascade::new(graph, ctx).transition(item, transition))?;
        self.flush_events(ctx);
        Ok(outcome)
    }

    /// [`fire`](Self::fire) addressing the item by business id.
    pub fn fire_by_cm_id(
        &mut self,
        ctx: &ExecutionContext,
        cm_id: &str,
        transition: Transition,
    ) -> Result<Outcome, EngineError> {
        let item = self.require(cm_id)?;
        self.fire(ctx, item, transition)
    }

    /// Create the case: the root becomes ACTIVE and creates its children.
    pub fn create(&mut self, ctx: &ExecutionContext) -> Result<Outcome, EngineError> {
        self.fire(ctx, ItemId::ROOT, Transition::Create)
    }

    /// Run `f`, restoring the graph if it fails.
    pub(crate) fn atomically<R>(
        &mut self,
        f: impl FnOnce(&mut CaseGraph) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let snapshot = self.clone();
        self.open_operations += 1;
        match f(self) {
            Ok(value) => {
                self.open_operations -= 1;
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(case = %self.id, error = %e, "cascade failed, graph restored");
                *self = snapshot;
                Err(e)
            }
        }
    }

    /// Hand buffered change events to the sink once no operation is open.
    /// A sub-case keeps its events until the parent case takes them.
    pub(crate) fn flush_events(&mut self, ctx: &ExecutionContext) {
        if self.open_operations == 0 && self.case_task().is_none() {
            ctx.publish(std::mem::take(&mut self.pending));
        }
    }
}

// ─── Cascade ─────────────────────────────────────────────────────────

/// State of one running cascade over one graph.
pub(crate) struct Cascade<'g, 'c> {
    pub(crate) graph: &'g mut CaseGraph,
    pub(crate) ctx: &'c ExecutionContext,
    depth: usize,
    populating: Vec<ItemId>,
}

impl<'g, 'c> Cascade<'g, 'c> {
    pub(crate) fn new(graph: &'g mut CaseGraph, ctx: &'c ExecutionContext) -> Self {
        Self::nested(graph, ctx, 0)
    }

    /// A cascade over another graph (a sub-case) continuing at `depth`.
    pub(crate) fn nested(graph: &'g mut CaseGraph, ctx: &'c ExecutionContext, depth: usize) -> Self {
        Self {
            graph,
            ctx,
            depth,
            populating: Vec::new(),
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    fn enter(&mut self) -> Result<(), EngineError> {
        let limit = self.ctx.config.max_cascade_depth;
        if self.depth >= limit {
            return Err(EngineError::CascadeDepthExceeded { limit });
        }
        self.depth += 1;
        Ok(())
    }

    /// Request `transition` on `id`.
    pub(crate) fn transition(&mut self, id: ItemId, transition: Transition) -> Result<Outcome, EngineError> {
        self.enter()?;
        let result = self.dispatch(id, transition);
        self.depth -= 1;
        result
    }

    fn dispatch(&mut self, id: ItemId, transition: Transition) -> Result<Outcome, EngineError> {
        let item = self.graph.item(id)?;
        let category = item.category();
        let from = item.state;
        let Some(to) = category.next(from, transition, item.state_before_suspend) else {
            tracing::debug!(
                case = %self.graph.id,
                item = %item.cm_id,
                state = %from,
                transition = %transition,
                "transition not defined for state"
            );
            return Ok(Outcome::Disallowed {
                state: from,
                transition: transition.as_str(),
            });
        };

        match category {
            Category::Case => {
                if transition == Transition::Complete && !self.is_ready_for_complete(id)? {
                    return Ok(Outcome::GuardRejected {
                        state: from,
                        transition: transition.as_str(),
                    });
                }
                self.case_transition(id, to, transition)?;
            }
            Category::StageTask => self.stage_task_transition(id, to, transition)?,
            Category::EventMilestone => self.event_milestone_transition(id, to, transition)?,
        }

        Ok(Outcome::Applied {
            from,
            to: self.graph.state(id)?,
        })
    }

    fn case_transition(&mut self, id: ItemId, to: PlanItemState, transition: Transition) -> Result<(), EngineError> {
        self.set_state(id, to, transition)?;
        match transition {
            Transition::Create => {
                tracing::info!(case = %self.graph.id, "case created");
                self.create_children(id)?;
            }
            Transition::Terminate | Transition::Suspend => self.suspend_children(id)?,
            Transition::ReActivate => self.resume_children(id)?,
            Transition::Complete => tracing::info!(case = %self.graph.id, "case completed"),
            _ => {}
        }
        Ok(())
    }

    fn stage_task_transition(
        &mut self,
        id: ItemId,
        to: PlanItemState,
        transition: Transition,
    ) -> Result<(), EngineError> {
        match transition {
            Transition::Create => {
                self.set_state(id, to, transition)?;
                if self.graph.state(id)? == PlanItemState::Available && self.entry_gate_open(id)? {
                    self.proceed_from_available(id)?;
                }
            }
            Transition::Start | Transition::ManualStart => {
                self.set_state(id, to, transition)?;
                self.activated(id)?;
            }
            Transition::Suspend | Transition::ParentSuspend => {
                self.suspend_item(id, transition)?;
            }
            Transition::Resume | Transition::ParentResume => {
                self.resume_item(id, to, transition)?;
            }
            Transition::Complete => self.complete_stage_task(id)?,
            Transition::Exit | Transition::Terminate => {
                self.set_state(id, to, transition)?;
                if self.graph.item(id)?.element() == Element::Stage {
                    self.exit_children(id)?;
                }
            }
            _ => self.set_state(id, to, transition)?,
        }
        Ok(())
    }

    fn event_milestone_transition(
        &mut self,
        id: ItemId,
        to: PlanItemState,
        transition: Transition,
    ) -> Result<(), EngineError> {
        match transition {
            Transition::Suspend | Transition::ParentSuspend => self.suspend_item(id, transition),
            Transition::Resume | Transition::ParentResume => self.resume_item(id, to, transition),
            _ => self.set_state(id, to, transition),
        }
    }

    /// An AVAILABLE stage or task whose entry gate is open moves on: a
    /// non-blocking task completes, a manually activated item is enabled,
    /// anything else starts.
    fn proceed_from_available(&mut self, id: ItemId) -> Result<(), EngineError> {
        let item = self.graph.item(id)?;
        let non_blocking = matches!(&item.kind, PlanItemKind::Task(task) if !task.blocking);
        if non_blocking {
            self.set_state(id, PlanItemState::Completed, Transition::Complete)?;
            return self.start_implementation(id);
        }
        let next = if self.is_manual(id)? {
            Transition::Enable
        } else {
            Transition::Start
        };
        self.transition(id, next)?;
        Ok(())
    }

    /// Side effects of reaching ACTIVE through `start` or `manualStart`.
    pub(crate) fn activated(&mut self, id: ItemId) -> Result<(), EngineError> {
        match self.graph.item(id)?.element() {
            Element::Stage => {
                self.propagate_activation(id)?;
                self.create_children(id)
            }
            Element::ProcessTask | Element::CaseTask => self.start_implementation(id),
            _ => Ok(()),
        }
    }

    fn complete_stage_task(&mut self, id: ItemId) -> Result<(), EngineError> {
        let repeats = self.stage_repeats(id)?;
        self.apply_state(id, PlanItemState::Completed, Transition::Complete, !repeats)?;
        if repeats && self.graph.state(id)? == PlanItemState::Completed {
            self.reset_for_repetition(id)?;
            self.transition(id, Transition::Create)?;
        }
        Ok(())
    }

    fn suspend_item(&mut self, id: ItemId, transition: Transition) -> Result<(), EngineError> {
        let origin = if transition == Transition::ParentSuspend {
            SuspendOrigin::Parent
        } else {
            SuspendOrigin::Own
        };
        let item = self.graph.item_mut(id)?;
        item.state_before_suspend = Some(item.state);
        item.suspended = true;
        item.suspend_origin = Some(origin);
        self.set_state(id, PlanItemState::Suspended, transition)?;
        if self.graph.item(id)?.element() == Element::Stage {
            self.suspend_children(id)?;
        }
        Ok(())
    }

    fn resume_item(&mut self, id: ItemId, to: PlanItemState, transition: Transition) -> Result<(), EngineError> {
        let item = self.graph.item_mut(id)?;
        item.state_before_suspend = None;
        item.suspended = false;
        item.suspend_origin = None;
        self.set_state(id, to, transition)?;
        if self.graph.item(id)?.element() == Element::Stage {
            self.resume_children(id)?;
        }
        Ok(())
    }

    // ── State application ────────────────────────────────────────────

    /// Apply a state change: log, publish, notify observers, then attempt
    /// the parent's auto-completion if the new state permits it.
    pub(crate) fn set_state(&mut self, id: ItemId, to: PlanItemState, transition: Transition) -> Result<(), EngineError> {
        self.apply_state(id, to, transition, true)
    }

    fn apply_state(
        &mut self,
        id: ItemId,
        to: PlanItemState,
        transition: Transition,
        complete_parent: bool,
    ) -> Result<(), EngineError> {
        let item = self.graph.item_mut(id)?;
        let from = item.state;
        item.state = to;
        let category = item.category();
        let parent = item.parent;
        let cm_id = item.cm_id.to_string();
        let observers = item.observers.clone();

        tracing::debug!(
            case = %self.graph.id,
            item = %cm_id,
            transition = %transition,
            from = %from,
            to = %to,
            "transition applied"
        );
        metrics::counter!(
            "cmmn_transitions_total",
            "category" => category.as_str(),
            "transition" => transition.as_str()
        )
        .increment(1);
        self.record(Subject::PlanItem(id), cm_id, transition.as_str(), from.as_str(), to.as_str());

        self.notify(observers, Signal::Element(transition))?;

        if complete_parent && from != to && to.triggers_parent_completion() {
            if let Some(parent) = parent {
                self.try_auto_complete(parent)?;
            }
        }
        Ok(())
    }

    /// Deliver `transition` to the observers of `id` without changing state.
    pub(crate) fn notify_only(&mut self, id: ItemId, transition: Transition) -> Result<(), EngineError> {
        let item = self.graph.item(id)?;
        let state = item.state.as_str();
        let cm_id = item.cm_id.to_string();
        let observers = item.observers.clone();
        self.record(Subject::PlanItem(id), cm_id, transition.as_str(), state, state);
        self.notify(observers, Signal::Element(transition))
    }

    /// Append a log record and publish the change event.
    pub(crate) fn record(&mut self, subject: Subject, cm_id: String, transition: &str, from: &str, to: &str) {
        let case_id = self.graph.id;
        let event = self.ctx.capture(|| ChangeEvent {
            case_id,
            subject,
            cm_id: cm_id.clone(),
            transition: transition.to_string(),
            new_state: to.to_string(),
        });
        self.graph.pending.extend(event);
        self.graph.log.push(TransitionRecord {
            subject: cm_id,
            transition: transition.to_string(),
            from_state: from.to_string(),
            to_state: to.to_string(),
            timestamp: Timestamp::now(),
        });
    }

    // ── Containers ───────────────────────────────────────────────────

    /// Create every INITIAL child in order, then attempt auto-completion
    /// once. The container does not auto-complete while populating.
    pub(crate) fn create_children(&mut self, id: ItemId) -> Result<(), EngineError> {
        let children = self.graph.children(id)?.to_vec();
        self.populating.push(id);
        let result = self.create_each(&children);
        if let Some(pos) = self.populating.iter().rposition(|c| *c == id) {
            self.populating.remove(pos);
        }
        result?;
        self.try_auto_complete(id)
    }

    fn create_each(&mut self, children: &[ItemId]) -> Result<(), EngineError> {
        for &child in children {
            if self.graph.state(child)? == PlanItemState::Initial {
                self.transition(child, Transition::Create)?;
            }
        }
        Ok(())
    }

    pub(crate) fn is_populating(&self, id: ItemId) -> bool {
        self.populating.contains(&id)
    }

    // ── Rules ────────────────────────────────────────────────────────

    /// Evaluate a registered predicate against a case file item.
    pub(crate) fn evaluate(&self, predicate: &str, context: crate::graph::FileItemId) -> Result<bool, EngineError> {
        self.ctx.predicates.evaluate(
            predicate,
            self.graph.file_item(context)?,
            self.ctx.config.unresolved_predicate,
        )
    }

    fn rule_holds(&self, rule: Option<Rule>) -> Result<bool, EngineError> {
        match rule {
            Some(rule) => self.evaluate(&rule.predicate, rule.context),
            None => Ok(false),
        }
    }

    /// Required rule of `id`; no rule means not required.
    pub(crate) fn is_required(&self, id: ItemId) -> Result<bool, EngineError> {
        self.rule_holds(self.graph.item(id)?.kind.required_rule().cloned())
    }

    /// Manual activation rule of `id`; no rule means automatic.
    pub(crate) fn is_manual(&self, id: ItemId) -> Result<bool, EngineError> {
        self.rule_holds(self.graph.item(id)?.kind.manual_activation_rule().cloned())
    }

    /// Repetition rule of a task or milestone; no rule means not repeatable.
    pub(crate) fn is_repeatable(&self, id: ItemId) -> Result<bool, EngineError> {
        self.rule_holds(self.graph.item(id)?.kind.repetition_rule().cloned())
    }

    /// Whether completing stage `id` starts another cycle.
    fn stage_repeats(&self, id: ItemId) -> Result<bool, EngineError> {
        let PlanItemKind::Stage(stage) = &self.graph.item(id)?.kind else {
            return Ok(false);
        };
        if stage.current_repetition >= stage.max_repetitions {
            return Ok(false);
        }
        match stage.repetition.clone() {
            Some(rule) => self.evaluate(&rule.predicate, rule.context),
            None => Ok(true),
        }
    }
}
