//! # Tree Propagation
//!
//! Algorithms that carry one item's transition across the plan-item tree:
//!
//! - **Auto-completion.** A container completes once no child is ACTIVE and
//!   every required child is DISABLED, COMPLETED, TERMINATED or FAILED.
//! - **Suspend / resume.** Suspending a container suspends its descendants;
//!   resuming it restores exactly the descendants the suspension touched.
//! - **Exit.** Exiting a stage exits or terminates its open children.
//! - **Parent activation.** A stage becoming ACTIVE drives each inactive
//!   ancestor up to ACTIVE, stopping at the case root.

use cmmn_state::{PlanItemState, Transition};

use crate::engine::Cascade;
use crate::error::EngineError;
use crate::graph::{Element, ItemId, SuspendOrigin};

/// Steps needed to reach ACTIVE from any non-terminal state.
const MAX_ACTIVATION_STEPS: usize = 4;

impl Cascade<'_, '_> {
    // ─── Auto-completion ─────────────────────────────────────────────

    /// Complete `container` if it is ACTIVE, flagged auto-complete, and
    /// ready. Skipped while the container is still creating its children.
    pub(crate) fn try_auto_complete(&mut self, container: ItemId) -> Result<(), EngineError> {
        if self.is_populating(container) {
            return Ok(());
        }
        let item = self.graph.item(container)?;
        if item.state != PlanItemState::Active || !item.kind.auto_complete() {
            return Ok(());
        }
        if !self.is_ready_for_complete(container)? {
            return Ok(());
        }
        tracing::debug!(case = %self.graph.id, container = %item.cm_id, "auto-completing");
        self.transition(container, Transition::Complete)?;
        Ok(())
    }

    /// No child is ACTIVE and no required child blocks completion.
    /// Event listeners never count.
    pub(crate) fn is_ready_for_complete(&self, container: ItemId) -> Result<bool, EngineError> {
        for &child in self.graph.children(container)? {
            let item = self.graph.item(child)?;
            if item.element() == Element::EventListener {
                continue;
            }
            if item.state == PlanItemState::Active {
                return Ok(false);
            }
            if !item.state.permits_completion() && self.is_required(child)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ─── Suspend / resume ────────────────────────────────────────────

    /// Suspend every child of `container` that is not already suspended.
    ///
    /// A child that can take `parentSuspend` takes it (a stage then recurses
    /// through its own transition); any other child records its state and
    /// is flagged suspended in place.
    pub(crate) fn suspend_children(&mut self, container: ItemId) -> Result<(), EngineError> {
        for child in self.graph.children(container)?.to_vec() {
            let item = self.graph.item(child)?;
            if item.suspended {
                continue;
            }
            if item
                .category()
                .allows(item.state, Transition::ParentSuspend, item.state_before_suspend)
            {
                self.transition(child, Transition::ParentSuspend)?;
                continue;
            }
            let item = self.graph.item_mut(child)?;
            item.state_before_suspend = Some(item.state);
            item.suspended = true;
            item.suspend_origin = Some(SuspendOrigin::Parent);
            if item.kind.is_container() {
                self.suspend_children(child)?;
            }
        }
        Ok(())
    }

    /// Resume every child that a parent suspension touched. Children that
    /// were suspended on their own stay suspended.
    pub(crate) fn resume_children(&mut self, container: ItemId) -> Result<(), EngineError> {
        for child in self.graph.children(container)?.to_vec() {
            let item = self.graph.item(child)?;
            if item.suspend_origin != Some(SuspendOrigin::Parent) {
                continue;
            }
            if item.state == PlanItemState::Suspended {
                self.transition(child, Transition::ParentResume)?;
                continue;
            }
            let item = self.graph.item_mut(child)?;
            item.state_before_suspend = None;
            item.suspended = false;
            item.suspend_origin = None;
            if item.kind.is_container() {
                self.resume_children(child)?;
            }
        }
        Ok(())
    }

    // ─── Exit ────────────────────────────────────────────────────────

    /// Close out the children of an exited or terminated stage.
    pub(crate) fn exit_children(&mut self, stage: ItemId) -> Result<(), EngineError> {
        for child in self.graph.children(stage)?.to_vec() {
            let item = self.graph.item(child)?;
            let transition = if item.element().is_stage_or_task() {
                Transition::Exit
            } else {
                Transition::ParentTerminate
            };
            if item
                .category()
                .allows(item.state, transition, item.state_before_suspend)
            {
                self.transition(child, transition)?;
            }
        }
        Ok(())
    }

    // ─── Parent activation ───────────────────────────────────────────

    /// Drive every ancestor of `stage` below the case root to ACTIVE.
    pub(crate) fn propagate_activation(&mut self, stage: ItemId) -> Result<(), EngineError> {
        let mut next = self.graph.item(stage)?.parent;
        while let Some(ancestor) = next {
            if ancestor == ItemId::ROOT {
                break;
            }
            self.activate_ancestor(ancestor)?;
            next = self.graph.item(ancestor)?.parent;
        }
        Ok(())
    }

    fn activate_ancestor(&mut self, id: ItemId) -> Result<(), EngineError> {
        for _ in 0..MAX_ACTIVATION_STEPS {
            let step = match self.graph.state(id)? {
                PlanItemState::Active => return Ok(()),
                PlanItemState::Available => {
                    self.set_state(id, PlanItemState::Active, Transition::Start)?;
                    self.notify_only(id, Transition::Enable)?;
                    self.notify_only(id, Transition::ManualStart)?;
                    self.activated(id)?;
                    return Ok(());
                }
                PlanItemState::Initial => Transition::Create,
                PlanItemState::Enabled => Transition::ManualStart,
                PlanItemState::Disabled => Transition::ReEnable,
                PlanItemState::Failed => Transition::ReActivate,
                PlanItemState::Suspended => Transition::Resume,
                _ => return Ok(()),
            };
            if !self.transition(id, step)?.is_applied() {
                return Ok(());
            }
        }
        Ok(())
    }
}
