//! # Task Implementations
//!
//! Starting a process task calls the process runner registered under the
//! task's business id. Starting a case task builds a sub-case through the
//! registered factory, binds it back to the task, stores it inside the
//! task and creates its root.
//!
//! A case task completes when its sub-case root reaches COMPLETED or
//! TERMINATED. This is checked right after the sub-case starts and after
//! every operation routed into it through [`CaseGraph::with_sub_case`].

use cmmn_core::CaseId;
use cmmn_state::{PlanItemState, Transition};

use crate::context::{ExecutionContext, TaskStart};
use crate::engine::Cascade;
use crate::error::EngineError;
use crate::graph::{CaseGraph, CaseTaskBinding, Element, ItemId, PlanItemKind, TaskData, TaskKind};

impl CaseGraph {
    /// Run `f` against the sub-case of case task `task`, then complete the
    /// task if the sub-case has closed. Atomic over both graphs.
    pub fn with_sub_case<R>(
        &mut self,
        ctx: &ExecutionContext,
        task: ItemId,
        f: impl FnOnce(&mut CaseGraph) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let result = self.atomically(|graph| {
            let sub = graph.sub_case_mut(task)?;
            let result = f(sub)?;
            let events = std::mem::take(&mut sub.pending);
            graph.pending.extend(events);
            Cascade::new(graph, ctx).complete_if_sub_case_closed(task)?;
            Ok(result)
        })?;
        self.flush_events(ctx);
        Ok(result)
    }
}

impl Cascade<'_, '_> {
    /// Start whatever backs task `id`. Human tasks have nothing to start.
    pub(crate) fn start_implementation(&mut self, id: ItemId) -> Result<(), EngineError> {
        let item = self.graph.item(id)?;
        let PlanItemKind::Task(task) = &item.kind else {
            return Ok(());
        };
        let element = item.element();
        let cm_id = item.cm_id.clone();
        let key = self.graph.item(task.instance_of.unwrap_or(id))?.cm_id.to_string();

        match element {
            Element::ProcessTask => {
                let runner = self
                    .ctx
                    .implementations
                    .process(&key)
                    .ok_or_else(|| EngineError::UnresolvedImplementation { cm_id: key.clone() })?;
                let start = TaskStart {
                    case_id: self.graph.id,
                    task: id,
                    cm_id: cm_id.clone(),
                };
                runner(&start).map_err(|reason| EngineError::ImplementationFailed {
                    cm_id: cm_id.to_string(),
                    reason,
                })?;
                tracing::info!(case = %self.graph.id, task = %cm_id, "process started");
                Ok(())
            }
            Element::CaseTask => self.start_sub_case(id, &key),
            _ => Ok(()),
        }
    }

    fn start_sub_case(&mut self, id: ItemId, key: &str) -> Result<(), EngineError> {
        let factory = self
            .ctx
            .implementations
            .sub_case(key)
            .ok_or_else(|| EngineError::UnresolvedImplementation {
                cm_id: key.to_string(),
            })?;
        let task = self.graph.item(id)?.cm_id.clone();
        let mut sub = factory(CaseId::new())?;
        sub.bind_to_case_task(CaseTaskBinding {
            parent_case: self.graph.id,
            task: task.clone(),
        });
        Cascade::nested(&mut sub, self.ctx, self.depth()).transition(ItemId::ROOT, Transition::Create)?;
        self.graph.pending.append(&mut sub.pending);
        tracing::info!(
            case = %self.graph.id,
            task = %task,
            sub_case = %sub.id,
            state = %sub.root_state(),
            "sub-case started"
        );

        if let PlanItemKind::Task(TaskData {
            kind: TaskKind::Case { sub_case },
            ..
        }) = &mut self.graph.item_mut(id)?.kind
        {
            *sub_case = Some(Box::new(sub));
        }
        self.complete_if_sub_case_closed(id)
    }

    /// Complete case task `id` if it is ACTIVE and its sub-case has closed.
    pub(crate) fn complete_if_sub_case_closed(&mut self, id: ItemId) -> Result<(), EngineError> {
        let closed = matches!(
            self.graph.sub_case(id)?.root_state(),
            PlanItemState::Completed | PlanItemState::Terminated
        );
        if closed && self.graph.state(id)? == PlanItemState::Active {
            self.transition(id, Transition::Complete)?;
        }
        Ok(())
    }
}
