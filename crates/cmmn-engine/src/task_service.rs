//! # Task Service
//!
//! Claiming work on behalf of case workers, and task queries.
//!
//! A task can be claimed when it has no claimant, is ENABLED or ACTIVE, and
//! either has no role or has one the worker holds. Only the claimant or an
//! admin can release a claim. Claims are not lifecycle transitions: they
//! change no state and notify no observer.

use serde::{Deserialize, Serialize};

use cmmn_state::PlanItemState;

use crate::error::EngineError;
use crate::graph::{CaseGraph, ItemId, PlanItemKind, TaskData};

/// A person (or system account) doing case work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseWorker {
    /// Unique worker id; stored as the claimant.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Roles held.
    #[serde(default)]
    pub roles: Vec<String>,
    /// May release claims held by others.
    #[serde(default)]
    pub admin: bool,
}

impl CaseWorker {
    /// A worker without roles.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            roles: Vec::new(),
            admin: false,
        }
    }

    /// Grant `role`.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Grant admin rights.
    pub fn as_admin(mut self) -> Self {
        self.admin = true;
        self
    }

    /// Whether the worker holds `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

impl CaseGraph {
    /// Claim `task` for `worker`.
    pub fn claim(&mut self, task: ItemId, worker: &CaseWorker) -> Result<(), EngineError> {
        let (cm_id, state, data) = self.task_data_mut(task)?;
        let rejected = |reason: &'static str| EngineError::ClaimRejected {
            task: cm_id.clone(),
            worker: worker.id.clone(),
            reason,
        };
        if data.claimant.is_some() {
            return Err(rejected("already claimed"));
        }
        if !matches!(state, PlanItemState::Enabled | PlanItemState::Active) {
            return Err(rejected("task is neither enabled nor active"));
        }
        if let Some(role) = &data.role {
            if !worker.has_role(role) {
                return Err(rejected("worker lacks the task's role"));
            }
        }
        data.claimant = Some(worker.id.clone());
        tracing::info!(case = %self.id, task = %cm_id, worker = %worker.id, "task claimed");
        Ok(())
    }

    /// Release the claim on `task`.
    pub fn unclaim(&mut self, task: ItemId, worker: &CaseWorker) -> Result<(), EngineError> {
        let (cm_id, _, data) = self.task_data_mut(task)?;
        let allowed = match &data.claimant {
            None => {
                return Err(EngineError::ClaimRejected {
                    task: cm_id,
                    worker: worker.id.clone(),
                    reason: "task is not claimed",
                })
            }
            Some(claimant) => *claimant == worker.id || worker.admin,
        };
        if !allowed {
            return Err(EngineError::ClaimRejected {
                task: cm_id,
                worker: worker.id.clone(),
                reason: "only the claimant or an admin may release the claim",
            });
        }
        data.claimant = None;
        tracing::info!(case = %self.id, task = %cm_id, worker = %worker.id, "task released");
        Ok(())
    }

    /// Unclaimed tasks `worker` could claim now.
    pub fn claimable_tasks(&self, worker: &CaseWorker) -> Vec<ItemId> {
        self.tasks()
            .filter(|(_, state, data)| {
                data.claimant.is_none()
                    && matches!(state, PlanItemState::Enabled | PlanItemState::Active)
                    && data.role.as_deref().map_or(true, |role| worker.has_role(role))
            })
            .map(|(id, _, _)| id)
            .collect()
    }

    /// Tasks claimed by `worker`.
    pub fn claimed_tasks(&self, worker: &CaseWorker) -> Vec<ItemId> {
        self.tasks()
            .filter(|(_, _, data)| data.claimant.as_deref() == Some(worker.id.as_str()))
            .map(|(id, _, _)| id)
            .collect()
    }

    /// Tasks with business id `cm_id` and their repetition instances.
    pub fn tasks_with_cm_id(&self, cm_id: &str) -> Vec<ItemId> {
        let originals: Vec<ItemId> = self
            .tasks()
            .filter(|(id, _, _)| self.items[id.0].cm_id.as_str() == cm_id)
            .map(|(id, _, _)| id)
            .collect();
        self.tasks()
            .filter(|(id, _, data)| {
                originals.contains(id) || data.instance_of.is_some_and(|o| originals.contains(&o))
            })
            .map(|(id, _, _)| id)
            .collect()
    }

    /// Reachable tasks in tree order.
    fn tasks(&self) -> impl Iterator<Item = (ItemId, PlanItemState, &TaskData)> + '_ {
        self.walk().into_iter().filter_map(move |id| {
            let item = &self.items[id.0];
            match &item.kind {
                PlanItemKind::Task(data) => Some((id, item.state, data)),
                _ => None,
            }
        })
    }

    fn task_data_mut(&mut self, task: ItemId) -> Result<(String, PlanItemState, &mut TaskData), EngineError> {
        let item = self.item_mut(task)?;
        let cm_id = item.cm_id.to_string();
        match &mut item.kind {
            PlanItemKind::Task(data) => Ok((cm_id, item.state, data)),
            _ => Err(EngineError::ClaimRejected {
                task: cm_id,
                worker: String::new(),
                reason: "not a task",
            }),
        }
    }
}
