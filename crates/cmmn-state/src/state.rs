//! # Plan Item States
//!
//! The shared state vocabulary of the three plan-item lifecycles. Which
//! subset a given item may occupy is decided by its [`Category`](crate::Category).

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Lifecycle state of a plan item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanItemState {
    /// Constructed, not yet created.
    Initial,
    /// Created and waiting for its entry criteria or activation.
    Available,
    /// Waiting for a manual start.
    Enabled,
    /// Manually disabled.
    Disabled,
    /// Work in progress.
    Active,
    /// Work failed.
    Failed,
    /// Suspended by itself or by its container.
    Suspended,
    /// Finished (or occurred, for milestones and event listeners).
    Completed,
    /// Terminated or exited.
    Terminated,
    /// Case closed after suspension.
    Closed,
}

impl PlanItemState {
    /// Every state, in declaration order.
    pub const ALL: [PlanItemState; 10] = [
        Self::Initial,
        Self::Available,
        Self::Enabled,
        Self::Disabled,
        Self::Active,
        Self::Failed,
        Self::Suspended,
        Self::Completed,
        Self::Terminated,
        Self::Closed,
    ];

    /// Canonical SCREAMING name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "INITIAL",
            Self::Available => "AVAILABLE",
            Self::Enabled => "ENABLED",
            Self::Disabled => "DISABLED",
            Self::Active => "ACTIVE",
            Self::Failed => "FAILED",
            Self::Suspended => "SUSPENDED",
            Self::Completed => "COMPLETED",
            Self::Terminated => "TERMINATED",
            Self::Closed => "CLOSED",
        }
    }

    /// Parse a canonical state name.
    pub fn from_name(name: &str) -> Result<Self, StateError> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == name)
            .ok_or_else(|| StateError::UnknownState {
                name: name.to_string(),
            })
    }

    /// No transition leaves this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Terminated | Self::Closed)
    }

    /// A required child in this state does not hold up its container's
    /// completion.
    pub fn permits_completion(&self) -> bool {
        matches!(
            self,
            Self::Disabled | Self::Completed | Self::Terminated | Self::Failed | Self::Closed
        )
    }

    /// Entering this state triggers an auto-completion attempt on the parent
    /// container.
    pub fn triggers_parent_completion(&self) -> bool {
        matches!(
            self,
            Self::Disabled | Self::Completed | Self::Terminated | Self::Failed
        )
    }
}

impl std::fmt::Display for PlanItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlanItemState {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}
