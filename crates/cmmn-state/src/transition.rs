//! # Plan Item Transitions
//!
//! Transition names are what observers see: an OnPart stores the one
//! transition it listens for and compares it against every notification
//! from its source. Names are camelCase on the wire (`manualStart`,
//! `reActivate`, `parentSuspend`).

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// A named plan-item lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transition {
    /// INITIAL → AVAILABLE (ACTIVE for a case root).
    Create,
    /// AVAILABLE → ACTIVE without manual activation.
    Start,
    /// AVAILABLE → ENABLED.
    Enable,
    /// DISABLED → ENABLED.
    ReEnable,
    /// ENABLED → DISABLED.
    Disable,
    /// ENABLED → ACTIVE.
    ManualStart,
    /// SUSPENDED → state before suspend, by the item itself.
    Resume,
    /// SUSPENDED → state before suspend, driven by the container.
    ParentResume,
    /// FAILED → ACTIVE, or SUSPENDED → ACTIVE for a case root.
    ReActivate,
    /// ACTIVE → FAILED.
    Fault,
    /// → SUSPENDED, by the item itself.
    Suspend,
    /// → SUSPENDED, driven by the container.
    ParentSuspend,
    /// → TERMINATED, driven by an exit sentry or the container.
    Exit,
    /// → TERMINATED, by the item itself.
    Terminate,
    /// → TERMINATED for milestones and event listeners, driven by the container.
    ParentTerminate,
    /// ACTIVE → COMPLETED.
    Complete,
    /// AVAILABLE → COMPLETED for milestones and event listeners.
    Occur,
    /// SUSPENDED → CLOSED for a case root.
    Close,
}

impl Transition {
    /// Every transition, in declaration order.
    pub const ALL: [Transition; 18] = [
        Self::Create,
        Self::Start,
        Self::Enable,
        Self::ReEnable,
        Self::Disable,
        Self::ManualStart,
        Self::Resume,
        Self::ParentResume,
        Self::ReActivate,
        Self::Fault,
        Self::Suspend,
        Self::ParentSuspend,
        Self::Exit,
        Self::Terminate,
        Self::ParentTerminate,
        Self::Complete,
        Self::Occur,
        Self::Close,
    ];

    /// Canonical camelCase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Enable => "enable",
            Self::ReEnable => "reEnable",
            Self::Disable => "disable",
            Self::ManualStart => "manualStart",
            Self::Resume => "resume",
            Self::ParentResume => "parentResume",
            Self::ReActivate => "reActivate",
            Self::Fault => "fault",
            Self::Suspend => "suspend",
            Self::ParentSuspend => "parentSuspend",
            Self::Exit => "exit",
            Self::Terminate => "terminate",
            Self::ParentTerminate => "parentTerminate",
            Self::Complete => "complete",
            Self::Occur => "occur",
            Self::Close => "close",
        }
    }

    /// Parse a canonical transition name.
    pub fn from_name(name: &str) -> Result<Self, StateError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == name)
            .ok_or_else(|| StateError::UnknownTransition {
                name: name.to_string(),
            })
    }

    /// Restores the state recorded before a suspension.
    pub fn is_resumption(&self) -> bool {
        matches!(self, Self::Resume | Self::ParentResume)
    }

    /// Moves an item into SUSPENDED.
    pub fn is_suspension(&self) -> bool {
        matches!(self, Self::Suspend | Self::ParentSuspend)
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Transition {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}
