//! # Lifecycle Categories
//!
//! Dispatch from a plan item's category to its transition table.

use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::state::PlanItemState;
use crate::transition::Transition;
use crate::{case, event_milestone, stage_task};

/// Which lifecycle table governs a plan item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// The case root.
    Case,
    /// Stages and all task kinds.
    StageTask,
    /// Milestones and event listeners.
    EventMilestone,
}

impl Category {
    /// Every category.
    pub const ALL: [Category; 3] = [Self::Case, Self::StageTask, Self::EventMilestone];

    /// Canonical kebab-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Case => "case",
            Self::StageTask => "stage-task",
            Self::EventMilestone => "event-milestone",
        }
    }

    /// Parse a canonical category name.
    pub fn from_name(name: &str) -> Result<Self, StateError> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| StateError::UnknownCategory {
                name: name.to_string(),
            })
    }

    /// The declared state set.
    pub fn states(&self) -> &'static [PlanItemState] {
        match self {
            Self::Case => case::STATES,
            Self::StageTask => stage_task::STATES,
            Self::EventMilestone => event_milestone::STATES,
        }
    }

    /// The transitions this category responds to at all.
    pub fn transitions(&self) -> &'static [Transition] {
        match self {
            Self::Case => case::TRANSITIONS,
            Self::StageTask => stage_task::TRANSITIONS,
            Self::EventMilestone => event_milestone::TRANSITIONS,
        }
    }

    /// Whether `state` belongs to the declared state set.
    pub fn contains(&self, state: PlanItemState) -> bool {
        self.states().contains(&state)
    }

    /// Whether an observer may meaningfully listen for `transition`.
    pub fn recognizes(&self, transition: Transition) -> bool {
        self.transitions().contains(&transition)
    }

    /// Target state of `transition` from `state`, or `None` if undefined.
    pub fn next(
        &self,
        state: PlanItemState,
        transition: Transition,
        prior: Option<PlanItemState>,
    ) -> Option<PlanItemState> {
        match self {
            Self::Case => case::next(state, transition),
            Self::StageTask => stage_task::next(state, transition, prior),
            Self::EventMilestone => event_milestone::next(state, transition, prior),
        }
    }

    /// Whether `transition` is defined from `state`.
    pub fn allows(
        &self,
        state: PlanItemState,
        transition: Transition,
        prior: Option<PlanItemState>,
    ) -> bool {
        self.next(state, transition, prior).is_some()
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_category_starts_initial() {
        for c in Category::ALL {
            assert_eq!(c.states()[0], PlanItemState::Initial);
        }
    }

    #[test]
    fn test_recognized_transitions_are_used() {
        for c in Category::ALL {
            for &t in c.transitions() {
                let used = c.states().iter().any(|&s| {
                    c.allows(s, t, Some(PlanItemState::Available))
                        || c.allows(s, t, Some(PlanItemState::Active))
                });
                assert!(used, "{c} lists {t} but never allows it");
            }
        }
    }

    #[test]
    fn test_unrecognized_transitions_never_allowed() {
        for c in Category::ALL {
            for t in Transition::ALL {
                if c.recognizes(t) {
                    continue;
                }
                for &s in c.states() {
                    assert!(!c.allows(s, t, Some(PlanItemState::Active)), "{c}: {s} --{t}");
                }
            }
        }
    }

    #[test]
    fn test_occur_is_event_milestone_only() {
        assert!(Category::EventMilestone.recognizes(Transition::Occur));
        assert!(!Category::StageTask.recognizes(Transition::Occur));
        assert!(!Category::Case.recognizes(Transition::Occur));
    }

    #[test]
    fn test_name_roundtrip() {
        for c in Category::ALL {
            assert_eq!(Category::from_name(c.as_str()).unwrap(), c);
        }
        assert!(Category::from_name("stage").is_err());
    }
}
