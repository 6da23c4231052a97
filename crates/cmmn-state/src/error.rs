//! Errors parsing lifecycle vocabulary from external input.

use thiserror::Error;

/// A state or transition name did not match the lifecycle vocabulary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Unknown plan-item or case-file-item state name.
    #[error("unknown state name {name:?}")]
    UnknownState {
        /// The rejected name.
        name: String,
    },

    /// Unknown transition name.
    #[error("unknown transition name {name:?}")]
    UnknownTransition {
        /// The rejected name.
        name: String,
    },

    /// Unknown lifecycle category.
    #[error("unknown lifecycle category {name:?}")]
    UnknownCategory {
        /// The rejected name.
        name: String,
    },
}
