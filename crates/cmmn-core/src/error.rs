//! # Error Types
//!
//! Errors raised while constructing core values. Engine-level failures live
//! in `cmmn_engine::EngineError`, which wraps this type.

use thiserror::Error;

/// Error constructing a foundational value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A business identifier was empty or contained whitespace.
    #[error("invalid cmId {value:?}: {reason}")]
    InvalidCmId {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A timestamp string could not be parsed.
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        /// The rejected input.
        value: String,
        /// Parser diagnostic.
        reason: String,
    },
}
