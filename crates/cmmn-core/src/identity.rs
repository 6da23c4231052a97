//! # Identity Newtypes
//!
//! `CaseId` identifies one case instance across the registry and the graph
//! store. `CmId` is the stable business identifier of a plan item, sentry or
//! case file item, unique among the children of one container.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Unique identifier of a case instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaseId(pub Uuid);

impl CaseId {
    /// Generate a new random case identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "case:{}", self.0)
    }
}

/// Business identifier of a case element.
///
/// Non-empty, no whitespace. Repetition instances extend the original's id
/// with a `#n` suffix, so `#` is permitted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CmId(String);

impl CmId {
    /// Validate and wrap a business identifier.
    pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into();
        if value.is_empty() {
            return Err(CoreError::InvalidCmId {
                value,
                reason: "must not be empty",
            });
        }
        if value.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidCmId {
                value,
                reason: "must not contain whitespace",
            });
        }
        Ok(Self(value))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier of the `n`-th repetition instance of this element.
    pub fn instance(&self, n: u32) -> Self {
        Self(format!("{}#{n}", self.0))
    }
}

impl TryFrom<String> for CmId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for CmId {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CmId> for String {
    fn from(id: CmId) -> Self {
        id.0
    }
}

impl AsRef<str> for CmId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
