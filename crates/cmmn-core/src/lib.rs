//! # cmmn-core — Foundational Types for the Case Engine
//!
//! Every other crate in the workspace depends on `cmmn-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `CaseId` names a case instance,
//!    `CmId` is the business identifier carried by plan items, sentries and
//!    case file items. `CmId` is validated at construction.
//!
//! 2. **UTC-only timestamps.** `Timestamp` is UTC, seconds precision, and is
//!    the only time type used in transition logs and case file attachments.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `cmmn-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod temporal;

pub use error::CoreError;
pub use identity::{CaseId, CmId};
pub use temporal::Timestamp;
