//! # cmmn-cli — Case Engine Command-Line Interface
//!
//! Provides the `cmmn` binary on top of `cmmn-engine`.
//!
//! ## Subcommands
//!
//! - `cmmn validate` — Load blueprints and report what they assemble into.
//! - `cmmn transitions` — Print the lifecycle tables.
//! - `cmmn simulate` — Create a case from a blueprint and replay a script.
//!
//! ```bash
//! cmmn validate blueprints/component_release.yaml
//! cmmn transitions --category stage-task
//! cmmn simulate blueprints/component_release.yaml --script blueprints/component_release.script.yaml
//! ```
//!
//! ## Crate Policy
//!
//! - Argument parsing lives in `main.rs`; handlers take parsed args and
//!   return an exit code.
//! - Handlers delegate to the engine crates; no lifecycle logic here.

pub mod simulate;
pub mod transitions;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};

use cmmn_engine::EngineConfig;

/// Load the engine configuration, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load engine config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}
