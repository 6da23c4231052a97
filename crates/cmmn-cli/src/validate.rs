//! # Validate Subcommand
//!
//! Loads each blueprint, checks every reference in it, and assembles one
//! throwaway case instance to report what the blueprint builds.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;

use cmmn_core::CaseId;
use cmmn_engine::{Blueprint, EngineError};

/// Arguments for the `cmmn validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Blueprint files to validate.
    #[arg(value_name = "BLUEPRINT", required = true)]
    pub paths: Vec<PathBuf>,
}

/// Counts reported for a blueprint that validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlueprintSummary {
    pub plan_items: usize,
    pub sentries: usize,
    pub file_items: usize,
    pub sub_cases: usize,
}

/// Execute the validate subcommand.
///
/// Returns exit code: 0 when every blueprint validates, 1 otherwise.
pub fn run_validate(args: &ValidateArgs) -> Result<u8> {
    let mut failed = 0usize;
    for path in &args.paths {
        match validate_blueprint(path) {
            Ok(summary) => println!(
                "OK: {} ({} plan items, {} sentries, {} file items, {} sub-cases)",
                path.display(),
                summary.plan_items,
                summary.sentries,
                summary.file_items,
                summary.sub_cases
            ),
            Err(e) => {
                failed += 1;
                println!("FAIL: {}: {e}", path.display());
            }
        }
    }

    println!("Blueprints: {}/{} passed", args.paths.len() - failed, args.paths.len());
    Ok(if failed > 0 { 1 } else { 0 })
}

/// Load `path` and assemble it once.
pub fn validate_blueprint(path: &Path) -> Result<BlueprintSummary, EngineError> {
    let blueprint = Blueprint::load(path)?;
    let graph = blueprint.instantiate(CaseId::new())?;
    tracing::debug!(path = %path.display(), case = %graph.cm_id(), "blueprint assembled");
    Ok(BlueprintSummary {
        plan_items: graph.walk().len(),
        sentries: graph.sentry_count(),
        file_items: graph.case_file().items().len(),
        sub_cases: blueprint.definition().sub_cases.len(),
    })
}
