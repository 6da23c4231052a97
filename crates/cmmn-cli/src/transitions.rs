//! # Transitions Subcommand
//!
//! Prints the lifecycle tables, one line per defined transition:
//!
//! ```text
//! stage-task
//!   INITIAL    --create-->        AVAILABLE
//!   SUSPENDED  --resume-->        (state before suspend)
//! ```

use anyhow::{bail, Result};
use clap::Args;

use cmmn_state::{CaseFileItemState, Category, FileItemTransition, PlanItemState};

/// Name of the case file item table, alongside the plan-item categories.
pub const CASE_FILE_ITEM: &str = "case-file-item";

/// Arguments for the `cmmn transitions` subcommand.
#[derive(Args, Debug)]
pub struct TransitionsArgs {
    /// Only print this table: case, stage-task, event-milestone or case-file-item.
    #[arg(long)]
    pub category: Option<String>,
}

/// One row of a lifecycle table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub from: &'static str,
    pub transition: &'static str,
    /// `None` when the target is the state recorded before suspension.
    pub to: Option<&'static str>,
}

/// Execute the transitions subcommand.
pub fn run_transitions(args: &TransitionsArgs) -> Result<u8> {
    let tables: Vec<(&'static str, Vec<Row>)> = match args.category.as_deref() {
        None => Category::ALL
            .into_iter()
            .map(|c| (c.as_str(), plan_item_rows(c)))
            .chain(std::iter::once((CASE_FILE_ITEM, case_file_rows())))
            .collect(),
        Some(CASE_FILE_ITEM) => vec![(CASE_FILE_ITEM, case_file_rows())],
        Some(name) => match Category::from_name(name) {
            Ok(category) => vec![(category.as_str(), plan_item_rows(category))],
            Err(_) => bail!(
                "unknown category {name:?}; expected case, stage-task, event-milestone or {CASE_FILE_ITEM}"
            ),
        },
    };

    for (i, (name, rows)) in tables.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{name}");
        for row in rows {
            println!(
                "  {:<11} {:<18} {}",
                row.from,
                format!("--{}-->", row.transition),
                row.to.unwrap_or("(state before suspend)")
            );
        }
    }
    Ok(0)
}

/// Rows of a plan-item table, in declared state then transition order.
pub fn plan_item_rows(category: Category) -> Vec<Row> {
    let mut rows = Vec::new();
    for &from in category.states() {
        for &transition in category.transitions() {
            let to = match category.next(from, transition, None) {
                Some(to) => Some(to.as_str()),
                None if from == PlanItemState::Suspended
                    && transition.is_resumption()
                    && category.allows(from, transition, Some(PlanItemState::Available)) =>
                {
                    None
                }
                None => continue,
            };
            rows.push(Row {
                from: from.as_str(),
                transition: transition.as_str(),
                to,
            });
        }
    }
    rows
}

/// Rows of the case file item table.
pub fn case_file_rows() -> Vec<Row> {
    let mut rows = Vec::new();
    for from in CaseFileItemState::ALL {
        for transition in FileItemTransition::ALL {
            if let Some(to) = from.next(transition) {
                rows.push(Row {
                    from: from.as_str(),
                    transition: transition.as_str(),
                    to: Some(to.as_str()),
                });
            }
        }
    }
    rows
}
