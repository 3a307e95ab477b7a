//! Plan execution with confirmation

use anyhow::Result;
use cloudkit::lifecycle;
use cloudkit::{Applied, ProviderContext, ResourceKind};
use colored::Colorize;
use declarative::{ApplyOptions, ApplyResult, ApplySummary, ConfigValue, ConfirmCallback, PlanEntry};

use crate::engine::differ;
use crate::ui;

/// Terminal confirmation through dialoguer
pub struct TerminalConfirm;

impl ConfirmCallback for TerminalConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        ui::confirm(prompt).unwrap_or_else(|e| {
            log::warn!("confirmation failed: {e}");
            false
        })
    }
}

/// Show the plan, ask for confirmation, then carry it out.
pub async fn execute(
    ctx: &ProviderContext,
    kind: &dyn ResourceKind,
    entry: &PlanEntry,
    desired: &ConfigValue,
    options: &ApplyOptions,
    confirm: &mut dyn ConfirmCallback,
) -> Result<Applied> {
    differ::display_plan(entry);

    if !entry.action.is_change() {
        return Ok(Applied {
            result: ApplyResult::NoChange,
            state: None,
        });
    }

    if options.dry_run {
        return Ok(skipped("dry run"));
    }

    if !options.auto_approve {
        println!();
        let prompt = format!("{} {} {}?", entry.action.label(), entry.kind, entry.name);
        if !confirm.confirm(&prompt) {
            return Ok(skipped("declined"));
        }
    }

    let applied = lifecycle::apply(ctx, kind, entry, desired).await?;
    Ok(applied)
}

fn skipped(reason: &str) -> Applied {
    Applied {
        result: ApplyResult::Skipped {
            reason: reason.to_string(),
        },
        state: None,
    }
}

/// Print the outcome of one apply
pub fn display_result(result: &ApplyResult) {
    let mut summary = ApplySummary::default();
    summary.add_result(result);

    match result {
        ApplyResult::NoChange => ui::success("Nothing to do"),
        ApplyResult::Created { id } => ui::success(&format!("Created {id}")),
        ApplyResult::Modified { id, changes } => ui::success(&format!("Updated {id} ({changes} changes)")),
        ApplyResult::Removed { id } => ui::success(&format!("Destroyed {id}")),
        ApplyResult::Skipped { reason } => ui::warn(&format!("Skipped: {reason}")),
    }

    if summary.total_changes() > 0 {
        println!(
            "  {} created, {} updated, {} destroyed",
            summary.created.to_string().green(),
            summary.modified.to_string().yellow(),
            summary.removed.to_string().red()
        );
    }
}
