//! Change set and plan display

use colored::{ColoredString, Colorize};
use declarative::{ChangeSet, DiffSummary, PatchOp, PlanAction, PlanEntry, group_by_field};
use std::fmt::Write;

fn symbol(op: PatchOp) -> ColoredString {
    match op {
        PatchOp::Add => "+".green(),
        PatchOp::Remove => "-".red(),
        PatchOp::Replace => "~".yellow(),
    }
}

/// Render a change set grouped by top-level field.
pub fn render_changes(changes: &ChangeSet) -> String {
    let mut out = String::new();
    for (field, ops) in group_by_field(changes) {
        let _ = writeln!(out, "│ {}", field.bold());
        for op in ops {
            let value = op
                .value
                .as_ref()
                .map(|v| format!(" = {}", v.to_json()))
                .unwrap_or_default();
            let _ = writeln!(out, "│   {} {}{}", symbol(op.op), op.path.to_pointer(), value.dimmed());
        }
    }
    out
}

/// One-line summary of a change set
pub fn summary_line(changes: &ChangeSet) -> String {
    let summary = DiffSummary::from_changes(changes);
    format!(
        "{} changes ({} to add, {} to change, {} to remove)",
        summary.total().to_string().bold(),
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.removals.to_string().red()
    )
}

/// Display a change set in a box
pub fn display_changes(title: &str, changes: &ChangeSet) {
    if changes.is_empty() {
        println!();
        println!("  {} No changes", "✓".green());
        return;
    }

    println!();
    println!("┌─ {} ─────────────────────────────────────────┐", title.bold());
    println!("│");
    print!("{}", render_changes(changes));
    println!("│");
    println!("├─────────────────────────────────────────────────────┤");
    println!("│ Summary: {}", summary_line(changes));
    println!("└─────────────────────────────────────────────────────┘");
}

/// Display what an apply would do for one resource
pub fn display_plan(entry: &PlanEntry) {
    let target = entry.id.as_deref().unwrap_or("(new)");
    match &entry.action {
        PlanAction::Create => {
            println!();
            println!("  {} {} {} {}", "+".green(), entry.kind.bold(), entry.name, "will be created".dimmed());
        }
        PlanAction::Update(changes) => {
            display_changes(&format!("{} {target}", entry.kind), changes);
        }
        PlanAction::NoChange => {
            println!();
            println!("  {} {} {target} is up to date", "✓".green(), entry.kind);
        }
        PlanAction::Delete => {
            println!();
            println!("  {} {} {target} {}", "-".red(), entry.kind.bold(), "will be destroyed".dimmed());
        }
    }
}

/// Line diff of two documents. Returns false when they are identical.
pub fn display_text_diff(before: &str, after: &str) -> bool {
    let diff = similar::TextDiff::from_lines(before, after);
    let mut has_changes = false;

    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => {
                has_changes = true;
                print!("    {}", format!("- {change}").red());
            }
            similar::ChangeTag::Insert => {
                has_changes = true;
                print!("    {}", format!("+ {change}").green());
            }
            similar::ChangeTag::Equal => {}
        }
    }

    if !has_changes {
        println!("    {}", "(documents are identical)".dimmed());
    }
    has_changes
}
