//! `state list` and `state show`

use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use std::path::Path;

use crate::Context;
use crate::cli::StateCommand;
use crate::state::SyncState;
use crate::ui;

pub fn run(ctx: &Context, cmd: &StateCommand) -> Result<()> {
    let path = ctx.settings.state_path()?;
    match cmd {
        StateCommand::List => list(&path),
        StateCommand::Show { id } => show(&path, id),
    }
}

fn list(path: &Path) -> Result<()> {
    let state = SyncState::load(path)?;
    if state.resources.is_empty() {
        ui::info(&format!("No managed resources in {}", path.display()));
        return Ok(());
    }

    ui::header("Managed resources");
    for (id, resource) in &state.resources {
        println!(
            "  {:<26} {}  {}",
            resource.kind.cyan(),
            id,
            resource.updated_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        );
    }
    Ok(())
}

fn show(path: &Path, id: &str) -> Result<()> {
    let state = SyncState::load(path)?;
    let Some(resource) = state.get(id) else {
        bail!("{id} is not in {}", path.display());
    };

    ui::header(id);
    ui::kv("kind", &resource.kind);
    if let Some(source) = &resource.source {
        ui::kv("source", source);
    }
    ui::kv("created", &resource.created_at.to_rfc3339());
    ui::kv("updated", &resource.updated_at.to_rfc3339());

    if let Some(snapshot) = &resource.snapshot {
        let config: serde_json::Value =
            serde_json::from_str(snapshot).with_context(|| format!("Corrupt snapshot for {id}"))?;
        println!();
        ui::json(&config)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_show_unknown_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.toml");
        let err = show(&path, "t/cosmosdb/account/orders").unwrap_err();
        assert!(err.to_string().contains("not in"));
    }

    #[test]
    fn test_list_and_show_recorded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.toml");
        let mut state = SyncState::default();
        state.record(
            "t/cosmosdb/account/orders",
            "cosmosdb_account",
            None,
            Some(&serde_json::json!({"name": "orders"})),
        );
        state.save(&path).unwrap();

        assert!(list(&path).is_ok());
        assert!(show(&path, "t/cosmosdb/account/orders").is_ok());
    }
}
