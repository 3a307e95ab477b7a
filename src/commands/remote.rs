//! Commands that talk to the management API.

use anyhow::{Context as _, Result, bail};
use cloudkit::lifecycle;
use cloudkit::{Client, HttpTransport, ProviderContext, ResourceKind};
use declarative::{ApplyOptions, ApplyResult, ConfigValue, ConfirmCallback, PlanAction, PlanEntry};
use std::path::Path;
use std::sync::Arc;

use super::resolve_kind;
use crate::Context;
use crate::cli::{IdArgs, TargetArgs};
use crate::engine::{TerminalConfirm, differ, executor};
use crate::progress::SpinnerObserver;
use crate::state::SyncState;
use crate::{input, ui};

/// Build the provider context from the resolved settings.
pub fn connect(ctx: &Context) -> Result<ProviderContext> {
    let http = ctx.settings.http_settings()?;
    let transport = HttpTransport::new(http).context("Failed to set up the HTTP transport")?;
    let client = Client::new(Arc::new(transport)).with_retry(ctx.settings.retry_config());
    log::info!("Using {}", client.endpoint());

    let mut provider = ProviderContext::new(client)
        .with_cancellation(ctx.cancel.clone())
        .with_observer(Arc::new(SpinnerObserver::new(ctx.quiet)));
    if let Some(interval) = ctx.settings.poll_interval() {
        provider = provider.with_poll_interval(interval);
    }
    if let Some(timeout) = ctx.settings.wait_timeout() {
        provider = provider.with_wait_timeout(timeout);
    }
    Ok(provider)
}

/// Name shown in plans: the config file's stem.
fn resource_name(file: &Path) -> String {
    file.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| *s != "-")
        .unwrap_or("stdin")
        .to_string()
}

fn source_path(file: &Path) -> Option<&Path> {
    (file.as_os_str() != "-").then_some(file)
}

/// Prior config for reads: the snapshot recorded by the last apply.
fn recorded_prior(kind: &dyn ResourceKind, state: &SyncState, id: &str) -> Option<ConfigValue> {
    let snapshot = state.get(id)?.snapshot.as_deref()?;
    let document = serde_json::from_str(snapshot).ok()?;
    match input::observed_from_json(kind, document) {
        Ok(config) => Some(config),
        Err(e) => {
            log::debug!("ignoring recorded snapshot of {id}: {e:#}");
            None
        }
    }
}

/// Explicit `--id`, else the id last applied from the same file.
fn known_id(kind: &dyn ResourceKind, args: &TargetArgs, state: &SyncState) -> Option<String> {
    args.id.clone().or_else(|| {
        let source = source_path(&args.file.file)?;
        let id = state.find_by_source(kind.name(), source)?;
        log::debug!("{} was last applied as {id}", source.display());
        Some(id.to_string())
    })
}

async fn plan_target(
    provider: &ProviderContext,
    kind: &dyn ResourceKind,
    args: &TargetArgs,
    state: &SyncState,
) -> Result<(PlanEntry, ConfigValue)> {
    let desired = input::load_config(kind, &args.file.file)?;
    let id = known_id(kind, args, state);
    let entry = lifecycle::plan(provider, kind, &resource_name(&args.file.file), &desired, id.as_deref()).await?;
    Ok((entry, desired))
}

/// `plan --kind K FILE [--id ID]`
pub async fn plan(ctx: &Context, args: &TargetArgs) -> Result<()> {
    let kind = resolve_kind(&args.file.kind.kind)?;
    let state = SyncState::load(&ctx.settings.state_path()?)?;
    let provider = connect(ctx)?;
    let (entry, _) = plan_target(&provider, kind, args, &state).await?;
    differ::display_plan(&entry);
    Ok(())
}

/// Plan, confirm and apply one config file, then record the result.
pub async fn run_apply(
    provider: &ProviderContext,
    kind: &dyn ResourceKind,
    args: &TargetArgs,
    state_path: &Path,
    options: &ApplyOptions,
    confirm: &mut dyn ConfirmCallback,
) -> Result<ApplyResult> {
    let mut state = SyncState::load(state_path)?;
    let previous = known_id(kind, args, &state);
    let (entry, desired) = plan_target(provider, kind, args, &state).await?;

    let applied = executor::execute(provider, kind, &entry, &desired, options, confirm).await?;
    let snapshot = applied.state.as_ref().map(ConfigValue::to_json);
    let source = source_path(&args.file.file);

    let recorded = match &applied.result {
        ApplyResult::Created { id } | ApplyResult::Modified { id, .. } => Some(id.clone()),
        ApplyResult::NoChange => entry.id.clone(),
        _ => None,
    };
    if let Some(id) = recorded {
        if let Some(stale) = previous.filter(|p| *p != id) {
            log::info!("{stale} no longer exists, replacing it in the state file");
            state.forget(&stale);
        }
        state.record(&id, kind.name(), source, snapshot.as_ref());
        state.save(state_path)?;
    }
    Ok(applied.result)
}

/// `apply --kind K FILE [--id ID] [--yes] [--dry-run]`
pub async fn apply(ctx: &Context, args: &TargetArgs, yes: bool, dry_run: bool) -> Result<()> {
    let kind = resolve_kind(&args.file.kind.kind)?;
    let provider = connect(ctx)?;
    let options = ApplyOptions {
        dry_run,
        auto_approve: yes,
    };
    let result = run_apply(
        &provider,
        kind,
        args,
        &ctx.settings.state_path()?,
        &options,
        &mut TerminalConfirm,
    )
    .await?;
    executor::display_result(&result);
    Ok(())
}

/// Read one resource, using the recorded snapshot as prior.
pub async fn run_read(
    provider: &ProviderContext,
    kind: &dyn ResourceKind,
    id: &str,
    state: &SyncState,
) -> Result<ConfigValue> {
    let prior = recorded_prior(kind, state, id);
    match lifecycle::read(provider, kind, id, prior.as_ref()).await? {
        Some(config) => Ok(config),
        None => bail!("{} {id} not found", kind.name()),
    }
}

/// `read --kind K --id ID`
pub async fn read(ctx: &Context, args: &IdArgs) -> Result<()> {
    let kind = resolve_kind(&args.kind.kind)?;
    let state = SyncState::load(&ctx.settings.state_path()?)?;
    let provider = connect(ctx)?;
    let config = run_read(&provider, kind, &args.id, &state).await?;
    ui::json(&config.to_json())
}

/// Delete one resource and drop it from the state file.
pub async fn run_destroy(
    provider: &ProviderContext,
    kind: &dyn ResourceKind,
    id: &str,
    state_path: &Path,
    options: &ApplyOptions,
    confirm: &mut dyn ConfirmCallback,
) -> Result<ApplyResult> {
    kind.schema().parse_id(id)?;
    let entry = PlanEntry {
        kind: kind.name().to_string(),
        name: id.to_string(),
        id: Some(id.to_string()),
        action: PlanAction::Delete,
    };
    differ::display_plan(&entry);

    if !options.auto_approve && !confirm.confirm(&format!("destroy {} {id}?", kind.name())) {
        return Ok(ApplyResult::Skipped {
            reason: "declined".to_string(),
        });
    }

    let existed = lifecycle::delete(provider, kind, id).await?;
    let mut state = SyncState::load(state_path)?;
    if state.forget(id) {
        state.save(state_path)?;
    }
    if existed {
        Ok(ApplyResult::Removed { id: id.to_string() })
    } else {
        Ok(ApplyResult::Skipped {
            reason: format!("{id} was already absent"),
        })
    }
}

/// `destroy --kind K --id ID [--yes]`
pub async fn destroy(ctx: &Context, args: &IdArgs, yes: bool) -> Result<()> {
    let kind = resolve_kind(&args.kind.kind)?;
    let provider = connect(ctx)?;
    let options = ApplyOptions {
        auto_approve: yes,
        ..ApplyOptions::default()
    };
    let result = run_destroy(
        &provider,
        kind,
        &args.id,
        &ctx.settings.state_path()?,
        &options,
        &mut TerminalConfirm,
    )
    .await?;
    executor::display_result(&result);
    Ok(())
}

/// Adopt one resource into the state file.
pub async fn run_import(
    provider: &ProviderContext,
    kind: &dyn ResourceKind,
    id: &str,
    state_path: &Path,
) -> Result<ConfigValue> {
    let config = lifecycle::import(provider, kind, id).await?;
    let mut state = SyncState::load(state_path)?;
    state.record(id, kind.name(), None, Some(&config.to_json()));
    state.save(state_path)?;
    Ok(config)
}

/// `import --kind K --id ID`
pub async fn import(ctx: &Context, args: &IdArgs) -> Result<()> {
    let kind = resolve_kind(&args.kind.kind)?;
    let provider = connect(ctx)?;
    let config = run_import(&provider, kind, &args.id, &ctx.settings.state_path()?).await?;
    ui::json(&config.to_json())?;
    if !ctx.quiet {
        ui::success(&format!("Imported {}", args.id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{FileArgs, KindArg};
    use cloudkit::{Collection, MemoryTransport};
    use declarative::{AutoConfirm, AutoDecline};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    const TENANT: &str = "6f1c2d3e-4b5a-4c6d-8e9f-0a1b2c3d4e5f";

    struct Fixture {
        dir: TempDir,
        provider: ProviderContext,
        accounts: Arc<Collection>,
        kind: &'static dyn ResourceKind,
    }

    impl Fixture {
        fn new() -> Self {
            let accounts = Arc::new(
                Collection::new(format!("v3/subscriptions/{TENANT}/azure/cosmosDb/account"), "name")
                    .with_progression("provisioningState", &["Creating", "Succeeded"]),
            );
            let transport = MemoryTransport::new().shared_route(accounts.clone());
            Self {
                dir: TempDir::new().unwrap(),
                provider: ProviderContext::new(Client::new(Arc::new(transport))),
                accounts,
                kind: resolve_kind("cosmosdb_account").unwrap(),
            }
        }

        fn state_path(&self) -> std::path::PathBuf {
            self.dir.path().join("state.toml")
        }

        fn write_config(&self, access: &str) -> TargetArgs {
            let path = self.dir.path().join("orders.toml");
            fs::write(
                &path,
                format!(
                    "tenant_id = \"{TENANT}\"\nname = \"orders\"\nkind = \"GlobalDocumentDB\"\npublic_network_access = \"{access}\"\n"
                ),
            )
            .unwrap();
            TargetArgs {
                file: FileArgs {
                    kind: KindArg {
                        kind: "cosmosdb_account".into(),
                    },
                    file: path,
                },
                id: None,
            }
        }

        fn id() -> String {
            format!("{TENANT}/cosmosdb/account/orders")
        }
    }

    fn approve() -> ApplyOptions {
        ApplyOptions {
            auto_approve: true,
            ..ApplyOptions::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_records_state_and_converges() {
        let fx = Fixture::new();
        let args = fx.write_config("Enabled");

        let result = run_apply(&fx.provider, fx.kind, &args, &fx.state_path(), &approve(), &mut AutoDecline)
            .await
            .unwrap();
        assert_eq!(result, ApplyResult::Created { id: Fixture::id() });

        let state = SyncState::load(&fx.state_path()).unwrap();
        let recorded = state.get(&Fixture::id()).unwrap();
        assert_eq!(recorded.kind, "cosmosdb_account");
        assert!(recorded.snapshot.is_some());
        assert_eq!(
            state.find_by_source("cosmosdb_account", &args.file.file),
            Some(Fixture::id().as_str())
        );

        let result = run_apply(&fx.provider, fx.kind, &args, &fx.state_path(), &approve(), &mut AutoDecline)
            .await
            .unwrap();
        assert_eq!(result, ApplyResult::NoChange);

        let args = fx.write_config("Disabled");
        let result = run_apply(&fx.provider, fx.kind, &args, &fx.state_path(), &approve(), &mut AutoDecline)
            .await
            .unwrap();
        assert!(matches!(result, ApplyResult::Modified { .. }));
        assert_eq!(fx.accounts.stored("orders").unwrap()["publicNetworkAccess"], "Disabled");
    }

    #[tokio::test]
    async fn test_dry_run_apply_sends_nothing() {
        let fx = Fixture::new();
        let args = fx.write_config("Enabled");
        let options = ApplyOptions {
            dry_run: true,
            auto_approve: true,
        };

        let result = run_apply(&fx.provider, fx.kind, &args, &fx.state_path(), &options, &mut AutoConfirm)
            .await
            .unwrap();
        assert_eq!(result, ApplyResult::Skipped { reason: "dry run".into() });
        assert!(fx.accounts.is_empty());
        assert!(!fx.state_path().exists());
    }

    #[tokio::test]
    async fn test_declined_apply_leaves_state_alone() {
        let fx = Fixture::new();
        let args = fx.write_config("Enabled");

        let result = run_apply(
            &fx.provider,
            fx.kind,
            &args,
            &fx.state_path(),
            &ApplyOptions::default(),
            &mut AutoDecline,
        )
        .await
        .unwrap();
        assert!(matches!(result, ApplyResult::Skipped { .. }));
        assert!(!fx.state_path().exists());
        assert!(fx.accounts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_import_read_and_destroy() {
        let fx = Fixture::new();
        fx.accounts.seed(
            "orders",
            json!({
                "name": "orders",
                "kind": "GlobalDocumentDB",
                "provisioningState": "Succeeded",
                "publicNetworkAccess": "Enabled"
            }),
        );

        let imported = run_import(&fx.provider, fx.kind, &Fixture::id(), &fx.state_path())
            .await
            .unwrap();
        assert_eq!(imported.lookup("tenant_id").unwrap().as_str(), Some(TENANT));
        assert!(SyncState::load(&fx.state_path()).unwrap().get(&Fixture::id()).is_some());

        let state = SyncState::load(&fx.state_path()).unwrap();
        let read = run_read(&fx.provider, fx.kind, &Fixture::id(), &state).await.unwrap();
        assert_eq!(read.lookup("name").unwrap().as_str(), Some("orders"));

        let result = run_destroy(
            &fx.provider,
            fx.kind,
            &Fixture::id(),
            &fx.state_path(),
            &ApplyOptions::default(),
            &mut AutoConfirm,
        )
        .await
        .unwrap();
        assert_eq!(result, ApplyResult::Removed { id: Fixture::id() });
        assert!(fx.accounts.is_empty());
        assert!(SyncState::load(&fx.state_path()).unwrap().resources.is_empty());

        let err = run_read(&fx.provider, fx.kind, &Fixture::id(), &state).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_destroy_rejects_malformed_id() {
        let fx = Fixture::new();
        let err = run_destroy(
            &fx.provider,
            fx.kind,
            "orders",
            &fx.state_path(),
            &approve(),
            &mut AutoConfirm,
        )
        .await
        .unwrap_err();
        assert!(err.downcast_ref::<declarative::Error>().is_some());
    }
}
