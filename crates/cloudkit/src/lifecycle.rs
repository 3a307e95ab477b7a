//! Generic resource lifecycle.
//!
//! A [`ResourceKind`] knows how to talk to one API surface. The free
//! functions in this module drive it through create, read, update, delete,
//! plan and import, expanding and flattening with the kind's field catalog
//! and waiting for the remote side to converge after every write.

use crate::context::ProviderContext;
use async_trait::async_trait;
use declarative::{
    ApplyResult, ConfigValue, DomainObject, Error, Expander, MISSING, Observed, PRESENT, PlanAction,
    PlanEntry, ResourceSchema, Result, Waiter, WaiterSpec, expand, flatten_with_prior,
    plan_resource,
};
use std::time::Duration;

/// One kind of remote resource.
#[async_trait]
pub trait ResourceKind: Send + Sync {
    fn schema(&self) -> &'static ResourceSchema;

    fn name(&self) -> &'static str {
        self.schema().kind
    }

    /// Cross-field checks the catalog cannot express. Receives a
    /// normalized configuration.
    fn validate(&self, _config: &ConfigValue) -> Result<()> {
        Ok(())
    }

    /// Adjust an expanded request before it is sent.
    fn customize_request(&self, _config: &ConfigValue, _request: &mut DomainObject) -> Result<()> {
        Ok(())
    }

    /// Fetch the current remote object, shaped like the root catalog.
    /// `None` when it does not exist.
    async fn fetch(&self, ctx: &ProviderContext, id: &str) -> Result<Option<DomainObject>>;

    /// Send a create request and return the new composite identifier.
    async fn create(&self, ctx: &ProviderContext, config: &ConfigValue, request: DomainObject) -> Result<String>;

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        config: &ConfigValue,
        request: DomainObject,
        observed: &DomainObject,
    ) -> Result<()>;

    /// Runs before the delete request, with the object as last observed.
    async fn before_delete(&self, _ctx: &ProviderContext, _id: &str, _observed: &DomainObject) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, ctx: &ProviderContext, id: &str) -> Result<()>;

    /// Readiness status of an observed object.
    fn status_of(&self, observed: &DomainObject) -> String;

    fn pending_statuses(&self) -> &'static [&'static str];

    fn ready_statuses(&self) -> &'static [&'static str];

    /// Whether writes wait for a ready status.
    fn wait_for_ready(&self, _config: &ConfigValue) -> bool {
        true
    }
}

/// Outcome of [`apply`].
#[derive(Debug, Clone)]
pub struct Applied {
    pub result: ApplyResult,
    /// State read back after a write.
    pub state: Option<ConfigValue>,
}

fn not_found(kind: &dyn ResourceKind, id: &str) -> Error {
    Error::RemoteNotFound {
        resource: format!("{} {id}", kind.name()),
    }
}

fn presence(found: Option<&DomainObject>) -> String {
    let status = if found.is_some() { PRESENT } else { MISSING };
    status.to_string()
}

/// Poll `kind` until `classify` maps the fetched object into `target`.
///
/// `classify` receives `None` while the object does not exist. Returns the
/// object as fetched by the converging poll.
#[allow(clippy::too_many_arguments)]
pub async fn wait_until<F>(
    ctx: &ProviderContext,
    kind: &dyn ResourceKind,
    id: &str,
    label: &str,
    pending: &[&str],
    target: &[&str],
    timeout: Duration,
    classify: F,
) -> Result<Option<DomainObject>>
where
    F: Fn(Option<&DomainObject>) -> String + Send + Sync,
{
    let schema = kind.schema();
    let classify = &classify;
    let refresh = move || async move {
        let found = kind.fetch(ctx, id).await?;
        let status = classify(found.as_ref());
        Ok::<_, Error>(Observed::new(found, status))
    };
    let mut spec = WaiterSpec::new(format!("{} {id}: {label}", schema.kind), pending, target, refresh)
        .poll_interval(ctx.poll_interval(schema.poll_interval))
        .timeout(ctx.wait_timeout(timeout));
    if let Some(observer) = ctx.observer() {
        spec = spec.observer(observer);
    }
    let observed = Waiter::new(spec).wait(ctx.cancel()).await?;
    Ok(observed.value)
}

/// Wait for a freshly created object to become visible.
pub async fn wait_present(ctx: &ProviderContext, kind: &dyn ResourceKind, id: &str, timeout: Duration) -> Result<()> {
    wait_until(ctx, kind, id, "exists", &[MISSING], &[PRESENT], timeout, presence)
        .await
        .map(|_| ())
}

/// Wait for a deleted object to disappear.
pub async fn wait_missing(ctx: &ProviderContext, kind: &dyn ResourceKind, id: &str, timeout: Duration) -> Result<()> {
    wait_until(ctx, kind, id, "deleted", &[PRESENT], &[MISSING], timeout, presence)
        .await
        .map(|_| ())
}

/// Wait for the kind's ready status.
pub async fn wait_ready(ctx: &ProviderContext, kind: &dyn ResourceKind, id: &str, timeout: Duration) -> Result<()> {
    wait_until(
        ctx,
        kind,
        id,
        "ready",
        kind.pending_statuses(),
        kind.ready_statuses(),
        timeout,
        |found| found.map_or_else(|| MISSING.to_string(), |o| kind.status_of(o)),
    )
    .await
    .map(|_| ())
}

/// Read the remote object as a normalized configuration tree.
///
/// `prior` is the configuration the object was written from, if known.
/// Absent objects read as `None`.
pub async fn read(
    ctx: &ProviderContext,
    kind: &dyn ResourceKind,
    id: &str,
    prior: Option<&ConfigValue>,
) -> Result<Option<ConfigValue>> {
    let schema = kind.schema();
    schema.parse_id(id)?;
    let Some(domain) = kind.fetch(ctx, id).await? else {
        log::debug!("{} {id} not found", schema.kind);
        return Ok(None);
    };
    let mut config = flatten_with_prior(schema.root, &domain, prior)?;
    schema.fill_from_id(&mut config, id)?;
    Ok(Some(config))
}

/// Decide what an apply would do.
///
/// Without an explicit `id`, kinds whose identifier derives entirely from
/// the configuration are looked up; the others plan a create.
pub async fn plan(
    ctx: &ProviderContext,
    kind: &dyn ResourceKind,
    name: &str,
    desired: &ConfigValue,
    id: Option<&str>,
) -> Result<PlanEntry> {
    let schema = kind.schema();
    let normalized = schema.normalize(desired)?;
    kind.validate(&normalized)?;

    let id = match id {
        Some(id) => Some(id.to_string()),
        None if schema.remote_var().is_none() => Some(schema.id_of(&normalized, None)?),
        None => None,
    };
    let observed = match &id {
        Some(id) => read(ctx, kind, id, Some(&normalized)).await?,
        None => None,
    };
    let action = plan_resource(schema.root, &normalized, observed.as_ref())?;
    log::debug!("{} {name}: {}", schema.kind, action.label());
    Ok(PlanEntry {
        kind: schema.kind.to_string(),
        name: name.to_string(),
        id: id.filter(|_| observed.is_some()),
        action,
    })
}

/// Create the resource, wait for it, and read it back.
pub async fn create(
    ctx: &ProviderContext,
    kind: &dyn ResourceKind,
    config: &ConfigValue,
) -> Result<(String, ConfigValue)> {
    let schema = kind.schema();
    let config = schema.normalize(config)?;
    kind.validate(&config)?;
    let mut request = expand(schema.root, &config)?;
    kind.customize_request(&config, &mut request)?;

    let id = kind.create(ctx, &config, request).await?;
    log::info!("created {} {id}", schema.kind);

    wait_present(ctx, kind, &id, schema.timeouts.create).await?;
    if kind.wait_for_ready(&config) {
        wait_ready(ctx, kind, &id, schema.timeouts.create).await?;
    }
    let state = read(ctx, kind, &id, Some(&config))
        .await?
        .ok_or_else(|| not_found(kind, &id))?;
    Ok((id, state))
}

/// Update the resource in place, wait for it, and read it back.
///
/// Generated values the configuration leaves unset are carried over from
/// the currently observed object.
pub async fn update(
    ctx: &ProviderContext,
    kind: &dyn ResourceKind,
    id: &str,
    config: &ConfigValue,
) -> Result<ConfigValue> {
    let schema = kind.schema();
    schema.parse_id(id)?;
    let config = schema.normalize(config)?;
    kind.validate(&config)?;

    let observed = kind.fetch(ctx, id).await?.ok_or_else(|| not_found(kind, id))?;
    let mut request = Expander::new(schema.root).with_observed(&observed).expand(&config)?;
    kind.customize_request(&config, &mut request)?;

    kind.update(ctx, id, &config, request, &observed).await?;
    log::info!("updated {} {id}", schema.kind);

    if kind.wait_for_ready(&config) {
        wait_ready(ctx, kind, id, schema.timeouts.update).await?;
    }
    read(ctx, kind, id, Some(&config))
        .await?
        .ok_or_else(|| not_found(kind, id))
}

/// Delete the resource and wait until it is gone.
///
/// Returns `false` when it was already absent.
pub async fn delete(ctx: &ProviderContext, kind: &dyn ResourceKind, id: &str) -> Result<bool> {
    let schema = kind.schema();
    schema.parse_id(id)?;
    let Some(observed) = kind.fetch(ctx, id).await? else {
        log::info!("{} {id} already absent", schema.kind);
        return Ok(false);
    };

    kind.before_delete(ctx, id, &observed).await?;
    match kind.delete(ctx, id).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {
            log::debug!("{} {id} disappeared before delete", schema.kind);
            return Ok(true);
        }
        Err(e) => return Err(e),
    }
    wait_missing(ctx, kind, id, schema.timeouts.delete).await?;
    log::info!("deleted {} {id}", schema.kind);
    Ok(true)
}

/// Adopt an existing remote object by identifier.
pub async fn import(ctx: &ProviderContext, kind: &dyn ResourceKind, id: &str) -> Result<ConfigValue> {
    read(ctx, kind, id, None).await?.ok_or_else(|| not_found(kind, id))
}

/// Carry out a planned action.
pub async fn apply(
    ctx: &ProviderContext,
    kind: &dyn ResourceKind,
    entry: &PlanEntry,
    desired: &ConfigValue,
) -> Result<Applied> {
    let applied = match (&entry.action, entry.id.as_deref()) {
        (PlanAction::NoChange, _) => Applied {
            result: ApplyResult::NoChange,
            state: None,
        },
        (PlanAction::Create, _) => {
            let (id, state) = create(ctx, kind, desired).await?;
            Applied {
                result: ApplyResult::Created { id },
                state: Some(state),
            }
        }
        (PlanAction::Update(changes), Some(id)) => {
            let state = update(ctx, kind, id, desired).await?;
            Applied {
                result: ApplyResult::Modified {
                    id: id.to_string(),
                    changes: changes.len(),
                },
                state: Some(state),
            }
        }
        (PlanAction::Delete, Some(id)) => {
            delete(ctx, kind, id).await?;
            Applied {
                result: ApplyResult::Removed { id: id.to_string() },
                state: None,
            }
        }
        (PlanAction::Update(_) | PlanAction::Delete, None) => {
            return Err(Error::ConfigIncomplete {
                what: format!("{} {} has no identifier to {}", entry.kind, entry.name, entry.action.label()),
            });
        }
    };
    Ok(applied)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::Client;
    use crate::transport::{Collection, MemoryTransport};
    use declarative::{BlockSpec, FieldSpec, IdSegment, IdTemplate, Timeouts, Wire};
    use serde_json::json;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    static WIDGET: BlockSpec = BlockSpec::new(
        "widget",
        &[
            FieldSpec::string("tenant_id", "TenantId").required().wire(Wire::Local),
            FieldSpec::string("name", "Name").required(),
            FieldSpec::int("size", "Size").default_int(1),
            FieldSpec::string("state", "State").computed(),
        ],
    );

    static SCHEMA: ResourceSchema = ResourceSchema {
        kind: "widget",
        description: "test widget",
        root: &WIDGET,
        id: IdTemplate::new(&[IdSegment::Var("tenant_id"), IdSegment::Literal("widget"), IdSegment::Var("name")]),
        timeouts: Timeouts::minutes(1, 1, 1),
        poll_interval: Duration::from_secs(5),
    };

    const BASE: &str = "v3/subscriptions/t-1/widgets";

    struct Widget;

    #[async_trait]
    impl ResourceKind for Widget {
        fn schema(&self) -> &'static ResourceSchema {
            &SCHEMA
        }

        async fn fetch(&self, ctx: &ProviderContext, id: &str) -> Result<Option<DomainObject>> {
            let parts = SCHEMA.parse_id(id)?;
            let path = format!("{BASE}/{}", parts["name"]);
            Ok(ctx.client().get_json(&path).await?.map(DomainObject::new))
        }

        async fn create(&self, ctx: &ProviderContext, config: &ConfigValue, request: DomainObject) -> Result<String> {
            ctx.client().post_json(BASE, request.as_json()).await?;
            SCHEMA.id_of(config, None)
        }

        async fn update(
            &self,
            ctx: &ProviderContext,
            id: &str,
            _config: &ConfigValue,
            request: DomainObject,
            _observed: &DomainObject,
        ) -> Result<()> {
            let parts = SCHEMA.parse_id(id)?;
            ctx.client()
                .put_json(&format!("{BASE}/{}", parts["name"]), request.as_json())
                .await?;
            Ok(())
        }

        async fn delete(&self, ctx: &ProviderContext, id: &str) -> Result<()> {
            let parts = SCHEMA.parse_id(id)?;
            ctx.client().delete(&format!("{BASE}/{}", parts["name"])).await?;
            Ok(())
        }

        fn status_of(&self, observed: &DomainObject) -> String {
            observed
                .get("State")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string()
        }

        fn pending_statuses(&self) -> &'static [&'static str] {
            &["Creating", "Updating"]
        }

        fn ready_statuses(&self) -> &'static [&'static str] {
            &["Ready"]
        }
    }

    fn setup(widgets: Collection) -> (ProviderContext, Arc<Collection>) {
        let widgets = Arc::new(widgets);
        let transport = MemoryTransport::new().shared_route(widgets.clone());
        (ProviderContext::new(Client::new(Arc::new(transport))), widgets)
    }

    fn desired(size: i64) -> ConfigValue {
        SCHEMA
            .decode(&json!({"tenant_id": "t-1", "name": "w1", "size": size}))
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_and_reads_back() {
        let (ctx, widgets) = setup(
            Collection::new(BASE, "Name").with_progression("State", &["Creating", "Creating", "Ready"]),
        );

        let (id, state) = create(&ctx, &Widget, &desired(3)).await.unwrap();
        assert_eq!(id, "t-1/widget/w1");
        assert_eq!(state.lookup("state").unwrap().as_str(), Some("Ready"));
        assert_eq!(state.lookup("tenant_id").unwrap().as_str(), Some("t-1"));
        assert_eq!(widgets.stored("w1").unwrap()["Size"], 3);
        // local fields never reach the wire
        assert!(widgets.stored("w1").unwrap().get("TenantId").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_plan_create_update_and_no_change() {
        let (ctx, widgets) = setup(Collection::new(BASE, "Name").with_progression("State", &["Ready"]));

        let entry = plan(&ctx, &Widget, "w1", &desired(2), None).await.unwrap();
        assert_eq!(entry.action, PlanAction::Create);
        assert!(entry.id.is_none());

        widgets.seed("w1", json!({"Name": "w1", "Size": 2}));
        let entry = plan(&ctx, &Widget, "w1", &desired(2), None).await.unwrap();
        assert_eq!(entry.action, PlanAction::NoChange);
        assert_eq!(entry.id.as_deref(), Some("t-1/widget/w1"));

        let entry = plan(&ctx, &Widget, "w1", &desired(5), None).await.unwrap();
        let PlanAction::Update(changes) = &entry.action else {
            panic!("expected an update, got {:?}", entry.action);
        };
        assert_eq!(changes.len(), 1);

        let applied = apply(&ctx, &Widget, &entry, &desired(5)).await.unwrap();
        assert_eq!(
            applied.result,
            ApplyResult::Modified {
                id: "t-1/widget/w1".to_string(),
                changes: 1
            }
        );
        assert_eq!(widgets.stored("w1").unwrap()["Size"], 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_waits_for_absence() {
        let (ctx, widgets) = setup(Collection::new(BASE, "Name").with_linger(2));
        widgets.seed("w1", json!({"Name": "w1", "State": "Ready"}));

        assert!(delete(&ctx, &Widget, "t-1/widget/w1").await.unwrap());
        assert!(widgets.is_empty());
        // already gone
        assert!(!delete(&ctx, &Widget, "t-1/widget/w1").await.unwrap());
    }

    #[tokio::test]
    async fn test_import_absent_is_not_found() {
        let (ctx, _) = setup(Collection::new(BASE, "Name"));
        let err = import(&ctx, &Widget, "t-1/widget/w9").await.unwrap_err();
        assert!(err.is_not_found());

        let err = import(&ctx, &Widget, "t-1/gadget/w9").await.unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_wait_times_out() {
        let (ctx, widgets) = setup(Collection::new(BASE, "Name").with_progression("State", &["Creating"]));
        let ctx = ctx.with_wait_timeout(Duration::from_secs(20));
        widgets.seed("w1", json!({"Name": "w1"}));

        let err = wait_ready(&ctx, &Widget, "t-1/widget/w1", Duration::from_secs(600))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WaitTimeout { .. }));
        assert_eq!(err.last_status(), Some("Creating"));
    }

    #[tokio::test]
    async fn test_cancelled_wait() {
        let token = CancellationToken::new();
        let (ctx, _) = setup(Collection::new(BASE, "Name"));
        let ctx = ctx.with_cancellation(token.clone());
        token.cancel();

        let err = wait_present(&ctx, &Widget, "t-1/widget/w1", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WaitCancelled { .. }));
    }
}
