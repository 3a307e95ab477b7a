//! Azure Cosmos DB accounts.

use crate::context::ProviderContext;
use crate::lifecycle::ResourceKind;
use async_trait::async_trait;
use declarative::{
    BlockSpec, ConfigValue, DomainObject, ElemSpec, Error, FieldSpec, IdSegment, IdTemplate, ResourceSchema,
    Result, Timeouts, Wire,
};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;

static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("Invalid uuid regex")
});

static ACCOUNT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]{0,78}[a-zA-Z0-9_]$").expect("Invalid account name regex")
});

/// Consistency levels in the order the API numbers them.
pub const CONSISTENCY_LEVELS: &[&str] = &["Eventual", "Session", "BoundedStaleness", "Strong", "ConsistentPrefix"];

static CONSISTENCY: BlockSpec = BlockSpec::new(
    "consistency_policy",
    &[
        FieldSpec::string("default_consistency_level", "defaultConsistencyLevel")
            .wire(Wire::EnumIndex(CONSISTENCY_LEVELS)),
        FieldSpec::int("max_interval_in_seconds", "maxIntervalInSeconds").optional_computed(),
        FieldSpec::int("max_staleness_prefix", "maxStalenessPrefix")
            .optional_computed()
            .range(1, 2_147_483_647),
    ],
);

static CAPABILITY: BlockSpec = BlockSpec::new(
    "capabilities",
    &[FieldSpec::string("name", "name")
        .required()
        .one_of(&["EnableServerless"])],
);

static BACKUP: BlockSpec = BlockSpec::new(
    "backup_policy",
    &[
        FieldSpec::int("backup_interval", "backupIntervalInMinutes"),
        FieldSpec::int("backup_retention_interval", "backupRetentionIntervalInHours"),
        FieldSpec::string("backup_storage_redundancy", "backupStorageRedundancy")
            .optional_computed()
            .one_of(&["Geo", "Local", "Zone"]),
        FieldSpec::string("type", "backupPolicyType")
            .default_str("Periodic")
            .one_of(&["Periodic", "Continuous"]),
        FieldSpec::string("continuous_mode_tier", "continuousModeTier").computed(),
    ],
);

/// Root catalog of an account.
pub static ACCOUNT: BlockSpec = BlockSpec::new(
    "cosmosdb_account",
    &[
        FieldSpec::string("tenant_id", "tenantId").required().wire(Wire::Local),
        FieldSpec::string("name", "name").required(),
        FieldSpec::string("kind", "kind")
            .required()
            .one_of(&["GlobalDocumentDB", "MongoDB", "Parse"]),
        FieldSpec::string("type", "type").default_str("Microsoft.DocumentDB/databaseAccounts"),
        FieldSpec::string("locations", "locations")
            .computed()
            .wire(Wire::JsonString),
        FieldSpec::block("consistency_policy", "consistencyPolicy", &CONSISTENCY).optional_computed(),
        FieldSpec::list("capabilities", "capabilities", ElemSpec::Block(&CAPABILITY)),
        FieldSpec::string("capacity_mode", "capacityMode").computed(),
        FieldSpec::block("backup_policy", "backupPolicy", &BACKUP)
            .optional_computed()
            .wire(Wire::Inline),
        FieldSpec::bool("disable_key_based_metadata_write_access", "disableKeyBasedMetadataWriteAccess")
            .default_bool(false),
        FieldSpec::bool("enable_free_tier", "isFreeTierEnabled").default_bool(false),
        FieldSpec::string("public_network_access", "publicNetworkAccess")
            .default_str("Enabled")
            .one_of(&["Enabled", "Disabled"]),
        FieldSpec::string("provisioning_state", "provisioningState").computed(),
    ],
);

pub static SCHEMA: ResourceSchema = ResourceSchema {
    kind: "cosmosdb_account",
    description: "Azure Cosmos DB database account",
    root: &ACCOUNT,
    id: IdTemplate::new(&[
        IdSegment::Var("tenant_id"),
        IdSegment::Literal("cosmosdb"),
        IdSegment::Literal("account"),
        IdSegment::Var("name"),
    ]),
    timeouts: Timeouts::minutes(60, 20, 15),
    poll_interval: Duration::from_secs(30),
};

const READY: &str = "ready";
const PENDING: &str = "pending";
const FAILED: &str = "failed";

fn collection_path(tenant: &str) -> String {
    format!("v3/subscriptions/{tenant}/azure/cosmosDb/account")
}

fn item_path(id: &str) -> Result<String> {
    let parts = SCHEMA.parse_id(id)?;
    Ok(format!("{}/{}", collection_path(&parts["tenant_id"]), parts["name"]))
}

fn str_field<'c>(config: &'c ConfigValue, name: &str) -> Option<&'c str> {
    config.field(name).and_then(ConfigValue::as_str)
}

/// Continuous backups are managed by the service: interval, retention and
/// redundancy must be left unset.
fn validate_backup(backup: &ConfigValue) -> Result<()> {
    let continuous = str_field(backup, "type").is_some_and(|t| t.eq_ignore_ascii_case("continuous"));
    if !continuous {
        return Ok(());
    }
    for name in ["backup_interval", "backup_retention_interval", "backup_storage_redundancy"] {
        if backup.field(name).is_some_and(ConfigValue::is_populated) {
            return Err(Error::invalid_value(
                format!("backup_policy.{name}"),
                "cannot be set when backup_policy.type is Continuous",
            ));
        }
    }
    Ok(())
}

/// The `cosmosdb_account` resource kind.
pub struct CosmosDbAccount;

#[async_trait]
impl ResourceKind for CosmosDbAccount {
    fn schema(&self) -> &'static ResourceSchema {
        &SCHEMA
    }

    fn validate(&self, config: &ConfigValue) -> Result<()> {
        if let Some(tenant) = str_field(config, "tenant_id")
            && !UUID.is_match(tenant)
        {
            return Err(Error::invalid_value("tenant_id", format!("`{tenant}` is not a UUID")));
        }
        if let Some(name) = str_field(config, "name")
            && !ACCOUNT_NAME.is_match(name)
        {
            return Err(Error::invalid_value(
                "name",
                "must be 2 to 80 letters, digits, periods, underscores or dashes, \
                 starting with a letter or digit and ending with a letter, digit or underscore",
            ));
        }
        match config.field("backup_policy") {
            Some(backup) => validate_backup(backup),
            None => Ok(()),
        }
    }

    fn customize_request(&self, _config: &ConfigValue, request: &mut DomainObject) -> Result<()> {
        let serverless = request
            .get("capabilities")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
            == Some("EnableServerless");
        let mode = if serverless { "Serverless" } else { "Provisioned" };
        let object = request
            .as_json_mut()
            .as_object_mut()
            .ok_or_else(|| Error::invalid_value("cosmosdb_account", "expected an object"))?;
        object.insert("capacityMode".to_string(), Value::from(mode));
        Ok(())
    }

    async fn fetch(&self, ctx: &ProviderContext, id: &str) -> Result<Option<DomainObject>> {
        let Some(mut doc) = ctx.client().get_json(&item_path(id)?).await? else {
            return Ok(None);
        };
        let object = doc
            .as_object_mut()
            .ok_or_else(|| Error::malformed(format!("cosmosdb_account {id}: expected an object")))?;
        // The API reports the account type as a namespace/type pair.
        if let Some(Value::Object(resource_type)) = object.remove("resourceType")
            && let (Some(namespace), Some(kind)) = (
                resource_type.get("namespace").and_then(Value::as_str),
                resource_type.get("type").and_then(Value::as_str),
            )
        {
            object.insert("type".to_string(), Value::String(format!("{namespace}/{kind}")));
        }
        Ok(Some(DomainObject::new(doc)))
    }

    async fn create(&self, ctx: &ProviderContext, config: &ConfigValue, request: DomainObject) -> Result<String> {
        let id = SCHEMA.id_of(config, None)?;
        let parts = SCHEMA.parse_id(&id)?;
        ctx.client()
            .post_json(&collection_path(&parts["tenant_id"]), request.as_json())
            .await?;
        Ok(id)
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _config: &ConfigValue,
        request: DomainObject,
        _observed: &DomainObject,
    ) -> Result<()> {
        ctx.client().put_json(&item_path(id)?, request.as_json()).await?;
        Ok(())
    }

    async fn delete(&self, ctx: &ProviderContext, id: &str) -> Result<()> {
        ctx.client().delete(&item_path(id)?).await?;
        Ok(())
    }

    fn status_of(&self, observed: &DomainObject) -> String {
        let status = match observed.get("provisioningState").and_then(Value::as_str) {
            Some("Succeeded") => READY,
            Some("Failed") => FAILED,
            _ => PENDING,
        };
        status.to_string()
    }

    fn pending_statuses(&self) -> &'static [&'static str] {
        &[PENDING]
    }

    fn ready_statuses(&self) -> &'static [&'static str] {
        &[READY]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::lifecycle;
    use crate::transport::{Collection, MemoryTransport};
    use declarative::{PlanAction, expand, flatten};
    use serde_json::json;
    use std::sync::Arc;

    const TENANT: &str = "8f2a6c1e-3b4d-4e5f-9a0b-1c2d3e4f5a6b";
    const BASE: &str = "v3/subscriptions/8f2a6c1e-3b4d-4e5f-9a0b-1c2d3e4f5a6b/azure/cosmosDb/account";

    fn setup(accounts: Collection) -> (ProviderContext, Arc<Collection>) {
        let accounts = Arc::new(accounts);
        let transport = MemoryTransport::new().shared_route(accounts.clone());
        (ProviderContext::new(Client::new(Arc::new(transport))), accounts)
    }

    fn accounts() -> Collection {
        Collection::new(BASE, "name").with_progression("provisioningState", &["Creating", "Succeeded"])
    }

    fn document() -> Value {
        json!({
            "tenant_id": TENANT,
            "name": "orders-db",
            "kind": "GlobalDocumentDB",
            "consistency_policy": {"default_consistency_level": "BoundedStaleness", "max_staleness_prefix": 100},
            "capabilities": [{"name": "EnableServerless"}]
        })
    }

    fn desired(doc: &Value) -> ConfigValue {
        SCHEMA.decode(doc).unwrap()
    }

    fn request_for(doc: &Value) -> DomainObject {
        let config = SCHEMA.normalize(&desired(doc)).unwrap();
        let mut request = expand(&ACCOUNT, &config).unwrap();
        CosmosDbAccount.customize_request(&config, &mut request).unwrap();
        request
    }

    #[test]
    fn test_request_wire_shapes() {
        let request = request_for(&document());
        let wire = request.as_json();
        assert_eq!(wire["consistencyPolicy"]["defaultConsistencyLevel"], 2);
        assert_eq!(wire["consistencyPolicy"]["maxStalenessPrefix"], 100);
        assert_eq!(wire["capacityMode"], "Serverless");
        assert_eq!(wire["type"], "Microsoft.DocumentDB/databaseAccounts");
        assert_eq!(wire["publicNetworkAccess"], "Enabled");
        assert!(wire.get("tenantId").is_none());
        assert!(wire.get("backupPolicyType").is_none());

        let mut doc = document();
        doc.as_object_mut().unwrap().remove("capabilities");
        doc["backup_policy"] = json!({"backup_interval": 240, "backup_retention_interval": 8});
        let request = request_for(&doc);
        let wire = request.as_json();
        assert_eq!(wire["capacityMode"], "Provisioned");
        // backup policy fields sit on the account itself
        assert_eq!(wire["backupIntervalInMinutes"], 240);
        assert_eq!(wire["backupPolicyType"], "Periodic");
        assert!(wire.get("backupPolicy").is_none());
    }

    #[test]
    fn test_response_flattens_enum_index_and_locations() {
        let response = DomainObject::new(json!({
            "name": "orders-db",
            "kind": "MongoDB",
            "type": "Microsoft.DocumentDB/databaseAccounts",
            "consistencyPolicy": {"defaultConsistencyLevel": 4, "maxIntervalInSeconds": 5, "maxStalenessPrefix": 100},
            "locations": [{"locationName": "East US", "failoverPriority": 0}],
            "backupIntervalInMinutes": 240,
            "backupPolicyType": "Periodic",
            "provisioningState": "Succeeded"
        }));
        let config = flatten(&ACCOUNT, &response).unwrap();
        assert_eq!(
            config.lookup("consistency_policy.default_consistency_level").unwrap().as_str(),
            Some("ConsistentPrefix")
        );
        assert_eq!(config.lookup("backup_policy.backup_interval").unwrap().as_int(), Some(240));
        let locations = config.lookup("locations").unwrap().as_str().unwrap();
        assert!(locations.contains("\"locationName\":\"East US\""));
    }

    #[test]
    fn test_validation() {
        let config = |doc: Value| SCHEMA.normalize(&desired(&doc)).unwrap();
        assert!(CosmosDbAccount.validate(&config(document())).is_ok());

        let mut doc = document();
        doc["tenant_id"] = json!("tenant-1");
        let err = CosmosDbAccount.validate(&config(doc)).unwrap_err();
        assert!(err.to_string().contains("tenant_id"));

        for bad in ["-orders", "orders-", "o", "orders db"] {
            let mut doc = document();
            doc["name"] = json!(bad);
            assert!(CosmosDbAccount.validate(&config(doc)).is_err(), "{bad} should be rejected");
        }

        let mut doc = document();
        doc["backup_policy"] = json!({"type": "Continuous", "backup_retention_interval": 8});
        let err = CosmosDbAccount.validate(&config(doc)).unwrap_err();
        assert!(err.to_string().contains("backup_policy.backup_retention_interval"));

        let mut doc = document();
        doc["backup_policy"] = json!({"type": "Continuous"});
        assert!(CosmosDbAccount.validate(&config(doc)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_update_delete() {
        let (ctx, accounts) = setup(accounts().with_linger(1));
        let kind = CosmosDbAccount;
        let id = format!("{TENANT}/cosmosdb/account/orders-db");

        let entry = lifecycle::plan(&ctx, &kind, "orders", &desired(&document()), None).await.unwrap();
        assert_eq!(entry.action, PlanAction::Create);

        let (created, state) = lifecycle::create(&ctx, &kind, &desired(&document())).await.unwrap();
        assert_eq!(created, id);
        assert_eq!(state.lookup("provisioning_state").unwrap().as_str(), Some("Succeeded"));
        assert_eq!(state.lookup("capacity_mode").unwrap().as_str(), Some("Serverless"));

        // the name is part of the id, so plan finds the account on its own
        let entry = lifecycle::plan(&ctx, &kind, "orders", &desired(&document()), None).await.unwrap();
        assert_eq!(entry.action, PlanAction::NoChange);
        assert_eq!(entry.id.as_deref(), Some(id.as_str()));

        let mut changed = document();
        changed["public_network_access"] = json!("Disabled");
        let state = lifecycle::update(&ctx, &kind, &id, &desired(&changed)).await.unwrap();
        assert_eq!(state.lookup("public_network_access").unwrap().as_str(), Some("Disabled"));
        assert_eq!(accounts.stored("orders-db").unwrap()["publicNetworkAccess"], "Disabled");

        assert!(lifecycle::delete(&ctx, &kind, &id).await.unwrap());
        assert!(accounts.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_joins_resource_type() {
        let (ctx, accounts) = setup(Collection::new(BASE, "name"));
        accounts.seed(
            "orders-db",
            json!({
                "name": "orders-db",
                "kind": "GlobalDocumentDB",
                "resourceType": {"namespace": "Microsoft.DocumentDB", "type": "databaseAccounts"},
                "provisioningState": "Succeeded"
            }),
        );
        let id = format!("{TENANT}/cosmosdb/account/orders-db");
        let state = lifecycle::import(&ctx, &CosmosDbAccount, &id).await.unwrap();
        assert_eq!(state.lookup("type").unwrap().as_str(), Some("Microsoft.DocumentDB/databaseAccounts"));
        assert_eq!(state.lookup("tenant_id").unwrap().as_str(), Some(TENANT));
    }

    #[tokio::test]
    async fn test_failed_provisioning_stops_the_wait() {
        let (ctx, accounts) = setup(Collection::new(BASE, "name"));
        accounts.seed("orders-db", json!({"name": "orders-db", "provisioningState": "Failed"}));
        let id = format!("{TENANT}/cosmosdb/account/orders-db");

        let err = lifecycle::wait_ready(&ctx, &CosmosDbAccount, &id, Duration::from_secs(600))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatus { .. }));
    }
}
