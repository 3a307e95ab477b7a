//! Reconciliation planning
//!
//! Decides, per resource, whether the remote side must be created, updated
//! or left alone.

use crate::diff::diff;
use crate::error::Result;
use crate::normalize::{normalize, with_computed};
use crate::patch::ChangeSet;
use crate::schema::BlockSpec;
use crate::value::ConfigValue;

/// What must happen to one resource
#[derive(Debug, Clone, PartialEq)]
pub enum PlanAction {
    /// Remote resource does not exist
    Create,
    /// Remote resource drifted from the desired configuration
    Update(ChangeSet),
    /// Remote resource matches
    NoChange,
    /// Remote resource will be deleted
    Delete,
}

impl PlanAction {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoChange)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update(_) => "update",
            Self::NoChange => "no change",
            Self::Delete => "delete",
        }
    }
}

/// Compare a desired configuration against the observed one.
///
/// `observed` is the flattened remote state, `None` when the resource is
/// absent. Remote-owned values are copied into the desired tree before
/// diffing so they never show up as drift.
pub fn plan_resource(
    spec: &BlockSpec,
    desired: &ConfigValue,
    observed: Option<&ConfigValue>,
) -> Result<PlanAction> {
    let desired = normalize(spec, desired)?;
    let Some(observed) = observed else {
        return Ok(PlanAction::Create);
    };
    let merged = with_computed(spec, &desired, observed);
    let changes = diff(&merged, observed);
    if changes.is_empty() {
        Ok(PlanAction::NoChange)
    } else {
        Ok(PlanAction::Update(changes))
    }
}

/// One planned resource
#[derive(Debug, Clone)]
pub struct PlanEntry {
    /// Resource kind, e.g. `cosmosdb_account`
    pub kind: String,
    /// Name the user gave the resource
    pub name: String,
    /// Composite identifier, once known
    pub id: Option<String>,
    pub action: PlanAction,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::DISTRIBUTION;
    use crate::patch::PatchOp;
    use serde_json::json;

    fn minimal() -> ConfigValue {
        crate::normalize::decode(
            &DISTRIBUTION,
            &json!({
                "tenant_id": "t-1",
                "enabled": true,
                "default_cache_behavior": {
                    "target_origin_id": "s3",
                    "viewer_protocol_policy": "allow-all"
                },
                "viewer_certificate": {}
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_plan_absent_is_create() {
        assert_eq!(plan_resource(&DISTRIBUTION, &minimal(), None).unwrap(), PlanAction::Create);
    }

    #[test]
    fn test_plan_ignores_computed_fields() {
        let desired = minimal();
        let mut observed = normalize(&DISTRIBUTION, &desired).unwrap();
        if let Some(fields) = observed.as_block_mut() {
            fields.insert("status".into(), ConfigValue::string("Deployed"));
            fields.insert("domain_name".into(), ConfigValue::string("d1.example.net"));
        }
        let action = plan_resource(&DISTRIBUTION, &desired, Some(&observed)).unwrap();
        assert_eq!(action, PlanAction::NoChange);
    }

    #[test]
    fn test_plan_detects_drift() {
        let desired = minimal();
        let mut observed = normalize(&DISTRIBUTION, &desired).unwrap();
        if let Some(fields) = observed.as_block_mut() {
            fields.insert("enabled".into(), ConfigValue::bool(false));
        }
        let PlanAction::Update(changes) =
            plan_resource(&DISTRIBUTION, &desired, Some(&observed)).unwrap()
        else {
            panic!("expected an update");
        };
        assert_eq!(changes.len(), 1);
        let op = changes.iter().next().unwrap();
        assert_eq!(op.op, PatchOp::Replace);
        assert_eq!(op.path.to_pointer(), "/enabled");
    }
}
