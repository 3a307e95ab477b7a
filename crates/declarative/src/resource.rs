//! Resource schemas
//!
//! A [`ResourceSchema`] ties a field catalog to everything else a resource
//! kind needs to be synchronized: its composite identifier layout, how long
//! each long-running operation may take, and how often to poll.

use crate::error::{Error, Result};
use crate::identity::IdTemplate;
use crate::normalize::{decode, normalize};
use crate::schema::BlockSpec;
use crate::value::ConfigValue;
use std::collections::BTreeMap;
use std::time::Duration;

/// Per-operation deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Timeouts {
    pub const fn minutes(create: u64, update: u64, delete: u64) -> Self {
        Self {
            create: Duration::from_secs(create * 60),
            update: Duration::from_secs(update * 60),
            delete: Duration::from_secs(delete * 60),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::minutes(20, 20, 20)
    }
}

/// Static description of a resource kind
#[derive(Debug, Clone, Copy)]
pub struct ResourceSchema {
    /// Kind name used in configuration files, e.g. `cloudfront_distribution`
    pub kind: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Root field catalog
    pub root: &'static BlockSpec,
    /// Composite identifier layout
    pub id: IdTemplate,
    pub timeouts: Timeouts,
    pub poll_interval: Duration,
}

impl ResourceSchema {
    /// Decode a user document for this kind.
    pub fn decode(&self, json: &serde_json::Value) -> Result<ConfigValue> {
        decode(self.root, json)
    }

    pub fn normalize(&self, config: &ConfigValue) -> Result<ConfigValue> {
        normalize(self.root, config)
    }

    /// Compose the identifier of a resource.
    ///
    /// Variables that are root fields come from `config`; the remaining
    /// variable, if any, is the identifier the remote side assigned.
    pub fn id_of(&self, config: &ConfigValue, assigned: Option<&str>) -> Result<String> {
        let mut values: Vec<(&str, String)> = Vec::new();
        for var in self.id.vars() {
            let value = if self.root.field(var).is_some() {
                config
                    .field(var)
                    .and_then(ConfigValue::as_scalar)
                    .map(|s| s.to_string())
                    .ok_or_else(|| Error::ConfigIncomplete {
                        what: format!("`{var}` is required to identify a {}", self.kind),
                    })?
            } else {
                assigned
                    .map(str::to_string)
                    .ok_or_else(|| Error::InvalidIdentifier {
                        id: String::new(),
                        expected: format!("a remote identifier for `{var}`"),
                    })?
            };
            values.push((var, value));
        }
        let pairs: Vec<(&str, &str)> = values.iter().map(|(k, v)| (*k, v.as_str())).collect();
        self.id.format(&pairs)
    }

    /// Split an identifier into its variables.
    pub fn parse_id(&self, id: &str) -> Result<BTreeMap<&'static str, String>> {
        self.id.parse(id)
    }

    /// The identifier variable the remote side assigns, if this kind has one.
    pub fn remote_var(&self) -> Option<&'static str> {
        self.id.vars().find(|var| self.root.field(var).is_none())
    }

    /// Copy identifier variables that are root fields into `config`.
    pub fn fill_from_id(&self, config: &mut ConfigValue, id: &str) -> Result<()> {
        let parts = self.parse_id(id)?;
        let fields = config
            .as_block_mut()
            .ok_or_else(|| Error::invalid_value(self.kind, "expected a block"))?;
        for (var, value) in parts {
            if self.root.field(var).is_some() {
                fields.insert(var.to_string(), ConfigValue::string(value));
            }
        }
        Ok(())
    }
}
