//! Reading config and response documents from disk.

use anyhow::{Context, Result, bail};
use cloudkit::ResourceKind;
use declarative::{BlockSpec, ConfigValue, ElemSpec, FieldKind};
use serde_json::Value;
use std::io::Read;
use std::path::Path;

/// Document formats accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
}

impl Format {
    /// `.toml` files are TOML, everything else is JSON.
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

pub fn parse(content: &str, format: Format) -> Result<Value> {
    match format {
        Format::Json => serde_json::from_str(content).context("Invalid JSON document"),
        Format::Toml => toml::from_str(content).context("Invalid TOML document"),
    }
}

/// Load a JSON or TOML document. `-` reads JSON from stdin.
pub fn load(path: &Path) -> Result<Value> {
    if path.as_os_str() == "-" {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .context("Failed to read stdin")?;
        return parse(&content, Format::Json);
    }

    let content =
        std::fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    parse(&content, Format::detect(path)).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load a user config file for `kind`.
pub fn load_config(kind: &dyn ResourceKind, path: &Path) -> Result<ConfigValue> {
    let document = load(path)?;
    if !document.is_object() {
        bail!("{} must contain a single object", path.display());
    }
    kind.schema()
        .decode(&document)
        .with_context(|| format!("Invalid {} config in {}", kind.name(), path.display()))
}

/// Load a config file that may hold remote-owned fields, e.g. the output
/// of `read` or `flatten`. Those fields are dropped before decoding.
pub fn load_observed(kind: &dyn ResourceKind, path: &Path) -> Result<ConfigValue> {
    let document = load(path)?;
    observed_from_json(kind, document)
        .with_context(|| format!("Invalid {} config in {}", kind.name(), path.display()))
}

/// Decode a read-back config document, ignoring remote-owned fields.
pub fn observed_from_json(kind: &dyn ResourceKind, mut document: Value) -> Result<ConfigValue> {
    strip_computed(kind.schema().root, &mut document);
    Ok(kind.schema().decode(&document)?)
}

fn strip_computed(spec: &BlockSpec, document: &mut Value) {
    let Some(object) = document.as_object_mut() else {
        return;
    };
    object.retain(|name, _| spec.field(name).is_none_or(|f| !f.is_computed_only()));
    for field in spec.fields {
        let Some(child) = object.get_mut(field.name) else {
            continue;
        };
        match field.kind {
            FieldKind::Block(sub) => strip_computed(sub, child),
            FieldKind::List(ElemSpec::Block(sub)) | FieldKind::Set(ElemSpec::Block(sub)) => {
                if let Some(items) = child.as_array_mut() {
                    for item in items {
                        strip_computed(sub, item);
                    }
                }
            }
            _ => {}
        }
    }
}
