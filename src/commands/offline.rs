//! Commands that work on local documents only.

use anyhow::{Context as _, Result};
use cloudkit::ResourceKind;
use cloudkit::resources::KINDS;
use colored::Colorize;
use declarative::{
    ConfigValue, DomainObject, FieldSpec, PlanAction, Presence, expand, flatten_with_prior, plan_resource,
};
use serde_json::Value;
use std::path::Path;

use super::resolve_kind;
use crate::engine::differ;
use crate::{input, ui};

fn presence_label(field: &FieldSpec) -> &'static str {
    match field.presence {
        Presence::Required => "required",
        Presence::Optional => "optional",
        Presence::Computed => "computed",
        Presence::OptionalComputed => "optional, computed",
    }
}

/// `kinds [KIND]`
pub fn kinds(filter: Option<&str>) -> Result<()> {
    let selected: Vec<&dyn ResourceKind> = match filter {
        Some(name) => vec![resolve_kind(name)?],
        None => KINDS.to_vec(),
    };

    for kind in selected {
        let schema = kind.schema();
        ui::header(schema.kind);
        ui::dim(schema.description);
        ui::kv("id", &schema.id.to_string());
        ui::kv(
            "timeouts",
            &format!(
                "create {}, update {}, delete {}",
                ui::format_elapsed(schema.timeouts.create),
                ui::format_elapsed(schema.timeouts.update),
                ui::format_elapsed(schema.timeouts.delete)
            ),
        );
        println!();
        for field in schema.root.fields {
            println!(
                "  {:<40} {:<8} {}",
                field.name,
                field.kind.name(),
                presence_label(field).dimmed()
            );
        }
    }
    Ok(())
}

/// Build the request object a config would be sent as.
pub fn expand_config(kind: &dyn ResourceKind, config: &ConfigValue) -> Result<Value> {
    let schema = kind.schema();
    let normalized = schema.normalize(config)?;
    kind.validate(&normalized)?;
    let mut request = expand(schema.root, &normalized)?;
    kind.customize_request(&normalized, &mut request)?;
    Ok(request.into_json())
}

/// `expand --kind K FILE`
pub fn expand_file(kind: &str, file: &Path) -> Result<()> {
    let kind = resolve_kind(kind)?;
    let config = input::load_config(kind, file)?;
    let request = expand_config(kind, &config)?;
    ui::json(&request)
}

/// Read a request-shaped object back as normalized config.
pub fn flatten_document(kind: &dyn ResourceKind, document: Value, prior: Option<&ConfigValue>) -> Result<Value> {
    let schema = kind.schema();
    let prior = prior.map(|p| schema.normalize(p)).transpose()?;
    let config = flatten_with_prior(schema.root, &DomainObject::new(document), prior.as_ref())?;
    Ok(config.to_json())
}

/// `flatten --kind K FILE [--prior FILE]`
pub fn flatten_file(kind: &str, file: &Path, prior: Option<&Path>) -> Result<()> {
    let kind = resolve_kind(kind)?;
    let document = input::load(file)?;
    let prior = prior.map(|p| input::load_config(kind, p)).transpose()?;
    let config = flatten_document(kind, document, prior.as_ref())?;
    ui::json(&config)
}

/// Plan between two local configs, as if `observed` had been read back.
pub fn plan_offline(kind: &dyn ResourceKind, desired: &ConfigValue, observed: &ConfigValue) -> Result<PlanAction> {
    let schema = kind.schema();
    let observed = schema.normalize(observed)?;
    Ok(plan_resource(schema.root, desired, Some(&observed))?)
}

/// `diff --kind K DESIRED OBSERVED [--text]`
pub fn diff_files(kind: &str, desired: &Path, observed: &Path, text: bool) -> Result<()> {
    let kind = resolve_kind(kind)?;
    let desired_config = input::load_config(kind, desired)?;
    let observed_config = input::load_observed(kind, observed)?;

    match plan_offline(kind, &desired_config, &observed_config)? {
        PlanAction::Update(changes) => differ::display_changes(&format!("{} diff", kind.name()), &changes),
        _ => ui::success("No changes"),
    }

    if text {
        let schema = kind.schema();
        let render = |config: &ConfigValue| -> Result<String> {
            let normalized = schema.normalize(config)?;
            let mut text = serde_json::to_string_pretty(&normalized.to_json())?;
            text.push('\n');
            Ok(text)
        };
        println!();
        differ::display_text_diff(&render(&observed_config)?, &render(&desired_config)?);
    }
    Ok(())
}

/// `id --kind K ID`
pub fn parse_id(kind: &str, id: &str) -> Result<()> {
    let kind = resolve_kind(kind)?;
    let parts = kind
        .schema()
        .parse_id(id)
        .with_context(|| format!("expected an id shaped like {}", kind.schema().id))?;
    for (name, value) in parts {
        ui::kv(name, &value);
    }
    Ok(())
}
