//! Configuration tree to remote payload.
//!
//! The expander normalizes its input first, so every default, fallback and
//! gating rule is applied before anything reaches the wire. Fields of the
//! exclusive groups that were not chosen are left out; computed-only and
//! local fields are never sent. Generated fields the user left unset are
//! carried forward from the last observed payload when one is supplied.

use crate::error::{Error, Result};
use crate::normalize::{normalize, qualify, select_group};
use crate::schema::{BlockSpec, ElemSpec, FieldKind, FieldSpec, Presence, Wire};
use crate::types::DomainObject;
use crate::value::{ConfigValue, Scalar};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Expand a configuration tree for `spec` into its wire payload.
pub fn expand(spec: &BlockSpec, config: &ConfigValue) -> Result<DomainObject> {
    Expander::new(spec).expand(config)
}

/// Expansion with optional knowledge of the current remote payload.
#[derive(Debug, Clone, Copy)]
pub struct Expander<'a> {
    spec: &'a BlockSpec,
    observed: Option<&'a Value>,
}

impl<'a> Expander<'a> {
    pub fn new(spec: &'a BlockSpec) -> Self {
        Self {
            spec,
            observed: None,
        }
    }

    /// Carry generated values forward from this observed payload.
    pub fn with_observed(mut self, observed: &'a DomainObject) -> Self {
        self.observed = Some(observed.as_json());
        self
    }

    pub fn expand(&self, config: &ConfigValue) -> Result<DomainObject> {
        let normalized = normalize(self.spec, config)?;
        let fields = normalized
            .as_block()
            .ok_or_else(|| Error::invalid_value(self.spec.name, "expected a block"))?;
        let mut out = Map::new();
        expand_block(
            self.spec,
            fields,
            self.observed.and_then(Value::as_object),
            "",
            &mut out,
        )?;
        log::trace!("expanded {} into {} wire fields", self.spec.name, out.len());
        Ok(DomainObject::new(Value::Object(out)))
    }
}

fn expand_block(
    spec: &BlockSpec,
    fields: &BTreeMap<String, ConfigValue>,
    observed: Option<&Map<String, Value>>,
    path: &str,
    out: &mut Map<String, Value>,
) -> Result<()> {
    let selection = select_group(spec, fields, path)?;
    let excluded = |name: &str| match selection {
        Some(chosen) => spec
            .exclusive
            .iter()
            .filter(|g| g.name != chosen.group.name)
            .any(|g| g.contains(name)),
        None => false,
    };
    let fallback_target = |name: &str| {
        selection.is_some_and(|chosen| {
            chosen.fallback && chosen.group.fallback.iter().any(|(f, _)| *f == name)
        })
    };
    let gated = spec.gated_fields(fields);

    for field in spec.fields {
        if field.is_computed_only()
            || field.is_local()
            || gated.contains(&field.name)
            || excluded(field.name)
        {
            continue;
        }
        let here = qualify(path, field.name);
        let seen = match field.wire {
            Wire::Inline => observed,
            _ => observed
                .and_then(|o| o.get(field.wire_name))
                .and_then(Value::as_object),
        };
        let seen_raw = observed
            .and_then(|o| o.get(field.wire_name))
            .filter(|v| !v.is_null());

        let Some(value) = fields.get(field.name) else {
            if field.generated
                && let Some(raw) = seen_raw
            {
                out.insert(field.wire_name.to_string(), raw.clone());
            }
            continue;
        };

        match field.kind {
            FieldKind::Scalar(_) => {
                if field.generated
                    && !value.is_populated()
                    && let Some(raw) = seen_raw
                {
                    out.insert(field.wire_name.to_string(), raw.clone());
                    continue;
                }
                let scalar = value
                    .as_scalar()
                    .ok_or_else(|| Error::invalid_value(&here, "expected a scalar"))?;
                if let Some(wire) = scalar_to_wire(field, scalar, &here)? {
                    out.insert(field.wire_name.to_string(), wire);
                }
            }
            FieldKind::List(elem) => {
                let items = value
                    .as_list()
                    .ok_or_else(|| Error::invalid_value(&here, "expected a list"))?;
                let seen_items = observed_items(field, seen_raw);
                let expanded = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        expand_elem(&elem, item, seen_items.get(i).copied(), &format!("{here}.{i}"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                out.insert(field.wire_name.to_string(), wrap_items(field, expanded));
            }
            FieldKind::Set(elem) => {
                let set = value
                    .as_set()
                    .ok_or_else(|| Error::invalid_value(&here, "expected a set"))?;
                let seen_items = observed_items(field, seen_raw);
                let expanded = set
                    .values()
                    .map(|member| {
                        let partner = match elem {
                            ElemSpec::Block(sub) => find_partner(sub, member, &seen_items),
                            ElemSpec::Scalar(_) => None,
                        };
                        expand_elem(&elem, member, partner, &here)
                    })
                    .collect::<Result<Vec<_>>>()?;
                out.insert(field.wire_name.to_string(), wrap_items(field, expanded));
            }
            FieldKind::Map => {
                let map = value
                    .as_map()
                    .ok_or_else(|| Error::invalid_value(&here, "expected a map"))?;
                let object: Map<String, Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                out.insert(field.wire_name.to_string(), Value::Object(object));
            }
            FieldKind::Block(sub) => {
                let inner = value
                    .as_block()
                    .ok_or_else(|| Error::invalid_value(&here, "expected a block"))?;
                let mut object = Map::new();
                if inner.is_empty() {
                    if field.presence == Presence::Required || fallback_target(field.name) {
                        expand_block(sub, &defaults_of(sub), seen, &here, &mut object)?;
                    } else if let Some(flag) = sub.enabled_flag {
                        object.insert(flag.to_string(), Value::Bool(false));
                    } else {
                        continue;
                    }
                } else {
                    expand_block(sub, inner, seen, &here, &mut object)?;
                    if let Some(flag) = sub.enabled_flag {
                        object.insert(flag.to_string(), Value::Bool(true));
                    }
                }
                if field.wire == Wire::Inline {
                    out.extend(object);
                } else {
                    out.insert(field.wire_name.to_string(), Value::Object(object));
                }
            }
        }
    }
    Ok(())
}

fn expand_elem(
    elem: &ElemSpec,
    value: &ConfigValue,
    observed: Option<&Value>,
    path: &str,
) -> Result<Value> {
    match elem {
        ElemSpec::Scalar(_) => value
            .as_scalar()
            .map(Scalar::to_json)
            .ok_or_else(|| Error::invalid_value(path, "expected a scalar")),
        ElemSpec::Block(sub) => {
            let fields = value
                .as_block()
                .ok_or_else(|| Error::invalid_value(path, "expected a block"))?;
            let mut object = Map::new();
            expand_block(sub, fields, observed.and_then(Value::as_object), path, &mut object)?;
            Ok(Value::Object(object))
        }
    }
}

fn scalar_to_wire(field: &FieldSpec, scalar: &Scalar, path: &str) -> Result<Option<Value>> {
    let wire = match field.wire {
        Wire::ValueObject => json!({ "Value": scalar.to_json() }),
        Wire::EnumIndex(names) => {
            let name = scalar.to_string();
            let index = names
                .iter()
                .position(|n| *n == name)
                .ok_or_else(|| Error::invalid_value(path, format!("`{name}` is not a known value")))?;
            Value::from(index)
        }
        Wire::JsonString => {
            let text = scalar.to_string();
            if text.is_empty() {
                return Ok(None);
            }
            serde_json::from_str(&text)
                .map_err(|e| Error::invalid_value(path, format!("not valid JSON: {e}")))?
        }
        _ => scalar.to_json(),
    };
    Ok(Some(wire))
}

fn wrap_items(field: &FieldSpec, items: Vec<Value>) -> Value {
    match field.wire {
        Wire::Quantity => json!({ "Quantity": items.len(), "Items": items }),
        _ => Value::Array(items),
    }
}

/// Elements of an observed collection, unwrapping `{"Quantity", "Items"}`.
pub(crate) fn observed_items<'v>(field: &FieldSpec, raw: Option<&'v Value>) -> Vec<&'v Value> {
    let array = match (field.wire, raw) {
        (Wire::Quantity, Some(v)) => v.get("Items").and_then(Value::as_array),
        (_, Some(v)) => v.as_array(),
        (_, None) => None,
    };
    array.map(|a| a.iter().collect()).unwrap_or_default()
}

/// The observed element with the same natural key as `member`.
fn find_partner<'v>(spec: &BlockSpec, member: &ConfigValue, seen: &[&'v Value]) -> Option<&'v Value> {
    let key_field = spec.field(spec.natural_key?)?;
    let key = member.field(key_field.name)?.as_scalar()?.to_json();
    seen.iter()
        .copied()
        .find(|item| item.get(key_field.wire_name) == Some(&key))
}

fn defaults_of(spec: &BlockSpec) -> BTreeMap<String, ConfigValue> {
    spec.fields
        .iter()
        .filter_map(|f| f.default.map(|d| (f.name.to_string(), d.to_value())))
        .collect()
}
