//! Decoding user documents and bringing trees into canonical form.
//!
//! [`decode`] turns a JSON document into a typed [`ConfigValue`] tree,
//! [`normalize`] applies catalog defaults, exclusive-group fallbacks and
//! dependency gating, and [`with_computed`] folds remote-only values from an
//! observed tree into a desired one so that diffing compares like with like.

use crate::error::{Error, Result};
use crate::hash::hash_element;
use crate::schema::{
    BlockSpec, ElemSpec, ExclusiveGroup, FieldKind, FieldSpec, Presence, ScalarType, Validator,
    Wire,
};
use crate::value::{ConfigValue, Scalar, ValueSet};
use serde_json::Value;
use std::collections::BTreeMap;

/// Join a dotted path prefix and a field name.
pub(crate) fn qualify(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

fn type_error(path: &str, expected: &str, got: &str) -> Error {
    Error::invalid_value(path, format!("expected {expected}, got {got}"))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The exclusive group a block resolved to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Selection {
    pub group: &'static ExclusiveGroup,
    /// Nothing was populated; the group's fallback values apply.
    pub fallback: bool,
}

/// Decide which exclusive group of `spec` is in effect.
pub(crate) fn select_group(
    spec: &BlockSpec,
    fields: &BTreeMap<String, ConfigValue>,
    path: &str,
) -> Result<Option<Selection>> {
    if spec.exclusive.is_empty() {
        return Ok(None);
    }
    let populated: Vec<&'static ExclusiveGroup> = spec
        .exclusive
        .iter()
        .filter(|group| group.is_populated(fields))
        .collect();
    match populated.as_slice() {
        [first, second, ..] => Err(Error::ConfigConflict {
            first: qualify(path, first.name),
            second: qualify(path, second.name),
        }),
        [only] => Ok(Some(Selection {
            group: *only,
            fallback: false,
        })),
        [] => match spec.exclusive.iter().find(|g| !g.fallback.is_empty()) {
            Some(group) => Ok(Some(Selection {
                group,
                fallback: true,
            })),
            None => {
                let names: Vec<&str> = spec.exclusive.iter().map(|g| g.name).collect();
                let scope = if path.is_empty() { spec.name } else { path };
                Err(Error::ConfigIncomplete {
                    what: format!("one of [{}] must be set in `{scope}`", names.join(", ")),
                })
            }
        },
    }
}

/// Decode a JSON document into a configuration tree for `spec`.
///
/// Unknown fields, wrongly typed values and computed-only fields are
/// rejected. `null` counts as absent.
pub fn decode(spec: &BlockSpec, json: &Value) -> Result<ConfigValue> {
    decode_block(spec, json, "").map(ConfigValue::Block)
}

fn decode_block(spec: &BlockSpec, json: &Value, path: &str) -> Result<BTreeMap<String, ConfigValue>> {
    let object = json
        .as_object()
        .ok_or_else(|| type_error(if path.is_empty() { spec.name } else { path }, "object", json_kind(json)))?;
    let mut out = BTreeMap::new();
    for (name, raw) in object {
        let here = qualify(path, name);
        let field = spec
            .field(name)
            .ok_or_else(|| Error::invalid_value(&here, format!("unknown field in {}", spec.name)))?;
        if field.is_computed_only() {
            return Err(Error::invalid_value(&here, "field is computed and cannot be set"));
        }
        if raw.is_null() {
            continue;
        }
        out.insert(name.clone(), decode_field(field, raw, &here)?);
    }
    Ok(out)
}

fn decode_field(field: &FieldSpec, raw: &Value, path: &str) -> Result<ConfigValue> {
    match field.kind {
        FieldKind::Scalar(ScalarType::String) if field.wire == Wire::JsonString && !raw.is_string() => {
            Ok(ConfigValue::string(raw.to_string()))
        }
        FieldKind::Scalar(t) => decode_scalar(t, raw, path).map(ConfigValue::Scalar),
        FieldKind::List(elem) => {
            let items = raw
                .as_array()
                .ok_or_else(|| type_error(path, "array", json_kind(raw)))?;
            items
                .iter()
                .enumerate()
                .map(|(i, item)| decode_elem(&elem, item, &format!("{path}.{i}")))
                .collect::<Result<Vec<_>>>()
                .map(ConfigValue::List)
        }
        FieldKind::Set(elem) => {
            let items = raw
                .as_array()
                .ok_or_else(|| type_error(path, "array", json_kind(raw)))?;
            let mut set = ValueSet::new();
            for (i, item) in items.iter().enumerate() {
                let member = decode_elem(&elem, item, &format!("{path}.{i}"))?;
                set.insert_keyed(hash_element(&elem, &member), member);
            }
            Ok(ConfigValue::Set(set))
        }
        FieldKind::Map => {
            let object = raw
                .as_object()
                .ok_or_else(|| type_error(path, "object", json_kind(raw)))?;
            let mut map = BTreeMap::new();
            for (k, v) in object {
                let s = v
                    .as_str()
                    .ok_or_else(|| type_error(&qualify(path, k), "string", json_kind(v)))?;
                map.insert(k.clone(), s.to_string());
            }
            Ok(ConfigValue::Map(map))
        }
        FieldKind::Block(sub) => decode_block(sub, raw, path).map(ConfigValue::Block),
    }
}

fn decode_elem(elem: &ElemSpec, raw: &Value, path: &str) -> Result<ConfigValue> {
    match elem {
        ElemSpec::Scalar(t) => decode_scalar(*t, raw, path).map(ConfigValue::Scalar),
        ElemSpec::Block(sub) => decode_block(sub, raw, path).map(ConfigValue::Block),
    }
}

pub(crate) fn decode_scalar(t: ScalarType, raw: &Value, path: &str) -> Result<Scalar> {
    let scalar = match (t, raw) {
        (ScalarType::String, Value::String(s)) => Some(Scalar::String(s.clone())),
        (ScalarType::Int, Value::Number(n)) => n.as_i64().map(Scalar::Int),
        (ScalarType::Float, Value::Number(n)) => n.as_f64().map(Scalar::Float),
        (ScalarType::Bool, Value::Bool(b)) => Some(Scalar::Bool(*b)),
        _ => None,
    };
    scalar.ok_or_else(|| type_error(path, t.name(), json_kind(raw)))
}

/// Bring a configuration tree into canonical form.
///
/// Missing fields get their catalog default; unset collections and optional
/// blocks become explicit empties; exclusive families are checked and
/// fall back when nothing is set; gated dependents are dropped. The result
/// is a fixed point: normalizing it again changes nothing.
pub fn normalize(spec: &BlockSpec, value: &ConfigValue) -> Result<ConfigValue> {
    normalize_block(spec, value, "").map(ConfigValue::Block)
}

fn normalize_block(
    spec: &BlockSpec,
    value: &ConfigValue,
    path: &str,
) -> Result<BTreeMap<String, ConfigValue>> {
    let fields = value
        .as_block()
        .ok_or_else(|| type_error(if path.is_empty() { spec.name } else { path }, "block", value.kind_name()))?;
    if let Some(name) = fields.keys().find(|name| spec.field(name).is_none()) {
        return Err(Error::invalid_value(
            qualify(path, name),
            format!("unknown field in {}", spec.name),
        ));
    }

    let mut out = BTreeMap::new();
    for field in spec.fields {
        let here = qualify(path, field.name);
        let normalized = match fields.get(field.name) {
            Some(v) => normalize_field(field, v, &here)?,
            None => match (field.default, field.presence, field.kind) {
                (Some(default), _, _) => default.to_value(),
                (None, Presence::Required, _) => {
                    return Err(Error::ConfigIncomplete {
                        what: format!("`{here}` is required"),
                    });
                }
                (None, Presence::Computed, _) | (None, _, FieldKind::Scalar(_)) => continue,
                (None, _, FieldKind::List(_)) => ConfigValue::List(Vec::new()),
                (None, _, FieldKind::Set(_)) => ConfigValue::Set(ValueSet::new()),
                (None, _, FieldKind::Map) => ConfigValue::Map(BTreeMap::new()),
                (None, _, FieldKind::Block(_)) => ConfigValue::empty_block(),
            },
        };
        out.insert(field.name.to_string(), normalized);
    }

    if let Some(selection) = select_group(spec, &out, path)?
        && selection.fallback
    {
        for (name, default) in selection.group.fallback {
            out.insert((*name).to_string(), default.to_value());
        }
    }
    spec.apply_gating(&mut out);
    Ok(out)
}

fn normalize_field(field: &FieldSpec, value: &ConfigValue, path: &str) -> Result<ConfigValue> {
    match field.kind {
        FieldKind::Scalar(t) => {
            normalize_scalar(t, field.wire, field.validator, value, path).map(ConfigValue::Scalar)
        }
        FieldKind::List(elem) => {
            let items = value
                .as_list()
                .ok_or_else(|| type_error(path, "list", value.kind_name()))?;
            items
                .iter()
                .enumerate()
                .map(|(i, item)| normalize_elem(&elem, item, &format!("{path}.{i}")))
                .collect::<Result<Vec<_>>>()
                .map(ConfigValue::List)
        }
        FieldKind::Set(elem) => {
            let members: Vec<&ConfigValue> = match value {
                ConfigValue::Set(set) => set.values().collect(),
                ConfigValue::List(items) => items.iter().collect(),
                other => return Err(type_error(path, "set", other.kind_name())),
            };
            let mut set = ValueSet::new();
            for member in members {
                let normalized = normalize_elem(&elem, member, &member_path(&elem, member, path))?;
                set.insert_keyed(hash_element(&elem, &normalized), normalized);
            }
            Ok(ConfigValue::Set(set))
        }
        FieldKind::Map => match value {
            ConfigValue::Map(_) => Ok(value.clone()),
            other => Err(type_error(path, "map", other.kind_name())),
        },
        FieldKind::Block(sub) => {
            let required = field.presence == Presence::Required;
            if !required && value.as_block().is_some_and(|f| f.is_empty()) {
                return Ok(ConfigValue::empty_block());
            }
            let normalized = ConfigValue::Block(normalize_block(sub, value, path)?);
            if !required && !normalized.is_populated() {
                Ok(ConfigValue::empty_block())
            } else {
                Ok(normalized)
            }
        }
    }
}

/// Dotted path of a set member: its natural key when it has one, else its hash.
fn member_path(elem: &ElemSpec, member: &ConfigValue, path: &str) -> String {
    if let ElemSpec::Block(spec) = elem
        && let Some(key) = spec.natural_key
        && let Some(value) = member.field(key).and_then(ConfigValue::as_scalar)
    {
        return format!("{path}[{key}={value}]");
    }
    format!("{path}.#{}", hash_element(elem, member))
}

fn normalize_elem(elem: &ElemSpec, value: &ConfigValue, path: &str) -> Result<ConfigValue> {
    match elem {
        ElemSpec::Scalar(t) => {
            normalize_scalar(*t, Wire::Plain, None, value, path).map(ConfigValue::Scalar)
        }
        ElemSpec::Block(sub) => normalize_block(sub, value, path).map(ConfigValue::Block),
    }
}

fn normalize_scalar(
    t: ScalarType,
    wire: Wire,
    validator: Option<Validator>,
    value: &ConfigValue,
    path: &str,
) -> Result<Scalar> {
    let scalar = value
        .as_scalar()
        .ok_or_else(|| type_error(path, t.name(), value.kind_name()))?;
    let scalar = match (t, scalar) {
        (ScalarType::String, Scalar::String(s)) if wire == Wire::JsonString => {
            Scalar::String(canonical_json(s, path)?)
        }
        (ScalarType::String, Scalar::String(_))
        | (ScalarType::Int, Scalar::Int(_))
        | (ScalarType::Float, Scalar::Float(_))
        | (ScalarType::Bool, Scalar::Bool(_)) => scalar.clone(),
        (ScalarType::Float, Scalar::Int(i)) => Scalar::Float(*i as f64),
        (t, other) => return Err(type_error(path, t.name(), other.type_name())),
    };

    if let Wire::EnumIndex(names) = wire {
        check_one_of(&scalar, names, path)?;
    }
    match validator {
        Some(Validator::OneOf(allowed)) => check_one_of(&scalar, allowed, path)?,
        Some(Validator::Range(min, max)) => {
            if let Some(i) = scalar.as_int()
                && !(min..=max).contains(&i)
            {
                return Err(Error::invalid_value(
                    path,
                    format!("{i} is outside the range {min}..={max}"),
                ));
            }
        }
        None => {}
    }
    Ok(scalar)
}

fn check_one_of(scalar: &Scalar, allowed: &[&str], path: &str) -> Result<()> {
    match scalar.as_str() {
        Some(s) if !s.is_empty() && !allowed.contains(&s) => Err(Error::invalid_value(
            path,
            format!("`{s}` is not one of [{}]", allowed.join(", ")),
        )),
        _ => Ok(()),
    }
}

/// Re-serialize a JSON document with sorted keys and no whitespace.
pub(crate) fn canonical_json(text: &str, path: &str) -> Result<String> {
    if text.trim().is_empty() {
        return Ok(String::new());
    }
    let parsed: Value = serde_json::from_str(text)
        .map_err(|e| Error::invalid_value(path, format!("not valid JSON: {e}")))?;
    Ok(parsed.to_string())
}

/// Fold remote-only values from `observed` into `desired`.
///
/// Computed-only fields take the observed value; optional-computed fields
/// the user left unset do too. Set members are paired by natural key when
/// the element block declares one, otherwise by content hash.
pub fn with_computed(spec: &BlockSpec, desired: &ConfigValue, observed: &ConfigValue) -> ConfigValue {
    match (desired.as_block(), observed.as_block()) {
        (Some(d), Some(o)) => ConfigValue::Block(merge_block(spec, d, o)),
        _ => desired.clone(),
    }
}

fn merge_block(
    spec: &BlockSpec,
    desired: &BTreeMap<String, ConfigValue>,
    observed: &BTreeMap<String, ConfigValue>,
) -> BTreeMap<String, ConfigValue> {
    let mut out = desired.clone();
    for field in spec.fields {
        let name = field.name;
        match field.presence {
            Presence::Computed => {
                match observed.get(name) {
                    Some(v) => out.insert(name.to_string(), v.clone()),
                    None => out.remove(name),
                };
                continue;
            }
            Presence::OptionalComputed
                if !desired.get(name).is_some_and(ConfigValue::is_populated) =>
            {
                if let Some(v) = observed.get(name) {
                    out.insert(name.to_string(), v.clone());
                }
                continue;
            }
            _ => {}
        }

        let (Some(d), Some(o)) = (desired.get(name), observed.get(name)) else {
            continue;
        };
        let merged = match (field.kind, d, o) {
            (FieldKind::Block(sub), _, _) => with_computed(sub, d, o),
            (FieldKind::List(ElemSpec::Block(sub)), ConfigValue::List(ds), ConfigValue::List(os)) => {
                ConfigValue::List(
                    ds.iter()
                        .enumerate()
                        .map(|(i, item)| match os.get(i) {
                            Some(seen) => with_computed(sub, item, seen),
                            None => item.clone(),
                        })
                        .collect(),
                )
            }
            (FieldKind::Set(elem @ ElemSpec::Block(sub)), ConfigValue::Set(ds), ConfigValue::Set(os)) => {
                ConfigValue::Set(merge_set(sub, &elem, ds, os))
            }
            _ => continue,
        };
        out.insert(name.to_string(), merged);
    }
    out
}

fn merge_set(spec: &BlockSpec, elem: &ElemSpec, desired: &ValueSet, observed: &ValueSet) -> ValueSet {
    let mut out = ValueSet::new();
    for (key, member) in desired.iter() {
        let partner = match spec.natural_key {
            Some(field) => member
                .field(field)
                .and_then(ConfigValue::as_scalar)
                .and_then(|natural| observed.find_by(field, &natural.to_string()))
                .map(|(_, seen)| seen),
            None => observed.get(key),
        };
        match partner {
            Some(seen) => {
                let merged = with_computed(spec, member, seen);
                out.insert_keyed(hash_element(elem, &merged), merged);
            }
            None => {
                out.insert_keyed(*key, member.clone());
            }
        }
    }
    out
}
