//! Remote payload to configuration tree.
//!
//! Flattening is the inverse of expansion. Missing scalars read back as
//! their catalog default, missing collections as empty, missing or disabled
//! blocks as explicit empties. Generated values are hidden unless the prior
//! configuration referenced them. A payload whose shape disagrees with the
//! catalog is a fatal remote error.

use crate::error::{Error, Result};
use crate::expand::observed_items;
use crate::hash::hash_element;
use crate::normalize::{canonical_json, decode_scalar, qualify};
use crate::schema::{BlockSpec, ElemSpec, FieldKind, FieldSpec, Presence, ScalarType, Wire};
use crate::types::DomainObject;
use crate::value::{ConfigValue, Scalar, ValueSet};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Flatten a remote payload for `spec` into a configuration tree.
pub fn flatten(spec: &BlockSpec, domain: &DomainObject) -> Result<ConfigValue> {
    flatten_with_prior(spec, domain, None)
}

/// Flatten, consulting the configuration the payload was produced from.
///
/// The prior configuration decides whether generated fields are surfaced
/// and supplies local fields the remote side never returns.
pub fn flatten_with_prior(
    spec: &BlockSpec,
    domain: &DomainObject,
    prior: Option<&ConfigValue>,
) -> Result<ConfigValue> {
    let object = domain
        .as_json()
        .as_object()
        .ok_or_else(|| Error::malformed(format!("{}: expected an object", spec.name)))?;
    flatten_block(spec, object, prior.and_then(ConfigValue::as_block), "").map(ConfigValue::Block)
}

fn mismatch(path: &str, expected: &str, raw: &Value) -> Error {
    Error::malformed(format!("`{path}`: expected {expected}, got {raw}"))
}

fn flatten_block(
    spec: &BlockSpec,
    object: &Map<String, Value>,
    prior: Option<&BTreeMap<String, ConfigValue>>,
    path: &str,
) -> Result<BTreeMap<String, ConfigValue>> {
    let mut out = BTreeMap::new();
    for field in spec.fields {
        let here = qualify(path, field.name);
        let prior_value = prior.and_then(|p| p.get(field.name));

        if field.is_local() {
            if let Some(value) = prior_value.cloned().or_else(|| field.default.map(|d| d.to_value())) {
                out.insert(field.name.to_string(), value);
            }
            continue;
        }

        let raw = object.get(field.wire_name).filter(|v| !v.is_null());
        let value = match field.kind {
            FieldKind::Scalar(t) => {
                let referenced = prior_value.is_some_and(ConfigValue::is_populated);
                match raw {
                    Some(raw) if !field.generated || referenced => {
                        ConfigValue::Scalar(wire_to_scalar(field, t, raw, &here)?)
                    }
                    _ => match field.default {
                        Some(default) => default.to_value(),
                        None => continue,
                    },
                }
            }
            FieldKind::List(elem) => {
                let items = collection(field, raw, &here)?;
                let prior_items = prior_value.and_then(ConfigValue::as_list).unwrap_or_default();
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| flatten_elem(&elem, item, prior_items.get(i), &format!("{here}.{i}")))
                    .collect::<Result<Vec<_>>>()
                    .map(ConfigValue::List)?
            }
            FieldKind::Set(elem) => {
                let items = collection(field, raw, &here)?;
                let prior_set = prior_value.and_then(ConfigValue::as_set);
                let mut set = ValueSet::new();
                for item in items {
                    let partner = match (elem, prior_set) {
                        (ElemSpec::Block(sub), Some(prior_set)) => prior_partner(sub, item, prior_set),
                        _ => None,
                    };
                    let member = flatten_elem(&elem, item, partner, &here)?;
                    set.insert_keyed(hash_element(&elem, &member), member);
                }
                ConfigValue::Set(set)
            }
            FieldKind::Map => match raw {
                None => ConfigValue::Map(BTreeMap::new()),
                Some(Value::Object(map)) => {
                    let mut out = BTreeMap::new();
                    for (k, v) in map {
                        let s = v.as_str().ok_or_else(|| mismatch(&qualify(&here, k), "string", v))?;
                        out.insert(k.clone(), s.to_string());
                    }
                    ConfigValue::Map(out)
                }
                Some(other) => return Err(mismatch(&here, "object", other)),
            },
            FieldKind::Block(sub) => {
                let inner = match (field.wire, raw) {
                    (Wire::Inline, _) => sub
                        .fields
                        .iter()
                        .any(|f| object.contains_key(f.wire_name))
                        .then_some(object),
                    (_, None) => None,
                    (_, Some(Value::Object(inner))) => Some(inner),
                    (_, Some(other)) => return Err(mismatch(&here, "object", other)),
                };
                let disabled = |inner: &Map<String, Value>| {
                    sub.enabled_flag
                        .is_some_and(|flag| inner.get(flag) == Some(&Value::Bool(false)))
                };
                match inner {
                    Some(inner) if !disabled(inner) => {
                        let block = ConfigValue::Block(flatten_block(
                            sub,
                            inner,
                            prior_value.and_then(ConfigValue::as_block),
                            &here,
                        )?);
                        if field.presence != Presence::Required && !block.is_populated() {
                            ConfigValue::empty_block()
                        } else {
                            block
                        }
                    }
                    _ => ConfigValue::empty_block(),
                }
            }
        };
        out.insert(field.name.to_string(), value);
    }
    spec.apply_gating(&mut out);
    Ok(out)
}

fn collection<'v>(field: &FieldSpec, raw: Option<&'v Value>, path: &str) -> Result<Vec<&'v Value>> {
    match (field.wire, raw) {
        (_, None) => Ok(Vec::new()),
        (Wire::Quantity, Some(v @ Value::Object(_))) => match v.get("Items") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(_)) => Ok(observed_items(field, raw)),
            Some(other) => Err(mismatch(path, "an Items array", other)),
        },
        (Wire::Quantity, Some(other)) => Err(mismatch(path, "a Quantity/Items object", other)),
        (_, Some(Value::Array(_))) => Ok(observed_items(field, raw)),
        (_, Some(other)) => Err(mismatch(path, "an array", other)),
    }
}

fn flatten_elem(
    elem: &ElemSpec,
    raw: &Value,
    prior: Option<&ConfigValue>,
    path: &str,
) -> Result<ConfigValue> {
    match elem {
        ElemSpec::Scalar(t) => decode_scalar(*t, raw, path)
            .map(ConfigValue::Scalar)
            .map_err(|_| mismatch(path, t.name(), raw)),
        ElemSpec::Block(sub) => {
            let object = raw.as_object().ok_or_else(|| mismatch(path, "object", raw))?;
            flatten_block(sub, object, prior.and_then(ConfigValue::as_block), path)
                .map(ConfigValue::Block)
        }
    }
}

/// The prior member whose natural key matches the raw element.
fn prior_partner<'p>(spec: &BlockSpec, raw: &Value, prior: &'p ValueSet) -> Option<&'p ConfigValue> {
    let key_field = spec.field(spec.natural_key?)?;
    let key = match raw.get(key_field.wire_name)? {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    prior.find_by(key_field.name, &key).map(|(_, member)| member)
}

fn wire_to_scalar(field: &FieldSpec, t: ScalarType, raw: &Value, path: &str) -> Result<Scalar> {
    match field.wire {
        Wire::ValueObject => {
            let inner = match raw {
                Value::Object(object) => object.get("Value").unwrap_or(&Value::Null),
                other => other,
            };
            decode_scalar(t, inner, path).map_err(|_| mismatch(path, t.name(), raw))
        }
        Wire::EnumIndex(names) => {
            let name = match raw {
                Value::Number(n) => n
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .and_then(|i| names.get(i)),
                Value::String(s) => names.iter().find(|n| **n == s.as_str()),
                _ => None,
            };
            name.map(|n| Scalar::String((*n).to_string()))
                .ok_or_else(|| mismatch(path, &format!("one of {names:?}"), raw))
        }
        Wire::JsonString => {
            let text = match raw {
                Value::String(s) => canonical_json(s, path).map_err(|_| mismatch(path, "JSON", raw))?,
                other => other.to_string(),
            };
            Ok(Scalar::String(text))
        }
        _ => decode_scalar(t, raw, path).map_err(|_| mismatch(path, t.name(), raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::expand::expand;
    use crate::fixtures::DISTRIBUTION;
    use crate::normalize::{decode, normalize};
    use serde_json::json;

    fn normalized(doc: Value) -> ConfigValue {
        normalize(&DISTRIBUTION, &decode(&DISTRIBUTION, &doc).unwrap()).unwrap()
    }

    fn minimal() -> Value {
        json!({
            "tenant_id": "t-1",
            "enabled": true,
            "origin": [{"origin_id": "s3", "domain_name": "bucket.s3.amazonaws.com"}],
            "default_cache_behavior": {
                "target_origin_id": "s3",
                "viewer_protocol_policy": "redirect-to-https"
            },
            "viewer_certificate": {}
        })
    }

    #[test]
    fn test_flatten_inverts_expand() {
        let config = normalized(minimal());
        let wire = expand(&DISTRIBUTION, &config).unwrap();
        let back = flatten_with_prior(&DISTRIBUTION, &wire, Some(&config)).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_flatten_inverts_expand_with_populated_blocks() {
        let mut doc = minimal();
        doc["aliases"] = json!(["www.example.com", "example.com"]);
        doc["logging_config"] = json!({"bucket": "logs.s3.amazonaws.com", "prefix": "cdn/"});
        doc["backup_policy"] = json!({"interval_minutes": 60});
        doc["policy"] = json!("{\"Version\": \"2012-10-17\"}");
        doc["tags"] = json!({"team": "web"});
        doc["ordered_cache_behavior"] = json!([
            {"path_pattern": "/api/*", "target_origin_id": "s3"},
            {"path_pattern": "/img/*", "target_origin_id": "s3"}
        ]);
        doc["origin"] = json!([
            {"origin_id": "s3", "domain_name": "bucket.s3.amazonaws.com"},
            {"origin_id": "api", "domain_name": "api.example.com",
             "custom_header": [{"name": "X-Key", "value": "k"}],
             "custom_origin_config": {"origin_protocol_policy": "https-only",
                                      "origin_ssl_protocols": ["TLSv1.2"]}}
        ]);
        let config = normalized(doc);
        let wire = expand(&DISTRIBUTION, &config).unwrap();
        let back = flatten_with_prior(&DISTRIBUTION, &wire, Some(&config)).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_flatten_ignores_key_and_item_order() {
        let first: Value = serde_json::from_str(
            r#"{
                "Enabled": true,
                "Aliases": {"Quantity": 2, "Items": ["a.example.com", "b.example.com"]},
                "Origins": {"Quantity": 2, "Items": [
                    {"Id": "s3", "DomainName": "bucket.s3.amazonaws.com"},
                    {"Id": "api", "DomainName": "api.example.com",
                     "CustomHeaders": {"Quantity": 2, "Items": [
                        {"HeaderName": "X-A", "HeaderValue": "1"},
                        {"HeaderName": "X-B", "HeaderValue": "2"}
                     ]}}
                ]}
            }"#,
        )
        .unwrap();
        let second: Value = serde_json::from_str(
            r#"{
                "Origins": {"Items": [
                    {"CustomHeaders": {"Items": [
                        {"HeaderValue": "2", "HeaderName": "X-B"},
                        {"HeaderValue": "1", "HeaderName": "X-A"}
                     ], "Quantity": 2},
                     "DomainName": "api.example.com", "Id": "api"},
                    {"DomainName": "bucket.s3.amazonaws.com", "Id": "s3"}
                ], "Quantity": 2},
                "Aliases": {"Items": ["b.example.com", "a.example.com"], "Quantity": 2},
                "Enabled": true
            }"#,
        )
        .unwrap();

        let a = flatten(&DISTRIBUTION, &DomainObject::new(first)).unwrap();
        let b = flatten(&DISTRIBUTION, &DomainObject::new(second)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.lookup("origin").unwrap().as_set().unwrap().len(), 2);
        assert_eq!(
            a.lookup("origin[origin_id=api].custom_header")
                .unwrap()
                .as_set()
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_flatten_missing_values_read_as_defaults() {
        let back = flatten(&DISTRIBUTION, &DomainObject::new(json!({"Enabled": false}))).unwrap();
        assert_eq!(back.lookup("comment").unwrap().as_str(), Some(""));
        assert_eq!(back.lookup("http_version").unwrap().as_str(), Some("http2"));
        assert!(back.lookup("aliases").unwrap().as_set().unwrap().is_empty());
        assert!(back.lookup("ordered_cache_behavior").unwrap().as_list().unwrap().is_empty());
        assert!(back.lookup("logging_config").unwrap().is_empty());
        assert!(back.lookup("backup_policy").unwrap().is_empty());
        assert!(back.lookup("tenant_id").is_err());
    }

    #[test]
    fn test_flatten_disabled_block_is_empty() {
        let wire = DomainObject::new(json!({
            "Logging": {"Enabled": false, "Bucket": "", "Prefix": "", "IncludeCookies": false}
        }));
        let back = flatten(&DISTRIBUTION, &wire).unwrap();
        assert!(back.lookup("logging_config").unwrap().is_empty());
    }

    #[test]
    fn test_flatten_includes_computed_fields() {
        let wire = DomainObject::new(json!({
            "Status": "InProgress",
            "DomainName": "d111111abcdef8.cloudfront.net"
        }));
        let back = flatten(&DISTRIBUTION, &wire).unwrap();
        assert_eq!(back.lookup("status").unwrap().as_str(), Some("InProgress"));
    }

    #[test]
    fn test_flatten_hides_generated_unless_referenced() {
        let wire = DomainObject::new(json!({
            "Origins": {"Quantity": 1, "Items": [{
                "Id": "s3",
                "DomainName": "bucket.s3.amazonaws.com",
                "S3OriginConfig": {"OriginAccessIdentity": "origin-access-identity/cloudfront/E2"}
            }]}
        }));
        let back = flatten(&DISTRIBUTION, &wire).unwrap();
        assert!(back.lookup("origin[origin_id=s3].s3_origin_config").unwrap().is_empty());

        let prior = ConfigValue::block([(
            "origin",
            ConfigValue::set([ConfigValue::block([
                ("origin_id", ConfigValue::string("s3")),
                (
                    "s3_origin_config",
                    ConfigValue::block([(
                        "origin_access_identity",
                        ConfigValue::string("origin-access-identity/cloudfront/E2"),
                    )]),
                ),
            ])]),
        )]);
        let back = flatten_with_prior(&DISTRIBUTION, &wire, Some(&prior)).unwrap();
        assert_eq!(
            back.lookup("origin[origin_id=s3].s3_origin_config.origin_access_identity")
                .unwrap()
                .as_str(),
            Some("origin-access-identity/cloudfront/E2")
        );
    }

    #[test]
    fn test_flatten_gates_dependents() {
        let wire = DomainObject::new(json!({
            "DefaultCacheBehavior": {
                "TargetOriginId": "s3",
                "ViewerProtocolPolicy": {"Value": "allow-all"},
                "CachePolicyId": "658327ea",
                "DefaultTTL": 0
            }
        }));
        let back = flatten(&DISTRIBUTION, &wire).unwrap();
        assert!(back.lookup("default_cache_behavior.default_ttl").is_err());
        assert!(back.lookup("default_cache_behavior.min_ttl").is_err());
    }

    #[test]
    fn test_flatten_type_mismatch_is_fatal() {
        let wire = DomainObject::new(json!({"Comment": 5}));
        let err = flatten(&DISTRIBUTION, &wire).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Fatal);

        let wire = DomainObject::new(json!({"Aliases": ["a"]}));
        assert_eq!(
            flatten(&DISTRIBUTION, &wire).unwrap_err().category(),
            ErrorCategory::Fatal
        );

        let wire = DomainObject::new(json!({"Consistency": 9}));
        assert!(flatten(&DISTRIBUTION, &wire).is_err());
    }
}
