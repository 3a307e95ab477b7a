//! CloudFront web distributions.
//!
//! The management API wraps the AWS distribution API: the configuration is
//! sent as a `DistributionConfig` document, updates must carry the ETag of
//! the version they replace, and a distribution can only be deleted once it
//! has been disabled and the disabled configuration is deployed.

use crate::context::ProviderContext;
use crate::lifecycle::{ResourceKind, wait_until};
use async_trait::async_trait;
use declarative::{
    BlockSpec, ConfigValue, DefaultValue, Dependency, DomainObject, ElemSpec, Error, ExclusiveGroup,
    FieldSpec, IdSegment, IdTemplate, MISSING, ResourceSchema, Result, ScalarType, Timeouts, ValueSet,
    Wire,
};
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::time::Duration;

/// Route 53 alias zone shared by every CloudFront distribution.
pub const HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

const MAX_COMMENT_LEN: usize = 128;

const STRINGS: ElemSpec = ElemSpec::Scalar(ScalarType::String);

static HEADER: BlockSpec = BlockSpec::new(
    "custom_header",
    &[
        FieldSpec::string("name", "HeaderName").required(),
        FieldSpec::string("value", "HeaderValue").required(),
    ],
);

static S3_ORIGIN: BlockSpec = BlockSpec::new(
    "s3_origin_config",
    &[FieldSpec::string("origin_access_identity", "OriginAccessIdentity")
        .default_str("")
        .optional_computed()
        .generated()],
);

static CUSTOM_ORIGIN: BlockSpec = BlockSpec::new(
    "custom_origin_config",
    &[
        FieldSpec::int("http_port", "HTTPPort").default_int(80),
        FieldSpec::int("https_port", "HTTPSPort").default_int(443),
        FieldSpec::int("origin_keepalive_timeout", "OriginKeepaliveTimeout").default_int(5),
        FieldSpec::int("origin_read_timeout", "OriginReadTimeout").default_int(30),
        FieldSpec::string("origin_protocol_policy", "OriginProtocolPolicy")
            .required()
            .wire(Wire::ValueObject)
            .one_of(&["http-only", "https-only", "match-viewer"]),
        FieldSpec::set("origin_ssl_protocols", "OriginSslProtocols", STRINGS)
            .required()
            .wire(Wire::Quantity),
    ],
);

static ORIGIN: BlockSpec = BlockSpec::new(
    "origin",
    &[
        FieldSpec::string("origin_id", "Id").required(),
        FieldSpec::string("domain_name", "DomainName").required(),
        FieldSpec::string("origin_path", "OriginPath").default_str(""),
        FieldSpec::int("connection_attempts", "ConnectionAttempts")
            .default_int(3)
            .range(1, 3),
        FieldSpec::int("connection_timeout", "ConnectionTimeout")
            .default_int(10)
            .range(1, 10),
        FieldSpec::set("custom_header", "CustomHeaders", ElemSpec::Block(&HEADER)).wire(Wire::Quantity),
        FieldSpec::block("s3_origin_config", "S3OriginConfig", &S3_ORIGIN),
        FieldSpec::block("custom_origin_config", "CustomOriginConfig", &CUSTOM_ORIGIN),
    ],
)
.keyed_by("origin_id")
.exclusive(&[
    ExclusiveGroup::new("s3_origin_config", &["s3_origin_config"])
        .fallback(&[("s3_origin_config", DefaultValue::EmptyBlock)]),
    ExclusiveGroup::new("custom_origin_config", &["custom_origin_config"]),
]);

static COOKIES: BlockSpec = BlockSpec::new(
    "cookies",
    &[
        FieldSpec::string("forward", "Forward")
            .required()
            .wire(Wire::ValueObject)
            .one_of(&["all", "none", "whitelist"]),
        FieldSpec::set("whitelisted_names", "WhitelistedNames", STRINGS).wire(Wire::Quantity),
    ],
);

static FORWARDED_VALUES: BlockSpec = BlockSpec::new(
    "forwarded_values",
    &[
        FieldSpec::bool("query_string", "QueryString").required(),
        FieldSpec::set("headers", "Headers", STRINGS).wire(Wire::Quantity),
        FieldSpec::list("query_string_cache_keys", "QueryStringCacheKeys", STRINGS).wire(Wire::Quantity),
        FieldSpec::block("cookies", "Cookies", &COOKIES).required(),
    ],
);

static LAMBDA_ASSOCIATION: BlockSpec = BlockSpec::new(
    "lambda_function_association",
    &[
        FieldSpec::string("event_type", "EventType")
            .required()
            .wire(Wire::ValueObject)
            .one_of(&["viewer-request", "viewer-response", "origin-request", "origin-response"]),
        FieldSpec::string("lambda_arn", "LambdaFunctionARN").required(),
        FieldSpec::bool("include_body", "IncludeBody").default_bool(false),
    ],
)
.keyed_by("event_type");

static FUNCTION_ASSOCIATION: BlockSpec = BlockSpec::new(
    "function_association",
    &[
        FieldSpec::string("event_type", "EventType")
            .required()
            .wire(Wire::ValueObject)
            .one_of(&["viewer-request", "viewer-response"]),
        FieldSpec::string("function_arn", "FunctionARN").required(),
    ],
)
.keyed_by("event_type");

/// Fields a managed cache policy takes over.
const TTL_GATING: &[Dependency] = &[Dependency {
    governor: "cache_policy_id",
    dependents: &["min_ttl", "default_ttl", "max_ttl", "forwarded_values"],
}];

macro_rules! behavior_fields {
    ($($extra:expr),* $(,)?) => {
        &[
            $($extra,)*
            FieldSpec::set("allowed_methods", "AllowedMethods", STRINGS)
                .required()
                .wire(Wire::Quantity),
            FieldSpec::set("cached_methods", "CachedMethods", STRINGS)
                .required()
                .wire(Wire::Quantity),
            FieldSpec::string("cache_policy_id", "CachePolicyId").default_str(""),
            FieldSpec::bool("compress", "Compress").default_bool(false),
            FieldSpec::int("min_ttl", "MinTTL").default_int(0),
            FieldSpec::int("default_ttl", "DefaultTTL").default_int(86_400),
            FieldSpec::int("max_ttl", "MaxTTL").default_int(31_536_000),
            FieldSpec::string("field_level_encryption_id", "FieldLevelEncryptionId").default_str(""),
            FieldSpec::string("origin_request_policy_id", "OriginRequestPolicyId").optional_computed(),
            FieldSpec::string("response_headers_policy_id", "ResponseHeadersPolicyId").optional_computed(),
            FieldSpec::string("realtime_log_config_arn", "RealtimeLogConfigArn").optional_computed(),
            FieldSpec::bool("smooth_streaming", "SmoothStreaming").default_bool(false),
            FieldSpec::string("target_origin_id", "TargetOriginId").required(),
            FieldSpec::string("viewer_protocol_policy", "ViewerProtocolPolicy")
                .required()
                .wire(Wire::ValueObject)
                .one_of(&["allow-all", "https-only", "redirect-to-https"]),
            FieldSpec::block("forwarded_values", "ForwardedValues", &FORWARDED_VALUES),
            FieldSpec::set(
                "lambda_function_association",
                "LambdaFunctionAssociations",
                ElemSpec::Block(&LAMBDA_ASSOCIATION),
            )
            .wire(Wire::Quantity),
            FieldSpec::set(
                "function_association",
                "FunctionAssociations",
                ElemSpec::Block(&FUNCTION_ASSOCIATION),
            )
            .wire(Wire::Quantity),
        ]
    };
}

static DEFAULT_BEHAVIOR: BlockSpec =
    BlockSpec::new("default_cache_behavior", behavior_fields!()).depends(TTL_GATING);

static ORDERED_BEHAVIOR: BlockSpec = BlockSpec::new(
    "ordered_cache_behavior",
    behavior_fields!(FieldSpec::string("path_pattern", "PathPattern").required()),
)
.depends(TTL_GATING);

static ERROR_RESPONSE: BlockSpec = BlockSpec::new(
    "custom_error_response",
    &[
        FieldSpec::int("error_code", "ErrorCode").required(),
        FieldSpec::string("response_code", "ResponseCode").optional_computed(),
        FieldSpec::string("response_page_path", "ResponsePagePath").default_str(""),
        FieldSpec::int("error_caching_min_ttl", "ErrorCachingMinTTL").optional_computed(),
    ],
)
.keyed_by("error_code");

static LOGGING: BlockSpec = BlockSpec::new(
    "logging_config",
    &[
        FieldSpec::string("bucket", "Bucket").required(),
        FieldSpec::bool("include_cookies", "IncludeCookies").default_bool(false),
        FieldSpec::string("prefix", "Prefix").default_str(""),
    ],
)
.enabled_by("Enabled");

static CERTIFICATE: BlockSpec = BlockSpec::new(
    "viewer_certificate",
    &[
        FieldSpec::string("acm_certificate_arn", "ACMCertificateArn"),
        FieldSpec::string("iam_certificate_id", "IAMCertificateId"),
        FieldSpec::bool("cloudfront_default_certificate", "CloudFrontDefaultCertificate").default_bool(false),
        FieldSpec::string("minimum_protocol_version", "MinimumProtocolVersion")
            .default_str("TLSv1.2_2021")
            .wire(Wire::ValueObject),
        FieldSpec::string("ssl_support_method", "SSLSupportMethod")
            .default_str("sni-only")
            .wire(Wire::ValueObject)
            .one_of(&["sni-only", "vip", "static-ip"]),
    ],
)
.exclusive(&[
    ExclusiveGroup::new("acm_certificate", &["acm_certificate_arn"]),
    ExclusiveGroup::new("iam_certificate", &["iam_certificate_id"]),
    ExclusiveGroup::new("default_certificate", &["cloudfront_default_certificate"])
        .fallback(&[("cloudfront_default_certificate", DefaultValue::Bool(true))]),
])
.depends(&[Dependency {
    governor: "cloudfront_default_certificate",
    dependents: &["ssl_support_method", "minimum_protocol_version"],
}]);

static GEO_RESTRICTION: BlockSpec = BlockSpec::new(
    "geo_restriction",
    &[
        FieldSpec::string("restriction_type", "RestrictionType")
            .required()
            .wire(Wire::ValueObject)
            .one_of(&["none", "whitelist", "blacklist"]),
        FieldSpec::set("locations", "Items", STRINGS),
    ],
);

static RESTRICTIONS: BlockSpec = BlockSpec::new(
    "restrictions",
    &[FieldSpec::block("geo_restriction", "GeoRestriction", &GEO_RESTRICTION).required()],
);

/// Root catalog of a distribution.
pub static DISTRIBUTION: BlockSpec = BlockSpec::new(
    "cloudfront_distribution",
    &[
        FieldSpec::string("tenant_id", "TenantId").required().wire(Wire::Local),
        FieldSpec::string("comment", "Comment").default_str(""),
        FieldSpec::string("default_root_object", "DefaultRootObject").default_str(""),
        FieldSpec::bool("enabled", "Enabled").required(),
        FieldSpec::string("http_version", "HttpVersion")
            .default_str("http2")
            .wire(Wire::ValueObject)
            .one_of(&["http1.1", "http2"]),
        FieldSpec::string("price_class", "PriceClass")
            .default_str("PriceClass_All")
            .wire(Wire::ValueObject)
            .one_of(&["PriceClass_All", "PriceClass_200", "PriceClass_100"]),
        FieldSpec::bool("is_ipv6_enabled", "IsIPV6Enabled").default_bool(false),
        FieldSpec::string("web_acl_id", "WebACLId").optional_computed(),
        FieldSpec::set("aliases", "Aliases", STRINGS).wire(Wire::Quantity),
        FieldSpec::set("origin", "Origins", ElemSpec::Block(&ORIGIN))
            .required()
            .wire(Wire::Quantity),
        FieldSpec::block("default_cache_behavior", "DefaultCacheBehavior", &DEFAULT_BEHAVIOR).required(),
        FieldSpec::list(
            "ordered_cache_behavior",
            "CacheBehaviors",
            ElemSpec::Block(&ORDERED_BEHAVIOR),
        )
        .wire(Wire::Quantity),
        FieldSpec::set(
            "custom_error_response",
            "CustomErrorResponses",
            ElemSpec::Block(&ERROR_RESPONSE),
        )
        .wire(Wire::Quantity),
        FieldSpec::block("logging_config", "Logging", &LOGGING),
        FieldSpec::block("viewer_certificate", "ViewerCertificate", &CERTIFICATE).required(),
        FieldSpec::block("restrictions", "Restrictions", &RESTRICTIONS),
        FieldSpec::bool("wait_for_deployment", "WaitForDeployment")
            .default_bool(true)
            .wire(Wire::Local),
        FieldSpec::bool("use_origin_access_identity", "UseOAIIdentity")
            .default_bool(true)
            .wire(Wire::Local),
        FieldSpec::string("status", "Status").computed(),
        FieldSpec::string("domain_name", "DomainName").computed(),
        FieldSpec::string("arn", "ARN").computed(),
        FieldSpec::string("etag", "ETag").computed(),
        FieldSpec::string("hosted_zone_id", "HostedZoneId").computed(),
    ],
);

pub static SCHEMA: ResourceSchema = ResourceSchema {
    kind: "cloudfront_distribution",
    description: "CloudFront web distribution",
    root: &DISTRIBUTION,
    id: IdTemplate::new(&[IdSegment::Var("tenant_id"), IdSegment::Var("distribution_id")]),
    timeouts: Timeouts::minutes(60, 20, 15),
    poll_interval: Duration::from_secs(30),
};

const DISABLED: &str = "disabled";
const DISABLING: &str = "pending";

fn collection_path(tenant: &str) -> String {
    format!("v3/subscriptions/{tenant}/aws/cloudFrontDistribution")
}

fn item_path(id: &str) -> Result<String> {
    let parts = SCHEMA.parse_id(id)?;
    Ok(format!(
        "{}/{}",
        collection_path(&parts["tenant_id"]),
        parts["distribution_id"]
    ))
}

/// Applies `f` to the default behavior and every ordered behavior.
fn each_behavior(config: &mut Map<String, Value>, f: impl Fn(&mut Map<String, Value>)) {
    if let Some(behavior) = config.get_mut("DefaultCacheBehavior").and_then(Value::as_object_mut) {
        f(behavior);
    }
    if let Some(items) = config
        .get_mut("CacheBehaviors")
        .and_then(|b| b.get_mut("Items"))
        .and_then(Value::as_array_mut)
    {
        items.iter_mut().filter_map(Value::as_object_mut).for_each(&f);
    }
}

/// The API nests cached methods inside `AllowedMethods`.
fn nest_cached_methods(behavior: &mut Map<String, Value>) {
    let Some(cached) = behavior.remove("CachedMethods") else {
        return;
    };
    if let Some(allowed) = behavior.get_mut("AllowedMethods").and_then(Value::as_object_mut) {
        allowed.insert("CachedMethods".to_string(), cached);
    }
}

fn hoist_cached_methods(behavior: &mut Map<String, Value>) {
    let cached = behavior
        .get_mut("AllowedMethods")
        .and_then(Value::as_object_mut)
        .and_then(|allowed| allowed.remove("CachedMethods"));
    if let Some(cached) = cached {
        behavior.insert("CachedMethods".to_string(), cached);
    }
}

/// A geo restriction of type `none` without locations means no restriction.
fn is_unrestricted(config: &Map<String, Value>) -> bool {
    let Some(geo) = config.get("Restrictions").and_then(|r| r.get("GeoRestriction")) else {
        return true;
    };
    let kind = geo
        .get("RestrictionType")
        .and_then(|t| t.get("Value").or(Some(t)))
        .and_then(Value::as_str);
    let empty = geo
        .get("Items")
        .and_then(Value::as_array)
        .is_none_or(Vec::is_empty);
    kind == Some("none") && empty
}

/// Shape a `GET` response like the root catalog.
fn from_response(mut doc: Value) -> Result<Option<DomainObject>> {
    let etag = doc.get("ETag").cloned().unwrap_or(Value::Null);
    let Some(distribution) = doc.get_mut("Distribution").filter(|d| !d.is_null()) else {
        return Ok(None);
    };
    let mut config = match distribution.get_mut("DistributionConfig").map(Value::take) {
        Some(Value::Object(config)) => config,
        _ => return Err(Error::malformed("distribution response has no DistributionConfig")),
    };
    for key in ["Status", "DomainName", "ARN"] {
        if let Some(value) = distribution.get(key) {
            config.insert(key.to_string(), value.clone());
        }
    }
    config.insert("ETag".to_string(), etag);
    config.insert("HostedZoneId".to_string(), Value::from(HOSTED_ZONE_ID));
    each_behavior(&mut config, hoist_cached_methods);
    if is_unrestricted(&config) {
        config.remove("Restrictions");
    }
    Ok(Some(DomainObject::new(Value::Object(config))))
}

fn use_oai(config: &ConfigValue) -> bool {
    config
        .field("use_origin_access_identity")
        .and_then(ConfigValue::as_bool)
        .unwrap_or(true)
}

fn set_members<'c>(config: &'c ConfigValue, field: &str) -> impl Iterator<Item = &'c ConfigValue> {
    config
        .field(field)
        .and_then(ConfigValue::as_set)
        .into_iter()
        .flat_map(ValueSet::values)
}

/// The `cloudfront_distribution` resource kind.
pub struct CloudFrontDistribution;

#[async_trait]
impl ResourceKind for CloudFrontDistribution {
    fn schema(&self) -> &'static ResourceSchema {
        &SCHEMA
    }

    fn validate(&self, config: &ConfigValue) -> Result<()> {
        if let Some(comment) = config.field("comment").and_then(ConfigValue::as_str)
            && comment.chars().count() > MAX_COMMENT_LEN
        {
            return Err(Error::invalid_value(
                "comment",
                format!("must be at most {MAX_COMMENT_LEN} characters"),
            ));
        }

        let origins: BTreeSet<&str> = set_members(config, "origin")
            .filter_map(|o| o.field("origin_id").and_then(ConfigValue::as_str))
            .collect();
        let mut behaviors = vec![("default_cache_behavior".to_string(), config.field("default_cache_behavior"))];
        if let Some(ordered) = config.field("ordered_cache_behavior").and_then(ConfigValue::as_list) {
            behaviors.extend(
                ordered
                    .iter()
                    .enumerate()
                    .map(|(i, b)| (format!("ordered_cache_behavior.{i}"), Some(b))),
            );
        }
        for (path, behavior) in behaviors {
            let Some(target) = behavior
                .and_then(|b| b.field("target_origin_id"))
                .and_then(ConfigValue::as_str)
            else {
                continue;
            };
            if !origins.contains(target) {
                return Err(Error::invalid_value(
                    format!("{path}.target_origin_id"),
                    format!("`{target}` does not name an origin"),
                ));
            }
        }
        Ok(())
    }

    fn customize_request(&self, _config: &ConfigValue, request: &mut DomainObject) -> Result<()> {
        let config = request
            .as_json_mut()
            .as_object_mut()
            .ok_or_else(|| Error::invalid_value("cloudfront_distribution", "expected an object"))?;
        each_behavior(config, nest_cached_methods);

        let geo = config
            .get_mut("Restrictions")
            .and_then(|r| r.get_mut("GeoRestriction"))
            .and_then(Value::as_object_mut);
        if let Some(geo) = geo {
            let count = geo.get("Items").and_then(Value::as_array).map_or(0, Vec::len);
            geo.insert("Quantity".to_string(), Value::from(count));
        } else {
            config.insert(
                "Restrictions".to_string(),
                json!({"GeoRestriction": {"RestrictionType": {"Value": "none"}, "Quantity": 0}}),
            );
        }
        Ok(())
    }

    async fn fetch(&self, ctx: &ProviderContext, id: &str) -> Result<Option<DomainObject>> {
        match ctx.client().get_json(&item_path(id)?).await? {
            Some(doc) => from_response(doc),
            None => Ok(None),
        }
    }

    async fn create(&self, ctx: &ProviderContext, config: &ConfigValue, request: DomainObject) -> Result<String> {
        let tenant = config
            .field("tenant_id")
            .and_then(ConfigValue::as_str)
            .ok_or_else(|| Error::ConfigIncomplete {
                what: "`tenant_id` is required".to_string(),
            })?;
        let body = json!({
            "DistributionConfig": request.into_json(),
            "UseOAIIdentity": use_oai(config),
        });
        let created = ctx.client().post_json(&collection_path(tenant), &body).await?;
        let assigned = created
            .as_ref()
            .and_then(|c| c.get("Id"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::malformed("create response carries no distribution Id"))?;
        SCHEMA.id_of(config, Some(assigned))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        config: &ConfigValue,
        request: DomainObject,
        observed: &DomainObject,
    ) -> Result<()> {
        let parts = SCHEMA.parse_id(id)?;
        let body = json!({
            "Id": parts["distribution_id"],
            "DistributionConfig": request.into_json(),
            "IfMatch": observed.get("ETag").cloned().unwrap_or(Value::Null),
            "UseOAIIdentity": use_oai(config),
        });
        ctx.client()
            .put_json(&collection_path(&parts["tenant_id"]), &body)
            .await?;
        Ok(())
    }

    /// Disable the distribution and wait for the disabled configuration to
    /// deploy.
    async fn before_delete(&self, ctx: &ProviderContext, id: &str, observed: &DomainObject) -> Result<()> {
        let parts = SCHEMA.parse_id(id)?;
        if observed.get("Enabled") == Some(&Value::Bool(true)) {
            log::info!("disabling cloudfront_distribution {id}");
            let body = json!({
                "Id": parts["distribution_id"],
                "DistributionConfig": {"Enabled": false},
            });
            match ctx.client().put_json(&item_path(id)?, &body).await.map_err(Error::from) {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    log::info!("cloudfront_distribution {id} vanished before it was disabled");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        wait_until(
            ctx,
            self,
            id,
            "disabled",
            &[DISABLING],
            &[DISABLED, MISSING],
            SCHEMA.timeouts.delete,
            |found| match found {
                None => MISSING.to_string(),
                Some(o) => {
                    let enabled = o.get("Enabled").and_then(Value::as_bool).unwrap_or(false);
                    let deployed = o.get("Status").and_then(Value::as_str) == Some("Deployed");
                    let status = if !enabled && deployed { DISABLED } else { DISABLING };
                    status.to_string()
                }
            },
        )
        .await
        .map(|_| ())
    }

    async fn delete(&self, ctx: &ProviderContext, id: &str) -> Result<()> {
        ctx.client().delete(&item_path(id)?).await?;
        Ok(())
    }

    fn status_of(&self, observed: &DomainObject) -> String {
        observed
            .get("Status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn pending_statuses(&self) -> &'static [&'static str] {
        &["InProgress"]
    }

    fn ready_statuses(&self) -> &'static [&'static str] {
        &["Deployed"]
    }

    fn wait_for_ready(&self, config: &ConfigValue) -> bool {
        config
            .field("wait_for_deployment")
            .and_then(ConfigValue::as_bool)
            .unwrap_or(true)
    }
}
