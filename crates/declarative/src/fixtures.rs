//! A small distribution-like catalog shared by unit tests.

use crate::schema::{
    BlockSpec, DefaultValue, Dependency, ElemSpec, ExclusiveGroup, FieldSpec, ScalarType, Wire,
};

pub static S3_ORIGIN: BlockSpec = BlockSpec::new(
    "s3_origin_config",
    &[FieldSpec::string("origin_access_identity", "OriginAccessIdentity")
        .default_str("")
        .optional_computed()
        .generated()],
);

pub static CUSTOM_ORIGIN: BlockSpec = BlockSpec::new(
    "custom_origin_config",
    &[
        FieldSpec::int("http_port", "HTTPPort").default_int(80),
        FieldSpec::int("https_port", "HTTPSPort").default_int(443),
        FieldSpec::string("origin_protocol_policy", "OriginProtocolPolicy").required(),
        FieldSpec::set(
            "origin_ssl_protocols",
            "OriginSslProtocols",
            ElemSpec::Scalar(ScalarType::String),
        )
        .wire(Wire::Quantity),
    ],
);

pub static HEADER: BlockSpec = BlockSpec::new(
    "custom_header",
    &[
        FieldSpec::string("name", "HeaderName").required(),
        FieldSpec::string("value", "HeaderValue").required(),
    ],
);

pub static ORIGIN: BlockSpec = BlockSpec::new(
    "origin",
    &[
        FieldSpec::string("origin_id", "Id").required(),
        FieldSpec::string("domain_name", "DomainName").required(),
        FieldSpec::string("origin_path", "OriginPath").default_str(""),
        FieldSpec::set("custom_header", "CustomHeaders", ElemSpec::Block(&HEADER))
            .wire(Wire::Quantity),
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

pub static BEHAVIOR: BlockSpec = BlockSpec::new(
    "default_cache_behavior",
    &[
        FieldSpec::string("target_origin_id", "TargetOriginId").required(),
        FieldSpec::string("viewer_protocol_policy", "ViewerProtocolPolicy")
            .required()
            .wire(Wire::ValueObject),
        FieldSpec::set(
            "allowed_methods",
            "AllowedMethods",
            ElemSpec::Scalar(ScalarType::String),
        )
        .wire(Wire::Quantity),
        FieldSpec::string("cache_policy_id", "CachePolicyId").default_str(""),
        FieldSpec::int("min_ttl", "MinTTL").default_int(0),
        FieldSpec::int("default_ttl", "DefaultTTL").default_int(86400),
    ],
)
.depends(&[Dependency {
    governor: "cache_policy_id",
    dependents: &["min_ttl", "default_ttl"],
}]);

pub static ORDERED_BEHAVIOR: BlockSpec = BlockSpec::new(
    "ordered_cache_behavior",
    &[
        FieldSpec::string("path_pattern", "PathPattern").required(),
        FieldSpec::string("target_origin_id", "TargetOriginId").required(),
    ],
);

pub static LOGGING: BlockSpec = BlockSpec::new(
    "logging_config",
    &[
        FieldSpec::string("bucket", "Bucket").required(),
        FieldSpec::string("prefix", "Prefix").default_str(""),
        FieldSpec::bool("include_cookies", "IncludeCookies").default_bool(false),
    ],
)
.enabled_by("Enabled");

pub static CERT: BlockSpec = BlockSpec::new(
    "viewer_certificate",
    &[
        FieldSpec::string("acm_certificate_arn", "ACMCertificateArn"),
        FieldSpec::string("iam_certificate_id", "IAMCertificateId"),
        FieldSpec::bool("cloudfront_default_certificate", "CloudFrontDefaultCertificate")
            .default_bool(false),
        FieldSpec::string("ssl_support_method", "SSLSupportMethod")
            .default_str("sni-only")
            .wire(Wire::ValueObject),
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
    dependents: &["ssl_support_method"],
}]);

pub static BACKUP: BlockSpec = BlockSpec::new(
    "backup_policy",
    &[
        FieldSpec::int("interval_minutes", "BackupIntervalInMinutes").default_int(240),
        FieldSpec::string("policy_type", "BackupPolicyType").default_str("Periodic"),
    ],
);

pub static DISTRIBUTION: BlockSpec = BlockSpec::new(
    "distribution",
    &[
        FieldSpec::string("tenant_id", "TenantId").required().wire(Wire::Local),
        FieldSpec::string("comment", "Comment").default_str(""),
        FieldSpec::bool("enabled", "Enabled").required(),
        FieldSpec::string("http_version", "HttpVersion")
            .default_str("http2")
            .wire(Wire::ValueObject),
        FieldSpec::string("consistency", "Consistency")
            .default_str("Session")
            .wire(Wire::EnumIndex(&["Eventual", "Session", "Strong"])),
        FieldSpec::set("aliases", "Aliases", ElemSpec::Scalar(ScalarType::String))
            .wire(Wire::Quantity),
        FieldSpec::set("origin", "Origins", ElemSpec::Block(&ORIGIN)).wire(Wire::Quantity),
        FieldSpec::block("default_cache_behavior", "DefaultCacheBehavior", &BEHAVIOR).required(),
        FieldSpec::list(
            "ordered_cache_behavior",
            "CacheBehaviors",
            ElemSpec::Block(&ORDERED_BEHAVIOR),
        )
        .wire(Wire::Quantity),
        FieldSpec::block("logging_config", "Logging", &LOGGING),
        FieldSpec::block("viewer_certificate", "ViewerCertificate", &CERT).required(),
        FieldSpec::block("backup_policy", "BackupPolicy", &BACKUP).wire(Wire::Inline),
        FieldSpec::string("policy", "Policy").wire(Wire::JsonString),
        FieldSpec::map("tags", "Tags"),
        FieldSpec::string("status", "Status").computed(),
        FieldSpec::string("domain_name", "DomainName").computed(),
    ],
);
