//! Concrete resource kinds.

mod cloudfront;
mod cosmosdb;

pub use cloudfront::{CloudFrontDistribution, HOSTED_ZONE_ID};
pub use cosmosdb::{CONSISTENCY_LEVELS, CosmosDbAccount};

use crate::lifecycle::ResourceKind;

/// Every kind this crate can manage.
pub static KINDS: &[&dyn ResourceKind] = &[&CloudFrontDistribution, &CosmosDbAccount];

/// Look up a kind by name or short alias.
pub fn find(name: &str) -> Option<&'static dyn ResourceKind> {
    let name = match name {
        "cdn" | "cloudfront" => "cloudfront_distribution",
        "cosmos" | "cosmosdb" => "cosmosdb_account",
        other => other,
    };
    KINDS.iter().copied().find(|kind| kind.name() == name)
}
