//! Core types for declarative resource management

use serde::{Deserialize, Serialize};

/// A remote API payload produced by expanding a configuration tree.
///
/// This is the JSON document the management API accepts or returns; field
/// names are the API's wire names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainObject(serde_json::Value);

impl DomainObject {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// An empty JSON object.
    pub fn empty() -> Self {
        Self(serde_json::Value::Object(serde_json::Map::new()))
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn as_json_mut(&mut self) -> &mut serde_json::Value {
        &mut self.0
    }

    pub fn into_json(self) -> serde_json::Value {
        self.0
    }

    /// Top-level member by wire name.
    pub fn get(&self, wire_name: &str) -> Option<&serde_json::Value> {
        self.0.get(wire_name)
    }
}

impl From<serde_json::Value> for DomainObject {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Result of applying a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created { id: String },
    /// Resource was updated with this many patch operations
    Modified { id: String, changes: usize },
    /// Resource was deleted
    Removed { id: String },
    /// Apply was skipped
    Skipped { reason: String },
}

/// Summary of apply results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplySummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub no_change: usize,
}

impl ApplySummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created { .. } => self.created += 1,
            ApplyResult::Modified { .. } => self.modified += 1,
            ApplyResult::Removed { .. } => self.removed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Options for applying resources
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub auto_approve: bool,
}
