use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// State Structures
// ============================================================================

/// Resources cloudsync has created or adopted, keyed by composite identifier
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SyncState {
    /// Last time the state was updated
    pub last_updated: Option<DateTime<Utc>>,

    #[serde(default)]
    pub resources: BTreeMap<String, ManagedResource>,
}

/// One managed resource
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ManagedResource {
    /// Resource kind, e.g. `cosmosdb_account`
    pub kind: String,

    /// Config file the resource was applied from, if any
    #[serde(default)]
    pub source: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Normalized config read back after the last apply, as JSON text
    #[serde(default)]
    pub snapshot: Option<String>,
}

// ============================================================================
// SyncState Implementation
// ============================================================================

impl SyncState {
    /// Load state from disk, or return default if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(&self).context("Failed to serialize state to TOML")?;

        fs::write(path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Record a created, updated or imported resource.
    pub fn record(&mut self, id: &str, kind: &str, source: Option<&Path>, snapshot: Option<&serde_json::Value>) {
        let now = Utc::now();
        let source = source.map(source_key);
        let snapshot = snapshot.map(serde_json::Value::to_string);

        self.resources
            .entry(id.to_string())
            .and_modify(|r| {
                r.kind = kind.to_string();
                if source.is_some() {
                    r.source.clone_from(&source);
                }
                if snapshot.is_some() {
                    r.snapshot.clone_from(&snapshot);
                }
                r.updated_at = now;
            })
            .or_insert_with(|| ManagedResource {
                kind: kind.to_string(),
                source: source.clone(),
                created_at: now,
                updated_at: now,
                snapshot: snapshot.clone(),
            });
        self.last_updated = Some(now);
    }

    /// Stop tracking a resource. Returns whether it was tracked.
    pub fn forget(&mut self, id: &str) -> bool {
        let removed = self.resources.remove(id).is_some();
        if removed {
            self.last_updated = Some(Utc::now());
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<&ManagedResource> {
        self.resources.get(id)
    }

    /// Identifier of the resource last applied from `source`, if any.
    pub fn find_by_source(&self, kind: &str, source: &Path) -> Option<&str> {
        let key = source_key(source);
        self.resources
            .iter()
            .find(|(_, r)| r.kind == kind && r.source.as_deref() == Some(key.as_str()))
            .map(|(id, _)| id.as_str())
    }
}

/// Sources are stored as absolute paths when they can be resolved.
fn source_key(path: &Path) -> String {
    let resolved: PathBuf = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    resolved.display().to_string()
}
