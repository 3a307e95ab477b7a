// Offline commands: schema inspection, expand/flatten/diff without the API
pub mod offline;

// Commands that talk to the management API
pub mod remote;

// Local state file inspection
pub mod state;

use anyhow::{Result, anyhow};
use cloudkit::ResourceKind;
use cloudkit::resources::{self, KINDS};

/// Resolve a kind name or alias given on the command line.
pub fn resolve_kind(name: &str) -> Result<&'static dyn ResourceKind> {
    resources::find(name).ok_or_else(|| {
        let known: Vec<&str> = KINDS.iter().map(|k| k.name()).collect();
        anyhow!("unknown resource kind `{name}` (known: {})", known.join(", "))
    })
}
