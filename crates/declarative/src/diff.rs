//! Diff computation between configuration trees

use crate::patch::{ChangeSet, PatchOp, PatchOperation};
use crate::value::{ConfigValue, Path, Segment};
use std::collections::{BTreeMap, BTreeSet};

/// Compute the change set that turns `observed` into `desired`.
///
/// Scalars and string maps are replaced whole. Blocks are compared field by
/// field. Lists compare their common prefix position by position and add or
/// remove the tail. Sets pair members by content hash, so a changed member
/// shows up as one removal and one addition.
pub fn diff(desired: &ConfigValue, observed: &ConfigValue) -> ChangeSet {
    let mut ops = Vec::new();
    diff_at(&Path::root(), desired, observed, &mut ops);
    ops.into_iter().collect()
}

fn diff_at(path: &Path, desired: &ConfigValue, observed: &ConfigValue, ops: &mut Vec<PatchOperation>) {
    match (desired, observed) {
        (ConfigValue::Block(d), ConfigValue::Block(o)) => {
            let names: BTreeSet<&String> = d.keys().chain(o.keys()).collect();
            for name in names {
                let here = path.join(Segment::Field(name.clone()));
                match (d.get(name), o.get(name)) {
                    (Some(dv), Some(ov)) => diff_at(&here, dv, ov, ops),
                    (Some(dv), None) => ops.push(PatchOperation::add(here, dv.clone())),
                    (None, Some(_)) => ops.push(PatchOperation::remove(here)),
                    (None, None) => {}
                }
            }
        }
        (ConfigValue::List(d), ConfigValue::List(o)) => {
            for (i, (dv, ov)) in d.iter().zip(o.iter()).enumerate() {
                diff_at(&path.index(i), dv, ov, ops);
            }
            for (i, dv) in d.iter().enumerate().skip(o.len()) {
                ops.push(PatchOperation::add(path.index(i), dv.clone()));
            }
            for i in d.len()..o.len() {
                ops.push(PatchOperation::remove(path.index(i)));
            }
        }
        (ConfigValue::Set(d), ConfigValue::Set(o)) => {
            for (key, dv) in d.iter() {
                match o.get(key) {
                    Some(ov) => diff_at(&path.member(*key), dv, ov, ops),
                    None => ops.push(PatchOperation::add(path.member(*key), dv.clone())),
                }
            }
            for key in o.keys().filter(|key| !d.contains(key)) {
                ops.push(PatchOperation::remove(path.member(*key)));
            }
        }
        (d, o) => {
            if d != o {
                ops.push(PatchOperation::replace(path.clone(), d.clone()));
            }
        }
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    /// Number of paths to add
    pub additions: usize,
    /// Number of paths to remove
    pub removals: usize,
    /// Number of paths to replace
    pub modifications: usize,
}

impl DiffSummary {
    /// Create a summary from a change set
    pub fn from_changes(changes: &ChangeSet) -> Self {
        let mut summary = Self::default();
        for op in changes {
            match op.op {
                PatchOp::Add => summary.additions += 1,
                PatchOp::Remove => summary.removals += 1,
                PatchOp::Replace => summary.modifications += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group operations by the top-level field they touch
pub fn group_by_field(changes: &ChangeSet) -> BTreeMap<String, Vec<&PatchOperation>> {
    let mut groups: BTreeMap<String, Vec<&PatchOperation>> = BTreeMap::new();
    for op in changes.sorted() {
        let field = op.path.head_field().unwrap_or("(root)").to_string();
        groups.entry(field).or_default().push(op);
    }
    groups
}
