//! Patch operations and change sets.
//!
//! A [`ChangeSet`] is a list of JSON-patch style operations whose paths are
//! slash pointers into a [`ConfigValue`] tree. Set members are addressed as
//! `#<hash>`. Two change sets are equal when they hold the same operations
//! in any order.

use crate::error::Result;
use crate::value::{ConfigValue, Path};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;

/// Kind of patch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Replace,
    Remove,
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Remove => "remove",
        })
    }
}

/// One change at one path. Removals carry no value.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOperation {
    pub path: Path,
    pub op: PatchOp,
    pub value: Option<ConfigValue>,
}

impl PatchOperation {
    pub fn add(path: Path, value: ConfigValue) -> Self {
        Self {
            path,
            op: PatchOp::Add,
            value: Some(value),
        }
    }

    pub fn replace(path: Path, value: ConfigValue) -> Self {
        Self {
            path,
            op: PatchOp::Replace,
            value: Some(value),
        }
    }

    pub fn remove(path: Path) -> Self {
        Self {
            path,
            op: PatchOp::Remove,
            value: None,
        }
    }

    /// Apply this single operation to `target`.
    pub fn apply_to(&self, target: &mut ConfigValue) -> Result<()> {
        match (self.op, &self.value) {
            (PatchOp::Remove, _) => target.remove(&self.path).map(|_| ()),
            (_, Some(value)) => target.set_at(&self.path, value.clone()),
            (_, None) => target.set_at(&self.path, ConfigValue::empty_block()),
        }
    }

    fn sort_key(&self) -> (String, PatchOp) {
        (self.path.to_pointer(), self.op)
    }
}

impl Serialize for PatchOperation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = if self.value.is_some() { 3 } else { 2 };
        let mut state = serializer.serialize_struct("PatchOperation", len)?;
        state.serialize_field("op", &self.op)?;
        state.serialize_field("path", &self.path)?;
        if let Some(value) = &self.value {
            state.serialize_field("value", value)?;
        }
        state.end()
    }
}

impl fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} {} = {}", self.op, self.path.to_pointer(), value.to_json()),
            None => write!(f, "{} {}", self.op, self.path.to_pointer()),
        }
    }
}

/// An unordered collection of patch operations.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    ops: Vec<PatchOperation>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: PatchOperation) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PatchOperation> {
        self.ops.iter()
    }

    /// Operations ordered by pointer string.
    pub fn sorted(&self) -> Vec<&PatchOperation> {
        let mut ops: Vec<&PatchOperation> = self.ops.iter().collect();
        ops.sort_by_key(|op| op.sort_key());
        ops
    }

    /// Apply every operation to `target`.
    ///
    /// The result does not depend on the order operations were added in:
    /// removals run first, deepest and highest index first, then
    /// replacements, then additions in ascending path order so list
    /// appends land in sequence.
    pub fn apply_to(&self, target: &mut ConfigValue) -> Result<()> {
        let mut removes: Vec<&PatchOperation> = Vec::new();
        let mut replaces: Vec<&PatchOperation> = Vec::new();
        let mut adds: Vec<&PatchOperation> = Vec::new();
        for op in &self.ops {
            match op.op {
                PatchOp::Remove => removes.push(op),
                PatchOp::Replace => replaces.push(op),
                PatchOp::Add => adds.push(op),
            }
        }
        removes.sort_by(|a, b| b.path.cmp(&a.path));
        replaces.sort_by(|a, b| a.path.cmp(&b.path));
        adds.sort_by(|a, b| a.path.cmp(&b.path));

        for op in removes.into_iter().chain(replaces).chain(adds) {
            op.apply_to(target)?;
        }
        Ok(())
    }

    /// Render as a JSON-patch document.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.sorted()).unwrap_or(serde_json::Value::Null)
    }
}

impl PartialEq for ChangeSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.sorted() == other.sorted()
    }
}

impl FromIterator<PatchOperation> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = PatchOperation>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ChangeSet {
    type Item = PatchOperation;
    type IntoIter = std::vec::IntoIter<PatchOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a PatchOperation;
    type IntoIter = std::slice::Iter<'a, PatchOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

impl Serialize for ChangeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.sorted().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(pointer: &str) -> Path {
        Path::from_pointer(pointer).unwrap()
    }

    #[test]
    fn test_serialize_json_patch() {
        let set: ChangeSet = [
            PatchOperation::replace(p("/comment"), ConfigValue::string("new")),
            PatchOperation::remove(p("/aliases/#00000000000000ff")),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            set.to_json(),
            json!([
                {"op": "remove", "path": "/aliases/#00000000000000ff"},
                {"op": "replace", "path": "/comment", "value": "new"}
            ])
        );
    }

    #[test]
    fn test_equality_ignores_order() {
        let a: ChangeSet = [
            PatchOperation::add(p("/b"), ConfigValue::int(1)),
            PatchOperation::remove(p("/a")),
        ]
        .into_iter()
        .collect();
        let b: ChangeSet = [
            PatchOperation::remove(p("/a")),
            PatchOperation::add(p("/b"), ConfigValue::int(1)),
        ]
        .into_iter()
        .collect();
        assert_eq!(a, b);

        let c: ChangeSet = [PatchOperation::remove(p("/a"))].into_iter().collect();
        assert_ne!(a, c);
    }

    #[test]
    fn test_apply_removes_list_tail_in_any_order() {
        let mut target = ConfigValue::block([(
            "items",
            ConfigValue::list([
                ConfigValue::int(1),
                ConfigValue::int(2),
                ConfigValue::int(3),
            ]),
        )]);
        let set: ChangeSet = [
            PatchOperation::remove(p("/items/1")),
            PatchOperation::remove(p("/items/2")),
        ]
        .into_iter()
        .collect();
        set.apply_to(&mut target).unwrap();
        assert_eq!(target.lookup("items").unwrap(), &ConfigValue::list([ConfigValue::int(1)]));
    }

    #[test]
    fn test_apply_appends_in_sequence() {
        let mut target = ConfigValue::block([("items", ConfigValue::list([]))]);
        let set: ChangeSet = [
            PatchOperation::add(p("/items/1"), ConfigValue::int(20)),
            PatchOperation::add(p("/items/0"), ConfigValue::int(10)),
        ]
        .into_iter()
        .collect();
        set.apply_to(&mut target).unwrap();
        assert_eq!(
            target.lookup("items").unwrap(),
            &ConfigValue::list([ConfigValue::int(10), ConfigValue::int(20)])
        );
    }

    #[test]
    fn test_apply_missing_parent_fails() {
        let mut target = ConfigValue::empty_block();
        let op = PatchOperation::add(p("/a/b"), ConfigValue::int(1));
        assert!(op.apply_to(&mut target).is_err());
    }

    #[test]
    fn test_display() {
        let op = PatchOperation::replace(p("/enabled"), ConfigValue::bool(false));
        assert_eq!(op.to_string(), "replace /enabled = false");
        assert_eq!(PatchOperation::remove(p("/x")).to_string(), "remove /x");
    }
}
