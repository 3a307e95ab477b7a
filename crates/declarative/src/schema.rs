//! Static field catalogs.
//!
//! Every resource kind describes its configuration as a tree of
//! [`BlockSpec`]s built from `const` [`FieldSpec`] values. The catalog is
//! the single source of truth for defaults, wire names, wire shapes,
//! computed fields, exclusive groups and dependency gating.

use crate::value::{ConfigValue, Scalar};
use std::collections::BTreeMap;

/// Type of a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    String,
    Int,
    Float,
    Bool,
}

impl ScalarType {
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
        }
    }

    /// The zero value used when an optional scalar is read back as missing.
    pub fn zero(self) -> Scalar {
        match self {
            Self::String => Scalar::String(String::new()),
            Self::Int => Scalar::Int(0),
            Self::Float => Scalar::Float(0.0),
            Self::Bool => Scalar::Bool(false),
        }
    }
}

/// Element type of a list or set.
#[derive(Debug, Clone, Copy)]
pub enum ElemSpec {
    Scalar(ScalarType),
    Block(&'static BlockSpec),
}

/// Shape of a field in the configuration tree.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Scalar(ScalarType),
    List(ElemSpec),
    Set(ElemSpec),
    Map,
    Block(&'static BlockSpec),
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scalar(t) => t.name(),
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map => "map",
            Self::Block(_) => "block",
        }
    }
}

/// Who sets a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// The user must set it.
    Required,
    /// The user may set it.
    Optional,
    /// Only the remote side sets it.
    Computed,
    /// The user may set it; otherwise the remote side fills it in.
    OptionalComputed,
}

/// A catalog default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Str(&'static str),
    Int(i64),
    Bool(bool),
    /// An empty nested block whose own defaults apply on the wire.
    EmptyBlock,
}

impl DefaultValue {
    pub fn to_value(self) -> ConfigValue {
        match self {
            Self::Str(s) => ConfigValue::string(s),
            Self::Int(i) => ConfigValue::int(i),
            Self::Bool(b) => ConfigValue::bool(b),
            Self::EmptyBlock => ConfigValue::empty_block(),
        }
    }
}

/// How a field is represented in the remote domain object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wire {
    /// Emitted as is.
    Plain,
    /// Scalar wrapped as `{"Value": x}`.
    ValueObject,
    /// Collection wrapped as `{"Quantity": n, "Items": [...]}`.
    Quantity,
    /// String stored as its index in a fixed name table.
    EnumIndex(&'static [&'static str]),
    /// String holding JSON, emitted as the parsed document.
    JsonString,
    /// Block whose fields sit directly in the parent object.
    Inline,
    /// Never sent or received; filled from the identifier or kept locally.
    Local,
}

/// Extra validation applied during normalization.
#[derive(Debug, Clone, Copy)]
pub enum Validator {
    OneOf(&'static [&'static str]),
    Range(i64, i64),
}

/// One field of a block.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub wire_name: &'static str,
    pub kind: FieldKind,
    pub presence: Presence,
    pub default: Option<DefaultValue>,
    pub wire: Wire,
    pub validator: Option<Validator>,
    /// The remote side generates this value on create; it is carried
    /// forward on update and hidden from reads unless the user set it.
    pub generated: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str, wire_name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            wire_name,
            kind,
            presence: Presence::Optional,
            default: None,
            wire: Wire::Plain,
            validator: None,
            generated: false,
        }
    }

    pub const fn string(name: &'static str, wire_name: &'static str) -> Self {
        Self::new(name, wire_name, FieldKind::Scalar(ScalarType::String))
    }

    pub const fn int(name: &'static str, wire_name: &'static str) -> Self {
        Self::new(name, wire_name, FieldKind::Scalar(ScalarType::Int))
    }

    pub const fn bool(name: &'static str, wire_name: &'static str) -> Self {
        Self::new(name, wire_name, FieldKind::Scalar(ScalarType::Bool))
    }

    pub const fn block(name: &'static str, wire_name: &'static str, spec: &'static BlockSpec) -> Self {
        Self::new(name, wire_name, FieldKind::Block(spec))
    }

    pub const fn list(name: &'static str, wire_name: &'static str, elem: ElemSpec) -> Self {
        Self::new(name, wire_name, FieldKind::List(elem))
    }

    pub const fn set(name: &'static str, wire_name: &'static str, elem: ElemSpec) -> Self {
        Self::new(name, wire_name, FieldKind::Set(elem))
    }

    pub const fn map(name: &'static str, wire_name: &'static str) -> Self {
        Self::new(name, wire_name, FieldKind::Map)
    }

    pub const fn required(mut self) -> Self {
        self.presence = Presence::Required;
        self
    }

    pub const fn computed(mut self) -> Self {
        self.presence = Presence::Computed;
        self
    }

    pub const fn optional_computed(mut self) -> Self {
        self.presence = Presence::OptionalComputed;
        self
    }

    pub const fn default_str(mut self, value: &'static str) -> Self {
        self.default = Some(DefaultValue::Str(value));
        self
    }

    pub const fn default_int(mut self, value: i64) -> Self {
        self.default = Some(DefaultValue::Int(value));
        self
    }

    pub const fn default_bool(mut self, value: bool) -> Self {
        self.default = Some(DefaultValue::Bool(value));
        self
    }

    pub const fn wire(mut self, wire: Wire) -> Self {
        self.wire = wire;
        self
    }

    pub const fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.validator = Some(Validator::OneOf(allowed));
        self
    }

    pub const fn range(mut self, min: i64, max: i64) -> Self {
        self.validator = Some(Validator::Range(min, max));
        self
    }

    pub const fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    /// Only the remote side ever sets this field.
    pub fn is_computed_only(&self) -> bool {
        self.presence == Presence::Computed
    }

    pub fn is_local(&self) -> bool {
        self.wire == Wire::Local
    }
}

/// A family of fields of which at most one may be populated.
#[derive(Debug, Clone, Copy)]
pub struct ExclusiveGroup {
    pub name: &'static str,
    pub fields: &'static [&'static str],
    /// Values applied when no group of the family is populated. An empty
    /// fallback on every group makes "none set" an error.
    pub fallback: &'static [(&'static str, DefaultValue)],
}

impl ExclusiveGroup {
    pub const fn new(name: &'static str, fields: &'static [&'static str]) -> Self {
        Self {
            name,
            fields,
            fallback: &[],
        }
    }

    pub const fn fallback(mut self, values: &'static [(&'static str, DefaultValue)]) -> Self {
        self.fallback = values;
        self
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(&field)
    }

    /// Whether any field of the group is populated in `fields`.
    pub fn is_populated(&self, fields: &BTreeMap<String, ConfigValue>) -> bool {
        self.fields
            .iter()
            .any(|name| fields.get(*name).is_some_and(ConfigValue::is_populated))
    }
}

/// When `governor` is populated, `dependents` are dropped.
#[derive(Debug, Clone, Copy)]
pub struct Dependency {
    pub governor: &'static str,
    pub dependents: &'static [&'static str],
}

/// A nested group of fields.
#[derive(Debug, Clone, Copy)]
pub struct BlockSpec {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
    pub exclusive: &'static [ExclusiveGroup],
    pub dependencies: &'static [Dependency],
    /// Field that identifies a member when this block is a set element.
    pub natural_key: Option<&'static str>,
    /// Wire name of a bool that marks the block active on the remote side.
    pub enabled_flag: Option<&'static str>,
}

impl BlockSpec {
    pub const fn new(name: &'static str, fields: &'static [FieldSpec]) -> Self {
        Self {
            name,
            fields,
            exclusive: &[],
            dependencies: &[],
            natural_key: None,
            enabled_flag: None,
        }
    }

    pub const fn exclusive(mut self, groups: &'static [ExclusiveGroup]) -> Self {
        self.exclusive = groups;
        self
    }

    pub const fn depends(mut self, dependencies: &'static [Dependency]) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub const fn keyed_by(mut self, field: &'static str) -> Self {
        self.natural_key = Some(field);
        self
    }

    pub const fn enabled_by(mut self, wire_name: &'static str) -> Self {
        self.enabled_flag = Some(wire_name);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields whose governor is populated in `fields`.
    pub fn gated_fields(&self, fields: &BTreeMap<String, ConfigValue>) -> Vec<&'static str> {
        self.dependencies
            .iter()
            .filter(|dep| fields.get(dep.governor).is_some_and(ConfigValue::is_populated))
            .flat_map(|dep| dep.dependents.iter().copied())
            .collect()
    }

    /// Drop gated dependents from `fields`.
    pub fn apply_gating(&self, fields: &mut BTreeMap<String, ConfigValue>) {
        for name in self.gated_fields(fields) {
            fields.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static INNER: BlockSpec = BlockSpec::new("inner", &[FieldSpec::string("a", "A")]);

    static SPEC: BlockSpec = BlockSpec::new(
        "sample",
        &[
            FieldSpec::string("policy", "Policy"),
            FieldSpec::int("ttl", "TTL").default_int(60),
            FieldSpec::block("inner", "Inner", &INNER),
            FieldSpec::string("status", "Status").computed(),
        ],
    )
    .depends(&[Dependency {
        governor: "policy",
        dependents: &["ttl"],
    }]);

    #[test]
    fn test_field_lookup() {
        assert_eq!(SPEC.field("ttl").unwrap().wire_name, "TTL");
        assert!(SPEC.field("status").unwrap().is_computed_only());
        assert!(SPEC.field("missing").is_none());
    }

    #[test]
    fn test_gating_drops_dependents_only_when_governor_populated() {
        let mut fields = BTreeMap::from([
            ("policy".to_string(), ConfigValue::string("")),
            ("ttl".to_string(), ConfigValue::int(60)),
        ]);
        SPEC.apply_gating(&mut fields);
        assert!(fields.contains_key("ttl"));

        fields.insert("policy".to_string(), ConfigValue::string("p-1"));
        SPEC.apply_gating(&mut fields);
        assert!(!fields.contains_key("ttl"));
    }

    #[test]
    fn test_exclusive_group_populated() {
        let group = ExclusiveGroup::new("acm", &["acm_certificate_arn"]);
        let fields = BTreeMap::from([(
            "acm_certificate_arn".to_string(),
            ConfigValue::string("arn:aws:acm:cert"),
        )]);
        assert!(group.is_populated(&fields));
        assert!(group.contains("acm_certificate_arn"));
        assert!(!group.is_populated(&BTreeMap::new()));
    }
}
