//! Content hashing for set membership.
//!
//! Values are written into a blake3 hasher in a canonical, tagged,
//! length-prefixed form; the first eight bytes of the digest form the
//! [`ContentHash`]. Block fields are visited in name order, so the order a
//! user wrote them in never matters.
//!
//! The schema-aware variant lets two representations of the same logical
//! element collide: computed-only fields are skipped, a missing field counts
//! as its catalog default, and empty collections or blocks are skipped.

use crate::schema::{BlockSpec, ElemSpec, FieldKind};
use crate::value::{ConfigValue, Scalar};
use blake3::Hasher;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// A 64-bit content hash identifying a set member.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash(u64);

impl ContentHash {
    /// Structural hash over every field of the value.
    pub fn of(value: &ConfigValue) -> Self {
        let mut canonical = Canonical::new();
        canonical.value(value);
        canonical.finish()
    }

    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Lowercase hex, always sixteen digits.
    pub fn to_hex(self) -> String {
        format!("{:016x}", self.0)
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.is_empty() || hex.len() > 16 {
            return None;
        }
        u64::from_str_radix(hex, 16).ok().map(Self)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:016x})", self.0)
    }
}

/// Structural hash of a block (or any value).
pub fn hash(value: &ConfigValue) -> ContentHash {
    ContentHash::of(value)
}

/// Schema-aware hash of a collection element.
pub fn hash_element(elem: &ElemSpec, value: &ConfigValue) -> ContentHash {
    let mut canonical = Canonical::new();
    canonical.element(elem, value);
    canonical.finish()
}

/// Schema-aware hash of a block.
pub fn hash_block(spec: &BlockSpec, value: &ConfigValue) -> ContentHash {
    let mut canonical = Canonical::new();
    canonical.block_with_schema(spec, value);
    canonical.finish()
}

const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_LIST: u8 = 5;
const TAG_SET: u8 = 6;
const TAG_MAP: u8 = 7;
const TAG_BLOCK: u8 = 8;

struct Canonical {
    hasher: Hasher,
}

impl Canonical {
    fn new() -> Self {
        Self {
            hasher: Hasher::new(),
        }
    }

    fn finish(self) -> ContentHash {
        let digest = self.hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        ContentHash(u64::from_be_bytes(head))
    }

    fn tag(&mut self, tag: u8) {
        self.hasher.update(&[tag]);
    }

    fn len(&mut self, len: usize) {
        self.hasher.update(&(len as u64).to_le_bytes());
    }

    fn str(&mut self, s: &str) {
        self.len(s.len());
        self.hasher.update(s.as_bytes());
    }

    fn scalar(&mut self, scalar: &Scalar) {
        match scalar {
            Scalar::Bool(b) => {
                self.tag(TAG_BOOL);
                self.hasher.update(&[u8::from(*b)]);
            }
            Scalar::Int(i) => {
                self.tag(TAG_INT);
                self.hasher.update(&i.to_le_bytes());
            }
            Scalar::Float(f) => {
                self.tag(TAG_FLOAT);
                self.hasher.update(&f.to_bits().to_le_bytes());
            }
            Scalar::String(s) => {
                self.tag(TAG_STRING);
                self.str(s);
            }
        }
    }

    fn member_hashes(&mut self, mut hashes: Vec<ContentHash>) {
        hashes.sort();
        self.tag(TAG_SET);
        self.len(hashes.len());
        for h in hashes {
            self.hasher.update(&h.0.to_le_bytes());
        }
    }

    fn string_map(&mut self, map: &BTreeMap<String, String>) {
        self.tag(TAG_MAP);
        self.len(map.len());
        for (k, v) in map {
            self.str(k);
            self.str(v);
        }
    }

    fn value(&mut self, value: &ConfigValue) {
        match value {
            ConfigValue::Scalar(s) => self.scalar(s),
            ConfigValue::List(items) => {
                self.tag(TAG_LIST);
                self.len(items.len());
                for item in items {
                    self.value(item);
                }
            }
            ConfigValue::Set(set) => {
                let hashes = set.values().map(ContentHash::of).collect();
                self.member_hashes(hashes);
            }
            ConfigValue::Map(map) => self.string_map(map),
            ConfigValue::Block(fields) => {
                self.tag(TAG_BLOCK);
                self.len(fields.len());
                for (name, field) in fields {
                    self.str(name);
                    self.value(field);
                }
            }
        }
    }

    fn element(&mut self, elem: &ElemSpec, value: &ConfigValue) {
        match elem {
            ElemSpec::Block(spec) => self.block_with_schema(spec, value),
            ElemSpec::Scalar(_) => self.value(value),
        }
    }

    fn block_with_schema(&mut self, spec: &BlockSpec, value: &ConfigValue) {
        let Some(fields) = value.as_block() else {
            self.value(value);
            return;
        };

        let mut effective: BTreeMap<&str, Cow<'_, ConfigValue>> = fields
            .iter()
            .map(|(name, v)| (name.as_str(), Cow::Borrowed(v)))
            .collect();
        for field in spec.fields {
            if !effective.contains_key(field.name)
                && let Some(default) = field.default
            {
                effective.insert(field.name, Cow::Owned(default.to_value()));
            }
        }
        effective.retain(|name, v| {
            let computed = spec.field(name).is_some_and(|f| f.is_computed_only());
            !computed && !v.is_empty()
        });

        self.tag(TAG_BLOCK);
        self.len(effective.len());
        for (name, v) in effective {
            self.str(name);
            match spec.field(name).map(|f| f.kind) {
                Some(FieldKind::Block(sub)) => self.block_with_schema(sub, &v),
                Some(FieldKind::List(elem)) => match v.as_list() {
                    Some(items) => {
                        self.tag(TAG_LIST);
                        self.len(items.len());
                        for item in items {
                            self.element(&elem, item);
                        }
                    }
                    None => self.value(&v),
                },
                Some(FieldKind::Set(elem)) => match v.as_set() {
                    Some(set) => {
                        let hashes = set.values().map(|m| hash_element(&elem, m)).collect();
                        self.member_hashes(hashes);
                    }
                    None => self.value(&v),
                },
                _ => self.value(&v),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;

    static HEADER: BlockSpec = BlockSpec::new(
        "custom_header",
        &[
            FieldSpec::string("name", "HeaderName").required(),
            FieldSpec::string("value", "HeaderValue").required(),
        ],
    );

    static ORIGIN: BlockSpec = BlockSpec::new(
        "origin",
        &[
            FieldSpec::string("origin_id", "Id").required(),
            FieldSpec::string("origin_path", "OriginPath").default_str(""),
            FieldSpec::int("connection_attempts", "ConnectionAttempts").default_int(3),
            FieldSpec::set("custom_header", "CustomHeaders", ElemSpec::Block(&HEADER)),
            FieldSpec::string("status", "Status").computed(),
        ],
    );

    fn origin(fields: &[(&str, ConfigValue)]) -> ConfigValue {
        ConfigValue::block(fields.iter().map(|(k, v)| (*k, v.clone())))
    }

    #[test]
    fn test_structural_hash_ignores_field_order() {
        let a = ConfigValue::block([("x", ConfigValue::int(1)), ("y", ConfigValue::int(2))]);
        let b = ConfigValue::block([("y", ConfigValue::int(2)), ("x", ConfigValue::int(1))]);
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn test_structural_hash_distinguishes_types() {
        assert_ne!(hash(&ConfigValue::int(1)), hash(&ConfigValue::string("1")));
        assert_ne!(hash(&ConfigValue::bool(true)), hash(&ConfigValue::int(1)));
    }

    #[test]
    fn test_structural_hash_is_deterministic() {
        let v = ConfigValue::set([ConfigValue::string("a"), ConfigValue::string("b")]);
        let w = ConfigValue::set([ConfigValue::string("b"), ConfigValue::string("a")]);
        assert_eq!(hash(&v), hash(&w));
        assert_eq!(hash(&v).to_hex().len(), 16);
    }

    #[test]
    fn test_schema_hash_treats_missing_as_default() {
        let sparse = origin(&[("origin_id", ConfigValue::string("s3"))]);
        let full = origin(&[
            ("origin_id", ConfigValue::string("s3")),
            ("origin_path", ConfigValue::string("")),
            ("connection_attempts", ConfigValue::int(3)),
        ]);
        assert_eq!(hash_block(&ORIGIN, &sparse), hash_block(&ORIGIN, &full));
        assert_ne!(hash(&sparse), hash(&full));
    }

    #[test]
    fn test_schema_hash_skips_computed_and_empty() {
        let plain = origin(&[("origin_id", ConfigValue::string("s3"))]);
        let observed = origin(&[
            ("origin_id", ConfigValue::string("s3")),
            ("status", ConfigValue::string("Deployed")),
            ("custom_header", ConfigValue::Set(Default::default())),
        ]);
        assert_eq!(hash_block(&ORIGIN, &plain), hash_block(&ORIGIN, &observed));
    }

    #[test]
    fn test_schema_hash_sees_user_fields() {
        let a = origin(&[("origin_id", ConfigValue::string("s3"))]);
        let b = origin(&[
            ("origin_id", ConfigValue::string("s3")),
            ("connection_attempts", ConfigValue::int(2)),
        ]);
        assert_ne!(hash_block(&ORIGIN, &a), hash_block(&ORIGIN, &b));
    }

    #[test]
    fn test_hex_round_trip() {
        let h = ContentHash::from_u64(0xff);
        assert_eq!(h.to_hex(), "00000000000000ff");
        assert_eq!(ContentHash::from_hex(&h.to_hex()), Some(h));
        assert_eq!(ContentHash::from_hex(""), None);
        assert_eq!(ContentHash::from_hex("xyz"), None);
    }
}
