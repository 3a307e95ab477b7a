//! In-memory configuration trees.
//!
//! A [`ConfigValue`] is either a scalar, an ordered list, an unordered set,
//! a string map or a nested block. Sets are keyed by [`ContentHash`] and
//! offer no positional access: a member is reached by its hash or by a
//! natural key field, never by an index.

use crate::error::{Error, Result};
use crate::hash::ContentHash;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// Name of the scalar type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }

    /// Whether the scalar carries a non-zero value.
    ///
    /// Empty strings, `false` and zero count as "not set" when deciding
    /// which of several exclusive field groups the user populated.
    pub fn is_populated(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Render as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// An unordered collection whose membership is decided by content hash.
///
/// Two members with the same hash collapse into one. Iteration follows hash
/// order, which is stable for a given set of members.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueSet {
    members: BTreeMap<ContentHash, ConfigValue>,
}

impl ValueSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a member keyed by its structural hash.
    pub fn insert(&mut self, value: ConfigValue) -> ContentHash {
        let key = ContentHash::of(&value);
        self.members.insert(key, value);
        key
    }

    /// Insert a member under a precomputed key.
    ///
    /// Returns `false` if a member with that key was already present; the
    /// new value replaces it.
    pub fn insert_keyed(&mut self, key: ContentHash, value: ConfigValue) -> bool {
        self.members.insert(key, value).is_none()
    }

    pub fn get(&self, key: &ContentHash) -> Option<&ConfigValue> {
        self.members.get(key)
    }

    /// Store `value` in place of the member under `key` and return its new key.
    ///
    /// A member kept under its structural hash is rehashed, so the set still
    /// collapses it with an identical member built fresh. A member kept under
    /// a schema-aware hash, or a new member, stays under `key`.
    pub fn replace(&mut self, key: ContentHash, value: ConfigValue) -> ContentHash {
        let structural = self
            .members
            .remove(&key)
            .is_some_and(|old| ContentHash::of(&old) == key);
        let key = if structural { ContentHash::of(&value) } else { key };
        self.members.insert(key, value);
        key
    }

    pub fn remove(&mut self, key: &ContentHash) -> Option<ConfigValue> {
        self.members.remove(key)
    }

    pub fn contains(&self, key: &ContentHash) -> bool {
        self.members.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members with their keys, in hash order.
    pub fn iter(&self) -> impl Iterator<Item = (&ContentHash, &ConfigValue)> {
        self.members.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ContentHash> {
        self.members.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &ConfigValue> {
        self.members.values()
    }

    /// Find the member block whose `field` renders as `value`.
    pub fn find_by(&self, field: &str, value: &str) -> Option<(ContentHash, &ConfigValue)> {
        self.members.iter().find_map(|(key, member)| {
            let matches = member
                .field(field)
                .and_then(ConfigValue::as_scalar)
                .is_some_and(|s| s.to_string() == value);
            matches.then_some((*key, member))
        })
    }

    fn find_key_by(&self, field: &str, value: &str) -> Option<ContentHash> {
        self.find_by(field, value).map(|(key, _)| key)
    }
}

impl FromIterator<ConfigValue> for ValueSet {
    fn from_iter<I: IntoIterator<Item = ConfigValue>>(iter: I) -> Self {
        let mut set = Self::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

/// A declarative configuration tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// A single string, number or bool.
    Scalar(Scalar),
    /// An ordered sequence; position is meaningful.
    List(Vec<ConfigValue>),
    /// An unordered collection keyed by content hash.
    Set(ValueSet),
    /// A flat string to string mapping.
    Map(BTreeMap<String, String>),
    /// A group of named fields.
    Block(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn string(s: impl Into<String>) -> Self {
        Self::Scalar(Scalar::String(s.into()))
    }

    pub fn int(i: i64) -> Self {
        Self::Scalar(Scalar::Int(i))
    }

    pub fn float(f: f64) -> Self {
        Self::Scalar(Scalar::Float(f))
    }

    pub fn bool(b: bool) -> Self {
        Self::Scalar(Scalar::Bool(b))
    }

    /// An explicit empty block, used for optional blocks that are unset.
    pub fn empty_block() -> Self {
        Self::Block(BTreeMap::new())
    }

    pub fn block<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ConfigValue)>,
    {
        Self::Block(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn list(items: impl IntoIterator<Item = ConfigValue>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// A set keyed by structural hash.
    pub fn set(items: impl IntoIterator<Item = ConfigValue>) -> Self {
        Self::Set(items.into_iter().collect())
    }

    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Name of the variant, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Scalar(s) => s.type_name(),
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
            Self::Block(_) => "block",
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }

    pub fn as_int(&self) -> Option<i64> {
        self.as_scalar().and_then(Scalar::as_int)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_scalar().and_then(Scalar::as_bool)
    }

    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&ValueSet> {
        match self {
            Self::Set(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            Self::Block(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut BTreeMap<String, ConfigValue>> {
        match self {
            Self::Block(fields) => Some(fields),
            _ => None,
        }
    }

    /// A direct field of a block.
    pub fn field(&self, name: &str) -> Option<&ConfigValue> {
        self.as_block().and_then(|fields| fields.get(name))
    }

    /// Whether this is an empty collection or an empty block.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::List(items) => items.is_empty(),
            Self::Set(set) => set.is_empty(),
            Self::Map(map) => map.is_empty(),
            Self::Block(fields) => fields.is_empty(),
        }
    }

    /// Whether the value carries anything the user could have meant.
    ///
    /// A block counts as populated when any of its fields is.
    pub fn is_populated(&self) -> bool {
        match self {
            Self::Scalar(s) => s.is_populated(),
            Self::Block(fields) => fields.values().any(ConfigValue::is_populated),
            other => !other.is_empty(),
        }
    }

    /// Resolve a dotted path such as `origin[origin_id=s3].domain_name`.
    pub fn lookup(&self, dotted: &str) -> Result<&ConfigValue> {
        self.get(&Path::parse(dotted)?)
    }

    /// Resolve a path to a value.
    pub fn get(&self, path: &Path) -> Result<&ConfigValue> {
        let mut current = self;
        for (depth, segment) in path.segments().iter().enumerate() {
            current = step(current, segment).map_err(|reason| {
                Error::invalid_path(path, format!("{reason} at segment {}", depth + 1))
            })?;
        }
        Ok(current)
    }

    /// Store a value at a path.
    ///
    /// The parent must exist. A block field is created or replaced, a list
    /// index may point one past the end to append, a set member is inserted
    /// under the given hash. Writing into or over a set member goes through
    /// [`ValueSet::replace`].
    pub fn set_at(&mut self, path: &Path, value: ConfigValue) -> Result<()> {
        let Some((parent_path, last)) = path.split_last() else {
            *self = value;
            return Ok(());
        };
        edit_at(self, &parent_path, 0, |parent| match (parent, last) {
            (ConfigValue::Block(fields), Segment::Field(name)) => {
                fields.insert(name.clone(), value);
                Ok(())
            }
            (ConfigValue::List(items), Segment::Index(i)) => {
                if *i < items.len() {
                    items[*i] = value;
                    Ok(())
                } else if *i == items.len() {
                    items.push(value);
                    Ok(())
                } else {
                    Err(Error::invalid_path(
                        path,
                        format!("index {i} is past the end of a list of {}", items.len()),
                    ))
                }
            }
            (ConfigValue::Set(set), Segment::Member(key)) => {
                set.replace(*key, value);
                Ok(())
            }
            (ConfigValue::Set(set), Segment::Keyed { field, value: wanted }) => {
                let key = set.find_key_by(field, wanted).ok_or_else(|| {
                    Error::invalid_path(path, format!("no member with {field}={wanted}"))
                })?;
                set.replace(key, value);
                Ok(())
            }
            (ConfigValue::Set(_), Segment::Index(_)) => Err(Error::invalid_path(
                path,
                "sets have no position; address members by hash or natural key",
            )),
            (parent, segment) => Err(Error::invalid_path(
                path,
                format!("cannot address {} with {segment:?}", parent.kind_name()),
            )),
        })
    }

    /// Remove and return the value at a path.
    pub fn remove(&mut self, path: &Path) -> Result<ConfigValue> {
        let Some((parent_path, last)) = path.split_last() else {
            return Err(Error::invalid_path(path, "cannot remove the root"));
        };
        edit_at(self, &parent_path, 0, |parent| {
            let removed = match (parent, last) {
                (ConfigValue::Block(fields), Segment::Field(name)) => fields.remove(name),
                (ConfigValue::List(items), Segment::Index(i)) if *i < items.len() => {
                    Some(items.remove(*i))
                }
                (ConfigValue::Set(set), Segment::Member(key)) => set.remove(key),
                (ConfigValue::Set(set), Segment::Keyed { field, value }) => set
                    .find_key_by(field, value)
                    .and_then(|key| set.remove(&key)),
                (ConfigValue::Set(_), Segment::Index(_)) => {
                    return Err(Error::invalid_path(
                        path,
                        "sets have no position; address members by hash or natural key",
                    ));
                }
                _ => None,
            };
            removed.ok_or_else(|| Error::invalid_path(path, "nothing to remove"))
        })
    }

    /// Render the tree as JSON. Sets become arrays in hash order.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Scalar(s) => s.to_json(),
            Self::List(items) => items.iter().map(ConfigValue::to_json).collect(),
            Self::Set(set) => set.values().map(ConfigValue::to_json).collect(),
            Self::Map(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect::<serde_json::Map<_, _>>()
                .into(),
            Self::Block(fields) => fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect::<serde_json::Map<_, _>>()
                .into(),
        }
    }
}

impl From<Scalar> for ConfigValue {
    fn from(s: Scalar) -> Self {
        Self::Scalar(s)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        Self::string(s)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        Self::int(i)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        Self::bool(b)
    }
}

impl Serialize for ConfigValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn step<'v>(value: &'v ConfigValue, segment: &Segment) -> std::result::Result<&'v ConfigValue, String> {
    match (value, segment) {
        (ConfigValue::Block(fields), Segment::Field(name)) => fields
            .get(name)
            .ok_or_else(|| format!("no field `{name}`")),
        (ConfigValue::List(items), Segment::Index(i)) => items
            .get(*i)
            .ok_or_else(|| format!("index {i} out of bounds ({} items)", items.len())),
        (ConfigValue::Set(set), Segment::Member(key)) => {
            set.get(key).ok_or_else(|| format!("no member {key}"))
        }
        (ConfigValue::Set(set), Segment::Keyed { field, value }) => set
            .find_by(field, value)
            .map(|(_, member)| member)
            .ok_or_else(|| format!("no member with {field}={value}")),
        (ConfigValue::Set(_), Segment::Index(_)) => {
            Err("sets have no position; address members by hash or natural key".to_string())
        }
        (other, segment) => Err(format!("cannot address {} with {segment:?}", other.kind_name())),
    }
}

/// Run `edit` on the value at `path.segments()[depth..]`.
///
/// A set member on the way down is taken out of its set and put back
/// through [`ValueSet::replace`] once `edit` has run.
fn edit_at<T, F>(value: &mut ConfigValue, path: &Path, depth: usize, edit: F) -> Result<T>
where
    F: FnOnce(&mut ConfigValue) -> Result<T>,
{
    let Some(segment) = path.segments().get(depth) else {
        return edit(value);
    };
    let fail = |reason: String| Error::invalid_path(path, format!("{reason} at segment {}", depth + 1));
    match (value, segment) {
        (ConfigValue::Block(fields), Segment::Field(name)) => {
            let child = fields
                .get_mut(name)
                .ok_or_else(|| fail(format!("no field `{name}`")))?;
            edit_at(child, path, depth + 1, edit)
        }
        (ConfigValue::List(items), Segment::Index(i)) => {
            let len = items.len();
            let child = items
                .get_mut(*i)
                .ok_or_else(|| fail(format!("index {i} out of bounds ({len} items)")))?;
            edit_at(child, path, depth + 1, edit)
        }
        (ConfigValue::Set(set), Segment::Member(_) | Segment::Keyed { .. }) => {
            let key = match segment {
                Segment::Keyed { field, value } => set
                    .find_key_by(field, value)
                    .ok_or_else(|| fail(format!("no member with {field}={value}")))?,
                Segment::Member(key) => *key,
                _ => return Err(fail(format!("cannot address a set with {segment:?}"))),
            };
            let Some(mut member) = set.get(&key).cloned() else {
                return Err(fail(format!("no member {key}")));
            };
            let result = edit_at(&mut member, path, depth + 1, edit)?;
            set.replace(key, member);
            Ok(result)
        }
        (ConfigValue::Set(_), Segment::Index(_)) => Err(fail(
            "sets have no position; address members by hash or natural key".to_string(),
        )),
        (other, segment) => Err(fail(format!("cannot address {} with {segment:?}", other.kind_name()))),
    }
}

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    /// A block field.
    Field(String),
    /// A list position.
    Index(usize),
    /// A set member by content hash.
    Member(ContentHash),
    /// A set member whose block field `field` equals `value`.
    Keyed { field: String, value: String },
}

/// A location inside a [`ConfigValue`] tree.
///
/// Written either dotted (`origin[origin_id=s3].custom_header`,
/// `ordered_cache_behavior.0.path_pattern`, `aliases.#0a1b2c3d4e5f6071`) or
/// as a slash pointer (`/origin/#0a1b2c3d4e5f6071/domain_name`).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// The empty path, addressing the whole tree.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// First field name, used to group changes by top-level field.
    pub fn head_field(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Field(name)) => Some(name),
            _ => None,
        }
    }

    pub fn join(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    pub fn field(&self, name: &str) -> Self {
        self.join(Segment::Field(name.to_string()))
    }

    pub fn index(&self, i: usize) -> Self {
        self.join(Segment::Index(i))
    }

    pub fn member(&self, key: ContentHash) -> Self {
        self.join(Segment::Member(key))
    }

    /// Parent path and last segment, or `None` for the root.
    pub fn split_last(&self) -> Option<(Path, &Segment)> {
        let (last, rest) = self.segments.split_last()?;
        Some((Path::from_segments(rest.to_vec()), last))
    }

    /// Parse the dotted form.
    pub fn parse(dotted: &str) -> Result<Self> {
        let mut segments = Vec::new();
        if dotted.is_empty() {
            return Ok(Self::root());
        }
        for token in split_dotted(dotted) {
            let token = token.map_err(|reason| Error::invalid_path(dotted, reason))?;
            parse_token(token, &mut segments).map_err(|reason| Error::invalid_path(dotted, reason))?;
        }
        Ok(Self { segments })
    }

    /// Parse the slash pointer form.
    pub fn from_pointer(pointer: &str) -> Result<Self> {
        if pointer.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = pointer.strip_prefix('/') else {
            return Err(Error::invalid_path(pointer, "pointer must start with `/`"));
        };
        let mut segments = Vec::new();
        for raw in rest.split('/') {
            let token = raw.replace("~1", "/").replace("~0", "~");
            let segment = if let Some(hex) = token.strip_prefix('#') {
                Segment::Member(ContentHash::from_hex(hex).ok_or_else(|| {
                    Error::invalid_path(pointer, format!("bad member hash `{hex}`"))
                })?)
            } else if let Some(inner) = token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
                keyed_segment(inner).map_err(|reason| Error::invalid_path(pointer, reason))?
            } else if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
                Segment::Index(token.parse().map_err(|_| {
                    Error::invalid_path(pointer, format!("index `{token}` out of range"))
                })?)
            } else if token.is_empty() {
                return Err(Error::invalid_path(pointer, "empty segment"));
            } else {
                Segment::Field(token)
            };
            segments.push(segment);
        }
        Ok(Self { segments })
    }

    /// Render the slash pointer form.
    pub fn to_pointer(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Field(name) => out.push_str(&name.replace('~', "~0").replace('/', "~1")),
                Segment::Index(i) => out.push_str(&i.to_string()),
                Segment::Member(key) => out.push_str(&format!("#{key}")),
                Segment::Keyed { field, value } => out.push_str(&format!("[{field}={value}]")),
            }
        }
        out
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Keyed { field, value } => write!(f, "[{field}={value}]")?,
                other => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    match other {
                        Segment::Field(name) => f.write_str(name)?,
                        Segment::Index(idx) => write!(f, "{idx}")?,
                        Segment::Member(key) => write!(f, "#{key}")?,
                        Segment::Keyed { .. } => {}
                    }
                }
            }
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with('/') {
            Self::from_pointer(s)
        } else {
            Self::parse(s)
        }
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_pointer())
    }
}

/// Split on dots that are not inside `[...]`.
fn split_dotted(s: &str) -> Vec<std::result::Result<&str, String>> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                tokens.push(non_empty(&s[start..i]));
                start = i + 1;
            }
            _ => {}
        }
    }
    tokens.push(non_empty(&s[start..]));
    tokens
}

fn non_empty(token: &str) -> std::result::Result<&str, String> {
    if token.is_empty() {
        Err("empty segment".to_string())
    } else {
        Ok(token)
    }
}

fn parse_token(token: &str, segments: &mut Vec<Segment>) -> std::result::Result<(), String> {
    if let Some(hex) = token.strip_prefix('#') {
        let key = ContentHash::from_hex(hex).ok_or_else(|| format!("bad member hash `{hex}`"))?;
        segments.push(Segment::Member(key));
        return Ok(());
    }
    if token.bytes().all(|b| b.is_ascii_digit()) {
        let idx = token
            .parse()
            .map_err(|_| format!("index `{token}` out of range"))?;
        segments.push(Segment::Index(idx));
        return Ok(());
    }
    match token.find('[') {
        Some(open) => {
            let inner = token[open + 1..]
                .strip_suffix(']')
                .ok_or_else(|| format!("unterminated `[` in `{token}`"))?;
            if open > 0 {
                segments.push(Segment::Field(token[..open].to_string()));
            }
            segments.push(keyed_segment(inner)?);
        }
        None => segments.push(Segment::Field(token.to_string())),
    }
    Ok(())
}

fn keyed_segment(inner: &str) -> std::result::Result<Segment, String> {
    let (field, value) = inner
        .split_once('=')
        .ok_or_else(|| format!("expected `field=value`, got `{inner}`"))?;
    if field.is_empty() {
        return Err("natural key field is empty".to_string());
    }
    Ok(Segment::Keyed {
        field: field.to_string(),
        value: value.to_string(),
    })
}
