//! Attribute trees.
//!
//! An [`AttrTree`] is the in-memory form of one resource's configuration, either
//! as declared by the user or as reconstructed from a vendor read. Every node is
//! a tagged [`Value`]; which tag a given attribute carries is decided by the
//! resource's [`Shape`](crate::Shape), never by inspecting the data.
//!
//! # Equality
//!
//! `PartialEq` on trees and values is *semantic*:
//!
//! - `Int(10)` equals `Float(10.0)`
//! - sets compare without regard to order
//! - lists compare element by element, in order
//! - an absent attribute equals an empty collection
//!
//! The same rules drive [`AttrTree::fingerprint`], so two trees are equal exactly
//! when their fingerprints are.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// A leaf value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    /// A string value.
    String(String),
    /// An integral number.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A boolean.
    Bool(bool),
}

impl Scalar {
    /// Name of the scalar kind, used in error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
        }
    }

    /// Return the string value, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Return the value as an `i64` if it is integral.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if is_integral(*f) => Some(*f as i64),
            _ => None,
        }
    }

    /// Return the value as an `f64` if it is numeric.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Return the boolean value, if this is a bool.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn hash_into(&self, hasher: &mut blake3::Hasher) {
        match self {
            Self::String(s) => {
                hasher.update(b"s");
                hash_str(hasher, s);
            }
            Self::Bool(b) => {
                hasher.update(b"b");
                hasher.update(&[u8::from(*b)]);
            }
            Self::Int(_) | Self::Float(_) => {
                if let Some(i) = self.as_i64() {
                    hasher.update(b"i");
                    hasher.update(&i.to_le_bytes());
                } else if let Self::Float(f) = self {
                    hasher.update(b"f");
                    hasher.update(&f.to_bits().to_le_bytes());
                }
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn is_integral(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

impl PartialEq for Scalar {
    #[allow(clippy::float_cmp)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                match (self.as_i64(), other.as_i64()) {
                    (Some(a), Some(b)) => a == b,
                    (None, None) => self.as_f64() == other.as_f64(),
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A node in an attribute tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// A leaf value.
    Scalar(Scalar),
    /// Repeated nested block where order is significant. Single nested blocks
    /// are lists of zero or one entries.
    List(Vec<AttrTree>),
    /// Repeated nested block without significant order. Use [`Value::set`] to
    /// build one so members are deduplicated.
    Set(Vec<AttrTree>),
    /// Unordered set of strings.
    StringSet(BTreeSet<String>),
    /// String to string map.
    StringMap(BTreeMap<String, String>),
}

impl Value {
    /// Build a set value, dropping members semantically equal to an earlier one.
    #[must_use]
    pub fn set(members: impl IntoIterator<Item = AttrTree>) -> Self {
        let mut seen = BTreeSet::new();
        let members = members
            .into_iter()
            .filter(|m| seen.insert(m.digest()))
            .collect();
        Self::Set(members)
    }

    /// Build a single nested block (a list with one entry).
    #[must_use]
    pub fn block(tree: AttrTree) -> Self {
        Self::List(vec![tree])
    }

    /// Build a string set.
    #[must_use]
    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::StringSet(items.into_iter().map(Into::into).collect())
    }

    /// Name of the value kind, used in error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Scalar(s) => s.kind_name(),
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::StringSet(_) => "string set",
            Self::StringMap(_) => "string map",
        }
    }

    /// Return the scalar, if this is a leaf.
    #[must_use]
    pub const fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Return the nested entries of a list or set.
    #[must_use]
    pub fn as_blocks(&self) -> Option<&[AttrTree]> {
        match self {
            Self::List(items) | Self::Set(items) => Some(items),
            _ => None,
        }
    }

    /// True for collections with no members. Scalars are never empty.
    #[must_use]
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::List(items) | Self::Set(items) => items.is_empty(),
            Self::StringSet(items) => items.is_empty(),
            Self::StringMap(items) => items.is_empty(),
        }
    }

    /// Semantic equality of two optional values, treating an absent value as
    /// equal to an empty collection.
    #[must_use]
    pub fn same(a: Option<&Self>, b: Option<&Self>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a == b,
            (Some(v), None) | (None, Some(v)) => v.is_empty_collection(),
            (None, None) => true,
        }
    }

    fn hash_into(&self, hasher: &mut blake3::Hasher) {
        match self {
            Self::Scalar(s) => s.hash_into(hasher),
            Self::List(items) => {
                hasher.update(b"l");
                hasher.update(&(items.len() as u64).to_le_bytes());
                for item in items {
                    hasher.update(&item.digest());
                }
            }
            Self::Set(items) => {
                let digests: BTreeSet<[u8; 32]> = items.iter().map(AttrTree::digest).collect();
                hasher.update(b"S");
                hasher.update(&(digests.len() as u64).to_le_bytes());
                for digest in &digests {
                    hasher.update(digest);
                }
            }
            Self::StringSet(items) => {
                hasher.update(b"z");
                hasher.update(&(items.len() as u64).to_le_bytes());
                for item in items {
                    hash_str(hasher, item);
                }
            }
            Self::StringMap(items) => {
                hasher.update(b"m");
                hasher.update(&(items.len() as u64).to_le_bytes());
                for (k, v) in items {
                    hash_str(hasher, k);
                    hash_str(hasher, v);
                }
            }
        }
    }
}

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => {
                let a: BTreeSet<[u8; 32]> = a.iter().map(AttrTree::digest).collect();
                let b: BTreeSet<[u8; 32]> = b.iter().map(AttrTree::digest).collect();
                a == b
            }
            (Self::StringSet(a), Self::StringSet(b)) => a == b,
            (Self::StringMap(a), Self::StringMap(b)) => a == b,
            _ => self.is_empty_collection() && other.is_empty_collection(),
        }
    }
}

impl From<Scalar> for Value {
    fn from(value: Scalar) -> Self {
        Self::Scalar(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Scalar(value.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => write!(f, "{s}"),
            Self::List(items) => write!(f, "[{} block(s)]", items.len()),
            Self::Set(items) => write!(f, "{{{} block(s)}}", items.len()),
            Self::StringSet(items) => {
                let items: Vec<&str> = items.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", items.join(", "))
            }
            Self::StringMap(items) => {
                let items: Vec<String> = items.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{{{}}}", items.join(", "))
            }
        }
    }
}

/// An ordered mapping from attribute name to value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttrTree {
    attrs: BTreeMap<String, Value>,
}

impl AttrTree {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace an attribute.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.attrs.insert(name.into(), value.into())
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.attrs.remove(name)
    }

    /// Look up an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// Look up a scalar attribute.
    #[must_use]
    pub fn scalar(&self, name: &str) -> Option<&Scalar> {
        self.get(name).and_then(Value::as_scalar)
    }

    /// Look up the single entry of a nested block attribute.
    #[must_use]
    pub fn block(&self, name: &str) -> Option<&Self> {
        self.get(name)
            .and_then(Value::as_blocks)
            .and_then(<[Self]>::first)
    }

    /// Resolve a full attribute path.
    #[must_use]
    pub fn get_path(&self, path: &AttrPath) -> Option<&Value> {
        let mut segments = path.segments().iter();
        let Some(PathSegment::Attr(first)) = segments.next() else {
            return None;
        };
        let mut current = self.get(first)?;
        let mut pending_index: Option<usize> = None;

        for segment in segments {
            match segment {
                PathSegment::Index(i) => pending_index = Some(*i),
                PathSegment::Attr(name) => {
                    let entry = current.as_blocks()?.get(pending_index.take()?)?;
                    current = entry.get(name)?;
                }
            }
        }

        if pending_index.is_some() {
            return None;
        }
        Some(current)
    }

    /// Whether an attribute is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    /// Iterate attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of attributes present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Whether the tree has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Stable content digest, hex encoded.
    ///
    /// Empty collections are skipped so they hash like absent attributes, and
    /// integral floats hash like integers.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        hex::encode(self.digest())
    }

    pub(crate) fn digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        for (name, value) in &self.attrs {
            if value.is_empty_collection() {
                continue;
            }
            hash_str(&mut hasher, name);
            value.hash_into(&mut hasher);
        }
        *hasher.finalize().as_bytes()
    }
}

impl PartialEq for AttrTree {
    fn eq(&self, other: &Self) -> bool {
        self.attrs
            .keys()
            .chain(other.attrs.keys())
            .all(|k| Value::same(self.attrs.get(k), other.attrs.get(k)))
    }
}

impl FromIterator<(String, Value)> for AttrTree {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            attrs: iter.into_iter().collect(),
        }
    }
}

/// One step in an [`AttrPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// A named attribute.
    Attr(String),
    /// A position inside a list.
    Index(usize),
}

/// Location of a value inside an attribute tree, e.g. `cluster_config.0.instance_count`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttrPath(Vec<PathSegment>);

impl AttrPath {
    /// The empty path (the tree itself).
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Extend with an attribute name.
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>) -> Self {
        self.0.push(PathSegment::Attr(name.into()));
        self
    }

    /// Extend with a list index.
    #[must_use]
    pub fn index(mut self, index: usize) -> Self {
        self.0.push(PathSegment::Index(index));
        self
    }

    /// Path segments, outermost first.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// The top-level attribute this path starts at.
    #[must_use]
    pub fn top_level(&self) -> Option<&str> {
        match self.0.first() {
            Some(PathSegment::Attr(name)) => Some(name),
            _ => None,
        }
    }

    /// Number of segments.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match segment {
                PathSegment::Attr(name) => f.write_str(name)?,
                PathSegment::Index(idx) => write!(f, "{idx}")?,
            }
        }
        Ok(())
    }
}
