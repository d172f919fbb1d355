//! Translation between attribute trees and vendor JSON.
//!
//! [`expand`] turns a declared tree into a vendor request and [`flatten`]
//! turns a vendor read back into a tree. Both are driven entirely by the
//! [`Shape`]; neither invents values the input does not contain.
//!
//! Rules applied at every depth:
//!
//! - absent attributes and empty collections are omitted from requests
//! - a single nested block is a JSON object on the wire and a one-entry list
//!   in the tree
//! - a conditional field is only mapped when its condition holds on the
//!   enclosing block
//! - a write-only field missing from a vendor response, or echoed back blank,
//!   keeps its value from the prior tree
//! - a field marked `omit_empty` never sends `""` and reads `""` as absent
//!
//! Without write-only fields, `flatten(expand(t), None) == t` for any tree `t`
//! that matches its shape.

use keel_core::{AttrPath, AttrTree, Field, FieldKind, MapError, Scalar, Shape, Value};
use serde_json::{Number, Value as JsonValue};

use crate::client::JsonMap;

/// A result type using `MapError`.
pub type Result<T> = std::result::Result<T, MapError>;

/// Which name a JSON document uses for each field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Naming {
    /// Vendor field names, as on the wire.
    Vendor,
    /// Attribute names, as in declared configuration files.
    Attribute,
}

impl Naming {
    fn key(self, field: &Field) -> &str {
        match self {
            Self::Vendor => field.vendor_name(),
            Self::Attribute => field.name(),
        }
    }
}

/// Build a vendor request from a tree.
///
/// # Errors
///
/// Returns `MapError::KindMismatch` if an attribute holds a value of a
/// different kind than its field declares.
pub fn expand(tree: &AttrTree, shape: &Shape) -> Result<JsonMap> {
    expand_block(tree, shape, &AttrPath::root(), Naming::Vendor)
}

/// Build the vendor request fragment for one top-level attribute.
///
/// The map holds the field's vendor name. Its value is JSON `null` when the
/// attribute is absent, inactive or an empty collection, which asks the
/// vendor to clear it. Returns an empty map if `name` is not in the shape.
///
/// # Errors
///
/// Returns `MapError::KindMismatch` as for [`expand`].
pub fn expand_attribute(tree: &AttrTree, shape: &Shape, name: &str) -> Result<JsonMap> {
    let mut request = JsonMap::new();
    let Some(field) = shape.get(name) else {
        return Ok(request);
    };
    let value = match tree.get(name) {
        Some(value) if field.is_active(tree) => {
            expand_value(field, value, &AttrPath::root().attr(name), Naming::Vendor)?
        }
        _ => None,
    };
    request.insert(
        field.vendor_name().to_string(),
        value.unwrap_or(JsonValue::Null),
    );
    Ok(request)
}

/// Rebuild a tree from a vendor response.
///
/// Vendor fields not in the shape are ignored. Write-only fields the
/// response omits or leaves blank are copied from `prior`.
///
/// # Errors
///
/// Returns `MapError::VendorMismatch` if a vendor field has the wrong JSON
/// type for its field.
pub fn flatten(response: &JsonValue, shape: &Shape, prior: Option<&AttrTree>) -> Result<AttrTree> {
    let object = as_object(response, &AttrPath::root())?;
    flatten_block(object, shape, prior, &AttrPath::root(), Naming::Vendor)
}

/// Parse a declared configuration document keyed by attribute names.
///
/// # Errors
///
/// Returns `MapError::VendorMismatch` if a value has the wrong JSON type for
/// its field.
pub fn from_declared_json(document: &JsonValue, shape: &Shape) -> Result<AttrTree> {
    let object = as_object(document, &AttrPath::root())?;
    flatten_block(object, shape, None, &AttrPath::root(), Naming::Attribute)
}

/// Render a tree as a document keyed by attribute names, the inverse of
/// [`from_declared_json`].
///
/// # Errors
///
/// Returns `MapError::KindMismatch` as for [`expand`].
pub fn to_declared_json(tree: &AttrTree, shape: &Shape) -> Result<JsonValue> {
    expand_block(tree, shape, &AttrPath::root(), Naming::Attribute).map(JsonValue::Object)
}

/// Paths of write-only values present in `tree`.
///
/// These values were never confirmed by the vendor and are reported as
/// unverified.
#[must_use]
pub fn write_only_paths(tree: &AttrTree, shape: &Shape) -> Vec<AttrPath> {
    let mut paths = Vec::new();
    collect_write_only(tree, shape, &AttrPath::root(), &mut paths);
    paths
}

fn collect_write_only(tree: &AttrTree, shape: &Shape, path: &AttrPath, out: &mut Vec<AttrPath>) {
    for field in shape.fields() {
        let Some(value) = tree.get(field.name()) else {
            continue;
        };
        let field_path = path.clone().attr(field.name());
        if field.is_write_only() {
            if !value.is_empty_collection() {
                out.push(field_path);
            }
            continue;
        }
        if let (FieldKind::Block(nested) | FieldKind::List(nested), Some(entries)) =
            (field.kind(), value.as_blocks())
        {
            for (i, entry) in entries.iter().enumerate() {
                collect_write_only(entry, nested, &field_path.clone().index(i), out);
            }
        }
    }
}

fn expand_block(
    tree: &AttrTree,
    shape: &Shape,
    path: &AttrPath,
    naming: Naming,
) -> Result<JsonMap> {
    let mut object = JsonMap::new();
    for field in shape.fields() {
        if !field.is_active(tree) {
            continue;
        }
        let Some(value) = tree.get(field.name()) else {
            continue;
        };
        let field_path = path.clone().attr(field.name());
        if let Some(json) = expand_value(field, value, &field_path, naming)? {
            object.insert(naming.key(field).to_string(), json);
        }
    }
    Ok(object)
}

/// Expand one value. `None` means "omit".
fn expand_value(
    field: &Field,
    value: &Value,
    path: &AttrPath,
    naming: Naming,
) -> Result<Option<JsonValue>> {
    let mismatch = || MapError::KindMismatch {
        path: path.clone(),
        expected: field.kind().name(),
        found: value.kind_name(),
    };

    let json = match (field.kind(), value) {
        (FieldKind::String, Value::Scalar(Scalar::String(s))) => {
            if s.is_empty() && field.omits_empty() {
                return Ok(None);
            }
            JsonValue::String(s.clone())
        }
        (FieldKind::Int, Value::Scalar(s)) => JsonValue::from(s.as_i64().ok_or_else(mismatch)?),
        (FieldKind::Float, Value::Scalar(s)) => {
            let f = s.as_f64().ok_or_else(mismatch)?;
            let number = Number::from_f64(f).ok_or_else(|| MapError::KindMismatch {
                path: path.clone(),
                expected: "finite float",
                found: "float",
            })?;
            JsonValue::Number(number)
        }
        (FieldKind::Bool, Value::Scalar(Scalar::Bool(b))) => JsonValue::Bool(*b),
        (FieldKind::StringSet, Value::StringSet(items)) => {
            if items.is_empty() {
                return Ok(None);
            }
            JsonValue::Array(items.iter().cloned().map(JsonValue::String).collect())
        }
        (FieldKind::StringMap, Value::StringMap(items)) => {
            if items.is_empty() {
                return Ok(None);
            }
            JsonValue::Object(
                items
                    .iter()
                    .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
                    .collect(),
            )
        }
        (FieldKind::Block(nested), Value::List(entries)) => match entries.as_slice() {
            [] => return Ok(None),
            [entry] => {
                let entry_path = path.clone().index(0);
                JsonValue::Object(expand_block(entry, nested, &entry_path, naming)?)
            }
            _ => {
                return Err(MapError::KindMismatch {
                    path: path.clone(),
                    expected: "single block",
                    found: "list",
                })
            }
        },
        (FieldKind::List(nested), Value::List(entries)) => {
            if entries.is_empty() {
                return Ok(None);
            }
            let items = entries
                .iter()
                .enumerate()
                .map(|(i, entry)| {
                    let entry_path = path.clone().index(i);
                    expand_block(entry, nested, &entry_path, naming).map(JsonValue::Object)
                })
                .collect::<Result<Vec<_>>>()?;
            JsonValue::Array(items)
        }
        (FieldKind::Set(nested), Value::Set(entries)) => {
            if entries.is_empty() {
                return Ok(None);
            }
            // Deterministic wire order regardless of insertion order.
            let mut members: Vec<(String, &AttrTree)> =
                entries.iter().map(|e| (e.fingerprint(), e)).collect();
            members.sort_by(|a, b| a.0.cmp(&b.0));
            members.dedup_by(|a, b| a.0 == b.0);
            let items = members
                .into_iter()
                .enumerate()
                .map(|(i, (_, entry))| {
                    let entry_path = path.clone().index(i);
                    expand_block(entry, nested, &entry_path, naming).map(JsonValue::Object)
                })
                .collect::<Result<Vec<_>>>()?;
            JsonValue::Array(items)
        }
        (kind, value) if value.is_empty_collection() && !kind.is_scalar() => return Ok(None),
        _ => return Err(mismatch()),
    };
    Ok(Some(json))
}

/// Null always reads as absent. Empty strings and collections also do for
/// write-only fields, which vendors echo back blank, and for fields that
/// omit empty values.
fn is_blank(field: &Field, raw: &JsonValue) -> bool {
    let empty = match raw {
        JsonValue::Null => return true,
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(items) => items.is_empty(),
        JsonValue::Bool(_) | JsonValue::Number(_) => false,
    };
    empty && (field.is_write_only() || field.omits_empty())
}

fn as_object<'a>(json: &'a JsonValue, path: &AttrPath) -> Result<&'a JsonMap> {
    json.as_object().ok_or_else(|| MapError::VendorMismatch {
        path: path.clone(),
        expected: "object",
    })
}

fn flatten_block(
    object: &JsonMap,
    shape: &Shape,
    prior: Option<&AttrTree>,
    path: &AttrPath,
    naming: Naming,
) -> Result<AttrTree> {
    let mut tree = AttrTree::new();

    // Unconditional fields first so discriminators are known when conditional
    // fields are evaluated.
    let (plain, conditional): (Vec<&Field>, Vec<&Field>) = shape
        .fields()
        .iter()
        .partition(|f| f.condition().is_none());

    for field in plain {
        flatten_field(object, field, prior, path, naming, &mut tree)?;
    }
    for field in conditional {
        if field.is_active(&tree) {
            flatten_field(object, field, prior, path, naming, &mut tree)?;
        }
    }
    Ok(tree)
}

fn flatten_field(
    object: &JsonMap,
    field: &Field,
    prior: Option<&AttrTree>,
    path: &AttrPath,
    naming: Naming,
    tree: &mut AttrTree,
) -> Result<()> {
    let raw = object
        .get(naming.key(field))
        .filter(|v| !is_blank(field, v));

    let Some(raw) = raw else {
        if field.is_write_only() {
            if let Some(carried) = prior.and_then(|p| p.get(field.name())) {
                tree.insert(field.name(), carried.clone());
            }
        }
        return Ok(());
    };

    let field_path = path.clone().attr(field.name());
    let prior_entries = prior
        .and_then(|p| p.get(field.name()))
        .and_then(Value::as_blocks)
        .unwrap_or_default();

    if let Some(value) = flatten_value(field, raw, prior_entries, &field_path, naming)? {
        tree.insert(field.name(), value);
    }
    Ok(())
}

/// Flatten one present JSON value. `None` means "absent".
fn flatten_value(
    field: &Field,
    raw: &JsonValue,
    prior_entries: &[AttrTree],
    path: &AttrPath,
    naming: Naming,
) -> Result<Option<Value>> {
    let mismatch = |expected: &'static str| MapError::VendorMismatch {
        path: path.clone(),
        expected,
    };

    let value = match field.kind() {
        FieldKind::String => Value::from(raw.as_str().ok_or_else(|| mismatch("string"))?),
        FieldKind::Int => {
            let int = raw
                .as_i64()
                .or_else(|| Scalar::Float(raw.as_f64()?).as_i64())
                .ok_or_else(|| mismatch("integer"))?;
            Value::from(int)
        }
        FieldKind::Float => Value::from(raw.as_f64().ok_or_else(|| mismatch("number"))?),
        FieldKind::Bool => Value::from(raw.as_bool().ok_or_else(|| mismatch("boolean"))?),
        FieldKind::StringSet => {
            let items = raw.as_array().ok_or_else(|| mismatch("array of strings"))?;
            if items.is_empty() {
                return Ok(None);
            }
            let strings = items
                .iter()
                .map(|item| item.as_str().ok_or_else(|| mismatch("array of strings")))
                .collect::<Result<Vec<_>>>()?;
            Value::strings(strings)
        }
        FieldKind::StringMap => {
            let items = raw.as_object().ok_or_else(|| mismatch("object of strings"))?;
            if items.is_empty() {
                return Ok(None);
            }
            let map = items
                .iter()
                .map(|(k, v)| {
                    v.as_str()
                        .map(|v| (k.clone(), v.to_string()))
                        .ok_or_else(|| mismatch("object of strings"))
                })
                .collect::<Result<_>>()?;
            Value::StringMap(map)
        }
        FieldKind::Block(nested) => {
            let object = as_object(raw, path)?;
            let entry_path = path.clone().index(0);
            let entry = flatten_block(object, nested, prior_entries.first(), &entry_path, naming)?;
            Value::block(entry)
        }
        FieldKind::List(nested) => {
            let items = raw.as_array().ok_or_else(|| mismatch("array of objects"))?;
            if items.is_empty() {
                return Ok(None);
            }
            let entries = items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let entry_path = path.clone().index(i);
                    let object = as_object(item, &entry_path)?;
                    flatten_block(object, nested, prior_entries.get(i), &entry_path, naming)
                })
                .collect::<Result<Vec<_>>>()?;
            Value::List(entries)
        }
        FieldKind::Set(nested) => {
            let items = raw.as_array().ok_or_else(|| mismatch("array of objects"))?;
            if items.is_empty() {
                return Ok(None);
            }
            let entries = items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let entry_path = path.clone().index(i);
                    let object = as_object(item, &entry_path)?;
                    flatten_block(object, nested, None, &entry_path, naming)
                })
                .collect::<Result<Vec<_>>>()?;
            Value::set(entries)
        }
    };
    Ok(Some(value))
}
