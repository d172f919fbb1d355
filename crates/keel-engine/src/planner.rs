//! Diff planning.
//!
//! [`plan`] walks the declared and remote trees side by side, guided by the
//! shape, and reports every leaf whose values differ. Each change is
//! classified as in-place or replace. If any change requires replacement the
//! plan collapses to the first such change in path order.
//!
//! Differences are reported at the deepest level the shape allows:
//!
//! - single blocks recurse into their entry
//! - ordered lists recurse index by index when both sides have the same
//!   length, and are reported whole otherwise
//! - sets, string sets and string maps are compared and reported whole
//!
//! Computed fields the declaration leaves out and write-only fields the
//! vendor does not return, or returns blank, are never reported. Fields that
//! omit empty values treat `""` as absent on both sides.

use std::fmt;

use keel_core::{AttrPath, AttrTree, Field, FieldKind, ForceReplace, Scalar, Shape, Value};
use serde::Serialize;

/// How a change will be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// Applied by an update request.
    InPlace,
    /// Requires deleting and recreating the resource.
    Replace,
    /// Nothing to do.
    NoOp,
}

/// One difference between declared and remote state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    /// Where the difference is.
    pub path: AttrPath,
    /// Remote value.
    pub old: Option<Value>,
    /// Declared value.
    pub new: Option<Value>,
    /// How it will be applied.
    pub action: ChangeAction,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.action {
            ChangeAction::InPlace => "~",
            ChangeAction::Replace => "-/+",
            ChangeAction::NoOp => " ",
        };
        let show = |v: &Option<Value>| {
            v.as_ref()
                .map_or_else(|| "(absent)".to_string(), ToString::to_string)
        };
        write!(f, "{marker} {}: {} -> {}", self.path, show(&self.old), show(&self.new))
    }
}

/// The changes needed to converge remote state on declared state, in path
/// order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Plan {
    changes: Vec<Change>,
}

impl Plan {
    /// Whether there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether the plan replaces the resource.
    #[must_use]
    pub fn requires_replace(&self) -> bool {
        self.changes.iter().any(|c| c.action == ChangeAction::Replace)
    }

    /// The changes, in path order.
    #[must_use]
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Consume the plan.
    #[must_use]
    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }

    /// Top-level attributes touched by the plan, in path order, without
    /// duplicates.
    #[must_use]
    pub fn top_level_attributes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.changes.iter().filter_map(|c| c.path.top_level()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

/// Compute the plan that takes `remote` to `declared`.
#[must_use]
pub fn plan(declared: &AttrTree, remote: &AttrTree, shape: &Shape) -> Plan {
    let mut changes = Vec::new();
    diff_block(
        Some(declared),
        Some(remote),
        shape,
        &AttrPath::root(),
        false,
        &mut changes,
    );
    changes.sort_by(|a, b| a.path.cmp(&b.path));

    if let Some(replace) = changes.iter().position(|c| c.action == ChangeAction::Replace) {
        changes = vec![changes.swap_remove(replace)];
    }
    Plan { changes }
}

fn diff_block(
    declared: Option<&AttrTree>,
    remote: Option<&AttrTree>,
    shape: &Shape,
    path: &AttrPath,
    force: bool,
    out: &mut Vec<Change>,
) {
    let empty = AttrTree::new();
    let d_block = declared.unwrap_or(&empty);
    let r_block = remote.unwrap_or(&empty);

    for field in shape.fields() {
        let d_val = field
            .is_active(d_block)
            .then(|| d_block.get(field.name()))
            .flatten();
        let r_val = field
            .is_active(r_block)
            .then(|| r_block.get(field.name()))
            .flatten();
        let (d_val, r_val) = if field.omits_empty() {
            (d_val.filter(|v| !is_blank(v)), r_val.filter(|v| !is_blank(v)))
        } else {
            (d_val, r_val)
        };

        if field.is_write_only() && r_val.is_none_or(is_blank) {
            continue;
        }
        if field.is_computed() && d_val.is_none() {
            continue;
        }

        let field_path = path.clone().attr(field.name());
        let force = force || field.replacement() == &ForceReplace::Always;
        let action = classify(field, d_block, r_block, force);

        match field.kind() {
            FieldKind::Block(nested) => {
                let d_entry = d_val.and_then(Value::as_blocks).and_then(<[AttrTree]>::first);
                let r_entry = r_val.and_then(Value::as_blocks).and_then(<[AttrTree]>::first);
                if d_entry.is_none() && r_entry.is_none() {
                    continue;
                }
                let before = out.len();
                diff_block(d_entry, r_entry, nested, &field_path.clone().index(0), force, out);
                if out.len() == before && d_entry.is_some() != r_entry.is_some() {
                    out.push(change(field_path, r_val, d_val, action));
                }
            }
            FieldKind::List(nested) => {
                let d_items = d_val.and_then(Value::as_blocks).unwrap_or_default();
                let r_items = r_val.and_then(Value::as_blocks).unwrap_or_default();
                if d_items.len() == r_items.len() {
                    for (i, (d, r)) in d_items.iter().zip(r_items).enumerate() {
                        let item_path = field_path.clone().index(i);
                        diff_block(Some(d), Some(r), nested, &item_path, force, out);
                    }
                } else {
                    out.push(change(field_path, r_val, d_val, action));
                }
            }
            FieldKind::Set(nested) => {
                let d_items = d_val.and_then(Value::as_blocks).unwrap_or_default();
                let r_items = r_val.and_then(Value::as_blocks).unwrap_or_default();
                if !same_members(d_items, r_items, nested) {
                    out.push(change(field_path, r_val, d_val, action));
                }
            }
            _ => {
                if !Value::same(d_val, r_val) {
                    out.push(change(field_path, r_val, d_val, action));
                }
            }
        }
    }
}

/// Sets match when every declared member pairs with a distinct remote member
/// that has no differences of its own. Computed fields the declared member
/// leaves out are ignored.
fn same_members(declared: &[AttrTree], remote: &[AttrTree], shape: &Shape) -> bool {
    if declared.len() != remote.len() {
        return false;
    }
    let mut unmatched: Vec<&AttrTree> = remote.iter().collect();
    declared.iter().all(|d| {
        let found = unmatched.iter().position(|r| {
            let mut scratch = Vec::new();
            diff_block(Some(d), Some(*r), shape, &AttrPath::root(), false, &mut scratch);
            scratch.is_empty()
        });
        found.map(|i| unmatched.swap_remove(i)).is_some()
    })
}

fn is_blank(value: &Value) -> bool {
    matches!(value, Value::Scalar(Scalar::String(s)) if s.is_empty()) || value.is_empty_collection()
}

fn classify(field: &Field, declared: &AttrTree, remote: &AttrTree, force: bool) -> ChangeAction {
    if force {
        return ChangeAction::Replace;
    }
    match field.replacement() {
        ForceReplace::Never => ChangeAction::InPlace,
        ForceReplace::Always => ChangeAction::Replace,
        ForceReplace::OnSiblingTransition { sibling, from, to } => {
            if remote.scalar(sibling) == Some(from) && declared.scalar(sibling) == Some(to) {
                ChangeAction::Replace
            } else {
                ChangeAction::InPlace
            }
        }
    }
}

fn change(
    path: AttrPath,
    old: Option<&Value>,
    new: Option<&Value>,
    action: ChangeAction,
) -> Change {
    Change {
        path,
        old: old.cloned(),
        new: new.cloned(),
        action,
    }
}
