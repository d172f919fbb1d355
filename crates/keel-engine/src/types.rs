//! Reconcile inputs and results.

use std::fmt;

use chrono::{DateTime, Utc};
use keel_core::{AttrPath, AttrTree, ResourceId};
use serde::{Deserialize, Serialize};

use crate::planner::Change;

/// What the engine last saw of a remote resource.
///
/// Callers persist this between runs and pass it back as the prior state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteState {
    /// Vendor-assigned identity.
    pub identity: ResourceId,
    /// Resource type name.
    pub resource_type: String,
    /// Flattened remote attributes, including carried write-only values.
    pub tree: AttrTree,
    /// When the tree was read.
    pub observed_at: DateTime<Utc>,
}

impl RemoteState {
    /// A state observed now.
    #[must_use]
    pub fn observed(
        identity: ResourceId,
        resource_type: impl Into<String>,
        tree: AttrTree,
    ) -> Self {
        Self {
            identity,
            resource_type: resource_type.into(),
            tree,
            observed_at: Utc::now(),
        }
    }
}

/// The action a reconcile took.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "changes", rename_all = "snake_case")]
pub enum Applied {
    /// No prior identity; the resource was created.
    Created,
    /// The prior identity no longer existed; the resource was created again.
    Recreated,
    /// A force-replace change deleted and recreated the resource.
    Replaced,
    /// In-place updates were applied.
    Updated(Vec<Change>),
    /// Remote state already matched.
    Unchanged,
}

impl fmt::Display for Applied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Recreated => f.write_str("recreated"),
            Self::Replaced => f.write_str("replaced"),
            Self::Updated(changes) => write!(f, "updated ({} change(s))", changes.len()),
            Self::Unchanged => f.write_str("unchanged"),
        }
    }
}

/// A successful reconcile.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// Remote state after the run.
    pub state: RemoteState,
    /// What was done.
    pub applied: Applied,
    /// Write-only values carried forward without vendor confirmation.
    pub unverified: Vec<AttrPath>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_state_serde_json() {
        let state = RemoteState::observed(
            ResourceId::new("logs").unwrap(),
            "search_domain",
            AttrTree::new().with("domain_name", "logs"),
        );
        let json = serde_json::to_string(&state).unwrap();
        let parsed: RemoteState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, parsed);
    }

    #[test]
    fn applied_display() {
        assert_eq!(Applied::Created.to_string(), "created");
        assert_eq!(Applied::Updated(vec![]).to_string(), "updated (0 change(s))");
    }

    #[test]
    fn applied_serializes_with_tag() {
        let json = serde_json::to_value(Applied::Recreated).unwrap();
        assert_eq!(json, serde_json::json!({"action": "recreated"}));
    }
}
