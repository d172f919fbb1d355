//! Engine configuration.
//!
//! Configuration only tunes timing. Which states count as done or failed is
//! part of each resource type and cannot be overridden.
//!
//! ```json
//! {
//!   "vendor_url": "https://vendor.example.com",
//!   "resources": {
//!     "search_domain": {
//!       "create": { "min_delay_ms": 30000, "timeout_seconds": 7200 }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::lifecycle::{OperationKind, ResourceLifecycle, WaitPolicy};

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the vendor API.
    #[serde(default)]
    pub vendor_url: Option<String>,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "EngineConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Polling overrides keyed by resource type name.
    #[serde(default)]
    pub resources: BTreeMap<String, LifecycleConfig>,
}

impl EngineConfig {
    const fn default_request_timeout() -> u64 {
        30
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Apply the overrides for `resource_type` to its lifecycle.
    pub fn apply(&self, resource_type: &str, lifecycle: &mut ResourceLifecycle) {
        let Some(overrides) = self.resources.get(resource_type) else {
            return;
        };
        for kind in [OperationKind::Create, OperationKind::Update, OperationKind::Delete] {
            if let Some(policy) = overrides.policy(kind) {
                policy.apply(lifecycle.policy_mut(kind));
            }
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vendor_url: None,
            request_timeout_seconds: Self::default_request_timeout(),
            resources: BTreeMap::new(),
        }
    }
}

/// Polling overrides for one resource type.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    /// Overrides for waits after create.
    #[serde(default)]
    pub create: Option<PolicyConfig>,
    /// Overrides for waits after update.
    #[serde(default)]
    pub update: Option<PolicyConfig>,
    /// Overrides for waits after delete.
    #[serde(default)]
    pub delete: Option<PolicyConfig>,
}

impl LifecycleConfig {
    const fn policy(&self, kind: OperationKind) -> Option<&PolicyConfig> {
        match kind {
            OperationKind::Create => self.create.as_ref(),
            OperationKind::Update => self.update.as_ref(),
            OperationKind::Delete => self.delete.as_ref(),
        }
    }
}

/// Timing overrides for one operation kind. Unset fields keep the resource
/// type's value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Delay before the first poll, in milliseconds.
    pub min_delay_ms: Option<u64>,
    /// Cap on the delay between polls, in milliseconds.
    pub max_delay_ms: Option<u64>,
    /// Backoff multiplier.
    pub multiplier: Option<f64>,
    /// Overall deadline, in seconds.
    pub timeout_seconds: Option<u64>,
}

impl PolicyConfig {
    /// Overwrite the fields of `policy` that this config sets.
    pub fn apply(&self, policy: &mut WaitPolicy) {
        if let Some(ms) = self.min_delay_ms {
            policy.min_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.max_delay_ms {
            policy.max_delay = Duration::from_millis(ms);
        }
        if let Some(multiplier) = self.multiplier {
            policy.multiplier = multiplier;
        }
        if let Some(secs) = self.timeout_seconds {
            policy.deadline = Duration::from_secs(secs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::GONE_STATE;

    fn lifecycle() -> ResourceLifecycle {
        ResourceLifecycle {
            create: WaitPolicy::new(["active"]),
            update: WaitPolicy::new(["active"]),
            delete: WaitPolicy::new([GONE_STATE]),
        }
    }

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert!(config.vendor_url.is_none());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.resources.is_empty());
    }

    #[test]
    fn parse_empty_document() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.request_timeout_seconds, 30);
    }

    #[test]
    fn overrides_apply_per_operation() {
        let config: EngineConfig = serde_json::from_str(
            r#"{
                "vendor_url": "http://localhost:9000",
                "resources": {
                    "search_domain": {
                        "create": {"min_delay_ms": 500, "timeout_seconds": 120},
                        "delete": {"multiplier": 1.5}
                    }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.vendor_url.as_deref(), Some("http://localhost:9000"));

        let mut search = lifecycle();
        config.apply("search_domain", &mut search);
        assert_eq!(search.create.min_delay, Duration::from_millis(500));
        assert_eq!(search.create.deadline, Duration::from_secs(120));
        assert_eq!(search.create.max_delay, lifecycle().create.max_delay);
        assert_eq!(search.update, lifecycle().update);
        assert!((search.delete.multiplier - 1.5).abs() < f64::EPSILON);

        let mut other = lifecycle();
        config.apply("web_acl", &mut other);
        assert_eq!(other, lifecycle());
    }

    #[test]
    fn unknown_policy_fields_rejected() {
        let result: Result<EngineConfig, _> = serde_json::from_str(
            r#"{"resources": {"web_acl": {"create": {"min_delay": 5}}}}"#,
        );
        assert!(result.is_err());
    }
}
