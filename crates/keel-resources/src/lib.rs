//! Resource type catalog for keel.
//!
//! Each module describes one vendor resource: its attribute shape, which
//! changes force a replacement, and how long its operations take to settle.
//!
//! | Type             | Create / update      | Delete         |
//! |------------------|----------------------|----------------|
//! | `search_domain`  | `active`, 60 min     | gone, 90 min   |
//! | `model_endpoint` | `InService`, 60 min  | gone, 60 min   |
//! | `web_acl`        | `active`, 5 min      | gone, 5 min    |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::collections::BTreeMap;

use keel_engine::{EngineConfig, ResourceType};

pub mod model_endpoint;
pub mod search_domain;
pub mod web_acl;

/// Resource types by name.
#[derive(Debug, Clone)]
pub struct Catalog {
    types: BTreeMap<String, ResourceType>,
}

impl Catalog {
    /// A catalog with every built-in resource type.
    #[must_use]
    pub fn builtin() -> Self {
        let types = [
            search_domain::resource_type(),
            model_endpoint::resource_type(),
            web_acl::resource_type(),
        ]
        .into_iter()
        .map(|t| (t.name().to_string(), t))
        .collect();
        Self { types }
    }

    /// Apply configuration overrides to every type.
    #[must_use]
    pub fn configured(self, config: &EngineConfig) -> Self {
        for name in config.resources.keys() {
            if !self.types.contains_key(name) {
                tracing::warn!(resource_type = %name, "Configuration for unknown resource type");
            }
        }
        let types = self
            .types
            .into_iter()
            .map(|(name, t)| (name, t.configured(config)))
            .collect();
        Self { types }
    }

    /// Look up a type by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResourceType> {
        self.types.get(name)
    }

    /// Names of all types, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}
