//! Resource type descriptors.

use keel_core::Shape;

use crate::config::EngineConfig;
use crate::lifecycle::ResourceLifecycle;

/// Everything the engine needs to know about one kind of resource.
#[derive(Debug, Clone)]
pub struct ResourceType {
    name: String,
    shape: Shape,
    lifecycle: ResourceLifecycle,
}

impl ResourceType {
    /// Create a resource type.
    #[must_use]
    pub fn new(name: impl Into<String>, shape: Shape, lifecycle: ResourceLifecycle) -> Self {
        Self {
            name: name.into(),
            shape,
            lifecycle,
        }
    }

    /// Apply configuration overrides for this type.
    #[must_use]
    pub fn configured(mut self, config: &EngineConfig) -> Self {
        config.apply(&self.name, &mut self.lifecycle);
        self
    }

    /// The type name used in vendor URLs and state files.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attribute schema.
    #[must_use]
    pub const fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The polling policies.
    #[must_use]
    pub const fn lifecycle(&self) -> &ResourceLifecycle {
        &self.lifecycle
    }
}
