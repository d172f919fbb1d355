//! Core types for keel.
//!
//! This crate provides the foundational types shared by the reconciliation engine
//! and the resource catalog:
//!
//! - **Identifiers**: vendor-assigned resource identities and operation ids
//! - **Attribute trees**: the declared and remote configuration of one resource
//! - **Shape descriptors**: the static schema that types every tree
//! - **Error types**: shape mismatches between a tree and its descriptor
//!
//! # Example
//!
//! ```
//! use keel_core::{AttrTree, Field, Scalar, Shape};
//!
//! let shape = Shape::new()
//!     .field(Field::string("instance_type").vendor("InstanceType").force_replace())
//!     .field(Field::int("instance_count").vendor("InstanceCount").computed());
//!
//! let tree = AttrTree::new()
//!     .with("instance_type", Scalar::from("small"))
//!     .with("instance_count", Scalar::Int(2));
//!
//! assert!(shape.get("instance_count").is_some());
//! assert_eq!(tree.len(), 2);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod shape;
pub mod tree;

pub use error::{MapError, Result};
pub use ids::{IdError, OperationId, ResourceId};
pub use shape::{Condition, Field, FieldKind, ForceReplace, Shape};
pub use tree::{AttrPath, AttrTree, PathSegment, Scalar, Value};
