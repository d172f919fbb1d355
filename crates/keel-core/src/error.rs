//! Shape validation errors.
//!
//! A `MapError` means an attribute tree or a vendor object does not match the
//! shape descriptor it is being mapped through. These are never retried.

use thiserror::Error;

use crate::tree::AttrPath;

/// A result type using `MapError`.
pub type Result<T> = std::result::Result<T, MapError>;

/// Errors raised when a tree or vendor object disagrees with its shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    /// A tree attribute holds a value of the wrong kind.
    #[error("attribute {path}: expected {expected}, found {found}")]
    KindMismatch {
        /// Path of the offending attribute.
        path: AttrPath,
        /// Kind declared by the shape.
        expected: &'static str,
        /// Kind actually present in the tree.
        found: &'static str,
    },

    /// A vendor field holds a JSON value of the wrong type.
    #[error("vendor field {path}: expected {expected}")]
    VendorMismatch {
        /// Path of the attribute the vendor field maps to.
        path: AttrPath,
        /// JSON type the shape requires.
        expected: &'static str,
    },
}

impl MapError {
    /// The attribute path the error refers to.
    #[must_use]
    pub const fn path(&self) -> &AttrPath {
        match self {
            Self::KindMismatch { path, .. } | Self::VendorMismatch { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_mismatch_message() {
        let err = MapError::KindMismatch {
            path: AttrPath::root().attr("cluster_config").index(0).attr("instance_count"),
            expected: "int",
            found: "string",
        };
        assert_eq!(
            err.to_string(),
            "attribute cluster_config.0.instance_count: expected int, found string"
        );
        assert_eq!(err.path().to_string(), "cluster_config.0.instance_count");
    }
}
