//! Vendor API access.
//!
//! The engine talks to the vendor only through [`VendorClient`]. Requests and
//! responses are plain JSON objects keyed by vendor field names; mapping them
//! to and from attribute trees is the [`mapper`](crate::mapper)'s job.

mod http;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

use async_trait::async_trait;
use keel_core::ResourceId;
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;
use crate::lifecycle::GONE_STATE;

pub use http::HttpVendorClient;

/// A vendor request or response body.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Trait for vendor communication.
///
/// This trait abstracts the vendor API, allowing for mock implementations in
/// tests. All methods are keyed by resource type name so one client can serve
/// every resource in the catalog.
#[async_trait]
pub trait VendorClient: Send + Sync {
    /// Submit a create request and return the identity the vendor assigned.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the vendor rejects it.
    async fn create(&self, resource_type: &str, request: &JsonMap) -> ClientResult<ResourceId>;

    /// Read the full remote object.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the resource does not exist.
    async fn read(&self, resource_type: &str, id: &ResourceId) -> ClientResult<serde_json::Value>;

    /// Submit an update request. Only the fields present in `request` change.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the vendor rejects it.
    async fn update(&self, resource_type: &str, id: &ResourceId, request: &JsonMap)
        -> ClientResult<()>;

    /// Submit a delete request.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the resource is already gone.
    async fn delete(&self, resource_type: &str, id: &ResourceId) -> ClientResult<()>;

    /// Query the provisioning status of a resource.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the resource does not exist.
    async fn describe(&self, resource_type: &str, id: &ResourceId) -> ClientResult<PollResult>;
}

/// One status observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResult {
    /// Vendor status string, e.g. `processing` or `InService`.
    pub state: String,
    /// Whatever else the vendor returned alongside the status.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl PollResult {
    /// A result with no payload.
    #[must_use]
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            payload: serde_json::Value::Null,
        }
    }

    /// The synthetic result for a resource that no longer exists.
    #[must_use]
    pub fn gone() -> Self {
        Self::new(GONE_STATE)
    }

    /// A vendor supplied reason, if the payload carries one.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        ["message", "reason", "FailureReason"]
            .iter()
            .find_map(|key| self.payload.get(key).and_then(serde_json::Value::as_str))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn poll_result_parses_without_payload() {
        let result: PollResult = serde_json::from_value(json!({"state": "active"})).unwrap();
        assert_eq!(result, PollResult::new("active"));
        assert_eq!(result.message(), None);
    }

    #[test]
    fn poll_result_message_from_payload() {
        let result: PollResult = serde_json::from_value(json!({
            "state": "Failed",
            "payload": {"FailureReason": "insufficient capacity"}
        }))
        .unwrap();
        assert_eq!(result.message().as_deref(), Some("insufficient capacity"));
    }

    #[test]
    fn gone_uses_gone_state() {
        assert_eq!(PollResult::gone().state, GONE_STATE);
    }
}
