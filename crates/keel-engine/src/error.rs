//! Error types for the reconciliation engine.
//!
//! Two layers:
//!
//! - [`ClientError`] is what a [`VendorClient`](crate::VendorClient) reports
//!   for a single API call.
//! - [`EngineError`] is what the reconciler reports for a whole reconcile or
//!   destroy run. It is always wrapped in a [`ReconcileError`] that carries the
//!   last known remote snapshot, so the caller can persist the identity of a
//!   half-built resource.

use std::time::Duration;

use keel_core::{MapError, ResourceId};
use thiserror::Error;

use crate::lifecycle::OperationKind;
use crate::types::RemoteState;

/// A result type using `EngineError`.
pub type Result<T> = std::result::Result<T, EngineError>;

/// A result type using `ClientError`.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors reported by a vendor client for a single call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The resource does not exist.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The vendor asked us to slow down.
    #[error("request throttled: {0}")]
    Throttled(String),

    /// The request never got a response.
    #[error("network error: {0}")]
    Network(String),

    /// The vendor refused the request because of a conflicting operation or
    /// an existing resource.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The vendor rejected the request.
    #[error("vendor rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status returned by the vendor.
        status: u16,
        /// Vendor supplied message.
        message: String,
    },

    /// The vendor answered with something we could not parse.
    #[error("invalid vendor response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Returns true for errors that are expected to clear up on their own.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Network(_))
    }

    /// Returns the HTTP status code that corresponds to this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Throttled(_) => 429,
            Self::Network(_) => 503,
            Self::Conflict(_) => 409,
            Self::Rejected { status, .. } => *status,
            Self::InvalidResponse(_) => 502,
        }
    }
}

/// Errors that can occur while reconciling or destroying a resource.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The declared tree or a vendor object does not match the shape.
    #[error("validation error: {0}")]
    Validation(#[from] MapError),

    /// A vendor call failed in a way that should clear up on retry.
    #[error("transient vendor error: {0}")]
    TransientApi(ClientError),

    /// The vendor rejected a call outright.
    #[error("vendor error: {0}")]
    Client(ClientError),

    /// The vendor reported a conflicting resource or operation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The resource disappeared while the engine was working on it.
    #[error("resource not found: {0}")]
    NotFound(ResourceId),

    /// The remote operation settled in a failure state.
    #[error(
        "{operation} of {identity} failed in state {state:?}{}",
        .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
    )]
    TerminalProvisioning {
        /// Which operation failed.
        operation: OperationKind,
        /// Resource being provisioned.
        identity: ResourceId,
        /// Failure state reported by the vendor.
        state: String,
        /// Vendor supplied reason, if any.
        message: Option<String>,
    },

    /// The remote operation did not settle before its deadline.
    #[error(
        "{operation} of {identity} timed out after {elapsed:?} (last state: {})",
        .last_state.as_deref().unwrap_or("unknown")
    )]
    Timeout {
        /// Which operation timed out.
        operation: OperationKind,
        /// Resource being waited on.
        identity: ResourceId,
        /// Last state observed before the deadline.
        last_state: Option<String>,
        /// Time spent waiting.
        elapsed: Duration,
    },

    /// The wait was cancelled by the caller. The remote operation may still
    /// be running.
    #[error(
        "{operation} of {identity} cancelled (last state: {})",
        .last_state.as_deref().unwrap_or("unknown")
    )]
    Cancelled {
        /// Which operation was being waited on.
        operation: OperationKind,
        /// Resource being waited on.
        identity: ResourceId,
        /// Last state observed before cancellation.
        last_state: Option<String>,
    },

    /// Another reconcile or destroy already holds this identity.
    #[error("an operation is already in flight for {0}")]
    OperationInFlight(ResourceId),
}

impl EngineError {
    /// Returns true if this error might be resolved by retrying the run.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::TransientApi(_) | Self::Timeout { .. })
    }

    /// Returns the HTTP status code that best describes this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::TransientApi(e) | Self::Client(e) => e.http_status_code(),
            Self::Conflict(_) | Self::OperationInFlight(_) => 409,
            Self::NotFound(_) => 404,
            Self::TerminalProvisioning { .. } => 500,
            Self::Timeout { .. } => 504,
            Self::Cancelled { .. } => 499,
        }
    }
}

impl From<ClientError> for EngineError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Conflict(message) => Self::Conflict(message),
            e if e.is_transient() => Self::TransientApi(e),
            e => Self::Client(e),
        }
    }
}

/// A failed reconcile or destroy, with the last remote state the engine saw.
///
/// `snapshot` is `Some` whenever a vendor identity is known, including when a
/// create was accepted but never settled.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ReconcileError {
    /// What went wrong.
    #[source]
    pub error: EngineError,
    /// Last known remote state, if any.
    pub snapshot: Option<RemoteState>,
}

impl ReconcileError {
    /// Wrap an engine error with a snapshot.
    #[must_use]
    pub fn new(error: impl Into<EngineError>, snapshot: Option<RemoteState>) -> Self {
        Self {
            error: error.into(),
            snapshot,
        }
    }

    /// Returns true if retrying the run might succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        self.error.is_retriable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ResourceId {
        ResourceId::new("tf-test-1").unwrap()
    }

    #[test]
    fn client_error_classification() {
        assert!(ClientError::Throttled("slow down".into()).is_transient());
        assert!(ClientError::Network("reset".into()).is_transient());
        assert!(!ClientError::NotFound("x".into()).is_transient());
        assert!(!ClientError::Rejected {
            status: 400,
            message: "bad".into()
        }
        .is_transient());
    }

    #[test]
    fn client_error_conversion() {
        assert!(matches!(
            EngineError::from(ClientError::Conflict("exists".into())),
            EngineError::Conflict(_)
        ));
        assert!(matches!(
            EngineError::from(ClientError::Throttled("x".into())),
            EngineError::TransientApi(_)
        ));
        assert!(matches!(
            EngineError::from(ClientError::InvalidResponse("x".into())),
            EngineError::Client(_)
        ));
    }

    #[test]
    fn error_status_codes() {
        assert_eq!(
            EngineError::from(ClientError::Throttled("x".into())).http_status_code(),
            429
        );
        assert_eq!(EngineError::OperationInFlight(id()).http_status_code(), 409);
        assert_eq!(EngineError::NotFound(id()).http_status_code(), 404);
        assert_eq!(
            EngineError::Timeout {
                operation: OperationKind::Create,
                identity: id(),
                last_state: None,
                elapsed: Duration::from_secs(1),
            }
            .http_status_code(),
            504
        );
    }

    #[test]
    fn retriable_errors() {
        assert!(EngineError::TransientApi(ClientError::Network("x".into())).is_retriable());
        assert!(!EngineError::OperationInFlight(id()).is_retriable());
        assert!(!EngineError::Conflict("x".into()).is_retriable());
        assert!(!EngineError::Cancelled {
            operation: OperationKind::Delete,
            identity: id(),
            last_state: None,
        }
        .is_retriable());
    }

    #[test]
    fn terminal_message_names_state() {
        let err = EngineError::TerminalProvisioning {
            operation: OperationKind::Create,
            identity: id(),
            state: "Failed".into(),
            message: Some("capacity".into()),
        };
        assert_eq!(
            err.to_string(),
            "create of tf-test-1 failed in state \"Failed\": capacity"
        );

        let err = EngineError::Timeout {
            operation: OperationKind::Update,
            identity: id(),
            last_state: Some("processing".into()),
            elapsed: Duration::from_secs(60),
        };
        assert_eq!(
            err.to_string(),
            "update of tf-test-1 timed out after 60s (last state: processing)"
        );
    }
}
