//! Reconciliation engine for keel.
//!
//! This crate turns a declared attribute tree into vendor API calls and waits
//! for the vendor's asynchronous operations to settle.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Reconciler                          │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │   Mapper    │ │  Planner    │ │      Waiter         │    │
//! │  │ expand /    │ │ diff +      │ │ backoff, deadline,  │    │
//! │  │ flatten     │ │ replace     │ │ cancellation        │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!               ▼                             ▼
//!        ┌──────────────┐              ┌──────────┐
//!        │ VendorClient │              │  Clock   │
//!        │ (HTTP/mock)  │              │          │
//!        └──────────────┘              └──────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use keel_core::{AttrTree, Field, Shape};
//! use keel_engine::{
//!     HttpVendorClient, Reconciler, ResourceLifecycle, ResourceType, WaitPolicy, GONE_STATE,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpVendorClient::new("http://localhost:9000", Duration::from_secs(30))?;
//! let resource = ResourceType::new(
//!     "model_endpoint",
//!     Shape::new().field(Field::string("name").vendor("EndpointName").force_replace()),
//!     ResourceLifecycle {
//!         create: WaitPolicy::new(["InService"]).failure(["Failed"]),
//!         update: WaitPolicy::new(["InService"]).failure(["Failed"]),
//!         delete: WaitPolicy::new([GONE_STATE]),
//!     },
//! );
//!
//! let reconciler = Reconciler::new(Arc::new(client), resource);
//! let declared = AttrTree::new().with("name", "ranker");
//! let outcome = reconciler.reconcile(&declared, None).await?;
//! println!("{}: {}", outcome.state.identity, outcome.applied);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cancel;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod mapper;
pub mod planner;
pub mod reconciler;
pub mod resource;
pub mod types;
pub mod waiter;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
#[cfg(any(test, feature = "test-utils"))]
pub use client::mock;
pub use client::{HttpVendorClient, JsonMap, PollResult, VendorClient};
#[cfg(any(test, feature = "test-utils"))]
pub use clock::ManualClock;
pub use clock::{Clock, TokioClock};
pub use config::{EngineConfig, LifecycleConfig, PolicyConfig};
pub use error::{ClientError, ClientResult, EngineError, ReconcileError, Result};
pub use lifecycle::{
    OperationHandle, OperationKind, ResourceLifecycle, WaitPolicy, WaitState, GONE_STATE,
};
pub use planner::{plan, Change, ChangeAction, Plan};
pub use reconciler::Reconciler;
pub use resource::ResourceType;
pub use types::{Applied, ReconcileOutcome, RemoteState};
pub use waiter::{WaitFailure, WaitOutcome, Waiter};
