//! Remote operation lifecycle.
//!
//! Every create, update or delete the reconciler submits is tracked by an
//! [`OperationHandle`] and watched by a [`Waiter`](crate::Waiter) that moves
//! through the states below. Which vendor states count as "done" or "failed"
//! comes from the resource's [`ResourceLifecycle`].
//!
//! # State Machine
//!
//! ```text
//!        ┌───────────┐
//!        │  Pending  │──────────────────────────┐
//!        └─────┬─────┘                          │
//!              │ (min delay elapsed)            │ (cancel)
//!              ▼                                │
//!        ┌───────────┐  (non-terminal state)    │
//!   ┌───▶│  Polling  │───────────┐              │
//!   │    └─────┬─────┘           │              │
//!   │          │                 ▼              ▼
//!   │          │           ┌──────────┐   ┌───────────┐
//!   └──────────┼───────────│ backoff  │──▶│ Cancelled │
//!              │           └────┬─────┘   └───────────┘
//!              │                │ (deadline)
//!              │                ▼
//!              │           ┌──────────┐
//!              │           │ TimedOut │
//!              │           └──────────┘
//!       ┌──────┴───────┐
//!       ▼              ▼
//! ┌───────────┐  ┌──────────┐
//! │ Succeeded │  │  Failed  │
//! └───────────┘  └──────────┘
//! ```

use std::fmt;
use std::time::Duration;

use keel_core::{OperationId, ResourceId};
use serde::{Deserialize, Serialize};

/// State name a delete waits for. The reconciler reports it when the vendor
/// answers a status query with "not found".
pub const GONE_STATE: &str = "gone";

/// Default delay before the first poll.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(10);

/// Default cap on the delay between polls.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Default backoff multiplier.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Default overall deadline.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(60 * 60);

/// The kind of remote operation being waited on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Resource creation.
    Create,
    /// In-place update.
    Update,
    /// Resource deletion.
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// States of a single wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    /// Waiting out the initial delay.
    Pending,
    /// Querying the vendor and backing off between queries.
    Polling,
    /// A target state was observed.
    Succeeded,
    /// A failure state was observed or a poll failed permanently.
    Failed,
    /// The deadline passed without a terminal state.
    TimedOut,
    /// The caller cancelled the wait.
    Cancelled,
}

/// Check if a wait state transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: WaitState, to: WaitState) -> bool {
    use WaitState::{Cancelled, Failed, Pending, Polling, Succeeded, TimedOut};

    matches!(
        (from, to),
        // The first poll happens after the initial delay
        (Pending, Polling)
            // Cancellation is observed while sleeping or while a poll is in flight
            | (Pending | Polling, Cancelled)
            // Every poll either settles the wait or keeps it polling
            | (Polling, Polling | Succeeded | Failed | TimedOut)
    )
}

/// Returns true if the wait has finished.
#[must_use]
pub const fn is_terminal(state: WaitState) -> bool {
    matches!(
        state,
        WaitState::Succeeded | WaitState::Failed | WaitState::TimedOut | WaitState::Cancelled
    )
}

/// Polling policy for one operation kind of one resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitPolicy {
    /// States that end the wait successfully.
    pub target: Vec<String>,
    /// States that end the wait with an error.
    pub failure: Vec<String>,
    /// Delay before the first poll; also the first backoff step.
    pub min_delay: Duration,
    /// Cap on the delay between polls.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Overall time budget, counted from the start of the wait.
    pub deadline: Duration,
}

impl WaitPolicy {
    /// A policy that succeeds on any of `target`, with default timing.
    #[must_use]
    pub fn new<I, S>(target: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target: target.into_iter().map(Into::into).collect(),
            failure: Vec::new(),
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Set the failure states.
    #[must_use]
    pub fn failure<I, S>(mut self, failure: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failure = failure.into_iter().map(Into::into).collect();
        self
    }

    /// Set the backoff bounds.
    #[must_use]
    pub const fn delays(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the overall deadline.
    #[must_use]
    pub const fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Whether `state` ends the wait successfully.
    #[must_use]
    pub fn is_target(&self, state: &str) -> bool {
        self.target.iter().any(|s| s == state)
    }

    /// Whether `state` ends the wait with an error.
    #[must_use]
    pub fn is_failure(&self, state: &str) -> bool {
        self.failure.iter().any(|s| s == state)
    }

    /// The delay that follows `current`: multiplied, then clamped to
    /// `[min_delay, max_delay]`. Multipliers below 1 are treated as 1.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        let factor = if self.multiplier.is_finite() {
            self.multiplier.max(1.0)
        } else {
            1.0
        };
        let next = Duration::try_from_secs_f64(current.as_secs_f64() * factor)
            .unwrap_or(self.max_delay);
        next.max(self.min_delay).min(self.max_delay.max(self.min_delay))
    }
}

/// The three polling policies of a resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLifecycle {
    /// Policy after a create request.
    pub create: WaitPolicy,
    /// Policy after an update request.
    pub update: WaitPolicy,
    /// Policy after a delete request. Its target normally includes
    /// [`GONE_STATE`].
    pub delete: WaitPolicy,
}

impl ResourceLifecycle {
    /// The policy for an operation kind.
    #[must_use]
    pub const fn policy(&self, kind: OperationKind) -> &WaitPolicy {
        match kind {
            OperationKind::Create => &self.create,
            OperationKind::Update => &self.update,
            OperationKind::Delete => &self.delete,
        }
    }

    /// Mutable access to the policy for an operation kind.
    pub fn policy_mut(&mut self, kind: OperationKind) -> &mut WaitPolicy {
        match kind {
            OperationKind::Create => &mut self.create,
            OperationKind::Update => &mut self.update,
            OperationKind::Delete => &mut self.delete,
        }
    }
}

/// A submitted remote operation.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    /// Locally generated id, for log correlation.
    pub id: OperationId,
    /// What was submitted.
    pub kind: OperationKind,
    /// Resource type name.
    pub resource_type: String,
    /// Vendor identity of the resource.
    pub identity: ResourceId,
    /// How to wait for it.
    pub policy: WaitPolicy,
}

impl OperationHandle {
    /// Track a freshly submitted operation.
    #[must_use]
    pub fn submitted(
        kind: OperationKind,
        resource_type: impl Into<String>,
        identity: ResourceId,
        policy: WaitPolicy,
    ) -> Self {
        Self {
            id: OperationId::generate(),
            kind,
            resource_type: resource_type.into(),
            identity,
            policy,
        }
    }
}
