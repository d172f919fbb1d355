//! Reconciler implementation.
//!
//! A [`Reconciler`] drives one resource type toward its declared state:
//!
//! ```text
//!   no prior ──► create ──► wait(create) ──► read ──► Created
//!
//!   prior ──► read ──┬─ not found ──► create ... ──► Recreated
//!                    └─ flatten ──► plan ──┬─ empty ──────────────► Unchanged
//!                                          ├─ replace ──► delete ──► wait(delete)
//!                                          │                └──► create ... ──► Replaced
//!                                          └─ in place ──► per attribute:
//!                                                  update ──► wait(update) ──► read
//!                                             └──► Updated
//! ```
//!
//! Failures stop the run where they happen. Nothing is rolled back; the error
//! carries the last remote state the engine knew about.

use std::collections::HashSet;
use std::sync::Arc;

use keel_core::{AttrTree, ResourceId};
use parking_lot::Mutex;

use crate::cancel::CancelSignal;
use crate::client::{PollResult, VendorClient};
use crate::clock::{Clock, TokioClock};
use crate::error::{ClientError, ClientResult, EngineError, ReconcileError};
use crate::lifecycle::{OperationHandle, OperationKind};
use crate::mapper::{expand, expand_attribute, flatten, write_only_paths};
use crate::planner::{plan, Plan};
use crate::resource::ResourceType;
use crate::types::{Applied, ReconcileOutcome, RemoteState};
use crate::waiter::{WaitFailure, WaitOutcome, Waiter};

type Outcome<T> = std::result::Result<T, ReconcileError>;

/// Reconciles resources of one type against a vendor.
pub struct Reconciler {
    client: Arc<dyn VendorClient>,
    resource: ResourceType,
    clock: Arc<dyn Clock>,
    cancel: CancelSignal,
    in_flight: Mutex<HashSet<ResourceId>>,
}

impl Reconciler {
    /// Create a reconciler that uses real time and is never cancelled.
    #[must_use]
    pub fn new(client: Arc<dyn VendorClient>, resource: ResourceType) -> Self {
        Self {
            client,
            resource,
            clock: Arc::new(TokioClock),
            cancel: CancelSignal::never(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Use a different clock for waits.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Abort waits when `cancel` fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// The resource type this reconciler manages.
    #[must_use]
    pub const fn resource(&self) -> &ResourceType {
        &self.resource
    }

    /// Bring the remote resource in line with `declared`.
    ///
    /// `prior` is the state returned by the previous run, or `None` if the
    /// resource was never created.
    ///
    /// # Errors
    ///
    /// Returns a [`ReconcileError`] wrapping:
    /// - `EngineError::Validation` if `declared` does not match the shape
    /// - `EngineError::OperationInFlight` if another run holds the identity
    /// - `EngineError::TerminalProvisioning`, `Timeout` or `Cancelled` if a
    ///   remote operation did not settle
    /// - a client error if a vendor call failed
    pub async fn reconcile(
        &self,
        declared: &AttrTree,
        prior: Option<&RemoteState>,
    ) -> Outcome<ReconcileOutcome> {
        expand(declared, self.resource.shape())
            .map_err(|e| ReconcileError::new(e, prior.cloned()))?;

        let Some(prior) = prior else {
            return self.create(declared, Applied::Created).await;
        };
        let fail = |e: EngineError| ReconcileError::new(e, Some(prior.clone()));

        let _guard = self.claim(&prior.identity).map_err(fail)?;

        let response = match self.client.read(self.resource.name(), &prior.identity).await {
            Ok(response) => response,
            Err(ClientError::NotFound(_)) => {
                tracing::info!(
                    resource_type = %self.resource.name(),
                    id = %prior.identity,
                    "Resource no longer exists, recreating"
                );
                return self.create(declared, Applied::Recreated).await;
            }
            Err(e) => return Err(fail(e.into())),
        };

        let tree = flatten(&response, self.resource.shape(), Some(&prior.tree))
            .map_err(|e| fail(e.into()))?;
        let current = RemoteState::observed(prior.identity.clone(), self.resource.name(), tree);
        let plan = plan(declared, &current.tree, self.resource.shape());

        if plan.is_empty() {
            tracing::debug!(id = %current.identity, "Resource is up to date");
            return Ok(self.outcome(current, Applied::Unchanged));
        }

        if plan.requires_replace() {
            let reason = plan
                .changes()
                .first()
                .map(ToString::to_string)
                .unwrap_or_default();
            tracing::info!(
                resource_type = %self.resource.name(),
                id = %current.identity,
                change = %reason,
                "Replacing resource"
            );
            self.delete_and_wait(&current).await?;
            return self.create(declared, Applied::Replaced).await;
        }

        self.update(declared, current, plan).await
    }

    /// Delete the resource and wait until it is gone.
    ///
    /// A resource that no longer exists counts as destroyed.
    ///
    /// # Errors
    ///
    /// Returns a [`ReconcileError`] carrying `state` if the delete was
    /// rejected or did not settle.
    pub async fn destroy(&self, state: &RemoteState) -> Outcome<()> {
        let _guard = self
            .claim(&state.identity)
            .map_err(|e| ReconcileError::new(e, Some(state.clone())))?;
        self.delete_and_wait(state).await
    }

    async fn create(&self, declared: &AttrTree, applied: Applied) -> Outcome<ReconcileOutcome> {
        let shape = self.resource.shape();
        let request = expand(declared, shape).map_err(|e| ReconcileError::new(e, None))?;

        let identity = self
            .client
            .create(self.resource.name(), &request)
            .await
            .map_err(|e| ReconcileError::new(e, None))?;

        tracing::info!(
            resource_type = %self.resource.name(),
            id = %identity,
            "Create accepted"
        );

        let submitted =
            RemoteState::observed(identity.clone(), self.resource.name(), declared.clone());
        let fail = |e: EngineError| ReconcileError::new(e, Some(submitted.clone()));

        self.wait(OperationKind::Create, &identity).await.map_err(fail)?;
        let state = self.refresh(&identity, declared).await.map_err(fail)?;

        Ok(self.outcome(state, applied))
    }

    async fn update(
        &self,
        declared: &AttrTree,
        current: RemoteState,
        plan: Plan,
    ) -> Outcome<ReconcileOutcome> {
        let mut snapshot = current;

        for attribute in plan.top_level_attributes() {
            let request = expand_attribute(declared, self.resource.shape(), attribute)
                .map_err(|e| ReconcileError::new(e, Some(snapshot.clone())))?;

            tracing::info!(
                resource_type = %self.resource.name(),
                id = %snapshot.identity,
                attribute,
                "Updating attribute"
            );

            if let Err(e) = self
                .client
                .update(self.resource.name(), &snapshot.identity, &request)
                .await
            {
                return Err(ReconcileError::new(e, Some(snapshot)));
            }
            if let Err(e) = self.wait(OperationKind::Update, &snapshot.identity).await {
                return Err(ReconcileError::new(e, Some(snapshot)));
            }

            // Write-only values of groups already sent come from `declared`,
            // the rest from the last observed state.
            let mut carry = snapshot.tree.clone();
            match declared.get(attribute) {
                Some(value) => carry.insert(attribute, value.clone()),
                None => carry.remove(attribute),
            };
            snapshot = match self.refresh(&snapshot.identity, &carry).await {
                Ok(state) => state,
                Err(e) => return Err(ReconcileError::new(e, Some(snapshot))),
            };
        }

        Ok(self.outcome(snapshot, Applied::Updated(plan.into_changes())))
    }

    async fn delete_and_wait(&self, state: &RemoteState) -> Outcome<()> {
        let fail = |e: EngineError| ReconcileError::new(e, Some(state.clone()));

        match self.client.delete(self.resource.name(), &state.identity).await {
            Ok(()) => {}
            Err(ClientError::NotFound(_)) => {
                tracing::info!(id = %state.identity, "Resource already deleted");
                return Ok(());
            }
            Err(e) => return Err(fail(e.into())),
        }

        self.wait(OperationKind::Delete, &state.identity)
            .await
            .map_err(fail)?;
        tracing::info!(
            resource_type = %self.resource.name(),
            id = %state.identity,
            "Resource deleted"
        );
        Ok(())
    }

    /// Read and flatten the resource, carrying write-only values from
    /// `declared`.
    async fn refresh(
        &self,
        identity: &ResourceId,
        declared: &AttrTree,
    ) -> Result<RemoteState, EngineError> {
        let response = self
            .client
            .read(self.resource.name(), identity)
            .await
            .map_err(|e| match e {
                ClientError::NotFound(_) => EngineError::NotFound(identity.clone()),
                e => e.into(),
            })?;
        let tree = flatten(&response, self.resource.shape(), Some(declared))?;
        Ok(RemoteState::observed(identity.clone(), self.resource.name(), tree))
    }

    async fn wait(
        &self,
        kind: OperationKind,
        identity: &ResourceId,
    ) -> Result<PollResult, EngineError> {
        let handle = OperationHandle::submitted(
            kind,
            self.resource.name(),
            identity.clone(),
            self.resource.lifecycle().policy(kind).clone(),
        );
        tracing::debug!(
            operation_id = %handle.id,
            operation = ?handle.kind,
            id = %handle.identity,
            "Waiting for operation"
        );

        let outcome = Waiter::new(&handle.policy, self.clock.as_ref(), &self.cancel)
            .wait(|| self.describe(kind, identity))
            .await;

        match outcome {
            WaitOutcome::Succeeded(status) => {
                tracing::info!(
                    operation_id = %handle.id,
                    operation = ?handle.kind,
                    id = %handle.identity,
                    state = %status.state,
                    "Operation settled"
                );
                Ok(status)
            }
            WaitOutcome::Failed(WaitFailure::FailureState(status)) => {
                let message = status.message();
                Err(EngineError::TerminalProvisioning {
                    operation: kind,
                    identity: handle.identity,
                    state: status.state,
                    message,
                })
            }
            WaitOutcome::Failed(WaitFailure::Client(e)) => Err(e.into()),
            WaitOutcome::TimedOut { last_state, elapsed } => Err(EngineError::Timeout {
                operation: kind,
                identity: handle.identity,
                last_state,
                elapsed,
            }),
            WaitOutcome::Cancelled { last_state } => Err(EngineError::Cancelled {
                operation: kind,
                identity: handle.identity,
                last_state,
            }),
        }
    }

    /// Status query. During a delete, a missing resource is the `gone` state.
    async fn describe(
        &self,
        kind: OperationKind,
        identity: &ResourceId,
    ) -> ClientResult<PollResult> {
        match self.client.describe(self.resource.name(), identity).await {
            Err(ClientError::NotFound(_)) if kind == OperationKind::Delete => {
                Ok(PollResult::gone())
            }
            other => other,
        }
    }

    fn outcome(&self, state: RemoteState, applied: Applied) -> ReconcileOutcome {
        let unverified = write_only_paths(&state.tree, self.resource.shape());
        ReconcileOutcome {
            state,
            applied,
            unverified,
        }
    }

    fn claim(&self, identity: &ResourceId) -> Result<InFlight<'_>, EngineError> {
        if !self.in_flight.lock().insert(identity.clone()) {
            return Err(EngineError::OperationInFlight(identity.clone()));
        }
        Ok(InFlight {
            set: &self.in_flight,
            identity: identity.clone(),
        })
    }
}

/// Releases an identity claim on drop.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<ResourceId>>,
    identity: ResourceId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.identity);
    }
}
