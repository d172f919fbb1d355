//! Polling a remote operation until it settles.
//!
//! A [`Waiter`] repeatedly calls a status function and classifies each answer
//! against a [`WaitPolicy`]:
//!
//! - a target state ends the wait with [`WaitOutcome::Succeeded`]
//! - a failure state ends it with [`WaitOutcome::Failed`]
//! - any other state keeps polling
//! - transient client errors are logged and polling continues
//! - any other client error ends the wait with [`WaitOutcome::Failed`]
//!
//! Timing: the first poll happens after `min_delay`. Each following delay is
//! the previous one times `multiplier`, capped at `max_delay`. The last sleep
//! is cut short so that one final poll happens exactly at the deadline; if
//! that poll is not terminal the wait ends with [`WaitOutcome::TimedOut`].
//! Cancellation is honoured while sleeping and while a poll is in flight.

use std::future::Future;
use std::time::Duration;

use crate::cancel::CancelSignal;
use crate::client::PollResult;
use crate::clock::Clock;
use crate::error::{ClientError, ClientResult};
use crate::lifecycle::{is_valid_transition, WaitPolicy, WaitState};

/// Why a wait failed.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitFailure {
    /// The vendor reported one of the policy's failure states.
    FailureState(PollResult),
    /// A status query failed with a non-transient error.
    Client(ClientError),
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// A target state was observed.
    Succeeded(PollResult),
    /// See [`WaitFailure`].
    Failed(WaitFailure),
    /// The deadline passed.
    TimedOut {
        /// Last non-terminal state observed, if any poll succeeded.
        last_state: Option<String>,
        /// Time spent waiting.
        elapsed: Duration,
    },
    /// The caller cancelled the wait.
    Cancelled {
        /// Last non-terminal state observed, if any poll succeeded.
        last_state: Option<String>,
    },
}

impl WaitOutcome {
    /// The terminal waiter state this outcome corresponds to.
    #[must_use]
    pub const fn state(&self) -> WaitState {
        match self {
            Self::Succeeded(_) => WaitState::Succeeded,
            Self::Failed(_) => WaitState::Failed,
            Self::TimedOut { .. } => WaitState::TimedOut,
            Self::Cancelled { .. } => WaitState::Cancelled,
        }
    }
}

/// Drives one wait.
pub struct Waiter<'a> {
    policy: &'a WaitPolicy,
    clock: &'a dyn Clock,
    cancel: &'a CancelSignal,
    state: WaitState,
    last_state: Option<String>,
    polls: u32,
}

impl<'a> Waiter<'a> {
    /// Create a waiter in the `Pending` state.
    #[must_use]
    pub fn new(policy: &'a WaitPolicy, clock: &'a dyn Clock, cancel: &'a CancelSignal) -> Self {
        Self {
            policy,
            clock,
            cancel,
            state: WaitState::Pending,
            last_state: None,
            polls: 0,
        }
    }

    /// Poll until the operation settles, the deadline passes, or the wait is
    /// cancelled.
    pub async fn wait<F, Fut>(mut self, mut poll: F) -> WaitOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<PollResult>>,
    {
        let started = self.clock.now();
        let mut delay = self.policy.min_delay;

        if !self.pause(delay.min(self.policy.deadline)).await {
            return self.cancelled();
        }
        self.transition(WaitState::Polling);

        loop {
            let cancel = self.cancel;
            let polled = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = poll() => Some(result),
            };
            let Some(result) = polled else {
                return self.cancelled();
            };
            self.polls += 1;

            match result {
                Ok(status) if self.policy.is_failure(&status.state) => {
                    tracing::info!(state = %status.state, polls = self.polls, "Operation failed");
                    self.transition(WaitState::Failed);
                    return WaitOutcome::Failed(WaitFailure::FailureState(status));
                }
                Ok(status) if self.policy.is_target(&status.state) => {
                    tracing::debug!(state = %status.state, polls = self.polls, "Operation settled");
                    self.transition(WaitState::Succeeded);
                    return WaitOutcome::Succeeded(status);
                }
                Ok(status) => {
                    tracing::debug!(
                        state = %status.state,
                        polls = self.polls,
                        "Operation in progress"
                    );
                    self.last_state = Some(status.state);
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        error = %e,
                        polls = self.polls,
                        "Transient error while polling, retrying"
                    );
                }
                Err(e) => {
                    self.transition(WaitState::Failed);
                    return WaitOutcome::Failed(WaitFailure::Client(e));
                }
            }

            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed >= self.policy.deadline {
                self.transition(WaitState::TimedOut);
                return WaitOutcome::TimedOut {
                    last_state: self.last_state,
                    elapsed,
                };
            }

            delay = self.policy.next_delay(delay);
            let remaining = self.policy.deadline.saturating_sub(elapsed);
            if !self.pause(delay.min(remaining)).await {
                return self.cancelled();
            }
            self.transition(WaitState::Polling);
        }
    }

    /// Sleep unless cancelled. Returns false on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = self.clock.sleep(duration) => true,
        }
    }

    fn transition(&mut self, to: WaitState) {
        debug_assert!(
            is_valid_transition(self.state, to),
            "invalid wait transition {:?} -> {to:?}",
            self.state
        );
        self.state = to;
    }

    fn cancelled(mut self) -> WaitOutcome {
        tracing::warn!(
            last_state = self.last_state.as_deref().unwrap_or("unknown"),
            "Wait cancelled, remote operation may still be in progress"
        );
        self.transition(WaitState::Cancelled);
        WaitOutcome::Cancelled {
            last_state: self.last_state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::clock::{ManualClock, TokioClock};
    use std::collections::VecDeque;

    fn policy() -> WaitPolicy {
        WaitPolicy::new(["active"])
            .failure(["failed"])
            .delays(Duration::from_secs(1), Duration::from_secs(4))
            .deadline(Duration::from_secs(10))
    }

    /// A status function that replays `steps` and then repeats the last one.
    fn script(
        steps: Vec<ClientResult<&str>>,
    ) -> impl FnMut() -> std::future::Ready<ClientResult<PollResult>> {
        let mut steps: VecDeque<ClientResult<PollResult>> = steps
            .into_iter()
            .map(|s| s.map(PollResult::new))
            .collect();
        move || {
            let next = if steps.len() > 1 {
                steps.pop_front()
            } else {
                steps.front().cloned()
            };
            std::future::ready(next.unwrap_or_else(|| Ok(PollResult::new("processing"))))
        }
    }

    fn secs(sleeps: &[Duration]) -> Vec<u64> {
        sleeps.iter().map(Duration::as_secs).collect()
    }

    #[tokio::test]
    async fn succeeds_on_target_state() {
        let clock = ManualClock::new();
        let cancel = CancelSignal::never();
        let policy = policy();

        let outcome = Waiter::new(&policy, &clock, &cancel)
            .wait(script(vec![Ok("processing"), Ok("processing"), Ok("active")]))
            .await;

        assert_eq!(outcome, WaitOutcome::Succeeded(PollResult::new("active")));
        assert_eq!(secs(&clock.sleeps()), vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn backoff_is_capped() {
        let clock = ManualClock::new();
        let cancel = CancelSignal::never();
        let policy = policy().deadline(Duration::from_secs(60));

        let mut steps = vec![Ok("processing"); 6];
        steps.push(Ok("active"));
        Waiter::new(&policy, &clock, &cancel).wait(script(steps)).await;

        let sleeps = clock.sleeps();
        assert_eq!(secs(&sleeps), vec![1, 2, 4, 4, 4, 4, 4]);
        assert!(sleeps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn failure_state_fails() {
        let clock = ManualClock::new();
        let cancel = CancelSignal::never();
        let policy = policy();

        let outcome = Waiter::new(&policy, &clock, &cancel)
            .wait(script(vec![Ok("processing"), Ok("failed")]))
            .await;

        assert_eq!(
            outcome,
            WaitOutcome::Failed(WaitFailure::FailureState(PollResult::new("failed")))
        );
        assert_eq!(outcome.state(), WaitState::Failed);
    }

    #[tokio::test]
    async fn times_out_with_final_poll_at_deadline() {
        let clock = ManualClock::new();
        let cancel = CancelSignal::never();
        let policy = policy();

        let outcome = Waiter::new(&policy, &clock, &cancel)
            .wait(script(vec![Ok("processing")]))
            .await;

        assert_eq!(
            outcome,
            WaitOutcome::TimedOut {
                last_state: Some("processing".into()),
                elapsed: Duration::from_secs(10),
            }
        );
        // 1 + 2 + 4 = 7, then the last sleep is cut to the remaining 3s.
        assert_eq!(secs(&clock.sleeps()), vec![1, 2, 4, 3]);
        assert_eq!(clock.elapsed(), policy.deadline);
    }

    #[tokio::test]
    async fn transient_errors_keep_polling() {
        let clock = ManualClock::new();
        let cancel = CancelSignal::never();
        let policy = policy();

        let outcome = Waiter::new(&policy, &clock, &cancel)
            .wait(script(vec![
                Err(ClientError::Throttled("slow down".into())),
                Err(ClientError::Network("reset".into())),
                Ok("active"),
            ]))
            .await;

        assert_eq!(outcome.state(), WaitState::Succeeded);
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let clock = ManualClock::new();
        let cancel = CancelSignal::never();
        let policy = policy();

        let outcome = Waiter::new(&policy, &clock, &cancel)
            .wait(script(vec![
                Ok("processing"),
                Err(ClientError::NotFound("gone".into())),
                Ok("active"),
            ]))
            .await;

        assert_eq!(
            outcome,
            WaitOutcome::Failed(WaitFailure::Client(ClientError::NotFound("gone".into())))
        );
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[tokio::test]
    async fn cancelled_before_first_poll() {
        let clock = ManualClock::new();
        let (handle, cancel) = cancel_pair();
        handle.cancel();
        let policy = policy();
        let mut polls = 0;

        let outcome = Waiter::new(&policy, &clock, &cancel)
            .wait(|| {
                polls += 1;
                std::future::ready(Ok(PollResult::new("active")))
            })
            .await;

        assert_eq!(outcome, WaitOutcome::Cancelled { last_state: None });
        assert_eq!(polls, 0);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn cancelled_between_polls_keeps_last_state() {
        let clock = ManualClock::new();
        let (handle, cancel) = cancel_pair();
        let policy = policy();
        let mut polls = 0;

        let outcome = Waiter::new(&policy, &clock, &cancel)
            .wait(|| {
                polls += 1;
                if polls == 2 {
                    handle.cancel();
                }
                std::future::ready(Ok(PollResult::new("processing")))
            })
            .await;

        assert_eq!(
            outcome,
            WaitOutcome::Cancelled {
                last_state: Some("processing".into())
            }
        );
        assert_eq!(polls, 2);
    }

    #[tokio::test]
    async fn cancellation_interrupts_in_flight_poll() {
        let clock = ManualClock::new();
        let (handle, cancel) = cancel_pair();
        let policy = policy();

        let outcome = Waiter::new(&policy, &clock, &cancel)
            .wait(|| {
                handle.cancel();
                std::future::pending::<ClientResult<PollResult>>()
            })
            .await;

        assert_eq!(outcome.state(), WaitState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_on_tokio_clock() {
        let clock = TokioClock;
        let cancel = CancelSignal::never();
        let policy = policy();
        let start = tokio::time::Instant::now();

        let outcome = Waiter::new(&policy, &clock, &cancel)
            .wait(script(vec![Ok("processing"), Ok("active")]))
            .await;

        assert_eq!(outcome.state(), WaitState::Succeeded);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
