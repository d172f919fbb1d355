//! Caller-driven cancellation.
//!
//! A [`CancelHandle`] and its [`CancelSignal`]s share a watch channel. Once
//! cancelled, every signal stays cancelled.

use std::sync::Arc;

use tokio::sync::watch;

/// Triggers cancellation for every linked [`CancelSignal`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observes cancellation requested through a [`CancelHandle`].
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Create a linked handle and signal.
#[must_use]
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
}

impl CancelHandle {
    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// A new signal linked to this handle.
    #[must_use]
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancelSignal {
    /// A signal that is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Non-blocking cancellation check.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let (handle, signal) = cancel_pair();
        let other = handle.signal();
        assert!(!signal.is_cancelled());

        let waiter = tokio::spawn(async move { signal.cancelled().await });
        handle.cancel();
        waiter.await.unwrap();
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_before_wait_returns_immediately() {
        let (handle, signal) = cancel_pair();
        handle.cancel();
        handle.cancel();
        signal.cancelled().await;
        assert!(signal.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn never_signal_stays_pending() {
        let signal = CancelSignal::never();
        let result = tokio::time::timeout(Duration::from_secs(5), signal.cancelled()).await;
        assert!(result.is_err());
        assert!(!signal.is_cancelled());
    }
}
