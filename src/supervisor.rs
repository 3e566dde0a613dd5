//! Fatal-condition signalling between components and `main`.
//!
//! Components never exit the process themselves. When something happens that
//! makes it unsafe to keep serving (the task sink died), they raise a fatal
//! signal and the supervisor in `main` shuts the server down.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::error;

#[derive(Clone)]
pub struct FatalSignal {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl FatalSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Record a fatal condition. Only the first reason is kept.
    pub fn raise(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let first = self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason.clone());
                true
            } else {
                false
            }
        });
        if first {
            error!("fatal: {}", reason);
        }
    }

    pub fn is_raised(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Resolves with the reason once a fatal condition has been raised.
    pub async fn wait(&self) -> String {
        let mut rx = self.tx.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(reason) = current {
                return reason;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for FatalSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_sees_first_reason() {
        let signal = FatalSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.raise("amqp connection lost");
        signal.raise("second reason");

        let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, "amqp connection lost");
        assert!(signal.is_raised());
        assert_eq!(signal.reason().as_deref(), Some("amqp connection lost"));
    }

    #[tokio::test]
    async fn test_wait_after_raise_returns_immediately() {
        let signal = FatalSignal::new();
        signal.raise("already down");
        assert_eq!(signal.wait().await, "already down");
    }
}
