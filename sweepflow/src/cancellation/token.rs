//! Shutdown token for the scheduler's loops.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::info;

/// A token that tells long-running loops to stop.
///
/// Shutdown is idempotent - only the first reason is kept.
#[derive(Default)]
pub struct ShutdownToken {
    /// Whether shutdown has been requested.
    cancelled: AtomicBool,
    /// The reason for shutdown (first one wins).
    reason: RwLock<Option<String>>,
    notify: Notify,
}

impl ShutdownToken {
    /// Creates a new shutdown token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown with a reason and wakes every waiter.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let reason = reason.into();
            info!(reason = %reason, "Shutdown requested");
            *self.reason.write() = Some(reason);
            self.notify.notify_waiters();
        }
    }

    /// Returns whether shutdown has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the shutdown reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Resolves once shutdown has been requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent cancel is not missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for ShutdownToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = ShutdownToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_token_cancel_idempotent() {
        let token = ShutdownToken::new();
        token.cancel("ctrl-c");
        token.cancel("sigterm");

        // First reason wins
        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("ctrl-c".to_string()));
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let token = Arc::new(ShutdownToken::new());
        let waiter = {
            let token = Arc::clone(&token);
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::task::yield_now().await;
        token.cancel("test");
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let token = ShutdownToken::new();
        token.cancel("test");
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("already cancelled");
    }
}
