//! Cooperative cancellation for resolution requests.

use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable cancellation token.
///
/// Cancelling any clone is observed by all clones. Waiters subscribe only
/// for the duration of one [`cancelled`](CancelToken::cancelled) wait; the
/// subscription is released when the wait completes or is dropped.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(tx),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.inner.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.borrow()
    }

    /// Resolve once cancellation has been requested. Returns immediately
    /// if the token is already cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                // The token holds the sender, so the channel cannot close
                // while a waiter borrows it; stay pending if it ever does.
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn observed_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();

        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        clone.cancelled().await;
    }

    #[tokio::test]
    async fn wakes_pending_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();

        let handle = tokio::spawn(async move { waiter.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
