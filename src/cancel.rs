//! Cooperative cancellation for enrichment and export.
//!
//! A batch export can run for as long as the batch is large, so every
//! suspension point (the enrichment call, background loads, the readiness
//! wait, rasterisation) races against a [`CancelToken`].

use crate::error::CardError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// A cloneable cancellation flag.
///
/// Cloning shares the flag: cancelling any clone cancels them all.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Fail fast with [`CardError::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> Result<(), CardError> {
        if self.is_cancelled() {
            Err(CardError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Run `fut` unless cancellation wins the race.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, CardError>
    where
        F: Future<Output = T>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(CardError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn run_completes_when_not_cancelled() {
        let token = CancelToken::new();
        let out = token.run(async { 7 }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn cancel_interrupts_pending_future() {
        let token = CancelToken::new();
        let clone = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            clone.cancel();
        });
        let res = token.run(tokio::time::sleep(Duration::from_secs(30))).await;
        assert!(matches!(res, Err(CardError::Cancelled)));
        assert!(token.is_cancelled());
    }

    #[test]
    fn check_after_cancel_fails() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        token.cancel();
        token.cancel();
        assert!(matches!(token.check(), Err(CardError::Cancelled)));
        // Already cancelled: resolves without a runtime timer.
        tokio_test::block_on(token.cancelled());
    }
}
