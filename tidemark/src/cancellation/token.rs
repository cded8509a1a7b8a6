//! Cancellation token observed at node boundaries.

use crate::errors::TidemarkError;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

type CancelCallback = Box<dyn Fn(&str) + Send + Sync>;

/// A token for cooperative cancellation of a run.
///
/// The coordinator checks the token before each node starts and again
/// right before each commit. Cancelling is idempotent; the first reason
/// is kept.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    callbacks: RwLock<Vec<CancelCallback>>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    ///
    /// Registered callbacks run once, on the first call. A panicking
    /// callback is logged and does not prevent the others from running.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let reason = reason.into();
        *self.reason.write() = Some(reason.clone());

        for callback in self.callbacks.read().iter() {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(&reason)));
            if let Err(e) = outcome {
                warn!("Cancellation callback panicked: {:?}", e);
            }
        }
    }

    /// Registers a callback receiving the cancellation reason.
    ///
    /// Runs immediately if the token is already cancelled.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        match self.reason() {
            Some(reason) if self.is_cancelled() => {
                if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(&reason))) {
                    warn!("Cancellation callback panicked: {:?}", e);
                }
            }
            _ => self.callbacks.write().push(Box::new(callback)),
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Returns `Err(Cancelled)` if cancellation was requested.
    ///
    /// `at` names the checkpoint for the error message.
    pub fn checkpoint(&self, at: &str) -> Result<(), TidemarkError> {
        if self.is_cancelled() {
            let reason = self.reason().unwrap_or_else(|| "cancelled".to_string());
            return Err(TidemarkError::Cancelled(format!("{reason} (at {at})")));
        }
        Ok(())
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.checkpoint("start").is_ok());
    }

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        token.cancel("operator stop");
        token.cancel("second");

        assert_eq!(token.reason().as_deref(), Some("operator stop"));
    }

    #[test]
    fn test_checkpoint_after_cancel() {
        let token = CancellationToken::new();
        token.cancel("operator stop");

        let err = token.checkpoint("before commit of 'orders_bronze'").unwrap_err();
        assert_eq!(err.kind(), "Cancelled");
        assert!(err.to_string().contains("operator stop"));
        assert!(err.to_string().contains("orders_bronze"));
    }

    #[test]
    fn test_callbacks_run_once() {
        let token = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        token.on_cancel(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        token.cancel("a");
        token.cancel("b");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let late = counter.clone();
        token.on_cancel(move |reason| {
            assert_eq!(reason, "a");
            late.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let token = CancellationToken::new();
        token.on_cancel(|_| panic!("boom"));
        token.cancel("test");
        assert!(token.is_cancelled());
    }
}
