//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is carried through the pipeline in the
//! [`Context`](crate::Context). It is cancelled either explicitly with
//! [`cancel`](CancellationToken::cancel) or implicitly once its timeout has
//! elapsed since creation. Stages and the transport observe it; nothing is
//! preempted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
    timeout: OnceLock<Duration>,
    created_at: Instant,
}

/// Shared cancellation flag with an optional deadline.
///
/// Clones share state: cancelling one clone cancels them all.
///
/// # Example
///
/// ```
/// use cirrus_core::CancellationToken;
///
/// let token = CancellationToken::new();
/// let observer = token.clone();
/// token.cancel();
/// assert!(observer.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a token without a timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                timeout: OnceLock::new(),
                created_at: Instant::now(),
            }),
        }
    }

    /// Creates a token that cancels itself `timeout` after creation.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let token = Self::new();
        let _ = token.inner.timeout.set(timeout);
        token
    }

    /// Sets the timeout if none was configured.
    ///
    /// Returns true if `timeout` was applied.
    pub fn apply_default_timeout(&self, timeout: Duration) -> bool {
        self.inner.timeout.set(timeout).is_ok()
    }

    /// Returns the configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout.get().copied()
    }

    /// Cancels the token and wakes every waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Returns true if [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_explicitly_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Returns true if the timeout has elapsed.
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        self.remaining() == Some(Duration::ZERO)
    }

    /// Returns true if the token was cancelled or has timed out.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.is_explicitly_cancelled() || self.is_timed_out()
    }

    /// Time left before the timeout fires, if a timeout is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        let timeout = self.timeout()?;
        Some(timeout.saturating_sub(self.inner.created_at.elapsed()))
    }

    /// Completes once the token is cancelled or times out.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }

            match self.remaining() {
                Some(remaining) => {
                    tokio::select! {
                        () = &mut notified => {}
                        () = tokio::time::sleep(remaining) => return,
                    }
                }
                None => notified.await,
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_is_live() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.timeout().is_none());
        assert!(token.remaining().is_none());
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(token.is_explicitly_cancelled());
    }

    #[test]
    fn test_default_timeout_only_applies_once() {
        let token = CancellationToken::new();
        assert!(token.apply_default_timeout(Duration::from_secs(3)));
        assert!(!token.apply_default_timeout(Duration::from_secs(9)));
        assert_eq!(token.timeout(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_zero_timeout_is_immediately_cancelled() {
        let token = CancellationToken::with_timeout(Duration::ZERO);
        assert!(token.is_timed_out());
        assert!(token.is_cancelled());
        assert!(!token.is_explicitly_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_on_cancel() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::task::yield_now().await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should complete")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_wakes_on_timeout() {
        let token = CancellationToken::with_timeout(Duration::from_millis(20));
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("timeout should fire");
        assert!(token.is_timed_out());
    }
}
