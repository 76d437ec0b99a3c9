//! Serial completion queue.
//!
//! Completion handlers passed to
//! [`PipelineClient::run_then`](crate::PipelineClient::run_then) run one at
//! a time, in the order their calls finished, on a single Tokio task owned
//! by the client. Handlers for one client therefore never race each other.
//! A handler that panics is logged and skipped; later handlers still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A serial queue of completion handlers.
///
/// Clones share the same queue. The draining task starts on first use, so
/// a queue can be created outside a runtime.
#[derive(Clone, Default)]
pub struct CompletionQueue {
    sender: Arc<OnceLock<mpsc::UnboundedSender<Job>>>,
}

impl CompletionQueue {
    /// Creates an idle queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `job` after every previously dispatched job.
    ///
    /// # Panics
    ///
    /// Panics if the queue is first used outside a Tokio runtime.
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.get_or_init(|| {
            let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
            tokio::spawn(async move {
                while let Some(job) = receiver.recv().await {
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
                        tracing::error!(
                            panic = panic_message(panic.as_ref()),
                            "completion handler panicked"
                        );
                    }
                }
            });
            sender
        });

        if sender.send(Box::new(job)).is_err() {
            tracing::error!("completion queue stopped; dropping completion handler");
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl std::fmt::Debug for CompletionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionQueue")
            .field("started", &self.sender.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_jobs_run_in_dispatch_order() {
        let queue = CompletionQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let seen = Arc::clone(&seen);
            queue.dispatch(move || seen.lock().push(i));
        }

        let (done_tx, done_rx) = oneshot::channel();
        queue.dispatch(move || {
            let _ = done_tx.send(());
        });
        done_rx.await.unwrap();

        assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_queue() {
        let queue = CompletionQueue::new();
        let (done_tx, done_rx) = oneshot::channel();

        queue.dispatch(|| panic!("handler failed"));
        queue.dispatch(move || {
            let _ = done_tx.send("ran");
        });

        assert_eq!(done_rx.await.unwrap(), "ran");
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&"owned".to_string()), "owned");
        assert_eq!(panic_message(&42_u8), "non-string panic payload");
    }

    #[test]
    fn test_queue_can_be_created_outside_runtime() {
        let queue = CompletionQueue::new();
        assert_eq!(format!("{queue:?}"), "CompletionQueue { started: false }");
    }
}
