//! Blocking page iteration.
//!
//! [`BlockingPages`] adapts a [`PagedCollection`] to [`Iterator`] for
//! synchronous callers. Each step hands the page fetch to a Tokio runtime
//! and parks the calling thread until the page arrives or the wait
//! deadline passes. Errors and timeouts cannot be returned through
//! `Iterator`, so they are logged and end the sequence.
//!
//! A fetch that misses the deadline is aborted. The collection only changes
//! once a response has been decoded, so an aborted fetch leaves it as it
//! was and the same page can be fetched again later.
//!
//! Never drive a `BlockingPages` from a runtime worker thread: the fetch
//! would wait on the very thread it needs.

use crate::paged::PagedCollection;
use serde::de::DeserializeOwned;
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tokio::runtime::Handle;

/// Default deadline for a single page fetch.
pub const DEFAULT_BLOCKING_WAIT: Duration = Duration::from_secs(30);

/// A blocking iterator over the pages of a [`PagedCollection`].
///
/// The first item is every item fetched so far; each later item is one
/// newly fetched page. The iterator is fused.
pub struct BlockingPages<T> {
    collection: Arc<PagedCollection<T>>,
    handle: Handle,
    wait: Duration,
    started: bool,
    done: bool,
}

impl<T> BlockingPages<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Creates an iterator that runs fetches on `handle`.
    #[must_use]
    pub fn new(collection: Arc<PagedCollection<T>>, handle: Handle) -> Self {
        Self {
            collection,
            handle,
            wait: DEFAULT_BLOCKING_WAIT,
            started: false,
            done: false,
        }
    }

    /// Sets the per-page deadline.
    #[must_use]
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// The collection being iterated.
    #[must_use]
    pub fn collection(&self) -> &Arc<PagedCollection<T>> {
        &self.collection
    }

    fn fetch_page(&self) -> Option<Vec<T>> {
        let (sender, receiver) = mpsc::sync_channel(1);
        let collection = Arc::clone(&self.collection);
        let task = self.handle.spawn(async move {
            let _ = sender.send(collection.next_page().await);
        });

        let result = match receiver.recv_timeout(self.wait) {
            Err(mpsc::RecvTimeoutError::Timeout) => {
                task.abort();
                // The page may have landed between the deadline and the abort.
                receiver.try_recv().map_err(|_| mpsc::RecvTimeoutError::Timeout)
            }
            other => other,
        };

        match result {
            Ok(Ok(page)) => page,
            Ok(Err(error)) => {
                tracing::error!(error = %error, "failed to fetch next page");
                None
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::error!(
                    wait_ms = self.wait.as_millis() as u64,
                    "timed out waiting for next page; fetch aborted"
                );
                None
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::error!("page fetch task ended without a result");
                None
            }
        }
    }
}

impl<T> Iterator for BlockingPages<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if !self.started {
            self.started = true;
            let items = self.collection.items();
            if !items.is_empty() {
                return Some(items);
            }
        }

        let page = self.fetch_page();
        if page.is_none() {
            self.done = true;
        }
        page
    }
}

impl<T> std::iter::FusedIterator for BlockingPages<T> where
    T: DeserializeOwned + Clone + Send + Sync + 'static
{
}

impl<T> std::fmt::Debug for BlockingPages<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingPages")
            .field("collection", &self.collection)
            .field("wait", &self.wait)
            .field("started", &self.started)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
