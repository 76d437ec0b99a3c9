//! Transfer notifications and routing to the owning client.

use crate::progress::TransferProgress;
use crate::state::TransferState;
use crate::transfer::Transfer;
use cirrus_core::ClientError;
use dashmap::DashMap;
use std::sync::{Arc, Weak};

/// Receives blob-level transfer notifications.
///
/// Chunk sub-transfers are never reported; only their effect on the blob
/// is. Callbacks run on transfer worker tasks and must not block.
pub trait TransferDelegate: Send + Sync {
    /// The transfer moved to `state`, or made progress while in it.
    ///
    /// `progress` is set for progress updates, which are only delivered
    /// when the completed fraction strictly increases.
    fn on_state_changed(
        &self,
        transfer: &Transfer,
        state: TransferState,
        progress: Option<TransferProgress>,
    );

    /// Every chunk of the transfer finished.
    fn on_complete(&self, transfer: &Transfer);

    /// A non-retriable error ended the transfer.
    fn on_failed(&self, transfer: &Transfer, error: &ClientError);

    /// Several transfers changed at once, as by
    /// [`TransferManager::pause_all`](crate::TransferManager::pause_all).
    fn on_batch_update(&self, transfers: &[Transfer]);
}

/// Routes notifications to delegates by client restoration id.
///
/// The registry only holds weak references. A client registers itself when
/// it is constructed and deregisters on teardown; notifications for an id
/// with no live delegate are dropped.
#[derive(Default)]
pub struct ClientRegistry {
    delegates: DashMap<String, Weak<dyn TransferDelegate>>,
}

impl ClientRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `delegate` under `restoration_id`, replacing any previous
    /// registration.
    pub fn register(&self, restoration_id: impl Into<String>, delegate: Weak<dyn TransferDelegate>) {
        let restoration_id = restoration_id.into();
        tracing::debug!(restoration_id = %restoration_id, "registered transfer delegate");
        self.delegates.insert(restoration_id, delegate);
    }

    /// Removes the registration for `restoration_id`.
    ///
    /// Returns true if one existed.
    pub fn deregister(&self, restoration_id: &str) -> bool {
        self.delegates.remove(restoration_id).is_some()
    }

    /// Returns the live delegate for `restoration_id`.
    ///
    /// Registrations whose delegate has been dropped are pruned.
    #[must_use]
    pub fn resolve(&self, restoration_id: &str) -> Option<Arc<dyn TransferDelegate>> {
        let delegate = self.delegates.get(restoration_id)?.upgrade();
        if delegate.is_none() {
            self.delegates
                .remove_if(restoration_id, |_, weak| weak.strong_count() == 0);
        }
        delegate
    }

    /// Returns true if a registration exists for `restoration_id`.
    #[must_use]
    pub fn contains(&self, restoration_id: &str) -> bool {
        self.delegates.contains_key(restoration_id)
    }

    /// Number of registrations, live or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("registrations", &self.delegates.len())
            .finish()
    }
}
