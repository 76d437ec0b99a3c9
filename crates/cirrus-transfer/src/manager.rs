//! Transfer manager: schedules chunk work and drives the state machine.
//!
//! Each blob transfer is split into chunk sub-transfers. Starting a
//! transfer spawns a driver task whose workers pick pending chunks one at a
//! time; a global semaphore bounds the chunks in flight across every
//! transfer. Pause and cancel are cooperative: they flip the blob's state,
//! and workers check it before taking the next chunk. A chunk already in
//! flight is allowed to finish.
//!
//! All writes to a transfer go through one lock per transfer. Delegates
//! are notified after the lock is released.

use crate::delegate::ClientRegistry;
use crate::error::{TransferError, TransferResult};
use crate::handler::{ChunkHandler, ChunkRequest};
use crate::options::TransferOptions;
use crate::progress::{ProgressGate, TransferProgress};
use crate::state::TransferState;
use crate::transfer::{ChunkRange, Transfer, TransferDirection, TransferId, TransferKind};
use chrono::{DateTime, Utc};
use cirrus_core::ClientError;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

struct ChunkSlot {
    id: TransferId,
    range: ChunkRange,
    state: TransferState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ChunkSlot {
    /// Applies `next` if legal. Returns false for stale updates.
    fn set_state(&mut self, next: TransferState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }

    const fn is_pickable(&self) -> bool {
        matches!(self.state, TransferState::Pending | TransferState::Paused)
    }
}

struct RecordState {
    state: TransferState,
    bytes: u64,
    chunks: Vec<ChunkSlot>,
    error: Option<String>,
    gate: ProgressGate,
    drivers: usize,
    updated_at: DateTime<Utc>,
}

impl RecordState {
    fn set_state(&mut self, next: TransferState) -> TransferResult<()> {
        self.state = self.state.transition(next)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn all_chunks_complete(&self) -> bool {
        self.chunks
            .iter()
            .all(|chunk| chunk.state == TransferState::Complete)
    }

    /// Moves every unfinished chunk to `state` (cancel or delete).
    fn close_chunks(&mut self, state: TransferState) {
        for chunk in &mut self.chunks {
            chunk.set_state(state);
        }
    }
}

struct TransferRecord {
    id: TransferId,
    restoration_id: String,
    direction: TransferDirection,
    url: String,
    total_bytes: u64,
    created_at: DateTime<Utc>,
    handler: Arc<dyn ChunkHandler>,
    inner: Mutex<RecordState>,
    settled: watch::Sender<bool>,
}

impl TransferRecord {
    fn snapshot(&self) -> Transfer {
        self.snapshot_of(&self.inner.lock())
    }

    fn snapshot_of(&self, inner: &RecordState) -> Transfer {
        Transfer {
            id: self.id,
            client_restoration_id: self.restoration_id.clone(),
            kind: TransferKind::Blob {
                direction: self.direction,
                url: self.url.clone(),
                total_bytes: self.total_bytes,
                chunk_count: inner.chunks.len(),
            },
            state: inner.state,
            progress: TransferProgress::new(inner.bytes, self.total_bytes),
            error: inner.error.clone(),
            created_at: self.created_at,
            updated_at: inner.updated_at,
        }
    }

    fn chunk_snapshots(&self) -> Vec<Transfer> {
        let inner = self.inner.lock();
        inner
            .chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| {
                let done = if chunk.state == TransferState::Complete {
                    chunk.range.len()
                } else {
                    0
                };
                Transfer {
                    id: chunk.id,
                    client_restoration_id: self.restoration_id.clone(),
                    kind: TransferKind::Chunk {
                        parent: self.id,
                        index,
                        range: chunk.range,
                    },
                    state: chunk.state,
                    progress: TransferProgress::new(done, chunk.range.len()),
                    error: None,
                    created_at: chunk.created_at,
                    updated_at: chunk.updated_at,
                }
            })
            .collect()
    }
}

/// A blob-level event to report once the record lock is released.
enum Notice {
    State(TransferState, Option<TransferProgress>),
    Complete,
    Failed(ClientError),
}

fn notify(registry: &ClientRegistry, transfer: &Transfer, notice: Notice) {
    let Some(delegate) = registry.resolve(&transfer.client_restoration_id) else {
        debug!(
            transfer_id = %transfer.id,
            restoration_id = %transfer.client_restoration_id,
            "no live delegate for transfer notification"
        );
        return;
    };

    match notice {
        Notice::State(state, progress) => delegate.on_state_changed(transfer, state, progress),
        Notice::Complete => delegate.on_complete(transfer),
        Notice::Failed(error) => delegate.on_failed(transfer, &error),
    }
}

/// Schedules and tracks resumable chunked transfers.
///
/// # Example
///
/// ```
/// use cirrus_core::{BoxFuture, ClientResult};
/// use cirrus_transfer::{
///     ChunkHandler, ChunkRequest, ClientRegistry, TransferManager, TransferOptions, TransferState,
/// };
/// use std::sync::Arc;
///
/// struct Noop;
///
/// impl ChunkHandler for Noop {
///     fn transfer_chunk<'a>(&'a self, _chunk: ChunkRequest) -> BoxFuture<'a, ClientResult<()>> {
///         Box::pin(async { Ok(()) })
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let manager = TransferManager::new(
///     TransferOptions::new().with_max_chunk_size(1024),
///     Arc::new(ClientRegistry::new()),
/// )
/// .unwrap();
///
/// let id = manager.enqueue_upload("client-1", "https://example.com/c/blob", 4096, Arc::new(Noop));
/// manager.start(id).unwrap();
///
/// let transfer = manager.wait(id).await.unwrap();
/// assert_eq!(transfer.state, TransferState::Complete);
/// assert_eq!(transfer.progress.as_percent(), 100);
/// # });
/// ```
pub struct TransferManager {
    options: TransferOptions,
    registry: Arc<ClientRegistry>,
    records: DashMap<TransferId, Arc<TransferRecord>>,
    permits: Arc<Semaphore>,
}

impl TransferManager {
    /// Creates a manager routing notifications through `registry`.
    pub fn new(options: TransferOptions, registry: Arc<ClientRegistry>) -> TransferResult<Self> {
        options.validate()?;
        Ok(Self {
            permits: Arc::new(Semaphore::new(options.max_concurrent_chunks)),
            options,
            registry,
            records: DashMap::new(),
        })
    }

    /// The manager's options.
    #[must_use]
    pub const fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// The delegate registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Enqueues a download of `total_bytes` from `url`, in `Pending` state.
    pub fn enqueue_download(
        &self,
        restoration_id: impl Into<String>,
        url: impl Into<String>,
        total_bytes: u64,
        handler: Arc<dyn ChunkHandler>,
    ) -> TransferId {
        self.enqueue(
            restoration_id.into(),
            TransferDirection::Download,
            url.into(),
            total_bytes,
            handler,
        )
    }

    /// Enqueues an upload of `total_bytes` to `url`, in `Pending` state.
    pub fn enqueue_upload(
        &self,
        restoration_id: impl Into<String>,
        url: impl Into<String>,
        total_bytes: u64,
        handler: Arc<dyn ChunkHandler>,
    ) -> TransferId {
        self.enqueue(
            restoration_id.into(),
            TransferDirection::Upload,
            url.into(),
            total_bytes,
            handler,
        )
    }

    fn enqueue(
        &self,
        restoration_id: String,
        direction: TransferDirection,
        url: String,
        total_bytes: u64,
        handler: Arc<dyn ChunkHandler>,
    ) -> TransferId {
        let now = Utc::now();
        let chunks: Vec<ChunkSlot> = ChunkRange::split(total_bytes, self.options.max_chunk_size_bytes)
            .into_iter()
            .map(|range| ChunkSlot {
                id: TransferId::new(),
                range,
                state: TransferState::Pending,
                created_at: now,
                updated_at: now,
            })
            .collect();

        let id = TransferId::new();
        let (settled, _) = watch::channel(true);
        let record = Arc::new(TransferRecord {
            id,
            restoration_id,
            direction,
            url,
            total_bytes,
            created_at: now,
            handler,
            inner: Mutex::new(RecordState {
                state: TransferState::Pending,
                bytes: 0,
                chunks,
                error: None,
                gate: ProgressGate::new(),
                drivers: 0,
                updated_at: now,
            }),
            settled,
        });

        let snapshot = record.snapshot();
        info!(
            transfer_id = %id,
            direction = ?direction,
            total_bytes,
            chunks = snapshot_chunk_count(&snapshot),
            "transfer enqueued"
        );
        self.records.insert(id, record);
        notify(&self.registry, &snapshot, Notice::State(TransferState::Pending, None));
        id
    }

    fn record(&self, id: TransferId) -> TransferResult<Arc<TransferRecord>> {
        self.records
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(TransferError::not_found(id))
    }

    /// Moves a transfer to `next` without notifying anyone.
    fn apply(record: &TransferRecord, next: TransferState) -> TransferResult<Transfer> {
        let mut inner = record.inner.lock();
        inner.set_state(next)?;
        if matches!(next, TransferState::Canceled | TransferState::Deleted) {
            inner.close_chunks(next);
        }
        Ok(record.snapshot_of(&inner))
    }

    fn transition(&self, id: TransferId, next: TransferState) -> TransferResult<Arc<TransferRecord>> {
        let record = self.record(id)?;
        let snapshot = Self::apply(&record, next)?;
        debug!(transfer_id = %id, state = %next, "transfer state changed");
        notify(&self.registry, &snapshot, Notice::State(next, None));
        Ok(record)
    }

    /// Starts a pending transfer.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self, id: TransferId) -> TransferResult<()> {
        let record = self.transition(id, TransferState::InProgress)?;
        self.spawn_driver(record);
        Ok(())
    }

    /// Pauses a pending or running transfer.
    ///
    /// Chunks already in flight finish; no new chunk is started.
    pub fn pause(&self, id: TransferId) -> TransferResult<()> {
        self.transition(id, TransferState::Paused).map(drop)
    }

    /// Resumes a paused transfer from its first unfinished chunk.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn resume(&self, id: TransferId) -> TransferResult<()> {
        let record = self.transition(id, TransferState::InProgress)?;
        self.spawn_driver(record);
        Ok(())
    }

    /// Cancels a transfer that has not finished.
    pub fn cancel(&self, id: TransferId) -> TransferResult<()> {
        self.transition(id, TransferState::Canceled).map(drop)
    }

    /// Stops tracking a transfer, marking it `Deleted` if it had not
    /// finished.
    pub fn remove(&self, id: TransferId) -> TransferResult<Transfer> {
        let (_, record) = self
            .records
            .remove(&id)
            .ok_or(TransferError::not_found(id))?;

        if record.inner.lock().state.is_terminal() {
            return Ok(record.snapshot());
        }
        let snapshot = Self::apply(&record, TransferState::Deleted)?;
        info!(transfer_id = %id, "transfer removed");
        notify(
            &self.registry,
            &snapshot,
            Notice::State(TransferState::Deleted, None),
        );
        Ok(snapshot)
    }

    /// A snapshot of one transfer.
    #[must_use]
    pub fn transfer(&self, id: TransferId) -> Option<Transfer> {
        self.records.get(&id).map(|entry| entry.value().snapshot())
    }

    /// Snapshots of every tracked transfer, oldest first.
    #[must_use]
    pub fn transfers(&self) -> Vec<Transfer> {
        let mut transfers: Vec<Transfer> = self
            .records
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        transfers.sort_by_key(|transfer| transfer.id);
        transfers
    }

    /// Snapshots of a transfer's chunk sub-transfers, in blob order.
    pub fn chunks(&self, id: TransferId) -> TransferResult<Vec<Transfer>> {
        Ok(self.record(id)?.chunk_snapshots())
    }

    /// Pauses every pending or running transfer.
    ///
    /// Affected transfers are reported once per client through
    /// [`on_batch_update`](crate::TransferDelegate::on_batch_update).
    pub fn pause_all(&self) -> Vec<Transfer> {
        let paused = self.apply_all(TransferState::Paused, |state| {
            matches!(state, TransferState::Pending | TransferState::InProgress)
        });
        self.notify_batch(&paused);
        paused
    }

    /// Resumes every paused transfer.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn resume_all(&self) -> Vec<Transfer> {
        let resumed = self.apply_all(TransferState::InProgress, |state| {
            state == TransferState::Paused
        });
        for transfer in &resumed {
            if let Ok(record) = self.record(transfer.id) {
                self.spawn_driver(record);
            }
        }
        self.notify_batch(&resumed);
        resumed
    }

    fn apply_all(
        &self,
        next: TransferState,
        eligible: impl Fn(TransferState) -> bool,
    ) -> Vec<Transfer> {
        let records: Vec<Arc<TransferRecord>> = self
            .records
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut changed: Vec<Transfer> = records
            .iter()
            .filter(|record| eligible(record.inner.lock().state))
            .filter_map(|record| Self::apply(record, next).ok())
            .collect();
        changed.sort_by_key(|transfer| transfer.id);
        changed
    }

    fn notify_batch(&self, transfers: &[Transfer]) {
        let mut by_client: BTreeMap<&str, Vec<Transfer>> = BTreeMap::new();
        for transfer in transfers {
            by_client
                .entry(transfer.client_restoration_id.as_str())
                .or_default()
                .push(transfer.clone());
        }
        for (restoration_id, transfers) in by_client {
            if let Some(delegate) = self.registry.resolve(restoration_id) {
                delegate.on_batch_update(&transfers);
            }
        }
    }

    /// Waits until no worker is running for the transfer and returns its
    /// snapshot.
    pub async fn wait(&self, id: TransferId) -> TransferResult<Transfer> {
        let record = self.record(id)?;
        let mut settled = record.settled.subscribe();
        let _ = settled.wait_for(|idle| *idle).await;
        Ok(record.snapshot())
    }

    fn spawn_driver(&self, record: Arc<TransferRecord>) {
        record.inner.lock().drivers += 1;
        record.settled.send_replace(false);

        let registry = Arc::clone(&self.registry);
        let permits = Arc::clone(&self.permits);
        let workers = self.options.max_concurrent_chunks;
        tokio::spawn(drive(record, registry, permits, workers));
    }
}

fn snapshot_chunk_count(transfer: &Transfer) -> usize {
    match transfer.kind {
        TransferKind::Blob { chunk_count, .. } => chunk_count,
        TransferKind::Chunk { .. } => 1,
    }
}

impl std::fmt::Debug for TransferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferManager")
            .field("options", &self.options)
            .field("transfers", &self.records.len())
            .field("registry", &self.registry)
            .finish()
    }
}

async fn drive(
    record: Arc<TransferRecord>,
    registry: Arc<ClientRegistry>,
    permits: Arc<Semaphore>,
    workers: usize,
) {
    let mut set = JoinSet::new();
    for _ in 0..workers {
        set.spawn(work(
            Arc::clone(&record),
            Arc::clone(&registry),
            Arc::clone(&permits),
        ));
    }
    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            error!(transfer_id = %record.id, error = %e, "transfer worker panicked");
        }
    }

    complete_if_done(&record, &registry);

    let mut inner = record.inner.lock();
    inner.drivers -= 1;
    if inner.drivers == 0 {
        record.settled.send_replace(true);
    }
}

/// Marks the blob complete once every chunk is.
fn complete_if_done(record: &TransferRecord, registry: &ClientRegistry) {
    let snapshot = {
        let mut inner = record.inner.lock();
        if inner.state != TransferState::InProgress || !inner.all_chunks_complete() {
            return;
        }
        if inner.set_state(TransferState::Complete).is_err() {
            return;
        }
        record.snapshot_of(&inner)
    };

    info!(transfer_id = %record.id, bytes = snapshot.progress.bytes, "transfer complete");
    notify(registry, &snapshot, Notice::Complete);
}

async fn work(record: Arc<TransferRecord>, registry: Arc<ClientRegistry>, permits: Arc<Semaphore>) {
    loop {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            return;
        };

        let request = {
            let mut inner = record.inner.lock();
            if inner.state != TransferState::InProgress {
                return;
            }
            let Some(index) = inner.chunks.iter().position(ChunkSlot::is_pickable) else {
                return;
            };
            let chunk = &mut inner.chunks[index];
            chunk.set_state(TransferState::InProgress);
            ChunkRequest {
                transfer: record.id,
                url: record.url.clone(),
                direction: record.direction,
                index,
                range: chunk.range,
            }
        };

        let index = request.index;
        let result = record.handler.transfer_chunk(request).await;
        drop(permit);

        let notices = match result {
            Ok(()) => chunk_succeeded(&record, index),
            Err(error) => chunk_failed(&record, index, error),
        };
        for (snapshot, notice) in notices {
            notify(&registry, &snapshot, notice);
        }
    }
}

fn chunk_succeeded(record: &TransferRecord, index: usize) -> Vec<(Transfer, Notice)> {
    let mut inner = record.inner.lock();
    let range = inner.chunks[index].range;
    if !inner.chunks[index].set_state(TransferState::Complete) {
        // Cancelled or deleted while in flight.
        return Vec::new();
    }
    inner.bytes += range.len();

    let mut notices = Vec::new();
    let progress = TransferProgress::new(inner.bytes, record.total_bytes);
    if !inner.state.is_terminal() && inner.gate.offer(progress.as_fraction()) {
        let state = inner.state;
        notices.push((record.snapshot_of(&inner), Notice::State(state, Some(progress))));
    }

    if inner.state == TransferState::InProgress
        && inner.all_chunks_complete()
        && inner.set_state(TransferState::Complete).is_ok()
    {
        info!(transfer_id = %record.id, bytes = inner.bytes, "transfer complete");
        notices.push((record.snapshot_of(&inner), Notice::Complete));
    }
    notices
}

fn chunk_failed(record: &TransferRecord, index: usize, error: ClientError) -> Vec<(Transfer, Notice)> {
    let mut inner = record.inner.lock();
    let retriable = error.is_transient() || error.is_cancelled();

    if !retriable && inner.state == TransferState::InProgress {
        inner.chunks[index].set_state(TransferState::Failed);
        if inner.set_state(TransferState::Failed).is_ok() {
            inner.error = Some(error.to_string());
            error!(
                transfer_id = %record.id,
                chunk = index,
                error = %error,
                "transfer failed"
            );
            return vec![(record.snapshot_of(&inner), Notice::Failed(error))];
        }
    }

    // Retriable, or the blob already left InProgress: keep the chunk for a
    // later resume.
    if !inner.chunks[index].set_state(TransferState::Paused) {
        return Vec::new();
    }
    if inner.state == TransferState::InProgress && inner.set_state(TransferState::Paused).is_ok() {
        warn!(
            transfer_id = %record.id,
            chunk = index,
            error = %error,
            "transfer paused after transient error"
        );
        return vec![(
            record.snapshot_of(&inner),
            Notice::State(TransferState::Paused, None),
        )];
    }
    debug!(transfer_id = %record.id, chunk = index, error = %error, "chunk error ignored");
    Vec::new()
}
