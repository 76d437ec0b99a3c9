//! # Cirrus Transfer
//!
//! Resumable chunked transfers for the Cirrus client.
//!
//! This crate provides:
//!
//! - [`TransferState`]: the transfer state machine and its legal transitions
//! - [`TransferManager`]: splits blobs into chunks and runs them on a
//!   bounded worker pool, with cooperative pause, resume and cancel
//! - [`TransferDelegate`] and [`ClientRegistry`]: blob-level notifications
//!   routed to the owning client by restoration id
//! - [`ProgressGate`]: forwards progress only when it strictly increases
//! - [`RangeDownloadHandler`]: ranged `GET` chunk downloads through a
//!   [`PipelineClient`](cirrus_client::PipelineClient)
//!
//! ## States
//!
//! ```text
//! Pending ──start──► InProgress ──► Complete
//!                     │    ▲  └───► Failed   (non-retriable error)
//!               pause │    │ resume
//!                     ▼    │
//!                     Paused          (also after transient network errors)
//!
//! any non-terminal ──► Canceled | Deleted
//! ```
//!
//! Chunk failures are never reported directly. A transient transport error
//! (not connected, connection lost, timed out) pauses the blob so it can be
//! resumed later; any other error fails it.

#![doc(html_root_url = "https://docs.rs/cirrus-transfer/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod delegate;
mod error;
mod handler;
mod manager;
mod options;
mod progress;
mod state;
mod transfer;

pub use delegate::{ClientRegistry, TransferDelegate};
pub use error::{TransferError, TransferResult};
pub use handler::{ChunkHandler, ChunkRequest, ChunkSink, MemorySink, RangeDownloadHandler, RANGE_HEADER};
pub use manager::TransferManager;
pub use options::{TransferOptions, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_CONCURRENT_CHUNKS};
pub use progress::{ProgressGate, TransferProgress};
pub use state::{TransferState, TransitionError};
pub use transfer::{ChunkRange, Transfer, TransferDirection, TransferId, TransferKind};
