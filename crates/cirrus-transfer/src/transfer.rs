//! Transfer identity, kinds and snapshots.

use crate::progress::TransferProgress;
use crate::state::TransferState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a transfer.
///
/// UUID v7, so ids sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(Uuid);

impl TransferId {
    /// Generate a new unique transfer ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TransferId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Direction of a blob transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    /// Service to local.
    Download,
    /// Local to service.
    Upload,
}

/// An inclusive byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    /// First byte.
    pub start: u64,
    /// Last byte, inclusive.
    pub end: u64,
}

impl ChunkRange {
    /// Number of bytes in the range.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false; a range holds at least one byte.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// The `bytes=start-end` form used in range headers.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// Splits `total_bytes` into ranges of at most `chunk_size` bytes.
    ///
    /// Produces `ceil(total_bytes / chunk_size)` ranges; none for an empty
    /// blob.
    #[must_use]
    pub fn split(total_bytes: u64, chunk_size: u64) -> Vec<Self> {
        let chunk_size = chunk_size.max(1);
        let mut ranges = Vec::with_capacity(total_bytes.div_ceil(chunk_size) as usize);
        let mut start = 0;
        while start < total_bytes {
            let end = (start + chunk_size).min(total_bytes) - 1;
            ranges.push(Self { start, end });
            start = end + 1;
        }
        ranges
    }
}

impl fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// What a transfer moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferKind {
    /// A whole blob, made of chunk sub-transfers.
    Blob {
        /// Transfer direction.
        direction: TransferDirection,
        /// Blob URL.
        url: String,
        /// Blob size in bytes.
        total_bytes: u64,
        /// Number of chunks.
        chunk_count: usize,
    },
    /// One chunk of a blob.
    Chunk {
        /// The owning blob transfer.
        parent: TransferId,
        /// Position within the blob.
        index: usize,
        /// Bytes covered.
        range: ChunkRange,
    },
}

impl TransferKind {
    /// Returns true for blob transfers.
    #[must_use]
    pub const fn is_blob(&self) -> bool {
        matches!(self, Self::Blob { .. })
    }

    /// Total bytes covered by this transfer.
    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        match self {
            Self::Blob { total_bytes, .. } => *total_bytes,
            Self::Chunk { range, .. } => range.len(),
        }
    }
}

/// A point-in-time view of a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    /// Transfer id.
    pub id: TransferId,
    /// Restoration id of the owning client.
    pub client_restoration_id: String,
    /// Blob or chunk details.
    pub kind: TransferKind,
    /// Current state.
    pub state: TransferState,
    /// Bytes moved so far.
    pub progress: TransferProgress,
    /// Message of the error that failed the transfer.
    pub error: Option<String>,
    /// When the transfer was enqueued.
    pub created_at: DateTime<Utc>,
    /// When the state last changed.
    pub updated_at: DateTime<Utc>,
}

impl Transfer {
    /// One-line description for logs.
    #[must_use]
    pub fn debug_string(&self) -> String {
        match &self.kind {
            TransferKind::Blob { direction, .. } => format!(
                "Blob {direction:?} {}: Status {} ({}%)",
                self.id,
                self.state,
                self.progress.as_percent()
            ),
            TransferKind::Chunk { parent, index, .. } => {
                format!("Chunk {index} of {parent}: Status {}", self.state)
            }
        }
    }
}
