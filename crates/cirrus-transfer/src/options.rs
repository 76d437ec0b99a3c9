//! Transfer manager configuration.

use crate::error::{TransferError, TransferResult};

/// Default maximum chunk size: 4 MiB minus one byte.
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 4 * 1024 * 1024 - 1;

/// Default number of chunks in flight across all transfers.
pub const DEFAULT_MAX_CONCURRENT_CHUNKS: usize = 4;

/// Configuration for the [`TransferManager`](crate::TransferManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    /// Largest chunk a blob is split into.
    pub max_chunk_size_bytes: u64,
    /// Chunks transferred concurrently, across all transfers.
    pub max_concurrent_chunks: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            max_chunk_size_bytes: DEFAULT_MAX_CHUNK_SIZE,
            max_concurrent_chunks: DEFAULT_MAX_CONCURRENT_CHUNKS,
        }
    }
}

impl TransferOptions {
    /// Create options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum chunk size.
    #[must_use]
    pub const fn with_max_chunk_size(mut self, bytes: u64) -> Self {
        self.max_chunk_size_bytes = bytes;
        self
    }

    /// Set the concurrency limit.
    #[must_use]
    pub const fn with_max_concurrent_chunks(mut self, max: usize) -> Self {
        self.max_concurrent_chunks = max;
        self
    }

    /// Checks that both limits are non-zero.
    pub fn validate(&self) -> TransferResult<()> {
        if self.max_chunk_size_bytes == 0 {
            return Err(TransferError::invalid_options(
                "max_chunk_size_bytes must be greater than zero",
            ));
        }
        if self.max_concurrent_chunks == 0 {
            return Err(TransferError::invalid_options(
                "max_concurrent_chunks must be greater than zero",
            ));
        }
        Ok(())
    }
}
