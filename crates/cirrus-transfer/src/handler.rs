//! Chunk handlers: the work a transfer performs per chunk.

use crate::transfer::{ChunkRange, TransferDirection, TransferId};
use cirrus_client::PipelineClient;
use cirrus_core::{BoxFuture, ClientError, ClientResult, Context, HeaderMap, Method};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Header carrying the requested byte range.
pub const RANGE_HEADER: &str = "x-ms-range";

/// One unit of chunk work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    /// The owning blob transfer.
    pub transfer: TransferId,
    /// Blob URL.
    pub url: String,
    /// Transfer direction.
    pub direction: TransferDirection,
    /// Position within the blob.
    pub index: usize,
    /// Bytes to move.
    pub range: ChunkRange,
}

/// Moves a single chunk.
///
/// Errors decide the blob's fate: transient transport errors pause it,
/// cancellations leave the chunk to be retried on resume, and anything else
/// fails it.
pub trait ChunkHandler: Send + Sync + 'static {
    /// Transfers `chunk`.
    fn transfer_chunk<'a>(&'a self, chunk: ChunkRequest) -> BoxFuture<'a, ClientResult<()>>;
}

/// Destination for downloaded bytes.
pub trait ChunkSink: Send + Sync {
    /// Writes `data` starting at `offset`.
    fn write_at(&self, offset: u64, data: &[u8]) -> ClientResult<()>;
}

/// An in-memory [`ChunkSink`].
#[derive(Debug, Default)]
pub struct MemorySink {
    buffer: Mutex<Vec<u8>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a zero-filled sink of `len` bytes.
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        Self {
            buffer: Mutex::new(vec![0; len]),
        }
    }

    /// Copies out the current contents.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }
}

impl ChunkSink for MemorySink {
    fn write_at(&self, offset: u64, data: &[u8]) -> ClientResult<()> {
        let start = usize::try_from(offset)
            .map_err(|_| ClientError::client(format!("offset {offset} exceeds memory")))?;
        let end = start + data.len();

        let mut buffer = self.buffer.lock();
        if buffer.len() < end {
            buffer.resize(end, 0);
        }
        buffer[start..end].copy_from_slice(data);
        Ok(())
    }
}

/// Downloads chunks with ranged `GET`s through a [`PipelineClient`].
///
/// Each chunk is requested with `x-ms-range: bytes=start-end`, accepting
/// `200` and `206`, and written into the sink at its offset.
pub struct RangeDownloadHandler {
    client: PipelineClient,
    sink: Arc<dyn ChunkSink>,
}

impl RangeDownloadHandler {
    /// Creates a handler writing into `sink`.
    #[must_use]
    pub fn new(client: PipelineClient, sink: Arc<dyn ChunkSink>) -> Self {
        Self { client, sink }
    }
}

impl ChunkHandler for RangeDownloadHandler {
    fn transfer_chunk<'a>(&'a self, chunk: ChunkRequest) -> BoxFuture<'a, ClientResult<()>> {
        Box::pin(async move {
            let request = self
                .client
                .request(Method::GET, &chunk.url, &BTreeMap::new(), HeaderMap::new(), None)?
                .with_header(RANGE_HEADER, &chunk.range.header_value())?;
            let context = Context::new().with_allowed_status_codes([200, 206]);

            let response = self.client.run(request, context).await?;
            let expected = chunk.range.len();
            if response.body.len() as u64 != expected {
                return Err(ClientError::decoding(format!(
                    "chunk {} returned {} bytes, expected {expected}",
                    chunk.index,
                    response.body.len()
                )));
            }

            self.sink.write_at(chunk.range.start, &response.body)?;
            tracing::debug!(
                transfer_id = %chunk.transfer,
                chunk = chunk.index,
                range = %chunk.range,
                "downloaded chunk"
            );
            Ok(())
        })
    }
}

impl std::fmt::Debug for RangeDownloadHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeDownloadHandler")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}
