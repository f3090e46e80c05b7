//! Chunked stream reader.
//!
//! Reassembles a server-side stream read with successive `IO.read`
//! requests into one payload. One extra read is kept in flight so the next
//! chunk is already on its way while the current one is appended.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──read()──► Reading ──eof chunk──► Completed
//!                   │   ▲                    │
//!                   └───┘ chunk              └── late chunks discarded
//! ```

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rustc_hash::FxHashSet;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::{RequestId, StreamHandle};
use crate::protocol::{Command, IoCommand, Response};
use crate::transport::Transport;

// ============================================================================
// Constants
// ============================================================================

/// Default size of one `IO.read`.
///
/// Bounded so a single chunk never needs one large socket buffer.
pub const DEFAULT_CHUNK_SIZE: usize = 32768;

// ============================================================================
// Types
// ============================================================================

/// Reader state.
#[derive(Debug)]
enum ReaderState {
    /// Not started.
    Idle,
    /// Accumulating chunks.
    Reading { data: Vec<u8> },
    /// Payload delivered.
    Completed,
}

/// Result of feeding one chunk response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// More chunks are expected.
    Pending,
    /// End of stream; the full payload.
    Completed(String),
    /// The response arrived after completion and was dropped.
    Discarded,
}

// ============================================================================
// StreamReader
// ============================================================================

/// Reads one server-side stream to completion.
///
/// An instance reads exactly one stream, once.
#[derive(Debug)]
pub struct StreamReader {
    handle: StreamHandle,
    chunk_size: usize,
    state: ReaderState,
    /// Ids of every read issued, including ones answered after completion.
    requests: FxHashSet<RequestId>,
}

impl StreamReader {
    /// Creates a reader for `handle`.
    #[must_use]
    pub fn new(handle: StreamHandle, chunk_size: usize) -> Self {
        Self {
            handle,
            chunk_size,
            state: ReaderState::Idle,
            requests: FxHashSet::default(),
        }
    }

    /// Returns the stream handle.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> &StreamHandle {
        &self.handle
    }

    /// Returns `true` once the payload was delivered.
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self.state, ReaderState::Completed)
    }

    /// Returns `true` if `id` is one of this reader's requests.
    #[inline]
    #[must_use]
    pub fn owns(&self, id: RequestId) -> bool {
        self.requests.contains(&id)
    }

    /// Starts reading: issues the first read and one read-ahead.
    ///
    /// # Errors
    ///
    /// - [`Error::StreamReuse`] if this reader was already started
    /// - transport errors from sending the reads
    pub async fn read<T>(&mut self, transport: &mut T) -> Result<()>
    where
        T: Transport + ?Sized,
    {
        if !matches!(self.state, ReaderState::Idle) {
            return Err(Error::StreamReuse {
                handle: self.handle.clone(),
            });
        }

        debug!(handle = %self.handle, chunk_size = self.chunk_size, "Reading stream");
        self.state = ReaderState::Reading { data: Vec::new() };
        self.request_chunk(transport).await?;
        self.request_chunk(transport).await
    }

    /// Feeds the response of one of this reader's reads.
    ///
    /// # Errors
    ///
    /// - [`Error::StreamRead`] if the response carries an error
    /// - [`Error::StreamRead`] if a chunk is not valid base64 or the payload not UTF-8
    pub async fn on_chunk<T>(&mut self, response: Response, transport: &mut T) -> Result<ChunkOutcome>
    where
        T: Transport + ?Sized,
    {
        let ReaderState::Reading { data } = &mut self.state else {
            trace!(handle = %self.handle, "Discarding late chunk");
            return Ok(ChunkOutcome::Discarded);
        };

        if let Some(fault) = response.error {
            return Err(Error::stream_read(self.handle.clone(), fault.message));
        }

        let result = response.result.unwrap_or(Value::Null);
        let chunk = result.get("data").and_then(Value::as_str).unwrap_or_default();
        let base64_encoded = result
            .get("base64Encoded")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let eof = result.get("eof").and_then(Value::as_bool).unwrap_or(false);

        if base64_encoded {
            let decoded = BASE64
                .decode(chunk)
                .map_err(|e| Error::stream_read(self.handle.clone(), format!("Invalid base64 chunk: {e}")))?;
            data.extend_from_slice(&decoded);
        } else {
            data.extend_from_slice(chunk.as_bytes());
        }

        trace!(handle = %self.handle, len = chunk.len(), eof, "Chunk received");

        if !eof {
            self.request_chunk(transport).await?;
            return Ok(ChunkOutcome::Pending);
        }

        let data = std::mem::take(data);
        self.state = ReaderState::Completed;

        transport
            .send_and_ignore(Command::Io(IoCommand::Close {
                handle: self.handle.clone(),
            }))
            .await?;

        let payload = String::from_utf8(data).map_err(|e| {
            Error::stream_read(self.handle.clone(), format!("Payload is not UTF-8: {e}"))
        })?;

        debug!(handle = %self.handle, len = payload.len(), "Stream complete");
        Ok(ChunkOutcome::Completed(payload))
    }

    /// Issues one `IO.read`.
    async fn request_chunk<T>(&mut self, transport: &mut T) -> Result<()>
    where
        T: Transport + ?Sized,
    {
        let id = transport
            .send_async(Command::Io(IoCommand::Read {
                handle: self.handle.clone(),
                size: self.chunk_size,
            }))
            .await?;
        self.requests.insert(id);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use crate::transport::{ReplayTransport, SendMode};

    fn chunk(id: u64, data: &str, eof: bool) -> Response {
        Response::success(Some(RequestId::new(id)), json!({"data": data, "eof": eof}))
    }

    #[tokio::test]
    async fn test_read_issues_read_ahead() {
        let mut transport = ReplayTransport::new();
        let mut reader = StreamReader::new(StreamHandle::new("7"), DEFAULT_CHUNK_SIZE);

        assert_ok!(reader.read(&mut transport).await);

        assert_eq!(transport.methods(), vec!["IO.read", "IO.read"]);
        assert!(transport.sent().iter().all(|s| s.mode == SendMode::Async));
        assert_eq!(
            transport.sent()[0].command.params(),
            json!({"handle": "7", "size": 32768})
        );
        assert!(reader.owns(RequestId::new(1)));
        assert!(reader.owns(RequestId::new(2)));
    }

    #[tokio::test]
    async fn test_reassembles_and_discards_late_chunk() {
        let mut transport = ReplayTransport::new();
        let mut reader = StreamReader::new(StreamHandle::new("7"), DEFAULT_CHUNK_SIZE);
        assert_ok!(reader.read(&mut transport).await);

        let first = reader.on_chunk(chunk(1, "ab", false), &mut transport).await;
        assert_eq!(first.expect("first"), ChunkOutcome::Pending);

        let second = reader.on_chunk(chunk(2, "cd", true), &mut transport).await;
        assert_eq!(second.expect("second"), ChunkOutcome::Completed("abcd".to_string()));
        assert!(reader.is_completed());

        let late = reader.on_chunk(chunk(3, "ef", false), &mut transport).await;
        assert_eq!(late.expect("late"), ChunkOutcome::Discarded);

        // read, read-ahead, refill after "ab", then close
        assert_eq!(
            transport.methods(),
            vec!["IO.read", "IO.read", "IO.read", "IO.close"]
        );
        assert_eq!(transport.count("IO.close"), 1);
    }

    #[tokio::test]
    async fn test_second_read_is_usage_error() {
        let mut transport = ReplayTransport::new();
        let mut reader = StreamReader::new(StreamHandle::new("1"), 16);
        assert_ok!(reader.read(&mut transport).await);

        let err = reader.read(&mut transport).await.expect_err("reuse");
        assert!(matches!(err, Error::StreamReuse { .. }));
    }

    #[tokio::test]
    async fn test_error_chunk_is_fatal() {
        let mut transport = ReplayTransport::new();
        let mut reader = StreamReader::new(StreamHandle::new("9"), 16);
        assert_ok!(reader.read(&mut transport).await);

        let response = Response::failure(Some(RequestId::new(1)), "Invalid stream handle");
        let err = reader
            .on_chunk(response, &mut transport)
            .await
            .expect_err("fatal");
        assert!(matches!(err, Error::StreamRead { .. }));
        assert!(err.to_string().contains("Invalid stream handle"));
    }

    #[tokio::test]
    async fn test_base64_chunks_are_decoded() {
        let mut transport = ReplayTransport::new();
        let mut reader = StreamReader::new(StreamHandle::new("2"), 16);
        assert_ok!(reader.read(&mut transport).await);

        let encoded = Response::success(
            Some(RequestId::new(1)),
            json!({"data": "W3sibmFtZSI6ImEifV0=", "base64Encoded": true, "eof": true}),
        );
        let outcome = reader.on_chunk(encoded, &mut transport).await.expect("chunk");
        assert_eq!(outcome, ChunkOutcome::Completed(r#"[{"name":"a"}]"#.to_string()));
    }

    #[tokio::test]
    async fn test_invalid_base64_is_fatal() {
        let mut transport = ReplayTransport::new();
        let mut reader = StreamReader::new(StreamHandle::new("2"), 16);
        assert_ok!(reader.read(&mut transport).await);

        let encoded = Response::success(
            Some(RequestId::new(1)),
            json!({"data": "***", "base64Encoded": true, "eof": false}),
        );
        assert_err!(reader.on_chunk(encoded, &mut transport).await);
    }
}
