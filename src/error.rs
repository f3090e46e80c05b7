//! Error types for the DevTools session manager.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use devtools_monitor::{Result, Session};
//!
//! async fn example(session: &mut Session) -> Result<()> {
//!     session.clear_cache().await?;
//!     session.monitor_url("https://example.com", None).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::ScopedStateConflict`], [`Error::UnknownListener`], [`Error::StreamReuse`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::Http`], [`Error::WebSocket`] |
//! | Protocol | [`Error::Protocol`], [`Error::UnexpectedResponse`], [`Error::StreamRead`] |
//! | Execution | [`Error::Script`], [`Error::Timeout`], [`Error::RequestTimeout`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::ChannelClosed`] |
//!
//! A [`Error::Timeout`] raised by the notification pump is not a failure: the
//! dispatch loop consumes it as its designed exit path.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{RequestId, StreamHandle};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when session options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Conflicting scoped state registration.
    ///
    /// Returned when the same method is registered twice with different
    /// activation or restoration parameters.
    #[error("Conflicting scoped state for {method}")]
    ScopedStateConflict {
        /// Method registered twice.
        method: String,
    },

    /// Unregistering a listener that holds no key.
    #[error("Removing non-existent listener")]
    UnknownListener,

    /// A stream reader was started twice.
    #[error("Stream {handle} can only be read once")]
    StreamReuse {
        /// Handle of the stream.
        handle: StreamHandle,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// DevTools connection failed.
    ///
    /// Returned when discovery or the WebSocket handshake fails.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// WebSocket connection closed, or the session was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// HTTP discovery request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation.
    ///
    /// Returned when a message does not follow the wire format, such as a
    /// notification without a `method` field.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// A request expected an empty result and got an error or a payload.
    #[error("Unexpected response for {method}: {payload}")]
    UnexpectedResponse {
        /// Method of the request.
        method: String,
        /// The raw response received.
        payload: Value,
    },

    /// A chunk read on a server-side stream failed.
    #[error("Reading stream {handle} failed: {message}")]
    StreamRead {
        /// Handle of the stream.
        handle: StreamHandle,
        /// Error message reported by the server.
        message: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// JavaScript evaluation error.
    ///
    /// Returned when the evaluated expression throws or the call errors.
    #[error("Script error: {message}")]
    Script {
        /// Error message from evaluation.
        message: String,
    },

    /// Operation timeout.
    ///
    /// Raised by the notification pump when nothing arrives in time.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Request timeout.
    ///
    /// Returned when a synchronous request gets no response in time.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a scoped state conflict error.
    #[inline]
    pub fn scoped_state_conflict(method: impl Into<String>) -> Self {
        Self::ScopedStateConflict {
            method: method.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an unexpected response error.
    #[inline]
    pub fn unexpected_response(method: impl Into<String>, payload: Value) -> Self {
        Self::UnexpectedResponse {
            method: method.into(),
            payload,
        }
    }

    /// Creates a stream read error.
    #[inline]
    pub fn stream_read(handle: StreamHandle, message: impl Into<String>) -> Self {
        Self::StreamRead {
            handle,
            message: message.into(),
        }
    }

    /// Creates a script error.
    #[inline]
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::RequestTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::Http(_) | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a protocol error.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. } | Self::UnexpectedResponse { .. } | Self::StreamRead { .. }
        )
    }

    /// Returns `true` if this error reports API misuse by the caller.
    ///
    /// Usage errors are programming mistakes, never runtime conditions.
    #[inline]
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::ScopedStateConflict { .. }
                | Self::UnknownListener
                | Self::StreamReuse { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
