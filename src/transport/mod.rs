//! Transport layer.
//!
//! This module handles communication between the session (Rust) and the
//! DevTools server via WebSocket, plus the HTTP discovery endpoint used to
//! locate and close the debuggable target.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Session (Rust) │          HTTP /json          │  DevTools       │
//! │                 │◄────────────────────────────►│  Server         │
//! │  Discovery      │                              │                 │
//! │  → Transport    │◄────────────────────────────►│  Page target    │
//! │                 │   WebSocket (debugger URL)   │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Transport Contract
//!
//! The session only talks to the [`Transport`] trait:
//!
//! 1. `request` - synchronous request/response
//! 2. `send_and_ignore` - fire-and-forget
//! 3. `send_async` - response delivered later through `dispatch`
//! 4. `register_domain` / `unregister_domain` - notification routing
//! 5. `dispatch` - wait for the next batch, [`Error::Timeout`] on silence
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket transport and event loop |
//! | `discovery` | HTTP target discovery |
//! | `replay` | In-memory scripted transport |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::identifiers::RequestId;
use crate::protocol::{Command, Inbound, Response};

#[cfg(doc)]
use crate::error::Error;

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// HTTP discovery of inspectable targets.
pub mod discovery;

/// Scripted in-memory transport.
pub mod replay;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::WebSocketTransport;
pub use discovery::{DiscoveryClient, TargetDescriptor, select_page_target};
pub use replay::{ReplayTransport, SendMode, SentCommand};

// ============================================================================
// Transport
// ============================================================================

/// Request/notification channel to one DevTools target.
///
/// A transport is exclusively owned by one session.
#[async_trait]
pub trait Transport: Send {
    /// Sends a request and waits for its response.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is gone
    /// - [`Error::RequestTimeout`] if no response arrives in time
    async fn request(&mut self, command: Command) -> Result<Response>;

    /// Sends a request and drops its response.
    async fn send_and_ignore(&mut self, command: Command) -> Result<()>;

    /// Sends a request whose response is later returned by [`Transport::dispatch`].
    async fn send_async(&mut self, command: Command) -> Result<RequestId>;

    /// Routes notifications of `domain` to [`Transport::dispatch`].
    fn register_domain(&mut self, domain: &str);

    /// Stops routing notifications of `domain`.
    fn unregister_domain(&mut self, domain: &str);

    /// Waits for the next batch of inbound messages.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if nothing arrives within `timeout`
    /// - [`Error::ConnectionClosed`] if the connection is gone
    async fn dispatch(&mut self, timeout: Duration) -> Result<Vec<Inbound>>;

    /// Closes the transport. Further calls fail with [`Error::ConnectionClosed`].
    fn shutdown(&mut self);
}
