//! DevTools monitor - DevTools protocol session manager.
//!
//! This library drives a DevTools protocol target through monitoring
//! passes: it enables the domains its listeners care about, applies scoped
//! state, navigates, routes notifications to listeners until stopped or
//! silent, and drains a streamed trace when tracing is active.
//!
//! # Architecture
//!
//! - **Discovery (HTTP)**: `/json/list` locates the page target, `/json/close` closes it
//! - **Transport (WebSocket)**: request/response correlation and notification routing
//! - **Session**: owns listeners, scoped state and the enable set of one target
//!
//! Key design principles:
//!
//! - One [`Session`] owns one transport; no state is shared between sessions
//! - Protocol uses `Domain.method` format
//! - A dispatch timeout ends monitoring; it is not an error
//! - Teardown always runs, best effort
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use devtools_monitor::{NotificationRecorder, Result, Session, shared};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut session = Session::builder()
//!         .host("127.0.0.1")
//!         .port(9222)
//!         .connect()
//!         .await?;
//!
//!     // Stop as soon as the page has loaded
//!     let page = shared(
//!         NotificationRecorder::new().stop_on("Page.loadEventFired", session.stop_handle()),
//!     );
//!     session.register_listener("Page", page.clone());
//!
//!     session
//!         .monitor_url("https://example.com", Some(Duration::from_secs(30)))
//!         .await?;
//!
//!     println!("{:?}", page.lock().methods());
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session`] | [`Session`], listeners, scoped state, stream reader |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Command, response and notification types |
//! | [`transport`] | Transport trait, websocket and replay transports, discovery |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing request ids, targets and stream handles.
pub mod identifiers;

/// DevTools protocol message types.
pub mod protocol;

/// Session dispatcher, listeners and configuration.
///
/// Use [`Session::builder()`] to connect a session.
pub mod session;

/// Transport layer.
///
/// The [`transport::Transport`] trait and its websocket and replay
/// implementations, plus HTTP target discovery.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Session types
pub use session::{
    Listener, NotificationRecorder, ScopedState, Session, SessionBuilder, SessionOptions,
    SessionPhase, SharedListener, StopHandle, Track, shared,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{RequestId, StreamHandle, TargetId};

// Transport types
pub use transport::{ReplayTransport, Transport, WebSocketTransport};
