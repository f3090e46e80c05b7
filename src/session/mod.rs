//! Session module.
//!
//! A [`Session`] drives monitoring passes over one DevTools target.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Session`] | Dispatcher: enables domains, navigates, routes notifications |
//! | [`SessionBuilder`] | Fluent configuration builder |
//! | [`SessionOptions`] | Hosts, timeouts and chunk size |
//! | [`Listener`] | Receives routed notifications |
//! | [`StreamReader`] | Reassembles `IO.read` chunks |
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use devtools_monitor::{NotificationRecorder, Result, Session, shared};
//!
//! # async fn example() -> Result<()> {
//! let mut session = Session::builder().port(9222).connect().await?;
//!
//! let network = shared(NotificationRecorder::new());
//! session.register_listener("Network", network.clone());
//! session
//!     .monitor_url("https://example.com", Some(Duration::from_secs(5)))
//!     .await?;
//!
//! println!("{} network events", network.lock().notifications().len());
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for session configuration.
pub mod builder;

/// Session dispatcher and bootstrap.
pub mod core;

/// Listener capability, recorder and stop control.
pub mod listener;

/// Session options.
pub mod options;

/// Event and domain listener maps.
pub(crate) mod registry;

/// Scoped state table.
pub mod scoped;

/// JavaScript evaluation.
mod script;

/// Chunked stream reader.
pub mod stream;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SessionBuilder;
pub use core::{
    Session, SessionPhase, TRACING_DATA_METHOD, TRACING_DOMAIN, TRACING_DONE_EVENT,
    TRACING_STREAM_EVENT,
};
pub use listener::{Listener, NotificationRecorder, SharedListener, StopHandle, Track, shared};
pub use options::SessionOptions;
pub use scoped::ScopedState;
pub use stream::{ChunkOutcome, StreamReader};
