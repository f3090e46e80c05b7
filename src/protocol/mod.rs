//! DevTools protocol message types.
//!
//! This module defines the JSON-RPC message format spoken over the
//! DevTools WebSocket.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Local → Remote | Command request |
//! | `Response` | Remote → Local | Command result or error |
//! | `Notification` | Remote → Local | Domain event |
//!
//! # Method Naming
//!
//! Methods and events follow `Domain.member` format:
//!
//! - `Page.navigate`
//! - `Network.requestWillBeSent`
//! - `Tracing.tracingComplete`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command definitions by domain |
//! | `event` | Notification and inbound classification |
//! | `request` | Request and Response types |

// ============================================================================
// Submodules
// ============================================================================

/// Command definitions organized by domain.
pub mod command;

/// Notification and inbound message types.
pub mod event;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{
    Command, CustomCommand, IoCommand, NetworkCommand, PageCommand, RuntimeCommand,
    TracingCommand,
};
pub use event::{Inbound, Notification, domain_of};
pub use request::{ProtocolFault, Request, Response, is_truthy};
