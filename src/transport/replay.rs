//! Scripted in-memory transport.
//!
//! [`ReplayTransport`] plays a pre-recorded conversation back to a session
//! without a browser: it records every outgoing command, answers requests
//! from scripted results, and serves notification batches in order.
//!
//! # Example
//!
//! ```
//! use devtools_monitor::protocol::Notification;
//! use devtools_monitor::transport::ReplayTransport;
//! use serde_json::json;
//!
//! let transport = ReplayTransport::new()
//!     .with_result("Network.canClearBrowserCache", json!({"result": true}))
//!     .with_batch(vec![Notification::new("Network.dataReceived", json!({})).into()]);
//! assert!(transport.sent().is_empty());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Value, json};
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{Command, Inbound, Response};

use super::Transport;

// ============================================================================
// SentCommand
// ============================================================================

/// How a command was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Synchronous request.
    Sync,
    /// Fire-and-forget.
    Ignore,
    /// Response routed through dispatch.
    Async,
}

/// A command recorded by [`ReplayTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentCommand {
    /// Assigned request id.
    pub id: RequestId,
    /// How it was sent.
    pub mode: SendMode,
    /// The command.
    pub command: Command,
}

impl SentCommand {
    /// Returns the wire method.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        self.command.method()
    }
}

// ============================================================================
// ReplayTransport
// ============================================================================

/// In-memory transport serving scripted responses and notifications.
///
/// Unscripted requests answer with an empty result. When no batch is
/// queued, [`Transport::dispatch`] sleeps for the full timeout and fails
/// with [`Error::Timeout`], like a silent server.
#[derive(Debug, Default)]
pub struct ReplayTransport {
    /// Last assigned request id.
    last_id: u64,
    /// Scripted responses per method, consumed in order.
    results: FxHashMap<String, VecDeque<Response>>,
    /// Batches queued when a method is sent.
    triggers: FxHashMap<String, VecDeque<Vec<Inbound>>>,
    /// Async responses ready for the next dispatch.
    ready: VecDeque<Inbound>,
    /// Notification batches served in order.
    batches: VecDeque<Vec<Inbound>>,
    /// Domains whose notifications are delivered.
    domains: FxHashSet<String>,
    /// Every domain ever registered, in order.
    registrations: Vec<String>,
    /// Outgoing commands, in order.
    sent: Vec<SentCommand>,
    /// Set once shut down.
    closed: bool,
}

// ============================================================================
// ReplayTransport - Scripting
// ============================================================================

impl ReplayTransport {
    /// Creates an empty transport.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next result for `method`.
    #[must_use]
    pub fn with_result(mut self, method: &str, result: Value) -> Self {
        self.push_response(method, Response::success(None, result));
        self
    }

    /// Scripts the next response for `method`, typically an error.
    #[must_use]
    pub fn with_response(mut self, method: &str, response: Response) -> Self {
        self.push_response(method, response);
        self
    }

    /// Queues a notification batch.
    #[must_use]
    pub fn with_batch(mut self, batch: Vec<Inbound>) -> Self {
        self.batches.push_back(batch);
        self
    }

    /// Queues a batch to be served once `method` has been sent.
    #[must_use]
    pub fn with_trigger(mut self, method: &str, batch: Vec<Inbound>) -> Self {
        self.triggers
            .entry(method.to_string())
            .or_default()
            .push_back(batch);
        self
    }

    /// Scripts a response, keyed by method.
    pub fn push_response(&mut self, method: &str, response: Response) {
        self.results
            .entry(method.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queues a notification batch.
    pub fn push_batch(&mut self, batch: Vec<Inbound>) {
        self.batches.push_back(batch);
    }
}

// ============================================================================
// ReplayTransport - Inspection
// ============================================================================

impl ReplayTransport {
    /// Returns every command sent so far.
    #[inline]
    #[must_use]
    pub fn sent(&self) -> &[SentCommand] {
        &self.sent
    }

    /// Returns the methods of every command sent so far.
    #[must_use]
    pub fn methods(&self) -> Vec<&str> {
        self.sent.iter().map(SentCommand::method).collect()
    }

    /// Returns the position of the first command with `method`.
    #[must_use]
    pub fn position(&self, method: &str) -> Option<usize> {
        self.sent.iter().position(|s| s.method() == method)
    }

    /// Returns the number of commands sent with `method`.
    #[must_use]
    pub fn count(&self, method: &str) -> usize {
        self.sent.iter().filter(|s| s.method() == method).count()
    }

    /// Returns the currently routed domains.
    #[inline]
    #[must_use]
    pub fn routed_domains(&self) -> &FxHashSet<String> {
        &self.domains
    }

    /// Returns every domain registration, in order.
    #[inline]
    #[must_use]
    pub fn registrations(&self) -> &[String] {
        &self.registrations
    }

    /// Returns `true` once shut down.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

// ============================================================================
// ReplayTransport - Internals
// ============================================================================

impl ReplayTransport {
    /// Records a command and fires its trigger.
    fn record(&mut self, command: Command, mode: SendMode) -> Result<RequestId> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        self.last_id += 1;
        let id = RequestId::new(self.last_id);
        let method = command.method().to_string();

        trace!(%id, method = %method, ?mode, "Replay request");
        self.sent.push(SentCommand { id, mode, command });

        if let Some(batch) = self.triggers.get_mut(&method).and_then(VecDeque::pop_front) {
            self.batches.push_back(batch);
        }

        Ok(id)
    }

    /// Pops the scripted response for `method`, stamped with `id`.
    fn respond(&mut self, method: &str, id: RequestId) -> Response {
        let mut response = self
            .results
            .get_mut(method)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Response::success(None, json!({})));
        response.id = Some(id);
        response
    }
}

// ============================================================================
// Transport Implementation
// ============================================================================

#[async_trait]
impl Transport for ReplayTransport {
    async fn request(&mut self, command: Command) -> Result<Response> {
        let method = command.method().to_string();
        let id = self.record(command, SendMode::Sync)?;
        Ok(self.respond(&method, id))
    }

    async fn send_and_ignore(&mut self, command: Command) -> Result<()> {
        self.record(command, SendMode::Ignore)?;
        Ok(())
    }

    async fn send_async(&mut self, command: Command) -> Result<RequestId> {
        let method = command.method().to_string();
        let id = self.record(command, SendMode::Async)?;

        // Only scripted async responses are delivered.
        if let Some(mut response) = self.results.get_mut(&method).and_then(VecDeque::pop_front) {
            response.id = Some(id);
            self.ready.push_back(Inbound::Response(response));
        }

        Ok(id)
    }

    fn register_domain(&mut self, domain: &str) {
        self.domains.insert(domain.to_string());
        self.registrations.push(domain.to_string());
    }

    fn unregister_domain(&mut self, domain: &str) {
        self.domains.remove(domain);
    }

    async fn dispatch(&mut self, timeout: Duration) -> Result<Vec<Inbound>> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        let batch = if !self.ready.is_empty() {
            self.ready.drain(..).collect::<Vec<_>>()
        } else if let Some(batch) = self.batches.pop_front() {
            batch
        } else {
            tokio::time::sleep(timeout).await;
            return Err(Error::timeout(
                "dispatch notifications",
                timeout.as_millis() as u64,
            ));
        };

        let domains = &self.domains;
        Ok(batch
            .into_iter()
            .filter(|inbound| inbound.notification_domain().is_none_or(|d| domains.contains(d)))
            .collect())
    }

    fn shutdown(&mut self) {
        self.closed = true;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Notification;

    #[tokio::test]
    async fn test_unscripted_request_returns_empty_result() {
        let mut transport = ReplayTransport::new();
        let response = transport
            .request(Command::enable("Network"))
            .await
            .expect("request");

        assert!(response.is_empty());
        assert_eq!(response.id, Some(RequestId::new(1)));
        assert_eq!(transport.methods(), vec!["Network.enable"]);
    }

    #[tokio::test]
    async fn test_scripted_results_in_order() {
        let mut transport = ReplayTransport::new()
            .with_result("Runtime.evaluate", json!({"first": true}))
            .with_result("Runtime.evaluate", json!({"second": true}));

        let cmd = Command::custom("Runtime.evaluate", None);
        let first = transport.request(cmd.clone()).await.expect("first");
        let second = transport.request(cmd.clone()).await.expect("second");
        let third = transport.request(cmd).await.expect("third");

        assert!(first.get_bool("first"));
        assert!(second.get_bool("second"));
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_filters_unrouted_domains() {
        let mut transport = ReplayTransport::new().with_batch(vec![
            Notification::new("Network.dataReceived", json!({})).into(),
            Notification::new("Page.loadEventFired", json!({})).into(),
        ]);
        transport.register_domain("Page");

        let batch = transport
            .dispatch(Duration::from_secs(1))
            .await
            .expect("batch");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].notification_domain(), Some("Page"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_times_out_when_empty() {
        let mut transport = ReplayTransport::new();
        let err = transport
            .dispatch(Duration::from_secs(2))
            .await
            .expect_err("should time out");
        assert!(matches!(err, Error::Timeout { timeout_ms: 2000, .. }));
    }

    #[tokio::test]
    async fn test_trigger_queues_batch() {
        let mut transport = ReplayTransport::new().with_trigger(
            "Tracing.end",
            vec![Notification::new("Tracing.tracingComplete", json!({})).into()],
        );
        transport.register_domain("Tracing");

        transport
            .request(Command::custom("Tracing.end", None))
            .await
            .expect("request");
        let batch = transport
            .dispatch(Duration::from_secs(1))
            .await
            .expect("batch");
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_requests() {
        let mut transport = ReplayTransport::new();
        transport.shutdown();

        let result = transport.send_and_ignore(Command::enable("Page")).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert!(transport.is_closed());
    }
}
