//! Session dispatcher.
//!
//! A [`Session`] owns one transport, the listener registry, the set of
//! domains to enable and the scoped state table. [`Session::monitor_url`]
//! drives one monitoring pass through these phases:
//!
//! ```text
//! Idle ─► Enabling ─► Monitoring ─► TracingTeardown ─► Disabling ─► Idle
//!                          │                               ▲
//!                          └───────── (no Tracing) ────────┘
//! ```
//!
//! Registries and the enable set are cleared once the pass ends, so the
//! session can be reused for the next URL.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::StreamHandle;
use crate::protocol::{
    Command, Inbound, NetworkCommand, Notification, PageCommand, Response, TracingCommand,
};
use crate::transport::{
    DiscoveryClient, TargetDescriptor, Transport, WebSocketTransport, select_page_target,
};

use super::builder::SessionBuilder;
use super::listener::{Listener, SharedListener, StopHandle};
use super::options::SessionOptions;
use super::registry::ListenerRegistry;
use super::scoped::{ScopedState, ScopedStateTable};
use super::stream::{ChunkOutcome, StreamReader};

// ============================================================================
// Constants
// ============================================================================

/// Domain enabled by the caller through `Tracing.start`, never generically.
pub const TRACING_DOMAIN: &str = "Tracing";

/// Event carrying one batch of trace data.
pub const TRACING_DATA_METHOD: &str = "Tracing.dataCollected";

/// Event signalling that a trace was flushed.
pub const TRACING_DONE_EVENT: &str = "Tracing.tracingComplete";

/// Event carrying the stream handle of a streamed trace.
///
/// Same key as [`TRACING_DONE_EVENT`].
pub const TRACING_STREAM_EVENT: &str = TRACING_DONE_EVENT;

// ============================================================================
// SessionPhase
// ============================================================================

/// Phase of a monitoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No pass in progress.
    #[default]
    Idle,
    /// Enabling domains and applying scoped state.
    Enabling,
    /// Navigated; dispatching notifications.
    Monitoring,
    /// Ending the trace and draining its data.
    TracingTeardown,
    /// Restoring scoped state and disabling domains.
    Disabling,
}

// ============================================================================
// Session
// ============================================================================

/// A DevTools session bound to one page target.
///
/// Generic over its [`Transport`]; [`Session::connect`] builds one over a
/// websocket, [`Session::with_transport`] accepts any other.
pub struct Session<T: Transport = WebSocketTransport> {
    options: SessionOptions,
    target: Option<TargetDescriptor>,
    discovery: Option<DiscoveryClient>,
    /// `None` once closed.
    transport: Option<T>,
    listeners: ListenerRegistry,
    scoped_states: ScopedStateTable,
    /// Domains enabled for the next pass, sorted for a stable wire order.
    domains: BTreeSet<String>,
    phase: SessionPhase,
    /// Set while the trace is being drained.
    tearing_down_tracing: bool,
    stop: StopHandle,
    /// Reader of the streamed trace, kept until teardown so late chunks are recognized.
    stream: Option<StreamReader>,
}

impl<T: Transport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target.as_ref().map(|t| &t.id))
            .field("phase", &self.phase)
            .field("domains", &self.domains)
            .field("listeners", &self.listeners.len())
            .field("scoped_states", &self.scoped_states.len())
            .field("tearing_down_tracing", &self.tearing_down_tracing)
            .field("closed", &self.transport.is_none())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session - Bootstrap
// ============================================================================

impl Session<WebSocketTransport> {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Discovers the page target and opens its websocket.
    ///
    /// The first `page` target is used; it must still be at
    /// [`SessionOptions::blank_url`].
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `options` are invalid
    /// - [`Error::Connection`] if discovery fails or no suitable target exists
    /// - [`Error::WebSocket`] if the websocket cannot be opened
    pub async fn connect(options: SessionOptions) -> Result<Self> {
        options.validate()?;

        let discovery = DiscoveryClient::new(&options.host, options.port)?;
        let targets = discovery.list_targets().await?;
        let target = select_page_target(targets, &options.blank_url)?;

        let ws_url = target
            .web_socket_debugger_url
            .clone()
            .ok_or_else(|| Error::connection("Target has no webSocketDebuggerUrl"))?;

        let transport = WebSocketTransport::connect(&ws_url, options.request_timeout).await?;

        info!(target_id = %target.id, ws_url = %ws_url, "Connected to DevTools target");

        let mut session = Self::with_transport(transport, options);
        session.target = Some(target);
        session.discovery = Some(discovery);
        Ok(session)
    }
}

impl<T: Transport> Session<T> {
    /// Creates a session over an already connected transport.
    #[must_use]
    pub fn with_transport(transport: T, options: SessionOptions) -> Self {
        Self {
            options,
            target: None,
            discovery: None,
            transport: Some(transport),
            listeners: ListenerRegistry::default(),
            scoped_states: ScopedStateTable::default(),
            domains: BTreeSet::new(),
            phase: SessionPhase::Idle,
            tearing_down_tracing: false,
            stop: StopHandle::default(),
            stream: None,
        }
    }
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl<T: Transport> Session<T> {
    /// Returns the session options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Returns the discovered target, if bootstrapped through discovery.
    #[inline]
    #[must_use]
    pub fn target(&self) -> Option<&TargetDescriptor> {
        self.target.as_ref()
    }

    /// Returns the transport, or `None` once closed.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Returns the current phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Returns the domains the next pass enables, sorted.
    pub fn enabled_domains(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(String::as_str)
    }

    /// Returns the number of registered listener keys.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Returns the scoped state registered for `method`.
    #[inline]
    #[must_use]
    pub fn scoped_state(&self, method: &str) -> Option<&ScopedState> {
        self.scoped_states.get(method)
    }

    /// Returns a handle listeners can use to stop monitoring.
    #[inline]
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Returns `true` if the session was closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    /// Returns the open transport.
    pub(crate) fn transport_mut(&mut self) -> Result<&mut T> {
        self.transport.as_mut().ok_or(Error::ConnectionClosed)
    }
}

// ============================================================================
// Session - Registration
// ============================================================================

impl<T: Transport> Session<T> {
    /// Registers a listener for an event (`Domain.event`) or a whole domain.
    ///
    /// The owning domain is enabled on the next [`Session::monitor_url`].
    pub fn register_listener(&mut self, name: &str, listener: SharedListener) {
        let domain = self.listeners.register(name, listener);
        debug!(name, domain = %domain, "Listener registered");
        self.domains.insert(domain);
    }

    /// Removes every registration of `listener`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownListener`] if it holds no registration.
    pub fn unregister_listener<L: Listener + ?Sized>(&mut self, listener: &Arc<Mutex<L>>) -> Result<()> {
        self.listeners.unregister(listener)
    }

    /// Registers state applied for the duration of the next pass.
    ///
    /// `method` is called with `params` once domains are enabled and with
    /// `default_params` during teardown. With `enable_domain`, the method's
    /// domain is enabled as well.
    ///
    /// # Errors
    ///
    /// - [`Error::ScopedStateConflict`] if `method` is registered with other params
    /// - [`Error::Config`] if `enable_domain` is set and `method` has an empty domain
    pub fn set_scoped_state(
        &mut self,
        method: &str,
        params: Value,
        default_params: Value,
        enable_domain: bool,
    ) -> Result<()> {
        let domain = match method.split_once('.') {
            Some(("", _)) if enable_domain => {
                return Err(Error::config(format!("No valid domain in {method}")));
            }
            Some((domain, _)) if enable_domain => Some(domain),
            _ => None,
        };

        self.scoped_states.insert(
            method,
            ScopedState {
                params,
                default_params,
            },
        )?;

        if let Some(domain) = domain {
            self.domains.insert(domain.to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Session - Requests
// ============================================================================

impl<T: Transport> Session<T> {
    /// Sends a request and waits for its response.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the session was closed
    /// - [`Error::RequestTimeout`] if no response arrives in time
    pub async fn sync_request(&mut self, method: &str, params: Option<Value>) -> Result<Response> {
        self.send_command(Command::custom(method, params)).await
    }

    /// Sends a request without waiting for its response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the session was closed.
    pub async fn send_and_ignore_response(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        self.transport_mut()?
            .send_and_ignore(Command::custom(method, params))
            .await
    }

    /// Sends a request whose response must carry no error and no result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedResponse`] with the method and the full
    /// response otherwise.
    pub async fn sync_request_no_response(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        self.send_command_no_response(Command::custom(method, params))
            .await
    }

    /// Clears the browser cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the browser cannot clear its cache.
    pub async fn clear_cache(&mut self) -> Result<()> {
        let response = self
            .send_command(Command::Network(NetworkCommand::CanClearBrowserCache))
            .await?;

        if !response.get_bool("result") {
            return Err(Error::protocol("Cache clearing is not supported by this browser"));
        }

        self.send_command(Command::Network(NetworkCommand::ClearBrowserCache))
            .await?
            .into_result()?;

        debug!("Browser cache cleared");
        Ok(())
    }

    /// Sends a typed command and waits for its response.
    pub(crate) async fn send_command(&mut self, command: Command) -> Result<Response> {
        self.transport_mut()?.request(command).await
    }

    async fn send_command_no_response(&mut self, command: Command) -> Result<()> {
        let method = command.method().to_string();
        let response = self.send_command(command).await?;

        if !response.is_empty() {
            return Err(Error::unexpected_response(method, response.to_value()));
        }

        Ok(())
    }
}

// ============================================================================
// Session - Monitoring
// ============================================================================

impl<T: Transport> Session<T> {
    /// Navigates to `url` and dispatches notifications to listeners.
    ///
    /// Returns once a listener stops monitoring or nothing arrives for
    /// `timeout` (defaults to [`SessionOptions::monitor_timeout`]). If the
    /// `Tracing` domain is enabled, the trace is then ended and drained.
    /// Teardown always runs; listeners, scoped state and the enable set
    /// are cleared afterwards.
    ///
    /// # Errors
    ///
    /// - [`Error::UnexpectedResponse`] if an enable or scoped state call returns data
    /// - [`Error::Protocol`] on a malformed notification
    /// - [`Error::StreamRead`] if the trace stream cannot be read
    /// - transport errors
    ///
    /// Teardown has run when an error is returned.
    pub async fn monitor_url(&mut self, url: &str, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or(self.options.monitor_timeout);
        info!(url, timeout_ms = timeout.as_millis() as u64, "Monitoring");
        if self.listeners.is_empty() {
            debug!("Monitoring without listeners");
        }

        let monitoring = self.start_monitoring(url, timeout).await;
        if let Err(e) = &monitoring {
            warn!(error = %e, "Monitoring failed, tearing down");
        }

        let teardown = self.tear_down_monitoring(monitoring.is_ok()).await;
        monitoring.and(teardown)
    }

    /// Requests the dispatch loop to stop after the current batch.
    #[inline]
    pub fn stop_monitoring(&self) {
        self.stop.stop();
    }

    async fn start_monitoring(&mut self, url: &str, timeout: Duration) -> Result<()> {
        self.phase = SessionPhase::Enabling;

        let domains: Vec<String> = self.domains.iter().cloned().collect();
        for domain in &domains {
            self.transport_mut()?.register_domain(domain);
            if domain != TRACING_DOMAIN {
                debug!(domain = %domain, "Enabling domain");
                self.send_command_no_response(Command::enable(domain)).await?;
            }
        }

        for (method, params) in self.scoped_states.activations() {
            debug!(method = %method, "Applying scoped state");
            self.send_command_no_response(Command::custom(method, Some(params)))
                .await?;
        }

        self.tearing_down_tracing = false;
        self.phase = SessionPhase::Monitoring;

        self.transport_mut()?
            .send_and_ignore(Command::Page(PageCommand::Navigate {
                url: url.to_string(),
            }))
            .await?;

        self.dispatch(timeout, "Monitoring").await
    }

    /// Ends the pass. The trace is drained only after a clean exit.
    async fn tear_down_monitoring(&mut self, drain_tracing: bool) -> Result<()> {
        let mut outcome = Ok(());

        if self.domains.contains(TRACING_DOMAIN) {
            info!("Fetching tracing");
            self.phase = SessionPhase::TracingTeardown;

            match self
                .send_command_no_response(Command::Tracing(TracingCommand::End))
                .await
            {
                Ok(()) if drain_tracing => {
                    self.tearing_down_tracing = true;
                    let tracing_timeout = self.options.tracing_timeout;
                    outcome = self.dispatch(tracing_timeout, "Tracing").await;
                }
                Ok(()) => debug!("Skipping trace drain after failed monitoring"),
                Err(e) => warn!(error = %e, "Failed to end tracing"),
            }
        }

        self.phase = SessionPhase::Disabling;

        for (method, default_params) in self.scoped_states.restorations() {
            if let Err(e) = self
                .send_command_no_response(Command::custom(method.clone(), Some(default_params)))
                .await
            {
                warn!(method = %method, error = %e, "Failed to restore scoped state");
            }
        }

        let domains = std::mem::take(&mut self.domains);
        for domain in &domains {
            if domain != TRACING_DOMAIN
                && let Err(e) = self.send_command(Command::disable(domain)).await
            {
                warn!(domain = %domain, error = %e, "Failed to disable domain");
            }
            if let Some(transport) = self.transport.as_mut() {
                transport.unregister_domain(domain);
            }
        }

        self.listeners.clear();
        self.scoped_states.clear();
        self.stream = None;
        self.tearing_down_tracing = false;
        self.phase = SessionPhase::Idle;

        debug!("Monitoring torn down");
        outcome
    }

    /// Pumps batches until stopped or silent for `timeout`.
    async fn dispatch(&mut self, timeout: Duration, kind: &str) -> Result<()> {
        self.stop.reset();

        while !self.stop.is_stopped() {
            let batch = match self.transport_mut()?.dispatch(timeout).await {
                Ok(batch) => batch,
                Err(Error::Timeout { .. }) => {
                    warn!(timeout_ms = timeout.as_millis() as u64, "{kind} stopped on a timeout.");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            for inbound in batch {
                self.on_inbound(inbound).await?;
            }
        }

        debug!("{kind} stopped");
        Ok(())
    }

    async fn on_inbound(&mut self, inbound: Inbound) -> Result<()> {
        match inbound {
            Inbound::Notification(notification) => self.on_notification(notification).await,
            Inbound::Response(response) => self.on_response(response).await,
            Inbound::Malformed(value) => Err(Error::protocol(format!("Malformed message: {value}"))),
        }
    }

    async fn on_notification(&mut self, notification: Notification) -> Result<()> {
        if self.tearing_down_tracing && notification.method == TRACING_STREAM_EVENT {
            match notification.param_str("stream") {
                Some(handle) => {
                    let handle = StreamHandle::new(handle);
                    return self.start_stream(handle).await;
                }
                None => {
                    debug!("Trace complete without stream");
                    self.tearing_down_tracing = false;
                    self.stop_monitoring();
                }
            }
        }

        self.route_notification(&notification);
        Ok(())
    }

    /// Delivers to listeners, then checks for the end of the trace.
    fn route_notification(&mut self, notification: &Notification) {
        self.listeners.deliver(notification);

        if self.tearing_down_tracing && notification.method == TRACING_DONE_EVENT {
            self.tearing_down_tracing = false;
            self.stop_monitoring();
        }
    }

    async fn start_stream(&mut self, handle: StreamHandle) -> Result<()> {
        if self.stream.as_ref().is_some_and(|s| !s.is_completed()) {
            warn!(handle = %handle, "Replacing unfinished trace stream");
        }

        let mut reader = StreamReader::new(handle, self.options.stream_chunk_size);
        let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        reader.read(transport).await?;

        self.stream = Some(reader);
        Ok(())
    }

    async fn on_response(&mut self, response: Response) -> Result<()> {
        let Some(id) = response.id else {
            warn!("Dropping response without id");
            return Ok(());
        };

        let Some(reader) = self.stream.as_mut().filter(|r| r.owns(id)) else {
            trace!(%id, "Dropping response of unknown request");
            return Ok(());
        };
        let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;

        let outcome = reader.on_chunk(response, transport).await?;
        match outcome {
            ChunkOutcome::Completed(payload) => self.on_tracing_stream_done(&payload),
            ChunkOutcome::Pending | ChunkOutcome::Discarded => Ok(()),
        }
    }

    /// Re-dispatches each streamed trace event as `Tracing.dataCollected`.
    fn on_tracing_stream_done(&mut self, payload: &str) -> Result<()> {
        let trace: Value = serde_json::from_str(payload)?;

        let events = match trace {
            Value::Array(events) => events,
            Value::Object(mut object) => match object.remove("traceEvents") {
                Some(Value::Array(events)) => events,
                _ => return Err(Error::protocol("Trace object has no traceEvents array")),
            },
            other => {
                return Err(Error::protocol(format!("Unexpected trace payload: {other}")));
            }
        };

        debug!(count = events.len(), "Dispatching streamed trace events");

        for event in events {
            let notification = Notification::new(TRACING_DATA_METHOD, json!({ "value": [event] }));
            self.route_notification(&notification);
            if self.stop.is_stopped() {
                break;
            }
        }

        self.tearing_down_tracing = false;
        self.stop_monitoring();
        Ok(())
    }
}

// ============================================================================
// Session - Lifecycle
// ============================================================================

impl<T: Transport> Session<T> {
    /// Closes the target and shuts the transport down.
    ///
    /// Later calls fail with [`Error::ConnectionClosed`].
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if already closed
    /// - [`Error::Connection`] if the target refuses to close
    pub async fn close(&mut self) -> Result<()> {
        if self.transport.is_none() {
            return Err(Error::ConnectionClosed);
        }

        if let (Some(discovery), Some(target)) = (&self.discovery, &self.target) {
            discovery.close_target(&target.id).await?;
        }

        if let Some(mut transport) = self.transport.take() {
            transport.shutdown();
        }

        info!("Session closed");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
