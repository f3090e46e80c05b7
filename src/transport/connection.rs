//! WebSocket connection and event loop.
//!
//! This module handles the WebSocket connection to a DevTools target,
//! including request/response correlation and notification routing.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming messages from the server (responses, notifications)
//! - Outgoing commands from the session
//! - Request/response correlation by integer id
//! - Forwarding async responses and notifications to [`Transport::dispatch`]

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Value, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{Command, Inbound, Request, Response};

use super::Transport;

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for a synchronous request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 100;

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type WsSink = SplitSink<WsStream, Message>;

/// Map of request IDs to their pending completion.
type CorrelationMap = FxHashMap<RequestId, Pending>;

/// How the response to a request is consumed.
enum Pending {
    /// A caller is waiting on the channel.
    Sync(oneshot::Sender<Result<Response>>),
    /// Forwarded to the inbound queue.
    Async,
    /// Dropped on arrival.
    Ignored,
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a request.
    Send { request: Request, pending: Pending },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(RequestId),
    /// Shutdown the connection.
    Shutdown,
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// WebSocket connection to a DevTools target.
///
/// Handles request/response correlation and notification routing.
/// The connection spawns an internal event loop task, which is shut down
/// when the transport is dropped.
pub struct WebSocketTransport {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Async responses and notifications from the event loop.
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Domains whose notifications are delivered.
    domains: FxHashSet<String>,
    /// Next request id.
    next_id: RequestId,
    /// Timeout for synchronous requests.
    request_timeout: Duration,
    /// Set once shut down.
    closed: bool,
}

impl WebSocketTransport {
    /// Connects to a target's debugger WebSocket URL.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the URL is invalid or the handshake fails
    pub async fn connect(ws_url: &str, request_timeout: Duration) -> Result<Self> {
        let url = Url::parse(ws_url)
            .map_err(|e| Error::connection(format!("Invalid debugger URL {ws_url}: {e}")))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::connection(format!(
                "Debugger URL must use ws:// or wss://, got {ws_url}"
            )));
        }

        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        debug!(url = %url, "WebSocket connected");

        Ok(Self::new(ws_stream, request_timeout))
    }

    /// Creates a transport from an established WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    fn new(ws_stream: WsStream, request_timeout: Duration) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            inbound_tx,
            Arc::clone(&correlation),
        ));

        Self {
            command_tx,
            inbound_rx,
            correlation,
            domains: FxHashSet::default(),
            next_id: RequestId::new(1),
            request_timeout,
            closed: false,
        }
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Allocates the next request id.
    fn allocate_id(&mut self) -> RequestId {
        let id = self.next_id;
        self.next_id = id.next();
        id
    }

    /// Hands a request to the event loop.
    fn submit(&mut self, command: Command, pending: Pending) -> Result<RequestId> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        {
            let correlation = self.correlation.lock();
            if correlation.len() >= MAX_PENDING_REQUESTS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_REQUESTS,
                    "Too many pending requests"
                );
                return Err(Error::protocol(format!(
                    "Too many pending requests: {}/{}",
                    correlation.len(),
                    MAX_PENDING_REQUESTS
                )));
            }
        }

        let id = self.allocate_id();
        let request = Request::new(id, command);

        self.command_tx
            .send(ConnectionCommand::Send { request, pending })
            .map_err(|_| Error::ConnectionClosed)?;

        Ok(id)
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        inbound_tx: mpsc::UnboundedSender<Inbound>,
        correlation: Arc<Mutex<CorrelationMap>>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming messages from the server
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, &correlation, &inbound_tx);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the session
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { request, pending }) => {
                            Self::handle_send_command(
                                request,
                                pending,
                                &mut ws_write,
                                &correlation,
                            ).await;
                        }

                        Some(ConnectionCommand::RemoveCorrelation(request_id)) => {
                            correlation.lock().remove(&request_id);
                            debug!(%request_id, "Removed timed-out correlation");
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        // Fail all pending requests on shutdown
        Self::fail_pending_requests(&correlation);

        debug!("Event loop terminated");
    }

    /// Handles an incoming text message from the server.
    fn handle_incoming_message(
        text: &str,
        correlation: &Arc<Mutex<CorrelationMap>>,
        inbound_tx: &mpsc::UnboundedSender<Inbound>,
    ) {
        let inbound = match Inbound::parse(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, "Failed to parse incoming message");
                Inbound::Malformed(Value::String(text.to_string()))
            }
        };

        let response = match inbound {
            Inbound::Response(response) => response,
            other => {
                let _ = inbound_tx.send(other);
                return;
            }
        };

        let pending = response.id.and_then(|id| correlation.lock().remove(&id));

        match pending {
            Some(Pending::Sync(tx)) => {
                let _ = tx.send(Ok(response));
            }
            Some(Pending::Async) => {
                let _ = inbound_tx.send(Inbound::Response(response));
            }
            Some(Pending::Ignored) => {
                trace!(id = ?response.id, "Dropped ignored response");
            }
            None => {
                warn!(id = ?response.id, "Response for unknown request");
            }
        }
    }

    /// Handles a send command from the session.
    async fn handle_send_command(
        request: Request,
        pending: Pending,
        ws_write: &mut WsSink,
        correlation: &Arc<Mutex<CorrelationMap>>,
    ) {
        let request_id = request.id;

        // Serialize request
        let json = match to_string(&request) {
            Ok(j) => j,
            Err(e) => {
                if let Pending::Sync(tx) = pending {
                    let _ = tx.send(Err(Error::Json(e)));
                }
                return;
            }
        };

        // Store correlation before sending
        correlation.lock().insert(request_id, pending);

        // Send over WebSocket
        if let Err(e) = ws_write.send(Message::Text(json.into())).await
            && let Some(Pending::Sync(tx)) = correlation.lock().remove(&request_id)
        {
            let _ = tx.send(Err(Error::connection(e.to_string())));
        }

        trace!(%request_id, method = request.command.method(), "Request sent");
    }

    /// Fails all pending requests with ConnectionClosed error.
    fn fail_pending_requests(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, pending) in pending {
            if let Pending::Sync(tx) = pending {
                let _ = tx.send(Err(Error::ConnectionClosed));
            }
        }

        if count > 0 {
            debug!(count, "Failed pending requests on shutdown");
        }
    }
}

// ============================================================================
// Transport Implementation
// ============================================================================

#[async_trait]
impl Transport for WebSocketTransport {
    async fn request(&mut self, command: Command) -> Result<Response> {
        let (response_tx, response_rx) = oneshot::channel();
        let request_id = self.submit(command, Pending::Sync(response_tx))?;

        match timeout(self.request_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // Timeout - clean up correlation entry
                let _ = self
                    .command_tx
                    .send(ConnectionCommand::RemoveCorrelation(request_id));

                Err(Error::request_timeout(
                    request_id,
                    self.request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    async fn send_and_ignore(&mut self, command: Command) -> Result<()> {
        self.submit(command, Pending::Ignored)?;
        Ok(())
    }

    async fn send_async(&mut self, command: Command) -> Result<RequestId> {
        self.submit(command, Pending::Async)
    }

    fn register_domain(&mut self, domain: &str) {
        self.domains.insert(domain.to_string());
    }

    fn unregister_domain(&mut self, domain: &str) {
        self.domains.remove(domain);
    }

    async fn dispatch(&mut self, wait: Duration) -> Result<Vec<Inbound>> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        let first = match timeout(wait, self.inbound_rx.recv()).await {
            Ok(Some(inbound)) => inbound,
            Ok(None) => return Err(Error::ConnectionClosed),
            Err(_) => {
                return Err(Error::timeout(
                    "dispatch notifications",
                    wait.as_millis() as u64,
                ));
            }
        };

        let mut batch = vec![first];
        while let Ok(inbound) = self.inbound_rx.try_recv() {
            batch.push(inbound);
        }

        // Notifications of unrouted domains are dropped here so that
        // unregistering takes effect for already-queued messages too.
        batch.retain(|inbound| match inbound.notification_domain() {
            Some(domain) => self.domains.contains(domain),
            None => true,
        });

        Ok(batch)
    }

    fn shutdown(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.command_tx.send(ConnectionCommand::Shutdown);
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::net::TcpListener;

    use crate::session::{NotificationRecorder, Session, SessionOptions, shared};

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_REQUEST_TIMEOUT.as_secs(), 30);
        assert_eq!(MAX_PENDING_REQUESTS, 100);
    }

    #[test]
    fn test_sync_response_is_correlated() {
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = oneshot::channel();
        correlation.lock().insert(RequestId::new(1), Pending::Sync(tx));

        WebSocketTransport::handle_incoming_message(
            r#"{"id": 1, "result": {"ok": true}}"#,
            &correlation,
            &inbound_tx,
        );

        let response = rx.try_recv().expect("response delivered").expect("success");
        assert_eq!(response.result, Some(json!({"ok": true})));
        assert!(inbound_rx.try_recv().is_err());
        assert!(correlation.lock().is_empty());
    }

    #[test]
    fn test_async_response_is_forwarded() {
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        correlation.lock().insert(RequestId::new(2), Pending::Async);

        WebSocketTransport::handle_incoming_message(
            r#"{"id": 2, "result": {"data": "ab", "eof": false}}"#,
            &correlation,
            &inbound_tx,
        );

        match inbound_rx.try_recv().expect("forwarded") {
            Inbound::Response(r) => assert_eq!(r.id, Some(RequestId::new(2))),
            other => panic!("Expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_ignored_response_is_dropped() {
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        correlation.lock().insert(RequestId::new(3), Pending::Ignored);

        WebSocketTransport::handle_incoming_message(r#"{"id": 3, "result": {}}"#, &correlation, &inbound_tx);

        assert!(inbound_rx.try_recv().is_err());
        assert!(correlation.lock().is_empty());
    }

    #[test]
    fn test_notification_and_garbage_are_forwarded() {
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();

        WebSocketTransport::handle_incoming_message(
            r#"{"method": "Network.dataReceived", "params": {}}"#,
            &correlation,
            &inbound_tx,
        );
        WebSocketTransport::handle_incoming_message("garbage", &correlation, &inbound_tx);

        assert!(matches!(inbound_rx.try_recv(), Ok(Inbound::Notification(_))));
        assert!(matches!(inbound_rx.try_recv(), Ok(Inbound::Malformed(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_http_url() {
        let result = WebSocketTransport::connect("http://127.0.0.1:9222", DEFAULT_REQUEST_TIMEOUT).await;
        assert!(matches!(result, Err(Error::Connection { .. })));
    }

    // ------------------------------------------------------------------------
    // Loopback endpoint
    // ------------------------------------------------------------------------

    type MethodLog = Arc<Mutex<Vec<String>>>;

    fn ack(id: &Value) -> Value {
        json!({"id": id, "result": {}})
    }

    /// Serves one client on a loopback port. Each request is logged by
    /// method and answered with the frames `reply` returns, in order.
    async fn spawn_endpoint<F>(mut reply: F) -> (String, MethodLog)
    where
        F: FnMut(&str, &Value) -> Vec<Value> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let ws_url = format!("ws://{}", listener.local_addr().expect("local addr"));
        let log = MethodLog::default();
        let methods = Arc::clone(&log);

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("websocket upgrade");

            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let request: Value = serde_json::from_str(&text).expect("request json");
                let method = request["method"].as_str().unwrap_or_default().to_string();
                methods.lock().push(method.clone());

                for frame in reply(&method, &request["id"]) {
                    if ws.send(Message::Text(frame.to_string().into())).await.is_err() {
                        return;
                    }
                }
            }
        });

        (ws_url, log)
    }

    #[tokio::test]
    async fn test_dispatch_drops_unrouted_domains() {
        let (ws_url, _) = spawn_endpoint(|method, id| match method {
            "Test.emit" => vec![
                json!({"method": "Page.frameNavigated", "params": {}}),
                json!({"method": "Network.requestWillBeSent", "params": {"requestId": "1"}}),
                ack(id),
            ],
            _ => vec![ack(id)],
        })
        .await;

        let mut transport = WebSocketTransport::connect(&ws_url, DEFAULT_REQUEST_TIMEOUT)
            .await
            .expect("connect");
        transport.register_domain("Network");

        transport
            .request(Command::custom("Test.emit", None))
            .await
            .expect("emit");
        let batch = transport
            .dispatch(Duration::from_secs(1))
            .await
            .expect("dispatch");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].notification_domain(), Some("Network"));

        transport.unregister_domain("Network");
        transport
            .request(Command::custom("Test.emit", None))
            .await
            .expect("emit");
        let batch = transport
            .dispatch(Duration::from_secs(1))
            .await
            .expect("dispatch");
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_async_response_reaches_dispatch() {
        let (ws_url, _) = spawn_endpoint(|method, id| match method {
            "IO.read" => vec![json!({"id": id, "result": {"data": "chunk", "eof": true}})],
            _ => vec![ack(id)],
        })
        .await;

        let mut transport = WebSocketTransport::connect(&ws_url, DEFAULT_REQUEST_TIMEOUT)
            .await
            .expect("connect");

        let id = transport
            .send_async(Command::custom("IO.read", Some(json!({"handle": "h"}))))
            .await
            .expect("send");
        let batch = transport
            .dispatch(Duration::from_secs(1))
            .await
            .expect("dispatch");

        match batch.as_slice() {
            [Inbound::Response(response)] => {
                assert_eq!(response.id, Some(id));
                assert_eq!(response.result, Some(json!({"data": "chunk", "eof": true})));
            }
            other => panic!("Expected one response, got {other:?}"),
        }

        transport
            .send_and_ignore(Command::custom("Page.navigate", Some(json!({"url": "about:blank"}))))
            .await
            .expect("send");
        let err = transport
            .dispatch(Duration::from_millis(200))
            .await
            .expect_err("ignored response is not dispatched");
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let (ws_url, log) = spawn_endpoint(|method, id| match method {
            "Test.hang" => Vec::new(),
            _ => vec![ack(id)],
        })
        .await;

        let mut transport = WebSocketTransport::connect(&ws_url, Duration::from_millis(100))
            .await
            .expect("connect");

        let err = transport
            .request(Command::custom("Test.hang", None))
            .await
            .expect_err("no answer");
        assert!(matches!(err, Error::RequestTimeout { .. }));

        transport
            .request(Command::custom("Test.ping", None))
            .await
            .expect("transport still usable");
        assert_eq!(transport.pending_count(), 0);
        assert_eq!(*log.lock(), vec!["Test.hang", "Test.ping"]);
    }

    #[tokio::test]
    async fn test_monitor_url_over_websocket() {
        let mut reads = 0usize;
        let (ws_url, log) = spawn_endpoint(move |method, id| match method {
            "Page.navigate" => vec![
                json!({"id": id, "result": {"frameId": "F1"}}),
                json!({"method": "Page.frameNavigated", "params": {}}),
                json!({"method": "Network.requestWillBeSent", "params": {"requestId": "1"}}),
            ],
            "Tracing.end" => vec![
                ack(id),
                json!({"method": "Tracing.tracingComplete", "params": {"stream": "trace-1"}}),
            ],
            "IO.read" => {
                let (data, eof) = match reads {
                    0 => (r#"[{"a":1},"#, false),
                    1 => (r#"{"b":2}]"#, true),
                    _ => ("", true),
                };
                reads += 1;
                vec![json!({"id": id, "result": {"data": data, "eof": eof}})]
            }
            _ => vec![ack(id)],
        })
        .await;

        let transport = WebSocketTransport::connect(&ws_url, DEFAULT_REQUEST_TIMEOUT)
            .await
            .expect("connect");
        let options = SessionOptions::default().with_tracing_timeout(Duration::from_secs(5));
        let mut session = Session::with_transport(transport, options);

        let network = shared(NotificationRecorder::new());
        let trace = shared(NotificationRecorder::new());
        session.register_listener("Network", network.clone());
        session.register_listener("Tracing", trace.clone());

        session
            .monitor_url("http://example.test", Some(Duration::from_millis(300)))
            .await
            .expect("monitor");

        assert_eq!(
            *log.lock(),
            vec![
                "Network.enable",
                "Page.navigate",
                "Tracing.end",
                "IO.read",
                "IO.read",
                "IO.read",
                "IO.close",
                "Network.disable",
            ]
        );
        assert_eq!(network.lock().methods(), vec!["Network.requestWillBeSent"]);

        let trace = trace.lock();
        let params: Vec<&Value> = trace.notifications().iter().map(|n| &n.params).collect();
        assert_eq!(
            params,
            vec![&json!({"value": [{"a": 1}]}), &json!({"value": [{"b": 2}]})]
        );
    }
}
