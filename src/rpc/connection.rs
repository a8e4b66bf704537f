//! Connection and query engine.
//!
//! A `Connection` owns one transport and a background receive task. Any
//! number of tasks may call [`Connection::query`] concurrently; each waits on
//! its own correlation slot while the receive task routes inbound frames:
//!
//! ```text
//! caller ──query──► encode ──► PendingRequests::register ──► TransportWriter
//!                                                                │
//! receive task ◄── TransportReader ◄─────────────────────────────┘
//!     │
//!     ├─ Response ──► PendingRequests::resolve ──► caller wakes
//!     ├─ Event ─────► event queue ──► Connection::event_loop
//!     └─ Malformed ─► warn! and drop
//! ```
//!
//! The connection never reconnects on its own. Once the transport closes it
//! stays `Disconnected`; build a new `Connection` to continue.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::rpc::codec::{self, Envelope, Event, RequestId, Response};
use crate::rpc::error::RpcError;
use crate::rpc::pending::PendingRequests;
use crate::rpc::transport::{self, Received, TransportReader, TransportWriter};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default idle interval for the receive loop and `event_loop`.
const DEFAULT_IDLE_MILLIS: u64 = 1000;

/// Default timeout for TCP + TLS + WebSocket handshake.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Configuration
// =============================================================================

/// Tunables for a connection. Unset fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Verify the server certificate chain and hostname (default: true).
    pub tls_verify: bool,
    /// Deadline for each `query` (default: 30s).
    pub request_timeout: Duration,
    /// How long `event_loop` waits before reporting "no event" (default: 1s).
    pub idle_timeout: Duration,
    /// Deadline for establishing the transport (default: 10s).
    pub connect_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            tls_verify: true,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_MILLIS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl ConnectionOptions {
    pub fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// RPC user credentials, sent as HTTP Basic auth on the handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parse the `"username:password"` API login form.
    ///
    /// The password may itself contain `:`; only the first one separates.
    pub fn from_api_login(login: &str) -> Option<Self> {
        let (username, password) = login.split_once(':')?;
        if username.is_empty() {
            return None;
        }
        Some(Self::new(username, password))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Lifecycle of a connection. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Set while the receive task is being started. `Connection::connect`
    /// only returns once the transport is up, so callers normally see
    /// `Connected` first; queries in this state fail with `NotConnected`.
    Connecting,
    Connected,
    Disconnected,
}

// =============================================================================
// Querier
// =============================================================================

/// The call surface consumed by the domain wrappers.
///
/// Implemented by [`Connection`]; tests substitute a mock.
#[allow(async_fn_in_trait)]
pub trait Querier {
    /// Send `method` with `params` and return the server's `result`.
    async fn query(
        &self,
        method: &str,
        params: Option<Value>,
        expect_streaming: bool,
    ) -> Result<Value, RpcError>;
}

// =============================================================================
// Connection
// =============================================================================

struct Shared {
    writer: tokio::sync::Mutex<TransportWriter>,
    pending: PendingRequests,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<Event>>,
    state: watch::Sender<ConnectionState>,
    subscription: Mutex<Option<Vec<String>>>,
    request_id: AtomicU64,
    options: ConnectionOptions,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Move to `Disconnected` and wake every in-flight caller.
    fn mark_disconnected(&self, reason: &str) {
        let previous = self.state.send_replace(ConnectionState::Disconnected);
        let woken = self.pending.cancel_all(reason);
        if previous != ConnectionState::Disconnected {
            info!("Disconnected: {} ({} in-flight requests cancelled)", reason, woken);
        }
    }
}

/// A JSON-RPC connection to one server.
///
/// Cheap to clone; clones share the transport, the correlation table and
/// the event queue. The receive task stops once the transport closes or the
/// last clone is dropped.
///
/// # Example
///
/// ```ignore
/// use unrealircd_rpc::{Connection, ConnectionOptions, Credentials};
///
/// let connection = Connection::connect(
///     "wss://127.0.0.1:8600/",
///     Credentials::from_api_login("adminpanel:password"),
///     ConnectionOptions::default().with_tls_verify(false),
/// ).await?;
///
/// let servers = connection.query("server.list", None, false).await?;
/// ```
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Dial `address` and start the receive task.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Connection` if the transport cannot be established.
    pub async fn connect(
        address: &str,
        credentials: Option<Credentials>,
        options: ConnectionOptions,
    ) -> Result<Self, RpcError> {
        let (writer, reader) = transport::connect(address, credentials.as_ref(), &options).await?;
        Ok(Self::with_transport(writer, reader, options))
    }

    /// Build a connection over an already established transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_transport(
        writer: TransportWriter,
        reader: TransportReader,
        options: ConnectionOptions,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Connecting);

        let shared = Arc::new(Shared {
            writer: tokio::sync::Mutex::new(writer),
            pending: PendingRequests::new(),
            events: tokio::sync::Mutex::new(event_rx),
            state,
            subscription: Mutex::new(None),
            request_id: AtomicU64::new(1),
            options,
        });

        tokio::spawn(receive_loop(
            Arc::downgrade(&shared),
            reader,
            event_tx,
            shared.options.idle_timeout,
        ));
        shared.state.send_replace(ConnectionState::Connected);

        Self { shared }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Options this connection was built with.
    pub fn options(&self) -> &ConnectionOptions {
        &self.shared.options
    }

    /// Wait until the connection reaches `Disconnected`.
    pub async fn disconnected(&self) {
        let mut rx = self.shared.state.subscribe();
        // Sender lives in `self.shared`, so this only ends on the state change
        let _ = rx
            .wait_for(|state| *state == ConnectionState::Disconnected)
            .await;
    }

    /// Number of requests waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }

    fn ensure_connected(&self) -> Result<(), RpcError> {
        match self.state() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Connecting | ConnectionState::Disconnected => {
                Err(RpcError::NotConnected)
            }
        }
    }

    /// Generate the next request ID.
    fn next_id(&self) -> RequestId {
        RequestId(self.shared.request_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Send a JSON-RPC request and wait for the response.
    ///
    /// `expect_streaming` marks calls that are expected to trigger push
    /// events (e.g. `log.subscribe`). It only affects logging: the call
    /// still completes with one ordinary response.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The connection is not connected (`RpcError::NotConnected`)
    /// - Request times out (`RpcError::Timeout`)
    /// - Connection is lost while waiting (`RpcError::ConnectionLost`)
    /// - Server returns error (`RpcError::Server`)
    ///
    /// # Example
    ///
    /// ```ignore
    /// let result = connection
    ///     .query("server.get", Some(json!({"server": "irc.example.net"})), false)
    ///     .await?;
    /// ```
    pub async fn query(
        &self,
        method: &str,
        params: Option<Value>,
        expect_streaming: bool,
    ) -> Result<Value, RpcError> {
        self.query_with_timeout(
            method,
            params,
            expect_streaming,
            self.shared.options.request_timeout,
        )
        .await
    }

    /// Like [`query`](Self::query) with a per-call deadline.
    pub async fn query_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        expect_streaming: bool,
        timeout: Duration,
    ) -> Result<Value, RpcError> {
        self.ensure_connected()?;

        // One deadline covers both the send and the wait for the response
        let deadline = tokio::time::Instant::now() + timeout;

        let id = self.next_id();
        let frame = codec::encode_request(id, method, params.as_ref())?;
        let slot = self.shared.pending.register(id)?;

        if expect_streaming {
            debug!(%id, method, "sending request (events expected to follow)");
        } else {
            debug!(%id, method, "sending request");
        }

        // On error the slot drops and unregisters itself
        let sent = tokio::time::timeout_at(deadline, async {
            self.shared.writer.lock().await.send(frame).await
        })
        .await;
        match sent {
            Ok(result) => result?,
            Err(_) => {
                warn!(%id, method, "request could not be sent within {:?}", timeout);
                return Err(RpcError::Timeout(timeout));
            }
        }

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match slot.wait(remaining).await {
            Ok(response) => process_response(response),
            Err(RpcError::Timeout(_)) => {
                warn!(%id, method, "request timed out after {:?}", timeout);
                Err(RpcError::Timeout(timeout))
            }
            Err(e) => Err(e),
        }
    }

    /// Typed convenience over [`query`](Self::query).
    ///
    /// # Errors
    ///
    /// - `RpcError::Encoding` if `params` cannot be serialized to JSON
    /// - `RpcError::Protocol` if the result does not deserialize into `R`
    /// - anything [`query`](Self::query) returns
    pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, RpcError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params).map_err(RpcError::Encoding)?;
        let result = self.query(method, Some(params), false).await?;
        serde_json::from_value(result)
            .map_err(|e| RpcError::Protocol(format!("Unexpected result for {}: {}", method, e)))
    }

    /// Take the next push event.
    ///
    /// Returns `Ok(None)` when no event arrived within the idle interval,
    /// so callers can poll in a loop. Meant for a single consumer; concurrent
    /// callers take turns on the queue.
    ///
    /// # Errors
    ///
    /// - `RpcError::NotConnected` outside the `Connected` state
    /// - `RpcError::ConnectionLost` if the connection dropped while waiting
    pub async fn event_loop(&self) -> Result<Option<Event>, RpcError> {
        self.ensure_connected()?;

        let mut events = self.shared.events.lock().await;
        match tokio::time::timeout(self.shared.options.idle_timeout, events.recv()).await {
            Ok(Some(event)) => Ok(Some(event)),
            Ok(None) => Err(RpcError::ConnectionLost(
                "receive loop stopped".to_string(),
            )),
            Err(_) => Ok(None),
        }
    }

    /// Subscribe to log event sources, replacing any previous subscription.
    ///
    /// Returns the server's acknowledgment. Events then arrive through
    /// [`event_loop`](Self::event_loop).
    pub async fn subscribe(&self, sources: &[&str]) -> Result<Value, RpcError> {
        let sources: Vec<String> = sources.iter().map(|s| s.to_string()).collect();
        let ack = self
            .query("log.subscribe", Some(json!({ "sources": sources })), true)
            .await?;

        info!("Subscribed to log sources {:?}", sources);
        *self.subscription_guard() = Some(sources);
        Ok(ack)
    }

    /// Drop the current subscription.
    ///
    /// With nothing subscribed this succeeds without contacting the server.
    /// The server decides when events actually stop.
    pub async fn unsubscribe(&self) -> Result<Value, RpcError> {
        if self.subscription_guard().is_none() {
            debug!("unsubscribe with no active subscription");
            return Ok(Value::Bool(true));
        }

        let ack = self.query("log.unsubscribe", None, false).await?;
        *self.subscription_guard() = None;
        info!("Unsubscribed from log sources");
        Ok(ack)
    }

    /// Sources of the most recent successful `subscribe`, if still active.
    pub fn subscription(&self) -> Option<Vec<String>> {
        self.subscription_guard().clone()
    }

    fn subscription_guard(&self) -> std::sync::MutexGuard<'_, Option<Vec<String>>> {
        self.shared
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Close the transport and cancel in-flight requests. Idempotent.
    pub async fn close(&self) {
        if self.state() == ConnectionState::Disconnected {
            return;
        }
        debug!(
            "Closing connection (oldest in-flight request: {:?})",
            self.shared.pending.oldest_age()
        );
        let closing = async { self.shared.writer.lock().await.close().await };
        if tokio::time::timeout(self.shared.options.request_timeout, closing)
            .await
            .is_err()
        {
            warn!("Transport did not close within {:?}", self.shared.options.request_timeout);
        }
        self.shared.mark_disconnected("connection closed by client");
    }

    /// Log operations.
    pub fn log(&self) -> crate::api::Log<'_, Self> {
        crate::api::Log::new(self)
    }

    /// Message operations.
    pub fn message(&self) -> crate::api::Message<'_, Self> {
        crate::api::Message::new(self)
    }

    /// Server operations.
    pub fn server(&self) -> crate::api::Server<'_, Self> {
        crate::api::Server::new(self)
    }
}

impl Querier for Connection {
    async fn query(
        &self,
        method: &str,
        params: Option<Value>,
        expect_streaming: bool,
    ) -> Result<Value, RpcError> {
        Connection::query(self, method, params, expect_streaming).await
    }
}

/// Process a JSON-RPC response, extracting result or error.
fn process_response(response: Response) -> Result<Value, RpcError> {
    // Check for JSON-RPC error
    if let Some(err) = response.error {
        return Err(RpcError::Server {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response
        .result
        .ok_or_else(|| RpcError::Protocol("Response missing both result and error".to_string()))
}

// =============================================================================
// Receive loop
// =============================================================================

/// Route inbound frames until the transport closes or the connection is dropped.
async fn receive_loop(
    shared: Weak<Shared>,
    mut reader: TransportReader,
    events: mpsc::UnboundedSender<Event>,
    idle: Duration,
) {
    loop {
        let received = reader.receive(idle).await;

        let Some(shared) = shared.upgrade() else {
            debug!("Connection dropped; stopping receive loop");
            return;
        };

        match received {
            Ok(Received::Idle) => {
                if shared.state() == ConnectionState::Disconnected {
                    debug!("Receive loop stopping after close");
                    return;
                }
            }
            Ok(Received::Frame(frame)) => match codec::decode(&frame) {
                Envelope::Response(response) => {
                    let id = response.id;
                    if !shared.pending.resolve(id, response) {
                        warn!(%id, "Response for unknown request id; dropped");
                    }
                }
                Envelope::Event(event) => {
                    debug!(method = ?event.method, "Received event");
                    // Receiver lives in `shared`, which we hold
                    let _ = events.send(event);
                }
                Envelope::Malformed(reason) => {
                    warn!("Dropping malformed frame: {}", reason);
                }
            },
            Err(e) => {
                shared.mark_disconnected(&e.to_string());
                return;
            }
        }
    }
}
