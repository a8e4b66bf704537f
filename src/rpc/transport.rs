//! Message-oriented transport: WebSocket (plain or TLS) and in-memory.
//!
//! A transport is split into a [`TransportWriter`] shared by callers and a
//! [`TransportReader`] owned by the receive loop. The transport moves whole
//! frames and knows nothing about JSON-RPC.
//!
//! # Usage
//!
//! ```ignore
//! let (writer, reader) = transport::connect(
//!     "wss://127.0.0.1:8600/",
//!     Some(&credentials),
//!     &ConnectionOptions::default().with_tls_verify(false),
//! ).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use url::Url;

use crate::rpc::connection::{ConnectionOptions, Credentials};
use crate::rpc::error::RpcError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outcome of one receive attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// One complete inbound frame.
    Frame(Vec<u8>),
    /// The idle timeout elapsed with no frame.
    Idle,
}

/// Sending half of a transport.
pub struct TransportWriter {
    inner: WriterInner,
}

enum WriterInner {
    WebSocket(SplitSink<WsStream, Message>),
    Memory(Option<mpsc::UnboundedSender<Vec<u8>>>),
}

/// Receiving half of a transport.
pub struct TransportReader {
    inner: ReaderInner,
}

enum ReaderInner {
    WebSocket(SplitStream<WsStream>),
    Memory(mpsc::UnboundedReceiver<Vec<u8>>),
}

// =============================================================================
// WebSocket
// =============================================================================

/// Dial a `ws://` or `wss://` endpoint and complete the WebSocket handshake.
///
/// Credentials are sent as an HTTP Basic `Authorization` header.
///
/// # Errors
///
/// Returns `RpcError::Connection` if:
/// - The address is not a valid `ws://`/`wss://` URL
/// - DNS, TCP, TLS or the WebSocket handshake fails
/// - The whole attempt exceeds `options.connect_timeout`
pub async fn connect(
    address: &str,
    credentials: Option<&Credentials>,
    options: &ConnectionOptions,
) -> Result<(TransportWriter, TransportReader), RpcError> {
    let url = Url::parse(address)
        .map_err(|e| RpcError::Connection(format!("Invalid address {}: {}", address, e)))?;

    let connector = match url.scheme() {
        "wss" => Some(Connector::Rustls(Arc::new(crate::rpc::tls::client_config(
            options.tls_verify,
        )?))),
        "ws" => None,
        other => {
            return Err(RpcError::Connection(format!(
                "Unsupported scheme '{}' (expected ws or wss)",
                other
            )))
        }
    };

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| RpcError::Connection(format!("Invalid request for {}: {}", address, e)))?;

    if let Some(credentials) = credentials {
        let header = HeaderValue::from_str(&basic_auth(credentials))
            .map_err(|e| RpcError::Connection(format!("Invalid credentials: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, header);
    }

    info!("Connecting to {}", url);

    let handshake =
        tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector);
    let (stream, response) = timeout(options.connect_timeout, handshake)
        .await
        .map_err(|_| {
            RpcError::Connection(format!(
                "Connect to {} timed out after {:?}",
                url, options.connect_timeout
            ))
        })?
        .map_err(|e| RpcError::Connection(format!("{}: {}", url, e)))?;

    debug!("WebSocket handshake complete (status {})", response.status());

    let (sink, stream) = stream.split();
    Ok((
        TransportWriter {
            inner: WriterInner::WebSocket(sink),
        },
        TransportReader {
            inner: ReaderInner::WebSocket(stream),
        },
    ))
}

fn basic_auth(credentials: &Credentials) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!(
        "{}:{}",
        credentials.username, credentials.password
    ));
    format!("Basic {}", token)
}

fn map_ws_error(err: tungstenite::Error) -> RpcError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            RpcError::Closed
        }
        other => RpcError::ConnectionLost(other.to_string()),
    }
}

// =============================================================================
// Writer / Reader
// =============================================================================

impl TransportWriter {
    /// Send one frame.
    ///
    /// # Errors
    ///
    /// - `RpcError::Closed` if the connection is closed
    /// - `RpcError::Send` if the transport rejected the frame
    pub async fn send(&mut self, frame: String) -> Result<(), RpcError> {
        match &mut self.inner {
            WriterInner::WebSocket(sink) => {
                sink.send(Message::Text(frame)).await.map_err(|e| match e {
                    tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                        RpcError::Closed
                    }
                    other => RpcError::Send(other.to_string()),
                })
            }
            WriterInner::Memory(tx) => match tx {
                Some(tx) => tx.send(frame.into_bytes()).map_err(|_| RpcError::Closed),
                None => Err(RpcError::Closed),
            },
        }
    }

    /// Close the sending side. Safe to call more than once.
    pub async fn close(&mut self) {
        match &mut self.inner {
            WriterInner::WebSocket(sink) => {
                if let Err(e) = sink.close().await {
                    debug!("WebSocket close: {}", e);
                }
            }
            WriterInner::Memory(tx) => {
                tx.take();
            }
        }
    }
}

impl TransportReader {
    /// Wait up to `idle` for the next frame.
    ///
    /// Control frames (ping, pong) are consumed without ending the wait.
    ///
    /// # Errors
    ///
    /// - `RpcError::Closed` if the peer closed the connection
    /// - `RpcError::ConnectionLost` on any other read failure
    pub async fn receive(&mut self, idle: Duration) -> Result<Received, RpcError> {
        let deadline = Instant::now() + idle;

        match &mut self.inner {
            ReaderInner::WebSocket(stream) => loop {
                let message = match timeout_at(deadline, stream.next()).await {
                    Err(_) => return Ok(Received::Idle),
                    Ok(None) => return Err(RpcError::Closed),
                    Ok(Some(Err(e))) => return Err(map_ws_error(e)),
                    Ok(Some(Ok(message))) => message,
                };

                match message {
                    Message::Text(text) => return Ok(Received::Frame(text.into_bytes())),
                    Message::Binary(bytes) => return Ok(Received::Frame(bytes)),
                    Message::Close(frame) => {
                        debug!("WebSocket close frame: {:?}", frame);
                        return Err(RpcError::Closed);
                    }
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                }
            },
            ReaderInner::Memory(rx) => match timeout_at(deadline, rx.recv()).await {
                Err(_) => Ok(Received::Idle),
                Ok(None) => Err(RpcError::Closed),
                Ok(Some(frame)) => Ok(Received::Frame(frame)),
            },
        }
    }
}

// =============================================================================
// Memory
// =============================================================================

/// Server side of an in-memory transport.
///
/// Reads what the client sends and pushes frames back to it.
pub struct MemoryPeer {
    from_client: mpsc::UnboundedReceiver<Vec<u8>>,
    to_client: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

/// Create a connected in-memory transport.
///
/// Returns the client halves and the [`MemoryPeer`] that plays the server.
pub fn memory() -> (TransportWriter, TransportReader, MemoryPeer) {
    let (client_tx, from_client) = mpsc::unbounded_channel();
    let (to_client, client_rx) = mpsc::unbounded_channel();

    (
        TransportWriter {
            inner: WriterInner::Memory(Some(client_tx)),
        },
        TransportReader {
            inner: ReaderInner::Memory(client_rx),
        },
        MemoryPeer {
            from_client,
            to_client: Some(to_client),
        },
    )
}

impl MemoryPeer {
    /// Wait for the next request the client sent, parsed as JSON.
    ///
    /// Returns `None` once the client side is closed.
    pub async fn next_request(&mut self) -> Option<serde_json::Value> {
        loop {
            let frame = self.from_client.recv().await?;
            match serde_json::from_slice(&frame) {
                Ok(value) => return Some(value),
                Err(e) => debug!("Peer dropped non-JSON frame: {}", e),
            }
        }
    }

    /// Return a request the client already sent, without waiting.
    pub fn try_next_request(&mut self) -> Option<serde_json::Value> {
        let frame = self.from_client.try_recv().ok()?;
        serde_json::from_slice(&frame).ok()
    }

    /// Push a raw frame to the client. Returns false once closed.
    pub fn send_raw(&self, frame: impl Into<Vec<u8>>) -> bool {
        match &self.to_client {
            Some(tx) => tx.send(frame.into()).is_ok(),
            None => false,
        }
    }

    /// Push a JSON value to the client.
    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        self.send_raw(value.to_string())
    }

    /// Reply to `request` with a success result.
    pub fn respond(&self, request: &serde_json::Value, result: serde_json::Value) -> bool {
        self.send_json(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": result,
        }))
    }

    /// Reply to `request` with a JSON-RPC error.
    pub fn respond_error(&self, request: &serde_json::Value, code: i64, message: &str) -> bool {
        self.send_json(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": {"code": code, "message": message},
        }))
    }

    /// Push a notification-style event.
    pub fn send_event(&self, method: &str, params: serde_json::Value) -> bool {
        self.send_json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        }))
    }

    /// Close the server-to-client direction; the client sees `Closed`.
    pub fn close(&mut self) {
        self.to_client.take();
    }
}
