//! Error taxonomy for the RPC engine.

use std::time::Duration;

use thiserror::Error;

/// RPC-specific error types.
///
/// Every failure that reaches a caller is one of these variants. Inbound
/// frame corruption and responses for unknown ids never surface here; the
/// receive loop logs and drops them.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Could not establish the transport (DNS, TCP, TLS or WebSocket handshake).
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The transport refused an outgoing frame.
    #[error("Send failed: {0}")]
    Send(String),

    /// The peer closed the connection.
    #[error("Connection closed")]
    Closed,

    /// The connection went away while the request was in flight.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The connection is not in the `Connected` state.
    #[error("Not connected")]
    NotConnected,

    /// Request timed out waiting for response.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Request parameters could not be represented as JSON.
    #[error("Encoding error: {0}")]
    Encoding(#[source] serde_json::Error),

    /// Server returned a JSON-RPC error response.
    #[error("Server error {code}: {message}")]
    Server {
        /// JSON-RPC error code
        code: i64,
        /// Error message
        message: String,
        /// Optional additional data
        data: Option<serde_json::Value>,
    },

    /// Response did not have the expected shape.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl RpcError {
    /// Whether this error means the connection is unusable from now on.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            RpcError::Closed | RpcError::ConnectionLost(_) | RpcError::NotConnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_display() {
        let timeout_err = RpcError::Timeout(Duration::from_millis(250));
        assert_eq!(timeout_err.to_string(), "Request timed out after 250ms");

        let server_err = RpcError::Server {
            code: -32601,
            message: "Method not found".to_string(),
            data: None,
        };
        assert_eq!(server_err.to_string(), "Server error -32601: Method not found");

        let protocol_err = RpcError::Protocol("Invalid JSON".to_string());
        assert_eq!(protocol_err.to_string(), "Protocol error: Invalid JSON");
    }

    #[test]
    fn test_is_disconnect() {
        assert!(RpcError::Closed.is_disconnect());
        assert!(RpcError::NotConnected.is_disconnect());
        assert!(RpcError::ConnectionLost("eof".into()).is_disconnect());
        assert!(!RpcError::Timeout(Duration::from_secs(1)).is_disconnect());
        assert!(!RpcError::Protocol("bad".into()).is_disconnect());
    }
}
