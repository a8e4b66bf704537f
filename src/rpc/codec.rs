//! JSON-RPC 2.0 envelope encoding and classification.
//!
//! Outgoing requests are serialized as:
//!
//! ```text
//! {"jsonrpc":"2.0","method":"log.subscribe","params":{"sources":["all"]},"id":7}
//! ```
//!
//! Incoming frames are classified by shape:
//!
//! - an `id` field (non-null) makes the frame a [`Response`]
//! - no `id` but a `method` (or bare `result`) makes it an [`Event`]
//! - anything else is [`Envelope::Malformed`]
//!
//! Pure functions, no I/O.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::rpc::error::RpcError;

/// Maximum inbound frame size (16MB) to bound memory per frame.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC "Internal error" code, used when the server sends an error
/// object we cannot parse.
const INTERNAL_ERROR_CODE: i64 = -32603;

/// Correlation token carried in the `id` field of requests and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize)]
struct RequestEnvelope<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
    id: RequestId,
}

/// Structured error carried by an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A response to one of our requests.
///
/// `error` wins when a (non-conforming) server sends both fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub result: Option<Value>,
    pub error: Option<ErrorObject>,
}

/// A server push message not tied to any request.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event category (`method` field), when the server names one.
    pub method: Option<String>,
    /// Event payload (`params`, or `result` for result-shaped pushes).
    pub data: Value,
}

/// Classification of one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Response(Response),
    Event(Event),
    /// Not a usable envelope; carries a short reason for logging.
    Malformed(String),
}

/// Serialize a request envelope.
///
/// # Errors
///
/// Returns `RpcError::Encoding` if the envelope cannot be represented as JSON.
pub fn encode_request(
    id: RequestId,
    method: &str,
    params: Option<&Value>,
) -> Result<String, RpcError> {
    let envelope = RequestEnvelope {
        jsonrpc: JSONRPC_VERSION,
        method,
        params,
        id,
    };
    serde_json::to_string(&envelope).map_err(RpcError::Encoding)
}

/// Classify an inbound frame.
///
/// Never fails: anything unusable becomes [`Envelope::Malformed`].
pub fn decode(frame: &[u8]) -> Envelope {
    if frame.len() > MAX_FRAME_SIZE {
        return Envelope::Malformed(format!(
            "frame size {} exceeds maximum {} bytes",
            frame.len(),
            MAX_FRAME_SIZE
        ));
    }

    let mut object = match serde_json::from_slice::<Value>(frame) {
        Ok(Value::Object(object)) => object,
        Ok(other) => return Envelope::Malformed(format!("not a JSON object: {}", kind(&other))),
        Err(e) => return Envelope::Malformed(format!("invalid JSON: {}", e)),
    };

    match object.remove("id") {
        Some(Value::Null) | None => decode_event(object),
        Some(id) => decode_response(id, object),
    }
}

fn decode_response(id: Value, mut object: Map<String, Value>) -> Envelope {
    let Some(id) = id.as_u64().map(RequestId) else {
        return Envelope::Malformed(format!("unrecognized response id {}", id));
    };

    // `"error": null` accompanies successful results from some servers
    let error = object.remove("error").filter(|raw| !raw.is_null()).map(|raw| {
        serde_json::from_value::<ErrorObject>(raw.clone()).unwrap_or_else(|_| ErrorObject {
            code: INTERNAL_ERROR_CODE,
            message: format!("unparseable error object: {}", raw),
            data: Some(raw),
        })
    });

    Envelope::Response(Response {
        id,
        result: object.remove("result"),
        error,
    })
}

fn decode_event(mut object: Map<String, Value>) -> Envelope {
    match object.remove("method") {
        Some(Value::String(method)) => Envelope::Event(Event {
            method: Some(method),
            data: object
                .remove("params")
                .or_else(|| object.remove("result"))
                .unwrap_or(Value::Null),
        }),
        Some(other) => Envelope::Malformed(format!("method is not a string: {}", kind(&other))),
        None => match object.remove("result") {
            Some(data) => Envelope::Event(Event { method: None, data }),
            None => Envelope::Malformed("frame has neither id nor method".to_string()),
        },
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_encode_request_with_params() {
        let params = json!({"sources": ["all"]});
        let encoded = encode_request(RequestId(7), "log.subscribe", Some(&params)).unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();

        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "method": "log.subscribe",
                "params": {"sources": ["all"]},
                "id": 7
            })
        );
    }

    #[test]
    fn test_encode_request_omits_absent_params() {
        let encoded = encode_request(RequestId(1), "server.list", None).unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();

        assert!(value.get("params").is_none());
        assert_eq!(value["method"], "server.list");
    }

    #[test]
    fn test_decode_result_response() {
        let frame = br#"{"jsonrpc":"2.0","id":3,"result":{"list":[]}}"#;
        assert_eq!(
            decode(frame),
            Envelope::Response(Response {
                id: RequestId(3),
                result: Some(json!({"list": []})),
                error: None,
            })
        );
    }

    #[test]
    fn test_decode_null_result_is_still_a_result() {
        let frame = br#"{"jsonrpc":"2.0","id":4,"result":null}"#;
        match decode(frame) {
            Envelope::Response(response) => assert_eq!(response.result, Some(Value::Null)),
            other => panic!("Expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_null_error_alongside_result() {
        let frame = br#"{"jsonrpc":"2.0","id":1,"result":{"ok":true},"error":null}"#;
        assert_eq!(
            decode(frame),
            Envelope::Response(Response {
                id: RequestId(1),
                result: Some(json!({"ok": true})),
                error: None,
            })
        );
    }

    #[test]
    fn test_decode_error_response() {
        let frame = br#"{"jsonrpc":"2.0","id":5,"error":{"code":-32601,"message":"Method not found"}}"#;
        match decode(frame) {
            Envelope::Response(response) => {
                assert_eq!(response.id, RequestId(5));
                let error = response.error.expect("error object");
                assert_eq!(error.code, -32601);
                assert_eq!(error.message, "Method not found");
            }
            other => panic!("Expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_unparseable_error_object() {
        let frame = br#"{"jsonrpc":"2.0","id":5,"error":"boom"}"#;
        match decode(frame) {
            Envelope::Response(response) => {
                let error = response.error.expect("error object");
                assert_eq!(error.code, INTERNAL_ERROR_CODE);
                assert_eq!(error.data, Some(json!("boom")));
            }
            other => panic!("Expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_method_event() {
        let frame = br#"{"jsonrpc":"2.0","method":"log.event","params":{"msg":"hi"}}"#;
        assert_eq!(
            decode(frame),
            Envelope::Event(Event {
                method: Some("log.event".to_string()),
                data: json!({"msg": "hi"}),
            })
        );
    }

    #[test]
    fn test_decode_method_event_with_result_payload() {
        let frame = br#"{"jsonrpc":"2.0","method":"log.event","result":{"msg":"hi"}}"#;
        assert_eq!(
            decode(frame),
            Envelope::Event(Event {
                method: Some("log.event".to_string()),
                data: json!({"msg": "hi"}),
            })
        );
    }

    #[test]
    fn test_decode_null_id_result_is_event() {
        let frame = br#"{"jsonrpc":"2.0","id":null,"result":{"subsystem":"connect"}}"#;
        assert_eq!(
            decode(frame),
            Envelope::Event(Event {
                method: None,
                data: json!({"subsystem": "connect"}),
            })
        );
    }

    #[test]
    fn test_decode_malformed_frames() {
        assert!(matches!(decode(b"not json"), Envelope::Malformed(_)));
        assert!(matches!(decode(b"[1,2,3]"), Envelope::Malformed(_)));
        assert!(matches!(decode(br#"{"jsonrpc":"2.0"}"#), Envelope::Malformed(_)));
        assert!(matches!(decode(br#"{"method":42}"#), Envelope::Malformed(_)));
    }

    #[test]
    fn test_decode_foreign_id_is_malformed() {
        let frame = br#"{"jsonrpc":"2.0","id":"abc","result":true}"#;
        match decode(frame) {
            Envelope::Malformed(reason) => assert!(reason.contains("unrecognized response id")),
            other => panic!("Expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_oversized_frame() {
        let frame = vec![b' '; MAX_FRAME_SIZE + 1];
        match decode(&frame) {
            Envelope::Malformed(reason) => assert!(reason.contains("exceeds maximum")),
            other => panic!("Expected malformed, got {:?}", other),
        }
    }
}
