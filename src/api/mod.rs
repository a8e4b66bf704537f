//! Thin wrappers over [`Querier::query`](crate::rpc::Querier::query).
//!
//! Each wrapper builds a method name and a parameter object and interprets
//! the result shape where the server documents one.

mod log;
mod message;
mod server;

pub use log::Log;
pub use message::Message;
pub use server::Server;

use serde_json::Value;

use crate::rpc::RpcError;

fn invalid_response() -> RpcError {
    RpcError::Protocol("invalid JSON response from UnrealIRCd RPC".to_string())
}

/// Treat `true` or `"ok"` as success, anything else as failure.
fn is_success(result: &Value) -> bool {
    match result {
        Value::Bool(b) => *b,
        Value::String(s) => s == "ok",
        _ => false,
    }
}
