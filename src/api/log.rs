//! Log operations.
//!
//! Subscribing to live log events is a connection-level concern; see
//! [`Connection::subscribe`](crate::rpc::Connection::subscribe).

use serde_json::{json, Map, Value};

use crate::models::LogLevel;
use crate::rpc::{Querier, RpcError};

pub struct Log<'a, Q: Querier> {
    querier: &'a Q,
}

impl<'a, Q: Querier> Log<'a, Q> {
    pub fn new(querier: &'a Q) -> Self {
        Self { querier }
    }

    /// Fetch past log events, optionally restricted to `sources`.
    ///
    /// Returns `None` when the server reply carries no `list`.
    pub async fn get_all(&self, sources: Option<&[&str]>) -> Result<Option<Value>, RpcError> {
        let mut params = Map::new();
        if let Some(sources) = sources {
            params.insert("sources".to_string(), json!(sources));
        }

        let result = self
            .querier
            .query("log.list", Some(Value::Object(params)), false)
            .await?;
        Ok(result.get("list").cloned())
    }

    /// Write a message into the server log (UnrealIRCd 6.1.8+).
    ///
    /// `subsystem` and `event_id` identify the source, e.g.
    /// `"webpanel"` / `"WEBPANEL_LOGIN"`.
    pub async fn send(
        &self,
        msg: &str,
        level: LogLevel,
        subsystem: &str,
        event_id: &str,
    ) -> Result<bool, RpcError> {
        self.querier
            .query(
                "log.send",
                Some(json!({
                    "msg": msg,
                    "level": level.as_str(),
                    "subsystem": subsystem,
                    "event_id": event_id,
                })),
                false,
            )
            .await?;
        Ok(true)
    }
}
