//! Message operations: PRIVMSG, NOTICE, numerics, standard replies, WALLOPS/GLOBOPS.

use serde_json::{json, Value};

use crate::models::Target;
use crate::rpc::{Querier, RpcError};

pub struct Message<'a, Q: Querier> {
    querier: &'a Q,
}

impl<'a, Q: Querier> Message<'a, Q> {
    pub fn new(querier: &'a Q) -> Self {
        Self { querier }
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.querier.query(method, Some(params), false).await
    }

    /// Send a PRIVMSG to one or more nicks/channels.
    pub async fn privmsg(
        &self,
        target: impl Into<Target>,
        message: &str,
    ) -> Result<Value, RpcError> {
        let target: Target = target.into();
        self.send(
            "message.privmsg",
            json!({"target": target, "message": message}),
        )
        .await
    }

    /// Send a NOTICE to one or more nicks/channels.
    pub async fn notice(
        &self,
        target: impl Into<Target>,
        message: &str,
    ) -> Result<Value, RpcError> {
        let target: Target = target.into();
        self.send(
            "message.notice",
            json!({"target": target, "message": message}),
        )
        .await
    }

    /// Send a custom numeric to a user.
    pub async fn numeric(
        &self,
        nick: &str,
        numeric: u16,
        message: &str,
    ) -> Result<Value, RpcError> {
        self.send(
            "message.numeric",
            json!({"nick": nick, "numeric": numeric, "message": message}),
        )
        .await
    }

    /// Send an IRCv3 standard reply (`FAIL`/`WARN`/`NOTE`).
    pub async fn standard_reply(
        &self,
        nick: &str,
        reply_type: &str,
        code: &str,
        description: &str,
        context: Option<&str>,
    ) -> Result<Value, RpcError> {
        let mut params = json!({
            "nick": nick,
            "type": reply_type,
            "code": code,
            "description": description,
        });
        if let Some(context) = context {
            params["context"] = json!(context);
        }
        self.send("message.standardreply", params).await
    }

    /// Send a WALLOPS.
    pub async fn wallops(&self, message: &str) -> Result<Value, RpcError> {
        self.send("message.send_wallops", json!({"message": message}))
            .await
    }

    /// Send a GLOBOPS.
    pub async fn globops(&self, message: &str) -> Result<Value, RpcError> {
        self.send("message.send_globops", json!({"message": message}))
            .await
    }
}
