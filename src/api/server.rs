//! Server operations.

use serde_json::{json, Map, Value};

use crate::api::{invalid_response, is_success};
use crate::rpc::{Querier, RpcError};

pub struct Server<'a, Q: Querier> {
    querier: &'a Q,
}

fn server_params(server: Option<&str>) -> Option<Value> {
    server.map(|server| json!({ "server": server }))
}

impl<'a, Q: Querier> Server<'a, Q> {
    pub fn new(querier: &'a Q) -> Self {
        Self { querier }
    }

    /// List all linked servers.
    pub async fn get_all(&self) -> Result<Value, RpcError> {
        let result = self.querier.query("server.list", None, false).await?;
        result.get("list").cloned().ok_or_else(invalid_response)
    }

    /// Fetch one server (the local one when `server` is `None`).
    ///
    /// Returns `None` when the server is not found.
    pub async fn get(&self, server: Option<&str>) -> Result<Option<Value>, RpcError> {
        let params = server_params(server).unwrap_or_else(|| Value::Object(Map::new()));
        let result = self.querier.query("server.get", Some(params), false).await?;
        Ok(result.get("server").cloned())
    }

    /// Ask a server to rehash. Older servers answer `true`, newer ones an
    /// object with rehash details; both are returned as-is.
    pub async fn rehash(&self, server: Option<&str>) -> Result<Value, RpcError> {
        self.querier
            .query("server.rehash", server_params(server), false)
            .await
    }

    /// Link to another server.
    pub async fn connect(&self, link: &str) -> Result<bool, RpcError> {
        let result = self
            .querier
            .query("server.connect", Some(json!({ "link": link })), false)
            .await?;
        Ok(is_success(&result))
    }

    /// Terminate a server link.
    pub async fn disconnect(&self, link: &str) -> Result<bool, RpcError> {
        let result = self
            .querier
            .query("server.disconnect", Some(json!({ "link": link })), false)
            .await?;
        Ok(is_success(&result))
    }

    /// Modules loaded on a server: the `list` field, or the whole object
    /// when the reply is not keyed.
    pub async fn module_list(&self, server: Option<&str>) -> Result<Value, RpcError> {
        let result = self
            .querier
            .query("server.module_list", server_params(server), false)
            .await?;
        match result {
            Value::Object(mut object) => Ok(object
                .remove("list")
                .unwrap_or(Value::Object(object))),
            _ => Err(invalid_response()),
        }
    }

    /// Run a configuration test and return the full report.
    pub async fn config_test(&self) -> Result<Map<String, Value>, RpcError> {
        match self.querier.query("server.config_test", None, false).await? {
            Value::Object(object) => Ok(object),
            _ => Err(invalid_response()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockQuerier;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_get_all() {
        let mock = MockQuerier::new(json!({"list": [{"name": "irc.example.net"}]}));
        let list = Server::new(&mock).get_all().await.unwrap();

        assert_eq!(list, json!([{"name": "irc.example.net"}]));
        assert_eq!(mock.only_call(), ("server.list".to_string(), None, false));
    }

    #[tokio::test]
    async fn test_get_all_invalid_reply() {
        let mock = MockQuerier::new(json!(true));
        let err = Server::new(&mock).get_all().await.unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let mock = MockQuerier::new(json!({}));
        let server = Server::new(&mock).get(Some("irc2.example.net")).await.unwrap();

        assert_eq!(server, None);
        let (method, params, _) = mock.only_call();
        assert_eq!(method, "server.get");
        assert_eq!(params, Some(json!({"server": "irc2.example.net"})));
    }

    #[tokio::test]
    async fn test_rehash() {
        let mock = MockQuerier::new(json!({"success": true, "log": []}));
        let result = Server::new(&mock).rehash(None).await.unwrap();

        assert_eq!(result["success"], json!(true));
        assert_eq!(mock.only_call(), ("server.rehash".to_string(), None, false));
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let mock = MockQuerier::new(json!(true));
        assert!(Server::new(&mock).connect("irc2.example.net").await.unwrap());

        let mock = MockQuerier::new(json!("ok"));
        assert!(Server::new(&mock).disconnect("irc2.example.net").await.unwrap());
        let (method, params, _) = mock.only_call();
        assert_eq!(method, "server.disconnect");
        assert_eq!(params, Some(json!({"link": "irc2.example.net"})));

        let mock = MockQuerier::new(json!(false));
        assert!(!Server::new(&mock).connect("irc3.example.net").await.unwrap());
    }

    #[tokio::test]
    async fn test_module_list() {
        let mock = MockQuerier::new(json!({"list": ["mod1", "mod2"]}));
        let list = Server::new(&mock).module_list(None).await.unwrap();
        assert_eq!(list, json!(["mod1", "mod2"]));

        let mock = MockQuerier::new(json!({"modules": 2}));
        let whole = Server::new(&mock).module_list(None).await.unwrap();
        assert_eq!(whole, json!({"modules": 2}));
    }

    #[tokio::test]
    async fn test_config_test() {
        let mock = MockQuerier::new(json!({"success": true, "exit_code": 0}));
        let report = Server::new(&mock).config_test().await.unwrap();
        assert_eq!(report.get("exit_code"), Some(&json!(0)));

        let mock = MockQuerier::new(json!(null));
        assert!(Server::new(&mock).config_test().await.is_err());
    }
}
