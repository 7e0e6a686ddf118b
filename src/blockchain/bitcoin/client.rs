//! Bitcoin node JSON-RPC client
//!
//! POSTs `{ API_key, jsonrpc, id, method, params }` to the configured node.

use crate::core::errors::WalletError;
use reqwest::Client as HttpClient;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// JSON-RPC client for one node endpoint.
#[derive(Clone)]
pub struct NodeClient {
    rpc_url: String,
    api_key: String,
    http_client: HttpClient,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    #[serde(rename = "API_key")]
    api_key: &'a str,
    jsonrpc: &'static str,
    id: String,
    method: &'a str,
    params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<Value>,
}

impl NodeClient {
    /// `http_client` is expected to carry the timeout and `api-key` header.
    pub fn new(rpc_url: &str, api_key: &str, http_client: HttpClient) -> Self {
        Self { rpc_url: rpc_url.to_string(), api_key: api_key.to_string(), http_client }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn rpc_call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, WalletError> {
        let request = RpcRequest {
            api_key: &self.api_key,
            jsonrpc: "2.0",
            id: uuid::Uuid::new_v4().to_string(),
            method,
            params,
        };
        debug!(method, id = %request.id, "node rpc call");

        let response = self.http_client.post(&self.rpc_url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(method, %status, "node rejected rpc call");
            return Err(WalletError::NetworkUnavailable(format!(
                "{} returned HTTP {}: {}",
                method, status, body
            )));
        }

        let rpc_response: RpcResponse<T> = response.json().await.map_err(|e| {
            WalletError::NetworkUnavailable(format!("{}: unreadable response: {}", method, e))
        })?;

        if let Some(error) = rpc_response.error.filter(|e| !e.is_null()) {
            return Err(WalletError::NetworkUnavailable(format!("{} error: {}", method, error)));
        }

        rpc_response
            .result
            .ok_or_else(|| WalletError::NetworkUnavailable(format!("{}: empty result", method)))
    }

    /// Verbose transaction lookup.
    pub async fn get_raw_transaction(&self, txid: &str) -> Result<Value, WalletError> {
        self.rpc_call("getrawtransaction", vec![json!(txid), json!(true)]).await
    }

    /// Relays a signed transaction; returns the txid the node reports.
    ///
    /// Every failure here is a `BroadcastFailed`: once the request left this
    /// process the transaction may or may not have been relayed.
    pub async fn send_raw_transaction(&self, tx_hex: &str) -> Result<String, WalletError> {
        info!("Broadcasting transaction");

        let txid: String = self
            .rpc_call("sendrawtransaction", vec![json!(tx_hex)])
            .await
            .map_err(|e| WalletError::BroadcastFailed(e.to_string()))?;

        if txid.is_empty() {
            return Err(WalletError::BroadcastFailed("node returned an empty txid".to_string()));
        }

        info!(txid = %txid, "Transaction broadcast");
        Ok(txid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_request_shape() {
        let request = RpcRequest {
            api_key: "key",
            jsonrpc: "2.0",
            id: "1".to_string(),
            method: "sendrawtransaction",
            params: vec![json!("00ff")],
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["API_key"], "key");
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "sendrawtransaction");
        assert_eq!(value["params"], json!(["00ff"]));
    }

    #[test]
    fn test_rpc_response_with_null_error() {
        let parsed: RpcResponse<String> =
            serde_json::from_str(r#"{"result":"abc","error":null,"id":"x"}"#).unwrap();
        assert_eq!(parsed.result.as_deref(), Some("abc"));
        assert!(parsed.error.unwrap_or(Value::Null).is_null());
    }

    #[tokio::test]
    async fn test_unreachable_node_is_network_error() {
        let client = NodeClient::new("http://127.0.0.1:9", "", HttpClient::new());
        let err = client.get_raw_transaction("00").await.unwrap_err();
        assert!(matches!(err, WalletError::NetworkUnavailable(_)));

        let err = client.send_raw_transaction("00").await.unwrap_err();
        assert!(matches!(err, WalletError::BroadcastFailed(_)));
    }
}
