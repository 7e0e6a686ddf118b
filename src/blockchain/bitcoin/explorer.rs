//! Block explorer REST client (Blockbook-style API)
//!
//! `GET address/{address}`, `GET utxo/{address}`, `GET block/{height}` and the
//! status document at the API root.

use crate::blockchain::client::join_url;
use crate::core::errors::WalletError;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ExplorerClient {
    base_url: String,
    http_client: HttpClient,
}

/// `GET address/{address}` response.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerAddress {
    #[serde(default)]
    pub address: String,
    #[serde(deserialize_with = "amount_from_any")]
    pub balance: u64,
    #[serde(default, deserialize_with = "amount_from_any")]
    pub total_received: u64,
    #[serde(default, deserialize_with = "amount_from_any")]
    pub total_sent: u64,
    #[serde(default)]
    pub txs: u64,
    #[serde(default)]
    pub txids: Option<Vec<String>>,
}

/// One entry of `GET utxo/{address}`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExplorerUtxo {
    pub txid: String,
    pub vout: u32,
    #[serde(deserialize_with = "amount_from_any")]
    pub value: u64,
    #[serde(default)]
    pub confirmations: u64,
}

/// `GET block/{height}` response, reduced to what callers use.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerBlock {
    pub hash: String,
    pub height: u64,
    #[serde(default)]
    pub time: Option<u64>,
    #[serde(default)]
    pub tx_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerStatus {
    #[serde(default)]
    blockbook: Option<BlockbookSection>,
    #[serde(default)]
    backend: Option<BackendSection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockbookSection {
    #[serde(default)]
    best_height: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BackendSection {
    #[serde(default)]
    blocks: Option<u64>,
}

/// Explorers report satoshi amounts as strings or numbers.
fn amount_from_any<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl ExplorerClient {
    /// `http_client` is expected to carry the timeout and `api-key` header.
    pub fn new(base_url: &str, http_client: HttpClient) -> Self {
        Self { base_url: base_url.to_string(), http_client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, WalletError> {
        let url = join_url(&self.base_url, path);
        debug!(url = %url, "explorer request");

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(path, %status, "explorer request failed");
            return Err(WalletError::NetworkUnavailable(format!(
                "GET {} returned HTTP {}",
                path, status
            )));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(WalletError::NetworkUnavailable(format!("GET {}: empty body", path)));
        }

        serde_json::from_slice(&body).map_err(|e| {
            WalletError::NetworkUnavailable(format!("GET {}: unreadable body: {}", path, e))
        })
    }

    pub async fn get_address(&self, address: &str) -> Result<ExplorerAddress, WalletError> {
        self.get(&format!("address/{}", address)).await
    }

    pub async fn get_utxo(&self, address: &str) -> Result<Vec<ExplorerUtxo>, WalletError> {
        self.get(&format!("utxo/{}", address)).await
    }

    pub async fn get_block(&self, height: u64) -> Result<ExplorerBlock, WalletError> {
        self.get(&format!("block/{}", height)).await
    }

    /// Best block height from the explorer's status document.
    pub async fn get_best_height(&self) -> Result<u64, WalletError> {
        let status: ExplorerStatus = self.get("").await?;

        status
            .blockbook
            .and_then(|b| b.best_height)
            .or_else(|| status.backend.and_then(|b| b.blocks))
            .ok_or_else(|| WalletError::NetworkUnavailable("status has no block height".to_string()))
    }
}
