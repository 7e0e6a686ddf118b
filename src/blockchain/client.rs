// Shared HTTP plumbing for the node and explorer clients.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::core::config::ClientConfig;
use crate::core::errors::WalletError;

/// Header the node and explorer providers authenticate with.
pub const API_KEY_HEADER: &str = "api-key";

/// Builds a client whose every request is bounded by the configured timeout
/// and carries the provider's `api-key` header when one is set.
pub fn build_http_client(
    config: &ClientConfig,
    api_key: Option<&str>,
) -> Result<reqwest::Client, WalletError> {
    let mut headers = HeaderMap::new();
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        let mut value = HeaderValue::from_str(key)
            .map_err(|e| WalletError::ConfigError(format!("invalid api key header: {}", e)))?;
        value.set_sensitive(true);
        headers.insert(API_KEY_HEADER, value);
    }

    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .default_headers(headers)
        .build()
        .map_err(|e| WalletError::ConfigError(format!("Failed to build HTTP client: {}", e)))
}

/// Joins a base URL and a relative path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        format!("{}/", base)
    } else {
        format!("{}/{}", base, path)
    }
}
