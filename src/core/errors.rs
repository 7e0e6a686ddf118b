use thiserror::Error;

/// Error type shared by every chain service.
///
/// Read paths never surface these to callers (they degrade to `None`);
/// quote, sign and broadcast paths return them so that "transaction not
/// created" can never be mistaken for a legitimate empty result.
#[derive(Debug, Error)]
pub enum WalletError {
    /// HTTP/RPC call failed, timed out or returned a non-2xx/empty body.
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),
    /// No UTXO set covers the required amount.
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    /// The calculate step could not produce a plan.
    #[error("Quote failed: {0}")]
    QuoteFailed(String),
    /// Transaction composition or signing failed.
    #[error("Signing failed: {0}")]
    SignFailed(String),
    /// The node rejected or did not accept the raw transaction.
    #[error("Broadcast failed: {0}")]
    BroadcastFailed(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl WalletError {
    /// Whether the failure was in transport rather than in the request itself.
    ///
    /// The engine never retries on its own; this only informs the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WalletError::NetworkUnavailable(_))
    }

    /// Whether money may have left the wallet when this error was raised.
    ///
    /// A broadcast that failed after the request was sent may still have been
    /// relayed by the node.
    pub fn is_ambiguous_submission(&self) -> bool {
        matches!(self, WalletError::BroadcastFailed(_))
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WalletError::NetworkUnavailable(format!("request timed out: {}", err))
        } else {
            WalletError::NetworkUnavailable(err.to_string())
        }
    }
}

impl From<rust_decimal::Error> for WalletError {
    fn from(err: rust_decimal::Error) -> Self {
        WalletError::InvalidAmount(err.to_string())
    }
}
