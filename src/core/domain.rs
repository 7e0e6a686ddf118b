use crate::core::errors::WalletError;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currencies the engine can build a service for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Chain {
    Bitcoin,
    Ethereum,
    /// USDT as an ERC-20 token on Ethereum.
    Tether,
}

impl Chain {
    pub fn symbol(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "BTC",
            Chain::Ethereum => "ETH",
            Chain::Tether => "USDT",
        }
    }

    /// UTXO-based chains select prior outputs; account-based chains use nonces.
    pub fn is_utxo_based(&self) -> bool {
        matches!(self, Chain::Bitcoin)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Chain {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BTC" => Ok(Chain::Bitcoin),
            "ETH" => Ok(Chain::Ethereum),
            "USDT" => Ok(Chain::Tether),
            other => Err(WalletError::UnsupportedChain(other.to_string())),
        }
    }
}

impl From<Chain> for String {
    fn from(chain: Chain) -> Self {
        chain.symbol().to_string()
    }
}

impl TryFrom<String> for Chain {
    type Error = WalletError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Freshly generated wallet credentials.
///
/// The private key stays wrapped so it never ends up in `Debug` output;
/// persisting it is the caller's job.
#[derive(Debug)]
pub struct KeyPair {
    pub address: String,
    pub private_key: SecretString,
}

impl KeyPair {
    pub fn new(address: String, private_key: String) -> Self {
        Self { address, private_key: SecretString::new(private_key) }
    }

    pub fn expose_private_key(&self) -> &str {
        self.private_key.expose_secret()
    }
}

/// Point-in-time view of an address, recomputed on every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressSnapshot {
    pub address: String,
    /// Confirmed balance in display units.
    pub balance: Decimal,
    /// Smallest units ever received, as reported by the explorer.
    pub total_received: u64,
    /// Smallest units ever sent, as reported by the explorer.
    pub total_sent: u64,
    pub tx_count: u64,
    pub tx_ids: Vec<String>,
}

/// A spendable prior transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub tx_id: String,
    pub output_index: u32,
    pub address: String,
    /// Hex-encoded locking script (scriptPubKey).
    pub locking_script: String,
    /// Amount in smallest units.
    pub amount: u64,
}

/// Input to a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    /// Amount in display units.
    pub value: Decimal,
}

/// Input to a send: a quote request plus the key that authorises it.
#[derive(Debug)]
pub struct TransferOrder {
    pub from: String,
    pub to: String,
    pub value: Decimal,
    pub private_key: SecretString,
}

impl TransferOrder {
    pub fn new(from: &str, to: &str, value: Decimal, private_key: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            value,
            private_key: SecretString::new(private_key.to_string()),
        }
    }

    pub fn request(&self) -> TransferRequest {
        TransferRequest { from: self.from.clone(), to: self.to.clone(), value: self.value }
    }
}

/// Economics of a prospective transfer, produced by `calculate_tx`.
///
/// `total_input == total_output + network_fee (display) + service_fee` and
/// `total_output` is the transferred value in display units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPlan {
    pub chain: Chain,
    /// Transferred value in smallest units.
    pub value: u128,
    pub from: String,
    pub to: String,
    /// Network fee in smallest units of the chain's native coin.
    pub network_fee: u128,
    pub service_fee: Decimal,
    /// Network fee plus service fee, display units.
    pub total_fee: Decimal,
    pub total_input: Decimal,
    pub total_output: Decimal,
}

/// Serialized, broadcast-ready transaction. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction(String);

impl SignedTransaction {
    pub fn from_hex(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Terminal record of an accepted broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastResult {
    pub value: u128,
    pub from: String,
    pub to: String,
    pub hash: String,
    pub network_fee: u128,
    pub total_fee: Decimal,
    pub service_fee: Decimal,
    pub total_input: Decimal,
    pub total_output: Decimal,
    pub explorer_link: String,
}

impl BroadcastResult {
    pub fn from_plan(plan: &TransactionPlan, hash: String, explorer_link: String) -> Self {
        Self {
            value: plan.value,
            from: plan.from.clone(),
            to: plan.to.clone(),
            hash,
            network_fee: plan.network_fee,
            total_fee: plan.total_fee,
            service_fee: plan.service_fee,
            total_input: plan.total_input,
            total_output: plan.total_output,
            explorer_link,
        }
    }
}
