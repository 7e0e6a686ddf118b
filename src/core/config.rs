use crate::core::errors::WalletError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;

/// Active network for a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[serde(alias = "main")]
    Mainnet,
    #[default]
    #[serde(alias = "test")]
    Testnet,
}

impl Network {
    /// Anything other than `mainnet` selects the test network.
    pub fn from_selector(selector: &str) -> Self {
        if selector.trim().eq_ignore_ascii_case("mainnet") {
            Network::Mainnet
        } else {
            Network::Testnet
        }
    }

    pub fn is_mainnet(&self) -> bool {
        matches!(self, Network::Mainnet)
    }
}

/// HTTP settings shared by every endpoint client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Upper bound on each request, in seconds. There is no retry.
    #[serde(default = "ClientConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ClientConfig {
    fn default_timeout_secs() -> u64 {
        30
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { timeout_secs: Self::default_timeout_secs() }
    }
}

/// Bitcoin endpoints, credentials and fee policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinConfig {
    #[serde(default)]
    pub network: Network,
    pub node_mainnet: String,
    pub node_testnet: String,
    pub explorer_mainnet: String,
    pub explorer_testnet: String,
    pub public_explorer_mainnet: String,
    pub public_explorer_testnet: String,
    #[serde(default)]
    pub api_key: String,
    /// Satoshi per estimated byte.
    #[serde(default = "BitcoinConfig::default_fee_per_byte")]
    pub fee_per_byte: u64,
    /// Fraction of the transferred value charged by the platform (0.002 = 0.2 %).
    #[serde(default = "default_service_fee_rate")]
    pub service_fee_rate: Decimal,
    /// Where the service fee is paid. The sender's own address when unset.
    #[serde(default)]
    pub service_fee_address: Option<String>,
}

impl BitcoinConfig {
    fn default_fee_per_byte() -> u64 {
        10
    }

    pub fn node_endpoint(&self) -> &str {
        match self.network {
            Network::Mainnet => &self.node_mainnet,
            Network::Testnet => &self.node_testnet,
        }
    }

    pub fn explorer_endpoint(&self) -> &str {
        match self.network {
            Network::Mainnet => &self.explorer_mainnet,
            Network::Testnet => &self.explorer_testnet,
        }
    }

    pub fn public_explorer_endpoint(&self) -> &str {
        match self.network {
            Network::Mainnet => &self.public_explorer_mainnet,
            Network::Testnet => &self.public_explorer_testnet,
        }
    }

    /// Same endpoints for both networks; handy for tests against a mock server.
    pub fn single_endpoint(network: Network, node: &str, explorer: &str, public_explorer: &str) -> Self {
        Self {
            network,
            node_mainnet: node.to_string(),
            node_testnet: node.to_string(),
            explorer_mainnet: explorer.to_string(),
            explorer_testnet: explorer.to_string(),
            public_explorer_mainnet: public_explorer.to_string(),
            public_explorer_testnet: public_explorer.to_string(),
            api_key: String::new(),
            fee_per_byte: Self::default_fee_per_byte(),
            service_fee_rate: default_service_fee_rate(),
            service_fee_address: None,
        }
    }

    pub fn from_env() -> Result<Self, WalletError> {
        Ok(Self {
            network: Network::from_selector(&env::var("BTC_NET").unwrap_or_default()),
            node_mainnet: env_or("BTC_NODE_MAINNET", "https://btc.nownodes.io"),
            node_testnet: env_or("BTC_NODE_TESTNET", "https://btc-testnet.nownodes.io"),
            explorer_mainnet: env_or("BTC_EXPLORER_MAINNET", "https://btcbook.nownodes.io/api/v2"),
            explorer_testnet: env_or(
                "BTC_EXPLORER_TESTNET",
                "https://btcbook-testnet.nownodes.io/api/v2",
            ),
            public_explorer_mainnet: env_or(
                "BTC_EXPLORER_PUBLIC_MAINNET",
                "https://blockstream.info",
            ),
            public_explorer_testnet: env_or(
                "BTC_EXPLORER_PUBLIC_TESTNET",
                "https://blockstream.info/testnet",
            ),
            api_key: env::var("BTC_NODE_API_KEY").unwrap_or_default(),
            fee_per_byte: env_parse("BTC_FEE_PER_BYTE")?.unwrap_or(Self::default_fee_per_byte()),
            service_fee_rate: env_parse("BTC_SERVICE_FEE_RATE")?
                .unwrap_or_else(default_service_fee_rate),
            service_fee_address: env::var("BTC_SERVICE_FEE_ADDRESS").ok().filter(|s| !s.is_empty()),
        })
    }
}

/// Account-based chain settings (Ethereum and ERC-20 tokens on it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthereumConfig {
    #[serde(default)]
    pub network: Network,
    pub rpc_url: String,
    pub chain_id: u64,
    pub public_explorer: String,
    #[serde(default = "default_service_fee_rate")]
    pub service_fee_rate: Decimal,
    /// ERC-20 contract address; `None` for the native coin.
    #[serde(default)]
    pub token_contract: Option<String>,
    #[serde(default = "EthereumConfig::default_token_decimals")]
    pub token_decimals: u32,
}

impl EthereumConfig {
    fn default_token_decimals() -> u32 {
        6
    }

    pub fn is_token(&self) -> bool {
        self.token_contract.is_some()
    }

    pub fn from_env() -> Result<Option<Self>, WalletError> {
        let Ok(rpc_url) = env::var("ETH_RPC_URL") else {
            return Ok(None);
        };
        let network = Network::from_selector(&env::var("ETH_NET").unwrap_or_default());
        let chain_id = env_parse("ETH_CHAIN_ID")?
            .unwrap_or(if network.is_mainnet() { 1 } else { 11155111 });
        let public_explorer = env::var("ETH_EXPLORER_PUBLIC").unwrap_or_else(|_| {
            if network.is_mainnet() {
                "https://etherscan.io".to_string()
            } else {
                "https://sepolia.etherscan.io".to_string()
            }
        });

        Ok(Some(Self {
            network,
            rpc_url,
            chain_id,
            public_explorer,
            service_fee_rate: env_parse("ETH_SERVICE_FEE_RATE")?
                .unwrap_or_else(default_service_fee_rate),
            token_contract: None,
            token_decimals: Self::default_token_decimals(),
        }))
    }

    /// The same node settings pointed at an ERC-20 contract.
    pub fn for_token(&self, contract: &str, decimals: u32) -> Self {
        Self {
            token_contract: Some(contract.to_string()),
            token_decimals: decimals,
            ..self.clone()
        }
    }
}

/// Everything the chain service factory needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub http: ClientConfig,
    pub bitcoin: BitcoinConfig,
    #[serde(default)]
    pub ethereum: Option<EthereumConfig>,
    #[serde(default)]
    pub tether: Option<EthereumConfig>,
}

impl EngineConfig {
    /// Reads the configuration surface from the process environment.
    pub fn from_env() -> Result<Self, WalletError> {
        let http = ClientConfig {
            timeout_secs: env_parse("ENGINE_HTTP_TIMEOUT_SECS")?
                .unwrap_or(ClientConfig::default_timeout_secs()),
        };
        let ethereum = EthereumConfig::from_env()?;
        let tether = match (&ethereum, env::var("USDT_CONTRACT")) {
            (Some(eth), Ok(contract)) if !contract.is_empty() => Some(eth.for_token(&contract, 6)),
            _ => None,
        };

        Ok(Self { http, bitcoin: BitcoinConfig::from_env()?, ethereum, tether })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, WalletError> {
        toml::from_str(raw).map_err(|e| WalletError::ConfigError(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WalletError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }
}

fn default_service_fee_rate() -> Decimal {
    // 0.2 %
    Decimal::new(2, 3)
}

fn env_or(key: &str, fallback: &str) -> String {
    env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| fallback.to_string())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, WalletError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| WalletError::ConfigError(format!("{}={}: {}", key, raw, e))),
        _ => Ok(None),
    }
}
