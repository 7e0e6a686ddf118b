//! Symbol-keyed registry of chain services.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::traits::BlockchainService;
use crate::core::config::EngineConfig;
use crate::core::domain::Chain;
use crate::core::errors::WalletError;

/// Maps currency symbols to constructed services. Adding a chain means
/// registering one more service here; callers never branch on the chain.
#[derive(Default, Clone)]
pub struct ChainServiceFactory {
    services: HashMap<Chain, Arc<dyn BlockchainService>>,
}

impl ChainServiceFactory {
    /// Builds every service the configuration enables.
    pub fn new(config: &EngineConfig) -> Result<Self, WalletError> {
        let mut factory = Self::default();

        #[cfg(feature = "bitcoin")]
        factory.register(Arc::new(super::bitcoin::BitcoinService::new(
            config.bitcoin.clone(),
            &config.http,
        )?));

        #[cfg(feature = "ethereum")]
        {
            if let Some(ethereum) = &config.ethereum {
                if ethereum.is_token() {
                    return Err(WalletError::ConfigError(
                        "[ethereum] must not set token_contract; tokens go under [tether]".to_string(),
                    ));
                }
                factory.register(Arc::new(super::ethereum::EthereumService::new(
                    ethereum.clone(),
                    &config.http,
                )?));
            }
            if let Some(tether) = &config.tether {
                // Without a contract this would register as a second ETH service.
                if !tether.is_token() {
                    return Err(WalletError::ConfigError(
                        "[tether] requires token_contract".to_string(),
                    ));
                }
                factory.register(Arc::new(super::ethereum::EthereumService::new(
                    tether.clone(),
                    &config.http,
                )?));
            }
        }

        info!(chains = ?factory.symbols(), "chain services ready");
        Ok(factory)
    }

    /// Adds or replaces the service for its chain.
    pub fn register(&mut self, service: Arc<dyn BlockchainService>) {
        self.services.insert(service.chain(), service);
    }

    /// Looks up a service by symbol, e.g. `"BTC"`.
    pub fn service(&self, symbol: &str) -> Result<Arc<dyn BlockchainService>, WalletError> {
        let chain: Chain = symbol.parse()?;
        self.services
            .get(&chain)
            .cloned()
            .ok_or_else(|| WalletError::UnsupportedChain(format!("{} is not configured", chain)))
    }

    pub fn symbols(&self) -> Vec<&'static str> {
        let mut symbols: Vec<_> = self.services.keys().map(|c| c.symbol()).collect();
        symbols.sort_unstable();
        symbols
    }
}
