//! Account-based chain service: Ether and ERC-20 tokens on Ethereum.
//!
//! Same contract as the Bitcoin service, but fees are gas price times gas
//! limit, ordering comes from the account nonce and there is nothing to
//! select. The service fee is quoted for the caller; only the principal
//! transfer is settled on chain.

use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use ethers::utils::{format_units, parse_units, to_checksum};
use rust_decimal::{Decimal, RoundingStrategy};
use secrecy::{ExposeSecret, SecretString};
use std::str::FromStr;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::client::build_http_client;
use super::traits::BlockchainService;
use crate::core::config::{ClientConfig, EthereumConfig};
use crate::core::domain::{
    AddressSnapshot, BroadcastResult, Chain, KeyPair, SignedTransaction, TransactionPlan,
    TransferOrder, TransferRequest,
};
use crate::core::errors::WalletError;

/// Gas for a plain value transfer.
pub const NATIVE_TRANSFER_GAS: u64 = 21_000;
/// Gas budget for an ERC-20 `transfer`.
pub const TOKEN_TRANSFER_GAS: u64 = 65_000;

const ETHER_DECIMALS: u32 = 18;

pub struct EthereumService {
    config: EthereumConfig,
    provider: Provider<Http>,
    token: Option<Address>,
}

impl EthereumService {
    /// Builds the provider without touching the network; the chain id comes
    /// from configuration.
    pub fn new(config: EthereumConfig, http: &ClientConfig) -> Result<Self, WalletError> {
        let url = reqwest::Url::parse(config.rpc_url.trim()).map_err(|e| {
            WalletError::ConfigError(format!("invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        let client = build_http_client(http, None)?;
        let provider = Provider::new(Http::new_with_client(url, client));

        let token = config
            .token_contract
            .as_deref()
            .map(|contract| {
                Address::from_str(contract.trim()).map_err(|e| {
                    WalletError::ConfigError(format!("invalid token contract {}: {}", contract, e))
                })
            })
            .transpose()?;

        info!(
            chain_id = config.chain_id,
            token = ?config.token_contract,
            "Ethereum service configured"
        );
        Ok(Self { config, provider, token })
    }

    fn decimals(&self) -> u32 {
        if self.token.is_some() {
            self.config.token_decimals
        } else {
            ETHER_DECIMALS
        }
    }

    fn gas_limit(&self) -> u64 {
        if self.token.is_some() {
            TOKEN_TRANSFER_GAS
        } else {
            NATIVE_TRANSFER_GAS
        }
    }

    /// Display amount -> base units (wei or token base units).
    pub fn to_base_units(&self, amount: Decimal) -> Result<U256, WalletError> {
        to_base_units(amount, self.decimals())
    }

    /// Base units -> display amount.
    pub fn to_display(&self, amount: U256) -> Result<Decimal, WalletError> {
        to_display(amount, self.decimals())
    }

    async fn balance_of(&self, owner: Address) -> Result<U256, WalletError> {
        match self.token {
            None => self
                .provider
                .get_balance(owner, None)
                .await
                .map_err(|e| WalletError::NetworkUnavailable(format!("eth_getBalance: {}", e))),
            Some(contract) => {
                let call: TypedTransaction = TransactionRequest::new()
                    .to(contract)
                    .data(balance_of_calldata(owner))
                    .into();
                let raw = self
                    .provider
                    .call(&call, None)
                    .await
                    .map_err(|e| WalletError::NetworkUnavailable(format!("balanceOf: {}", e)))?;
                if raw.len() < 32 {
                    return Err(WalletError::NetworkUnavailable(format!(
                        "balanceOf returned {} bytes",
                        raw.len()
                    )));
                }
                Ok(U256::from_big_endian(&raw[..32]))
            }
        }
    }

    async fn read_address(&self, address: &str) -> Result<AddressSnapshot, WalletError> {
        let owner = parse_address(address)?;
        let balance = self.balance_of(owner).await?;
        let nonce = self
            .provider
            .get_transaction_count(owner, None)
            .await
            .map_err(|e| WalletError::NetworkUnavailable(format!("eth_getTransactionCount: {}", e)))?;

        Ok(AddressSnapshot {
            address: to_checksum(&owner, None),
            balance: self.to_display(balance)?,
            total_received: 0,
            total_sent: 0,
            tx_count: nonce.low_u64(),
            tx_ids: Vec::new(),
        })
    }

    fn unsigned_transfer(
        &self,
        from: Address,
        to: Address,
        value: U256,
        gas_price: U256,
        nonce: U256,
    ) -> TypedTransaction {
        let request = TransactionRequest::new()
            .from(from)
            .gas(self.gas_limit())
            .gas_price(gas_price)
            .nonce(nonce)
            .chain_id(self.config.chain_id);

        let request = match self.token {
            None => request.to(to).value(value),
            Some(contract) => {
                request.to(contract).value(U256::zero()).data(transfer_calldata(to, value))
            }
        };
        request.into()
    }
}

#[async_trait]
impl BlockchainService for EthereumService {
    fn chain(&self) -> Chain {
        if self.token.is_some() {
            Chain::Tether
        } else {
            Chain::Ethereum
        }
    }

    fn create(&self) -> Result<KeyPair, WalletError> {
        let wallet = LocalWallet::new(&mut rand::thread_rng());
        let secret = Zeroizing::new(hex::encode(wallet.signer().to_bytes().as_slice()));
        Ok(KeyPair::new(to_checksum(&wallet.address(), None), secret.to_string()))
    }

    async fn get_address(&self, address: &str) -> Option<AddressSnapshot> {
        match self.read_address(address).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(address, chain = %self.chain(), error = %e, "address not fetched");
                None
            }
        }
    }

    async fn calculate_tx(&self, request: &TransferRequest) -> Result<TransactionPlan, WalletError> {
        let value = self.to_base_units(request.value)?;
        if value.is_zero() {
            return Err(WalletError::InvalidAmount("transfer value must be positive".to_string()));
        }
        let value = u128_from(value)?;
        let from = parse_address(&request.from)?;
        parse_address(&request.to)?;

        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| WalletError::QuoteFailed(format!("eth_gasPrice: {}", e)))?;
        let network_fee = gas_price
            .checked_mul(U256::from(self.gas_limit()))
            .ok_or_else(|| WalletError::QuoteFailed("gas cost overflows".to_string()))?;

        let balance = self
            .balance_of(from)
            .await
            .map_err(|e| WalletError::QuoteFailed(e.to_string()))?;
        let mut required = U256::from(value);
        if self.token.is_none() {
            required = required.saturating_add(network_fee);
        }
        if balance < required {
            return Err(WalletError::InsufficientFunds(format!(
                "{} holds {}, transfer needs {}",
                request.from, balance, required
            )));
        }

        let display_value = self.to_display(U256::from(value))?;
        let service_fee = (display_value * self.config.service_fee_rate)
            .round_dp_with_strategy(self.decimals(), RoundingStrategy::ToZero);
        let network_fee_ether = to_display(network_fee, ETHER_DECIMALS)?;

        // Token fees are denominated in the token; gas is paid in ether.
        let total_fee = match self.token {
            None => network_fee_ether + service_fee,
            Some(_) => service_fee,
        };
        let plan = TransactionPlan {
            chain: self.chain(),
            value,
            from: request.from.clone(),
            to: request.to.clone(),
            network_fee: u128_from(network_fee)?,
            service_fee,
            total_fee,
            total_input: display_value + total_fee,
            total_output: display_value,
        };

        info!(
            chain = %plan.chain,
            from = %plan.from,
            to = %plan.to,
            value,
            network_fee = %network_fee,
            "transfer quoted"
        );
        Ok(plan)
    }

    async fn sign_transaction(
        &self,
        plan: &TransactionPlan,
        private_key: &SecretString,
    ) -> Result<SignedTransaction, WalletError> {
        let wallet = wallet_from_hex(private_key.expose_secret())?.with_chain_id(self.config.chain_id);
        let from = parse_address(&plan.from)?;
        if wallet.address() != from {
            return Err(WalletError::InvalidPrivateKey(format!(
                "key does not control {}",
                plan.from
            )));
        }
        let to = parse_address(&plan.to)?;

        let gas_price = U256::from(plan.network_fee) / U256::from(self.gas_limit());
        let nonce = self
            .provider
            .get_transaction_count(from, None)
            .await
            .map_err(|e| WalletError::NetworkUnavailable(format!("eth_getTransactionCount: {}", e)))?;
        debug!(nonce = %nonce, gas_price = %gas_price, "signing transfer");

        let tx = self.unsigned_transfer(from, to, U256::from(plan.value), gas_price, nonce);
        let signature = wallet
            .sign_transaction_sync(&tx)
            .map_err(|e| WalletError::SignFailed(e.to_string()))?;
        let raw = tx.rlp_signed(&signature);

        info!(hash = ?tx.hash(&signature), chain = %self.chain(), "transfer signed");
        Ok(SignedTransaction::from_hex(format!("0x{}", hex::encode(raw.as_ref()))))
    }

    async fn send_transaction(&self, order: &TransferOrder) -> Result<BroadcastResult, WalletError> {
        self.get_address(&order.from).await.ok_or_else(|| {
            WalletError::NetworkUnavailable(format!("source address {} not readable", order.from))
        })?;

        let plan = self.calculate_tx(&order.request()).await.map_err(|e| match e {
            WalletError::InsufficientFunds(_)
            | WalletError::InvalidAmount(_)
            | WalletError::InvalidAddress(_)
            | WalletError::QuoteFailed(_) => e,
            other => WalletError::QuoteFailed(other.to_string()),
        })?;
        let signed = self.sign_transaction(&plan, &order.private_key).await?;

        let raw = hex::decode(signed.as_hex().trim_start_matches("0x"))
            .map_err(|e| WalletError::SignFailed(e.to_string()))?;
        let pending = self
            .provider
            .send_raw_transaction(Bytes::from(raw))
            .await
            .map_err(|e| WalletError::BroadcastFailed(format!("eth_sendRawTransaction: {}", e)))?;
        let hash = format!("0x{}", hex::encode(pending.tx_hash().as_bytes()));

        info!(hash = %hash, chain = %self.chain(), "transfer broadcast");
        let link = self.explorer_link(&hash);
        Ok(BroadcastResult::from_plan(&plan, hash, link))
    }

    async fn get_latest_block(&self) -> Option<u64> {
        match self.provider.get_block_number().await {
            Ok(number) => Some(number.as_u64()),
            Err(e) => {
                warn!(error = %e, "chain head not fetched");
                None
            }
        }
    }

    fn explorer_link(&self, hash: &str) -> String {
        format!("{}/tx/{}", self.config.public_explorer.trim_end_matches('/'), hash)
    }
}

fn parse_address(address: &str) -> Result<Address, WalletError> {
    Address::from_str(address.trim())
        .map_err(|e| WalletError::InvalidAddress(format!("{}: {}", address, e)))
}

fn wallet_from_hex(raw: &str) -> Result<LocalWallet, WalletError> {
    let bytes = Zeroizing::new(
        hex::decode(raw.trim().trim_start_matches("0x"))
            .map_err(|_| WalletError::InvalidPrivateKey("not hex".to_string()))?,
    );
    if bytes.len() != 32 {
        return Err(WalletError::InvalidPrivateKey("private key must be 32 bytes".to_string()));
    }
    LocalWallet::from_bytes(&bytes).map_err(|e| WalletError::InvalidPrivateKey(e.to_string()))
}

fn to_base_units(amount: Decimal, decimals: u32) -> Result<U256, WalletError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(WalletError::InvalidAmount(format!("negative amount: {}", amount)));
    }
    let rounded = amount.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    parse_units(rounded.to_string(), decimals)
        .map(U256::from)
        .map_err(|e| WalletError::InvalidAmount(format!("{}: {}", amount, e)))
}

fn to_display(amount: U256, decimals: u32) -> Result<Decimal, WalletError> {
    let text = format_units(amount, decimals)
        .map_err(|e| WalletError::InvalidAmount(format!("{}: {}", amount, e)))?;
    Decimal::from_str(&text)
        .map(|d| d.normalize())
        .map_err(|e| WalletError::InvalidAmount(format!("{}: {}", text, e)))
}

fn u128_from(value: U256) -> Result<u128, WalletError> {
    if value > U256::from(u128::MAX) {
        return Err(WalletError::InvalidAmount(format!("{} exceeds 128 bits", value)));
    }
    Ok(value.as_u128())
}

fn transfer_calldata(to: Address, value: U256) -> Bytes {
    let mut data = ethers::utils::id("transfer(address,uint256)").to_vec();
    data.extend(abi::encode(&[Token::Address(to), Token::Uint(value)]));
    Bytes::from(data)
}

fn balance_of_calldata(owner: Address) -> Bytes {
    let mut data = ethers::utils::id("balanceOf(address)").to_vec();
    data.extend(abi::encode(&[Token::Address(owner)]));
    Bytes::from(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Network;

    fn config(token: Option<&str>) -> EthereumConfig {
        EthereumConfig {
            network: Network::Testnet,
            rpc_url: "http://127.0.0.1:9".to_string(),
            chain_id: 11155111,
            public_explorer: "https://sepolia.etherscan.io/".to_string(),
            service_fee_rate: Decimal::new(2, 3),
            token_contract: token.map(str::to_string),
            token_decimals: 6,
        }
    }

    fn service(token: Option<&str>) -> EthereumService {
        EthereumService::new(config(token), &ClientConfig::default()).unwrap()
    }

    const USDT: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";

    #[test]
    fn test_chain_follows_token_setting() {
        assert_eq!(service(None).chain(), Chain::Ethereum);
        assert_eq!(service(Some(USDT)).chain(), Chain::Tether);
        assert_eq!(service(None).gas_limit(), NATIVE_TRANSFER_GAS);
        assert_eq!(service(Some(USDT)).gas_limit(), TOKEN_TRANSFER_GAS);
    }

    #[test]
    fn test_bad_configuration_rejected() {
        let mut bad_url = config(None);
        bad_url.rpc_url = "not a url".to_string();
        assert!(matches!(
            EthereumService::new(bad_url, &ClientConfig::default()),
            Err(WalletError::ConfigError(_))
        ));
        assert!(matches!(
            EthereumService::new(config(Some("0x1234")), &ClientConfig::default()),
            Err(WalletError::ConfigError(_))
        ));
    }

    #[test]
    fn test_create_produces_matching_key_and_address() {
        let svc = service(None);
        let pair = svc.create().unwrap();
        assert!(pair.address.starts_with("0x"));
        assert_eq!(pair.address.len(), 42);

        let wallet = wallet_from_hex(pair.expose_private_key()).unwrap();
        assert_eq!(to_checksum(&wallet.address(), None), pair.address);
    }

    #[test]
    fn test_unit_conversion() {
        let ether = service(None);
        assert_eq!(
            ether.to_base_units(Decimal::from_str("1.5").unwrap()).unwrap(),
            U256::from(1_500_000_000_000_000_000u128)
        );
        let tether = service(Some(USDT));
        assert_eq!(tether.to_base_units(Decimal::from_str("12.345678").unwrap()).unwrap(), U256::from(12_345_678u64));
        assert_eq!(tether.to_display(U256::from(2_500_000u64)).unwrap(), Decimal::from_str("2.5").unwrap());
        assert!(matches!(
            tether.to_base_units(Decimal::from_str("-1").unwrap()),
            Err(WalletError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_transfer_calldata_layout() {
        let to = Address::from_low_u64_be(0xbeef);
        let data = transfer_calldata(to, U256::from(1_000_000u64));
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(data[4 + 63], 0x40);
        assert_eq!(&balance_of_calldata(to)[..4], &[0x70, 0xa0, 0x82, 0x31]);
    }

    #[test]
    fn test_wallet_from_hex_rejects_garbage() {
        assert!(matches!(wallet_from_hex("zz"), Err(WalletError::InvalidPrivateKey(_))));
        assert!(matches!(wallet_from_hex("00ff"), Err(WalletError::InvalidPrivateKey(_))));
    }

    #[test]
    fn test_explorer_link() {
        assert_eq!(service(None).explorer_link("0xabc"), "https://sepolia.etherscan.io/tx/0xabc");
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let svc = service(None);
        let from = svc.create().unwrap().address;
        let to = svc.create().unwrap().address;

        assert!(svc.get_address(&from).await.is_none());
        assert!(svc.get_balance(&from).await.is_none());
        assert!(svc.get_utxo(&from, 1).await.is_none());
        assert!(svc.get_latest_block().await.is_none());

        let request = TransferRequest { from, to, value: Decimal::ONE };
        assert!(matches!(svc.calculate_tx(&request).await, Err(WalletError::QuoteFailed(_))));
    }

    #[tokio::test]
    async fn test_sign_refuses_foreign_key() {
        let svc = service(None);
        let owner = svc.create().unwrap();
        let stranger = svc.create().unwrap();
        let plan = TransactionPlan {
            chain: Chain::Ethereum,
            value: 1,
            from: owner.address.clone(),
            to: stranger.address.clone(),
            network_fee: 21_000,
            service_fee: Decimal::ZERO,
            total_fee: Decimal::ZERO,
            total_input: Decimal::ZERO,
            total_output: Decimal::ZERO,
        };
        let err = svc.sign_transaction(&plan, &stranger.private_key).await.unwrap_err();
        assert!(matches!(err, WalletError::InvalidPrivateKey(_)));
    }
}
