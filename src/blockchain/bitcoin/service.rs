//! Bitcoin implementation of the chain service contract.

use async_trait::async_trait;
use bitcoin::Network;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::account::{self, bitcoin_network, require_address};
use super::client::NodeClient;
use super::explorer::{ExplorerBlock, ExplorerClient};
use super::fee::{FeeEstimator, QUOTE_OUTPUTS};
use super::transaction::{BitcoinTransaction, TransferLayout, DUST_THRESHOLD};
use super::utxo::UtxoSelector;
use crate::blockchain::client::build_http_client;
use crate::blockchain::traits::BlockchainService;
use crate::core::config::{BitcoinConfig, ClientConfig};
use crate::core::domain::{
    AddressSnapshot, BroadcastResult, Chain, KeyPair, SignedTransaction, TransactionPlan,
    TransferOrder, TransferRequest, UnspentOutput,
};
use crate::core::errors::WalletError;
use crate::core::units::UnitConverter;

/// Bitcoin chain service. Holds configuration only; no per-call state.
pub struct BitcoinService {
    config: BitcoinConfig,
    network: Network,
    units: UnitConverter,
    fees: FeeEstimator,
    node: NodeClient,
    explorer: ExplorerClient,
}

impl BitcoinService {
    pub fn new(config: BitcoinConfig, http: &ClientConfig) -> Result<Self, WalletError> {
        let http_client = build_http_client(http, Some(config.api_key.as_str()))?;
        let network = bitcoin_network(config.network);

        if let Some(fee_address) = &config.service_fee_address {
            require_address(fee_address, network).map_err(|e| {
                WalletError::ConfigError(format!("service fee address: {}", e))
            })?;
        }

        info!(
            network = ?network,
            node = %config.node_endpoint(),
            explorer = %config.explorer_endpoint(),
            "Bitcoin service configured"
        );

        Ok(Self {
            node: NodeClient::new(config.node_endpoint(), &config.api_key, http_client.clone()),
            explorer: ExplorerClient::new(config.explorer_endpoint(), http_client),
            units: UnitConverter::BITCOIN,
            fees: FeeEstimator::new(config.fee_per_byte),
            network,
            config,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn to_satoshis(&self, btc: Decimal) -> Result<u64, WalletError> {
        self.units.to_smallest_unit(btc)
    }

    pub fn to_btc(&self, satoshis: u64) -> Decimal {
        self.units.to_display_unit(satoshis)
    }

    /// Network fee for a transaction shape, in satoshi.
    pub fn calculate_fee(&self, inputs: usize, outputs: usize) -> u64 {
        self.fees.estimate(inputs, outputs)
    }

    /// Platform fee on `value` satoshi, rounded down to whole satoshi.
    pub fn service_fee_for(&self, value: u64) -> Result<u64, WalletError> {
        (Decimal::from(value) * self.config.service_fee_rate)
            .floor()
            .to_u64()
            .ok_or_else(|| WalletError::InvalidAmount(format!("service fee on {} sat", value)))
    }

    /// Verbose node lookup of a transaction.
    pub async fn get_raw_transaction(&self, txid: &str) -> Option<Value> {
        match self.node.get_raw_transaction(txid).await {
            Ok(tx) => Some(tx),
            Err(e) => {
                warn!(txid, error = %e, "raw transaction not fetched");
                None
            }
        }
    }

    pub async fn get_block(&self, height: u64) -> Option<ExplorerBlock> {
        match self.explorer.get_block(height).await {
            Ok(block) => Some(block),
            Err(e) => {
                warn!(height, error = %e, "block not fetched");
                None
            }
        }
    }

    /// Prices a transfer against already-fetched candidate outputs.
    ///
    /// Change that would fall below the dust threshold is not paid out, so it
    /// is counted into the network fee the plan reports.
    pub fn plan_transfer(
        &self,
        request: &TransferRequest,
        candidates: &[UnspentOutput],
    ) -> Result<TransactionPlan, WalletError> {
        let value = self.to_satoshis(request.value)?;
        if value == 0 {
            return Err(WalletError::InvalidAmount("transfer value must be positive".to_string()));
        }

        let service_fee_sat = self.service_fee_for(value)?;
        let target = value
            .checked_add(service_fee_sat)
            .ok_or_else(|| WalletError::InvalidAmount("value plus service fee overflows".into()))?;
        let selection = UtxoSelector::accumulate(candidates, target, |inputs| {
            self.fees.estimate(inputs, QUOTE_OUTPUTS)
        })?;

        let change = selection.total - target - selection.fee;
        let network_fee = if change < DUST_THRESHOLD {
            selection.fee + change
        } else {
            selection.fee
        };

        let service_fee = self.to_btc(service_fee_sat);
        let total_fee = self.to_btc(network_fee) + service_fee;
        let total_output = self.to_btc(value);
        let plan = TransactionPlan {
            chain: Chain::Bitcoin,
            value: value as u128,
            from: request.from.clone(),
            to: request.to.clone(),
            network_fee: network_fee as u128,
            service_fee,
            total_fee,
            total_input: total_output + total_fee,
            total_output,
        };

        info!(
            from = %plan.from,
            to = %plan.to,
            value,
            network_fee,
            dust = network_fee - selection.fee,
            service_fee = %plan.service_fee,
            inputs = selection.inputs.len(),
            "BTC transfer quoted"
        );
        Ok(plan)
    }

    fn fee_recipient(&self, sender: &bitcoin::Address) -> Result<bitcoin::Address, WalletError> {
        match &self.config.service_fee_address {
            Some(address) => require_address(address, self.network),
            None => Ok(sender.clone()),
        }
    }
}

#[async_trait]
impl BlockchainService for BitcoinService {
    fn chain(&self) -> Chain {
        Chain::Bitcoin
    }

    fn create(&self) -> Result<KeyPair, WalletError> {
        account::generate(self.network)
    }

    async fn get_address(&self, address: &str) -> Option<AddressSnapshot> {
        let response = match self.explorer.get_address(address).await {
            Ok(response) => response,
            Err(e) => {
                warn!(address, error = %e, "BTC address not fetched");
                return None;
            }
        };

        Some(AddressSnapshot {
            address: address.to_string(),
            balance: self.to_btc(response.balance),
            total_received: response.total_received,
            total_sent: response.total_sent,
            tx_count: response.txs,
            tx_ids: response.txids.unwrap_or_default(),
        })
    }

    async fn get_utxo(&self, address: &str, amount: u64) -> Option<Vec<UnspentOutput>> {
        let locking_script = match require_address(address, self.network) {
            Ok(parsed) => hex::encode(parsed.script_pubkey().as_bytes()),
            Err(e) => {
                warn!(address, error = %e, "UTXO lookup for unusable address");
                return None;
            }
        };

        let raw = match self.explorer.get_utxo(address).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(address, error = %e, "BTC UTXO not fetched");
                return None;
            }
        };

        let utxos: Vec<UnspentOutput> = raw
            .into_iter()
            .map(|u| UnspentOutput {
                tx_id: u.txid,
                output_index: u.vout,
                address: address.to_string(),
                locking_script: locking_script.clone(),
                amount: u.value,
            })
            .collect();

        let candidates = UtxoSelector::candidates(&utxos, amount);
        debug!(address, found = utxos.len(), usable = candidates.len(), "UTXO candidates");
        Some(candidates)
    }

    async fn calculate_tx(&self, request: &TransferRequest) -> Result<TransactionPlan, WalletError> {
        let value = self.to_satoshis(request.value)?;
        if value == 0 {
            return Err(WalletError::InvalidAmount("transfer value must be positive".to_string()));
        }
        require_address(&request.from, self.network)?;
        require_address(&request.to, self.network)?;

        let utxos = self
            .get_utxo(&request.from, value)
            .await
            .ok_or_else(|| WalletError::QuoteFailed("UTXO lookup failed".to_string()))?;
        if utxos.is_empty() {
            return Err(WalletError::InsufficientFunds(format!(
                "no single output of {} covers {} sat",
                request.from, value
            )));
        }

        self.plan_transfer(request, &utxos)
    }

    async fn sign_transaction(
        &self,
        plan: &TransactionPlan,
        private_key: &SecretString,
    ) -> Result<SignedTransaction, WalletError> {
        let key = account::parse_private_key(private_key.expose_secret(), self.network)?;
        let sender = require_address(&plan.from, self.network)?;
        let recipient = require_address(&plan.to, self.network)?;
        let fee_recipient = self.fee_recipient(&sender)?;

        let value = u64::try_from(plan.value)
            .map_err(|_| WalletError::InvalidAmount(format!("{} sat out of range", plan.value)))?;
        let network_fee = u64::try_from(plan.network_fee).map_err(|_| {
            WalletError::InvalidAmount(format!("{} sat fee out of range", plan.network_fee))
        })?;
        let service_fee = self.to_satoshis(plan.service_fee)?;

        let utxos = self.get_utxo(&plan.from, value).await.ok_or_else(|| {
            WalletError::NetworkUnavailable("UTXO lookup failed while signing".to_string())
        })?;
        // The quoted fee already absorbs dust change, so the same inputs come
        // back and the composer leaves no change output behind.
        let target = value.saturating_add(service_fee);
        let selection = UtxoSelector::accumulate(&utxos, target, |_| network_fee)?;

        let layout = TransferLayout {
            recipient: &recipient,
            value,
            fee_recipient: &fee_recipient,
            service_fee,
            change_address: &sender,
            network_fee,
        };
        let tx = BitcoinTransaction::build(&key, &selection.inputs, &layout)?;

        info!(txid = %tx.txid(), inputs = tx.input.len(), outputs = tx.output.len(), "BTC transaction signed");
        Ok(SignedTransaction::from_hex(BitcoinTransaction::serialize(&tx)))
    }

    async fn send_transaction(&self, order: &TransferOrder) -> Result<BroadcastResult, WalletError> {
        self.get_address(&order.from).await.ok_or_else(|| {
            WalletError::NetworkUnavailable(format!("source address {} not readable", order.from))
        })?;

        // Always re-quote: a caller-held plan may be stale.
        let plan = self.calculate_tx(&order.request()).await.map_err(|e| match e {
            WalletError::InsufficientFunds(_)
            | WalletError::InvalidAmount(_)
            | WalletError::InvalidAddress(_)
            | WalletError::QuoteFailed(_) => e,
            other => WalletError::QuoteFailed(other.to_string()),
        })?;

        let signed = self.sign_transaction(&plan, &order.private_key).await?;
        let hash = self.node.send_raw_transaction(signed.as_hex()).await?;
        let explorer_link = self.explorer_link(&hash);

        info!(hash = %hash, from = %plan.from, to = %plan.to, "BTC transfer broadcast");
        Ok(BroadcastResult::from_plan(&plan, hash, explorer_link))
    }

    async fn get_latest_block(&self) -> Option<u64> {
        match self.explorer.get_best_height().await {
            Ok(height) => Some(height),
            Err(e) => {
                warn!(error = %e, "BTC chain head not fetched");
                None
            }
        }
    }

    fn explorer_link(&self, hash: &str) -> String {
        format!("{}/tx/{}", self.config.public_explorer_endpoint().trim_end_matches('/'), hash)
    }
}
