use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::SecretString;

use crate::core::domain::{
    AddressSnapshot, BroadcastResult, Chain, KeyPair, SignedTransaction, TransactionPlan,
    TransferOrder, TransferRequest, UnspentOutput,
};
use crate::core::errors::WalletError;

/// The uniform contract every supported chain implements.
///
/// Read operations return `None` when the answer is unknown (the endpoint
/// failed); callers must never read `None` as zero. Quote, sign and send
/// return an explicit error instead.
#[async_trait]
pub trait BlockchainService: Send + Sync {
    /// The chain this service settles on.
    fn chain(&self) -> Chain;

    /// Generates a fresh key pair for the active network.
    fn create(&self) -> Result<KeyPair, WalletError>;

    /// Explorer-backed address summary.
    async fn get_address(&self, address: &str) -> Option<AddressSnapshot>;

    /// Balance in display units; a projection of [`get_address`](Self::get_address).
    async fn get_balance(&self, address: &str) -> Option<Decimal> {
        self.get_address(address).await.map(|snapshot| snapshot.balance)
    }

    /// Spendable outputs of `address` that each cover `amount` smallest units,
    /// smallest first.
    ///
    /// Account-based chains have no outputs to select and return `None`.
    async fn get_utxo(&self, address: &str, amount: u64) -> Option<Vec<UnspentOutput>> {
        let _ = (address, amount);
        None
    }

    /// Quotes a transfer without touching chain state.
    async fn calculate_tx(&self, request: &TransferRequest) -> Result<TransactionPlan, WalletError>;

    /// Builds and signs the transaction described by `plan`.
    ///
    /// The key is only borrowed for the duration of the call.
    async fn sign_transaction(
        &self,
        plan: &TransactionPlan,
        private_key: &SecretString,
    ) -> Result<SignedTransaction, WalletError>;

    /// Re-quotes, signs and broadcasts. Never trusts a caller-supplied plan.
    async fn send_transaction(&self, order: &TransferOrder) -> Result<BroadcastResult, WalletError>;

    /// Current chain height, for liveness checks.
    async fn get_latest_block(&self) -> Option<u64>;

    /// Human-facing link to a transaction on the public explorer.
    fn explorer_link(&self, hash: &str) -> String;
}
