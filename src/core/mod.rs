pub mod config;
pub mod domain;
pub mod errors;
pub mod units;

pub use config::{BitcoinConfig, ClientConfig, EngineConfig, EthereumConfig, Network};
pub use domain::{
    AddressSnapshot, BroadcastResult, Chain, KeyPair, SignedTransaction, TransactionPlan,
    TransferOrder, TransferRequest, UnspentOutput,
};
pub use errors::WalletError;
pub use units::UnitConverter;
