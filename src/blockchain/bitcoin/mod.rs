//! Bitcoin chain support
//!
//! Legacy P2PKH keys and transactions, a node JSON-RPC client for relaying,
//! and a Blockbook-style explorer client for balances and unspent outputs.

pub mod account;
pub mod client;
pub mod explorer;
pub mod fee;
pub mod service;
pub mod transaction;
pub mod utxo;

pub use client::NodeClient;
pub use explorer::ExplorerClient;
pub use fee::FeeEstimator;
pub use service::BitcoinService;
pub use transaction::BitcoinTransaction;
pub use utxo::{Selection, UtxoSelector};
