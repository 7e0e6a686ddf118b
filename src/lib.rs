//! Chain-agnostic transaction engine.
//!
//! One [`BlockchainService`](blockchain::BlockchainService) contract covers key
//! generation, balance and UTXO reads, fee quoting, signing and broadcast;
//! [`ChainServiceFactory`](blockchain::ChainServiceFactory) hands out the
//! implementation for a currency symbol.

pub mod blockchain;
pub mod core;

pub use crate::blockchain::{BlockchainService, ChainServiceFactory};
pub use crate::core::errors::WalletError;
