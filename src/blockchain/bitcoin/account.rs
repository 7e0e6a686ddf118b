//! Bitcoin key generation, private key parsing and address checks.

use crate::core::config::Network as EngineNetwork;
use crate::core::domain::KeyPair;
use crate::core::errors::WalletError;
use bitcoin::address::Address;
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::{Network, PrivateKey};
use rand::RngCore;
use std::str::FromStr;
use tracing::{debug, info};
use zeroize::Zeroize;

/// Maps the engine's network selector onto the bitcoin crate's.
pub fn bitcoin_network(network: EngineNetwork) -> Network {
    match network {
        EngineNetwork::Mainnet => Network::Bitcoin,
        EngineNetwork::Testnet => Network::Testnet,
    }
}

/// Generates a fresh P2PKH key pair; the private key is WIF-encoded.
pub fn generate(network: Network) -> Result<KeyPair, WalletError> {
    info!("Generating Bitcoin key pair for {:?}", network);

    let mut rng = rand::rngs::OsRng;
    let mut secret_bytes = [0u8; 32];
    rng.fill_bytes(&mut secret_bytes);

    let secret_key = SecretKey::from_slice(&secret_bytes);
    secret_bytes.zeroize();
    let secret_key = secret_key.map_err(|e| {
        WalletError::InvalidPrivateKey(format!("generated key out of range: {}", e))
    })?;

    let private_key = PrivateKey::new(secret_key, network);
    let address = p2pkh_address(&private_key, network);

    debug!(address = %address, "Bitcoin key pair generated");
    Ok(KeyPair::new(address.to_string(), private_key.to_wif()))
}

/// Parses a WIF or 64-char hex private key and checks it belongs to `network`.
pub fn parse_private_key(raw: &str, network: Network) -> Result<PrivateKey, WalletError> {
    let raw = raw.trim();

    if raw.len() == 64 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
        let mut bytes = hex::decode(raw)
            .map_err(|e| WalletError::InvalidPrivateKey(format!("bad hex: {}", e)))?;
        let secret_key = SecretKey::from_slice(&bytes);
        bytes.zeroize();
        let secret_key = secret_key
            .map_err(|e| WalletError::InvalidPrivateKey(format!("key out of range: {}", e)))?;
        return Ok(PrivateKey::new(secret_key, network));
    }

    let key = PrivateKey::from_wif(raw)
        .map_err(|e| WalletError::InvalidPrivateKey(format!("bad WIF: {}", e)))?;

    let same_kind = (key.network == Network::Bitcoin) == (network == Network::Bitcoin);
    if !same_kind {
        return Err(WalletError::InvalidPrivateKey(format!(
            "key is for {:?}, service runs on {:?}",
            key.network, network
        )));
    }
    Ok(key)
}

/// P2PKH address controlled by `key`.
pub fn p2pkh_address(key: &PrivateKey, network: Network) -> Address {
    let secp = Secp256k1::new();
    Address::p2pkh(&key.public_key(&secp), network)
}

/// Parses `address` and checks it is valid on `network`.
pub fn require_address(address: &str, network: Network) -> Result<Address, WalletError> {
    Address::from_str(address.trim())
        .map_err(|e| WalletError::InvalidAddress(format!("{}: {}", address, e)))?
        .require_network(network)
        .map_err(|e| WalletError::InvalidAddress(format!("{}: {}", address, e)))
}
