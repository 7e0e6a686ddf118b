//! Transaction composition and signing
//!
//! Builds a P2PKH transaction paying the recipient, the service fee and the
//! change back to the sender, then signs every input with one key.

use crate::core::domain::UnspentOutput;
use crate::core::errors::WalletError;
use bitcoin::absolute::LockTime;
use bitcoin::address::Address;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::script::PushBytesBuf;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, PrivateKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use std::str::FromStr;
use tracing::{debug, info};

/// Change below this is not worth an output and is left to miners.
pub const DUST_THRESHOLD: u64 = 546;

/// Everything needed to lay out the outputs of a transfer.
#[derive(Debug, Clone)]
pub struct TransferLayout<'a> {
    pub recipient: &'a Address,
    pub value: u64,
    pub fee_recipient: &'a Address,
    pub service_fee: u64,
    pub change_address: &'a Address,
    pub network_fee: u64,
}

pub struct BitcoinTransaction;

impl BitcoinTransaction {
    /// Builds and signs. Deterministic for identical inputs, layout and key.
    pub fn build(
        key: &PrivateKey,
        inputs: &[UnspentOutput],
        layout: &TransferLayout<'_>,
    ) -> Result<Transaction, WalletError> {
        info!(
            value = layout.value,
            service_fee = layout.service_fee,
            network_fee = layout.network_fee,
            inputs = inputs.len(),
            "Composing transaction"
        );

        if layout.value == 0 {
            return Err(WalletError::InvalidAmount("transfer value must be positive".to_string()));
        }
        if inputs.is_empty() {
            return Err(WalletError::InsufficientFunds("no inputs selected".to_string()));
        }

        let total_input = inputs
            .iter()
            .try_fold(0u64, |acc, u| acc.checked_add(u.amount))
            .ok_or_else(|| WalletError::InvalidAmount("sum of inputs overflows".to_string()))?;
        let spend = layout
            .value
            .checked_add(layout.service_fee)
            .and_then(|v| v.checked_add(layout.network_fee))
            .ok_or_else(|| WalletError::InvalidAmount("spend overflows".to_string()))?;
        if total_input < spend {
            return Err(WalletError::InsufficientFunds(format!(
                "need {} sat, inputs hold {} sat",
                spend, total_input
            )));
        }
        let change = total_input - spend;

        let secp = Secp256k1::new();
        let own_script = ScriptBuf::new_p2pkh(&key.public_key(&secp).pubkey_hash());

        let mut tx_inputs = Vec::with_capacity(inputs.len());
        let mut locking_scripts = Vec::with_capacity(inputs.len());
        for utxo in inputs {
            let txid = bitcoin::Txid::from_str(&utxo.tx_id)
                .map_err(|e| WalletError::SignFailed(format!("bad txid {}: {}", utxo.tx_id, e)))?;
            let script = if utxo.locking_script.is_empty() {
                own_script.clone()
            } else {
                ScriptBuf::from_hex(&utxo.locking_script).map_err(|e| {
                    WalletError::SignFailed(format!("bad locking script for {}: {}", utxo.tx_id, e))
                })?
            };
            if script != own_script {
                return Err(WalletError::SignFailed(format!(
                    "output {}:{} is not spendable by this key",
                    utxo.tx_id, utxo.output_index
                )));
            }

            tx_inputs.push(TxIn {
                previous_output: OutPoint { txid, vout: utxo.output_index },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            });
            locking_scripts.push(script);
        }

        let mut outputs = vec![TxOut {
            value: Amount::from_sat(layout.value),
            script_pubkey: layout.recipient.script_pubkey(),
        }];
        if layout.service_fee > 0 {
            outputs.push(TxOut {
                value: Amount::from_sat(layout.service_fee),
                script_pubkey: layout.fee_recipient.script_pubkey(),
            });
        }
        if change >= DUST_THRESHOLD {
            outputs.push(TxOut {
                value: Amount::from_sat(change),
                script_pubkey: layout.change_address.script_pubkey(),
            });
        } else if change > 0 {
            debug!(change, "change below dust threshold, left to miners");
        }

        let mut tx = Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: tx_inputs,
            output: outputs,
        };

        let public_key = key.public_key(&secp).to_bytes();
        let mut script_sigs = Vec::with_capacity(locking_scripts.len());
        {
            let cache = SighashCache::new(&tx);
            for (i, script) in locking_scripts.iter().enumerate() {
                let sighash = cache
                    .legacy_signature_hash(i, script, EcdsaSighashType::All.to_u32())
                    .map_err(|e| WalletError::SignFailed(format!("sighash for input {}: {}", i, e)))?;

                let message = Message::from_digest(*sighash.as_byte_array());
                let signature = secp.sign_ecdsa(&message, &key.inner);

                let mut sig_bytes = signature.serialize_der().to_vec();
                sig_bytes.push(EcdsaSighashType::All.to_u32() as u8);

                let sig_push = PushBytesBuf::try_from(sig_bytes)
                    .map_err(|e| WalletError::SignFailed(format!("signature push: {:?}", e)))?;
                let pk_push = PushBytesBuf::try_from(public_key.clone())
                    .map_err(|e| WalletError::SignFailed(format!("public key push: {:?}", e)))?;

                script_sigs.push(
                    bitcoin::blockdata::script::Builder::new()
                        .push_slice(sig_push)
                        .push_slice(pk_push)
                        .into_script(),
                );
            }
        }
        for (input, script_sig) in tx.input.iter_mut().zip(script_sigs) {
            input.script_sig = script_sig;
        }

        debug!(txid = %tx.txid(), "Transaction signed");
        Ok(tx)
    }

    pub fn serialize(tx: &Transaction) -> String {
        serialize_hex(tx)
    }
}
