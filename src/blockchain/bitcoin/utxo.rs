//! UTXO selection.
//!
//! Smallest-first and deliberately simple: fragmentation of the wallet's
//! output set is not optimised.

use crate::core::domain::UnspentOutput;
use crate::core::errors::WalletError;
use tracing::debug;

/// Outcome of accumulating inputs for a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub inputs: Vec<UnspentOutput>,
    /// Sum of the selected amounts, smallest units.
    pub total: u64,
    /// Network fee for the selected input count, smallest units.
    pub fee: u64,
}

pub struct UtxoSelector;

impl UtxoSelector {
    /// Outputs that individually cover `required`, smallest first.
    pub fn candidates(utxos: &[UnspentOutput], required: u64) -> Vec<UnspentOutput> {
        let mut candidates: Vec<UnspentOutput> =
            utxos.iter().filter(|u| u.amount >= required).cloned().collect();
        candidates.sort_by(|a, b| a.amount.cmp(&b.amount));
        candidates
    }

    /// Single-output pick: the smallest output that covers `required`.
    pub fn select(utxos: &[UnspentOutput], required: u64) -> Option<UnspentOutput> {
        utxos.iter().filter(|u| u.amount >= required).min_by_key(|u| u.amount).cloned()
    }

    /// Accumulates `utxos` in ascending order until the running sum covers
    /// `target + fee_for(inputs_so_far)`.
    ///
    /// `target` already includes everything except the network fee.
    pub fn accumulate<F>(
        utxos: &[UnspentOutput],
        target: u64,
        fee_for: F,
    ) -> Result<Selection, WalletError>
    where
        F: Fn(usize) -> u64,
    {
        if utxos.is_empty() {
            return Err(WalletError::InsufficientFunds("no spendable outputs".to_string()));
        }

        let mut sorted = utxos.to_vec();
        sorted.sort_by(|a, b| a.amount.cmp(&b.amount));

        let mut inputs = Vec::new();
        let mut total = 0u64;
        for utxo in sorted {
            total = total.checked_add(utxo.amount).ok_or_else(|| {
                WalletError::InvalidAmount("sum of outputs overflows".to_string())
            })?;
            inputs.push(utxo);

            let fee = fee_for(inputs.len());
            let required = target.checked_add(fee).ok_or_else(|| {
                WalletError::InvalidAmount("required amount overflows".to_string())
            })?;
            if total >= required {
                debug!(inputs = inputs.len(), total, fee, "inputs selected");
                return Ok(Selection { inputs, total, fee });
            }
        }

        Err(WalletError::InsufficientFunds(format!(
            "need {} sat plus fee, {} sat available",
            target, total
        )))
    }
}
