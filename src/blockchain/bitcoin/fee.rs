//! Static transaction-size fee heuristic.
//!
//! `bytes = inputs * 180 + outputs * 34 + 10`, `fee = bytes * fee_per_byte`.
//! Not a live fee oracle: the same counts and rate always give the same fee.

pub const INPUT_BYTES: u64 = 180;
pub const OUTPUT_BYTES: u64 = 34;
pub const OVERHEAD_BYTES: u64 = 10;

/// Output shape assumed when quoting: recipient, service fee, change.
pub const QUOTE_OUTPUTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimator {
    fee_per_byte: u64,
}

impl FeeEstimator {
    pub fn new(fee_per_byte: u64) -> Self {
        Self { fee_per_byte }
    }

    pub fn fee_per_byte(&self) -> u64 {
        self.fee_per_byte
    }

    /// Estimated serialized size in bytes.
    pub fn size(input_count: usize, output_count: usize) -> u64 {
        (input_count as u64)
            .saturating_mul(INPUT_BYTES)
            .saturating_add((output_count as u64).saturating_mul(OUTPUT_BYTES))
            .saturating_add(OVERHEAD_BYTES)
    }

    /// Fee in smallest units for the given shape.
    pub fn estimate(&self, input_count: usize, output_count: usize) -> u64 {
        Self::size(input_count, output_count).saturating_mul(self.fee_per_byte)
    }
}
