//! Conversion between a chain's smallest indivisible unit and its display unit.

use crate::core::errors::WalletError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Converts amounts for a chain with a fixed number of fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitConverter {
    decimals: u32,
}

impl UnitConverter {
    /// Bitcoin: 1 BTC = 100_000_000 satoshi.
    pub const BITCOIN: UnitConverter = UnitConverter { decimals: 8 };
    /// Tether (ERC-20): 1 USDT = 1_000_000 base units.
    pub const TETHER: UnitConverter = UnitConverter { decimals: 6 };

    pub const fn new(decimals: u32) -> Self {
        Self { decimals }
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Display amount -> smallest unit.
    ///
    /// Digits beyond the chain's precision are rounded half away from zero.
    /// Negative amounts are rejected.
    pub fn to_smallest_unit(&self, amount: Decimal) -> Result<u64, WalletError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(WalletError::InvalidAmount(format!("negative amount: {}", amount)));
        }

        let rounded =
            amount.round_dp_with_strategy(self.decimals, RoundingStrategy::MidpointAwayFromZero);
        let scaled = rounded
            .checked_mul(self.scale())
            .ok_or_else(|| WalletError::InvalidAmount(format!("amount overflows: {}", amount)))?;

        scaled
            .to_u64()
            .ok_or_else(|| WalletError::InvalidAmount(format!("amount out of range: {}", amount)))
    }

    /// Smallest unit -> display amount. Always exact.
    pub fn to_display_unit(&self, amount: u64) -> Decimal {
        Decimal::from_i128_with_scale(amount as i128, self.decimals)
    }

    fn scale(&self) -> Decimal {
        Decimal::from_i128_with_scale(10i128.pow(self.decimals), 0)
    }
}
