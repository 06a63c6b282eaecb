//! Marketplace fee calculator.
//!
//! `fee = floor(price * fee_percent / 100) + minimum_fee`, in minor units.
//! A fee that would swallow the whole price is rejected rather than clamped.

use serde::{Deserialize, Serialize};

use super::money::Money;
use crate::error::DomainError;

/// Percentage of the listing price kept by the marketplace.
pub const DEFAULT_FEE_PERCENT: i64 = 4;

/// Flat fee added on top of the percentage, in minor units.
pub const DEFAULT_MINIMUM_FEE: i64 = 100;

const PERCENT_DIVISOR: i64 = 100;

/// Fee parameters, injected from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicy {
    fee_percent: i64,
    minimum_fee: i64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            fee_percent: DEFAULT_FEE_PERCENT,
            minimum_fee: DEFAULT_MINIMUM_FEE,
        }
    }
}

impl FeePolicy {
    /// Creates a fee policy. The percentage must be in `0..100`.
    pub fn new(fee_percent: i64, minimum_fee: i64) -> Result<Self, DomainError> {
        if !(0..PERCENT_DIVISOR).contains(&fee_percent) {
            return Err(DomainError::ValidationError(format!(
                "Fee percent must be between 0 and 99, got {}",
                fee_percent
            )));
        }
        if minimum_fee < 0 {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Self {
            fee_percent,
            minimum_fee,
        })
    }

    pub fn fee_percent(&self) -> i64 {
        self.fee_percent
    }

    pub fn minimum_fee(&self) -> i64 {
        self.minimum_fee
    }

    /// Computes the fee for a price in minor units.
    ///
    /// # Errors
    /// - `InvalidPrice` when `price_in_cents <= 0`
    /// - `FeeExceedsPrice` when the fee would be greater than or equal to the price
    pub fn fee(&self, price_in_cents: i64) -> Result<i64, DomainError> {
        if price_in_cents <= 0 {
            return Err(DomainError::InvalidPrice(price_in_cents));
        }

        let fee = price_in_cents
            .checked_mul(self.fee_percent)
            .map(|scaled| scaled / PERCENT_DIVISOR)
            .and_then(|pct| pct.checked_add(self.minimum_fee))
            .ok_or(DomainError::InvalidPrice(price_in_cents))?;

        if fee >= price_in_cents {
            return Err(DomainError::FeeExceedsPrice {
                fee,
                price: price_in_cents,
            });
        }

        Ok(fee)
    }

    /// Computes the fee for a price, keeping the price's currency.
    pub fn calculate(&self, price: Money) -> Result<Money, DomainError> {
        let fee = self.fee(price.amount())?;
        Money::new(fee, price.currency())
    }
}
