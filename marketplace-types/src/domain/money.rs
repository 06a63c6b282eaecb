//! Type-safe monetary value with embedded currency.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::error::DomainError;

/// ISO 4217 currencies a listing may be priced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    PLN,
    INR,
}

impl Currency {
    /// Returns the ISO code as used by the payment provider (lowercase).
    pub fn provider_code(&self) -> &'static str {
        match self {
            Currency::USD => "usd",
            Currency::EUR => "eur",
            Currency::GBP => "gbp",
            Currency::PLN => "pln",
            Currency::INR => "inr",
        }
    }

    /// Returns the currency symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::PLN => "zł",
            Currency::INR => "₹",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::str::FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "PLN" => Ok(Currency::PLN),
            "INR" => Ok(Currency::INR),
            _ => Err(DomainError::ValidationError(format!(
                "Unsupported currency: {}",
                s
            ))),
        }
    }
}

/// Type-safe money representation with embedded currency.
///
/// Amount is stored in the smallest unit of the currency (cents, grosze, etc.)
/// to avoid floating-point precision issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Money {
    amount: i64,
    currency: Currency,
}

impl Money {
    /// Creates a new Money value.
    pub fn new(amount: i64, currency: Currency) -> Result<Self, DomainError> {
        if amount < 0 {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Self { amount, currency })
    }

    /// Creates a zero-value Money for the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: 0,
            currency,
        }
    }

    /// Returns the amount in smallest currency unit.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Returns the currency.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Checked subtraction - returns error if currencies don't match or result would be negative.
    pub fn checked_sub(&self, other: Money) -> Result<Money, DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency,
                got: other.currency,
            });
        }
        if self.amount < other.amount {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Money {
            amount: self.amount - other.amount,
            currency: self.currency,
        })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let major = self.amount / 100;
        let minor = (self.amount % 100).abs();
        write!(f, "{}{}.{:02}", self.currency.symbol(), major, minor)
    }
}
