use crate::error::{BillingError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Eur,
    Usd,
    Dkk,
    Sek,
    Gbp,
}

impl Currency {
    pub const ALL: [Currency; 5] = [
        Currency::Eur,
        Currency::Usd,
        Currency::Dkk,
        Currency::Sek,
        Currency::Gbp,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
            Currency::Dkk => "DKK",
            Currency::Sek => "SEK",
            Currency::Gbp => "GBP",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// An amount of money in a given currency.
///
/// Wraps a `rust_decimal::Decimal` so that billing amounts can never be negative.
/// Equality is structural: `10.5 EUR` and `10.5 USD` are different values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMoney")]
pub struct Money {
    value: Decimal,
    currency: Currency,
}

/// Unvalidated wire form of `Money`.
#[derive(Deserialize)]
struct RawMoney {
    value: Decimal,
    currency: Currency,
}

impl TryFrom<RawMoney> for Money {
    type Error = BillingError;

    fn try_from(raw: RawMoney) -> Result<Self> {
        Money::new(raw.value, raw.currency)
    }
}

impl Money {
    pub fn new(value: Decimal, currency: Currency) -> Result<Self> {
        if value < Decimal::ZERO {
            return Err(BillingError::ValidationError(format!(
                "Amount must not be negative, got {value} {currency}"
            )));
        }
        Ok(Self { value, currency })
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}
