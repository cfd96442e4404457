//! Arbitrary-precision coin amounts.
//!
//! Amounts are 256-bit unsigned integers and travel as decimal strings in
//! JSON, the same way the Cosmos SDK encodes `sdk.Int`.

use std::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An amount of a single denomination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    #[serde(with = "decimal")]
    pub amount: U256,
}

/// Errors from parsing or adding coin amounts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoinError {
    #[error("invalid amount `{0}`")]
    InvalidAmount(String),
    #[error("denom mismatch: {0} vs {1}")]
    DenomMismatch(String, String),
    #[error("amount overflow")]
    Overflow,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: U256) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    pub fn zero(denom: impl Into<String>) -> Self {
        Self::new(denom, U256::ZERO)
    }

    /// Parse a decimal amount such as `"8000000"`.
    pub fn parse(denom: impl Into<String>, amount: &str) -> Result<Self, CoinError> {
        Ok(Self::new(denom, parse_amount(amount)?))
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn checked_add(&self, other: &Coin) -> Result<Coin, CoinError> {
        if self.denom != other.denom {
            return Err(CoinError::DenomMismatch(
                self.denom.clone(),
                other.denom.clone(),
            ));
        }
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(CoinError::Overflow)?;
        Ok(Coin::new(self.denom.clone(), amount))
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

fn parse_amount(s: &str) -> Result<U256, CoinError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoinError::InvalidAmount(s.to_string()));
    }
    U256::from_str_radix(s, 10).map_err(|_| CoinError::InvalidAmount(s.to_string()))
}

mod decimal {
    use super::*;

    pub fn serialize<S: Serializer>(amount: &U256, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(d)?;
        parse_amount(&raw).map_err(serde::de::Error::custom)
    }
}
