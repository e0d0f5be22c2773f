// tally/core/ledger/src/rate.rs

// Numerator/denominator conversion between external-token units and ledger units
use primitive_types::{U256, U512};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LedgerError, Result};

/// Highest decimal precision the rescaling arithmetic accepts
pub const MAX_DECIMALS: u8 = 36;

/// `ledger = external * numerator / denominator`, truncating toward zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    numerator: U256,
    denominator: U256,
}

impl ExchangeRate {
    pub fn new(numerator: U256, denominator: U256) -> Result<Self> {
        if numerator.is_zero() || denominator.is_zero() {
            return Err(LedgerError::ZeroRate);
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    pub fn one_to_one() -> Self {
        Self {
            numerator: U256::one(),
            denominator: U256::one(),
        }
    }

    pub fn numerator(&self) -> U256 {
        self.numerator
    }

    pub fn denominator(&self) -> U256 {
        self.denominator
    }

    /// External-token amount -> ledger units
    pub fn to_ledger_units(&self, external: U256) -> Result<U256> {
        mul_div(external, self.numerator, self.denominator)
    }

    /// Ledger units -> external-token amount
    pub fn to_external_units(&self, ledger: U256) -> Result<U256> {
        mul_div(ledger, self.denominator, self.numerator)
    }

    /// Rate that keeps ledger units worth the same after the backing token's
    /// precision moves from `from_decimals` to `to_decimals`.
    pub fn rescale_for_decimals(&self, from_decimals: u8, to_decimals: u8) -> Result<Self> {
        let (numerator, denominator) = if to_decimals >= from_decimals {
            let factor = pow10(to_decimals - from_decimals)?;
            (
                self.numerator,
                self.denominator
                    .checked_mul(factor)
                    .ok_or(LedgerError::ArithmeticOverflow)?,
            )
        } else {
            let factor = pow10(from_decimals - to_decimals)?;
            (
                self.numerator
                    .checked_mul(factor)
                    .ok_or(LedgerError::ArithmeticOverflow)?,
                self.denominator,
            )
        };
        Self::new(numerator, denominator)
    }
}

impl Default for ExchangeRate {
    fn default() -> Self {
        Self::one_to_one()
    }
}

impl fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.numerator, self.denominator)
    }
}

/// `floor(a * b / c)` through a 512-bit intermediate
pub fn mul_div(a: U256, b: U256, c: U256) -> Result<U256> {
    if c.is_zero() {
        return Err(LedgerError::ZeroRate);
    }
    let product = a.full_mul(b);
    narrow(product / U512::from(c))
}

pub fn pow10(exponent: u8) -> Result<U256> {
    if exponent > 77 {
        return Err(LedgerError::ArithmeticOverflow);
    }
    Ok(U256::exp10(exponent as usize))
}

fn narrow(value: U512) -> Result<U256> {
    U256::try_from(value).map_err(|_| LedgerError::ArithmeticOverflow)
}
