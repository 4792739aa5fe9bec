//! # Money
//!
//! Fee amounts, currencies and checked decimal arithmetic.
//!
//! Fees are plain [`Decimal`] values; this module supplies the
//! [`CheckedArithmetic`] extension used by strategy math so no
//! calculation can panic, plus a validated ISO 4217 [`Currency`] code.
//!
//! # Examples
//!
//! ```
//! use dealdesk::domain::value_objects::money::{CheckedArithmetic, round_fee};
//! use rust_decimal::Decimal;
//!
//! let fee = Decimal::new(800, 0).safe_mul(Decimal::new(125, 2)).unwrap();
//! assert_eq!(round_fee(fee), Decimal::new(1000, 0));
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of decimal places fees are rounded to.
pub const FEE_DECIMAL_PLACES: u32 = 2;

/// Currency used when a deal does not specify one.
pub const DEFAULT_CURRENCY: &str = "AUD";

/// Error type for arithmetic failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ArithmeticError {
    /// Result does not fit in a decimal.
    #[error("arithmetic overflow")]
    Overflow,

    /// Result underflowed.
    #[error("arithmetic underflow")]
    Underflow,

    /// Division by zero attempted.
    #[error("division by zero")]
    DivisionByZero,
}

/// Result type for arithmetic operations.
pub type ArithmeticResult<T> = Result<T, ArithmeticError>;

/// Checked arithmetic that returns errors instead of panicking.
pub trait CheckedArithmetic: Sized {
    /// Adds two values.
    ///
    /// # Errors
    ///
    /// Returns `ArithmeticError::Overflow` if the result would overflow.
    fn safe_add(self, rhs: Self) -> ArithmeticResult<Self>;

    /// Subtracts two values.
    ///
    /// # Errors
    ///
    /// Returns `ArithmeticError::Underflow` if the result would underflow.
    fn safe_sub(self, rhs: Self) -> ArithmeticResult<Self>;

    /// Multiplies two values.
    ///
    /// # Errors
    ///
    /// Returns `ArithmeticError::Overflow` if the result would overflow.
    fn safe_mul(self, rhs: Self) -> ArithmeticResult<Self>;

    /// Divides two values.
    ///
    /// # Errors
    ///
    /// Returns `ArithmeticError::DivisionByZero` if the divisor is zero.
    fn safe_div(self, rhs: Self) -> ArithmeticResult<Self>;
}

impl CheckedArithmetic for Decimal {
    #[inline]
    fn safe_add(self, rhs: Self) -> ArithmeticResult<Self> {
        self.checked_add(rhs).ok_or(ArithmeticError::Overflow)
    }

    #[inline]
    fn safe_sub(self, rhs: Self) -> ArithmeticResult<Self> {
        self.checked_sub(rhs).ok_or(ArithmeticError::Underflow)
    }

    #[inline]
    fn safe_mul(self, rhs: Self) -> ArithmeticResult<Self> {
        self.checked_mul(rhs).ok_or(ArithmeticError::Overflow)
    }

    #[inline]
    fn safe_div(self, rhs: Self) -> ArithmeticResult<Self> {
        if rhs.is_zero() {
            return Err(ArithmeticError::DivisionByZero);
        }
        self.checked_div(rhs).ok_or(ArithmeticError::Overflow)
    }
}

/// Rounds a fee to cents, half away from zero.
#[inline]
#[must_use]
pub fn round_fee(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(FEE_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Arithmetic mean of a slice of decimals, `None` when empty.
///
/// # Errors
///
/// Returns an arithmetic error if the sum overflows.
pub fn mean(values: &[Decimal]) -> ArithmeticResult<Option<Decimal>> {
    if values.is_empty() {
        return Ok(None);
    }
    let mut sum = Decimal::ZERO;
    for value in values {
        sum = sum.safe_add(*value)?;
    }
    let count = Decimal::from(values.len() as u64);
    sum.safe_div(count).map(Some)
}

/// Error returned when parsing an invalid currency code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid currency code: {0}")]
pub struct InvalidCurrencyError(pub String);

/// Three-letter upper-case ISO 4217 currency code.
///
/// # Examples
///
/// ```
/// use dealdesk::domain::value_objects::money::Currency;
///
/// let aud: Currency = "aud".parse().unwrap();
/// assert_eq!(aud.as_str(), "AUD");
/// assert!("dollars".parse::<Currency>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Returns the currency code.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self(DEFAULT_CURRENCY.to_string())
    }
}

impl FromStr for Currency {
    type Err = InvalidCurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
            Ok(Self(code))
        } else {
            Err(InvalidCurrencyError(s.to_string()))
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = InvalidCurrencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod checked {
        use super::*;

        #[test]
        fn safe_ops_work() {
            let a = Decimal::new(100, 0);
            let b = Decimal::new(4, 0);
            assert_eq!(a.safe_add(b).unwrap(), Decimal::new(104, 0));
            assert_eq!(a.safe_sub(b).unwrap(), Decimal::new(96, 0));
            assert_eq!(a.safe_mul(b).unwrap(), Decimal::new(400, 0));
            assert_eq!(a.safe_div(b).unwrap(), Decimal::new(25, 0));
        }

        #[test]
        fn division_by_zero_fails() {
            assert_eq!(
                Decimal::ONE.safe_div(Decimal::ZERO),
                Err(ArithmeticError::DivisionByZero)
            );
        }

        #[test]
        fn overflow_fails() {
            assert_eq!(
                Decimal::MAX.safe_add(Decimal::ONE),
                Err(ArithmeticError::Overflow)
            );
            assert_eq!(
                Decimal::MAX.safe_mul(Decimal::TWO),
                Err(ArithmeticError::Overflow)
            );
        }
    }

    mod rounding {
        use super::*;

        #[test]
        fn rounds_half_away_from_zero() {
            assert_eq!(round_fee(Decimal::new(12345, 3)), Decimal::new(1235, 2));
            assert_eq!(round_fee(Decimal::new(12344, 3)), Decimal::new(1234, 2));
        }

        #[test]
        fn mean_of_values() {
            let values = [Decimal::new(100, 0), Decimal::new(200, 0)];
            assert_eq!(mean(&values).unwrap(), Some(Decimal::new(150, 0)));
            assert_eq!(mean(&[]).unwrap(), None);
        }
    }

    mod currency {
        use super::*;

        #[test]
        fn default_is_aud() {
            assert_eq!(Currency::default().as_str(), "AUD");
        }

        #[test]
        fn rejects_bad_codes() {
            assert!("US".parse::<Currency>().is_err());
            assert!("U5D".parse::<Currency>().is_err());
        }

        #[test]
        fn serde_validates() {
            let ok: Currency = serde_json::from_str("\"usd\"").unwrap();
            assert_eq!(ok.as_str(), "USD");
            assert!(serde_json::from_str::<Currency>("\"nope\"").is_err());
        }
    }
}
