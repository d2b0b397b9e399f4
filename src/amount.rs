use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use thiserror::Error;

/// Currency amount in minor units (cents), stored as a plain integer.
///
/// All ledger arithmetic happens on this type. Decimal major units only exist
/// at the HTTP boundary, via [`Amount::try_from_major`] and [`Amount::to_major`].
///
/// Deserialized amounts are bounded by [`Amount::MAX`] in magnitude, and the
/// operators saturate, so no input can overflow a ledger sum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

/// Errors raised when converting a decimal amount into minor units.
#[derive(Debug, Error, PartialEq)]
pub enum AmountError {
    #[error("amount is not a finite number")]
    NotFinite,
    #[error("amount {0} is out of range")]
    OutOfRange(f64),
    #[error("amount of {0} minor units is out of range")]
    MinorOutOfRange(i64),
}

impl Amount {
    const SCALE: i64 = 100;

    pub const ZERO: Amount = Amount(0);

    /// Largest magnitude accepted from outside: ten trillion major units.
    pub const MAX: Amount = Amount(1_000_000_000_000_000);

    pub fn from_minor(value: i64) -> Self {
        Amount(value)
    }

    /// Convert a decimal major-unit amount, rounding to the nearest cent.
    pub fn from_major(value: f64) -> Self {
        Amount((value * Self::SCALE as f64).round() as i64)
    }

    /// Like [`Amount::from_major`] but rejects NaN, infinities and values
    /// that do not fit in minor units.
    pub fn try_from_major(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() {
            return Err(AmountError::NotFinite);
        }
        let scaled = (value * Self::SCALE as f64).round();
        if scaled.abs() > Self::MAX.0 as f64 {
            return Err(AmountError::OutOfRange(value));
        }
        Ok(Amount(scaled as i64))
    }

    pub fn as_minor(self) -> i64 {
        self.0
    }

    pub fn to_major(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Clamp negative amounts to zero.
    pub fn floor_zero(self) -> Self {
        self.max(Amount::ZERO)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = Self::SCALE as u64;
        write!(f, "{sign}{}.{:02}", abs / scale, abs % scale)
    }
}

impl TryFrom<i64> for Amount {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value.unsigned_abs() > Self::MAX.0.unsigned_abs() {
            return Err(AmountError::MinorOutOfRange(value));
        }
        Ok(Amount(value))
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl std::ops::Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::Neg for Amount {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Amount(self.0.saturating_neg())
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::ops::SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, amount| acc + amount)
    }
}
