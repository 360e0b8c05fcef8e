//! Monetary amounts.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// Non-negative amount in the smallest currency unit (e.g., cents).
///
/// Claims are single-currency per organization, so no currency code is carried.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Money(i64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    /// Build from minor units. Negative amounts are rejected.
    pub fn from_minor(minor: i64) -> Result<Self, DomainError> {
        if minor < 0 {
            return Err(DomainError::validation("amount must not be negative"));
        }
        Ok(Self(minor))
    }

    /// Build from whole major units (e.g., `Money::major(6000)` is 6000.00).
    pub fn major(units: i64) -> Result<Self, DomainError> {
        units
            .checked_mul(100)
            .ok_or_else(|| DomainError::validation("amount overflow"))
            .and_then(Self::from_minor)
    }

    pub fn minor(&self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Saturating sum, used for derived totals.
    pub fn sum<I: IntoIterator<Item = Money>>(iter: I) -> Money {
        iter.into_iter()
            .fold(Money::ZERO, |acc, m| Money(acc.0.saturating_add(m.0)))
    }
}

impl TryFrom<i64> for Money {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_minor(value)
    }
}

impl From<Money> for i64 {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl FromStr for Money {
    type Err = DomainError;

    /// Parse decimal text such as `"6000"`, `"4500.5"` or `"12.34"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let non_numeric = || DomainError::validation(format!("amount '{raw}' is not numeric"));

        if raw.is_empty() {
            return Err(DomainError::validation("amount is required"));
        }
        if raw.starts_with('-') {
            return Err(DomainError::validation("amount must not be negative"));
        }

        let (whole, frac) = match raw.split_once('.') {
            Some((w, f)) => (w, f),
            None => (raw, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(non_numeric());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(non_numeric());
        }
        if frac.len() > 2 {
            return Err(DomainError::validation(format!(
                "amount '{raw}' has more than two decimal places"
            )));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| non_numeric())?
        };
        let cents: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| non_numeric())? * 10,
            _ => frac.parse().map_err(|_| non_numeric())?,
        };

        whole
            .checked_mul(100)
            .and_then(|v| v.checked_add(cents))
            .ok_or_else(|| DomainError::validation("amount overflow"))
            .and_then(Self::from_minor)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}
