//! Type-safe money representation using decimal arithmetic.
//!
//! Amounts are kept in the currency's major unit (naira, not kobo). Gateways
//! disagree on units: Paystack wants integer minor units, Flutterwave wants
//! a decimal major amount, so conversion happens at the edge through
//! [`Money::to_minor_units`].

use core::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors from money arithmetic and parsing.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("amount must not be negative")]
    Negative,
    #[error("amount overflow")]
    Overflow,
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),
}

/// ISO 4217 currencies the marketplace settles in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    NGN,
    GHS,
    KES,
    ZAR,
    USD,
}

impl Currency {
    /// All supported currencies.
    pub const ALL: [Self; 5] = [Self::NGN, Self::GHS, Self::KES, Self::ZAR, Self::USD];

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NGN => "NGN",
            Self::GHS => "GHS",
            Self::KES => "KES",
            Self::ZAR => "ZAR",
            Self::USD => "USD",
        }
    }

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::NGN => "\u{20a6}",
            Self::GHS => "GH\u{20b5}",
            Self::KES => "KSh",
            Self::ZAR => "R",
            Self::USD => "$",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MoneyError::UnsupportedCurrency(s.to_string()))
    }
}

/// An amount of money in a specific currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's major unit.
    pub amount: Decimal,
    pub currency: Currency,
}

impl Money {
    #[must_use]
    pub const fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    #[must_use]
    pub const fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    /// Build from an integer count of minor units (kobo, cents, pesewas).
    #[must_use]
    pub fn from_minor_units(minor: i64, currency: Currency) -> Self {
        Self::new(Decimal::new(minor, 2), currency)
    }

    /// Parse a user-entered amount such as `"1,250.50"`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` for non-numeric input and `Negative` below zero.
    pub fn parse(input: &str, currency: Currency) -> Result<Self, MoneyError> {
        let cleaned: String = input.trim().chars().filter(|c| *c != ',').collect();
        let amount = Decimal::from_str(&cleaned)
            .map_err(|_| MoneyError::InvalidAmount(input.to_string()))?;
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }
        Ok(Self::new(amount.round_dp(2), currency))
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// Add two amounts of the same currency.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyMismatch` or `Overflow`.
    pub fn checked_add(self, other: Self) -> Result<Self, MoneyError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount, self.currency))
    }

    /// Subtract an amount of the same currency. The result may be negative.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyMismatch` or `Overflow`.
    pub fn checked_sub(self, other: Self) -> Result<Self, MoneyError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount, self.currency))
    }

    /// Multiply by a whole quantity.
    ///
    /// # Errors
    ///
    /// Returns `Overflow` when the product does not fit.
    pub fn times(self, quantity: u32) -> Result<Self, MoneyError> {
        let amount = self
            .amount
            .checked_mul(Decimal::from(quantity))
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount, self.currency))
    }

    /// Multiply by a decimal factor, rounding to two places.
    ///
    /// # Errors
    ///
    /// Returns `Overflow` when the product does not fit.
    pub fn scale(self, factor: Decimal) -> Result<Self, MoneyError> {
        let amount = self
            .amount
            .checked_mul(factor)
            .ok_or(MoneyError::Overflow)?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Ok(Self::new(amount, self.currency))
    }

    /// Amount in minor units, rounding half away from zero.
    ///
    /// # Errors
    ///
    /// Returns `Overflow` when the value does not fit in an `i64`.
    pub fn to_minor_units(&self) -> Result<i64, MoneyError> {
        self.amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(MoneyError::Overflow)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(MoneyError::Overflow)
    }

    /// Amount as a plain two-decimal string (`"1250.50"`), for gateway payloads.
    #[must_use]
    pub fn major_string(&self) -> String {
        format!(
            "{:.2}",
            self.amount
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        )
    }

    fn ensure_same_currency(self, other: Self) -> Result<(), MoneyError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            })
        }
    }
}

impl fmt::Display for Money {
    /// Formats as `₦1,250.00`; negative amounts as `-₦1,250.00`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plain = Self::new(self.amount.abs(), self.currency).major_string();
        let (whole, fraction) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, digit) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(digit);
        }

        let sign = if self.amount.is_sign_negative() && !self.amount.is_zero() {
            "-"
        } else {
            ""
        };
        write!(f, "{sign}{}{grouped}.{fraction}", self.currency.symbol())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_display_groups_thousands() {
        let m = Money::new(dec("1234567.5"), Currency::NGN);
        assert_eq!(m.to_string(), "\u{20a6}1,234,567.50");
        assert_eq!(Money::new(dec("999"), Currency::USD).to_string(), "$999.00");
        assert_eq!(Money::zero(Currency::KES).to_string(), "KSh0.00");
        assert_eq!(
            Money::new(dec("-1500"), Currency::ZAR).to_string(),
            "-R1,500.00"
        );
    }

    #[test]
    fn test_minor_units_round_half_away() {
        assert_eq!(
            Money::new(dec("10.005"), Currency::NGN).to_minor_units().unwrap(),
            1001
        );
        assert_eq!(
            Money::new(dec("2500"), Currency::NGN).to_minor_units().unwrap(),
            250_000
        );
        assert_eq!(
            Money::from_minor_units(123_456, Currency::GHS).amount,
            dec("1234.56")
        );
    }

    #[test]
    fn test_add_rejects_mixed_currency() {
        let naira = Money::new(dec("10"), Currency::NGN);
        let dollars = Money::new(dec("10"), Currency::USD);
        assert_eq!(
            naira.checked_add(dollars),
            Err(MoneyError::CurrencyMismatch {
                left: Currency::NGN,
                right: Currency::USD
            })
        );
    }

    #[test]
    fn test_times_and_scale() {
        let unit = Money::new(dec("1999.99"), Currency::NGN);
        assert_eq!(unit.times(3).unwrap().amount, dec("5999.97"));
        assert_eq!(unit.scale(dec("0.015")).unwrap().amount, dec("30.00"));
    }

    #[test]
    fn test_parse_user_input() {
        let m = Money::parse(" 12,500.456 ", Currency::NGN).unwrap();
        assert_eq!(m.amount, dec("12500.46"));
        assert_eq!(Money::parse("-5", Currency::NGN), Err(MoneyError::Negative));
        assert!(matches!(
            Money::parse("five", Currency::NGN),
            Err(MoneyError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_currency_from_str() {
        assert_eq!("ngn".parse::<Currency>().unwrap(), Currency::NGN);
        assert!("EUR".parse::<Currency>().is_err());
    }
}
