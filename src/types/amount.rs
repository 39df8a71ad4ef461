//! Fixed-point monetary amounts
//!
//! [`FixedAmount`] stores an integer number of base units together with the
//! denomination it is counted in. Every constructor normalizes to scale 0 and
//! every operation returns a new value, so an amount can be freely cloned and
//! shared across threads.
//!
//! # Rounding
//!
//! All conversions that can produce a fractional base unit round to the
//! nearest integer and break ties toward zero (round-half-down). The same
//! rule is used when deriving the human value at display precision, so
//! repeated get/compute cycles are deterministic.
//!
//! # Denomination safety
//!
//! Arithmetic and comparisons between amounts of different denominations
//! fail with [`LedgerError::CurrencyMismatch`]; there is intentionally no
//! `PartialOrd`/`Add` implementation that could silently ignore the unit.

use crate::types::coin::{Coin, Currency, Denomination};
use crate::types::LedgerError;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use std::cmp::Ordering;
use std::fmt;

/// Round-half-down, the rounding mode used for every conversion
pub const ROUNDING: RoundingStrategy = RoundingStrategy::MidpointTowardZero;

/// Integer base-unit quantity of a denomination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedAmount<D: Denomination> {
    amount: Decimal,
    unit: D,
}

/// Crypto amount counted in coin base units
pub type CoinAmount = FixedAmount<Coin>;

/// Fiat amount counted in currency minor units
pub type MoneyAmount = FixedAmount<Currency>;

impl<D: Denomination> FixedAmount<D> {
    /// Build an amount from either base units or a human value
    ///
    /// With `convert_to_base` the input is multiplied by the denomination's
    /// base unit first. Either way the result is rounded to an integer number
    /// of base units using round-half-down.
    pub fn of(input: Decimal, unit: D, convert_to_base: bool) -> Result<Self, LedgerError> {
        let base = if convert_to_base {
            input
                .checked_mul(unit.base_unit())
                .ok_or_else(|| LedgerError::arithmetic_overflow("convert to base units"))?
        } else {
            input
        };

        Ok(FixedAmount {
            amount: base.round_dp_with_strategy(0, ROUNDING).normalize(),
            unit,
        })
    }

    /// Amount from a count of base units
    pub fn from_base(units: impl Into<Decimal>, unit: D) -> Result<Self, LedgerError> {
        Self::of(units.into(), unit, false)
    }

    /// Amount from a human value (e.g. 0.4 BTC)
    pub fn from_value(value: Decimal, unit: D) -> Result<Self, LedgerError> {
        Self::of(value, unit, true)
    }

    /// Amount from a floating point human value
    pub fn from_f64(value: f64, unit: D) -> Result<Self, LedgerError> {
        let value = Decimal::from_f64(value)
            .ok_or_else(|| LedgerError::invalid_amount(value, "not representable as a decimal"))?;
        Self::from_value(value, unit)
    }

    pub fn zero(unit: D) -> Self {
        FixedAmount {
            amount: Decimal::ZERO,
            unit,
        }
    }

    pub fn unit(&self) -> &D {
        &self.unit
    }

    /// Base units as a decimal with scale 0
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Canonical base-unit string, e.g. "60000000"
    pub fn get_amount(&self) -> String {
        self.amount.to_string()
    }

    /// Human value at the denomination's display precision
    pub fn value(&self) -> Decimal {
        // base_unit is never zero for a well-formed denomination
        match self.amount.checked_div(self.unit.base_unit()) {
            Some(value) => value.round_dp_with_strategy(self.unit.precision(), ROUNDING),
            None => Decimal::ZERO,
        }
    }

    /// Human value as a float
    pub fn get_value(&self) -> f64 {
        self.value().to_f64().unwrap_or_default()
    }

    /// Human value rendered with exactly `precision` decimal places
    pub fn format_value(&self) -> String {
        format!("{:.*}", self.unit.precision() as usize, self.value())
    }

    fn assert_same_unit(&self, other: &Self) -> Result<(), LedgerError> {
        if self.unit.same_denomination(&other.unit) {
            Ok(())
        } else {
            Err(LedgerError::currency_mismatch(
                self.unit.code(),
                other.unit.code(),
            ))
        }
    }

    pub fn add(&self, other: &Self) -> Result<Self, LedgerError> {
        self.assert_same_unit(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("add"))?;

        Ok(self.with_amount(amount))
    }

    pub fn subtract(&self, other: &Self) -> Result<Self, LedgerError> {
        self.assert_same_unit(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("subtract"))?;

        Ok(self.with_amount(amount))
    }

    /// Scale by a float multiplier, rounding back to whole base units
    pub fn multiply(&self, multiplier: f64) -> Result<Self, LedgerError> {
        let multiplier = Decimal::from_f64(multiplier).ok_or_else(|| {
            LedgerError::invalid_amount(multiplier, "multiplier not representable as a decimal")
        })?;
        self.multiply_decimal(multiplier)
    }

    /// Scale by an exact decimal multiplier, rounding back to whole base units
    pub fn multiply_decimal(&self, multiplier: Decimal) -> Result<Self, LedgerError> {
        let amount = self
            .amount
            .checked_mul(multiplier)
            .ok_or_else(|| LedgerError::arithmetic_overflow("multiply"))?;

        Ok(self.with_amount(amount.round_dp_with_strategy(0, ROUNDING)))
    }

    pub fn negate(&self) -> Self {
        self.with_amount(-self.amount)
    }

    pub fn compare(&self, other: &Self) -> Result<Ordering, LedgerError> {
        self.assert_same_unit(other)?;
        Ok(self.amount.cmp(&other.amount))
    }

    pub fn less_than(&self, other: &Self) -> Result<bool, LedgerError> {
        Ok(self.compare(other)? == Ordering::Less)
    }

    pub fn less_than_or_equal(&self, other: &Self) -> Result<bool, LedgerError> {
        Ok(self.compare(other)? != Ordering::Greater)
    }

    pub fn greater_than(&self, other: &Self) -> Result<bool, LedgerError> {
        Ok(self.compare(other)? == Ordering::Greater)
    }

    pub fn greater_than_or_equal(&self, other: &Self) -> Result<bool, LedgerError> {
        Ok(self.compare(other)? != Ordering::Less)
    }

    pub fn equals(&self, other: &Self) -> Result<bool, LedgerError> {
        Ok(self.compare(other)? == Ordering::Equal)
    }

    pub fn min(&self, other: &Self) -> Result<Self, LedgerError> {
        Ok(if self.less_than_or_equal(other)? {
            self.clone()
        } else {
            other.clone()
        })
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn is_negative_or_zero(&self) -> bool {
        !self.is_positive()
    }

    /// Value at an external unit price (`value * price`)
    pub fn calc_price(&self, price: f64) -> f64 {
        self.get_value() * price
    }

    /// Price rendered at `precision` decimal places
    pub fn get_price(&self, price: f64, precision: u32) -> Decimal {
        Decimal::from_f64(self.calc_price(price))
            .map(|p| p.round_dp_with_strategy(precision, ROUNDING))
            .unwrap_or_default()
    }

    fn with_amount(&self, amount: Decimal) -> Self {
        FixedAmount {
            amount: amount.normalize(),
            unit: self.unit.clone(),
        }
    }
}

impl CoinAmount {
    /// Fiat value of this amount at a coin/currency unit price
    pub fn to_money(&self, unit_price: f64, currency: Currency) -> Result<MoneyAmount, LedgerError> {
        MoneyAmount::from_value(self.get_price(unit_price, currency.precision), currency)
    }
}

impl<D: Denomination> fmt::Display for FixedAmount<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.format_value(), self.unit.code().to_uppercase())
    }
}

/// Sum a sequence of amounts, starting from zero in `unit`
pub fn sum<'a, D: Denomination>(
    unit: &D,
    amounts: impl IntoIterator<Item = &'a FixedAmount<D>>,
) -> Result<FixedAmount<D>, LedgerError> {
    amounts
        .into_iter()
        .try_fold(FixedAmount::zero(unit.clone()), |total, amount| {
            total.add(amount)
        })
}
