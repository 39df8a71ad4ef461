//! Price oracle seam
//!
//! Prices are reporting data: they are stamped onto ledger entries for audit
//! and used to quote fiat values, but no balance invariant depends on them.

use crate::types::{Coin, CoinAmount, Currency, LedgerError, MoneyAmount};
use dashmap::DashMap;

/// Source of coin prices
pub trait PriceOracle: Send + Sync {
    /// Dollar price of one whole coin
    fn dollar_price(&self, coin: &Coin) -> Result<f64, LedgerError>;

    /// Price of one whole coin in `currency`
    fn unit_price(&self, coin: &Coin, currency: &Currency) -> Result<f64, LedgerError>;

    /// Fiat value of a coin amount
    fn convert(&self, amount: &CoinAmount, currency: &Currency) -> Result<MoneyAmount, LedgerError> {
        let price = self.unit_price(amount.unit(), currency)?;
        amount.to_money(price, currency.clone())
    }
}

/// Fixed price table
///
/// Unknown pairs price at zero, so entries written without a configured
/// price carry `dollar_price = 0.0` rather than failing the transfer.
#[derive(Debug, Default)]
pub struct StaticPriceOracle {
    prices: DashMap<(String, String), f64>,
}

impl StaticPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, coin: &Coin, currency: &Currency, price: f64) {
        self.prices
            .insert((coin.identifier.clone(), currency.code.clone()), price);
    }

    pub fn with_price(self, coin: &Coin, currency: &Currency, price: f64) -> Self {
        self.set_price(coin, currency, price);
        self
    }
}

impl PriceOracle for StaticPriceOracle {
    fn dollar_price(&self, coin: &Coin) -> Result<f64, LedgerError> {
        self.unit_price(coin, &Currency::usd())
    }

    fn unit_price(&self, coin: &Coin, currency: &Currency) -> Result<f64, LedgerError> {
        Ok(self
            .prices
            .get(&(coin.identifier.clone(), currency.code.clone()))
            .map(|price| *price)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_convert_uses_currency_precision() {
        let oracle = StaticPriceOracle::new().with_price(&Coin::bitcoin(), &Currency::eur(), 50_000.0);
        let amount =
            CoinAmount::from_value(Decimal::from_str("0.25").unwrap(), Coin::bitcoin()).unwrap();

        let money = oracle.convert(&amount, &Currency::eur()).unwrap();
        assert_eq!(money.to_string(), "12500.00 EUR");
    }

    #[test]
    fn test_unknown_pair_prices_at_zero() {
        let oracle = StaticPriceOracle::new();
        assert_eq!(oracle.dollar_price(&Coin::ether()).unwrap(), 0.0);
    }
}
