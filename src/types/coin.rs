//! Coin and currency reference data
//!
//! A denomination is immutable reference data describing how a quantity is
//! stored (integer base units) and displayed (human value at a fixed
//! precision). Coins describe crypto assets, currencies describe fiat.

use crate::types::error::LedgerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shared behaviour of anything an amount can be denominated in
///
/// Two amounts are compatible only when their denominations report the same
/// `code()` and `base_unit()`.
pub trait Denomination: Clone + fmt::Debug + Send + Sync + 'static {
    /// Identifier used for compatibility checks and display (e.g. "BTC")
    fn code(&self) -> &str;

    /// Number of base units in one whole unit (e.g. 100_000_000 for BTC)
    fn base_unit(&self) -> Decimal;

    /// Decimal places used when presenting a human value
    fn precision(&self) -> u32;

    /// Whether two denominations may be combined arithmetically
    fn same_denomination(&self, other: &Self) -> bool {
        self.code() == other.code() && self.base_unit() == other.base_unit()
    }
}

/// Tradable crypto asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// Short identifier, e.g. "btc"
    pub identifier: String,

    /// Display name
    pub name: String,

    /// Display precision of human values
    pub precision: u32,

    /// Base units per whole coin (1 BTC = 10^8 satoshi)
    pub base_unit: u64,

    /// Precision used when the coin's value is shown in fiat
    #[serde(default = "default_currency_precision")]
    pub currency_precision: u32,
}

fn default_currency_precision() -> u32 {
    2
}

impl Coin {
    pub fn new(identifier: &str, name: &str, precision: u32, base_unit: u64) -> Self {
        Coin {
            identifier: identifier.to_lowercase(),
            name: name.to_string(),
            precision,
            base_unit,
            currency_precision: default_currency_precision(),
        }
    }

    /// Bitcoin: 8 decimal places, 10^8 satoshi
    pub fn bitcoin() -> Self {
        Coin::new("btc", "Bitcoin", 8, 100_000_000)
    }

    /// Ether: displayed at 8 places, stored in wei
    pub fn ether() -> Self {
        Coin::new("eth", "Ethereum", 8, 1_000_000_000_000_000_000)
    }
}

impl Denomination for Coin {
    fn code(&self) -> &str {
        &self.identifier
    }

    fn base_unit(&self) -> Decimal {
        Decimal::from(self.base_unit)
    }

    fn precision(&self) -> u32 {
        self.precision
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier.to_uppercase())
    }
}

/// Fiat currency; minor units are 10^precision of one major unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CurrencyDef")]
pub struct Currency {
    /// ISO 4217 code, e.g. "USD"
    pub code: String,

    /// Display name
    pub name: String,

    /// Decimal places of the minor unit, at most [`Currency::MAX_PRECISION`]
    pub precision: u32,
}

#[derive(Deserialize)]
struct CurrencyDef {
    code: String,
    name: String,
    precision: u32,
}

impl TryFrom<CurrencyDef> for Currency {
    type Error = LedgerError;

    fn try_from(def: CurrencyDef) -> Result<Self, Self::Error> {
        Currency::new(&def.code, &def.name, def.precision)
    }
}

impl Currency {
    /// Largest precision whose minor unit count fits in a `u64`
    pub const MAX_PRECISION: u32 = 18;

    pub fn new(code: &str, name: &str, precision: u32) -> Result<Self, LedgerError> {
        if precision > Self::MAX_PRECISION {
            return Err(LedgerError::configuration(format!(
                "currency {} declares precision {}, at most {} is supported",
                code,
                precision,
                Self::MAX_PRECISION
            )));
        }
        Ok(Currency::known(code, name, precision))
    }

    fn known(code: &str, name: &str, precision: u32) -> Self {
        Currency {
            code: code.to_uppercase(),
            name: name.to_string(),
            precision,
        }
    }

    pub fn usd() -> Self {
        Currency::known("USD", "US Dollar", 2)
    }

    pub fn eur() -> Self {
        Currency::known("EUR", "Euro", 2)
    }
}

impl Denomination for Currency {
    fn code(&self) -> &str {
        &self.code
    }

    // Precision is capped at construction; the clamp covers struct literals
    fn base_unit(&self) -> Decimal {
        Decimal::from(10u64.pow(self.precision.min(Self::MAX_PRECISION)))
    }

    fn precision(&self) -> u32 {
        self.precision
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_identifier_is_normalized() {
        let coin = Coin::new("BTC", "Bitcoin", 8, 100_000_000);
        assert_eq!(coin.code(), "btc");
        assert_eq!(coin.to_string(), "BTC");
    }

    #[test]
    fn test_currency_base_unit_follows_precision() {
        assert_eq!(Currency::usd().base_unit(), Decimal::from(100));
        assert_eq!(Currency::new("jpy", "Yen", 0).unwrap().base_unit(), Decimal::ONE);
    }

    #[test]
    fn test_currency_precision_is_bounded() {
        assert!(Currency::new("xau", "Gold", 18).is_ok());
        assert!(matches!(
            Currency::new("xxx", "Too fine", 20),
            Err(LedgerError::Configuration { .. })
        ));

        let raw = r#"{"code": "xxx", "name": "Too fine", "precision": 25}"#;
        assert!(serde_json::from_str::<Currency>(raw).is_err());
        let usd: Currency =
            serde_json::from_str(r#"{"code": "usd", "name": "US Dollar", "precision": 2}"#).unwrap();
        assert_eq!(usd, Currency::usd());

        let literal = Currency {
            code: "XXX".to_string(),
            name: "Too fine".to_string(),
            precision: 25,
        };
        assert_eq!(literal.base_unit(), Decimal::from(10u64.pow(18)));
    }

    #[test]
    fn test_same_denomination_requires_matching_base_unit() {
        let btc = Coin::bitcoin();
        let odd = Coin::new("btc", "Bitcoin", 8, 1_000);
        assert!(btc.same_denomination(&Coin::bitcoin()));
        assert!(!btc.same_denomination(&odd));
        assert!(!btc.same_denomination(&Coin::ether()));
    }
}
