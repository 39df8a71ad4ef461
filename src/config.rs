//! Runtime configuration
//!
//! [`LedgerConfig`] carries every platform setting the ledger core reads. It
//! is built once (usually from a JSON file) and handed to the services at
//! construction time. Every field has a default, so an empty JSON object or
//! no file at all yields a working configuration.
//!
//! ```json
//! {
//!   "ledger": {
//!     "price_margin": 2.5,
//!     "min_payment": "10",
//!     "max_payment": "5000",
//!     "deposit_confirmations": 3,
//!     "lock": { "ttl_ms": 30000, "wait_timeout_ms": 10000 }
//!   },
//!   "replay": {
//!     "operator_user": 0,
//!     "withdrawal_fee": { "type": "percent", "percent": 1.0 },
//!     "network_fee": "1000"
//!   }
//! }
//! ```

use crate::types::{Coin, FeeModel, LedgerError, MoneyAmount, UserId, WalletId};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Distributed lock timings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// Lease lifetime; a crashed holder's lock expires after this
    pub ttl_ms: u64,
    /// How long a blocking acquisition waits before giving up
    pub wait_timeout_ms: u64,
    /// First retry delay of a blocking acquisition
    pub initial_backoff_ms: u64,
    /// Upper bound of the exponential retry delay
    pub max_backoff_ms: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        LockSettings {
            ttl_ms: 30_000,
            wait_timeout_ms: 10_000,
            initial_backoff_ms: 5,
            max_backoff_ms: 200,
        }
    }
}

impl LockSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms.max(1))
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms).max(1))
    }
}

/// Platform settings read by the ledger services
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Percent applied on top of quoted trade prices
    pub price_margin: f64,

    /// Smallest fiat deposit/withdrawal, in human units
    pub min_payment: Option<Decimal>,

    /// Largest fiat deposit/withdrawal, in human units
    pub max_payment: Option<Decimal>,

    /// Default confirmations required for incoming crypto credits
    pub deposit_confirmations: u32,

    pub lock: LockSettings,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            price_margin: 0.0,
            min_payment: None,
            max_payment: None,
            deposit_confirmations: 3,
            lock: LockSettings::default(),
        }
    }
}

impl LedgerConfig {
    /// Reject inconsistent settings
    pub fn validate(&self) -> Result<(), LedgerError> {
        if !self.price_margin.is_finite() || self.price_margin < 0.0 {
            return Err(LedgerError::configuration(format!(
                "price_margin must be a non-negative percentage, got {}",
                self.price_margin
            )));
        }
        if let (Some(min), Some(max)) = (self.min_payment, self.max_payment) {
            if min > max {
                return Err(LedgerError::configuration(format!(
                    "min_payment {} exceeds max_payment {}",
                    min, max
                )));
            }
        }
        if self.lock.wait_timeout_ms == 0 || self.lock.ttl_ms == 0 {
            return Err(LedgerError::configuration(
                "lock ttl_ms and wait_timeout_ms must be positive",
            ));
        }

        Ok(())
    }

    /// Unit price quoted to a trade's buyer, margin included
    pub fn quote_price(&self, price: f64) -> f64 {
        price * (1.0 + self.price_margin / 100.0)
    }

    /// Check a fiat amount against `min_payment`/`max_payment`
    pub fn check_payment_bounds(&self, amount: &MoneyAmount) -> Result<(), LedgerError> {
        let value = amount.value();
        let min = self.min_payment.unwrap_or(Decimal::ZERO);
        let max = self.max_payment.unwrap_or(Decimal::MAX);

        if value < min || value > max {
            return Err(LedgerError::AmountOutOfBounds {
                amount: value,
                min,
                max,
            });
        }

        Ok(())
    }
}

/// Settings of the journal replay binary
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    /// Coin every journal amount is denominated in
    pub coin: Coin,

    pub wallet_id: WalletId,

    /// User whose account collects withdrawal fees
    pub operator_user: Option<UserId>,

    pub withdrawal_fee: FeeModel,

    /// Network fee the offline adapter quotes, in base units
    pub network_fee: Decimal,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        ReplaySettings {
            coin: Coin::bitcoin(),
            wallet_id: 1,
            operator_user: None,
            withdrawal_fee: FeeModel::None,
            network_fee: Decimal::ZERO,
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ledger: LedgerConfig,
    pub replay: ReplaySettings,
}

impl AppConfig {
    /// Load from a JSON file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, LedgerError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    LedgerError::configuration(format!(
                        "failed to read '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                serde_json::from_str::<AppConfig>(&raw)?
            }
            None => AppConfig::default(),
        };

        config.ledger.validate()?;
        Ok(config)
    }
}
