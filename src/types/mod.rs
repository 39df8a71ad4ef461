//! Types module
//!
//! Contains core data structures used throughout the ledger.
//! This module organizes types into logical submodules:
//! - `coin`: Coin and fiat currency reference data
//! - `amount`: Fixed-point amounts in base units
//! - `fee`: Fee models
//! - `account`: Wallets and accounts
//! - `entry`: Ledger entries and their lifecycles
//! - `error`: Error types for the ledger

pub mod account;
pub mod amount;
pub mod coin;
pub mod entry;
pub mod error;
pub mod fee;

pub use account::{AccountId, PaymentAccount, UserId, Wallet, WalletAccount, WalletId};
pub use amount::{CoinAmount, FixedAmount, MoneyAmount};
pub use coin::{Coin, Currency, Denomination};
pub use entry::{
    EntryId, EntryType, ExternalTransaction, NewPaymentTransaction, NewTransferRecord,
    PaymentStatus, PaymentTransaction, TradeId, TradeReservation, TransferRecord,
    TransferRecordPatch,
};
pub use error::LedgerError;
pub use fee::FeeModel;
