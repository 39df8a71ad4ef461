//! Wallet Ledger Library
//! # Overview
//!
//! The wallet ledger and inter-account transfer core of a crypto exchange.
//! Balances are never stored: they are derived from an append-only ledger of
//! entries, and every balance-changing operation runs under a lock on the
//! affected aggregate so concurrent requests cannot overdraw an account.
//!
//! # Architecture
//!
//! - [`types`] - Amounts, coins, accounts, ledger entries and errors
//! - [`core`] - Business logic components:
//!   - [`core::store`] - Atomic ledger store
//!   - [`core::lock`] - Ordered per-aggregate locks
//!   - [`core::balance`] - Balance derivation
//!   - [`core::transfer`] - Internal, outgoing and incoming transfers
//!   - [`core::confirmations`] - Confirmation tracking
//!   - [`core::settlement`] - Trades, commerce payments and staking
//!   - [`core::payments`] - Fiat deposits and withdrawals
//! - [`external`] - Wallet adapters, price oracle and notifier interfaces
//! - [`config`] - Ledger, lock and replay settings
//! - [`telemetry`] - Tracing setup
//! - [`cli`], [`io`], [`strategy`] - The journal replay binary
//!
//! # Balances
//!
//! Each account exposes:
//! - `balance`: confirmed receives minus sends
//! - `pending`: receives still awaiting confirmations
//! - `reserved_on_trade`: funds held for open peer trades
//! - `available`: `balance - reserved_on_trade`, what may be spent

pub mod cli;
pub mod config;
pub mod core;
pub mod external;
pub mod io;
pub mod strategy;
pub mod telemetry;
pub mod types;

pub use config::{AppConfig, LedgerConfig};
pub use core::{
    BalanceEngine, ConfirmationTracker, InMemoryLedgerStore, LedgerContext, LedgerStore,
    LockManager, PaymentLedger, SettlementDesk, TransferOrchestrator,
};
pub use io::write_balances_csv;
pub use types::{
    Coin, CoinAmount, Currency, FixedAmount, LedgerError, MoneyAmount, TransferRecord, Wallet,
    WalletAccount,
};
