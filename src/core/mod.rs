//! Core business logic module
//!
//! This module contains the ledger components:
//! - `traits` - Store abstraction and atomic write batches
//! - `store` - In-memory ledger store
//! - `lock` - Ordered per-aggregate locks
//! - `balance` - Balances derived from ledger entries
//! - `context` - Shared collaborators handed to every service
//! - `transfer` - Internal, outgoing and incoming crypto transfers
//! - `confirmations` - Confirmation tracking and balance snapshots
//! - `settlement` - Trade, commerce and staking settlements
//! - `payments` - Fiat deposits and withdrawals

pub mod balance;
pub mod confirmations;
pub mod context;
pub mod lock;
pub mod payments;
pub mod settlement;
pub mod store;
pub mod traits;
pub mod transfer;

pub use balance::{AccountBalances, BalanceEngine, PaymentBalances, WalletBalances};
pub use confirmations::ConfirmationTracker;
pub use context::LedgerContext;
pub use lock::{
    AggregateKind, InMemoryLockBackend, LockBackend, LockGuard, LockKey, LockManager, Lockable,
};
pub use payments::PaymentLedger;
pub use settlement::{CommercePayment, Settlement, SettlementDesk, StakeRedemption, StakeRequest};
pub use store::InMemoryLedgerStore;
pub use traits::{CommitReceipt, LedgerStore, LedgerWrite, WriteBatch};
pub use transfer::{IncomingTransfer, TransferOrchestrator};
