//! External collaborators
//!
//! Interfaces the ledger core depends on without owning:
//! - `adapter`: blockchain custody providers
//! - `offline`: an in-process adapter for replay and tests
//! - `oracle`: coin prices
//! - `notifier`: user notifications

pub mod adapter;
pub mod notifier;
pub mod offline;
pub mod oracle;

pub use adapter::{AdapterFailure, AdapterRegistry, SendRequest, WalletAdapter, WalletHandle};
pub use notifier::{dispatch, LedgerEvent, Notifier, NotifyError, TracingNotifier};
pub use offline::OfflineWalletAdapter;
pub use oracle::{PriceOracle, StaticPriceOracle};
