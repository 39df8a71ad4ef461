//! Fire-and-forget notifications
//!
//! Ledger services emit a [`LedgerEvent`] after a state change has been
//! committed. Delivery belongs to the [`Notifier`]; a delivery failure is
//! logged and never undoes the ledger write.

use crate::types::{AccountId, CoinAmount, EntryId, MoneyAmount, PaymentStatus};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A receive entry reached its required confirmations
    TransferConfirmed {
        entry_id: EntryId,
        account_id: AccountId,
        #[serde(serialize_with = "as_display")]
        value: CoinAmount,
        confirmations: u32,
    },
    /// A fiat entry reached a terminal status
    PaymentSettled {
        entry_id: EntryId,
        account_id: AccountId,
        #[serde(serialize_with = "as_display")]
        amount: MoneyAmount,
        status: PaymentStatus,
    },
}

fn as_display<T: fmt::Display, S: serde::Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Delivery failure reported by a notifier
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

pub trait Notifier: Send + Sync {
    fn notify(&self, event: &LedgerEvent) -> Result<(), NotifyError>;
}

/// Writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: &LedgerEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(event).map_err(|e| NotifyError(e.to_string()))?;
        info!(event = %payload, "Ledger notification");
        Ok(())
    }
}

/// Deliver `event`, logging instead of propagating a failure
pub fn dispatch(notifier: &dyn Notifier, event: LedgerEvent) {
    if let Err(e) = notifier.notify(&event) {
        warn!(error = %e, event = ?event, "Notification failed; ledger state is unaffected");
    }
}
