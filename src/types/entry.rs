//! Ledger entry types
//!
//! Crypto movements are recorded as [`TransferRecord`]s and fiat movements as
//! [`PaymentTransaction`]s. Both are append-mostly: the few fields that may
//! change after creation are changed through patches and transitions that
//! enforce the entry invariants.

use crate::types::account::{AccountId, WalletAccount, WalletId};
use crate::types::amount::{CoinAmount, MoneyAmount};
use crate::types::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Ledger entry identifier
pub type EntryId = u64;

/// Peer trade identifier
pub type TradeId = u64;

/// Direction of a ledger entry relative to its account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Credit to the account
    Receive,
    /// Debit from the account
    Send,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::Receive => write!(f, "receive"),
            EntryType::Send => write!(f, "send"),
        }
    }
}

/// Crypto ledger entry
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRecord {
    pub id: EntryId,
    pub account_id: AccountId,
    pub wallet_id: WalletId,
    pub entry_type: EntryType,
    pub value: CoinAmount,
    pub description: String,

    /// Oracle dollar price of one coin when the entry was written
    pub dollar_price: f64,

    /// Blockchain address for external entries
    pub address: Option<String>,
    pub external: bool,
    pub confirmations: u32,
    pub required_confirmations: u32,

    /// Links the send and receive halves of one logical transfer
    pub reference: Option<Uuid>,

    /// Id of the linked external (blockchain) transaction
    pub external_transaction: Option<String>,

    /// Account balance right after this entry confirmed; display only
    pub balance_snapshot: Option<CoinAmount>,

    pub created_at: DateTime<Utc>,
}

impl TransferRecord {
    pub fn is_confirmed(&self) -> bool {
        self.confirmations >= self.required_confirmations
    }

    /// Unconfirmed external send that never got a broadcast transaction
    pub fn is_removable(&self) -> bool {
        self.entry_type == EntryType::Send
            && self.external
            && !self.is_confirmed()
            && self.external_transaction.is_none()
    }

    /// Apply an update, enforcing the immutable fields and monotonic confirmations
    ///
    /// The record is left untouched when any part of the patch is rejected.
    pub fn apply(&mut self, patch: &TransferRecordPatch) -> Result<(), LedgerError> {
        let id = self.id;
        let immutable = |property: &str| -> Result<(), LedgerError> {
            Err(LedgerError::immutable_property("transfer_record", id, property))
        };

        if patch.entry_type.is_some_and(|t| t != self.entry_type) {
            return immutable("type");
        }
        if patch.account_id.is_some_and(|a| a != self.account_id) {
            return immutable("account_id");
        }
        if patch.external.is_some_and(|e| e != self.external) {
            return immutable("external");
        }
        if let Some(address) = &patch.address {
            if self.address.as_ref() != Some(address) {
                return immutable("address");
            }
        }
        if let (Some(current), Some(requested)) =
            (&self.external_transaction, &patch.external_transaction)
        {
            if current != requested {
                return immutable("external_transaction");
            }
        }
        if let Some(confirmations) = patch.confirmations {
            if confirmations < self.confirmations {
                return Err(LedgerError::invalid_transition(
                    "transfer_record",
                    self.id,
                    format!("{} confirmations", self.confirmations),
                    format!("{} confirmations", confirmations),
                ));
            }
        }

        if let Some(confirmations) = patch.confirmations {
            self.confirmations = confirmations;
        }
        if let Some(snapshot) = &patch.balance_snapshot {
            self.balance_snapshot = Some(snapshot.clone());
        }
        if let Some(tx) = &patch.external_transaction {
            self.external_transaction = Some(tx.clone());
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }

        Ok(())
    }
}

/// Update to a stored [`TransferRecord`]
///
/// Immutable fields may be present only if they repeat the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferRecordPatch {
    pub entry_type: Option<EntryType>,
    pub account_id: Option<AccountId>,
    pub address: Option<String>,
    pub external: Option<bool>,
    pub confirmations: Option<u32>,
    pub balance_snapshot: Option<CoinAmount>,
    pub external_transaction: Option<String>,
    pub description: Option<String>,
}

impl TransferRecordPatch {
    pub fn confirmations(confirmations: u32) -> Self {
        TransferRecordPatch {
            confirmations: Some(confirmations),
            ..Default::default()
        }
    }

    pub fn external_transaction(id: &str) -> Self {
        TransferRecordPatch {
            external_transaction: Some(id.to_string()),
            ..Default::default()
        }
    }

    pub fn with_snapshot(mut self, snapshot: CoinAmount) -> Self {
        self.balance_snapshot = Some(snapshot);
        self
    }
}

/// A transfer record that has not been assigned an id yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransferRecord {
    pub account_id: AccountId,
    pub wallet_id: WalletId,
    pub entry_type: EntryType,
    pub value: CoinAmount,
    pub description: String,
    pub dollar_price: f64,
    pub address: Option<String>,
    pub external: bool,
    pub confirmations: u32,
    pub required_confirmations: u32,
    pub reference: Option<Uuid>,
    pub external_transaction: Option<String>,
}

impl NewTransferRecord {
    fn new(account: &WalletAccount, entry_type: EntryType, value: CoinAmount, description: &str) -> Self {
        NewTransferRecord {
            account_id: account.id,
            wallet_id: account.wallet_id,
            entry_type,
            value,
            description: description.to_string(),
            dollar_price: 0.0,
            address: None,
            external: false,
            confirmations: 0,
            required_confirmations: 0,
            reference: None,
            external_transaction: None,
        }
    }

    /// Internal credit; confirmed on creation
    pub fn receive(account: &WalletAccount, value: CoinAmount, description: &str) -> Self {
        Self::new(account, EntryType::Receive, value, description)
    }

    /// Internal debit; confirmed on creation
    pub fn send(account: &WalletAccount, value: CoinAmount, description: &str) -> Self {
        Self::new(account, EntryType::Send, value, description)
    }

    pub fn external(mut self, address: &str) -> Self {
        self.external = true;
        self.address = Some(address.to_string());
        self
    }

    pub fn confirmations(mut self, confirmations: u32, required: u32) -> Self {
        self.confirmations = confirmations;
        self.required_confirmations = required;
        self
    }

    pub fn dollar_price(mut self, price: f64) -> Self {
        self.dollar_price = price;
        self
    }

    pub fn reference(mut self, reference: Uuid) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn external_transaction(mut self, id: &str) -> Self {
        self.external_transaction = Some(id.to_string());
        self
    }

    pub fn into_record(self, id: EntryId, created_at: DateTime<Utc>) -> TransferRecord {
        TransferRecord {
            id,
            account_id: self.account_id,
            wallet_id: self.wallet_id,
            entry_type: self.entry_type,
            value: self.value,
            description: self.description,
            dollar_price: self.dollar_price,
            address: self.address,
            external: self.external,
            confirmations: self.confirmations,
            required_confirmations: self.required_confirmations,
            reference: self.reference,
            external_transaction: self.external_transaction,
            balance_snapshot: None,
            created_at,
        }
    }
}

/// Lifecycle of a fiat payment transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentStatus {
    /// Awaiting a bank transfer
    PendingTransfer,
    /// Awaiting confirmation from a payment gateway
    PendingGateway,
    Completed,
    Canceled,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Canceled)
    }

    pub fn is_pending(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::PendingTransfer => "pending-transfer",
            PaymentStatus::PendingGateway => "pending-gateway",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Canceled => "canceled",
        }
    }

    /// Only pending states move, and only into a terminal state
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        self.is_pending() && next.is_terminal()
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fiat ledger entry
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentTransaction {
    pub id: EntryId,
    pub account_id: AccountId,
    pub entry_type: EntryType,
    pub amount: MoneyAmount,
    pub status: PaymentStatus,
    pub description: String,

    /// Bank or gateway reference
    pub gateway_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl PaymentTransaction {
    /// Move to a terminal status, stamping the matching timestamp
    pub fn transition(&mut self, next: PaymentStatus, at: DateTime<Utc>) -> Result<(), LedgerError> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::invalid_transition(
                "payment_transaction",
                self.id,
                self.status,
                next,
            ));
        }

        match next {
            PaymentStatus::Completed => self.completed_at = Some(at),
            PaymentStatus::Canceled => self.canceled_at = Some(at),
            PaymentStatus::PendingTransfer | PaymentStatus::PendingGateway => {}
        }
        self.status = next;

        Ok(())
    }
}

/// A payment transaction that has not been assigned an id yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewPaymentTransaction {
    pub account_id: AccountId,
    pub entry_type: EntryType,
    pub amount: MoneyAmount,
    pub status: PaymentStatus,
    pub description: String,
    pub gateway_ref: Option<String>,
}

impl NewPaymentTransaction {
    pub fn into_record(self, id: EntryId, created_at: DateTime<Utc>) -> PaymentTransaction {
        PaymentTransaction {
            id,
            account_id: self.account_id,
            entry_type: self.entry_type,
            amount: self.amount,
            status: self.status,
            description: self.description,
            gateway_ref: self.gateway_ref,
            created_at,
            completed_at: None,
            canceled_at: None,
        }
    }
}

/// Blockchain transaction as reported by the wallet adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTransaction {
    /// Adapter-side transaction id
    pub id: String,
    pub hash: String,
    pub wallet_id: WalletId,
    pub confirmations: u32,

    /// Raw provider payload
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Value held back from a seller's available balance by a pending trade
#[derive(Debug, Clone, PartialEq)]
pub struct TradeReservation {
    pub trade_id: TradeId,
    pub account_id: AccountId,
    pub amount: CoinAmount,
    pub created_at: DateTime<Utc>,
}
