//! Core traits for ledger persistence
//!
//! The ledger core talks to its transactional data store only through
//! [`LedgerStore`]. Reads return owned snapshots; every mutation goes through
//! [`LedgerStore::commit`], which applies a [`WriteBatch`] atomically: either
//! every write in the batch lands or none does.

use crate::types::{
    AccountId, CoinAmount, Currency, EntryId, ExternalTransaction, LedgerError,
    NewPaymentTransaction, NewTransferRecord, PaymentAccount, PaymentStatus, PaymentTransaction,
    TradeId, TradeReservation, TransferRecord, TransferRecordPatch, UserId, Wallet, WalletAccount,
    WalletId,
};

/// Single mutation inside a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerWrite {
    InsertTransfer(NewTransferRecord),
    UpdateTransfer {
        id: EntryId,
        patch: TransferRecordPatch,
    },
    /// Only removable records (unconfirmed external sends without a broadcast) may be deleted
    DeleteTransfer(EntryId),
    InsertPayment(NewPaymentTransaction),
    TransitionPayment {
        id: EntryId,
        status: PaymentStatus,
    },
    /// Insert or refresh an external transaction
    PutExternalTransaction(ExternalTransaction),
    ReserveTrade {
        trade_id: TradeId,
        account_id: AccountId,
        amount: CoinAmount,
    },
    /// Removing an absent reservation is a no-op
    ReleaseTrade(TradeId),
}

/// Ordered unit of work committed atomically
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<LedgerWrite>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: LedgerWrite) -> &mut Self {
        self.writes.push(write);
        self
    }

    pub fn insert_transfer(&mut self, record: NewTransferRecord) -> &mut Self {
        self.push(LedgerWrite::InsertTransfer(record))
    }

    pub fn update_transfer(&mut self, id: EntryId, patch: TransferRecordPatch) -> &mut Self {
        self.push(LedgerWrite::UpdateTransfer { id, patch })
    }

    pub fn insert_payment(&mut self, record: NewPaymentTransaction) -> &mut Self {
        self.push(LedgerWrite::InsertPayment(record))
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[LedgerWrite] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<LedgerWrite> {
        self.writes
    }
}

/// Records created or changed by a committed batch, in batch order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReceipt {
    pub inserted_transfers: Vec<TransferRecord>,
    pub updated_transfers: Vec<TransferRecord>,
    pub inserted_payments: Vec<PaymentTransaction>,
    pub updated_payments: Vec<PaymentTransaction>,
}

/// Transactional data store backing the ledger
///
/// Implementations must be safe to share across threads. Reads are
/// best-effort snapshots; only reads made while holding the aggregate's lock
/// may be used as the basis for a debit decision.
pub trait LedgerStore: Send + Sync {
    fn wallet(&self, id: WalletId) -> Result<Wallet, LedgerError>;

    fn wallet_account(&self, id: AccountId) -> Result<WalletAccount, LedgerError>;

    fn payment_account(&self, id: AccountId) -> Result<PaymentAccount, LedgerError>;

    /// Return the user's account on the wallet, creating it on first use
    fn get_or_create_wallet_account(
        &self,
        user: UserId,
        wallet: WalletId,
    ) -> Result<WalletAccount, LedgerError>;

    /// Return the user's fiat account in the currency, creating it on first use
    fn get_or_create_payment_account(
        &self,
        user: UserId,
        currency: &Currency,
    ) -> Result<PaymentAccount, LedgerError>;

    /// All wallet accounts, ordered by id
    fn wallet_accounts(&self) -> Vec<WalletAccount>;

    fn transfer_record(&self, id: EntryId) -> Result<TransferRecord, LedgerError>;

    /// Entries of one account, ordered by id
    fn transfer_records(&self, account: AccountId) -> Vec<TransferRecord>;

    fn payment_transaction(&self, id: EntryId) -> Result<PaymentTransaction, LedgerError>;

    /// Fiat entries of one account, ordered by id
    fn payment_transactions(&self, account: AccountId) -> Vec<PaymentTransaction>;

    fn external_transaction(&self, id: &str) -> Option<ExternalTransaction>;

    fn trade_reservation(&self, trade: TradeId) -> Option<TradeReservation>;

    fn trade_reservations(&self, account: AccountId) -> Vec<TradeReservation>;

    /// Apply every write of the batch, or none of them
    fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, LedgerError>;
}
