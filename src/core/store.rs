//! In-memory ledger store
//!
//! This module provides [`InMemoryLedgerStore`], the reference implementation
//! of [`LedgerStore`]. All tables live behind one `RwLock`, so a batch commit
//! holds the write lock for its whole duration and readers never observe a
//! half-applied batch.
//!
//! # Atomicity
//!
//! Writes are applied one by one while an undo log is recorded. If any write
//! is rejected the undo log is replayed in reverse and the id sequences are
//! rewound, leaving the store exactly as it was before the commit.

use crate::core::traits::{CommitReceipt, LedgerStore, LedgerWrite, WriteBatch};
use crate::types::{
    AccountId, Currency, Denomination, EntryId, ExternalTransaction, LedgerError,
    PaymentAccount, PaymentTransaction, TradeId, TradeReservation, TransferRecord, UserId, Wallet,
    WalletAccount, WalletId,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug)]
struct StoreState {
    wallets: HashMap<WalletId, Wallet>,
    wallet_accounts: BTreeMap<AccountId, WalletAccount>,
    payment_accounts: BTreeMap<AccountId, PaymentAccount>,
    transfers: BTreeMap<EntryId, TransferRecord>,
    payments: BTreeMap<EntryId, PaymentTransaction>,
    external: HashMap<String, ExternalTransaction>,
    reservations: BTreeMap<TradeId, TradeReservation>,
    next_account_id: AccountId,
    next_entry_id: EntryId,
}

impl Default for StoreState {
    fn default() -> Self {
        StoreState {
            wallets: HashMap::new(),
            wallet_accounts: BTreeMap::new(),
            payment_accounts: BTreeMap::new(),
            transfers: BTreeMap::new(),
            payments: BTreeMap::new(),
            external: HashMap::new(),
            reservations: BTreeMap::new(),
            next_account_id: 1,
            next_entry_id: 1,
        }
    }
}

enum Undo {
    RemoveTransfer(EntryId),
    RestoreTransfer(TransferRecord),
    RemovePayment(EntryId),
    RestorePayment(PaymentTransaction),
    RemoveExternal(String),
    RestoreExternal(ExternalTransaction),
    RemoveReservation(TradeId),
    RestoreReservation(TradeReservation),
}

impl StoreState {
    fn wallet_account(&self, id: AccountId) -> Result<&WalletAccount, LedgerError> {
        self.wallet_accounts
            .get(&id)
            .ok_or_else(|| LedgerError::not_found("wallet_account", id))
    }

    fn apply(
        &mut self,
        write: LedgerWrite,
        receipt: &mut CommitReceipt,
        undo: &mut Vec<Undo>,
    ) -> Result<(), LedgerError> {
        let now = Utc::now();

        match write {
            LedgerWrite::InsertTransfer(record) => {
                let account = self.wallet_account(record.account_id)?;
                if !account.coin.same_denomination(record.value.unit()) {
                    return Err(LedgerError::currency_mismatch(
                        account.coin.code(),
                        record.value.unit().code(),
                    ));
                }
                if record.value.is_negative() {
                    return Err(LedgerError::invalid_amount(
                        record.value.get_amount(),
                        "ledger entries carry non-negative values",
                    ));
                }

                let id = self.next_entry_id;
                self.next_entry_id += 1;
                let record = record.into_record(id, now);
                self.transfers.insert(id, record.clone());
                undo.push(Undo::RemoveTransfer(id));
                receipt.inserted_transfers.push(record);
            }
            LedgerWrite::UpdateTransfer { id, patch } => {
                let record = self
                    .transfers
                    .get_mut(&id)
                    .ok_or_else(|| LedgerError::not_found("transfer_record", id))?;
                let before = record.clone();
                record.apply(&patch)?;
                receipt.updated_transfers.push(record.clone());
                undo.push(Undo::RestoreTransfer(before));
            }
            LedgerWrite::DeleteTransfer(id) => {
                let record = self
                    .transfers
                    .get(&id)
                    .ok_or_else(|| LedgerError::not_found("transfer_record", id))?;
                if !record.is_removable() {
                    return Err(LedgerError::invalid_transition(
                        "transfer_record",
                        id,
                        "retained",
                        "deleted",
                    ));
                }
                if let Some(record) = self.transfers.remove(&id) {
                    undo.push(Undo::RestoreTransfer(record));
                }
            }
            LedgerWrite::InsertPayment(record) => {
                let account = self
                    .payment_accounts
                    .get(&record.account_id)
                    .ok_or_else(|| LedgerError::not_found("payment_account", record.account_id))?;
                if !account.currency.same_denomination(record.amount.unit()) {
                    return Err(LedgerError::currency_mismatch(
                        account.currency.code(),
                        record.amount.unit().code(),
                    ));
                }
                if record.amount.is_negative() {
                    return Err(LedgerError::invalid_amount(
                        record.amount.get_amount(),
                        "ledger entries carry non-negative values",
                    ));
                }

                let id = self.next_entry_id;
                self.next_entry_id += 1;
                let record = record.into_record(id, now);
                self.payments.insert(id, record.clone());
                undo.push(Undo::RemovePayment(id));
                receipt.inserted_payments.push(record);
            }
            LedgerWrite::TransitionPayment { id, status } => {
                let record = self
                    .payments
                    .get_mut(&id)
                    .ok_or_else(|| LedgerError::not_found("payment_transaction", id))?;
                let before = record.clone();
                record.transition(status, now)?;
                receipt.updated_payments.push(record.clone());
                undo.push(Undo::RestorePayment(before));
            }
            LedgerWrite::PutExternalTransaction(tx) => {
                match self.external.insert(tx.id.clone(), tx.clone()) {
                    Some(previous) => undo.push(Undo::RestoreExternal(previous)),
                    None => undo.push(Undo::RemoveExternal(tx.id)),
                }
            }
            LedgerWrite::ReserveTrade {
                trade_id,
                account_id,
                amount,
            } => {
                let account = self.wallet_account(account_id)?;
                if !account.coin.same_denomination(amount.unit()) {
                    return Err(LedgerError::currency_mismatch(
                        account.coin.code(),
                        amount.unit().code(),
                    ));
                }
                if self.reservations.contains_key(&trade_id) {
                    return Err(LedgerError::invalid_transition(
                        "trade",
                        trade_id,
                        "reserved",
                        "reserved",
                    ));
                }

                self.reservations.insert(
                    trade_id,
                    TradeReservation {
                        trade_id,
                        account_id,
                        amount,
                        created_at: now,
                    },
                );
                undo.push(Undo::RemoveReservation(trade_id));
            }
            LedgerWrite::ReleaseTrade(trade_id) => {
                if let Some(reservation) = self.reservations.remove(&trade_id) {
                    undo.push(Undo::RestoreReservation(reservation));
                }
            }
        }

        Ok(())
    }

    fn rollback(&mut self, undo: Vec<Undo>) {
        for action in undo.into_iter().rev() {
            match action {
                Undo::RemoveTransfer(id) => {
                    self.transfers.remove(&id);
                }
                Undo::RestoreTransfer(record) => {
                    self.transfers.insert(record.id, record);
                }
                Undo::RemovePayment(id) => {
                    self.payments.remove(&id);
                }
                Undo::RestorePayment(record) => {
                    self.payments.insert(record.id, record);
                }
                Undo::RemoveExternal(id) => {
                    self.external.remove(&id);
                }
                Undo::RestoreExternal(tx) => {
                    self.external.insert(tx.id.clone(), tx);
                }
                Undo::RemoveReservation(trade_id) => {
                    self.reservations.remove(&trade_id);
                }
                Undo::RestoreReservation(reservation) => {
                    self.reservations.insert(reservation.trade_id, reservation);
                }
            }
        }
    }
}

/// Thread-safe in-memory implementation of [`LedgerStore`]
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<StoreState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a wallet
    pub fn insert_wallet(&self, wallet: Wallet) {
        self.write().wallets.insert(wallet.id, wallet);
    }

    /// Number of transfer records currently stored
    pub fn transfer_count(&self) -> usize {
        self.read().transfers.len()
    }

    // A poisoned lock only means another thread panicked mid-read or after a
    // fully applied/rolled back commit; the state itself is consistent.
    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn wallet(&self, id: WalletId) -> Result<Wallet, LedgerError> {
        self.read()
            .wallets
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("wallet", id))
    }

    fn wallet_account(&self, id: AccountId) -> Result<WalletAccount, LedgerError> {
        self.read().wallet_account(id).cloned()
    }

    fn payment_account(&self, id: AccountId) -> Result<PaymentAccount, LedgerError> {
        self.read()
            .payment_accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("payment_account", id))
    }

    fn get_or_create_wallet_account(
        &self,
        user: UserId,
        wallet: WalletId,
    ) -> Result<WalletAccount, LedgerError> {
        let mut state = self.write();

        if let Some(account) = state
            .wallet_accounts
            .values()
            .find(|a| a.user_id == user && a.wallet_id == wallet)
        {
            return Ok(account.clone());
        }

        let coin = state
            .wallets
            .get(&wallet)
            .map(|w| w.coin.clone())
            .ok_or_else(|| LedgerError::not_found("wallet", wallet))?;

        let id = state.next_account_id;
        state.next_account_id += 1;
        let account = WalletAccount {
            id,
            user_id: user,
            wallet_id: wallet,
            coin,
            created_at: Utc::now(),
        };
        state.wallet_accounts.insert(id, account.clone());
        tracing::debug!(account = id, user, wallet, "opened wallet account");

        Ok(account)
    }

    fn get_or_create_payment_account(
        &self,
        user: UserId,
        currency: &Currency,
    ) -> Result<PaymentAccount, LedgerError> {
        let mut state = self.write();

        if let Some(account) = state
            .payment_accounts
            .values()
            .find(|a| a.user_id == user && a.currency.code == currency.code)
        {
            return Ok(account.clone());
        }

        let id = state.next_account_id;
        state.next_account_id += 1;
        let account = PaymentAccount {
            id,
            user_id: user,
            currency: currency.clone(),
            created_at: Utc::now(),
        };
        state.payment_accounts.insert(id, account.clone());
        tracing::debug!(account = id, user, currency = %currency, "opened payment account");

        Ok(account)
    }

    fn wallet_accounts(&self) -> Vec<WalletAccount> {
        self.read().wallet_accounts.values().cloned().collect()
    }

    fn transfer_record(&self, id: EntryId) -> Result<TransferRecord, LedgerError> {
        self.read()
            .transfers
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("transfer_record", id))
    }

    fn transfer_records(&self, account: AccountId) -> Vec<TransferRecord> {
        self.read()
            .transfers
            .values()
            .filter(|r| r.account_id == account)
            .cloned()
            .collect()
    }

    fn payment_transaction(&self, id: EntryId) -> Result<PaymentTransaction, LedgerError> {
        self.read()
            .payments
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("payment_transaction", id))
    }

    fn payment_transactions(&self, account: AccountId) -> Vec<PaymentTransaction> {
        self.read()
            .payments
            .values()
            .filter(|p| p.account_id == account)
            .cloned()
            .collect()
    }

    fn external_transaction(&self, id: &str) -> Option<ExternalTransaction> {
        self.read().external.get(id).cloned()
    }

    fn trade_reservation(&self, trade: TradeId) -> Option<TradeReservation> {
        self.read().reservations.get(&trade).cloned()
    }

    fn trade_reservations(&self, account: AccountId) -> Vec<TradeReservation> {
        self.read()
            .reservations
            .values()
            .filter(|r| r.account_id == account)
            .cloned()
            .collect()
    }

    fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, LedgerError> {
        let mut state = self.write();
        let next_entry_id = state.next_entry_id;
        let mut receipt = CommitReceipt::default();
        let mut undo = Vec::with_capacity(batch.len());

        for write in batch.into_writes() {
            if let Err(e) = state.apply(write, &mut receipt, &mut undo) {
                state.rollback(undo);
                state.next_entry_id = next_entry_id;
                return Err(e);
            }
        }

        Ok(receipt)
    }
}
