//! Transfer orchestration
//!
//! [`TransferOrchestrator`] composes locks, balance checks and ledger writes
//! into the account-level operations:
//!
//! - internal send between two accounts of the same wallet
//! - external send to a blockchain address through the wallet adapter
//! - ingestion of incoming blockchain credits
//! - cleanup of external sends whose broadcast never happened
//!
//! Every debit follows the same pattern: lock the source account, work on the
//! fresh copy the lock hands over, check `available`, commit all entries of
//! the operation in one batch.

use crate::core::confirmations::announce_confirmed;
use crate::core::context::{first_inserted, first_updated, LedgerContext};
use crate::core::traits::{LedgerWrite, WriteBatch};
use crate::external::{SendRequest, WalletAdapter};
use crate::types::{
    AccountId, CoinAmount, EntryId, EntryType, ExternalTransaction, LedgerError,
    NewTransferRecord, TransferRecord, TransferRecordPatch, Wallet, WalletAccount,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Blockchain credit reported by the transaction watcher
#[derive(Debug, Clone)]
pub struct IncomingTransfer {
    pub account_id: AccountId,
    pub value: CoinAmount,
    pub address: String,
    pub transaction: ExternalTransaction,

    /// Overrides the wallet's required confirmations
    pub required_confirmations: Option<u32>,
}

/// External send committed but not broadcast yet
struct PendingBroadcast {
    record: TransferRecord,
    source: WalletAccount,
    wallet: Wallet,
    adapter: Arc<dyn WalletAdapter>,
    fee: CoinAmount,
    /// Account credited with `fee` once the send is on chain
    fee_collector: Option<WalletAccount>,
}

#[derive(Clone)]
pub struct TransferOrchestrator {
    ctx: LedgerContext,
}

impl TransferOrchestrator {
    pub fn new(ctx: LedgerContext) -> Self {
        TransferOrchestrator { ctx }
    }

    /// Move `amount` from `source` to `target` within one wallet
    ///
    /// Writes a `send` on the source and a `receive` on the target, linked by
    /// a shared reference, and returns the source entry.
    ///
    /// # Errors
    ///
    /// * `InvalidTarget` - target is the source or belongs to another wallet
    /// * `InvalidAmount` - amount is zero or negative
    /// * `CurrencyMismatch` - amount is not in the account's coin
    /// * `InsufficientFunds` - amount exceeds the source's available balance
    pub fn send_internal(
        &self,
        source: &WalletAccount,
        target: &WalletAccount,
        amount: &CoinAmount,
    ) -> Result<TransferRecord, LedgerError> {
        let ctx = &self.ctx;
        let result = ctx.locks.acquire_lock(ctx.store(), source, |source| {
            let target = ctx.store.wallet_account(target.id)?;
            if source.id == target.id {
                return Err(LedgerError::invalid_target("cannot send to the same account"));
            }
            if source.wallet_id != target.wallet_id {
                return Err(LedgerError::invalid_target(
                    "target account belongs to a different wallet",
                ));
            }
            ensure_positive(amount)?;

            let balances = ctx.balances.wallet_balances(&source)?;
            balances.ensure_available(source.id, amount)?;

            let price = ctx.dollar_price(&source.coin);
            let reference = Uuid::new_v4();
            let mut batch = WriteBatch::new();
            batch
                .insert_transfer(
                    NewTransferRecord::send(
                        &source,
                        amount.clone(),
                        &format!("Sent to user {}", target.user_id),
                    )
                    .dollar_price(price)
                    .reference(reference),
                )
                .insert_transfer(
                    NewTransferRecord::receive(
                        &target,
                        amount.clone(),
                        &format!("Received from user {}", source.user_id),
                    )
                    .dollar_price(price)
                    .reference(reference),
                );

            let record = first_inserted(&ctx.store.commit(batch)?)?;
            info!(
                from = source.id,
                to = target.id,
                amount = %amount,
                reference = %reference,
                "Internal transfer committed"
            );
            Ok(record)
        });

        ctx.observe("send_internal", result)
    }

    /// Send `amount` to a blockchain address
    ///
    /// The debit covers the amount, the wallet's withdrawal fee and the
    /// adapter's network fee estimate; the operator account does not pay the
    /// network fee. The debit is committed under the account lock, then
    /// broadcast after the lock is released. If the broadcast fails the
    /// entry stays external, unconfirmed and removable for reconciliation,
    /// and the adapter failure is returned.
    ///
    /// After a successful broadcast the transaction is linked to the debit in
    /// its own commit, and the operator's fee credit follows as a separate
    /// entry. The operator account is resolved before the debit is written.
    pub fn send_external(
        &self,
        source: &WalletAccount,
        address: &str,
        amount: &CoinAmount,
    ) -> Result<TransferRecord, LedgerError> {
        let ctx = &self.ctx;
        let prepared = ctx.locks.acquire_lock(ctx.store(), source, |source| {
            self.debit_external(source, address, amount)
        });
        let prepared = ctx.observe("send_external", prepared)?;

        let broadcast = self.broadcast(prepared, address, amount);
        ctx.observe("send_external", broadcast)
    }

    fn debit_external(
        &self,
        source: WalletAccount,
        address: &str,
        amount: &CoinAmount,
    ) -> Result<PendingBroadcast, LedgerError> {
        let ctx = &self.ctx;
        if address.trim().is_empty() {
            return Err(LedgerError::invalid_target("destination address is empty"));
        }
        ensure_positive(amount)?;

        let wallet = ctx.store.wallet(source.wallet_id)?;
        let adapter = ctx.adapters.get(&source.coin)?;

        let minimum = adapter.minimum_transferable();
        let maximum = adapter.maximum_transferable();
        if amount.less_than(&minimum)? || amount.greater_than(&maximum)? {
            return Err(LedgerError::AmountOutOfBounds {
                amount: amount.value(),
                min: minimum.value(),
                max: maximum.value(),
            });
        }

        let fee = wallet.withdrawal_fee.compute(amount)?;
        let network_fee = if wallet.is_operator(source.id) {
            CoinAmount::zero(source.coin.clone())
        } else {
            adapter.estimate_transaction_fee(amount, 1)?
        };
        let debit = amount.add(&fee)?.add(&network_fee)?;

        // Resolved before anything is written or broadcast
        let fee_collector = match wallet.operator_account.filter(|id| *id != source.id) {
            Some(operator) if fee.is_positive() => Some(ctx.store.wallet_account(operator)?),
            _ => None,
        };

        let balances = ctx.balances.wallet_balances(&source)?;
        balances.ensure_available(source.id, &debit)?;

        let mut batch = WriteBatch::new();
        batch.insert_transfer(
            NewTransferRecord::send(&source, debit.clone(), &format!("Sent to {}", address))
                .external(address)
                .confirmations(0, 1)
                .dollar_price(ctx.dollar_price(&source.coin))
                .reference(Uuid::new_v4()),
        );
        let record = first_inserted(&ctx.store.commit(batch)?)?;

        info!(
            entry = record.id,
            account = source.id,
            amount = %amount,
            fee = %fee,
            network_fee = %network_fee,
            "External send debited"
        );

        Ok(PendingBroadcast {
            record,
            source,
            wallet,
            adapter,
            fee,
            fee_collector,
        })
    }

    fn broadcast(
        &self,
        prepared: PendingBroadcast,
        address: &str,
        amount: &CoinAmount,
    ) -> Result<TransferRecord, LedgerError> {
        let ctx = &self.ctx;
        let PendingBroadcast {
            record,
            source,
            wallet,
            adapter,
            fee,
            fee_collector,
        } = prepared;

        let tx = match adapter.send(SendRequest {
            wallet: &wallet,
            address,
            amount,
        }) {
            Ok(tx) => tx,
            Err(failure) => {
                warn!(
                    entry = record.id,
                    error = %failure,
                    "Broadcast failed; debit left removable for reconciliation"
                );
                return Err(failure.into());
            }
        };

        // The link goes in on its own: once it is committed the debit is no
        // longer removable, whatever happens to the fee credit
        let mut batch = WriteBatch::new();
        batch
            .push(LedgerWrite::PutExternalTransaction(tx.clone()))
            .update_transfer(record.id, TransferRecordPatch::external_transaction(&tx.id));
        let receipt = ctx.store.commit(batch).inspect_err(|e| {
            error!(entry = record.id, tx = %tx.id, error = %e, "Broadcast succeeded but could not be recorded");
        })?;
        let linked = first_updated(&receipt)?;
        info!(entry = linked.id, tx = %tx.id, hash = %tx.hash, "External send broadcast");

        if let Some(operator) = fee_collector {
            self.credit_withdrawal_fee(&linked, &source, &operator, fee);
        }

        Ok(linked)
    }

    /// Credit the operator with a withdrawal fee already paid by `source`
    ///
    /// The send is on chain by now, so a failure here is logged for manual
    /// reconciliation instead of failing the send.
    fn credit_withdrawal_fee(
        &self,
        send: &TransferRecord,
        source: &WalletAccount,
        operator: &WalletAccount,
        fee: CoinAmount,
    ) {
        let mut credit = NewTransferRecord::receive(
            operator,
            fee.clone(),
            &format!("Withdrawal fee from user {}", source.user_id),
        )
        .dollar_price(send.dollar_price);
        if let Some(reference) = send.reference {
            credit = credit.reference(reference);
        }

        let mut batch = WriteBatch::new();
        batch.insert_transfer(credit);
        match self.ctx.store.commit(batch) {
            Ok(_) => info!(entry = send.id, operator = operator.id, fee = %fee, "Withdrawal fee credited"),
            Err(e) => error!(
                entry = send.id,
                operator = operator.id,
                fee = %fee,
                error = %e,
                "Withdrawal fee could not be credited"
            ),
        }
    }

    /// Record a blockchain credit reported by the transaction watcher
    ///
    /// Reporting the same external transaction twice returns the existing
    /// entry. A credit that arrives already confirmed gets its balance
    /// snapshot and notification right away.
    pub fn record_incoming(&self, incoming: IncomingTransfer) -> Result<TransferRecord, LedgerError> {
        let ctx = &self.ctx;
        let account = ctx.store.wallet_account(incoming.account_id)?;

        let result = ctx.locks.acquire_lock(ctx.store(), &account, |account| {
            ensure_positive(&incoming.value)?;

            let tx_id = incoming.transaction.id.as_str();
            if let Some(existing) = ctx.store.transfer_records(account.id).into_iter().find(|r| {
                r.entry_type == EntryType::Receive && r.external_transaction.as_deref() == Some(tx_id)
            }) {
                return Ok((existing, false));
            }

            let wallet = ctx.store.wallet(account.wallet_id)?;
            let required = incoming
                .required_confirmations
                .unwrap_or(wallet.required_confirmations);

            let mut batch = WriteBatch::new();
            batch
                .push(LedgerWrite::PutExternalTransaction(incoming.transaction.clone()))
                .insert_transfer(
                    NewTransferRecord::receive(
                        &account,
                        incoming.value.clone(),
                        &format!("Received at {}", incoming.address),
                    )
                    .external(&incoming.address)
                    .confirmations(incoming.transaction.confirmations, required)
                    .external_transaction(tx_id)
                    .dollar_price(ctx.dollar_price(&account.coin)),
                );
            let record = first_inserted(&ctx.store.commit(batch)?)?;

            if !record.is_confirmed() {
                return Ok((record, false));
            }

            let snapshot = ctx.balances.wallet_balances(&account)?.balance;
            let mut batch = WriteBatch::new();
            batch.update_transfer(record.id, TransferRecordPatch::default().with_snapshot(snapshot));
            Ok((first_updated(&ctx.store.commit(batch)?)?, true))
        });

        let (record, confirmed) = ctx.observe("record_incoming", result)?;
        info!(
            entry = record.id,
            account = record.account_id,
            value = %record.value,
            confirmations = record.confirmations,
            "Incoming transfer recorded"
        );
        if confirmed {
            announce_confirmed(ctx, &record);
        }

        Ok(record)
    }

    /// Delete an external send that was never broadcast
    ///
    /// Only unconfirmed external sends without a linked transaction qualify;
    /// anything else fails with `InvalidStateTransition`.
    pub fn remove_dangling(&self, entry_id: EntryId) -> Result<TransferRecord, LedgerError> {
        let ctx = &self.ctx;
        let entry = ctx.store.transfer_record(entry_id)?;
        let account = ctx.store.wallet_account(entry.account_id)?;

        let result = ctx.locks.acquire_lock(ctx.store(), &account, |_| {
            let entry = ctx.store.transfer_record(entry_id)?;
            let mut batch = WriteBatch::new();
            batch.push(LedgerWrite::DeleteTransfer(entry_id));
            ctx.store.commit(batch)?;

            info!(entry = entry_id, account = entry.account_id, value = %entry.value, "Removed dangling send");
            Ok(entry)
        });

        ctx.observe("remove_dangling", result)
    }

    /// External sends of an account awaiting reconciliation
    pub fn dangling_sends(&self, account: AccountId) -> Vec<TransferRecord> {
        self.ctx
            .store
            .transfer_records(account)
            .into_iter()
            .filter(TransferRecord::is_removable)
            .collect()
    }
}

pub(crate) fn ensure_positive(amount: &CoinAmount) -> Result<(), LedgerError> {
    if !amount.is_positive() {
        return Err(LedgerError::invalid_amount(
            amount.get_amount(),
            "amount must be positive",
        ));
    }
    Ok(())
}
