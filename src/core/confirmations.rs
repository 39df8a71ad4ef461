//! Confirmation tracking
//!
//! Confirmation counts only ever grow. The transition of a `receive` entry
//! into the confirmed state writes the account's running balance onto the
//! entry and, once committed, notifies the account owner.

use crate::core::context::{first_updated, LedgerContext};
use crate::core::traits::{LedgerWrite, WriteBatch};
use crate::external::LedgerEvent;
use crate::types::{EntryId, EntryType, LedgerError, TransferRecord, TransferRecordPatch};
use tracing::{debug, info};

#[derive(Clone)]
pub struct ConfirmationTracker {
    ctx: LedgerContext,
}

impl ConfirmationTracker {
    pub fn new(ctx: LedgerContext) -> Self {
        ConfirmationTracker { ctx }
    }

    /// Set the confirmation count of an entry
    ///
    /// Runs under the owning account's lock. Lowering the count fails with
    /// `InvalidStateTransition` and leaves the entry untouched; repeating the
    /// current count is a no-op.
    pub fn set_confirmations(
        &self,
        entry_id: EntryId,
        confirmations: u32,
    ) -> Result<TransferRecord, LedgerError> {
        let ctx = &self.ctx;
        let entry = ctx.store.transfer_record(entry_id)?;
        let account = ctx.store.wallet_account(entry.account_id)?;

        let result = ctx.locks.acquire_lock(ctx.store(), &account, |account| {
            let entry = ctx.store.transfer_record(entry_id)?;
            if confirmations < entry.confirmations {
                return Err(LedgerError::invalid_transition(
                    "transfer_record",
                    entry_id,
                    format!("{} confirmations", entry.confirmations),
                    format!("{} confirmations", confirmations),
                ));
            }
            if confirmations == entry.confirmations {
                return Ok((entry, false));
            }

            let confirms_receive = entry.entry_type == EntryType::Receive
                && !entry.is_confirmed()
                && confirmations >= entry.required_confirmations;

            let mut patch = TransferRecordPatch::confirmations(confirmations);
            if confirms_receive {
                // The entry does not count toward the balance until this commit lands
                let balance = ctx.balances.wallet_balances(&account)?.balance;
                patch = patch.with_snapshot(balance.add(&entry.value)?);
            }

            let mut batch = WriteBatch::new();
            batch.update_transfer(entry_id, patch);
            let record = first_updated(&ctx.store.commit(batch)?)?;
            Ok((record, confirms_receive))
        });

        let (record, newly_confirmed) = ctx.observe("set_confirmations", result)?;
        debug!(entry = entry_id, confirmations = record.confirmations, "Confirmations updated");
        if newly_confirmed {
            info!(entry = entry_id, account = record.account_id, value = %record.value, "Transfer confirmed");
            announce_confirmed(ctx, &record);
        }

        Ok(record)
    }

    /// Pull the confirmation count of the linked blockchain transaction
    pub fn sync_external(&self, entry_id: EntryId) -> Result<TransferRecord, LedgerError> {
        let ctx = &self.ctx;
        let entry = ctx.store.transfer_record(entry_id)?;
        let tx_id = entry
            .external_transaction
            .clone()
            .ok_or_else(|| LedgerError::not_found("external_transaction", format!("entry {}", entry_id)))?;

        let wallet = ctx.store.wallet(entry.wallet_id)?;
        let adapter = ctx.adapters.get(&wallet.coin)?;
        let tx = ctx.observe(
            "sync_external",
            adapter.get_transaction(&wallet, &tx_id).map_err(LedgerError::from),
        )?;

        let confirmations = tx.confirmations;
        let mut batch = WriteBatch::new();
        batch.push(LedgerWrite::PutExternalTransaction(tx));
        ctx.store.commit(batch)?;

        if confirmations > entry.confirmations {
            self.set_confirmations(entry_id, confirmations)
        } else {
            Ok(entry)
        }
    }
}

/// Notify the owner of a freshly confirmed receive
pub(crate) fn announce_confirmed(ctx: &LedgerContext, record: &TransferRecord) {
    ctx.notify(LedgerEvent::TransferConfirmed {
        entry_id: record.id,
        account_id: record.account_id,
        value: record.value.clone(),
        confirmations: record.confirmations,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::testing::{btc, Fixture};
    use crate::core::traits::LedgerStore;
    use crate::core::transfer::{IncomingTransfer, TransferOrchestrator};
    use crate::external::notifier::testing::RecordingNotifier;
    use crate::types::{ExternalTransaction, WalletAccount};
    use std::sync::Arc;

    fn receive(fx: &Fixture, account: &WalletAccount, value: &str) -> TransferRecord {
        TransferOrchestrator::new(fx.ctx.clone())
            .record_incoming(IncomingTransfer {
                account_id: account.id,
                value: btc(value),
                address: "bc1qdeposit".to_string(),
                transaction: ExternalTransaction {
                    id: format!("tx-{}", value),
                    hash: "beef".to_string(),
                    wallet_id: account.wallet_id,
                    confirmations: 0,
                    payload: serde_json::Value::Null,
                },
                required_confirmations: Some(3),
            })
            .unwrap()
    }

    #[test]
    fn test_confirmation_transition_snapshots_balance() {
        let fx = Fixture::new();
        let a = fx.account(1);
        fx.fund(&a, "1.0");
        let entry = receive(&fx, &a, "0.25");
        let tracker = ConfirmationTracker::new(fx.ctx.clone());

        let partial = tracker.set_confirmations(entry.id, 2).unwrap();
        assert!(!partial.is_confirmed());
        assert!(partial.balance_snapshot.is_none());
        assert!(fx.notifier.events().is_empty());

        let confirmed = tracker.set_confirmations(entry.id, 3).unwrap();
        assert!(confirmed.is_confirmed());
        assert_eq!(confirmed.balance_snapshot, Some(btc("1.25")));
        assert_eq!(fx.balances(&a).balance, btc("1.25"));
        assert_eq!(
            fx.notifier.events(),
            vec![LedgerEvent::TransferConfirmed {
                entry_id: entry.id,
                account_id: a.id,
                value: btc("0.25"),
                confirmations: 3,
            }]
        );

        // further confirmations do not notify again
        tracker.set_confirmations(entry.id, 10).unwrap();
        assert_eq!(fx.notifier.events().len(), 1);
    }

    #[test]
    fn test_decrease_is_rejected() {
        let fx = Fixture::new();
        let a = fx.account(1);
        let entry = receive(&fx, &a, "0.25");
        let tracker = ConfirmationTracker::new(fx.ctx.clone());
        tracker.set_confirmations(entry.id, 2).unwrap();

        let result = tracker.set_confirmations(entry.id, 1);
        assert!(matches!(result, Err(LedgerError::InvalidStateTransition { .. })));
        assert_eq!(fx.store.transfer_record(entry.id).unwrap().confirmations, 2);
    }

    #[test]
    fn test_same_count_is_noop() {
        let fx = Fixture::new();
        let a = fx.account(1);
        let entry = receive(&fx, &a, "0.25");
        let tracker = ConfirmationTracker::new(fx.ctx.clone());

        let unchanged = tracker.set_confirmations(entry.id, 0).unwrap();
        assert_eq!(unchanged, fx.store.transfer_record(entry.id).unwrap());
    }

    #[test]
    fn test_failed_notification_keeps_confirmation() {
        let fx = Fixture::new();
        let notifier = Arc::new(RecordingNotifier::failing());
        let ctx = fx.ctx.clone().with_notifier(notifier.clone());
        let a = fx.account(1);
        let entry = receive(&fx, &a, "0.25");

        let confirmed = ConfirmationTracker::new(ctx).set_confirmations(entry.id, 3).unwrap();

        assert!(confirmed.is_confirmed());
        assert_eq!(notifier.events().len(), 1);
        assert!(fx.store.transfer_record(entry.id).unwrap().is_confirmed());
    }

    #[test]
    fn test_sync_external_follows_adapter() {
        let fx = Fixture::new();
        let a = fx.account(1);
        fx.fund(&a, "1.0");
        let sent = TransferOrchestrator::new(fx.ctx.clone())
            .send_external(&a, "bc1qdestination", &btc("0.1"))
            .unwrap();
        let tx_id = sent.external_transaction.clone().unwrap();
        let tracker = ConfirmationTracker::new(fx.ctx.clone());

        let unchanged = tracker.sync_external(sent.id).unwrap();
        assert_eq!(unchanged.confirmations, 0);

        fx.adapter.advance(&tx_id, 2).unwrap();
        let synced = tracker.sync_external(sent.id).unwrap();
        assert_eq!(synced.confirmations, 2);
        assert!(synced.is_confirmed());
        assert_eq!(fx.store.external_transaction(&tx_id).unwrap().confirmations, 2);
        // sends are not announced
        assert!(fx.notifier.events().is_empty());
    }

    #[test]
    fn test_sync_requires_linked_transaction() {
        let fx = Fixture::new();
        let a = fx.account(1);
        fx.fund(&a, "1.0");
        let funding = fx.store.transfer_records(a.id).pop().unwrap();

        let result = ConfirmationTracker::new(fx.ctx.clone()).sync_external(funding.id);
        assert!(matches!(result, Err(LedgerError::NotFound { .. })));
    }
}
