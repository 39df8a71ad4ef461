//! Journal replay against an in-memory ledger
//!
//! The [`JournalReplayer`] owns a complete ledger stack (store, lock
//! manager, offline wallet adapter) and routes each journal record to the
//! matching [`TransferOrchestrator`] operation:
//! - `deposit` → `record_incoming`, already confirmed
//! - `send` → `send_internal`
//! - `withdraw` → `send_external`
//!
//! It is `Send + Sync`; concurrent callers are serialized per account by the
//! lock manager, exactly as concurrent requests would be.

use crate::config::AppConfig;
use crate::core::{IncomingTransfer, InMemoryLedgerStore, LedgerContext, LedgerStore, TransferOrchestrator};
use crate::external::OfflineWalletAdapter;
use crate::io::csv_format::{write_balances_csv, BalanceRow, JournalOp, JournalRecord};
use crate::types::{CoinAmount, ExternalTransaction, LedgerError, TransferRecord, Wallet};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub struct JournalReplayer {
    store: Arc<InMemoryLedgerStore>,
    ctx: LedgerContext,
    orchestrator: TransferOrchestrator,
    wallet: Wallet,
}

impl JournalReplayer {
    /// Build a fresh ledger for the configured coin and wallet
    ///
    /// When `replay.operator_user` is set, that user's account is opened up
    /// front and registered as the wallet's fee collector.
    pub fn new(config: &AppConfig) -> Result<Self, LedgerError> {
        let settings = &config.replay;
        let store = Arc::new(InMemoryLedgerStore::new());

        let mut wallet = Wallet::new(settings.wallet_id, settings.coin.clone())
            .with_withdrawal_fee(settings.withdrawal_fee.clone())
            .with_required_confirmations(config.ledger.deposit_confirmations);
        store.insert_wallet(wallet.clone());

        if let Some(user) = settings.operator_user {
            let operator = store.get_or_create_wallet_account(user, wallet.id)?;
            wallet = wallet.with_operator(operator.id);
            store.insert_wallet(wallet.clone());
        }

        let adapter = OfflineWalletAdapter::new(settings.coin.clone())
            .with_network_fee(settings.network_fee);
        let ctx = LedgerContext::new(store.clone(), config.ledger.clone())
            .with_adapter(Arc::new(adapter));

        info!(
            coin = %wallet.coin,
            wallet = wallet.id,
            operator = ?wallet.operator_account,
            "Journal replayer ready"
        );

        Ok(JournalReplayer {
            orchestrator: TransferOrchestrator::new(ctx.clone()),
            store,
            ctx,
            wallet,
        })
    }

    /// Replay one journal record
    ///
    /// # Errors
    ///
    /// Any error of the underlying ledger operation; nothing is written when
    /// an operation fails.
    pub fn apply(&self, record: JournalRecord) -> Result<TransferRecord, LedgerError> {
        let account = self
            .store
            .get_or_create_wallet_account(record.user, self.wallet.id)?;
        let amount = CoinAmount::from_value(record.amount, self.wallet.coin.clone())?;
        debug!(user = record.user, op = ?record.op, amount = %amount, "Replaying journal record");

        match record.op {
            JournalOp::Deposit { tx_id } => {
                let id = tx_id.unwrap_or_else(|| Uuid::new_v4().to_string());
                self.orchestrator.record_incoming(IncomingTransfer {
                    account_id: account.id,
                    value: amount.clone(),
                    address: format!("deposit-{}", record.user),
                    transaction: ExternalTransaction {
                        hash: id.clone(),
                        id,
                        wallet_id: self.wallet.id,
                        confirmations: self.wallet.required_confirmations,
                        payload: json!({ "amount": amount.get_amount() }),
                    },
                    required_confirmations: None,
                })
            }
            JournalOp::Send { to } => {
                let target = self.store.get_or_create_wallet_account(to, self.wallet.id)?;
                self.orchestrator.send_internal(&account, &target, &amount)
            }
            JournalOp::Withdraw { address } => {
                self.orchestrator.send_external(&account, &address, &amount)
            }
        }
    }

    /// Balances of every account, in human units
    pub fn balances(&self) -> Result<Vec<BalanceRow>, LedgerError> {
        self.store
            .wallet_accounts()
            .into_iter()
            .filter(|account| account.wallet_id == self.wallet.id)
            .map(|account| {
                let balances = self.ctx.balances.wallet_balances(&account)?;
                Ok(BalanceRow {
                    user: account.user_id,
                    received: balances.total_received.value(),
                    sent: balances.total_sent.value(),
                    balance: balances.balance.value(),
                    available: balances.available.value(),
                })
            })
            .collect()
    }

    pub fn write_balances(&self, output: &mut dyn Write) -> Result<(), LedgerError> {
        write_balances_csv(&self.balances()?, self.wallet.coin.precision, output)
    }
}
