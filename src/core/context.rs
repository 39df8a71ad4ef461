//! Shared collaborators of the ledger services
//!
//! Services never reach for globals: the store, lock manager, adapters,
//! oracle, notifier and configuration are bundled in a [`LedgerContext`]
//! built once at startup and cloned into each service.

use crate::config::LedgerConfig;
use crate::core::balance::BalanceEngine;
use crate::core::lock::{LockBackend, LockManager};
use crate::core::traits::{CommitReceipt, LedgerStore};
use crate::external::{
    AdapterRegistry, LedgerEvent, Notifier, PriceOracle, StaticPriceOracle, TracingNotifier,
    WalletAdapter,
};
use crate::types::{Coin, LedgerError, PaymentTransaction, TransferRecord};
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub struct LedgerContext {
    pub store: Arc<dyn LedgerStore>,
    pub locks: LockManager,
    pub balances: BalanceEngine,
    pub adapters: AdapterRegistry,
    pub oracle: Arc<dyn PriceOracle>,
    pub notifier: Arc<dyn Notifier>,
    pub config: LedgerConfig,
}

impl LedgerContext {
    /// Context with an in-memory lock backend, no adapters, a static oracle
    /// and a logging notifier
    pub fn new(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        LedgerContext {
            locks: LockManager::in_memory(config.lock.clone()),
            balances: BalanceEngine::new(Arc::clone(&store)),
            adapters: AdapterRegistry::new(),
            oracle: Arc::new(StaticPriceOracle::new()),
            notifier: Arc::new(TracingNotifier),
            store,
            config,
        }
    }

    pub fn with_lock_backend(mut self, backend: Arc<dyn LockBackend>) -> Self {
        self.locks = LockManager::new(backend, self.config.lock.clone());
        self
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn WalletAdapter>) -> Self {
        self.adapters.register(adapter);
        self
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn PriceOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn store(&self) -> &dyn LedgerStore {
        self.store.as_ref()
    }

    /// Oracle price for audit stamping; a failing oracle stamps zero
    pub fn dollar_price(&self, coin: &Coin) -> f64 {
        match self.oracle.dollar_price(coin) {
            Ok(price) => price,
            Err(e) => {
                warn!(coin = %coin, error = %e, "Price oracle unavailable, stamping zero price");
                0.0
            }
        }
    }

    pub fn notify(&self, event: LedgerEvent) {
        crate::external::dispatch(self.notifier.as_ref(), event);
    }

    /// Log a failed operation at a level matching its severity
    pub fn observe<T>(
        &self,
        operation: &'static str,
        result: Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        if let Err(e) = &result {
            match e {
                LedgerError::InvalidStateTransition { .. }
                | LedgerError::ImmutableProperty { .. }
                | LedgerError::LockOrderViolation { .. }
                | LedgerError::ArithmeticOverflow { .. } => {
                    error!(operation, error = %e, "Ledger integrity violation")
                }
                e if e.is_client_error() => debug!(operation, error = %e, "Operation rejected"),
                e => warn!(operation, error = %e, "Operation failed"),
            }
        }
        result
    }
}

/// First transfer record a commit inserted
pub(crate) fn first_inserted(receipt: &CommitReceipt) -> Result<TransferRecord, LedgerError> {
    receipt
        .inserted_transfers
        .first()
        .cloned()
        .ok_or_else(|| LedgerError::not_found("transfer_record", "inserted"))
}

/// First transfer record a commit updated
pub(crate) fn first_updated(receipt: &CommitReceipt) -> Result<TransferRecord, LedgerError> {
    receipt
        .updated_transfers
        .first()
        .cloned()
        .ok_or_else(|| LedgerError::not_found("transfer_record", "updated"))
}

/// First payment transaction a commit inserted or updated
pub(crate) fn first_payment(receipt: &CommitReceipt) -> Result<PaymentTransaction, LedgerError> {
    receipt
        .inserted_payments
        .first()
        .or_else(|| receipt.updated_payments.first())
        .cloned()
        .ok_or_else(|| LedgerError::not_found("payment_transaction", "committed"))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::balance::WalletBalances;
    use crate::core::store::InMemoryLedgerStore;
    use crate::core::traits::WriteBatch;
    use crate::external::notifier::testing::RecordingNotifier;
    use crate::external::OfflineWalletAdapter;
    use crate::types::{CoinAmount, Currency, FeeModel, NewTransferRecord, UserId, Wallet, WalletAccount};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    pub const OPERATOR: UserId = 0;

    pub fn btc(value: &str) -> CoinAmount {
        CoinAmount::from_value(Decimal::from_str(value).unwrap(), Coin::bitcoin()).unwrap()
    }

    /// BTC wallet 1 with an operator account, an offline adapter quoting a
    /// 1000 sat network fee and a recording notifier
    pub struct Fixture {
        pub store: Arc<InMemoryLedgerStore>,
        pub adapter: Arc<OfflineWalletAdapter>,
        pub notifier: Arc<RecordingNotifier>,
        pub ctx: LedgerContext,
        pub operator: WalletAccount,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self::with_fee(FeeModel::None)
        }

        pub fn with_fee(fee: FeeModel) -> Self {
            let store = Arc::new(InMemoryLedgerStore::new());
            store.insert_wallet(Wallet::new(1, Coin::bitcoin()));
            let operator = store.get_or_create_wallet_account(OPERATOR, 1).unwrap();
            store.insert_wallet(
                Wallet::new(1, Coin::bitcoin())
                    .with_operator(operator.id)
                    .with_withdrawal_fee(fee),
            );

            let adapter = Arc::new(
                OfflineWalletAdapter::new(Coin::bitcoin())
                    .with_network_fee(Decimal::from(1_000))
                    .with_limits(Decimal::from(546), Decimal::from(10_000_000_000u64)),
            );
            let notifier = Arc::new(RecordingNotifier::default());
            let oracle = StaticPriceOracle::new().with_price(&Coin::bitcoin(), &Currency::usd(), 30_000.0);

            let ctx = LedgerContext::new(store.clone(), LedgerConfig::default())
                .with_adapter(adapter.clone())
                .with_oracle(Arc::new(oracle))
                .with_notifier(notifier.clone());

            Fixture {
                store,
                adapter,
                notifier,
                ctx,
                operator,
            }
        }

        pub fn account(&self, user: UserId) -> WalletAccount {
            self.store.get_or_create_wallet_account(user, 1).unwrap()
        }

        /// Confirmed credit written straight to the store
        pub fn fund(&self, account: &WalletAccount, value: &str) {
            let mut batch = WriteBatch::new();
            batch.insert_transfer(NewTransferRecord::receive(account, btc(value), "funding"));
            self.store.commit(batch).unwrap();
        }

        pub fn balances(&self, account: &WalletAccount) -> WalletBalances {
            self.ctx.balances.wallet_balances(account).unwrap()
        }
    }
}
