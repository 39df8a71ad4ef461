//! Balance derivation
//!
//! Accounts carry no balance column. [`BalanceEngine`] derives every figure
//! from the account's ledger entries on each call; nothing is cached, so a
//! figure computed inside an account lock reflects every committed write.
//!
//! Crypto accounts:
//! - received: confirmed `receive` entries
//! - sent: every `send` entry, confirmed or not
//! - pending: unconfirmed `receive` entries
//! - reserved on trade: open trade reservations against the account
//!
//! Fiat accounts:
//! - received: `completed` receives
//! - sent: sends that are not `canceled`
//! - pending: receives still pending
//! - reserved on trade: always zero

use crate::core::traits::LedgerStore;
use crate::types::amount::sum;
use crate::types::{
    Coin, CoinAmount, Currency, Denomination, EntryType, FixedAmount, LedgerError, MoneyAmount,
    PaymentAccount, PaymentStatus, WalletAccount,
};
use std::sync::Arc;

/// Derived figures of one account
#[derive(Debug, Clone, PartialEq)]
pub struct AccountBalances<D: Denomination> {
    pub total_received: FixedAmount<D>,
    pub total_sent: FixedAmount<D>,
    /// `total_received - total_sent`
    pub balance: FixedAmount<D>,
    /// Incoming value that does not count yet
    pub pending: FixedAmount<D>,
    pub reserved_on_trade: FixedAmount<D>,
    /// `balance - reserved_on_trade`
    pub available: FixedAmount<D>,
}

impl<D: Denomination> AccountBalances<D> {
    fn derive(
        total_received: FixedAmount<D>,
        total_sent: FixedAmount<D>,
        pending: FixedAmount<D>,
        reserved_on_trade: FixedAmount<D>,
    ) -> Result<Self, LedgerError> {
        let balance = total_received.subtract(&total_sent)?;
        let available = balance.subtract(&reserved_on_trade)?;

        Ok(AccountBalances {
            total_received,
            total_sent,
            balance,
            pending,
            reserved_on_trade,
            available,
        })
    }

    /// Fail with `InsufficientFunds` unless `amount` fits in `available`
    pub fn ensure_available(
        &self,
        account: u64,
        amount: &FixedAmount<D>,
    ) -> Result<(), LedgerError> {
        if self.available.less_than(amount)? {
            return Err(LedgerError::insufficient_funds(
                account,
                self.available.value(),
                amount.value(),
            ));
        }
        Ok(())
    }
}

pub type WalletBalances = AccountBalances<Coin>;
pub type PaymentBalances = AccountBalances<Currency>;

/// Computes account figures from ledger entries
#[derive(Clone)]
pub struct BalanceEngine {
    store: Arc<dyn LedgerStore>,
}

impl BalanceEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        BalanceEngine { store }
    }

    pub fn wallet_balances(&self, account: &WalletAccount) -> Result<WalletBalances, LedgerError> {
        let coin = &account.coin;
        let entries = self.store.transfer_records(account.id);

        let received = sum(
            coin,
            entries
                .iter()
                .filter(|e| e.entry_type == EntryType::Receive && e.is_confirmed())
                .map(|e| &e.value),
        )?;
        let sent = sum(
            coin,
            entries
                .iter()
                .filter(|e| e.entry_type == EntryType::Send)
                .map(|e| &e.value),
        )?;
        let pending = sum(
            coin,
            entries
                .iter()
                .filter(|e| e.entry_type == EntryType::Receive && !e.is_confirmed())
                .map(|e| &e.value),
        )?;

        let reservations = self.store.trade_reservations(account.id);
        let reserved = sum(coin, reservations.iter().map(|r| &r.amount))?;

        AccountBalances::derive(received, sent, pending, reserved)
    }

    pub fn payment_balances(
        &self,
        account: &PaymentAccount,
    ) -> Result<PaymentBalances, LedgerError> {
        let currency = &account.currency;
        let entries = self.store.payment_transactions(account.id);

        let received = sum(
            currency,
            entries
                .iter()
                .filter(|e| e.entry_type == EntryType::Receive && e.status == PaymentStatus::Completed)
                .map(|e| &e.amount),
        )?;
        let sent = sum(
            currency,
            entries
                .iter()
                .filter(|e| e.entry_type == EntryType::Send && e.status != PaymentStatus::Canceled)
                .map(|e| &e.amount),
        )?;
        let pending = sum(
            currency,
            entries
                .iter()
                .filter(|e| e.entry_type == EntryType::Receive && e.status.is_pending())
                .map(|e| &e.amount),
        )?;

        AccountBalances::derive(received, sent, pending, MoneyAmount::zero(currency.clone()))
    }

    /// Shortcut for [`wallet_balances`](Self::wallet_balances)`.available`
    pub fn available(&self, account: &WalletAccount) -> Result<CoinAmount, LedgerError> {
        Ok(self.wallet_balances(account)?.available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::InMemoryLedgerStore;
    use crate::core::traits::{LedgerWrite, WriteBatch};
    use crate::types::{NewPaymentTransaction, NewTransferRecord, Wallet};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn btc(value: &str) -> CoinAmount {
        CoinAmount::from_value(Decimal::from_str(value).unwrap(), Coin::bitcoin()).unwrap()
    }

    fn usd(value: &str) -> MoneyAmount {
        MoneyAmount::from_value(Decimal::from_str(value).unwrap(), Currency::usd()).unwrap()
    }

    fn setup() -> (Arc<InMemoryLedgerStore>, BalanceEngine, WalletAccount) {
        let store = Arc::new(InMemoryLedgerStore::new());
        store.insert_wallet(Wallet::new(1, Coin::bitcoin()));
        let account = store.get_or_create_wallet_account(1, 1).unwrap();
        let engine = BalanceEngine::new(store.clone());
        (store, engine, account)
    }

    #[test]
    fn test_empty_account_is_zero() {
        let (_, engine, account) = setup();
        let balances = engine.wallet_balances(&account).unwrap();
        assert!(balances.balance.is_zero());
        assert!(balances.available.is_zero());
    }

    #[test]
    fn test_unconfirmed_receive_is_pending() {
        let (store, engine, account) = setup();
        let mut batch = WriteBatch::new();
        batch
            .insert_transfer(NewTransferRecord::receive(&account, btc("1"), "deposit"))
            .insert_transfer(
                NewTransferRecord::receive(&account, btc("0.5"), "incoming")
                    .external("bc1qaddress")
                    .confirmations(1, 3),
            )
            .insert_transfer(
                NewTransferRecord::send(&account, btc("0.2"), "withdraw")
                    .external("bc1qother")
                    .confirmations(0, 1),
            );
        store.commit(batch).unwrap();

        let balances = engine.wallet_balances(&account).unwrap();
        assert_eq!(balances.total_received, btc("1"));
        assert_eq!(balances.pending, btc("0.5"));
        // unconfirmed sends still count
        assert_eq!(balances.total_sent, btc("0.2"));
        assert_eq!(balances.balance, btc("0.8"));
    }

    #[test]
    fn test_reservations_reduce_available_only() {
        let (store, engine, account) = setup();
        let mut batch = WriteBatch::new();
        batch
            .insert_transfer(NewTransferRecord::receive(&account, btc("1"), "deposit"))
            .push(LedgerWrite::ReserveTrade {
                trade_id: 5,
                account_id: account.id,
                amount: btc("0.3"),
            });
        store.commit(batch).unwrap();

        let balances = engine.wallet_balances(&account).unwrap();
        assert_eq!(balances.balance, btc("1"));
        assert_eq!(balances.reserved_on_trade, btc("0.3"));
        assert_eq!(balances.available, btc("0.7"));

        assert!(balances.ensure_available(account.id, &btc("0.7")).is_ok());
        assert!(matches!(
            balances.ensure_available(account.id, &btc("0.71")),
            Err(LedgerError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_payment_balances_follow_status() {
        let (store, engine, _) = setup();
        let account = store.get_or_create_payment_account(1, &Currency::usd()).unwrap();
        let payment = |entry_type, value: &str, status| NewPaymentTransaction {
            account_id: account.id,
            entry_type,
            amount: usd(value),
            status,
            description: "test".to_string(),
            gateway_ref: None,
        };

        let mut batch = WriteBatch::new();
        batch
            .insert_payment(payment(EntryType::Receive, "100", PaymentStatus::Completed))
            .insert_payment(payment(EntryType::Receive, "50", PaymentStatus::PendingGateway))
            .insert_payment(payment(EntryType::Receive, "70", PaymentStatus::Canceled))
            .insert_payment(payment(EntryType::Send, "30", PaymentStatus::PendingTransfer))
            .insert_payment(payment(EntryType::Send, "20", PaymentStatus::Canceled));
        store.commit(batch).unwrap();

        let balances = engine.payment_balances(&account).unwrap();
        assert_eq!(balances.total_received, usd("100"));
        assert_eq!(balances.total_sent, usd("30"));
        assert_eq!(balances.pending, usd("50"));
        assert_eq!(balances.balance, usd("70"));
        assert_eq!(balances.available, usd("70"));
    }
}
