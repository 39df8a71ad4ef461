//! Fiat payment ledger
//!
//! Fiat entries move through an explicit status machine:
//! `pending-gateway | pending-transfer -> completed | canceled`. Terminal
//! states never change again. Deposits only count once completed, while a
//! withdrawal counts against the balance from creation until it is canceled.

use crate::core::context::{first_payment, LedgerContext};
use crate::core::traits::{LedgerWrite, WriteBatch};
use crate::external::LedgerEvent;
use crate::types::{
    EntryId, EntryType, LedgerError, MoneyAmount, NewPaymentTransaction, PaymentAccount,
    PaymentStatus, PaymentTransaction,
};
use chrono::Utc;
use tracing::info;

#[derive(Clone)]
pub struct PaymentLedger {
    ctx: LedgerContext,
}

impl PaymentLedger {
    pub fn new(ctx: LedgerContext) -> Self {
        PaymentLedger { ctx }
    }

    /// Open a gateway deposit awaiting confirmation
    pub fn deposit(
        &self,
        account: &PaymentAccount,
        amount: &MoneyAmount,
        gateway_ref: Option<&str>,
    ) -> Result<PaymentTransaction, LedgerError> {
        let ctx = &self.ctx;
        let result = ctx.locks.acquire_lock(ctx.store(), account, |account| {
            ensure_positive(amount)?;
            ctx.config.check_payment_bounds(amount)?;

            let mut batch = WriteBatch::new();
            batch.insert_payment(NewPaymentTransaction {
                account_id: account.id,
                entry_type: EntryType::Receive,
                amount: amount.clone(),
                status: PaymentStatus::PendingGateway,
                description: format!("Deposit of {}", amount),
                gateway_ref: gateway_ref.map(str::to_string),
            });
            let payment = first_payment(&ctx.store.commit(batch)?)?;

            info!(payment = payment.id, account = account.id, amount = %amount, "Deposit opened");
            Ok(payment)
        });

        ctx.observe("payment_deposit", result)
    }

    /// Open a bank withdrawal; the amount is held from this point on
    pub fn withdraw(
        &self,
        account: &PaymentAccount,
        amount: &MoneyAmount,
        bank_ref: Option<&str>,
    ) -> Result<PaymentTransaction, LedgerError> {
        let ctx = &self.ctx;
        let result = ctx.locks.acquire_lock(ctx.store(), account, |account| {
            ensure_positive(amount)?;
            ctx.config.check_payment_bounds(amount)?;
            ctx.balances
                .payment_balances(&account)?
                .ensure_available(account.id, amount)?;

            let mut batch = WriteBatch::new();
            batch.insert_payment(NewPaymentTransaction {
                account_id: account.id,
                entry_type: EntryType::Send,
                amount: amount.clone(),
                status: PaymentStatus::PendingTransfer,
                description: format!("Withdrawal of {}", amount),
                gateway_ref: bank_ref.map(str::to_string),
            });
            let payment = first_payment(&ctx.store.commit(batch)?)?;

            info!(payment = payment.id, account = account.id, amount = %amount, "Withdrawal opened");
            Ok(payment)
        });

        ctx.observe("payment_withdraw", result)
    }

    pub fn complete(&self, id: EntryId) -> Result<PaymentTransaction, LedgerError> {
        self.transition(id, PaymentStatus::Completed)
    }

    pub fn cancel(&self, id: EntryId) -> Result<PaymentTransaction, LedgerError> {
        self.transition(id, PaymentStatus::Canceled)
    }

    fn transition(
        &self,
        id: EntryId,
        status: PaymentStatus,
    ) -> Result<PaymentTransaction, LedgerError> {
        let ctx = &self.ctx;
        let payment = ctx.store.payment_transaction(id)?;
        let account = ctx.store.payment_account(payment.account_id)?;

        let result = ctx.locks.acquire_lock(ctx.store(), &account, |_| {
            let mut batch = WriteBatch::new();
            batch.push(LedgerWrite::TransitionPayment { id, status });
            first_payment(&ctx.store.commit(batch)?)
        });
        let payment = ctx.observe("payment_transition", result)?;

        info!(payment = id, status = %status, at = %Utc::now(), "Payment settled");
        ctx.notify(LedgerEvent::PaymentSettled {
            entry_id: payment.id,
            account_id: payment.account_id,
            amount: payment.amount.clone(),
            status: payment.status,
        });

        Ok(payment)
    }
}

fn ensure_positive(amount: &MoneyAmount) -> Result<(), LedgerError> {
    if !amount.is_positive() {
        return Err(LedgerError::invalid_amount(
            amount.get_amount(),
            "amount must be positive",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::core::context::testing::Fixture;
    use crate::core::traits::LedgerStore;
    use crate::types::Currency;
    use rstest::rstest;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn usd(value: &str) -> MoneyAmount {
        MoneyAmount::from_value(Decimal::from_str(value).unwrap(), Currency::usd()).unwrap()
    }

    fn ledger(fx: &Fixture) -> (PaymentLedger, PaymentAccount) {
        let mut ctx = fx.ctx.clone();
        ctx.config = LedgerConfig {
            min_payment: Some(Decimal::from(10)),
            max_payment: Some(Decimal::from(1_000)),
            ..Default::default()
        };
        let account = fx.store.get_or_create_payment_account(1, &Currency::usd()).unwrap();
        (PaymentLedger::new(ctx), account)
    }

    #[test]
    fn test_deposit_counts_once_completed() {
        let fx = Fixture::new();
        let (payments, account) = ledger(&fx);

        let deposit = payments.deposit(&account, &usd("100"), Some("gw-1")).unwrap();
        assert_eq!(deposit.status, PaymentStatus::PendingGateway);

        let balances = fx.ctx.balances.payment_balances(&account).unwrap();
        assert!(balances.balance.is_zero());
        assert_eq!(balances.pending, usd("100"));

        let completed = payments.complete(deposit.id).unwrap();
        assert!(completed.completed_at.is_some());
        assert_eq!(
            fx.ctx.balances.payment_balances(&account).unwrap().balance,
            usd("100")
        );
        assert_eq!(fx.notifier.events().len(), 1);
    }

    #[test]
    fn test_withdrawal_holds_until_canceled() {
        let fx = Fixture::new();
        let (payments, account) = ledger(&fx);
        let deposit = payments.deposit(&account, &usd("100"), None).unwrap();
        payments.complete(deposit.id).unwrap();

        let withdrawal = payments.withdraw(&account, &usd("60"), Some("iban")).unwrap();
        assert_eq!(withdrawal.status, PaymentStatus::PendingTransfer);
        assert_eq!(
            fx.ctx.balances.payment_balances(&account).unwrap().available,
            usd("40")
        );

        assert!(matches!(
            payments.withdraw(&account, &usd("50"), None),
            Err(LedgerError::InsufficientFunds { .. })
        ));

        let canceled = payments.cancel(withdrawal.id).unwrap();
        assert!(canceled.canceled_at.is_some());
        assert_eq!(
            fx.ctx.balances.payment_balances(&account).unwrap().available,
            usd("100")
        );
    }

    #[rstest]
    #[case::below_min("9.99")]
    #[case::above_max("1000.01")]
    fn test_bounds_are_enforced(#[case] value: &str) {
        let fx = Fixture::new();
        let (payments, account) = ledger(&fx);

        assert!(matches!(
            payments.deposit(&account, &usd(value), None),
            Err(LedgerError::AmountOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_terminal_status_is_final() {
        let fx = Fixture::new();
        let (payments, account) = ledger(&fx);
        let deposit = payments.deposit(&account, &usd("100"), None).unwrap();
        payments.cancel(deposit.id).unwrap();

        assert!(matches!(
            payments.complete(deposit.id),
            Err(LedgerError::InvalidStateTransition { .. })
        ));
        assert_eq!(
            fx.store.payment_transaction(deposit.id).unwrap().status,
            PaymentStatus::Canceled
        );
        // only the successful cancel notified
        assert_eq!(fx.notifier.events().len(), 1);
    }

    #[test]
    fn test_currency_must_match_account() {
        let fx = Fixture::new();
        let (payments, account) = ledger(&fx);
        let euros = MoneyAmount::from_value(Decimal::from(50), Currency::eur()).unwrap();

        assert!(matches!(
            payments.deposit(&account, &euros, None),
            Err(LedgerError::CurrencyMismatch { .. })
        ));
    }
}
