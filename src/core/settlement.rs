//! Multi-party settlements
//!
//! Peer trades, commerce payments and staking all move value between several
//! accounts at once. Each operation locks the business aggregate first and
//! the paying account second (canonical order), re-checks the payer against
//! a fresh snapshot, then commits every party's entries in one batch.

use crate::core::context::LedgerContext;
use crate::core::lock::LockKey;
use crate::core::traits::{LedgerWrite, WriteBatch};
use crate::core::transfer::ensure_positive;
use crate::types::{
    AccountId, CoinAmount, Currency, FeeModel, LedgerError, MoneyAmount, NewTransferRecord,
    TradeId, TradeReservation, TransferRecord, WalletAccount,
};
use tracing::{debug, info};
use uuid::Uuid;

/// Entries written by one settlement
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    /// Shared by every entry of the settlement
    pub reference: Uuid,
    pub debit: TransferRecord,
    pub credit: TransferRecord,
    /// Operator's fee entry, when a fee was collected
    pub fee: Option<TransferRecord>,
}

impl Settlement {
    fn from_entries(reference: Uuid, entries: Vec<TransferRecord>) -> Result<Self, LedgerError> {
        let mut entries = entries.into_iter();
        let missing = || LedgerError::not_found("transfer_record", reference);

        Ok(Settlement {
            reference,
            debit: entries.next().ok_or_else(missing)?,
            credit: entries.next().ok_or_else(missing)?,
            fee: entries.next(),
        })
    }
}

/// Payment from a customer to a merchant
#[derive(Debug, Clone)]
pub struct CommercePayment {
    pub transaction_id: u64,
    pub payer: AccountId,
    pub merchant: AccountId,
    pub amount: CoinAmount,
    pub fee: FeeModel,
}

/// Principal moved into a stake
#[derive(Debug, Clone)]
pub struct StakeRequest {
    pub stake_id: u64,
    pub account: AccountId,
    pub amount: CoinAmount,
}

/// Payout of a matured stake
#[derive(Debug, Clone)]
pub struct StakeRedemption {
    pub stake_id: u64,
    pub account: AccountId,
    pub principal: CoinAmount,
    pub interest: CoinAmount,
}

#[derive(Clone)]
pub struct SettlementDesk {
    ctx: LedgerContext,
}

impl SettlementDesk {
    pub fn new(ctx: LedgerContext) -> Self {
        SettlementDesk { ctx }
    }

    /// Hold `amount` of the seller's balance for a pending trade
    pub fn reserve_trade(
        &self,
        trade: TradeId,
        seller: &WalletAccount,
        amount: &CoinAmount,
    ) -> Result<TradeReservation, LedgerError> {
        let ctx = &self.ctx;
        let result = ctx.locks.acquire_lock(ctx.store(), &LockKey::trade(trade), |_| {
            ctx.locks.acquire_lock(ctx.store(), seller, |seller| {
                ensure_positive(amount)?;
                if ctx.store.trade_reservation(trade).is_some() {
                    return Err(LedgerError::invalid_transition(
                        "trade", trade, "reserved", "reserved",
                    ));
                }

                ctx.balances
                    .wallet_balances(&seller)?
                    .ensure_available(seller.id, amount)?;

                let mut batch = WriteBatch::new();
                batch.push(LedgerWrite::ReserveTrade {
                    trade_id: trade,
                    account_id: seller.id,
                    amount: amount.clone(),
                });
                ctx.store.commit(batch)?;

                info!(trade, seller = seller.id, amount = %amount, "Trade reserved");
                ctx.store
                    .trade_reservation(trade)
                    .ok_or_else(|| LedgerError::not_found("trade_reservation", trade))
            })
        });

        ctx.observe("reserve_trade", result)
    }

    /// Fiat price of `amount` for a trade's buyer
    ///
    /// Uses the oracle's unit price with the configured `price_margin` on
    /// top, rounded to the currency's precision.
    pub fn quote_trade(
        &self,
        amount: &CoinAmount,
        currency: &Currency,
    ) -> Result<MoneyAmount, LedgerError> {
        let ctx = &self.ctx;
        ensure_positive(amount)?;

        let unit_price = ctx.oracle.unit_price(amount.unit(), currency)?;
        let quoted = ctx.config.quote_price(unit_price);
        let price = amount.to_money(quoted, currency.clone())?;

        debug!(amount = %amount, unit_price, quoted, price = %price, "Trade quoted");
        Ok(price)
    }

    /// Drop a trade's reservation (cancel or expiry); safe to repeat
    ///
    /// Does not wait for the trade lock: while the trade is being reserved
    /// or settled this fails with `ResourceBusy` and the caller retries
    /// later.
    pub fn release_trade(&self, trade: TradeId) -> Result<Option<TradeReservation>, LedgerError> {
        let ctx = &self.ctx;
        let result = ctx.locks.acquire_lock_or_throw(ctx.store(), &LockKey::trade(trade), |_| {
            let reservation = ctx.store.trade_reservation(trade);
            if reservation.is_some() {
                let mut batch = WriteBatch::new();
                batch.push(LedgerWrite::ReleaseTrade(trade));
                ctx.store.commit(batch)?;
                info!(trade, "Trade reservation released");
            }
            Ok(reservation)
        });

        ctx.observe("release_trade", result)
    }

    /// Complete a reserved trade
    ///
    /// The seller pays the reserved amount, the buyer receives it net of the
    /// fee, the wallet's operator receives the fee and the reservation is
    /// released, all in one commit. Without an operator account no fee is
    /// taken.
    pub fn settle_trade(
        &self,
        trade: TradeId,
        buyer: &WalletAccount,
        fee: &FeeModel,
    ) -> Result<Settlement, LedgerError> {
        let ctx = &self.ctx;
        let result = ctx.locks.acquire_lock(ctx.store(), &LockKey::trade(trade), |_| {
            let reservation = ctx
                .store
                .trade_reservation(trade)
                .ok_or_else(|| LedgerError::not_found("trade_reservation", trade))?;
            let seller = ctx.store.wallet_account(reservation.account_id)?;

            ctx.locks.acquire_lock(ctx.store(), &seller, |seller| {
                let buyer = ctx.store.wallet_account(buyer.id)?;
                check_counterparty(&seller, &buyer)?;

                // The reservation being settled is released in the same commit
                let amount = &reservation.amount;
                let balances = ctx.balances.wallet_balances(&seller)?;
                let spendable = balances.available.add(amount)?;
                if spendable.less_than(amount)? {
                    return Err(LedgerError::insufficient_funds(
                        seller.id,
                        spendable.value(),
                        amount.value(),
                    ));
                }

                let (reference, mut batch) = self.transfer_batch(
                    &seller,
                    &buyer,
                    amount,
                    fee,
                    &format!("trade {}", trade),
                )?;
                batch.push(LedgerWrite::ReleaseTrade(trade));

                let receipt = ctx.store.commit(batch)?;
                info!(trade, seller = seller.id, buyer = buyer.id, amount = %amount, "Trade settled");
                Settlement::from_entries(reference, receipt.inserted_transfers)
            })
        });

        ctx.observe("settle_trade", result)
    }

    /// Settle a commerce payment: payer pays, merchant receives net of fee
    pub fn settle_commerce(&self, payment: &CommercePayment) -> Result<Settlement, LedgerError> {
        let ctx = &self.ctx;
        let payer = ctx.store.wallet_account(payment.payer)?;
        let key = LockKey::commerce(payment.transaction_id);

        let result = ctx.locks.acquire_lock(ctx.store(), &key, |_| {
            ctx.locks.acquire_lock(ctx.store(), &payer, |payer| {
                let merchant = ctx.store.wallet_account(payment.merchant)?;
                check_counterparty(&payer, &merchant)?;
                ensure_positive(&payment.amount)?;

                ctx.balances
                    .wallet_balances(&payer)?
                    .ensure_available(payer.id, &payment.amount)?;

                let (reference, batch) = self.transfer_batch(
                    &payer,
                    &merchant,
                    &payment.amount,
                    &payment.fee,
                    &format!("commerce transaction {}", payment.transaction_id),
                )?;
                let receipt = ctx.store.commit(batch)?;

                info!(
                    transaction = payment.transaction_id,
                    payer = payer.id,
                    merchant = merchant.id,
                    amount = %payment.amount,
                    "Commerce payment settled"
                );
                Settlement::from_entries(reference, receipt.inserted_transfers)
            })
        });

        ctx.observe("settle_commerce", result)
    }

    /// Move stake principal from the user to the operator account
    pub fn subscribe_stake(&self, request: &StakeRequest) -> Result<Settlement, LedgerError> {
        let ctx = &self.ctx;
        let account = ctx.store.wallet_account(request.account)?;

        let result = ctx.locks.acquire_lock(ctx.store(), &LockKey::stake(request.stake_id), |_| {
            ctx.locks.acquire_lock(ctx.store(), &account, |account| {
                let operator = self.operator_of(&account)?;
                check_counterparty(&account, &operator)?;
                ensure_positive(&request.amount)?;

                ctx.balances
                    .wallet_balances(&account)?
                    .ensure_available(account.id, &request.amount)?;

                let (reference, batch) = self.transfer_batch(
                    &account,
                    &operator,
                    &request.amount,
                    &FeeModel::None,
                    &format!("stake {}", request.stake_id),
                )?;
                let receipt = ctx.store.commit(batch)?;

                info!(stake = request.stake_id, account = account.id, amount = %request.amount, "Stake subscribed");
                Settlement::from_entries(reference, receipt.inserted_transfers)
            })
        });

        ctx.observe("subscribe_stake", result)
    }

    /// Pay principal plus interest from the operator account back to the user
    pub fn redeem_stake(&self, redemption: &StakeRedemption) -> Result<Settlement, LedgerError> {
        let ctx = &self.ctx;
        let account = ctx.store.wallet_account(redemption.account)?;
        let operator = self.operator_of(&account)?;

        let result = ctx.locks.acquire_lock(ctx.store(), &LockKey::stake(redemption.stake_id), |_| {
            ctx.locks.acquire_lock(ctx.store(), &operator, |operator| {
                check_counterparty(&operator, &account)?;
                ensure_positive(&redemption.principal)?;
                if redemption.interest.is_negative() {
                    return Err(LedgerError::invalid_amount(
                        redemption.interest.get_amount(),
                        "interest cannot be negative",
                    ));
                }
                let payout = redemption.principal.add(&redemption.interest)?;

                ctx.balances
                    .wallet_balances(&operator)?
                    .ensure_available(operator.id, &payout)?;

                let (reference, batch) = self.transfer_batch(
                    &operator,
                    &account,
                    &payout,
                    &FeeModel::None,
                    &format!("stake {} redemption", redemption.stake_id),
                )?;
                let receipt = ctx.store.commit(batch)?;

                info!(stake = redemption.stake_id, account = account.id, payout = %payout, "Stake redeemed");
                Settlement::from_entries(reference, receipt.inserted_transfers)
            })
        });

        ctx.observe("redeem_stake", result)
    }

    fn operator_of(&self, account: &WalletAccount) -> Result<WalletAccount, LedgerError> {
        let wallet = self.ctx.store.wallet(account.wallet_id)?;
        let operator = wallet
            .operator_account
            .ok_or_else(|| LedgerError::invalid_target("wallet has no operator account"))?;
        self.ctx.store.wallet_account(operator)
    }

    /// Payer send, payee receive net of fee, operator fee receive
    fn transfer_batch(
        &self,
        payer: &WalletAccount,
        payee: &WalletAccount,
        amount: &CoinAmount,
        fee_model: &FeeModel,
        subject: &str,
    ) -> Result<(Uuid, WriteBatch), LedgerError> {
        let ctx = &self.ctx;
        let wallet = ctx.store.wallet(payer.wallet_id)?;
        let operator = match wallet.operator_account {
            Some(id) => Some(ctx.store.wallet_account(id)?),
            None => None,
        };

        let fee = match &operator {
            Some(_) => fee_model.compute(amount)?,
            None => CoinAmount::zero(amount.unit().clone()),
        };
        if fee.greater_than(amount)? {
            return Err(LedgerError::invalid_amount(
                amount.get_amount(),
                "amount does not cover the fee",
            ));
        }
        let net = amount.subtract(&fee)?;

        let price = ctx.dollar_price(&payer.coin);
        let reference = Uuid::new_v4();
        let mut batch = WriteBatch::new();
        batch
            .insert_transfer(
                NewTransferRecord::send(payer, amount.clone(), &format!("Paid for {}", subject))
                    .dollar_price(price)
                    .reference(reference),
            )
            .insert_transfer(
                NewTransferRecord::receive(payee, net, &format!("Received for {}", subject))
                    .dollar_price(price)
                    .reference(reference),
            );

        if let (true, Some(operator)) = (fee.is_positive(), operator) {
            batch.insert_transfer(
                NewTransferRecord::receive(
                    &operator,
                    fee,
                    &format!("Fee for {} from user {}", subject, payer.user_id),
                )
                .dollar_price(price)
                .reference(reference),
            );
        }

        Ok((reference, batch))
    }
}

fn check_counterparty(payer: &WalletAccount, payee: &WalletAccount) -> Result<(), LedgerError> {
    if payer.id == payee.id {
        return Err(LedgerError::invalid_target("payer and payee are the same account"));
    }
    if payer.wallet_id != payee.wallet_id {
        return Err(LedgerError::invalid_target("payer and payee use different wallets"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::core::context::testing::{btc, Fixture};
    use crate::core::store::InMemoryLedgerStore;
    use crate::core::traits::LedgerStore;
    use crate::types::{Coin, Wallet};
    use rstest::rstest;
    use std::sync::Arc;

    #[test]
    fn test_reservation_reduces_available() {
        let fx = Fixture::new();
        let seller = fx.account(1);
        fx.fund(&seller, "1.0");
        let desk = SettlementDesk::new(fx.ctx.clone());

        desk.reserve_trade(10, &seller, &btc("0.6")).unwrap();
        let balances = fx.balances(&seller);
        assert_eq!(balances.balance, btc("1.0"));
        assert_eq!(balances.available, btc("0.4"));

        assert!(matches!(
            desk.reserve_trade(11, &seller, &btc("0.5")),
            Err(LedgerError::InsufficientFunds { .. })
        ));
        assert!(matches!(
            desk.reserve_trade(10, &seller, &btc("0.1")),
            Err(LedgerError::InvalidStateTransition { .. })
        ));
    }

    #[rstest]
    #[case::no_margin(0.0, "15000.00")]
    #[case::two_percent(2.0, "15300.00")]
    fn test_quote_trade_applies_margin(#[case] margin: f64, #[case] expected: &str) {
        let fx = Fixture::new();
        let mut ctx = fx.ctx.clone();
        ctx.config.price_margin = margin;

        let quote = SettlementDesk::new(ctx)
            .quote_trade(&btc("0.5"), &Currency::usd())
            .unwrap();
        assert_eq!(quote.format_value(), expected);
    }

    #[test]
    fn test_release_is_idempotent() {
        let fx = Fixture::new();
        let seller = fx.account(1);
        fx.fund(&seller, "1.0");
        let desk = SettlementDesk::new(fx.ctx.clone());
        desk.reserve_trade(10, &seller, &btc("0.6")).unwrap();

        assert!(desk.release_trade(10).unwrap().is_some());
        assert!(desk.release_trade(10).unwrap().is_none());
        assert_eq!(fx.balances(&seller).available, btc("1.0"));
    }

    #[test]
    fn test_release_fails_fast_while_trade_is_locked() {
        let fx = Fixture::new();
        let seller = fx.account(1);
        fx.fund(&seller, "1.0");
        let desk = SettlementDesk::new(fx.ctx.clone());
        desk.reserve_trade(10, &seller, &btc("0.6")).unwrap();

        let held = fx.ctx.locks.lock(LockKey::trade(10)).unwrap();
        let result = std::thread::scope(|s| s.spawn(|| desk.release_trade(10)).join().unwrap());
        assert!(matches!(result, Err(LedgerError::ResourceBusy { .. })));
        assert!(fx.store.trade_reservation(10).is_some());

        drop(held);
        assert!(desk.release_trade(10).unwrap().is_some());
    }

    #[test]
    fn test_settle_trade_pays_all_parties() {
        let fx = Fixture::new();
        let seller = fx.account(1);
        let buyer = fx.account(2);
        fx.fund(&seller, "1.0");
        let desk = SettlementDesk::new(fx.ctx.clone());
        desk.reserve_trade(10, &seller, &btc("0.5")).unwrap();

        let settlement = desk.settle_trade(10, &buyer, &FeeModel::percent(1.0)).unwrap();

        assert_eq!(settlement.debit.value, btc("0.5"));
        assert_eq!(settlement.credit.value, btc("0.495"));
        assert_eq!(settlement.fee.as_ref().map(|f| f.value.clone()), Some(btc("0.005")));
        assert_eq!(settlement.credit.reference, Some(settlement.reference));

        assert_eq!(fx.balances(&seller).available, btc("0.5"));
        assert!(fx.balances(&seller).reserved_on_trade.is_zero());
        assert_eq!(fx.balances(&buyer).balance, btc("0.495"));
        assert_eq!(fx.balances(&fx.operator).balance, btc("0.005"));
        assert!(fx.store.trade_reservation(10).is_none());
    }

    #[test]
    fn test_settle_unknown_trade() {
        let fx = Fixture::new();
        let buyer = fx.account(2);
        let desk = SettlementDesk::new(fx.ctx.clone());

        assert!(matches!(
            desk.settle_trade(99, &buyer, &FeeModel::None),
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_seller_cannot_buy_own_trade() {
        let fx = Fixture::new();
        let seller = fx.account(1);
        fx.fund(&seller, "1.0");
        let desk = SettlementDesk::new(fx.ctx.clone());
        desk.reserve_trade(10, &seller, &btc("0.5")).unwrap();

        assert!(matches!(
            desk.settle_trade(10, &seller, &FeeModel::None),
            Err(LedgerError::InvalidTarget { .. })
        ));
        assert!(fx.store.trade_reservation(10).is_some());
    }

    #[test]
    fn test_commerce_with_fixed_fee() {
        let fx = Fixture::new();
        let payer = fx.account(1);
        let merchant = fx.account(2);
        fx.fund(&payer, "1.0");
        let desk = SettlementDesk::new(fx.ctx.clone());

        let settlement = desk
            .settle_commerce(&CommercePayment {
                transaction_id: 3,
                payer: payer.id,
                merchant: merchant.id,
                amount: btc("0.2"),
                fee: FeeModel::fixed("0.0005".parse().unwrap()),
            })
            .unwrap();

        assert_eq!(settlement.credit.value, btc("0.1995"));
        assert_eq!(fx.balances(&payer).balance, btc("0.8"));
        assert_eq!(fx.balances(&merchant).balance, btc("0.1995"));
        assert_eq!(fx.balances(&fx.operator).balance, btc("0.0005"));
    }

    #[test]
    fn test_commerce_insufficient_funds_writes_nothing() {
        let fx = Fixture::new();
        let payer = fx.account(1);
        let merchant = fx.account(2);
        fx.fund(&payer, "0.1");
        let before = fx.store.transfer_count();

        let result = SettlementDesk::new(fx.ctx.clone()).settle_commerce(&CommercePayment {
            transaction_id: 3,
            payer: payer.id,
            merchant: merchant.id,
            amount: btc("0.2"),
            fee: FeeModel::None,
        });

        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(fx.store.transfer_count(), before);
    }

    #[test]
    fn test_stake_round_trip() {
        let fx = Fixture::new();
        let user = fx.account(1);
        fx.fund(&user, "1.0");
        fx.fund(&fx.operator, "0.5");
        let desk = SettlementDesk::new(fx.ctx.clone());

        desk.subscribe_stake(&StakeRequest {
            stake_id: 1,
            account: user.id,
            amount: btc("0.4"),
        })
        .unwrap();
        assert_eq!(fx.balances(&user).balance, btc("0.6"));
        assert_eq!(fx.balances(&fx.operator).balance, btc("0.9"));

        let settlement = desk
            .redeem_stake(&StakeRedemption {
                stake_id: 1,
                account: user.id,
                principal: btc("0.4"),
                interest: btc("0.02"),
            })
            .unwrap();
        assert_eq!(settlement.credit.value, btc("0.42"));
        assert!(settlement.fee.is_none());
        assert_eq!(fx.balances(&user).balance, btc("1.02"));
        assert_eq!(fx.balances(&fx.operator).balance, btc("0.48"));
    }

    #[test]
    fn test_redeem_requires_operator_funds() {
        let fx = Fixture::new();
        let user = fx.account(1);
        let desk = SettlementDesk::new(fx.ctx.clone());

        let result = desk.redeem_stake(&StakeRedemption {
            stake_id: 1,
            account: user.id,
            principal: btc("0.4"),
            interest: btc("0.02"),
        });
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
    }

    #[test]
    fn test_stake_without_operator() {
        let store = Arc::new(InMemoryLedgerStore::new());
        store.insert_wallet(Wallet::new(1, Coin::bitcoin()));
        let user = store.get_or_create_wallet_account(1, 1).unwrap();
        let desk = SettlementDesk::new(LedgerContext::new(store, LedgerConfig::default()));

        let result = desk.subscribe_stake(&StakeRequest {
            stake_id: 1,
            account: user.id,
            amount: btc("0.1"),
        });
        assert!(matches!(result, Err(LedgerError::InvalidTarget { .. })));
    }
}
