//! In-process wallet adapter
//!
//! [`OfflineWalletAdapter`] never touches a network. It accepts any
//! well-formed send, hands out uuid transaction ids and quotes a fixed network
//! fee. The replay binary runs against it, and tests use it to simulate
//! provider failures and confirmation progress.

use crate::external::adapter::{AdapterFailure, SendRequest, WalletAdapter, WalletHandle};
use crate::types::{Coin, CoinAmount, ExternalTransaction, Wallet};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use uuid::Uuid;

#[derive(Debug)]
pub struct OfflineWalletAdapter {
    coin: Coin,
    network_fee: Decimal,
    dollar_price: f64,
    minimum: Decimal,
    maximum: Decimal,
    fail_sends: AtomicBool,
    transactions: DashMap<String, ExternalTransaction>,
}

impl OfflineWalletAdapter {
    pub fn new(coin: Coin) -> Self {
        OfflineWalletAdapter {
            coin,
            network_fee: Decimal::ZERO,
            dollar_price: 0.0,
            minimum: Decimal::ZERO,
            maximum: Decimal::MAX,
            fail_sends: AtomicBool::new(false),
            transactions: DashMap::new(),
        }
    }

    /// Network fee quoted for every send, in base units
    pub fn with_network_fee(mut self, base_units: Decimal) -> Self {
        self.network_fee = base_units;
        self
    }

    pub fn with_dollar_price(mut self, price: f64) -> Self {
        self.dollar_price = price;
        self
    }

    /// Transfer limits, in base units
    pub fn with_limits(mut self, minimum: Decimal, maximum: Decimal) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    /// Make every following `send` fail with a provider error
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Move a broadcast transaction forward on the simulated chain
    pub fn advance(&self, id: &str, confirmations: u32) -> Option<ExternalTransaction> {
        self.transactions.get_mut(id).map(|mut tx| {
            tx.confirmations = confirmations;
            tx.clone()
        })
    }

    /// Number of transactions broadcast so far
    pub fn broadcast_count(&self) -> usize {
        self.transactions.len()
    }

    fn amount(&self, base_units: Decimal) -> Result<CoinAmount, AdapterFailure> {
        CoinAmount::from_base(base_units, self.coin.clone())
            .map_err(|e| AdapterFailure::server(e.to_string()))
    }
}

impl WalletAdapter for OfflineWalletAdapter {
    fn coin(&self) -> &Coin {
        &self.coin
    }

    fn create_wallet(&self, label: &str, _passphrase: &str) -> Result<WalletHandle, AdapterFailure> {
        Ok(WalletHandle {
            resource: format!("offline-{}-{}", label, Uuid::new_v4().simple()),
            address: format!("offline:{}", Uuid::new_v4().simple()),
        })
    }

    fn create_address(&self, wallet: &Wallet, _label: Option<&str>) -> Result<String, AdapterFailure> {
        Ok(format!("offline:{}:{}", wallet.resource, Uuid::new_v4().simple()))
    }

    fn send(&self, request: SendRequest<'_>) -> Result<ExternalTransaction, AdapterFailure> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(AdapterFailure::server("offline adapter is rejecting sends"));
        }
        if request.address.trim().is_empty() {
            return Err(AdapterFailure::client("destination address is empty", Some("invalid_address")));
        }

        let id = Uuid::new_v4().to_string();
        let tx = ExternalTransaction {
            id: id.clone(),
            hash: Uuid::new_v4().simple().to_string(),
            wallet_id: request.wallet.id,
            confirmations: 0,
            payload: json!({
                "address": request.address,
                "amount": request.amount.get_amount(),
                "coin": self.coin.identifier,
            }),
        };
        self.transactions.insert(id, tx.clone());

        info!(tx = %tx.id, address = request.address, amount = %request.amount, "Broadcast offline transaction");
        Ok(tx)
    }

    fn get_transaction(&self, _wallet: &Wallet, id: &str) -> Result<ExternalTransaction, AdapterFailure> {
        self.transactions
            .get(id)
            .map(|tx| tx.clone())
            .ok_or_else(|| AdapterFailure::client(format!("unknown transaction {}", id), Some("not_found")))
    }

    fn estimate_transaction_fee(
        &self,
        _amount: &CoinAmount,
        _inputs: u32,
    ) -> Result<CoinAmount, AdapterFailure> {
        self.amount(self.network_fee)
    }

    fn set_transaction_webhook(
        &self,
        _wallet: &Wallet,
        _url: &str,
        _min_confirmations: u32,
    ) -> Result<(), AdapterFailure> {
        Ok(())
    }

    fn dollar_price(&self) -> Result<f64, AdapterFailure> {
        Ok(self.dollar_price)
    }

    fn minimum_transferable(&self) -> CoinAmount {
        CoinAmount::from_base(self.minimum, self.coin.clone())
            .unwrap_or_else(|_| CoinAmount::zero(self.coin.clone()))
    }

    fn maximum_transferable(&self) -> CoinAmount {
        CoinAmount::from_base(self.maximum, self.coin.clone())
            .unwrap_or_else(|_| CoinAmount::zero(self.coin.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> Wallet {
        Wallet::new(1, Coin::bitcoin())
    }

    #[test]
    fn test_send_then_track_confirmations() {
        let adapter = OfflineWalletAdapter::new(Coin::bitcoin());
        let amount = CoinAmount::from_base(5_000, Coin::bitcoin()).unwrap();
        let wallet = wallet();

        let tx = adapter
            .send(SendRequest {
                wallet: &wallet,
                address: "bc1qdest",
                amount: &amount,
            })
            .unwrap();
        assert_eq!(tx.confirmations, 0);
        assert_eq!(tx.payload["amount"], "5000");

        adapter.advance(&tx.id, 2).unwrap();
        assert_eq!(adapter.get_transaction(&wallet, &tx.id).unwrap().confirmations, 2);
    }

    #[test]
    fn test_failing_sends() {
        let adapter = OfflineWalletAdapter::new(Coin::bitcoin());
        let amount = CoinAmount::from_base(5_000, Coin::bitcoin()).unwrap();
        let wallet = wallet();
        adapter.fail_sends(true);

        let failure = adapter
            .send(SendRequest {
                wallet: &wallet,
                address: "bc1qdest",
                amount: &amount,
            })
            .unwrap_err();
        assert!(!failure.client_error);
    }

    #[test]
    fn test_fee_and_limits() {
        let adapter = OfflineWalletAdapter::new(Coin::bitcoin())
            .with_network_fee(Decimal::from(1_000))
            .with_limits(Decimal::from(546), Decimal::from(100_000_000));
        let amount = CoinAmount::zero(Coin::bitcoin());

        assert_eq!(adapter.estimate_transaction_fee(&amount, 1).unwrap().get_amount(), "1000");
        assert_eq!(adapter.minimum_transferable().get_amount(), "546");
        assert_eq!(adapter.maximum_transferable().get_amount(), "100000000");
        assert_eq!(adapter.precision(), 8);
    }
}
