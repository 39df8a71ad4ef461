//! Blockchain wallet adapter seam
//!
//! The ledger never talks to a blockchain directly. Everything it needs from a
//! custody provider goes through [`WalletAdapter`]; one adapter is registered
//! per coin in an [`AdapterRegistry`].

use crate::types::{Coin, CoinAmount, ExternalTransaction, LedgerError, Wallet};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Failure reported by a wallet adapter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct AdapterFailure {
    pub message: String,

    /// Provider error code, when the provider sends one
    pub code: Option<String>,

    /// The provider blames the request (bad address, amount below dust, ...)
    pub client_error: bool,
}

impl AdapterFailure {
    /// Failure caused by the request itself
    pub fn client(message: impl ToString, code: Option<&str>) -> Self {
        AdapterFailure {
            message: message.to_string(),
            code: code.map(str::to_string),
            client_error: true,
        }
    }

    /// Failure on the provider side
    pub fn server(message: impl ToString) -> Self {
        AdapterFailure {
            message: message.to_string(),
            code: None,
            client_error: false,
        }
    }
}

impl From<AdapterFailure> for LedgerError {
    fn from(failure: AdapterFailure) -> Self {
        LedgerError::AdapterError {
            message: failure.message,
            code: failure.code,
            client_error: failure.client_error,
        }
    }
}

/// Wallet created at the provider
#[derive(Debug, Clone, PartialEq)]
pub struct WalletHandle {
    /// Provider-side wallet id, stored as `Wallet::resource`
    pub resource: String,
    /// First receiving address
    pub address: String,
}

/// Outgoing blockchain transfer
#[derive(Debug, Clone)]
pub struct SendRequest<'a> {
    pub wallet: &'a Wallet,
    pub address: &'a str,
    pub amount: &'a CoinAmount,
}

/// Custody provider for one coin
pub trait WalletAdapter: Send + Sync {
    fn coin(&self) -> &Coin;

    fn create_wallet(&self, label: &str, passphrase: &str) -> Result<WalletHandle, AdapterFailure>;

    fn create_address(&self, wallet: &Wallet, label: Option<&str>) -> Result<String, AdapterFailure>;

    /// Broadcast a transfer, returning the provider's transaction record
    fn send(&self, request: SendRequest<'_>) -> Result<ExternalTransaction, AdapterFailure>;

    fn get_transaction(&self, wallet: &Wallet, id: &str) -> Result<ExternalTransaction, AdapterFailure>;

    /// Network fee for sending `amount` using `inputs` inputs
    fn estimate_transaction_fee(
        &self,
        amount: &CoinAmount,
        inputs: u32,
    ) -> Result<CoinAmount, AdapterFailure>;

    /// Ask the provider to call `url` on transaction updates
    fn set_transaction_webhook(
        &self,
        wallet: &Wallet,
        url: &str,
        min_confirmations: u32,
    ) -> Result<(), AdapterFailure>;

    fn dollar_price(&self) -> Result<f64, AdapterFailure>;

    fn minimum_transferable(&self) -> CoinAmount;

    fn maximum_transferable(&self) -> CoinAmount;

    fn precision(&self) -> u32 {
        self.coin().precision
    }

    fn base_unit(&self) -> u64 {
        self.coin().base_unit
    }
}

/// Adapters keyed by coin identifier
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn WalletAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one for the same coin
    pub fn register(&mut self, adapter: Arc<dyn WalletAdapter>) -> &mut Self {
        self.adapters
            .insert(adapter.coin().identifier.clone(), adapter);
        self
    }

    pub fn get(&self, coin: &Coin) -> Result<Arc<dyn WalletAdapter>, LedgerError> {
        self.adapters
            .get(&coin.identifier)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("wallet_adapter", &coin.identifier))
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut coins: Vec<_> = self.adapters.keys().collect();
        coins.sort();
        f.debug_struct("AdapterRegistry").field("coins", &coins).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::offline::OfflineWalletAdapter;

    #[test]
    fn test_failure_converts_to_adapter_error() {
        let error: LedgerError = AdapterFailure::client("invalid address", Some("E42")).into();

        assert_eq!(error.status_code(), 422);
        match error {
            LedgerError::AdapterError {
                message,
                code,
                client_error,
            } => {
                assert_eq!(message, "invalid address");
                assert_eq!(code.as_deref(), Some("E42"));
                assert!(client_error);
            }
            other => panic!("expected AdapterError, got {:?}", other),
        }
    }

    #[test]
    fn test_registry_lookup_by_coin() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(OfflineWalletAdapter::new(Coin::bitcoin())));

        assert!(registry.get(&Coin::bitcoin()).is_ok());
        assert!(matches!(
            registry.get(&Coin::ether()),
            Err(LedgerError::NotFound { .. })
        ));
    }
}
