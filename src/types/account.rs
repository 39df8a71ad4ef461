//! Account-related types for the wallet ledger
//!
//! Accounts hold no balance column. Every figure shown for an account is
//! derived from its ledger entries by the balance engine.

use crate::types::coin::{Coin, Currency};
use crate::types::fee::FeeModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account identifier (wallet accounts and payment accounts share the space)
pub type AccountId = u64;

/// User identifier
pub type UserId = u64;

/// Wallet identifier
pub type WalletId = u64;

/// Platform wallet for one coin
///
/// All user accounts of a coin hang off its wallet; the wallet also carries
/// the fee configuration and the operator account that collects fees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,

    pub coin: Coin,

    /// Identifier of the wallet at the blockchain adapter
    pub resource: String,

    /// Passphrase handed to the adapter when broadcasting
    #[serde(skip_serializing)]
    pub passphrase: String,

    /// Platform-owned account that collects fees and acts as counterparty
    pub operator_account: Option<AccountId>,

    /// Fee charged on external sends
    #[serde(default)]
    pub withdrawal_fee: FeeModel,

    /// Confirmations an incoming transfer needs before it is spendable
    pub required_confirmations: u32,
}

impl Wallet {
    pub fn new(id: WalletId, coin: Coin) -> Self {
        Wallet {
            id,
            resource: format!("wallet-{}", id),
            passphrase: String::new(),
            coin,
            operator_account: None,
            withdrawal_fee: FeeModel::None,
            required_confirmations: 3,
        }
    }

    pub fn with_operator(mut self, account: AccountId) -> Self {
        self.operator_account = Some(account);
        self
    }

    pub fn with_withdrawal_fee(mut self, fee: FeeModel) -> Self {
        self.withdrawal_fee = fee;
        self
    }

    pub fn with_required_confirmations(mut self, confirmations: u32) -> Self {
        self.required_confirmations = confirmations;
        self
    }

    pub fn is_operator(&self, account: AccountId) -> bool {
        self.operator_account == Some(account)
    }
}

/// A user's account on a crypto wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletAccount {
    pub id: AccountId,
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub coin: Coin,
    pub created_at: DateTime<Utc>,
}

/// A user's fiat account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAccount {
    pub id: AccountId,
    pub user_id: UserId,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}
