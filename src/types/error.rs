//! Error types for the wallet ledger
//!
//! This module defines every error the ledger core can raise. Lower-level
//! primitives (amounts, locks, records) raise the narrowest variant; the
//! orchestration layer passes them through unchanged so callers can map them
//! to user-facing responses with [`LedgerError::status_code`].
//!
//! # Error Categories
//!
//! - **Input errors**: currency mismatch, invalid amount, invalid target, bounds
//! - **Balance errors**: insufficient funds
//! - **Coordination errors**: resource busy, lock timeout, lock order violation
//! - **Integrity errors**: invalid state transition, immutable property
//! - **External errors**: wallet adapter failures
//! - **Infrastructure errors**: I/O, parsing, configuration

use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the wallet ledger
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Arithmetic or comparison between amounts of different coins/currencies
    ///
    /// Always a programming or input error; never retried.
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch {
        /// Denomination of the left-hand operand
        expected: String,
        /// Denomination of the right-hand operand
        actual: String,
    },

    /// Available balance does not cover the requested debit
    #[error("Insufficient funds on account {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Account being debited
        account: u64,
        /// Available balance in human units
        available: Decimal,
        /// Requested debit in human units
        requested: Decimal,
    },

    /// A non-blocking lock acquisition found the aggregate already locked
    #[error("Resource {key} is busy")]
    ResourceBusy {
        /// Lock key of the aggregate
        key: String,
    },

    /// A blocking lock acquisition gave up after the configured wait
    #[error("Timed out after {waited_ms}ms waiting for lock {key}")]
    LockTimeout {
        /// Lock key of the aggregate
        key: String,
        /// Milliseconds spent waiting
        waited_ms: u64,
    },

    /// Nested acquisition out of the canonical global order
    #[error("Lock order violation: cannot acquire {requested} while holding {held}")]
    LockOrderViolation {
        /// Highest-ordered key currently held by the caller
        held: String,
        /// Key the caller attempted to acquire
        requested: String,
    },

    /// Self-transfer, cross-wallet transfer, or other unusable counterparty
    #[error("Invalid target: {reason}")]
    InvalidTarget {
        /// Why the target was rejected
        reason: String,
    },

    /// Amount is zero, negative, or not representable
    #[error("Invalid amount '{amount}': {reason}")]
    InvalidAmount {
        /// The offending amount as text
        amount: String,
        /// Why the amount was rejected
        reason: String,
    },

    /// Amount falls outside a configured or adapter-provided range
    #[error("Amount {amount} is outside the allowed range [{min}, {max}]")]
    AmountOutOfBounds {
        /// Requested amount in human units
        amount: Decimal,
        /// Lower bound in human units
        min: Decimal,
        /// Upper bound in human units
        max: Decimal,
    },

    /// Illegal transition on a ledger entry (terminal state, confirmation decrease)
    #[error("Invalid state transition on {entity} {id}: {from} -> {to}")]
    InvalidStateTransition {
        /// Kind of entity (e.g. "transfer_record")
        entity: String,
        /// Entity id
        id: u64,
        /// Current state
        from: String,
        /// Requested state
        to: String,
    },

    /// Attempt to change a property that is fixed at creation
    #[error("Cannot change property '{property}' of {entity} {id}")]
    ImmutableProperty {
        /// Kind of entity
        entity: String,
        /// Entity id
        id: u64,
        /// Property name
        property: String,
    },

    /// External wallet/blockchain adapter failure
    #[error("Wallet adapter error{}: {message}", code.as_ref().map(|c| format!(" [{}]", c)).unwrap_or_default())]
    AdapterError {
        /// Provider message
        message: String,
        /// Provider error code (if any)
        code: Option<String>,
        /// Whether the provider attributes the failure to caller input
        client_error: bool,
    },

    /// Checked arithmetic overflowed
    #[error("Arithmetic overflow in {operation}")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
    },

    /// Referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity
        entity: String,
        /// Entity id (rendered)
        id: String,
    },

    /// Invalid configuration value
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the problem
        message: String,
    },

    /// I/O error while reading or writing files
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O error
        message: String,
    },

    /// Malformed input record
    #[error("Parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Parse {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },
}

impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::Io {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        LedgerError::Parse {
            line,
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(error: serde_json::Error) -> Self {
        LedgerError::Configuration {
            message: error.to_string(),
        }
    }
}

impl LedgerError {
    /// Create a CurrencyMismatch error
    pub fn currency_mismatch(expected: &str, actual: &str) -> Self {
        LedgerError::CurrencyMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(account: u64, available: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientFunds {
            account,
            available,
            requested,
        }
    }

    /// Create a ResourceBusy error
    pub fn resource_busy(key: impl ToString) -> Self {
        LedgerError::ResourceBusy {
            key: key.to_string(),
        }
    }

    /// Create an InvalidTarget error
    pub fn invalid_target(reason: &str) -> Self {
        LedgerError::InvalidTarget {
            reason: reason.to_string(),
        }
    }

    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: impl ToString, reason: &str) -> Self {
        LedgerError::InvalidAmount {
            amount: amount.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an InvalidStateTransition error
    pub fn invalid_transition(
        entity: &str,
        id: u64,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        LedgerError::InvalidStateTransition {
            entity: entity.to_string(),
            id,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create an ImmutableProperty error
    pub fn immutable_property(entity: &str, id: u64, property: &str) -> Self {
        LedgerError::ImmutableProperty {
            entity: entity.to_string(),
            id,
            property: property.to_string(),
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str) -> Self {
        LedgerError::ArithmeticOverflow {
            operation: operation.to_string(),
        }
    }

    /// Create a NotFound error
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// Create a Configuration error
    pub fn configuration(message: impl ToString) -> Self {
        LedgerError::Configuration {
            message: message.to_string(),
        }
    }

    /// HTTP-equivalent status for surfacing this error to a caller
    ///
    /// Integrity violations are 500 because they indicate internal
    /// inconsistency; adapter failures are 422 only when the provider blames
    /// the input, otherwise 502.
    pub fn status_code(&self) -> u16 {
        match self {
            LedgerError::CurrencyMismatch { .. }
            | LedgerError::InvalidTarget { .. }
            | LedgerError::InvalidAmount { .. }
            | LedgerError::AmountOutOfBounds { .. }
            | LedgerError::Parse { .. } => 400,
            LedgerError::ResourceBusy { .. } => 403,
            LedgerError::NotFound { .. } => 404,
            LedgerError::LockTimeout { .. } => 409,
            LedgerError::InsufficientFunds { .. } => 422,
            LedgerError::AdapterError {
                client_error: true, ..
            } => 422,
            LedgerError::AdapterError { .. } => 502,
            LedgerError::InvalidStateTransition { .. }
            | LedgerError::ImmutableProperty { .. }
            | LedgerError::LockOrderViolation { .. }
            | LedgerError::ArithmeticOverflow { .. }
            | LedgerError::Configuration { .. }
            | LedgerError::Io { .. } => 500,
        }
    }

    /// Whether the failure should be reported to the caller as their fault
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Message safe to show to an end user
    ///
    /// Adapter messages are only passed through when the provider marks them
    /// as input problems.
    pub fn public_message(&self) -> String {
        match self {
            LedgerError::AdapterError {
                client_error: false,
                ..
            } => "The transaction could not be broadcast, please try again later".to_string(),
            other if other.is_client_error() => other.to_string(),
            _ => "Internal ledger error".to_string(),
        }
    }
}
