//! Error types shared by the game services.
//!
//! Business-rule denials (cooldown, cap, insufficient funds, nothing to
//! claim) are never errors: services return them as result values. The
//! types here cover caller bugs and persistence failures only.

use larue_ledger::LedgerError;

use crate::store::StoreError;

/// A call that can never succeed as written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Credit and debit amounts must be strictly positive.
    #[error("amount must be positive, got {amount}")]
    NonPositiveAmount {
        /// The rejected amount.
        amount: i64,
    },

    /// The action has no configured quota.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The item is not in the shop catalogue.
    #[error("unknown item: {0}")]
    UnknownItem(String),

    /// The scratch ticket is not in the catalogue.
    #[error("unknown scratch ticket: {0}")]
    UnknownTicket(String),

    /// A quota limit that admits nothing.
    #[error("daily cap must be at least 1 for action {0}")]
    ZeroDailyCap(String),
}

/// Errors returned by the game services.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The caller passed invalid input.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A ledger entry or key could not be built.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The persistence layer failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
