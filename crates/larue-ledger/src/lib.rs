//! Idempotent money ledger for the LaRue economy.
//!
//! Every movement of money is a signed entry keyed by `(user, key)`. An
//! entry is applied at most once: replaying the same key is a silent no-op
//! that still reports the current balance. The balance of a user is the
//! sum of their entries; nothing is ever updated or deleted.
//!
//! # Modules
//!
//! - [`key`] -- [`IdempotencyKey`] derivation from event ids.
//! - [`entry`] -- [`EntryBuilder`] for validated [`LedgerEntry`] values.
//! - [`ledger`] -- The in-memory [`Ledger`] and the leaderboard ordering rule.
//!
//! The ledger knows nothing about "insufficient funds": callers check the
//! balance before debiting.
//!
//! # Usage
//!
//! ```
//! use larue_ledger::{EntryBuilder, IdempotencyKey, Ledger};
//! use larue_types::UserId;
//!
//! let mut ledger = Ledger::new();
//! let user = UserId::new(42);
//! let key = IdempotencyKey::parse("start:gift").ok();
//!
//! if let Some(key) = key {
//!     let entry = EntryBuilder::new(user, key).delta(100).reason("start").build();
//!     if let Ok(entry) = entry {
//!         ledger.apply_once(entry.clone());
//!         ledger.apply_once(entry);
//!     }
//! }
//!
//! assert_eq!(ledger.balance(user), 100);
//! ```
//!
//! [`LedgerEntry`]: larue_types::LedgerEntry

pub mod entry;
pub mod key;
pub mod ledger;

pub use entry::EntryBuilder;
pub use key::IdempotencyKey;
pub use ledger::{rank_leaderboard, Ledger};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while building ledger entries or keys.
///
/// These are caller bugs, rejected before anything touches persistence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// An idempotency key was empty.
    #[error("idempotency key must not be empty")]
    EmptyKey,

    /// An idempotency key exceeded the maximum length.
    #[error("idempotency key is {len} bytes, maximum is {max}")]
    KeyTooLong {
        /// Length of the rejected key.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// A component of a derived key was empty or contained a separator.
    #[error("invalid key part {part}: {value:?}")]
    BadKeyPart {
        /// Which component was rejected (`event`, `action` or `purpose`).
        part: &'static str,
        /// The rejected value.
        value: String,
    },

    /// An entry delta was zero.
    #[error("ledger entry delta must be non-zero")]
    ZeroDelta,

    /// A required field was not set on the builder.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The reason was empty.
    #[error("ledger entry reason must not be empty")]
    EmptyReason,
}
