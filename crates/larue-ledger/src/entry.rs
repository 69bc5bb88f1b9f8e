//! Validated construction of ledger entries.

use chrono::{DateTime, Utc};

use larue_types::{LedgerEntry, UserId};

use crate::{IdempotencyKey, LedgerError};

// ---------------------------------------------------------------------------
// Entry builder
// ---------------------------------------------------------------------------

/// Builder for [`LedgerEntry`] values.
///
/// Rejects zero deltas and blank reasons. Credits are positive deltas,
/// debits negative ones; there is no separate debit type.
///
/// # Examples
///
/// ```
/// use larue_ledger::{EntryBuilder, IdempotencyKey};
/// use larue_types::UserId;
///
/// let key = IdempotencyKey::for_event("77", "shop", "cup");
/// let entry = key.and_then(|key| {
///     EntryBuilder::new(UserId::new(5), key).delta(-150).reason("shop.cup").build()
/// });
///
/// assert!(entry.is_ok());
/// ```
#[derive(Debug)]
pub struct EntryBuilder {
    user_id: UserId,
    key: IdempotencyKey,
    delta: Option<i64>,
    reason: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

impl EntryBuilder {
    /// Start an entry for `user_id` under `key`.
    pub const fn new(user_id: UserId, key: IdempotencyKey) -> Self {
        Self {
            user_id,
            key,
            delta: None,
            reason: None,
            created_at: None,
        }
    }

    /// Set the signed amount in minor units.
    #[must_use]
    pub const fn delta(mut self, delta: i64) -> Self {
        self.delta = Some(delta);
        self
    }

    /// Set the machine-readable reason.
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Pin the entry timestamp (defaults to now).
    #[must_use]
    pub const fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Validate inputs and produce the entry.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MissingField`] when delta or reason is unset,
    /// [`LedgerError::ZeroDelta`] for a zero amount and
    /// [`LedgerError::EmptyReason`] for a blank reason.
    pub fn build(self) -> Result<LedgerEntry, LedgerError> {
        let delta = self.delta.ok_or(LedgerError::MissingField("delta"))?;
        let reason = self.reason.ok_or(LedgerError::MissingField("reason"))?;

        if delta == 0 {
            return Err(LedgerError::ZeroDelta);
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LedgerError::EmptyReason);
        }

        Ok(LedgerEntry {
            user_id: self.user_id,
            key: self.key.into_inner(),
            delta,
            reason: reason.to_owned(),
            created_at: self.created_at.unwrap_or_else(Utc::now),
        })
    }
}
