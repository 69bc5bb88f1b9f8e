//! Idempotency keys.
//!
//! A key names one real-world economic effect. Keys derived from a
//! triggering event have the shape `<event-id>:<action>:<purpose>`, so a
//! command delivered twice maps to the same ledger row.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// Maximum key length in bytes.
pub const MAX_KEY_LEN: usize = 200;

/// Separator between key components.
const SEPARATOR: char = ':';

/// A validated idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Accept a caller-supplied key verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::EmptyKey`] for blank input and
    /// [`LedgerError::KeyTooLong`] past [`MAX_KEY_LEN`].
    pub fn parse(raw: &str) -> Result<Self, LedgerError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LedgerError::EmptyKey);
        }
        if trimmed.len() > MAX_KEY_LEN {
            return Err(LedgerError::KeyTooLong {
                len: trimmed.len(),
                max: MAX_KEY_LEN,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Derive the key for one effect of one triggering event.
    ///
    /// `action` and `purpose` must be non-empty and free of `:`; the event
    /// id only needs to be non-empty.
    ///
    /// ```
    /// use larue_ledger::IdempotencyKey;
    ///
    /// let key = IdempotencyKey::for_event("1187", "scavenge", "loss").ok();
    /// assert_eq!(key.as_ref().map(IdempotencyKey::as_str), Some("1187:scavenge:loss"));
    /// ```
    pub fn for_event(event_id: &str, action: &str, purpose: &str) -> Result<Self, LedgerError> {
        let event_id = event_id.trim();
        if event_id.is_empty() {
            return Err(LedgerError::BadKeyPart {
                part: "event",
                value: event_id.to_owned(),
            });
        }
        check_part("action", action)?;
        check_part("purpose", purpose)?;
        Self::parse(&format!("{event_id}{SEPARATOR}{action}{SEPARATOR}{purpose}"))
    }

    /// Borrow the key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key and return the owned text.
    pub fn into_inner(self) -> String {
        self.0
    }
}

fn check_part(part: &'static str, value: &str) -> Result<(), LedgerError> {
    if value.is_empty() || value.contains(SEPARATOR) || value.chars().any(char::is_whitespace) {
        return Err(LedgerError::BadKeyPart {
            part,
            value: value.to_owned(),
        });
    }
    Ok(())
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}
