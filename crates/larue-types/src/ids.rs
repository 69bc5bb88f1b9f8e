//! Type-safe identifier wrappers.
//!
//! Users are identified by the chat platform's numeric snowflake. Wrapping
//! it prevents mixing a user id with an amount or a count at compile time.

use serde::{Deserialize, Serialize};

/// Identifier of a player, as assigned by the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// Wrap a raw platform id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Return the inner numeric value.
    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for UserId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<UserId> for u64 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_orders_numerically() {
        let mut ids = vec![UserId(30), UserId(4), UserId(100)];
        ids.sort();
        assert_eq!(ids, vec![UserId(4), UserId(30), UserId(100)]);
    }

    #[test]
    fn user_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&UserId(298_893_605_613_862_912));
        assert_eq!(json.ok().as_deref(), Some("298893605613862912"));
    }
}
