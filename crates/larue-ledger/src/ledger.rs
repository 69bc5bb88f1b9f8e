//! The in-memory ledger: an append-only map of entries per user.
//!
//! [`Ledger`] is the reference model of the idempotency contract. The
//! persistent adapter enforces the same rules with a uniqueness
//! constraint; this type backs the in-memory store used by service tests.
//!
//! # Design
//!
//! - **Append-only**: entries are never modified or deleted.
//! - **At most once**: a second entry with a known `(user, key)` is ignored.
//! - **Signed integers**: balances are sums of `i64` minor units.

use std::collections::BTreeMap;

use larue_types::{ApplyResult, LeaderboardRow, LedgerEntry, UserId};

// ---------------------------------------------------------------------------
// Leaderboard ordering
// ---------------------------------------------------------------------------

/// Order rows by balance descending, then user id ascending, and keep
/// the first `limit`.
///
/// The secondary key makes equal balances rank the same way on every run.
pub fn rank_leaderboard(mut rows: Vec<LeaderboardRow>, limit: usize) -> Vec<LeaderboardRow> {
    rows.sort_by(|a, b| {
        b.balance
            .cmp(&a.balance)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    rows.truncate(limit);
    rows
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Append-only ledger keyed by `(user, idempotency key)`.
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    entries: BTreeMap<UserId, BTreeMap<String, LedgerEntry>>,
}

impl Ledger {
    /// Create an empty ledger.
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Total number of entries across all users.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Whether no entry was ever applied.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(BTreeMap::is_empty)
    }

    /// Insert `entry` unless its `(user, key)` pair is already present.
    ///
    /// Returns whether it was newly applied and the resulting balance.
    pub fn apply_once(&mut self, entry: LedgerEntry) -> ApplyResult {
        let user_id = entry.user_id;
        let per_user = self.entries.entry(user_id).or_default();
        let applied = if per_user.contains_key(&entry.key) {
            tracing::debug!(user = %user_id, key = %entry.key, "Ledger replay ignored");
            false
        } else {
            per_user.insert(entry.key.clone(), entry);
            true
        };
        ApplyResult {
            applied,
            balance: self.balance(user_id),
        }
    }

    /// Whether `(user, key)` was already applied.
    pub fn contains(&self, user_id: UserId, key: &str) -> bool {
        self.entries
            .get(&user_id)
            .is_some_and(|per_user| per_user.contains_key(key))
    }

    /// Sum of the user's entries; 0 for unknown users.
    pub fn balance(&self, user_id: UserId) -> i64 {
        self.entries.get(&user_id).map_or(0, |per_user| {
            per_user
                .values()
                .fold(0_i64, |acc, entry| acc.saturating_add(entry.delta))
        })
    }

    /// The richest `limit` users.
    pub fn top(&self, limit: usize) -> Vec<LeaderboardRow> {
        let rows = self
            .entries
            .keys()
            .map(|&user_id| LeaderboardRow {
                user_id,
                balance: self.balance(user_id),
            })
            .collect();
        rank_leaderboard(rows, limit)
    }

    /// All entries of one user, ordered by key.
    pub fn entries_for(&self, user_id: UserId) -> Vec<&LedgerEntry> {
        self.entries
            .get(&user_id)
            .map(|per_user| per_user.values().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{EntryBuilder, IdempotencyKey};

    fn entry(user: u64, key: &str, delta: i64) -> LedgerEntry {
        EntryBuilder::new(UserId::new(user), IdempotencyKey::parse(key).unwrap())
            .delta(delta)
            .reason("test")
            .build()
            .unwrap()
    }

    #[test]
    fn unknown_user_has_zero_balance() {
        let ledger = Ledger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.balance(UserId::new(7)), 0);
    }

    #[test]
    fn replay_is_a_no_op() {
        let mut ledger = Ledger::new();
        let first = ledger.apply_once(entry(1, "start:gift", 100));
        let second = ledger.apply_once(entry(1, "start:gift", 100));

        assert!(first.applied);
        assert!(!second.applied);
        assert_eq!(second.balance, 100);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn same_key_for_different_users_is_independent() {
        let mut ledger = Ledger::new();
        ledger.apply_once(entry(1, "start:gift", 100));
        let other = ledger.apply_once(entry(2, "start:gift", 100));
        assert!(other.applied);
        assert_eq!(ledger.balance(UserId::new(2)), 100);
    }

    #[test]
    fn order_of_application_does_not_matter() {
        let deltas = [("a", 40), ("b", -15), ("c", 7), ("d", -2)];

        let mut forward = Ledger::new();
        for (key, delta) in deltas {
            forward.apply_once(entry(3, key, delta));
        }

        let mut backward = Ledger::new();
        for (key, delta) in deltas.iter().rev() {
            backward.apply_once(entry(3, key, *delta));
        }

        assert_eq!(forward.balance(UserId::new(3)), 30);
        assert_eq!(backward.balance(UserId::new(3)), 30);
    }

    #[test]
    fn debit_may_go_negative() {
        let mut ledger = Ledger::new();
        ledger.apply_once(entry(4, "gift", 30));
        let result = ledger.apply_once(entry(4, "shop:123:x", -50));
        assert!(result.applied);
        assert_eq!(result.balance, -20);
    }

    #[test]
    fn top_breaks_ties_by_user_id() {
        let mut ledger = Ledger::new();
        ledger.apply_once(entry(30, "k", 50));
        ledger.apply_once(entry(10, "k", 50));
        ledger.apply_once(entry(20, "k", 80));
        ledger.apply_once(entry(40, "k", 5));

        let top = ledger.top(3);
        let ids: Vec<u64> = top.iter().map(|row| row.user_id.into_inner()).collect();
        assert_eq!(ids, vec![20, 10, 30]);
    }

    #[test]
    fn rank_respects_limit_zero() {
        let rows = vec![LeaderboardRow {
            user_id: UserId::new(1),
            balance: 1,
        }];
        assert!(rank_leaderboard(rows, 0).is_empty());
    }
}
