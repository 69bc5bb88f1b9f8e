//! [`GameStore`] over SQLite.
//!
//! Every method is one retried unit of work: a busy database re-runs the
//! whole transaction, never half of it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use larue_core::store::{
    ClaimReceipt, ClaimRequest, GameStore, PurchaseOrder, PurchaseWrite, StoreError,
};
use larue_types::{
    ActionState, ApplyResult, BroadcastRecord, ClaimLogEntry, CredRow, LeaderboardRow,
    LedgerEntry, PackOutcome, PlayerRecord, QuotaDecision, QuotaLimits, RecyclerState,
    ScheduledEvent, UserId,
};

use crate::retry::{Op, RetryPolicy, with_retry};
use crate::{
    event_store, inventory_store, ledger_store, quota_store, recycler_store, respect_store,
};

/// The SQLite-backed [`GameStore`].
///
/// Obtain one from [`SqlitePool::store`](crate::SqlitePool::store).
#[derive(Clone)]
pub struct SqliteStore {
    pool: sqlx::SqlitePool,
    retry: RetryPolicy,
}

impl SqliteStore {
    /// Wrap a pool whose schema is migrated.
    pub const fn new(pool: sqlx::SqlitePool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Context of a batch write: the first entry stands for the batch.
fn entries_op(entries: &[LedgerEntry]) -> Op<'_> {
    entries.first().map_or(Op::new("apply_entries"), |first| {
        Op::new("apply_entries").user(first.user_id).key(&first.key)
    })
}

#[async_trait]
impl GameStore for SqliteStore {
    async fn apply_entry(&self, entry: LedgerEntry) -> Result<ApplyResult, StoreError> {
        let op = Op::new("apply_entry").user(entry.user_id).key(&entry.key);
        with_retry(self.retry, op, || {
            ledger_store::apply(&self.pool, &entry)
        })
        .await
    }

    async fn apply_entries(
        &self,
        entries: Vec<LedgerEntry>,
    ) -> Result<Vec<ApplyResult>, StoreError> {
        with_retry(self.retry, entries_op(&entries), || {
            ledger_store::apply_all(&self.pool, &entries)
        })
        .await
    }

    async fn balance(&self, user_id: UserId) -> Result<i64, StoreError> {
        let op = Op::new("balance").user(user_id);
        with_retry(self.retry, op, || {
            ledger_store::balance(&self.pool, user_id)
        })
        .await
    }

    async fn top_balances(&self, limit: u32) -> Result<Vec<LeaderboardRow>, StoreError> {
        with_retry(self.retry, Op::new("top_balances"), || {
            ledger_store::top(&self.pool, limit)
        })
        .await
    }

    async fn ledger_history(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let op = Op::new("ledger_history").user(user_id);
        with_retry(self.retry, op, || {
            ledger_store::history(&self.pool, user_id, limit)
        })
        .await
    }

    async fn start_player(&self, gift: LedgerEntry) -> Result<Option<ApplyResult>, StoreError> {
        let op = Op::new("start_player").user(gift.user_id).key(&gift.key);
        with_retry(self.retry, op, || {
            ledger_store::start_player(&self.pool, &gift)
        })
        .await
    }

    async fn player(&self, user_id: UserId) -> Result<Option<PlayerRecord>, StoreError> {
        let op = Op::new("player").user(user_id);
        with_retry(self.retry, op, || {
            ledger_store::player(&self.pool, user_id)
        })
        .await
    }

    async fn count_players(&self) -> Result<u64, StoreError> {
        with_retry(self.retry, Op::new("count_players"), || {
            ledger_store::count_players(&self.pool)
        })
        .await
    }

    async fn check_and_consume(
        &self,
        user_id: UserId,
        action: &str,
        limits: QuotaLimits,
        now: i64,
        today: &str,
    ) -> Result<QuotaDecision, StoreError> {
        let op = Op::new("check_and_consume").user(user_id).action(action);
        with_retry(self.retry, op, || {
            quota_store::check_and_consume(&self.pool, user_id, action, limits, now, today)
        })
        .await
    }

    async fn action_state(
        &self,
        user_id: UserId,
        action: &str,
    ) -> Result<Option<ActionState>, StoreError> {
        let op = Op::new("action_state").user(user_id).action(action);
        with_retry(self.retry, op, || {
            quota_store::state(&self.pool, user_id, action)
        })
        .await
    }

    async fn reset_actions(&self, user_id: Option<UserId>) -> Result<u64, StoreError> {
        let op = Op::new("reset_actions").users(user_id);
        with_retry(self.retry, op, || {
            quota_store::reset(&self.pool, user_id)
        })
        .await
    }

    async fn recycler_state(&self, user_id: UserId) -> Result<RecyclerState, StoreError> {
        let op = Op::new("recycler_state").user(user_id);
        with_retry(self.retry, op, || {
            recycler_store::load(&self.pool, user_id)
        })
        .await
    }

    async fn add_raw_units(
        &self,
        user_id: UserId,
        units: u32,
    ) -> Result<RecyclerState, StoreError> {
        let op = Op::new("add_raw_units").user(user_id);
        with_retry(self.retry, op, || {
            recycler_store::add_raw_units(&self.pool, user_id, units)
        })
        .await
    }

    async fn pack(
        &self,
        user_id: UserId,
        desired: Option<u32>,
        conv_ratio: u32,
    ) -> Result<(PackOutcome, RecyclerState), StoreError> {
        let op = Op::new("pack").user(user_id);
        with_retry(self.retry, op, || {
            recycler_store::pack(&self.pool, user_id, desired, conv_ratio)
        })
        .await
    }

    async fn claim(&self, request: ClaimRequest) -> Result<ClaimReceipt, StoreError> {
        let op = Op::new("claim").user(request.user_id).key(request.credit_key.as_str());
        with_retry(self.retry, op, || {
            recycler_store::claim(&self.pool, &request)
        })
        .await
    }

    async fn claim_log(&self, user_id: UserId) -> Result<Vec<ClaimLogEntry>, StoreError> {
        let op = Op::new("claim_log").user(user_id);
        with_retry(self.retry, op, || {
            recycler_store::claim_log(&self.pool, user_id)
        })
        .await
    }

    async fn reset_recycler(&self, user_id: Option<UserId>) -> Result<u64, StoreError> {
        let op = Op::new("reset_recycler").users(user_id);
        with_retry(self.retry, op, || {
            recycler_store::reset(&self.pool, user_id)
        })
        .await
    }

    async fn inventory(&self, user_id: UserId) -> Result<BTreeMap<String, u32>, StoreError> {
        let op = Op::new("inventory").user(user_id);
        with_retry(self.retry, op, || {
            inventory_store::inventory(&self.pool, user_id)
        })
        .await
    }

    async fn stats(&self, user_id: UserId) -> Result<BTreeMap<String, u64>, StoreError> {
        let op = Op::new("stats").user(user_id);
        with_retry(self.retry, op, || {
            inventory_store::stats(&self.pool, user_id)
        })
        .await
    }

    async fn increment_stat(
        &self,
        user_id: UserId,
        stat: &str,
        by: u64,
    ) -> Result<u64, StoreError> {
        let op = Op::new("increment_stat").user(user_id).action(stat);
        with_retry(self.retry, op, || {
            inventory_store::increment_stat(&self.pool, user_id, stat, by)
        })
        .await
    }

    async fn purchase(&self, order: PurchaseOrder) -> Result<PurchaseWrite, StoreError> {
        let op = Op::new("purchase").user(order.user_id()).key(&order.debit.key);
        with_retry(self.retry, op, || {
            inventory_store::purchase(&self.pool, &order)
        })
        .await
    }

    async fn reset_inventory(&self, user_id: Option<UserId>) -> Result<u64, StoreError> {
        let op = Op::new("reset_inventory").users(user_id);
        with_retry(self.retry, op, || {
            inventory_store::reset_inventory(&self.pool, user_id)
        })
        .await
    }

    async fn reset_stats(&self, user_id: Option<UserId>) -> Result<u64, StoreError> {
        let op = Op::new("reset_stats").users(user_id);
        with_retry(self.retry, op, || {
            inventory_store::reset_stats(&self.pool, user_id)
        })
        .await
    }

    async fn give_respect(
        &self,
        from: UserId,
        to: UserId,
        day: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<u64>, StoreError> {
        let op = Op::new("give_respect").user(to).key(day);
        with_retry(self.retry, op, || {
            respect_store::give(&self.pool, from, to, day, at)
        })
        .await
    }

    async fn cred(&self, user_id: UserId) -> Result<u64, StoreError> {
        let op = Op::new("cred").user(user_id);
        with_retry(self.retry, op, || {
            respect_store::cred(&self.pool, user_id)
        })
        .await
    }

    async fn top_cred(&self, limit: u32) -> Result<Vec<CredRow>, StoreError> {
        with_retry(self.retry, Op::new("top_cred"), || {
            respect_store::top(&self.pool, limit)
        })
        .await
    }

    async fn upsert_event(&self, event: ScheduledEvent) -> Result<ScheduledEvent, StoreError> {
        let op = Op::new("upsert_event").key(&event.id);
        with_retry(self.retry, op, || {
            event_store::upsert(&self.pool, &event)
        })
        .await
    }

    async fn event(&self, id: &str) -> Result<Option<ScheduledEvent>, StoreError> {
        let op = Op::new("event").key(id);
        with_retry(self.retry, op, || event_store::get(&self.pool, id)).await
    }

    async fn due_events(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ScheduledEvent>, StoreError> {
        with_retry(self.retry, Op::new("due_events"), || {
            event_store::due(&self.pool, now, limit)
        })
        .await
    }

    async fn recent_events(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ScheduledEvent>, StoreError> {
        with_retry(self.retry, Op::new("recent_events"), || {
            event_store::recent(&self.pool, now, limit)
        })
        .await
    }

    async fn mark_published(&self, id: &str, jump_url: &str) -> Result<bool, StoreError> {
        let op = Op::new("mark_published").key(id);
        with_retry(self.retry, op, || {
            event_store::mark_published(&self.pool, id, jump_url)
        })
        .await
    }

    async fn broadcast(&self, event_key: &str) -> Result<Option<BroadcastRecord>, StoreError> {
        let op = Op::new("broadcast").key(event_key);
        with_retry(self.retry, op, || {
            event_store::broadcast(&self.pool, event_key)
        })
        .await
    }

    async fn record_broadcast(&self, record: BroadcastRecord) -> Result<bool, StoreError> {
        let op = Op::new("record_broadcast").key(&record.event_key);
        with_retry(self.retry, op, || {
            event_store::record_broadcast(&self.pool, &record)
        })
        .await
    }
}
