//! In-process [`GameStore`] for service tests, behind the `test-utils`
//! feature outside this crate.
//!
//! A single async mutex serialises every operation, which gives the same
//! atomicity the SQLite adapter gets from `BEGIN IMMEDIATE`. Ledger rules
//! come from [`larue_ledger::Ledger`].

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use larue_ledger::Ledger;
use larue_types::{
    ActionState, ApplyResult, BroadcastRecord, ClaimLogEntry, CredRow, EventStatus,
    LeaderboardRow, LedgerEntry, PackOutcome, PlayerRecord, QuotaDecision, QuotaLimits, RecyclerState,
    ScheduledEvent, UserId,
};

use crate::store::{
    ClaimReceipt, ClaimRequest, GameStore, PurchaseOrder, PurchaseWrite, StoreError,
    total_payout,
};
use crate::{quota, recycler};

#[derive(Debug, Default)]
struct State {
    ledger: Ledger,
    players: BTreeMap<UserId, PlayerRecord>,
    actions: BTreeMap<(UserId, String), ActionState>,
    recycler: BTreeMap<UserId, RecyclerState>,
    claims: BTreeMap<(UserId, NaiveDate), ClaimLogEntry>,
    inventory: BTreeMap<(UserId, String), u32>,
    stats: BTreeMap<(UserId, String), u64>,
    cred: BTreeMap<UserId, u64>,
    respect: BTreeSet<(UserId, UserId, String)>,
    events: BTreeMap<String, ScheduledEvent>,
    broadcasts: BTreeMap<String, BroadcastRecord>,
}

impl State {
    fn apply(&mut self, entry: LedgerEntry) -> ApplyResult {
        let user_id = entry.user_id;
        let delta = entry.delta;
        let result = self.ledger.apply_once(entry);
        if result.applied {
            let player = self
                .players
                .entry(user_id)
                .or_insert_with(|| PlayerRecord::new(user_id));
            player.legacy_money = player.legacy_money.saturating_add(delta);
        }
        result
    }
}

/// A [`GameStore`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn count(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

fn take(limit: u32) -> usize {
    usize::try_from(limit).unwrap_or(usize::MAX)
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn apply_entry(&self, entry: LedgerEntry) -> Result<ApplyResult, StoreError> {
        Ok(self.state.lock().await.apply(entry))
    }

    async fn apply_entries(
        &self,
        entries: Vec<LedgerEntry>,
    ) -> Result<Vec<ApplyResult>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(entries.into_iter().map(|entry| state.apply(entry)).collect())
    }

    async fn balance(&self, user_id: UserId) -> Result<i64, StoreError> {
        Ok(self.state.lock().await.ledger.balance(user_id))
    }

    async fn top_balances(&self, limit: u32) -> Result<Vec<LeaderboardRow>, StoreError> {
        Ok(self.state.lock().await.ledger.top(take(limit)))
    }

    async fn ledger_history(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.state.lock().await;
        let mut entries: Vec<LedgerEntry> =
            state.ledger.entries_for(user_id).into_iter().cloned().collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(take(limit));
        Ok(entries)
    }

    async fn start_player(&self, gift: LedgerEntry) -> Result<Option<ApplyResult>, StoreError> {
        let mut state = self.state.lock().await;
        let user_id = gift.user_id;
        let player = state
            .players
            .entry(user_id)
            .or_insert_with(|| PlayerRecord::new(user_id));
        if player.has_started {
            return Ok(None);
        }
        player.has_started = true;
        Ok(Some(state.apply(gift)))
    }

    async fn player(&self, user_id: UserId) -> Result<Option<PlayerRecord>, StoreError> {
        Ok(self.state.lock().await.players.get(&user_id).copied())
    }

    async fn count_players(&self) -> Result<u64, StoreError> {
        Ok(count(self.state.lock().await.players.len()))
    }

    async fn check_and_consume(
        &self,
        user_id: UserId,
        action: &str,
        limits: QuotaLimits,
        now: i64,
        today: &str,
    ) -> Result<QuotaDecision, StoreError> {
        let mut state = self.state.lock().await;
        let key = (user_id, action.to_owned());
        let (decision, next) = quota::evaluate(state.actions.get(&key), limits, now, today);
        if let Some(next) = next {
            state.actions.insert(key, next);
        }
        Ok(decision)
    }

    async fn action_state(
        &self,
        user_id: UserId,
        action: &str,
    ) -> Result<Option<ActionState>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.actions.get(&(user_id, action.to_owned())).cloned())
    }

    async fn reset_actions(&self, user_id: Option<UserId>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.actions.len();
        state
            .actions
            .retain(|(owner, _), _| user_id.is_some_and(|target| target != *owner));
        Ok(count(before.saturating_sub(state.actions.len())))
    }

    async fn recycler_state(&self, user_id: UserId) -> Result<RecyclerState, StoreError> {
        let state = self.state.lock().await;
        Ok(state.recycler.get(&user_id).cloned().unwrap_or_default())
    }

    async fn add_raw_units(
        &self,
        user_id: UserId,
        units: u32,
    ) -> Result<RecyclerState, StoreError> {
        let mut state = self.state.lock().await;
        let recycler = state.recycler.entry(user_id).or_default();
        recycler.raw_units = recycler.raw_units.saturating_add(units);
        Ok(recycler.clone())
    }

    async fn pack(
        &self,
        user_id: UserId,
        desired: Option<u32>,
        conv_ratio: u32,
    ) -> Result<(PackOutcome, RecyclerState), StoreError> {
        let mut state = self.state.lock().await;
        let recycler = state.recycler.entry(user_id).or_default();
        let outcome = recycler::pack(recycler, desired, conv_ratio);
        Ok((outcome, recycler.clone()))
    }

    async fn claim(&self, request: ClaimRequest) -> Result<ClaimReceipt, StoreError> {
        let mut state = self.state.lock().await;
        let mut recycler = state
            .recycler
            .get(&request.user_id)
            .cloned()
            .unwrap_or_default();
        let days = recycler::claim(
            &mut recycler,
            request.requested_days,
            request.today,
            &request.rules,
        );
        if days.is_empty() {
            return Ok(ClaimReceipt::empty(recycler));
        }

        let entry = request
            .payout_entry(&days)
            .map_err(|err| StoreError::backend("claim", err))?;
        for row in request.log_rows(&days) {
            state.claims.entry((row.user_id, row.day)).or_insert(row);
        }
        state.recycler.insert(request.user_id, recycler.clone());
        let credit = entry.map(|entry| state.apply(entry));

        Ok(ClaimReceipt {
            total_payout: total_payout(&days),
            days,
            state: recycler,
            credit,
        })
    }

    async fn claim_log(&self, user_id: UserId) -> Result<Vec<ClaimLogEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .claims
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn reset_recycler(&self, user_id: Option<UserId>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.recycler.len();
        state
            .recycler
            .retain(|owner, _| user_id.is_some_and(|target| target != *owner));
        Ok(count(before.saturating_sub(state.recycler.len())))
    }

    async fn inventory(&self, user_id: UserId) -> Result<BTreeMap<String, u32>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .inventory
            .iter()
            .filter(|((owner, _), qty)| *owner == user_id && **qty > 0)
            .map(|((_, item), qty)| (item.clone(), *qty))
            .collect())
    }

    async fn stats(&self, user_id: UserId) -> Result<BTreeMap<String, u64>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .stats
            .iter()
            .filter(|((owner, _), _)| *owner == user_id)
            .map(|((_, stat), value)| (stat.clone(), *value))
            .collect())
    }

    async fn increment_stat(
        &self,
        user_id: UserId,
        stat: &str,
        by: u64,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let value = state.stats.entry((user_id, stat.to_owned())).or_insert(0);
        *value = value.saturating_add(by);
        Ok(*value)
    }

    async fn purchase(&self, order: PurchaseOrder) -> Result<PurchaseWrite, StoreError> {
        let mut state = self.state.lock().await;
        let user_id = order.user_id();
        let slot = (user_id, order.item_id.clone());
        let owned = state.inventory.get(&slot).copied().unwrap_or(0);
        let replayed = state.ledger.contains(user_id, &order.debit.key);
        let balance = state.ledger.balance(user_id);
        if let Some(outcome) = order.precheck(replayed, owned, balance) {
            return Ok(outcome);
        }

        let result = state.apply(order.debit);
        let quantity = owned.saturating_add(1);
        state.inventory.insert(slot, quantity);
        Ok(PurchaseWrite::Bought {
            quantity,
            balance: result.balance,
        })
    }

    async fn reset_inventory(&self, user_id: Option<UserId>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.inventory.len();
        state
            .inventory
            .retain(|(owner, _), _| user_id.is_some_and(|target| target != *owner));
        Ok(count(before.saturating_sub(state.inventory.len())))
    }

    async fn reset_stats(&self, user_id: Option<UserId>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.stats.len();
        state
            .stats
            .retain(|(owner, _), _| user_id.is_some_and(|target| target != *owner));
        Ok(count(before.saturating_sub(state.stats.len())))
    }

    async fn give_respect(
        &self,
        from: UserId,
        to: UserId,
        day: &str,
        _at: DateTime<Utc>,
    ) -> Result<Option<u64>, StoreError> {
        let mut state = self.state.lock().await;
        if !state.respect.insert((to, from, day.to_owned())) {
            return Ok(None);
        }
        let cred = state.cred.entry(to).or_insert(0);
        *cred = cred.saturating_add(1);
        Ok(Some(*cred))
    }

    async fn cred(&self, user_id: UserId) -> Result<u64, StoreError> {
        Ok(self.state.lock().await.cred.get(&user_id).copied().unwrap_or(0))
    }

    async fn top_cred(&self, limit: u32) -> Result<Vec<CredRow>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<CredRow> = state
            .cred
            .iter()
            .map(|(user_id, cred)| CredRow {
                user_id: *user_id,
                cred: *cred,
            })
            .collect();
        rows.sort_by(|a, b| b.cred.cmp(&a.cred).then(a.user_id.cmp(&b.user_id)));
        rows.truncate(take(limit));
        Ok(rows)
    }

    async fn upsert_event(&self, event: ScheduledEvent) -> Result<ScheduledEvent, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.events.get_mut(&event.id) {
            existing.kind = event.kind;
            existing.title = event.title;
            existing.starts_at = event.starts_at;
            existing.ends_at = event.ends_at;
            existing.payload = event.payload;
            return Ok(existing.clone());
        }
        state.events.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    async fn event(&self, id: &str) -> Result<Option<ScheduledEvent>, StoreError> {
        Ok(self.state.lock().await.events.get(id).cloned())
    }

    async fn due_events(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ScheduledEvent>, StoreError> {
        let state = self.state.lock().await;
        let mut due: Vec<ScheduledEvent> = state
            .events
            .values()
            .filter(|event| {
                event.status == EventStatus::Scheduled
                    && event.starts_at.timestamp() > 0
                    && event.starts_at <= now
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| a.starts_at.cmp(&b.starts_at));
        due.truncate(take(limit));
        Ok(due)
    }

    async fn recent_events(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ScheduledEvent>, StoreError> {
        let state = self.state.lock().await;
        let mut recent: Vec<ScheduledEvent> = state
            .events
            .values()
            .filter(|event| {
                event.status == EventStatus::Published
                    && event.ends_at.is_none_or(|ends_at| ends_at >= now)
            })
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.starts_at.cmp(&a.starts_at));
        recent.truncate(take(limit));
        Ok(recent)
    }

    async fn mark_published(&self, id: &str, jump_url: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(event) = state.events.get_mut(id) else {
            return Ok(false);
        };
        event.status = EventStatus::Published;
        jump_url.clone_into(&mut event.jump_url);
        Ok(true)
    }

    async fn broadcast(&self, event_key: &str) -> Result<Option<BroadcastRecord>, StoreError> {
        Ok(self.state.lock().await.broadcasts.get(event_key).cloned())
    }

    async fn record_broadcast(&self, record: BroadcastRecord) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if state.broadcasts.contains_key(&record.event_key) {
            return Ok(false);
        }
        state.broadcasts.insert(record.event_key.clone(), record);
        Ok(true)
    }
}
