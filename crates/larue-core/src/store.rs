//! The storage contract every persistence adapter implements.
//!
//! [`GameStore`] is the only seam between the services and the database.
//! Each method is one atomic unit: operations that read, decide and write
//! (quota consumption, recycler claims, purchases) run the decision inside
//! the adapter's transaction using the pure functions of this crate, so no
//! other writer can interleave between the read and the write.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use larue_ledger::{EntryBuilder, IdempotencyKey, LedgerError};
use larue_types::{
    ActionState, ApplyResult, BroadcastRecord, ClaimDay, ClaimLogEntry, CredRow, LeaderboardRow,
    LedgerEntry, PackOutcome, PlayerRecord, QuotaDecision, QuotaLimits, RecyclerState,
    ScheduledEvent, UserId,
};

use crate::recycler::{RecyclerRules, CLAIM_REASON};

/// Boxed error source carried by [`StoreError::Backend`].
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by a [`GameStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database stayed locked through every retry.
    #[error("{operation}: database busy after {attempts} attempts")]
    Busy {
        /// The store operation that gave up.
        operation: &'static str,
        /// Attempts made, including the first.
        attempts: u32,
    },

    /// The backend failed for a non-transient reason.
    #[error("{operation}: {source}")]
    Backend {
        /// The store operation that failed.
        operation: &'static str,
        /// The underlying failure.
        source: BoxedSource,
    },

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Wrap any backend error with the operation it interrupted.
    pub fn backend(operation: &'static str, source: impl Into<BoxedSource>) -> Self {
        Self::Backend {
            operation,
            source: source.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Request and result values
// ---------------------------------------------------------------------------

/// Inputs of an atomic recycler claim.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    /// The claiming user.
    pub user_id: UserId,
    /// Days the user asked to redeem.
    pub requested_days: u32,
    /// Current logical day.
    pub today: NaiveDate,
    /// Payout curve and limits.
    pub rules: RecyclerRules,
    /// Ledger key of the payout credit.
    pub credit_key: IdempotencyKey,
    /// Instant recorded on the claim log and ledger rows.
    pub at: DateTime<Utc>,
}

impl ClaimRequest {
    /// Audit rows for the paid days.
    pub fn log_rows(&self, days: &[ClaimDay]) -> Vec<ClaimLogEntry> {
        days.iter()
            .map(|paid| ClaimLogEntry {
                user_id: self.user_id,
                day: paid.day,
                packages_used: 1,
                payout: paid.payout,
                created_at: self.at,
            })
            .collect()
    }

    /// The ledger credit for the paid days; `None` when the total is zero.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the entry cannot be built.
    pub fn payout_entry(&self, days: &[ClaimDay]) -> Result<Option<LedgerEntry>, LedgerError> {
        let total = total_payout(days);
        if total == 0 {
            return Ok(None);
        }
        EntryBuilder::new(self.user_id, self.credit_key.clone())
            .delta(total)
            .reason(CLAIM_REASON)
            .at(self.at)
            .build()
            .map(Some)
    }
}

/// Sum of day payouts.
pub fn total_payout(days: &[ClaimDay]) -> i64 {
    days.iter()
        .fold(0_i64, |total, paid| total.saturating_add(paid.payout))
}

/// What an atomic recycler claim did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimReceipt {
    /// Days paid, oldest first. Empty when nothing was claimable.
    pub days: Vec<ClaimDay>,
    /// Sum of the day payouts, in cents.
    pub total_payout: i64,
    /// State after the claim.
    pub state: RecyclerState,
    /// Ledger outcome of the payout credit; `None` when nothing was paid.
    pub credit: Option<ApplyResult>,
}

impl ClaimReceipt {
    /// A claim that redeemed nothing.
    pub const fn empty(state: RecyclerState) -> Self {
        Self {
            days: Vec::new(),
            total_payout: 0,
            state,
            credit: None,
        }
    }

    /// Number of days paid.
    pub fn days_claimed(&self) -> u32 {
        u32::try_from(self.days.len()).unwrap_or(u32::MAX)
    }
}

/// Inputs of an atomic purchase.
#[derive(Debug, Clone)]
pub struct PurchaseOrder {
    /// Item being bought.
    pub item_id: String,
    /// Ownership cap of the item.
    pub max_qty: u32,
    /// The (negative) ledger entry paying for it.
    pub debit: LedgerEntry,
}

impl PurchaseOrder {
    /// The buyer.
    pub const fn user_id(&self) -> UserId {
        self.debit.user_id
    }

    /// Decide everything that happens before the write.
    ///
    /// Returns the final outcome when the purchase must not proceed:
    /// a replayed debit key, the ownership cap, or missing funds.
    pub fn precheck(&self, replayed: bool, owned: u32, balance: i64) -> Option<PurchaseWrite> {
        if replayed {
            return Some(PurchaseWrite::Replayed {
                quantity: owned,
                balance,
            });
        }
        if owned >= self.max_qty {
            return Some(PurchaseWrite::AlreadyOwned { quantity: owned });
        }
        if balance.saturating_add(self.debit.delta) < 0 {
            return Some(PurchaseWrite::InsufficientFunds { balance });
        }
        None
    }
}

/// What an atomic purchase did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseWrite {
    /// Paid and granted.
    Bought {
        /// Copies owned afterwards.
        quantity: u32,
        /// Balance afterwards.
        balance: i64,
    },
    /// The debit key was already applied; nothing changed.
    Replayed {
        /// Copies owned.
        quantity: u32,
        /// Current balance.
        balance: i64,
    },
    /// The ownership cap is reached.
    AlreadyOwned {
        /// Copies owned.
        quantity: u32,
    },
    /// The balance does not cover the price.
    InsufficientFunds {
        /// Current balance.
        balance: i64,
    },
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Persistence contract of the game.
///
/// Implementations must make every method atomic with respect to
/// concurrent callers, including other processes sharing the database.
#[async_trait]
pub trait GameStore: Send + Sync {
    // --- ledger ---

    /// Insert `entry` unless `(user, key)` exists; mirror the delta into
    /// the player's legacy column when newly applied.
    async fn apply_entry(&self, entry: LedgerEntry) -> Result<ApplyResult, StoreError>;

    /// [`apply_entry`](Self::apply_entry) for several entries in one
    /// transaction. Results keep input order.
    async fn apply_entries(&self, entries: Vec<LedgerEntry>)
    -> Result<Vec<ApplyResult>, StoreError>;

    /// Sum of the user's entries; 0 when none.
    async fn balance(&self, user_id: UserId) -> Result<i64, StoreError>;

    /// Richest users, balance descending then user id ascending.
    async fn top_balances(&self, limit: u32) -> Result<Vec<LeaderboardRow>, StoreError>;

    /// Most recent entries of a user, newest first.
    async fn ledger_history(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    // --- players ---

    /// Mark the gift's user as started and apply the gift, atomically.
    /// Returns `None` if the player had already started.
    async fn start_player(&self, gift: LedgerEntry) -> Result<Option<ApplyResult>, StoreError>;

    /// The player's record, if any.
    async fn player(&self, user_id: UserId) -> Result<Option<PlayerRecord>, StoreError>;

    /// Number of known players.
    async fn count_players(&self) -> Result<u64, StoreError>;

    // --- quota ---

    /// Evaluate and, when admitted, record one use of `action`.
    async fn check_and_consume(
        &self,
        user_id: UserId,
        action: &str,
        limits: QuotaLimits,
        now: i64,
        today: &str,
    ) -> Result<QuotaDecision, StoreError>;

    /// Stored throttling state, without mutation.
    async fn action_state(
        &self,
        user_id: UserId,
        action: &str,
    ) -> Result<Option<ActionState>, StoreError>;

    /// Delete throttling state of one user or everyone. Returns rows removed.
    async fn reset_actions(&self, user_id: Option<UserId>) -> Result<u64, StoreError>;

    // --- recycler ---

    /// Recycler state, defaulted for unknown users.
    async fn recycler_state(&self, user_id: UserId) -> Result<RecyclerState, StoreError>;

    /// Add loose units.
    async fn add_raw_units(&self, user_id: UserId, units: u32)
    -> Result<RecyclerState, StoreError>;

    /// Convert raw units into packages.
    async fn pack(
        &self,
        user_id: UserId,
        desired: Option<u32>,
        conv_ratio: u32,
    ) -> Result<(PackOutcome, RecyclerState), StoreError>;

    /// Redeem pending days: state, claim log and payout credit in one
    /// transaction.
    async fn claim(&self, request: ClaimRequest) -> Result<ClaimReceipt, StoreError>;

    /// Claim audit rows of a user, oldest day first.
    async fn claim_log(&self, user_id: UserId) -> Result<Vec<ClaimLogEntry>, StoreError>;

    /// Delete recycler state of one user or everyone. The claim log stays.
    async fn reset_recycler(&self, user_id: Option<UserId>) -> Result<u64, StoreError>;

    // --- inventory and stats ---

    /// Owned items (`item -> quantity`).
    async fn inventory(&self, user_id: UserId) -> Result<BTreeMap<String, u32>, StoreError>;

    /// Usage counters (`stat -> value`).
    async fn stats(&self, user_id: UserId) -> Result<BTreeMap<String, u64>, StoreError>;

    /// Add `by` to a counter and return the new value.
    async fn increment_stat(&self, user_id: UserId, stat: &str, by: u64)
    -> Result<u64, StoreError>;

    /// Debit and grant one copy of an item, atomically.
    async fn purchase(&self, order: PurchaseOrder) -> Result<PurchaseWrite, StoreError>;

    /// Delete owned items of one user or everyone. Returns rows removed.
    async fn reset_inventory(&self, user_id: Option<UserId>) -> Result<u64, StoreError>;

    /// Delete usage counters of one user or everyone. Returns rows removed.
    async fn reset_stats(&self, user_id: Option<UserId>) -> Result<u64, StoreError>;

    // --- respect ---

    /// Log `from`'s respect for `to` on logical day `day` and add one to
    /// `to`'s cred, atomically. Returns the new cred, or `None` when `from`
    /// already respected `to` that day.
    async fn give_respect(
        &self,
        from: UserId,
        to: UserId,
        day: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<u64>, StoreError>;

    /// Respect received by a user; 0 when none.
    async fn cred(&self, user_id: UserId) -> Result<u64, StoreError>;

    /// Most respected users, cred descending then user id ascending.
    async fn top_cred(&self, limit: u32) -> Result<Vec<CredRow>, StoreError>;

    // --- scheduled events ---

    /// Insert an event, or refresh its content keeping its status.
    async fn upsert_event(&self, event: ScheduledEvent) -> Result<ScheduledEvent, StoreError>;

    /// Look up one event.
    async fn event(&self, id: &str) -> Result<Option<ScheduledEvent>, StoreError>;

    /// Scheduled events whose start time has passed, oldest first.
    async fn due_events(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ScheduledEvent>, StoreError>;

    /// Published events still running at `now`, newest first.
    async fn recent_events(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ScheduledEvent>, StoreError>;

    /// Flag an event as published. Returns whether it existed.
    async fn mark_published(&self, id: &str, jump_url: &str) -> Result<bool, StoreError>;

    /// The broadcast record of an event key, if posted.
    async fn broadcast(&self, event_key: &str) -> Result<Option<BroadcastRecord>, StoreError>;

    /// Record a broadcast unless one exists. Returns whether it was new.
    async fn record_broadcast(&self, record: BroadcastRecord) -> Result<bool, StoreError>;
}
