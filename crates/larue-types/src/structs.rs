//! Persisted records and service result values.
//!
//! Amounts are always signed integers in minor units (cents). Timestamps
//! used for cooldown arithmetic are Unix seconds; audit timestamps are
//! [`DateTime<Utc>`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{EventStatus, QuotaDenial};
use crate::ids::UserId;

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// One immutable row of the money ledger.
///
/// The pair `(user_id, key)` is unique: an entry is applied at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Owner of the entry.
    pub user_id: UserId,
    /// Idempotency key, unique per user.
    pub key: String,
    /// Signed amount in minor units (negative for debits).
    pub delta: i64,
    /// Short machine-readable reason (e.g. `"beg"`, `"shop.cup"`).
    pub reason: String,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

/// Outcome of an idempotent ledger application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    /// `true` when the entry was newly inserted, `false` on a replay.
    pub applied: bool,
    /// The user's balance after the call, whether or not it applied.
    pub balance: i64,
}

/// A single leaderboard position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    /// The ranked user.
    pub user_id: UserId,
    /// Ledger balance in minor units.
    pub balance: i64,
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// Per-user profile flags.
///
/// `legacy_money` mirrors the ledger for old readers only; the ledger is
/// the source of truth for balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// The player.
    pub user_id: UserId,
    /// Whether the player ran the start command.
    pub has_started: bool,
    /// Informational copy of the balance, updated alongside ledger writes.
    pub legacy_money: i64,
}

impl PlayerRecord {
    /// A record for a user never seen before.
    pub const fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            has_started: false,
            legacy_money: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Respect
// ---------------------------------------------------------------------------

/// A street-cred leaderboard position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredRow {
    /// The ranked user.
    pub user_id: UserId,
    /// Respect received, all time.
    pub cred: u64,
}

// ---------------------------------------------------------------------------
// Quota
// ---------------------------------------------------------------------------

/// Stored throttling state for one `(user, action)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionState {
    /// Unix seconds of the last admitted use (0 if never used).
    pub last_used_at: i64,
    /// Logical day (`YYYY-MM-DD`) the counter belongs to; empty if never used.
    pub day_key: String,
    /// Admitted uses during `day_key`.
    pub count_today: u32,
}

/// Limits applied to one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    /// Minimum seconds between two admitted uses.
    pub cooldown_seconds: u64,
    /// Maximum admitted uses per logical day.
    pub daily_cap: u32,
}

/// Result of a check-and-consume call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDecision {
    /// Whether the action may proceed (a slot was consumed).
    pub admitted: bool,
    /// Seconds until the cooldown expires; 0 unless cooling down.
    pub wait_seconds: u64,
    /// Uses left today after this call.
    pub remaining_today: u32,
    /// Reason for a denial; `None` when admitted.
    pub denial: Option<QuotaDenial>,
}

impl QuotaDecision {
    /// An admitted call leaving `remaining_today` uses.
    pub const fn admit(remaining_today: u32) -> Self {
        Self {
            admitted: true,
            wait_seconds: 0,
            remaining_today,
            denial: None,
        }
    }

    /// A denial because the cooldown is still running.
    pub const fn cooling_down(wait_seconds: u64, remaining_today: u32) -> Self {
        Self {
            admitted: false,
            wait_seconds,
            remaining_today,
            denial: Some(QuotaDenial::CoolingDown),
        }
    }

    /// A denial because the daily cap is exhausted.
    pub const fn cap_reached() -> Self {
        Self {
            admitted: false,
            wait_seconds: 0,
            remaining_today: 0,
            denial: Some(QuotaDenial::DailyCapReached),
        }
    }
}

// ---------------------------------------------------------------------------
// Recycler
// ---------------------------------------------------------------------------

/// Per-user recycler progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecyclerState {
    /// Recycler level; selects the base value of a package.
    pub level: u32,
    /// Loose units waiting to be packed.
    pub raw_units: u32,
    /// Packed units ready to be claimed (one per claimed day).
    pub packaged_units: u32,
    /// Consecutive claimed logical days, capped by configuration.
    pub streak_days: u32,
    /// Logical day of the last claim; `None` before the first claim.
    pub last_claim_day: Option<NaiveDate>,
}

impl Default for RecyclerState {
    fn default() -> Self {
        Self {
            level: 1,
            raw_units: 0,
            packaged_units: 0,
            streak_days: 0,
            last_claim_day: None,
        }
    }
}

/// Result of converting raw units into packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackOutcome {
    /// Packages created.
    pub packages_made: u32,
    /// Raw units consumed to create them.
    pub raw_consumed: u32,
}

/// One simulated day paid out by a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimDay {
    /// The logical day being paid.
    pub day: NaiveDate,
    /// Payout for that day in minor units.
    pub payout: i64,
}

/// Append-only audit row, unique per `(user_id, day)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimLogEntry {
    /// The claiming user.
    pub user_id: UserId,
    /// The logical day that was paid.
    pub day: NaiveDate,
    /// Packages consumed for that day.
    pub packages_used: u32,
    /// Payout in minor units.
    pub payout: i64,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Scheduled events
// ---------------------------------------------------------------------------

/// An event the broadcast ticker posts once its start time has passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    /// Business key (e.g. `hourly:2026101708`).
    pub id: String,
    /// Event family (e.g. `hourly_tick`).
    pub kind: String,
    /// Human-readable title.
    pub title: String,
    /// When the event becomes due.
    pub starts_at: DateTime<Utc>,
    /// Optional end of the event window.
    pub ends_at: Option<DateTime<Utc>>,
    /// Free-form content for the renderer.
    pub payload: serde_json::Value,
    /// Current lifecycle status.
    pub status: EventStatus,
    /// Link to the posted message, empty until published.
    pub jump_url: String,
}

/// Proof that an event key was posted, used to make posting idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastRecord {
    /// The scheduled event key.
    pub event_key: String,
    /// Where the message went (channel reference).
    pub destination: String,
    /// Platform id of the posted message.
    pub message_id: String,
    /// Link to the posted message.
    pub jump_url: String,
}
