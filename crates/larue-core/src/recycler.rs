//! Recycler: raw units become packages, packages become daily payouts.
//!
//! The pure functions ([`pack`], [`pending_days`], [`day_value`],
//! [`claim`]) hold every rule of the state machine; the [`Recycler`]
//! service wires them to the store and the clock.
//!
//! # Claim rules
//!
//! - The first claim ever is one free pending day.
//! - Afterwards pending days are the logical days since the last claim,
//!   capped at `backlog_max_days`.
//! - A gap of more than one day breaks the streak before anything is paid.
//! - Each simulated day is paid with the current streak, then the streak
//!   grows by one (up to `streak_cap`).

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use larue_ledger::IdempotencyKey;
use larue_types::{ClaimDay, ClaimLogEntry, PackOutcome, RecyclerState, UserId};

use crate::clock::{days_between, DayClock};
use crate::config::RecyclerConfig;
use crate::error::CoreError;
use crate::store::{ClaimReceipt, ClaimRequest, GameStore};
use crate::time::TimeSource;

/// Ledger reason of recycler payouts.
pub const CLAIM_REASON: &str = "recycler.claim";

/// Payout curve and limits of the recycler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecyclerRules {
    /// Raw units per package.
    pub conv_ratio: u32,
    /// Most days redeemable after inactivity.
    pub backlog_max_days: u32,
    /// Streak length past which the bonus stops growing.
    pub streak_cap: u32,
    /// Bonus per streak day, in basis points.
    pub streak_bonus_bp: u32,
    /// Base package value by level, in cents.
    pub base_value_by_level: BTreeMap<u32, i64>,
}

impl From<&RecyclerConfig> for RecyclerRules {
    fn from(config: &RecyclerConfig) -> Self {
        Self {
            conv_ratio: config.conv_ratio,
            backlog_max_days: config.backlog_max_days,
            streak_cap: config.streak_cap,
            streak_bonus_bp: config.streak_bonus_bp,
            base_value_by_level: config.base_value_by_level.clone(),
        }
    }
}

impl Default for RecyclerRules {
    fn default() -> Self {
        Self::from(&RecyclerConfig::default())
    }
}

impl RecyclerRules {
    /// Base value of a package; unknown levels fall back to level 1.
    pub fn base_value(&self, level: u32) -> i64 {
        self.base_value_by_level
            .get(&level)
            .or_else(|| self.base_value_by_level.get(&1))
            .copied()
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Pure state machine
// ---------------------------------------------------------------------------

/// Convert as many raw units as possible (or `desired` packages if fewer)
/// into packages.
pub fn pack(state: &mut RecyclerState, desired: Option<u32>, conv_ratio: u32) -> PackOutcome {
    let possible = state.raw_units.checked_div(conv_ratio).unwrap_or(0);
    let packages = desired.map_or(possible, |wanted| wanted.min(possible));
    let consumed = packages.saturating_mul(conv_ratio);

    state.raw_units = state.raw_units.saturating_sub(consumed);
    state.packaged_units = state.packaged_units.saturating_add(packages);

    PackOutcome {
        packages_made: packages,
        raw_consumed: consumed,
    }
}

/// Days redeemable on `today`.
pub fn pending_days(state: &RecyclerState, today: NaiveDate, rules: &RecyclerRules) -> u32 {
    let Some(last) = state.last_claim_day else {
        return 1;
    };
    let elapsed = days_between(last, today).max(0);
    u32::try_from(elapsed)
        .unwrap_or(u32::MAX)
        .min(rules.backlog_max_days)
}

/// Payout of one day at `level` with `streak` days of bonus, rounded half
/// to even.
pub fn day_value(level: u32, streak: u32, rules: &RecyclerRules) -> i64 {
    let effective = streak.min(rules.streak_cap);
    let bonus_bp = i64::from(rules.streak_bonus_bp).saturating_mul(i64::from(effective));
    let multiplier = Decimal::ONE
        .checked_add(Decimal::new(bonus_bp, 4))
        .unwrap_or(Decimal::ONE);
    Decimal::from(rules.base_value(level))
        .checked_mul(multiplier)
        .map(|value| value.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven))
        .and_then(|value| value.to_i64())
        .unwrap_or(0)
}

/// Redeem up to `requested` days, mutating `state`.
///
/// Returns the simulated days paid, oldest first. Nothing changes when
/// no day is redeemable (no packages, nothing pending or zero requested).
pub fn claim(
    state: &mut RecyclerState,
    requested: u32,
    today: NaiveDate,
    rules: &RecyclerRules,
) -> Vec<ClaimDay> {
    let count = requested
        .min(pending_days(state, today, rules))
        .min(state.packaged_units);
    if count == 0 {
        return Vec::new();
    }

    if state
        .last_claim_day
        .is_some_and(|last| days_between(last, today) > 1)
    {
        state.streak_days = 0;
    }

    let mut day = state
        .last_claim_day
        .or_else(|| today.pred_opt())
        .unwrap_or(today);
    let mut paid = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
    for _ in 0..count {
        day = day.succ_opt().unwrap_or(day);
        paid.push(ClaimDay {
            day,
            payout: day_value(state.level, state.streak_days, rules),
        });
        state.streak_days = state.streak_days.saturating_add(1).min(rules.streak_cap);
        state.packaged_units = state.packaged_units.saturating_sub(1);
    }

    state.last_claim_day = Some(today);
    paid
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Everything the status screen shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecyclerStatus {
    /// Stored state.
    pub state: RecyclerState,
    /// Days redeemable now.
    pub pending_days: u32,
    /// Value of the next package at the current streak.
    pub unit_value: i64,
    /// When the next logical day starts.
    pub next_reset: DateTime<Utc>,
}

/// Recycler engine bound to a store, a clock and the payout rules.
#[derive(Clone)]
pub struct Recycler {
    store: Arc<dyn GameStore>,
    time: Arc<dyn TimeSource>,
    clock: DayClock,
    rules: Arc<RecyclerRules>,
}

impl Recycler {
    /// Create the engine.
    pub fn new(
        store: Arc<dyn GameStore>,
        time: Arc<dyn TimeSource>,
        clock: DayClock,
        rules: RecyclerRules,
    ) -> Self {
        Self {
            store,
            time,
            clock,
            rules: Arc::new(rules),
        }
    }

    /// The payout rules.
    pub fn rules(&self) -> &RecyclerRules {
        &self.rules
    }

    /// Stored state; defaults for unknown users.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn get_state(&self, user_id: UserId) -> Result<RecyclerState, CoreError> {
        Ok(self.store.recycler_state(user_id).await?)
    }

    /// State plus the derived values the presentation layer needs to tell
    /// "no packages" from "too early".
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn status(&self, user_id: UserId) -> Result<RecyclerStatus, CoreError> {
        let now = self.time.now();
        let state = self.store.recycler_state(user_id).await?;
        Ok(RecyclerStatus {
            pending_days: pending_days(&state, self.clock.logical_day(now), &self.rules),
            unit_value: self.unit_value(&state),
            next_reset: self.clock.next_reset(now),
            state,
        })
    }

    /// Add loose units (e.g. a scavenge drop).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn add_raw_units(&self, user_id: UserId, units: u32) -> Result<RecyclerState, CoreError> {
        let state = self.store.add_raw_units(user_id, units).await?;
        tracing::debug!(user = %user_id, units, raw = state.raw_units, "Raw units added");
        Ok(state)
    }

    /// Pack raw units into packages.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn pack(
        &self,
        user_id: UserId,
        desired: Option<u32>,
    ) -> Result<(PackOutcome, RecyclerState), CoreError> {
        let (outcome, state) = self
            .store
            .pack(user_id, desired, self.rules.conv_ratio)
            .await?;
        tracing::info!(
            user = %user_id,
            packages = outcome.packages_made,
            consumed = outcome.raw_consumed,
            "Recycler pack"
        );
        Ok((outcome, state))
    }

    /// Days redeemable now.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn pending_days(&self, user_id: UserId) -> Result<u32, CoreError> {
        let state = self.store.recycler_state(user_id).await?;
        let today = self.clock.logical_day(self.time.now());
        Ok(pending_days(&state, today, &self.rules))
    }

    /// Value of the next package at the state's level and streak.
    pub fn unit_value(&self, state: &RecyclerState) -> i64 {
        day_value(state.level, state.streak_days, &self.rules)
    }

    /// Redeem up to `requested_days` and credit the payout, keyed by the
    /// triggering event.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ledger`] for an unusable event id and
    /// [`CoreError::Store`] when persistence fails.
    pub async fn claim(
        &self,
        user_id: UserId,
        requested_days: u32,
        event_id: &str,
    ) -> Result<ClaimReceipt, CoreError> {
        let now = self.time.now();
        let request = ClaimRequest {
            user_id,
            requested_days,
            today: self.clock.logical_day(now),
            rules: RecyclerRules::clone(&self.rules),
            credit_key: IdempotencyKey::for_event(event_id, "recycler", "claim")?,
            at: now,
        };
        let receipt = self.store.claim(request).await?;
        tracing::info!(
            user = %user_id,
            event_id,
            days = receipt.days_claimed(),
            payout = receipt.total_payout,
            streak = receipt.state.streak_days,
            "Recycler claim"
        );
        Ok(receipt)
    }

    /// Claim audit rows of a user.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn claim_log(&self, user_id: UserId) -> Result<Vec<ClaimLogEntry>, CoreError> {
        Ok(self.store.claim_log(user_id).await?)
    }

    /// When the next logical day starts.
    pub fn next_reset(&self) -> DateTime<Utc> {
        self.clock.next_reset(self.time.now())
    }

    /// Delete recycler state of one user, or everyone when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn reset(&self, user_id: Option<UserId>) -> Result<u64, CoreError> {
        let removed = self.store.reset_recycler(user_id).await?;
        tracing::info!(user = ?user_id, removed, "Recycler state reset");
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn rules() -> RecyclerRules {
        RecyclerRules::default()
    }

    #[test]
    fn pack_consumes_whole_packages() {
        let mut state = RecyclerState {
            raw_units: 120,
            ..RecyclerState::default()
        };
        let outcome = pack(&mut state, None, 50);
        assert_eq!(outcome.packages_made, 2);
        assert_eq!(outcome.raw_consumed, 100);
        assert_eq!(state.raw_units, 20);
        assert_eq!(state.packaged_units, 2);
    }

    #[test]
    fn pack_respects_smaller_desired_count() {
        let mut state = RecyclerState {
            raw_units: 500,
            ..RecyclerState::default()
        };
        assert_eq!(pack(&mut state, Some(3), 50).packages_made, 3);
        assert_eq!(state.raw_units, 350);
        assert_eq!(pack(&mut state, Some(0), 50).packages_made, 0);
        assert_eq!(pack(&mut state, Some(99), 50).packages_made, 7);
        assert_eq!(state.raw_units, 0);
    }

    #[test]
    fn first_claim_has_one_pending_day() {
        let state = RecyclerState::default();
        assert_eq!(pending_days(&state, day("2026-10-17"), &rules()), 1);
    }

    #[test]
    fn backlog_is_capped() {
        let state = RecyclerState {
            last_claim_day: Some(day("2026-10-01")),
            ..RecyclerState::default()
        };
        // BACKLOG_MAX_DAYS + 5 days later.
        assert_eq!(pending_days(&state, day("2026-10-09"), &rules()), 3);
        assert_eq!(pending_days(&state, day("2026-10-01"), &rules()), 0);
        assert_eq!(pending_days(&state, day("2026-09-30"), &rules()), 0);
    }

    #[test]
    fn day_value_follows_streak_curve() {
        let rules = rules();
        assert_eq!(day_value(1, 0, &rules), 120);
        // 120 * 1.08 = 129.6
        assert_eq!(day_value(1, 1, &rules), 130);
        // 120 * 1.56 = 187.2; streak capped at 7.
        assert_eq!(day_value(1, 7, &rules), 187);
        assert_eq!(day_value(1, 30, &rules), 187);
        assert_eq!(day_value(3, 0, &rules), 260);
        // Unknown level falls back to level 1.
        assert_eq!(day_value(9, 0, &rules), 120);
    }

    #[test]
    fn day_value_rounds_half_to_even() {
        let rules = RecyclerRules {
            streak_bonus_bp: 5_000,
            base_value_by_level: BTreeMap::from([(1, 5), (2, 7)]),
            ..RecyclerRules::default()
        };
        // 5 * 1.5 = 7.5 -> 8, 7 * 1.5 = 10.5 -> 10
        assert_eq!(day_value(1, 1, &rules), 8);
        assert_eq!(day_value(2, 1, &rules), 10);
    }

    #[test]
    fn first_claim_pays_base_value() {
        let mut state = RecyclerState {
            packaged_units: 2,
            ..RecyclerState::default()
        };
        let paid = claim(&mut state, 1, day("2026-10-17"), &rules());
        assert_eq!(paid, vec![ClaimDay { day: day("2026-10-17"), payout: 120 }]);
        assert_eq!(state.streak_days, 1);
        assert_eq!(state.packaged_units, 1);
        assert_eq!(state.last_claim_day, Some(day("2026-10-17")));
    }

    #[test]
    fn streak_grows_then_breaks() {
        let rules = rules();
        let mut state = RecyclerState {
            packaged_units: 10,
            ..RecyclerState::default()
        };

        let d1 = claim(&mut state, 1, day("2026-10-01"), &rules);
        assert_eq!(d1.first().map(|d| d.payout), Some(120));
        assert_eq!(state.streak_days, 1);

        let d2 = claim(&mut state, 1, day("2026-10-02"), &rules);
        assert_eq!(d2.first().map(|d| d.payout), Some(130));
        assert_eq!(state.streak_days, 2);

        // Skip to day 5: the streak resets before paying.
        let d5 = claim(&mut state, 1, day("2026-10-05"), &rules);
        assert_eq!(d5.first().map(|d| d.payout), Some(120));
        assert_eq!(d5.first().map(|d| d.day), Some(day("2026-10-03")));
        assert_eq!(state.streak_days, 1);
    }

    #[test]
    fn backlog_claim_pays_oldest_days_first() {
        let mut state = RecyclerState {
            packaged_units: 5,
            streak_days: 4,
            last_claim_day: Some(day("2026-10-10")),
            ..RecyclerState::default()
        };
        let paid = claim(&mut state, 10, day("2026-10-20"), &rules());
        let days: Vec<NaiveDate> = paid.iter().map(|d| d.day).collect();
        assert_eq!(days, vec![day("2026-10-11"), day("2026-10-12"), day("2026-10-13")]);
        let payouts: Vec<i64> = paid.iter().map(|d| d.payout).collect();
        assert_eq!(payouts, vec![120, 130, 139]);
        assert_eq!(state.packaged_units, 2);
        assert_eq!(state.last_claim_day, Some(day("2026-10-20")));
    }

    #[test]
    fn claim_is_a_no_op_without_packages_or_pending_days() {
        let rules = rules();
        let mut empty = RecyclerState::default();
        assert!(claim(&mut empty, 1, day("2026-10-17"), &rules).is_empty());
        assert_eq!(empty, RecyclerState::default());

        let mut too_early = RecyclerState {
            packaged_units: 3,
            streak_days: 2,
            last_claim_day: Some(day("2026-10-17")),
            ..RecyclerState::default()
        };
        let before = too_early.clone();
        assert!(claim(&mut too_early, 1, day("2026-10-17"), &rules).is_empty());
        assert_eq!(too_early, before);

        let mut zero_requested = before.clone();
        assert!(claim(&mut zero_requested, 0, day("2026-10-18"), &rules).is_empty());
        assert_eq!(zero_requested, before);
    }

    #[test]
    fn streak_stays_capped() {
        let mut state = RecyclerState {
            packaged_units: 3,
            streak_days: 7,
            last_claim_day: Some(day("2026-10-16")),
            ..RecyclerState::default()
        };
        let paid = claim(&mut state, 1, day("2026-10-17"), &rules());
        assert_eq!(paid.first().map(|d| d.payout), Some(187));
        assert_eq!(state.streak_days, 7);
    }
}
