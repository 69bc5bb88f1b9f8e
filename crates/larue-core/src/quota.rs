//! Per-action cooldowns and daily caps.
//!
//! [`evaluate`] is the whole decision: given the stored [`ActionState`],
//! the limits and the current instant, it says whether one more use is
//! admitted and what state to persist. The store runs it inside a
//! transaction so concurrent calls for one `(user, action)` never both
//! take the same slot.

use std::collections::BTreeMap;
use std::sync::Arc;

use larue_types::{ActionState, QuotaDecision, QuotaLimits, UserId};

use crate::clock::DayClock;
use crate::error::{CoreError, ValidationError};
use crate::store::GameStore;
use crate::time::TimeSource;

/// Decide one check-and-consume call.
///
/// Returns the decision and, when admitted, the state to persist. A stored
/// counter from another logical day counts as zero. The cooldown boundary
/// is inclusive: `wait <= 0` admits.
pub fn evaluate(
    state: Option<&ActionState>,
    limits: QuotaLimits,
    now: i64,
    today: &str,
) -> (QuotaDecision, Option<ActionState>) {
    let (last_used_at, count) = match state {
        Some(state) if state.day_key == today => (state.last_used_at, state.count_today),
        Some(state) => (state.last_used_at, 0),
        None => (0, 0),
    };

    if count >= limits.daily_cap {
        return (QuotaDecision::cap_reached(), None);
    }

    let cooldown = i64::try_from(limits.cooldown_seconds).unwrap_or(i64::MAX);
    let wait = last_used_at.saturating_add(cooldown).saturating_sub(now);
    let remaining = limits.daily_cap.saturating_sub(count);
    if wait > 0 {
        let wait = u64::try_from(wait).unwrap_or(0);
        return (QuotaDecision::cooling_down(wait, remaining), None);
    }

    let count = count.saturating_add(1);
    let next = ActionState {
        last_used_at: now,
        day_key: today.to_owned(),
        count_today: count,
    };
    (
        QuotaDecision::admit(limits.daily_cap.saturating_sub(count)),
        Some(next),
    )
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Quota engine bound to a store, a clock and the configured actions.
#[derive(Clone)]
pub struct Quota {
    store: Arc<dyn GameStore>,
    time: Arc<dyn TimeSource>,
    clock: DayClock,
    limits: Arc<BTreeMap<String, QuotaLimits>>,
}

impl Quota {
    /// Create the engine. `limits` is the registry of known actions.
    pub fn new(
        store: Arc<dyn GameStore>,
        time: Arc<dyn TimeSource>,
        clock: DayClock,
        limits: BTreeMap<String, QuotaLimits>,
    ) -> Self {
        Self {
            store,
            time,
            clock,
            limits: Arc::new(limits),
        }
    }

    /// Configured limits of a known action.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownAction`] for unregistered names.
    pub fn limits_for(&self, action: &str) -> Result<QuotaLimits, CoreError> {
        self.limits
            .get(action)
            .copied()
            .ok_or_else(|| ValidationError::UnknownAction(action.to_owned()).into())
    }

    /// Admit and consume one use of `action` with explicit limits.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown action or a zero cap, and
    /// [`CoreError::Store`] when persistence fails.
    pub async fn check_and_consume(
        &self,
        user_id: UserId,
        action: &str,
        cooldown_seconds: u64,
        daily_cap: u32,
    ) -> Result<QuotaDecision, CoreError> {
        self.limits_for(action)?;
        if daily_cap == 0 {
            return Err(ValidationError::ZeroDailyCap(action.to_owned()).into());
        }
        let limits = QuotaLimits {
            cooldown_seconds,
            daily_cap,
        };
        self.consume_with(user_id, action, limits).await
    }

    /// Admit and consume one use of `action` with its configured limits.
    ///
    /// # Errors
    ///
    /// Same as [`check_and_consume`](Self::check_and_consume).
    pub async fn check(&self, user_id: UserId, action: &str) -> Result<QuotaDecision, CoreError> {
        let limits = self.limits_for(action)?;
        self.consume_with(user_id, action, limits).await
    }

    async fn consume_with(
        &self,
        user_id: UserId,
        action: &str,
        limits: QuotaLimits,
    ) -> Result<QuotaDecision, CoreError> {
        let now = self.time.now();
        let today = self.clock.day_key(now);
        let decision = self
            .store
            .check_and_consume(user_id, action, limits, now.timestamp(), &today)
            .await?;

        if decision.admitted {
            tracing::debug!(
                user = %user_id,
                action,
                remaining = decision.remaining_today,
                "Action admitted"
            );
        } else {
            tracing::debug!(
                user = %user_id,
                action,
                wait = decision.wait_seconds,
                denial = ?decision.denial,
                "Action denied"
            );
        }
        Ok(decision)
    }

    /// Stored state of `(user, action)` for display. Never mutates.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown action, or a store error.
    pub async fn peek_state(&self, user_id: UserId, action: &str) -> Result<ActionState, CoreError> {
        self.limits_for(action)?;
        Ok(self
            .store
            .action_state(user_id, action)
            .await?
            .unwrap_or_default())
    }

    /// Delete throttling state of one user, or everyone when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn reset(&self, user_id: Option<UserId>) -> Result<u64, CoreError> {
        let removed = self.store.reset_actions(user_id).await?;
        tracing::info!(user = ?user_id, removed, "Quota state reset");
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use larue_types::QuotaDenial;

    use super::*;

    const BEG: QuotaLimits = QuotaLimits {
        cooldown_seconds: 900,
        daily_cap: 10,
    };

    fn used(last: i64, day: &str, count: u32) -> ActionState {
        ActionState {
            last_used_at: last,
            day_key: day.to_owned(),
            count_today: count,
        }
    }

    #[test]
    fn first_use_is_admitted() {
        let (decision, next) = evaluate(None, BEG, 10_000, "2026-10-17");
        assert!(decision.admitted);
        assert_eq!(decision.remaining_today, 9);
        assert_eq!(next, Some(used(10_000, "2026-10-17", 1)));
    }

    #[test]
    fn cooldown_reports_wait() {
        let state = used(10_000, "2026-10-17", 1);
        let (decision, next) = evaluate(Some(&state), BEG, 10_899, "2026-10-17");
        assert!(!decision.admitted);
        assert_eq!(decision.wait_seconds, 1);
        assert_eq!(decision.remaining_today, 9);
        assert_eq!(decision.denial, Some(QuotaDenial::CoolingDown));
        assert!(next.is_none());
    }

    #[test]
    fn cooldown_boundary_is_inclusive() {
        let state = used(10_000, "2026-10-17", 1);
        let (decision, _) = evaluate(Some(&state), BEG, 10_900, "2026-10-17");
        assert!(decision.admitted);
        assert_eq!(decision.remaining_today, 8);
    }

    #[test]
    fn cap_denies_with_zero_remaining() {
        let state = used(0, "2026-10-17", 10);
        let (decision, next) = evaluate(Some(&state), BEG, 99_999, "2026-10-17");
        assert_eq!(decision, QuotaDecision::cap_reached());
        assert!(next.is_none());
    }

    #[test]
    fn cap_wins_over_cooldown() {
        let state = used(99_990, "2026-10-17", 10);
        let (decision, _) = evaluate(Some(&state), BEG, 99_999, "2026-10-17");
        assert_eq!(decision.denial, Some(QuotaDenial::DailyCapReached));
        assert_eq!(decision.wait_seconds, 0);
    }

    #[test]
    fn new_logical_day_resets_counter() {
        let state = used(0, "2026-10-16", 10);
        let (decision, next) = evaluate(Some(&state), BEG, 50_000, "2026-10-17");
        assert!(decision.admitted);
        assert_eq!(decision.remaining_today, 9);
        assert_eq!(next.unwrap().count_today, 1);
    }

    #[test]
    fn cooldown_still_applies_across_day_boundary() {
        let state = used(50_000, "2026-10-16", 3);
        let (decision, _) = evaluate(Some(&state), BEG, 50_100, "2026-10-17");
        assert!(!decision.admitted);
        assert_eq!(decision.wait_seconds, 800);
        assert_eq!(decision.remaining_today, 10);
    }

    #[test]
    fn n_calls_then_denied() {
        let limits = QuotaLimits {
            cooldown_seconds: 0,
            daily_cap: 3,
        };
        let mut state: Option<ActionState> = None;
        for expected_remaining in [2, 1, 0] {
            let (decision, next) = evaluate(state.as_ref(), limits, 1_000, "d");
            assert!(decision.admitted);
            assert_eq!(decision.remaining_today, expected_remaining);
            state = next;
        }
        let (decision, _) = evaluate(state.as_ref(), limits, 1_000, "d");
        assert!(!decision.admitted);
        assert_eq!(decision.remaining_today, 0);
    }
}
