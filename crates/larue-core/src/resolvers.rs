//! Reward formulas of the hustle actions.
//!
//! Every resolver takes an explicit RNG. [`rng_for_event`] seeds one from
//! the triggering event id, so a retried command rolls the same result.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::config::{BegConfig, PrizeTier, ScavengeConfig, BASIS_POINTS};
use crate::equipment::EquipmentBonus;

/// Highest effective can-drop chance, in basis points.
const MAX_DROP_CHANCE_BP: u32 = 9_900;

/// Resolution of the prize-pick draw.
const PICK_RESOLUTION: i64 = 1_000_000;

/// Deterministic RNG for one purpose of one event.
pub fn rng_for_event(event_id: &str, purpose: &str) -> StdRng {
    let name = format!("{event_id}:{purpose}");
    let (high, low) = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).as_u64_pair();
    StdRng::seed_from_u64(high ^ low)
}

/// Round half to even, to whole cents.
fn round_cents(value: Decimal) -> i64 {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
        .to_i64()
        .unwrap_or(0)
}

/// `(base + flat) * mult`, rounded.
fn scaled(base: i64, flat: i64, mult: Decimal) -> i64 {
    Decimal::from(base.saturating_add(flat))
        .checked_mul(mult)
        .map_or(0, round_cents)
}

fn roll_flat(rng: &mut impl Rng, min: i64, max: i64) -> i64 {
    if max > 0 {
        rng.random_range(min..=min.max(max))
    } else {
        0
    }
}

/// Amount earned by begging; always at least 1.
pub fn resolve_beg(rng: &mut impl Rng, config: &BegConfig, bonus: &EquipmentBonus) -> i64 {
    let base = rng.random_range(config.min..=config.min.max(config.max));
    let flat = roll_flat(rng, bonus.beg_flat_min, bonus.beg_flat_max);
    scaled(base, flat, bonus.beg_mult).max(1)
}

/// Outcome of a scavenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScavengeOutcome {
    /// Found something to sell.
    Gain(i64),
    /// Found nothing.
    Nothing,
    /// Lost money; never more than the balance.
    Loss(i64),
}

impl ScavengeOutcome {
    /// Signed ledger delta.
    pub const fn delta(self) -> i64 {
        match self {
            Self::Gain(amount) => amount,
            Self::Nothing => 0,
            Self::Loss(amount) => amount.saturating_neg(),
        }
    }
}

/// Three-way scavenge roll. Losses are capped by `current_balance`.
pub fn resolve_scavenge(
    rng: &mut impl Rng,
    config: &ScavengeConfig,
    bonus: &EquipmentBonus,
    current_balance: i64,
) -> ScavengeOutcome {
    let roll = rng.random_range(0..BASIS_POINTS);
    if roll < config.gain_weight_bp {
        let base = rng.random_range(config.good_min..=config.good_min.max(config.good_max));
        let flat = roll_flat(rng, bonus.scavenge_flat_min, bonus.scavenge_flat_max);
        return match scaled(base, flat, bonus.scavenge_mult) {
            gain if gain > 0 => ScavengeOutcome::Gain(gain),
            _ => ScavengeOutcome::Nothing,
        };
    }
    if roll < config.gain_weight_bp.saturating_add(config.neutral_weight_bp) {
        return ScavengeOutcome::Nothing;
    }
    match config.max_loss.min(current_balance.max(0)) {
        loss if loss > 0 => ScavengeOutcome::Loss(loss),
        _ => ScavengeOutcome::Nothing,
    }
}

/// Loose cans found after a scavenge; 0 when nothing dropped.
pub fn resolve_can_drop(rng: &mut impl Rng, config: &ScavengeConfig, bonus: &EquipmentBonus) -> u32 {
    let chance = Decimal::from(config.drop_chance_bp)
        .checked_mul(bonus.can_prob_mult)
        .and_then(|value| value.floor().to_u32())
        .unwrap_or(config.drop_chance_bp)
        .min(MAX_DROP_CHANCE_BP);
    if rng.random_range(0..BASIS_POINTS) >= chance {
        return 0;
    }
    rng.random_range(config.drop_min..=config.drop_min.max(config.drop_max))
        .saturating_add(bonus.can_roll_bonus)
}

/// Pick a prize from a weighted pool. Zero-weight tiers are never picked;
/// an empty pool yields 0.
pub fn pick_prize(rng: &mut impl Rng, pool: &[PrizeTier]) -> i64 {
    let total = pool
        .iter()
        .filter(|tier| tier.weight > Decimal::ZERO)
        .try_fold(Decimal::ZERO, |sum, tier| sum.checked_add(tier.weight))
        .unwrap_or(Decimal::ZERO);
    if total <= Decimal::ZERO {
        return 0;
    }

    let point = Decimal::new(rng.random_range(0..PICK_RESOLUTION), 6)
        .checked_mul(total)
        .unwrap_or(Decimal::ZERO);
    let mut cumulative = Decimal::ZERO;
    let mut last = 0;
    for tier in pool.iter().filter(|tier| tier.weight > Decimal::ZERO) {
        cumulative = cumulative.checked_add(tier.weight).unwrap_or(total);
        last = tier.prize;
        if point < cumulative {
            return tier.prize;
        }
    }
    last
}
