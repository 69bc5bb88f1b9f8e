//! Aggregation of owned shop items into one bonus record.
//!
//! Flat ranges add up per copy, multipliers compound per copy
//! (`mult^qty`), and the counted quantity never exceeds the item's
//! ownership cap.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::config::ItemConfig;

/// Combined bonuses of everything a player owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquipmentBonus {
    /// Lowest flat beg bonus.
    pub beg_flat_min: i64,
    /// Highest flat beg bonus.
    pub beg_flat_max: i64,
    /// Beg multiplier.
    pub beg_mult: Decimal,
    /// Lowest flat scavenge bonus.
    pub scavenge_flat_min: i64,
    /// Highest flat scavenge bonus.
    pub scavenge_flat_max: i64,
    /// Scavenge gain multiplier.
    pub scavenge_mult: Decimal,
    /// Can-drop chance multiplier.
    pub can_prob_mult: Decimal,
    /// Extra cans per drop.
    pub can_roll_bonus: u32,
}

impl Default for EquipmentBonus {
    fn default() -> Self {
        Self {
            beg_flat_min: 0,
            beg_flat_max: 0,
            beg_mult: Decimal::ONE,
            scavenge_flat_min: 0,
            scavenge_flat_max: 0,
            scavenge_mult: Decimal::ONE,
            can_prob_mult: Decimal::ONE,
            can_roll_bonus: 0,
        }
    }
}

impl EquipmentBonus {
    /// Fold an inventory (`item -> qty`) through the catalogue. Items
    /// missing from the catalogue are ignored.
    pub fn from_inventory(
        inventory: &BTreeMap<String, u32>,
        catalogue: &BTreeMap<String, ItemConfig>,
    ) -> Self {
        let mut total = Self::default();
        for (item_id, &owned) in inventory {
            let Some(item) = catalogue.get(item_id) else {
                continue;
            };
            let qty = owned.min(item.max_qty);
            if qty == 0 {
                continue;
            }
            let bonus = &item.bonus;
            let copies = i64::from(qty);

            total.beg_flat_min = total
                .beg_flat_min
                .saturating_add(bonus.beg_flat_min.saturating_mul(copies));
            total.beg_flat_max = total
                .beg_flat_max
                .saturating_add(bonus.beg_flat_max.saturating_mul(copies));
            total.scavenge_flat_min = total
                .scavenge_flat_min
                .saturating_add(bonus.scavenge_flat_min.saturating_mul(copies));
            total.scavenge_flat_max = total
                .scavenge_flat_max
                .saturating_add(bonus.scavenge_flat_max.saturating_mul(copies));
            total.beg_mult = compound(total.beg_mult, bonus.beg_mult, qty);
            total.scavenge_mult = compound(total.scavenge_mult, bonus.scavenge_mult, qty);
            total.can_prob_mult = compound(total.can_prob_mult, bonus.can_prob_mult, qty);
            total.can_roll_bonus = total
                .can_roll_bonus
                .saturating_add(bonus.can_roll_bonus.saturating_mul(qty));
        }
        total
    }
}

/// `base * mult^times`, leaving `base` unchanged on overflow.
fn compound(base: Decimal, mult: Decimal, times: u32) -> Decimal {
    (0..times).try_fold(base, |acc, _| acc.checked_mul(mult)).unwrap_or(base)
}
