//! Beg and scavenge: the two quota-gated money makers.
//!
//! Flow of both actions: started check, quota, resolver roll seeded from
//! the event id, idempotent ledger write, stat increment. Scavenging can
//! also drop loose cans into the recycler.

use std::collections::BTreeMap;
use std::sync::Arc;

use larue_ledger::IdempotencyKey;
use larue_types::{QuotaDecision, UserId};

use crate::config::{ACTION_BEG, ACTION_SCAVENGE, BegConfig, ItemConfig, ScavengeConfig};
use crate::economy::Economy;
use crate::equipment::EquipmentBonus;
use crate::error::CoreError;
use crate::quota::Quota;
use crate::recycler::Recycler;
use crate::resolvers::{
    ScavengeOutcome, resolve_beg, resolve_can_drop, resolve_scavenge, rng_for_event,
};
use crate::store::GameStore;

/// Stat counting admitted begs.
pub const STAT_BEG_COUNT: &str = "beg_count";
/// Stat counting admitted scavenges.
pub const STAT_SCAVENGE_COUNT: &str = "scavenge_count";

/// Result of a hustle command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HustleOutcome {
    /// The player never ran the start command.
    NotStarted,
    /// Throttled by the quota engine.
    Denied(QuotaDecision),
    /// Begging paid out.
    Begged {
        /// Amount credited.
        amount: i64,
        /// Balance afterwards.
        balance: i64,
        /// Uses left today.
        remaining_today: u32,
    },
    /// Scavenging resolved.
    Scavenged {
        /// What was found or lost.
        outcome: ScavengeOutcome,
        /// Loose cans added to the recycler.
        cans: u32,
        /// Balance afterwards.
        balance: i64,
        /// Uses left today.
        remaining_today: u32,
    },
}

/// Hustle service.
#[derive(Clone)]
pub struct Hustle {
    store: Arc<dyn GameStore>,
    economy: Economy,
    quota: Quota,
    recycler: Recycler,
    beg: BegConfig,
    scavenge: ScavengeConfig,
    items: Arc<BTreeMap<String, ItemConfig>>,
}

impl Hustle {
    /// Create the service.
    pub fn new(
        store: Arc<dyn GameStore>,
        economy: Economy,
        quota: Quota,
        recycler: Recycler,
        beg: BegConfig,
        scavenge: ScavengeConfig,
        items: BTreeMap<String, ItemConfig>,
    ) -> Self {
        Self {
            store,
            economy,
            quota,
            recycler,
            beg,
            scavenge,
            items: Arc::new(items),
        }
    }

    /// Bonuses of everything the player owns.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn equipment(&self, user_id: UserId) -> Result<EquipmentBonus, CoreError> {
        let inventory = self.store.inventory(user_id).await?;
        Ok(EquipmentBonus::from_inventory(&inventory, &self.items))
    }

    /// Gate on the started flag and the quota. `Ok(Err(outcome))` is a
    /// denial to hand back as is.
    async fn admit(
        &self,
        user_id: UserId,
        action: &str,
    ) -> Result<Result<QuotaDecision, HustleOutcome>, CoreError> {
        if !self.economy.has_started(user_id).await? {
            return Ok(Err(HustleOutcome::NotStarted));
        }
        let decision = self.quota.check(user_id, action).await?;
        if decision.admitted {
            Ok(Ok(decision))
        } else {
            Ok(Err(HustleOutcome::Denied(decision)))
        }
    }

    /// Beg for coins.
    ///
    /// # Errors
    ///
    /// Returns a ledger error for an unusable event id, or a store error.
    pub async fn beg(&self, user_id: UserId, event_id: &str) -> Result<HustleOutcome, CoreError> {
        let key = IdempotencyKey::for_event(event_id, ACTION_BEG, "gain")?;
        let decision = match self.admit(user_id, ACTION_BEG).await? {
            Ok(decision) => decision,
            Err(denied) => return Ok(denied),
        };

        let bonus = self.equipment(user_id).await?;
        let mut rng = rng_for_event(event_id, ACTION_BEG);
        let amount = resolve_beg(&mut rng, &self.beg, &bonus);

        let result = self
            .economy
            .apply_once(user_id, amount, "hustle.beg", &key)
            .await?;
        if result.applied {
            self.store.increment_stat(user_id, STAT_BEG_COUNT, 1).await?;
        }

        Ok(HustleOutcome::Begged {
            amount,
            balance: result.balance,
            remaining_today: decision.remaining_today,
        })
    }

    /// Scavenge the streets. Losses never exceed the current balance.
    ///
    /// # Errors
    ///
    /// Returns a ledger error for an unusable event id, or a store error.
    pub async fn scavenge(
        &self,
        user_id: UserId,
        event_id: &str,
    ) -> Result<HustleOutcome, CoreError> {
        let gain_key = IdempotencyKey::for_event(event_id, ACTION_SCAVENGE, "gain")?;
        let loss_key = IdempotencyKey::for_event(event_id, ACTION_SCAVENGE, "loss")?;
        let decision = match self.admit(user_id, ACTION_SCAVENGE).await? {
            Ok(decision) => decision,
            Err(denied) => return Ok(denied),
        };

        let bonus = self.equipment(user_id).await?;
        let balance = self.economy.balance(user_id).await?;
        let mut rng = rng_for_event(event_id, ACTION_SCAVENGE);
        let outcome = resolve_scavenge(&mut rng, &self.scavenge, &bonus, balance);
        let cans = resolve_can_drop(&mut rng, &self.scavenge, &bonus);

        let gain_or_loss = match outcome {
            ScavengeOutcome::Gain(_) => Some(("hustle.scavenge.gain", &gain_key)),
            ScavengeOutcome::Loss(_) => Some(("hustle.scavenge.loss", &loss_key)),
            ScavengeOutcome::Nothing => None,
        };
        // An empty-handed scavenge writes no entry, so it has no replay to detect.
        let (balance, applied) = match gain_or_loss {
            Some((reason, key)) => {
                let result = self
                    .economy
                    .apply_once(user_id, outcome.delta(), reason, key)
                    .await?;
                (result.balance, result.applied)
            }
            None => (balance, true),
        };

        if applied {
            if cans > 0 {
                self.recycler.add_raw_units(user_id, cans).await?;
            }
            self.store.increment_stat(user_id, STAT_SCAVENGE_COUNT, 1).await?;
            tracing::info!(user = %user_id, event_id, ?outcome, cans, balance, "Scavenge resolved");
        } else {
            tracing::debug!(user = %user_id, event_id, "Scavenge already recorded");
        }

        Ok(HustleOutcome::Scavenged {
            outcome,
            cans,
            balance,
            remaining_today: decision.remaining_today,
        })
    }

    /// Delete usage counters of one user, or everyone when `None`. Items
    /// unlocked by those counters stay owned.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn reset_stats(&self, user_id: Option<UserId>) -> Result<u64, CoreError> {
        let removed = self.store.reset_stats(user_id).await?;
        tracing::info!(user = ?user_id, removed, "Stats reset");
        Ok(removed)
    }
}
