//! Service wiring.
//!
//! [`GameContext`] builds every service once from a store, a time source
//! and the configuration. Command handlers receive the context (or a clone
//! of one service) instead of reaching for globals.

use std::sync::Arc;

use crate::clock::DayClock;
use crate::config::{ConfigError, LarueConfig};
use crate::economy::Economy;
use crate::hustle::Hustle;
use crate::quota::Quota;
use crate::recycler::{Recycler, RecyclerRules};
use crate::respect::Respect;
use crate::scheduler::{Publisher, Scheduler};
use crate::scratch::Scratch;
use crate::shop::Shop;
use crate::store::GameStore;
use crate::time::TimeSource;

/// Every game service, sharing one store and one time source.
#[derive(Clone)]
pub struct GameContext {
    /// Logical-day clock.
    pub clock: DayClock,
    /// Money facade.
    pub economy: Economy,
    /// Cooldowns and daily caps.
    pub quota: Quota,
    /// Daily-claim engine.
    pub recycler: Recycler,
    /// Item shop.
    pub shop: Shop,
    /// Beg and scavenge.
    pub hustle: Hustle,
    /// Scratch tickets.
    pub scratch: Scratch,
    /// Street cred.
    pub respect: Respect,
    /// Scheduled events and background loops.
    pub scheduler: Scheduler,
}

impl GameContext {
    /// Validate `config` and build the services.
    ///
    /// # Errors
    ///
    /// Returns the first configuration problem found.
    pub fn new(
        store: Arc<dyn GameStore>,
        time: Arc<dyn TimeSource>,
        publisher: Arc<dyn Publisher>,
        config: &LarueConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let clock = config.day_clock()?;

        let economy = Economy::new(Arc::clone(&store), Arc::clone(&time), config.economy.starter_gift);
        let quota = Quota::new(
            Arc::clone(&store),
            Arc::clone(&time),
            clock,
            config.actions.clone(),
        );
        let recycler = Recycler::new(
            Arc::clone(&store),
            Arc::clone(&time),
            clock,
            RecyclerRules::from(&config.recycler),
        );
        let shop = Shop::new(Arc::clone(&store), economy.clone(), config.items.clone());
        let hustle = Hustle::new(
            Arc::clone(&store),
            economy.clone(),
            quota.clone(),
            recycler.clone(),
            config.beg.clone(),
            config.scavenge.clone(),
            config.items.clone(),
        );
        let scratch = Scratch::new(
            Arc::clone(&store),
            economy.clone(),
            quota.clone(),
            config.scratch_tickets.clone(),
        );
        let respect = Respect::new(Arc::clone(&store), Arc::clone(&time), clock, economy.clone());
        let scheduler = Scheduler::new(store, time, clock, config.scheduler.clone(), publisher);

        Ok(Self {
            clock,
            economy,
            quota,
            recycler,
            shop,
            hustle,
            scratch,
            respect,
            scheduler,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use async_trait::async_trait;
    use chrono::DateTime;
    use larue_types::{ScheduledEvent, UserId};

    use super::*;
    use crate::hustle::HustleOutcome;
    use crate::memory::MemoryStore;
    use crate::respect::RespectOutcome;
    use crate::scheduler::{PublishError, Published};
    use crate::time::ManualTime;

    struct NullPublisher;

    #[async_trait]
    impl Publisher for NullPublisher {
        async fn publish(&self, event: &ScheduledEvent) -> Result<Published, PublishError> {
            Err(PublishError(format!("no channel for {}", event.id)))
        }
    }

    fn context(config: &LarueConfig) -> Result<GameContext, ConfigError> {
        let time = ManualTime::new(DateTime::from_timestamp(1_760_000_000, 0).unwrap());
        GameContext::new(
            Arc::new(MemoryStore::new()),
            Arc::new(time),
            Arc::new(NullPublisher),
            config,
        )
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = LarueConfig::default();
        config.recycler.conv_ratio = 0;
        assert!(matches!(context(&config), Err(ConfigError::Invalid { .. })));
    }

    #[tokio::test]
    async fn services_share_one_store() {
        let ctx = context(&LarueConfig::default()).unwrap();
        let user = UserId::new(7);
        ctx.economy.start_player(user).await.unwrap();

        let outcome = ctx.hustle.beg(user, "evt1").await.unwrap();
        let HustleOutcome::Begged { balance, .. } = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert_eq!(ctx.economy.balance(user).await.unwrap(), balance);
        assert_eq!(ctx.quota.peek_state(user, "beg").await.unwrap().count_today, 1);

        let respected = ctx.respect.give(UserId::new(8), user).await.unwrap();
        assert_eq!(respected, RespectOutcome::Given { cred: 1 });
    }
}
