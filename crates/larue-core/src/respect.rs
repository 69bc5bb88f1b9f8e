//! Street cred: one point of respect per giver, receiver and logical day.
//!
//! The respect log is append-only and unique on `(receiver, giver, day)`,
//! so a retried command or a second attempt the same day never counts
//! twice. Cred is never spent.

use std::sync::Arc;

use larue_types::{CredRow, UserId};

use crate::clock::DayClock;
use crate::economy::Economy;
use crate::error::CoreError;
use crate::store::GameStore;
use crate::time::TimeSource;

/// Result of giving respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespectOutcome {
    /// Players cannot respect themselves.
    SelfTarget,
    /// The receiver never ran the start command.
    TargetNotStarted,
    /// The giver already respected this receiver today.
    AlreadyGivenToday,
    /// Respect recorded.
    Given {
        /// The receiver's cred afterwards.
        cred: u64,
    },
}

/// Respect service.
#[derive(Clone)]
pub struct Respect {
    store: Arc<dyn GameStore>,
    time: Arc<dyn TimeSource>,
    clock: DayClock,
    economy: Economy,
}

impl Respect {
    /// Create the service.
    pub const fn new(
        store: Arc<dyn GameStore>,
        time: Arc<dyn TimeSource>,
        clock: DayClock,
        economy: Economy,
    ) -> Self {
        Self {
            store,
            time,
            clock,
            economy,
        }
    }

    /// Give `to` one point of cred from `from`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn give(&self, from: UserId, to: UserId) -> Result<RespectOutcome, CoreError> {
        if from == to {
            return Ok(RespectOutcome::SelfTarget);
        }
        if !self.economy.has_started(to).await? {
            return Ok(RespectOutcome::TargetNotStarted);
        }

        let now = self.time.now();
        let day = self.clock.day_key(now);
        match self.store.give_respect(from, to, &day, now).await? {
            Some(cred) => {
                tracing::info!(from = %from, to = %to, day, cred, "Respect given");
                Ok(RespectOutcome::Given { cred })
            }
            None => Ok(RespectOutcome::AlreadyGivenToday),
        }
    }

    /// Cred received by a user.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn cred(&self, user_id: UserId) -> Result<u64, CoreError> {
        Ok(self.store.cred(user_id).await?)
    }

    /// Most respected users, ties broken by user id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn top_by_cred(&self, limit: u32) -> Result<Vec<CredRow>, CoreError> {
        Ok(self.store.top_cred(limit).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::config::LarueConfig;
    use crate::memory::MemoryStore;
    use crate::time::ManualTime;

    const DAY: i64 = 86_400;

    fn respect() -> (Respect, Economy, Arc<ManualTime>) {
        let config = LarueConfig::default();
        let store = Arc::new(MemoryStore::new());
        let time = Arc::new(ManualTime::new(DateTime::from_timestamp(1_760_000_000, 0).unwrap()));
        let economy = Economy::new(store.clone(), time.clone(), config.economy.starter_gift);
        let respect = Respect::new(store, time.clone(), config.day_clock().unwrap(), economy.clone());
        (respect, economy, time)
    }

    #[tokio::test]
    async fn self_respect_is_refused() {
        let (respect, economy, _) = respect();
        let user = UserId::new(1);
        economy.start_player(user).await.unwrap();
        assert_eq!(respect.give(user, user).await.unwrap(), RespectOutcome::SelfTarget);
        assert_eq!(respect.cred(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn receiver_must_have_started() {
        let (respect, _, _) = respect();
        let outcome = respect.give(UserId::new(1), UserId::new(2)).await.unwrap();
        assert_eq!(outcome, RespectOutcome::TargetNotStarted);
    }

    #[tokio::test]
    async fn once_per_giver_per_day() {
        let (respect, economy, time) = respect();
        let (giver, other, receiver) = (UserId::new(1), UserId::new(2), UserId::new(3));
        economy.start_player(receiver).await.unwrap();

        assert_eq!(
            respect.give(giver, receiver).await.unwrap(),
            RespectOutcome::Given { cred: 1 }
        );
        assert_eq!(
            respect.give(giver, receiver).await.unwrap(),
            RespectOutcome::AlreadyGivenToday
        );
        assert_eq!(
            respect.give(other, receiver).await.unwrap(),
            RespectOutcome::Given { cred: 2 }
        );

        time.advance(DAY);
        assert_eq!(
            respect.give(giver, receiver).await.unwrap(),
            RespectOutcome::Given { cred: 3 }
        );
    }

    #[tokio::test]
    async fn leaderboard_orders_by_cred_then_id() {
        let (respect, economy, _) = respect();
        let (a, b, c) = (UserId::new(9), UserId::new(4), UserId::new(5));
        for user in [a, b, c] {
            economy.start_player(user).await.unwrap();
        }
        respect.give(a, b).await.unwrap();
        respect.give(a, c).await.unwrap();
        respect.give(b, c).await.unwrap();
        respect.give(c, a).await.unwrap();

        let top = respect.top_by_cred(2).await.unwrap();
        assert_eq!(
            top,
            vec![
                CredRow { user_id: c, cred: 2 },
                CredRow { user_id: b, cred: 1 },
            ]
        );
    }
}
