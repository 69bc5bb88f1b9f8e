//! Economy facade: idempotent credits and debits over the ledger.
//!
//! Every money movement goes through [`Economy::apply_once`]. A replayed
//! key is not an error: the call reports `applied = false` and the
//! current balance. The facade never checks funds; callers compare
//! [`Economy::balance`] with the price before debiting.

use std::sync::Arc;

use larue_ledger::{EntryBuilder, IdempotencyKey};
use larue_types::{ApplyResult, LeaderboardRow, LedgerEntry, PlayerRecord, UserId};

use crate::error::{CoreError, ValidationError};
use crate::store::GameStore;
use crate::time::TimeSource;

/// Stable key of the starter gift; one per user, ever.
pub const STARTER_GIFT_KEY: &str = "start:gift";

/// Ledger reason of the starter gift.
pub const STARTER_GIFT_REASON: &str = "start.gift";

/// Result of the start command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The player is new and received the gift.
    Started {
        /// Amount credited.
        gift: i64,
        /// Balance afterwards.
        balance: i64,
    },
    /// The player had already started; nothing changed.
    AlreadyStarted {
        /// Current balance.
        balance: i64,
    },
}

/// Idempotent money facade.
#[derive(Clone)]
pub struct Economy {
    store: Arc<dyn GameStore>,
    time: Arc<dyn TimeSource>,
    starter_gift: i64,
}

impl Economy {
    /// Create the facade.
    pub const fn new(store: Arc<dyn GameStore>, time: Arc<dyn TimeSource>, starter_gift: i64) -> Self {
        Self {
            store,
            time,
            starter_gift,
        }
    }

    /// Build a validated entry stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ledger`] for a zero delta or blank reason.
    pub fn entry(
        &self,
        user_id: UserId,
        delta: i64,
        reason: &str,
        key: &IdempotencyKey,
    ) -> Result<LedgerEntry, CoreError> {
        Ok(EntryBuilder::new(user_id, key.clone())
            .delta(delta)
            .reason(reason)
            .at(self.time.now())
            .build()?)
    }

    /// Apply a signed delta at most once per `(user, key)`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ledger`] for an invalid entry and
    /// [`CoreError::Store`] when persistence fails.
    pub async fn apply_once(
        &self,
        user_id: UserId,
        delta: i64,
        reason: &str,
        key: &IdempotencyKey,
    ) -> Result<ApplyResult, CoreError> {
        let entry = self.entry(user_id, delta, reason, key)?;
        let result = self.store.apply_entry(entry).await?;
        if result.applied {
            tracing::info!(user = %user_id, key = %key, delta, reason, balance = result.balance, "Ledger entry applied");
        } else {
            tracing::debug!(user = %user_id, key = %key, "Ledger entry already applied");
        }
        Ok(result)
    }

    /// Credit `amount` once; returns the balance afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonPositiveAmount`] when `amount <= 0`.
    pub async fn credit_once(
        &self,
        user_id: UserId,
        amount: i64,
        reason: &str,
        key: &IdempotencyKey,
    ) -> Result<i64, CoreError> {
        let amount = positive(amount)?;
        Ok(self.apply_once(user_id, amount, reason, key).await?.balance)
    }

    /// Debit `amount` once; returns the balance afterwards.
    ///
    /// The balance may go negative: funds are the caller's check.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonPositiveAmount`] when `amount <= 0`.
    pub async fn debit_once(
        &self,
        user_id: UserId,
        amount: i64,
        reason: &str,
        key: &IdempotencyKey,
    ) -> Result<i64, CoreError> {
        let delta = positive(amount)?
            .checked_neg()
            .ok_or(ValidationError::NonPositiveAmount { amount })?;
        Ok(self.apply_once(user_id, delta, reason, key).await?.balance)
    }

    /// Current balance; 0 for unknown users.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn balance(&self, user_id: UserId) -> Result<i64, CoreError> {
        Ok(self.store.balance(user_id).await?)
    }

    /// Richest users; ties ordered by user id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn top_richest(&self, limit: u32) -> Result<Vec<LeaderboardRow>, CoreError> {
        Ok(self.store.top_balances(limit).await?)
    }

    /// Most recent ledger entries of a user.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn history(&self, user_id: UserId, limit: u32) -> Result<Vec<LedgerEntry>, CoreError> {
        Ok(self.store.ledger_history(user_id, limit).await?)
    }

    /// Mark the player as started and grant the starter gift once.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn start_player(&self, user_id: UserId) -> Result<StartOutcome, CoreError> {
        let key = IdempotencyKey::parse(STARTER_GIFT_KEY)?;
        let gift = self.entry(user_id, self.starter_gift, STARTER_GIFT_REASON, &key)?;
        match self.store.start_player(gift).await? {
            Some(result) => {
                tracing::info!(user = %user_id, gift = self.starter_gift, "Player started");
                Ok(StartOutcome::Started {
                    gift: if result.applied { self.starter_gift } else { 0 },
                    balance: result.balance,
                })
            }
            None => Ok(StartOutcome::AlreadyStarted {
                balance: self.store.balance(user_id).await?,
            }),
        }
    }

    /// Whether the player ran the start command.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn has_started(&self, user_id: UserId) -> Result<bool, CoreError> {
        Ok(self
            .store
            .player(user_id)
            .await?
            .is_some_and(|player| player.has_started))
    }

    /// The player's record, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn player(&self, user_id: UserId) -> Result<Option<PlayerRecord>, CoreError> {
        Ok(self.store.player(user_id).await?)
    }

    /// Number of known players.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn count_players(&self) -> Result<u64, CoreError> {
        Ok(self.store.count_players().await?)
    }
}

fn positive(amount: i64) -> Result<i64, ValidationError> {
    if amount > 0 {
        Ok(amount)
    } else {
        Err(ValidationError::NonPositiveAmount { amount })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::memory::MemoryStore;
    use crate::time::ManualTime;

    fn economy() -> Economy {
        let time = ManualTime::new(DateTime::from_timestamp(1_760_000_000, 0).unwrap());
        Economy::new(Arc::new(MemoryStore::new()), Arc::new(time), 100)
    }

    fn key(raw: &str) -> IdempotencyKey {
        IdempotencyKey::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn retried_gift_is_credited_once() {
        let economy = economy();
        let user = UserId::new(1);
        let first = economy.credit_once(user, 100, "start-gift", &key("start:gift")).await.unwrap();
        let second = economy.credit_once(user, 100, "start-gift", &key("start:gift")).await.unwrap();
        assert_eq!(first, 100);
        assert_eq!(second, 100);
        assert_eq!(economy.balance(user).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected() {
        let economy = economy();
        let user = UserId::new(1);
        for amount in [0, -5] {
            let credit = economy.credit_once(user, amount, "x", &key("k:credit")).await;
            assert!(matches!(
                credit,
                Err(CoreError::Validation(ValidationError::NonPositiveAmount { .. }))
            ));
            let debit = economy.debit_once(user, amount, "x", &key("k:debit")).await;
            assert!(matches!(debit, Err(CoreError::Validation(_))));
        }
        assert_eq!(economy.balance(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn debit_without_funds_still_applies() {
        let economy = economy();
        let user = UserId::new(2);
        economy.credit_once(user, 30, "gift", &key("gift")).await.unwrap();
        let balance = economy.debit_once(user, 50, "shop:x", &key("shop:123:x")).await.unwrap();
        assert_eq!(balance, -20);
    }

    #[tokio::test]
    async fn start_player_gifts_once() {
        let economy = economy();
        let user = UserId::new(3);
        assert!(!economy.has_started(user).await.unwrap());

        let first = economy.start_player(user).await.unwrap();
        assert_eq!(first, StartOutcome::Started { gift: 100, balance: 100 });

        let again = economy.start_player(user).await.unwrap();
        assert_eq!(again, StartOutcome::AlreadyStarted { balance: 100 });

        assert!(economy.has_started(user).await.unwrap());
        assert_eq!(economy.count_players().await.unwrap(), 1);
        let player = economy.player(user).await.unwrap().unwrap();
        assert_eq!(player.legacy_money, 100);
    }

    #[tokio::test]
    async fn leaderboard_orders_by_balance_then_id() {
        let economy = economy();
        for (id, amount) in [(30, 50), (10, 50), (20, 80)] {
            economy.credit_once(UserId::new(id), amount, "seed", &key("seed")).await.unwrap();
        }
        let top = economy.top_richest(10).await.unwrap();
        let ids: Vec<u64> = top.iter().map(|row| row.user_id.into_inner()).collect();
        assert_eq!(ids, vec![20, 10, 30]);
    }

    #[tokio::test]
    async fn history_lists_entries() {
        let economy = economy();
        let user = UserId::new(4);
        economy.credit_once(user, 5, "a", &key("a")).await.unwrap();
        economy.credit_once(user, 7, "b", &key("b")).await.unwrap();
        let history = economy.history(user, 10).await.unwrap();
        assert_eq!(history.len(), 2);
    }
}
