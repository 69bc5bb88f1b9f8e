//! The item shop.
//!
//! Purchases are keyed by the triggering event, so a retried command never
//! charges twice. The debit and the inventory grant land in the same store
//! transaction.

use std::collections::BTreeMap;
use std::sync::Arc;

use larue_ledger::IdempotencyKey;
use larue_types::UserId;

use crate::config::ItemConfig;
use crate::economy::Economy;
use crate::error::{CoreError, ValidationError};
use crate::store::{GameStore, PurchaseOrder, PurchaseWrite};

/// Result of a purchase attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// The item was bought (or the same purchase was already recorded).
    Bought {
        /// Quantity owned afterwards.
        quantity: u32,
        /// Balance afterwards.
        balance: i64,
    },
    /// The player never ran the start command.
    NotStarted,
    /// The ownership cap is reached.
    AlreadyOwned {
        /// Quantity owned.
        quantity: u32,
    },
    /// Stat requirements are not met.
    Locked {
        /// Stat key to the count still missing.
        missing: BTreeMap<String, u64>,
    },
    /// The balance does not cover the price.
    InsufficientFunds {
        /// Amount still needed.
        needed: i64,
    },
}

/// One catalogue line as seen by a given player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopEntry {
    /// Catalogue id.
    pub item_id: String,
    /// Display name.
    pub name: String,
    /// Price in cents.
    pub price: i64,
    /// Quantity the player owns.
    pub owned: u32,
    /// Ownership cap.
    pub max_qty: u32,
    /// Stats still missing to unlock; empty when unlocked.
    pub missing: BTreeMap<String, u64>,
}

/// Stat counts still missing for `unlock`.
pub fn missing_requirements(
    unlock: &BTreeMap<String, u64>,
    stats: &BTreeMap<String, u64>,
) -> BTreeMap<String, u64> {
    unlock
        .iter()
        .filter_map(|(stat, &required)| {
            let have = stats.get(stat).copied().unwrap_or(0);
            (have < required).then(|| (stat.clone(), required.saturating_sub(have)))
        })
        .collect()
}

/// Shop service over the configured catalogue.
#[derive(Clone)]
pub struct Shop {
    store: Arc<dyn GameStore>,
    economy: Economy,
    items: Arc<BTreeMap<String, ItemConfig>>,
}

impl Shop {
    /// Create the shop.
    pub fn new(
        store: Arc<dyn GameStore>,
        economy: Economy,
        items: BTreeMap<String, ItemConfig>,
    ) -> Self {
        Self {
            store,
            economy,
            items: Arc::new(items),
        }
    }

    /// Catalogue item by id.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownItem`] for ids not in the catalogue.
    pub fn item(&self, item_id: &str) -> Result<&ItemConfig, CoreError> {
        self.items
            .get(item_id)
            .ok_or_else(|| ValidationError::UnknownItem(item_id.to_owned()).into())
    }

    /// The catalogue with the player's ownership and unlock progress.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn listing(&self, user_id: UserId) -> Result<Vec<ShopEntry>, CoreError> {
        let inventory = self.store.inventory(user_id).await?;
        let stats = self.store.stats(user_id).await?;
        Ok(self
            .items
            .iter()
            .map(|(item_id, item)| ShopEntry {
                item_id: item_id.clone(),
                name: item.name.clone(),
                price: item.price,
                owned: inventory.get(item_id).copied().unwrap_or(0),
                max_qty: item.max_qty,
                missing: missing_requirements(&item.unlock, &stats),
            })
            .collect())
    }

    /// Buy one unit of `item_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownItem`] for unknown items, a ledger
    /// error for an unusable event id, or a store error.
    pub async fn buy(
        &self,
        user_id: UserId,
        item_id: &str,
        event_id: &str,
    ) -> Result<PurchaseOutcome, CoreError> {
        let item = self.item(item_id)?;
        let key = IdempotencyKey::for_event(event_id, "shop", item_id)?;

        if !self.economy.has_started(user_id).await? {
            return Ok(PurchaseOutcome::NotStarted);
        }

        let owned = self
            .store
            .inventory(user_id)
            .await?
            .get(item_id)
            .copied()
            .unwrap_or(0);
        if owned >= item.max_qty {
            return Ok(PurchaseOutcome::AlreadyOwned { quantity: owned });
        }

        let missing = missing_requirements(&item.unlock, &self.store.stats(user_id).await?);
        if !missing.is_empty() {
            return Ok(PurchaseOutcome::Locked { missing });
        }

        let balance = self.economy.balance(user_id).await?;
        if balance < item.price {
            return Ok(PurchaseOutcome::InsufficientFunds {
                needed: item.price.saturating_sub(balance),
            });
        }

        let order = PurchaseOrder {
            item_id: item_id.to_owned(),
            max_qty: item.max_qty,
            debit: self.economy.entry(
                user_id,
                item.price.saturating_neg(),
                &format!("shop.{item_id}"),
                &key,
            )?,
        };
        let outcome = match self.store.purchase(order).await? {
            PurchaseWrite::Bought { quantity, balance } => {
                tracing::info!(user = %user_id, item = item_id, price = item.price, balance, "Item bought");
                PurchaseOutcome::Bought { quantity, balance }
            }
            PurchaseWrite::Replayed { quantity, balance } => {
                tracing::debug!(user = %user_id, item = item_id, event_id, "Purchase already recorded");
                PurchaseOutcome::Bought { quantity, balance }
            }
            PurchaseWrite::AlreadyOwned { quantity } => PurchaseOutcome::AlreadyOwned { quantity },
            PurchaseWrite::InsufficientFunds { balance } => PurchaseOutcome::InsufficientFunds {
                needed: item.price.saturating_sub(balance),
            },
        };
        Ok(outcome)
    }

    /// Delete owned items of one user, or everyone when `None`. Money
    /// spent stays in the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn reset(&self, user_id: Option<UserId>) -> Result<u64, CoreError> {
        let removed = self.store.reset_inventory(user_id).await?;
        tracing::info!(user = ?user_id, removed, "Inventory reset");
        Ok(removed)
    }
}
