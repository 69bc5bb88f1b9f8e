//! Scratch tickets.
//!
//! The prize is drawn from an RNG seeded by the event id, so a retried
//! command reproduces the same draw and the stake and prize keys replay
//! instead of paying twice.

use std::collections::BTreeMap;
use std::sync::Arc;

use larue_ledger::IdempotencyKey;
use larue_types::{QuotaDecision, UserId};

use crate::config::{ACTION_SCRATCH, TicketConfig};
use crate::economy::Economy;
use crate::error::{CoreError, ValidationError};
use crate::quota::Quota;
use crate::resolvers::{pick_prize, rng_for_event};
use crate::store::GameStore;

/// Stat counting scratched tickets.
pub const STAT_SCRATCH_COUNT: &str = "scratch_count";

/// Result of a scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScratchOutcome {
    /// The player never ran the start command.
    NotStarted,
    /// Throttled by the quota engine.
    Denied(QuotaDecision),
    /// The balance does not cover the ticket.
    InsufficientFunds {
        /// Ticket price.
        price: i64,
        /// Current balance.
        balance: i64,
    },
    /// The ticket was scratched.
    Played {
        /// Stake paid.
        price: i64,
        /// Prize won; 0 on a losing ticket.
        prize: i64,
        /// Balance afterwards.
        balance: i64,
    },
}

/// Scratch-ticket service.
#[derive(Clone)]
pub struct Scratch {
    store: Arc<dyn GameStore>,
    economy: Economy,
    quota: Quota,
    tickets: Arc<BTreeMap<String, TicketConfig>>,
}

impl Scratch {
    /// Create the service.
    pub fn new(
        store: Arc<dyn GameStore>,
        economy: Economy,
        quota: Quota,
        tickets: BTreeMap<String, TicketConfig>,
    ) -> Self {
        Self {
            store,
            economy,
            quota,
            tickets: Arc::new(tickets),
        }
    }

    /// The ticket catalogue.
    pub fn tickets(&self) -> &BTreeMap<String, TicketConfig> {
        &self.tickets
    }

    /// Buy and scratch one ticket.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownTicket`] for unknown tickets, a
    /// ledger error for an unusable event id, or a store error.
    pub async fn play(
        &self,
        user_id: UserId,
        ticket_id: &str,
        event_id: &str,
    ) -> Result<ScratchOutcome, CoreError> {
        let ticket = self
            .tickets
            .get(ticket_id)
            .ok_or_else(|| ValidationError::UnknownTicket(ticket_id.to_owned()))?;
        let stake_key = IdempotencyKey::for_event(event_id, ACTION_SCRATCH, "stake")?;
        let prize_key = IdempotencyKey::for_event(event_id, ACTION_SCRATCH, "prize")?;

        if !self.economy.has_started(user_id).await? {
            return Ok(ScratchOutcome::NotStarted);
        }
        let decision = self.quota.check(user_id, ACTION_SCRATCH).await?;
        if !decision.admitted {
            return Ok(ScratchOutcome::Denied(decision));
        }
        let balance = self.economy.balance(user_id).await?;
        if balance < ticket.price {
            return Ok(ScratchOutcome::InsufficientFunds {
                price: ticket.price,
                balance,
            });
        }

        let mut rng = rng_for_event(event_id, ACTION_SCRATCH);
        let prize = pick_prize(&mut rng, &ticket.pool);

        let mut entries = vec![self.economy.entry(
            user_id,
            ticket.price.saturating_neg(),
            &format!("scratch.{ticket_id}.stake"),
            &stake_key,
        )?];
        if prize > 0 {
            entries.push(self.economy.entry(
                user_id,
                prize,
                &format!("scratch.{ticket_id}.prize"),
                &prize_key,
            )?);
        }
        let results = self.store.apply_entries(entries).await?;
        let stake_applied = results.first().is_some_and(|result| result.applied);
        let balance = results.last().map_or(balance, |result| result.balance);

        if stake_applied {
            self.store.increment_stat(user_id, STAT_SCRATCH_COUNT, 1).await?;
        }
        tracing::info!(
            user = %user_id,
            ticket = ticket_id,
            event_id,
            price = ticket.price,
            prize,
            balance,
            replayed = !stake_applied,
            "Ticket scratched"
        );

        Ok(ScratchOutcome::Played {
            price: ticket.price,
            prize,
            balance,
        })
    }
}
