//! Clock, configuration, storage contract and game services for the LaRue
//! street-survival economy.
//!
//! Services never touch a database directly: they talk to a [`GameStore`]
//! and read time from a [`TimeSource`], both injected through
//! [`GameContext`].
//!
//! # Modules
//!
//! - [`clock`] -- Logical days with a configurable local reset hour.
//! - [`config`] -- Configuration loading from `larue-config.yaml`.
//! - [`context`] -- [`GameContext`] wiring of every service.
//! - [`economy`] -- Idempotent credit/debit facade and player start.
//! - [`equipment`] -- Aggregated bonuses of owned items.
//! - [`error`] -- [`CoreError`] and [`ValidationError`].
//! - [`hustle`] -- Beg and scavenge flows.
//! - `memory` -- In-process `GameStore` for tests (`test-utils` feature).
//! - [`quota`] -- Per-action cooldowns and daily caps.
//! - [`recycler`] -- Can packing and the daily claim state machine.
//! - [`resolvers`] -- Reward formulas and event-seeded randomness.
//! - [`respect`] -- Street cred given once a day per pair of players.
//! - [`scheduler`] -- Hourly planner and broadcast ticker loops.
//! - [`scratch`] -- Scratch tickets.
//! - [`shop`] -- The item shop.
//! - [`store`] -- The [`GameStore`] persistence contract.
//! - [`time`] -- [`TimeSource`] and its system and manual implementations.
//!
//! [`GameStore`]: store::GameStore
//! [`TimeSource`]: time::TimeSource
//! [`GameContext`]: context::GameContext
//! [`CoreError`]: error::CoreError
//! [`ValidationError`]: error::ValidationError

pub mod clock;
pub mod config;
pub mod context;
pub mod economy;
pub mod equipment;
pub mod error;
pub mod hustle;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod quota;
pub mod recycler;
pub mod resolvers;
pub mod respect;
pub mod scheduler;
pub mod scratch;
pub mod shop;
pub mod store;
pub mod time;
