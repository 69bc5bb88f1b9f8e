//! Configuration loading and typed config structures for the LaRue bot.
//!
//! The canonical configuration lives in `larue-config.yaml` at the project
//! root. Every field has a serde default matching the values the game
//! launched with, so an empty file is a valid configuration.

use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use larue_types::QuotaLimits;

use crate::clock::{ClockError, DayClock};

/// Action name of the beg hustle.
pub const ACTION_BEG: &str = "beg";
/// Action name of the scavenge hustle.
pub const ACTION_SCAVENGE: &str = "scavenge";
/// Action name of the scratch-ticket game.
pub const ACTION_SCRATCH: &str = "scratch";

/// Basis points in one whole.
pub const BASIS_POINTS: u32 = 10_000;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The clock section is unusable.
    #[error("invalid clock settings: {0}")]
    Clock(#[from] ClockError),

    /// A value is out of range.
    #[error("invalid config value {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

/// Top-level bot configuration, mirroring `larue-config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LarueConfig {
    /// Daily reset boundary.
    #[serde(default)]
    pub clock: ClockConfig,

    /// SQLite connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Player economy settings.
    #[serde(default)]
    pub economy: EconomyConfig,

    /// Per-action cooldowns and daily caps, keyed by action name.
    #[serde(default = "default_actions")]
    pub actions: BTreeMap<String, QuotaLimits>,

    /// Beg reward roll.
    #[serde(default)]
    pub beg: BegConfig,

    /// Scavenge outcome weights and amounts.
    #[serde(default)]
    pub scavenge: ScavengeConfig,

    /// Recycler payout curve.
    #[serde(default)]
    pub recycler: RecyclerConfig,

    /// Shop catalogue, keyed by item id.
    #[serde(default = "default_items")]
    pub items: BTreeMap<String, ItemConfig>,

    /// Scratch tickets, keyed by ticket id.
    #[serde(default = "default_scratch_tickets")]
    pub scratch_tickets: BTreeMap<String, TicketConfig>,

    /// Background loop cadence.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for LarueConfig {
    fn default() -> Self {
        Self {
            clock: ClockConfig::default(),
            database: DatabaseConfig::default(),
            economy: EconomyConfig::default(),
            actions: default_actions(),
            beg: BegConfig::default(),
            scavenge: ScavengeConfig::default(),
            recycler: RecyclerConfig::default(),
            items: default_items(),
            scratch_tickets: default_scratch_tickets(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl LarueConfig {
    /// Load configuration from a YAML file, apply environment overrides
    /// and validate the result.
    ///
    /// Environment variables override YAML values:
    /// - `DATABASE_URL` overrides `database.url`
    /// - `LARUE_TIMEZONE` overrides `clock.timezone`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or a validation error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Replace values with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("LARUE_TIMEZONE") {
            self.clock.timezone = val;
        }
    }

    /// Build the [`DayClock`] described by the `clock` section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Clock`] for an unknown zone or bad hour.
    pub fn day_clock(&self) -> Result<DayClock, ConfigError> {
        Ok(DayClock::new(&self.clock.timezone, self.clock.reset_hour)?)
    }

    /// Check cross-field constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.day_clock()?;

        if self.economy.starter_gift <= 0 {
            return Err(invalid("economy.starter_gift", "must be positive"));
        }
        for (name, limits) in &self.actions {
            if limits.daily_cap == 0 {
                return Err(invalid(format!("actions.{name}.daily_cap"), "must be at least 1"));
            }
        }
        if self.beg.min < 0 || self.beg.min > self.beg.max {
            return Err(invalid("beg", "need 0 <= min <= max"));
        }
        self.scavenge.validate()?;
        self.recycler.validate()?;

        for (id, item) in &self.items {
            if item.price <= 0 {
                return Err(invalid(format!("items.{id}.price"), "must be positive"));
            }
            if item.max_qty == 0 {
                return Err(invalid(format!("items.{id}.max_qty"), "must be at least 1"));
            }
        }
        for (id, ticket) in &self.scratch_tickets {
            if ticket.price <= 0 {
                return Err(invalid(format!("scratch_tickets.{id}.price"), "must be positive"));
            }
            if !ticket.pool.iter().any(|tier| tier.weight > Decimal::ZERO)
                || ticket.pool.iter().any(|tier| tier.weight.is_sign_negative() || tier.prize < 0)
            {
                return Err(invalid(
                    format!("scratch_tickets.{id}.pool"),
                    "needs a positive total weight and non-negative prizes",
                ));
            }
        }
        if self.database.max_connections == 0 {
            return Err(invalid("database.max_connections", "must be at least 1"));
        }
        if self.scheduler.due_batch == 0 {
            return Err(invalid("scheduler.due_batch", "must be at least 1"));
        }
        Ok(())
    }

    /// Configured limits of one action.
    pub fn action_limits(&self, action: &str) -> Option<QuotaLimits> {
        self.actions.get(action).copied()
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Daily reset boundary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClockConfig {
    /// IANA timezone name.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Local hour at which a new logical day starts.
    #[serde(default = "default_reset_hour")]
    pub reset_hour: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            reset_hour: default_reset_hour(),
        }
    }
}

/// SQLite connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL (`sqlite://path/to/file.db` or `sqlite::memory:`).
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long SQLite waits on a locked database before returning busy.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Transaction attempts after the first one when the database is busy.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff between busy retries; doubles on every attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Player economy settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EconomyConfig {
    /// Credit granted once by the start command, in cents.
    #[serde(default = "default_starter_gift")]
    pub starter_gift: i64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            starter_gift: default_starter_gift(),
        }
    }
}

/// Beg reward roll, in cents.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BegConfig {
    /// Lowest base roll.
    #[serde(default = "default_beg_min")]
    pub min: i64,

    /// Highest base roll.
    #[serde(default = "default_beg_max")]
    pub max: i64,
}

impl Default for BegConfig {
    fn default() -> Self {
        Self {
            min: default_beg_min(),
            max: default_beg_max(),
        }
    }
}

/// Scavenge outcomes and the recycler can drop that follows it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScavengeConfig {
    /// Lowest base gain, in cents.
    #[serde(default = "default_scavenge_good_min")]
    pub good_min: i64,

    /// Highest base gain, in cents.
    #[serde(default = "default_scavenge_good_max")]
    pub good_max: i64,

    /// Largest possible loss, in cents (further capped by the balance).
    #[serde(default = "default_scavenge_max_loss")]
    pub max_loss: i64,

    /// Chance of a gain, in basis points.
    #[serde(default = "default_gain_weight_bp")]
    pub gain_weight_bp: u32,

    /// Chance of nothing happening, in basis points. The rest is a loss.
    #[serde(default = "default_neutral_weight_bp")]
    pub neutral_weight_bp: u32,

    /// Chance of finding loose cans, in basis points.
    #[serde(default = "default_drop_chance_bp")]
    pub drop_chance_bp: u32,

    /// Fewest cans found.
    #[serde(default = "default_drop_min")]
    pub drop_min: u32,

    /// Most cans found (before equipment bonus).
    #[serde(default = "default_drop_max")]
    pub drop_max: u32,
}

impl Default for ScavengeConfig {
    fn default() -> Self {
        Self {
            good_min: default_scavenge_good_min(),
            good_max: default_scavenge_good_max(),
            max_loss: default_scavenge_max_loss(),
            gain_weight_bp: default_gain_weight_bp(),
            neutral_weight_bp: default_neutral_weight_bp(),
            drop_chance_bp: default_drop_chance_bp(),
            drop_min: default_drop_min(),
            drop_max: default_drop_max(),
        }
    }
}

impl ScavengeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.good_min < 0 || self.good_min > self.good_max {
            return Err(invalid("scavenge", "need 0 <= good_min <= good_max"));
        }
        if self.max_loss < 0 {
            return Err(invalid("scavenge.max_loss", "must not be negative"));
        }
        let branches = self.gain_weight_bp.checked_add(self.neutral_weight_bp);
        if branches.is_none_or(|total| total > BASIS_POINTS) {
            return Err(invalid(
                "scavenge",
                "gain_weight_bp + neutral_weight_bp must not exceed 10000",
            ));
        }
        if self.drop_chance_bp > BASIS_POINTS {
            return Err(invalid("scavenge.drop_chance_bp", "must not exceed 10000"));
        }
        if self.drop_min > self.drop_max {
            return Err(invalid("scavenge", "need drop_min <= drop_max"));
        }
        Ok(())
    }
}

/// Recycler payout curve.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecyclerConfig {
    /// Raw units per package.
    #[serde(default = "default_conv_ratio")]
    pub conv_ratio: u32,

    /// Most missed days redeemable in one claim.
    #[serde(default = "default_backlog_max_days")]
    pub backlog_max_days: u32,

    /// Streak length past which the bonus stops growing.
    #[serde(default = "default_streak_cap")]
    pub streak_cap: u32,

    /// Bonus per streak day, in basis points of the base value.
    #[serde(default = "default_streak_bonus_bp")]
    pub streak_bonus_bp: u32,

    /// Base value of one package by recycler level, in cents.
    #[serde(default = "default_base_value_by_level")]
    pub base_value_by_level: BTreeMap<u32, i64>,
}

impl Default for RecyclerConfig {
    fn default() -> Self {
        Self {
            conv_ratio: default_conv_ratio(),
            backlog_max_days: default_backlog_max_days(),
            streak_cap: default_streak_cap(),
            streak_bonus_bp: default_streak_bonus_bp(),
            base_value_by_level: default_base_value_by_level(),
        }
    }
}

impl RecyclerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.conv_ratio == 0 {
            return Err(invalid("recycler.conv_ratio", "must be at least 1"));
        }
        if self.backlog_max_days == 0 {
            return Err(invalid("recycler.backlog_max_days", "must be at least 1"));
        }
        if !self.base_value_by_level.contains_key(&1) {
            return Err(invalid("recycler.base_value_by_level", "level 1 is required"));
        }
        if self.base_value_by_level.values().any(|value| *value <= 0) {
            return Err(invalid("recycler.base_value_by_level", "values must be positive"));
        }
        Ok(())
    }
}

/// One shop item.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ItemConfig {
    /// Display name.
    pub name: String,

    /// Price in cents.
    pub price: i64,

    /// Flavour text.
    #[serde(default)]
    pub description: String,

    /// Most copies a player may own; also caps bonus stacking.
    #[serde(default = "default_max_qty")]
    pub max_qty: u32,

    /// Bonuses granted while owned.
    #[serde(default)]
    pub bonus: ItemBonus,

    /// Stat thresholds required before buying (`stat -> minimum`).
    #[serde(default)]
    pub unlock: BTreeMap<String, u64>,
}

/// Bonuses one owned copy of an item grants.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ItemBonus {
    /// Beg multiplier, compounded per copy.
    #[serde(default = "default_multiplier")]
    pub beg_mult: Decimal,

    /// Lowest flat beg bonus, summed per copy.
    #[serde(default)]
    pub beg_flat_min: i64,

    /// Highest flat beg bonus, summed per copy.
    #[serde(default)]
    pub beg_flat_max: i64,

    /// Scavenge gain multiplier, compounded per copy.
    #[serde(default = "default_multiplier")]
    pub scavenge_mult: Decimal,

    /// Lowest flat scavenge bonus, summed per copy.
    #[serde(default)]
    pub scavenge_flat_min: i64,

    /// Highest flat scavenge bonus, summed per copy.
    #[serde(default)]
    pub scavenge_flat_max: i64,

    /// Can-drop chance multiplier, compounded per copy.
    #[serde(default = "default_multiplier")]
    pub can_prob_mult: Decimal,

    /// Extra cans per drop, summed per copy.
    #[serde(default)]
    pub can_roll_bonus: u32,
}

impl Default for ItemBonus {
    fn default() -> Self {
        Self {
            beg_mult: Decimal::ONE,
            beg_flat_min: 0,
            beg_flat_max: 0,
            scavenge_mult: Decimal::ONE,
            scavenge_flat_min: 0,
            scavenge_flat_max: 0,
            can_prob_mult: Decimal::ONE,
            can_roll_bonus: 0,
        }
    }
}

/// One scratch ticket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TicketConfig {
    /// Display name.
    pub name: String,

    /// Stake in cents.
    pub price: i64,

    /// Weighted prize table.
    pub pool: Vec<PrizeTier>,
}

/// One prize with its relative weight.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PrizeTier {
    /// Prize in cents (0 means a losing ticket).
    pub prize: i64,

    /// Relative weight; any non-negative decimal.
    pub weight: Decimal,
}

/// Background loop cadence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the hourly planner runs.
    #[serde(default = "default_true")]
    pub hourly_enabled: bool,

    /// Whether the broadcast ticker runs.
    #[serde(default = "default_true")]
    pub broadcast_enabled: bool,

    /// Delay before the loops start their first pass.
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,

    /// Nominal pause between broadcast passes.
    #[serde(default = "default_broadcast_interval_secs")]
    pub broadcast_interval_secs: u64,

    /// Random spread added to or removed from the pause.
    #[serde(default = "default_broadcast_jitter_secs")]
    pub broadcast_jitter_secs: u64,

    /// Pause after a failed pass.
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,

    /// Most due events handled per pass.
    #[serde(default = "default_due_batch")]
    pub due_batch: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            hourly_enabled: true,
            broadcast_enabled: true,
            startup_delay_secs: default_startup_delay_secs(),
            broadcast_interval_secs: default_broadcast_interval_secs(),
            broadcast_jitter_secs: default_broadcast_jitter_secs(),
            error_backoff_secs: default_error_backoff_secs(),
            due_batch: default_due_batch(),
        }
    }
}

/// Logging output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_true() -> bool {
    true
}

fn default_timezone() -> String {
    "Europe/Paris".to_owned()
}

const fn default_reset_hour() -> u32 {
    8
}

fn default_database_url() -> String {
    "sqlite://data/larue.db".to_owned()
}

const fn default_max_connections() -> u32 {
    5
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_retry_backoff_ms() -> u64 {
    50
}

const fn default_starter_gift() -> i64 {
    100
}

fn default_actions() -> BTreeMap<String, QuotaLimits> {
    let mut actions = BTreeMap::new();
    actions.insert(
        ACTION_BEG.to_owned(),
        QuotaLimits {
            cooldown_seconds: 900,
            daily_cap: 10,
        },
    );
    actions.insert(
        ACTION_SCAVENGE.to_owned(),
        QuotaLimits {
            cooldown_seconds: 3_600,
            daily_cap: 5,
        },
    );
    actions.insert(
        ACTION_SCRATCH.to_owned(),
        QuotaLimits {
            cooldown_seconds: 5,
            daily_cap: 999_999,
        },
    );
    actions
}

const fn default_beg_min() -> i64 {
    5
}

const fn default_beg_max() -> i64 {
    100
}

const fn default_scavenge_good_min() -> i64 {
    50
}

const fn default_scavenge_good_max() -> i64 {
    300
}

const fn default_scavenge_max_loss() -> i64 {
    100
}

const fn default_gain_weight_bp() -> u32 {
    6_000
}

const fn default_neutral_weight_bp() -> u32 {
    3_000
}

const fn default_drop_chance_bp() -> u32 {
    6_000
}

const fn default_drop_min() -> u32 {
    8
}

const fn default_drop_max() -> u32 {
    20
}

const fn default_conv_ratio() -> u32 {
    50
}

const fn default_backlog_max_days() -> u32 {
    3
}

const fn default_streak_cap() -> u32 {
    7
}

const fn default_streak_bonus_bp() -> u32 {
    800
}

fn default_base_value_by_level() -> BTreeMap<u32, i64> {
    BTreeMap::from([(1, 120), (2, 180), (3, 260)])
}

const fn default_max_qty() -> u32 {
    1
}

const fn default_multiplier() -> Decimal {
    Decimal::ONE
}

fn default_items() -> BTreeMap<String, ItemConfig> {
    let mut items = BTreeMap::new();
    items.insert(
        "cup".to_owned(),
        ItemConfig {
            name: "Plastic cup".to_owned(),
            price: 150,
            description: "A little extra every time you beg.".to_owned(),
            max_qty: 1,
            bonus: ItemBonus {
                beg_mult: Decimal::new(115, 2),
                ..ItemBonus::default()
            },
            unlock: BTreeMap::from([("beg_count".to_owned(), 5)]),
        },
    );
    items.insert(
        "sign".to_owned(),
        ItemConfig {
            name: "Funny cardboard sign".to_owned(),
            price: 600,
            description: "People smile, then give. Every beg hits higher.".to_owned(),
            max_qty: 1,
            bonus: ItemBonus {
                beg_flat_min: 8,
                beg_flat_max: 15,
                ..ItemBonus::default()
            },
            unlock: BTreeMap::from([("beg_count".to_owned(), 20)]),
        },
    );
    items.insert(
        "dog".to_owned(),
        ItemConfig {
            name: "Street dog".to_owned(),
            price: 2_000,
            description: "More coins, better finds, more cans.".to_owned(),
            max_qty: 1,
            bonus: ItemBonus {
                beg_mult: Decimal::new(120, 2),
                scavenge_mult: Decimal::new(110, 2),
                can_prob_mult: Decimal::new(115, 2),
                can_roll_bonus: 10,
                ..ItemBonus::default()
            },
            unlock: BTreeMap::from([("scavenge_count".to_owned(), 5)]),
        },
    );
    items
}

fn tiers(pool: &[(i64, i64, u32)]) -> Vec<PrizeTier> {
    pool.iter()
        .map(|&(prize, weight, scale)| PrizeTier {
            prize,
            weight: Decimal::new(weight, scale),
        })
        .collect()
}

fn default_scratch_tickets() -> BTreeMap<String, TicketConfig> {
    let mut tickets = BTreeMap::new();
    tickets.insert(
        "micro".to_owned(),
        TicketConfig {
            name: "Micro ticket".to_owned(),
            price: 50,
            pool: tiers(&[
                (0, 65, 0),
                (10, 10, 0),
                (20, 8, 0),
                (30, 6, 0),
                (50, 4, 0),
                (100, 3, 0),
                (150, 2, 0),
                (500, 2, 0),
                (1_000, 5, 1),
            ]),
        },
    );
    tickets.insert(
        "pocket".to_owned(),
        TicketConfig {
            name: "Pocket ticket".to_owned(),
            price: 200,
            pool: tiers(&[
                (0, 70, 0),
                (50, 8, 0),
                (100, 7, 0),
                (150, 5, 0),
                (200, 4, 0),
                (400, 3, 0),
                (600, 18, 1),
                (1_000, 10, 1),
                (2_500, 6, 1),
                (5_000, 4, 1),
            ]),
        },
    );
    tickets.insert(
        "sidewalk".to_owned(),
        TicketConfig {
            name: "Sidewalk ticket".to_owned(),
            price: 500,
            pool: tiers(&[
                (0, 75, 0),
                (100, 7, 0),
                (200, 5, 0),
                (300, 4, 0),
                (500, 3, 0),
                (1_000, 25, 1),
                (1_500, 15, 1),
                (3_000, 10, 1),
                (10_000, 5, 1),
                (20_000, 3, 1),
            ]),
        },
    );
    tickets
}

const fn default_startup_delay_secs() -> u64 {
    5
}

const fn default_broadcast_interval_secs() -> u64 {
    60
}

const fn default_broadcast_jitter_secs() -> u64 {
    10
}

const fn default_error_backoff_secs() -> u64 {
    10
}

const fn default_due_batch() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = LarueConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.clock.reset_hour, 8);
        assert_eq!(config.economy.starter_gift, 100);
        assert_eq!(config.recycler.conv_ratio, 50);
        assert_eq!(config.recycler.base_value_by_level.get(&3), Some(&260));
        assert_eq!(config.items.len(), 3);
        assert_eq!(config.scratch_tickets.len(), 3);
    }

    #[test]
    fn default_action_limits() {
        let config = LarueConfig::default();
        let beg = config.action_limits(ACTION_BEG).unwrap();
        assert_eq!((beg.cooldown_seconds, beg.daily_cap), (900, 10));
        let scavenge = config.action_limits(ACTION_SCAVENGE).unwrap();
        assert_eq!((scavenge.cooldown_seconds, scavenge.daily_cap), (3_600, 5));
        assert!(config.action_limits("dance").is_none());
    }

    #[test]
    fn empty_yaml_uses_defaults() {
        assert_eq!(LarueConfig::parse("").unwrap(), LarueConfig::default());
        assert_eq!(LarueConfig::parse("{}").unwrap(), LarueConfig::default());
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let shipped = include_str!("../../../larue-config.yaml");
        assert_eq!(LarueConfig::parse(shipped).unwrap(), LarueConfig::default());
    }

    #[test]
    fn parse_partial_yaml() {
        let yaml = r#"
clock:
  timezone: "America/Montreal"
  reset_hour: 6

database:
  url: "sqlite::memory:"
  max_retries: 5

actions:
  beg:
    cooldown_seconds: 60
    daily_cap: 3

recycler:
  streak_bonus_bp: 1000
  base_value_by_level:
    1: 100
    2: 150

items:
  hat:
    name: "Old hat"
    price: 300
    bonus:
      beg_mult: 1.05
    unlock:
      beg_count: 2

scratch_tickets:
  coin:
    name: "Coin flip"
    price: 10
    pool:
      - { prize: 0, weight: 1 }
      - { prize: 20, weight: 0.5 }

logging:
  level: "debug"
  json: true
"#;
        let config = LarueConfig::parse(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.clock.timezone, "America/Montreal");
        assert_eq!(config.database.max_retries, 5);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.actions.len(), 1);
        assert_eq!(config.recycler.streak_bonus_bp, 1_000);
        assert_eq!(config.recycler.conv_ratio, 50);

        let hat = config.items.get("hat").unwrap();
        assert_eq!(hat.bonus.beg_mult, Decimal::new(105, 2));
        assert_eq!(hat.bonus.scavenge_mult, Decimal::ONE);
        assert_eq!(hat.max_qty, 1);

        let coin = config.scratch_tickets.get("coin").unwrap();
        assert_eq!(coin.pool.get(1).map(|tier| tier.weight), Some(Decimal::new(5, 1)));
        assert!(config.logging.json);
    }

    #[test]
    fn rejects_unknown_timezone() {
        let config = LarueConfig::parse("clock:\n  timezone: \"Nowhere/Town\"\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Clock(_))));
    }

    #[test]
    fn rejects_overweight_scavenge_branches() {
        let yaml = "scavenge:\n  gain_weight_bp: 8000\n  neutral_weight_bp: 3000\n";
        let config = LarueConfig::parse(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn rejects_zero_conv_ratio() {
        let config = LarueConfig::parse("recycler:\n  conv_ratio: 0\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == "recycler.conv_ratio"
        ));
    }

    #[test]
    fn rejects_zero_daily_cap() {
        let yaml = "actions:\n  beg:\n    cooldown_seconds: 1\n    daily_cap: 0\n";
        let config = LarueConfig::parse(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(matches!(
            LarueConfig::parse("clock: [unclosed"),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
