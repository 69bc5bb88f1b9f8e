//! SQLite connection pool and configuration.
//!
//! File databases run in WAL mode with a busy timeout so readers never
//! block the single writer. Uses [`sqlx`] with runtime query construction
//! (not compile-time checked) to avoid requiring a database at build time.
//! All queries are parameterized.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use larue_core::config::DatabaseConfig;

use crate::error::DbError;
use crate::retry::RetryPolicy;
use crate::store::SqliteStore;

/// Default maximum number of connections in the pool.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// URL of a private in-memory database.
const MEMORY_URL: &str = "sqlite::memory:";

/// Configuration for the SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// SQLite URL.
    ///
    /// Format: `sqlite://path/to/file.db` or `sqlite::memory:`
    pub url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// How long SQLite waits on a locked database before reporting busy.
    pub busy_timeout: Duration,
    /// Retry policy for busy transactions.
    pub retry: RetryPolicy,
}

impl SqliteConfig {
    /// Create a new configuration from a database URL.
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            retry: RetryPolicy::default(),
        }
    }

    /// Build from the `database` section of the game configuration.
    pub fn from_database(config: &DatabaseConfig) -> Self {
        Self::new(&config.url)
            .with_max_connections(config.max_connections)
            .with_busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .with_retry(RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.retry_backoff_ms),
            ))
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub const fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the busy timeout.
    #[must_use]
    pub const fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Connection pool handle to SQLite.
#[derive(Clone)]
pub struct SqlitePool {
    pool: sqlx::SqlitePool,
    retry: RetryPolicy,
}

impl SqlitePool {
    /// Connect using the provided configuration, creating the database
    /// file (and its directory) when missing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed and
    /// [`DbError::Sqlite`] if the connection fails.
    pub async fn connect(config: &SqliteConfig) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| DbError::Config(format!("Invalid database URL: {e}")))?;
        let in_memory = config.url.contains(":memory:");

        let options = options
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let pool = if in_memory {
            // Every connection to :memory: is a separate database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            ensure_parent_dir(options.get_filename()).await?;
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options.journal_mode(SqliteJournalMode::Wal))
                .await?
        };

        tracing::info!(
            max_connections = config.max_connections,
            in_memory,
            "Connected to SQLite"
        );

        Ok(Self {
            pool,
            retry: config.retry,
        })
    }

    /// Connect using a database URL string with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection fails.
    pub async fn connect_url(url: &str) -> Result<Self, DbError> {
        Self::connect(&SqliteConfig::new(url)).await
    }

    /// A fresh private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection fails.
    pub async fn in_memory() -> Result<Self, DbError> {
        Self::connect_url(MEMORY_URL).await
    }

    /// Run all pending migrations from the `migrations/` directory.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Migration`] if any migration fails.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    /// Return a reference to the underlying [`sqlx::SqlitePool`].
    pub const fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }

    /// The [`GameStore`](larue_core::store::GameStore) over this pool.
    pub fn store(&self) -> SqliteStore {
        SqliteStore::new(self.pool.clone(), self.retry)
    }

    /// Close all connections in the pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("SQLite pool closed");
    }
}

async fn ensure_parent_dir(file: &Path) -> Result<(), DbError> {
    match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| DbError::Config(format!("Cannot create {}: {e}", dir.display()))),
        _ => Ok(()),
    }
}
