//! Write transactions and bounded retry on lock contention.
//!
//! Writes open with `BEGIN IMMEDIATE` so the write lock is taken before
//! any read; two writers can never both read and then race to upgrade.
//! When the lock stays busy past SQLite's own busy timeout, the whole
//! transaction is retried with exponential backoff.

use std::future::Future;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqlitePool};

use larue_core::store::StoreError;
use larue_types::UserId;

use crate::error::DbError;

/// Default retries after the first attempt.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base backoff.
const DEFAULT_BACKOFF_MS: u64 = 50;

/// How often and how patiently a busy transaction is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every retry.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    pub const fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub const fn delay(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(2_u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, Duration::from_millis(DEFAULT_BACKOFF_MS))
    }
}

/// A store call and what it is about, carried into retry log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Op<'a> {
    pub(crate) name: &'static str,
    pub(crate) user: Option<UserId>,
    pub(crate) action: Option<&'a str>,
    pub(crate) key: Option<&'a str>,
}

impl<'a> Op<'a> {
    pub(crate) const fn new(name: &'static str) -> Self {
        Self {
            name,
            user: None,
            action: None,
            key: None,
        }
    }

    pub(crate) const fn user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    pub(crate) const fn users(mut self, user: Option<UserId>) -> Self {
        self.user = user;
        self
    }

    pub(crate) const fn action(mut self, action: &'a str) -> Self {
        self.action = Some(action);
        self
    }

    pub(crate) const fn key(mut self, key: &'a str) -> Self {
        self.key = Some(key);
        self
    }

    fn user_id(&self) -> Option<u64> {
        self.user.map(UserId::into_inner)
    }
}

/// Check out a connection and open a write transaction on it.
pub(crate) async fn begin_immediate(pool: &SqlitePool) -> Result<PoolConnection<Sqlite>, DbError> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    Ok(conn)
}

/// Commit on success, roll back on failure. A failed commit is rolled
/// back too, so the connection never returns to the pool mid-transaction.
pub(crate) async fn finish<T>(
    mut conn: PoolConnection<Sqlite>,
    result: Result<T, DbError>,
) -> Result<T, DbError> {
    let outcome = match result {
        Ok(value) => match sqlx::query("COMMIT").execute(&mut *conn).await {
            Ok(_) => return Ok(value),
            Err(err) => DbError::from(err),
        },
        Err(err) => err,
    };
    if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
        tracing::warn!(error = %rollback, "Rollback failed");
    }
    Err(outcome)
}

/// Run `attempt` until it succeeds, fails for a reason other than lock
/// contention, or exhausts the policy. Every log line carries `op`.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    op: Op<'_>,
    mut attempt: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut retries = 0_u32;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_busy() && retries < policy.max_retries => {
                let delay = policy.delay(retries);
                retries = retries.saturating_add(1);
                tracing::warn!(
                    operation = op.name,
                    user = op.user_id(),
                    action = op.action,
                    key = op.key,
                    retry = retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Database busy, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) if err.is_busy() => {
                let attempts = retries.saturating_add(1);
                tracing::error!(
                    operation = op.name,
                    user = op.user_id(),
                    action = op.action,
                    key = op.key,
                    attempts,
                    error = %err,
                    "Database busy, giving up"
                );
                return Err(StoreError::Busy {
                    operation: op.name,
                    attempts,
                });
            }
            Err(err) => {
                tracing::error!(
                    operation = op.name,
                    user = op.user_id(),
                    action = op.action,
                    key = op.key,
                    error = %err,
                    "Database operation failed"
                );
                return Err(err.into_store(op.name));
            }
        }
    }
}
