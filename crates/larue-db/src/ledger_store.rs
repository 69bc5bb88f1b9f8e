//! The `ledger_entries` table and the `players` mirror.
//!
//! `(user_id, key)` is the primary key: `INSERT OR IGNORE` is the whole
//! idempotency mechanism, and a concurrent duplicate simply inserts
//! nothing.

use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};

use larue_types::{ApplyResult, LeaderboardRow, LedgerEntry, PlayerRecord, UserId};

use crate::error::DbError;
use crate::retry::{begin_immediate, finish};
use crate::rows::{time_from_db, u64_from_db, user_from_db, user_to_db};

/// A row of `ledger_entries`.
#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    user_id: i64,
    key: String,
    delta: i64,
    reason: String,
    ts: i64,
}

impl EntryRow {
    fn into_entry(self) -> Result<LedgerEntry, DbError> {
        Ok(LedgerEntry {
            user_id: user_from_db(self.user_id)?,
            key: self.key,
            delta: self.delta,
            reason: self.reason,
            created_at: time_from_db("ledger ts", self.ts)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BalanceRow {
    user_id: i64,
    balance: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct PlayerRow {
    user_id: i64,
    has_started: bool,
    legacy_money: i64,
}

/// Insert `entry` unless its key was seen, inside the caller's
/// transaction. Newly applied deltas are mirrored into `players`.
pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    entry: &LedgerEntry,
) -> Result<ApplyResult, DbError> {
    let user = user_to_db(entry.user_id)?;
    let applied = sqlx::query(
        r"INSERT OR IGNORE INTO ledger_entries (user_id, key, delta, reason, ts)
          VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user)
    .bind(&entry.key)
    .bind(entry.delta)
    .bind(&entry.reason)
    .bind(entry.created_at.timestamp())
    .execute(&mut *conn)
    .await?
    .rows_affected()
        > 0;

    if applied {
        sqlx::query(
            r"INSERT INTO players (user_id, has_started, legacy_money) VALUES (?, 0, ?)
              ON CONFLICT(user_id) DO UPDATE SET legacy_money = legacy_money + excluded.legacy_money",
        )
        .bind(user)
        .bind(entry.delta)
        .execute(&mut *conn)
        .await?;
    }

    Ok(ApplyResult {
        applied,
        balance: balance(&mut *conn, entry.user_id).await?,
    })
}

/// Apply one entry in its own transaction.
pub(crate) async fn apply(pool: &SqlitePool, entry: &LedgerEntry) -> Result<ApplyResult, DbError> {
    let mut conn = begin_immediate(pool).await?;
    let result = insert(&mut conn, entry).await;
    finish(conn, result).await
}

/// Apply a batch atomically, in order.
pub(crate) async fn apply_all(
    pool: &SqlitePool,
    entries: &[LedgerEntry],
) -> Result<Vec<ApplyResult>, DbError> {
    let mut conn = begin_immediate(pool).await?;
    let result = insert_all(&mut conn, entries).await;
    finish(conn, result).await
}

async fn insert_all(
    conn: &mut SqliteConnection,
    entries: &[LedgerEntry],
) -> Result<Vec<ApplyResult>, DbError> {
    let mut results = Vec::with_capacity(entries.len());
    for entry in entries {
        results.push(insert(conn, entry).await?);
    }
    Ok(results)
}

/// Whether `(user, key)` exists.
pub(crate) async fn contains<'e>(
    executor: impl SqliteExecutor<'e>,
    user_id: UserId,
    key: &str,
) -> Result<bool, DbError> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM ledger_entries WHERE user_id = ? AND key = ?")
            .bind(user_to_db(user_id)?)
            .bind(key)
            .fetch_optional(executor)
            .await?;
    Ok(found.is_some())
}

/// Sum of a user's entries; 0 when there are none.
pub(crate) async fn balance<'e>(
    executor: impl SqliteExecutor<'e>,
    user_id: UserId,
) -> Result<i64, DbError> {
    let balance: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(delta), 0) FROM ledger_entries WHERE user_id = ?")
            .bind(user_to_db(user_id)?)
            .fetch_one(executor)
            .await?;
    Ok(balance)
}

/// Richest users, ties by ascending user id.
pub(crate) async fn top(pool: &SqlitePool, limit: u32) -> Result<Vec<LeaderboardRow>, DbError> {
    let rows = sqlx::query_as::<_, BalanceRow>(
        r"SELECT user_id, COALESCE(SUM(delta), 0) AS balance
          FROM ledger_entries
          GROUP BY user_id
          ORDER BY balance DESC, user_id ASC
          LIMIT ?",
    )
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            user_from_db(row.user_id).map(|user_id| LeaderboardRow {
                user_id,
                balance: row.balance,
            })
        })
        .collect()
}

/// Most recent entries of a user.
pub(crate) async fn history(
    pool: &SqlitePool,
    user_id: UserId,
    limit: u32,
) -> Result<Vec<LedgerEntry>, DbError> {
    let rows = sqlx::query_as::<_, EntryRow>(
        r"SELECT user_id, key, delta, reason, ts
          FROM ledger_entries
          WHERE user_id = ?
          ORDER BY ts DESC, rowid DESC
          LIMIT ?",
    )
    .bind(user_to_db(user_id)?)
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(EntryRow::into_entry).collect()
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

/// Flag the player as started and apply the gift, unless already started.
pub(crate) async fn start_player(
    pool: &SqlitePool,
    gift: &LedgerEntry,
) -> Result<Option<ApplyResult>, DbError> {
    let mut conn = begin_immediate(pool).await?;
    let result = start_in(&mut conn, gift).await;
    finish(conn, result).await
}

async fn start_in(
    conn: &mut SqliteConnection,
    gift: &LedgerEntry,
) -> Result<Option<ApplyResult>, DbError> {
    let user = user_to_db(gift.user_id)?;
    let started: Option<bool> =
        sqlx::query_scalar("SELECT has_started FROM players WHERE user_id = ?")
            .bind(user)
            .fetch_optional(&mut *conn)
            .await?;
    if started == Some(true) {
        return Ok(None);
    }

    sqlx::query(
        r"INSERT INTO players (user_id, has_started) VALUES (?, 1)
          ON CONFLICT(user_id) DO UPDATE SET has_started = 1",
    )
    .bind(user)
    .execute(&mut *conn)
    .await?;

    insert(conn, gift).await.map(Some)
}

pub(crate) async fn player(
    pool: &SqlitePool,
    user_id: UserId,
) -> Result<Option<PlayerRecord>, DbError> {
    let row = sqlx::query_as::<_, PlayerRow>(
        "SELECT user_id, has_started, legacy_money FROM players WHERE user_id = ?",
    )
    .bind(user_to_db(user_id)?)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        user_from_db(row.user_id).map(|user_id| PlayerRecord {
            user_id,
            has_started: row.has_started,
            legacy_money: row.legacy_money,
        })
    })
    .transpose()
}

pub(crate) async fn count_players(pool: &SqlitePool) -> Result<u64, DbError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM players")
        .fetch_one(pool)
        .await?;
    u64_from_db("player count", count)
}
