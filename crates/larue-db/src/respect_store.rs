//! The `respect_log` table and the `cred` column of `players`.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use larue_types::{CredRow, UserId};

use crate::error::DbError;
use crate::retry::{begin_immediate, finish};
use crate::rows::{u64_from_db, user_from_db, user_to_db};

#[derive(Debug, sqlx::FromRow)]
struct CredDbRow {
    user_id: i64,
    cred: i64,
}

/// Log one point of respect and bump the receiver's cred, in one
/// transaction. `None` when the log row already exists.
pub(crate) async fn give(
    pool: &SqlitePool,
    from: UserId,
    to: UserId,
    day: &str,
    at: DateTime<Utc>,
) -> Result<Option<u64>, DbError> {
    let mut conn = begin_immediate(pool).await?;
    let result = give_in(&mut conn, from, to, day, at).await;
    finish(conn, result).await
}

async fn give_in(
    conn: &mut SqliteConnection,
    from: UserId,
    to: UserId,
    day: &str,
    at: DateTime<Utc>,
) -> Result<Option<u64>, DbError> {
    let logged = sqlx::query(
        r"INSERT OR IGNORE INTO respect_log (user_id, from_id, day, delta, ts)
          VALUES (?, ?, ?, 1, ?)",
    )
    .bind(user_to_db(to)?)
    .bind(user_to_db(from)?)
    .bind(day)
    .bind(at.timestamp())
    .execute(&mut *conn)
    .await?;
    if logged.rows_affected() == 0 {
        return Ok(None);
    }

    let cred: i64 = sqlx::query_scalar(
        r"INSERT INTO players (user_id, cred) VALUES (?, 1)
          ON CONFLICT(user_id) DO UPDATE SET cred = cred + 1
          RETURNING cred",
    )
    .bind(user_to_db(to)?)
    .fetch_one(&mut *conn)
    .await?;
    u64_from_db("cred", cred).map(Some)
}

/// Cred of a user; 0 when unknown.
pub(crate) async fn cred(pool: &SqlitePool, user_id: UserId) -> Result<u64, DbError> {
    let cred: Option<i64> = sqlx::query_scalar("SELECT cred FROM players WHERE user_id = ?")
        .bind(user_to_db(user_id)?)
        .fetch_optional(pool)
        .await?;
    cred.map_or(Ok(0), |cred| u64_from_db("cred", cred))
}

/// Users with cred, highest first.
pub(crate) async fn top(pool: &SqlitePool, limit: u32) -> Result<Vec<CredRow>, DbError> {
    let rows = sqlx::query_as::<_, CredDbRow>(
        r"SELECT user_id, cred
          FROM players
          WHERE cred > 0
          ORDER BY cred DESC, user_id ASC
          LIMIT ?",
    )
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            user_from_db(row.user_id).and_then(|user_id| {
                u64_from_db("cred", row.cred).map(|cred| CredRow { user_id, cred })
            })
        })
        .collect()
}
