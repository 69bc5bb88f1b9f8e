//! The `action_quota` table.

use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};

use larue_core::quota;
use larue_types::{ActionState, QuotaDecision, QuotaLimits, UserId};

use crate::error::DbError;
use crate::retry::{begin_immediate, finish};
use crate::rows::{u32_from_db, user_to_db};

#[derive(Debug, sqlx::FromRow)]
struct ActionRow {
    last_used_at: i64,
    day_key: String,
    count_today: i64,
}

impl ActionRow {
    fn into_state(self) -> Result<ActionState, DbError> {
        Ok(ActionState {
            last_used_at: self.last_used_at,
            day_key: self.day_key,
            count_today: u32_from_db("count_today", self.count_today)?,
        })
    }
}

/// Admit-and-consume inside one write transaction.
pub(crate) async fn check_and_consume(
    pool: &SqlitePool,
    user_id: UserId,
    action: &str,
    limits: QuotaLimits,
    now: i64,
    today: &str,
) -> Result<QuotaDecision, DbError> {
    let mut conn = begin_immediate(pool).await?;
    let result = consume_in(&mut conn, user_id, action, limits, now, today).await;
    finish(conn, result).await
}

async fn consume_in(
    conn: &mut SqliteConnection,
    user_id: UserId,
    action: &str,
    limits: QuotaLimits,
    now: i64,
    today: &str,
) -> Result<QuotaDecision, DbError> {
    let current = state(&mut *conn, user_id, action).await?;
    let (decision, next) = quota::evaluate(current.as_ref(), limits, now, today);
    if let Some(next) = next {
        sqlx::query(
            r"INSERT INTO action_quota (user_id, action, last_used_at, day_key, count_today)
              VALUES (?, ?, ?, ?, ?)
              ON CONFLICT(user_id, action) DO UPDATE SET
                  last_used_at = excluded.last_used_at,
                  day_key = excluded.day_key,
                  count_today = excluded.count_today",
        )
        .bind(user_to_db(user_id)?)
        .bind(action)
        .bind(next.last_used_at)
        .bind(&next.day_key)
        .bind(i64::from(next.count_today))
        .execute(&mut *conn)
        .await?;
    }
    Ok(decision)
}

/// Stored state of `(user, action)`.
pub(crate) async fn state<'e>(
    executor: impl SqliteExecutor<'e>,
    user_id: UserId,
    action: &str,
) -> Result<Option<ActionState>, DbError> {
    sqlx::query_as::<_, ActionRow>(
        r"SELECT last_used_at, day_key, count_today
          FROM action_quota
          WHERE user_id = ? AND action = ?",
    )
    .bind(user_to_db(user_id)?)
    .bind(action)
    .fetch_optional(executor)
    .await?
    .map(ActionRow::into_state)
    .transpose()
}

/// Delete the state of one user, or of everyone.
pub(crate) async fn reset(pool: &SqlitePool, user_id: Option<UserId>) -> Result<u64, DbError> {
    let result = match user_id {
        Some(user_id) => {
            sqlx::query("DELETE FROM action_quota WHERE user_id = ?")
                .bind(user_to_db(user_id)?)
                .execute(pool)
                .await?
        }
        None => sqlx::query("DELETE FROM action_quota").execute(pool).await?,
    };
    Ok(result.rows_affected())
}
