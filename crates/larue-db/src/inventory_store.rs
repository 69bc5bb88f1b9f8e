//! The `inventory` and `stats` tables, and purchases across them.

use std::collections::BTreeMap;

use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};

use larue_core::store::{PurchaseOrder, PurchaseWrite};
use larue_types::UserId;

use crate::error::DbError;
use crate::ledger_store;
use crate::retry::{begin_immediate, finish};
use crate::rows::{u32_from_db, u64_from_db, u64_to_db, user_to_db};

#[derive(Debug, sqlx::FromRow)]
struct CountRow {
    name: String,
    value: i64,
}

/// Items with a positive quantity.
pub(crate) async fn inventory(
    pool: &SqlitePool,
    user_id: UserId,
) -> Result<BTreeMap<String, u32>, DbError> {
    sqlx::query_as::<_, CountRow>(
        "SELECT item_id AS name, qty AS value FROM inventory WHERE user_id = ? AND qty > 0",
    )
    .bind(user_to_db(user_id)?)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| u32_from_db("qty", row.value).map(|qty| (row.name, qty)))
    .collect()
}

async fn owned<'e>(
    executor: impl SqliteExecutor<'e>,
    user_id: UserId,
    item_id: &str,
) -> Result<u32, DbError> {
    let qty: Option<i64> =
        sqlx::query_scalar("SELECT qty FROM inventory WHERE user_id = ? AND item_id = ?")
            .bind(user_to_db(user_id)?)
            .bind(item_id)
            .fetch_optional(executor)
            .await?;
    qty.map_or(Ok(0), |qty| u32_from_db("qty", qty))
}

/// Every counter of a user.
pub(crate) async fn stats(
    pool: &SqlitePool,
    user_id: UserId,
) -> Result<BTreeMap<String, u64>, DbError> {
    sqlx::query_as::<_, CountRow>("SELECT key AS name, value FROM stats WHERE user_id = ?")
        .bind(user_to_db(user_id)?)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| u64_from_db("stat", row.value).map(|value| (row.name, value)))
        .collect()
}

/// Add `by` to a counter, creating it at zero first.
pub(crate) async fn increment_stat(
    pool: &SqlitePool,
    user_id: UserId,
    stat: &str,
    by: u64,
) -> Result<u64, DbError> {
    let value: i64 = sqlx::query_scalar(
        r"INSERT INTO stats (user_id, key, value) VALUES (?, ?, ?)
          ON CONFLICT(user_id, key) DO UPDATE SET value = value + excluded.value
          RETURNING value",
    )
    .bind(user_to_db(user_id)?)
    .bind(stat)
    .bind(u64_to_db("stat increment", by)?)
    .fetch_one(pool)
    .await?;
    u64_from_db("stat", value)
}

/// Debit and grant one copy, re-checking replay, cap and funds under the
/// write lock.
pub(crate) async fn purchase(
    pool: &SqlitePool,
    order: &PurchaseOrder,
) -> Result<PurchaseWrite, DbError> {
    let mut conn = begin_immediate(pool).await?;
    let result = purchase_in(&mut conn, order).await;
    finish(conn, result).await
}

async fn purchase_in(
    conn: &mut SqliteConnection,
    order: &PurchaseOrder,
) -> Result<PurchaseWrite, DbError> {
    let user_id = order.user_id();
    let have = owned(&mut *conn, user_id, &order.item_id).await?;
    let replayed = ledger_store::contains(&mut *conn, user_id, &order.debit.key).await?;
    let balance = ledger_store::balance(&mut *conn, user_id).await?;
    if let Some(outcome) = order.precheck(replayed, have, balance) {
        return Ok(outcome);
    }

    let result = ledger_store::insert(&mut *conn, &order.debit).await?;
    let quantity = have.saturating_add(1);
    sqlx::query(
        r"INSERT INTO inventory (user_id, item_id, qty) VALUES (?, ?, ?)
          ON CONFLICT(user_id, item_id) DO UPDATE SET qty = excluded.qty",
    )
    .bind(user_to_db(user_id)?)
    .bind(&order.item_id)
    .bind(i64::from(quantity))
    .execute(conn)
    .await?;

    Ok(PurchaseWrite::Bought {
        quantity,
        balance: result.balance,
    })
}

/// Delete owned items of one user or everyone.
pub(crate) async fn reset_inventory(
    pool: &SqlitePool,
    user_id: Option<UserId>,
) -> Result<u64, DbError> {
    let result = match user_id {
        Some(user_id) => {
            sqlx::query("DELETE FROM inventory WHERE user_id = ?")
                .bind(user_to_db(user_id)?)
                .execute(pool)
                .await?
        }
        None => sqlx::query("DELETE FROM inventory").execute(pool).await?,
    };
    Ok(result.rows_affected())
}

/// Delete counters of one user or everyone.
pub(crate) async fn reset_stats(pool: &SqlitePool, user_id: Option<UserId>) -> Result<u64, DbError> {
    let result = match user_id {
        Some(user_id) => {
            sqlx::query("DELETE FROM stats WHERE user_id = ?")
                .bind(user_to_db(user_id)?)
                .execute(pool)
                .await?
        }
        None => sqlx::query("DELETE FROM stats").execute(pool).await?,
    };
    Ok(result.rows_affected())
}
