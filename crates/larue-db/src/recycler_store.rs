//! The `recycler_state` and `recycler_claims` tables.

use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};

use larue_core::recycler;
use larue_core::store::{ClaimReceipt, ClaimRequest, total_payout};
use larue_types::{ClaimLogEntry, PackOutcome, RecyclerState, UserId};

use crate::error::DbError;
use crate::ledger_store;
use crate::retry::{begin_immediate, finish};
use crate::rows::{day_from_db, day_to_db, time_from_db, u32_from_db, user_from_db, user_to_db};

#[derive(Debug, sqlx::FromRow)]
struct StateRow {
    level: i64,
    raw_units: i64,
    packaged_units: i64,
    streak_days: i64,
    last_claim_day: i64,
}

impl StateRow {
    fn into_state(self) -> Result<RecyclerState, DbError> {
        Ok(RecyclerState {
            level: u32_from_db("level", self.level)?,
            raw_units: u32_from_db("raw_units", self.raw_units)?,
            packaged_units: u32_from_db("packaged_units", self.packaged_units)?,
            streak_days: u32_from_db("streak_days", self.streak_days)?,
            last_claim_day: day_from_db(self.last_claim_day)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ClaimRow {
    user_id: i64,
    day_key: i64,
    packages_used: i64,
    payout: i64,
    ts: i64,
}

impl ClaimRow {
    fn into_entry(self) -> Result<ClaimLogEntry, DbError> {
        Ok(ClaimLogEntry {
            user_id: user_from_db(self.user_id)?,
            day: day_from_db(self.day_key)?
                .ok_or_else(|| DbError::Corrupt("claim row without day".to_owned()))?,
            packages_used: u32_from_db("packages_used", self.packages_used)?,
            payout: self.payout,
            created_at: time_from_db("claim ts", self.ts)?,
        })
    }
}

/// Stored state, defaulted for users without a row.
pub(crate) async fn load<'e>(
    executor: impl SqliteExecutor<'e>,
    user_id: UserId,
) -> Result<RecyclerState, DbError> {
    sqlx::query_as::<_, StateRow>(
        r"SELECT level, raw_units, packaged_units, streak_days, last_claim_day
          FROM recycler_state
          WHERE user_id = ?",
    )
    .bind(user_to_db(user_id)?)
    .fetch_optional(executor)
    .await?
    .map_or_else(|| Ok(RecyclerState::default()), StateRow::into_state)
}

async fn save(
    conn: &mut SqliteConnection,
    user_id: UserId,
    state: &RecyclerState,
) -> Result<(), DbError> {
    sqlx::query(
        r"INSERT INTO recycler_state
              (user_id, level, raw_units, packaged_units, streak_days, last_claim_day)
          VALUES (?, ?, ?, ?, ?, ?)
          ON CONFLICT(user_id) DO UPDATE SET
              level = excluded.level,
              raw_units = excluded.raw_units,
              packaged_units = excluded.packaged_units,
              streak_days = excluded.streak_days,
              last_claim_day = excluded.last_claim_day",
    )
    .bind(user_to_db(user_id)?)
    .bind(i64::from(state.level))
    .bind(i64::from(state.raw_units))
    .bind(i64::from(state.packaged_units))
    .bind(i64::from(state.streak_days))
    .bind(day_to_db(state.last_claim_day)?)
    .execute(conn)
    .await?;
    Ok(())
}

/// Add loose units to a user's recycler.
pub(crate) async fn add_raw_units(
    pool: &SqlitePool,
    user_id: UserId,
    units: u32,
) -> Result<RecyclerState, DbError> {
    let mut conn = begin_immediate(pool).await?;
    let result = add_in(&mut conn, user_id, units).await;
    finish(conn, result).await
}

async fn add_in(
    conn: &mut SqliteConnection,
    user_id: UserId,
    units: u32,
) -> Result<RecyclerState, DbError> {
    let mut state = load(&mut *conn, user_id).await?;
    state.raw_units = state.raw_units.saturating_add(units);
    save(conn, user_id, &state).await?;
    Ok(state)
}

/// Convert raw units into packages.
pub(crate) async fn pack(
    pool: &SqlitePool,
    user_id: UserId,
    desired: Option<u32>,
    conv_ratio: u32,
) -> Result<(PackOutcome, RecyclerState), DbError> {
    let mut conn = begin_immediate(pool).await?;
    let result = pack_in(&mut conn, user_id, desired, conv_ratio).await;
    finish(conn, result).await
}

async fn pack_in(
    conn: &mut SqliteConnection,
    user_id: UserId,
    desired: Option<u32>,
    conv_ratio: u32,
) -> Result<(PackOutcome, RecyclerState), DbError> {
    let mut state = load(&mut *conn, user_id).await?;
    let outcome = recycler::pack(&mut state, desired, conv_ratio);
    if outcome.packages_made > 0 {
        save(conn, user_id, &state).await?;
    }
    Ok((outcome, state))
}

/// Redeem pending days. The state update, the claim rows and the payout
/// credit commit together or not at all.
pub(crate) async fn claim(pool: &SqlitePool, request: &ClaimRequest) -> Result<ClaimReceipt, DbError> {
    let mut conn = begin_immediate(pool).await?;
    let result = claim_in(&mut conn, request).await;
    finish(conn, result).await
}

async fn claim_in(
    conn: &mut SqliteConnection,
    request: &ClaimRequest,
) -> Result<ClaimReceipt, DbError> {
    let mut state = load(&mut *conn, request.user_id).await?;
    let days = recycler::claim(
        &mut state,
        request.requested_days,
        request.today,
        &request.rules,
    );
    if days.is_empty() {
        return Ok(ClaimReceipt::empty(state));
    }

    let entry = request.payout_entry(&days)?;
    for row in request.log_rows(&days) {
        sqlx::query(
            r"INSERT OR IGNORE INTO recycler_claims (user_id, day_key, packages_used, payout, ts)
              VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_to_db(row.user_id)?)
        .bind(day_to_db(Some(row.day))?)
        .bind(i64::from(row.packages_used))
        .bind(row.payout)
        .bind(row.created_at.timestamp())
        .execute(&mut *conn)
        .await?;
    }
    save(&mut *conn, request.user_id, &state).await?;

    let credit = match entry {
        Some(entry) => Some(ledger_store::insert(conn, &entry).await?),
        None => None,
    };

    Ok(ClaimReceipt {
        total_payout: total_payout(&days),
        days,
        state,
        credit,
    })
}

/// Claim audit rows of a user, oldest day first.
pub(crate) async fn claim_log(
    pool: &SqlitePool,
    user_id: UserId,
) -> Result<Vec<ClaimLogEntry>, DbError> {
    sqlx::query_as::<_, ClaimRow>(
        r"SELECT user_id, day_key, packages_used, payout, ts
          FROM recycler_claims
          WHERE user_id = ?
          ORDER BY day_key ASC",
    )
    .bind(user_to_db(user_id)?)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(ClaimRow::into_entry)
    .collect()
}

/// Delete recycler state of one user, or of everyone. Claim rows stay.
pub(crate) async fn reset(pool: &SqlitePool, user_id: Option<UserId>) -> Result<u64, DbError> {
    let result = match user_id {
        Some(user_id) => {
            sqlx::query("DELETE FROM recycler_state WHERE user_id = ?")
                .bind(user_to_db(user_id)?)
                .execute(pool)
                .await?
        }
        None => sqlx::query("DELETE FROM recycler_state").execute(pool).await?,
    };
    Ok(result.rows_affected())
}
