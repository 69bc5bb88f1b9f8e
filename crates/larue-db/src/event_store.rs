//! The `events` and `broadcast_log` tables.
//!
//! Times are unix seconds; `ends_at = 0` means the event has no end.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};

use larue_types::{BroadcastRecord, EventStatus, ScheduledEvent};

use crate::error::DbError;
use crate::retry::{begin_immediate, finish};
use crate::rows::time_from_db;

const EVENT_COLUMNS: &str = "id, kind, title, starts_at, ends_at, payload, status, jump_url";

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: String,
    kind: String,
    title: String,
    starts_at: i64,
    ends_at: i64,
    payload: String,
    status: String,
    jump_url: String,
}

impl EventRow {
    fn into_event(self) -> Result<ScheduledEvent, DbError> {
        let status = EventStatus::parse(&self.status)
            .ok_or_else(|| DbError::Corrupt(format!("event {} status {}", self.id, self.status)))?;
        let payload = serde_json::from_str(&self.payload)
            .map_err(|err| DbError::Corrupt(format!("event {} payload: {err}", self.id)))?;
        let ends_at = match self.ends_at {
            0 => None,
            secs => Some(time_from_db("ends_at", secs)?),
        };
        Ok(ScheduledEvent {
            starts_at: time_from_db("starts_at", self.starts_at)?,
            ends_at,
            payload,
            status,
            id: self.id,
            kind: self.kind,
            title: self.title,
            jump_url: self.jump_url,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BroadcastRow {
    event_key: String,
    destination: String,
    message_id: String,
    jump_url: String,
}

impl From<BroadcastRow> for BroadcastRecord {
    fn from(row: BroadcastRow) -> Self {
        Self {
            event_key: row.event_key,
            destination: row.destination,
            message_id: row.message_id,
            jump_url: row.jump_url,
        }
    }
}

fn decode_all(rows: Vec<EventRow>) -> Result<Vec<ScheduledEvent>, DbError> {
    rows.into_iter().map(EventRow::into_event).collect()
}

/// Insert an event, or refresh kind, title, window and payload of an
/// existing one. Status and link are left alone.
pub(crate) async fn upsert(
    pool: &SqlitePool,
    event: &ScheduledEvent,
) -> Result<ScheduledEvent, DbError> {
    let mut conn = begin_immediate(pool).await?;
    let result = upsert_in(&mut conn, event).await;
    finish(conn, result).await
}

async fn upsert_in(
    conn: &mut SqliteConnection,
    event: &ScheduledEvent,
) -> Result<ScheduledEvent, DbError> {
    sqlx::query(
        r"INSERT INTO events
              (id, kind, title, starts_at, ends_at, payload, status, jump_url, created_at)
          VALUES (?, ?, ?, ?, ?, ?, ?, ?, CAST(strftime('%s', 'now') AS INTEGER))
          ON CONFLICT(id) DO UPDATE SET
              kind = excluded.kind,
              title = excluded.title,
              starts_at = excluded.starts_at,
              ends_at = excluded.ends_at,
              payload = excluded.payload",
    )
    .bind(&event.id)
    .bind(&event.kind)
    .bind(&event.title)
    .bind(event.starts_at.timestamp())
    .bind(event.ends_at.map_or(0, |ends_at| ends_at.timestamp()))
    .bind(event.payload.to_string())
    .bind(event.status.as_str())
    .bind(&event.jump_url)
    .execute(&mut *conn)
    .await?;

    get(conn, &event.id)
        .await?
        .ok_or_else(|| DbError::Corrupt(format!("event {} vanished after upsert", event.id)))
}

/// One event by id.
pub(crate) async fn get<'e>(
    executor: impl SqliteExecutor<'e>,
    id: &str,
) -> Result<Option<ScheduledEvent>, DbError> {
    sqlx::query_as::<_, EventRow>(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?"))
        .bind(id)
        .fetch_optional(executor)
        .await?
        .map(EventRow::into_event)
        .transpose()
}

/// Scheduled events whose start has passed, oldest first.
pub(crate) async fn due(
    pool: &SqlitePool,
    now: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<ScheduledEvent>, DbError> {
    let rows = sqlx::query_as::<_, EventRow>(&format!(
        r"SELECT {EVENT_COLUMNS} FROM events
          WHERE status = 'scheduled' AND starts_at > 0 AND starts_at <= ?
          ORDER BY starts_at ASC
          LIMIT ?"
    ))
    .bind(now.timestamp())
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;
    decode_all(rows)
}

/// Published events that have not ended, newest first.
pub(crate) async fn recent(
    pool: &SqlitePool,
    now: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<ScheduledEvent>, DbError> {
    let rows = sqlx::query_as::<_, EventRow>(&format!(
        r"SELECT {EVENT_COLUMNS} FROM events
          WHERE status = 'published' AND (ends_at = 0 OR ends_at >= ?)
          ORDER BY starts_at DESC
          LIMIT ?"
    ))
    .bind(now.timestamp())
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;
    decode_all(rows)
}

/// Flag an event as published and store its link.
pub(crate) async fn mark_published(
    pool: &SqlitePool,
    id: &str,
    jump_url: &str,
) -> Result<bool, DbError> {
    let result = sqlx::query("UPDATE events SET status = 'published', jump_url = ? WHERE id = ?")
        .bind(jump_url)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// The broadcast row of an event key.
pub(crate) async fn broadcast(
    pool: &SqlitePool,
    event_key: &str,
) -> Result<Option<BroadcastRecord>, DbError> {
    let row = sqlx::query_as::<_, BroadcastRow>(
        r"SELECT event_key, destination, message_id, jump_url
          FROM broadcast_log
          WHERE event_key = ?",
    )
    .bind(event_key)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(BroadcastRecord::from))
}

/// Record a broadcast; the first writer of a key wins.
pub(crate) async fn record_broadcast(
    pool: &SqlitePool,
    record: &BroadcastRecord,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        r"INSERT OR IGNORE INTO broadcast_log (event_key, destination, message_id, jump_url, ts)
          VALUES (?, ?, ?, ?, CAST(strftime('%s', 'now') AS INTEGER))",
    )
    .bind(&record.event_key)
    .bind(&record.destination)
    .bind(&record.message_id)
    .bind(&record.jump_url)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
