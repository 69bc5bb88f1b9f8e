//! Background loops: the hourly planner and the broadcast ticker.
//!
//! Both loops sleep until their next deadline, read the time source again
//! on wake, log failures and retry after a backoff. They stop when the
//! shutdown channel flips to `true` or its sender is dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::watch;

use larue_types::{BroadcastRecord, EventStatus, ScheduledEvent};

use crate::clock::DayClock;
use crate::config::SchedulerConfig;
use crate::error::CoreError;
use crate::store::GameStore;
use crate::time::TimeSource;

/// Kind of the events seeded by the hourly planner.
pub const HOURLY_KIND: &str = "hourly_tick";

// ---------------------------------------------------------------------------
// Publishing seam
// ---------------------------------------------------------------------------

/// Where a published event landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Channel reference.
    pub destination: String,
    /// Platform message id.
    pub message_id: String,
    /// Link to the message.
    pub jump_url: String,
}

/// A publisher could not post an event.
#[derive(Debug, Clone, thiserror::Error)]
#[error("publish failed: {0}")]
pub struct PublishError(pub String);

/// Posts due events to the outside world (a chat channel in production).
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Post one event.
    async fn publish(&self, event: &ScheduledEvent) -> Result<Published, PublishError>;
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// The event the hourly planner seeds for the local hour starting at `at`.
pub fn hourly_event(clock: &DayClock, at: DateTime<Utc>) -> ScheduledEvent {
    let local = clock.local(at);
    ScheduledEvent {
        id: format!("hourly:{}", local.format("%Y%m%d%H")),
        kind: HOURLY_KIND.to_owned(),
        title: format!("Hourly event at {}", local.format("%H:%M")),
        starts_at: at,
        ends_at: None,
        payload: serde_json::json!({ "desc": "LaRue hourly tick." }),
        status: EventStatus::Scheduled,
        jump_url: String::new(),
    }
}

/// `interval` seconds, moved by up to `jitter` either way, never below 1.
pub fn jittered(interval: u64, jitter: u64, rng: &mut impl Rng) -> Duration {
    let low = interval.saturating_sub(jitter).max(1);
    let high = interval.saturating_add(jitter).max(low);
    Duration::from_secs(rng.random_range(low..=high))
}

/// Sleep for `duration` unless shutdown comes first. Returns `true` when
/// the caller should stop.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        () = tokio::time::sleep(duration) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Counters of one broadcast pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Events posted during this pass.
    pub published: u32,
    /// Events posted earlier but left unmarked, now marked published.
    pub recovered: u32,
    /// Events the publisher rejected; retried on the next pass.
    pub failed: u32,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Scheduled-event service and its background loops.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn GameStore>,
    time: Arc<dyn TimeSource>,
    clock: DayClock,
    config: SchedulerConfig,
    publisher: Arc<dyn Publisher>,
}

impl Scheduler {
    /// Create the service.
    pub const fn new(
        store: Arc<dyn GameStore>,
        time: Arc<dyn TimeSource>,
        clock: DayClock,
        config: SchedulerConfig,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            store,
            time,
            clock,
            config,
            publisher,
        }
    }

    /// Insert or refresh an event. An existing event keeps its status.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn schedule(&self, event: ScheduledEvent) -> Result<ScheduledEvent, CoreError> {
        Ok(self.store.upsert_event(event).await?)
    }

    /// Published events that have not ended, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn recent(&self, limit: u32) -> Result<Vec<ScheduledEvent>, CoreError> {
        Ok(self.store.recent_events(self.time.now(), limit).await?)
    }

    /// Seed the event of the local hour following now.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails.
    pub async fn plan_next_hour(&self) -> Result<ScheduledEvent, CoreError> {
        let next = self.clock.next_local_hour(self.time.now());
        self.schedule(hourly_event(&self.clock, next)).await
    }

    /// Publish every due event once.
    ///
    /// An event already in the broadcast log is only marked published:
    /// that is the state left by a crash between posting and marking.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when persistence fails. Publisher
    /// failures are counted, not returned.
    pub async fn broadcast_pass(&self) -> Result<BroadcastReport, CoreError> {
        let now = self.time.now();
        let due = self.store.due_events(now, self.config.due_batch).await?;
        let mut report = BroadcastReport::default();

        for event in due {
            if let Some(record) = self.store.broadcast(&event.id).await? {
                self.store.mark_published(&event.id, &record.jump_url).await?;
                tracing::info!(event = %event.id, "Broadcast already posted, marked published");
                report.recovered = report.recovered.saturating_add(1);
                continue;
            }

            match self.publisher.publish(&event).await {
                Ok(published) => {
                    let record = BroadcastRecord {
                        event_key: event.id.clone(),
                        destination: published.destination,
                        message_id: published.message_id,
                        jump_url: published.jump_url,
                    };
                    self.store.record_broadcast(record.clone()).await?;
                    self.store.mark_published(&event.id, &record.jump_url).await?;
                    tracing::info!(event = %event.id, jump_url = %record.jump_url, "Event broadcast");
                    report.published = report.published.saturating_add(1);
                }
                Err(err) => {
                    tracing::warn!(event = %event.id, error = %err, "Broadcast publish failed");
                    report.failed = report.failed.saturating_add(1);
                }
            }
        }
        Ok(report)
    }

    /// Seed one hourly event per local hour until shutdown.
    pub async fn run_hourly_planner(self, mut shutdown: watch::Receiver<bool>) {
        let error_backoff = Duration::from_secs(self.config.error_backoff_secs);
        if pause(Duration::from_secs(self.config.startup_delay_secs), &mut shutdown).await {
            return;
        }
        tracing::info!("Hourly planner started");

        loop {
            let now = self.time.now();
            let next = self.clock.next_local_hour(now);
            let wait = next.signed_duration_since(now).to_std().unwrap_or(Duration::ZERO);
            if pause(wait, &mut shutdown).await {
                break;
            }

            match self.schedule(hourly_event(&self.clock, next)).await {
                Ok(event) => tracing::info!(event = %event.id, starts_at = %event.starts_at, "Hourly event planned"),
                Err(err) => {
                    tracing::error!(error = %err, "Hourly planner failed");
                    if pause(error_backoff, &mut shutdown).await {
                        break;
                    }
                }
            }
        }
        tracing::info!("Hourly planner stopped");
    }

    /// Run [`broadcast_pass`](Self::broadcast_pass) every interval (with
    /// jitter) until shutdown.
    pub async fn run_broadcast_ticker(self, mut shutdown: watch::Receiver<bool>) {
        let error_backoff = Duration::from_secs(self.config.error_backoff_secs);
        if pause(Duration::from_secs(self.config.startup_delay_secs), &mut shutdown).await {
            return;
        }
        tracing::info!("Broadcast ticker started");

        loop {
            let delay = match self.broadcast_pass().await {
                Ok(report) => {
                    if report != BroadcastReport::default() {
                        tracing::debug!(?report, "Broadcast pass");
                    }
                    jittered(
                        self.config.broadcast_interval_secs,
                        self.config.broadcast_jitter_secs,
                        &mut rand::rng(),
                    )
                }
                Err(err) => {
                    tracing::error!(error = %err, "Broadcast pass failed");
                    error_backoff
                }
            };
            if pause(delay, &mut shutdown).await {
                break;
            }
        }
        tracing::info!("Broadcast ticker stopped");
    }
}
