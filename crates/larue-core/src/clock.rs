//! Logical days for daily resets.
//!
//! A logical day starts at a configured hour in a named timezone, not at
//! midnight. Every "daily" rule (quota counters, recycler claims) keys on
//! the logical day returned here.
//!
//! # Design Principles
//!
//! - Local wall-clock time is always recomputed through the IANA zone, so
//!   daylight-saving transitions never shift the reset by an hour.
//! - Day keys are `YYYY-MM-DD` strings; day arithmetic uses [`NaiveDate`].
//! - Nothing here reads the system clock: callers pass `now`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::time::TimeSource;

/// Format of a logical day key.
pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// Errors raised while building a [`DayClock`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// The timezone is not a known IANA name.
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    /// The reset hour is not in `0..24`.
    #[error("reset hour must be in 0..24, got {0}")]
    InvalidResetHour(u32),
}

/// Compute the logical day key of `now`.
///
/// If the local hour in `tz` is before `reset_hour`, the key is the
/// previous calendar day.
pub fn logical_day_key(now: DateTime<Utc>, reset_hour: u32, tz: Tz) -> String {
    logical_day(now, reset_hour, tz).format(DAY_KEY_FORMAT).to_string()
}

fn logical_day(now: DateTime<Utc>, reset_hour: u32, tz: Tz) -> NaiveDate {
    let local = now.with_timezone(&tz);
    let date = local.date_naive();
    if local.hour() < reset_hour {
        date.pred_opt().unwrap_or(date)
    } else {
        date
    }
}

/// Whole days from `earlier` to `later` (negative if reversed).
pub fn days_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    later.signed_duration_since(earlier).num_days()
}

/// Parse a `YYYY-MM-DD` day key.
pub fn parse_day_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, DAY_KEY_FORMAT).ok()
}

// ---------------------------------------------------------------------------
// DayClock
// ---------------------------------------------------------------------------

/// Daily reset boundary in a named timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayClock {
    tz: Tz,
    reset_hour: u32,
}

impl DayClock {
    /// Build a clock for `timezone` (IANA name) resetting at `reset_hour`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::UnknownTimezone`] or
    /// [`ClockError::InvalidResetHour`].
    pub fn new(timezone: &str, reset_hour: u32) -> Result<Self, ClockError> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_parse| ClockError::UnknownTimezone(timezone.to_owned()))?;
        if reset_hour >= 24 {
            return Err(ClockError::InvalidResetHour(reset_hour));
        }
        Ok(Self { tz, reset_hour })
    }

    /// The configured zone.
    pub const fn timezone(&self) -> Tz {
        self.tz
    }

    /// The configured reset hour.
    pub const fn reset_hour(&self) -> u32 {
        self.reset_hour
    }

    /// The logical day containing `now`.
    pub fn logical_day(&self, now: DateTime<Utc>) -> NaiveDate {
        logical_day(now, self.reset_hour, self.tz)
    }

    /// The logical day key containing `now`.
    pub fn day_key(&self, now: DateTime<Utc>) -> String {
        logical_day_key(now, self.reset_hour, self.tz)
    }

    /// The logical day key for the current instant of `time`.
    pub fn today_key(&self, time: &dyn TimeSource) -> String {
        self.day_key(time.now())
    }

    /// Start and end of the logical day containing `now`.
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let day = self.logical_day(now);
        let next = day.succ_opt().unwrap_or(day);
        (self.reset_instant(day), self.reset_instant(next))
    }

    /// The next reset strictly after `now`.
    pub fn next_reset(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.window(now).1
    }

    /// The next local top of the hour strictly after `now`.
    pub fn next_local_hour(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.tz);
        let into_hour = TimeDelta::minutes(i64::from(local.minute()))
            .checked_add(&TimeDelta::seconds(i64::from(local.second())))
            .unwrap_or_default();
        let truncated = now
            .with_nanosecond(0)
            .and_then(|t| t.checked_sub_signed(into_hour))
            .unwrap_or(now);
        truncated
            .checked_add_signed(TimeDelta::hours(1))
            .unwrap_or(truncated)
    }

    /// Render `at` in the clock's zone.
    pub fn local(&self, at: DateTime<Utc>) -> DateTime<Tz> {
        at.with_timezone(&self.tz)
    }

    fn reset_instant(&self, day: NaiveDate) -> DateTime<Utc> {
        let naive = day
            .and_hms_opt(self.reset_hour, 0, 0)
            .unwrap_or_else(|| day.and_time(NaiveTime::MIN));
        self.resolve_local(naive)
    }

    /// Map a local wall-clock time to an instant. A time skipped by a
    /// spring-forward gap moves one hour later.
    fn resolve_local(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        if let Some(at) = self.tz.from_local_datetime(&naive).earliest() {
            return at.with_timezone(&Utc);
        }
        naive
            .checked_add_signed(TimeDelta::hours(1))
            .and_then(|later| self.tz.from_local_datetime(&later).earliest())
            .map_or_else(|| naive.and_utc(), |at| at.with_timezone(&Utc))
    }
}
