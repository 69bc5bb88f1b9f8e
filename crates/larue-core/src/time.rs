//! Sources of wall-clock time.
//!
//! Services never call `Utc::now()` directly; they ask a [`TimeSource`].
//! Production wiring uses [`SystemTime`], tests drive a [`ManualTime`].

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Something that knows the current instant.
pub trait TimeSource: Send + Sync + core::fmt::Debug {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;

    /// The current instant as Unix seconds.
    fn now_secs(&self) -> i64 {
        self.now().timestamp()
    }
}

/// The operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTime;

impl TimeSource for SystemTime {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock with one-second resolution.
#[derive(Debug)]
pub struct ManualTime {
    secs: AtomicI64,
}

impl ManualTime {
    /// Start at `at`.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            secs: AtomicI64::new(at.timestamp()),
        }
    }

    /// Jump to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        self.secs.store(at.timestamp(), Ordering::SeqCst);
    }

    /// Move forward (or backward, for negative values) by `seconds`.
    pub fn advance(&self, seconds: i64) {
        self.secs.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.secs.load(Ordering::SeqCst), 0).unwrap_or_default()
    }
}
