//! Enumeration types shared across the workspace.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Quota denials
// ---------------------------------------------------------------------------

/// Why the quota engine refused an action.
///
/// Denials are ordinary results, not errors: the presentation layer turns
/// them into "come back later" or "done for today" messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaDenial {
    /// The per-action cooldown has not elapsed yet.
    CoolingDown,
    /// The per-day usage cap is exhausted until the next logical day.
    DailyCapReached,
}

// ---------------------------------------------------------------------------
// Scheduled event status
// ---------------------------------------------------------------------------

/// Lifecycle of a scheduled broadcast event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Waiting for its start time.
    Scheduled,
    /// Posted to the feed channel.
    Published,
    /// Withdrawn before publication.
    Canceled,
}

impl EventStatus {
    /// Database representation of the status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Published => "published",
            Self::Canceled => "canceled",
        }
    }

    /// Parse the database representation. Returns `None` for unknown values.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(Self::Scheduled),
            "published" => Some(Self::Published),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

impl core::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
