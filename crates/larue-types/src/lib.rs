//! Shared type definitions for the LaRue street-survival economy.
//!
//! This crate is the single source of truth for the records that flow
//! between the services in `larue-core` and the persistence adapter in
//! `larue-db`. It holds no behaviour beyond small conversions.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe wrapper for chat-platform user identifiers
//! - [`enums`] -- Enumeration types (quota denials, event status)
//! - [`structs`] -- Persisted records and service result values

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{EventStatus, QuotaDenial};
pub use ids::UserId;
pub use structs::{
    ActionState, ApplyResult, BroadcastRecord, ClaimDay, ClaimLogEntry, CredRow, LeaderboardRow,
    LedgerEntry, PackOutcome, PlayerRecord, QuotaDecision, QuotaLimits, RecyclerState,
    ScheduledEvent,
};
