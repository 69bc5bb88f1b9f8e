//! SQLite persistence for the LaRue economy.
//!
//! [`SqliteStore`] implements [`GameStore`]: every read-decide-write
//! operation runs inside one `BEGIN IMMEDIATE` transaction, and busy
//! transactions are retried as a whole under a [`RetryPolicy`].
//!
//! # Modules
//!
//! - [`sqlite`] -- Pool configuration, connection and migrations
//! - [`store`] -- [`SqliteStore`], the [`GameStore`] implementation
//! - [`retry`] -- Write transactions and busy retry
//! - [`error`] -- Shared error types
//!
//! Table access lives in private modules, one per table family.
//!
//! [`GameStore`]: larue_core::store::GameStore

pub mod error;
mod event_store;
mod inventory_store;
mod ledger_store;
mod quota_store;
mod recycler_store;
mod respect_store;
pub mod retry;
mod rows;
pub mod sqlite;
pub mod store;

pub use error::DbError;
pub use retry::RetryPolicy;
pub use sqlite::{SqliteConfig, SqlitePool};
pub use store::SqliteStore;
