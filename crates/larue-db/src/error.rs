//! Error types for the SQLite adapter.
//!
//! Everything inside the crate returns [`DbError`]. At the
//! [`GameStore`](larue_core::store::GameStore) boundary it becomes a
//! [`StoreError`] carrying the name of the failed operation.

use larue_core::store::StoreError;
use larue_ledger::LedgerError;

/// Primary result code of `SQLITE_BUSY`.
const SQLITE_BUSY: i64 = 5;

/// Primary result code of `SQLITE_LOCKED`.
const SQLITE_LOCKED: i64 = 6;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A SQLite operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// A migration failed.
    #[error("SQLite migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored row could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A value does not fit its column.
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// Which value.
        field: &'static str,
        /// Its textual form.
        value: String,
    },

    /// A ledger entry could not be built inside a transaction.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl DbError {
    /// Whether the database refused the write because another connection
    /// holds the lock. Only these errors are retried.
    pub fn is_busy(&self) -> bool {
        let Self::Sqlite(sqlx::Error::Database(db)) = self else {
            return false;
        };
        db.code()
            .and_then(|code| code.parse::<i64>().ok())
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
    }

    /// Convert into the storage-trait error of `operation`.
    pub fn into_store(self, operation: &'static str) -> StoreError {
        match self {
            Self::Corrupt(detail) => StoreError::Corrupt(detail),
            other => StoreError::backend(operation, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_rows_keep_their_kind() {
        let err = DbError::Corrupt("user_id -1".to_owned()).into_store("balance");
        assert!(matches!(err, StoreError::Corrupt(detail) if detail == "user_id -1"));
    }

    #[test]
    fn other_errors_carry_the_operation() {
        let err = DbError::Config("bad url".to_owned()).into_store("connect");
        assert!(matches!(err, StoreError::Backend { operation: "connect", .. }));
        assert!(err.to_string().starts_with("connect:"));
    }

    #[test]
    fn non_database_errors_are_not_busy() {
        assert!(!DbError::Sqlite(sqlx::Error::RowNotFound).is_busy());
        assert!(!DbError::Config("x".to_owned()).is_busy());
    }
}
