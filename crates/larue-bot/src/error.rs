//! Error types for the bot binary.
//!
//! [`BotError`] wraps every failure `main` can propagate with `?`.

/// Top-level error of the bot process.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: larue_core::config::ConfigError,
    },

    /// The database could not be opened or migrated.
    #[error("database error: {source}")]
    Db {
        /// The underlying data-layer error.
        #[from]
        source: larue_db::DbError,
    },

    /// A startup query through the services failed.
    #[error("core error: {source}")]
    Core {
        /// The underlying service error.
        #[from]
        source: larue_core::error::CoreError,
    },

    /// Waiting for the shutdown signal failed.
    #[error("signal error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A background loop panicked or was aborted.
    #[error("background task failed: {source}")]
    Join {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },
}
