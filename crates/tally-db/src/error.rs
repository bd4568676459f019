//! # Store Errors
//!
//! `sqlx` failures and injected `MemoryStore` failures both end up here. The
//! engine logs read errors and treats the document as absent; write errors
//! surface to the caller as `SyncError::Persistence`.

use thiserror::Error;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// The file could not be opened or created.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// A read was rejected by the backing store.
    #[error("Read of '{key}' failed: {reason}")]
    ReadFailed { key: String, reason: String },

    /// A write was rejected by the backing store.
    #[error("Write of '{key}' failed: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn read_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        DbError::ReadFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn write_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        DbError::WriteFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::Database       → DbError::QueryFailed
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// sqlx::Error::PoolClosed     → DbError::ConnectionFailed
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => DbError::QueryFailed(db_err.message().to_string()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),
            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
