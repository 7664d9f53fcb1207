//! Error types for the SQLite mapping store.

use omopfhir_storage::StorageError;
use sqlx_core::error::Error as SqlxError;

/// Errors specific to the SQLite backend.
#[derive(Debug, thiserror::Error)]
pub enum SqliteError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(#[from] SqlxError),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl SqliteError {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<SqliteError> for StorageError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Connection(e) => StorageError::connection_error(e.to_string()),
            SqliteError::Migration(e) => StorageError::internal(format!("Migration error: {e}")),
            SqliteError::Config { message } => {
                StorageError::internal(format!("Configuration error: {message}"))
            }
        }
    }
}

/// Checks if a sqlx error is a primary key or unique constraint violation.
pub fn is_unique_violation(err: &SqlxError) -> bool {
    matches!(err, SqlxError::Database(db_err) if db_err.is_unique_violation())
}

/// Maps a failed statement against `table` to a [`StorageError`] and logs it.
pub(crate) fn query_error(err: SqlxError, table: &str, key: &str) -> StorageError {
    if is_unique_violation(&err) {
        return StorageError::already_exists(table, key);
    }
    tracing::error!(table, key, error = %err, "mapping store query failed");
    match err {
        SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) => {
            StorageError::connection_error(err.to_string())
        }
        e => StorageError::internal(format!("{table} query failed: {e}")),
    }
}

/// Result type alias for SQLite operations.
pub type Result<T> = std::result::Result<T, SqliteError>;
