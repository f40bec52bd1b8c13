//! Error types and sqlx error mapping for the PostgreSQL backend.

use medreg_store::StoreError;
use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for unique constraint violations (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL error code for foreign key violations (23503).
pub const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Maps a sqlx error raised while touching one record into a [`StoreError`].
///
/// Unique violations are split by constraint: primary keys become
/// `AlreadyExists`, named unique constraints become field-specific
/// `UniqueViolation`s. Foreign key violations keep the database message,
/// which names the failing relation.
pub(crate) fn map_record_error(err: SqlxError, resource: &str, id: &str) -> StoreError {
    if let SqlxError::Database(db_err) = &err {
        let code = db_err.code();
        if code.as_deref() == Some(PG_UNIQUE_VIOLATION) {
            return match db_err.constraint() {
                Some(c) if c.ends_with("_pkey") => StoreError::already_exists(resource, id),
                Some(c) if c.contains("username") => StoreError::unique_violation("username"),
                Some(c) => StoreError::unique_violation(c),
                None => StoreError::unique_violation("unknown"),
            };
        }
        if code.as_deref() == Some(PG_FOREIGN_KEY_VIOLATION) {
            return StoreError::foreign_key(db_err.message().to_string());
        }
    }
    match err {
        SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) => {
            StoreError::connection(err.to_string())
        }
        other => StoreError::internal(other.to_string()),
    }
}

/// Maps a sqlx error from a list or read query into a [`StoreError`].
///
/// Reads never trip constraints, so everything is either a connection
/// problem or internal.
pub(crate) fn map_query_error(err: SqlxError) -> StoreError {
    match err {
        SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) => {
            StoreError::connection(err.to_string())
        }
        other => StoreError::internal(other.to_string()),
    }
}

/// Errors specific to the PostgreSQL backend setup.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx_core::error::Error),

    /// Schema bootstrap error.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a new schema error.
    #[must_use]
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }
}

impl From<PostgresError> for StoreError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Connection(e) => StoreError::connection(e.to_string()),
            PostgresError::Schema(e) => StoreError::internal(format!("Schema error: {e}")),
            PostgresError::Config { message } => {
                StoreError::internal(format!("Configuration error: {message}"))
            }
        }
    }
}

/// Result type alias for PostgreSQL backend setup.
pub type Result<T> = std::result::Result<T, PostgresError>;
