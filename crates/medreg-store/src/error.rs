//! Store error types shared by every record store backend.

use std::fmt;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested record was not found.
    #[error("Record not found: {resource}/{id}")]
    NotFound {
        /// The record family.
        resource: String,
        /// The id that was looked up.
        id: String,
    },

    /// Attempted to create a record under an id that is already taken.
    #[error("Record already exists: {resource}/{id}")]
    AlreadyExists {
        /// The record family.
        resource: String,
        /// The id that collided.
        id: String,
    },

    /// A unique constraint on a single field was violated.
    #[error("Unique constraint violated on field '{field}'")]
    UniqueViolation {
        /// The constrained field.
        field: String,
    },

    /// A relation constraint was violated: a referenced parent is missing,
    /// or a parent still has dependents.
    #[error("Relation constraint violated: {message}")]
    ForeignKey {
        /// Description of the violated relation.
        message: String,
    },

    /// Failed to reach the storage backend.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StoreError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Creates a new `UniqueViolation` error.
    #[must_use]
    pub fn unique_violation(field: impl Into<String>) -> Self {
        Self::UniqueViolation {
            field: field.into(),
        }
    }

    /// Creates a new `ForeignKey` error.
    #[must_use]
    pub fn foreign_key(message: impl Into<String>) -> Self {
        Self::ForeignKey {
            message: message.into(),
        }
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this error reflects a constraint conflict rather
    /// than an infrastructure problem.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyExists { .. } | Self::UniqueViolation { .. } | Self::ForeignKey { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists { .. } | Self::UniqueViolation { .. } | Self::ForeignKey { .. } => {
                ErrorCategory::Conflict
            }
            Self::Connection { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of store errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Record not found.
    NotFound,
    /// Constraint conflict (id, uniqueness or relation).
    Conflict,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
