use thiserror::Error;

/// Error taxonomy for registry operations.
///
/// Only two failure classes are allowed to fail a request: store-layer
/// failures and scope validation. Cache, asset-store and queue failures are
/// recovered at their call sites and intentionally have no conversion into
/// this type.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("Invalid scope: {message}")]
    InvalidScope { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Storage failure: {message}")]
    Storage { message: String },
}

impl CoreError {
    /// Create a new NotFound error
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create a new InvalidScope error
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Create a new Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Conflict for a uniqueness violation on a single field
    pub fn duplicate_field(field: impl Into<String>) -> Self {
        Self::Conflict {
            message: format!("The value for field '{}' already exists", field.into()),
        }
    }

    /// Create a new Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Check if this error is a client error (4xx category)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::InvalidScope { .. } | Self::Conflict { .. }
        )
    }

    /// Check if this error is a server error (5xx category)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::InvalidScope { .. } => ErrorCategory::Scope,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::Storage { .. } => ErrorCategory::Storage,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    Scope,
    Conflict,
    Storage,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Scope => write!(f, "scope"),
            Self::Conflict => write!(f, "conflict"),
            Self::Storage => write!(f, "storage"),
        }
    }
}

/// Convenience result type for registry operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = CoreError::not_found("hospital", "H-17");
        assert_eq!(err.to_string(), "hospital not found: H-17");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_invalid_scope_error() {
        let err = CoreError::invalid_scope("role USER may not list hospital records");
        assert_eq!(
            err.to_string(),
            "Invalid scope: role USER may not list hospital records"
        );
        assert!(err.is_client_error());
        assert_eq!(err.category(), ErrorCategory::Scope);
    }

    #[test]
    fn test_duplicate_field_message() {
        let err = CoreError::duplicate_field("username");
        assert_eq!(
            err.to_string(),
            "Conflict: The value for field 'username' already exists"
        );
        assert!(err.is_client_error());
        assert_eq!(err.category(), ErrorCategory::Conflict);
    }

    #[test]
    fn test_storage_error_is_server_error() {
        let err = CoreError::storage("connection refused");
        assert!(err.is_server_error());
        assert!(!err.is_client_error());
        assert_eq!(err.category(), ErrorCategory::Storage);
    }

    #[test]
    fn test_error_categories_display() {
        assert_eq!(ErrorCategory::NotFound.to_string(), "not_found");
        assert_eq!(ErrorCategory::Scope.to_string(), "scope");
        assert_eq!(ErrorCategory::Conflict.to_string(), "conflict");
        assert_eq!(ErrorCategory::Storage.to_string(), "storage");
    }

    #[test]
    fn test_error_debug_format() {
        let err = CoreError::conflict("test message");
        let debug_str = format!("{err:?}");
        assert!(debug_str.contains("Conflict"));
        assert!(debug_str.contains("test message"));
    }
}
