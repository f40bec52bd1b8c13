use thiserror::Error;

/// Cache backend failures.
///
/// Deliberately not convertible into the registry's `CoreError`: callers
/// treat read failures as misses and write failures as log-and-continue, so
/// a cache problem can never fail a request.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache connection error: {message}")]
    Connection { message: String },

    #[error("Cache operation failed: {message}")]
    Operation { message: String },
}

impl CacheError {
    /// Create a new connection error
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a new operation error
    #[must_use]
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
        }
    }
}
