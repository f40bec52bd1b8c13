//! Asset service client.
//!
//! Hospital and user records may carry a picture hosted on the asset
//! service. Deleting the record releases the stored image with an HTTP
//! DELETE. Releases are advisory: the record delete has already committed,
//! so callers log failures instead of surfacing them.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Bucket holding hospital pictures.
pub const HOSPITAL_BUCKET: &str = "hospitals";

/// Bucket holding user pictures.
pub const USER_BUCKET: &str = "users";

/// Failure while releasing a stored image.
#[derive(Debug, thiserror::Error)]
#[error("Asset release failed: {message}")]
pub struct AssetError {
    message: String,
}

impl AssetError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Releases stored images when their owning record goes away.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Release the image `reference` points at inside `bucket`.
    ///
    /// # Errors
    ///
    /// Returns an error when the asset service is unreachable or rejects
    /// the delete.
    async fn release(&self, bucket: &str, reference: &str) -> Result<(), AssetError>;
}

/// Picture references are stored as URLs or paths; the asset service
/// addresses images by the final path segment.
fn filename_of(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

/// Client for the asset service HTTP API.
pub struct HttpAssetStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAssetStore {
    /// Create a client against `base_url`.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        let base_url = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AssetStore for HttpAssetStore {
    async fn release(&self, bucket: &str, reference: &str) -> Result<(), AssetError> {
        let filename = filename_of(reference);
        let url = format!("{}/media/image/{bucket}/{filename}", self.base_url);

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| AssetError::new(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AssetError::new(format!(
                "DELETE {url} returned {}",
                response.status()
            )));
        }

        debug!(bucket = %bucket, filename = %filename, "Released stored image");
        Ok(())
    }
}

/// Stand-in for deployments without an asset service.
pub struct NoopAssetStore;

#[async_trait]
impl AssetStore for NoopAssetStore {
    async fn release(&self, bucket: &str, reference: &str) -> Result<(), AssetError> {
        debug!(bucket = %bucket, reference = %reference, "Asset release skipped (no endpoint)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_extraction() {
        assert_eq!(
            filename_of("https://assets.example/media/image/users/abc123.png"),
            "abc123.png"
        );
        assert_eq!(filename_of("hospitals/h-77.jpg"), "h-77.jpg");
        assert_eq!(filename_of("bare-name.png"), "bare-name.png");
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let store = HttpAssetStore::new("https://assets.example/", Duration::from_secs(5));
        assert_eq!(store.base_url, "https://assets.example");
    }

    #[tokio::test]
    async fn test_noop_store_accepts_everything() {
        let store = NoopAssetStore;
        assert!(store.release(USER_BUCKET, "whatever.png").await.is_ok());
    }

    #[test]
    fn test_trait_is_object_safe() {
        fn _assert_asset_store_object_safe(_: &dyn AssetStore) {}
    }
}
