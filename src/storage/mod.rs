// ABOUTME: Blob storage seam used for adapter weight files and generated images
// ABOUTME: S3-compatible, local-directory and in-memory backends share one trait

pub mod credentials;
pub mod fs;
pub mod memory;
pub mod s3;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::adapters::adapter_filename;
use crate::config::StorageConfig;

pub use credentials::{fetch_credentials, S3Credentials};
pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage configuration error: {0}")]
    Configuration(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object key '{0}'")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub key: String,
    pub size: u64,
}

/// Last-write-wins blob sink. `put` returns the object's public URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, StorageError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, StorageError>;

    /// Size of the object, or `None` if it does not exist.
    async fn head(&self, key: &str) -> Result<Option<u64>, StorageError>;
}

/// Object key for an adapter file under `prefix`.
pub fn adapter_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        adapter_filename(name)
    } else {
        format!("{}/{}", prefix, adapter_filename(name))
    }
}

pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Build the configured backend: a local directory if one is set, otherwise S3.
///
/// S3 credentials come from the secrets endpoint when `credentials_url` is
/// configured, and from the standard AWS environment chain otherwise.
pub async fn connect(
    config: &StorageConfig,
    api_key: Option<&str>,
) -> Result<Arc<dyn BlobStore>, StorageError> {
    if let Some(root) = &config.local_root {
        tracing::debug!(root = %root.display(), "Using local directory storage");
        return Ok(Arc::new(FsBlobStore::new(
            root.clone(),
            config.public_base_url.clone(),
        )));
    }

    match &config.credentials_url {
        Some(url) => {
            let api_key = api_key.ok_or_else(|| {
                StorageError::Configuration(
                    "RUNPOD_API_KEY is required to fetch storage credentials".to_string(),
                )
            })?;
            let creds = fetch_credentials(url, api_key).await?;
            let bucket = config.bucket.clone().unwrap_or_else(|| creds.bucket.clone());
            Ok(Arc::new(S3BlobStore::from_credentials(
                &creds,
                bucket,
                &config.region,
                config.public_base_url.clone(),
            )))
        }
        None => {
            let bucket = config.bucket.clone().ok_or_else(|| {
                StorageError::Configuration(
                    "Set S3_CREDENTIALS_URL, or S3_BUCKET with AWS credentials in the environment"
                        .to_string(),
                )
            })?;
            Ok(Arc::new(
                S3BlobStore::from_env(bucket, &config.region, config.public_base_url.clone())
                    .await,
            ))
        }
    }
}
