// ABOUTME: S3-compatible blob store for the provider's network volume
// ABOUTME: Uses path-style addressing against a custom endpoint

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use super::credentials::S3Credentials;
use super::{validate_key, BlobEntry, BlobStore, StorageError};

pub struct S3BlobStore {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3BlobStore {
    pub fn from_credentials(
        creds: &S3Credentials,
        bucket: String,
        region: &str,
        public_base_url: Option<String>,
    ) -> Self {
        let credentials = Credentials::new(
            creds.access_key.clone(),
            creds.secret_key.clone(),
            None,
            None,
            "secrets-endpoint",
        );
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .endpoint_url(creds.endpoint.clone())
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let public_base_url = public_base_url.unwrap_or_else(|| {
            format!("{}/{}", creds.endpoint.trim_end_matches('/'), bucket)
        });
        Self::with_client(Client::from_conf(config), bucket, public_base_url)
    }

    /// Credentials, region and endpoint from the standard AWS environment chain.
    pub async fn from_env(bucket: String, region: &str, public_base_url: Option<String>) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        let public_base_url = public_base_url.unwrap_or_else(|| {
            let endpoint = shared
                .endpoint_url()
                .map(str::to_string)
                .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", region));
            format!("{}/{}", endpoint.trim_end_matches('/'), bucket)
        });
        Self::with_client(Client::from_conf(config), bucket, public_base_url)
    }

    pub fn with_client(client: Client, bucket: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket,
            public_base_url,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn backend_error<E: std::error::Error>(operation: &str, err: E) -> StorageError {
    StorageError::Backend(format!("{} failed: {}", operation, DisplayErrorContext(err)))
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        validate_key(key)?;
        let size = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/octet-stream")
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| backend_error("PutObject", e))?;

        tracing::info!(bucket = %self.bucket, key = %key, size, "Uploaded object");
        Ok(format!("{}/{}", self.public_base_url.trim_end_matches('/'), key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => return Err(backend_error("GetObject", e)),
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| backend_error("GetObject body", e))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, StorageError> {
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| backend_error("ListObjectsV2", e))?;

            entries.extend(page.contents().iter().filter_map(|object| {
                object.key().map(|key| BlobEntry {
                    key: key.to_string(),
                    size: object.size().unwrap_or_default().max(0) as u64,
                })
            }));

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string())
                }
                _ => break,
            }
        }

        Ok(entries)
    }

    async fn head(&self, key: &str) -> Result<Option<u64>, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(output.content_length().unwrap_or_default().max(0) as u64)),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(backend_error("HeadObject", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> S3Credentials {
        S3Credentials {
            endpoint: "https://s3api-us-ks-2.runpod.io/".into(),
            access_key: "user_abc".into(),
            secret_key: "rps_secret".into(),
            bucket: "test-bucket".into(),
        }
    }

    #[tokio::test]
    async fn public_url_defaults_to_path_style_bucket() {
        let store = S3BlobStore::from_credentials(&creds(), "test-bucket".into(), "US-KS-2", None);
        assert_eq!(store.bucket(), "test-bucket");
        assert_eq!(store.public_base_url, "https://s3api-us-ks-2.runpod.io/test-bucket");
    }

    #[tokio::test]
    async fn configured_public_base_wins() {
        let store = S3BlobStore::from_credentials(
            &creds(),
            "other".into(),
            "US-KS-2",
            Some("https://cdn.example".into()),
        );
        assert_eq!(store.bucket(), "other");
        assert_eq!(store.public_base_url, "https://cdn.example");
    }
}
