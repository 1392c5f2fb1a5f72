// ABOUTME: Fetches S3 credentials for the network volume from a secrets endpoint
// ABOUTME: The endpoint authenticates callers with their provider API key

use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use super::StorageError;

const CREDENTIALS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Deserialize)]
pub struct S3Credentials {
    #[serde(rename = "S3_ENDPOINT")]
    pub endpoint: String,
    #[serde(rename = "S3_ACCESS_KEY")]
    pub access_key: String,
    #[serde(rename = "S3_SECRET_KEY")]
    pub secret_key: String,
    #[serde(rename = "S3_BUCKET")]
    pub bucket: String,
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .finish()
    }
}

pub async fn fetch_credentials(url: &str, api_key: &str) -> Result<S3Credentials, StorageError> {
    let client = Client::builder()
        .timeout(CREDENTIALS_TIMEOUT)
        .build()
        .map_err(|e| StorageError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

    let response = client
        .get(url)
        .bearer_auth(api_key)
        .send()
        .await
        .map_err(|e| StorageError::Backend(format!("Failed to reach credentials endpoint: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(StorageError::Configuration(format!(
            "Credentials endpoint returned {}. Check RUNPOD_API_KEY",
            status
        )));
    }

    let creds: S3Credentials = response.json().await.map_err(|e| {
        StorageError::Configuration(format!("Credentials endpoint sent an unexpected body: {}", e))
    })?;
    tracing::debug!(endpoint = %creds.endpoint, bucket = %creds.bucket, "Fetched storage credentials");
    Ok(creds)
}
