// ABOUTME: HTTP client for the serverless provider's asynchronous job API
// ABOUTME: Handles job submission, status queries, health checks and error mapping

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::fmt;
use std::time::Duration;

use super::models::{JobEnvelope, ProviderRequest, StatusResponse, SubmitResponse};
use super::provider::InferenceProvider;
use crate::config::ProviderConfig;
use crate::error::JobError;

pub struct RunPodProvider {
    client: Client,
    endpoint_url: String,
    api_key: String,
}

impl fmt::Debug for RunPodProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunPodProvider")
            .field("endpoint_url", &self.endpoint_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl RunPodProvider {
    pub fn new(
        api_base: &str,
        endpoint_id: &str,
        api_key: String,
        request_timeout: Duration,
    ) -> Result<Self, JobError> {
        if api_key.trim().is_empty() {
            return Err(JobError::Configuration(
                "RUNPOD_API_KEY is not set. Export it before calling the provider".to_string(),
            ));
        }
        if endpoint_id.trim().is_empty() {
            return Err(JobError::Configuration(
                "RUNPOD_ENDPOINT_ID is not set. Export it or set provider.endpoint_id in the config file"
                    .to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| JobError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint_url: format!("{}/{}", api_base.trim_end_matches('/'), endpoint_id.trim()),
            api_key,
        })
    }

    pub fn from_config(config: &ProviderConfig, api_key: Option<String>) -> Result<Self, JobError> {
        let endpoint_id = config.endpoint_id.clone().unwrap_or_default();
        Self::new(
            &config.api_base,
            &endpoint_id,
            api_key.unwrap_or_default(),
            config.request_timeout(),
        )
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    async fn ensure_success(response: Response) -> Result<Response, JobError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, body))
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
pub fn classify_failure(status: StatusCode, body: String) -> JobError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => JobError::Validation(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => JobError::Configuration(format!(
            "Provider rejected the API key ({}). Check RUNPOD_API_KEY",
            status
        )),
        StatusCode::NOT_FOUND => JobError::NotFound(body),
        StatusCode::TOO_MANY_REQUESTS => {
            JobError::Connectivity(format!("Provider is rate limiting requests: {}", body))
        }
        s if s.is_server_error() => {
            JobError::Connectivity(format!("Provider unavailable ({}): {}", s, body))
        }
        s => JobError::Api {
            status: s.as_u16(),
            body,
        },
    }
}

#[async_trait]
impl InferenceProvider for RunPodProvider {
    async fn submit(&self, request: &ProviderRequest) -> Result<SubmitResponse, JobError> {
        let url = format!("{}/run", self.endpoint_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&JobEnvelope { input: request })
            .send()
            .await
            .map_err(|e| {
                JobError::Connectivity(format!("Failed to submit job to {}: {}", url, e))
            })?;

        let response = Self::ensure_success(response).await?;
        let submitted: SubmitResponse = response.json().await?;

        if submitted.id.trim().is_empty() {
            return Err(JobError::Api {
                status: 200,
                body: "Provider accepted the job but returned an empty id".to_string(),
            });
        }

        tracing::debug!(job_id = %submitted.id, action = request.label(), "Job submitted");
        Ok(submitted)
    }

    async fn status(&self, job_id: &str) -> Result<StatusResponse, JobError> {
        let url = format!("{}/status/{}", self.endpoint_url, job_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| JobError::Connectivity(format!("Failed to get job status: {}", e)))?;

        let response = match Self::ensure_success(response).await {
            Err(JobError::NotFound(_)) => return Err(JobError::NotFound(job_id.to_string())),
            other => other?,
        };

        Ok(response.json().await?)
    }

    async fn health(&self) -> Result<serde_json::Value, JobError> {
        let url = format!("{}/health", self.endpoint_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| JobError::Connectivity(format!("Failed to reach endpoint: {}", e)))?;

        let response = Self::ensure_success(response).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_client_creation() {
        let client = RunPodProvider::new(
            "https://api.runpod.ai/v2/",
            "abc123",
            "key".to_string(),
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(client.endpoint_url(), "https://api.runpod.ai/v2/abc123");

        let debug = format!("{:?}", client);
        assert!(debug.contains("abc123"));
        assert!(!debug.contains("\"key\""));
    }

    #[test]
    fn missing_credentials_are_configuration_errors() {
        let no_key = RunPodProvider::new("https://x", "abc", String::new(), Duration::from_secs(1));
        assert_matches!(no_key, Err(JobError::Configuration(_)));

        let no_endpoint =
            RunPodProvider::new("https://x", " ", "key".into(), Duration::from_secs(1));
        assert_matches!(no_endpoint, Err(JobError::Configuration(_)));
    }

    #[test]
    fn status_codes_map_onto_taxonomy() {
        assert_matches!(
            classify_failure(StatusCode::BAD_REQUEST, "seed".into()),
            JobError::Validation(_)
        );
        assert_matches!(
            classify_failure(StatusCode::UNAUTHORIZED, String::new()),
            JobError::Configuration(_)
        );
        assert_matches!(
            classify_failure(StatusCode::BAD_GATEWAY, String::new()),
            JobError::Connectivity(_)
        );
        assert_matches!(
            classify_failure(StatusCode::TOO_MANY_REQUESTS, String::new()),
            JobError::Connectivity(_)
        );
        assert_matches!(
            classify_failure(StatusCode::CONFLICT, String::new()),
            JobError::Api { status: 409, .. }
        );
    }
}
