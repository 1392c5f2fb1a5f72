// ABOUTME: Trait seam for the remote inference provider's queue API
// ABOUTME: Lets the lifecycle client run against RunPod, the simulator, or test fakes

use async_trait::async_trait;

use super::models::{ProviderRequest, StatusResponse, SubmitResponse};
use crate::error::JobError;

/// Contract: `status` is idempotent to re-query, and `output` is only
/// populated once the job has reached a success terminal state.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn submit(&self, request: &ProviderRequest) -> Result<SubmitResponse, JobError>;

    async fn status(&self, job_id: &str) -> Result<StatusResponse, JobError>;

    async fn health(&self) -> Result<serde_json::Value, JobError>;
}
