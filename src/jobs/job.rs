// ABOUTME: Job record and its monotonic status state machine
// ABOUTME: Normalizes provider observations into pending/running/completed/failed/timed_out

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::error::JobError;
use crate::remote::models::describe_error;
use crate::remote::{ProviderRequest, ProviderState, StatusResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::TimedOut
        )
    }

    fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed | JobStatus::TimedOut => 2,
        }
    }

    /// Transitions only move forward, and nothing leaves a terminal state.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized result payload of a completed generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutput {
    ImageBytesBase64(String),
    ImageUrl(String),
}

impl JobOutput {
    /// Pick the image out of whichever output shape the worker handler produced.
    pub fn from_provider_output(output: &Value) -> Option<JobOutput> {
        let text = |key: &str| {
            output
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        if let Some(b64) = text("image_bytes_base64").or_else(|| text("image")) {
            return Some(JobOutput::ImageBytesBase64(b64));
        }
        if let Some(url) = text("image_url") {
            return Some(JobOutput::ImageUrl(url));
        }

        let first = output.get("images")?.as_array()?.first()?;
        if let Some(url) = first.get("url").and_then(Value::as_str) {
            return Some(JobOutput::ImageUrl(url.to_string()));
        }
        first
            .get("base64")
            .and_then(Value::as_str)
            .map(|b64| JobOutput::ImageBytesBase64(b64.to_string()))
    }
}

/// What `fetch_result` hands back: decoded bytes or a retrieval URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Bytes(Vec<u8>),
    Url(String),
}

/// Outcome of a completed `DownloadAsset` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetReceipt {
    pub path: String,
    #[serde(default)]
    pub size_mb: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    /// `None` when the job was picked up by id without having been submitted here.
    pub request: Option<ProviderRequest>,
    /// Raw handler output, kept as received.
    pub output: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    wait_budget: Option<Duration>,
}

impl Job {
    pub fn new(id: impl Into<String>, request: ProviderRequest) -> Self {
        let mut job = Self::tracked(id);
        job.request = Some(request);
        job
    }

    pub fn tracked(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            request: None,
            output: None,
            error: None,
            created_at: now,
            updated_at: now,
            wait_budget: None,
        }
    }

    /// Move to `next` if the state machine allows it. Returns whether anything changed.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if self.status == next || !self.status.can_transition_to(next) {
            return false;
        }
        tracing::debug!(job_id = %self.id, from = %self.status, to = %next, "Job transition");
        self.status = next;
        self.updated_at = Utc::now();
        true
    }

    /// Fold one provider status observation into the job.
    pub fn observe(&mut self, status: &StatusResponse) -> bool {
        match status.status {
            ProviderState::InQueue => self.transition(JobStatus::Pending),
            ProviderState::InProgress => self.transition(JobStatus::Running),
            ProviderState::Completed => {
                let output = status.output.clone();
                match output.as_ref().and_then(handler_error) {
                    Some(message) => self.mark_failed(message),
                    None => {
                        if !self.transition(JobStatus::Completed) {
                            return false;
                        }
                        self.output = output;
                        true
                    }
                }
            }
            ProviderState::Failed | ProviderState::Cancelled | ProviderState::TimedOut => {
                let message = status.error_message().unwrap_or_else(|| {
                    format!("provider reported {:?} without detail", status.status)
                });
                self.mark_failed(message)
            }
            ProviderState::Unknown => false,
        }
    }

    /// Enter the client-side timed_out state after the wait budget ran out.
    pub fn mark_timed_out(&mut self, budget: Duration) -> bool {
        if !self.transition(JobStatus::TimedOut) {
            return false;
        }
        self.wait_budget = Some(budget);
        self.error = Some(format!(
            "no terminal status within {}s; the provider may still finish the job",
            budget.as_secs()
        ));
        true
    }

    pub fn mark_failed(&mut self, message: String) -> bool {
        if !self.transition(JobStatus::Failed) {
            return false;
        }
        self.error = Some(message);
        true
    }

    /// The normalized image payload, if the job completed with one.
    pub fn job_output(&self) -> Option<JobOutput> {
        self.output.as_ref().and_then(JobOutput::from_provider_output)
    }

    pub fn asset_receipt(&self) -> Option<AssetReceipt> {
        self.output
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Convert a terminal job into the caller-facing error taxonomy.
    pub fn into_completed(self) -> Result<Job, JobError> {
        match self.status {
            JobStatus::Completed => Ok(self),
            JobStatus::Failed => Err(JobError::ProviderFailure {
                message: self.error.unwrap_or_else(|| "unknown failure".to_string()),
                job_id: self.id,
            }),
            JobStatus::TimedOut => Err(JobError::TimeoutExceeded {
                timeout_secs: self.wait_budget.map(|d| d.as_secs()).unwrap_or_default(),
                job_id: self.id,
            }),
            JobStatus::Pending | JobStatus::Running => Err(JobError::Validation(format!(
                "job {} is still {}",
                self.id, self.status
            ))),
        }
    }

    /// Decode the result of a completed job. Malformed output fails as a whole.
    pub fn result(&self) -> Result<JobResult, JobError> {
        if self.status != JobStatus::Completed {
            return Err(JobError::Validation(format!(
                "job {} has no result while {}",
                self.id, self.status
            )));
        }
        let malformed = |message: String| JobError::MalformedOutput {
            job_id: self.id.clone(),
            message,
        };

        match self.job_output() {
            Some(JobOutput::ImageBytesBase64(b64)) => {
                let payload = b64
                    .split_once("base64,")
                    .map(|(_, data)| data)
                    .unwrap_or(b64.as_str());
                STANDARD
                    .decode(payload.trim())
                    .map(JobResult::Bytes)
                    .map_err(|e| malformed(format!("invalid base64 image: {}", e)))
            }
            Some(JobOutput::ImageUrl(url)) => Ok(JobResult::Url(url)),
            None => Err(malformed(match &self.output {
                Some(v) => format!("no image in output: {}", v),
                None => "completed without output".to_string(),
            })),
        }
    }

    pub fn view(&self) -> JobView {
        JobView {
            id: self.id.clone(),
            status: self.status,
            output: self.job_output(),
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// External shape of a job as reported by the backend's status route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JobOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Handlers report their own failures inside a COMPLETED envelope.
fn handler_error(output: &Value) -> Option<String> {
    if output.get("status").and_then(Value::as_str) != Some("error") {
        return None;
    }
    Some(
        output
            .get("error")
            .or_else(|| output.get("message"))
            .map(describe_error)
            .unwrap_or_else(|| "handler reported an error".to_string()),
    )
}
