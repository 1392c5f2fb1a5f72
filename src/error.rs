// ABOUTME: Error taxonomy for the job lifecycle client and its collaborators
// ABOUTME: Separates fatal configuration errors from transient connectivity failures

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    /// Missing or rejected credentials, endpoint ids, or unreadable config.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport-level failure or a provider that is temporarily unavailable.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// The request was rejected before or by the provider's validator.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The job reached the provider's failed terminal state.
    #[error("Provider reported failure for job {job_id}: {message}")]
    ProviderFailure { job_id: String, message: String },

    /// The client's wait budget elapsed without a terminal status.
    #[error("Job {job_id} did not finish within {timeout_secs}s")]
    TimeoutExceeded { job_id: String, timeout_secs: u64 },

    /// The provider returned a completed job whose output could not be decoded.
    #[error("Malformed output for job {job_id}: {message}")]
    MalformedOutput { job_id: String, message: String },

    #[error("Job {0} not found")]
    NotFound(String),

    /// Any other non-success response from the provider API.
    #[error("Provider API error ({status}): {body}")]
    Api { status: u16, body: String },
}

impl JobError {
    /// Whether a poll loop should retry the same call on its next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, JobError::Connectivity(_))
    }
}

impl From<reqwest::Error> for JobError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            JobError::Api {
                status: err.status().map(|s| s.as_u16()).unwrap_or(200),
                body: format!("undecodable response body: {}", err),
            }
        } else {
            JobError::Connectivity(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connectivity_is_transient() {
        assert!(JobError::Connectivity("reset".into()).is_transient());
        assert!(!JobError::Configuration("no key".into()).is_transient());
        assert!(!JobError::Validation("seed".into()).is_transient());
        assert!(!JobError::ProviderFailure {
            job_id: "j".into(),
            message: "boom".into()
        }
        .is_transient());
        assert!(!JobError::TimeoutExceeded {
            job_id: "j".into(),
            timeout_secs: 5
        }
        .is_transient());
    }

    #[test]
    fn timeout_and_failure_render_differently() {
        let timeout = JobError::TimeoutExceeded {
            job_id: "abc".into(),
            timeout_secs: 5,
        };
        let failure = JobError::ProviderFailure {
            job_id: "abc".into(),
            message: "CUDA out of memory".into(),
        };
        assert_eq!(timeout.to_string(), "Job abc did not finish within 5s");
        assert!(failure.to_string().contains("CUDA out of memory"));
    }
}
