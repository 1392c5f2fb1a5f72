// ABOUTME: Shared state for the backend API handlers
// ABOUTME: Holds the lifecycle client, the job registry and one poller handle per job

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::jobs::{InMemoryJobStore, JobClient, JobStore};

struct Poller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
pub struct AppState {
    client: Option<Arc<JobClient>>,
    store: Arc<dyn JobStore>,
    pollers: Arc<Mutex<HashMap<String, Poller>>>,
}

impl AppState {
    pub fn new(client: Arc<JobClient>) -> Self {
        Self {
            store: client.store(),
            client: Some(client),
            pollers: Arc::default(),
        }
    }

    /// State for a backend started without provider credentials.
    pub fn unconfigured() -> Self {
        Self {
            client: None,
            store: Arc::new(InMemoryJobStore::new()),
            pollers: Arc::default(),
        }
    }

    pub fn client(&self) -> Result<Arc<JobClient>, JobError> {
        self.client.clone().ok_or_else(|| {
            JobError::Configuration(
                "RunPod credentials not configured. Set RUNPOD_API_KEY and RUNPOD_ENDPOINT_ID"
                    .to_string(),
            )
        })
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Start the background poll loop that owns this job's registry entry.
    pub async fn spawn_poller(&self, client: Arc<JobClient>, job_id: String) {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let store = Arc::clone(&self.store);
        let pollers = Arc::clone(&self.pollers);
        let id = job_id.clone();

        // Hold the lock across spawn so the task cannot deregister before it is registered.
        let mut registry = self.pollers.lock().await;
        let handle = tokio::spawn(async move {
            let options = client.options();
            if let Err(err) = client.poll_with(&id, options, &token, |_| {}).await {
                tracing::warn!(job_id = %id, error = %err, "Polling stopped with an error");
                if let Some(mut job) = store.get(&id).await {
                    if job.mark_failed(err.to_string()) {
                        store.set(job).await;
                    }
                }
            }
            pollers.lock().await.remove(&id);
        });
        registry.insert(job_id, Poller { cancel, handle });
    }

    /// Stop polling a job locally and forget it. Nothing is sent to the provider.
    pub async fn forget(&self, job_id: &str) -> bool {
        let poller = self.pollers.lock().await.remove(job_id);
        if let Some(poller) = poller {
            poller.cancel.cancel();
            if let Err(err) = poller.handle.await {
                tracing::warn!(job_id = %job_id, error = %err, "Poller task ended abnormally");
            }
        }
        self.store.delete(job_id).await.is_some()
    }

    pub async fn active_pollers(&self) -> usize {
        self.pollers.lock().await.len()
    }

    pub async fn cancel_pollers(&self) {
        let pollers: Vec<(String, Poller)> = self.pollers.lock().await.drain().collect();
        tracing::info!(count = pollers.len(), "Cancelling job pollers");
        for (job_id, poller) in pollers {
            poller.cancel.cancel();
            if let Err(err) = poller.handle.await {
                tracing::warn!(job_id = %job_id, error = %err, "Poller task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobStatus, PollOptions};
    use crate::remote::{
        InferenceProvider, ProviderRequest, ProviderState, StatusResponse, SubmitResponse,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    struct QueuedForever;

    #[async_trait]
    impl InferenceProvider for QueuedForever {
        async fn submit(&self, _request: &ProviderRequest) -> Result<SubmitResponse, JobError> {
            Ok(SubmitResponse {
                id: "job-1".to_string(),
                status: Some(ProviderState::InQueue),
            })
        }

        async fn status(&self, job_id: &str) -> Result<StatusResponse, JobError> {
            Ok(StatusResponse {
                id: job_id.to_string(),
                status: ProviderState::InQueue,
                output: None,
                error: None,
                delay_time_ms: None,
                execution_time_ms: None,
            })
        }

        async fn health(&self) -> Result<serde_json::Value, JobError> {
            Ok(serde_json::Value::Null)
        }
    }

    fn state() -> (AppState, Arc<JobClient>) {
        let client = Arc::new(JobClient::new(
            Arc::new(QueuedForever),
            Arc::new(InMemoryJobStore::new()),
            PollOptions::new(Duration::from_millis(10), Duration::from_secs(60)),
        ));
        (AppState::new(Arc::clone(&client)), client)
    }

    #[tokio::test]
    async fn cancel_pollers_stops_every_task() {
        let (state, client) = state();
        state.spawn_poller(Arc::clone(&client), "job-1".into()).await;
        state.spawn_poller(Arc::clone(&client), "job-2".into()).await;
        assert_eq!(state.active_pollers().await, 2);

        state.cancel_pollers().await;

        assert_eq!(state.active_pollers().await, 0);
    }

    #[tokio::test]
    async fn forget_cancels_poller_and_removes_job() {
        let (state, client) = state();
        let job_id = client
            .submit(crate::jobs::GenerationRequest::new("a cat"))
            .await
            .unwrap();
        state.spawn_poller(Arc::clone(&client), job_id.clone()).await;
        assert_eq!(
            state.store().get(&job_id).await.map(|job| job.status),
            Some(JobStatus::Pending)
        );

        assert!(state.forget(&job_id).await);

        assert_eq!(state.active_pollers().await, 0);
        assert!(state.store().get(&job_id).await.is_none());
        assert!(!state.forget(&job_id).await);
    }
}
