// ABOUTME: Job lifecycle client: submit, status, poll to a terminal state, fetch the result
// ABOUTME: Works against any InferenceProvider and records every observation in a JobStore

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::job::{Job, JobResult};
use super::poll::{poll_until, PollOptions, PollOutcome};
use super::request::GenerationRequest;
use super::store::JobStore;
use crate::adapters::{adapter_filename, AdapterLocation, AdapterResolver};
use crate::error::JobError;
use crate::remote::{GenerationParams, InferenceProvider, ProviderRequest, StatusResponse};

pub struct JobClient {
    provider: Arc<dyn InferenceProvider>,
    store: Arc<dyn JobStore>,
    resolver: Option<AdapterResolver>,
    options: PollOptions,
}

impl JobClient {
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        store: Arc<dyn JobStore>,
        options: PollOptions,
    ) -> Self {
        Self {
            provider,
            store,
            resolver: None,
            options,
        }
    }

    /// Check adapters before submission. Without a resolver, names are forwarded untouched.
    pub fn with_resolver(mut self, resolver: AdapterResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn options(&self) -> PollOptions {
        self.options
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    pub fn provider(&self) -> Arc<dyn InferenceProvider> {
        Arc::clone(&self.provider)
    }

    /// Validate, resolve the seed and adapter, and submit. Nothing is sent if validation fails.
    pub async fn submit(&self, request: GenerationRequest) -> Result<String, JobError> {
        let mut params = request.into_params()?;
        self.resolve_adapter(&mut params);
        self.submit_request(ProviderRequest::GenerateImage(params))
            .await
    }

    pub async fn submit_request(&self, request: ProviderRequest) -> Result<String, JobError> {
        let submitted = self.provider.submit(&request).await?;
        let job_id = submitted.id;

        tracing::info!(job_id = %job_id, action = request.label(), "Job submitted");
        self.store.set(Job::new(job_id.clone(), request)).await;
        Ok(job_id)
    }

    /// Ask the worker to download an adapter onto its volume.
    ///
    /// Falls back to the resolver's table when no URL is given.
    pub async fn deploy_adapter(&self, name: &str, url: Option<&str>) -> Result<String, JobError> {
        let url = match url {
            Some(url) => url.to_string(),
            None => self
                .resolver
                .as_ref()
                .and_then(|r| r.known_url(name))
                .map(str::to_string)
                .ok_or_else(|| {
                    JobError::Validation(format!(
                        "No download URL known for adapter '{}'. Pass --url or add it to [adapters.known]",
                        name
                    ))
                })?,
        };

        self.submit_request(ProviderRequest::DownloadAsset {
            url,
            name: adapter_filename(name),
        })
        .await
    }

    /// One status query, folded into the stored job.
    pub async fn status(&self, job_id: &str) -> Result<Job, JobError> {
        let observed = self.provider.status(job_id).await?;
        Ok(self.record(job_id, &observed).await)
    }

    pub async fn poll(&self, job_id: &str) -> Result<Job, JobError> {
        self.poll_with(job_id, self.options, &CancellationToken::new(), |_| {})
            .await
    }

    /// Poll until the job is terminal or `options.timeout` elapses.
    ///
    /// A timeout is not an error here: the job comes back in `timed_out`.
    /// If `cancel` fires first, the last known non-terminal state is returned.
    pub async fn poll_with<C>(
        &self,
        job_id: &str,
        options: PollOptions,
        cancel: &CancellationToken,
        on_update: C,
    ) -> Result<Job, JobError>
    where
        C: Fn(&Job) + Send + Sync,
    {
        if let Some(job) = self.store.get(job_id).await {
            if job.status.is_terminal() {
                return Ok(job);
            }
        }

        let on_update = &on_update;
        let query = move || async move {
            let observed = self.provider.status(job_id).await?;
            let job = self.record(job_id, &observed).await;
            on_update(&job);
            Ok::<Job, JobError>(job)
        };

        match poll_until(options, cancel, query, |job: &Job| job.status.is_terminal()).await? {
            PollOutcome::Terminal(job) => {
                tracing::info!(job_id = %job.id, status = %job.status, "Job finished");
                Ok(job)
            }
            PollOutcome::TimedOut { last, attempts } => {
                let mut job = match self.store.get(job_id).await {
                    Some(job) => job,
                    None => last.unwrap_or_else(|| Job::tracked(job_id)),
                };
                job.mark_timed_out(options.timeout);
                self.store.set(job.clone()).await;
                tracing::warn!(
                    job_id = %job_id,
                    attempts,
                    timeout_secs = options.timeout.as_secs(),
                    "Gave up waiting for job"
                );
                on_update(&job);
                Ok(job)
            }
            PollOutcome::Cancelled { last } => {
                tracing::info!(job_id = %job_id, "Stopped polling job");
                Ok(self
                    .store
                    .get(job_id)
                    .await
                    .or(last)
                    .unwrap_or_else(|| Job::tracked(job_id)))
            }
        }
    }

    /// Result of a completed job; failed and timed-out jobs map to their own errors.
    pub fn fetch_result(&self, job: &Job) -> Result<JobResult, JobError> {
        job.clone().into_completed()?.result()
    }

    /// Submit, wait, and fetch in one call.
    pub async fn generate(&self, request: GenerationRequest) -> Result<JobResult, JobError> {
        let job_id = self.submit(request).await?;
        let job = self.poll(&job_id).await?;
        self.fetch_result(&job)
    }

    async fn record(&self, job_id: &str, observed: &StatusResponse) -> Job {
        let (mut job, known) = match self.store.get(job_id).await {
            Some(job) => (job, true),
            None => (Job::tracked(job_id), false),
        };
        if job.observe(observed) || !known {
            self.store.set(job.clone()).await;
        }
        job
    }

    fn resolve_adapter(&self, params: &mut GenerationParams) {
        let (Some(resolver), Some(name)) = (&self.resolver, params.lora_name.clone()) else {
            return;
        };

        match resolver.resolve(&name) {
            AdapterLocation::LocalPath(path) => {
                tracing::debug!(adapter = %name, path = %path.display(), "Adapter found locally");
            }
            AdapterLocation::Url(url) => {
                tracing::debug!(adapter = %name, url = %url, "Adapter available for download");
            }
            AdapterLocation::NotFound => {
                tracing::warn!(adapter = %name, "Adapter not found, generating without it");
                params.lora_name = None;
                params.lora_strength = None;
            }
        }
    }
}
