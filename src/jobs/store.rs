// ABOUTME: Injected job registry keyed by job id
// ABOUTME: In-memory implementation guarded by one coarse async RwLock

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::job::Job;

/// Last-known job state per id. Each job's poller is the only writer of its entry.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, id: &str) -> Option<Job>;

    async fn set(&self, job: Job);

    async fn delete(&self, id: &str) -> Option<Job>;

    async fn list(&self) -> Vec<Job>;
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get(&self, id: &str) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }

    async fn set(&self, job: Job) {
        self.jobs.write().await.insert(job.id.clone(), job);
    }

    async fn delete(&self, id: &str) -> Option<Job> {
        self.jobs.write().await.remove(id)
    }

    async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs
    }
}
