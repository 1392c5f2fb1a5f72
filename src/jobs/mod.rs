// ABOUTME: Job lifecycle: request validation, state machine, registry and polling
// ABOUTME: JobClient ties these together against any InferenceProvider

pub mod client;
pub mod job;
pub mod poll;
pub mod request;
pub mod store;

pub use client::JobClient;
pub use job::{AssetReceipt, Job, JobOutput, JobResult, JobStatus, JobView};
pub use poll::{poll_until, PollOptions, PollOutcome};
pub use request::GenerationRequest;
pub use store::{InMemoryJobStore, JobStore};
