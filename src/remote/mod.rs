// ABOUTME: Remote inference provider module
// ABOUTME: Wire models, the provider trait and the RunPod HTTP implementation

pub mod client;
pub mod models;
pub mod provider;

pub use client::RunPodProvider;
pub use models::{
    GenerationParams, ProviderRequest, ProviderState, StatusResponse, SubmitResponse,
};
pub use provider::InferenceProvider;
