// ABOUTME: Data structures for the serverless provider's job queue API
// ABOUTME: These are serialized to JSON for the run/status/health endpoints

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Validated generation parameters in the shape the worker handler reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lora_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lora_strength: Option<f32>,
}

/// The distinct kinds of work the worker handler accepts on one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ProviderRequest {
    #[serde(rename = "generate")]
    GenerateImage(GenerationParams),
    #[serde(rename = "download_lora")]
    DownloadAsset {
        #[serde(rename = "lora_url")]
        url: String,
        #[serde(rename = "lora_name")]
        name: String,
    },
}

impl ProviderRequest {
    pub fn label(&self) -> &'static str {
        match self {
            ProviderRequest::GenerateImage(_) => "generate",
            ProviderRequest::DownloadAsset { .. } => "download_lora",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobEnvelope<'a> {
    pub input: &'a ProviderRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub id: String,
    #[serde(default)]
    pub status: Option<ProviderState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderState {
    InQueue,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub id: String,
    pub status: ProviderState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, rename = "delayTime", skip_serializing_if = "Option::is_none")]
    pub delay_time_ms: Option<u64>,
    #[serde(default, rename = "executionTime", skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl StatusResponse {
    /// Flatten the provider's error field, which may be a string or an object.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(describe_error)
    }
}

/// Render a provider error value as a single human-readable line.
pub fn describe_error(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}
