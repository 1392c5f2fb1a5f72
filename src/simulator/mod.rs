// ABOUTME: Local stand-in for the serverless provider's queue API
// ABOUTME: Serves run/status/health per endpoint id with switchable failure scenarios

pub mod scenario;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::remote::{ProviderRequest, ProviderState, StatusResponse, SubmitResponse};
pub use scenario::{SimState, SimulationMode, Timing, PLACEHOLDER_PNG_BASE64};

const VOLUME_LORA_DIR: &str = "/runpod-volume/ComfyUI/models/loras";

/// How completed generations hand back their image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultDelivery {
    #[default]
    Inline,
    Url,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub host: String,
    pub port: u16,
    pub mode: SimulationMode,
    pub queue_delay_ms: u64,
    pub generation_time_ms: u64,
    pub delivery: ResultDelivery,
    /// Base for `image_url` results; defaults to the address the simulator is bound to.
    pub public_base_url: Option<String>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            mode: SimulationMode::Normal,
            queue_delay_ms: 2_000,
            generation_time_ms: 8_000,
            delivery: ResultDelivery::Inline,
            public_base_url: None,
        }
    }
}

impl SimulatorConfig {
    pub fn timing(&self) -> Timing {
        Timing {
            queue_delay: Duration::from_millis(self.queue_delay_ms),
            generation_time: Duration::from_millis(self.generation_time_ms),
        }
    }
}

struct SimJob {
    submitted_at: Instant,
    mode: SimulationMode,
    request: ProviderRequest,
}

pub struct Simulator {
    config: SimulatorConfig,
    mode: RwLock<SimulationMode>,
    jobs: RwLock<HashMap<String, SimJob>>,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            mode: RwLock::new(config.mode),
            jobs: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub async fn mode(&self) -> SimulationMode {
        *self.mode.read().await
    }

    pub async fn set_mode(&self, mode: SimulationMode) {
        tracing::info!(mode = %mode, "Simulation mode changed");
        *self.mode.write().await = mode;
    }

    fn image_url(&self, job_id: &str) -> String {
        let base = self
            .config
            .public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.config.host, self.config.port));
        format!("{}/sim/{}/image.png", base.trim_end_matches('/'), job_id)
    }

    fn snapshot(&self, job_id: &str, job: &SimJob) -> StatusResponse {
        let elapsed = job.submitted_at.elapsed();
        let timing = self.config.timing();
        let state = job.mode.state_at(elapsed, &timing);
        let queue_ms = timing.queue_delay.as_millis() as u64;

        let mut response = StatusResponse {
            id: job_id.to_string(),
            status: ProviderState::InQueue,
            output: None,
            error: None,
            delay_time_ms: None,
            execution_time_ms: None,
        };

        match state {
            SimState::Queued => {}
            SimState::Running => {
                response.status = ProviderState::InProgress;
                response.delay_time_ms = Some(queue_ms);
            }
            SimState::Failed(message) => {
                response.status = ProviderState::Failed;
                response.error = Some(Value::String(message));
            }
            SimState::Completed => {
                response.status = ProviderState::Completed;
                response.delay_time_ms = Some(queue_ms);
                response.execution_time_ms =
                    Some((elapsed.as_millis() as u64).saturating_sub(queue_ms));
                response.output = Some(self.output_for(job_id, &job.request));
            }
        }
        response
    }

    fn output_for(&self, job_id: &str, request: &ProviderRequest) -> Value {
        match request {
            ProviderRequest::DownloadAsset { name, .. } => json!({
                "status": "success",
                "path": format!("{}/{}", VOLUME_LORA_DIR, name),
                "size_mb": 0.0,
            }),
            ProviderRequest::GenerateImage(params) => match self.config.delivery {
                ResultDelivery::Inline => json!({
                    "status": "success",
                    "image": PLACEHOLDER_PNG_BASE64,
                    "seed": params.seed,
                    "model": "flux-dev",
                }),
                ResultDelivery::Url => json!({
                    "status": "success",
                    "image_url": self.image_url(job_id),
                    "seed": params.seed,
                    "model": "flux-dev",
                }),
            },
        }
    }
}

pub fn router(simulator: Arc<Simulator>) -> Router {
    Router::new()
        .route("/{endpoint}/run", post(run_job))
        .route("/{endpoint}/status/{job_id}", get(job_status))
        .route("/{endpoint}/health", get(health))
        .route("/scenarios", get(list_scenarios).post(set_scenario))
        .route("/sim/{job_id}/image.png", get(placeholder_image))
        .with_state(simulator)
}

fn reject(status: StatusCode, kind: &str, message: String) -> Response {
    (
        status,
        Json(json!({"error": {"type": kind, "message": message}})),
    )
        .into_response()
}

async fn run_job(
    State(sim): State<Arc<Simulator>>,
    Path(endpoint): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let input = body.get("input").cloned().unwrap_or(Value::Null);

    // The sampler validator refuses negative seeds before queueing anything.
    if let Some(seed) = input.get("seed").and_then(Value::as_i64).filter(|s| *s < 0) {
        return reject(
            StatusCode::BAD_REQUEST,
            "prompt_outputs_failed_validation",
            format!("Value {} smaller than min of 0: seed", seed),
        );
    }

    let request: ProviderRequest = match serde_json::from_value(input) {
        Ok(request) => request,
        Err(e) => return reject(StatusCode::BAD_REQUEST, "invalid_input", e.to_string()),
    };

    let job_id = format!("sim-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
    let mode = sim.mode().await;
    tracing::info!(
        job_id = %job_id,
        endpoint = %endpoint,
        action = request.label(),
        mode = %mode,
        "Simulated job accepted"
    );

    sim.jobs.write().await.insert(
        job_id.clone(),
        SimJob {
            submitted_at: Instant::now(),
            mode,
            request,
        },
    );

    Json(SubmitResponse {
        id: job_id,
        status: Some(ProviderState::InQueue),
    })
    .into_response()
}

async fn job_status(
    State(sim): State<Arc<Simulator>>,
    Path((_endpoint, job_id)): Path<(String, String)>,
) -> Response {
    let jobs = sim.jobs.read().await;
    match jobs.get(&job_id) {
        Some(job) => Json(sim.snapshot(&job_id, job)).into_response(),
        None => reject(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("job {} not found", job_id),
        ),
    }
}

async fn health(State(sim): State<Arc<Simulator>>) -> Json<Value> {
    let jobs = sim.jobs.read().await;
    let mut counts: HashMap<&'static str, u64> = HashMap::new();
    for (id, job) in jobs.iter() {
        let key = match sim.snapshot(id, job).status {
            ProviderState::InQueue => "inQueue",
            ProviderState::InProgress => "inProgress",
            ProviderState::Completed => "completed",
            _ => "failed",
        };
        *counts.entry(key).or_default() += 1;
    }
    let running = counts.get("inProgress").copied().unwrap_or_default();

    Json(json!({
        "jobs": {
            "completed": counts.get("completed").copied().unwrap_or_default(),
            "failed": counts.get("failed").copied().unwrap_or_default(),
            "inProgress": running,
            "inQueue": counts.get("inQueue").copied().unwrap_or_default(),
        },
        "workers": {"idle": u64::from(running == 0), "running": running.min(1)},
        "mode": sim.mode().await,
    }))
}

async fn list_scenarios(State(sim): State<Arc<Simulator>>) -> Json<Value> {
    let scenarios: serde_json::Map<String, Value> = SimulationMode::ALL
        .into_iter()
        .map(|mode| (mode.as_str().to_string(), json!(mode.description())))
        .collect();
    Json(json!({"scenarios": scenarios, "current": sim.mode().await}))
}

#[derive(Debug, Deserialize)]
struct ScenarioChange {
    mode: SimulationMode,
}

async fn set_scenario(
    State(sim): State<Arc<Simulator>>,
    Json(change): Json<ScenarioChange>,
) -> Json<Value> {
    sim.set_mode(change.mode).await;
    Json(json!({"current": change.mode}))
}

async fn placeholder_image(Path(_job_id): Path<String>) -> Response {
    match STANDARD.decode(PLACEHOLDER_PNG_BASE64) {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
