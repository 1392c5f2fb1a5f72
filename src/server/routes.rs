// ABOUTME: Request handlers for the backend API
// ABOUTME: Submission returns immediately; a background poller tracks each job

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::jobs::request::{DEFAULT_HEIGHT, DEFAULT_WIDTH, RANDOM_SEED};
use crate::jobs::{GenerationRequest, JobView};
use crate::simulator::PLACEHOLDER_PNG_BASE64;

const PLACEHOLDER_SEED: i64 = 12345;

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "AI Image Generation API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let client = state.client()?;
    let job_id = client.submit(request).await?;
    state.spawn_poller(client, job_id.clone()).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"job_id": job_id, "status": "pending"})),
    ))
}

pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobView>> {
    state
        .store()
        .get(&job_id)
        .await
        .map(|job| Json(job.view()))
        .ok_or(ApiError::NotFound(job_id))
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<String>> {
    let jobs = state.store().list().await;
    Json(jobs.into_iter().map(|job| job.id).collect())
}

pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Value>> {
    if state.forget(&job_id).await {
        Ok(Json(json!({"job_id": job_id, "deleted": true})))
    } else {
        Err(ApiError::NotFound(job_id))
    }
}

/// Placeholder result for frontend work without a provider.
pub async fn test_local(Json(request): Json<GenerationRequest>) -> Json<Value> {
    let seed = match request.seed {
        None | Some(RANDOM_SEED) => PLACEHOLDER_SEED,
        Some(seed) => seed,
    };
    Json(json!({
        "image_base64": PLACEHOLDER_PNG_BASE64,
        "seed": seed,
        "prompt": request.prompt,
        "width": request.width.unwrap_or(DEFAULT_WIDTH),
        "height": request.height.unwrap_or(DEFAULT_HEIGHT),
    }))
}
