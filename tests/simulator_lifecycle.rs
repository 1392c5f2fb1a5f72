// ABOUTME: End-to-end job lifecycle tests against the local simulator over HTTP
// ABOUTME: Covers each simulation mode plus adapter deployment and URL results

mod common;

use assert_matches::assert_matches;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use imagegen_ops::jobs::{GenerationRequest, JobResult, JobStatus};
use imagegen_ops::remote::InferenceProvider;
use imagegen_ops::simulator::{ResultDelivery, SimulationMode};
use imagegen_ops::JobError;

#[tokio::test]
async fn normal_mode_produces_png_bytes() {
    let (addr, _sim) = common::spawn_simulator(common::fast_config(SimulationMode::Normal)).await;
    let client = common::client(addr, Duration::from_secs(5));

    let result = client.generate(GenerationRequest::new("a cat")).await.unwrap();

    let bytes = assert_matches!(result, JobResult::Bytes(bytes) => bytes);
    assert_eq!(&bytes[..4], b"\x89PNG");
}

#[tokio::test]
async fn status_progresses_through_pending_and_running() {
    let (addr, _sim) = common::spawn_simulator(common::fast_config(SimulationMode::Normal)).await;
    let client = common::client(addr, Duration::from_secs(5));
    let job_id = client.submit(GenerationRequest::new("a cat")).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let job = client
        .poll_with(&job_id, client.options(), &CancellationToken::new(), move |job| {
            sink.lock().unwrap().push(job.status)
        })
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.last(), Some(&JobStatus::Completed));
    assert!(seen.windows(2).all(|w| w[0].can_transition_to(w[1]) || w[0] == w[1]));
}

#[tokio::test]
async fn workflow_error_surfaces_as_provider_failure() {
    let (addr, _sim) = common::spawn_simulator(common::fast_config(SimulationMode::Error)).await;
    let client = common::client(addr, Duration::from_secs(5));

    let err = client.generate(GenerationRequest::new("a cat")).await.unwrap_err();

    assert_matches!(err, JobError::ProviderFailure { message, .. } => {
        assert!(message.contains("Simulated ComfyUI error"));
    });
}

#[tokio::test]
async fn handler_error_fails_without_queueing() {
    let (addr, _sim) =
        common::spawn_simulator(common::fast_config(SimulationMode::HandlerError)).await;
    let client = common::client(addr, Duration::from_secs(5));
    let job_id = client.submit(GenerationRequest::new("a cat")).await.unwrap();

    let job = client.status(&job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("400 Client Error"));
}

#[tokio::test]
async fn stuck_queue_times_out_on_the_client() {
    let (addr, _sim) =
        common::spawn_simulator(common::fast_config(SimulationMode::QueueStuck)).await;
    let client = common::client(addr, Duration::from_millis(200));
    let job_id = client.submit(GenerationRequest::new("a cat")).await.unwrap();

    let job = client.poll(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::TimedOut);

    let err = client.fetch_result(&job).unwrap_err();
    assert_matches!(err, JobError::TimeoutExceeded { .. });
}

#[tokio::test]
async fn endless_generation_times_out_while_running() {
    let (addr, _sim) = common::spawn_simulator(common::fast_config(SimulationMode::Timeout)).await;
    let client = common::client(addr, Duration::from_millis(300));

    let err = client.generate(GenerationRequest::new("a cat")).await.unwrap_err();

    assert_matches!(err, JobError::TimeoutExceeded { .. });
}

#[tokio::test]
async fn negative_seed_is_rejected_before_submission() {
    let (addr, sim) = common::spawn_simulator(common::fast_config(SimulationMode::Normal)).await;
    let client = common::client(addr, Duration::from_secs(5));

    let request = GenerationRequest {
        seed: Some(-5),
        ..GenerationRequest::new("a cat")
    };
    let err = client.submit(request).await.unwrap_err();

    assert_matches!(err, JobError::Validation(_));
    let health = client.provider().health().await.unwrap();
    assert_eq!(health["jobs"]["inQueue"], 0);
    assert_eq!(sim.mode().await, SimulationMode::Normal);
}

#[tokio::test]
async fn mode_switch_applies_to_new_jobs_only() {
    let (addr, sim) = common::spawn_simulator(common::fast_config(SimulationMode::Normal)).await;
    let client = common::client(addr, Duration::from_secs(5));

    let first = client.submit(GenerationRequest::new("first")).await.unwrap();
    sim.set_mode(SimulationMode::Error).await;
    let second = client.submit(GenerationRequest::new("second")).await.unwrap();

    assert_eq!(client.poll(&first).await.unwrap().status, JobStatus::Completed);
    assert_eq!(client.poll(&second).await.unwrap().status, JobStatus::Failed);
}

#[tokio::test]
async fn url_delivery_returns_fetchable_url() {
    let config = imagegen_ops::simulator::SimulatorConfig {
        delivery: ResultDelivery::Url,
        ..common::fast_config(SimulationMode::Normal)
    };
    let (addr, _sim) = common::spawn_simulator(config).await;
    let client = common::client(addr, Duration::from_secs(5));

    let result = client.generate(GenerationRequest::new("a cat")).await.unwrap();

    let url = assert_matches!(result, JobResult::Url(url) => url);
    let response = reqwest::get(&url).await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(&response.bytes().await.unwrap()[..4], b"\x89PNG");
}

#[tokio::test]
async fn deploy_adapter_reports_volume_path() {
    let (addr, _sim) = common::spawn_simulator(common::fast_config(SimulationMode::Normal)).await;
    let client = common::client(addr, Duration::from_secs(5));

    let job_id = client
        .deploy_adapter("anime_style", Some("https://example.com/anime_style.safetensors"))
        .await
        .unwrap();
    let job = client.poll(&job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    let receipt = job.asset_receipt().unwrap();
    assert_eq!(
        receipt.path,
        "/runpod-volume/ComfyUI/models/loras/anime_style.safetensors"
    );
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let (addr, _sim) = common::spawn_simulator(common::fast_config(SimulationMode::Normal)).await;
    let client = common::client(addr, Duration::from_secs(5));

    let err = client.status("sim-missing").await.unwrap_err();

    assert_matches!(err, JobError::NotFound(_));
}
