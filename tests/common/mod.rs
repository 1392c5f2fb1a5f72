// ABOUTME: Shared helpers for integration tests
// ABOUTME: Runs the simulator on an ephemeral port and builds clients against it

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use imagegen_ops::jobs::{InMemoryJobStore, JobClient, PollOptions};
use imagegen_ops::remote::RunPodProvider;
use imagegen_ops::simulator::{self, SimulationMode, Simulator, SimulatorConfig};

pub const ENDPOINT_ID: &str = "test-endpoint";

pub fn fast_config(mode: SimulationMode) -> SimulatorConfig {
    SimulatorConfig {
        mode,
        queue_delay_ms: 30,
        generation_time_ms: 60,
        ..SimulatorConfig::default()
    }
}

pub async fn spawn_simulator(mut config: SimulatorConfig) -> (SocketAddr, Arc<Simulator>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.port = addr.port();
    let sim = Arc::new(Simulator::new(config));
    let app = simulator::router(Arc::clone(&sim));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, sim)
}

pub fn provider(addr: SocketAddr) -> Arc<RunPodProvider> {
    Arc::new(
        RunPodProvider::new(
            &format!("http://{}", addr),
            ENDPOINT_ID,
            "test-key".to_string(),
            Duration::from_secs(5),
        )
        .unwrap(),
    )
}

pub fn options(timeout: Duration) -> PollOptions {
    PollOptions::new(Duration::from_millis(10), timeout)
}

pub fn client(addr: SocketAddr, timeout: Duration) -> JobClient {
    JobClient::new(
        provider(addr),
        Arc::new(InMemoryJobStore::new()),
        options(timeout),
    )
}
