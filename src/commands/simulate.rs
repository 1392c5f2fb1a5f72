// ABOUTME: `simulate` command: serve the local provider stand-in
// ABOUTME: Flags override the [simulator] config section for this run

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::simulator::{self, ResultDelivery, SimulationMode, Simulator};

#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    /// normal, slow, error, handler_error, queue_stuck or timeout
    #[arg(long)]
    pub mode: Option<SimulationMode>,

    #[arg(long)]
    pub port: Option<u16>,

    /// Return image URLs instead of inline base64
    #[arg(long)]
    pub url_results: bool,
}

pub async fn run(config: &Config, args: SimulateArgs) -> Result<()> {
    let mut sim_config = config.simulator.clone();
    if let Some(mode) = args.mode {
        sim_config.mode = mode;
    }
    if let Some(port) = args.port {
        sim_config.port = port;
    }
    if args.url_results {
        sim_config.delivery = ResultDelivery::Url;
    }

    let addr = format!("{}:{}", sim_config.host, sim_config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(address = %addr, mode = %sim_config.mode, "Simulator listening");
    println!("Simulator on http://{}", addr);
    println!("Point the client at it with RUNPOD_API_BASE=http://{}", addr);
    for mode in SimulationMode::ALL {
        println!("  {:<14} {}", mode.as_str(), mode.description());
    }

    let app =
        simulator::router(Arc::new(Simulator::new(sim_config))).layer(TraceLayer::new_for_http());
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
