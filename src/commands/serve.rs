// ABOUTME: `serve` command: run the backend API in front of the provider
// ABOUTME: Starts without credentials too, answering generate requests with a configuration error

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::{job_client, poll_options};
use crate::config::Config;
use crate::server::{self, AppState};

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,
}

pub fn app_state(config: &Config) -> AppState {
    match job_client(config, poll_options(config, None, None)) {
        Ok(client) => AppState::new(Arc::new(client)),
        Err(err) => {
            tracing::warn!(error = %err, "Provider not configured; generation requests will fail");
            AppState::unconfigured()
        }
    }
}

pub async fn run(config: &Config, args: ServeArgs) -> Result<()> {
    let host = args.host.unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);
    let addr = format!("{}:{}", host, port);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(address = %addr, "Backend listening");

    server::serve(listener, app_state(config)).await?;
    Ok(())
}
