// ABOUTME: CLI subcommands and the helpers they share
// ABOUTME: Each command takes credentials from the environment and prints progress to stdout

pub mod generate;
pub mod lora;
pub mod serve;
pub mod simulate;
pub mod status;

use anyhow::Result;
use clap::Subcommand;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::AdapterResolver;
use crate::config::{self, Config};
use crate::jobs::{InMemoryJobStore, JobClient, PollOptions};
use crate::remote::RunPodProvider;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit a generation job, wait for it, and save the image
    Generate(generate::GenerateArgs),

    /// Show the provider's current status for a job
    Status {
        job_id: String,
    },

    /// Check the provider endpoint's health
    Health,

    /// Manage LoRA adapter files
    #[command(subcommand)]
    Lora(lora::LoraCommand),

    /// Run the backend API
    Serve(serve::ServeArgs),

    /// Run the local provider simulator
    Simulate(simulate::SimulateArgs),
}

pub async fn run(config: Config, command: Command) -> Result<()> {
    match command {
        Command::Generate(args) => generate::run(&config, args).await,
        Command::Status { job_id } => status::run_status(&config, &job_id).await,
        Command::Health => status::run_health(&config).await,
        Command::Lora(command) => lora::run(&config, command).await,
        Command::Serve(args) => serve::run(&config, args).await,
        Command::Simulate(args) => simulate::run(&config, args).await,
    }
}

pub(crate) fn provider(config: &Config) -> Result<Arc<RunPodProvider>> {
    Ok(Arc::new(RunPodProvider::from_config(
        &config.provider,
        config::api_key(),
    )?))
}

/// Lifecycle client for one CLI invocation. Adapters are checked only when a table is configured.
pub(crate) fn job_client(config: &Config, options: PollOptions) -> Result<JobClient> {
    let client = JobClient::new(provider(config)?, Arc::new(InMemoryJobStore::new()), options);
    if config.adapters.known.is_empty() {
        Ok(client)
    } else {
        Ok(client.with_resolver(AdapterResolver::from_config(&config.adapters)))
    }
}

pub(crate) fn poll_options(
    config: &Config,
    timeout: Option<u64>,
    interval: Option<u64>,
) -> PollOptions {
    let base = PollOptions::from_config(&config.provider);
    PollOptions::new(
        interval.map(|s| Duration::from_secs(s.max(1))).unwrap_or(base.interval),
        timeout.map(Duration::from_secs).unwrap_or(base.timeout),
    )
}

pub(crate) fn spinner(message: impl Into<String>) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::default_spinner());
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

pub(crate) fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
