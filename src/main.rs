// ABOUTME: CLI entry point for imagegen-ops
// ABOUTME: Parses arguments, sets up tracing and dispatches to a command

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imagegen_ops::commands::{self, Command};
use imagegen_ops::config::Config;

#[derive(Parser)]
#[command(name = "imagegen-ops")]
#[command(about = "Run and track image generation jobs on a serverless endpoint", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML config file (defaults to $IMAGEGEN_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "imagegen_ops=debug,tower_http=debug"
    } else {
        "imagegen_ops=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match Config::load(cli.config.as_deref()) {
        Ok(config) => commands::run(config, cli.command).await,
        Err(err) => Err(err.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
