// ABOUTME: `generate` command: submit, poll with a spinner, then save or print the result
// ABOUTME: Inline images are written to disk; URL results are printed

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use super::{job_client, poll_options, spinner};
use crate::config::Config;
use crate::jobs::{GenerationRequest, JobResult};

#[derive(Debug, Clone, Args)]
pub struct GenerateArgs {
    pub prompt: String,

    #[arg(long)]
    pub negative_prompt: Option<String>,

    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,

    #[arg(long)]
    pub steps: Option<u32>,

    #[arg(long)]
    pub guidance_scale: Option<f32>,

    /// -1 picks a random seed
    #[arg(long, allow_negative_numbers = true)]
    pub seed: Option<i64>,

    /// Adapter name, with or without the .safetensors extension
    #[arg(long)]
    pub lora: Option<String>,

    #[arg(long)]
    pub lora_strength: Option<f32>,

    #[arg(short, long, default_value = "output.png")]
    pub output: PathBuf,

    /// Seconds to wait before giving up on the job
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Seconds between status checks
    #[arg(long)]
    pub interval: Option<u64>,
}

impl GenerateArgs {
    pub fn request(&self) -> GenerationRequest {
        GenerationRequest {
            prompt: self.prompt.clone(),
            negative_prompt: self.negative_prompt.clone(),
            width: self.width,
            height: self.height,
            steps: self.steps,
            guidance_scale: self.guidance_scale,
            seed: self.seed,
            model_adapter_name: self.lora.clone(),
            model_adapter_strength: self.lora_strength,
        }
    }
}

pub async fn run(config: &Config, args: GenerateArgs) -> Result<()> {
    let options = poll_options(config, args.timeout, args.interval);
    let client = job_client(config, options)?;

    println!("Submitting: {}", args.prompt);
    let job_id = client.submit(args.request()).await?;
    println!("Job created: {}", job_id);

    let progress = spinner(format!("{} pending", job_id));
    let job = client
        .poll_with(&job_id, options, &CancellationToken::new(), |job| {
            progress.set_message(format!("{} {}", job.id, job.status))
        })
        .await;
    progress.finish_and_clear();
    let job = job?;

    match client.fetch_result(&job)? {
        JobResult::Bytes(bytes) => {
            tokio::fs::write(&args.output, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", args.output.display()))?;
            println!(
                "Saved {} ({} bytes) to {}",
                job.id,
                bytes.len(),
                args.output.display()
            );
        }
        JobResult::Url(url) => {
            println!("Image ready: {}", url);
        }
    }
    Ok(())
}
