// ABOUTME: One-shot `status` and `health` commands against the provider endpoint
// ABOUTME: Prints the provider's view without waiting for a terminal state

use anyhow::Result;

use super::{job_client, poll_options, provider};
use crate::config::Config;
use crate::jobs::JobOutput;
use crate::remote::InferenceProvider;

pub async fn run_status(config: &Config, job_id: &str) -> Result<()> {
    let client = job_client(config, poll_options(config, None, None))?;
    let job = client.status(job_id).await?;

    println!("Job:     {}", job.id);
    println!("Status:  {}", job.status);
    if let Some(error) = &job.error {
        println!("Error:   {}", error);
    }
    match job.job_output() {
        Some(JobOutput::ImageUrl(url)) => println!("Image:   {}", url),
        Some(JobOutput::ImageBytesBase64(b64)) => {
            println!("Image:   inline, {} base64 characters", b64.len())
        }
        None => {
            if let Some(receipt) = job.asset_receipt() {
                println!("Path:    {} ({:.1} MB)", receipt.path, receipt.size_mb);
            }
        }
    }
    Ok(())
}

pub async fn run_health(config: &Config) -> Result<()> {
    let provider = provider(config)?;
    println!("Checking endpoint {}", provider.endpoint_url());
    let health = provider.health().await?;
    println!("Endpoint is reachable");
    println!("{}", serde_json::to_string_pretty(&health)?);
    Ok(())
}
