// ABOUTME: `lora` subcommands: move adapter files through blob storage and onto the worker volume
// ABOUTME: Storage operations take any BlobStore; deploy and check go through the job client

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use dialoguer::Confirm;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{job_client, megabytes, poll_options, provider, spinner};
use crate::adapters::{adapter_filename, adapter_stem};
use crate::config::{self, Config};
use crate::jobs::{GenerationRequest, InMemoryJobStore, JobClient, JobResult};
use crate::storage::{self, adapter_key, BlobStore, StorageError};

const CHECK_PROMPT: &str = "anime girl with blue hair";

#[derive(Debug, Subcommand)]
pub enum LoraCommand {
    /// Upload a local .safetensors file to storage
    Upload {
        path: PathBuf,

        /// Stored name; defaults to the file name
        name: Option<String>,

        /// Overwrite an existing object without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// List adapters in storage
    List,

    /// Download an adapter from storage to a local file
    Download {
        name: String,

        output: Option<PathBuf>,
    },

    /// Stream an adapter from a URL straight into storage
    Transfer {
        url: String,

        name: String,

        /// Replace an existing object even if the size matches
        #[arg(long)]
        force: bool,
    },

    /// Have the worker download an adapter onto its volume
    Deploy {
        name: String,

        /// Download URL; defaults to the configured adapter table
        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Run a small test generation with an adapter
    Check {
        name: String,

        #[arg(long, default_value_t = 0.8)]
        strength: f32,

        #[arg(short, long, default_value = "lora_check.png")]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredAdapter {
    pub key: String,
    pub url: String,
    pub size: u64,
    pub sha256: String,
}

pub async fn run(config: &Config, command: LoraCommand) -> Result<()> {
    match command {
        LoraCommand::Upload { path, name, yes } => {
            let name = match name {
                Some(name) => name,
                None => file_name(&path)?,
            };
            let size = tokio::fs::metadata(&path)
                .await
                .with_context(|| format!("Cannot read {}", path.display()))?
                .len();
            println!("File: {} ({:.1} MB)", path.display(), megabytes(size));

            let store = connect(config).await?;
            let key = adapter_key(&config.storage.lora_prefix, &name);
            if let Some(existing) = store.head(&key).await? {
                let overwrite = yes
                    || Confirm::new()
                        .with_prompt(format!(
                            "{} already exists ({:.1} MB). Overwrite?",
                            key,
                            megabytes(existing)
                        ))
                        .default(false)
                        .interact()?;
                if !overwrite {
                    println!("Upload cancelled");
                    return Ok(());
                }
            }

            let stored =
                upload_file(store.as_ref(), &config.storage.lora_prefix, &path, &name).await?;
            print_stored(&stored);
            Ok(())
        }
        LoraCommand::List => {
            let store = connect(config).await?;
            let entries = store.list(&config.storage.lora_prefix).await?;
            if entries.is_empty() {
                println!("No adapters under {}", config.storage.lora_prefix);
                return Ok(());
            }
            let total: u64 = entries.iter().map(|e| e.size).sum();
            for entry in &entries {
                println!("{:>10.1} MB  {}", megabytes(entry.size), entry.key);
            }
            println!("{} adapters, {:.1} MB total", entries.len(), megabytes(total));
            Ok(())
        }
        LoraCommand::Download { name, output } => {
            let store = connect(config).await?;
            let output = output.unwrap_or_else(|| PathBuf::from(adapter_filename(&name)));
            let downloaded =
                download_to(store.as_ref(), &config.storage.lora_prefix, &name, &output).await?;
            println!(
                "Downloaded {} ({:.1} MB) to {}",
                adapter_filename(&name),
                megabytes(downloaded.size),
                output.display()
            );
            println!("SHA-256: {}", downloaded.sha256);
            Ok(())
        }
        LoraCommand::Transfer { url, name, force } => {
            let store = connect(config).await?;
            let prefix = &config.storage.lora_prefix;
            match transfer(store.as_ref(), prefix, &url, &name, force).await? {
                Some(stored) => print_stored(&stored),
                None => println!("{} already stored, skipping", adapter_filename(&name)),
            }
            Ok(())
        }
        LoraCommand::Deploy { name, url, timeout } => {
            let options = poll_options(config, timeout, None);
            let client = job_client(config, options)?;
            deploy(&client, &name, url.as_deref()).await
        }
        LoraCommand::Check {
            name,
            strength,
            output,
        } => check(config, &name, strength, &output).await,
    }
}

async fn connect(config: &Config) -> Result<Arc<dyn BlobStore>> {
    let api_key = config::api_key();
    Ok(storage::connect(&config.storage, api_key.as_deref()).await?)
}

fn file_name(path: &Path) -> Result<String> {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => Ok(name.to_string()),
        None => bail!("Cannot derive an adapter name from {}", path.display()),
    }
}

fn print_stored(stored: &StoredAdapter) {
    println!("Stored:  {}", stored.key);
    println!("Size:    {:.1} MB", megabytes(stored.size));
    println!("SHA-256: {}", stored.sha256);
    println!("URL:     {}", stored.url);
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Put `bytes` under the adapter key and confirm the stored size matches.
pub async fn store_adapter(
    store: &dyn BlobStore,
    prefix: &str,
    name: &str,
    bytes: Vec<u8>,
) -> Result<StoredAdapter> {
    let key = adapter_key(prefix, name);
    let size = bytes.len() as u64;
    let sha256 = sha256_hex(&bytes);
    let url = store.put(&key, bytes).await?;

    match store.head(&key).await? {
        Some(stored) if stored == size => {}
        Some(stored) => bail!(
            "Size mismatch after upload of {}: sent {} bytes, stored {}",
            key,
            size,
            stored
        ),
        None => bail!("{} is missing after upload", key),
    }
    tracing::info!(key = %key, size, "Adapter stored");
    Ok(StoredAdapter { key, url, size, sha256 })
}

pub async fn upload_file(
    store: &dyn BlobStore,
    prefix: &str,
    path: &Path,
    name: &str,
) -> Result<StoredAdapter> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Cannot read {}", path.display()))?;
    store_adapter(store, prefix, name, bytes).await
}

pub async fn download_to(
    store: &dyn BlobStore,
    prefix: &str,
    name: &str,
    output: &Path,
) -> Result<StoredAdapter> {
    let key = adapter_key(prefix, name);
    let bytes = match store.get(&key).await {
        Ok(bytes) => bytes,
        Err(StorageError::NotFound(_)) => bail!("Adapter {} not found in storage", key),
        Err(err) => return Err(err.into()),
    };
    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(StoredAdapter {
        url: output.display().to_string(),
        size: bytes.len() as u64,
        sha256: sha256_hex(&bytes),
        key,
    })
}

/// Stream `url` into storage. Returns `None` when an object of the same size is already there.
pub async fn transfer(
    store: &dyn BlobStore,
    prefix: &str,
    url: &str,
    name: &str,
    force: bool,
) -> Result<Option<StoredAdapter>> {
    let key = adapter_key(prefix, name);
    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;
    if !response.status().is_success() {
        bail!("Download of {} failed with HTTP {}", url, response.status());
    }

    let expected = response.content_length();
    if !force {
        if let (Some(expected), Some(existing)) = (expected, store.head(&key).await?) {
            if expected == existing {
                return Ok(None);
            }
        }
    }

    let bar = match expected {
        Some(len) => {
            let bar = ProgressBar::new(len);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner} [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
            ) {
                bar.set_style(style.progress_chars("=> "));
            }
            bar
        }
        None => ProgressBar::new_spinner(),
    };

    let mut bytes = Vec::with_capacity(expected.unwrap_or(0) as usize);
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| format!("Download of {} interrupted", url))?;
        bytes.extend_from_slice(&chunk);
        bar.set_position(bytes.len() as u64);
    }
    bar.finish_and_clear();

    if let Some(expected) = expected {
        if bytes.len() as u64 != expected {
            bail!("Download of {} truncated: {} of {} bytes", url, bytes.len(), expected);
        }
    }

    store_adapter(store, prefix, name, bytes).await.map(Some)
}

pub async fn deploy(client: &JobClient, name: &str, url: Option<&str>) -> Result<()> {
    println!("Deploying {} to the worker volume", adapter_filename(name));
    let job_id = client.deploy_adapter(name, url).await.map_err(|err| {
        print_manual_instructions(name, url);
        err
    })?;
    println!("Job created: {}", job_id);

    let progress = spinner(format!("{} downloading", job_id));
    let job = client
        .poll_with(&job_id, client.options(), &CancellationToken::new(), |job| {
            progress.set_message(format!("{} {}", job.id, job.status))
        })
        .await;
    progress.finish_and_clear();

    let job = match job.and_then(|job| job.into_completed()) {
        Ok(job) => job,
        Err(err) => {
            print_manual_instructions(name, url);
            return Err(err.into());
        }
    };

    match job.asset_receipt() {
        Some(receipt) => println!("Deployed to {} ({:.1} MB)", receipt.path, receipt.size_mb),
        None => println!(
            "Deploy finished: {}",
            job.output.map(|o| o.to_string()).unwrap_or_default()
        ),
    }
    Ok(())
}

fn print_manual_instructions(name: &str, url: Option<&str>) {
    println!();
    println!("To install the adapter by hand, open a shell on the worker and run:");
    println!("  cd /runpod-volume/ComfyUI/models/loras");
    println!(
        "  wget -O {} '{}'",
        adapter_filename(name),
        url.unwrap_or("<download url>")
    );
}

async fn check(config: &Config, name: &str, strength: f32, output: &Path) -> Result<()> {
    let provider = provider(config)?;
    let options = poll_options(config, None, None);
    // No resolver: the worker decides whether the adapter exists.
    let client = JobClient::new(provider, Arc::new(InMemoryJobStore::new()), options);

    let health = client.provider().health().await?;
    println!("Endpoint healthy: {}", health);

    let request = GenerationRequest {
        width: Some(512),
        height: Some(512),
        model_adapter_name: Some(adapter_stem(name).to_string()),
        model_adapter_strength: Some(strength),
        ..GenerationRequest::new(CHECK_PROMPT)
    };
    println!("Test generation with {} at strength {}", adapter_filename(name), strength);

    let progress = spinner("submitting");
    let started = tokio::time::Instant::now();
    let result = client.generate(request).await;
    progress.finish_and_clear();

    match result? {
        JobResult::Bytes(bytes) => {
            tokio::fs::write(output, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Adapter works. Image saved to {}", output.display());
        }
        JobResult::Url(url) => println!("Adapter works. Image: {}", url),
    }
    println!("Took {:.1}s", started.elapsed().as_secs_f64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;
    use axum::routing::get;
    use axum::Router;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;

    async fn serve_weights(body: &'static [u8]) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Router::new().route("/weights.safetensors", get(move || async move { body }));
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/weights.safetensors", addr)
    }

    // Announces more bytes than it sends, then hangs up.
    async fn serve_truncated() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\nshort")
                .await
                .unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}/weights.safetensors", addr)
    }

    #[tokio::test]
    async fn transfer_streams_url_into_store() {
        let url = serve_weights(b"new-weights").await;
        let store = MemoryBlobStore::default();

        let stored = transfer(&store, "loras", &url, "anime", false)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stored.key, "loras/anime.safetensors");
        assert_eq!(stored.size, 11);
        assert_eq!(store.get("loras/anime.safetensors").await.unwrap(), b"new-weights");
    }

    #[tokio::test]
    async fn transfer_skips_object_with_same_size() {
        let url = serve_weights(b"new-weights").await;
        let store = MemoryBlobStore::default();
        store.put("loras/anime.safetensors", b"old-weights".to_vec()).await.unwrap();

        let outcome = transfer(&store, "loras", &url, "anime", false).await.unwrap();

        assert!(outcome.is_none());
        assert_eq!(store.get("loras/anime.safetensors").await.unwrap(), b"old-weights");
    }

    #[tokio::test]
    async fn forced_transfer_replaces_object_with_same_size() {
        let url = serve_weights(b"new-weights").await;
        let store = MemoryBlobStore::default();
        store.put("loras/anime.safetensors", b"old-weights".to_vec()).await.unwrap();

        let outcome = transfer(&store, "loras", &url, "anime", true).await.unwrap();

        assert!(outcome.is_some());
        assert_eq!(store.get("loras/anime.safetensors").await.unwrap(), b"new-weights");
    }

    #[tokio::test]
    async fn truncated_download_is_not_stored() {
        let url = serve_truncated().await;
        let store = MemoryBlobStore::default();

        let result = transfer(&store, "loras", &url, "anime", false).await;

        assert!(result.is_err());
        assert_eq!(store.head("loras/anime.safetensors").await.unwrap(), None);
    }

    #[test]
    fn sha256_matches_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn upload_stores_under_prefix_with_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mix4.safetensors");
        std::fs::write(&path, b"weights").unwrap();

        let store = MemoryBlobStore::default();
        let stored = upload_file(&store, "models/loras/", &path, "mix4").await.unwrap();

        assert_eq!(stored.key, "models/loras/mix4.safetensors");
        assert_eq!(stored.size, 7);
        assert_eq!(stored.sha256, sha256_hex(b"weights"));
        assert_eq!(store.get(&stored.key).await.unwrap(), b"weights");
    }

    #[tokio::test]
    async fn download_writes_stored_bytes() {
        let store = MemoryBlobStore::default();
        store_adapter(&store, "loras", "style.safetensors", b"abc".to_vec())
            .await
            .unwrap();

        let dir = tempdir().unwrap();
        let out = dir.path().join("style.safetensors");
        let downloaded = download_to(&store, "loras", "style", &out).await.unwrap();

        assert_eq!(downloaded.size, 3);
        assert_eq!(downloaded.key, "loras/style.safetensors");
        assert_eq!(std::fs::read(out).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn download_of_missing_adapter_fails() {
        let store = MemoryBlobStore::default();
        let dir = tempdir().unwrap();
        let err = download_to(&store, "loras", "ghost", &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn file_name_comes_from_path() {
        assert_eq!(
            file_name(Path::new("/tmp/anime_style.safetensors")).unwrap(),
            "anime_style.safetensors"
        );
    }
}
