// ABOUTME: Configuration loading from an optional TOML file plus environment overrides
// ABOUTME: Secrets are only ever read from the environment, never from the file

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::JobError;
use crate::simulator::SimulatorConfig;

pub const API_KEY_VAR: &str = "RUNPOD_API_KEY";
pub const CONFIG_PATH_VAR: &str = "IMAGEGEN_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub adapters: AdapterConfig,
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_base: String,
    pub endpoint_id: Option<String>,
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.runpod.ai/v2".to_string(),
            endpoint_id: None,
            poll_interval_secs: 2,
            timeout_secs: 300,
            request_timeout_secs: 30,
        }
    }
}

impl ProviderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Secrets endpoint that hands out S3 credentials for the network volume.
    pub credentials_url: Option<String>,
    /// Overrides the bucket returned by the secrets endpoint.
    pub bucket: Option<String>,
    pub region: String,
    /// Prefix under which adapter weight files live in the bucket.
    pub lora_prefix: String,
    pub public_base_url: Option<String>,
    /// Serve blobs from a local directory instead of S3.
    pub local_root: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credentials_url: None,
            bucket: None,
            region: "US-KS-2".to_string(),
            lora_prefix: "models/loras/".to_string(),
            public_base_url: None,
            local_root: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub search_dirs: Vec<PathBuf>,
    /// Adapter name to public download URL.
    pub known: BTreeMap<String, String>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            search_dirs: vec![
                PathBuf::from("/ComfyUI/models/loras"),
                PathBuf::from("/workspace/ComfyUI/models/loras"),
                PathBuf::from("/runpod-volume/ComfyUI/models/loras"),
            ],
            known: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load the config file (if any) and overlay the process environment.
    ///
    /// `.env` files are honoured via `dotenvy` before the overlay runs.
    pub fn load(path: Option<&Path>) -> Result<Self, JobError> {
        dotenvy::dotenv().ok();

        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, JobError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            JobError::Configuration(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw).map_err(|e| match e {
            JobError::Configuration(msg) => {
                JobError::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, JobError> {
        toml::from_str(raw).map_err(|e| JobError::Configuration(format!("Invalid config: {}", e)))
    }

    /// Apply environment overrides through `lookup` so tests never touch the real environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), JobError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("RUNPOD_ENDPOINT_ID") {
            self.provider.endpoint_id = Some(v);
        }
        if let Some(v) = get("RUNPOD_API_BASE") {
            self.provider.api_base = v;
        }
        if let Some(v) = get("IMAGEGEN_POLL_INTERVAL_SECS") {
            self.provider.poll_interval_secs = parse_var("IMAGEGEN_POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("IMAGEGEN_TIMEOUT_SECS") {
            self.provider.timeout_secs = parse_var("IMAGEGEN_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("S3_CREDENTIALS_URL") {
            self.storage.credentials_url = Some(v);
        }
        if let Some(v) = get("S3_BUCKET") {
            self.storage.bucket = Some(v);
        }
        if let Some(v) = get("S3_REGION") {
            self.storage.region = v;
        }
        if let Some(v) = get("S3_PUBLIC_BASE_URL") {
            self.storage.public_base_url = Some(v);
        }
        if let Some(v) = get("IMAGEGEN_STORAGE_DIR") {
            self.storage.local_root = Some(PathBuf::from(v));
        }
        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PORT") {
            self.server.port = parse_var("PORT", &v)?;
        }
        Ok(())
    }
}

/// The provider API key, if present and non-empty.
pub fn api_key() -> Option<String> {
    std::env::var(API_KEY_VAR)
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, JobError> {
    value
        .trim()
        .parse()
        .map_err(|_| JobError::Configuration(format!("{} must be a number, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_production_endpoint() {
        let config = Config::default();
        assert_eq!(config.provider.api_base, "https://api.runpod.ai/v2");
        assert_eq!(config.provider.timeout(), Duration::from_secs(300));
        assert_eq!(config.storage.lora_prefix, "models/loras/");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.adapters.search_dirs.len(), 3);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [provider]
            endpoint_id = "3s0v4wilu6dp30"
            timeout_secs = 540

            [adapters.known]
            mix4 = "https://storage.example/loras/mix4.safetensors"
            "#,
        )
        .unwrap();

        assert_eq!(config.provider.endpoint_id.as_deref(), Some("3s0v4wilu6dp30"));
        assert_eq!(config.provider.timeout_secs, 540);
        assert_eq!(config.provider.poll_interval_secs, 2);
        assert_eq!(config.storage.region, "US-KS-2");
        assert_eq!(config.adapters.known.len(), 1);
    }

    #[test]
    fn invalid_toml_is_a_configuration_error() {
        assert_matches!(
            Config::from_toml_str("[provider\nendpoint_id = 1"),
            Err(JobError::Configuration(_))
        );
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("RUNPOD_ENDPOINT_ID", "from-env"),
            ("PORT", "9000"),
            ("S3_BUCKET", "test-bucket"),
            ("HOST", "   "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::from_toml_str("[provider]\nendpoint_id = \"from-file\"").unwrap();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.provider.endpoint_id.as_deref(), Some("from-env"));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.bucket.as_deref(), Some("test-bucket"));
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env(|k| (k == "PORT").then(|| "eighty".to_string()));
        assert_matches!(result, Err(JobError::Configuration(msg)) if msg.contains("PORT"));
    }

    #[test]
    fn poll_interval_never_zero() {
        let provider = ProviderConfig {
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(provider.poll_interval(), Duration::from_secs(1));
    }
}
