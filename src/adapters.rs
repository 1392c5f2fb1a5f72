// ABOUTME: Resolves LoRA adapter names to a local weight file or a download URL
// ABOUTME: Local search directories win over the configured name-to-URL table

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::AdapterConfig;

pub const ADAPTER_EXTENSION: &str = ".safetensors";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterLocation {
    LocalPath(PathBuf),
    Url(String),
    NotFound,
}

#[derive(Debug, Clone, Default)]
pub struct AdapterResolver {
    search_dirs: Vec<PathBuf>,
    known: BTreeMap<String, String>,
}

impl AdapterResolver {
    pub fn new(search_dirs: Vec<PathBuf>, known: BTreeMap<String, String>) -> Self {
        Self { search_dirs, known }
    }

    pub fn from_config(config: &AdapterConfig) -> Self {
        Self::new(config.search_dirs.clone(), config.known.clone())
    }

    pub fn resolve(&self, name: &str) -> AdapterLocation {
        let filename = adapter_filename(name);

        if let Some(path) = self
            .search_dirs
            .iter()
            .map(|dir| dir.join(&filename))
            .find(|path| path.is_file())
        {
            return AdapterLocation::LocalPath(path);
        }

        match self.known_url(name) {
            Some(url) => AdapterLocation::Url(url.to_string()),
            None => AdapterLocation::NotFound,
        }
    }

    /// Table entries may be keyed with or without the extension.
    pub fn known_url(&self, name: &str) -> Option<&str> {
        let filename = adapter_filename(name);
        self.known
            .get(&filename)
            .or_else(|| self.known.get(adapter_stem(&filename)))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

/// `mix4` and `mix4.safetensors` both name the file `mix4.safetensors`.
pub fn adapter_filename(name: &str) -> String {
    let name = name.trim();
    if name.ends_with(ADAPTER_EXTENSION) {
        name.to_string()
    } else {
        format!("{}{}", name, ADAPTER_EXTENSION)
    }
}

pub fn adapter_stem(name: &str) -> &str {
    name.trim()
        .strip_suffix(ADAPTER_EXTENSION)
        .unwrap_or_else(|| name.trim())
}
