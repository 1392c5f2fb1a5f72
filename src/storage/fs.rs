// ABOUTME: Blob store backed by a local directory tree
// ABOUTME: Object keys map to relative paths beneath the root

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{validate_key, BlobEntry, BlobStore, StorageError};

/// Suffix of in-flight writes. Keys may not end with it and listings skip it.
const STAGING_SUFFIX: &str = ".imagegen-staging";

fn is_staging_name(name: &str) -> bool {
    name.ends_with(STAGING_SUFFIX)
}

pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl FsBlobStore {
    pub fn new(root: PathBuf, public_base_url: Option<String>) -> Self {
        Self {
            root,
            public_base_url,
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        if key.split('/').any(is_staging_name) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }

    fn url_for(&self, key: &str, path: &Path) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!("file://{}", path.display()),
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write beside the target and rename so readers never see a partial file.
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;
        let staging = path.with_file_name(format!(
            ".{}.{}{}",
            file_name,
            uuid::Uuid::new_v4().simple(),
            STAGING_SUFFIX
        ));
        tokio::fs::write(&staging, &bytes).await?;
        if let Err(err) = tokio::fs::rename(&staging, &path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(err.into());
        }
        Ok(self.url_for(key, &path))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, StorageError> {
        let mut entries = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut reader = match tokio::fs::read_dir(&dir).await {
                Ok(reader) => reader,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = reader.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if is_staging_name(&entry.file_name().to_string_lossy()) {
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    entries.push(BlobEntry {
                        key,
                        size: entry.metadata().await?.len(),
                    });
                }
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn head(&self, key: &str) -> Result<Option<u64>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf(), None);
        let bytes = b"\x00\x01safetensors\xff".to_vec();

        let url = store.put("models/loras/mix4.safetensors", bytes.clone()).await.unwrap();
        assert!(url.starts_with("file://"));
        assert_eq!(store.get("models/loras/mix4.safetensors").await.unwrap(), bytes);
        assert_eq!(
            store.head("models/loras/mix4.safetensors").await.unwrap(),
            Some(bytes.len() as u64)
        );
    }

    #[tokio::test]
    async fn public_url_uses_base() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf(), Some("https://cdn.example/".into()));
        let url = store.put("flux/job-1/image.png", vec![1]).await.unwrap();
        assert_eq!(url, "https://cdn.example/flux/job-1/image.png");
    }

    #[tokio::test]
    async fn list_walks_nested_directories() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf(), None);
        store.put("models/loras/a.safetensors", vec![0; 4]).await.unwrap();
        store.put("models/loras/sub/b.safetensors", vec![0; 2]).await.unwrap();
        store.put("other/c.bin", vec![0; 1]).await.unwrap();

        let keys: Vec<String> = store
            .list("models/loras/")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(
            keys,
            vec!["models/loras/a.safetensors", "models/loras/sub/b.safetensors"]
        );
    }

    #[tokio::test]
    async fn missing_root_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path().join("absent"), None);
        assert!(store.list("").await.unwrap().is_empty());
        assert!(matches!(store.get("x").await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn put_leaves_sibling_keys_untouched() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf(), None);
        store.put("loras/mix4.partial", b"AAAA".to_vec()).await.unwrap();
        store.put("loras/mix4.tmp", b"CCC".to_vec()).await.unwrap();
        store.put("loras/mix4.safetensors", b"BB".to_vec()).await.unwrap();

        assert_eq!(store.get("loras/mix4.partial").await.unwrap(), b"AAAA");
        assert_eq!(store.get("loras/mix4.tmp").await.unwrap(), b"CCC");
        assert_eq!(store.get("loras/mix4.safetensors").await.unwrap(), b"BB");
        assert_eq!(store.list("loras/").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn leftover_staging_files_are_not_listed() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf(), None);
        store.put("loras/a.safetensors", vec![0; 3]).await.unwrap();
        let leftover = dir
            .path()
            .join("loras")
            .join(format!(".b.safetensors.0123{}", STAGING_SUFFIX));
        std::fs::write(&leftover, b"half").unwrap();

        let keys: Vec<String> = store
            .list("loras/")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["loras/a.safetensors"]);
        assert!(matches!(
            store.put("loras/x.imagegen-staging", vec![1]).await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf(), None);
        assert!(matches!(
            store.put("../escape", vec![1]).await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
