// ABOUTME: In-process blob store for tests and offline runs
// ABOUTME: Keys map to byte vectors behind an async RwLock

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{validate_key, BlobEntry, BlobStore, StorageError};

pub struct MemoryBlobStore {
    base_url: String,
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://")
    }
}

// A bare scheme like `memory://` is kept whole.
fn join_url(base: &str, key: &str) -> String {
    if base.ends_with("://") {
        format!("{}{}", base, key)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), key)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        validate_key(key)?;
        self.objects.write().await.insert(key.to_string(), bytes);
        Ok(join_url(&self.base_url, key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, StorageError> {
        Ok(self
            .objects
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, bytes)| BlobEntry {
                key: key.clone(),
                size: bytes.len() as u64,
            })
            .collect())
    }

    async fn head(&self, key: &str) -> Result<Option<u64>, StorageError> {
        Ok(self.objects.read().await.get(key).map(|b| b.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_is_byte_identical() {
        let store = MemoryBlobStore::default();
        let bytes: Vec<u8> = (0..=255).collect();
        let url = store.put("models/loras/x.safetensors", bytes.clone()).await.unwrap();
        assert_eq!(url, "memory://models/loras/x.safetensors");
        assert_eq!(store.get("models/loras/x.safetensors").await.unwrap(), bytes);
    }

    #[tokio::test]
    async fn urls_join_base_and_key() {
        let store = MemoryBlobStore::new("https://cdn.example/");
        let url = store.put("a/b.png", vec![1]).await.unwrap();
        assert_eq!(url, "https://cdn.example/a/b.png");
    }

    #[tokio::test]
    async fn last_write_wins() {
        let store = MemoryBlobStore::default();
        store.put("k", vec![1]).await.unwrap();
        store.put("k", vec![2, 2]).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), vec![2, 2]);
        assert_eq!(store.head("k").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = MemoryBlobStore::default();
        store.put("models/loras/a.safetensors", vec![0; 3]).await.unwrap();
        store.put("models/loras/b.safetensors", vec![0; 5]).await.unwrap();
        store.put("models/checkpoints/c.safetensors", vec![0; 7]).await.unwrap();

        let entries = store.list("models/loras/").await.unwrap();
        assert_eq!(
            entries,
            vec![
                BlobEntry { key: "models/loras/a.safetensors".into(), size: 3 },
                BlobEntry { key: "models/loras/b.safetensors".into(), size: 5 },
            ]
        );
    }

    #[tokio::test]
    async fn missing_object() {
        let store = MemoryBlobStore::default();
        assert!(matches!(store.get("nope").await, Err(StorageError::NotFound(_))));
        assert_eq!(store.head("nope").await.unwrap(), None);
    }
}
