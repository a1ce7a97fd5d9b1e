use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoredBlob {
    pub key: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    fn backend_tag(&self) -> &'static str {
        "unknown"
    }

    /// Returns only once the bytes are durable.
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>)
        -> Result<StoredBlob, AppError>;
}

fn expiry(ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
    Utc::now() + ttl
}

fn validate_key(key: &str) -> Result<(), AppError> {
    let path = Path::new(key);
    let safe = !key.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(AppError::Internal(format!("unsafe blob key: {key}")))
    }
}

pub struct InMemoryBlobStore {
    blobs: DashMap<String, (String, Vec<u8>)>,
    ttl: Duration,
}

impl InMemoryBlobStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            blobs: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.get(key).map(|entry| entry.value().1.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn put(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredBlob, AppError> {
        validate_key(key)?;
        let expires_at = expiry(self.ttl);
        self.blobs
            .insert(key.to_string(), (content_type.to_string(), bytes));

        Ok(StoredBlob {
            key: key.to_string(),
            url: format!("memory://{key}?expires={}", expires_at.timestamp()),
            expires_at,
        })
    }
}

/// Writes blobs under a local directory, fsyncing before the rename that
/// makes them visible.
pub struct FsBlobStore {
    root: PathBuf,
    ttl: Duration,
}

impl FsBlobStore {
    pub fn new(root: PathBuf, ttl: Duration) -> Self {
        Self { root, ttl }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

fn storage_error(action: &str, path: &Path, err: std::io::Error) -> AppError {
    AppError::Storage(format!("{action} {} failed: {err}", path.display()))
}

#[async_trait]
impl BlobStore for FsBlobStore {
    fn backend_tag(&self) -> &'static str {
        "localfs"
    }

    async fn put(
        &self,
        key: &str,
        _content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredBlob, AppError> {
        validate_key(key)?;
        let path = self.path_for(key);
        let parent = path
            .parent()
            .ok_or_else(|| AppError::Internal(format!("blob key has no parent: {key}")))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| storage_error("create dir", parent, err))?;

        let staging = path.with_extension("partial");
        let mut file = tokio::fs::File::create(&staging)
            .await
            .map_err(|err| storage_error("create", &staging, err))?;
        file.write_all(&bytes)
            .await
            .map_err(|err| storage_error("write", &staging, err))?;
        file.sync_all()
            .await
            .map_err(|err| storage_error("sync", &staging, err))?;
        drop(file);

        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|err| storage_error("rename", &path, err))?;

        let expires_at = expiry(self.ttl);
        Ok(StoredBlob {
            key: key.to_string(),
            url: format!("file://{}?expires={}", path.display(), expires_at.timestamp()),
            expires_at,
        })
    }
}
