use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;

use super::{Bucket, ObjectStore};
use crate::archive::path::storage_key_components;

/// Object store backed by a local directory: `<root>/<bucket>/<key>`.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve a key under the bucket directory. Keys that sanitize to nothing
    /// cannot name an object.
    fn object_path(&self, bucket: Bucket, key: &str) -> Option<PathBuf> {
        let mut path = self.root.join(bucket.as_str());
        for part in storage_key_components(key)? {
            path.push(part);
        }
        Some(path)
    }

    #[cfg(test)]
    pub async fn put(&self, bucket: Bucket, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let path = self
            .object_path(bucket, key)
            .ok_or_else(|| anyhow::anyhow!("Invalid storage key '{key}'"))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn download(&self, bucket: Bucket, path: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let Some(file) = self.object_path(bucket, path) else {
            return Ok(None);
        };
        match tokio::fs::read(&file).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Every key is resolved before anything is deleted; a key that cannot
    /// name an object fails the whole batch.
    async fn remove(&self, bucket: Bucket, paths: &[String]) -> anyhow::Result<()> {
        let files = paths
            .iter()
            .map(|key| {
                self.object_path(bucket, key)
                    .ok_or_else(|| anyhow::anyhow!("Invalid storage key '{key}' in {bucket}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        for file in files {
            match tokio::fs::remove_file(&file).await {
                Ok(()) => tracing::debug!("Removed {}", file.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
