pub mod fs;
pub mod http;
#[cfg(test)]
pub mod memory;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::StorageConfig;

/// Buckets that may hold vehicle binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Bucket {
    #[serde(rename = "vehicle-documents")]
    VehicleDocuments,
    #[serde(rename = "vehicle-media")]
    VehicleMedia,
    #[serde(rename = "attachments")]
    Attachments,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [
        Bucket::VehicleDocuments,
        Bucket::VehicleMedia,
        Bucket::Attachments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::VehicleDocuments => "vehicle-documents",
            Bucket::VehicleMedia => "vehicle-media",
            Bucket::Attachments => "attachments",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Bucket::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| format!("unknown bucket '{s}'"))
    }
}

/// A binary object in the object store, named by bucket and key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRef {
    pub bucket: Bucket,
    pub path: String,
    pub origin_entity_id: String,
}

impl StorageRef {
    /// Build a reference from raw row columns. Missing, blank, or unknown
    /// values yield `None`. A usable key is kept byte for byte.
    pub fn from_columns(
        bucket: Option<&str>,
        path: Option<&str>,
        origin_entity_id: impl Into<String>,
    ) -> Option<Self> {
        let bucket = bucket.map(str::trim).filter(|b| !b.is_empty())?;
        let path = path.filter(|p| !p.trim().is_empty())?;
        let bucket = match bucket.parse::<Bucket>() {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!("Dropping storage reference: {e}");
                return None;
            }
        };
        Some(Self {
            bucket,
            path: path.to_string(),
            origin_entity_id: origin_entity_id.into(),
        })
    }
}

/// Drop repeated (bucket, path) pairs, keeping the first occurrence.
pub fn dedup_refs(refs: Vec<StorageRef>) -> Vec<StorageRef> {
    let mut seen = HashSet::new();
    refs.into_iter()
        .filter(|r| seen.insert((r.bucket, r.path.clone())))
        .collect()
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch an object. `Ok(None)` means the object does not exist.
    async fn download(&self, bucket: Bucket, path: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Remove a batch of objects from one bucket. Absent objects are not an error.
    async fn remove(&self, bucket: Bucket, paths: &[String]) -> anyhow::Result<()>;
}

/// Build the configured object store.
pub fn build_object_store(config: &StorageConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match config {
        StorageConfig::Filesystem { root } => Arc::new(fs::FsObjectStore::new(root.clone())),
        StorageConfig::Http { base_url, api_key } => {
            Arc::new(http::HttpObjectStore::new(base_url, api_key.as_deref())?)
        }
    };
    tracing::debug!("Using object store '{}'", store.name());
    Ok(store)
}
