use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Bucket, ObjectStore};

/// In-memory object store for tests. Records every removal batch.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(Bucket, String), Vec<u8>>>,
    failing_downloads: Mutex<HashSet<(Bucket, String)>>,
    failing_buckets: Mutex<HashSet<Bucket>>,
    removals: Mutex<Vec<(Bucket, Vec<String>)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: Bucket, path: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket, path.to_string()), bytes.to_vec());
    }

    pub fn contains(&self, bucket: Bucket, path: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&(bucket, path.to_string()))
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Make downloads of this object return an error instead of bytes.
    pub fn fail_download(&self, bucket: Bucket, path: &str) {
        self.failing_downloads
            .lock()
            .unwrap()
            .insert((bucket, path.to_string()));
    }

    /// Make removals from this bucket return an error.
    pub fn fail_removals(&self, bucket: Bucket) {
        self.failing_buckets.lock().unwrap().insert(bucket);
    }

    pub fn removals(&self) -> Vec<(Bucket, Vec<String>)> {
        self.removals.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn download(&self, bucket: Bucket, path: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let key = (bucket, path.to_string());
        if self.failing_downloads.lock().unwrap().contains(&key) {
            anyhow::bail!("simulated download failure for {bucket}/{path}");
        }
        Ok(self.objects.lock().unwrap().get(&key).cloned())
    }

    async fn remove(&self, bucket: Bucket, paths: &[String]) -> anyhow::Result<()> {
        self.removals
            .lock()
            .unwrap()
            .push((bucket, paths.to_vec()));
        if self.failing_buckets.lock().unwrap().contains(&bucket) {
            anyhow::bail!("simulated removal failure for {bucket}");
        }
        let mut objects = self.objects.lock().unwrap();
        for path in paths {
            objects.remove(&(bucket, path.clone()));
        }
        Ok(())
    }
}
