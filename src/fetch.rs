use futures::StreamExt;
use futures::stream;

use crate::archive::ArchiveEntry;
use crate::archive::path::flatten_storage_key;
use crate::config::MAX_CONCURRENT_DOWNLOADS;
use crate::storage::{ObjectStore, StorageRef};

/// Downloaded objects ready for the archive.
#[derive(Debug, Default)]
pub struct FetchedBlobs {
    pub entries: Vec<ArchiveEntry>,
    /// Parallel to the input refs: where each object landed, or `None` if skipped.
    pub archived_as: Vec<Option<String>>,
}

impl FetchedBlobs {
    pub fn skipped(&self) -> usize {
        self.archived_as.iter().filter(|a| a.is_none()).count()
    }
}

/// `files/{seq:03}-{bucket}-{flattened key}`
pub fn blob_entry_path(sequence: usize, storage_ref: &StorageRef) -> String {
    format!(
        "files/{sequence:03}-{}-{}",
        storage_ref.bucket,
        flatten_storage_key(&storage_ref.path)
    )
}

/// Download every referenced object. Missing objects and store errors are
/// skipped; only successful downloads consume a sequence number.
pub async fn fetch_blobs(store: &dyn ObjectStore, refs: &[StorageRef]) -> FetchedBlobs {
    let downloads: Vec<Option<Vec<u8>>> = stream::iter(refs)
        .map(|r| async move {
            match store.download(r.bucket, &r.path).await {
                Ok(Some(bytes)) => Some(bytes),
                Ok(None) => {
                    tracing::debug!("{}/{} is not in the store, skipping", r.bucket, r.path);
                    None
                }
                Err(e) => {
                    tracing::warn!("Download of {}/{} failed, skipping: {e}", r.bucket, r.path);
                    None
                }
            }
        })
        .buffered(MAX_CONCURRENT_DOWNLOADS)
        .collect()
        .await;

    let mut fetched = FetchedBlobs::default();
    for (storage_ref, bytes) in refs.iter().zip(downloads) {
        match bytes {
            Some(bytes) => {
                let path = blob_entry_path(fetched.entries.len() + 1, storage_ref);
                fetched.entries.push(ArchiveEntry::new(path.clone(), bytes));
                fetched.archived_as.push(Some(path));
            }
            None => fetched.archived_as.push(None),
        }
    }

    tracing::info!(
        "Fetched {} of {} stored object(s)",
        fetched.entries.len(),
        refs.len()
    );
    fetched
}
