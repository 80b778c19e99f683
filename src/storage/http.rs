use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;

use super::{Bucket, ObjectStore};

/// Object store speaking the storage REST API
/// (`/storage/v1/object/{bucket}/{key}`).
pub struct HttpObjectStore {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct RemoveBody<'a> {
    prefixes: &'a [String],
}

impl HttpObjectStore {
    pub fn new(base_url: &str, api_key: Option<&str>) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("Invalid storage URL '{base_url}': {e}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Storage URL '{base_url}' cannot carry a path");
        }
        let client = Client::builder()
            .user_agent(concat!("vehicle-archive/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.map(String::from),
        })
    }

    /// Each key segment is percent-encoded on its own, so `#`, `?` and `%`
    /// stay part of the object name. Dot segments are refused.
    fn object_url(&self, bucket: Bucket, key: &str) -> anyhow::Result<Url> {
        let key = key.trim_start_matches('/');
        let segments: Vec<&str> = key.split('/').collect();
        if segments.iter().any(|s| is_unsafe_segment(s)) {
            anyhow::bail!("Refusing storage key '{key}' in {bucket}");
        }
        let mut url = self.bucket_url(bucket)?;
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("Storage URL cannot carry a path"))?
            .extend(segments);
        Ok(url)
    }

    fn bucket_url(&self, bucket: Bucket) -> anyhow::Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("Storage URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["storage", "v1", "object", bucket.as_str()]);
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key).header("apikey", key),
            None => req,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn download(&self, bucket: Bucket, path: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let resp = self
            .authorize(self.client.get(self.object_url(bucket, path)?))
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(Some(resp.bytes().await?.to_vec())),
            // The storage API reports a missing object as 400 on some versions.
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => Ok(None),
            s => anyhow::bail!("Download of {bucket}/{path} failed: HTTP {s}"),
        }
    }

    async fn remove(&self, bucket: Bucket, paths: &[String]) -> anyhow::Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let resp = self
            .authorize(self.client.delete(self.bucket_url(bucket)?))
            .json(&RemoveBody { prefixes: paths })
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!(
                "Removal of {} object(s) from {bucket} failed: HTTP {}",
                paths.len(),
                resp.status()
            );
        }
        Ok(())
    }
}

/// Empty, `.` and `..` segments, including their percent-encoded spellings.
fn is_unsafe_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    matches!(decoded.as_str(), "" | "." | "..")
}
