//! Registry-backed batch image downloader
//!
//! Each media asset directory holds the downloaded files plus a
//! `registry.json` mapping source URLs to file ids and extensions. Files are
//! named `<uuid>.<ext>`, the extension coming from the decoded image format,
//! so the mapping is only discoverable through the registry.
//!
//! A batch is all-or-nothing: the registry is written only when every
//! non-empty URL of the batch is registered, otherwise the files written by
//! the batch are removed and the batch fails.

use crate::error::{MetadataError, Result};
use bridge_traits::http::{HttpClient, HttpRequest};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

pub const REGISTRY_FILE_NAME: &str = "registry.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Registry {
    url_to_id: HashMap<String, String>,
    id_to_url: HashMap<String, String>,
    id_to_ext: HashMap<String, String>,
}

impl Registry {
    fn filename(&self, url: &str) -> Option<String> {
        let id = self.url_to_id.get(url)?;
        let ext = self.id_to_ext.get(id)?;
        Some(format!("{}.{}", id, ext))
    }

    fn register(&mut self, url: &str, id: &str, ext: &str) {
        self.url_to_id.insert(url.to_string(), id.to_string());
        self.id_to_url.insert(id.to_string(), url.to_string());
        self.id_to_ext.insert(id.to_string(), ext.to_string());
    }
}

/// A file written during the current batch.
struct Downloaded {
    url: String,
    id: String,
    ext: String,
    path: PathBuf,
}

/// Downloads images into one directory and tracks them in its registry.
pub struct ImageDownloader {
    dir: PathBuf,
    http: Arc<dyn HttpClient>,
    concurrency: usize,
    timeout: Duration,
}

impl ImageDownloader {
    pub fn new(dir: impl Into<PathBuf>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            dir: dir.into(),
            http,
            concurrency: 8,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_limits(mut self, concurrency: usize, timeout: Duration) -> Self {
        self.concurrency = concurrency.max(1);
        self.timeout = timeout;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Download every URL not yet registered.
    ///
    /// Empty and duplicate URLs are ignored; calling again with the same URLs
    /// downloads nothing.
    ///
    /// # Errors
    ///
    /// Fails when any URL could not be fetched, decoded or written. Files
    /// written by the failed batch are removed and the registry is unchanged.
    pub async fn download_images(&self, urls: &[String]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut registry = self.load_registry().await?;

        let mut seen = HashSet::new();
        let pending: Vec<String> = urls
            .iter()
            .filter(|url| !url.is_empty())
            .filter(|url| !registry.url_to_id.contains_key(url.as_str()))
            .filter(|url| seen.insert(url.as_str()))
            .cloned()
            .collect();

        if pending.is_empty() {
            return Ok(());
        }

        debug!(dir = %self.dir.display(), count = pending.len(), "Downloading images");

        let results: Vec<Result<Downloaded>> = stream::iter(pending)
            .map(|url| self.download_one(url))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut written = Vec::new();
        let mut first_error = None;
        for result in results {
            match result {
                Ok(downloaded) => {
                    registry.register(&downloaded.url, &downloaded.id, &downloaded.ext);
                    written.push(downloaded.path);
                }
                Err(e) => {
                    warn!(error = %e, "Image download failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        let unregistered = urls
            .iter()
            .filter(|url| !url.is_empty())
            .find(|url| !registry.url_to_id.contains_key(url.as_str()));

        if let Some(url) = unregistered {
            self.discard(&written).await;
            return Err(first_error.unwrap_or_else(|| {
                MetadataError::AssetIo(format!("image was not registered: {}", url))
            }));
        }

        if let Err(e) = self.save_registry(&registry).await {
            self.discard(&written).await;
            return Err(e);
        }

        Ok(())
    }

    /// Filenames of registered URLs. Unknown URLs are omitted.
    pub async fn image_filenames_by_urls(&self, urls: &[String]) -> Result<HashMap<String, String>> {
        let registry = self.load_registry().await?;
        Ok(urls
            .iter()
            .filter_map(|url| registry.filename(url).map(|name| (url.clone(), name)))
            .collect())
    }

    async fn download_one(&self, url: String) -> Result<Downloaded> {
        let request = HttpRequest::get(url.as_str()).timeout(self.timeout);
        let response = self.http.execute(request).await?;
        if !response.is_success() {
            return Err(MetadataError::AssetIo(format!(
                "HTTP {} fetching {}",
                response.status, url
            )));
        }

        let format = image::guess_format(&response.body).map_err(|e| {
            MetadataError::InvalidImage {
                url: url.clone(),
                message: e.to_string(),
            }
        })?;
        let ext = format
            .extensions_str()
            .first()
            .copied()
            .unwrap_or("img")
            .to_string();

        let id = Uuid::new_v4().to_string();
        let path = self.dir.join(format!("{}.{}", id, ext));
        tokio::fs::write(&path, &response.body).await?;

        Ok(Downloaded { url, id, ext, path })
    }

    async fn discard(&self, written: &[PathBuf]) {
        for path in written {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(error = %e, path = %path.display(), "Failed to remove partial download");
            }
        }
    }

    async fn load_registry(&self) -> Result<Registry> {
        let path = self.dir.join(REGISTRY_FILE_NAME);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| MetadataError::Registry(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Registry::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_registry(&self, registry: &Registry) -> Result<()> {
        let bytes =
            serde_json::to_vec(registry).map_err(|e| MetadataError::Registry(e.to_string()))?;
        let path = self.dir.join(REGISTRY_FILE_NAME);
        let tmp = self.dir.join(format!("{}.tmp", REGISTRY_FILE_NAME));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result};
    use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
    use bytes::Bytes;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    pub const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    pub const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F', 0, 0];

    /// Serves PNG bytes for every URL except the ones marked as failing.
    #[derive(Default)]
    pub struct FakeImageHost {
        pub failing: HashSet<String>,
        pub requests: Mutex<Vec<String>>,
        pub bodies: HashMap<String, &'static [u8]>,
    }

    impl FakeImageHost {
        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpClient for FakeImageHost {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request.url.clone());
            if self.failing.contains(&request.url) {
                return Err(BridgeError::OperationFailed("connection reset".to_string()));
            }
            let body = self.bodies.get(&request.url).copied().unwrap_or(PNG_MAGIC);
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::from_static(body),
            })
        }
    }
}
