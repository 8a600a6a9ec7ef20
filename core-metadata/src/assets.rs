//! Per-media asset directories
//!
//! `<root>/<media_id>/` holds the banner, cover and episode images of one
//! tracked media. Collections reference these files through the
//! `{{LOCAL_ASSETS}}/<media_id>/<filename>` template, which the host
//! substitutes with its own asset-serving URL.

use crate::error::Result;
use crate::image_downloader::ImageDownloader;
use bridge_traits::http::HttpClient;
use bridge_traits::metadata::AnimeMetadataWrapper;
use core_library::models::{AnimeMetadata, LocalFile, Media, MediaId};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Placeholder the host replaces with its asset-serving base URL.
pub const LOCAL_ASSETS_TEMPLATE: &str = "{{LOCAL_ASSETS}}";

/// Builds the templated URL of an asset file.
pub fn format_asset_url(media_id: MediaId, filename: &str) -> String {
    format!("{}/{}/{}", LOCAL_ASSETS_TEMPLATE, media_id, filename)
}

/// Filenames of an anime's downloaded images. Empty strings mean the media
/// had no such image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnimeImagePaths {
    pub banner: String,
    pub cover: String,
    /// Episode key to filename
    pub episodes: HashMap<String, String>,
}

/// Filenames of a manga's downloaded images.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MangaImagePaths {
    pub banner: String,
    pub cover: String,
}

/// Owner of the asset root directory.
pub struct AssetStore {
    root: PathBuf,
    http: Arc<dyn HttpClient>,
    concurrency: usize,
    timeout: Duration,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            root: root.into(),
            http,
            concurrency: 8,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the per-batch download concurrency and per-request timeout.
    pub fn with_limits(mut self, concurrency: usize, timeout: Duration) -> Self {
        self.concurrency = concurrency;
        self.timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn media_dir(&self, media_id: MediaId) -> PathBuf {
        self.root.join(media_id.to_string())
    }

    fn downloader(&self, media_id: MediaId) -> ImageDownloader {
        ImageDownloader::new(self.media_dir(media_id), Arc::clone(&self.http))
            .with_limits(self.concurrency, self.timeout)
    }

    /// Download a batch of images for a media and map each URL to its filename.
    ///
    /// Empty URLs are skipped. Already downloaded URLs are not fetched again.
    ///
    /// # Errors
    ///
    /// A single failed URL fails the whole batch.
    pub async fn download_images(
        &self,
        media_id: MediaId,
        urls: &[String],
    ) -> Result<HashMap<String, String>> {
        let downloader = self.downloader(media_id);
        downloader.download_images(urls).await?;
        downloader.image_filenames_by_urls(urls).await
    }

    /// Remove a media's asset directory. A missing directory is not an error.
    pub async fn remove_media_dir(&self, media_id: MediaId) -> Result<()> {
        let dir = self.media_dir(media_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(media_id, "Removed asset directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Download banner, cover and the images of every episode that is both
    /// on disk and described by `metadata`.
    #[instrument(skip_all, fields(media_id = media.id))]
    pub async fn download_anime_images(
        &self,
        media: &Media,
        metadata: &AnimeMetadata,
        wrapper: &dyn AnimeMetadataWrapper,
        local_files: &[LocalFile],
    ) -> Result<AnimeImagePaths> {
        let banner_url = media.banner_image.clone().unwrap_or_default();
        let cover_url = media.cover_image.best().unwrap_or_default().to_string();

        let episode_keys: BTreeSet<&str> = local_files
            .iter()
            .filter(|lf| lf.media_id == media.id)
            .map(|lf| lf.metadata.episode_key.as_str())
            .filter(|key| metadata.episodes.contains_key(*key))
            .collect();

        let episode_urls: HashMap<String, String> = episode_keys
            .into_iter()
            .map(|key| (key.to_string(), wrapper.episode_metadata(key).image))
            .filter(|(_, url)| !url.is_empty())
            .collect();

        let mut urls = vec![banner_url.clone(), cover_url.clone()];
        urls.extend(episode_urls.values().cloned());

        let filenames = self.download_images(media.id, &urls).await?;
        let lookup = |url: &str| filenames.get(url).cloned().unwrap_or_default();

        Ok(AnimeImagePaths {
            banner: lookup(&banner_url),
            cover: lookup(&cover_url),
            episodes: episode_urls
                .iter()
                .filter_map(|(key, url)| filenames.get(url).map(|f| (key.clone(), f.clone())))
                .collect(),
        })
    }

    /// Download episode images keyed by episode key; returns key to filename.
    pub async fn download_anime_episode_images(
        &self,
        media_id: MediaId,
        episode_urls: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>> {
        let urls: Vec<String> = episode_urls.values().cloned().collect();
        let filenames = self.download_images(media_id, &urls).await?;

        Ok(episode_urls
            .iter()
            .filter_map(|(key, url)| filenames.get(url).map(|f| (key.clone(), f.clone())))
            .collect())
    }

    /// Download the banner and cover of a manga.
    #[instrument(skip_all, fields(media_id = media.id))]
    pub async fn download_manga_images(&self, media: &Media) -> Result<MangaImagePaths> {
        let banner_url = media.banner_image.clone().unwrap_or_default();
        let cover_url = media.cover_image.best().unwrap_or_default().to_string();

        let filenames = self
            .download_images(media.id, &[banner_url.clone(), cover_url.clone()])
            .await?;

        Ok(MangaImagePaths {
            banner: filenames.get(&banner_url).cloned().unwrap_or_default(),
            cover: filenames.get(&cover_url).cloned().unwrap_or_default(),
        })
    }
}

/// Total size in bytes of the files under `path`. A missing path is empty.
pub async fn directory_size(path: &Path) -> Result<u64> {
    let mut total = 0u64;
    let mut pending = vec![path.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if metadata.is_dir() {
                pending.push(entry.path());
            } else {
                total += metadata.len();
            }
        }
    }

    Ok(total)
}
