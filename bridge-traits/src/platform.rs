//! Remote list-tracking service abstraction

use async_trait::async_trait;
use core_library::models::{FuzzyDate, Media, MediaId, MediaListCollection, MediaListStatus};

use crate::error::Result;

/// Fields sent to the remote service when a list entry is saved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryUpdate {
    pub media_id: MediaId,
    pub status: Option<MediaListStatus>,
    pub score: Option<i32>,
    pub progress: Option<i32>,
    pub started_at: Option<FuzzyDate>,
    pub completed_at: Option<FuzzyDate>,
}

/// The list-tracking service the user's collections come from.
///
/// Failures are opaque to the core; they surface as remote I/O errors.
#[async_trait]
pub trait RemotePlatform: Send + Sync {
    async fn get_anime(&self, media_id: MediaId) -> Result<Media>;

    async fn get_manga(&self, media_id: MediaId) -> Result<Media>;

    /// Fetch the user's anime lists.
    ///
    /// `bypass_cache` forces a network round-trip when the platform caches.
    async fn get_anime_collection(&self, bypass_cache: bool) -> Result<MediaListCollection>;

    async fn get_manga_collection(&self, bypass_cache: bool) -> Result<MediaListCollection>;

    /// Save list data for one media.
    async fn update_entry(&self, update: EntryUpdate) -> Result<()>;

    /// Set progress; `total` is the media's episode or chapter count when known.
    async fn update_entry_progress(
        &self,
        media_id: MediaId,
        progress: i32,
        total: Option<i32>,
    ) -> Result<()>;

    async fn update_entry_repeat(&self, media_id: MediaId, repeat: i32) -> Result<()>;

    async fn delete_entry(&self, media_id: MediaId) -> Result<()>;
}
