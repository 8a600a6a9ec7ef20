//! Read-only inventory collaborators
//!
//! The scanner and the manga downloader own these records; the sync core
//! only reads point-in-time copies.

use async_trait::async_trait;
use core_library::models::{ChapterContainer, LocalFile, MediaListCollection};

use crate::error::Result;

/// Source of scanned anime files.
#[async_trait]
pub trait AnimeInventory: Send + Sync {
    async fn local_files(&self) -> Result<Vec<LocalFile>>;
}

/// Source of downloaded manga chapters.
#[async_trait]
pub trait MangaInventory: Send + Sync {
    /// Chapter containers for the media in `collection`.
    async fn downloaded_chapter_containers(
        &self,
        collection: &MediaListCollection,
    ) -> Result<Vec<ChapterContainer>>;
}
