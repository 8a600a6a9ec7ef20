//! Remote platform backed by the mirror collections
//!
//! Lets the rest of the application keep editing list data while offline.
//! Every edit is written to the mirror and flags the store as holding local
//! changes, which blocks the next pull until they are pushed or discarded.

use crate::context::SyncContext;
use crate::entry_edits::{apply_update, local_error, not_found, set_total};
use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::platform::{EntryUpdate, RemotePlatform};
use core_library::models::{Media, MediaId, MediaKind, MediaListCollection, MediaListEntry};
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct OfflinePlatform {
    ctx: Arc<SyncContext>,
}

impl OfflinePlatform {
    pub(crate) fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    async fn find_media(&self, kind: MediaKind, media_id: MediaId) -> Result<Media> {
        self.ctx
            .mirror(kind)
            .await
            .and_then(|mirror| mirror.find_entry(media_id).map(|e| e.media.clone()))
            .ok_or_else(|| not_found(media_id))
    }

    async fn collection(&self, kind: MediaKind) -> Result<MediaListCollection> {
        self.ctx
            .mirror(kind)
            .await
            .map(|mirror| (*mirror).clone())
            .ok_or_else(|| BridgeError::NotAvailable(format!("no local {kind} collection")))
    }

    /// Apply `edit` to the mirror entry of `media_id`, anime first, then
    /// regroup, persist and flag local changes.
    async fn edit_entry<F>(&self, media_id: MediaId, edit: F) -> Result<()>
    where
        F: FnOnce(&mut MediaListEntry, MediaKind) + Send,
    {
        // Shared with the drain-time rebuild.
        let _writer = self.ctx.lock_mirror_writes().await;

        let mut located = None;
        for kind in [MediaKind::Anime, MediaKind::Manga] {
            if let Some(mirror) = self.ctx.mirror(kind).await {
                if mirror.contains(media_id) {
                    located = Some((kind, mirror));
                    break;
                }
            }
        }
        let Some((kind, mirror)) = located else {
            return Err(not_found(media_id));
        };

        let mut mirror = (*mirror).clone();
        let entry = mirror
            .find_entry_mut(media_id)
            .ok_or_else(|| not_found(media_id))?;
        edit(entry, kind);
        mirror.regroup_by_status();

        self.ctx.save_mirror(kind, mirror).await.map_err(local_error)?;

        let mut settings = self.ctx.store.get_settings().await.map_err(local_error)?;
        settings.updated = true;
        self.ctx.store.save_settings(settings).await.map_err(local_error)?;

        debug!(media_id, %kind, "Edited local list entry");
        Ok(())
    }
}

#[async_trait]
impl RemotePlatform for OfflinePlatform {
    async fn get_anime(&self, media_id: MediaId) -> Result<Media> {
        self.find_media(MediaKind::Anime, media_id).await
    }

    async fn get_manga(&self, media_id: MediaId) -> Result<Media> {
        self.find_media(MediaKind::Manga, media_id).await
    }

    async fn get_anime_collection(&self, _bypass_cache: bool) -> Result<MediaListCollection> {
        self.collection(MediaKind::Anime).await
    }

    async fn get_manga_collection(&self, _bypass_cache: bool) -> Result<MediaListCollection> {
        self.collection(MediaKind::Manga).await
    }

    #[instrument(skip_all, fields(media_id = update.media_id))]
    async fn update_entry(&self, update: EntryUpdate) -> Result<()> {
        self.edit_entry(update.media_id, |entry, _| apply_update(entry, &update))
            .await
    }

    #[instrument(skip(self))]
    async fn update_entry_progress(
        &self,
        media_id: MediaId,
        progress: i32,
        total: Option<i32>,
    ) -> Result<()> {
        self.edit_entry(media_id, |entry, kind| {
            entry.progress = Some(progress);
            set_total(entry, kind, total);
        })
        .await
    }

    #[instrument(skip(self))]
    async fn update_entry_repeat(&self, media_id: MediaId, repeat: i32) -> Result<()> {
        self.edit_entry(media_id, |entry, _| entry.repeat = Some(repeat))
            .await
    }

    async fn delete_entry(&self, media_id: MediaId) -> Result<()> {
        Err(BridgeError::Unsupported(format!(
            "cannot delete media {media_id} while offline"
        )))
    }
}
