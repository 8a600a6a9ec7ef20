//! Remote platform backed by the simulated collections
//!
//! Stands in for the remote service while no account is attached. Edits go
//! straight to the simulated collections in the store; they are never
//! flagged as local changes, since there is no remote copy to diverge from.
//! Media missing from both collections are resolved through an optional
//! catalog (usually an unauthenticated remote client) and added on first
//! edit.

use crate::entry_edits::{apply_update, local_error, next_entry_id, not_found, set_total};
use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::platform::{EntryUpdate, RemotePlatform};
use core_library::models::{
    Media, MediaId, MediaKind, MediaListCollection, MediaListEntry, MediaListStatus,
};
use core_library::LocalStore;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, trace};

pub struct SimulatedPlatform {
    store: Arc<dyn LocalStore>,
    catalog: Option<Arc<dyn RemotePlatform>>,
    /// One writer of the simulated collections at a time.
    write_lock: Mutex<()>,
}

impl SimulatedPlatform {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            catalog: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Source of media data for entries added by an edit.
    pub fn with_catalog(mut self, catalog: Arc<dyn RemotePlatform>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Replace a simulated collection wholesale.
    pub async fn replace_collection(
        &self,
        kind: MediaKind,
        collection: &MediaListCollection,
    ) -> core_library::Result<()> {
        let _writer = self.write_lock.lock().await;
        self.store.save_simulated_collection(kind, collection).await
    }

    /// The stored collection, or a new empty one persisted on first use.
    async fn load_or_create(&self, kind: MediaKind) -> Result<MediaListCollection> {
        if let Some(collection) = self
            .store
            .get_simulated_collection(kind)
            .await
            .map_err(local_error)?
        {
            return Ok(collection);
        }

        debug!(%kind, "Creating empty simulated collection");
        let collection = MediaListCollection::default();
        self.store
            .save_simulated_collection(kind, &collection)
            .await
            .map_err(local_error)?;
        Ok(collection)
    }

    /// Look `media_id` up in the catalog, anime first.
    async fn resolve_media(&self, media_id: MediaId) -> Result<(MediaKind, Media)> {
        let Some(catalog) = &self.catalog else {
            return Err(not_found(media_id));
        };
        if let Ok(media) = catalog.get_anime(media_id).await {
            return Ok((MediaKind::Anime, media));
        }
        match catalog.get_manga(media_id).await {
            Ok(media) => Ok((MediaKind::Manga, media)),
            Err(_) => Err(not_found(media_id)),
        }
    }

    /// Apply `edit` to the entry of `media_id`, then regroup and persist.
    /// When the media has no entry and `add_as` is set, an entry with that
    /// status is created first.
    async fn edit_entry<F>(
        &self,
        media_id: MediaId,
        add_as: Option<MediaListStatus>,
        edit: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut MediaListEntry, MediaKind) + Send,
    {
        let _writer = self.write_lock.lock().await;

        let mut located = None;
        for kind in [MediaKind::Anime, MediaKind::Manga] {
            let collection = self.load_or_create(kind).await?;
            if collection.contains(media_id) {
                located = Some((kind, collection));
                break;
            }
        }

        let (kind, mut collection) = match (located, add_as) {
            (Some(found), _) => found,
            (None, Some(status)) => {
                let (kind, media) = self.resolve_media(media_id).await?;
                let mut collection = self.load_or_create(kind).await?;
                trace!(media_id, %kind, %status, "Adding simulated entry");
                collection.add_entry(MediaListEntry {
                    id: next_entry_id(&collection),
                    status: Some(status),
                    score: Some(0.0),
                    progress: Some(0),
                    repeat: Some(0),
                    private: Some(false),
                    media,
                    ..Default::default()
                });
                (kind, collection)
            }
            (None, None) => return Err(not_found(media_id)),
        };

        let entry = collection
            .find_entry_mut(media_id)
            .ok_or_else(|| not_found(media_id))?;
        edit(entry, kind);
        collection.regroup_by_status();

        self.store
            .save_simulated_collection(kind, &collection)
            .await
            .map_err(local_error)?;
        debug!(media_id, %kind, "Edited simulated list entry");
        Ok(())
    }

    async fn find_media(&self, kind: MediaKind, media_id: MediaId) -> Result<Media> {
        let collection = self.load_or_create(kind).await?;
        if let Some(entry) = collection.find_entry(media_id) {
            return Ok(entry.media.clone());
        }
        match (&self.catalog, kind) {
            (Some(catalog), MediaKind::Anime) => catalog.get_anime(media_id).await,
            (Some(catalog), MediaKind::Manga) => catalog.get_manga(media_id).await,
            (None, _) => Err(not_found(media_id)),
        }
    }
}

#[async_trait]
impl RemotePlatform for SimulatedPlatform {
    async fn get_anime(&self, media_id: MediaId) -> Result<Media> {
        self.find_media(MediaKind::Anime, media_id).await
    }

    async fn get_manga(&self, media_id: MediaId) -> Result<Media> {
        self.find_media(MediaKind::Manga, media_id).await
    }

    async fn get_anime_collection(&self, _bypass_cache: bool) -> Result<MediaListCollection> {
        self.load_or_create(MediaKind::Anime).await
    }

    async fn get_manga_collection(&self, _bypass_cache: bool) -> Result<MediaListCollection> {
        self.load_or_create(MediaKind::Manga).await
    }

    #[instrument(skip_all, fields(media_id = update.media_id))]
    async fn update_entry(&self, update: EntryUpdate) -> Result<()> {
        let add_as = update.status.unwrap_or(MediaListStatus::Planning);
        self.edit_entry(update.media_id, Some(add_as), |entry, _| {
            apply_update(entry, &update)
        })
        .await
    }

    /// Progress reaching `total` completes the entry; otherwise it becomes
    /// current.
    #[instrument(skip(self))]
    async fn update_entry_progress(
        &self,
        media_id: MediaId,
        progress: i32,
        total: Option<i32>,
    ) -> Result<()> {
        let status = match total {
            Some(total) if progress >= total => MediaListStatus::Completed,
            _ => MediaListStatus::Current,
        };
        self.edit_entry(media_id, Some(status), |entry, kind| {
            entry.status = Some(status);
            entry.progress = Some(progress);
            set_total(entry, kind, total);
        })
        .await
    }

    #[instrument(skip(self))]
    async fn update_entry_repeat(&self, media_id: MediaId, repeat: i32) -> Result<()> {
        self.edit_entry(media_id, None, |entry, _| entry.repeat = Some(repeat))
            .await
    }

    #[instrument(skip(self))]
    async fn delete_entry(&self, media_id: MediaId) -> Result<()> {
        let _writer = self.write_lock.lock().await;

        for kind in [MediaKind::Anime, MediaKind::Manga] {
            let mut collection = self.load_or_create(kind).await?;
            if collection.remove_entry(media_id).is_some() {
                self.store
                    .save_simulated_collection(kind, &collection)
                    .await
                    .map_err(local_error)?;
                debug!(media_id, %kind, "Deleted simulated list entry");
                return Ok(());
            }
        }
        Err(BridgeError::NotFound(format!(
            "media {media_id} is not in the simulated collections"
        )))
    }
}
