//! State shared by the manager, the syncer workers and the offline platform

use crate::error::Result;
use core_library::models::{
    AnimeSnapshot, ChapterContainer, LocalFile, MangaSnapshot, MediaId, MediaKind,
    MediaListCollection,
};
use core_library::LocalStore;
use core_metadata::{AssetStore, LocalMetadataProvider};
use bridge_traits::metadata::MetadataProvider;
use core_runtime::events::{CoreEvent, EventBus, EventSeverity};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, trace, warn};

/// Point-in-time copy of the inventory taken by `synchronize_local`.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub local_files: Arc<Vec<LocalFile>>,
    pub chapter_containers: Arc<Vec<ChapterContainer>>,
}

#[derive(Default)]
struct Collections {
    remote_anime: Option<Arc<MediaListCollection>>,
    remote_manga: Option<Arc<MediaListCollection>>,
    mirror_anime: Option<Arc<MediaListCollection>>,
    mirror_manga: Option<Arc<MediaListCollection>>,
}

pub(crate) struct SyncContext {
    pub store: Arc<dyn LocalStore>,
    pub assets: Arc<AssetStore>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub events: EventBus,
    collections: RwLock<Collections>,
    inventory: RwLock<Inventory>,
    offline_metadata: RwLock<Arc<LocalMetadataProvider>>,
    /// Held across every read-modify-write of the mirrors.
    mirror_writer: Mutex<()>,
    /// Orders tracked-row removal against snapshot commits.
    tracking: Mutex<()>,
}

impl SyncContext {
    pub fn new(
        store: Arc<dyn LocalStore>,
        assets: Arc<AssetStore>,
        metadata: Arc<dyn MetadataProvider>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            assets,
            metadata,
            events,
            collections: RwLock::new(Collections::default()),
            inventory: RwLock::new(Inventory::default()),
            offline_metadata: RwLock::new(Arc::new(LocalMetadataProvider::from_snapshots(
                Vec::new(),
            ))),
            mirror_writer: Mutex::new(()),
            tracking: Mutex::new(()),
        }
    }

    pub fn emit(&self, event: CoreEvent) {
        match event.severity() {
            EventSeverity::Info => debug!(event = event.name(), "Publishing event"),
            EventSeverity::Debug => trace!(event = event.name(), "Publishing event"),
        }
        // No subscribers is fine.
        let _ = self.events.emit(event);
    }

    pub async fn remote(&self, kind: MediaKind) -> Option<Arc<MediaListCollection>> {
        let collections = self.collections.read().await;
        match kind {
            MediaKind::Anime => collections.remote_anime.clone(),
            MediaKind::Manga => collections.remote_manga.clone(),
        }
    }

    pub async fn set_remote(&self, kind: MediaKind, collection: Option<MediaListCollection>) {
        let collection = collection.map(Arc::new);
        let mut collections = self.collections.write().await;
        match kind {
            MediaKind::Anime => collections.remote_anime = collection,
            MediaKind::Manga => collections.remote_manga = collection,
        }
    }

    pub async fn mirror(&self, kind: MediaKind) -> Option<Arc<MediaListCollection>> {
        let collections = self.collections.read().await;
        match kind {
            MediaKind::Anime => collections.mirror_anime.clone(),
            MediaKind::Manga => collections.mirror_manga.clone(),
        }
    }

    /// Exclusive access for writing the mirrors. `save_mirror` and
    /// `replace_mirrors` expect the caller to hold it.
    pub async fn lock_mirror_writes(&self) -> MutexGuard<'_, ()> {
        self.mirror_writer.lock().await
    }

    /// Reload both mirror handles from the store.
    pub async fn reload_mirrors(&self) -> Result<()> {
        let _writer = self.lock_mirror_writes().await;
        let anime = self.store.get_local_collection(MediaKind::Anime).await?;
        let manga = self.store.get_local_collection(MediaKind::Manga).await?;

        let mut collections = self.collections.write().await;
        collections.mirror_anime = anime.map(Arc::new);
        collections.mirror_manga = manga.map(Arc::new);
        Ok(())
    }

    /// Persist a mirror and swap the in-memory handle.
    pub async fn save_mirror(&self, kind: MediaKind, collection: MediaListCollection) -> Result<()> {
        self.store.save_local_collection(kind, &collection).await?;

        let collection = Some(Arc::new(collection));
        let mut collections = self.collections.write().await;
        match kind {
            MediaKind::Anime => collections.mirror_anime = collection,
            MediaKind::Manga => collections.mirror_manga = collection,
        }
        Ok(())
    }

    /// Persist the given mirrors, then publish them together. A `None` kind
    /// keeps its current mirror.
    pub async fn replace_mirrors(
        &self,
        anime: Option<MediaListCollection>,
        manga: Option<MediaListCollection>,
    ) -> Result<()> {
        if let Some(anime) = &anime {
            self.store.save_local_collection(MediaKind::Anime, anime).await?;
        }
        if let Some(manga) = &manga {
            self.store.save_local_collection(MediaKind::Manga, manga).await?;
        }

        let mut collections = self.collections.write().await;
        if let Some(anime) = anime {
            collections.mirror_anime = Some(Arc::new(anime));
        }
        if let Some(manga) = manga {
            collections.mirror_manga = Some(Arc::new(manga));
        }
        Ok(())
    }

    pub async fn inventory(&self) -> Inventory {
        self.inventory.read().await.clone()
    }

    pub async fn set_inventory(&self, local_files: Vec<LocalFile>, containers: Vec<ChapterContainer>) {
        *self.inventory.write().await = Inventory {
            local_files: Arc::new(local_files),
            chapter_containers: Arc::new(containers),
        };
    }

    pub async fn offline_metadata(&self) -> Arc<LocalMetadataProvider> {
        Arc::clone(&*self.offline_metadata.read().await)
    }

    pub async fn reload_offline_metadata(&self) -> Result<()> {
        let provider = LocalMetadataProvider::load(self.store.as_ref()).await?;
        *self.offline_metadata.write().await = Arc::new(provider);
        Ok(())
    }

    /// Save a snapshot produced by a worker, unless the media stopped being
    /// tracked while the job ran; then the job's assets are discarded.
    /// Returns whether the snapshot was saved.
    pub async fn commit_anime_snapshot(&self, snapshot: &AnimeSnapshot) -> Result<bool> {
        let _tracking = self.tracking.lock().await;
        if !self.still_tracked(snapshot.media_id, MediaKind::Anime).await? {
            return Ok(false);
        }
        self.store.save_anime_snapshot(snapshot).await?;
        Ok(true)
    }

    pub async fn commit_manga_snapshot(&self, snapshot: &MangaSnapshot) -> Result<bool> {
        let _tracking = self.tracking.lock().await;
        if !self.still_tracked(snapshot.media_id, MediaKind::Manga).await? {
            return Ok(false);
        }
        self.store.save_manga_snapshot(snapshot).await?;
        Ok(true)
    }

    async fn still_tracked(&self, media_id: MediaId, kind: MediaKind) -> Result<bool> {
        if self.store.get_tracked_media(media_id, kind).await?.is_some() {
            return Ok(true);
        }
        debug!(media_id, %kind, "Untracked while syncing, discarding assets");
        if let Err(e) = self.assets.remove_media_dir(media_id).await {
            warn!(media_id, error = %e, "Failed to remove media assets");
        }
        Ok(false)
    }

    /// Drop a tracked media: its row, its snapshot and its asset directory.
    ///
    /// Only the row removal can fail the call; the snapshot and assets are
    /// removed best-effort.
    pub async fn remove_media(&self, media_id: MediaId, kind: MediaKind) -> Result<()> {
        let _tracking = self.tracking.lock().await;
        debug!(media_id, %kind, "Removing tracked media");
        self.store.remove_tracked_media(media_id, kind).await?;

        let snapshot_removed = match kind {
            MediaKind::Anime => self.store.remove_anime_snapshot(media_id).await,
            MediaKind::Manga => self.store.remove_manga_snapshot(media_id).await,
        };
        if let Err(e) = snapshot_removed {
            warn!(media_id, %kind, error = %e, "Failed to remove snapshot");
        }

        if let Err(e) = self.assets.remove_media_dir(media_id).await {
            warn!(media_id, error = %e, "Failed to remove media assets");
        }
        Ok(())
    }
}
