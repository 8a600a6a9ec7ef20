//! # Local Manager
//!
//! Entry point of the sync core. Holds the remote collections handed in by
//! the host, decides which media are tracked, starts local sync passes and
//! pushes local list edits back to the remote service.
//!
//! ## Usage
//!
//! ```ignore
//! let manager = LocalManager::new(options).await?;
//! manager.set_anime_collection(Some(anime)).await;
//! manager.set_manga_collection(Some(manga)).await;
//!
//! manager.track_anime(21).await?;
//! manager.synchronize_local().await?;
//! manager.wait_for_drain().await;
//! ```

use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::offline_platform::OfflinePlatform;
use crate::push::{collect_entry_updates, push_entry_updates, MissingScore};
use crate::simulated_platform::SimulatedPlatform;
use crate::syncer::{DispatchSummary, PassInput, Syncer, SyncerConfig};
use bridge_traits::inventory::{AnimeInventory, MangaInventory};
use bridge_traits::metadata::MetadataProvider;
use bridge_traits::platform::RemotePlatform;
use core_library::models::{
    MediaId, MediaKind, MediaListCollection, MediaListEntry, TrackedMedia,
};
use core_library::LocalStore;
use core_metadata::{directory_size, AssetStore, LocalMetadataProvider};
use core_runtime::events::{CollectionEvent, CoreEvent, EventBus, QueueState};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Host callback that re-fetches the remote collections after a push and
/// hands them back through `set_anime_collection`/`set_manga_collection`.
pub type RefreshCollectionsFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

pub struct LocalManagerOptions {
    pub store: Arc<dyn LocalStore>,
    pub assets: Arc<AssetStore>,
    /// Online metadata source used when snapshots are created
    pub metadata_provider: Arc<dyn MetadataProvider>,
    pub remote: Arc<dyn RemotePlatform>,
    pub anime_inventory: Arc<dyn AnimeInventory>,
    pub manga_inventory: Arc<dyn MangaInventory>,
    pub events: EventBus,
    /// Root whose size `get_local_storage_size` reports
    pub data_dir: PathBuf,
    pub syncer: SyncerConfig,
}

/// A tracked media with its list entry, if any collection still has it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedMediaItem {
    pub media_id: MediaId,
    pub kind: MediaKind,
    pub entry: Option<MediaListEntry>,
}

pub struct LocalManager {
    ctx: Arc<SyncContext>,
    syncer: Syncer,
    remote: Arc<dyn RemotePlatform>,
    anime_inventory: Arc<dyn AnimeInventory>,
    manga_inventory: Arc<dyn MangaInventory>,
    offline_platform: Arc<OfflinePlatform>,
    simulated_platform: Arc<SimulatedPlatform>,
    data_dir: PathBuf,
    /// Memoized size in bytes; 0 means unknown.
    storage_size: AtomicU64,
    refresh_collections_fn: RwLock<Option<RefreshCollectionsFn>>,
}

impl LocalManager {
    /// Load the persisted mirrors and offline metadata, then start the
    /// syncer workers. Must be called from within a Tokio runtime.
    pub async fn new(options: LocalManagerOptions) -> Result<Self> {
        let ctx = Arc::new(SyncContext::new(
            options.store,
            options.assets,
            options.metadata_provider,
            options.events,
        ));
        ctx.reload_mirrors().await?;
        ctx.reload_offline_metadata().await?;

        let syncer = Syncer::new(Arc::clone(&ctx), options.syncer);
        let offline_platform = Arc::new(OfflinePlatform::new(Arc::clone(&ctx)));
        let simulated_platform = Arc::new(
            SimulatedPlatform::new(Arc::clone(&ctx.store))
                .with_catalog(Arc::clone(&options.remote)),
        );

        info!(data_dir = %options.data_dir.display(), "Local manager ready");

        Ok(Self {
            ctx,
            syncer,
            remote: options.remote,
            anime_inventory: options.anime_inventory,
            manga_inventory: options.manga_inventory,
            offline_platform,
            simulated_platform,
            data_dir: options.data_dir,
            storage_size: AtomicU64::new(0),
            refresh_collections_fn: RwLock::new(None),
        })
    }

    // ------------------------------------------------------------------
    // Remote collections
    // ------------------------------------------------------------------

    pub async fn set_anime_collection(&self, collection: Option<MediaListCollection>) {
        self.ctx.set_remote(MediaKind::Anime, collection).await;
    }

    pub async fn set_manga_collection(&self, collection: Option<MediaListCollection>) {
        self.ctx.set_remote(MediaKind::Manga, collection).await;
    }

    pub async fn set_refresh_collections_fn(&self, refresh: RefreshCollectionsFn) {
        *self.refresh_collections_fn.write().await = Some(refresh);
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    pub async fn track_anime(&self, media_id: MediaId) -> Result<()> {
        self.track(media_id, MediaKind::Anime).await
    }

    pub async fn track_manga(&self, media_id: MediaId) -> Result<()> {
        self.track(media_id, MediaKind::Manga).await
    }

    pub async fn untrack_anime(&self, media_id: MediaId) -> Result<()> {
        self.untrack(media_id, MediaKind::Anime).await
    }

    pub async fn untrack_manga(&self, media_id: MediaId) -> Result<()> {
        self.untrack(media_id, MediaKind::Manga).await
    }

    #[instrument(skip(self))]
    async fn track(&self, media_id: MediaId, kind: MediaKind) -> Result<()> {
        let remote = self
            .ctx
            .remote(kind)
            .await
            .ok_or(SyncError::CollectionUnset(kind))?;
        if !remote.contains(media_id) {
            return Err(SyncError::NotInRemote { media_id, kind });
        }
        if self.ctx.store.get_tracked_media(media_id, kind).await?.is_some() {
            return Err(SyncError::AlreadyTracked { media_id, kind });
        }

        self.ctx
            .store
            .set_tracked_media(&TrackedMedia::new(media_id, kind))
            .await?;
        info!(media_id, %kind, "Tracking media");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn untrack(&self, media_id: MediaId, kind: MediaKind) -> Result<()> {
        if self.ctx.store.get_tracked_media(media_id, kind).await?.is_none() {
            return Err(SyncError::NotTracked { media_id, kind });
        }

        self.ctx.remove_media(media_id, kind).await?;
        info!(media_id, %kind, "Untracked media");

        self.syncer.refresh_collections().await;
        Ok(())
    }

    pub async fn is_media_tracked(&self, media_id: MediaId, kind: MediaKind) -> Result<bool> {
        Ok(self.ctx.store.get_tracked_media(media_id, kind).await?.is_some())
    }

    /// Every tracked media, with its entry from the mirror or else from the
    /// remote collection.
    pub async fn get_tracked_media_items(&self) -> Result<Vec<TrackedMediaItem>> {
        let tracked = self.ctx.store.get_all_tracked_media().await?;

        let mut items = Vec::with_capacity(tracked.len());
        for TrackedMedia { media_id, kind, .. } in tracked {
            let mirror = self.ctx.mirror(kind).await;
            let remote = self.ctx.remote(kind).await;
            let entry = [mirror, remote]
                .iter()
                .flatten()
                .find_map(|collection| collection.find_entry(media_id).cloned());
            items.push(TrackedMediaItem {
                media_id,
                kind,
                entry,
            });
        }
        Ok(items)
    }

    // ------------------------------------------------------------------
    // Local sync
    // ------------------------------------------------------------------

    /// Start a local sync pass. Returns once the jobs are dispatched; use
    /// `wait_for_drain` to wait for them.
    #[instrument(skip(self))]
    pub async fn synchronize_local(&self) -> Result<DispatchSummary> {
        self.storage_size.store(0, Ordering::Relaxed);
        self.ctx.reload_mirrors().await?;

        if self.ctx.store.get_settings().await?.updated {
            return Err(SyncError::LocalEditsPending);
        }

        let local_files = self
            .anime_inventory
            .local_files()
            .await
            .map_err(|e| SyncError::InventoryUnavailable(e.to_string()))?;

        let remote_anime = self
            .ctx
            .remote(MediaKind::Anime)
            .await
            .ok_or(SyncError::CollectionUnset(MediaKind::Anime))?;
        let remote_manga = self
            .ctx
            .remote(MediaKind::Manga)
            .await
            .ok_or(SyncError::CollectionUnset(MediaKind::Manga))?;

        let chapter_containers = self
            .manga_inventory
            .downloaded_chapter_containers(&remote_manga)
            .await
            .map_err(|e| SyncError::InventoryUnavailable(e.to_string()))?;

        debug!(
            local_files = local_files.len(),
            chapter_containers = chapter_containers.len(),
            "Collected inventory"
        );
        self.ctx.set_inventory(local_files, chapter_containers).await;

        let tracked_anime = self.tracked_in_remote(MediaKind::Anime, &remote_anime).await?;
        let tracked_manga = self.tracked_in_remote(MediaKind::Manga, &remote_manga).await?;

        let anime_snapshots = self
            .ctx
            .store
            .get_all_anime_snapshots()
            .await?
            .into_iter()
            .map(|s| (s.media_id, s))
            .collect();
        let manga_snapshots = self
            .ctx
            .store
            .get_all_manga_snapshots()
            .await?
            .into_iter()
            .map(|s| (s.media_id, s))
            .collect();

        Ok(self
            .syncer
            .run_diffs(PassInput {
                tracked_anime,
                tracked_manga,
                anime_snapshots,
                manga_snapshots,
            })
            .await)
    }

    /// Tracked items of `kind` still listed in `remote`. The others are
    /// removed along with their snapshot and assets.
    async fn tracked_in_remote(
        &self,
        kind: MediaKind,
        remote: &MediaListCollection,
    ) -> Result<HashMap<MediaId, TrackedMedia>> {
        let mut tracked = HashMap::new();
        for item in self.ctx.store.get_all_tracked_media_by_kind(kind).await? {
            if remote.contains(item.media_id) {
                tracked.insert(item.media_id, item);
            } else {
                info!(media_id = item.media_id, %kind, "No longer in the remote collection");
                self.ctx.remove_media(item.media_id, kind).await?;
            }
        }
        Ok(tracked)
    }

    /// Rebuild the mirrors now if no sync pass is running.
    pub async fn refresh_collections(&self) {
        self.syncer.refresh_collections().await;
    }

    pub async fn wait_for_drain(&self) {
        self.syncer.wait_for_drain().await;
    }

    pub async fn queue_state(&self) -> QueueState {
        self.syncer.queue_state().await
    }

    /// Media whose last reconciliation failed.
    pub async fn failed_media(&self, kind: MediaKind) -> Vec<MediaId> {
        self.syncer.failed_media(kind).await
    }

    // ------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------

    /// Push mirror entries whose list data diverged from the remote. The
    /// local-changes flag is cleared when every update was accepted.
    /// Returns the number of accepted updates.
    #[instrument(skip(self))]
    pub async fn synchronize_anilist(&self) -> Result<usize> {
        let remote_anime = self
            .ctx
            .remote(MediaKind::Anime)
            .await
            .ok_or(SyncError::CollectionUnset(MediaKind::Anime))?;
        let remote_manga = self
            .ctx
            .remote(MediaKind::Manga)
            .await
            .ok_or(SyncError::CollectionUnset(MediaKind::Manga))?;

        let mut updates = Vec::new();
        if let Some(mirror) = self.ctx.mirror(MediaKind::Anime).await {
            updates.extend(collect_entry_updates(&mirror, &remote_anime, MissingScore::Omit));
        }
        if let Some(mirror) = self.ctx.mirror(MediaKind::Manga).await {
            updates.extend(collect_entry_updates(&mirror, &remote_manga, MissingScore::Omit));
        }

        let attempted = updates.len();
        let pushed = push_entry_updates(self.remote.as_ref(), updates).await;
        info!(attempted, pushed, "Pushed local list edits");

        if pushed == attempted {
            self.set_has_local_changes(false).await?;
        } else {
            warn!(failed = attempted - pushed, "Keeping local changes flagged");
        }
        self.after_push().await;
        Ok(pushed)
    }

    /// Push simulated entries whose list data diverged from the remote.
    #[instrument(skip(self))]
    pub async fn synchronize_simulated_to_remote(&self) -> Result<usize> {
        let mut updates = Vec::new();
        for kind in [MediaKind::Anime, MediaKind::Manga] {
            let simulated = self.ctx.store.get_simulated_collection(kind).await?;
            let remote = self.ctx.remote(kind).await;
            if let (Some(simulated), Some(remote)) = (simulated, remote) {
                updates.extend(collect_entry_updates(&simulated, &remote, MissingScore::Zero));
            } else {
                debug!(%kind, "Nothing to push from the simulated collection");
            }
        }

        let attempted = updates.len();
        let pushed = push_entry_updates(self.remote.as_ref(), updates).await;
        info!(attempted, pushed, "Pushed simulated list edits");

        self.after_push().await;
        Ok(pushed)
    }

    async fn after_push(&self) {
        let refresh = self.refresh_collections_fn.read().await.clone();
        match refresh {
            Some(refresh) => refresh().await,
            None => warn!("No refresh callback set, remote collections may be stale"),
        }

        self.ctx
            .emit(CoreEvent::Collections(CollectionEvent::AnimeRefreshed));
        self.ctx
            .emit(CoreEvent::Collections(CollectionEvent::MangaRefreshed));
    }

    // ------------------------------------------------------------------
    // Simulated collections
    // ------------------------------------------------------------------

    pub async fn get_simulated_collection(
        &self,
        kind: MediaKind,
    ) -> Result<Option<MediaListCollection>> {
        Ok(self.ctx.store.get_simulated_collection(kind).await?)
    }

    pub async fn save_simulated_collection(
        &self,
        kind: MediaKind,
        collection: &MediaListCollection,
    ) -> Result<()> {
        Ok(self
            .simulated_platform
            .replace_collection(kind, collection)
            .await?)
    }

    /// Copy the current remote collections into the simulated slots.
    pub async fn synchronize_remote_to_simulated(&self) -> Result<()> {
        for kind in [MediaKind::Anime, MediaKind::Manga] {
            if let Some(remote) = self.ctx.remote(kind).await {
                self.simulated_platform
                    .replace_collection(kind, &remote)
                    .await?;
                debug!(%kind, "Copied remote collection to simulated");
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Local collections and state
    // ------------------------------------------------------------------

    pub async fn get_local_collection(&self, kind: MediaKind) -> Option<MediaListCollection> {
        self.ctx.mirror(kind).await.map(|mirror| (*mirror).clone())
    }

    pub async fn update_local_collection(
        &self,
        kind: MediaKind,
        collection: MediaListCollection,
    ) -> Result<()> {
        let _writer = self.ctx.lock_mirror_writes().await;
        self.ctx.save_mirror(kind, collection).await
    }

    pub async fn has_local_changes(&self) -> Result<bool> {
        Ok(self.ctx.store.get_settings().await?.updated)
    }

    pub async fn set_has_local_changes(&self, updated: bool) -> Result<()> {
        let mut settings = self.ctx.store.get_settings().await?;
        if settings.updated != updated {
            settings.updated = updated;
            self.ctx.store.save_settings(settings).await?;
        }
        Ok(())
    }

    /// Bytes used under the data directory.
    pub async fn get_local_storage_size(&self) -> Result<u64> {
        let cached = self.storage_size.load(Ordering::Relaxed);
        if cached > 0 {
            return Ok(cached);
        }

        let size = directory_size(&self.data_dir).await?;
        self.storage_size.store(size, Ordering::Relaxed);
        Ok(size)
    }

    /// Metadata provider answering from the persisted snapshots.
    pub async fn offline_metadata_provider(&self) -> Arc<LocalMetadataProvider> {
        self.ctx.offline_metadata().await
    }

    /// Remote platform that edits the mirror collections.
    pub fn offline_platform(&self) -> Arc<OfflinePlatform> {
        Arc::clone(&self.offline_platform)
    }

    /// Remote platform that edits the simulated collections.
    pub fn simulated_platform(&self) -> Arc<SimulatedPlatform> {
        Arc::clone(&self.simulated_platform)
    }

    /// Stop the workers after the queued jobs finish.
    pub async fn shutdown(&self) {
        self.syncer.shutdown().await;
        info!("Local manager shut down");
    }
}
