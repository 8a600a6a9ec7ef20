//! End-to-end tests of the local sync workflow
//!
//! These tests drive a `LocalManager` over an in-memory store, a temporary
//! asset directory and fake collaborators:
//! - First-time tracking, progress-only and file-added passes
//! - Untracking and removal of media dropped from the remote
//! - Local edits blocking a pull, and pushing them upstream
//! - Manga snapshots following the downloaded chapters
//! - Failed jobs and the simulated collection
//! - Edits and untracking racing a running pass
//! - Round trips: track then untrack, mirror pushed as the simulated list

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::inventory::{AnimeInventory, MangaInventory};
use bridge_traits::metadata::{AnimeMetadataWrapper, EpisodeLookup, MetadataProvider};
use bridge_traits::platform::{EntryUpdate, RemotePlatform};
use bytes::Bytes;
use core_library::db::create_test_pool;
use core_library::models::{
    AnimeMetadata, ChapterContainer, ChapterDetails, CoverImage, EpisodeMetadata, LocalFile,
    LocalFileMetadata, Media, MediaId, MediaKind, MediaList, MediaListCollection,
    MediaListEntry, MediaListStatus, MediaTitle, MetadataPlatform,
};
use core_library::{LocalStore, SqliteLocalStore};
use core_metadata::{format_asset_url, AssetStore};
use core_runtime::events::{CoreEvent, EventBus, Receiver};
use core_sync::{LocalManager, LocalManagerOptions, SyncError, SyncerConfig};
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};

// ============================================================================
// Fake Collaborators
// ============================================================================

const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

/// Serves a PNG for every URL and records what was fetched.
#[derive(Default)]
struct ImageHost {
    requests: Mutex<Vec<String>>,
}

impl ImageHost {
    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClient for ImageHost {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.requests.lock().unwrap().push(request.url);
        Ok(HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from_static(PNG_MAGIC),
        })
    }
}

/// Remote service holding one collection per kind; `update_entry` applies
/// the update so a refresh observes it.
#[derive(Default)]
struct FakeRemote {
    anime: Mutex<MediaListCollection>,
    manga: Mutex<MediaListCollection>,
    updates: Mutex<Vec<EntryUpdate>>,
}

impl FakeRemote {
    fn updates(&self) -> Vec<EntryUpdate> {
        self.updates.lock().unwrap().clone()
    }

    /// Drain the recorded updates, ordered by media.
    fn take_updates(&self) -> Vec<EntryUpdate> {
        let mut updates = std::mem::take(&mut *self.updates.lock().unwrap());
        updates.sort_by_key(|u| u.media_id);
        updates
    }
}

#[async_trait]
impl RemotePlatform for FakeRemote {
    async fn get_anime(&self, media_id: MediaId) -> BridgeResult<Media> {
        self.anime
            .lock()
            .unwrap()
            .find_entry(media_id)
            .map(|e| e.media.clone())
            .ok_or_else(|| BridgeError::NotFound(media_id.to_string()))
    }

    async fn get_manga(&self, media_id: MediaId) -> BridgeResult<Media> {
        self.manga
            .lock()
            .unwrap()
            .find_entry(media_id)
            .map(|e| e.media.clone())
            .ok_or_else(|| BridgeError::NotFound(media_id.to_string()))
    }

    async fn get_anime_collection(&self, _bypass_cache: bool) -> BridgeResult<MediaListCollection> {
        Ok(self.anime.lock().unwrap().clone())
    }

    async fn get_manga_collection(&self, _bypass_cache: bool) -> BridgeResult<MediaListCollection> {
        Ok(self.manga.lock().unwrap().clone())
    }

    async fn update_entry(&self, update: EntryUpdate) -> BridgeResult<()> {
        for collection in [&self.anime, &self.manga] {
            let mut collection = collection.lock().unwrap();
            if let Some(entry) = collection.find_entry_mut(update.media_id) {
                if update.status.is_some() {
                    entry.status = update.status;
                }
                if let Some(score) = update.score {
                    entry.score = Some(f64::from(score));
                }
                if update.progress.is_some() {
                    entry.progress = update.progress;
                }
            }
        }
        self.updates.lock().unwrap().push(update);
        Ok(())
    }

    async fn update_entry_progress(
        &self,
        _media_id: MediaId,
        _progress: i32,
        _total: Option<i32>,
    ) -> BridgeResult<()> {
        Ok(())
    }

    async fn update_entry_repeat(&self, _media_id: MediaId, _repeat: i32) -> BridgeResult<()> {
        Ok(())
    }

    async fn delete_entry(&self, _media_id: MediaId) -> BridgeResult<()> {
        Ok(())
    }
}

/// Holds metadata lookups until released, so a test can act mid-pass.
struct Gate {
    entered: Notify,
    release: Semaphore,
}

impl Gate {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            release: Semaphore::new(0),
        })
    }

    fn open(&self) {
        self.release.add_permits(1);
    }
}

/// Three episodes with artwork for every anime, except the failing ones.
#[derive(Default)]
struct FakeMetadata {
    failing: Mutex<HashSet<MediaId>>,
    gate: Mutex<Option<Arc<Gate>>>,
}

#[async_trait]
impl MetadataProvider for FakeMetadata {
    async fn get_anime_metadata(
        &self,
        _platform: MetadataPlatform,
        media_id: MediaId,
    ) -> BridgeResult<AnimeMetadata> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.acquire().await.unwrap().forget();
        }
        if self.failing.lock().unwrap().contains(&media_id) {
            return Err(BridgeError::OperationFailed("metadata service down".to_string()));
        }

        let episodes = (1..=3)
            .map(|n| {
                (
                    n.to_string(),
                    EpisodeMetadata {
                        episode: n.to_string(),
                        episode_number: n,
                        image: format!("https://img.example/{media_id}/ep{n}.png"),
                        ..Default::default()
                    },
                )
            })
            .collect();
        Ok(AnimeMetadata {
            episodes,
            episode_count: 3,
            ..Default::default()
        })
    }

    fn get_anime_metadata_wrapper(
        &self,
        media: &Media,
        metadata: &AnimeMetadata,
    ) -> Box<dyn AnimeMetadataWrapper> {
        Box::new(EpisodeLookup::new(media, metadata))
    }
}

#[derive(Default)]
struct FakeInventory {
    files: Mutex<Vec<LocalFile>>,
    containers: Mutex<Vec<ChapterContainer>>,
}

#[async_trait]
impl AnimeInventory for FakeInventory {
    async fn local_files(&self) -> BridgeResult<Vec<LocalFile>> {
        Ok(self.files.lock().unwrap().clone())
    }
}

#[async_trait]
impl MangaInventory for FakeInventory {
    async fn downloaded_chapter_containers(
        &self,
        _collection: &MediaListCollection,
    ) -> BridgeResult<Vec<ChapterContainer>> {
        Ok(self.containers.lock().unwrap().clone())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

struct Harness {
    manager: Arc<LocalManager>,
    store: Arc<SqliteLocalStore>,
    host: Arc<ImageHost>,
    remote: Arc<FakeRemote>,
    metadata: Arc<FakeMetadata>,
    inventory: Arc<FakeInventory>,
    events: EventBus,
    data_dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        let data_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteLocalStore::new(create_test_pool().await.unwrap()));
        let host = Arc::new(ImageHost::default());
        let remote = Arc::new(FakeRemote::default());
        let metadata = Arc::new(FakeMetadata::default());
        let inventory = Arc::new(FakeInventory::default());
        let events = EventBus::new(256);

        let manager = LocalManager::new(LocalManagerOptions {
            store: store.clone(),
            assets: Arc::new(AssetStore::new(data_dir.path().join("assets"), host.clone())),
            metadata_provider: metadata.clone(),
            remote: remote.clone(),
            anime_inventory: inventory.clone(),
            manga_inventory: inventory.clone(),
            events: events.clone(),
            data_dir: data_dir.path().to_path_buf(),
            syncer: SyncerConfig::default(),
        })
        .await
        .unwrap();

        Self {
            manager: Arc::new(manager),
            store,
            host,
            remote,
            metadata,
            inventory,
            events,
            data_dir,
        }
    }

    /// Publish collections on the fake remote and hand them to the manager.
    async fn set_remote(&self, anime: MediaListCollection, manga: MediaListCollection) {
        *self.remote.anime.lock().unwrap() = anime.clone();
        *self.remote.manga.lock().unwrap() = manga.clone();
        self.manager.set_anime_collection(Some(anime)).await;
        self.manager.set_manga_collection(Some(manga)).await;
    }

    fn set_files(&self, paths: &[(&str, &str)], media_id: MediaId) {
        *self.inventory.files.lock().unwrap() = paths
            .iter()
            .map(|(path, episode_key)| LocalFile {
                path: path.to_string(),
                media_id,
                metadata: LocalFileMetadata {
                    episode_key: episode_key.to_string(),
                    ..Default::default()
                },
            })
            .collect();
    }

    /// Replace the library with files of several media.
    fn set_library(&self, files: &[(MediaId, &str, &str)]) {
        *self.inventory.files.lock().unwrap() = files
            .iter()
            .map(|(media_id, path, episode_key)| LocalFile {
                path: path.to_string(),
                media_id: *media_id,
                metadata: LocalFileMetadata {
                    episode_key: episode_key.to_string(),
                    ..Default::default()
                },
            })
            .collect();
    }

    /// Hold every following metadata lookup at a new gate.
    fn install_gate(&self) -> Arc<Gate> {
        let gate = Gate::new();
        *self.metadata.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Run a local pass to completion.
    async fn sync(&self) -> core_sync::DispatchSummary {
        let summary = self.manager.synchronize_local().await.unwrap();
        self.manager.wait_for_drain().await;
        summary
    }

    async fn mirror(&self, kind: MediaKind) -> MediaListCollection {
        self.manager.get_local_collection(kind).await.unwrap_or_default()
    }

    /// Install a refresh callback re-reading the fake remote's anime list.
    async fn install_refresh(&self) {
        let manager = Arc::downgrade(&self.manager);
        let remote = self.remote.clone();
        self.manager
            .set_refresh_collections_fn(Arc::new(move || {
                let manager = manager.clone();
                let remote = remote.clone();
                async move {
                    if let Some(manager) = manager.upgrade() {
                        let anime = remote.get_anime_collection(true).await.ok();
                        manager.set_anime_collection(anime).await;
                    }
                }
                .boxed()
            }))
            .await;
    }
}

fn entry(media_id: MediaId, status: MediaListStatus, progress: i32) -> MediaListEntry {
    MediaListEntry {
        id: media_id * 10,
        status: Some(status),
        progress: Some(progress),
        media: Media {
            title: MediaTitle {
                romaji: Some(format!("Title {media_id}")),
                ..Default::default()
            },
            cover_image: CoverImage {
                large: Some(format!("https://img.example/{media_id}/cover.png")),
                color: Some("#43a1e4".to_string()),
                ..Default::default()
            },
            banner_image: Some(format!("https://img.example/{media_id}/banner.png")),
            ..Media::new(media_id)
        },
        ..Default::default()
    }
}

fn current(entries: Vec<MediaListEntry>) -> MediaListCollection {
    MediaListCollection {
        lists: vec![MediaList {
            status: Some(MediaListStatus::Current),
            name: Some("Watching".to_string()),
            is_custom_list: Some(false),
            entries,
        }],
    }
}

/// Files under `root`, relative and sorted.
fn asset_files(root: &Path) -> Vec<PathBuf> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                out.push(path.strip_prefix(root).unwrap().to_path_buf());
            }
        }
    }

    let mut files = Vec::new();
    walk(root, root, &mut files);
    files.sort();
    files
}

fn event_names(rx: &mut Receiver<CoreEvent>) -> Vec<&'static str> {
    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.name());
    }
    names
}

/// Scenario 1 post-state: anime 100 tracked with two files.
async fn tracked_anime_100() -> Harness {
    let h = Harness::new().await;
    h.set_remote(
        current(vec![entry(100, MediaListStatus::Current, 3)]),
        MediaListCollection::default(),
    )
    .await;
    h.set_files(
        &[("/library/show/ep2.mkv", "2"), ("/library/show/ep1.mkv", "1")],
        100,
    );
    h.manager.track_anime(100).await.unwrap();
    h.sync().await;
    h
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_first_time_track_creates_snapshot_and_mirror() {
    let h = Harness::new().await;
    let mut events = h.events.subscribe();
    h.set_remote(
        current(vec![entry(100, MediaListStatus::Current, 3)]),
        MediaListCollection::default(),
    )
    .await;
    h.set_files(
        &[("/library/show/ep2.mkv", "2"), ("/library/show/ep1.mkv", "1")],
        100,
    );

    h.manager.track_anime(100).await.unwrap();
    let summary = h.sync().await;

    assert_eq!(summary.anime_jobs, 1);
    assert_eq!(summary.manga_jobs, 0);
    assert!(h.manager.is_media_tracked(100, MediaKind::Anime).await.unwrap());

    let snapshot = h.store.get_anime_snapshot(100).await.unwrap().unwrap();
    assert_eq!(
        snapshot.reference_key,
        "100-/library/show/ep1.mkv,/library/show/ep2.mkv"
    );
    let mut episode_keys: Vec<_> = snapshot.episode_image_paths.keys().cloned().collect();
    episode_keys.sort();
    assert_eq!(episode_keys, vec!["1", "2"]);
    let media_dir = h.data_dir.path().join("assets").join("100");
    assert!(media_dir.join(&snapshot.cover_image_path).exists());
    assert!(media_dir.join(&snapshot.banner_image_path).exists());
    // banner, cover and two episodes
    assert_eq!(h.host.request_count(), 4);

    let mirror = h.mirror(MediaKind::Anime).await;
    assert_eq!(mirror.lists.len(), 1);
    assert_eq!(mirror.lists[0].status, Some(MediaListStatus::Current));
    let mirrored = mirror.find_entry(100).unwrap();
    assert_eq!(
        mirrored.media.cover_image.large,
        Some(format_asset_url(100, &snapshot.cover_image_path))
    );
    assert_eq!(mirrored.progress, Some(3));

    let names = event_names(&mut events);
    assert!(names.contains(&"sync-local-queue-state"));
    assert_eq!(
        names.iter().filter(|n| **n == "sync-local-finished").count(),
        1
    );
    assert!(h.manager.queue_state().await.is_empty());
}

#[tokio::test]
async fn test_progress_change_only_updates_mirror() {
    let h = tracked_anime_100().await;
    let before = h.store.get_anime_snapshot(100).await.unwrap().unwrap();
    let downloads = h.host.request_count();

    h.set_remote(
        current(vec![entry(100, MediaListStatus::Current, 4)]),
        MediaListCollection::default(),
    )
    .await;
    let summary = h.sync().await;

    assert_eq!(summary.anime_jobs, 1);
    assert_eq!(h.host.request_count(), downloads);
    assert_eq!(h.store.get_anime_snapshot(100).await.unwrap().unwrap(), before);
    let mirror = h.mirror(MediaKind::Anime).await;
    assert_eq!(mirror.find_entry(100).unwrap().progress, Some(4));
}

#[tokio::test]
async fn test_file_added_refreshes_reference_key() {
    let h = tracked_anime_100().await;
    h.set_files(
        &[
            ("/library/show/ep1.mkv", "1"),
            ("/library/show/ep2.mkv", "2"),
            ("/library/show/ep3.mkv", "3"),
        ],
        100,
    );

    let summary = h.sync().await;

    assert_eq!(summary.anime_jobs, 1);
    let snapshot = h.store.get_anime_snapshot(100).await.unwrap().unwrap();
    assert_eq!(
        snapshot.reference_key,
        "100-/library/show/ep1.mkv,/library/show/ep2.mkv,/library/show/ep3.mkv"
    );
    // Only the episode image the snapshot lacked is fetched.
    assert!(snapshot.episode_image_paths.contains_key("3"));
    assert_eq!(h.host.request_count(), 5);
}

#[tokio::test]
async fn test_untrack_purges_snapshot_and_assets() {
    let h = tracked_anime_100().await;
    let media_dir = h.data_dir.path().join("assets").join("100");
    assert!(media_dir.exists());

    h.manager.untrack_anime(100).await.unwrap();

    assert!(!h.manager.is_media_tracked(100, MediaKind::Anime).await.unwrap());
    assert!(h.store.get_anime_snapshot(100).await.unwrap().is_none());
    assert!(!media_dir.exists());
    assert!(!h.mirror(MediaKind::Anime).await.contains(100));
    assert!(h.manager.offline_metadata_provider().await.is_empty());
}

#[tokio::test]
async fn test_local_edits_block_pull() {
    let h = Harness::new().await;
    h.set_remote(
        current(vec![entry(100, MediaListStatus::Current, 3)]),
        MediaListCollection::default(),
    )
    .await;
    h.set_files(&[("/library/show/ep1.mkv", "1")], 100);
    h.manager.track_anime(100).await.unwrap();
    h.manager.set_has_local_changes(true).await.unwrap();

    let result = h.manager.synchronize_local().await;

    assert!(matches!(result, Err(SyncError::LocalEditsPending)));
    assert!(h.manager.queue_state().await.is_empty());
    assert!(h.store.get_anime_snapshot(100).await.unwrap().is_none());
    assert_eq!(h.host.request_count(), 0);
}

#[tokio::test]
async fn test_push_divergent_edit() {
    let h = Harness::new().await;
    h.set_remote(
        current(vec![entry(200, MediaListStatus::Current, 5)]),
        MediaListCollection::default(),
    )
    .await;
    h.set_files(&[("/library/other/ep1.mkv", "1")], 200);
    h.manager.track_anime(200).await.unwrap();
    h.sync().await;
    h.install_refresh().await;
    let mut events = h.events.subscribe();

    h.manager
        .offline_platform()
        .update_entry_progress(200, 7, None)
        .await
        .unwrap();
    assert!(h.manager.has_local_changes().await.unwrap());

    let pushed = h.manager.synchronize_anilist().await.unwrap();

    assert_eq!(pushed, 1);
    let updates = h.remote.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].media_id, 200);
    assert_eq!(updates[0].progress, Some(7));
    assert_eq!(updates[0].score, None);
    assert!(!h.manager.has_local_changes().await.unwrap());

    let names = event_names(&mut events);
    assert!(names.contains(&"collections-refreshed-anime"));
    assert!(names.contains(&"collections-refreshed-manga"));

    let summary = h.sync().await;
    assert_eq!(summary.anime_jobs, 0);
}

// ============================================================================
// Tracking Rules
// ============================================================================

#[tokio::test]
async fn test_track_errors() {
    let h = Harness::new().await;

    assert!(matches!(
        h.manager.track_anime(1).await,
        Err(SyncError::CollectionUnset(MediaKind::Anime))
    ));

    h.set_remote(
        current(vec![entry(1, MediaListStatus::Current, 0)]),
        MediaListCollection::default(),
    )
    .await;

    assert!(matches!(
        h.manager.track_anime(2).await,
        Err(SyncError::NotInRemote { media_id: 2, .. })
    ));
    h.manager.track_anime(1).await.unwrap();
    let again = h.manager.track_anime(1).await.unwrap_err();
    assert!(again.is_already_tracked());
    assert!(matches!(
        h.manager.untrack_manga(1).await,
        Err(SyncError::NotTracked { media_id: 1, .. })
    ));
}

#[tokio::test]
async fn test_media_dropped_from_remote_is_untracked() {
    let h = tracked_anime_100().await;
    h.set_remote(
        current(vec![entry(101, MediaListStatus::Current, 1)]),
        MediaListCollection::default(),
    )
    .await;

    let summary = h.sync().await;

    assert_eq!(summary.total(), 0);
    assert!(!h.manager.is_media_tracked(100, MediaKind::Anime).await.unwrap());
    assert!(h.store.get_anime_snapshot(100).await.unwrap().is_none());
    assert!(h.manager.get_tracked_media_items().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_second_pass_without_changes_is_empty() {
    let h = tracked_anime_100().await;

    let summary = h.sync().await;

    assert_eq!(summary.total(), 0);
    let items = h.manager.get_tracked_media_items().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, MediaKind::Anime);
    assert!(items[0].entry.is_some());
}

// ============================================================================
// Manga
// ============================================================================

#[tokio::test]
async fn test_manga_snapshot_follows_chapters() {
    let h = Harness::new().await;
    h.set_remote(
        MediaListCollection::default(),
        current(vec![entry(300, MediaListStatus::Current, 12)]),
    )
    .await;
    *h.inventory.containers.lock().unwrap() = vec![ChapterContainer {
        media_id: 300,
        provider: "mangadex".to_string(),
        chapters: vec![ChapterDetails {
            id: "c12".to_string(),
            chapter: "12".to_string(),
            ..Default::default()
        }],
    }];

    h.manager.track_manga(300).await.unwrap();
    let summary = h.sync().await;

    assert_eq!(summary.manga_jobs, 1);
    let snapshot = h.store.get_manga_snapshot(300).await.unwrap().unwrap();
    assert_eq!(snapshot.reference_key, "300-mangadex-c12-");
    assert_eq!(snapshot.chapter_containers.len(), 1);
    assert!(h.mirror(MediaKind::Manga).await.contains(300));
    // banner and cover only
    assert_eq!(h.host.request_count(), 2);

    h.inventory.containers.lock().unwrap().clear();
    h.sync().await;

    assert!(!h.manager.is_media_tracked(300, MediaKind::Manga).await.unwrap());
    assert!(!h.mirror(MediaKind::Manga).await.contains(300));
}

// ============================================================================
// Failures, Storage and Simulated Collections
// ============================================================================

#[tokio::test]
async fn test_failed_job_is_cached_and_omitted_from_mirror() {
    let h = Harness::new().await;
    h.metadata.failing.lock().unwrap().insert(100);
    h.set_remote(
        current(vec![entry(100, MediaListStatus::Current, 3)]),
        MediaListCollection::default(),
    )
    .await;
    h.set_files(&[("/library/show/ep1.mkv", "1")], 100);
    h.manager.track_anime(100).await.unwrap();

    h.sync().await;

    assert_eq!(h.manager.failed_media(MediaKind::Anime).await, vec![100]);
    assert!(h.store.get_anime_snapshot(100).await.unwrap().is_none());
    assert!(!h.mirror(MediaKind::Anime).await.contains(100));

    h.metadata.failing.lock().unwrap().clear();
    h.sync().await;

    assert!(h.manager.failed_media(MediaKind::Anime).await.is_empty());
    assert!(h.mirror(MediaKind::Anime).await.contains(100));
}

#[tokio::test]
async fn test_storage_size_counts_assets() {
    let h = tracked_anime_100().await;

    let size = h.manager.get_local_storage_size().await.unwrap();

    assert!(size >= 4 * PNG_MAGIC.len() as u64);
}

#[tokio::test]
async fn test_simulated_push_sends_zero_score() {
    let h = Harness::new().await;
    h.set_remote(
        current(vec![entry(400, MediaListStatus::Current, 2)]),
        MediaListCollection::default(),
    )
    .await;
    h.install_refresh().await;

    h.manager.synchronize_remote_to_simulated().await.unwrap();
    let mut simulated = h
        .manager
        .get_simulated_collection(MediaKind::Anime)
        .await
        .unwrap()
        .unwrap();
    simulated.find_entry_mut(400).unwrap().progress = Some(6);
    h.manager
        .save_simulated_collection(MediaKind::Anime, &simulated)
        .await
        .unwrap();

    let pushed = h.manager.synchronize_simulated_to_remote().await.unwrap();

    assert_eq!(pushed, 1);
    let updates = h.remote.updates();
    assert_eq!(updates[0].progress, Some(6));
    assert_eq!(updates[0].score, Some(0));
}

// ============================================================================
// Concurrent Edits
// ============================================================================

#[tokio::test]
async fn test_offline_edit_during_pass_survives_drain() {
    let h = tracked_anime_100().await;
    h.set_remote(
        current(vec![
            entry(100, MediaListStatus::Current, 3),
            entry(101, MediaListStatus::Current, 1),
        ]),
        MediaListCollection::default(),
    )
    .await;
    h.set_library(&[
        (100, "/library/show/ep1.mkv", "1"),
        (100, "/library/show/ep2.mkv", "2"),
        (101, "/library/next/ep1.mkv", "1"),
    ]);
    h.manager.track_anime(101).await.unwrap();
    let gate = h.install_gate();

    let summary = h.manager.synchronize_local().await.unwrap();
    assert_eq!(summary.anime_jobs, 1);
    gate.entered.notified().await;

    h.manager
        .offline_platform()
        .update_entry_progress(100, 9, None)
        .await
        .unwrap();
    gate.open();
    h.manager.wait_for_drain().await;

    // The drain left the edited mirror in place.
    assert!(h.store.get_anime_snapshot(101).await.unwrap().is_some());
    assert_eq!(
        h.mirror(MediaKind::Anime).await.find_entry(100).unwrap().progress,
        Some(9)
    );
    assert!(h.manager.has_local_changes().await.unwrap());

    h.install_refresh().await;
    let pushed = h.manager.synchronize_anilist().await.unwrap();

    assert_eq!(pushed, 1);
    let updates = h.remote.take_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].media_id, 100);
    assert_eq!(updates[0].progress, Some(9));
    assert!(!h.manager.has_local_changes().await.unwrap());
}

#[tokio::test]
async fn test_untrack_during_pass_discards_snapshot_and_assets() {
    let h = Harness::new().await;
    h.set_remote(
        current(vec![entry(101, MediaListStatus::Current, 1)]),
        MediaListCollection::default(),
    )
    .await;
    h.set_files(&[("/library/next/ep1.mkv", "1")], 101);
    h.manager.track_anime(101).await.unwrap();
    let gate = h.install_gate();

    h.manager.synchronize_local().await.unwrap();
    gate.entered.notified().await;
    h.manager.untrack_anime(101).await.unwrap();
    gate.open();
    h.manager.wait_for_drain().await;

    assert!(!h.manager.is_media_tracked(101, MediaKind::Anime).await.unwrap());
    assert!(h.store.get_anime_snapshot(101).await.unwrap().is_none());
    assert!(!h.data_dir.path().join("assets").join("101").exists());
    assert!(!h.mirror(MediaKind::Anime).await.contains(101));
    assert!(h.manager.offline_metadata_provider().await.is_empty());
}

// ============================================================================
// Round Trips
// ============================================================================

#[tokio::test]
async fn test_track_then_untrack_restores_store() {
    let h = Harness::new().await;
    h.set_remote(
        current(vec![
            entry(200, MediaListStatus::Current, 5),
            entry(100, MediaListStatus::Current, 3),
        ]),
        MediaListCollection::default(),
    )
    .await;
    h.set_library(&[
        (200, "/library/other/ep1.mkv", "1"),
        (100, "/library/show/ep1.mkv", "1"),
        (100, "/library/show/ep2.mkv", "2"),
    ]);
    h.manager.track_anime(200).await.unwrap();
    h.sync().await;

    let tracked = |items: Vec<core_library::models::TrackedMedia>| {
        items
            .into_iter()
            .map(|t| (t.media_id, t.kind))
            .collect::<Vec<_>>()
    };
    let assets = h.data_dir.path().join("assets");
    let tracked_before = tracked(h.store.get_all_tracked_media().await.unwrap());
    let anime_snapshots = h.store.get_all_anime_snapshots().await.unwrap();
    let manga_snapshots = h.store.get_all_manga_snapshots().await.unwrap();
    let local_anime = h.store.get_local_collection(MediaKind::Anime).await.unwrap();
    let local_manga = h.store.get_local_collection(MediaKind::Manga).await.unwrap();
    let simulated = h.store.get_simulated_collection(MediaKind::Anime).await.unwrap();
    let files = asset_files(&assets);

    h.manager.track_anime(100).await.unwrap();
    h.sync().await;
    assert!(h.store.get_anime_snapshot(100).await.unwrap().is_some());
    h.manager.untrack_anime(100).await.unwrap();
    h.manager.wait_for_drain().await;

    assert_eq!(tracked(h.store.get_all_tracked_media().await.unwrap()), tracked_before);
    assert_eq!(h.store.get_all_anime_snapshots().await.unwrap(), anime_snapshots);
    assert_eq!(h.store.get_all_manga_snapshots().await.unwrap(), manga_snapshots);
    assert_eq!(
        h.store.get_local_collection(MediaKind::Anime).await.unwrap(),
        local_anime
    );
    assert_eq!(
        h.store.get_local_collection(MediaKind::Manga).await.unwrap(),
        local_manga
    );
    assert_eq!(
        h.store.get_simulated_collection(MediaKind::Anime).await.unwrap(),
        simulated
    );
    assert_eq!(asset_files(&assets), files);
}

#[tokio::test]
async fn test_mirror_and_simulated_push_send_same_updates() {
    let h = Harness::new().await;
    h.set_remote(
        current(vec![
            MediaListEntry {
                score: Some(80.0),
                ..entry(200, MediaListStatus::Current, 5)
            },
            entry(201, MediaListStatus::Current, 2),
        ]),
        MediaListCollection::default(),
    )
    .await;
    h.set_library(&[
        (200, "/library/other/ep1.mkv", "1"),
        (201, "/library/third/ep1.mkv", "1"),
    ]);
    h.manager.track_anime(200).await.unwrap();
    h.manager.track_anime(201).await.unwrap();
    h.sync().await;

    let offline = h.manager.offline_platform();
    offline.update_entry_progress(200, 7, None).await.unwrap();
    offline.update_entry_progress(201, 4, None).await.unwrap();

    // No refresh callback, so both pushes diff against the same remote.
    h.manager.synchronize_anilist().await.unwrap();
    let from_mirror = h.remote.take_updates();

    for kind in [MediaKind::Anime, MediaKind::Manga] {
        let mirror = h.mirror(kind).await;
        h.manager
            .save_simulated_collection(kind, &mirror)
            .await
            .unwrap();
    }
    h.manager.synchronize_simulated_to_remote().await.unwrap();
    let from_simulated = h.remote.take_updates();

    assert_eq!(from_mirror.len(), 2);
    assert_eq!(from_simulated.len(), 2);
    assert_eq!(from_mirror[0], from_simulated[0]);
    assert_eq!(from_mirror[0].score, Some(80));
    // An unscored entry is left alone from the mirror, zeroed from the
    // simulated list.
    assert_eq!(from_mirror[1].score, None);
    assert_eq!(from_simulated[1].score, Some(0));
    assert_eq!(
        EntryUpdate {
            score: None,
            ..from_simulated[1].clone()
        },
        from_mirror[1]
    );
}

#[tokio::test]
async fn test_simulated_platform_edit_is_pushed_without_flag() {
    let h = Harness::new().await;
    h.set_remote(
        current(vec![entry(400, MediaListStatus::Current, 2)]),
        MediaListCollection::default(),
    )
    .await;
    h.manager.synchronize_remote_to_simulated().await.unwrap();

    let simulated = h.manager.simulated_platform();
    simulated.update_entry_progress(400, 12, Some(12)).await.unwrap();

    assert!(!h.manager.has_local_changes().await.unwrap());
    let collection = simulated.get_anime_collection(false).await.unwrap();
    assert_eq!(
        collection.find_entry(400).unwrap().status,
        Some(MediaListStatus::Completed)
    );

    let pushed = h.manager.synchronize_simulated_to_remote().await.unwrap();

    assert_eq!(pushed, 1);
    let updates = h.remote.take_updates();
    assert_eq!(updates[0].media_id, 400);
    assert_eq!(updates[0].status, Some(MediaListStatus::Completed));
    assert_eq!(updates[0].progress, Some(12));
    assert!(!h.manager.has_local_changes().await.unwrap());
}
