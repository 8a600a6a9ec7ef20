//! # Syncer
//!
//! Two bounded work queues, one per media kind, each drained by a single
//! worker task. Every job reconciles one tracked media against the
//! inventory. When both queues are empty and nothing is in flight, the
//! mirror collections are rebuilt once and `sync-local-finished` is
//! published.
//!
//! The rebuild leaves the mirrors alone while they carry local edits that
//! were not pushed; the next pass after the push regenerates them.
//!
//! ## Drain detection
//!
//! `pending` counts jobs that were dispatched and have not completed yet,
//! whether still buffered in a channel or held by a worker. It is raised
//! before the first send, so a worker finishing early never sees a false
//! drain while the rest of the pass is still being enqueued.

use crate::context::SyncContext;
use crate::differ::{
    anime_diffs, manga_diffs, AnimeDiffInput, AnimeDiffResult, MangaDiffInput, MangaDiffResult,
};
use crate::error::Result;
use crate::mirror::build_mirror;
use crate::reconcile::{reconcile_anime, reconcile_manga};
use async_trait::async_trait;
use core_library::models::{
    AnimeSnapshot, MangaSnapshot, MediaId, MediaKind, MediaListEntry, TrackedMedia,
};
use core_runtime::config::{DEFAULT_FAILED_CACHE_CAPACITY, DEFAULT_QUEUE_CAPACITY};
use core_runtime::events::{CoreEvent, QueueMediaTask, QueueState, SyncEvent};
use lru::LruCache;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Sizing for the work queues and failure caches.
#[derive(Debug, Clone, Copy)]
pub struct SyncerConfig {
    pub queue_capacity: usize,
    pub failed_cache_capacity: usize,
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            failed_cache_capacity: DEFAULT_FAILED_CACHE_CAPACITY,
        }
    }
}

/// Jobs handed to the workers by one `run_diffs` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub anime_jobs: usize,
    pub manga_jobs: usize,
}

impl DispatchSummary {
    pub fn total(&self) -> usize {
        self.anime_jobs + self.manga_jobs
    }
}

/// Tracked items and snapshots read from the store at the start of a pass.
#[derive(Debug, Default)]
pub(crate) struct PassInput {
    pub tracked_anime: HashMap<MediaId, TrackedMedia>,
    pub tracked_manga: HashMap<MediaId, TrackedMedia>,
    pub anime_snapshots: HashMap<MediaId, AnimeSnapshot>,
    pub manga_snapshots: HashMap<MediaId, MangaSnapshot>,
}

#[async_trait]
trait QueueJob: Send + Sync + 'static {
    const KIND: MediaKind;

    fn entry(&self) -> &MediaListEntry;

    async fn reconcile(&self, ctx: &SyncContext) -> Result<()>;
}

#[async_trait]
impl QueueJob for AnimeDiffResult {
    const KIND: MediaKind = MediaKind::Anime;

    fn entry(&self) -> &MediaListEntry {
        &self.entry
    }

    async fn reconcile(&self, ctx: &SyncContext) -> Result<()> {
        reconcile_anime(ctx, self).await
    }
}

#[async_trait]
impl QueueJob for MangaDiffResult {
    const KIND: MediaKind = MediaKind::Manga;

    fn entry(&self) -> &MediaListEntry {
        &self.entry
    }

    async fn reconcile(&self, ctx: &SyncContext) -> Result<()> {
        reconcile_manga(ctx, self).await
    }
}

#[derive(Default)]
struct QueueControl {
    queue_state: QueueState,
    pending: usize,
    should_rebuild: bool,
    rebuilding: bool,
}

impl QueueControl {
    fn is_idle(&self) -> bool {
        self.pending == 0 && !self.should_rebuild && !self.rebuilding
    }

    fn tasks_mut(&mut self, kind: MediaKind) -> &mut BTreeMap<i32, QueueMediaTask> {
        match kind {
            MediaKind::Anime => &mut self.queue_state.anime_tasks,
            MediaKind::Manga => &mut self.queue_state.manga_tasks,
        }
    }
}

struct SyncerShared {
    ctx: Arc<SyncContext>,
    control: Mutex<QueueControl>,
    /// Serializes drain checks so one drain rebuilds exactly once.
    rebuild_lock: Mutex<()>,
    failed_anime: Mutex<LruCache<MediaId, MediaListEntry>>,
    failed_manga: Mutex<LruCache<MediaId, MediaListEntry>>,
    /// Bumped after every completed drain.
    drained: watch::Sender<u64>,
}

pub(crate) struct Syncer {
    shared: Arc<SyncerShared>,
    anime_tx: Mutex<Option<mpsc::Sender<AnimeDiffResult>>>,
    manga_tx: Mutex<Option<mpsc::Sender<MangaDiffResult>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Syncer {
    /// Create the queues and spawn one worker per media kind. Must be called
    /// from within a Tokio runtime.
    pub fn new(ctx: Arc<SyncContext>, config: SyncerConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let failed_capacity =
            NonZeroUsize::new(config.failed_cache_capacity).unwrap_or(NonZeroUsize::MIN);

        let (drained, _) = watch::channel(0);
        let shared = Arc::new(SyncerShared {
            ctx,
            control: Mutex::new(QueueControl::default()),
            rebuild_lock: Mutex::new(()),
            failed_anime: Mutex::new(LruCache::new(failed_capacity)),
            failed_manga: Mutex::new(LruCache::new(failed_capacity)),
            drained,
        });

        let (anime_tx, anime_rx) = mpsc::channel(capacity);
        let (manga_tx, manga_rx) = mpsc::channel(capacity);

        let workers = vec![
            tokio::spawn(run_worker(Arc::clone(&shared), anime_rx)),
            tokio::spawn(run_worker(Arc::clone(&shared), manga_rx)),
        ];

        Self {
            shared,
            anime_tx: Mutex::new(Some(anime_tx)),
            manga_tx: Mutex::new(Some(manga_tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Compute the diffs for both kinds and enqueue them.
    ///
    /// Skipped (zero jobs) when a remote collection is absent or a previous
    /// pass still has jobs pending. Returns as soon as the jobs are handed
    /// off; sends that find a queue full wait in a background task.
    pub async fn run_diffs(&self, pass: PassInput) -> DispatchSummary {
        let ctx = &self.shared.ctx;
        let (Some(remote_anime), Some(remote_manga)) = (
            ctx.remote(MediaKind::Anime).await,
            ctx.remote(MediaKind::Manga).await,
        ) else {
            error!("Cannot run diffs, a remote collection is not set");
            return DispatchSummary::default();
        };

        let anime_tx = self.anime_tx.lock().await.clone();
        let manga_tx = self.manga_tx.lock().await.clone();
        let (Some(anime_tx), Some(manga_tx)) = (anime_tx, manga_tx) else {
            warn!("Syncer is shut down, ignoring diff pass");
            return DispatchSummary::default();
        };

        let mut control = self.shared.control.lock().await;
        if control.pending > 0 {
            trace!(pending = control.pending, "Skipping diffs, queues are not empty");
            return DispatchSummary::default();
        }

        let inventory = ctx.inventory().await;
        let mirror_anime = ctx.mirror(MediaKind::Anime).await;
        let mirror_manga = ctx.mirror(MediaKind::Manga).await;

        let anime = anime_diffs(&AnimeDiffInput {
            remote: &remote_anime,
            mirror: mirror_anime.as_deref(),
            local_files: &inventory.local_files,
            tracked: &pass.tracked_anime,
            snapshots: &pass.anime_snapshots,
        });
        let manga = manga_diffs(&MangaDiffInput {
            remote: &remote_manga,
            mirror: mirror_manga.as_deref(),
            chapter_containers: &inventory.chapter_containers,
            tracked: &pass.tracked_manga,
            snapshots: &pass.manga_snapshots,
        });

        let summary = DispatchSummary {
            anime_jobs: anime.len(),
            manga_jobs: manga.len(),
        };
        control.pending += summary.total();
        drop(control);

        info!(
            anime_jobs = summary.anime_jobs,
            manga_jobs = summary.manga_jobs,
            "Dispatching local sync jobs"
        );

        if summary.total() > 0 {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                let unsent = enqueue(anime_tx, anime.into_values()).await
                    + enqueue(manga_tx, manga.into_values()).await;
                if unsent > 0 {
                    shared.forget_jobs(unsent).await;
                }
            });
        }

        summary
    }

    /// Rebuild the mirrors now, unless jobs are pending (the drain will do it).
    pub async fn refresh_collections(&self) {
        {
            let mut control = self.shared.control.lock().await;
            if control.pending > 0 {
                trace!("Skipping refresh, queues are not empty");
                return;
            }
            control.should_rebuild = true;
        }
        self.shared.drain_check().await;
    }

    /// Resolve once no job is pending and no rebuild is owed or running.
    pub async fn wait_for_drain(&self) {
        let mut drained = self.shared.drained.subscribe();
        loop {
            if self.shared.control.lock().await.is_idle() {
                return;
            }
            if drained.changed().await.is_err() {
                return;
            }
        }
    }

    pub async fn queue_state(&self) -> QueueState {
        self.shared.control.lock().await.queue_state.clone()
    }

    /// Media whose last reconciliation failed, most recent first.
    pub async fn failed_media(&self, kind: MediaKind) -> Vec<MediaId> {
        self.shared
            .failed(kind)
            .lock()
            .await
            .iter()
            .map(|(media_id, _)| *media_id)
            .collect()
    }

    /// Close both queues and wait for the workers to finish what is buffered.
    pub async fn shutdown(&self) {
        self.anime_tx.lock().await.take();
        self.manga_tx.lock().await.take();

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Sync worker panicked");
            }
        }
        debug!("Syncer shut down");
    }
}

/// Send every job, waiting while the queue is full. Returns how many could
/// not be sent because the queue was closed.
async fn enqueue<J: QueueJob>(
    tx: mpsc::Sender<J>,
    jobs: impl ExactSizeIterator<Item = J>,
) -> usize {
    let mut remaining = jobs.len();
    for job in jobs {
        if tx.send(job).await.is_err() {
            warn!(kind = %J::KIND, remaining, "Sync queue closed while enqueueing");
            return remaining;
        }
        remaining -= 1;
    }
    0
}

async fn run_worker<J: QueueJob>(shared: Arc<SyncerShared>, mut rx: mpsc::Receiver<J>) {
    while let Some(job) = rx.recv().await {
        shared.process(job).await;
    }
    debug!(kind = %J::KIND, "Sync worker stopped");
}

impl SyncerShared {
    fn failed(&self, kind: MediaKind) -> &Mutex<LruCache<MediaId, MediaListEntry>> {
        match kind {
            MediaKind::Anime => &self.failed_anime,
            MediaKind::Manga => &self.failed_manga,
        }
    }

    fn publish_queue_state(&self, control: &QueueControl) {
        self.ctx.emit(CoreEvent::Sync(SyncEvent::QueueState {
            state: control.queue_state.clone(),
        }));
    }

    async fn process<J: QueueJob>(&self, job: J) {
        let entry = job.entry();
        let media_id = entry.media_id();

        {
            let mut control = self.control.lock().await;
            control.tasks_mut(J::KIND).insert(
                media_id,
                QueueMediaTask {
                    media_id,
                    image: entry.media.cover_image.best().unwrap_or_default().to_string(),
                    title: entry.media.title.preferred(),
                    kind: J::KIND.as_str().to_string(),
                },
            );
            control.should_rebuild = true;
            self.publish_queue_state(&control);
        }

        match job.reconcile(&self.ctx).await {
            Ok(()) => {
                self.failed(J::KIND).lock().await.pop(&media_id);
            }
            Err(e) => {
                warn!(media_id, kind = %J::KIND, error = %e, "Failed to reconcile media");
                self.failed(J::KIND).lock().await.put(media_id, entry.clone());
            }
        }

        {
            let mut control = self.control.lock().await;
            control.tasks_mut(J::KIND).remove(&media_id);
            control.pending = control.pending.saturating_sub(1);
            self.publish_queue_state(&control);
        }

        self.drain_check().await;
    }

    async fn forget_jobs(&self, count: usize) {
        {
            let mut control = self.control.lock().await;
            control.pending = control.pending.saturating_sub(count);
        }
        self.drain_check().await;
    }

    async fn drain_check(&self) {
        let _rebuild = self.rebuild_lock.lock().await;

        {
            let mut control = self.control.lock().await;
            if !control.should_rebuild || control.pending > 0 {
                return;
            }
            control.should_rebuild = false;
            control.rebuilding = true;
        }

        if let Err(e) = self.rebuild_mirrors().await {
            error!(error = %e, "Failed to rebuild mirror collections");
        }
        if let Err(e) = self.ctx.reload_offline_metadata().await {
            error!(error = %e, "Failed to reload offline metadata");
        }

        {
            let mut control = self.control.lock().await;
            control.rebuilding = false;
            self.publish_queue_state(&control);
            self.ctx.emit(CoreEvent::Sync(SyncEvent::Finished));
        }

        self.drained.send_modify(|generation| *generation = generation.wrapping_add(1));
        info!("Local sync finished");
    }

    /// Regenerate the mirrors from the remote collections. Skipped while the
    /// mirrors hold unpushed edits, which a rebuild would discard.
    async fn rebuild_mirrors(&self) -> Result<()> {
        let _writer = self.ctx.lock_mirror_writes().await;
        let store = &self.ctx.store;

        if store.get_settings().await?.updated {
            warn!("Local edits not pushed yet, keeping the current mirror collections");
            return Ok(());
        }

        let anime = match self.ctx.remote(MediaKind::Anime).await {
            Some(remote) => {
                let tracked =
                    tracked_ids(store.get_all_tracked_media_by_kind(MediaKind::Anime).await?);
                let snapshots: HashMap<_, _> = store
                    .get_all_anime_snapshots()
                    .await?
                    .into_iter()
                    .map(|s| (s.media_id, s))
                    .collect();
                Some(build_mirror(MediaKind::Anime, &remote, &tracked, &snapshots))
            }
            None => None,
        };

        let manga = match self.ctx.remote(MediaKind::Manga).await {
            Some(remote) => {
                let tracked =
                    tracked_ids(store.get_all_tracked_media_by_kind(MediaKind::Manga).await?);
                let snapshots: HashMap<_, _> = store
                    .get_all_manga_snapshots()
                    .await?
                    .into_iter()
                    .map(|s| (s.media_id, s))
                    .collect();
                Some(build_mirror(MediaKind::Manga, &remote, &tracked, &snapshots))
            }
            None => None,
        };

        debug!(
            anime = anime.as_ref().map(|m| m.entries().count()),
            manga = manga.as_ref().map(|m| m.entries().count()),
            "Rebuilt mirror collections"
        );
        self.ctx.replace_mirrors(anime, manga).await
    }
}

fn tracked_ids(tracked: Vec<TrackedMedia>) -> HashSet<MediaId> {
    tracked.into_iter().map(|t| t.media_id).collect()
}
