//! Differ: decides which tracked media need reconciliation
//!
//! Compares the remote collection with the mirror collection, the persisted
//! snapshots and the current inventory. Pure and deterministic: the same
//! inputs always produce the same map and nothing is written.

use crate::keys::{anime_reference_key, list_data_key, manga_reference_key};
use core_library::models::{
    AnimeSnapshot, ChapterContainer, LocalFile, MangaSnapshot, MediaId, MediaListCollection,
    MediaListEntry, TrackedMedia,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::trace;

/// Why a tracked media needs work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffType {
    /// No snapshot yet, or the media is missing from the mirror
    Missing,
    /// The snapshot's reference key is stale
    Metadata,
    /// Only the list data differs from the mirror
    ListData,
}

impl fmt::Display for DiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiffType::Missing => "missing",
            DiffType::Metadata => "metadata",
            DiffType::ListData => "list_data",
        };
        f.write_str(name)
    }
}

/// Persisted record the differ compares against.
pub trait SnapshotRecord: Clone {
    fn media_id(&self) -> MediaId;
    fn reference_key(&self) -> &str;
    fn banner_image_path(&self) -> &str;
    fn cover_image_path(&self) -> &str;
}

impl SnapshotRecord for AnimeSnapshot {
    fn media_id(&self) -> MediaId {
        self.media_id
    }
    fn reference_key(&self) -> &str {
        &self.reference_key
    }
    fn banner_image_path(&self) -> &str {
        &self.banner_image_path
    }
    fn cover_image_path(&self) -> &str {
        &self.cover_image_path
    }
}

impl SnapshotRecord for MangaSnapshot {
    fn media_id(&self) -> MediaId {
        self.media_id
    }
    fn reference_key(&self) -> &str {
        &self.reference_key
    }
    fn banner_image_path(&self) -> &str {
        &self.banner_image_path
    }
    fn cover_image_path(&self) -> &str {
        &self.cover_image_path
    }
}

/// One unit of work for the syncer.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffResult<S> {
    /// The remote entry, source of truth for list data and media
    pub entry: MediaListEntry,
    pub snapshot: Option<S>,
    pub diff_type: DiffType,
}

impl<S> DiffResult<S> {
    pub fn media_id(&self) -> MediaId {
        self.entry.media_id()
    }
}

pub type AnimeDiffResult = DiffResult<AnimeSnapshot>;
pub type MangaDiffResult = DiffResult<MangaSnapshot>;

pub struct AnimeDiffInput<'a> {
    pub remote: &'a MediaListCollection,
    /// `None` before the first drained pass
    pub mirror: Option<&'a MediaListCollection>,
    pub local_files: &'a [LocalFile],
    pub tracked: &'a HashMap<MediaId, TrackedMedia>,
    pub snapshots: &'a HashMap<MediaId, AnimeSnapshot>,
}

pub struct MangaDiffInput<'a> {
    pub remote: &'a MediaListCollection,
    pub mirror: Option<&'a MediaListCollection>,
    pub chapter_containers: &'a [ChapterContainer],
    pub tracked: &'a HashMap<MediaId, TrackedMedia>,
    pub snapshots: &'a HashMap<MediaId, MangaSnapshot>,
}

/// Anime needing reconciliation, keyed (and ordered) by media id.
pub fn anime_diffs(input: &AnimeDiffInput<'_>) -> BTreeMap<MediaId, AnimeDiffResult> {
    diff_entries(
        input.remote,
        input.mirror,
        input.tracked,
        input.snapshots,
        |media_id| anime_reference_key(media_id, input.local_files),
    )
}

/// Manga needing reconciliation, keyed (and ordered) by media id.
pub fn manga_diffs(input: &MangaDiffInput<'_>) -> BTreeMap<MediaId, MangaDiffResult> {
    diff_entries(
        input.remote,
        input.mirror,
        input.tracked,
        input.snapshots,
        |media_id| manga_reference_key(media_id, input.chapter_containers),
    )
}

fn diff_entries<S: SnapshotRecord>(
    remote: &MediaListCollection,
    mirror: Option<&MediaListCollection>,
    tracked: &HashMap<MediaId, TrackedMedia>,
    snapshots: &HashMap<MediaId, S>,
    current_reference_key: impl Fn(MediaId) -> String,
) -> BTreeMap<MediaId, DiffResult<S>> {
    let mut changed = BTreeMap::new();

    if remote.lists.is_empty() || tracked.is_empty() {
        return changed;
    }

    let lists = remote.lists.iter().filter(|list| list.status.is_some());
    for entry in lists.flat_map(|list| list.entries.iter()) {
        let media_id = entry.media_id();
        if !tracked.contains_key(&media_id) {
            continue;
        }

        let result = |snapshot: Option<&S>, diff_type| DiffResult {
            entry: entry.clone(),
            snapshot: snapshot.cloned(),
            diff_type,
        };

        let Some(mirror) = mirror else {
            trace!(media_id, "Mirror collection missing");
            changed.insert(media_id, result(None, DiffType::Missing));
            continue;
        };

        let Some(snapshot) = snapshots.get(&media_id) else {
            trace!(media_id, "Snapshot missing");
            changed.insert(media_id, result(None, DiffType::Missing));
            continue;
        };

        let reference_key = current_reference_key(media_id);
        if snapshot.reference_key() != reference_key {
            trace!(
                media_id,
                stored = snapshot.reference_key(),
                current = %reference_key,
                "Snapshot outdated"
            );
            changed.insert(media_id, result(Some(snapshot), DiffType::Metadata));
            continue;
        }

        let Some(mirror_entry) = mirror.find_entry(media_id) else {
            trace!(media_id, "Missing from mirror collection");
            changed.insert(media_id, result(Some(snapshot), DiffType::Missing));
            continue;
        };

        if list_data_key(entry) != list_data_key(mirror_entry) {
            trace!(media_id, "List data changed");
            changed.insert(media_id, result(Some(snapshot), DiffType::ListData));
        }
    }

    changed
}
