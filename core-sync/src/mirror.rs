//! Mirror collection rebuild
//!
//! The mirror is regenerated from the remote collection at the end of every
//! drained pass. It keeps the remote list structure but only the tracked
//! entries that have a snapshot, with artwork pointing at local assets.

use crate::differ::SnapshotRecord;
use core_library::models::{
    CoverImage, MediaId, MediaKind, MediaList, MediaListCollection, MediaListEntry,
};
use core_metadata::format_asset_url;
use std::collections::{HashMap, HashSet};

/// Build the mirror of `remote` for one media kind.
///
/// Every value of the result is an owned copy; nothing is shared with
/// `remote`.
pub fn build_mirror<S: SnapshotRecord>(
    kind: MediaKind,
    remote: &MediaListCollection,
    tracked: &HashSet<MediaId>,
    snapshots: &HashMap<MediaId, S>,
) -> MediaListCollection {
    let mut mirror = MediaListCollection {
        lists: remote
            .lists
            .iter()
            .filter(|list| list.status.is_some())
            .map(|list| MediaList {
                status: list.status,
                name: list.name.clone(),
                is_custom_list: list.is_custom_list,
                entries: Vec::new(),
            })
            .collect(),
    };

    if snapshots.is_empty() {
        return mirror;
    }

    for list in remote.lists.iter().filter(|list| list.status.is_some()) {
        for entry in &list.entries {
            let media_id = entry.media_id();
            if !tracked.contains(&media_id) {
                continue;
            }
            let Some(snapshot) = snapshots.get(&media_id) else {
                continue;
            };

            if let Some(target) = mirror.lists.iter_mut().find(|l| l.status == list.status) {
                target.entries.push(mirror_entry(kind, entry, snapshot));
            }
        }
    }

    mirror
}

fn mirror_entry<S: SnapshotRecord>(
    kind: MediaKind,
    entry: &MediaListEntry,
    snapshot: &S,
) -> MediaListEntry {
    let media_id = snapshot.media_id();
    let asset_url = |path: &str| (!path.is_empty()).then(|| format_asset_url(media_id, path));
    let cover = asset_url(snapshot.cover_image_path());

    let mut media = entry.media.clone();
    media.banner_image = asset_url(snapshot.banner_image_path());
    media.cover_image = CoverImage {
        extra_large: cover.clone(),
        large: cover.clone(),
        medium: cover,
        color: media.cover_image.color.take(),
    };
    if kind == MediaKind::Anime {
        media.next_airing_episode = None;
    }

    MediaListEntry {
        id: entry.id,
        score: entry.score,
        progress: entry.progress,
        status: entry.status,
        notes: entry.notes.clone(),
        repeat: entry.repeat,
        private: entry.private,
        started_at: entry.started_at,
        completed_at: entry.completed_at,
        media,
    }
}
