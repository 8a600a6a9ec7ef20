//! List-entry edits shared by the offline and simulated platforms

use bridge_traits::error::BridgeError;
use bridge_traits::platform::EntryUpdate;
use core_library::models::{MediaId, MediaKind, MediaListCollection, MediaListEntry};
use std::fmt;

/// Copy the fields an update carries onto `entry`; absent fields are kept.
pub(crate) fn apply_update(entry: &mut MediaListEntry, update: &EntryUpdate) {
    if update.status.is_some() {
        entry.status = update.status;
    }
    if let Some(score) = update.score {
        entry.score = Some(f64::from(score));
    }
    if update.progress.is_some() {
        entry.progress = update.progress;
    }
    if update.started_at.is_some() {
        entry.started_at = update.started_at;
    }
    if update.completed_at.is_some() {
        entry.completed_at = update.completed_at;
    }
}

/// Episode count for anime, chapter count for manga.
pub(crate) fn set_total(entry: &mut MediaListEntry, kind: MediaKind, total: Option<i32>) {
    let Some(total) = total else {
        return;
    };
    match kind {
        MediaKind::Anime => entry.media.episodes = Some(total),
        MediaKind::Manga => entry.media.chapters = Some(total),
    }
}

/// Unused entry id for a new entry of `collection`.
pub(crate) fn next_entry_id(collection: &MediaListCollection) -> i32 {
    collection.entries().map(|e| e.id).max().unwrap_or(0).saturating_add(1)
}

pub(crate) fn not_found(media_id: MediaId) -> BridgeError {
    BridgeError::NotFound(format!("media {media_id} is not in the local collections"))
}

pub(crate) fn local_error(e: impl fmt::Display) -> BridgeError {
    BridgeError::OperationFailed(format!("local collection: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::models::{FuzzyDate, Media, MediaList, MediaListStatus};

    #[test]
    fn test_apply_update_keeps_absent_fields() {
        let mut entry = MediaListEntry {
            status: Some(MediaListStatus::Current),
            score: Some(70.0),
            progress: Some(2),
            ..Default::default()
        };

        apply_update(
            &mut entry,
            &EntryUpdate {
                media_id: 1,
                progress: Some(5),
                started_at: Some(FuzzyDate::new(2024, 1, 2)),
                ..Default::default()
            },
        );

        assert_eq!(entry.status, Some(MediaListStatus::Current));
        assert_eq!(entry.score, Some(70.0));
        assert_eq!(entry.progress, Some(5));
        assert_eq!(entry.started_at, Some(FuzzyDate::new(2024, 1, 2)));
    }

    #[test]
    fn test_next_entry_id() {
        assert_eq!(next_entry_id(&MediaListCollection::default()), 1);

        let collection = MediaListCollection {
            lists: vec![MediaList {
                entries: vec![
                    MediaListEntry {
                        id: 41,
                        media: Media::new(1),
                        ..Default::default()
                    },
                    MediaListEntry {
                        id: 7,
                        media: Media::new(2),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
        };
        assert_eq!(next_entry_id(&collection), 42);
    }
}
