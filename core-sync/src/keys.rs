//! Fingerprints used to detect stale snapshots and diverging list entries
//!
//! Keys are plain strings compared for equality. Inputs are sorted before
//! formatting so enumeration order never changes a key.

use core_library::models::{ChapterContainer, FuzzyDate, LocalFile, MediaId, MediaListEntry};

/// `"<id>-<sorted paths joined by ','>"` over the files of `media_id`.
///
/// Absolute paths are part of the key: moving the library root makes every
/// anime snapshot stale.
pub fn anime_reference_key(media_id: MediaId, local_files: &[LocalFile]) -> String {
    let mut paths: Vec<&str> = local_files
        .iter()
        .filter(|lf| lf.media_id == media_id)
        .map(|lf| lf.path.as_str())
        .collect();
    paths.sort_unstable();

    format!("{}-{}", media_id, paths.join(","))
}

/// `"<id>-"` followed by `"<provider>-<chapter id>-..."` for each container of
/// `media_id`, containers sorted by provider and chapters by id.
pub fn manga_reference_key(media_id: MediaId, containers: &[ChapterContainer]) -> String {
    let mut matching: Vec<&ChapterContainer> = containers
        .iter()
        .filter(|c| c.media_id == media_id)
        .collect();
    matching.sort_by(|a, b| a.provider.cmp(&b.provider));

    let mut key = String::new();
    for container in matching {
        key.push_str(&container.provider);
        key.push('-');

        let mut ids: Vec<&str> = container.chapters.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        for id in ids {
            key.push_str(id);
            key.push('-');
        }
    }

    format!("{}-{}", media_id, key)
}

/// Fingerprint of the user-editable fields of an entry.
///
/// Missing values format as `""` (status) or `0`, so an absent field and a
/// zero value compare equal.
pub fn list_data_key(entry: &MediaListEntry) -> String {
    let started = entry.started_at.unwrap_or_default();
    let completed = entry.completed_at.unwrap_or_default();
    let (sy, sm, sd) = date_parts(&started);
    let (cy, cm, cd) = date_parts(&completed);

    format!(
        "{}-{}-{:.6}-{}-{}-{}-{}-{}-{}-{}",
        entry.status.map(|s| s.as_str()).unwrap_or_default(),
        entry.progress.unwrap_or(0),
        entry.score.unwrap_or(0.0),
        entry.repeat.unwrap_or(0),
        sy,
        sm,
        sd,
        cy,
        cm,
        cd,
    )
}

fn date_parts(date: &FuzzyDate) -> (i32, i32, i32) {
    (
        date.year.unwrap_or(0),
        date.month.unwrap_or(0),
        date.day.unwrap_or(0),
    )
}
