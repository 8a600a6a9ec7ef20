//! Push path: local list edits to the remote service

use crate::keys::list_data_key;
use bridge_traits::platform::{EntryUpdate, RemotePlatform};
use core_library::models::{MediaListCollection, MediaListEntry};
use tracing::{debug, warn};

/// How an absent score is sent upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingScore {
    /// Leave the remote score untouched
    Omit,
    /// Send `0`
    Zero,
}

/// Updates for every entry of `source` whose list data differs from its
/// counterpart in `remote`.
///
/// Entries without a status, in lists without a status, or absent from
/// `remote` are skipped.
pub fn collect_entry_updates(
    source: &MediaListCollection,
    remote: &MediaListCollection,
    missing_score: MissingScore,
) -> Vec<EntryUpdate> {
    source
        .lists
        .iter()
        .filter(|list| list.status.is_some())
        .flat_map(|list| list.entries.iter())
        .filter(|entry| entry.status.is_some())
        .filter_map(|entry| {
            let original = remote.find_entry(entry.media_id())?;
            (list_data_key(entry) != list_data_key(original))
                .then(|| entry_update(entry, missing_score))
        })
        .collect()
}

fn entry_update(entry: &MediaListEntry, missing_score: MissingScore) -> EntryUpdate {
    let score = match (entry.score, missing_score) {
        (Some(score), _) => Some(score as i32),
        (None, MissingScore::Zero) => Some(0),
        (None, MissingScore::Omit) => None,
    };

    EntryUpdate {
        media_id: entry.media_id(),
        status: entry.status,
        score,
        progress: entry.progress,
        started_at: entry.started_at,
        completed_at: entry.completed_at,
    }
}

/// Send each update; failures are logged and skipped. Returns the number of
/// updates the remote accepted.
pub async fn push_entry_updates(remote: &dyn RemotePlatform, updates: Vec<EntryUpdate>) -> usize {
    let mut pushed = 0;
    for update in updates {
        let media_id = update.media_id;
        match remote.update_entry(update).await {
            Ok(()) => {
                debug!(media_id, "Pushed list entry");
                pushed += 1;
            }
            Err(e) => warn!(media_id, error = %e, "Failed to push list entry"),
        }
    }
    pushed
}
