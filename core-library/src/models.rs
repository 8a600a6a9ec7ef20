//! Domain models for the local media library
//!
//! Collections mirror the list-tracking service's shape (lists of entries,
//! each embedding its media), inventory records describe what is on disk,
//! and snapshots are the locally persisted record of a tracked media.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Identifier of a media on the list-tracking service.
pub type MediaId = i32;

// =============================================================================
// Media Kind & Status
// =============================================================================

/// Discriminates anime from manga across the store and the sync queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Anime,
    Manga,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Anime => "anime",
            MediaKind::Manga => "manga",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anime" => Ok(MediaKind::Anime),
            "manga" => Ok(MediaKind::Manga),
            other => Err(format!("unknown media kind: {}", other)),
        }
    }
}

/// Watching/reading status of a list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaListStatus {
    Current,
    Planning,
    Completed,
    Dropped,
    Paused,
    Repeating,
}

impl MediaListStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaListStatus::Current => "CURRENT",
            MediaListStatus::Planning => "PLANNING",
            MediaListStatus::Completed => "COMPLETED",
            MediaListStatus::Dropped => "DROPPED",
            MediaListStatus::Paused => "PAUSED",
            MediaListStatus::Repeating => "REPEATING",
        }
    }
}

impl fmt::Display for MediaListStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Media
// =============================================================================

/// A date where any component may be unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuzzyDate {
    pub year: Option<i32>,
    pub month: Option<i32>,
    pub day: Option<i32>,
}

impl FuzzyDate {
    pub fn new(year: i32, month: i32, day: i32) -> Self {
        Self {
            year: Some(year),
            month: Some(month),
            day: Some(day),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaTitle {
    pub romaji: Option<String>,
    pub english: Option<String>,
    pub native: Option<String>,
    pub user_preferred: Option<String>,
}

impl MediaTitle {
    /// Title shown to the user: user-preferred, then romaji, english, native.
    pub fn preferred(&self) -> String {
        [
            &self.user_preferred,
            &self.romaji,
            &self.english,
            &self.native,
        ]
        .into_iter()
        .flatten()
        .find(|t| !t.is_empty())
        .cloned()
        .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverImage {
    pub extra_large: Option<String>,
    pub large: Option<String>,
    pub medium: Option<String>,
    pub color: Option<String>,
}

impl CoverImage {
    /// Best available cover URL, largest first.
    pub fn best(&self) -> Option<&str> {
        [&self.extra_large, &self.large, &self.medium]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiringEpisode {
    pub airing_at: i64,
    pub time_until_airing: i64,
    pub episode: i32,
}

/// Media embedded in a list entry. Shared by anime and manga; fields that do
/// not apply to a kind stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub id: MediaId,
    pub id_mal: Option<i32>,
    #[serde(default)]
    pub title: MediaTitle,
    pub format: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub cover_image: CoverImage,
    pub banner_image: Option<String>,
    pub episodes: Option<i32>,
    pub chapters: Option<i32>,
    pub volumes: Option<i32>,
    pub next_airing_episode: Option<AiringEpisode>,
}

impl Media {
    pub fn new(id: MediaId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

// =============================================================================
// Collections
// =============================================================================

/// One entry of the user's list: editable list data plus the media.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaListEntry {
    pub id: i32,
    pub score: Option<f64>,
    pub progress: Option<i32>,
    pub status: Option<MediaListStatus>,
    pub notes: Option<String>,
    pub repeat: Option<i32>,
    pub private: Option<bool>,
    pub started_at: Option<FuzzyDate>,
    pub completed_at: Option<FuzzyDate>,
    pub media: Media,
}

impl MediaListEntry {
    pub fn media_id(&self) -> MediaId {
        self.media.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaList {
    pub status: Option<MediaListStatus>,
    pub name: Option<String>,
    pub is_custom_list: Option<bool>,
    #[serde(default)]
    pub entries: Vec<MediaListEntry>,
}

/// The user's lists for one media kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaListCollection {
    #[serde(default)]
    pub lists: Vec<MediaList>,
}

impl MediaListCollection {
    /// Iterates every entry of every list.
    pub fn entries(&self) -> impl Iterator<Item = &MediaListEntry> {
        self.lists.iter().flat_map(|list| list.entries.iter())
    }

    pub fn find_entry(&self, media_id: MediaId) -> Option<&MediaListEntry> {
        self.entries().find(|entry| entry.media_id() == media_id)
    }

    pub fn find_entry_mut(&mut self, media_id: MediaId) -> Option<&mut MediaListEntry> {
        self.lists
            .iter_mut()
            .flat_map(|list| list.entries.iter_mut())
            .find(|entry| entry.media_id() == media_id)
    }

    pub fn contains(&self, media_id: MediaId) -> bool {
        self.find_entry(media_id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    /// Moves entries whose status no longer matches their list into the list
    /// with the matching status. Entries with no matching list stay put.
    pub fn regroup_by_status(&mut self) {
        let mut displaced = Vec::new();
        for list in self.lists.iter_mut() {
            let Some(list_status) = list.status else {
                continue;
            };
            let (keep, moved): (Vec<_>, Vec<_>) = list
                .entries
                .drain(..)
                .partition(|entry| entry.status.map_or(true, |s| s == list_status));
            list.entries = keep;
            displaced.extend(moved);
        }

        for entry in displaced {
            self.add_entry(entry);
        }
    }

    /// Appends `entry` to the list matching its status, creating that list
    /// when the collection has none.
    pub fn add_entry(&mut self, entry: MediaListEntry) {
        let target = self
            .lists
            .iter_mut()
            .find(|list| list.status.is_some() && list.status == entry.status);
        match target {
            Some(list) => list.entries.push(entry),
            None => self.lists.push(MediaList {
                status: entry.status,
                name: entry.status.map(|s| s.as_str().to_string()),
                is_custom_list: Some(false),
                entries: vec![entry],
            }),
        }
    }

    pub fn remove_entry(&mut self, media_id: MediaId) -> Option<MediaListEntry> {
        self.lists.iter_mut().find_map(|list| {
            let index = list.entries.iter().position(|e| e.media_id() == media_id)?;
            Some(list.entries.remove(index))
        })
    }
}

// =============================================================================
// Inventory
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalFileType {
    #[default]
    Main,
    Special,
    Nc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalFileMetadata {
    /// Key into [`AnimeMetadata::episodes`] (e.g. `"1"`, `"S1"`)
    pub episode_key: String,
    #[serde(rename = "type")]
    pub kind: LocalFileType,
}

/// A scanned video file matched to an anime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalFile {
    pub path: String,
    pub media_id: MediaId,
    #[serde(default)]
    pub metadata: LocalFileMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterDetails {
    pub id: String,
    pub title: String,
    pub chapter: String,
}

/// Chapters of one manga downloaded from one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterContainer {
    pub media_id: MediaId,
    pub provider: String,
    #[serde(default)]
    pub chapters: Vec<ChapterDetails>,
}

// =============================================================================
// Anime Metadata
// =============================================================================

/// Which service a metadata lookup is keyed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataPlatform {
    Anilist,
    Mal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeMetadata {
    pub episode: String,
    pub episode_number: i32,
    pub absolute_episode_number: i32,
    pub title: String,
    pub image: String,
    pub air_date: String,
    pub length: i32,
    pub summary: String,
    pub overview: String,
    pub is_filler: bool,
}

/// Episode-level metadata of an anime, keyed by episode key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeMetadata {
    #[serde(default)]
    pub titles: HashMap<String, String>,
    #[serde(default)]
    pub episodes: HashMap<String, EpisodeMetadata>,
    pub episode_count: i32,
    pub special_count: i32,
}

// =============================================================================
// Persisted Records
// =============================================================================

/// A media the user marked for offline retention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedMedia {
    pub media_id: MediaId,
    pub kind: MediaKind,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TrackedMedia {
    pub fn new(media_id: MediaId, kind: MediaKind) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            media_id,
            kind,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Locally persisted metadata and asset paths of one tracked anime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeSnapshot {
    pub media_id: MediaId,
    pub anime_metadata: AnimeMetadata,
    pub banner_image_path: String,
    pub cover_image_path: String,
    /// Episode key to asset filename
    pub episode_image_paths: HashMap<String, String>,
    pub reference_key: String,
}

/// Locally persisted chapters and asset paths of one tracked manga.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MangaSnapshot {
    pub media_id: MediaId,
    pub chapter_containers: Vec<ChapterContainer>,
    pub banner_image_path: String,
    pub cover_image_path: String,
    pub reference_key: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settings {
    /// Local edits exist that were not pushed upstream
    pub updated: bool,
}
