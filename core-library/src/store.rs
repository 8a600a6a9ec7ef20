//! Local store repository
//!
//! Persists settings, tracked media, snapshots and the two cached collection
//! kinds (mirror and simulated). Collections and snapshot sub-structures are
//! stored as JSON; the store never interprets collection payloads.

use crate::error::{LibraryError, Result};
use crate::models::{
    AnimeMetadata, AnimeSnapshot, ChapterContainer, MangaSnapshot, MediaId, MediaKind,
    MediaListCollection, Settings, TrackedMedia,
};
use async_trait::async_trait;
use sqlx::{query, query_as, FromRow, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Which cached collection table a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollectionTable {
    Mirror,
    Simulated,
}

impl CollectionTable {
    fn name(&self) -> &'static str {
        match self {
            CollectionTable::Mirror => "local_collections",
            CollectionTable::Simulated => "simulated_collections",
        }
    }
}

/// Local store interface for data access operations
///
/// Every `save_*` is an upsert. Getters return `Ok(None)` when the row does
/// not exist; any other failure is an error.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Returns the settings row, or defaults when it was never saved.
    async fn get_settings(&self) -> Result<Settings>;

    async fn save_settings(&self, settings: Settings) -> Result<()>;

    async fn get_tracked_media(
        &self,
        media_id: MediaId,
        kind: MediaKind,
    ) -> Result<Option<TrackedMedia>>;

    async fn get_all_tracked_media(&self) -> Result<Vec<TrackedMedia>>;

    async fn get_all_tracked_media_by_kind(&self, kind: MediaKind) -> Result<Vec<TrackedMedia>>;

    /// Insert or refresh a tracked media row.
    ///
    /// An existing row keeps its `created_at`.
    async fn set_tracked_media(&self, tracked: &TrackedMedia) -> Result<()>;

    /// Delete a tracked media row
    ///
    /// # Returns
    /// - `Ok(true)` if the row was deleted
    /// - `Ok(false)` if it did not exist
    async fn remove_tracked_media(&self, media_id: MediaId, kind: MediaKind) -> Result<bool>;

    async fn get_anime_snapshot(&self, media_id: MediaId) -> Result<Option<AnimeSnapshot>>;

    async fn get_all_anime_snapshots(&self) -> Result<Vec<AnimeSnapshot>>;

    async fn save_anime_snapshot(&self, snapshot: &AnimeSnapshot) -> Result<()>;

    async fn remove_anime_snapshot(&self, media_id: MediaId) -> Result<bool>;

    async fn get_manga_snapshot(&self, media_id: MediaId) -> Result<Option<MangaSnapshot>>;

    async fn get_all_manga_snapshots(&self) -> Result<Vec<MangaSnapshot>>;

    async fn save_manga_snapshot(&self, snapshot: &MangaSnapshot) -> Result<()>;

    async fn remove_manga_snapshot(&self, media_id: MediaId) -> Result<bool>;

    /// Mirror collection rebuilt at the end of each sync pass
    async fn get_local_collection(&self, kind: MediaKind) -> Result<Option<MediaListCollection>>;

    async fn save_local_collection(
        &self,
        kind: MediaKind,
        collection: &MediaListCollection,
    ) -> Result<()>;

    /// Collection edited without a remote account
    async fn get_simulated_collection(
        &self,
        kind: MediaKind,
    ) -> Result<Option<MediaListCollection>>;

    async fn save_simulated_collection(
        &self,
        kind: MediaKind,
        collection: &MediaListCollection,
    ) -> Result<()>;
}

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(FromRow)]
struct TrackedMediaRow {
    media_id: i32,
    kind: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<TrackedMediaRow> for TrackedMedia {
    type Error = LibraryError;

    fn try_from(row: TrackedMediaRow) -> Result<Self> {
        let kind = row
            .kind
            .parse::<MediaKind>()
            .map_err(|message| LibraryError::InvalidInput {
                field: "kind".to_string(),
                message,
            })?;
        Ok(TrackedMedia {
            media_id: row.media_id,
            kind,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AnimeSnapshotRow {
    media_id: i32,
    anime_metadata: String,
    banner_image_path: String,
    cover_image_path: String,
    episode_image_paths: String,
    reference_key: String,
}

impl TryFrom<AnimeSnapshotRow> for AnimeSnapshot {
    type Error = LibraryError;

    fn try_from(row: AnimeSnapshotRow) -> Result<Self> {
        let anime_metadata: AnimeMetadata = serde_json::from_str(&row.anime_metadata)?;
        let episode_image_paths: HashMap<String, String> =
            serde_json::from_str(&row.episode_image_paths)?;
        Ok(AnimeSnapshot {
            media_id: row.media_id,
            anime_metadata,
            banner_image_path: row.banner_image_path,
            cover_image_path: row.cover_image_path,
            episode_image_paths,
            reference_key: row.reference_key,
        })
    }
}

#[derive(FromRow)]
struct MangaSnapshotRow {
    media_id: i32,
    chapter_containers: String,
    banner_image_path: String,
    cover_image_path: String,
    reference_key: String,
}

impl TryFrom<MangaSnapshotRow> for MangaSnapshot {
    type Error = LibraryError;

    fn try_from(row: MangaSnapshotRow) -> Result<Self> {
        let chapter_containers: Vec<ChapterContainer> =
            serde_json::from_str(&row.chapter_containers)?;
        Ok(MangaSnapshot {
            media_id: row.media_id,
            chapter_containers,
            banner_image_path: row.banner_image_path,
            cover_image_path: row.cover_image_path,
            reference_key: row.reference_key,
        })
    }
}

// =============================================================================
// SQLite Implementation
// =============================================================================

/// SQLite implementation of LocalStore
#[derive(Clone)]
pub struct SqliteLocalStore {
    pool: SqlitePool,
}

impl SqliteLocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn get_collection(
        &self,
        table: CollectionTable,
        kind: MediaKind,
    ) -> Result<Option<MediaListCollection>> {
        let sql = format!("SELECT payload FROM {} WHERE kind = ?", table.name());
        let payload: Option<(Vec<u8>,)> = query_as(&sql)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await?;

        payload
            .map(|(bytes,)| serde_json::from_slice(&bytes).map_err(LibraryError::from))
            .transpose()
    }

    async fn save_collection(
        &self,
        table: CollectionTable,
        kind: MediaKind,
        collection: &MediaListCollection,
    ) -> Result<()> {
        let payload = serde_json::to_vec(collection)?;
        let sql = format!(
            r#"
            INSERT INTO {} (kind, payload, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(kind) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
            table.name()
        );
        query(&sql)
            .bind(kind.as_str())
            .bind(payload)
            .bind(now())
            .execute(&self.pool)
            .await?;

        debug!(table = table.name(), %kind, "Saved collection");
        Ok(())
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn get_settings(&self) -> Result<Settings> {
        let row: Option<(bool,)> = query_as("SELECT updated FROM settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(Settings {
            updated: row.map(|(updated,)| updated).unwrap_or(false),
        })
    }

    async fn save_settings(&self, settings: Settings) -> Result<()> {
        query(
            r#"
            INSERT INTO settings (id, updated) VALUES (1, ?)
            ON CONFLICT(id) DO UPDATE SET updated = excluded.updated
            "#,
        )
        .bind(settings.updated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_tracked_media(
        &self,
        media_id: MediaId,
        kind: MediaKind,
    ) -> Result<Option<TrackedMedia>> {
        let row = query_as::<_, TrackedMediaRow>(
            "SELECT media_id, kind, created_at, updated_at FROM tracked_media WHERE media_id = ? AND kind = ?",
        )
        .bind(media_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TrackedMedia::try_from).transpose()
    }

    async fn get_all_tracked_media(&self) -> Result<Vec<TrackedMedia>> {
        let rows = query_as::<_, TrackedMediaRow>(
            "SELECT media_id, kind, created_at, updated_at FROM tracked_media ORDER BY kind, media_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TrackedMedia::try_from).collect()
    }

    async fn get_all_tracked_media_by_kind(&self, kind: MediaKind) -> Result<Vec<TrackedMedia>> {
        let rows = query_as::<_, TrackedMediaRow>(
            "SELECT media_id, kind, created_at, updated_at FROM tracked_media WHERE kind = ? ORDER BY media_id",
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TrackedMedia::try_from).collect()
    }

    #[instrument(skip(self, tracked), fields(media_id = tracked.media_id, kind = %tracked.kind))]
    async fn set_tracked_media(&self, tracked: &TrackedMedia) -> Result<()> {
        query(
            r#"
            INSERT INTO tracked_media (media_id, kind, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(media_id, kind) DO UPDATE SET updated_at = excluded.updated_at
            "#,
        )
        .bind(tracked.media_id)
        .bind(tracked.kind.as_str())
        .bind(tracked.created_at)
        .bind(tracked.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_tracked_media(&self, media_id: MediaId, kind: MediaKind) -> Result<bool> {
        let result = query("DELETE FROM tracked_media WHERE media_id = ? AND kind = ?")
            .bind(media_id)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_anime_snapshot(&self, media_id: MediaId) -> Result<Option<AnimeSnapshot>> {
        let row = query_as::<_, AnimeSnapshotRow>(
            r#"
            SELECT media_id, anime_metadata, banner_image_path, cover_image_path,
                   episode_image_paths, reference_key
            FROM anime_snapshots WHERE media_id = ?
            "#,
        )
        .bind(media_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AnimeSnapshot::try_from).transpose()
    }

    async fn get_all_anime_snapshots(&self) -> Result<Vec<AnimeSnapshot>> {
        let rows = query_as::<_, AnimeSnapshotRow>(
            r#"
            SELECT media_id, anime_metadata, banner_image_path, cover_image_path,
                   episode_image_paths, reference_key
            FROM anime_snapshots ORDER BY media_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AnimeSnapshot::try_from).collect()
    }

    #[instrument(skip(self, snapshot), fields(media_id = snapshot.media_id))]
    async fn save_anime_snapshot(&self, snapshot: &AnimeSnapshot) -> Result<()> {
        let anime_metadata = serde_json::to_string(&snapshot.anime_metadata)?;
        let episode_image_paths = serde_json::to_string(&snapshot.episode_image_paths)?;
        let now = now();

        query(
            r#"
            INSERT INTO anime_snapshots (
                media_id, anime_metadata, banner_image_path, cover_image_path,
                episode_image_paths, reference_key, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(media_id) DO UPDATE SET
                anime_metadata = excluded.anime_metadata,
                banner_image_path = excluded.banner_image_path,
                cover_image_path = excluded.cover_image_path,
                episode_image_paths = excluded.episode_image_paths,
                reference_key = excluded.reference_key,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(snapshot.media_id)
        .bind(anime_metadata)
        .bind(&snapshot.banner_image_path)
        .bind(&snapshot.cover_image_path)
        .bind(episode_image_paths)
        .bind(&snapshot.reference_key)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!("Saved anime snapshot");
        Ok(())
    }

    async fn remove_anime_snapshot(&self, media_id: MediaId) -> Result<bool> {
        let result = query("DELETE FROM anime_snapshots WHERE media_id = ?")
            .bind(media_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_manga_snapshot(&self, media_id: MediaId) -> Result<Option<MangaSnapshot>> {
        let row = query_as::<_, MangaSnapshotRow>(
            r#"
            SELECT media_id, chapter_containers, banner_image_path, cover_image_path, reference_key
            FROM manga_snapshots WHERE media_id = ?
            "#,
        )
        .bind(media_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MangaSnapshot::try_from).transpose()
    }

    async fn get_all_manga_snapshots(&self) -> Result<Vec<MangaSnapshot>> {
        let rows = query_as::<_, MangaSnapshotRow>(
            r#"
            SELECT media_id, chapter_containers, banner_image_path, cover_image_path, reference_key
            FROM manga_snapshots ORDER BY media_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MangaSnapshot::try_from).collect()
    }

    #[instrument(skip(self, snapshot), fields(media_id = snapshot.media_id))]
    async fn save_manga_snapshot(&self, snapshot: &MangaSnapshot) -> Result<()> {
        let chapter_containers = serde_json::to_string(&snapshot.chapter_containers)?;
        let now = now();

        query(
            r#"
            INSERT INTO manga_snapshots (
                media_id, chapter_containers, banner_image_path, cover_image_path,
                reference_key, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(media_id) DO UPDATE SET
                chapter_containers = excluded.chapter_containers,
                banner_image_path = excluded.banner_image_path,
                cover_image_path = excluded.cover_image_path,
                reference_key = excluded.reference_key,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(snapshot.media_id)
        .bind(chapter_containers)
        .bind(&snapshot.banner_image_path)
        .bind(&snapshot.cover_image_path)
        .bind(&snapshot.reference_key)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!("Saved manga snapshot");
        Ok(())
    }

    async fn remove_manga_snapshot(&self, media_id: MediaId) -> Result<bool> {
        let result = query("DELETE FROM manga_snapshots WHERE media_id = ?")
            .bind(media_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_local_collection(&self, kind: MediaKind) -> Result<Option<MediaListCollection>> {
        self.get_collection(CollectionTable::Mirror, kind).await
    }

    async fn save_local_collection(
        &self,
        kind: MediaKind,
        collection: &MediaListCollection,
    ) -> Result<()> {
        self.save_collection(CollectionTable::Mirror, kind, collection)
            .await
    }

    async fn get_simulated_collection(
        &self,
        kind: MediaKind,
    ) -> Result<Option<MediaListCollection>> {
        self.get_collection(CollectionTable::Simulated, kind).await
    }

    async fn save_simulated_collection(
        &self,
        kind: MediaKind,
        collection: &MediaListCollection,
    ) -> Result<()> {
        self.save_collection(CollectionTable::Simulated, kind, collection)
            .await
    }
}
