//! Metadata provider answering from persisted anime snapshots
//!
//! Used while offline: episode metadata comes from the snapshots of tracked
//! anime, with episode images pointing at the downloaded asset files.

use crate::assets::format_asset_url;
use crate::error::Result;
use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::metadata::{AnimeMetadataWrapper, EpisodeLookup, MetadataProvider};
use core_library::models::{AnimeMetadata, AnimeSnapshot, Media, MediaId, MetadataPlatform};
use core_library::LocalStore;
use std::collections::HashMap;
use tracing::debug;

pub struct LocalMetadataProvider {
    snapshots: HashMap<MediaId, AnimeSnapshot>,
}

impl LocalMetadataProvider {
    /// Build a provider from every anime snapshot in the store.
    pub async fn load(store: &dyn LocalStore) -> Result<Self> {
        let snapshots = store.get_all_anime_snapshots().await?;
        debug!(count = snapshots.len(), "Loaded anime snapshots for offline metadata");
        Ok(Self::from_snapshots(snapshots))
    }

    pub fn from_snapshots(snapshots: impl IntoIterator<Item = AnimeSnapshot>) -> Self {
        Self {
            snapshots: snapshots
                .into_iter()
                .map(|snapshot| (snapshot.media_id, snapshot))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[async_trait]
impl MetadataProvider for LocalMetadataProvider {
    async fn get_anime_metadata(
        &self,
        platform: MetadataPlatform,
        media_id: MediaId,
    ) -> BridgeResult<AnimeMetadata> {
        if platform != MetadataPlatform::Anilist {
            return Err(BridgeError::UnsupportedPlatform(format!(
                "offline metadata is keyed by AniList ids, got {:?}",
                platform
            )));
        }

        let snapshot = self
            .snapshots
            .get(&media_id)
            .ok_or_else(|| BridgeError::NotFound(format!("no snapshot for media {}", media_id)))?;

        let mut metadata = snapshot.anime_metadata.clone();
        for (key, episode) in metadata.episodes.iter_mut() {
            if let Some(filename) = snapshot.episode_image_paths.get(key) {
                episode.image = format_asset_url(media_id, filename);
            }
        }

        Ok(metadata)
    }

    fn get_anime_metadata_wrapper(
        &self,
        media: &Media,
        metadata: &AnimeMetadata,
    ) -> Box<dyn AnimeMetadataWrapper> {
        Box::new(EpisodeLookup::new(media, metadata))
    }
}
