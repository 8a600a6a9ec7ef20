//! Episode metadata provider abstraction

use async_trait::async_trait;
use core_library::models::{AnimeMetadata, EpisodeMetadata, Media, MediaId, MetadataPlatform};
use std::collections::HashMap;

use crate::error::Result;

/// Per-episode lookup built from an anime's metadata.
pub trait AnimeMetadataWrapper: Send + Sync {
    /// Metadata of the episode with the given key. Unknown keys get a
    /// placeholder carrying the media's artwork.
    fn episode_metadata(&self, episode_key: &str) -> EpisodeMetadata;
}

/// Read-only source of episode metadata.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// # Errors
    ///
    /// - `BridgeError::UnsupportedPlatform` when the provider cannot key
    ///   lookups against `platform`
    /// - `BridgeError::NotFound` when nothing is known about the media
    async fn get_anime_metadata(
        &self,
        platform: MetadataPlatform,
        media_id: MediaId,
    ) -> Result<AnimeMetadata>;

    fn get_anime_metadata_wrapper(
        &self,
        media: &Media,
        metadata: &AnimeMetadata,
    ) -> Box<dyn AnimeMetadataWrapper>;
}

/// Wrapper that answers from the metadata map and falls back to the media's
/// cover or banner image.
#[derive(Debug, Clone)]
pub struct EpisodeLookup {
    episodes: HashMap<String, EpisodeMetadata>,
    fallback_image: String,
}

impl EpisodeLookup {
    pub fn new(media: &Media, metadata: &AnimeMetadata) -> Self {
        let fallback_image = media
            .banner_image
            .clone()
            .filter(|url| !url.is_empty())
            .or_else(|| media.cover_image.best().map(str::to_string))
            .unwrap_or_default();
        Self {
            episodes: metadata.episodes.clone(),
            fallback_image,
        }
    }
}

impl AnimeMetadataWrapper for EpisodeLookup {
    fn episode_metadata(&self, episode_key: &str) -> EpisodeMetadata {
        match self.episodes.get(episode_key) {
            Some(episode) if !episode.image.is_empty() => episode.clone(),
            Some(episode) => EpisodeMetadata {
                image: self.fallback_image.clone(),
                ..episode.clone()
            },
            None => EpisodeMetadata {
                episode: episode_key.to_string(),
                episode_number: episode_key.parse().unwrap_or_default(),
                title: format!("Episode {}", episode_key),
                image: self.fallback_image.clone(),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::models::CoverImage;

    fn media() -> Media {
        Media {
            cover_image: CoverImage {
                large: Some("https://img.example/cover.png".to_string()),
                ..Default::default()
            },
            ..Media::new(1)
        }
    }

    #[test]
    fn test_lookup_prefers_episode_image() {
        let mut metadata = AnimeMetadata::default();
        metadata.episodes.insert(
            "1".to_string(),
            EpisodeMetadata {
                episode: "1".to_string(),
                image: "https://img.example/ep1.png".to_string(),
                ..Default::default()
            },
        );
        let lookup = EpisodeLookup::new(&media(), &metadata);

        assert_eq!(
            lookup.episode_metadata("1").image,
            "https://img.example/ep1.png"
        );
    }

    #[test]
    fn test_lookup_falls_back_to_cover() {
        let lookup = EpisodeLookup::new(&media(), &AnimeMetadata::default());
        let episode = lookup.episode_metadata("3");

        assert_eq!(episode.episode_number, 3);
        assert_eq!(episode.title, "Episode 3");
        assert_eq!(episode.image, "https://img.example/cover.png");
    }
}
