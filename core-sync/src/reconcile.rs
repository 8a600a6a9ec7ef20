//! Per-media reconciliation run by the syncer workers
//!
//! Each function brings the snapshot of one tracked media in line with the
//! current inventory. List data is never written here; the mirror rebuild at
//! drain time carries it.

use crate::context::SyncContext;
use crate::differ::{AnimeDiffResult, DiffType, MangaDiffResult};
use crate::error::Result;
use crate::keys::{anime_reference_key, manga_reference_key};
use core_library::models::{
    AnimeSnapshot, ChapterContainer, LocalFile, MangaSnapshot, MediaKind, MetadataPlatform,
};
use core_runtime::logging::strip_path;
use std::collections::HashMap;
use tracing::{debug, instrument, trace, warn};

#[instrument(skip_all, fields(media_id = diff.media_id(), diff_type = %diff.diff_type))]
pub(crate) async fn reconcile_anime(ctx: &SyncContext, diff: &AnimeDiffResult) -> Result<()> {
    let media = &diff.entry.media;
    let media_id = media.id;
    let inventory = ctx.inventory().await;

    let local_files: Vec<LocalFile> = inventory
        .local_files
        .iter()
        .filter(|lf| lf.media_id == media_id)
        .cloned()
        .collect();

    trace!(
        media_id,
        files = ?local_files.iter().map(|lf| strip_path(&lf.path)).collect::<Vec<_>>(),
        "Matched local files"
    );

    if local_files.is_empty() {
        warn!(media_id, "No local files left, removing from the local store");
        return ctx.remove_media(media_id, MediaKind::Anime).await;
    }

    if diff.diff_type == DiffType::ListData {
        return Ok(());
    }

    let metadata = ctx
        .metadata
        .get_anime_metadata(MetadataPlatform::Anilist, media_id)
        .await?;
    let reference_key = anime_reference_key(media_id, &inventory.local_files);

    match (diff.diff_type, &diff.snapshot) {
        (DiffType::Missing, _) => {
            let wrapper = ctx.metadata.get_anime_metadata_wrapper(media, &metadata);
            let images = ctx
                .assets
                .download_anime_images(media, &metadata, wrapper.as_ref(), &local_files)
                .await?;

            let snapshot = AnimeSnapshot {
                media_id,
                anime_metadata: metadata,
                banner_image_path: images.banner,
                cover_image_path: images.cover,
                episode_image_paths: images.episodes,
                reference_key,
            };
            if ctx.commit_anime_snapshot(&snapshot).await? {
                debug!(media_id, "Created anime snapshot");
            }
        }
        (DiffType::Metadata, Some(existing)) => {
            let mut snapshot = existing.clone();

            let new_images: HashMap<String, String> = metadata
                .episodes
                .iter()
                .filter(|(_, episode)| !episode.image.is_empty())
                .filter(|(key, _)| !snapshot.episode_image_paths.contains_key(*key))
                .map(|(key, episode)| (key.clone(), episode.image.clone()))
                .collect();

            if !new_images.is_empty() {
                let downloaded = ctx
                    .assets
                    .download_anime_episode_images(media_id, &new_images)
                    .await?;
                snapshot.episode_image_paths.extend(downloaded);
            }

            snapshot.anime_metadata = metadata;
            snapshot.reference_key = reference_key;
            if ctx.commit_anime_snapshot(&snapshot).await? {
                debug!(media_id, new_images = new_images.len(), "Updated anime snapshot");
            }
        }
        _ => {}
    }

    Ok(())
}

#[instrument(skip_all, fields(media_id = diff.media_id(), diff_type = %diff.diff_type))]
pub(crate) async fn reconcile_manga(ctx: &SyncContext, diff: &MangaDiffResult) -> Result<()> {
    let media_id = diff.media_id();

    let Some(remote) = ctx.remote(MediaKind::Manga).await else {
        return Ok(());
    };
    if !remote
        .find_entry(media_id)
        .is_some_and(|entry| entry.status.is_some())
    {
        debug!(media_id, "Manga no longer listed with a status");
        return Ok(());
    }

    let inventory = ctx.inventory().await;
    let containers: Vec<ChapterContainer> = inventory
        .chapter_containers
        .iter()
        .filter(|c| c.media_id == media_id)
        .cloned()
        .collect();

    if containers.is_empty() {
        warn!(media_id, "No downloaded chapters left, removing from the local store");
        return ctx.remove_media(media_id, MediaKind::Manga).await;
    }

    let reference_key = manga_reference_key(media_id, &containers);

    match (diff.diff_type, &diff.snapshot) {
        (DiffType::Missing, _) => {
            let images = ctx.assets.download_manga_images(&diff.entry.media).await?;

            let snapshot = MangaSnapshot {
                media_id,
                chapter_containers: containers,
                banner_image_path: images.banner,
                cover_image_path: images.cover,
                reference_key,
            };
            if ctx.commit_manga_snapshot(&snapshot).await? {
                debug!(media_id, "Created manga snapshot");
            }
        }
        (DiffType::Metadata, Some(existing)) => {
            let snapshot = MangaSnapshot {
                chapter_containers: containers,
                reference_key,
                ..existing.clone()
            };
            if ctx.commit_manga_snapshot(&snapshot).await? {
                debug!(media_id, "Updated manga snapshot");
            }
        }
        _ => {}
    }

    Ok(())
}
