//! # Asset & Metadata Module
//!
//! Downloads and serves the images of tracked media and answers episode
//! metadata lookups while offline.
//!
//! ## Overview
//!
//! This module handles:
//! - Per-media asset directories under the data directory
//! - Registry-backed image downloads with format-derived file extensions
//! - The `{{LOCAL_ASSETS}}` URL template used by mirrored collections
//! - An offline [`MetadataProvider`](bridge_traits::metadata::MetadataProvider)
//!   backed by persisted anime snapshots

pub mod assets;
pub mod error;
pub mod image_downloader;
pub mod local_provider;

pub use assets::{
    directory_size, format_asset_url, AnimeImagePaths, AssetStore, MangaImagePaths,
    LOCAL_ASSETS_TEMPLATE,
};
pub use error::{MetadataError, Result};
pub use image_downloader::ImageDownloader;
pub use local_provider::LocalMetadataProvider;
