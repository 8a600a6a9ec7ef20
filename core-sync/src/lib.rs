//! # Local Sync Module
//!
//! Keeps a local, offline-capable copy of the media the user chose to track.
//!
//! ## Overview
//!
//! A sync pass compares the remote collections with the mirror collections,
//! the persisted snapshots and the current inventory, then reconciles every
//! media that changed:
//! - Snapshots hold the metadata and downloaded artwork of each tracked media
//! - The mirror collections are rebuilt from the remote ones once both work
//!   queues drain, with artwork rewritten to local asset URLs
//! - Local list edits made while offline are pushed back on demand
//!
//! ## Components
//!
//! - **Keys** (`keys`): reference and list-data keys the differ compares
//! - **Differ** (`differ`): pure computation of the jobs of a pass
//! - **Mirror** (`mirror`): rebuild of a mirror collection from the remote one
//! - **Syncer** (`syncer`): per-kind work queues, workers and drain detection
//! - **Push** (`push`): list-data updates sent to the remote service
//! - **Manager** (`manager`): public entry point used by the host
//! - **Offline platform** (`offline_platform`): `RemotePlatform` over the mirrors
//! - **Simulated platform** (`simulated_platform`): `RemotePlatform` over the
//!   simulated collections, used while no account is attached

mod context;
pub mod differ;
mod entry_edits;
pub mod error;
pub mod keys;
pub mod manager;
pub mod mirror;
pub mod offline_platform;
pub mod push;
mod reconcile;
pub mod simulated_platform;
pub mod syncer;

pub use differ::{
    anime_diffs, manga_diffs, AnimeDiffInput, AnimeDiffResult, DiffResult, DiffType,
    MangaDiffInput, MangaDiffResult, SnapshotRecord,
};
pub use error::{Result, SyncError};
pub use keys::{anime_reference_key, list_data_key, manga_reference_key};
pub use manager::{LocalManager, LocalManagerOptions, RefreshCollectionsFn, TrackedMediaItem};
pub use mirror::build_mirror;
pub use offline_platform::OfflinePlatform;
pub use simulated_platform::SimulatedPlatform;
pub use push::{collect_entry_updates, push_entry_updates, MissingScore};
pub use syncer::{DispatchSummary, SyncerConfig};
