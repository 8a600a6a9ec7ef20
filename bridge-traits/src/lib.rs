//! # Host Bridge Traits
//!
//! Collaborator contracts between the sync core and the rest of the
//! application.
//!
//! ## Overview
//!
//! The sync core never talks to the remote list service, the scanners or the
//! network directly. Each capability is a trait implemented by the host:
//!
//! - [`RemotePlatform`](platform::RemotePlatform) - the remote list-tracking
//!   service (collections, entry updates)
//! - [`MetadataProvider`](metadata::MetadataProvider) - episode metadata lookup
//! - [`AnimeInventory`](inventory::AnimeInventory) /
//!   [`MangaInventory`](inventory::MangaInventory) - scanned files and
//!   downloaded chapters
//! - [`HttpClient`](http::HttpClient) - image downloads
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform-specific errors and include context (media id,
//! URL) in the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across the
//! sync workers behind an `Arc`.

pub mod error;
pub mod http;
pub mod inventory;
pub mod metadata;
pub mod platform;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use inventory::{AnimeInventory, MangaInventory};
pub use metadata::{AnimeMetadataWrapper, EpisodeLookup, MetadataProvider};
pub use platform::{EntryUpdate, RemotePlatform};
