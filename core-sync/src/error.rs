use core_library::models::MediaKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("The {0} collection is not set")]
    CollectionUnset(MediaKind),

    #[error("Local changes have not been uploaded or discarded")]
    LocalEditsPending,

    #[error("Media {media_id} is not in the remote {kind} collection")]
    NotInRemote { media_id: i32, kind: MediaKind },

    #[error("Media {media_id} ({kind}) is already tracked")]
    AlreadyTracked { media_id: i32, kind: MediaKind },

    #[error("Media {media_id} ({kind}) is not tracked")]
    NotTracked { media_id: i32, kind: MediaKind },

    #[error("Store error: {0}")]
    StoreIo(#[from] core_library::LibraryError),

    #[error("Asset error: {0}")]
    AssetIo(#[from] core_metadata::MetadataError),

    #[error("Remote error: {0}")]
    RemoteIo(#[from] bridge_traits::BridgeError),

    #[error("Inventory unavailable: {0}")]
    InventoryUnavailable(String),
}

impl SyncError {
    /// `AlreadyTracked` is informational; callers may ignore it.
    pub fn is_already_tracked(&self) -> bool {
        matches!(self, SyncError::AlreadyTracked { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
