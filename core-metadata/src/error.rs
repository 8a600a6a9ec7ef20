use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Asset download failed: {0}")]
    AssetIo(String),

    #[error("Unrecognized image data from {url}: {message}")]
    InvalidImage { url: String, message: String },

    #[error("Image registry error: {0}")]
    Registry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),
}

pub type Result<T> = std::result::Result<T, MetadataError>;
