//! Desktop implementations of the bridge traits
//!
//! Currently only the HTTP transport used for artwork downloads:
//!
//! ```ignore
//! use bridge_desktop::ReqwestHttpClient;
//! use std::sync::Arc;
//!
//! let http_client = Arc::new(ReqwestHttpClient::new()?);
//! let assets = AssetStore::new(config.assets_dir(), http_client);
//! ```

mod http;

pub use http::ReqwestHttpClient;
