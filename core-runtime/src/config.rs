//! # Core Configuration Module
//!
//! Provides configuration management for the media sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! holding the data directory and the tuning knobs of the sync queues. All
//! persisted state lives under one data directory:
//!
//! - `<data_dir>/local.db` - the local store
//! - `<data_dir>/assets/<media_id>/<filename>` - downloaded images
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .data_dir("/path/to/data")
//!     .queue_capacity(100)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the local store inside the data directory.
pub const DATABASE_FILE_NAME: &str = "local.db";

/// Directory holding per-media asset folders inside the data directory.
pub const ASSETS_DIR_NAME: &str = "assets";

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_FAILED_CACHE_CAPACITY: usize = 512;
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 8;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Core configuration for the media sync core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Root directory for the store and downloaded assets
    pub data_dir: PathBuf,

    /// Capacity of each job queue; producers wait when it is full
    pub queue_capacity: usize,

    /// Maximum number of failed jobs remembered per media kind
    pub failed_cache_capacity: usize,

    /// Maximum number of images fetched at once within one batch
    pub download_concurrency: usize,

    /// Timeout applied to individual image requests
    pub request_timeout: Duration,

    /// Features flags
    pub features: FeatureFlags,
}

/// Feature flags control optional behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureFlags {
    /// Push the simulated collections to the remote service on first sign-in
    pub push_simulated_on_sign_in: bool,
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Path of the local store file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    /// Root of the per-media asset directories.
    pub fn assets_dir(&self) -> PathBuf {
        self.data_dir.join(ASSETS_DIR_NAME)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Data directory is not empty
    /// - Queue, cache and concurrency limits are non-zero
    /// - Request timeout is between 1 ms and 10 minutes
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("Data directory cannot be empty".to_string()));
        }

        if self.queue_capacity == 0 {
            return Err(Error::Config(
                "Queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.failed_cache_capacity == 0 {
            return Err(Error::Config(
                "Failed cache capacity must be greater than 0".to_string(),
            ));
        }

        if self.download_concurrency == 0 {
            return Err(Error::Config(
                "Download concurrency must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout > MAX_REQUEST_TIMEOUT {
            return Err(Error::Config(
                "Request timeout exceeds maximum of 10 minutes".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for constructing a [`CoreConfig`] with validation.
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    data_dir: Option<PathBuf>,
    queue_capacity: Option<usize>,
    failed_cache_capacity: Option<usize>,
    download_concurrency: Option<usize>,
    request_timeout: Option<Duration>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Sets the data directory (required).
    pub fn data_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.data_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the per-queue capacity (default: 100).
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Sets the failed-job cache size per kind (default: 512).
    pub fn failed_cache_capacity(mut self, capacity: usize) -> Self {
        self.failed_cache_capacity = Some(capacity);
        self
    }

    /// Sets the number of concurrent image downloads (default: 8).
    pub fn download_concurrency(mut self, concurrency: usize) -> Self {
        self.download_concurrency = Some(concurrency);
        self
    }

    /// Sets the image request timeout (default: 30 seconds).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn push_simulated_on_sign_in(mut self, enable: bool) -> Self {
        self.features.push_simulated_on_sign_in = enable;
        self
    }

    /// Builds the `CoreConfig`, validating all settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the data directory is missing or a
    /// limit is out of range.
    pub fn build(self) -> Result<CoreConfig> {
        let data_dir = self.data_dir.ok_or_else(|| {
            Error::Config(
                "Data directory is required. Call .data_dir() before .build()".to_string(),
            )
        })?;

        let config = CoreConfig {
            data_dir,
            queue_capacity: self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            failed_cache_capacity: self
                .failed_cache_capacity
                .unwrap_or(DEFAULT_FAILED_CACHE_CAPACITY),
            download_concurrency: self
                .download_concurrency
                .unwrap_or(DEFAULT_DOWNLOAD_CONCURRENCY),
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            features: self.features,
        };

        config.validate()?;
        Ok(config)
    }
}
