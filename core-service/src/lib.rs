//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided collaborators (remote list service,
//! metadata provider, inventories and optionally an HTTP client) into the
//! local sync core. Desktop hosts typically enable the `desktop-shims`
//! feature, which falls back to `bridge-desktop`'s reqwest client for
//! artwork downloads when no client is injected.

pub mod error;

pub use error::{CoreError, Result};

use std::path::Path;
use std::sync::Arc;

use bridge_traits::{
    http::HttpClient,
    inventory::{AnimeInventory, MangaInventory},
    metadata::MetadataProvider,
    platform::RemotePlatform,
};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::SqliteLocalStore;
use core_metadata::AssetStore;
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use core_sync::{LocalManager, LocalManagerOptions, SyncerConfig};
use tracing::{info, instrument};

/// Aggregated handle to the collaborators the core requires.
pub struct CoreDependencies {
    pub remote: Arc<dyn RemotePlatform>,
    pub metadata_provider: Arc<dyn MetadataProvider>,
    pub anime_inventory: Arc<dyn AnimeInventory>,
    pub manga_inventory: Arc<dyn MangaInventory>,
    /// Client used for artwork downloads; `None` selects the platform default
    pub http_client: Option<Arc<dyn HttpClient>>,
}

impl CoreDependencies {
    /// Construct a dependency bundle without an HTTP client.
    pub fn new(
        remote: Arc<dyn RemotePlatform>,
        metadata_provider: Arc<dyn MetadataProvider>,
        anime_inventory: Arc<dyn AnimeInventory>,
        manga_inventory: Arc<dyn MangaInventory>,
    ) -> Self {
        Self {
            remote,
            metadata_provider,
            anime_inventory,
            manga_inventory,
            http_client: None,
        }
    }

    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    manager: Arc<LocalManager>,
    events: EventBus,
}

impl CoreService {
    /// Prepare the data directory, open the store and start the manager.
    #[instrument(skip_all, fields(data_dir = %config.data_dir.display()))]
    pub async fn bootstrap(config: CoreConfig, deps: CoreDependencies) -> Result<Self> {
        config.validate()?;

        create_dir(&config.data_dir).await?;
        create_dir(&config.assets_dir()).await?;

        let pool = create_pool(DatabaseConfig::new(config.database_path())).await?;
        let store = Arc::new(SqliteLocalStore::new(pool));

        let http_client = match deps.http_client {
            Some(client) => client,
            None => default_http_client(&config)?,
        };
        let assets = Arc::new(
            AssetStore::new(config.assets_dir(), http_client)
                .with_limits(config.download_concurrency, config.request_timeout),
        );

        let events = EventBus::default();
        let manager = LocalManager::new(LocalManagerOptions {
            store,
            assets,
            metadata_provider: deps.metadata_provider,
            remote: deps.remote,
            anime_inventory: deps.anime_inventory,
            manga_inventory: deps.manga_inventory,
            events: events.clone(),
            data_dir: config.data_dir.clone(),
            syncer: SyncerConfig {
                queue_capacity: config.queue_capacity,
                failed_cache_capacity: config.failed_cache_capacity,
            },
        })
        .await?;

        info!("Core service bootstrapped");

        Ok(Self {
            config: Arc::new(config),
            manager: Arc::new(manager),
            events,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The sync manager driving tracking, local passes and pushes.
    pub fn manager(&self) -> Arc<LocalManager> {
        Arc::clone(&self.manager)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to core events; past events are not replayed.
    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// Called by the host once the user signed in to the remote service and
    /// the remote collections were handed to the manager. Pushes the
    /// simulated collections when the feature is enabled; returns the number
    /// of accepted updates.
    pub async fn handle_sign_in(&self) -> Result<usize> {
        if !self.config.features.push_simulated_on_sign_in {
            return Ok(0);
        }
        Ok(self.manager.synchronize_simulated_to_remote().await?)
    }

    /// Let the sync workers finish their queued jobs and stop them.
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}

async fn create_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path).await.map_err(|source| {
        CoreError::Config(core_runtime::Error::Io {
            path: path.display().to_string(),
            source,
        })
    })
}

#[cfg(feature = "desktop-shims")]
fn default_http_client(config: &CoreConfig) -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::with_timeout(config.request_timeout)
        .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_http_client(_config: &CoreConfig) -> Result<Arc<dyn HttpClient>> {
    Err(CoreError::CapabilityMissing {
        capability: "http_client".to_string(),
        message: "inject an HttpClient or enable the desktop-shims feature".to_string(),
    })
}
