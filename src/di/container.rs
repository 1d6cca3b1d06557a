use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::api::{ActivitySource, RestActivitySource};
use crate::interactor::activity_store::ActivityStore;
use crate::interactor::db::{KeyValueStorage, MemoryStorage, SqliteStorage};
use crate::interactor::sync_interactor::{SyncEngine, SyncOptions};
use crate::presenter::activity_presenter::ActivityPresenter;
use crate::services::activity_service::ActivityService;
use crate::services::backoff::Backoff;
use crate::services::event_stream::{EventStreamClient, StreamOptions};
use crate::services::transport::{EventTransport, PollingTransport, SseTransport};
use crate::settings::{ActivityConfig, TransportKind};

/// ServiceContainer provides access to core application dependencies
pub struct ServiceContainer {
    store: Arc<ActivityStore>,
    sync_engine: Arc<SyncEngine>,
    stream: Arc<EventStreamClient>,
    activity_service: Arc<ActivityService>,
    presenter: Arc<ActivityPresenter>,

    // Configuration
    config: ActivityConfig,
}

impl ServiceContainer {
    /// Wire every component from configuration, hydrating the store from disk
    pub async fn build(config: ActivityConfig) -> Result<Self> {
        config.validate().context("Invalid activity configuration")?;

        let storage: Arc<dyn KeyValueStorage> =
            match SqliteStorage::connect(&config.database_url).await {
                Ok(storage) => Arc::new(storage),
                Err(e) => {
                    warn!(
                        "Failed to open activity database {}, activity will not persist: {}",
                        config.database_url, e
                    );
                    Arc::new(MemoryStorage::new())
                }
            };

        let store = Arc::new(ActivityStore::hydrate(storage, &config.namespace).await);

        let source = Arc::new(
            RestActivitySource::new(
                config.base_url(),
                config.auth_token.clone(),
                config.request_timeout(),
            )
            .context("Failed to create activity API client")?,
        ) as Arc<dyn ActivitySource>;

        let transport = Self::transport(&config)?;

        Ok(Self::with_parts(config, store, source, transport))
    }

    /// Wire the services around already constructed collaborators
    pub fn with_parts(
        config: ActivityConfig,
        store: Arc<ActivityStore>,
        source: Arc<dyn ActivitySource>,
        transport: Arc<dyn EventTransport>,
    ) -> Self {
        let sync_engine = Arc::new(SyncEngine::new(
            store.clone(),
            source,
            SyncOptions {
                page_size: config.page_size,
                max_pages: config.max_pages,
                stale_after: config.stale_after(),
                request_timeout: config.request_timeout(),
            },
        ));

        let stream = Arc::new(EventStreamClient::new(
            transport,
            store.clone(),
            StreamOptions {
                backoff: Backoff::new(config.backoff_base(), config.backoff_max()),
                max_consecutive_errors: config.max_consecutive_errors,
                connect_timeout: config.request_timeout(),
            },
        ));

        let activity_service = Arc::new(ActivityService::new(
            store.clone(),
            sync_engine.clone(),
            stream.clone(),
            config.suspend_in_background,
        ));

        let presenter = Arc::new(ActivityPresenter::with_offset(
            store.clone(),
            config.display_offset(),
        ));

        Self {
            store,
            sync_engine,
            stream,
            activity_service,
            presenter,
            config,
        }
    }

    fn transport(config: &ActivityConfig) -> Result<Arc<dyn EventTransport>> {
        let transport: Arc<dyn EventTransport> = match config.transport {
            TransportKind::Sse => Arc::new(
                SseTransport::new(
                    config.stream_url(),
                    config.auth_token.clone(),
                    config.request_timeout(),
                    config.stream_idle_timeout(),
                )
                .context("Failed to create SSE transport")?,
            ),
            TransportKind::Polling => Arc::new(
                PollingTransport::new(
                    config.poll_url(),
                    config.auth_token.clone(),
                    config.poll_interval(),
                    config.request_timeout(),
                )
                .context("Failed to create polling transport")?,
            ),
        };
        info!("Using {} event transport", transport.name());
        Ok(transport)
    }

    // Accessor methods

    pub fn store(&self) -> Arc<ActivityStore> {
        self.store.clone()
    }

    pub fn sync_engine(&self) -> Arc<SyncEngine> {
        self.sync_engine.clone()
    }

    pub fn stream(&self) -> Arc<EventStreamClient> {
        self.stream.clone()
    }

    pub fn activity_service(&self) -> Arc<ActivityService> {
        self.activity_service.clone()
    }

    pub fn presenter(&self) -> Arc<ActivityPresenter> {
        self.presenter.clone()
    }

    pub fn config(&self) -> ActivityConfig {
        self.config.clone()
    }
}
