use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use tokio::time::{timeout, Instant};

use crate::api::{ActivityPage, ActivitySource};
use crate::entity::{ActivityError, ActivityResult, RecordUpdate};
use crate::interactor::activity_store::ActivityStore;

/// Tuning of the pull-based sync
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub page_size: u32,
    pub max_pages: u32,
    /// Data older than this is refreshed by a non-forced sync
    pub stale_after: Duration,
    /// Per-page network timeout
    pub request_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_pages: 5,
            stale_after: Duration::from_secs(30),
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// Result of a successful `sync`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Data was fresh, nothing fetched
    Fresh,
    Synced { fetched: usize, changed: usize },
}

type SharedSync = Shared<BoxFuture<'static, ActivityResult<SyncOutcome>>>;

/// Reconciles the local store with the backend history.
///
/// Concurrent `sync` calls share one in-flight fetch, which runs as its own task.
pub struct SyncEngine {
    store: Arc<ActivityStore>,
    source: Arc<dyn ActivitySource>,
    options: SyncOptions,
    last_synced_at: Mutex<Option<Instant>>,
    in_flight: Mutex<Option<SharedSync>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SyncEngine {
    pub fn new(store: Arc<ActivityStore>, source: Arc<dyn ActivitySource>, options: SyncOptions) -> Self {
        Self {
            store,
            source,
            options,
            last_synced_at: Mutex::new(None),
            in_flight: Mutex::new(None),
        }
    }

    /// Fetch the latest pages and merge them into the store.
    ///
    /// Without `force`, fresh data short-circuits to `SyncOutcome::Fresh`. Joins the
    /// running sync if there is one.
    pub async fn sync(self: &Arc<Self>, force: bool) -> ActivityResult<SyncOutcome> {
        let shared = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.as_ref() {
                Some(running) => {
                    debug!("Sync already in flight, joining it");
                    running.clone()
                }
                None => {
                    if !force && !self.is_stale() {
                        debug!("Activity is fresh, skipping sync");
                        return Ok(SyncOutcome::Fresh);
                    }

                    // Spawned so the sync completes and releases the store even
                    // when every waiting caller is dropped.
                    let engine = Arc::clone(self);
                    let task = tokio::spawn(async move {
                        let result = engine.fetch_and_merge().await;
                        lock(&engine.in_flight).take();
                        result
                    });

                    let engine = Arc::clone(self);
                    let future = task
                        .map(move |joined| {
                            joined.unwrap_or_else(|e| {
                                lock(&engine.in_flight).take();
                                Err(ActivityError::Task(e.to_string()))
                            })
                        })
                        .boxed()
                        .shared();

                    *in_flight = Some(future.clone());
                    future
                }
            }
        };

        shared.await
    }

    /// Sync only when the cached data is stale
    pub async fn sync_if_stale(self: &Arc<Self>) -> ActivityResult<SyncOutcome> {
        self.sync(false).await
    }

    pub fn is_stale(&self) -> bool {
        match *lock(&self.last_synced_at) {
            Some(at) => at.elapsed() >= self.options.stale_after,
            None => true,
        }
    }

    pub fn last_synced_at(&self) -> Option<Instant> {
        *lock(&self.last_synced_at)
    }

    pub fn is_syncing(&self) -> bool {
        lock(&self.in_flight).is_some()
    }

    async fn fetch_and_merge(&self) -> ActivityResult<SyncOutcome> {
        let mut cursor: Option<String> = None;
        let mut pages = 0;
        let mut fetched = 0;
        let mut changed = 0;

        loop {
            let ActivityPage { items, next_cursor } = match self.fetch_page(cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("Activity sync failed after {} pages: {}", pages, e);
                    return Err(e);
                }
            };

            pages += 1;
            fetched += items.len();
            let last_page = items.is_empty();
            changed += self
                .store
                .upsert_many(items.into_iter().map(RecordUpdate::from))
                .await;

            match next_cursor {
                Some(next) if !last_page && pages < self.options.max_pages => cursor = Some(next),
                _ => break,
            }
        }

        *lock(&self.last_synced_at) = Some(Instant::now());
        info!(
            "Activity synced: {} transactions over {} pages, {} changed",
            fetched, pages, changed
        );

        Ok(SyncOutcome::Synced { fetched, changed })
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> ActivityResult<ActivityPage> {
        match timeout(
            self.options.request_timeout,
            self.source.fetch_page(cursor, self.options.page_size),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ActivityError::Timeout(self.options.request_timeout)),
        }
    }
}
