use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::entity::{
    ActivityResult, AppLifecycle, RecordSource, StreamState, TransactionRecord, TxStatus, TxType,
};
use crate::interactor::activity_store::ActivityStore;
use crate::interactor::sync_interactor::{SyncEngine, SyncOutcome};
use crate::services::event_stream::EventStreamClient;

/// Ties the store, the sync engine and the event stream to the app lifecycle
pub struct ActivityService {
    store: Arc<ActivityStore>,
    sync_engine: Arc<SyncEngine>,
    stream: Arc<EventStreamClient>,
    suspend_in_background: bool,
}

impl ActivityService {
    pub fn new(
        store: Arc<ActivityStore>,
        sync_engine: Arc<SyncEngine>,
        stream: Arc<EventStreamClient>,
        suspend_in_background: bool,
    ) -> Self {
        Self {
            store,
            sync_engine,
            stream,
            suspend_in_background,
        }
    }

    /// Initial load: forced sync, then open the event stream.
    ///
    /// A failed initial sync is logged, cached data keeps being served.
    pub async fn start(&self) {
        if let Err(e) = self.sync_engine.sync(true).await {
            error!("Initial activity sync failed: {}", e);
        }
        self.stream.connect();
        info!("Activity service started");
    }

    pub async fn stop(&self) {
        self.stream.disconnect().await;
        info!("Activity service stopped");
    }

    pub async fn handle_lifecycle(&self, event: AppLifecycle) {
        match event {
            AppLifecycle::Foreground => {
                if self.stream.state().can_connect() {
                    debug!("Foreground: reconnecting event stream");
                    self.stream.connect();
                }
                match self.sync_engine.sync_if_stale().await {
                    Ok(SyncOutcome::Fresh) => debug!("Foreground: activity still fresh"),
                    Ok(outcome) => debug!("Foreground resync: {:?}", outcome),
                    Err(e) => warn!("Foreground resync failed: {}", e),
                }
            }
            AppLifecycle::Background => {
                if self.suspend_in_background {
                    debug!("Background: suspending event stream");
                    self.stream.disconnect().await;
                }
            }
        }
    }

    /// Manual refresh. Works regardless of the stream state and reports failures to the caller.
    pub async fn refresh(&self) -> ActivityResult<SyncOutcome> {
        self.sync_engine.sync(true).await
    }

    /// Record a transaction the user just submitted, before the backend knows about it
    pub async fn record_optimistic(
        &self,
        tx_type: TxType,
        amount: Option<Decimal>,
        symbol: Option<String>,
        chain_id: Option<u64>,
    ) -> TransactionRecord {
        let record = TransactionRecord {
            client_tx_id: Uuid::new_v4().to_string(),
            status: TxStatus::Pending,
            tx_type,
            timestamp: Utc::now(),
            amount,
            symbol,
            chain_id,
            tx_hash: None,
            source: RecordSource::Optimistic,
        };

        info!("Recorded optimistic {} {}", record.tx_type, record.client_tx_id);
        self.store.upsert(record.clone()).await;
        record
    }

    pub fn stream_state(&self) -> StreamState {
        self.stream.state()
    }

    pub fn store(&self) -> Arc<ActivityStore> {
        self.store.clone()
    }

    pub fn sync_engine(&self) -> Arc<SyncEngine> {
        self.sync_engine.clone()
    }

    pub fn stream(&self) -> Arc<EventStreamClient> {
        self.stream.clone()
    }
}
