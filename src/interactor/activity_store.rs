use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::{watch, Mutex};

use crate::entity::{ActivityResult, RecordFilter, RecordUpdate, TransactionRecord};
use crate::interactor::db::KeyValueStorage;

/// Process-wide cache of wallet transactions keyed by client transaction id.
///
/// `upsert` and `upsert_many` are the only ways to change it. Every change is
/// flushed to storage and announced to subscribers through a revision counter.
pub struct ActivityStore {
    records: Mutex<HashMap<String, TransactionRecord>>,
    storage: Arc<dyn KeyValueStorage>,
    storage_key: String,
    revision: watch::Sender<u64>,
}

impl ActivityStore {
    /// Builds the store from whatever snapshot `storage` holds under `namespace`.
    ///
    /// A missing or unreadable snapshot starts the store empty.
    pub async fn hydrate(storage: Arc<dyn KeyValueStorage>, namespace: &str) -> Self {
        let storage_key = format!("{}:transactions", namespace);

        let records = match storage.load(&storage_key).await {
            Ok(Some(snapshot)) => match serde_json::from_str::<Vec<TransactionRecord>>(&snapshot) {
                Ok(list) => {
                    info!("Hydrated {} cached transactions", list.len());
                    list.into_iter()
                        .map(|record| (record.client_tx_id.clone(), record))
                        .collect()
                }
                Err(e) => {
                    warn!("Discarding unreadable activity snapshot: {}", e);
                    HashMap::new()
                }
            },
            Ok(None) => {
                debug!("No cached activity under {}", storage_key);
                HashMap::new()
            }
            Err(e) => {
                warn!("Failed to load cached activity, continuing without it: {}", e);
                HashMap::new()
            }
        };

        let (revision, _) = watch::channel(0);

        Self {
            records: Mutex::new(records),
            storage,
            storage_key,
            revision,
        }
    }

    /// Inserts a new record or merges into the one with the same id.
    ///
    /// Returns whether the stored state changed.
    pub async fn upsert(&self, update: impl Into<RecordUpdate>) -> bool {
        self.upsert_many(std::iter::once(update.into())).await > 0
    }

    /// Applies updates in order with a single flush. Returns how many records changed.
    pub async fn upsert_many<I>(&self, updates: I) -> usize
    where
        I: IntoIterator<Item = RecordUpdate>,
    {
        let mut records = self.records.lock().await;
        let now = Utc::now();
        let mut changed = 0;

        for update in updates {
            let merged = match records.get(&update.client_tx_id) {
                Some(existing) => {
                    let merged = update.merge_into(existing);
                    if &merged == existing {
                        continue;
                    }
                    merged
                }
                None => update.into_record(now),
            };

            debug!("Stored {} as {}", merged.client_tx_id, merged.status);
            records.insert(merged.client_tx_id.clone(), merged);
            changed += 1;
        }

        if changed > 0 {
            if let Err(e) = self.flush(&records).await {
                warn!("Failed to persist activity, keeping it in memory only: {}", e);
            }
            self.revision.send_modify(|revision| *revision += 1);
        }

        changed
    }

    /// Records matching `filter`, newest first
    pub async fn get_all(&self, filter: Option<&RecordFilter>) -> Vec<TransactionRecord> {
        let records = self.records.lock().await;
        let mut list: Vec<TransactionRecord> = records
            .values()
            .filter(|record| filter.map_or(true, |f| f.matches(record)))
            .cloned()
            .collect();
        sort_newest_first(&mut list);
        list
    }

    pub async fn get(&self, client_tx_id: &str) -> Option<TransactionRecord> {
        self.records.lock().await.get(client_tx_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Receiver whose value bumps on every change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    async fn flush(&self, records: &HashMap<String, TransactionRecord>) -> ActivityResult<()> {
        let mut snapshot: Vec<&TransactionRecord> = records.values().collect();
        snapshot.sort_by(|a, b| a.client_tx_id.cmp(&b.client_tx_id));

        let json = serde_json::to_string(&snapshot)?;
        self.storage.save(&self.storage_key, &json).await
    }
}

pub(crate) fn sort_newest_first(list: &mut [TransactionRecord]) {
    list.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.client_tx_id.cmp(&b.client_tx_id))
    });
}
