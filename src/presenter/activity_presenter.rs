use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};
use log::debug;
use tokio::sync::watch;

use crate::entity::{TransactionRecord, TxStatus};
use crate::interactor::activity_store::{sort_newest_first, ActivityStore};

/// Calendar bucket of a settled transaction, relative to now in the viewer's timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeBucket {
    Today,
    Yesterday,
    Earlier,
}

impl TimeBucket {
    pub fn of<Tz: TimeZone>(timestamp: DateTime<Utc>, now: &DateTime<Tz>) -> Self {
        let local = timestamp.with_timezone(&now.timezone());
        let days = (now.date_naive() - local.date_naive()).num_days();
        match days {
            d if d <= 0 => TimeBucket::Today,
            1 => TimeBucket::Yesterday,
            _ => TimeBucket::Earlier,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            TimeBucket::Today => "Today",
            TimeBucket::Yesterday => "Yesterday",
            TimeBucket::Earlier => "Earlier",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySection {
    pub bucket: TimeBucket,
    pub records: Vec<TransactionRecord>,
}

/// Presentation-ready activity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityFeed {
    /// Pending and cancelled transactions, newest first
    pub pending: Vec<TransactionRecord>,
    /// Stuck entries left out of `pending` by the filter
    pub hidden_stuck: usize,
    /// Settled transactions grouped by day, most recent section first
    pub sections: Vec<ActivitySection>,
}

impl ActivityFeed {
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.sections.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityFilter {
    /// Show pending transactions older than a day and cancelled ones
    pub show_stuck: bool,
}

fn is_stuck(record: &TransactionRecord, now: DateTime<Utc>) -> bool {
    record.status == TxStatus::Cancelled || record.is_stuck(now)
}

/// Group records for display. Days follow the timezone of `now`.
pub fn derive_activity<Tz: TimeZone>(
    records: &[TransactionRecord],
    filter: ActivityFilter,
    now: DateTime<Tz>,
) -> ActivityFeed {
    let now_utc = now.with_timezone(&Utc);
    let mut sorted = records.to_vec();
    sort_newest_first(&mut sorted);

    let mut feed = ActivityFeed::default();
    for record in sorted {
        match record.status {
            TxStatus::Pending | TxStatus::Cancelled => {
                if is_stuck(&record, now_utc) && !filter.show_stuck {
                    feed.hidden_stuck += 1;
                } else {
                    feed.pending.push(record);
                }
            }
            TxStatus::Confirmed | TxStatus::Failed => {
                let bucket = TimeBucket::of(record.timestamp, &now);
                match feed.sections.last_mut() {
                    Some(section) if section.bucket == bucket => section.records.push(record),
                    _ => feed.sections.push(ActivitySection {
                        bucket,
                        records: vec![record],
                    }),
                }
            }
        }
    }

    feed
}

/// Derives the activity feed from the store; the stuck toggle is its only state
pub struct ActivityPresenter {
    store: Arc<ActivityStore>,
    filter: watch::Sender<ActivityFilter>,
    offset: FixedOffset,
}

impl ActivityPresenter {
    /// Presenter splitting days at local midnight of the system timezone
    pub fn new(store: Arc<ActivityStore>) -> Self {
        Self::with_offset(store, *Local::now().offset())
    }

    pub fn with_offset(store: Arc<ActivityStore>, offset: FixedOffset) -> Self {
        let (filter, _) = watch::channel(ActivityFilter::default());
        Self {
            store,
            filter,
            offset,
        }
    }

    pub fn filter(&self) -> ActivityFilter {
        *self.filter.borrow()
    }

    pub fn set_show_stuck(&self, show_stuck: bool) {
        self.filter.send_if_modified(|filter| {
            let modified = filter.show_stuck != show_stuck;
            filter.show_stuck = show_stuck;
            modified
        });
    }

    /// Flip the stuck toggle and return the new value
    pub fn toggle_show_stuck(&self) -> bool {
        let show_stuck = !self.filter().show_stuck;
        self.set_show_stuck(show_stuck);
        show_stuck
    }

    pub async fn feed(&self) -> ActivityFeed {
        let records = self.store.get_all(None).await;
        derive_activity(&records, self.filter(), Utc::now().with_timezone(&self.offset))
    }

    /// Feed that recomputes whenever the store or the filter changes.
    ///
    /// The background task ends once every receiver is dropped.
    pub async fn watch_feed(&self) -> watch::Receiver<ActivityFeed> {
        let store = self.store.clone();
        let mut revisions = store.subscribe();
        let mut filters = self.filter.subscribe();
        let offset = self.offset;

        let (tx, rx) = watch::channel(self.feed().await);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = revisions.changed() => if changed.is_err() { break },
                    changed = filters.changed() => if changed.is_err() { break },
                    _ = tx.closed() => break,
                }

                let filter = *filters.borrow_and_update();
                revisions.borrow_and_update();
                let records = store.get_all(None).await;
                debug!("Recomputing activity feed over {} records", records.len());
                tx.send_replace(derive_activity(&records, filter, Utc::now().with_timezone(&offset)));
            }
        });

        rx
    }
}
