pub mod activity_store;
pub mod db;
pub mod sync_interactor;

pub use activity_store::ActivityStore;
pub use db::{KeyValueStorage, MemoryStorage, SqliteStorage};
pub use sync_interactor::{SyncEngine, SyncOptions, SyncOutcome};
