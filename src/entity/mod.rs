mod activity_error;
mod stream_state;
mod transaction;

pub use activity_error::{ActivityError, ActivityResult};
pub use stream_state::{AppLifecycle, StreamState};
pub use transaction::{
    RecordFilter, RecordSource, RecordUpdate, TransactionRecord, TxStatus, TxType,
    STUCK_AFTER_HOURS,
};
