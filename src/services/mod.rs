pub mod activity_service;
pub mod backoff;
pub mod event_stream;
pub mod transport;

pub use activity_service::ActivityService;
pub use backoff::Backoff;
pub use event_stream::{EventStreamClient, StreamOptions};
pub use transport::{EventStream, EventTransport, PollingTransport, SseParser, SseTransport};
