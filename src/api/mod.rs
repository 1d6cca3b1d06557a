pub mod activity_source;
pub mod models;

pub use activity_source::{ActivitySource, RestActivitySource};
pub use models::ActivityPage;
