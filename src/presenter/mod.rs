pub mod activity_presenter;

pub use activity_presenter::{
    derive_activity, ActivityFeed, ActivityFilter, ActivityPresenter, ActivitySection, TimeBucket,
};
