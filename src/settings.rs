use std::time::Duration;

use chrono::{FixedOffset, Local};
use serde::Deserialize;

use crate::entity::{ActivityError, ActivityResult};

/// Which event stream transport to compose the client with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Long-lived server-sent events connection
    #[default]
    Sse,
    /// Interval polling, for platforms where held connections are costly
    Polling,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityConfig {
    /// Base URL of the wallet backend REST API
    pub api_base_url: String,

    /// Server-sent events endpoint, defaults to `{api_base_url}/activity/stream`
    #[serde(default)]
    pub stream_url: Option<String>,

    /// Polling endpoint, defaults to `{api_base_url}/activity/events`
    #[serde(default)]
    pub poll_url: Option<String>,

    /// Bearer token sent with every backend request
    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default)]
    pub transport: TransportKind,

    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Prefix of the storage key the store snapshot is kept under
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Longest silence tolerated on an open SSE connection before it is dropped
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,

    /// Offset from UTC used to split activity into days, the system offset when unset
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,

    #[serde(default = "default_true")]
    pub suspend_in_background: bool,
}

fn default_database_url() -> String {
    "sqlite://activity.db?mode=rwc".to_string()
}

fn default_namespace() -> String {
    "activity".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_max_pages() -> u32 {
    5
}

fn default_stale_after_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_max_consecutive_errors() -> u32 {
    5
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_stream_idle_timeout_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl ActivityConfig {
    /// Configuration with defaults for everything except the backend URL
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            stream_url: None,
            poll_url: None,
            auth_token: None,
            transport: TransportKind::default(),
            database_url: default_database_url(),
            namespace: default_namespace(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            stale_after_secs: default_stale_after_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            max_consecutive_errors: default_max_consecutive_errors(),
            poll_interval_secs: default_poll_interval_secs(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
            utc_offset_minutes: None,
            suspend_in_background: true,
        }
    }

    /// Loads configuration from `ACTIVITY_*` environment variables
    pub fn from_env() -> ActivityResult<Self> {
        let source = config::Environment::with_prefix("ACTIVITY").try_parsing(true);
        Self::from_source(source)
    }

    fn from_source<S>(source: S) -> ActivityResult<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder().add_source(source).build()?;
        let config: ActivityConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ActivityResult<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(ActivityError::Config("api_base_url must not be empty".into()));
        }
        if self.page_size == 0 {
            return Err(ActivityError::Config("page_size must be greater than zero".into()));
        }
        if self.max_pages == 0 {
            return Err(ActivityError::Config("max_pages must be greater than zero".into()));
        }
        if self.backoff_base_ms == 0 || self.backoff_base_ms > self.backoff_max_ms {
            return Err(ActivityError::Config(format!(
                "invalid backoff range {}ms..{}ms",
                self.backoff_base_ms, self.backoff_max_ms
            )));
        }
        if self.max_consecutive_errors == 0 {
            return Err(ActivityError::Config(
                "max_consecutive_errors must be greater than zero".into(),
            ));
        }
        if self.stream_idle_timeout_secs == 0 {
            return Err(ActivityError::Config(
                "stream_idle_timeout_secs must be greater than zero".into(),
            ));
        }
        if let Some(minutes) = self.utc_offset_minutes {
            if FixedOffset::east_opt(minutes.saturating_mul(60)).is_none() {
                return Err(ActivityError::Config(format!(
                    "utc_offset_minutes {} is out of range",
                    minutes
                )));
            }
        }
        Ok(())
    }

    pub fn stream_url(&self) -> String {
        self.stream_url
            .clone()
            .unwrap_or_else(|| format!("{}/activity/stream", self.base_url()))
    }

    pub fn poll_url(&self) -> String {
        self.poll_url
            .clone()
            .unwrap_or_else(|| format!("{}/activity/events", self.base_url()))
    }

    pub fn base_url(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }

    /// Offset activity days are computed in
    pub fn display_offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes.saturating_mul(60)))
            .unwrap_or_else(|| *Local::now().offset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> config::Environment {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix("ACTIVITY")
            .try_parsing(true)
            .source(Some(vars))
    }

    #[test]
    fn loads_defaults_from_environment() {
        let config =
            ActivityConfig::from_source(env(&[("ACTIVITY_API_BASE_URL", "https://api.example.com/")]))
                .unwrap();

        assert_eq!(config.base_url(), "https://api.example.com");
        assert_eq!(config.stream_url(), "https://api.example.com/activity/stream");
        assert_eq!(config.transport, TransportKind::Sse);
        assert_eq!(config.stale_after(), Duration::from_secs(30));
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.backoff_base(), Duration::from_secs(1));
        assert_eq!(config.backoff_max(), Duration::from_secs(30));
        assert_eq!(config.max_consecutive_errors, 5);
        assert!(config.suspend_in_background);
    }

    #[test]
    fn overrides_from_environment() {
        let config = ActivityConfig::from_source(env(&[
            ("ACTIVITY_API_BASE_URL", "https://api.example.com"),
            ("ACTIVITY_TRANSPORT", "polling"),
            ("ACTIVITY_PAGE_SIZE", "20"),
            ("ACTIVITY_SUSPEND_IN_BACKGROUND", "false"),
        ]))
        .unwrap();

        assert_eq!(config.transport, TransportKind::Polling);
        assert_eq!(config.page_size, 20);
        assert!(!config.suspend_in_background);
    }

    #[test]
    fn reads_display_offset() {
        let config = ActivityConfig::from_source(env(&[
            ("ACTIVITY_API_BASE_URL", "https://api.example.com"),
            ("ACTIVITY_UTC_OFFSET_MINUTES", "-300"),
        ]))
        .unwrap();

        assert_eq!(config.display_offset(), FixedOffset::west_opt(5 * 3600).unwrap());
        assert_eq!(config.stream_idle_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn rejects_out_of_range_offset() {
        let mut config = ActivityConfig::new("https://api.example.com");
        config.utc_offset_minutes = Some(24 * 60);
        assert!(matches!(config.validate(), Err(ActivityError::Config(_))));
    }

    #[test]
    fn rejects_inverted_backoff_range() {
        let mut config = ActivityConfig::new("https://api.example.com");
        config.backoff_base_ms = 60_000;
        assert!(matches!(config.validate(), Err(ActivityError::Config(_))));
    }

    #[test]
    fn missing_base_url_is_an_error() {
        assert!(ActivityConfig::from_source(env(&[])).is_err());
    }
}
