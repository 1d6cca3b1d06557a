use std::time::Duration;

/// Connection state of the event stream client
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum StreamState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting {
        /// Consecutive failed attempts so far
        attempt: u32,
        delay: Duration,
    },
    /// Gave up after too many consecutive errors. Only an external trigger reconnects.
    Failed,
}

impl StreamState {
    /// Whether `connect()` may start a new connection task from this state
    pub fn can_connect(&self) -> bool {
        matches!(self, StreamState::Disconnected | StreamState::Failed)
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamState::Disconnected => write!(f, "disconnected"),
            StreamState::Connecting => write!(f, "connecting"),
            StreamState::Connected => write!(f, "connected"),
            StreamState::Reconnecting { attempt, delay } => {
                write!(f, "reconnecting (attempt {}, in {:?})", attempt, delay)
            }
            StreamState::Failed => write!(f, "failed"),
        }
    }
}

/// Application lifecycle transitions reported by the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycle {
    Foreground,
    Background,
}
