use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, trace};
use reqwest::header::ACCEPT;
use reqwest::Client;
use tokio::time::timeout;

use crate::entity::{ActivityError, ActivityResult};

/// Raw JSON payloads pushed by the backend
pub type EventStream = BoxStream<'static, ActivityResult<String>>;

/// A way of receiving server-pushed transaction updates.
///
/// Picked once at composition time: `SseTransport` on platforms that can hold a
/// connection open, `PollingTransport` where that is costly.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Open the connection. The returned stream ends when the server closes it.
    async fn connect(&self) -> ActivityResult<EventStream>;

    fn name(&self) -> &'static str;
}

fn build_client(connect_timeout: Duration) -> ActivityResult<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| ActivityError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Largest SSE frame kept in memory while waiting for its terminating blank line
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Server-sent events over a long-lived HTTP response
pub struct SseTransport {
    http_client: Client,
    url: String,
    auth_token: Option<String>,
    idle_timeout: Duration,
}

impl SseTransport {
    /// `idle_timeout` bounds the silence between chunks, keep-alive comments included.
    /// A half-open connection surfaces as a timeout instead of hanging in `Connected`.
    pub fn new(
        url: impl Into<String>,
        auth_token: Option<String>,
        connect_timeout: Duration,
        idle_timeout: Duration,
    ) -> ActivityResult<Self> {
        Ok(Self {
            http_client: build_client(connect_timeout)?,
            url: url.into(),
            auth_token,
            idle_timeout,
        })
    }
}

#[async_trait]
impl EventTransport for SseTransport {
    async fn connect(&self) -> ActivityResult<EventStream> {
        let mut request = self
            .http_client
            .get(&self.url)
            .header(ACCEPT, "text/event-stream");
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?.error_for_status()?;
        debug!("SSE stream opened at {}", self.url);

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ActivityError::from))
            .boxed();

        Ok(sse_events(chunks, self.idle_timeout))
    }

    fn name(&self) -> &'static str {
        "sse"
    }
}

/// Turn raw body chunks into event payloads, failing the stream after `idle_timeout` of silence
fn sse_events(chunks: BoxStream<'static, ActivityResult<Vec<u8>>>, idle_timeout: Duration) -> EventStream {
    stream::unfold(
        (chunks, SseParser::default(), VecDeque::new()),
        move |(mut chunks, mut parser, mut ready)| async move {
            loop {
                if let Some(payload) = ready.pop_front() {
                    return Some((Ok(payload), (chunks, parser, ready)));
                }
                let error = match timeout(idle_timeout, chunks.next()).await {
                    Ok(Some(Ok(chunk))) => match parser.feed(&chunk) {
                        Ok(payloads) => {
                            ready.extend(payloads);
                            continue;
                        }
                        Err(e) => e,
                    },
                    Ok(Some(Err(e))) => e,
                    Ok(None) => return None,
                    Err(_) => ActivityError::Timeout(idle_timeout),
                };
                return Some((Err(error), (chunks, parser, ready)));
            }
        },
    )
    .boxed()
}

/// Incremental parser of the `text/event-stream` format.
///
/// Only `transaction` events and unnamed (`message`) events carry payloads,
/// everything else (keep-alives, pings) is skipped.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    /// Feed a chunk and return the payloads of every frame it completed.
    ///
    /// Fails once an unterminated frame grows past `MAX_FRAME_BYTES`.
    pub fn feed(&mut self, chunk: &[u8]) -> ActivityResult<Vec<String>> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut payloads = Vec::new();
        while let Some(index) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let frame: Vec<u8> = self.buffer.drain(..index + 2).collect();
            if let Some(payload) = Self::parse_frame(&String::from_utf8_lossy(&frame)) {
                payloads.push(payload);
            }
        }

        if self.buffer.len() > MAX_FRAME_BYTES {
            let size = self.buffer.len();
            self.buffer.clear();
            return Err(ActivityError::InvalidEvent(format!(
                "SSE frame exceeds {} bytes ({} buffered)",
                MAX_FRAME_BYTES, size
            )));
        }
        Ok(payloads)
    }

    fn parse_frame(frame: &str) -> Option<String> {
        let mut event_type: Option<&str> = None;
        let mut payload = String::new();

        for line in frame.lines() {
            if line.starts_with(':') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("event:") {
                event_type = Some(rest.trim());
            } else if let Some(rest) = line.strip_prefix("data:") {
                if !payload.is_empty() {
                    payload.push('\n');
                }
                payload.push_str(rest.strip_prefix(' ').unwrap_or(rest));
            }
        }

        match event_type {
            None | Some("message") | Some("transaction") if !payload.is_empty() => Some(payload),
            Some(other) => {
                trace!("Skipping SSE event {:?}", other);
                None
            }
            None => None,
        }
    }
}

#[derive(Clone)]
struct PollRequest {
    http_client: Client,
    url: String,
    auth_token: Option<String>,
}

impl PollRequest {
    /// One poll: a JSON array of events, each returned as its own payload
    async fn fetch(&self) -> ActivityResult<Vec<String>> {
        let mut request = self.http_client.get(&self.url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?.error_for_status()?;
        let body = response.text().await?;
        let events: Vec<serde_json::Value> = serde_json::from_str(&body)?;

        Ok(events.iter().map(|event| event.to_string()).collect())
    }
}

/// Interval polling of the pending-updates endpoint.
///
/// The first successful poll counts as the connection being established.
pub struct PollingTransport {
    request: PollRequest,
    interval: Duration,
}

impl PollingTransport {
    pub fn new(
        url: impl Into<String>,
        auth_token: Option<String>,
        interval: Duration,
        request_timeout: Duration,
    ) -> ActivityResult<Self> {
        let http_client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ActivityError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            request: PollRequest {
                http_client,
                url: url.into(),
                auth_token,
            },
            interval,
        })
    }
}

#[async_trait]
impl EventTransport for PollingTransport {
    async fn connect(&self) -> ActivityResult<EventStream> {
        let request = self.request.clone();
        let first = request.fetch().await?;
        debug!("Polling {} every {:?}", request.url, self.interval);

        let interval = self.interval;
        let events = stream::unfold(
            (request, VecDeque::from(first)),
            move |(request, mut ready)| async move {
                loop {
                    if let Some(payload) = ready.pop_front() {
                        return Some((Ok(payload), (request, ready)));
                    }
                    tokio::time::sleep(interval).await;
                    match request.fetch().await {
                        Ok(batch) => ready.extend(batch),
                        Err(e) => return Some((Err(e), (request, ready))),
                    }
                }
            },
        );

        Ok(events.boxed())
    }

    fn name(&self) -> &'static str {
        "polling"
    }
}
