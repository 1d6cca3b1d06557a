use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::entity::{ActivityError, ActivityResult, RecordUpdate, StreamState};
use crate::interactor::activity_store::ActivityStore;
use crate::services::backoff::Backoff;
use crate::services::transport::EventTransport;

/// Reconnect policy of the event stream
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub backoff: Backoff,
    /// Consecutive errors after which the client gives up until reconnected externally
    pub max_consecutive_errors: u32,
    pub connect_timeout: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            max_consecutive_errors: 5,
            connect_timeout: Duration::from_secs(15),
        }
    }
}

struct RunningTask {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Keeps a push connection open and feeds every update it receives into the store
pub struct EventStreamClient {
    transport: Arc<dyn EventTransport>,
    store: Arc<ActivityStore>,
    options: StreamOptions,
    state: Arc<watch::Sender<StreamState>>,
    last_error: Arc<Mutex<Option<ActivityError>>>,
    task: Mutex<Option<RunningTask>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EventStreamClient {
    pub fn new(transport: Arc<dyn EventTransport>, store: Arc<ActivityStore>, options: StreamOptions) -> Self {
        let (state, _) = watch::channel(StreamState::Disconnected);
        Self {
            transport,
            store,
            options,
            state: Arc::new(state),
            last_error: Arc::new(Mutex::new(None)),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> StreamState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    /// Why the connection last dropped or failed to open
    pub fn last_error(&self) -> Option<ActivityError> {
        lock(&self.last_error).clone()
    }

    /// Start connecting. No-op while a connection task is already running.
    ///
    /// From `Failed` this starts over with a fresh error counter.
    pub fn connect(&self) {
        let mut task = lock(&self.task);
        if let Some(running) = task.as_ref() {
            if !running.handle.is_finished() && !self.state().can_connect() {
                debug!("Event stream already running ({})", self.state());
                return;
            }
        }
        if let Some(stale) = task.take() {
            stale.handle.abort();
        }

        info!("Connecting event stream over {}", self.transport.name());
        self.state.send_replace(StreamState::Connecting);

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run_connection(
            self.transport.clone(),
            self.store.clone(),
            self.options.clone(),
            self.state.clone(),
            self.last_error.clone(),
            stop_rx,
        ));

        *task = Some(RunningTask { stop_tx, handle });
    }

    /// Close the connection and cancel any scheduled reconnect
    pub async fn disconnect(&self) {
        let running = lock(&self.task).take();
        if let Some(RunningTask { stop_tx, handle }) = running {
            let _ = stop_tx.send(());
            let _ = handle.await;
            info!("Event stream disconnected");
        }

        // a connect() issued while we waited owns the state now
        let task = lock(&self.task);
        if task.is_none() {
            self.state.send_replace(StreamState::Disconnected);
        }
    }
}

async fn run_connection(
    transport: Arc<dyn EventTransport>,
    store: Arc<ActivityStore>,
    options: StreamOptions,
    state: Arc<watch::Sender<StreamState>>,
    last_error: Arc<Mutex<Option<ActivityError>>>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut consecutive_errors: u32 = 0;

    loop {
        state.send_replace(StreamState::Connecting);

        let connected = tokio::select! {
            _ = &mut stop_rx => return,
            result = timeout(options.connect_timeout, transport.connect()) => {
                result.unwrap_or(Err(ActivityError::Timeout(options.connect_timeout)))
            }
        };

        let reason = match connected {
            Ok(mut events) => {
                consecutive_errors = 0;
                state.send_replace(StreamState::Connected);
                info!("Event stream connected");

                loop {
                    tokio::select! {
                        _ = &mut stop_rx => return,
                        item = events.next() => match item {
                            Some(Ok(payload)) => {
                                if let Err(e) = apply_payload(&store, &payload).await {
                                    warn!("Dropping event: {}", e);
                                }
                            }
                            Some(Err(e)) => break e,
                            None => break ActivityError::StreamClosed,
                        }
                    }
                }
            }
            Err(e) => e,
        };

        warn!("Event stream dropped: {}", reason);
        *lock(&last_error) = Some(reason);

        consecutive_errors += 1;
        if consecutive_errors >= options.max_consecutive_errors {
            error!(
                "Event stream failed {} times in a row, waiting for an external reconnect",
                consecutive_errors
            );
            state.send_replace(StreamState::Failed);
            return;
        }

        let delay = options.backoff.delay(consecutive_errors);
        info!("Reconnecting event stream in {:?} (attempt {})", delay, consecutive_errors);
        state.send_replace(StreamState::Reconnecting {
            attempt: consecutive_errors,
            delay,
        });

        tokio::select! {
            _ = &mut stop_rx => return,
            _ = sleep(delay) => {}
        }
    }
}

/// Decode one pushed payload and merge it into the store
async fn apply_payload(store: &ActivityStore, payload: &str) -> ActivityResult<bool> {
    let update: RecordUpdate = serde_json::from_str(payload)
        .map_err(|e| ActivityError::InvalidEvent(format!("{} in {:?}", e, payload)))?;

    if update.client_tx_id.trim().is_empty() {
        return Err(ActivityError::InvalidEvent("missing clientTxId".to_string()));
    }

    debug!("Event for {}: {:?}", update.client_tx_id, update.status);
    Ok(store.upsert(update).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TxStatus;
    use crate::interactor::db::MemoryStorage;
    use crate::services::transport::EventStream;
    use async_trait::async_trait;
    use futures::stream;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    enum Outcome {
        Fail,
        /// Deliver payloads, then hold the connection open or close it
        Events(Vec<&'static str>, bool),
    }

    /// Plays back scripted connection outcomes, failing once the script runs out
    struct ScriptedTransport {
        script: Mutex<VecDeque<Outcome>>,
        attempts: Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Outcome>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                attempts: Mutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> usize {
            lock(&self.attempts).len()
        }

        fn gaps(&self) -> Vec<u64> {
            let attempts = lock(&self.attempts);
            attempts
                .windows(2)
                .map(|w| (w[1] - w[0]).as_secs())
                .collect()
        }
    }

    #[async_trait]
    impl EventTransport for ScriptedTransport {
        async fn connect(&self) -> ActivityResult<EventStream> {
            lock(&self.attempts).push(Instant::now());
            let outcome = lock(&self.script).pop_front().unwrap_or(Outcome::Fail);
            match outcome {
                Outcome::Fail => Err(ActivityError::Network("connection refused".to_string())),
                Outcome::Events(payloads, keep_open) => {
                    let items = stream::iter(
                        payloads
                            .into_iter()
                            .map(|p| Ok(p.to_string()))
                            .collect::<Vec<_>>(),
                    );
                    if keep_open {
                        Ok(items.chain(stream::pending()).boxed())
                    } else {
                        Ok(items.boxed())
                    }
                }
            }
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    async fn client(transport: Arc<ScriptedTransport>) -> (EventStreamClient, Arc<ActivityStore>) {
        let store = Arc::new(ActivityStore::hydrate(Arc::new(MemoryStorage::new()), "test").await);
        let client = EventStreamClient::new(transport, store.clone(), StreamOptions::default());
        (client, store)
    }

    async fn wait_for_state(client: &EventStreamClient, expected: StreamState) {
        let mut rx = client.subscribe_state();
        timeout(Duration::from_secs(600), rx.wait_for(|s| *s == expected))
            .await
            .expect("state not reached")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_five_consecutive_errors() {
        let transport = ScriptedTransport::new(vec![]);
        let (client, _store) = client(transport.clone()).await;

        client.connect();
        wait_for_state(&client, StreamState::Failed).await;

        assert_eq!(transport.attempts(), 5);
        assert_eq!(transport.gaps(), vec![1, 2, 4, 8]);

        sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.attempts(), 5);
        assert_eq!(client.state(), StreamState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn applies_events_and_drops_malformed_ones() {
        let transport = ScriptedTransport::new(vec![Outcome::Events(
            vec![
                r#"{"clientTxId":"a","status":"pending","type":"send","timestamp":"2026-03-10T09:00:00Z"}"#,
                "not json",
                r#"{"clientTxId":"","status":"confirmed"}"#,
                r#"{"clientTxId":"a","status":"confirmed"}"#,
            ],
            true,
        )]);
        let (client, store) = client(transport.clone()).await;
        let mut revisions = store.subscribe();

        client.connect();
        wait_for_state(&client, StreamState::Connected).await;
        timeout(Duration::from_secs(5), revisions.wait_for(|r| *r >= 2))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(store.get("a").await.unwrap().status, TxStatus::Confirmed);
        assert_eq!(store.len().await, 1);
        assert_eq!(client.state(), StreamState::Connected);
        assert_eq!(transport.attempts(), 1);

        client.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_resets_after_successful_connection() {
        let transport = ScriptedTransport::new(vec![
            Outcome::Fail,
            Outcome::Fail,
            Outcome::Events(vec![], false),
        ]);
        let (client, _store) = client(transport.clone()).await;

        client.connect();
        wait_for_state(&client, StreamState::Failed).await;

        // the close after connecting is the first error of a fresh run
        assert_eq!(transport.attempts(), 7);
        assert_eq!(transport.gaps(), vec![1, 2, 1, 2, 4, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let transport = ScriptedTransport::new(vec![]);
        let (client, _store) = client(transport.clone()).await;

        client.connect();
        wait_for_state(
            &client,
            StreamState::Reconnecting {
                attempt: 1,
                delay: Duration::from_secs(1),
            },
        )
        .await;

        client.disconnect().await;
        assert_eq!(client.state(), StreamState::Disconnected);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn server_close_is_reported_as_stream_closed() {
        let transport = ScriptedTransport::new(vec![
            Outcome::Events(vec![], false),
            Outcome::Events(vec![], true),
        ]);
        let (client, _store) = client(transport.clone()).await;
        assert_eq!(client.last_error(), None);

        client.connect();
        wait_for_state(
            &client,
            StreamState::Reconnecting {
                attempt: 1,
                delay: Duration::from_secs(1),
            },
        )
        .await;
        assert_eq!(client.last_error(), Some(ActivityError::StreamClosed));

        wait_for_state(&client, StreamState::Connected).await;
        assert_eq!(transport.attempts(), 2);
        client.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn connect_during_disconnect_keeps_the_new_connection() {
        let transport = ScriptedTransport::new(vec![
            Outcome::Events(vec![], true),
            Outcome::Events(vec![], true),
        ]);
        let (client, _store) = client(transport.clone()).await;

        client.connect();
        wait_for_state(&client, StreamState::Connected).await;

        tokio::join!(client.disconnect(), async { client.connect() });

        wait_for_state(&client, StreamState::Connected).await;
        sleep(Duration::from_secs(1)).await;
        assert_eq!(client.state(), StreamState::Connected);
        assert_eq!(transport.attempts(), 2);

        client.connect();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.attempts(), 2);
        client.disconnect().await;
        assert_eq!(client.state(), StreamState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_after_failure_starts_over() {
        let mut script: Vec<Outcome> = (0..5).map(|_| Outcome::Fail).collect();
        script.push(Outcome::Events(vec![], true));
        let transport = ScriptedTransport::new(script);
        let (client, _store) = client(transport.clone()).await;

        client.connect();
        wait_for_state(&client, StreamState::Failed).await;

        client.connect();
        wait_for_state(&client, StreamState::Connected).await;
        assert_eq!(transport.attempts(), 6);

        client.connect();
        assert_eq!(transport.attempts(), 6);
        client.disconnect().await;
    }
}
