//! MCP session state management
//!
//! Tracks the lifecycle of one logical client as per the specification.
//! A session progresses through phases: Uninitialized -> Initializing ->
//! Initialized, and reaches Terminated via DELETE, TTL expiry, or transport
//! shutdown. The aggregate owns the session's SSE streams, its outstanding
//! client requests, and the monotonic counter that produces SSE event ids.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::JsonRpcError;
use crate::protocol::{DEFAULT_NEGOTIATED_PROTOCOL_VERSION, JsonRpcResponse, RequestId};
use crate::sse::SseStream;
use crate::store::SessionData;

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionPhase {
    /// Initial state, before the `initialize` request has been observed
    Uninitialized = 0,
    /// `initialize` received, waiting for the `initialized` notification
    Initializing = 1,
    /// `initialized` notification received, normal operation
    Initialized = 2,
    /// Session ended by DELETE, TTL expiry, or transport shutdown
    Terminated = 3,
}

impl From<u8> for SessionPhase {
    fn from(value: u8) -> Self {
        match value {
            1 => SessionPhase::Initializing,
            2 => SessionPhase::Initialized,
            3 => SessionPhase::Terminated,
            _ => SessionPhase::Uninitialized,
        }
    }
}

/// How the response for a pending request travels back to the client.
pub(crate) enum ResponseRoute {
    /// `enable_json_response` mode: the awaiting POST resolves to a JSON body.
    Json(oneshot::Sender<PendingOutcome>),
    /// Default mode: the response is the final event on the POST SSE stream.
    Stream(Arc<SseStream>),
}

/// Terminal outcome delivered to a JSON-mode waiter.
pub(crate) enum PendingOutcome {
    /// The handler's response, already serialized.
    Response(String),
    /// The request timer fired before the handler answered.
    TimedOut,
    /// The session was terminated mid-flight.
    Terminated,
}

/// An outstanding client-initiated request awaiting a handler response.
pub(crate) struct PendingRequest {
    pub(crate) route: ResponseRoute,
    /// Abortable `request_timeout` timer.
    pub(crate) timeout: Option<JoinHandle<()>>,
    /// Cancelled on teardown so in-flight handler work can stop.
    pub(crate) cancellation: CancellationToken,
}

impl PendingRequest {
    /// Stop the timer and signal cancellation without resolving the route.
    pub(crate) fn abandon(self) {
        if let Some(timer) = self.timeout {
            timer.abort();
        }
        self.cancellation.cancel();
    }
}

/// Aggregate state for one logical MCP client.
pub struct Session {
    id: String,
    phase: AtomicU8,
    protocol_version: RwLock<String>,
    last_activity: RwLock<Instant>,
    /// GET-originated streams, keyed by stream id. Inactive entries are
    /// kept so their replay rings survive a client reconnect.
    sse_streams: Mutex<HashMap<String, Arc<SseStream>>>,
    pending: Mutex<HashMap<RequestId, PendingRequest>>,
    event_counter: AtomicU64,
}

impl Session {
    /// Create a session in the Uninitialized phase.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            phase: AtomicU8::new(SessionPhase::Uninitialized as u8),
            protocol_version: RwLock::new(DEFAULT_NEGOTIATED_PROTOCOL_VERSION.to_string()),
            last_activity: RwLock::new(Instant::now()),
            sse_streams: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            event_counter: AtomicU64::new(0),
        }
    }

    /// Synthesize the per-request session used in stateless mode. It is
    /// already Initialized and is dropped when the request completes.
    pub fn ephemeral(id: impl Into<String>) -> Self {
        let session = Self::new(id);
        session
            .phase
            .store(SessionPhase::Initialized as u8, Ordering::Release);
        session
    }

    /// Rehydrate a session from its persisted projection, e.g. after a
    /// serverless instance restart in stateful mode.
    pub fn from_data(data: &SessionData) -> Self {
        let session = Self::new(data.id.clone());
        if data.initialized {
            session
                .phase
                .store(SessionPhase::Initialized as u8, Ordering::Release);
        }
        session.set_protocol_version(&data.protocol_version);
        session
    }

    /// Persistable projection: no streams, no pendings, no timers.
    pub fn to_data(&self) -> SessionData {
        SessionData {
            id: self.id.clone(),
            initialized: self.is_initialized(),
            protocol_version: self.protocol_version(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from(self.phase.load(Ordering::Acquire))
    }

    pub fn is_initialized(&self) -> bool {
        self.phase() == SessionPhase::Initialized
    }

    pub fn is_terminated(&self) -> bool {
        self.phase() == SessionPhase::Terminated
    }

    /// Transition Uninitialized -> Initializing, on receipt of `initialize`.
    pub fn mark_initializing(&self) -> bool {
        self.phase
            .compare_exchange(
                SessionPhase::Uninitialized as u8,
                SessionPhase::Initializing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Transition to Initialized on the `notifications/initialized`
    /// notification.
    ///
    /// Accepts the transition from `Uninitialized` as well: over HTTP the
    /// notification can arrive on a second connection before the
    /// `initialize` request has finished processing.
    pub fn mark_initialized(&self) -> bool {
        if self
            .phase
            .compare_exchange(
                SessionPhase::Initializing as u8,
                SessionPhase::Initialized as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            return true;
        }

        self.phase
            .compare_exchange(
                SessionPhase::Uninitialized as u8,
                SessionPhase::Initialized as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn protocol_version(&self) -> String {
        self.protocol_version
            .read()
            .map(|v| v.clone())
            .unwrap_or_else(|_| DEFAULT_NEGOTIATED_PROTOCOL_VERSION.to_string())
    }

    pub fn set_protocol_version(&self, version: &str) {
        if let Ok(mut v) = self.protocol_version.write() {
            *v = version.to_string();
        }
    }

    /// Refresh the activity timestamp; called on every inbound message.
    pub fn touch(&self) {
        if let Ok(mut at) = self.last_activity.write() {
            *at = Instant::now();
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.last_activity
            .read()
            .map(|at| at.elapsed() > ttl)
            .unwrap_or(false)
    }

    /// Next SSE event id. Strictly increasing per session, starting at 1.
    pub fn next_event_id(&self) -> u64 {
        self.event_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Register a GET-originated stream on this session.
    pub async fn register_stream(&self, stream: Arc<SseStream>) {
        let mut streams = self.sse_streams.lock().await;
        streams.insert(stream.id().to_string(), stream);
    }

    /// Snapshot of the currently active streams.
    pub async fn active_streams(&self) -> Vec<Arc<SseStream>> {
        let streams = self.sse_streams.lock().await;
        streams.values().filter(|s| s.is_active()).cloned().collect()
    }

    /// Gather replayable events with id greater than `after_id` across all
    /// per-stream rings, deduplicated and in ascending event-id order.
    pub async fn replay_after(&self, after_id: u64) -> Vec<(u64, String)> {
        let streams: Vec<Arc<SseStream>> = {
            let streams = self.sse_streams.lock().await;
            streams.values().cloned().collect()
        };

        let mut merged = BTreeMap::new();
        for stream in streams {
            for (id, message) in stream.events_after(after_id).await {
                merged.insert(id, message);
            }
        }
        merged.into_iter().collect()
    }

    /// Register an outstanding request. A client reusing an id that is
    /// still pending abandons the older entry.
    pub(crate) async fn add_pending(&self, id: RequestId, request: PendingRequest) {
        let mut pending = self.pending.lock().await;
        if let Some(stale) = pending.insert(id.clone(), request) {
            tracing::warn!(session_id = %self.id, request_id = %id, "Replacing pending request with duplicate id");
            stale.abandon();
        }
    }

    /// Take an outstanding request out of the map. Removal is the
    /// resolve-exactly-once guard: only the caller that gets `Some` may
    /// produce the terminal event.
    pub(crate) async fn take_pending(&self, id: &RequestId) -> Option<PendingRequest> {
        let mut pending = self.pending.lock().await;
        pending.remove(id)
    }

    /// Number of outstanding requests (test support).
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Terminate the session: close every SSE stream, clear replay rings,
    /// and reject every pending request with `-32000 "Session terminated"`.
    pub async fn terminate(&self) {
        let previous = self
            .phase
            .swap(SessionPhase::Terminated as u8, Ordering::AcqRel);
        if previous == SessionPhase::Terminated as u8 {
            return;
        }

        let drained: Vec<(RequestId, PendingRequest)> = {
            let mut pending = self.pending.lock().await;
            pending.drain().collect()
        };
        for (id, request) in drained {
            if let Some(timer) = request.timeout {
                timer.abort();
            }
            request.cancellation.cancel();
            match request.route {
                ResponseRoute::Json(tx) => {
                    let _ = tx.send(PendingOutcome::Terminated);
                }
                ResponseRoute::Stream(stream) => {
                    let response =
                        JsonRpcResponse::error(Some(id), JsonRpcError::session_terminated());
                    if let Ok(json) = serde_json::to_string(&response) {
                        stream.enqueue(None, json).await;
                    }
                    stream.close().await;
                }
            }
        }

        let streams: Vec<Arc<SseStream>> = {
            let mut streams = self.sse_streams.lock().await;
            streams.drain().map(|(_, s)| s).collect()
        };
        for stream in streams {
            stream.clear_history().await;
            stream.close().await;
        }

        tracing::debug!(session_id = %self.id, "Session terminated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let session = Session::new("s1");

        assert_eq!(session.phase(), SessionPhase::Uninitialized);
        assert!(!session.is_initialized());

        assert!(session.mark_initializing());
        assert_eq!(session.phase(), SessionPhase::Initializing);

        // Can't mark initializing again
        assert!(!session.mark_initializing());

        assert!(session.mark_initialized());
        assert_eq!(session.phase(), SessionPhase::Initialized);
        assert!(session.is_initialized());

        // Can't mark initialized again
        assert!(!session.mark_initialized());
    }

    #[test]
    fn test_mark_initialized_from_uninitialized() {
        // The notification can race ahead of the initialize request.
        let session = Session::new("s1");
        assert!(session.mark_initialized());
        assert_eq!(session.phase(), SessionPhase::Initialized);
    }

    #[test]
    fn test_ephemeral_starts_initialized() {
        let session = Session::ephemeral("client-minted");
        assert!(session.is_initialized());
        assert_eq!(session.id(), "client-minted");
    }

    #[test]
    fn test_event_ids_strictly_increase() {
        let session = Session::new("s1");
        assert_eq!(session.next_event_id(), 1);
        assert_eq!(session.next_event_id(), 2);
        assert_eq!(session.next_event_id(), 3);
    }

    #[test]
    fn test_data_roundtrip() {
        let session = Session::new("s1");
        session.mark_initializing();
        session.mark_initialized();
        session.set_protocol_version("2025-06-18");

        let data = session.to_data();
        assert!(data.initialized);
        assert_eq!(data.protocol_version, "2025-06-18");

        let restored = Session::from_data(&data);
        assert!(restored.is_initialized());
        assert_eq!(restored.protocol_version(), "2025-06-18");
    }

    #[test]
    fn test_expiry() {
        let session = Session::new("s1");
        assert!(!session.is_expired(Duration::from_secs(60)));
        assert!(session.is_expired(Duration::from_nanos(1)));
        session.touch();
        assert!(!session.is_expired(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_replay_merges_streams_in_order() {
        let session = Session::new("s1");

        let (a, _rx_a) = SseStream::new();
        let (b, _rx_b) = SseStream::new();
        let a = Arc::new(a);
        let b = Arc::new(b);
        session.register_stream(a.clone()).await;
        session.register_stream(b.clone()).await;

        a.enqueue(Some(1), "m1".to_string()).await;
        b.enqueue(Some(2), "m2".to_string()).await;
        a.enqueue(Some(3), "m3".to_string()).await;
        b.enqueue(Some(4), "m4".to_string()).await;

        let replayed = session.replay_after(2).await;
        assert_eq!(
            replayed,
            vec![(3, "m3".to_string()), (4, "m4".to_string())]
        );
    }

    #[tokio::test]
    async fn test_terminate_rejects_pending_and_closes_streams() {
        let session = Session::new("s1");

        let (stream, mut stream_rx) = SseStream::new();
        let stream = Arc::new(stream);
        session.register_stream(stream.clone()).await;

        let (tx, rx) = oneshot::channel();
        session
            .add_pending(
                RequestId::from(7),
                PendingRequest {
                    route: ResponseRoute::Json(tx),
                    timeout: None,
                    cancellation: CancellationToken::new(),
                },
            )
            .await;

        session.terminate().await;

        assert!(matches!(rx.await, Ok(PendingOutcome::Terminated)));
        assert_eq!(session.pending_count().await, 0);
        assert!(session.is_terminated());
        // Stream channel closed and history cleared.
        assert!(stream_rx.recv().await.is_none());
        assert!(stream.events_after(0).await.is_empty());
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let session = Session::new("s1");
        session.terminate().await;
        session.terminate().await;
        assert!(session.is_terminated());
    }

    #[tokio::test]
    async fn test_take_pending_resolves_once() {
        let session = Session::new("s1");
        let (tx, _rx) = oneshot::channel();
        session
            .add_pending(
                RequestId::from("a"),
                PendingRequest {
                    route: ResponseRoute::Json(tx),
                    timeout: None,
                    cancellation: CancellationToken::new(),
                },
            )
            .await;

        assert!(session.take_pending(&RequestId::from("a")).await.is_some());
        assert!(session.take_pending(&RequestId::from("a")).await.is_none());
    }
}
