//! One outbound SSE connection
//!
//! An [`SseStream`] wraps the sending half of the channel that backs an SSE
//! response body. Events delivered with an event id are recorded in a
//! bounded per-stream ring so a reconnecting client can replay them via the
//! `Last-Event-ID` header.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::response::sse::Event;
use tokio::sync::{Mutex, RwLock, mpsc};

/// SSE event type for JSON-RPC messages
pub(crate) const SSE_MESSAGE_EVENT: &str = "message";

/// Maximum `(event id, message)` entries retained per stream for replay.
pub(crate) const MESSAGE_HISTORY_LIMIT: usize = 100;

/// Channel capacity of the stream backing an SSE response body.
pub(crate) const STREAM_CHANNEL_CAPACITY: usize = 64;

/// One active outbound SSE connection.
pub struct SseStream {
    id: String,
    /// Sending half of the response body channel; taken on close.
    controller: Mutex<Option<mpsc::Sender<Event>>>,
    active: AtomicBool,
    /// Ring of `(event id, JSON message)` pairs kept for replay.
    history: RwLock<VecDeque<(u64, String)>>,
}

impl SseStream {
    /// Create a stream and the receiver that feeds the HTTP response body.
    pub fn new() -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let stream = Self {
            id: uuid::Uuid::new_v4().to_string(),
            controller: Mutex::new(Some(tx)),
            active: AtomicBool::new(true),
            history: RwLock::new(VecDeque::new()),
        };
        (stream, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Encode one message as an SSE event and enqueue it.
    ///
    /// The `id:` field is emitted only when `event_id` is supplied; such
    /// events are also recorded in the replay ring, dropping the oldest
    /// entry past [`MESSAGE_HISTORY_LIMIT`]. A send failure means the peer
    /// went away: the stream is marked inactive and the error is swallowed.
    pub async fn enqueue(&self, event_id: Option<u64>, message: String) -> bool {
        let sender = {
            let controller = self.controller.lock().await;
            controller.clone()
        };
        let Some(sender) = sender else {
            return false;
        };

        let mut event = Event::default().event(SSE_MESSAGE_EVENT).data(&message);
        if let Some(id) = event_id {
            event = event.id(id.to_string());
            let mut history = self.history.write().await;
            if history.len() >= MESSAGE_HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back((id, message));
        }

        if sender.send(event).await.is_err() {
            self.active.store(false, Ordering::Release);
            return false;
        }
        true
    }

    /// Replay ring entries with an event id greater than `after_id`.
    pub async fn events_after(&self, after_id: u64) -> Vec<(u64, String)> {
        let history = self.history.read().await;
        history
            .iter()
            .filter(|(id, _)| *id > after_id)
            .cloned()
            .collect()
    }

    /// Mark the stream inactive without dropping the history ring, so a
    /// later reconnect can still replay what was delivered on it.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Close the stream: the response body ends once in-flight events drain.
    pub async fn close(&self) {
        self.active.store(false, Ordering::Release);
        let mut controller = self.controller.lock().await;
        controller.take();
    }

    /// Discard the replay ring.
    pub async fn clear_history(&self) {
        self.history.write().await.clear();
    }

    /// Resolves when the receiving half (the HTTP response body) is gone.
    pub async fn closed(&self) {
        let sender = {
            let controller = self.controller.lock().await;
            controller.clone()
        };
        if let Some(sender) = sender {
            sender.closed().await;
        }
    }
}
