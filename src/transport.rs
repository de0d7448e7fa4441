//! Streamable HTTP transport for MCP
//!
//! Implements the Streamable HTTP transport from MCP specification revisions
//! 2024-11-05, 2025-03-26 and 2025-06-18.
//!
//! ## Features
//!
//! - Single endpoint for POST (messages), GET (SSE notification streams) and
//!   DELETE (session termination)
//! - Dual stateless / stateful session model with TTL expiry and recovery
//!   through a pluggable [`SessionStore`]
//! - SSE streaming with per-session event ids and stream resumption via the
//!   `Last-Event-ID` header
//! - Response correlation: the handler's response for a request is delivered
//!   on the originating connection, as a single JSON body or as the final
//!   SSE event
//! - Origin validation (DNS-rebinding defense) and protocol-version checks
//!
//! ## Request flow
//!
//! ```text
//! Client                                  Server
//!   |-- POST initialize ------------------->|  creates session
//!   |<-- SSE: event(init response) ---------|  Mcp-Session-Id header
//!   |-- POST notifications/initialized ---->|  202 Accepted
//!   |-- POST tools/call (id: 2) ----------->|
//!   |<-- SSE: event(progress...) -----------|  server-initiated, same stream
//!   |<-- SSE: event(response id: 2) --------|  final event, stream closes
//!   |-- GET (Accept: text/event-stream) --->|  standalone notification stream
//!   |<-- id:5 event(notification) ----------|
//!   |-- DELETE -----------------------------|  204, session terminated
//! ```
//!
//! ## Stream resumption
//!
//! In stateful mode each SSE event carries a session-monotonic event id. A
//! client reconnecting its GET stream sends `Last-Event-ID: k` and receives
//! every buffered event with id greater than `k`, in ascending order, before
//! live events. Up to 100 events are buffered per stream.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
    routing::post,
};
use tokio::sync::{RwLock, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;

use crate::auth::AuthInfo;
use crate::error::{Error, JsonRpcError, Result};
use crate::handler::{MessageContext, MessageHandler};
use crate::protocol::{
    ClientMessage, DEFAULT_NEGOTIATED_PROTOCOL_VERSION, JsonRpcResponse, RequestId,
    SUPPORTED_PROTOCOL_VERSIONS, ServerMessage,
};
use crate::session::{PendingOutcome, PendingRequest, ResponseRoute, Session};
use crate::sse::{SSE_MESSAGE_EVENT, SseStream};
use crate::store::{InMemorySessionStore, SessionStore};

/// Header name for the MCP session id
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Header name for the MCP protocol version
pub const MCP_PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Header name for Last-Event-ID (SSE stream resumption)
const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Origins accepted when none are configured: local clients only.
const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost",
    "https://localhost",
    "http://127.0.0.1",
    "https://127.0.0.1",
];

/// How often the sweep task scans for expired sessions in stateful mode.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// SSE keep-alive comment interval.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for the Streamable HTTP transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Persist sessions across requests; enables GET streams and resumption.
    pub stateful: bool,
    /// Answer requests with a single JSON body instead of an SSE stream.
    pub enable_json_response: bool,
    /// Maximum accepted POST body size in bytes.
    pub max_body_size: usize,
    /// How long a request may stay unanswered before `-32001`.
    pub request_timeout: Duration,
    /// Idle session time-to-live (stateful only).
    pub session_timeout: Duration,
    /// Allowed `Origin` values: exact match or `value:port` prefix. `"*"`
    /// disables the check.
    pub allowed_origins: Vec<String>,
    /// Assign SSE event ids and buffer events for replay (stateful only).
    pub enable_resumability: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            stateful: false,
            enable_json_response: false,
            max_body_size: 1024 * 1024,
            request_timeout: Duration::from_secs(30),
            session_timeout: Duration::from_secs(3600),
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            enable_resumability: true,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stateful(mut self, stateful: bool) -> Self {
        self.stateful = stateful;
        self
    }

    pub fn enable_json_response(mut self, enable: bool) -> Self {
        self.enable_json_response = enable;
        self
    }

    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    pub fn enable_resumability(mut self, enable: bool) -> Self {
        self.enable_resumability = enable;
        self
    }

    fn assigns_event_ids(&self) -> bool {
        self.stateful && self.enable_resumability
    }
}

/// HTTP transport for MCP servers.
///
/// Accepts JSON-RPC messages over HTTP, forwards them to a
/// [`MessageHandler`], and streams responses and server-initiated
/// notifications back as JSON bodies or SSE events.
pub struct StreamableHttpTransport {
    state: Arc<TransportState>,
}

pub(crate) struct TransportState {
    config: TransportConfig,
    handler: Arc<dyn MessageHandler>,
    /// Live stateful sessions, keyed by session id.
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    store: Arc<dyn SessionStore>,
}

impl StreamableHttpTransport {
    /// Create a transport wrapping the given message handler.
    pub fn new(handler: impl MessageHandler, config: TransportConfig) -> Self {
        Self::with_handler(Arc::new(handler), config)
    }

    /// Create a transport from an already-shared handler.
    pub fn with_handler(handler: Arc<dyn MessageHandler>, config: TransportConfig) -> Self {
        handler.start();
        Self {
            state: Arc::new(TransportState {
                config,
                handler,
                sessions: RwLock::new(HashMap::new()),
                store: Arc::new(InMemorySessionStore::new()),
            }),
        }
    }

    /// Replace the in-memory session store, e.g. with a Redis-backed one.
    pub fn with_store(mut self, store: impl SessionStore) -> Self {
        let state = Arc::get_mut(&mut self.state)
            .expect("with_store must be called before the transport is shared");
        state.store = Arc::new(store);
        self
    }

    /// Build the axum router for this transport.
    pub fn into_router(self) -> Router {
        self.into_router_at("/")
    }

    /// Build an axum router with the MCP endpoint mounted at `path`.
    pub fn into_router_at(self, path: &str) -> Router {
        if self.state.config.stateful {
            self.spawn_sweep_task();
        }

        let endpoint = post(handle_post)
            .get(handle_get)
            .delete(handle_delete)
            .fallback(handle_method_not_allowed);

        Router::new()
            .route(path, endpoint)
            .route("/health", axum::routing::get(handle_health))
            .with_state(self.state)
    }

    /// Serve the transport on the given address.
    pub async fn serve(self, addr: &str) -> Result<()> {
        let state = self.state.clone();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Transport(format!("Failed to bind to {}: {}", addr, e)))?;

        tracing::info!("MCP Streamable HTTP transport listening on {}", addr);

        let router = self.into_router();
        let result = axum::serve(listener, router)
            .await
            .map_err(|e| Error::Transport(format!("Server error: {}", e)));

        state.shutdown().await;
        result
    }

    /// Terminate every session and close the handler.
    pub async fn shutdown(&self) {
        self.state.shutdown().await;
    }

    fn spawn_sweep_task(&self) {
        let state = self.state.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(SESSION_SWEEP_INTERVAL).await;
                state.sweep_expired().await;
            }
        });
    }
}

impl TransportState {
    /// Look up a live session, falling back to the store for sessions that
    /// survived an instance restart. Expired sessions are terminated lazily.
    async fn resolve_session(self: &Arc<Self>, id: &str) -> Option<Arc<Session>> {
        let cached = {
            let sessions = self.sessions.read().await;
            sessions.get(id).cloned()
        };

        if let Some(session) = cached {
            if session.is_expired(self.config.session_timeout) {
                tracing::debug!(session_id = %id, "Session expired on access");
                self.terminate_session(id).await;
                return None;
            }
            return Some(session);
        }

        // Recovery path: another instance (or a restart) may have persisted
        // the session projection without the in-memory aggregate.
        let data = self.store.get(id).await?;
        let session = Arc::new(Session::from_data(&data));
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .entry(id.to_string())
            .or_insert_with(|| session.clone())
            .clone();
        Some(entry)
    }

    /// Terminate and forget a session. Returns whether anything was removed.
    async fn terminate_session(self: &Arc<Self>, id: &str) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(id)
        };
        let known = removed.is_some() || self.store.get(id).await.is_some();
        if let Some(session) = removed {
            session.terminate().await;
        }
        self.store.delete(id).await;
        known
    }

    async fn sweep_expired(self: &Arc<Self>) {
        let expired: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, s)| s.is_expired(self.config.session_timeout))
                .map(|(id, _)| id.clone())
                .collect()
        };

        for id in &expired {
            self.terminate_session(id).await;
        }
        if !expired.is_empty() {
            tracing::info!(expired_count = expired.len(), "Session sweep completed");
        }
    }

    async fn shutdown(self: &Arc<Self>) {
        let drained: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, s)| s).collect()
        };
        for session in drained {
            self.store.delete(session.id()).await;
            session.terminate().await;
        }
        self.handler.close();
    }

    /// Persist the session projection, refreshing its store TTL.
    async fn persist(self: &Arc<Self>, session: &Session) {
        self.store
            .set(session.id(), session.to_data(), self.config.session_timeout)
            .await;
    }

    fn context(
        self: &Arc<Self>,
        session: Arc<Session>,
        post_stream: Option<Arc<SseStream>>,
        auth: Option<AuthInfo>,
        cancellation: CancellationToken,
    ) -> MessageContext {
        MessageContext {
            session_id: session.id().to_string(),
            protocol_version: session.protocol_version(),
            auth,
            cancellation,
            outbound: Outbound {
                state: self.clone(),
                session,
                post_stream,
            },
        }
    }

    /// Deliver a message to the handler without awaiting its side effects.
    fn dispatch(self: &Arc<Self>, message: ClientMessage, ctx: MessageContext) {
        let handler = self.handler.clone();
        tokio::spawn(async move {
            handler.on_message(message, ctx).await;
        });
    }

    /// Arm the per-request timer that produces the `-32001` terminal event.
    fn arm_request_timeout(
        self: &Arc<Self>,
        session: Arc<Session>,
        id: RequestId,
    ) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(state.config.request_timeout).await;
            let Some(entry) = session.take_pending(&id).await else {
                return;
            };
            entry.cancellation.cancel();
            tracing::debug!(session_id = %session.id(), request_id = %id, "Request timed out");
            match entry.route {
                ResponseRoute::Json(tx) => {
                    let _ = tx.send(PendingOutcome::TimedOut);
                }
                ResponseRoute::Stream(stream) => {
                    let response =
                        JsonRpcResponse::error(Some(id), JsonRpcError::request_timeout());
                    if let Ok(json) = serde_json::to_string(&response) {
                        let event_id = state
                            .config
                            .assigns_event_ids()
                            .then(|| session.next_event_id());
                        stream.enqueue(event_id, json).await;
                    }
                    stream.close().await;
                }
            }
        })
    }
}

/// Handle emitting handler-originated messages back toward the client.
///
/// Created per inbound message and carried on the [`MessageContext`], so
/// the current session and POST stream travel through the call stack
/// instead of living in transport instance state.
#[derive(Clone)]
pub struct Outbound {
    state: Arc<TransportState>,
    session: Arc<Session>,
    post_stream: Option<Arc<SseStream>>,
}

impl Outbound {
    pub(crate) async fn send(&self, message: ServerMessage) {
        match message {
            ServerMessage::Response(response) => self.send_response(response).await,
            other => self.send_server_initiated(other).await,
        }
    }

    /// Correlate a response to its pending request and resolve it.
    async fn send_response(&self, response: JsonRpcResponse) {
        let Some(id) = response.id().cloned() else {
            tracing::debug!("Dropping response without id");
            return;
        };

        let (session, entry) = match self.find_pending(&id).await {
            Some(found) => found,
            None => {
                tracing::debug!(request_id = %id, "Dropping response with no pending request");
                return;
            }
        };

        if let Some(timer) = entry.timeout {
            timer.abort();
        }

        let json = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize response");
                return;
            }
        };

        match entry.route {
            ResponseRoute::Json(tx) => {
                let _ = tx.send(PendingOutcome::Response(json));
            }
            ResponseRoute::Stream(stream) => {
                let event_id = self
                    .state
                    .config
                    .assigns_event_ids()
                    .then(|| session.next_event_id());
                stream.enqueue(event_id, json).await;
                // The response is the final event on its POST stream.
                stream.close().await;
            }
        }
    }

    /// Locate the pending entry for `id`: the current session first, then
    /// (stateful) every other live session.
    async fn find_pending(&self, id: &RequestId) -> Option<(Arc<Session>, PendingRequest)> {
        if let Some(entry) = self.session.take_pending(id).await {
            return Some((self.session.clone(), entry));
        }
        if !self.state.config.stateful {
            return None;
        }
        let sessions: Vec<Arc<Session>> = {
            let sessions = self.state.sessions.read().await;
            sessions.values().cloned().collect()
        };
        for session in sessions {
            if let Some(entry) = session.take_pending(id).await {
                return Some((session, entry));
            }
        }
        None
    }

    /// Deliver a server-initiated notification or request: the current POST
    /// stream when one is open, otherwise a fan-out to the session's active
    /// GET streams. Messages with nowhere to go are dropped.
    async fn send_server_initiated(&self, message: ServerMessage) {
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize outbound message");
                return;
            }
        };

        if let Some(stream) = &self.post_stream
            && stream.is_active()
        {
            let event_id = self
                .state
                .config
                .assigns_event_ids()
                .then(|| self.session.next_event_id());
            stream.enqueue(event_id, json).await;
            return;
        }

        if !self.state.config.stateful {
            tracing::debug!("Dropping server message: no active stream in stateless mode");
            return;
        }

        let streams = self.session.active_streams().await;
        if streams.is_empty() {
            tracing::debug!(session_id = %self.session.id(), "Dropping server message: no open streams");
            return;
        }

        // One event id per send; every stream records the same entry.
        let event_id = self
            .state
            .config
            .assigns_event_ids()
            .then(|| self.session.next_event_id());
        for stream in streams {
            stream.enqueue(event_id, json.clone()).await;
        }
    }
}

// ============================================================================
// Header helpers
// ============================================================================

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn get_session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(MCP_SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn get_last_event_id(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
}

/// Validate the `Origin` header against the allow-list.
///
/// Requests without an Origin are accepted (same-origin or non-browser).
/// `"*"` disables the check; otherwise the origin must equal an entry
/// exactly or extend one with a `:port` suffix.
fn validate_origin(headers: &HeaderMap, config: &TransportConfig) -> Option<Response> {
    let Some(origin) = headers.get(header::ORIGIN) else {
        return None;
    };
    let origin = origin.to_str().unwrap_or("");

    if config.allowed_origins.iter().any(|o| o == "*") {
        return None;
    }

    let allowed = config
        .allowed_origins
        .iter()
        .any(|entry| origin == entry || origin.starts_with(&format!("{}:", entry)));

    if allowed {
        None
    } else {
        tracing::warn!(origin = %origin, "Rejecting request from disallowed origin");
        Some(error_response(
            StatusCode::FORBIDDEN,
            JsonRpcError::transport_error("Forbidden: Origin not allowed"),
        ))
    }
}

/// JSON-RPC error body with a `null` id and the given HTTP status.
fn error_response(status: StatusCode, error: JsonRpcError) -> Response {
    let body = JsonRpcResponse::error(None, error);
    (status, axum::Json(body)).into_response()
}

fn with_session_header(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(MCP_SESSION_ID_HEADER, value);
    }
    response
}

fn sse_keep_alive() -> KeepAlive {
    KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("ping")
}

fn sse_headers(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-transform"),
    );
    response
}

// ============================================================================
// POST: submit one JSON-RPC message
// ============================================================================

async fn handle_post(State(state): State<Arc<TransportState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let headers = parts.headers;
    let auth = parts.extensions.get::<AuthInfo>().cloned();

    if let Some(response) = validate_origin(&headers, &state.config) {
        return response;
    }

    let accept = header_str(&headers, header::ACCEPT);
    if !accept.contains("application/json") || !accept.contains("text/event-stream") {
        return error_response(
            StatusCode::NOT_ACCEPTABLE,
            JsonRpcError::transport_error("Not Acceptable"),
        );
    }

    let content_type = header_str(&headers, header::CONTENT_TYPE);
    if !content_type.contains("application/json") {
        return error_response(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            JsonRpcError::transport_error("Unsupported Media Type"),
        );
    }

    let declared_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok());
    if declared_length.is_some_and(|len| len > state.config.max_body_size) {
        return error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            JsonRpcError::transport_error("Payload Too Large"),
        );
    }

    let bytes = match axum::body::to_bytes(body, state.config.max_body_size).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                JsonRpcError::transport_error("Payload Too Large"),
            );
        }
    };

    let value: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(_) => {
            return error_response(StatusCode::BAD_REQUEST, JsonRpcError::parse_error("Parse error"));
        }
    };

    // JSON-RPC batching was removed in the 2025-06-18 revision.
    if value.is_array() {
        return error_response(
            StatusCode::BAD_REQUEST,
            JsonRpcError::invalid_request("Batch requests are not supported"),
        );
    }

    let message = match ClientMessage::classify(value) {
        Ok(message) => message,
        Err(error) => return error_response(StatusCode::BAD_REQUEST, error),
    };

    let header_session_id = get_session_id(&headers);

    // Session resolution.
    let session: Arc<Session> = if message.is_initialize_request() {
        // A second initialize on a known session terminates and recreates.
        if state.config.stateful
            && let Some(id) = &header_session_id
        {
            state.terminate_session(id).await;
        }

        let session = Arc::new(Session::new(uuid::Uuid::new_v4().to_string()));
        session.mark_initializing();
        if state.config.stateful {
            let mut sessions = state.sessions.write().await;
            sessions.insert(session.id().to_string(), session.clone());
            drop(sessions);
            state.persist(&session).await;
            tracing::debug!(session_id = %session.id(), "Created new session");
        }
        session
    } else if state.config.stateful {
        let found = match &header_session_id {
            Some(id) => state.resolve_session(id).await,
            None => None,
        };
        match found {
            Some(session) => session,
            None => {
                return error_response(StatusCode::NOT_FOUND, JsonRpcError::session_not_found());
            }
        }
    } else {
        // Stateless: synthesize a per-request session. A client-minted
        // session id is accepted as-is.
        let id = header_session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Arc::new(Session::ephemeral(id))
    };

    // Protocol-version check for established stateful sessions.
    if !message.is_initialize_request() && state.config.stateful {
        let version = match headers.get(MCP_PROTOCOL_VERSION_HEADER) {
            Some(value) => value.to_str().unwrap_or(""),
            None => DEFAULT_NEGOTIATED_PROTOCOL_VERSION,
        };
        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&version) {
            return error_response(
                StatusCode::BAD_REQUEST,
                JsonRpcError::transport_error(format!("Unsupported protocol version: {}", version)),
            );
        }
        session.set_protocol_version(version);
    }

    session.touch();
    if state.config.stateful {
        state.persist(&session).await;
    }

    match message {
        ClientMessage::Notification(_) | ClientMessage::Response(_) => {
            if message.is_initialized_notification() && session.mark_initialized() {
                tracing::debug!(session_id = %session.id(), "Session initialized");
                if state.config.stateful {
                    state.persist(&session).await;
                }
            }

            let ctx = state.context(session.clone(), None, auth, CancellationToken::new());
            state.dispatch(message, ctx);

            with_session_header(StatusCode::ACCEPTED.into_response(), session.id())
        }
        ClientMessage::Request(request) => {
            if state.config.enable_json_response {
                deliver_request_json(&state, session, request, auth).await
            } else {
                deliver_request_sse(&state, session, request, auth).await
            }
        }
    }
}

/// Deliver a request in JSON response mode: the POST resolves once the
/// handler answers, times out, or the session terminates.
async fn deliver_request_json(
    state: &Arc<TransportState>,
    session: Arc<Session>,
    request: crate::protocol::JsonRpcRequest,
    auth: Option<AuthInfo>,
) -> Response {
    let request_id = request.id.clone();
    let cancellation = CancellationToken::new();
    let (tx, rx) = oneshot::channel();

    let timer = state.arm_request_timeout(session.clone(), request_id.clone());
    session
        .add_pending(
            request_id.clone(),
            PendingRequest {
                route: ResponseRoute::Json(tx),
                timeout: Some(timer),
                cancellation: cancellation.clone(),
            },
        )
        .await;

    let ctx = state.context(session.clone(), None, auth, cancellation);
    state.dispatch(ClientMessage::Request(request), ctx);

    let response = match rx.await {
        Ok(PendingOutcome::Response(json)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            json,
        )
            .into_response(),
        Ok(PendingOutcome::TimedOut) => {
            let body =
                JsonRpcResponse::error(Some(request_id), JsonRpcError::request_timeout());
            (StatusCode::REQUEST_TIMEOUT, axum::Json(body)).into_response()
        }
        Ok(PendingOutcome::Terminated) => {
            let body =
                JsonRpcResponse::error(Some(request_id), JsonRpcError::session_terminated());
            (StatusCode::OK, axum::Json(body)).into_response()
        }
        Err(_) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            JsonRpcError::internal_error("Request was abandoned"),
        ),
    };

    with_session_header(response, session.id())
}

/// Deliver a request in SSE mode: the POST response is a stream whose final
/// event is the correlated response.
async fn deliver_request_sse(
    state: &Arc<TransportState>,
    session: Arc<Session>,
    request: crate::protocol::JsonRpcRequest,
    auth: Option<AuthInfo>,
) -> Response {
    let request_id = request.id.clone();
    let cancellation = CancellationToken::new();

    let (stream, rx) = SseStream::new();
    let stream = Arc::new(stream);

    let timer = state.arm_request_timeout(session.clone(), request_id.clone());
    session
        .add_pending(
            request_id.clone(),
            PendingRequest {
                route: ResponseRoute::Stream(stream.clone()),
                timeout: Some(timer),
                cancellation: cancellation.clone(),
            },
        )
        .await;

    // Client disconnect tears the pending request down.
    {
        let session = session.clone();
        let stream = stream.clone();
        let request_id = request_id.clone();
        tokio::spawn(async move {
            stream.closed().await;
            stream.deactivate();
            if let Some(entry) = session.take_pending(&request_id).await {
                tracing::debug!(request_id = %request_id, "Client disconnected before response");
                entry.abandon();
            }
        });
    }

    let ctx = state.context(session.clone(), Some(stream), auth, cancellation);
    state.dispatch(ClientMessage::Request(request), ctx);

    let body = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    let response = Sse::new(body).keep_alive(sse_keep_alive()).into_response();
    with_session_header(sse_headers(response), session.id())
}

// ============================================================================
// GET: open an SSE notification stream
// ============================================================================

async fn handle_get(State(state): State<Arc<TransportState>>, request: Request) -> Response {
    let headers = request.headers().clone();

    if let Some(response) = validate_origin(&headers, &state.config) {
        return response;
    }

    let accept = header_str(&headers, header::ACCEPT);
    if !accept.contains("text/event-stream") {
        return error_response(
            StatusCode::NOT_ACCEPTABLE,
            JsonRpcError::transport_error("Not Acceptable"),
        );
    }

    let Some(session_id) = get_session_id(&headers) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            JsonRpcError::transport_error("Bad Request: Mcp-Session-Id header is required"),
        );
    };

    if !state.config.stateful {
        // Protocol compatibility only: the stream stays open but carries
        // nothing, since stateless mode has no server push.
        let silent = futures::stream::pending::<std::result::Result<Event, Infallible>>();
        let response = Sse::new(silent).keep_alive(sse_keep_alive()).into_response();
        return with_session_header(sse_headers(response), &session_id);
    }

    let Some(session) = state.resolve_session(&session_id).await else {
        return error_response(StatusCode::NOT_FOUND, JsonRpcError::session_not_found());
    };
    session.touch();

    let (stream, rx) = SseStream::new();
    let stream = Arc::new(stream);
    session.register_stream(stream.clone()).await;

    // Keep the replay ring; only flag the stream inactive on disconnect.
    {
        let stream = stream.clone();
        tokio::spawn(async move {
            stream.closed().await;
            stream.deactivate();
        });
    }

    let mut replay = Vec::new();
    if state.config.enable_resumability
        && let Some(last_event_id) = get_last_event_id(&headers)
    {
        let events = session.replay_after(last_event_id).await;
        tracing::debug!(
            session_id = %session.id(),
            after_id = last_event_id,
            replay_count = events.len(),
            "Replaying buffered events for stream resumption"
        );
        for (id, message) in events {
            replay.push(Ok::<_, Infallible>(
                Event::default()
                    .id(id.to_string())
                    .event(SSE_MESSAGE_EVENT)
                    .data(message),
            ));
        }
    }

    let body = tokio_stream::iter(replay).chain(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    let response = Sse::new(body).keep_alive(sse_keep_alive()).into_response();
    with_session_header(sse_headers(response), session.id())
}

// ============================================================================
// DELETE: terminate a session
// ============================================================================

async fn handle_delete(State(state): State<Arc<TransportState>>, headers: HeaderMap) -> Response {
    if let Some(response) = validate_origin(&headers, &state.config) {
        return response;
    }

    let Some(session_id) = get_session_id(&headers) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            JsonRpcError::transport_error("Bad Request: Mcp-Session-Id header is required"),
        );
    };

    if !state.config.stateful {
        // Nothing to terminate: stateless sessions end with their request.
        return StatusCode::NO_CONTENT.into_response();
    }

    if state.terminate_session(&session_id).await {
        tracing::info!(session_id = %session_id, "Session terminated by client");
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, JsonRpcError::session_not_found())
    }
}

async fn handle_method_not_allowed() -> Response {
    let mut response = StatusCode::METHOD_NOT_ALLOWED.into_response();
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static("GET, POST, DELETE"));
    response
}

/// Health check: no auth, no session state.
async fn handle_health() -> Response {
    StatusCode::OK.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use futures::future::BoxFuture;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    /// Responds to every request with `{"method": <method>}`.
    struct EchoHandler;

    impl MessageHandler for EchoHandler {
        fn on_message(
            &self,
            message: ClientMessage,
            ctx: MessageContext,
        ) -> BoxFuture<'static, ()> {
            Box::pin(async move {
                if let ClientMessage::Request(request) = message {
                    let response = JsonRpcResponse::result(
                        request.id,
                        json!({ "method": request.method }),
                    );
                    ctx.send(response).await;
                }
            })
        }
    }

    /// Never answers; used to exercise timeouts and termination.
    struct SilentHandler;

    impl MessageHandler for SilentHandler {
        fn on_message(
            &self,
            _message: ClientMessage,
            _ctx: MessageContext,
        ) -> BoxFuture<'static, ()> {
            Box::pin(async {})
        }
    }

    fn echo_router(config: TransportConfig) -> Router {
        StreamableHttpTransport::new(EchoHandler, config).into_router()
    }

    fn post_request(body: Value, session_id: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/")
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream");
        if let Some(id) = session_id {
            builder = builder.header(MCP_SESSION_ID_HEADER, id);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn initialize_body(id: i64) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": { "name": "test-client", "version": "1.0.0" }
            }
        })
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_string(response).await).unwrap()
    }

    /// Extract the `data:` payloads of the SSE events in a body.
    fn sse_data_lines(body: &str) -> Vec<Value> {
        body.lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    /// Extract the `id:` fields of the SSE events in a body.
    fn sse_event_ids(body: &str) -> Vec<u64> {
        body.lines()
            .filter_map(|line| line.strip_prefix("id: "))
            .map(|id| id.trim().parse().unwrap())
            .collect()
    }

    async fn initialize_session(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(post_request(initialize_body(1), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_unsupported_method_is_405_with_allow() {
        let app = echo_router(TransportConfig::default());

        let request = Request::builder()
            .method("PUT")
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response.headers().get(header::ALLOW).unwrap(),
            "GET, POST, DELETE"
        );
    }

    #[tokio::test]
    async fn test_post_requires_both_accept_types() {
        let app = echo_router(TransportConfig::default());

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(Body::from(initialize_body(1).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], -32000);
        assert_eq!(json["error"]["message"], "Not Acceptable");
    }

    #[tokio::test]
    async fn test_post_requires_json_content_type() {
        let app = echo_router(TransportConfig::default());

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("Content-Type", "text/plain")
            .header("Accept", "application/json, text/event-stream")
            .body(Body::from(initialize_body(1).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "Unsupported Media Type");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let app = echo_router(TransportConfig::default().max_body_size(64));

        let padding = "x".repeat(256);
        let response = app
            .oneshot(post_request(json!({ "padding": padding }), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "Payload Too Large");
    }

    #[tokio::test]
    async fn test_malformed_json_is_parse_error() {
        let app = echo_router(TransportConfig::default());

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], -32700);
        assert!(json["id"].is_null());
    }

    #[tokio::test]
    async fn test_batch_requests_are_rejected() {
        let app = echo_router(TransportConfig::default());

        let response = app
            .oneshot(post_request(json!([initialize_body(1)]), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], -32600);
        assert_eq!(json["error"]["message"], "Batch requests are not supported");
    }

    #[tokio::test]
    async fn test_invalid_message_shape_is_rejected() {
        let app = echo_router(TransportConfig::default());

        let response = app
            .oneshot(post_request(json!({"jsonrpc": "2.0", "id": 1}), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "Not a valid JSON-RPC message");
    }

    #[tokio::test]
    async fn test_disallowed_origin_is_forbidden() {
        let app = echo_router(TransportConfig::default());

        let mut request = post_request(initialize_body(1), None);
        request
            .headers_mut()
            .insert(header::ORIGIN, HeaderValue::from_static("https://evil.example"));
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], -32000);
        assert_eq!(json["error"]["message"], "Forbidden: Origin not allowed");
        assert!(json["id"].is_null());
    }

    #[tokio::test]
    async fn test_localhost_origin_with_port_is_allowed() {
        let app = echo_router(TransportConfig::default());

        let mut request = post_request(initialize_body(1), None);
        request.headers_mut().insert(
            header::ORIGIN,
            HeaderValue::from_static("http://localhost:6274"),
        );
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_wildcard_disables_origin_validation() {
        let app = echo_router(
            TransportConfig::default().allowed_origins(vec!["*".to_string()]),
        );

        let mut request = post_request(initialize_body(1), None);
        request
            .headers_mut()
            .insert(header::ORIGIN, HeaderValue::from_static("https://evil.example"));
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stateless_request_streams_response() {
        let app = echo_router(TransportConfig::default());

        let response = app
            .oneshot(post_request(initialize_body(1), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-cache, no-transform"
        );
        assert!(response.headers().contains_key(MCP_SESSION_ID_HEADER));

        let body = body_string(response).await;
        let events = sse_data_lines(&body);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["id"], 1);
        assert_eq!(events[0]["result"]["method"], "initialize");
        // No event ids in stateless mode.
        assert!(sse_event_ids(&body).is_empty());
    }

    #[tokio::test]
    async fn test_json_response_mode() {
        let app = echo_router(TransportConfig::default().enable_json_response(true));

        let response = app
            .oneshot(post_request(initialize_body(1), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let json = body_json(response).await;
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 1);
        assert_eq!(json["result"]["method"], "initialize");
    }

    #[tokio::test]
    async fn test_notification_is_accepted_with_empty_body() {
        let app = echo_router(TransportConfig::default());

        let response = app
            .oneshot(post_request(
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(response.headers().contains_key(MCP_SESSION_ID_HEADER));
        assert!(body_string(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_client_response_is_accepted() {
        let app = echo_router(TransportConfig::default());

        let response = app
            .oneshot(post_request(
                json!({"jsonrpc": "2.0", "id": 3, "result": {"answer": 42}}),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_stateless_never_404s_on_missing_session() {
        let app = echo_router(TransportConfig::default().enable_json_response(true));

        // Non-initialize request with a client-minted session id.
        let response = app
            .oneshot(post_request(
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
                Some("client-minted-id"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(MCP_SESSION_ID_HEADER).unwrap(),
            "client-minted-id"
        );
    }

    #[tokio::test]
    async fn test_stateful_unknown_session_is_404() {
        let app = echo_router(TransportConfig::default().stateful(true));

        let response = app
            .oneshot(post_request(
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
                Some("no-such-session"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], -32000);
    }

    #[tokio::test]
    async fn test_stateful_missing_session_header_is_404() {
        let app = echo_router(TransportConfig::default().stateful(true));

        let response = app
            .oneshot(post_request(
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stateful_round_trip_with_event_ids() {
        let app = echo_router(TransportConfig::default().stateful(true));
        let session_id = initialize_session(&app).await;

        let response = app
            .clone()
            .oneshot(post_request(
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
                Some(&session_id),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_string(response).await;
        let events = sse_data_lines(&body);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["id"], 2);
        // Resumability assigns monotonic event ids in stateful mode.
        let ids = sse_event_ids(&body);
        assert_eq!(ids.len(), 1);
        assert!(ids[0] >= 2);
    }

    #[tokio::test]
    async fn test_unsupported_protocol_version_is_rejected() {
        let app = echo_router(TransportConfig::default().stateful(true));
        let session_id = initialize_session(&app).await;

        let mut request = post_request(
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            Some(&session_id),
        );
        request.headers_mut().insert(
            MCP_PROTOCOL_VERSION_HEADER,
            HeaderValue::from_static("1999-01-01"),
        );
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], -32000);
    }

    #[tokio::test]
    async fn test_supported_protocol_version_header_is_accepted() {
        let app = echo_router(TransportConfig::default().stateful(true));
        let session_id = initialize_session(&app).await;

        let mut request = post_request(
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            Some(&session_id),
        );
        request.headers_mut().insert(
            MCP_PROTOCOL_VERSION_HEADER,
            HeaderValue::from_static("2025-06-18"),
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_request_timeout_emits_error_event() {
        let config = TransportConfig::default().request_timeout(Duration::from_millis(50));
        let app = StreamableHttpTransport::new(SilentHandler, config).into_router();

        let response = app
            .oneshot(post_request(
                json!({"jsonrpc": "2.0", "id": 7, "method": "slow/op"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_string(response).await;
        let events = sse_data_lines(&body);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["error"]["code"], -32001);
        assert_eq!(events[0]["error"]["message"], "Request timed out");
        assert_eq!(events[0]["id"], 7);
    }

    #[tokio::test]
    async fn test_request_timeout_in_json_mode_is_408() {
        let config = TransportConfig::default()
            .enable_json_response(true)
            .request_timeout(Duration::from_millis(50));
        let app = StreamableHttpTransport::new(SilentHandler, config).into_router();

        let response = app
            .oneshot(post_request(
                json!({"jsonrpc": "2.0", "id": 7, "method": "slow/op"}),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], -32001);
        assert_eq!(json["id"], 7);
    }

    #[tokio::test]
    async fn test_delete_terminates_session() {
        let app = echo_router(TransportConfig::default().stateful(true));
        let session_id = initialize_session(&app).await;

        let delete = Request::builder()
            .method("DELETE")
            .uri("/")
            .header(MCP_SESSION_ID_HEADER, &session_id)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        // The session is gone for subsequent requests.
        let response = app
            .oneshot(post_request(
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
                Some(&session_id),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_without_session_header_is_400() {
        let app = echo_router(TransportConfig::default().stateful(true));

        let delete = Request::builder()
            .method("DELETE")
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_unknown_session_is_404() {
        let app = echo_router(TransportConfig::default().stateful(true));

        let delete = Request::builder()
            .method("DELETE")
            .uri("/")
            .header(MCP_SESSION_ID_HEADER, "no-such-session")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_second_initialize_recreates_session() {
        let app = echo_router(TransportConfig::default().stateful(true));
        let first = initialize_session(&app).await;

        // Initialize again, referencing the first session.
        let response = app
            .clone()
            .oneshot(post_request(initialize_body(10), Some(&first)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let second = response
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert_ne!(first, second);

        // The first session was terminated.
        let response = app
            .oneshot(post_request(
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
                Some(&first),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_requires_event_stream_accept() {
        let app = echo_router(TransportConfig::default().stateful(true));

        let request = Request::builder()
            .method("GET")
            .uri("/")
            .header("Accept", "application/json")
            .header(MCP_SESSION_ID_HEADER, "anything")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn test_get_without_session_header_is_400() {
        for stateful in [false, true] {
            let app = echo_router(TransportConfig::default().stateful(stateful));
            let request = Request::builder()
                .method("GET")
                .uri("/")
                .header("Accept", "text/event-stream")
                .body(Body::empty())
                .unwrap();
            let response = app.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_get_stateless_opens_degenerate_stream() {
        let app = echo_router(TransportConfig::default());

        let request = Request::builder()
            .method("GET")
            .uri("/")
            .header("Accept", "text/event-stream")
            .header(MCP_SESSION_ID_HEADER, "client-id")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );
    }

    #[tokio::test]
    async fn test_get_stateful_unknown_session_is_404() {
        let app = echo_router(TransportConfig::default().stateful(true));

        let request = Request::builder()
            .method("GET")
            .uri("/")
            .header("Accept", "text/event-stream")
            .header(MCP_SESSION_ID_HEADER, "no-such-session")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = echo_router(TransportConfig::default());

        let request = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
