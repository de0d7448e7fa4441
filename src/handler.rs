//! The message handler seam between the transport and MCP logic
//!
//! The transport treats MCP semantics as an opaque collaborator: every
//! accepted inbound message is forwarded to a [`MessageHandler`], and the
//! handler emits outbound messages through the [`MessageContext`] it is
//! given. The context is passed explicitly through the call stack, so the
//! transport never holds per-request state in instance fields.

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthInfo;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::transport::Outbound;

/// Handles inbound MCP messages and produces outbound ones.
///
/// The transport invokes [`start`](MessageHandler::start) once before first
/// use and [`close`](MessageHandler::close) on shutdown. `on_message` is
/// fire-and-forget: the transport does not await side effects beyond the
/// returned future, and responses travel back through
/// [`MessageContext::send`], correlated by request id.
pub trait MessageHandler: Send + Sync + 'static {
    /// Called once before the first message is delivered.
    fn start(&self) {}

    /// Called when the transport shuts down.
    fn close(&self) {}

    /// Process one inbound message.
    fn on_message(&self, message: ClientMessage, ctx: MessageContext) -> BoxFuture<'static, ()>;
}

/// Per-message context handed to the handler.
///
/// Carries the originating session, the negotiated protocol version, the
/// request's auth info, a cancellation token observing client disconnect,
/// and the outbound channel used to emit responses and notifications.
#[derive(Clone)]
pub struct MessageContext {
    pub(crate) session_id: String,
    pub(crate) protocol_version: String,
    pub(crate) auth: Option<AuthInfo>,
    pub(crate) cancellation: CancellationToken,
    pub(crate) outbound: Outbound,
}

impl MessageContext {
    /// The id of the session this message arrived on.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The protocol version negotiated for the session.
    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    /// Auth info established by the middleware, if any.
    pub fn auth(&self) -> Option<&AuthInfo> {
        self.auth.as_ref()
    }

    /// Cancelled when the originating request is aborted or times out.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Emit an outbound message.
    ///
    /// Responses are correlated to their pending request and delivered on
    /// the originating connection; notifications and server-initiated
    /// requests go to the current POST stream or fan out to the session's
    /// open SSE streams. Messages with nowhere to go are dropped.
    pub async fn send(&self, message: impl Into<ServerMessage>) {
        self.outbound.send(message.into()).await;
    }
}
