//! # streamable-mcp
//!
//! Streamable HTTP transport and session engine for Model Context Protocol
//! (MCP) servers.
//!
//! This crate accepts HTTP requests carrying JSON-RPC 2.0 messages, routes
//! them into a message handler, and streams responses and server-initiated
//! notifications back as a single JSON body or as a Server-Sent Events
//! stream. It covers protocol revisions 2024-11-05, 2025-03-26 and
//! 2025-06-18.
//!
//! ## Pieces
//!
//! - [`StreamableHttpTransport`] - the HTTP entry point: validation,
//!   session resolution, request/response correlation, SSE streaming
//! - [`Session`] / [`SessionStore`] - the dual stateless / stateful session
//!   model with TTL expiry, recovery, and `Last-Event-ID` resumability
//! - [`MessageHandler`] - the seam where MCP semantics plug in
//! - [`McpServer`] - a facade implementing the handler over registered tools
//! - [`AuthLayer`] - bearer-token middleware for the MCP endpoint
//!
//! ## Example
//!
//! ```rust,no_run
//! use streamable_mcp::{CallToolResult, McpServer, ToolBuilder, TransportConfig};
//! use schemars::JsonSchema;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize, JsonSchema)]
//! struct EchoInput { message: String }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), streamable_mcp::Error> {
//!     let echo = ToolBuilder::new("echo")
//!         .handler(|i: EchoInput| async move { Ok(CallToolResult::text(i.message)) })
//!         .build();
//!
//!     let server = McpServer::builder()
//!         .server_info("my-server", "1.0.0")
//!         .tool(echo)
//!         .build();
//!
//!     server
//!         .into_transport(TransportConfig::default().stateful(true))
//!         .serve("127.0.0.1:3000")
//!         .await
//! }
//! ```

pub mod auth;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod session;
pub mod sse;
pub mod store;
pub mod tool;
pub mod transport;

// Re-exports
pub use auth::{AuthInfo, AuthLayer, TokenVerifier};
pub use error::{BoxError, Error, JsonRpcError, Result};
pub use handler::{MessageContext, MessageHandler};
pub use protocol::{
    ClientMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId, ServerMessage,
};
pub use server::{McpServer, McpServerBuilder};
pub use session::{Session, SessionPhase};
pub use store::{InMemorySessionStore, SessionData, SessionStore};
pub use tool::{CallToolResult, Tool, ToolBuilder};
pub use transport::{
    MCP_PROTOCOL_VERSION_HEADER, MCP_SESSION_ID_HEADER, StreamableHttpTransport, TransportConfig,
};
