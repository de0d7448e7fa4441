//! Server facade
//!
//! [`McpServer`] wires registered [`Tool`]s to the transport by implementing
//! [`MessageHandler`]: it answers `initialize`, `ping`, `tools/list` and
//! `tools/call`, observes lifecycle notifications, and cancels in-flight
//! tool calls on `notifications/cancelled`.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::JsonRpcError;
use crate::handler::{MessageContext, MessageHandler};
use crate::protocol::{
    ClientMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    LATEST_PROTOCOL_VERSION, RequestId, SUPPORTED_PROTOCOL_VERSIONS, methods, notifications,
};
use crate::tool::{CallToolResult, Tool};
use crate::transport::{StreamableHttpTransport, TransportConfig};

/// MCP server facade: server identity plus a set of registered tools.
///
/// # Example
///
/// ```rust,no_run
/// use streamable_mcp::{McpServer, ToolBuilder, CallToolResult, TransportConfig};
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize, JsonSchema)]
/// struct EchoInput { message: String }
///
/// #[tokio::main]
/// async fn main() -> Result<(), streamable_mcp::Error> {
///     let echo = ToolBuilder::new("echo")
///         .description("Echo a message back")
///         .handler(|input: EchoInput| async move {
///             Ok(CallToolResult::text(input.message))
///         })
///         .build();
///
///     let server = McpServer::builder()
///         .server_info("echo-server", "1.0.0")
///         .tool(echo)
///         .build();
///
///     server
///         .into_transport(TransportConfig::default().stateful(true))
///         .serve("127.0.0.1:3000")
///         .await
/// }
/// ```
#[derive(Clone)]
pub struct McpServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    name: String,
    version: String,
    instructions: Option<String>,
    tools: HashMap<String, Tool>,
    /// Cancellation tokens of in-flight `tools/call` requests, keyed by
    /// request id, so `notifications/cancelled` can reach them.
    in_flight: Mutex<HashMap<RequestId, CancellationToken>>,
}

/// Builder for [`McpServer`].
pub struct McpServerBuilder {
    name: String,
    version: String,
    instructions: Option<String>,
    tools: HashMap<String, Tool>,
}

impl Default for McpServerBuilder {
    fn default() -> Self {
        Self {
            name: "streamable-mcp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
            tools: HashMap::new(),
        }
    }
}

impl McpServerBuilder {
    /// Set the name and version reported in the initialize response.
    pub fn server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.name = name.into();
        self.version = version.into();
        self
    }

    /// Usage instructions surfaced to clients at initialize.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Register a tool. A tool with the same name replaces the previous one.
    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.insert(tool.name.clone(), tool);
        self
    }

    pub fn build(self) -> McpServer {
        McpServer {
            inner: Arc::new(ServerInner {
                name: self.name,
                version: self.version,
                instructions: self.instructions,
                tools: self.tools,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl McpServer {
    pub fn builder() -> McpServerBuilder {
        McpServerBuilder::default()
    }

    /// Wrap this server in a Streamable HTTP transport.
    pub fn into_transport(self, config: TransportConfig) -> StreamableHttpTransport {
        StreamableHttpTransport::with_handler(Arc::new(self), config)
    }
}

impl MessageHandler for McpServer {
    fn on_message(&self, message: ClientMessage, ctx: MessageContext) -> BoxFuture<'static, ()> {
        let inner = self.inner.clone();
        Box::pin(async move {
            match message {
                ClientMessage::Request(request) => inner.handle_request(request, ctx).await,
                ClientMessage::Notification(notification) => {
                    inner.handle_notification(notification).await
                }
                ClientMessage::Response(response) => {
                    // The facade issues no server-initiated requests.
                    tracing::debug!(request_id = %response.id, "Ignoring client response");
                }
            }
        })
    }
}

impl ServerInner {
    async fn handle_request(self: Arc<Self>, request: JsonRpcRequest, ctx: MessageContext) {
        let id = request.id.clone();
        let params = request.params.unwrap_or_else(|| json!({}));

        let response = match request.method.as_str() {
            methods::INITIALIZE => JsonRpcResponse::result(id, self.initialize_result(&params)),
            methods::PING => JsonRpcResponse::result(id, json!({})),
            methods::TOOLS_LIST => {
                let tools: Vec<_> = self.tools.values().map(Tool::definition).collect();
                JsonRpcResponse::result(id, json!({ "tools": tools }))
            }
            methods::TOOLS_CALL => match self.clone().call_tool(id.clone(), params, &ctx).await {
                Some(response) => response,
                // Cancelled mid-call: no response is produced.
                None => return,
            },
            other => JsonRpcResponse::error(Some(id), JsonRpcError::method_not_found(other)),
        };

        ctx.send(response).await;
    }

    fn initialize_result(&self, params: &Value) -> Value {
        let requested = params.get("protocolVersion").and_then(Value::as_str);
        let version = requested
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
            .unwrap_or(LATEST_PROTOCOL_VERSION);

        let mut result = json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": self.name,
                "version": self.version,
            }
        });
        if let Some(instructions) = &self.instructions {
            result["instructions"] = json!(instructions);
        }
        result
    }

    /// Run a tool call, observing cancellation. Returns `None` when the
    /// call was cancelled and no response should be sent.
    async fn call_tool(
        self: Arc<Self>,
        id: RequestId,
        params: Value,
        ctx: &MessageContext,
    ) -> Option<JsonRpcResponse> {
        let name = params.get("name").and_then(Value::as_str).unwrap_or("");
        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        let Some(tool) = self.tools.get(name) else {
            return Some(JsonRpcResponse::error(
                Some(id),
                JsonRpcError::invalid_params(format!("Unknown tool: {}", name)),
            ));
        };

        let token = ctx.cancellation().child_token();
        self.in_flight.lock().await.insert(id.clone(), token.clone());

        let outcome = tokio::select! {
            _ = token.cancelled() => None,
            result = tool.call(arguments) => Some(result),
        };

        self.in_flight.lock().await.remove(&id);

        let result = match outcome {
            None => {
                tracing::debug!(request_id = %id, tool = %name, "Tool call cancelled");
                return None;
            }
            Some(Ok(result)) => result,
            // Tool failures are reported in-band, not as protocol errors.
            Some(Err(e)) => CallToolResult::error(e.to_string()),
        };

        match serde_json::to_value(&result) {
            Ok(value) => Some(JsonRpcResponse::result(id, value)),
            Err(e) => Some(JsonRpcResponse::error(
                Some(id),
                JsonRpcError::internal_error(e.to_string()),
            )),
        }
    }

    async fn handle_notification(self: Arc<Self>, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            notifications::INITIALIZED => {
                tracing::debug!("Client completed initialization");
            }
            notifications::CANCELLED => {
                let request_id = notification
                    .params
                    .as_ref()
                    .and_then(|p| p.get("requestId"))
                    .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
                if let Some(request_id) = request_id {
                    let in_flight = self.in_flight.lock().await;
                    if let Some(token) = in_flight.get(&request_id) {
                        tracing::debug!(request_id = %request_id, "Cancelling in-flight request");
                        token.cancel();
                    }
                }
            }
            other => {
                tracing::debug!(method = %other, "Ignoring notification");
            }
        }
    }
}
