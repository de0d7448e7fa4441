//! JSON-RPC 2.0 message model and MCP protocol constants
//!
//! These types follow the MCP Streamable HTTP transport specification
//! revisions 2024-11-05, 2025-03-26 and 2025-06-18:
//! https://modelcontextprotocol.io/specification/2025-06-18
//!
//! Inbound HTTP bodies are classified into a tagged union via
//! [`ClientMessage::classify`]; outbound handler traffic is modeled by
//! [`ServerMessage`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::JsonRpcError;

/// The JSON-RPC version. MUST be "2.0".
pub const JSONRPC_VERSION: &str = "2.0";

/// The latest supported MCP protocol version.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// All supported MCP protocol versions (newest first).
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Version assumed when a request omits the `MCP-Protocol-Version` header.
pub const DEFAULT_NEGOTIATED_PROTOCOL_VERSION: &str = "2025-03-26";

/// JSON-RPC request identifier: a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId::String(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        RequestId::String(value)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{}", s),
        }
    }
}

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Whether this is the `initialize` request that opens a session.
    pub fn is_initialize(&self) -> bool {
        self.method == methods::INITIALIZE
    }
}

/// JSON-RPC 2.0 notification (no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// JSON-RPC 2.0 response (success)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResultResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Value,
}

/// JSON-RPC 2.0 response (error)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorResponse {
    pub jsonrpc: String,
    // Serialized even when absent: error responses carry `"id": null`.
    #[serde(default)]
    pub id: Option<RequestId>,
    pub error: JsonRpcError,
}

/// JSON-RPC 2.0 response (either success or error)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponse {
    Result(JsonRpcResultResponse),
    Error(JsonRpcErrorResponse),
}

impl JsonRpcResponse {
    pub fn result(id: RequestId, result: Value) -> Self {
        Self::Result(JsonRpcResultResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        })
    }

    pub fn error(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self::Error(JsonRpcErrorResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error,
        })
    }

    /// The request this response correlates to, if any.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcResponse::Result(r) => Some(&r.id),
            JsonRpcResponse::Error(e) => e.id.as_ref(),
        }
    }
}

/// A response or error sent by the client, answering a server-initiated
/// request (e.g. sampling).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// A validated inbound JSON-RPC message, classified by shape.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// A request carrying an id; the client awaits a correlated response.
    Request(JsonRpcRequest),
    /// A notification; no response is produced.
    Notification(JsonRpcNotification),
    /// A response to a server-initiated request.
    Response(ClientResponse),
}

impl ClientMessage {
    /// Classify a parsed JSON value into a [`ClientMessage`].
    ///
    /// Arrays (JSON-RPC batches) are rejected by the caller before this
    /// point; this function validates the shape of a single message.
    pub fn classify(value: Value) -> Result<ClientMessage, JsonRpcError> {
        let Some(obj) = value.as_object() else {
            return Err(JsonRpcError::invalid_request(
                "Not a valid JSON-RPC message",
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(JsonRpcError::invalid_request(
                "Not a valid JSON-RPC message",
            ));
        }

        let has_method = obj.get("method").is_some_and(Value::is_string);
        let has_id = matches!(obj.get("id"), Some(id) if id.is_string() || id.is_i64());
        let has_result = obj.contains_key("result");
        let has_error = obj.contains_key("error");

        let classified = if has_method && has_id {
            serde_json::from_value(value).map(ClientMessage::Request)
        } else if has_method {
            serde_json::from_value(value).map(ClientMessage::Notification)
        } else if has_id && (has_result ^ has_error) {
            serde_json::from_value(value).map(ClientMessage::Response)
        } else {
            return Err(JsonRpcError::invalid_request(
                "Not a valid JSON-RPC message",
            ));
        };

        classified.map_err(|_| JsonRpcError::invalid_request("Not a valid JSON-RPC message"))
    }

    /// The method name, for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            ClientMessage::Request(r) => Some(&r.method),
            ClientMessage::Notification(n) => Some(&n.method),
            ClientMessage::Response(_) => None,
        }
    }

    pub fn is_initialize_request(&self) -> bool {
        matches!(self, ClientMessage::Request(r) if r.is_initialize())
    }

    pub fn is_initialized_notification(&self) -> bool {
        matches!(
            self,
            ClientMessage::Notification(n) if n.method == notifications::INITIALIZED
        )
    }
}

/// An outbound JSON-RPC message emitted by the message handler.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// A response (success or error) correlated to a client request.
    Response(JsonRpcResponse),
    /// A server-initiated notification.
    Notification(JsonRpcNotification),
    /// A server-initiated request (e.g. sampling), answered by a client POST.
    Request(JsonRpcRequest),
}

impl ServerMessage {
    /// The correlation id when this is a response; `None` otherwise.
    pub fn response_id(&self) -> Option<&RequestId> {
        match self {
            ServerMessage::Response(r) => r.id(),
            _ => None,
        }
    }
}

impl From<JsonRpcResponse> for ServerMessage {
    fn from(value: JsonRpcResponse) -> Self {
        ServerMessage::Response(value)
    }
}

impl From<JsonRpcNotification> for ServerMessage {
    fn from(value: JsonRpcNotification) -> Self {
        ServerMessage::Notification(value)
    }
}

/// MCP request methods handled by the server facade
pub mod methods {
    /// Opens a session and negotiates the protocol version
    pub const INITIALIZE: &str = "initialize";
    /// Liveness check, valid in every session phase
    pub const PING: &str = "ping";
    /// List registered tools
    pub const TOOLS_LIST: &str = "tools/list";
    /// Invoke a registered tool
    pub const TOOLS_CALL: &str = "tools/call";
}

/// MCP notification methods
pub mod notifications {
    /// Sent by client after receiving the initialize response
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Sent when a request is cancelled
    pub const CANCELLED: &str = "notifications/cancelled";
    /// Progress updates for long-running operations
    pub const PROGRESS: &str = "notifications/progress";
    /// Log message notification
    pub const MESSAGE: &str = "notifications/message";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_request() {
        let msg = ClientMessage::classify(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/list"
        }))
        .unwrap();
        assert!(matches!(msg, ClientMessage::Request(_)));
        assert_eq!(msg.method(), Some("tools/list"));
    }

    #[test]
    fn test_classify_notification() {
        let msg = ClientMessage::classify(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .unwrap();
        assert!(matches!(msg, ClientMessage::Notification(_)));
        assert!(msg.is_initialized_notification());
    }

    #[test]
    fn test_classify_client_response() {
        let msg = ClientMessage::classify(json!({
            "jsonrpc": "2.0",
            "id": "req-9",
            "result": {"ok": true}
        }))
        .unwrap();
        match msg {
            ClientMessage::Response(r) => {
                assert_eq!(r.id, RequestId::from("req-9"));
                assert!(r.result.is_some());
                assert!(r.error.is_none());
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_client_error_response() {
        let msg = ClientMessage::classify(json!({
            "jsonrpc": "2.0",
            "id": 4,
            "error": {"code": -1, "message": "user rejected"}
        }))
        .unwrap();
        assert!(matches!(msg, ClientMessage::Response(_)));
    }

    #[test]
    fn test_classify_rejects_wrong_version() {
        let err = ClientMessage::classify(json!({
            "jsonrpc": "1.0",
            "id": 1,
            "method": "ping"
        }))
        .unwrap_err();
        assert_eq!(err.code, -32600);
    }

    #[test]
    fn test_classify_rejects_result_and_error() {
        // A response must carry exactly one of result / error.
        let err = ClientMessage::classify(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {},
            "error": {"code": -1, "message": "x"}
        }))
        .unwrap_err();
        assert_eq!(err.code, -32600);
    }

    #[test]
    fn test_classify_rejects_non_object() {
        assert!(ClientMessage::classify(json!("ping")).is_err());
        assert!(ClientMessage::classify(json!(42)).is_err());
    }

    #[test]
    fn test_initialize_detection() {
        let req = JsonRpcRequest::new(1, "initialize");
        assert!(req.is_initialize());
        let msg = ClientMessage::Request(req);
        assert!(msg.is_initialize_request());
    }

    #[test]
    fn test_error_response_serializes_null_id() {
        let resp = JsonRpcResponse::error(None, JsonRpcError::parse_error("Parse error"));
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json["id"].is_null());
        assert_eq!(json["error"]["code"], -32700);
    }

    #[test]
    fn test_request_id_roundtrip() {
        let n: RequestId = serde_json::from_value(json!(7)).unwrap();
        assert_eq!(n, RequestId::Number(7));
        let s: RequestId = serde_json::from_value(json!("abc")).unwrap();
        assert_eq!(s, RequestId::String("abc".to_string()));
        assert_eq!(serde_json::to_value(&n).unwrap(), json!(7));
    }

    #[test]
    fn test_server_message_response_id() {
        let msg = ServerMessage::Response(JsonRpcResponse::result(RequestId::from(3), json!({})));
        assert_eq!(msg.response_id(), Some(&RequestId::Number(3)));

        let msg = ServerMessage::Notification(JsonRpcNotification::new("notifications/progress"));
        assert!(msg.response_id().is_none());
    }

    #[test]
    fn test_supported_versions() {
        assert!(SUPPORTED_PROTOCOL_VERSIONS.contains(&DEFAULT_NEGOTIATED_PROTOCOL_VERSION));
        assert_eq!(SUPPORTED_PROTOCOL_VERSIONS[0], LATEST_PROTOCOL_VERSION);
    }
}
