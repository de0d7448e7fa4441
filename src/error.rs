//! Error types for streamable-mcp
//!
//! ## JSON-RPC Error Codes
//!
//! Standard JSON-RPC 2.0 error codes are defined in the specification:
//! <https://www.jsonrpc.org/specification#error_object>
//!
//! | Code   | Message          | Meaning                                  |
//! |--------|------------------|------------------------------------------|
//! | -32700 | Parse error      | Invalid JSON was received                |
//! | -32600 | Invalid Request  | The JSON sent is not a valid Request     |
//! | -32601 | Method not found | The method does not exist / is not available |
//! | -32602 | Invalid params   | Invalid method parameter(s)              |
//! | -32603 | Internal error   | Internal JSON-RPC error                  |
//!
//! ## Transport Error Codes
//!
//! The transport uses the server error range (-32000 to -32099):
//!
//! | Code   | Name            | Meaning                                  |
//! |--------|-----------------|------------------------------------------|
//! | -32000 | TransportError  | Generic transport or session error       |
//! | -32001 | RequestTimeout  | Request exceeded the configured timeout  |
//! | -32002 | Forbidden       | Access forbidden (insufficient scope)    |

use serde::{Deserialize, Serialize};

/// Type-erased error type used for middleware composition.
///
/// This is the standard error type in the tower ecosystem, used by
/// [`tower`](https://docs.rs/tower), [`tower-http`](https://docs.rs/tower-http),
/// and other tower-compatible crates.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Standard JSON-RPC error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    /// Invalid JSON was received
    ParseError = -32700,
    /// The JSON sent is not a valid Request object
    InvalidRequest = -32600,
    /// The method does not exist / is not available
    MethodNotFound = -32601,
    /// Invalid method parameter(s)
    InvalidParams = -32602,
    /// Internal JSON-RPC error
    InternalError = -32603,
}

/// Transport-specific error codes (in the -32000 to -32099 range)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum TransportErrorCode {
    /// Generic transport or session error
    TransportError = -32000,
    /// Request exceeded the configured timeout
    RequestTimeout = -32001,
    /// Access forbidden (insufficient scope or authorization)
    Forbidden = -32002,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TransportErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("Method not found: {}", method),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a transport-specific error
    pub fn transport(code: TransportErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Generic transport or session error (-32000)
    pub fn transport_error(message: impl Into<String>) -> Self {
        Self::transport(TransportErrorCode::TransportError, message)
    }

    /// Request timed out (-32001)
    pub fn request_timeout() -> Self {
        Self::transport(TransportErrorCode::RequestTimeout, "Request timed out")
    }

    /// Session terminated mid-flight (-32000)
    pub fn session_terminated() -> Self {
        Self::transport(TransportErrorCode::TransportError, "Session terminated")
    }

    /// Session not found or expired (-32000)
    pub fn session_not_found() -> Self {
        Self::transport(TransportErrorCode::TransportError, "Session not found")
    }

    /// Access forbidden (-32002)
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::transport(TransportErrorCode::Forbidden, message)
    }
}

/// streamable-mcp error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("JSON-RPC error: {0:?}")]
    JsonRpc(JsonRpcError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Handler error: {0}")]
    Handler(String),
}

impl Error {
    /// Create a handler error from any `Display` type.
    ///
    /// Useful for converting tool failures in a `map_err` chain:
    ///
    /// ```rust
    /// # use streamable_mcp::Error;
    /// # fn example() -> Result<(), Error> {
    /// let result: Result<(), std::io::Error> = Err(std::io::Error::other("oops"));
    /// result.map_err(Error::handler_from)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn handler_from<E: std::fmt::Display>(err: E) -> Self {
        Error::Handler(err.to_string())
    }
}

impl From<JsonRpcError> for Error {
    fn from(err: JsonRpcError) -> Self {
        Error::JsonRpc(err)
    }
}

/// Result type alias for streamable-mcp
pub type Result<T> = std::result::Result<T, Error>;
