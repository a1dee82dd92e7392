//! RPC error types and their wire representation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// JSON-RPC error codes used on the wire.
pub mod error_codes {
    /// Malformed JSON.
    pub const PARSE_ERROR: i64 = -32700;
    /// Valid JSON that is not a JSON-RPC message.
    pub const INVALID_REQUEST: i64 = -32600;
    /// Unknown method name.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Parameters did not match the method's shape.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Handler failure.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Unknown `sessID`.
    pub const SESSION_NOT_FOUND: i64 = -32001;
    /// Capability check failed.
    pub const PERMISSION_DENIED: i64 = -32002;
    /// The transport closed before the request completed.
    pub const TRANSPORT_CLOSED: i64 = -32003;
    /// The request exceeded its deadline.
    pub const TIMEOUT: i64 = -32004;
    /// Client and daemon disagree on the API version.
    pub const VERSION_MISMATCH: i64 = -32005;
}

/// Errors produced by the transport or returned by a remote handler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    /// The payload was not valid JSON.
    #[error("parse error: {0}")]
    Parse(String),

    /// The payload was JSON but not a JSON-RPC message.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No handler for the method.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Parameters could not be decoded.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// A handler failed.
    #[error("internal error: {0}")]
    Internal(String),

    /// The `sessID` does not name an open session.
    #[error("session not found")]
    SessionNotFound,

    /// The caller lacks the capability. Never carries detail.
    #[error("permission denied")]
    PermissionDenied,

    /// The transport closed before a response arrived.
    #[error("transport closed")]
    TransportClosed,

    /// No response within the request deadline.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The peer speaks a different API version.
    #[error("API version mismatch: {0}")]
    VersionMismatch(String),

    /// An error code this crate does not know.
    #[error("remote error {code}: {message}")]
    Remote {
        /// Error code sent by the peer.
        code: i64,
        /// Error message sent by the peer.
        message: String,
    },
}

impl RpcError {
    /// Wire error code for this error.
    #[must_use]
    pub fn code(&self) -> i64 {
        use error_codes as c;
        match self {
            Self::Parse(_) => c::PARSE_ERROR,
            Self::InvalidRequest(_) => c::INVALID_REQUEST,
            Self::MethodNotFound(_) => c::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => c::INVALID_PARAMS,
            Self::Internal(_) => c::INTERNAL_ERROR,
            Self::SessionNotFound => c::SESSION_NOT_FOUND,
            Self::PermissionDenied => c::PERMISSION_DENIED,
            Self::TransportClosed => c::TRANSPORT_CLOSED,
            Self::Timeout(_) => c::TIMEOUT,
            Self::VersionMismatch(_) => c::VERSION_MISMATCH,
            Self::Remote { code, .. } => *code,
        }
    }

    /// Shorthand for [`RpcError::InvalidParams`] from any displayable error.
    pub fn invalid_params(err: impl std::fmt::Display) -> Self {
        Self::InvalidParams(err.to_string())
    }

    /// Shorthand for [`RpcError::Internal`] from any displayable error.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    /// Convert into the `{code, message}` wire object.
    #[must_use]
    pub fn to_wire(&self) -> ErrorObject {
        ErrorObject {
            code: self.code(),
            message: self.to_string(),
            data: None,
        }
    }

    /// Rebuild a typed error from a wire object.
    #[must_use]
    pub fn from_wire(obj: ErrorObject) -> Self {
        use error_codes as c;
        let ErrorObject { code, message, .. } = obj;
        let detail = |prefix: &str| {
            message
                .strip_prefix(prefix)
                .unwrap_or(&message)
                .to_owned()
        };
        match code {
            c::PARSE_ERROR => Self::Parse(detail("parse error: ")),
            c::INVALID_REQUEST => Self::InvalidRequest(detail("invalid request: ")),
            c::METHOD_NOT_FOUND => Self::MethodNotFound(detail("method not found: ")),
            c::INVALID_PARAMS => Self::InvalidParams(detail("invalid params: ")),
            c::INTERNAL_ERROR => Self::Internal(detail("internal error: ")),
            c::SESSION_NOT_FOUND => Self::SessionNotFound,
            c::PERMISSION_DENIED => Self::PermissionDenied,
            c::TRANSPORT_CLOSED => Self::TransportClosed,
            c::TIMEOUT => Self::Timeout(detail("request timed out: ")),
            c::VERSION_MISMATCH => Self::VersionMismatch(detail("API version mismatch: ")),
            _ => Self::Remote { code, message },
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidParams(err.to_string())
    }
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Result type for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;
