//! JSON-RPC 2.0 messages.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{ErrorObject, RpcError, RpcResult};

/// Protocol version carried in every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name of subscription notifications.
///
/// Params are `{"subscription": <handle>, "result": <item>}`.
pub const SUBSCRIPTION_METHOD: &str = "mainframe_subscription";

/// Method that tears down a subscription. Params are `{"id": <handle>}`.
pub const UNSUBSCRIBE_METHOD: &str = "sub_unsubscribe";

/// Request correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id (what this crate generates).
    Number(u64),
    /// String id (accepted from peers).
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// One decoded JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A call expecting a response.
    Request {
        /// Correlation id.
        id: RequestId,
        /// Method name.
        method: String,
        /// Parameters (`null` when absent).
        params: Value,
    },
    /// A one-way message.
    Notification {
        /// Method name.
        method: String,
        /// Parameters (`null` when absent).
        params: Value,
    },
    /// The outcome of a request. `id` is `None` only for errors about
    /// messages that could not be decoded.
    Response {
        /// Correlation id of the request.
        id: Option<RequestId>,
        /// Result value or error object.
        result: Result<Value, ErrorObject>,
    },
}

impl Message {
    /// Build a successful response.
    #[must_use]
    pub fn ok(id: RequestId, value: Value) -> Self {
        Self::Response {
            id: Some(id),
            result: Ok(value),
        }
    }

    /// Build an error response.
    #[must_use]
    pub fn err(id: Option<RequestId>, error: &RpcError) -> Self {
        Self::Response {
            id,
            result: Err(error.to_wire()),
        }
    }

    /// Build a subscription notification for `handle`.
    #[must_use]
    pub fn subscription_item(handle: &str, item: Value) -> Self {
        Self::Notification {
            method: SUBSCRIPTION_METHOD.to_owned(),
            params: json!({ "subscription": handle, "result": item }),
        }
    }

    /// Serialize to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if a contained value cannot be serialized.
    pub fn encode(&self) -> RpcResult<Vec<u8>> {
        let value = match self {
            Self::Request { id, method, params } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "method": method,
                "params": params,
            }),
            Self::Notification { method, params } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "method": method,
                "params": params,
            }),
            Self::Response { id, result: Ok(v) } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "result": v,
            }),
            Self::Response { id, result: Err(e) } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "error": e,
            }),
        };
        serde_json::to_vec(&value).map_err(RpcError::internal)
    }

    /// Decode JSON bytes into a message.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Parse`] for malformed JSON and
    /// [`RpcError::InvalidRequest`] for JSON that is not a JSON-RPC 2.0
    /// envelope.
    pub fn decode(bytes: &[u8]) -> RpcResult<Self> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| RpcError::Parse(e.to_string()))?;
        let Value::Object(mut obj) = value else {
            return Err(RpcError::InvalidRequest("expected an object".into()));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(RpcError::InvalidRequest("missing jsonrpc \"2.0\"".into()));
        }

        let id = take_id(&mut obj)?;

        if let Some(method) = obj.remove("method") {
            let Value::String(method) = method else {
                return Err(RpcError::InvalidRequest("method must be a string".into()));
            };
            let params = obj.remove("params").unwrap_or(Value::Null);
            return Ok(match id {
                Some(id) => Self::Request { id, method, params },
                None => Self::Notification { method, params },
            });
        }

        if let Some(error) = obj.remove("error") {
            let error: ErrorObject = serde_json::from_value(error)
                .map_err(|e| RpcError::InvalidRequest(e.to_string()))?;
            return Ok(Self::Response {
                id,
                result: Err(error),
            });
        }

        match (id, obj.remove("result")) {
            (Some(id), Some(result)) => Ok(Self::ok(id, result)),
            _ => Err(RpcError::InvalidRequest(
                "expected method, result or error".into(),
            )),
        }
    }
}

fn take_id(obj: &mut Map<String, Value>) -> RpcResult<Option<RequestId>> {
    match obj.remove("id") {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => serde_json::from_value(raw)
            .map(Some)
            .map_err(|_| RpcError::InvalidRequest("id must be a number or string".into())),
    }
}
