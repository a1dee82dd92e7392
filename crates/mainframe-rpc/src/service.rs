//! The handler seam between a transport and the code that serves it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{RpcError, RpcResult};
use crate::subscription::SubscriptionManager;

/// Identifier of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// What a handler produced for a request.
pub enum Reply {
    /// A single result value.
    Value(Value),
    /// A subscription. The transport assigns a handle, answers with it and
    /// then forwards every stream item as a notification.
    Stream(BoxStream<'static, Value>),
}

impl Reply {
    /// Serialize any value into a [`Reply::Value`].
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Internal`] if serialization fails.
    pub fn json<T: Serialize>(value: &T) -> RpcResult<Self> {
        serde_json::to_value(value)
            .map(Self::Value)
            .map_err(RpcError::internal)
    }

    /// The empty result (`null`).
    #[must_use]
    pub fn null() -> Self {
        Self::Value(Value::Null)
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Per-call information handed to an [`RpcService`].
#[derive(Debug, Clone)]
pub struct CallContext {
    connection: ConnectionId,
    subscriptions: Arc<SubscriptionManager>,
}

impl CallContext {
    pub(crate) fn new(connection: ConnectionId, subscriptions: Arc<SubscriptionManager>) -> Self {
        Self {
            connection,
            subscriptions,
        }
    }

    /// Connection the call arrived on.
    #[must_use]
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Subscriptions opened on this connection.
    #[must_use]
    pub fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.subscriptions
    }
}

/// Serves the requests arriving on a transport.
#[async_trait]
pub trait RpcService: Send + Sync {
    /// Handle one request. Errors are sent back as typed error responses.
    async fn call(&self, ctx: &CallContext, method: &str, params: Value) -> RpcResult<Reply>;

    /// Handle one notification. The default ignores it.
    async fn notify(&self, ctx: &CallContext, method: &str, _params: Value) {
        debug!(conn = %ctx.connection(), method, "ignoring notification");
    }
}

/// A service that serves nothing, for pure clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoService;

#[async_trait]
impl RpcService for NoService {
    async fn call(&self, _ctx: &CallContext, method: &str, _params: Value) -> RpcResult<Reply> {
        Err(RpcError::MethodNotFound(method.to_owned()))
    }
}
