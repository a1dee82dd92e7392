//! A bidirectional JSON-RPC endpoint over any byte stream.
//!
//! Both ends of a connection are [`RpcPeer`]s: each can issue requests and
//! each serves the requests the other side sends through its
//! [`RpcService`]. Requests run concurrently and may complete in any order.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, warn};

use crate::error::{RpcError, RpcResult};
use crate::framing::{MAX_FRAME_LEN, read_frame, write_frame};
use crate::message::{Message, RequestId, SUBSCRIPTION_METHOD, UNSUBSCRIBE_METHOD};
use crate::service::{CallContext, ConnectionId, NoService, Reply, RpcService};
use crate::subscription::SubscriptionManager;

/// Subscription items queued for the writer before pumps wait.
const SUBSCRIPTION_BUFFER: usize = 256;

/// Default deadline for outbound requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for one peer.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Deadline applied by [`RpcPeer::request`].
    pub request_timeout: Duration,
    /// Cancelling this token closes the peer.
    pub cancel: CancellationToken,
    /// Name used in log lines.
    pub label: String,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cancel: CancellationToken::new(),
            label: "peer".to_owned(),
        }
    }
}

impl PeerConfig {
    /// Config with a log label.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Set the request deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Tie the peer's lifetime to `cancel`.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

enum Pending {
    Call(oneshot::Sender<RpcResult<Value>>),
    Subscribe(oneshot::Sender<RpcResult<Subscription>>),
}

#[derive(Default)]
struct State {
    closed: bool,
    pending: HashMap<RequestId, Pending>,
    routes: HashMap<String, mpsc::UnboundedSender<Value>>,
}

struct PeerInner {
    label: String,
    connection: ConnectionId,
    outbound: mpsc::UnboundedSender<Message>,
    items: mpsc::Sender<Message>,
    state: Mutex<State>,
    subscriptions: Arc<SubscriptionManager>,
    next_id: AtomicU64,
    request_timeout: Duration,
    cancel: CancellationToken,
}

/// One end of an RPC transport.
///
/// Cloning is cheap and every clone refers to the same connection. The
/// connection stays up until [`close`](Self::close) is called, the
/// configured cancel token fires, or the other side hangs up. Closing
/// rejects every awaiting request with [`RpcError::TransportClosed`], ends
/// every client-side [`Subscription`] and tears down every subscription
/// this side is serving.
#[derive(Clone)]
pub struct RpcPeer {
    inner: Arc<PeerInner>,
}

impl RpcPeer {
    /// Start serving `io` with `service`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<IO>(io: IO, service: Arc<dyn RpcService>, config: PeerConfig) -> Self
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        let (outbound, rx) = mpsc::unbounded_channel();
        let (items, items_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let inner = Arc::new(PeerInner {
            label: config.label,
            connection: ConnectionId::new(),
            outbound,
            items,
            state: Mutex::new(State::default()),
            subscriptions: Arc::new(SubscriptionManager::new()),
            next_id: AtomicU64::new(1),
            request_timeout: config.request_timeout,
            cancel: config.cancel,
        });

        let span = debug_span!("rpc_peer", peer = %inner.label, conn = %inner.connection);
        tokio::spawn(write_loop(writer, rx, items_rx, Arc::clone(&inner)).instrument(span.clone()));
        tokio::spawn(read_loop(reader, Arc::clone(&inner), service).instrument(span));

        debug!(peer = %inner.label, conn = %inner.connection, "transport opened");
        Self { inner }
    }

    /// Connect to a Unix socket as a pure client.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be reached.
    pub async fn connect_unix(path: impl AsRef<Path>, config: PeerConfig) -> std::io::Result<Self> {
        let stream = UnixStream::connect(path.as_ref()).await?;
        Ok(Self::spawn(stream, Arc::new(NoService), config))
    }

    /// Send a request and wait for its response with the configured
    /// deadline.
    ///
    /// # Errors
    ///
    /// Returns the remote error, [`RpcError::TransportClosed`] if the
    /// transport closes first, or [`RpcError::Timeout`].
    pub async fn request(&self, method: &str, params: Value) -> RpcResult<Value> {
        self.request_with_timeout(method, params, self.inner.request_timeout)
            .await
    }

    /// Send a request with an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> RpcResult<Value> {
        let (tx, rx) = oneshot::channel();
        let id = self.inner.register(Pending::Call(tx))?;
        self.inner.send_request(id.clone(), method, params)?;
        self.inner.await_response(&id, method, rx, timeout).await?
    }

    /// Call a streaming method and return the client side of the
    /// subscription.
    ///
    /// # Errors
    ///
    /// Same as [`request`](Self::request). A non-string result is reported
    /// as [`RpcError::Internal`].
    pub async fn subscribe(&self, method: &str, params: Value) -> RpcResult<Subscription> {
        let (tx, rx) = oneshot::channel();
        let id = self.inner.register(Pending::Subscribe(tx))?;
        self.inner.send_request(id.clone(), method, params)?;
        self.inner
            .await_response(&id, method, rx, self.inner.request_timeout)
            .await?
    }

    /// Send a notification.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::TransportClosed`] if the transport is closed.
    pub fn notify(&self, method: &str, params: Value) -> RpcResult<()> {
        if self.is_closed() {
            return Err(RpcError::TransportClosed);
        }
        let sent = self.inner.send(Message::Notification {
            method: method.to_owned(),
            params,
        });
        if sent { Ok(()) } else { Err(RpcError::TransportClosed) }
    }

    /// Close the transport. Idempotent.
    pub fn close(&self) {
        self.inner.shutdown();
    }

    /// Whether the transport has closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Wait until the transport closes.
    pub async fn closed(&self) {
        self.inner.cancel.cancelled().await;
    }

    /// Identifier of this connection.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.inner.connection
    }

    /// Subscriptions this side is serving.
    #[must_use]
    pub fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.inner.subscriptions
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

impl fmt::Debug for RpcPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcPeer")
            .field("label", &self.inner.label)
            .field("connection", &self.inner.connection)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl PeerInner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("RpcPeer state lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn send(&self, msg: Message) -> bool {
        self.outbound.send(msg).is_ok()
    }

    fn register(&self, pending: Pending) -> RpcResult<RequestId> {
        let mut state = self.lock();
        if state.closed {
            return Err(RpcError::TransportClosed);
        }
        let id = self.next_request_id();
        state.pending.insert(id.clone(), pending);
        Ok(id)
    }

    fn forget(&self, id: &RequestId) {
        self.lock().pending.remove(id);
    }

    fn send_request(&self, id: RequestId, method: &str, params: Value) -> RpcResult<()> {
        let msg = Message::Request {
            id: id.clone(),
            method: method.to_owned(),
            params,
        };
        if self.send(msg) {
            Ok(())
        } else {
            self.forget(&id);
            Err(RpcError::TransportClosed)
        }
    }

    async fn await_response<T>(
        &self,
        id: &RequestId,
        method: &str,
        rx: oneshot::Receiver<T>,
        timeout: Duration,
    ) -> RpcResult<T> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(RpcError::TransportClosed),
            Err(_) => {
                self.forget(id);
                debug!(peer = %self.label, %id, method, "request timed out");
                Err(RpcError::Timeout(format!(
                    "{method} after {}ms",
                    timeout.as_millis()
                )))
            },
        }
    }

    fn handle_frame(self: &Arc<Self>, bytes: &[u8], service: &Arc<dyn RpcService>) {
        let msg = match Message::decode(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(peer = %self.label, error = %e, "dropping undecodable message");
                self.send(Message::err(None, &e));
                return;
            },
        };

        match msg {
            Message::Request { id, method, params } => {
                self.spawn_call(id, method, params, Arc::clone(service));
            },
            Message::Notification { method, params } if method == SUBSCRIPTION_METHOD => {
                self.route_item(params);
            },
            Message::Notification { method, params } if method == UNSUBSCRIBE_METHOD => {
                if let Some(handle) = params.get("id").and_then(Value::as_str) {
                    self.subscriptions.unsubscribe(handle);
                }
            },
            Message::Notification { method, params } => {
                self.spawn_notify(method, params, Arc::clone(service));
            },
            Message::Response { id: Some(id), result } => {
                self.complete(&id, result.map_err(RpcError::from_wire));
            },
            Message::Response { id: None, result } => {
                warn!(peer = %self.label, ?result, "remote rejected a message");
            },
        }
    }

    fn spawn_call(
        self: &Arc<Self>,
        id: RequestId,
        method: String,
        params: Value,
        service: Arc<dyn RpcService>,
    ) {
        let inner = Arc::clone(self);
        let token = self.cancel.child_token();
        let span = debug_span!("rpc_call", %id, method = %method);
        tokio::spawn(
            async move {
                let ctx = CallContext::new(inner.connection, Arc::clone(&inner.subscriptions));
                let outcome = tokio::select! {
                    () = token.cancelled() => return,
                    outcome = service.call(&ctx, &method, params) => outcome,
                };
                match outcome {
                    Ok(Reply::Value(value)) => {
                        inner.send(Message::ok(id, value));
                    },
                    Ok(Reply::Stream(stream)) => inner.start_subscription(id, stream),
                    Err(e) => {
                        debug!(error = %e, "request failed");
                        inner.send(Message::err(Some(id), &e));
                    },
                }
            }
            .instrument(span),
        );
    }

    fn start_subscription(&self, id: RequestId, stream: BoxStream<'static, Value>) {
        let handle = SubscriptionManager::new_handle();
        // The response must be queued before the first item.
        self.send(Message::ok(id, Value::String(handle.clone())));
        if self
            .subscriptions
            .attach(handle.clone(), stream, self.items.clone())
        {
            debug!(subscription = %handle, "subscription opened");
        }
    }

    fn spawn_notify(self: &Arc<Self>, method: String, params: Value, service: Arc<dyn RpcService>) {
        let inner = Arc::clone(self);
        let token = self.cancel.child_token();
        tokio::spawn(async move {
            let ctx = CallContext::new(inner.connection, Arc::clone(&inner.subscriptions));
            tokio::select! {
                () = token.cancelled() => {},
                () = service.notify(&ctx, &method, params) => {},
            }
        });
    }

    fn complete(self: &Arc<Self>, id: &RequestId, result: RpcResult<Value>) {
        let pending = self.lock().pending.remove(id);
        match pending {
            None => debug!(peer = %self.label, %id, "response for unknown or abandoned request"),
            Some(Pending::Call(tx)) => {
                let _ = tx.send(result);
            },
            Some(Pending::Subscribe(tx)) => {
                let sub = result.and_then(|value| match value {
                    Value::String(handle) => self.open_route(handle),
                    other => Err(RpcError::Internal(format!(
                        "invalid subscription handle: {other}"
                    ))),
                });
                // A dropped receiver drops the subscription, which unsubscribes.
                let _ = tx.send(sub);
            },
        }
    }

    fn open_route(self: &Arc<Self>, handle: String) -> RpcResult<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.lock();
            if state.closed {
                return Err(RpcError::TransportClosed);
            }
            state.routes.insert(handle.clone(), tx);
        }
        Ok(Subscription {
            handle,
            rx,
            peer: Arc::downgrade(self),
            active: true,
        })
    }

    fn drop_route(&self, handle: &str) {
        self.lock().routes.remove(handle);
    }

    fn route_item(&self, params: Value) {
        let Value::Object(mut obj) = params else {
            warn!(peer = %self.label, "malformed subscription notification");
            return;
        };
        let (Some(Value::String(handle)), Some(item)) =
            (obj.remove("subscription"), obj.remove("result"))
        else {
            warn!(peer = %self.label, "malformed subscription notification");
            return;
        };

        let mut state = self.lock();
        let delivered = state.routes.get(&handle).map(|tx| tx.send(item).is_ok());
        match delivered {
            Some(true) => {},
            Some(false) => {
                state.routes.remove(&handle);
            },
            None => debug!(peer = %self.label, subscription = %handle, "item for unknown subscription"),
        }
    }

    /// Encode for the wire. A message over the frame limit is dropped; if it
    /// answers a request, an error response goes out instead, and if it is
    /// our own request, the caller gets the error.
    fn encode_outbound(self: &Arc<Self>, msg: Message) -> Option<Vec<u8>> {
        let bytes = match msg.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode outbound message");
                return None;
            },
        };
        if bytes.len() <= MAX_FRAME_LEN {
            return Some(bytes);
        }

        warn!(peer = %self.label, len = bytes.len(), "refusing oversized message");
        let error = RpcError::Internal(format!(
            "message of {} bytes exceeds the {MAX_FRAME_LEN} byte frame limit",
            bytes.len()
        ));
        match msg {
            Message::Response { id: Some(id), .. } => Message::err(Some(id), &error).encode().ok(),
            Message::Request { id, .. } => {
                self.complete(&id, Err(error));
                None
            },
            Message::Response { id: None, .. } | Message::Notification { .. } => None,
        }
    }

    fn shutdown(&self) {
        let (pending, routes) = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            (
                mem::take(&mut state.pending),
                mem::take(&mut state.routes),
            )
        };

        for (_, waiter) in pending {
            match waiter {
                Pending::Call(tx) => {
                    let _ = tx.send(Err(RpcError::TransportClosed));
                },
                Pending::Subscribe(tx) => {
                    let _ = tx.send(Err(RpcError::TransportClosed));
                },
            }
        }
        drop(routes);
        self.subscriptions.close_all();
        self.cancel.cancel();
        debug!(peer = %self.label, conn = %self.connection, "transport closed");
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    mut items: mpsc::Receiver<Message>,
    inner: Arc<PeerInner>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        // Responses go first so a subscription handle precedes its items.
        let msg = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            msg = outbound.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
            Some(msg) = items.recv() => msg,
        };
        let Some(bytes) = inner.encode_outbound(msg) else {
            continue;
        };
        if let Err(e) = write_frame(&mut writer, &bytes).await {
            debug!(error = %e, "transport write failed");
            inner.cancel.cancel();
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop<R>(mut reader: R, inner: Arc<PeerInner>, service: Arc<dyn RpcService>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            () = inner.cancel.cancelled() => break,
            frame = read_frame(&mut reader) => frame,
        };
        match frame {
            Ok(Some(bytes)) => inner.handle_frame(&bytes, &service),
            Ok(None) => {
                debug!("remote hung up");
                break;
            },
            Err(e) => {
                warn!(error = %e, "transport read failed");
                break;
            },
        }
    }
    inner.shutdown();
}

/// Client side of a subscription.
///
/// Yields items until the remote stream ends, the subscription is
/// unsubscribed or the transport closes. Dropping it unsubscribes.
pub struct Subscription {
    handle: String,
    rx: mpsc::UnboundedReceiver<Value>,
    peer: Weak<PeerInner>,
    active: bool,
}

impl Subscription {
    /// The opaque handle assigned by the remote side.
    #[must_use]
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Next item, or `None` once the subscription is over.
    pub async fn next(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Unsubscribe and wait for the remote side to confirm.
    ///
    /// A closed transport counts as success.
    ///
    /// # Errors
    ///
    /// Returns the remote error if the unsubscribe call fails.
    pub async fn unsubscribe(mut self) -> RpcResult<()> {
        self.active = false;
        let Some(inner) = self.peer.upgrade() else {
            return Ok(());
        };
        inner.drop_route(&self.handle);
        let peer = RpcPeer { inner };
        match peer
            .request(UNSUBSCRIBE_METHOD, json!({ "id": self.handle }))
            .await
        {
            Ok(_) | Err(RpcError::TransportClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Turn into a stream of items. Dropping the stream unsubscribes.
    #[must_use]
    pub fn into_stream(self) -> BoxStream<'static, Value> {
        futures::stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|item| (item, sub))
        })
        .boxed()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let Some(inner) = self.peer.upgrade() else {
            return;
        };
        inner.drop_route(&self.handle);
        if !inner.lock().closed {
            inner.send(Message::Notification {
                method: UNSUBSCRIBE_METHOD.to_owned(),
                params: json!({ "id": self.handle }),
            });
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
