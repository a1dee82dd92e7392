//! Per-environment socket server.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use mainframe_config::{DaemonConfig, Environment, RunStatus};
use mainframe_rpc::{ConnectionId, DEFAULT_REQUEST_TIMEOUT, PeerConfig, RpcPeer, RpcService};
use tokio::net::UnixListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::{DaemonError, DaemonResult};

struct Running {
    socket_path: PathBuf,
    cancel: CancellationToken,
    accept: JoinHandle<()>,
}

/// Owns one environment's listening socket and dispatch table.
///
/// `start` and `stop` are idempotent. Stopping closes the listener and
/// every connected transport, which rejects their in-flight requests and
/// tears down their subscriptions.
pub struct ServerHandler {
    env: Environment,
    dispatcher: Arc<Dispatcher>,
    connections: Arc<DashMap<ConnectionId, RpcPeer>>,
    listening: AtomicBool,
    state: Mutex<Option<Running>>,
    request_timeout: Duration,
}

impl ServerHandler {
    /// Create a stopped server for `env`.
    #[must_use]
    pub fn new(env: Environment, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            env,
            dispatcher,
            connections: Arc::new(DashMap::new()),
            listening: AtomicBool::new(false),
            state: Mutex::new(None),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Deadline for requests the daemon issues on its connections.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The environment served.
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// The dispatch table.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Whether the socket is bound and accepting.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Number of connected clients.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Socket path while listening.
    pub async fn socket_path(&self) -> Option<PathBuf> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|running| running.socket_path.clone())
    }

    /// Bind the socket and start accepting. No-op if already listening.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::ResourceBind`] if the socket cannot be bound,
    /// or a config error if `daemon.toml` is unreadable.
    pub async fn start(&self) -> DaemonResult<()> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            debug!(env = %self.env.name(), "server already listening");
            return Ok(());
        }

        let mut daemon_config = DaemonConfig::load(&self.env)?;
        let socket_path = daemon_config.socket_path();
        let listener = bind(&socket_path)?;

        let cancel = CancellationToken::new();
        let accept = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.connections),
            cancel.clone(),
            format!("daemon:{}", self.env.name()),
            self.request_timeout,
        ));

        *state = Some(Running {
            socket_path: socket_path.clone(),
            cancel,
            accept,
        });
        self.listening.store(true, Ordering::SeqCst);

        if let Err(e) = daemon_config.set_run_status(RunStatus::Running) {
            warn!(env = %self.env.name(), error = %e, "failed to persist run status");
        }
        info!(env = %self.env.name(), path = %socket_path.display(), "server listening");
        Ok(())
    }

    /// Close the socket and every connection. No-op if not listening.
    ///
    /// # Errors
    ///
    /// Currently infallible; the result is kept for parity with `start`.
    pub async fn stop(&self) -> DaemonResult<()> {
        let mut state = self.state.lock().await;
        let Some(running) = state.take() else {
            debug!(env = %self.env.name(), "server not listening");
            return Ok(());
        };

        running.cancel.cancel();
        if let Err(e) = running.accept.await {
            warn!(env = %self.env.name(), error = %e, "accept loop ended abnormally");
        }

        let peers: Vec<RpcPeer> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for peer in &peers {
            peer.close();
        }
        self.connections.clear();

        match std::fs::remove_file(&running.socket_path) {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => warn!(path = %running.socket_path.display(), error = %e, "failed to remove socket"),
        }
        self.listening.store(false, Ordering::SeqCst);

        match DaemonConfig::load(&self.env) {
            Ok(mut cfg) => {
                if let Err(e) = cfg.set_run_status(RunStatus::Stopped) {
                    warn!(env = %self.env.name(), error = %e, "failed to persist run status");
                }
            },
            Err(e) => warn!(env = %self.env.name(), error = %e, "failed to load daemon config"),
        }
        info!(env = %self.env.name(), closed = peers.len(), "server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for ServerHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandler")
            .field("env", &self.env.name())
            .field("listening", &self.is_listening())
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}

fn bind(path: &Path) -> DaemonResult<UnixListener> {
    let bind_err = |source| DaemonError::ResourceBind {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(bind_err)?;
    }
    match std::os::unix::net::UnixStream::connect(path) {
        Ok(_) => {
            return Err(bind_err(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                "another server is listening on this socket",
            )));
        },
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::NotFound
            ) => {},
        Err(e) => return Err(bind_err(e)),
    }
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => return Err(bind_err(e)),
    }
    UnixListener::bind(path).map_err(bind_err)
}

async fn accept_loop(
    listener: UnixListener,
    dispatcher: Arc<Dispatcher>,
    connections: Arc<DashMap<ConnectionId, RpcPeer>>,
    cancel: CancellationToken,
    label: String,
    request_timeout: Duration,
) {
    loop {
        let accepted = tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let stream = match accepted {
            Ok((stream, _addr)) => stream,
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                continue;
            },
        };

        let config = PeerConfig::new(label.clone())
            .with_timeout(request_timeout)
            .with_cancel(cancel.child_token());
        let service: Arc<dyn RpcService> = dispatcher.clone();
        let peer = RpcPeer::spawn(stream, service, config);
        let id = peer.connection_id();
        connections.insert(id, peer.clone());
        debug!(conn = %id, "client connected");

        let connections = Arc::clone(&connections);
        tokio::spawn(async move {
            peer.closed().await;
            connections.remove(&id);
            debug!(conn = %id, "client disconnected");
        });
    }
}
