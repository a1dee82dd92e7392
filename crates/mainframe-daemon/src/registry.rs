//! One server per named environment.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use mainframe_config::{Environment, MainframeHome};
use mainframe_rpc::DEFAULT_REQUEST_TIMEOUT;
use tracing::{info, warn};

use crate::backend::BackendProvider;
use crate::dispatch::Dispatcher;
use crate::error::DaemonResult;
use crate::server::ServerHandler;

/// Lazily creates and keeps exactly one [`ServerHandler`] per environment
/// name.
pub struct EnvironmentRegistry {
    home: MainframeHome,
    provider: Arc<dyn BackendProvider>,
    servers: Mutex<HashMap<String, Arc<ServerHandler>>>,
    request_timeout: Duration,
}

impl EnvironmentRegistry {
    /// Registry for environments under `home`, with backends from
    /// `provider`.
    #[must_use]
    pub fn new(home: MainframeHome, provider: Arc<dyn BackendProvider>) -> Self {
        Self {
            home,
            provider,
            servers: Mutex::new(HashMap::new()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Request deadline for servers created from now on.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<ServerHandler>>> {
        self.servers.lock().unwrap_or_else(|e| {
            warn!("EnvironmentRegistry lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn get_or_create(&self, env_name: &str) -> DaemonResult<Arc<ServerHandler>> {
        let mut servers = self.lock();
        if let Some(server) = servers.get(env_name) {
            return Ok(Arc::clone(server));
        }

        let env = Environment::load(&self.home, env_name)?;
        let backends = self.provider.backends(&env)?;
        let server = Arc::new(
            ServerHandler::new(env, Arc::new(Dispatcher::new(backends)))
                .with_request_timeout(self.request_timeout),
        );
        servers.insert(env_name.to_owned(), Arc::clone(&server));
        info!(env = %env_name, "created server handler");
        Ok(server)
    }

    /// Start (creating if needed) the server for `env_name`. No-op if it is
    /// already listening.
    ///
    /// # Errors
    ///
    /// Returns a config error if the environment does not exist, or
    /// [`crate::DaemonError::ResourceBind`] if the socket cannot be bound.
    pub async fn start(&self, env_name: &str) -> DaemonResult<Arc<ServerHandler>> {
        let server = self.get_or_create(env_name)?;
        server.start().await?;
        Ok(server)
    }

    /// Stop the server for `env_name`. No-op for unknown environments.
    ///
    /// # Errors
    ///
    /// Propagates [`ServerHandler::stop`] errors.
    pub async fn stop(&self, env_name: &str) -> DaemonResult<()> {
        let server = self.lock().get(env_name).cloned();
        match server {
            Some(server) => server.stop().await,
            None => Ok(()),
        }
    }

    /// Whether the server for `env_name` is listening. `false` for unknown
    /// environments.
    #[must_use]
    pub fn is_listening(&self, env_name: &str) -> bool {
        self.lock()
            .get(env_name)
            .is_some_and(|server| server.is_listening())
    }

    /// The server for `env_name`, if one was created.
    #[must_use]
    pub fn get(&self, env_name: &str) -> Option<Arc<ServerHandler>> {
        self.lock().get(env_name).cloned()
    }

    /// Stop every server.
    pub async fn stop_all(&self) {
        let servers: Vec<_> = self.lock().values().cloned().collect();
        for server in servers {
            if let Err(e) = server.stop().await {
                warn!(env = %server.environment().name(), error = %e, "failed to stop server");
            }
        }
    }
}

impl std::fmt::Debug for EnvironmentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentRegistry")
            .field("home", &self.home)
            .field("servers", &self.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backends;
    use crate::error::DaemonError;
    use mainframe_config::{DaemonConfig, EnvironmentType, RunStatus};

    fn registry(dir: &tempfile::TempDir) -> EnvironmentRegistry {
        Environment::create(&MainframeHome::from_path(dir.path()), "dev", EnvironmentType::Development).unwrap();
        open_registry(dir)
    }

    fn open_registry(dir: &tempfile::TempDir) -> EnvironmentRegistry {
        let provider = |_: &Environment| -> DaemonResult<Backends> { Ok(Backends::unconfigured()) };
        EnvironmentRegistry::new(MainframeHome::from_path(dir.path()), Arc::new(provider))
    }

    #[tokio::test]
    async fn unknown_environments_are_inert() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        assert!(!registry.is_listening("nope"));
        registry.stop("nope").await.unwrap();
        assert!(matches!(
            registry.start("nope").await,
            Err(DaemonError::Config(_))
        ));
    }

    #[tokio::test]
    async fn start_twice_keeps_one_server() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);

        let first = registry.start("dev").await.unwrap();
        assert!(registry.is_listening("dev"));
        let second = registry.start("dev").await.unwrap();
        assert!(registry.is_listening("dev"));
        assert!(Arc::ptr_eq(&first, &second));

        let socket = first.socket_path().await.unwrap();
        assert!(socket.exists());

        registry.stop("dev").await.unwrap();
        registry.stop("dev").await.unwrap();
        assert!(!registry.is_listening("dev"));
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn run_status_follows_the_server() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);

        let server = registry.start("dev").await.unwrap();
        let env = server.environment().clone();
        assert_eq!(DaemonConfig::load(&env).unwrap().run_status(), RunStatus::Running);

        registry.stop_all().await;
        assert_eq!(DaemonConfig::load(&env).unwrap().run_status(), RunStatus::Stopped);
    }

    #[tokio::test]
    async fn stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        let env = Environment::load(&MainframeHome::from_path(dir.path()), "dev").unwrap();
        std::fs::create_dir_all(env.root()).unwrap();
        std::fs::write(env.socket_path(), b"stale").unwrap();

        registry.start("dev").await.unwrap();
        assert!(registry.is_listening("dev"));
        registry.stop("dev").await.unwrap();
    }

    #[tokio::test]
    async fn a_live_socket_is_not_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let first = registry(&dir);
        let server = first.start("dev").await.unwrap();
        let socket = server.socket_path().await.unwrap();

        let second = open_registry(&dir);
        match second.start("dev").await {
            Err(DaemonError::ResourceBind { source, .. }) => {
                assert_eq!(source.kind(), std::io::ErrorKind::AddrInUse);
            },
            other => panic!("expected ResourceBind, got {other:?}"),
        }
        assert!(!second.is_listening("dev"));
        assert!(first.is_listening("dev"));
        assert!(socket.exists());
        assert!(std::os::unix::net::UnixStream::connect(&socket).is_ok());

        second.stop("dev").await.unwrap();
        let env = server.environment().clone();
        assert_eq!(DaemonConfig::load(&env).unwrap().run_status(), RunStatus::Running);
        assert!(socket.exists());
        first.stop("dev").await.unwrap();
    }

    #[tokio::test]
    async fn bind_failure_surfaces_as_resource_bind() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        let env = Environment::load(&MainframeHome::from_path(dir.path()), "dev").unwrap();
        let mut cfg = DaemonConfig::load(&env).unwrap();
        // A directory where the socket should go cannot be unlinked as a file.
        let blocked = dir.path().join("blocked");
        std::fs::create_dir_all(blocked.join("inner")).unwrap();
        cfg.set_socket_path(Some(blocked)).unwrap();

        assert!(matches!(
            registry.start("dev").await,
            Err(DaemonError::ResourceBind { .. })
        ));
        assert!(!registry.is_listening("dev"));
    }
}
