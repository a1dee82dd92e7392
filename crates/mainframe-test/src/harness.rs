//! A daemon running in a throwaway environment.

use std::path::PathBuf;
use std::sync::{Arc, Once};

use mainframe_config::{Environment, EnvironmentType, MainframeHome};
use mainframe_daemon::{
    BackendProvider, Backends, DaemonResult, EnvironmentRegistry, MainframeClient, ServerHandler,
};
use mainframe_rpc::PeerConfig;
use tempfile::TempDir;

use crate::backends::InMemoryBackends;

/// Name of the environment [`TestDaemon`] serves.
pub const TEST_ENV: &str = "test";

static LOGGING: Once = Once::new();

/// Route `tracing` output to the test writer. Controlled by `RUST_LOG`.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A daemon listening in a temporary Mainframe home, with in-memory
/// backends.
pub struct TestDaemon {
    /// Keeps the temporary home alive.
    pub dir: TempDir,
    /// The temporary home.
    pub home: MainframeHome,
    /// The served environment.
    pub env: Environment,
    /// The daemon's environment registry.
    pub registry: EnvironmentRegistry,
    /// Backends every dispatcher uses.
    pub backends: Arc<InMemoryBackends>,
    server: Arc<ServerHandler>,
}

impl TestDaemon {
    /// Create the environment and start serving it.
    ///
    /// # Panics
    ///
    /// Panics if the temporary home or the socket cannot be set up.
    #[allow(clippy::unwrap_used)]
    pub async fn start() -> Self {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let home = MainframeHome::from_path(dir.path());
        let env = Environment::create(&home, TEST_ENV, EnvironmentType::Development).unwrap();

        let backends = InMemoryBackends::new();
        let shared = Arc::clone(&backends);
        let provider: Arc<dyn BackendProvider> =
            Arc::new(move |_: &Environment| -> DaemonResult<Backends> { Ok(shared.backends()) });
        let registry = EnvironmentRegistry::new(home.clone(), provider);
        let server = registry.start(TEST_ENV).await.unwrap();

        Self {
            dir,
            home,
            env,
            registry,
            backends,
            server,
        }
    }

    /// The running server.
    #[must_use]
    pub fn server(&self) -> &Arc<ServerHandler> {
        &self.server
    }

    /// Where the daemon listens.
    ///
    /// # Panics
    ///
    /// Panics if the daemon was stopped.
    #[allow(clippy::expect_used)]
    pub async fn socket_path(&self) -> PathBuf {
        self.server
            .socket_path()
            .await
            .expect("test daemon is not listening")
    }

    /// Connect a fresh client.
    ///
    /// # Panics
    ///
    /// Panics if the connection or version check fails.
    #[allow(clippy::unwrap_used)]
    pub async fn client(&self) -> MainframeClient {
        MainframeClient::connect(self.socket_path().await, PeerConfig::new("test-client"))
            .await
            .unwrap()
    }

    /// Stop serving.
    pub async fn stop(&self) {
        self.registry.stop_all().await;
    }
}

impl std::fmt::Debug for TestDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestDaemon")
            .field("home", &self.home)
            .field("env", &self.env.name())
            .finish_non_exhaustive()
    }
}
