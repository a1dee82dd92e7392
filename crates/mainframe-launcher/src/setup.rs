//! Connecting the launcher to its daemon.

use std::sync::Arc;

use mainframe_config::{DaemonConfig, Environment, MainframeHome, RunStatus};
use mainframe_daemon::{BackendProvider, DaemonError, EnvironmentRegistry, MainframeClient};
use mainframe_rpc::PeerConfig;
use tracing::{info, warn};

use crate::error::LauncherResult;

/// The launcher's daemon client, plus the daemon it started itself if none
/// was running.
#[derive(Debug)]
pub struct DaemonConnection {
    env: Environment,
    client: MainframeClient,
    local: Option<EnvironmentRegistry>,
}

impl DaemonConnection {
    /// Connect to the environment's daemon and check its API version.
    ///
    /// If `daemon.toml` does not say the daemon is running, or its socket
    /// cannot be reached, a local daemon is started with `provider`'s
    /// backends and stopped again by [`shutdown`](Self::shutdown).
    ///
    /// # Errors
    ///
    /// Returns the bind, connect or version-mismatch failure.
    pub async fn setup(
        home: &MainframeHome,
        env: &Environment,
        provider: Arc<dyn BackendProvider>,
        config: PeerConfig,
    ) -> LauncherResult<Self> {
        let daemon_config = DaemonConfig::load(env)?;
        let socket_path = daemon_config.socket_path();

        if daemon_config.run_status() == RunStatus::Running {
            match MainframeClient::connect(&socket_path, config.clone()).await {
                Ok(client) => {
                    info!(env = %env.name(), "using running daemon");
                    return Ok(Self {
                        env: env.clone(),
                        client,
                        local: None,
                    });
                },
                Err(DaemonError::Connect { source, .. }) => {
                    warn!(env = %env.name(), error = %source, "daemon marked running but unreachable");
                },
                Err(e) => return Err(e.into()),
            }
        }

        let registry = EnvironmentRegistry::new(home.clone(), provider);
        registry.start(env.name()).await?;
        match MainframeClient::connect(&socket_path, config).await {
            Ok(client) => {
                info!(env = %env.name(), "started local daemon");
                Ok(Self {
                    env: env.clone(),
                    client,
                    local: Some(registry),
                })
            },
            Err(e) => {
                registry.stop_all().await;
                Err(e.into())
            },
        }
    }

    /// The daemon client.
    #[must_use]
    pub fn client(&self) -> &MainframeClient {
        &self.client
    }

    /// Whether the daemon was started by this launcher.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.local.is_some()
    }

    /// Close the client and stop the local daemon, if any.
    pub async fn shutdown(self) {
        self.client.close();
        if let Some(registry) = self.local {
            if let Err(e) = registry.stop(self.env.name()).await {
                warn!(env = %self.env.name(), error = %e, "failed to stop local daemon");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mainframe_config::EnvironmentType;
    use mainframe_daemon::{Backends, DaemonResult};

    fn provider() -> Arc<dyn BackendProvider> {
        Arc::new(|_: &Environment| -> DaemonResult<Backends> { Ok(Backends::unconfigured()) })
    }

    #[tokio::test]
    async fn starts_a_local_daemon_when_none_runs() {
        let dir = tempfile::tempdir().unwrap();
        let home = MainframeHome::from_path(dir.path());
        let env = Environment::create(&home, "dev", EnvironmentType::Development).unwrap();

        let conn = DaemonConnection::setup(&home, &env, provider(), PeerConfig::new("test"))
            .await
            .unwrap();
        assert!(conn.is_local());
        assert_eq!(DaemonConfig::load(&env).unwrap().run_status(), RunStatus::Running);

        conn.shutdown().await;
        assert_eq!(DaemonConfig::load(&env).unwrap().run_status(), RunStatus::Stopped);
    }

    #[tokio::test]
    async fn stale_running_status_falls_back_to_local() {
        let dir = tempfile::tempdir().unwrap();
        let home = MainframeHome::from_path(dir.path());
        let env = Environment::create(&home, "dev", EnvironmentType::Development).unwrap();
        DaemonConfig::load(&env)
            .unwrap()
            .set_run_status(RunStatus::Running)
            .unwrap();

        let conn = DaemonConnection::setup(&home, &env, provider(), PeerConfig::new("test"))
            .await
            .unwrap();
        assert!(conn.is_local());
        conn.shutdown().await;
    }

    #[tokio::test]
    async fn reuses_a_running_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let home = MainframeHome::from_path(dir.path());
        let env = Environment::create(&home, "dev", EnvironmentType::Development).unwrap();
        let daemon = EnvironmentRegistry::new(home.clone(), provider());
        daemon.start("dev").await.unwrap();

        let conn = DaemonConnection::setup(&home, &env, provider(), PeerConfig::new("test"))
            .await
            .unwrap();
        assert!(!conn.is_local());
        conn.shutdown().await;
        assert!(daemon.is_listening("dev"));
        daemon.stop_all().await;
    }
}
