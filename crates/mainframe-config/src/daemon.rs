//! Daemon run-status persistence.
//!
//! The launcher reads this to decide whether it has to start a local daemon
//! before connecting.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::error::ConfigResult;
use crate::file;

/// Whether the daemon for an environment is believed to be running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// A daemon is serving the environment's socket.
    Running,
    /// No daemon is running.
    #[default]
    Stopped,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct DaemonState {
    #[serde(default)]
    run_status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    socket_path: Option<PathBuf>,
}

/// Persisted daemon state for one environment (`daemon.toml`).
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    path: PathBuf,
    default_socket: PathBuf,
    state: DaemonState,
}

impl DaemonConfig {
    /// Load the daemon config for `env`. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(env: &Environment) -> ConfigResult<Self> {
        let path = env.daemon_config_path();
        let state = file::try_load(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            default_socket: env.socket_path(),
            state,
        })
    }

    /// Last persisted run status.
    #[must_use]
    pub fn run_status(&self) -> RunStatus {
        self.state.run_status
    }

    /// Persist a new run status.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn set_run_status(&mut self, status: RunStatus) -> ConfigResult<()> {
        self.state.run_status = status;
        file::save(&self.path, &self.state)
    }

    /// Socket the daemon listens on: the persisted override or the
    /// environment default.
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.state
            .socket_path
            .clone()
            .unwrap_or_else(|| self.default_socket.clone())
    }

    /// Persist a socket path override (`None` restores the default).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn set_socket_path(&mut self, path: Option<PathBuf>) -> ConfigResult<()> {
        self.state.socket_path = path;
        file::save(&self.path, &self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EnvironmentType, MainframeHome};

    fn env(dir: &tempfile::TempDir) -> Environment {
        let home = MainframeHome::from_path(dir.path());
        Environment::create(&home, "dev", EnvironmentType::Development).unwrap()
    }

    #[test]
    fn defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(&dir);
        let cfg = DaemonConfig::load(&env).unwrap();
        assert_eq!(cfg.run_status(), RunStatus::Stopped);
        assert_eq!(cfg.socket_path(), env.socket_path());
    }

    #[test]
    fn run_status_and_socket_persist() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(&dir);

        let mut cfg = DaemonConfig::load(&env).unwrap();
        cfg.set_run_status(RunStatus::Running).unwrap();
        cfg.set_socket_path(Some(dir.path().join("custom.sock"))).unwrap();

        let reloaded = DaemonConfig::load(&env).unwrap();
        assert_eq!(reloaded.run_status(), RunStatus::Running);
        assert_eq!(reloaded.socket_path(), dir.path().join("custom.sock"));

        let raw = std::fs::read_to_string(env.daemon_config_path()).unwrap();
        assert!(raw.contains("run_status = \"running\""));
    }
}
