//! Named environments and their derived paths.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::file;
use crate::home::MainframeHome;

/// Environment variable selecting the default environment name.
pub const ENV_NAME_VAR: &str = "MAINFRAME_ENV";

/// Default name of the development environment.
pub const DEFAULT_DEVELOPMENT_ENV: &str = "v030-development";
/// Default name of the production environment.
pub const DEFAULT_PRODUCTION_ENV: &str = "v030-production";

const ENVIRONMENT_FILE: &str = "environment.toml";
const SOCKET_FILE: &str = "mainframe.ipc";
const STORAGE_DIR: &str = "storage";
const DAEMON_FILE: &str = "daemon.toml";
const VAULTS_FILE: &str = "vaults.toml";

/// Whether an environment is used for development or production.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentType {
    /// Development environment.
    #[default]
    Development,
    /// Production environment.
    Production,
}

impl EnvironmentType {
    /// Default environment name for this type.
    #[must_use]
    pub fn default_name(self) -> &'static str {
        match self {
            Self::Development => DEFAULT_DEVELOPMENT_ENV,
            Self::Production => DEFAULT_PRODUCTION_ENV,
        }
    }
}

impl fmt::Display for EnvironmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

/// Environment name from `$MAINFRAME_ENV`, or the default for `env_type`.
#[must_use]
pub fn default_env_name(env_type: EnvironmentType) -> String {
    std::env::var(ENV_NAME_VAR)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| env_type.default_name().to_owned())
}

#[derive(Debug, Serialize, Deserialize)]
struct EnvironmentFile {
    #[serde(rename = "type")]
    env_type: EnvironmentType,
}

/// A named environment.
///
/// Loaded once and immutable afterwards. All paths the daemon and the
/// launcher touch are derived from its root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    name: String,
    env_type: EnvironmentType,
    root: PathBuf,
}

impl Environment {
    /// Load an existing environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EnvironmentNotFound`] if the environment has
    /// never been created, or a read/parse error for a damaged
    /// `environment.toml`.
    pub fn load(home: &MainframeHome, name: &str) -> ConfigResult<Self> {
        validate_name(name)?;
        let root = home.environments_dir().join(name);
        let doc: EnvironmentFile = file::try_load(&root.join(ENVIRONMENT_FILE))?
            .ok_or_else(|| ConfigError::EnvironmentNotFound(name.to_owned()))?;
        Ok(Self {
            name: name.to_owned(),
            env_type: doc.env_type,
            root,
        })
    }

    /// Create a new environment, overwriting its type if it already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the environment file
    /// cannot be written.
    pub fn create(
        home: &MainframeHome,
        name: &str,
        env_type: EnvironmentType,
    ) -> ConfigResult<Self> {
        validate_name(name)?;
        let root = home.environments_dir().join(name);
        file::save(&root.join(ENVIRONMENT_FILE), &EnvironmentFile { env_type })?;
        info!(env = %name, env_type = %env_type, "created environment");
        Ok(Self {
            name: name.to_owned(),
            env_type,
            root,
        })
    }

    /// Load `name`, creating it with `env_type` if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment cannot be read or created.
    pub fn get_or_create(
        home: &MainframeHome,
        name: &str,
        env_type: EnvironmentType,
    ) -> ConfigResult<Self> {
        match Self::load(home, name) {
            Err(ConfigError::EnvironmentNotFound(_)) => Self::create(home, name, env_type),
            other => other,
        }
    }

    /// The environment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The environment type.
    #[must_use]
    pub fn env_type(&self) -> EnvironmentType {
        self.env_type
    }

    /// The environment's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Default path of the daemon's Unix socket.
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.root.join(SOCKET_FILE)
    }

    /// Root directory handed to storage-backed capability handlers.
    #[must_use]
    pub fn storage_root(&self) -> PathBuf {
        self.root.join(STORAGE_DIR)
    }

    /// Path of the persisted daemon run status.
    #[must_use]
    pub fn daemon_config_path(&self) -> PathBuf {
        self.root.join(DAEMON_FILE)
    }

    /// Path of the persisted vault list.
    #[must_use]
    pub fn vault_config_path(&self) -> PathBuf {
        self.root.join(VAULTS_FILE)
    }
}

fn validate_name(name: &str) -> ConfigResult<()> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidEnvironmentName(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_environment_fails() {
        let dir = tempfile::tempdir().unwrap();
        let home = MainframeHome::from_path(dir.path());
        let err = Environment::load(&home, "nope").unwrap_err();
        assert!(matches!(err, ConfigError::EnvironmentNotFound(n) if n == "nope"));
    }

    #[test]
    fn get_or_create_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let home = MainframeHome::from_path(dir.path());

        let created =
            Environment::get_or_create(&home, "dev", EnvironmentType::Production).unwrap();
        assert_eq!(created.env_type(), EnvironmentType::Production);

        let loaded = Environment::load(&home, "dev").unwrap();
        assert_eq!(loaded, created);

        // Existing environments keep their stored type.
        let again =
            Environment::get_or_create(&home, "dev", EnvironmentType::Development).unwrap();
        assert_eq!(again.env_type(), EnvironmentType::Production);
    }

    #[test]
    fn derived_paths_live_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let home = MainframeHome::from_path(dir.path());
        let env = Environment::create(&home, "dev", EnvironmentType::Development).unwrap();

        let root = dir.path().join("environments").join("dev");
        assert_eq!(env.root(), root);
        assert_eq!(env.socket_path(), root.join("mainframe.ipc"));
        assert_eq!(env.storage_root(), root.join("storage"));
        assert_eq!(env.daemon_config_path(), root.join("daemon.toml"));
        assert_eq!(env.vault_config_path(), root.join("vaults.toml"));
    }

    #[test]
    fn rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let home = MainframeHome::from_path(dir.path());
        for bad in ["", ".", "..", "a/b"] {
            assert!(matches!(
                Environment::create(&home, bad, EnvironmentType::Development),
                Err(ConfigError::InvalidEnvironmentName(_))
            ));
        }
    }

    #[test]
    fn default_names() {
        assert_eq!(EnvironmentType::Development.default_name(), "v030-development");
        assert_eq!(EnvironmentType::Production.default_name(), "v030-production");
    }
}
