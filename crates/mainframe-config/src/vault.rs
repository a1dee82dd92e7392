//! Vault list persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::error::ConfigResult;
use crate::file;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct VaultState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_vault: Option<PathBuf>,
    /// Vault path -> label.
    #[serde(default)]
    vaults: BTreeMap<String, String>,
}

/// Vaults known to the launcher for one environment (`vaults.toml`).
///
/// The vault contents themselves are owned by the daemon's vault backend;
/// this only records where they live and which one opens by default.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    path: PathBuf,
    state: VaultState,
}

impl VaultConfig {
    /// Load the vault list for `env`. A missing file yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(env: &Environment) -> ConfigResult<Self> {
        let path = env.vault_config_path();
        let state = file::try_load(&path)?.unwrap_or_default();
        Ok(Self { path, state })
    }

    /// Default vault, if one was set.
    #[must_use]
    pub fn default_vault(&self) -> Option<&Path> {
        self.state.default_vault.as_deref()
    }

    /// Known vaults as `(path, label)` pairs, ordered by path.
    pub fn vaults(&self) -> impl Iterator<Item = (&str, &str)> {
        self.state
            .vaults
            .iter()
            .map(|(p, l)| (p.as_str(), l.as_str()))
    }

    /// Label recorded for `path`.
    #[must_use]
    pub fn label(&self, path: &Path) -> Option<&str> {
        self.state
            .vaults
            .get(path.to_string_lossy().as_ref())
            .map(String::as_str)
    }

    /// Record (or relabel) a vault and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn set_label(&mut self, path: &Path, label: impl Into<String>) -> ConfigResult<()> {
        self.state
            .vaults
            .insert(path.to_string_lossy().into_owned(), label.into());
        file::save(&self.path, &self.state)
    }

    /// Mark `path` as the default vault and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn set_default(&mut self, path: &Path) -> ConfigResult<()> {
        self.state.default_vault = Some(path.to_path_buf());
        file::save(&self.path, &self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EnvironmentType, MainframeHome};

    #[test]
    fn records_vaults_and_default() {
        let dir = tempfile::tempdir().unwrap();
        let home = MainframeHome::from_path(dir.path());
        let env = Environment::create(&home, "dev", EnvironmentType::Development).unwrap();

        let mut cfg = VaultConfig::load(&env).unwrap();
        assert!(cfg.default_vault().is_none());
        assert_eq!(cfg.vaults().count(), 0);

        let vault = dir.path().join("vaults").join("main");
        cfg.set_label(&vault, "Main").unwrap();
        cfg.set_default(&vault).unwrap();

        let reloaded = VaultConfig::load(&env).unwrap();
        assert_eq!(reloaded.default_vault(), Some(vault.as_path()));
        assert_eq!(reloaded.label(&vault), Some("Main"));
        assert_eq!(reloaded.vaults().count(), 1);
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let home = MainframeHome::from_path(dir.path());
        let env = Environment::create(&home, "dev", EnvironmentType::Development).unwrap();
        let junk = format!("# {}\n", "x".repeat(2 * 1024 * 1024));
        std::fs::write(env.vault_config_path(), junk).unwrap();

        assert!(matches!(
            VaultConfig::load(&env),
            Err(crate::ConfigError::ValidationError { .. })
        ));
    }
}
