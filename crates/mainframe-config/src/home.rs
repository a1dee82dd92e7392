//! Home directory resolution.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};

/// Environment variable overriding the Mainframe home directory.
pub const HOME_ENV_VAR: &str = "MAINFRAME_HOME";

/// Root directory holding every Mainframe environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainframeHome {
    root: PathBuf,
}

impl MainframeHome {
    /// Resolve the home directory.
    ///
    /// Uses `$MAINFRAME_HOME` when set, otherwise `<data dir>/mainframe`
    /// where the data dir comes from the platform conventions (for example
    /// `~/.local/share` on Linux).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EnvError`] if `$MAINFRAME_HOME` is set to a
    /// relative path, or [`ConfigError::NoHomeDir`] if no platform data
    /// directory can be determined.
    pub fn resolve() -> ConfigResult<Self> {
        if let Ok(raw) = std::env::var(HOME_ENV_VAR) {
            let root = PathBuf::from(&raw);
            if !root.is_absolute() {
                return Err(ConfigError::EnvError {
                    var_name: HOME_ENV_VAR.to_owned(),
                    message: format!("expected an absolute path, got {raw:?}"),
                });
            }
            return Ok(Self { root });
        }

        let base = directories::BaseDirs::new().ok_or(ConfigError::NoHomeDir)?;
        Ok(Self {
            root: base.data_dir().join("mainframe"),
        })
    }

    /// Use an explicit root directory (tests, embedded setups).
    #[must_use]
    pub fn from_path(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory containing all environments.
    #[must_use]
    pub fn environments_dir(&self) -> PathBuf {
        self.root.join("environments")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_path_layout() {
        let home = MainframeHome::from_path("/tmp/mf");
        assert_eq!(home.root(), Path::new("/tmp/mf"));
        assert_eq!(home.environments_dir(), PathBuf::from("/tmp/mf/environments"));
    }
}
