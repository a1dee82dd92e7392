//! Small TOML document helpers shared by the persisted configs.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Maximum size of a config file we are willing to parse (1 MiB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Read and deserialize a TOML document. A missing file yields `Ok(None)`.
pub(crate) fn try_load<T: DeserializeOwned>(path: &Path) -> ConfigResult<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    // Check size after reading to avoid TOCTOU between stat and read.
    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {} byte limit",
                content.len(),
                MAX_CONFIG_FILE_SIZE
            ),
        });
    }

    let value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(Some(value))
}

/// Serialize `value` and write it to `path`, creating parent directories.
///
/// The document is written to a sibling temp file first and renamed into
/// place so readers never observe a half-written file.
pub(crate) fn save<T: Serialize>(path: &Path, value: &T) -> ConfigResult<()> {
    let write_err = |source| ConfigError::WriteError {
        path: path.display().to_string(),
        source,
    };

    let body = toml::to_string_pretty(value).map_err(|e| ConfigError::SerializeError {
        path: path.display().to_string(),
        source: e,
    })?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, body).map_err(write_err)?;
    std::fs::rename(&tmp, path).map_err(write_err)?;
    debug!(path = %path.display(), "saved config file");
    Ok(())
}
