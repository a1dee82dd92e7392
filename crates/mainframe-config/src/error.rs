use std::io;

use thiserror::Error;

/// Errors that can occur while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("failed to read config file at {path}: {source}")]
    ReadError {
        /// Path to the file that could not be read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Failed to write a configuration file.
    #[error("failed to write config file at {path}: {source}")]
    WriteError {
        /// Path to the file that could not be written.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML configuration.
    #[error("failed to parse config file at {path}: {source}")]
    ParseError {
        /// Path to the file that failed to parse.
        path: String,
        /// Underlying TOML parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Failed to serialize a configuration document.
    #[error("failed to serialize config for {path}: {source}")]
    SerializeError {
        /// Path the document was destined for.
        path: String,
        /// Underlying TOML serialization error.
        #[source]
        source: toml::ser::Error,
    },

    /// A configuration value failed validation.
    #[error("validation error in {field}: {message}")]
    ValidationError {
        /// Field or file that failed validation.
        field: String,
        /// Error description.
        message: String,
    },

    /// The requested environment has never been created.
    #[error("environment not found: {0}")]
    EnvironmentNotFound(String),

    /// The environment name cannot be used as a directory name.
    #[error("invalid environment name: {0:?}")]
    InvalidEnvironmentName(String),

    /// `MAINFRAME_HOME` is set but unusable.
    #[error("environment variable '{var_name}': {message}")]
    EnvError {
        /// Name of the environment variable.
        var_name: String,
        /// Error description.
        message: String,
    },

    /// No home directory could be determined.
    #[error("could not determine home directory")]
    NoHomeDir,
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
