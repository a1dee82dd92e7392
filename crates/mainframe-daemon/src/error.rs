//! Daemon error types.

use std::io;
use std::path::PathBuf;

use mainframe_config::ConfigError;
use mainframe_rpc::RpcError;
use thiserror::Error;

/// Errors raised by the daemon server, its registry and its client.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The listening socket could not be bound.
    #[error("failed to bind {}: {source}", path.display())]
    ResourceBind {
        /// Socket path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The daemon socket could not be reached.
    #[error("failed to connect to {}: {source}", path.display())]
    Connect {
        /// Socket path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Environment or daemon configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An RPC call failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DaemonError {
    /// The RPC error, if this is one.
    #[must_use]
    pub fn as_rpc(&self) -> Option<&RpcError> {
        match self {
            Self::Rpc(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
