//! Launcher error types.

use mainframe_config::ConfigError;
use mainframe_core::WindowId;
use mainframe_daemon::DaemonError;
use mainframe_rpc::RpcError;
use thiserror::Error;

/// Errors raised while launching, tearing down or serving app contexts.
#[derive(Debug, Error)]
pub enum LauncherError {
    /// Talking to the daemon failed.
    #[error(transparent)]
    Daemon(#[from] DaemonError),

    /// An RPC call failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Environment or vault configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The windowing layer refused an operation.
    #[error("window error: {0}")]
    Window(String),

    /// A manifest could not be loaded.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// No context is bound to the window.
    #[error("no app context for {0}")]
    UnknownWindow(WindowId),
}

impl LauncherError {
    /// The error as it should be reported to an RPC caller.
    #[must_use]
    pub fn to_rpc(&self) -> RpcError {
        match self {
            Self::Rpc(e) => e.clone(),
            Self::Daemon(e) => e
                .as_rpc()
                .cloned()
                .unwrap_or_else(|| RpcError::internal(e)),
            Self::Manifest(msg) => RpcError::InvalidParams(msg.clone()),
            other => RpcError::internal(other),
        }
    }
}

impl From<LauncherError> for RpcError {
    fn from(err: LauncherError) -> Self {
        err.to_rpc()
    }
}

/// Result type for launcher operations.
pub type LauncherResult<T> = Result<T, LauncherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_rpc_errors_keep_their_kind() {
        let err = LauncherError::from(DaemonError::from(RpcError::SessionNotFound));
        assert_eq!(err.to_rpc(), RpcError::SessionNotFound);
    }

    #[test]
    fn other_errors_become_internal() {
        let err = LauncherError::Window("gone".into());
        assert!(matches!(err.to_rpc(), RpcError::Internal(msg) if msg.contains("gone")));
    }
}
