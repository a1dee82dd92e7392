//! Permission error types.

use thiserror::Error;

/// Errors raised while building permission checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    /// The capability key is not one this system knows.
    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    /// The request target has no usable destination host.
    #[error("invalid destination: {0}")]
    InvalidDestination(String),
}

/// Result type for permission operations.
pub type PermissionResult<T> = Result<T, PermissionError>;
