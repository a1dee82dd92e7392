//! Prelude module - commonly used types for convenient import.
//!
//! Use `use mainframe_daemon::prelude::*;` to import all essential types.

// Errors
pub use crate::{DaemonError, DaemonResult};

// Serving
pub use crate::{BackendProvider, Backends, Dispatcher, EnvironmentRegistry, ServerHandler};

// Client
pub use crate::{MainframeClient, Method};
