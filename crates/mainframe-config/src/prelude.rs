//! Prelude module - commonly used types for convenient import.
//!
//! Use `use mainframe_config::prelude::*;` to import all essential types.

pub use crate::{ConfigError, ConfigResult};

pub use crate::{Environment, EnvironmentType, MainframeHome, default_env_name};

pub use crate::{DaemonConfig, RunStatus, VaultConfig};
