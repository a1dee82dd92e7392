//! Mainframe Config - Environment, daemon and vault configuration.
//!
//! Everything lives under a single home directory (`$MAINFRAME_HOME`, or the
//! platform data directory when unset), split into named environments:
//!
//! ```text
//! <home>/
//! └── environments/
//!     └── v030-development/           (Environment)
//!         ├── environment.toml        (environment type)
//!         ├── daemon.toml             (run status + socket path override)
//!         ├── vaults.toml             (known vaults, default vault)
//!         ├── mainframe.ipc           (daemon socket)
//!         └── storage/                (storage root handed to backends)
//! ```
//!
//! Only the daemon run status, its socket path and the vault list are
//! persisted. Everything else is rebuilt on restart.
//!
//! # Example
//!
//! ```rust,no_run
//! use mainframe_config::{Environment, EnvironmentType, MainframeHome};
//!
//! let home = MainframeHome::resolve().unwrap();
//! let env = Environment::get_or_create(&home, "v030-development", EnvironmentType::Development)
//!     .unwrap();
//! println!("daemon socket: {}", env.socket_path().display());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod daemon;
pub mod environment;
pub mod error;
pub mod home;
pub mod vault;

mod file;

pub use daemon::{DaemonConfig, RunStatus};
pub use environment::{Environment, EnvironmentType, default_env_name};
pub use error::{ConfigError, ConfigResult};
pub use home::MainframeHome;
pub use vault::VaultConfig;
