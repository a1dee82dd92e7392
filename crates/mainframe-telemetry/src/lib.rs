//! Mainframe Telemetry - Logging for the Mainframe daemon and launcher.
//!
//! This crate provides:
//! - Configurable logging setup with multiple formats and targets
//! - Rolling file output via `tracing-appender`
//! - Per-environment log directories (with the `config` feature)
//!
//! # Example
//!
//! ```rust,no_run
//! use mainframe_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), mainframe_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("mainframe_rpc=debug");
//!
//! setup_logging(&config)?;
//! tracing::info!("daemon starting");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LOG_ENV_VAR, LogConfig, LogFormat, LogTarget, setup_logging,
};
