//! `mainframe-daemon` - serves one environment on its Unix socket until
//! interrupted.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mainframe_config::{Environment, EnvironmentType, MainframeHome, default_env_name};
use mainframe_daemon::{BackendProvider, Backends, DaemonResult, EnvironmentRegistry};
use mainframe_telemetry::{LogConfig, LogFormat};
use tracing::info;

/// Mainframe daemon - environment-scoped capability server.
#[derive(Parser)]
#[command(name = "mainframe-daemon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Environment to serve (defaults to `$MAINFRAME_ENV` or the
    /// built-in name for the environment type).
    #[arg(short, long)]
    env: Option<String>,

    /// Use the production environment type when creating the environment.
    #[arg(long)]
    production: bool,

    /// Also write logs under the environment's `logs/` directory.
    #[arg(long)]
    log_to_file: bool,

    /// Enable verbose output, including span open/close events.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_type = if args.production {
        EnvironmentType::Production
    } else {
        EnvironmentType::Development
    };
    let env_name = args.env.unwrap_or_else(|| default_env_name(env_type));

    let home = MainframeHome::resolve().context("failed to resolve Mainframe home")?;
    let env = Environment::get_or_create(&home, &env_name, env_type)
        .with_context(|| format!("failed to open environment {env_name}"))?;

    let level = if args.verbose { "debug" } else { "info" };
    let mut log_config = LogConfig::new(level).with_format(LogFormat::Compact);
    if args.verbose {
        log_config = log_config.with_span_events();
    }
    if args.log_to_file {
        log_config = log_config.for_environment(&env, "daemon");
    }
    if let Err(e) = mainframe_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let provider: Arc<dyn BackendProvider> =
        Arc::new(|_: &Environment| -> DaemonResult<Backends> { Ok(Backends::unconfigured()) });
    let registry = EnvironmentRegistry::new(home, provider);

    let server = registry
        .start(&env_name)
        .await
        .with_context(|| format!("failed to start environment {env_name}"))?;
    if let Some(path) = server.socket_path().await {
        info!(env = %env_name, path = %path.display(), "mainframe daemon ready");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    registry.stop_all().await;
    Ok(())
}
