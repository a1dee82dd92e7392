//! Mainframe Daemon - environment-scoped capability server.
//!
//! One [`ServerHandler`] per named environment listens on that
//! environment's Unix socket. Every connection gets a [`Dispatcher`] that
//! routes the closed [`Method`] table to session bookkeeping, permission
//! checks and the pluggable capability [`Backends`].
//!
//! [`MainframeClient`] is the typed client used by the launcher and tools.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod api;
pub mod backend;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod method;
pub mod registry;
pub mod server;
pub mod session;

pub use api::{
    AppOpenParams, AppOpenResult, CheckPermissionParams, PermissionStatus, SessionParams,
    SetPermissionParams,
};
pub use backend::{
    AppBackend, AppOpenData, BackendProvider, Backends, BlockchainBackend, IdentityBackend,
    PubSubBackend, StorageBackend, VaultBackend,
};
pub use client::MainframeClient;
pub use dispatch::Dispatcher;
pub use error::{DaemonError, DaemonResult};
pub use method::Method;
pub use registry::EnvironmentRegistry;
pub use server::ServerHandler;
pub use session::{SessionEntry, SessionRegistry};
