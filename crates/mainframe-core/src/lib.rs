//! Mainframe Core - Foundation types shared by the daemon and the launcher.
//!
//! This crate provides:
//! - Identifier newtypes for apps, identities, sessions, windows and render surfaces
//! - The [`AppSession`] triple handed out by the daemon when an identity opens an app
//! - The RPC API version both sides of a connection must agree on

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod session;
pub mod types;

pub use session::AppSession;
pub use types::{AppId, SessionId, SurfaceId, Timestamp, UserId, WindowId};

/// Version number returned by `api_version`.
///
/// Clients compare it with the value reported by the daemon before issuing
/// any other call and abort the connection on mismatch.
pub const API_VERSION: f64 = 0.1;
