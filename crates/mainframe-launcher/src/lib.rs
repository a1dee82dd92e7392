//! Mainframe Launcher - app contexts and outbound request enforcement.
//!
//! The launcher owns one [`AppContext`] per running `(app, identity)` pair
//! in a [`ContextRegistry`]. Each context binds the daemon session, the
//! app's window, a trusted RPC channel and the permission state. Render
//! surfaces attach to a context after the fact and route their outbound
//! requests through a [`RequestGuard`] backed by the
//! [`PermissionEnforcer`].
//!
//! Windows, surfaces, prompts and manifest loading are provided by the
//! embedding application through the traits in [`window`], [`prompt`] and
//! [`manifest`].

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod channel;
pub mod context;
pub mod enforcer;
pub mod error;
pub mod launcher;
pub mod manifest;
pub mod prompt;
pub mod registry;
pub mod setup;
pub mod window;

pub use context::AppContext;
pub use enforcer::{DEFAULT_PROMPT_TIMEOUT, PermissionEnforcer, RequestGuard, RequestVerdict};
pub use error::{LauncherError, LauncherResult};
pub use launcher::{LauncherContext, VaultsData};
pub use manifest::ManifestLoader;
pub use prompt::{PermissionPrompt, PermissionRequest, PromptDecision};
pub use registry::ContextRegistry;
pub use setup::DaemonConnection;
pub use window::{AppWindow, RenderSurface, WindowFactory, WindowRequest};
