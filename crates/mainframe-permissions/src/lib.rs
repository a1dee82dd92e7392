//! Mainframe Permissions - Capability grants for sandboxed apps.
//!
//! Apps declare the capabilities they need in their manifest
//! ([`PermissionRequirements`]); the identity running the app answers with
//! [`PermissionGrants`]. Evaluation fails closed:
//!
//! - coarse capabilities (chain-write) need a stored `true`
//! - fine-grained capabilities (network egress) consult per-destination
//!   allow and deny lists, and a deny always wins
//! - a destination on neither list is [`Evaluation::Undecided`], which the
//!   caller must resolve (by asking the user) or treat as a denial; only
//!   destinations the manifest declares are worth asking about
//!
//! # Example
//!
//! ```
//! use mainframe_permissions::{Evaluation, PermissionCheck, PermissionSettings};
//!
//! let mut settings = PermissionSettings::default();
//! let check = PermissionCheck::network_request("https://api.example.com/v1").unwrap();
//! assert_eq!(settings.evaluate(&check), Evaluation::Undecided);
//!
//! settings.record_decision(&check, true);
//! assert_eq!(settings.evaluate(&check), Evaluation::Granted);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod cache;
mod capability;
mod error;
mod settings;

pub use cache::DecisionCache;
pub use capability::{Capability, PermissionCheck};
pub use error::{PermissionError, PermissionResult};
pub use settings::{
    Evaluation, PermissionDeclarations, PermissionGrants, PermissionRequirements,
    PermissionSettings, PermissionUpdate, WebRequestGrants,
};
