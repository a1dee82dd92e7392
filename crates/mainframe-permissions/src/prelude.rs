//! Prelude module - commonly used types for convenient import.
//!
//! Use `use mainframe_permissions::prelude::*;` to import all essential types.

pub use crate::{PermissionError, PermissionResult};

pub use crate::{Capability, Evaluation, PermissionCheck};

pub use crate::{DecisionCache, PermissionGrants, PermissionSettings, PermissionUpdate};
