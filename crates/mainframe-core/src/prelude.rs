//! Prelude module - commonly used types for convenient import.
//!
//! Use `use mainframe_core::prelude::*;` to import all essential types.

// Identifiers
pub use crate::{AppId, SessionId, SurfaceId, UserId, WindowId};

// Sessions
pub use crate::AppSession;

// Common types
pub use crate::{API_VERSION, Timestamp};
