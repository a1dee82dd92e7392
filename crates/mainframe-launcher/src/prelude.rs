//! Prelude module - commonly used types for convenient import.
//!
//! Use `use mainframe_launcher::prelude::*;` to import all essential types.

// Errors
pub use crate::{LauncherError, LauncherResult};

// Contexts
pub use crate::{AppContext, ContextRegistry, DaemonConnection, LauncherContext};

// Enforcement
pub use crate::{PermissionEnforcer, PermissionPrompt, PromptDecision, RequestGuard, RequestVerdict};

// Collaborators
pub use crate::{AppWindow, ManifestLoader, RenderSurface, WindowFactory, WindowRequest};
