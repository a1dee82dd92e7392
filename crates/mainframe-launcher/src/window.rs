//! Windowing collaborators.
//!
//! The launcher never builds windows or render surfaces itself; the
//! windowing layer implements these traits and reports lifecycle events
//! back through the [`ContextRegistry`](crate::ContextRegistry).

use std::sync::Arc;

use async_trait::async_trait;
use mainframe_core::{AppId, AppSession, SurfaceId, UserId, WindowId};
use mainframe_rpc::RpcPeer;

use crate::enforcer::RequestGuard;
use crate::error::LauncherResult;

/// What the windowing layer needs to build an app window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRequest {
    /// App being launched.
    pub app_id: AppId,
    /// Identity launching it.
    pub user_id: UserId,
    /// Window title, usually the manifest name.
    pub title: String,
    /// Storage partition scoped to the app and identity.
    pub partition: String,
}

/// Builds app windows.
#[async_trait]
pub trait WindowFactory: Send + Sync {
    /// Create a hidden window for an app.
    async fn create_app_window(&self, request: WindowRequest) -> LauncherResult<Arc<dyn AppWindow>>;
}

/// A top-level app window.
#[async_trait]
pub trait AppWindow: Send + Sync {
    /// Stable identity of the window.
    fn id(&self) -> WindowId;

    /// Whether the window is minimized.
    fn is_minimized(&self) -> bool;

    /// Restore from minimized.
    fn restore(&self);

    /// Make the window visible.
    fn show(&self);

    /// Give the window focus.
    fn focus(&self);

    /// Hand the window its session, the app end of the trusted channel and
    /// the storage partition to load the app into.
    async fn start_app(
        &self,
        session: &AppSession,
        channel: RpcPeer,
        partition: &str,
    ) -> LauncherResult<()>;

    /// Wipe everything stored under `partition`.
    async fn clear_storage(&self, partition: &str) -> LauncherResult<()>;
}

/// The isolated surface running an app's code.
///
/// Outbound requests made from the surface must pass through the installed
/// [`RequestGuard`].
pub trait RenderSurface: Send + Sync {
    /// Stable identity of the surface.
    fn id(&self) -> SurfaceId;

    /// Route the surface's outbound requests through `guard`.
    fn install_guard(&self, guard: RequestGuard);

    /// Stop routing requests through the guard.
    fn remove_guard(&self);
}

/// Bring a window to the front, restoring it first if minimized.
pub(crate) fn foreground(window: &dyn AppWindow) {
    if window.is_minimized() {
        window.restore();
    }
    window.show();
    window.focus();
}
