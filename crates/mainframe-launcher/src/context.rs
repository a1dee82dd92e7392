//! Per-app, per-identity execution context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use mainframe_core::{AppId, AppSession, SessionId, SurfaceId, UserId};
use mainframe_daemon::MainframeClient;
use mainframe_permissions::{DecisionCache, Evaluation, PermissionCheck, PermissionSettings};
use mainframe_rpc::{NoService, PeerConfig, RpcPeer, bridge};
use tracing::{debug, info, warn};

use crate::channel::TrustedChannel;
use crate::error::LauncherResult;
use crate::prompt::PromptDecision;
use crate::window::{AppWindow, RenderSurface};

struct AttachedSurface {
    id: SurfaceId,
    surface: Weak<dyn RenderSurface>,
}

/// Binds one identity's session of one app to its window, its trusted
/// channel and its permission state.
///
/// The render surface is held weakly; the windowing layer owns it.
pub struct AppContext {
    session: AppSession,
    settings: RwLock<PermissionSettings>,
    decisions: DecisionCache,
    window: Arc<dyn AppWindow>,
    channel: RpcPeer,
    client: MainframeClient,
    surface: Mutex<Option<AttachedSurface>>,
    cleared: AtomicBool,
}

impl AppContext {
    /// Build a context and its trusted channel.
    ///
    /// Returns the context and the app end of the channel, which belongs to
    /// the window.
    pub(crate) fn create(
        session: AppSession,
        settings: PermissionSettings,
        window: Arc<dyn AppWindow>,
        client: MainframeClient,
        config: &PeerConfig,
    ) -> (Arc<Self>, RpcPeer) {
        let service = Arc::new(TrustedChannel::new(client.clone()));
        let (channel, app_end) = bridge(service.clone(), Arc::new(NoService), config);
        let context = Arc::new(Self {
            session,
            settings: RwLock::new(settings),
            decisions: DecisionCache::new(),
            window,
            channel,
            client,
            surface: Mutex::new(None),
            cleared: AtomicBool::new(false),
        });
        service.bind(&context);
        (context, app_end)
    }

    /// The session this context runs.
    #[must_use]
    pub fn session(&self) -> &AppSession {
        &self.session
    }

    /// App identifier.
    #[must_use]
    pub fn app_id(&self) -> &AppId {
        &self.session.app_id
    }

    /// Identity identifier.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.session.user_id
    }

    /// Daemon session identifier.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session.session_id
    }

    /// Storage partition for the app's surface.
    #[must_use]
    pub fn partition(&self) -> String {
        self.session.partition()
    }

    /// The owning window.
    #[must_use]
    pub fn window(&self) -> &Arc<dyn AppWindow> {
        &self.window
    }

    /// The launcher end of the trusted channel.
    #[must_use]
    pub fn channel(&self) -> &RpcPeer {
        &self.channel
    }

    /// Snapshot of the permission settings.
    #[must_use]
    pub fn settings(&self) -> PermissionSettings {
        self.read_settings().clone()
    }

    /// Decisions made this session that were not stored as grants.
    #[must_use]
    pub fn decisions(&self) -> &DecisionCache {
        &self.decisions
    }

    /// Evaluate a check against cached decisions, then stored grants.
    #[must_use]
    pub fn evaluate(&self, check: &PermissionCheck) -> Evaluation {
        match self.decisions.get(check) {
            Some(true) => Evaluation::Granted,
            Some(false) => Evaluation::Denied,
            None => self.read_settings().evaluate(check),
        }
    }

    /// Whether the manifest declares `check`, as required or optional.
    #[must_use]
    pub fn is_declared(&self, check: &PermissionCheck) -> bool {
        self.read_settings().is_declared(check)
    }

    /// Record the identity's answer to a prompt.
    ///
    /// The answer is always cached for the context's lifetime. A remembered
    /// answer is also written into the grants and persisted through the
    /// daemon.
    ///
    /// # Errors
    ///
    /// Returns the daemon error if persisting the grant fails; the cached
    /// answer still applies.
    pub async fn record_decision(
        &self,
        check: &PermissionCheck,
        decision: PromptDecision,
    ) -> LauncherResult<()> {
        self.decisions.insert(check.clone(), decision.allow);
        if !decision.remember {
            return Ok(());
        }

        let update = {
            let mut settings = self.settings.write().unwrap_or_else(|e| {
                warn!("AppContext settings lock poisoned, recovering");
                e.into_inner()
            });
            settings.record_decision(check, decision.allow);
            settings.update_for(check.capability())
        };
        self.client
            .app_set_permission(self.session_id(), update)
            .await?;
        debug!(app = %self.app_id(), capability = %check.capability(), "stored grant");
        Ok(())
    }

    /// Identity of the attached render surface.
    #[must_use]
    pub fn surface_id(&self) -> Option<SurfaceId> {
        self.lock_surface().as_ref().map(|s| s.id)
    }

    /// The attached render surface, if still alive.
    #[must_use]
    pub fn surface(&self) -> Option<Arc<dyn RenderSurface>> {
        self.lock_surface().as_ref().and_then(|s| s.surface.upgrade())
    }

    pub(crate) fn attach_surface(&self, surface: &Arc<dyn RenderSurface>) {
        *self.lock_surface() = Some(AttachedSurface {
            id: surface.id(),
            surface: Arc::downgrade(surface),
        });
    }

    /// Forget the surface if it is `id`. Returns it if still alive.
    pub(crate) fn detach_surface(&self, id: SurfaceId) -> Option<Arc<dyn RenderSurface>> {
        let mut slot = self.lock_surface();
        if slot.as_ref().is_some_and(|s| s.id == id) {
            slot.take().and_then(|s| s.surface.upgrade())
        } else {
            None
        }
    }

    /// Whether [`clear`](Self::clear) has run.
    #[must_use]
    pub fn is_cleared(&self) -> bool {
        self.cleared.load(Ordering::SeqCst)
    }

    /// Release the context's resources: cached decisions, the trusted
    /// channel and the storage partition. Runs once.
    pub async fn clear(&self) {
        if self.cleared.swap(true, Ordering::SeqCst) {
            return;
        }
        let revoked = self.decisions.revoke_all();
        self.channel.close();
        let partition = self.partition();
        if let Err(e) = self.window.clear_storage(&partition).await {
            warn!(app = %self.app_id(), %partition, error = %e, "failed to clear storage partition");
        }
        info!(app = %self.app_id(), user = %self.user_id(), revoked, "app context cleared");
    }

    fn read_settings(&self) -> std::sync::RwLockReadGuard<'_, PermissionSettings> {
        self.settings.read().unwrap_or_else(|e| {
            warn!("AppContext settings lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn lock_surface(&self) -> MutexGuard<'_, Option<AttachedSurface>> {
        self.surface.lock().unwrap_or_else(|e| {
            warn!("AppContext surface lock poisoned, recovering");
            e.into_inner()
        })
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("session", &self.session)
            .field("window", &self.window.id())
            .field("surface", &self.surface_id())
            .field("cleared", &self.is_cleared())
            .finish_non_exhaustive()
    }
}
