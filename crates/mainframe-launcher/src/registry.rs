//! Registry of live app contexts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use mainframe_core::{AppId, SessionId, SurfaceId, UserId, WindowId};
use mainframe_daemon::MainframeClient;
use mainframe_rpc::PeerConfig;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::enforcer::{DEFAULT_PROMPT_TIMEOUT, PermissionEnforcer, RequestGuard, SurfaceIndex};
use crate::error::{LauncherError, LauncherResult};
use crate::window::{RenderSurface, WindowFactory, WindowRequest, foreground};

enum Slot {
    /// A launch or teardown is in flight; the receiver wakes when it settles.
    Launching(watch::Receiver<()>),
    Ready(Arc<AppContext>),
}

enum Next {
    Ready(Arc<AppContext>),
    Wait(watch::Receiver<()>),
    Launch(watch::Sender<()>),
}

type Contexts = HashMap<AppId, HashMap<UserId, Slot>>;

/// Owns every [`AppContext`], keyed by app then identity.
///
/// At most one context exists per `(app, identity)`. Windows and render
/// surfaces map back to their context through weak lookups, so a destroyed
/// surface never keeps a context alive.
pub struct ContextRegistry {
    client: MainframeClient,
    windows: Arc<dyn WindowFactory>,
    surfaces: Arc<SurfaceIndex>,
    enforcer: Arc<PermissionEnforcer>,
    contexts: Mutex<Contexts>,
    by_window: Mutex<HashMap<WindowId, Weak<AppContext>>>,
    channel_config: PeerConfig,
}

impl ContextRegistry {
    /// Empty registry opening sessions through `client` and windows through
    /// `windows`.
    #[must_use]
    pub fn new(client: MainframeClient, windows: Arc<dyn WindowFactory>) -> Self {
        let surfaces = Arc::new(SurfaceIndex::default());
        let enforcer = Arc::new(PermissionEnforcer::new(
            Arc::clone(&surfaces),
            DEFAULT_PROMPT_TIMEOUT,
        ));
        Self {
            client,
            windows,
            surfaces,
            enforcer,
            contexts: Mutex::new(HashMap::new()),
            by_window: Mutex::new(HashMap::new()),
            channel_config: PeerConfig::new("trusted"),
        }
    }

    /// Time an identity has to answer a permission prompt.
    #[must_use]
    pub fn with_prompt_timeout(mut self, timeout: Duration) -> Self {
        self.enforcer = Arc::new(PermissionEnforcer::new(Arc::clone(&self.surfaces), timeout));
        self
    }

    /// Transport settings for trusted channels created from now on.
    #[must_use]
    pub fn with_channel_config(mut self, config: PeerConfig) -> Self {
        self.channel_config = config;
        self
    }

    /// The enforcer installed into render surfaces.
    #[must_use]
    pub fn enforcer(&self) -> &Arc<PermissionEnforcer> {
        &self.enforcer
    }

    /// The daemon client.
    #[must_use]
    pub fn client(&self) -> &MainframeClient {
        &self.client
    }

    fn lock_contexts(&self) -> MutexGuard<'_, Contexts> {
        self.contexts.lock().unwrap_or_else(|e| {
            warn!("ContextRegistry contexts lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn lock_windows(&self) -> MutexGuard<'_, HashMap<WindowId, Weak<AppContext>>> {
        self.by_window.lock().unwrap_or_else(|e| {
            warn!("ContextRegistry window lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Launch `app_id` for `user_id`, or bring its window forward if it is
    /// already running.
    ///
    /// Concurrent launches for the same pair wait for the first one and
    /// then foreground its window.
    ///
    /// # Errors
    ///
    /// Returns the failure of opening the session, building the window or
    /// starting the app. Nothing is registered on failure.
    pub async fn launch(&self, app_id: &AppId, user_id: &UserId) -> LauncherResult<Arc<AppContext>> {
        loop {
            let next = {
                let mut contexts = self.lock_contexts();
                let slots = contexts.entry(app_id.clone()).or_default();
                match slots.get(user_id) {
                    Some(Slot::Ready(context)) => Next::Ready(Arc::clone(context)),
                    Some(Slot::Launching(rx)) => Next::Wait(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(());
                        slots.insert(user_id.clone(), Slot::Launching(rx));
                        Next::Launch(tx)
                    },
                }
            };

            match next {
                Next::Ready(context) => {
                    debug!(app = %app_id, user = %user_id, "app already running");
                    foreground(context.window().as_ref());
                    return Ok(context);
                },
                Next::Wait(mut rx) => {
                    // Errors once the in-flight launch settles.
                    let _ = rx.changed().await;
                },
                Next::Launch(tx) => {
                    let pending = PendingLaunch {
                        registry: self,
                        app_id,
                        user_id,
                        settled: false,
                        _wake: tx,
                    };
                    return pending.run().await;
                },
            }
        }
    }

    async fn create_context(&self, app_id: &AppId, user_id: &UserId) -> LauncherResult<Arc<AppContext>> {
        let opened = self.client.app_open(app_id, user_id).await?;
        let partition = opened.session.partition();
        let title = opened
            .manifest
            .get("name")
            .and_then(Value::as_str)
            .map_or_else(|| app_id.to_string(), str::to_owned);

        let request = WindowRequest {
            app_id: app_id.clone(),
            user_id: user_id.clone(),
            title,
            partition: partition.clone(),
        };
        let window = match self.windows.create_app_window(request).await {
            Ok(window) => window,
            Err(e) => {
                self.close_session(&opened.session.session_id).await;
                return Err(e);
            },
        };

        let (context, app_end) = AppContext::create(
            opened.session,
            opened.permissions,
            Arc::clone(&window),
            self.client.clone(),
            &self.channel_config,
        );
        self.lock_windows()
            .insert(window.id(), Arc::downgrade(&context));

        if let Err(e) = window.start_app(context.session(), app_end, &partition).await {
            self.lock_windows().remove(&window.id());
            context.clear().await;
            self.close_session(context.session_id()).await;
            return Err(e);
        }

        info!(app = %app_id, user = %user_id, window = %window.id(), "app launched");
        Ok(context)
    }

    async fn close_session(&self, session_id: &SessionId) {
        if let Err(e) = self.client.app_close(session_id).await {
            warn!(session = %session_id, error = %e, "failed to close app session");
        }
    }

    /// Tear down the context of a closed window, in order: close the daemon
    /// session, clear the context, then unregister it.
    ///
    /// The pair's slot is marked as closing first, so a launch arriving
    /// during teardown waits and then builds a fresh context.
    ///
    /// # Errors
    ///
    /// Returns [`LauncherError::UnknownWindow`] if no context is bound to
    /// the window (including a second call for the same window).
    pub async fn window_closed(&self, window_id: WindowId) -> LauncherResult<()> {
        let context = self
            .lock_windows()
            .remove(&window_id)
            .and_then(|weak| weak.upgrade())
            .ok_or(LauncherError::UnknownWindow(window_id))?;

        let closing = self.mark_closing(&context);

        self.close_session(context.session_id()).await;

        if let Some(surface_id) = context.surface_id() {
            self.surface_destroyed(surface_id);
        }
        context.clear().await;

        drop(closing);
        info!(app = %context.app_id(), user = %context.user_id(), "app context removed");
        Ok(())
    }

    /// Swap the context's ready slot for a launching one. `None` if the slot
    /// belongs to another context.
    fn mark_closing<'a>(&'a self, context: &'a Arc<AppContext>) -> Option<ClosingSlot<'a>> {
        let mut contexts = self.lock_contexts();
        let slot = contexts.get_mut(context.app_id())?.get_mut(context.user_id())?;
        let owned = matches!(slot, Slot::Ready(current) if Arc::ptr_eq(current, context));
        if !owned {
            return None;
        }
        let (tx, rx) = watch::channel(());
        *slot = Slot::Launching(rx);
        Some(ClosingSlot {
            registry: self,
            app_id: context.app_id(),
            user_id: context.user_id(),
            _wake: tx,
        })
    }

    /// Bind a newly attached render surface to the window's context and
    /// install the request guard into it.
    ///
    /// # Errors
    ///
    /// Returns [`LauncherError::UnknownWindow`] if the window has no context.
    pub fn surface_attached(&self, window_id: WindowId, surface: Arc<dyn RenderSurface>) -> LauncherResult<()> {
        let context = self
            .context_for_window(window_id)
            .ok_or(LauncherError::UnknownWindow(window_id))?;

        let surface_id = surface.id();
        if let Some(previous) = context.surface_id().filter(|id| *id != surface_id) {
            self.surface_destroyed(previous);
        }
        self.surfaces.insert(surface_id, &context);
        context.attach_surface(&surface);
        surface.install_guard(RequestGuard::new(surface_id, &self.enforcer));
        debug!(app = %context.app_id(), surface = %surface_id, "render surface attached");
        Ok(())
    }

    /// Forget a destroyed render surface. No-op for unknown surfaces.
    pub fn surface_destroyed(&self, surface_id: SurfaceId) {
        let Some(context) = self.surfaces.remove(surface_id) else {
            return;
        };
        if let Some(surface) = context.detach_surface(surface_id) {
            surface.remove_guard();
        }
        debug!(app = %context.app_id(), surface = %surface_id, "render surface destroyed");
    }

    /// The running context for a pair.
    #[must_use]
    pub fn get(&self, app_id: &AppId, user_id: &UserId) -> Option<Arc<AppContext>> {
        match self.lock_contexts().get(app_id)?.get(user_id)? {
            Slot::Ready(context) => Some(Arc::clone(context)),
            Slot::Launching(_) => None,
        }
    }

    /// The context owning a window.
    #[must_use]
    pub fn context_for_window(&self, window_id: WindowId) -> Option<Arc<AppContext>> {
        self.lock_windows().get(&window_id).and_then(Weak::upgrade)
    }

    /// The context owning a render surface.
    #[must_use]
    pub fn context_for_surface(&self, surface_id: SurfaceId) -> Option<Arc<AppContext>> {
        self.surfaces.get(surface_id)
    }

    /// Number of running contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_contexts()
            .values()
            .flat_map(HashMap::values)
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Whether no context is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of attached render surfaces.
    #[must_use]
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    /// Tear down every context as if its window had closed.
    pub async fn close_all(&self) {
        let windows: Vec<WindowId> = self.lock_windows().keys().copied().collect();
        for window_id in windows {
            if let Err(e) = self.window_closed(window_id).await {
                debug!(window = %window_id, error = %e, "window already torn down");
            }
        }
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("contexts", &self.len())
            .field("surfaces", &self.surfaces.len())
            .finish_non_exhaustive()
    }
}

/// An in-flight launch. Dropping it before it settles frees the slot so
/// waiters can retry.
struct PendingLaunch<'a> {
    registry: &'a ContextRegistry,
    app_id: &'a AppId,
    user_id: &'a UserId,
    settled: bool,
    _wake: watch::Sender<()>,
}

impl PendingLaunch<'_> {
    async fn run(mut self) -> LauncherResult<Arc<AppContext>> {
        let result = match self.registry.create_context(self.app_id, self.user_id).await {
            Ok(context) if context.is_cleared() => {
                Err(LauncherError::Window("window closed during launch".into()))
            },
            other => other,
        };

        {
            let mut contexts = self.registry.lock_contexts();
            match &result {
                Ok(context) => {
                    contexts
                        .entry(self.app_id.clone())
                        .or_default()
                        .insert(self.user_id.clone(), Slot::Ready(Arc::clone(context)));
                },
                Err(e) => {
                    warn!(app = %self.app_id, user = %self.user_id, error = %e, "launch failed");
                    remove_slot(&mut contexts, self.app_id, self.user_id);
                },
            }
            self.settled = true;
        }

        if let Ok(context) = &result {
            foreground(context.window().as_ref());
        }
        result
    }
}

impl Drop for PendingLaunch<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let mut contexts = self.registry.lock_contexts();
            remove_slot(&mut contexts, self.app_id, self.user_id);
        }
    }
}

/// A context being torn down. Dropping it frees the slot, then wakes
/// launches that arrived meanwhile.
struct ClosingSlot<'a> {
    registry: &'a ContextRegistry,
    app_id: &'a AppId,
    user_id: &'a UserId,
    _wake: watch::Sender<()>,
}

impl Drop for ClosingSlot<'_> {
    fn drop(&mut self) {
        let mut contexts = self.registry.lock_contexts();
        remove_slot(&mut contexts, self.app_id, self.user_id);
    }
}

fn remove_slot(contexts: &mut Contexts, app_id: &AppId, user_id: &UserId) {
    if let Some(slots) = contexts.get_mut(app_id) {
        slots.remove(user_id);
        if slots.is_empty() {
            contexts.remove(app_id);
        }
    }
}
