//! Mock windowing, prompt and manifest collaborators.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mainframe_core::{AppSession, SurfaceId, WindowId};
use mainframe_launcher::{
    AppWindow, LauncherError, LauncherResult, ManifestLoader, PermissionPrompt, PermissionRequest,
    PromptDecision, RenderSurface, RequestGuard, RequestVerdict, WindowFactory, WindowRequest,
};
use mainframe_rpc::RpcPeer;
use serde_json::Value;

/// Mock app window recording what the launcher does to it.
#[derive(Debug)]
pub struct MockWindow {
    id: WindowId,
    request: WindowRequest,
    minimized: AtomicBool,
    visible: AtomicBool,
    focus_count: AtomicUsize,
    restore_count: AtomicUsize,
    channel: Mutex<Option<RpcPeer>>,
    session: Mutex<Option<AppSession>>,
    started_partition: Mutex<Option<String>>,
    cleared_partitions: Mutex<Vec<String>>,
    fail_start: bool,
}

impl MockWindow {
    fn new(request: WindowRequest, fail_start: bool) -> Self {
        Self {
            id: WindowId::new(),
            request,
            minimized: AtomicBool::new(false),
            visible: AtomicBool::new(false),
            focus_count: AtomicUsize::new(0),
            restore_count: AtomicUsize::new(0),
            channel: Mutex::new(None),
            session: Mutex::new(None),
            started_partition: Mutex::new(None),
            cleared_partitions: Mutex::new(Vec::new()),
            fail_start,
        }
    }

    /// What the launcher asked for.
    #[must_use]
    pub fn request(&self) -> &WindowRequest {
        &self.request
    }

    /// Minimize the window.
    pub fn minimize(&self) {
        self.minimized.store(true, Ordering::SeqCst);
    }

    /// Whether `show` was called.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    /// Times `focus` was called.
    #[must_use]
    pub fn focus_count(&self) -> usize {
        self.focus_count.load(Ordering::SeqCst)
    }

    /// Times `restore` was called.
    #[must_use]
    pub fn restore_count(&self) -> usize {
        self.restore_count.load(Ordering::SeqCst)
    }

    /// The app end of the trusted channel, once started.
    #[must_use]
    pub fn channel(&self) -> Option<RpcPeer> {
        self.channel.lock().ok().and_then(|g| g.clone())
    }

    /// The session handed over at start.
    #[must_use]
    pub fn session(&self) -> Option<AppSession> {
        self.session.lock().ok().and_then(|g| g.clone())
    }

    /// The partition the app was started in.
    #[must_use]
    pub fn started_partition(&self) -> Option<String> {
        self.started_partition.lock().ok().and_then(|g| g.clone())
    }

    /// Partitions wiped so far.
    #[must_use]
    pub fn cleared_partitions(&self) -> Vec<String> {
        self.cleared_partitions
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AppWindow for MockWindow {
    fn id(&self) -> WindowId {
        self.id
    }

    fn is_minimized(&self) -> bool {
        self.minimized.load(Ordering::SeqCst)
    }

    fn restore(&self) {
        self.minimized.store(false, Ordering::SeqCst);
        self.restore_count.fetch_add(1, Ordering::SeqCst);
    }

    fn show(&self) {
        self.visible.store(true, Ordering::SeqCst);
    }

    fn focus(&self) {
        self.focus_count.fetch_add(1, Ordering::SeqCst);
    }

    async fn start_app(
        &self,
        session: &AppSession,
        channel: RpcPeer,
        partition: &str,
    ) -> LauncherResult<()> {
        if self.fail_start {
            return Err(LauncherError::Window("app failed to load".into()));
        }
        if let Ok(mut g) = self.channel.lock() {
            *g = Some(channel);
        }
        if let Ok(mut g) = self.session.lock() {
            *g = Some(session.clone());
        }
        if let Ok(mut g) = self.started_partition.lock() {
            *g = Some(partition.to_owned());
        }
        Ok(())
    }

    async fn clear_storage(&self, partition: &str) -> LauncherResult<()> {
        if let Ok(mut g) = self.cleared_partitions.lock() {
            g.push(partition.to_owned());
        }
        Ok(())
    }
}

/// Mock window factory keeping every window it built.
#[derive(Debug, Default)]
pub struct MockWindowFactory {
    windows: Mutex<Vec<Arc<MockWindow>>>,
    delay: Duration,
    refuse: AtomicBool,
    fail_start: AtomicBool,
}

impl MockWindowFactory {
    /// Factory building windows immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait this long before building each window.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Refuse to build windows.
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Build windows whose app fails to start.
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Every window built so far.
    #[must_use]
    pub fn windows(&self) -> Vec<Arc<MockWindow>> {
        self.windows.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Number of windows built.
    #[must_use]
    pub fn created(&self) -> usize {
        self.windows().len()
    }

    /// The most recent window.
    #[must_use]
    pub fn last(&self) -> Option<Arc<MockWindow>> {
        self.windows().last().cloned()
    }
}

#[async_trait]
impl WindowFactory for MockWindowFactory {
    async fn create_app_window(&self, request: WindowRequest) -> LauncherResult<Arc<dyn AppWindow>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(LauncherError::Window("window refused".into()));
        }
        let window = Arc::new(MockWindow::new(
            request,
            self.fail_start.load(Ordering::SeqCst),
        ));
        if let Ok(mut g) = self.windows.lock() {
            g.push(Arc::clone(&window));
        }
        Ok(window)
    }
}

/// Mock render surface that sends requests through its installed guard.
#[derive(Debug)]
pub struct MockSurface {
    id: SurfaceId,
    guard: Mutex<Option<RequestGuard>>,
    sent: Mutex<Vec<String>>,
}

impl MockSurface {
    /// A new surface.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: SurfaceId::new(),
            guard: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Whether a guard is installed.
    #[must_use]
    pub fn has_guard(&self) -> bool {
        self.guard.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Attempt a request to `url`. Without a guard nothing leaves the
    /// surface.
    pub async fn fetch(&self, url: &str) -> RequestVerdict {
        let guard = self.guard.lock().ok().and_then(|g| g.clone());
        let verdict = match guard {
            Some(guard) => guard.check_url(url).await,
            None => RequestVerdict::Deny,
        };
        if verdict.is_allowed() {
            if let Ok(mut g) = self.sent.lock() {
                g.push(url.to_owned());
            }
        }
        verdict
    }

    /// URLs that were let through.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl RenderSurface for MockSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn install_guard(&self, guard: RequestGuard) {
        if let Ok(mut g) = self.guard.lock() {
            *g = Some(guard);
        }
    }

    fn remove_guard(&self) {
        if let Ok(mut g) = self.guard.lock() {
            *g = None;
        }
    }
}

/// Mock permission prompt answering from a queue.
#[derive(Debug, Default)]
pub struct MockPrompt {
    responses: Mutex<VecDeque<Option<PromptDecision>>>,
    default_response: Option<PromptDecision>,
    asked: Mutex<Vec<PermissionRequest>>,
    unavailable: AtomicBool,
    delay: Duration,
}

impl MockPrompt {
    /// A prompt that never answers unless responses are queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer with `decision` when the queue is empty.
    #[must_use]
    pub fn with_default(mut self, decision: PromptDecision) -> Self {
        self.default_response = Some(decision);
        self
    }

    /// Wait this long before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue an answer (`None` means no answer).
    pub fn queue(&self, response: Option<PromptDecision>) {
        if let Ok(mut g) = self.responses.lock() {
            g.push_back(response);
        }
    }

    /// Mark the prompt unavailable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every request presented so far.
    #[must_use]
    pub fn asked(&self) -> Vec<PermissionRequest> {
        self.asked.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Number of requests presented.
    #[must_use]
    pub fn ask_count(&self) -> usize {
        self.asked().len()
    }
}

#[async_trait]
impl PermissionPrompt for MockPrompt {
    async fn request_permission(&self, request: PermissionRequest) -> Option<PromptDecision> {
        if let Ok(mut g) = self.asked.lock() {
            g.push(request);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let queued = self.responses.lock().ok().and_then(|mut g| g.pop_front());
        match queued {
            Some(response) => response,
            None => self.default_response,
        }
    }

    fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }
}

/// Mock manifest loader serving manifests from memory.
#[derive(Debug, Default)]
pub struct MockManifestLoader {
    manifests: Mutex<HashMap<PathBuf, Value>>,
}

impl MockManifestLoader {
    /// An empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `manifest` at `path`.
    #[must_use]
    pub fn with_manifest(self, path: impl Into<PathBuf>, manifest: Value) -> Self {
        if let Ok(mut g) = self.manifests.lock() {
            g.insert(path.into(), manifest);
        }
        self
    }
}

#[async_trait]
impl ManifestLoader for MockManifestLoader {
    async fn read_manifest(&self, path: &Path) -> LauncherResult<Value> {
        self.manifests
            .lock()
            .ok()
            .and_then(|g| g.get(path).cloned())
            .ok_or_else(|| LauncherError::Manifest(format!("no manifest at {}", path.display())))
    }
}
