//! Gatekeeper for outbound requests from render surfaces.
//!
//! # Flow
//!
//! 1. Resolve the surface to its context through the weak surface index
//!    (no context → deny)
//! 2. Evaluate cached decisions, then stored grants
//! 3. Undecided and not declared by the manifest → deny without asking
//! 4. Undecided → ask the identity through the [`PermissionPrompt`], bounded
//!    by a timeout (no prompt, no answer or timeout → deny). Identical
//!    requests from one surface share a single prompt.
//! 5. Re-check that the surface still belongs to the same live context
//! 6. Record the answer and apply it
//!
//! Denials carry no detail about the destination.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;

use mainframe_core::SurfaceId;
use mainframe_permissions::{Evaluation, PermissionCheck};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::context::AppContext;
use crate::prompt::{PermissionPrompt, PermissionRequest};

/// Default time an identity has to answer a prompt.
pub const DEFAULT_PROMPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Non-owning index from render surfaces to their contexts.
#[derive(Default)]
pub(crate) struct SurfaceIndex {
    entries: Mutex<HashMap<SurfaceId, Weak<AppContext>>>,
}

impl SurfaceIndex {
    fn lock(&self) -> MutexGuard<'_, HashMap<SurfaceId, Weak<AppContext>>> {
        self.entries.lock().unwrap_or_else(|e| {
            warn!("SurfaceIndex lock poisoned, recovering");
            e.into_inner()
        })
    }

    pub(crate) fn insert(&self, surface: SurfaceId, context: &Arc<AppContext>) {
        self.lock().insert(surface, Arc::downgrade(context));
    }

    pub(crate) fn remove(&self, surface: SurfaceId) -> Option<Arc<AppContext>> {
        self.lock().remove(&surface).and_then(|weak| weak.upgrade())
    }

    pub(crate) fn get(&self, surface: SurfaceId) -> Option<Arc<AppContext>> {
        self.lock().get(&surface).and_then(Weak::upgrade)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Outcome of a request check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestVerdict {
    /// Let the request through.
    Allow,
    /// Abort the request.
    Deny,
}

impl RequestVerdict {
    /// Whether the request may proceed.
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl From<bool> for RequestVerdict {
    fn from(allow: bool) -> Self {
        if allow { Self::Allow } else { Self::Deny }
    }
}

impl fmt::Display for RequestVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("allowed"),
            Self::Deny => f.write_str("permission denied"),
        }
    }
}

type AskKey = (SurfaceId, PermissionCheck);

/// Prompts in flight; followers wait for the leader's verdict.
type Asking = HashMap<AskKey, watch::Receiver<Option<RequestVerdict>>>;

enum Role {
    Leader(watch::Sender<Option<RequestVerdict>>),
    Follower(watch::Receiver<Option<RequestVerdict>>),
}

/// Decides outbound requests made by sandboxed surfaces.
pub struct PermissionEnforcer {
    surfaces: Arc<SurfaceIndex>,
    prompt: RwLock<Option<Arc<dyn PermissionPrompt>>>,
    timeout: Duration,
    asking: Mutex<Asking>,
}

impl PermissionEnforcer {
    pub(crate) fn new(surfaces: Arc<SurfaceIndex>, timeout: Duration) -> Self {
        Self {
            surfaces,
            prompt: RwLock::new(None),
            timeout,
            asking: Mutex::new(HashMap::new()),
        }
    }

    fn lock_asking(&self) -> MutexGuard<'_, Asking> {
        self.asking.lock().unwrap_or_else(|e| {
            warn!("PermissionEnforcer prompt lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Register the UI that answers prompts.
    pub fn set_prompt(&self, prompt: Arc<dyn PermissionPrompt>) {
        *self.prompt.write().unwrap_or_else(|e| e.into_inner()) = Some(prompt);
    }

    /// Unregister the prompt UI. Undecided requests are then denied.
    pub fn clear_prompt(&self) {
        *self.prompt.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// How long a prompt may stay unanswered.
    #[must_use]
    pub fn prompt_timeout(&self) -> Duration {
        self.timeout
    }

    fn current_prompt(&self) -> Option<Arc<dyn PermissionPrompt>> {
        self.prompt
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(Arc::clone)
    }

    /// Check an outbound request to `url` from `surface`.
    pub async fn check_url(&self, surface: SurfaceId, url: &str) -> RequestVerdict {
        match PermissionCheck::network_request(url) {
            Ok(check) => self.check(surface, check).await,
            Err(e) => {
                debug!(%surface, error = %e, "unparseable request denied");
                RequestVerdict::Deny
            },
        }
    }

    /// Check a capability use from `surface`.
    pub async fn check(&self, surface: SurfaceId, check: PermissionCheck) -> RequestVerdict {
        let Some(context) = self.surfaces.get(surface) else {
            debug!(%surface, "no context for surface");
            return RequestVerdict::Deny;
        };

        match context.evaluate(&check) {
            Evaluation::Granted => return RequestVerdict::Allow,
            Evaluation::Denied => return RequestVerdict::Deny,
            Evaluation::Undecided => {},
        }
        if !context.is_declared(&check) {
            debug!(app = %context.app_id(), capability = %check.capability(), "undeclared destination denied");
            return RequestVerdict::Deny;
        }

        let key = (surface, check);
        let role = {
            let mut asking = self.lock_asking();
            match asking.get(&key) {
                Some(rx) => Role::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    asking.insert(key.clone(), rx);
                    Role::Leader(tx)
                },
            }
        };

        match role {
            Role::Follower(mut rx) => match rx.wait_for(Option::is_some).await {
                Ok(verdict) => (*verdict).unwrap_or(RequestVerdict::Deny),
                Err(_) => {
                    debug!(%surface, "shared prompt abandoned");
                    RequestVerdict::Deny
                },
            },
            Role::Leader(tx) => {
                let asking = AskingSlot {
                    enforcer: self,
                    key,
                };
                let verdict = self.ask(surface, &context, &asking.key.1).await;
                let _ = tx.send(Some(verdict));
                verdict
            },
        }
    }

    async fn ask(&self, surface: SurfaceId, context: &Arc<AppContext>, check: &PermissionCheck) -> RequestVerdict {
        let Some(prompt) = self.current_prompt() else {
            debug!(app = %context.app_id(), "no permission prompt registered");
            return RequestVerdict::Deny;
        };
        if !prompt.is_available() {
            debug!(app = %context.app_id(), "permission prompt unavailable");
            return RequestVerdict::Deny;
        }

        let request = PermissionRequest {
            app_id: context.app_id().clone(),
            user_id: context.user_id().clone(),
            check: check.clone(),
        };
        let decision = match tokio::time::timeout(self.timeout, prompt.request_permission(request)).await {
            Ok(Some(decision)) => decision,
            Ok(None) => {
                debug!(app = %context.app_id(), "permission prompt unanswered");
                return RequestVerdict::Deny;
            },
            Err(_) => {
                warn!(app = %context.app_id(), "permission prompt timed out");
                return RequestVerdict::Deny;
            },
        };

        let still_attached = self
            .surfaces
            .get(surface)
            .is_some_and(|current| Arc::ptr_eq(&current, context));
        if !still_attached || context.is_cleared() {
            debug!(%surface, "surface detached while prompting");
            return RequestVerdict::Deny;
        }

        if let Err(e) = context.record_decision(check, decision).await {
            warn!(app = %context.app_id(), error = %e, "failed to persist permission grant");
        }
        RequestVerdict::from(decision.allow)
    }
}

impl fmt::Debug for PermissionEnforcer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionEnforcer")
            .field("surfaces", &self.surfaces.len())
            .field("has_prompt", &self.current_prompt().is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A prompt this task leads. Dropping it lets the next identical request
/// ask again.
struct AskingSlot<'a> {
    enforcer: &'a PermissionEnforcer,
    key: AskKey,
}

impl Drop for AskingSlot<'_> {
    fn drop(&mut self) {
        self.enforcer.lock_asking().remove(&self.key);
    }
}

/// Handle installed into a render surface; checks that surface's requests.
#[derive(Clone)]
pub struct RequestGuard {
    surface: SurfaceId,
    enforcer: Weak<PermissionEnforcer>,
}

impl RequestGuard {
    pub(crate) fn new(surface: SurfaceId, enforcer: &Arc<PermissionEnforcer>) -> Self {
        Self {
            surface,
            enforcer: Arc::downgrade(enforcer),
        }
    }

    /// The guarded surface.
    #[must_use]
    pub fn surface_id(&self) -> SurfaceId {
        self.surface
    }

    /// Check an outbound request to `url`. Denies once the launcher is gone.
    pub async fn check_url(&self, url: &str) -> RequestVerdict {
        match self.enforcer.upgrade() {
            Some(enforcer) => enforcer.check_url(self.surface, url).await,
            None => RequestVerdict::Deny,
        }
    }
}

impl fmt::Debug for RequestGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestGuard")
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_surfaces_are_denied() {
        let enforcer = Arc::new(PermissionEnforcer::new(
            Arc::new(SurfaceIndex::default()),
            DEFAULT_PROMPT_TIMEOUT,
        ));
        let guard = RequestGuard::new(SurfaceId::new(), &enforcer);
        assert_eq!(guard.check_url("https://example.com").await, RequestVerdict::Deny);
    }

    #[tokio::test]
    async fn guards_deny_after_the_enforcer_is_gone() {
        let enforcer = Arc::new(PermissionEnforcer::new(
            Arc::new(SurfaceIndex::default()),
            DEFAULT_PROMPT_TIMEOUT,
        ));
        let guard = RequestGuard::new(SurfaceId::new(), &enforcer);
        drop(enforcer);
        assert!(!guard.check_url("https://example.com").await.is_allowed());
    }

    #[test]
    fn denial_is_generic() {
        assert_eq!(RequestVerdict::Deny.to_string(), "permission denied");
        assert_eq!(RequestVerdict::from(true), RequestVerdict::Allow);
    }
}
