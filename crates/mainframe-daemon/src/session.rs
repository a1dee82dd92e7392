//! Open app sessions.

use dashmap::DashMap;
use mainframe_core::{AppId, AppSession, SessionId, UserId};
use mainframe_permissions::PermissionSettings;
use tracing::{debug, info};

/// An open session and its permission snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    /// The session triple.
    pub session: AppSession,
    /// Declarations and grants, updated by `app_setPermission`.
    pub settings: PermissionSettings,
}

/// Sessions opened through `app_open`, keyed by `sessID`.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for `(app_id, user_id)` with a fresh `sessID`.
    pub fn open(&self, app_id: AppId, user_id: UserId, settings: PermissionSettings) -> AppSession {
        let session = AppSession::open(app_id, user_id);
        info!(
            session = %session.session_id,
            app = %session.app_id,
            user = %session.user_id,
            "app session opened"
        );
        self.sessions.insert(
            session.session_id.clone(),
            SessionEntry {
                session: session.clone(),
                settings,
            },
        );
        session
    }

    /// Close a session. Returns the removed entry, `None` if unknown.
    pub fn close(&self, id: &SessionId) -> Option<SessionEntry> {
        let removed = self.sessions.remove(id).map(|(_, entry)| entry);
        if removed.is_some() {
            info!(session = %id, "app session closed");
        } else {
            debug!(session = %id, "close for unknown session");
        }
        removed
    }

    /// Snapshot of a session.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<SessionEntry> {
        self.sessions.get(id).map(|entry| entry.clone())
    }

    /// Mutate a session's settings in place. `None` if unknown.
    pub fn update_settings<R>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut PermissionSettings) -> R,
    ) -> Option<R> {
        self.sessions
            .get_mut(id)
            .map(|mut entry| f(&mut entry.settings))
    }

    /// Number of open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mainframe_permissions::{Evaluation, PermissionCheck};

    #[test]
    fn open_close_lifecycle() {
        let registry = SessionRegistry::new();
        let session = registry.open(AppId::new("a"), UserId::new("u"), PermissionSettings::default());

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&session.session_id).unwrap().session, session);

        assert!(registry.close(&session.session_id).is_some());
        assert!(registry.close(&session.session_id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn same_pair_gets_distinct_sessions() {
        let registry = SessionRegistry::new();
        let a = registry.open(AppId::new("a"), UserId::new("u"), PermissionSettings::default());
        let b = registry.open(AppId::new("a"), UserId::new("u"), PermissionSettings::default());
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn settings_updates_apply_in_place() {
        let registry = SessionRegistry::new();
        let session = registry.open(AppId::new("a"), UserId::new("u"), PermissionSettings::default());

        registry
            .update_settings(&session.session_id, |s| {
                s.record_decision(&PermissionCheck::ChainWrite, true);
            })
            .unwrap();
        let entry = registry.get(&session.session_id).unwrap();
        assert_eq!(
            entry.settings.evaluate(&PermissionCheck::ChainWrite),
            Evaluation::Granted
        );
        assert!(
            registry
                .update_settings(&SessionId::from_string("nope"), |_| ())
                .is_none()
        );
    }
}
