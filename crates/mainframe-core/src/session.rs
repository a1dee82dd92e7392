//! App session triple.

use serde::{Deserialize, Serialize};

use crate::types::{AppId, SessionId, Timestamp, UserId};

/// An identity's open session on an installed app.
///
/// Created by the daemon on `app_open` and released on `app_close`. The
/// launcher holds a copy inside the owning `AppContext`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSession {
    /// The app that was opened.
    #[serde(rename = "appID")]
    pub app_id: AppId,
    /// The identity that opened it.
    #[serde(rename = "userID")]
    pub user_id: UserId,
    /// Daemon-assigned session identifier.
    #[serde(rename = "sessID")]
    pub session_id: SessionId,
    /// When the session was opened.
    #[serde(default = "Timestamp::now", rename = "openedAt")]
    pub opened_at: Timestamp,
}

impl AppSession {
    /// Open a new session for `(app_id, user_id)` with a fresh session ID.
    #[must_use]
    pub fn open(app_id: AppId, user_id: UserId) -> Self {
        Self {
            app_id,
            user_id,
            session_id: SessionId::new(),
            opened_at: Timestamp::now(),
        }
    }

    /// Name of the storage partition scoped to this app and identity.
    #[must_use]
    pub fn partition(&self) -> String {
        format!("persist:{}/{}", self.app_id, self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_field_names() {
        let session = AppSession::open(AppId::new("a"), UserId::new("u"));
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["appID"], "a");
        assert_eq!(json["userID"], "u");
        assert!(json["sessID"].is_string());
    }

    #[test]
    fn partition_is_scoped_to_app_and_user() {
        let session = AppSession::open(AppId::new("app"), UserId::new("bob"));
        assert_eq!(session.partition(), "persist:app/bob");
    }
}
