//! Parameter and result shapes of the session methods.
//!
//! Everything else is passed through to the capability backends as raw
//! JSON.

use mainframe_core::{AppId, AppSession, SessionId, UserId};
use mainframe_permissions::{Capability, Evaluation, PermissionSettings, PermissionUpdate};
use mainframe_rpc::{RpcError, RpcResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `app_open` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppOpenParams {
    /// App to open.
    #[serde(rename = "appID")]
    pub app_id: AppId,
    /// Identity opening it.
    #[serde(rename = "userID")]
    pub user_id: UserId,
}

/// `app_open` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppOpenResult {
    /// The new session.
    #[serde(rename = "appSession")]
    pub session: AppSession,
    /// Declarations and grants at open time.
    pub permissions: PermissionSettings,
    /// App manifest as stored by the vault.
    #[serde(default)]
    pub manifest: Value,
}

/// Parameters carrying only a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    /// Session identifier.
    #[serde(rename = "sessID")]
    pub session_id: SessionId,
}

/// `app_checkPermission` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckPermissionParams {
    /// Session identifier.
    #[serde(rename = "sessID")]
    pub session_id: SessionId,
    /// Capability key.
    pub key: Capability,
    /// Destination URL or host for per-destination capabilities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
}

/// `app_checkPermission` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    /// A stored grant allows it.
    Granted,
    /// A stored grant refuses it.
    Denied,
    /// Nothing stored yet.
    NotSet,
}

impl From<Evaluation> for PermissionStatus {
    fn from(value: Evaluation) -> Self {
        match value {
            Evaluation::Granted => Self::Granted,
            Evaluation::Denied => Self::Denied,
            Evaluation::Undecided => Self::NotSet,
        }
    }
}

/// `app_setPermission` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPermissionParams {
    /// Session identifier.
    #[serde(rename = "sessID")]
    pub session_id: SessionId,
    /// The grant to store.
    #[serde(flatten)]
    pub update: PermissionUpdate,
}

/// `sub_unsubscribe` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeParams {
    /// Subscription handle.
    pub id: String,
}

/// Decode method parameters, mapping failures to
/// [`RpcError::InvalidParams`].
///
/// # Errors
///
/// Returns [`RpcError::InvalidParams`] if `params` does not match `T`.
pub fn parse_params<T: DeserializeOwned>(params: Value) -> RpcResult<T> {
    serde_json::from_value(params).map_err(RpcError::invalid_params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mainframe_permissions::WebRequestGrants;
    use serde_json::json;

    #[test]
    fn set_permission_flattens_the_update() {
        let params: SetPermissionParams = parse_params(json!({
            "sessID": "s1",
            "key": "WEB_REQUEST",
            "value": {"granted": ["a.io"], "denied": []},
        }))
        .unwrap();
        assert_eq!(params.session_id.as_str(), "s1");
        assert_eq!(
            params.update,
            PermissionUpdate::WebRequest(WebRequestGrants {
                granted: vec!["a.io".into()],
                denied: vec![],
            })
        );
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_value(PermissionStatus::NotSet).unwrap(),
            json!("not_set")
        );
    }

    #[test]
    fn bad_params_are_invalid_params() {
        let err = parse_params::<AppOpenParams>(json!({"appID": 1})).unwrap_err();
        assert!(matches!(err, RpcError::InvalidParams(_)));
    }
}
