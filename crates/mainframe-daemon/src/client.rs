//! Typed client for the daemon socket.

use std::path::Path;

use mainframe_core::{API_VERSION, AppId, SessionId, UserId};
use mainframe_permissions::PermissionUpdate;
use mainframe_rpc::{PeerConfig, RpcError, RpcPeer, Subscription};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::api::{AppOpenParams, AppOpenResult, SessionParams, SetPermissionParams};
use crate::error::{DaemonError, DaemonResult};
use crate::method::Method;

/// Client side of a daemon connection.
///
/// Cloning is cheap; clones share the underlying transport.
#[derive(Debug, Clone)]
pub struct MainframeClient {
    peer: RpcPeer,
}

impl MainframeClient {
    /// Connect to the daemon at `socket_path` and verify its API version.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Connect`] if the socket is unreachable, or
    /// [`RpcError::VersionMismatch`] if the daemon speaks another version.
    pub async fn connect(socket_path: impl AsRef<Path>, config: PeerConfig) -> DaemonResult<Self> {
        let path = socket_path.as_ref();
        let peer = RpcPeer::connect_unix(path, config)
            .await
            .map_err(|source| DaemonError::Connect {
                path: path.to_path_buf(),
                source,
            })?;
        let client = Self::from_peer(peer);
        if let Err(e) = client.check_version().await {
            client.close();
            return Err(e);
        }
        info!(path = %path.display(), "connected to daemon");
        Ok(client)
    }

    /// Wrap an already connected peer without a version check.
    #[must_use]
    pub fn from_peer(peer: RpcPeer) -> Self {
        Self { peer }
    }

    /// The underlying transport.
    #[must_use]
    pub fn peer(&self) -> &RpcPeer {
        &self.peer
    }

    /// Ask the daemon for its API version and compare it with ours.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::VersionMismatch`] on a mismatch.
    pub async fn check_version(&self) -> DaemonResult<f64> {
        let remote = self.api_version().await?;
        if (remote - API_VERSION).abs() > f64::EPSILON {
            return Err(RpcError::VersionMismatch(format!(
                "daemon speaks {remote}, client speaks {API_VERSION}"
            ))
            .into());
        }
        debug!(version = remote, "daemon version ok");
        Ok(remote)
    }

    /// `api_version`.
    ///
    /// # Errors
    ///
    /// Returns the RPC failure.
    pub async fn api_version(&self) -> DaemonResult<f64> {
        let value = self.call(Method::ApiVersion, Value::Null).await?;
        value
            .as_f64()
            .ok_or_else(|| RpcError::Internal(format!("unexpected api_version reply: {value}")).into())
    }

    /// Call any method with raw parameters.
    ///
    /// # Errors
    ///
    /// Returns the RPC failure.
    pub async fn call(&self, method: Method, params: Value) -> DaemonResult<Value> {
        Ok(self.peer.request(method.as_str(), params).await?)
    }

    /// Call any method and decode the result.
    ///
    /// # Errors
    ///
    /// Returns the RPC failure, or [`RpcError::Internal`] if the result
    /// does not decode as `T`.
    pub async fn call_typed<T: DeserializeOwned>(&self, method: Method, params: Value) -> DaemonResult<T> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| RpcError::Internal(format!("malformed {method} result: {e}")).into())
    }

    /// Open a streaming method.
    ///
    /// # Errors
    ///
    /// Returns the RPC failure.
    pub async fn subscribe(&self, method: Method, params: Value) -> DaemonResult<Subscription> {
        Ok(self.peer.subscribe(method.as_str(), params).await?)
    }

    /// `app_open`.
    ///
    /// # Errors
    ///
    /// Returns the RPC failure.
    pub async fn app_open(&self, app_id: &AppId, user_id: &UserId) -> DaemonResult<AppOpenResult> {
        let params = AppOpenParams {
            app_id: app_id.clone(),
            user_id: user_id.clone(),
        };
        self.call_typed(Method::AppOpen, to_params(&params)?).await
    }

    /// `app_close`.
    ///
    /// # Errors
    ///
    /// Returns the RPC failure.
    pub async fn app_close(&self, session_id: &SessionId) -> DaemonResult<()> {
        let params = SessionParams {
            session_id: session_id.clone(),
        };
        self.call(Method::AppClose, to_params(&params)?).await?;
        Ok(())
    }

    /// `app_setPermission`.
    ///
    /// # Errors
    ///
    /// Returns the RPC failure.
    pub async fn app_set_permission(
        &self,
        session_id: &SessionId,
        update: PermissionUpdate,
    ) -> DaemonResult<()> {
        let params = SetPermissionParams {
            session_id: session_id.clone(),
            update,
        };
        self.call(Method::AppSetPermission, to_params(&params)?).await?;
        Ok(())
    }

    /// `app_install`.
    ///
    /// # Errors
    ///
    /// Returns the RPC failure.
    pub async fn app_install(&self, user_id: &UserId, manifest: Value) -> DaemonResult<Value> {
        self.call(Method::AppInstall, json!({"userID": user_id, "manifest": manifest}))
            .await
    }

    /// `app_remove`.
    ///
    /// # Errors
    ///
    /// Returns the RPC failure.
    pub async fn app_remove(&self, app_id: &AppId) -> DaemonResult<()> {
        self.call(Method::AppRemove, json!({"appID": app_id})).await?;
        Ok(())
    }

    /// `app_getAll`.
    ///
    /// # Errors
    ///
    /// Returns the RPC failure.
    pub async fn app_get_all(&self) -> DaemonResult<Value> {
        self.call(Method::AppGetAll, Value::Null).await
    }

    /// `identity_createUser`.
    ///
    /// # Errors
    ///
    /// Returns the RPC failure.
    pub async fn identity_create_user(&self, profile: Value) -> DaemonResult<Value> {
        self.call(Method::IdentityCreateUser, json!({"profile": profile}))
            .await
    }

    /// `identity_getOwnUsers`.
    ///
    /// # Errors
    ///
    /// Returns the RPC failure.
    pub async fn identity_get_own_users(&self) -> DaemonResult<Value> {
        self.call(Method::IdentityGetOwnUsers, Value::Null).await
    }

    /// `vault_create`.
    ///
    /// # Errors
    ///
    /// Returns the RPC failure.
    pub async fn vault_create(&self, path: &Path, password: &str) -> DaemonResult<()> {
        self.call(
            Method::VaultCreate,
            json!({"path": path, "password": password}),
        )
        .await?;
        Ok(())
    }

    /// `vault_open`.
    ///
    /// # Errors
    ///
    /// Returns the RPC failure.
    pub async fn vault_open(&self, path: &Path, password: &str) -> DaemonResult<()> {
        self.call(Method::VaultOpen, json!({"path": path, "password": password}))
            .await?;
        Ok(())
    }

    /// Close the connection. In-flight calls fail with
    /// [`RpcError::TransportClosed`].
    pub fn close(&self) {
        self.peer.close();
    }

    /// Whether the connection has closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.peer.is_closed()
    }
}

fn to_params<T: serde::Serialize>(params: &T) -> DaemonResult<Value> {
    serde_json::to_value(params).map_err(|e| RpcError::internal(e).into())
}
