//! Capability backends the dispatcher forwards to.
//!
//! The handlers behind these traits (vault storage, identities, chain I/O,
//! pub/sub, decentralized storage) live outside this crate. Parameters and
//! results are passed through as JSON.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use mainframe_config::Environment;
use mainframe_core::{AppId, UserId};
use mainframe_permissions::{PermissionSettings, PermissionUpdate};
use mainframe_rpc::{RpcError, RpcResult};
use serde_json::Value;

use crate::error::DaemonResult;

/// What the app store knows about an app when an identity opens it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppOpenData {
    /// Stored manifest.
    pub manifest: Value,
    /// Declarations and the identity's grants.
    pub settings: PermissionSettings,
}

/// Installed apps and their per-identity settings.
#[async_trait]
pub trait AppBackend: Send + Sync {
    /// Load what is needed to open `app_id` for `user_id`.
    async fn open(&self, app_id: &AppId, user_id: &UserId) -> RpcResult<AppOpenData>;
    /// Persist a grant for `(app_id, user_id)`.
    async fn set_permission(
        &self,
        app_id: &AppId,
        user_id: &UserId,
        update: PermissionUpdate,
    ) -> RpcResult<()>;
    /// `app_install`.
    async fn install(&self, params: Value) -> RpcResult<Value>;
    /// `app_remove`.
    async fn remove(&self, params: Value) -> RpcResult<Value>;
    /// `app_removeOwn`.
    async fn remove_own(&self, params: Value) -> RpcResult<Value>;
    /// `app_getAll`.
    async fn get_all(&self, params: Value) -> RpcResult<Value>;
    /// `app_setUserSettings`.
    async fn set_user_settings(&self, params: Value) -> RpcResult<Value>;
    /// `app_create`.
    async fn create(&self, params: Value) -> RpcResult<Value>;
    /// `app_getManifestData`.
    async fn get_manifest_data(&self, params: Value) -> RpcResult<Value>;
    /// `app_setPermissionsRequirements`.
    async fn set_permissions_requirements(&self, params: Value) -> RpcResult<Value>;
    /// `app_publishContents`.
    async fn publish_contents(&self, params: Value) -> RpcResult<Value>;
    /// `app_writeManifest`.
    async fn write_manifest(&self, params: Value) -> RpcResult<Value>;
}

/// Encrypted vault lifecycle.
#[async_trait]
pub trait VaultBackend: Send + Sync {
    /// `vault_create`.
    async fn create(&self, params: Value) -> RpcResult<Value>;
    /// `vault_open`.
    async fn open(&self, params: Value) -> RpcResult<Value>;
    /// `vault_getSettings`.
    async fn get_settings(&self, params: Value) -> RpcResult<Value>;
    /// `vault_setSettings`.
    async fn set_settings(&self, params: Value) -> RpcResult<Value>;
}

/// User and developer identities.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// `identity_createUser`.
    async fn create_user(&self, params: Value) -> RpcResult<Value>;
    /// `identity_createDeveloper`.
    async fn create_developer(&self, params: Value) -> RpcResult<Value>;
    /// `identity_getOwnUsers`.
    async fn get_own_users(&self, params: Value) -> RpcResult<Value>;
    /// `identity_getOwnDevelopers`.
    async fn get_own_developers(&self, params: Value) -> RpcResult<Value>;
}

/// Chain reads and writes.
#[async_trait]
pub trait BlockchainBackend: Send + Sync {
    /// `blockchain_getContractEvents`.
    async fn get_contract_events(&self, params: Value) -> RpcResult<Value>;
    /// `blockchain_getLatestBlock`.
    async fn get_latest_block(&self, params: Value) -> RpcResult<Value>;
    /// `blockchain_readContract`.
    async fn read_contract(&self, params: Value) -> RpcResult<Value>;
    /// `blockchain_sendTransaction`.
    async fn send_transaction(&self, params: Value) -> RpcResult<Value>;
}

/// Pub/sub messaging.
#[async_trait]
pub trait PubSubBackend: Send + Sync {
    /// `pss_baseAddr`.
    async fn base_addr(&self, params: Value) -> RpcResult<Value>;
    /// `pss_getPublicKey`.
    async fn get_public_key(&self, params: Value) -> RpcResult<Value>;
    /// `pss_sendAsym`.
    async fn send_asym(&self, params: Value) -> RpcResult<Value>;
    /// `pss_setPeerPublicKey`.
    async fn set_peer_public_key(&self, params: Value) -> RpcResult<Value>;
    /// `pss_stringToTopic`.
    async fn string_to_topic(&self, params: Value) -> RpcResult<Value>;
    /// `pss_createTopicSubscription`. Dropping the stream ends the
    /// underlying subscription.
    async fn create_topic_subscription(
        &self,
        params: Value,
    ) -> RpcResult<BoxStream<'static, Value>>;
}

/// Decentralized key/value storage.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// `bluzelle_read`.
    async fn read(&self, params: Value) -> RpcResult<Value>;
    /// `bluzelle_write`.
    async fn write(&self, params: Value) -> RpcResult<Value>;
}

/// The set of backends one environment's dispatcher forwards to.
#[derive(Clone)]
pub struct Backends {
    /// App store.
    pub apps: Arc<dyn AppBackend>,
    /// Vaults.
    pub vault: Arc<dyn VaultBackend>,
    /// Identities.
    pub identity: Arc<dyn IdentityBackend>,
    /// Chain access.
    pub blockchain: Arc<dyn BlockchainBackend>,
    /// Pub/sub.
    pub pubsub: Arc<dyn PubSubBackend>,
    /// Key/value storage.
    pub storage: Arc<dyn StorageBackend>,
}

impl Backends {
    /// Backends that fail every call, for a daemon with no handlers wired.
    #[must_use]
    pub fn unconfigured() -> Self {
        let none = Arc::new(Unconfigured);
        Self {
            apps: none.clone(),
            vault: none.clone(),
            identity: none.clone(),
            blockchain: none.clone(),
            pubsub: none.clone(),
            storage: none,
        }
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

/// Builds the backends for an environment when its server is created.
pub trait BackendProvider: Send + Sync {
    /// Backends rooted at `env` (typically under `env.storage_root()`).
    ///
    /// # Errors
    ///
    /// Returns an error if the backends cannot be initialized.
    fn backends(&self, env: &Environment) -> DaemonResult<Backends>;
}

impl<F> BackendProvider for F
where
    F: Fn(&Environment) -> DaemonResult<Backends> + Send + Sync,
{
    fn backends(&self, env: &Environment) -> DaemonResult<Backends> {
        self(env)
    }
}

struct Unconfigured;

fn unconfigured<T>() -> RpcResult<T> {
    Err(RpcError::Internal("no capability handler configured".into()))
}

#[async_trait]
impl AppBackend for Unconfigured {
    async fn open(&self, _: &AppId, _: &UserId) -> RpcResult<AppOpenData> {
        unconfigured()
    }
    async fn set_permission(&self, _: &AppId, _: &UserId, _: PermissionUpdate) -> RpcResult<()> {
        unconfigured()
    }
    async fn install(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn remove(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn remove_own(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn get_all(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn set_user_settings(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn create(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn get_manifest_data(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn set_permissions_requirements(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn publish_contents(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn write_manifest(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
}

#[async_trait]
impl VaultBackend for Unconfigured {
    async fn create(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn open(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn get_settings(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn set_settings(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
}

#[async_trait]
impl IdentityBackend for Unconfigured {
    async fn create_user(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn create_developer(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn get_own_users(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn get_own_developers(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
}

#[async_trait]
impl BlockchainBackend for Unconfigured {
    async fn get_contract_events(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn get_latest_block(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn read_contract(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn send_transaction(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
}

#[async_trait]
impl PubSubBackend for Unconfigured {
    async fn base_addr(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn get_public_key(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn send_asym(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn set_peer_public_key(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn string_to_topic(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn create_topic_subscription(&self, _: Value) -> RpcResult<BoxStream<'static, Value>> {
        unconfigured()
    }
}

#[async_trait]
impl StorageBackend for Unconfigured {
    async fn read(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
    async fn write(&self, _: Value) -> RpcResult<Value> {
        unconfigured()
    }
}
