//! In-memory capability backends for daemon tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use mainframe_core::{AppId, UserId};
use mainframe_daemon::{
    AppBackend, AppOpenData, Backends, BlockchainBackend, IdentityBackend, PubSubBackend,
    StorageBackend, VaultBackend,
};
use mainframe_permissions::{PermissionRequirements, PermissionSettings, PermissionUpdate};
use mainframe_rpc::{RpcError, RpcResult};
use serde_json::{Value, json};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct AppRecord {
    manifest: Value,
    requirements: PermissionRequirements,
    settings: HashMap<UserId, PermissionSettings>,
}

/// Every capability backend, backed by maps in memory.
#[derive(Debug, Default)]
pub struct InMemoryBackends {
    apps: Mutex<HashMap<AppId, AppRecord>>,
    users: Mutex<Vec<Value>>,
    developers: Mutex<Vec<Value>>,
    vaults: Mutex<Vec<String>>,
    vault_settings: Mutex<Value>,
    storage: Mutex<HashMap<String, Value>>,
    transactions: Mutex<Vec<Value>>,
    topics: Mutex<Vec<mpsc::UnboundedSender<Value>>>,
    next_id: AtomicUsize,
}

fn str_param<'a>(params: &'a Value, key: &str) -> RpcResult<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::InvalidParams(format!("missing {key}")))
}

impl InMemoryBackends {
    /// Empty backends.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hand these backends to a dispatcher.
    #[must_use]
    pub fn backends(self: &Arc<Self>) -> Backends {
        Backends {
            apps: self.clone(),
            vault: self.clone(),
            identity: self.clone(),
            blockchain: self.clone(),
            pubsub: self.clone(),
            storage: self.clone(),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst).saturating_add(1))
    }

    /// Install an app directly.
    pub fn install_app(
        &self,
        app_id: impl Into<String>,
        manifest: Value,
        requirements: PermissionRequirements,
    ) -> AppId {
        let app_id = AppId::new(app_id);
        if let Ok(mut apps) = self.apps.lock() {
            apps.insert(
                app_id.clone(),
                AppRecord {
                    manifest,
                    requirements,
                    settings: HashMap::new(),
                },
            );
        }
        app_id
    }

    /// Stored settings of `user_id` for `app_id`.
    #[must_use]
    pub fn settings(&self, app_id: &AppId, user_id: &UserId) -> Option<PermissionSettings> {
        self.apps
            .lock()
            .ok()?
            .get(app_id)?
            .settings
            .get(user_id)
            .cloned()
    }

    /// Transactions sent so far.
    #[must_use]
    pub fn transactions(&self) -> Vec<Value> {
        self.transactions.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Push `item` to every open topic subscription. Returns how many
    /// received it.
    pub fn publish(&self, item: Value) -> usize {
        let Ok(mut topics) = self.topics.lock() else {
            return 0;
        };
        topics.retain(|tx| tx.send(item.clone()).is_ok());
        topics.len()
    }

    /// Topic subscriptions whose stream is still alive.
    #[must_use]
    pub fn live_topic_subscriptions(&self) -> usize {
        let Ok(mut topics) = self.topics.lock() else {
            return 0;
        };
        topics.retain(|tx| !tx.is_closed());
        topics.len()
    }
}

#[async_trait]
impl AppBackend for InMemoryBackends {
    async fn open(&self, app_id: &AppId, user_id: &UserId) -> RpcResult<AppOpenData> {
        let mut apps = self
            .apps
            .lock()
            .map_err(|_| RpcError::Internal("app store poisoned".into()))?;
        let record = apps
            .get_mut(app_id)
            .ok_or_else(|| RpcError::InvalidParams(format!("app not installed: {app_id}")))?;
        let requirements = record.requirements.clone();
        let settings = record
            .settings
            .entry(user_id.clone())
            .or_insert_with(|| PermissionSettings::new(requirements))
            .clone();
        Ok(AppOpenData {
            manifest: record.manifest.clone(),
            settings,
        })
    }

    async fn set_permission(
        &self,
        app_id: &AppId,
        user_id: &UserId,
        update: PermissionUpdate,
    ) -> RpcResult<()> {
        let mut apps = self
            .apps
            .lock()
            .map_err(|_| RpcError::Internal("app store poisoned".into()))?;
        let record = apps
            .get_mut(app_id)
            .ok_or_else(|| RpcError::InvalidParams(format!("app not installed: {app_id}")))?;
        let requirements = record.requirements.clone();
        record
            .settings
            .entry(user_id.clone())
            .or_insert_with(|| PermissionSettings::new(requirements))
            .apply(update);
        Ok(())
    }

    async fn install(&self, params: Value) -> RpcResult<Value> {
        let manifest = params.get("manifest").cloned().unwrap_or(Value::Null);
        let app_id = manifest
            .get("id")
            .and_then(Value::as_str)
            .map_or_else(|| self.next_id("app"), str::to_owned);
        let requirements = manifest
            .get("permissions")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(RpcError::invalid_params)?
            .unwrap_or_default();
        let app_id = self.install_app(app_id, manifest, requirements);
        Ok(json!({ "appID": app_id }))
    }

    async fn remove(&self, params: Value) -> RpcResult<Value> {
        let app_id = AppId::new(str_param(&params, "appID")?);
        if let Ok(mut apps) = self.apps.lock() {
            apps.remove(&app_id);
        }
        Ok(Value::Null)
    }

    async fn remove_own(&self, params: Value) -> RpcResult<Value> {
        self.remove(params).await
    }

    async fn get_all(&self, _params: Value) -> RpcResult<Value> {
        let apps = self
            .apps
            .lock()
            .map_err(|_| RpcError::Internal("app store poisoned".into()))?;
        let mut installed: Vec<Value> = apps
            .iter()
            .map(|(id, record)| json!({ "appID": id, "manifest": record.manifest }))
            .collect();
        installed.sort_by(|a, b| a["appID"].as_str().cmp(&b["appID"].as_str()));
        Ok(json!({ "apps": installed, "own": [] }))
    }

    async fn set_user_settings(&self, _params: Value) -> RpcResult<Value> {
        Ok(Value::Null)
    }

    async fn create(&self, _params: Value) -> RpcResult<Value> {
        let app_id = self.install_app(self.next_id("own"), Value::Null, PermissionRequirements::default());
        Ok(json!({ "appID": app_id }))
    }

    async fn get_manifest_data(&self, params: Value) -> RpcResult<Value> {
        let app_id = AppId::new(str_param(&params, "appID")?);
        self.apps
            .lock()
            .ok()
            .and_then(|apps| apps.get(&app_id).map(|r| r.manifest.clone()))
            .ok_or_else(|| RpcError::InvalidParams(format!("app not installed: {app_id}")))
    }

    async fn set_permissions_requirements(&self, _params: Value) -> RpcResult<Value> {
        Ok(Value::Null)
    }

    async fn publish_contents(&self, _params: Value) -> RpcResult<Value> {
        Ok(json!({ "contentsURI": "urn:test:contents" }))
    }

    async fn write_manifest(&self, _params: Value) -> RpcResult<Value> {
        Ok(Value::Null)
    }
}

#[async_trait]
impl VaultBackend for InMemoryBackends {
    async fn create(&self, params: Value) -> RpcResult<Value> {
        let path = str_param(&params, "path")?.to_owned();
        if let Ok(mut vaults) = self.vaults.lock() {
            vaults.push(path);
        }
        Ok(Value::Null)
    }

    async fn open(&self, params: Value) -> RpcResult<Value> {
        let path = str_param(&params, "path")?;
        let known = self
            .vaults
            .lock()
            .map(|v| v.iter().any(|p| p == path))
            .unwrap_or(false);
        if known {
            Ok(Value::Null)
        } else {
            Err(RpcError::InvalidParams(format!("unknown vault: {path}")))
        }
    }

    async fn get_settings(&self, _params: Value) -> RpcResult<Value> {
        Ok(self.vault_settings.lock().map(|g| g.clone()).unwrap_or_default())
    }

    async fn set_settings(&self, params: Value) -> RpcResult<Value> {
        if let Ok(mut g) = self.vault_settings.lock() {
            *g = params;
        }
        Ok(Value::Null)
    }
}

#[async_trait]
impl IdentityBackend for InMemoryBackends {
    async fn create_user(&self, params: Value) -> RpcResult<Value> {
        let id = self.next_id("user");
        if let Ok(mut users) = self.users.lock() {
            users.push(json!({ "id": id, "profile": params.get("profile") }));
        }
        Ok(json!({ "id": id }))
    }

    async fn create_developer(&self, params: Value) -> RpcResult<Value> {
        let id = self.next_id("developer");
        if let Ok(mut developers) = self.developers.lock() {
            developers.push(json!({ "id": id, "profile": params.get("profile") }));
        }
        Ok(json!({ "id": id }))
    }

    async fn get_own_users(&self, _params: Value) -> RpcResult<Value> {
        let users = self.users.lock().map(|g| g.clone()).unwrap_or_default();
        Ok(json!({ "users": users }))
    }

    async fn get_own_developers(&self, _params: Value) -> RpcResult<Value> {
        let developers = self.developers.lock().map(|g| g.clone()).unwrap_or_default();
        Ok(json!({ "developers": developers }))
    }
}

#[async_trait]
impl BlockchainBackend for InMemoryBackends {
    async fn get_contract_events(&self, _params: Value) -> RpcResult<Value> {
        Ok(json!([]))
    }

    async fn get_latest_block(&self, _params: Value) -> RpcResult<Value> {
        Ok(json!(1))
    }

    async fn read_contract(&self, _params: Value) -> RpcResult<Value> {
        Ok(Value::Null)
    }

    async fn send_transaction(&self, params: Value) -> RpcResult<Value> {
        let hash = format!("0x{:064x}", self.next_id.fetch_add(1, Ordering::SeqCst).saturating_add(1));
        if let Ok(mut txs) = self.transactions.lock() {
            txs.push(params);
        }
        Ok(json!({ "hash": hash }))
    }
}

#[async_trait]
impl PubSubBackend for InMemoryBackends {
    async fn base_addr(&self, _params: Value) -> RpcResult<Value> {
        Ok(json!("0xbase"))
    }

    async fn get_public_key(&self, _params: Value) -> RpcResult<Value> {
        Ok(json!("0xpublickey"))
    }

    async fn send_asym(&self, _params: Value) -> RpcResult<Value> {
        Ok(Value::Null)
    }

    async fn set_peer_public_key(&self, _params: Value) -> RpcResult<Value> {
        Ok(Value::Null)
    }

    async fn string_to_topic(&self, params: Value) -> RpcResult<Value> {
        let string = str_param(&params, "string")?;
        Ok(json!(format!("topic:{string}")))
    }

    async fn create_topic_subscription(&self, _params: Value) -> RpcResult<BoxStream<'static, Value>> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut topics) = self.topics.lock() {
            topics.push(tx);
        }
        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackends {
    async fn read(&self, params: Value) -> RpcResult<Value> {
        let key = str_param(&params, "key")?;
        Ok(self
            .storage
            .lock()
            .ok()
            .and_then(|g| g.get(key).cloned())
            .unwrap_or(Value::Null))
    }

    async fn write(&self, params: Value) -> RpcResult<Value> {
        let key = str_param(&params, "key")?.to_owned();
        let value = params.get("value").cloned().unwrap_or(Value::Null);
        if let Ok(mut g) = self.storage.lock() {
            g.insert(key, value);
        }
        Ok(Value::Null)
    }
}
