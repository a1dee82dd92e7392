//! The launcher window's trusted channel.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use mainframe_config::VaultConfig;
use mainframe_core::{AppId, UserId};
use mainframe_daemon::MainframeClient;
use mainframe_daemon::api::parse_params;
use mainframe_rpc::{CallContext, Reply, RpcError, RpcResult, RpcService};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::error::LauncherResult;
use crate::manifest::ManifestLoader;
use crate::registry::ContextRegistry;

#[derive(Debug, Deserialize)]
struct InstallAppParams {
    #[serde(rename = "userID")]
    user_id: UserId,
    manifest: Value,
}

#[derive(Debug, Deserialize)]
struct RemoveAppParams {
    #[serde(rename = "appID")]
    app_id: AppId,
}

#[derive(Debug, Deserialize)]
struct LaunchAppParams {
    #[serde(rename = "appID")]
    app_id: AppId,
    #[serde(rename = "userID")]
    user_id: UserId,
}

#[derive(Debug, Deserialize)]
struct ReadManifestParams {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CreateUserParams {
    #[serde(default)]
    profile: Value,
}

#[derive(Debug, Deserialize)]
struct CreateVaultParams {
    path: PathBuf,
    password: String,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenVaultParams {
    path: PathBuf,
    password: String,
}

/// What `getVaultsData` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultsData {
    /// Known vault paths and their labels.
    pub vaults: Map<String, Value>,
    /// The vault opened by default.
    pub default_vault: Option<String>,
    /// Whether a vault is open in this launcher session.
    pub vault_open: bool,
}

/// Serves the launcher window: installed apps, identities, vaults and app
/// launches.
pub struct LauncherContext {
    registry: Arc<ContextRegistry>,
    manifests: Arc<dyn ManifestLoader>,
    vaults: Mutex<VaultConfig>,
    vault_open: AtomicBool,
}

impl LauncherContext {
    /// Launcher context driving `registry` and recording vaults in `vaults`.
    #[must_use]
    pub fn new(
        registry: Arc<ContextRegistry>,
        manifests: Arc<dyn ManifestLoader>,
        vaults: VaultConfig,
    ) -> Self {
        Self {
            registry,
            manifests,
            vaults: Mutex::new(vaults),
            vault_open: AtomicBool::new(false),
        }
    }

    /// The context registry launches go through.
    #[must_use]
    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    fn client(&self) -> &MainframeClient {
        self.registry.client()
    }

    fn lock_vaults(&self) -> MutexGuard<'_, VaultConfig> {
        self.vaults.lock().unwrap_or_else(|e| {
            warn!("LauncherContext vault lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Snapshot of the known vaults.
    #[must_use]
    pub fn vaults_data(&self) -> VaultsData {
        let vaults = self.lock_vaults();
        VaultsData {
            vaults: vaults
                .vaults()
                .map(|(path, label)| (path.to_owned(), json!(label)))
                .collect(),
            default_vault: vaults.default_vault().map(|p| p.display().to_string()),
            vault_open: self.vault_open.load(Ordering::SeqCst),
        }
    }

    fn remember_vault(&self, path: &std::path::Path, label: Option<String>) -> LauncherResult<()> {
        let mut vaults = self.lock_vaults();
        if let Some(label) = label {
            vaults.set_label(path, label)?;
        }
        vaults.set_default(path)?;
        Ok(())
    }

    /// Tear down every app context. Called when the launcher window closes.
    pub async fn clear(&self) {
        self.registry.close_all().await;
        info!("launcher context cleared");
    }

    async fn handle(&self, method: &str, params: Value) -> LauncherResult<Value> {
        let value = match method {
            "getInstalledApps" => self.client().app_get_all().await?,
            "installApp" => {
                let p: InstallAppParams = parse_params(params)?;
                self.client().app_install(&p.user_id, p.manifest).await?
            },
            "removeApp" => {
                let p: RemoveAppParams = parse_params(params)?;
                self.client().app_remove(&p.app_id).await?;
                Value::Null
            },
            "launchApp" => {
                let p: LaunchAppParams = parse_params(params)?;
                let context = self.registry.launch(&p.app_id, &p.user_id).await?;
                json!({ "appSession": context.session() })
            },
            "readManifest" => {
                let p: ReadManifestParams = parse_params(params)?;
                self.manifests.read_manifest(&p.path).await?
            },
            "createUserIdentity" => {
                let p: CreateUserParams = parse_params(params)?;
                self.client().identity_create_user(p.profile).await?
            },
            "getOwnUserIdentities" => self.client().identity_get_own_users().await?,
            "getVaultsData" => serde_json::to_value(self.vaults_data()).map_err(RpcError::internal)?,
            "createVault" => {
                let p: CreateVaultParams = parse_params(params)?;
                self.client().vault_create(&p.path, &p.password).await?;
                self.remember_vault(&p.path, p.label)?;
                self.vault_open.store(true, Ordering::SeqCst);
                info!(path = %p.path.display(), "vault created");
                Value::Null
            },
            "openVault" => {
                let p: OpenVaultParams = parse_params(params)?;
                self.client().vault_open(&p.path, &p.password).await?;
                self.remember_vault(&p.path, None)?;
                self.vault_open.store(true, Ordering::SeqCst);
                info!(path = %p.path.display(), "vault opened");
                Value::Null
            },
            other => return Err(RpcError::MethodNotFound(other.to_owned()).into()),
        };
        Ok(value)
    }
}

impl std::fmt::Debug for LauncherContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LauncherContext")
            .field("registry", &self.registry)
            .field("vault_open", &self.vault_open.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RpcService for LauncherContext {
    async fn call(&self, _ctx: &CallContext, method: &str, params: Value) -> RpcResult<Reply> {
        self.handle(method, params)
            .await
            .map(Reply::Value)
            .map_err(|e| e.to_rpc())
    }
}
