//! Method dispatch and session-scoped permission checks.

use std::sync::Arc;

use async_trait::async_trait;
use mainframe_core::{API_VERSION, SessionId};
use mainframe_permissions::{Capability, Evaluation, PermissionCheck};
use mainframe_rpc::{CallContext, Reply, RpcError, RpcResult, RpcService};
use serde_json::{Value, json};
use tracing::debug;

use crate::api::{
    AppOpenParams, AppOpenResult, CheckPermissionParams, PermissionStatus, SessionParams,
    SetPermissionParams, UnsubscribeParams, parse_params,
};
use crate::backend::Backends;
use crate::method::Method;
use crate::session::SessionRegistry;

/// Routes decoded calls to the session logic or the capability backends.
///
/// Session-scoped calls carrying a `sessID` resolve the session first
/// (unknown → [`RpcError::SessionNotFound`]); privileged calls must carry
/// one and its grants must allow the call (otherwise
/// [`RpcError::PermissionDenied`]).
#[derive(Debug)]
pub struct Dispatcher {
    backends: Backends,
    sessions: Arc<SessionRegistry>,
}

impl Dispatcher {
    /// Dispatcher with its own session registry.
    #[must_use]
    pub fn new(backends: Backends) -> Self {
        Self::with_sessions(backends, Arc::new(SessionRegistry::new()))
    }

    /// Dispatcher sharing an existing session registry.
    #[must_use]
    pub fn with_sessions(backends: Backends, sessions: Arc<SessionRegistry>) -> Self {
        Self { backends, sessions }
    }

    /// Open sessions.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Handle one call.
    ///
    /// # Errors
    ///
    /// Returns the typed error for the failure; never panics on bad input.
    pub async fn dispatch(
        &self,
        ctx: &CallContext,
        method: Method,
        params: Value,
    ) -> RpcResult<Reply> {
        if method.is_session_scoped() {
            self.authorize(method, &params)?;
        }

        let b = &self.backends;
        let value = match method {
            Method::ApiVersion => json!(API_VERSION),

            Method::AppOpen => return self.app_open(params).await,
            Method::AppClose => self.app_close(params)?,
            Method::AppCheckPermission => self.app_check_permission(params)?,
            Method::AppSetPermission => self.app_set_permission(params).await?,
            Method::AppUninstall | Method::AppUpdate => Value::Null,
            Method::AppInstall => b.apps.install(params).await?,
            Method::AppRemove => b.apps.remove(params).await?,
            Method::AppRemoveOwn => b.apps.remove_own(params).await?,
            Method::AppGetAll => b.apps.get_all(params).await?,
            Method::AppSetUserSettings => b.apps.set_user_settings(params).await?,
            Method::AppCreate => b.apps.create(params).await?,
            Method::AppGetManifestData => b.apps.get_manifest_data(params).await?,
            Method::AppSetPermissionsRequirements => {
                b.apps.set_permissions_requirements(params).await?
            },
            Method::AppPublishContents => b.apps.publish_contents(params).await?,
            Method::AppWriteManifest => b.apps.write_manifest(params).await?,

            Method::BlockchainGetContractEvents => {
                b.blockchain.get_contract_events(params).await?
            },
            Method::BlockchainGetLatestBlock => b.blockchain.get_latest_block(params).await?,
            Method::BlockchainReadContract => b.blockchain.read_contract(params).await?,
            Method::BlockchainSendTransaction => b.blockchain.send_transaction(params).await?,

            Method::IdentityCreateUser => b.identity.create_user(params).await?,
            Method::IdentityCreateDeveloper => b.identity.create_developer(params).await?,
            Method::IdentityGetOwnUsers => b.identity.get_own_users(params).await?,
            Method::IdentityGetOwnDevelopers => b.identity.get_own_developers(params).await?,

            Method::PssBaseAddr => b.pubsub.base_addr(params).await?,
            Method::PssCreateTopicSubscription => {
                let stream = b.pubsub.create_topic_subscription(params).await?;
                return Ok(Reply::Stream(stream));
            },
            Method::PssGetPublicKey => b.pubsub.get_public_key(params).await?,
            Method::PssSendAsym => b.pubsub.send_asym(params).await?,
            Method::PssSetPeerPublicKey => b.pubsub.set_peer_public_key(params).await?,
            Method::PssStringToTopic => b.pubsub.string_to_topic(params).await?,

            Method::BluzelleRead => b.storage.read(params).await?,
            Method::BluzelleWrite => b.storage.write(params).await?,

            Method::SubUnsubscribe => {
                let UnsubscribeParams { id } = parse_params(params)?;
                ctx.subscriptions().unsubscribe(&id);
                Value::Null
            },

            Method::VaultCreate => b.vault.create(params).await?,
            Method::VaultGetSettings => b.vault.get_settings(params).await?,
            Method::VaultOpen => b.vault.open(params).await?,
            Method::VaultSetSettings => b.vault.set_settings(params).await?,
        };
        Ok(Reply::Value(value))
    }

    /// Resolve the caller's session and check the method's capability.
    fn authorize(&self, method: Method, params: &Value) -> RpcResult<()> {
        let session_id = match params.get("sessID") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(SessionId::from_string(id.clone())),
            Some(_) => return Err(RpcError::InvalidParams("sessID must be a string".into())),
        };

        let Some(session_id) = session_id else {
            if method.required_capability().is_some() {
                debug!(%method, "privileged call without a session");
                return Err(RpcError::PermissionDenied);
            }
            if method.requires_session() {
                debug!(%method, "session call without a session");
                return Err(RpcError::SessionNotFound);
            }
            return Ok(());
        };

        let entry = self
            .sessions
            .get(&session_id)
            .ok_or(RpcError::SessionNotFound)?;

        if let Some(capability) = method.required_capability() {
            let allowed = match capability {
                Capability::ChainWrite => {
                    entry.settings.evaluate(&PermissionCheck::ChainWrite) == Evaluation::Granted
                },
                // Per-destination capabilities are enforced at the sandbox
                // boundary, never through a method call.
                Capability::NetworkEgress => false,
            };
            if !allowed {
                debug!(%method, session = %session_id, "capability check failed");
                return Err(RpcError::PermissionDenied);
            }
        }
        Ok(())
    }

    async fn app_open(&self, params: Value) -> RpcResult<Reply> {
        let AppOpenParams { app_id, user_id } = parse_params(params)?;
        let data = self.backends.apps.open(&app_id, &user_id).await?;
        let session = self.sessions.open(app_id, user_id, data.settings.clone());
        Reply::json(&AppOpenResult {
            session,
            permissions: data.settings,
            manifest: data.manifest,
        })
    }

    fn app_close(&self, params: Value) -> RpcResult<Value> {
        let SessionParams { session_id } = parse_params(params)?;
        self.sessions
            .close(&session_id)
            .ok_or(RpcError::SessionNotFound)?;
        Ok(Value::Null)
    }

    fn app_check_permission(&self, params: Value) -> RpcResult<Value> {
        let CheckPermissionParams {
            session_id,
            key,
            input,
        } = parse_params(params)?;
        let entry = self
            .sessions
            .get(&session_id)
            .ok_or(RpcError::SessionNotFound)?;

        let check = match key {
            Capability::ChainWrite => PermissionCheck::ChainWrite,
            Capability::NetworkEgress => {
                let input = input.ok_or_else(|| {
                    RpcError::InvalidParams("WEB_REQUEST needs an input".into())
                })?;
                if input.contains("://") {
                    PermissionCheck::network_request(&input).map_err(RpcError::invalid_params)?
                } else {
                    PermissionCheck::host(&input)
                }
            },
        };
        let status = PermissionStatus::from(entry.settings.evaluate(&check));
        serde_json::to_value(status).map_err(RpcError::internal)
    }

    async fn app_set_permission(&self, params: Value) -> RpcResult<Value> {
        let SetPermissionParams { session_id, update } = parse_params(params)?;
        let entry = self
            .sessions
            .get(&session_id)
            .ok_or(RpcError::SessionNotFound)?;

        self.backends
            .apps
            .set_permission(&entry.session.app_id, &entry.session.user_id, update.clone())
            .await?;
        self.sessions
            .update_settings(&session_id, |settings| settings.apply(update))
            .ok_or(RpcError::SessionNotFound)?;
        Ok(Value::Null)
    }
}

#[async_trait]
impl RpcService for Dispatcher {
    async fn call(&self, ctx: &CallContext, method: &str, params: Value) -> RpcResult<Reply> {
        let method: Method = method.parse()?;
        self.dispatch(ctx, method, params).await
    }
}
