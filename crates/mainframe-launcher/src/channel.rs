//! The app's trusted channel to the daemon.

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use mainframe_core::{API_VERSION, SessionId};
use mainframe_daemon::api::{UnsubscribeParams, parse_params};
use mainframe_daemon::{DaemonError, MainframeClient, Method};
use mainframe_permissions::{Capability, Evaluation, PermissionCheck};
use mainframe_rpc::{CallContext, Reply, RpcError, RpcResult, RpcService};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::context::AppContext;

/// Serves calls an app makes on its trusted channel.
///
/// Each call is scoped to the context's session: the `sessID` is injected,
/// privileged methods are checked against the context's grants, and the
/// call is forwarded to the daemon. Launcher-only methods are refused.
pub(crate) struct TrustedChannel {
    context: OnceLock<Weak<AppContext>>,
    client: MainframeClient,
}

impl TrustedChannel {
    pub(crate) fn new(client: MainframeClient) -> Self {
        Self {
            context: OnceLock::new(),
            client,
        }
    }

    pub(crate) fn bind(&self, context: &Arc<AppContext>) {
        if self.context.set(Arc::downgrade(context)).is_err() {
            debug!("trusted channel already bound");
        }
    }

    fn context(&self) -> RpcResult<Arc<AppContext>> {
        self.context
            .get()
            .and_then(Weak::upgrade)
            .ok_or(RpcError::TransportClosed)
    }
}

/// Whether an app may call `method` on its own behalf.
pub(crate) fn app_callable(method: Method) -> bool {
    method == Method::AppCheckPermission
        || matches!(method.namespace(), Some("blockchain" | "pss" | "bluzelle"))
}

fn with_session(params: Value, session_id: &SessionId) -> RpcResult<Value> {
    let mut map = match params {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        _ => return Err(RpcError::InvalidParams("params must be an object".into())),
    };
    map.insert("sessID".into(), json!(session_id.as_str()));
    Ok(Value::Object(map))
}

fn upstream(err: DaemonError) -> RpcError {
    match err {
        DaemonError::Rpc(e) => e,
        other => RpcError::internal(other),
    }
}

#[async_trait]
impl RpcService for TrustedChannel {
    async fn call(&self, ctx: &CallContext, method: &str, params: Value) -> RpcResult<Reply> {
        let method: Method = method.parse()?;
        match method {
            Method::ApiVersion => return Reply::json(&API_VERSION),
            Method::SubUnsubscribe => {
                let UnsubscribeParams { id } = parse_params(params)?;
                ctx.subscriptions().unsubscribe(&id);
                return Ok(Reply::null());
            },
            m if !app_callable(m) => {
                debug!(method = %m, "app called a launcher-only method");
                return Err(RpcError::PermissionDenied);
            },
            _ => {},
        }

        let context = self.context()?;
        if let Some(capability) = method.required_capability() {
            let check = match capability {
                Capability::ChainWrite => PermissionCheck::ChainWrite,
                Capability::NetworkEgress => return Err(RpcError::PermissionDenied),
            };
            if context.evaluate(&check) != Evaluation::Granted {
                debug!(app = %context.app_id(), %method, "privileged call refused");
                return Err(RpcError::PermissionDenied);
            }
        }

        let params = with_session(params, context.session_id())?;
        if method.is_streaming() {
            let subscription = self
                .client
                .subscribe(method, params)
                .await
                .map_err(upstream)?;
            return Ok(Reply::Stream(subscription.into_stream()));
        }
        self.client
            .call(method, params)
            .await
            .map(Reply::Value)
            .map_err(upstream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apps_cannot_reach_launcher_methods() {
        assert!(app_callable(Method::BlockchainSendTransaction));
        assert!(app_callable(Method::PssCreateTopicSubscription));
        assert!(app_callable(Method::AppCheckPermission));
        assert!(!app_callable(Method::AppSetPermission));
        assert!(!app_callable(Method::AppClose));
        assert!(!app_callable(Method::VaultOpen));
        assert!(!app_callable(Method::IdentityGetOwnUsers));
    }

    #[test]
    fn session_is_injected() {
        let id = SessionId::from_string("s1");
        assert_eq!(with_session(Value::Null, &id).unwrap(), json!({"sessID": "s1"}));
        assert_eq!(
            with_session(json!({"sessID": "spoofed", "x": 1}), &id).unwrap(),
            json!({"sessID": "s1", "x": 1})
        );
        assert!(with_session(json!([1]), &id).is_err());
    }
}
