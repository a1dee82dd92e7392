//! Client against a live environment server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mainframe_config::{Environment, EnvironmentType, MainframeHome};
use mainframe_core::{AppId, SessionId, UserId};
use mainframe_daemon::prelude::*;
use mainframe_rpc::{CallContext, NoService, PeerConfig, Reply, RpcError, RpcResult, RpcService, bridge};
use serde_json::{Value, json};

fn registry(dir: &tempfile::TempDir) -> EnvironmentRegistry {
    let home = MainframeHome::from_path(dir.path());
    Environment::create(&home, "dev", EnvironmentType::Development).unwrap();
    let provider = |_: &Environment| -> DaemonResult<Backends> { Ok(Backends::unconfigured()) };
    EnvironmentRegistry::new(home, Arc::new(provider))
}

#[tokio::test]
async fn connect_checks_version_and_calls() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(&dir);
    let server = registry.start("dev").await.unwrap();
    let path = server.socket_path().await.unwrap();

    let client = MainframeClient::connect(&path, PeerConfig::new("test"))
        .await
        .unwrap();
    assert!((client.api_version().await.unwrap() - 0.1).abs() < f64::EPSILON);

    let err = client
        .app_close(&SessionId::from_string("missing"))
        .await
        .unwrap_err();
    assert_eq!(err.as_rpc(), Some(&RpcError::SessionNotFound));

    let err = client
        .app_open(&AppId::new("app"), &UserId::new("user"))
        .await
        .unwrap_err();
    assert!(matches!(err.as_rpc(), Some(RpcError::Internal(_))));

    registry.stop("dev").await.unwrap();
}

#[tokio::test]
async fn stopping_the_server_closes_clients() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(&dir);
    let server = registry.start("dev").await.unwrap();
    let path = server.socket_path().await.unwrap();

    let client = MainframeClient::connect(&path, PeerConfig::new("test"))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.connection_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    registry.stop("dev").await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), client.peer().closed())
        .await
        .unwrap();
    assert!(client.is_closed());
    assert!(matches!(
        client.api_version().await.unwrap_err().as_rpc(),
        Some(RpcError::TransportClosed)
    ));
}

#[tokio::test]
async fn connect_to_missing_socket_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = MainframeClient::connect(dir.path().join("nope.ipc"), PeerConfig::new("test"))
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::Connect { .. }));
}

struct FutureDaemon;

#[async_trait]
impl RpcService for FutureDaemon {
    async fn call(&self, _ctx: &CallContext, method: &str, _params: Value) -> RpcResult<Reply> {
        match method {
            "api_version" => Ok(Reply::Value(json!(9.9))),
            other => Err(RpcError::MethodNotFound(other.to_owned())),
        }
    }
}

#[tokio::test]
async fn version_mismatch_is_reported() {
    let (client_end, _daemon_end) = bridge(
        Arc::new(NoService),
        Arc::new(FutureDaemon),
        &PeerConfig::new("test"),
    );
    let client = MainframeClient::from_peer(client_end);
    let err = client.check_version().await.unwrap_err();
    assert!(matches!(err.as_rpc(), Some(RpcError::VersionMismatch(_))));
}
