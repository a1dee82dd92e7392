//! The launcher window's channel.

mod common;

use std::sync::Arc;

use common::{launcher, user};
use mainframe_config::VaultConfig;
use mainframe_core::AppId;
use mainframe_launcher::LauncherContext;
use mainframe_rpc::{NoService, PeerConfig, RpcError, RpcPeer, bridge};
use mainframe_test::MockManifestLoader;
use serde_json::json;

struct Served {
    context: Arc<LauncherContext>,
    ui: RpcPeer,
}

fn serve(l: &common::Launcher, manifests: MockManifestLoader) -> Served {
    let vaults = VaultConfig::load(&l.daemon.env).unwrap();
    let context = Arc::new(LauncherContext::new(
        l.registry.clone(),
        Arc::new(manifests),
        vaults,
    ));
    let (_, ui) = bridge(context.clone(), Arc::new(NoService), &PeerConfig::new("launcher"));
    Served { context, ui }
}

#[tokio::test]
async fn installs_lists_and_launches_apps() {
    let l = launcher().await;
    let Served { ui, .. } = serve(&l, MockManifestLoader::new());

    let installed = ui
        .request(
            "installApp",
            json!({ "userID": "bob", "manifest": { "id": "notes", "name": "Notes" } }),
        )
        .await
        .unwrap();
    assert_eq!(installed["appID"], "notes");

    let all = ui.request("getInstalledApps", json!(null)).await.unwrap();
    assert_eq!(all["apps"][0]["appID"], "notes");

    let launched = ui
        .request("launchApp", json!({ "appID": "notes", "userID": "bob" }))
        .await
        .unwrap();
    assert_eq!(launched["appSession"]["appID"], "notes");
    assert_eq!(launched["appSession"]["userID"], "bob");
    assert_eq!(l.windows.created(), 1);
    assert_eq!(l.windows.last().unwrap().request().title, "Notes");

    ui.request("removeApp", json!({ "appID": "notes" }))
        .await
        .unwrap();
    let all = ui.request("getInstalledApps", json!(null)).await.unwrap();
    assert_eq!(all["apps"], json!([]));
}

#[tokio::test]
async fn launching_a_missing_app_reports_the_daemon_error() {
    let l = launcher().await;
    let Served { ui, .. } = serve(&l, MockManifestLoader::new());

    let err = ui
        .request("launchApp", json!({ "appID": "ghost", "userID": "bob" }))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::InvalidParams(_)));
    assert!(l.registry.is_empty());
}

#[tokio::test]
async fn reads_manifests_through_the_loader() {
    let l = launcher().await;
    let loader = MockManifestLoader::new()
        .with_manifest("/apps/notes/manifest.json", json!({ "name": "Notes" }));
    let Served { ui, .. } = serve(&l, loader);

    let manifest = ui
        .request("readManifest", json!({ "path": "/apps/notes/manifest.json" }))
        .await
        .unwrap();
    assert_eq!(manifest["name"], "Notes");

    let err = ui
        .request("readManifest", json!({ "path": "/nowhere.json" }))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::InvalidParams(_)));
}

#[tokio::test]
async fn manages_user_identities() {
    let l = launcher().await;
    let Served { ui, .. } = serve(&l, MockManifestLoader::new());

    let created = ui
        .request("createUserIdentity", json!({ "profile": { "name": "Bob" } }))
        .await
        .unwrap();
    assert!(created["id"].is_string());

    let users = ui.request("getOwnUserIdentities", json!(null)).await.unwrap();
    assert_eq!(users["users"][0]["profile"]["name"], "Bob");
}

#[tokio::test]
async fn vaults_are_remembered() {
    let l = launcher().await;
    let Served { context, ui, .. } = serve(&l, MockManifestLoader::new());

    let data = ui.request("getVaultsData", json!(null)).await.unwrap();
    assert_eq!(data["vaults"], json!({}));
    assert_eq!(data["defaultVault"], json!(null));
    assert_eq!(data["vaultOpen"], false);

    let err = ui
        .request("openVault", json!({ "path": "/vaults/main", "password": "pw" }))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::InvalidParams(_)));
    assert!(!context.vaults_data().vault_open);

    ui.request(
        "createVault",
        json!({ "path": "/vaults/main", "password": "pw", "label": "Main" }),
    )
    .await
    .unwrap();
    let data = ui.request("getVaultsData", json!(null)).await.unwrap();
    assert_eq!(data["vaults"]["/vaults/main"], "Main");
    assert_eq!(data["defaultVault"], "/vaults/main");
    assert_eq!(data["vaultOpen"], true);

    ui.request("openVault", json!({ "path": "/vaults/main", "password": "pw" }))
        .await
        .unwrap();

    let stored = VaultConfig::load(&l.daemon.env).unwrap();
    assert_eq!(
        stored.default_vault(),
        Some(std::path::Path::new("/vaults/main"))
    );
}

#[tokio::test]
async fn unknown_and_malformed_requests_are_rejected() {
    let l = launcher().await;
    let Served { ui, .. } = serve(&l, MockManifestLoader::new());

    let err = ui.request("formatDisk", json!(null)).await.unwrap_err();
    assert!(matches!(err, RpcError::MethodNotFound(_)));

    let err = ui.request("launchApp", json!({ "appID": 7 })).await.unwrap_err();
    assert!(matches!(err, RpcError::InvalidParams(_)));
}

#[tokio::test]
async fn clearing_closes_every_app() {
    let l = launcher().await;
    common::install_app(&l.daemon, "notes", &[], false);
    let Served { context, ui, .. } = serve(&l, MockManifestLoader::new());

    ui.request("launchApp", json!({ "appID": "notes", "userID": "bob" }))
        .await
        .unwrap();
    assert!(l.registry.get(&AppId::new("notes"), &user("bob")).is_some());

    context.clear().await;
    assert!(l.registry.is_empty());
    assert!(l.daemon.server().dispatcher().sessions().is_empty());
}
