//! Shared setup for the end-to-end tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use mainframe_core::{AppId, UserId};
use mainframe_daemon::MainframeClient;
use mainframe_launcher::ContextRegistry;
use mainframe_permissions::{PermissionDeclarations, PermissionRequirements};
use mainframe_rpc::PeerConfig;
use mainframe_test::{MockPrompt, MockWindowFactory, TestDaemon};
use serde_json::json;

/// A daemon plus a launcher registry connected to it.
pub struct Launcher {
    pub daemon: TestDaemon,
    pub client: MainframeClient,
    pub windows: Arc<MockWindowFactory>,
    pub prompt: Arc<MockPrompt>,
    pub registry: Arc<ContextRegistry>,
}

pub async fn launcher() -> Launcher {
    launcher_with(MockWindowFactory::new(), MockPrompt::new(), Duration::from_secs(5)).await
}

pub async fn launcher_with(
    windows: MockWindowFactory,
    prompt: MockPrompt,
    prompt_timeout: Duration,
) -> Launcher {
    let daemon = TestDaemon::start().await;
    let client = daemon.client().await;
    let windows = Arc::new(windows);
    let prompt = Arc::new(prompt);
    let registry = Arc::new(
        ContextRegistry::new(client.clone(), windows.clone())
            .with_prompt_timeout(prompt_timeout)
            .with_channel_config(PeerConfig::new("trusted").with_timeout(Duration::from_secs(5))),
    );
    registry.enforcer().set_prompt(prompt.clone());
    Launcher {
        daemon,
        client,
        windows,
        prompt,
        registry,
    }
}

/// Install an app whose manifest optionally asks for `hosts` and
/// chain-write.
pub fn install_app(daemon: &TestDaemon, id: &str, hosts: &[&str], chain_write: bool) -> AppId {
    let requirements = PermissionRequirements {
        required: PermissionDeclarations::default(),
        optional: PermissionDeclarations {
            web_request: hosts.iter().map(|h| (*h).to_owned()).collect(),
            blockchain_send: chain_write,
        },
    };
    daemon
        .backends
        .install_app(id, json!({ "id": id, "name": format!("App {id}") }), requirements)
}

pub fn user(id: &str) -> UserId {
    UserId::new(id)
}

/// Poll `condition` until it holds, failing after five seconds.
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}
