//! Manifest loading collaborator.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::LauncherResult;

/// Reads app manifests from disk for installation.
#[async_trait]
pub trait ManifestLoader: Send + Sync {
    /// Load and verify the manifest at `path`.
    async fn read_manifest(&self, path: &Path) -> LauncherResult<Value>;
}
