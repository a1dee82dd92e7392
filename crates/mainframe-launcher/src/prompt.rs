//! Asking an identity for a permission decision.

use async_trait::async_trait;
use mainframe_core::{AppId, UserId};
use mainframe_permissions::PermissionCheck;

/// A pending decision, presented to the identity owning the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    /// App asking.
    pub app_id: AppId,
    /// Identity deciding.
    pub user_id: UserId,
    /// What the app wants to do.
    pub check: PermissionCheck,
}

/// The identity's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptDecision {
    /// Whether the request may proceed.
    pub allow: bool,
    /// Whether to store the answer as a grant.
    pub remember: bool,
}

impl PromptDecision {
    /// Allow this request and identical ones for the context's lifetime.
    #[must_use]
    pub fn allow_once() -> Self {
        Self {
            allow: true,
            remember: false,
        }
    }

    /// Allow and store the grant.
    #[must_use]
    pub fn allow_always() -> Self {
        Self {
            allow: true,
            remember: true,
        }
    }

    /// Deny for the context's lifetime.
    #[must_use]
    pub fn deny_once() -> Self {
        Self {
            allow: false,
            remember: false,
        }
    }

    /// Deny and store the refusal.
    #[must_use]
    pub fn deny_always() -> Self {
        Self {
            allow: false,
            remember: true,
        }
    }
}

/// UI that presents permission requests.
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    /// Ask and wait. `None` means no answer.
    async fn request_permission(&self, request: PermissionRequest) -> Option<PromptDecision>;

    /// Whether the prompt can currently be shown.
    fn is_available(&self) -> bool {
        true
    }
}
