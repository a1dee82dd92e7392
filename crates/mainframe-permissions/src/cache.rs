//! Session-lifetime cache of un-remembered decisions.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::capability::PermissionCheck;

/// Decisions an identity made without asking to remember them.
///
/// Lives as long as the owning app context. Identical checks are answered
/// from here instead of prompting again; [`revoke_all`](Self::revoke_all)
/// forgets everything when the context is torn down.
#[derive(Debug, Default)]
pub struct DecisionCache {
    decisions: RwLock<HashMap<PermissionCheck, bool>>,
}

impl DecisionCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached decision for `check`.
    #[must_use]
    pub fn get(&self, check: &PermissionCheck) -> Option<bool> {
        let decisions = self.decisions.read().unwrap_or_else(|e| {
            tracing::warn!("DecisionCache read lock poisoned, recovering");
            e.into_inner()
        });
        decisions.get(check).copied()
    }

    /// Remember `allow` for `check`.
    pub fn insert(&self, check: PermissionCheck, allow: bool) {
        let mut decisions = self.decisions.write().unwrap_or_else(|e| {
            tracing::warn!("DecisionCache lock poisoned, recovering");
            e.into_inner()
        });
        decisions.insert(check, allow);
    }

    /// Forget every decision. Returns how many were dropped.
    pub fn revoke_all(&self) -> usize {
        let mut decisions = self.decisions.write().unwrap_or_else(|e| {
            tracing::warn!("DecisionCache lock poisoned, recovering");
            e.into_inner()
        });
        let count = decisions.len();
        decisions.clear();
        count
    }

    /// Number of cached decisions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.decisions.read().map(|d| d.len()).unwrap_or(0)
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_until_revoked() {
        let cache = DecisionCache::new();
        let check = PermissionCheck::host("a.io");
        assert_eq!(cache.get(&check), None);

        cache.insert(check.clone(), false);
        assert_eq!(cache.get(&check), Some(false));
        assert_eq!(cache.get(&PermissionCheck::host("b.io")), None);

        assert_eq!(cache.revoke_all(), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.get(&check), None);
    }
}
