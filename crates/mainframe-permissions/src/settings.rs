//! Declarations, grants and their evaluation.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capability::{Capability, PermissionCheck};

/// Capabilities declared in one section (required or optional) of a
/// manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDeclarations {
    /// Hosts the app wants to reach.
    #[serde(rename = "WEB_REQUEST", default, skip_serializing_if = "Vec::is_empty")]
    pub web_request: Vec<String>,
    /// Whether the app wants to send transactions.
    #[serde(rename = "BLOCKCHAIN_SEND", default, skip_serializing_if = "is_false")]
    pub blockchain_send: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !*b
}

impl PermissionDeclarations {
    /// Whether `check` is covered by this section.
    #[must_use]
    pub fn declares(&self, check: &PermissionCheck) -> bool {
        match check {
            PermissionCheck::NetworkEgress { host } => self
                .web_request
                .iter()
                .any(|h| h.eq_ignore_ascii_case(host)),
            PermissionCheck::ChainWrite => self.blockchain_send,
        }
    }
}

/// Capabilities an app declares in its manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequirements {
    /// Needed for the app to work at all.
    #[serde(default)]
    pub required: PermissionDeclarations,
    /// Used when granted, skipped otherwise.
    #[serde(default)]
    pub optional: PermissionDeclarations,
}

/// Per-destination grants for network egress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebRequestGrants {
    /// Hosts the identity allowed.
    #[serde(default)]
    pub granted: Vec<String>,
    /// Hosts the identity refused.
    #[serde(default)]
    pub denied: Vec<String>,
}

impl WebRequestGrants {
    fn contains(list: &[String], host: &str) -> bool {
        list.iter().any(|h| h.eq_ignore_ascii_case(host))
    }

    fn record(&mut self, host: &str, allow: bool) {
        let host = host.to_ascii_lowercase();
        self.granted.retain(|h| !h.eq_ignore_ascii_case(&host));
        self.denied.retain(|h| !h.eq_ignore_ascii_case(&host));
        if allow {
            self.granted.push(host);
        } else {
            self.denied.push(host);
        }
    }
}

/// Stored decisions of one identity for one app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrants {
    /// Chain-write grant; `None` until decided.
    #[serde(rename = "BLOCKCHAIN_SEND", default, skip_serializing_if = "Option::is_none")]
    pub blockchain_send: Option<bool>,
    /// Network egress grants.
    #[serde(rename = "WEB_REQUEST", default)]
    pub web_request: WebRequestGrants,
}

/// An update sent through `app_setPermission`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "key", content = "value")]
pub enum PermissionUpdate {
    /// Replace the network egress lists.
    #[serde(rename = "WEB_REQUEST")]
    WebRequest(WebRequestGrants),
    /// Set the chain-write grant.
    #[serde(rename = "BLOCKCHAIN_SEND")]
    BlockchainSend(bool),
}

/// Outcome of evaluating a check against stored grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// A stored grant allows the request.
    Granted,
    /// A stored grant refuses the request, or none can exist.
    Denied,
    /// No stored decision for this destination yet.
    Undecided,
}

/// Everything the enforcer needs to decide for one app session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSettings {
    /// What the manifest declares.
    #[serde(default)]
    pub requirements: PermissionRequirements,
    /// What the identity decided.
    #[serde(default)]
    pub grants: PermissionGrants,
    /// Whether the identity reviewed the declarations at least once. Set by
    /// the first stored decision or update.
    #[serde(rename = "permissionsChecked", default)]
    pub checked: bool,
}

impl PermissionSettings {
    /// Settings with the given declarations and no grants.
    #[must_use]
    pub fn new(requirements: PermissionRequirements) -> Self {
        Self {
            requirements,
            ..Self::default()
        }
    }

    /// Evaluate `check` against the stored grants.
    ///
    /// Chain-write is denied unless explicitly granted. Network egress is
    /// denied if the host is on the deny list (even if also on the allow
    /// list), granted if on the allow list and undecided otherwise.
    #[must_use]
    pub fn evaluate(&self, check: &PermissionCheck) -> Evaluation {
        let outcome = match check {
            PermissionCheck::ChainWrite => match self.grants.blockchain_send {
                Some(true) => Evaluation::Granted,
                Some(false) | None => Evaluation::Denied,
            },
            PermissionCheck::NetworkEgress { host } => {
                let web = &self.grants.web_request;
                if WebRequestGrants::contains(&web.denied, host) {
                    Evaluation::Denied
                } else if WebRequestGrants::contains(&web.granted, host) {
                    Evaluation::Granted
                } else {
                    Evaluation::Undecided
                }
            },
        };
        debug!(capability = %check.capability(), ?outcome, "evaluated permission");
        outcome
    }

    /// Store a decision for `check`.
    pub fn record_decision(&mut self, check: &PermissionCheck, allow: bool) {
        self.checked = true;
        match check {
            PermissionCheck::ChainWrite => self.grants.blockchain_send = Some(allow),
            PermissionCheck::NetworkEgress { host } => {
                self.grants.web_request.record(host, allow);
            },
        }
    }

    /// Apply an `app_setPermission` update.
    pub fn apply(&mut self, update: PermissionUpdate) {
        self.checked = true;
        match update {
            PermissionUpdate::WebRequest(lists) => self.grants.web_request = lists,
            PermissionUpdate::BlockchainSend(allow) => self.grants.blockchain_send = Some(allow),
        }
    }

    /// The update that persists the current grant for `capability`.
    #[must_use]
    pub fn update_for(&self, capability: Capability) -> PermissionUpdate {
        match capability {
            Capability::NetworkEgress => {
                PermissionUpdate::WebRequest(self.grants.web_request.clone())
            },
            Capability::ChainWrite => {
                PermissionUpdate::BlockchainSend(self.grants.blockchain_send.unwrap_or(false))
            },
        }
    }

    /// Whether `check` is declared as required or optional.
    ///
    /// A network destination that is undecided and undeclared is denied
    /// without asking the identity.
    #[must_use]
    pub fn is_declared(&self, check: &PermissionCheck) -> bool {
        self.requirements.required.declares(check) || self.requirements.optional.declares(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_grant_is_not_an_allow() {
        let settings = PermissionSettings::default();
        assert_eq!(settings.evaluate(&PermissionCheck::ChainWrite), Evaluation::Denied);
        assert_eq!(
            settings.evaluate(&PermissionCheck::host("example.com")),
            Evaluation::Undecided
        );
    }

    #[test]
    fn deny_wins_over_allow() {
        let mut settings = PermissionSettings::default();
        settings.grants.web_request.granted.push("example.com".into());
        settings.grants.web_request.denied.push("EXAMPLE.com".into());
        assert_eq!(
            settings.evaluate(&PermissionCheck::host("example.com")),
            Evaluation::Denied
        );
    }

    #[test]
    fn recorded_decisions_replace_earlier_ones() {
        let mut settings = PermissionSettings::default();
        let check = PermissionCheck::host("a.io");

        settings.record_decision(&check, false);
        assert_eq!(settings.evaluate(&check), Evaluation::Denied);
        settings.record_decision(&check, true);
        assert_eq!(settings.evaluate(&check), Evaluation::Granted);
        assert!(settings.grants.web_request.denied.is_empty());

        settings.record_decision(&PermissionCheck::ChainWrite, true);
        assert_eq!(settings.evaluate(&PermissionCheck::ChainWrite), Evaluation::Granted);
    }

    #[test]
    fn update_wire_shape() {
        let update: PermissionUpdate = serde_json::from_str(
            r#"{"key":"WEB_REQUEST","value":{"granted":["a.io"],"denied":[]}}"#,
        )
        .unwrap();
        let mut settings = PermissionSettings::default();
        settings.apply(update);
        assert_eq!(settings.evaluate(&PermissionCheck::host("a.io")), Evaluation::Granted);

        let update: PermissionUpdate =
            serde_json::from_str(r#"{"key":"BLOCKCHAIN_SEND","value":true}"#).unwrap();
        settings.apply(update);
        assert_eq!(
            settings.update_for(Capability::ChainWrite),
            PermissionUpdate::BlockchainSend(true)
        );
    }

    #[test]
    fn manifest_declarations() {
        let reqs: PermissionRequirements = serde_json::from_str(
            r#"{"required":{"WEB_REQUEST":["api.io"]},"optional":{"BLOCKCHAIN_SEND":true}}"#,
        )
        .unwrap();
        let settings = PermissionSettings::new(reqs);
        assert!(settings.is_declared(&PermissionCheck::host("api.io")));
        assert!(settings.is_declared(&PermissionCheck::ChainWrite));
        assert!(!settings.is_declared(&PermissionCheck::host("other.io")));
        assert!(settings.is_declared(&PermissionCheck::host("API.io")));
        assert!(!settings.checked);
    }

    #[test]
    fn stored_decisions_mark_the_settings_checked() {
        let mut settings = PermissionSettings::default();
        settings.record_decision(&PermissionCheck::host("a.io"), false);
        assert!(settings.checked);

        let mut settings = PermissionSettings::default();
        settings.apply(PermissionUpdate::BlockchainSend(false));
        assert!(settings.checked);

        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["permissionsChecked"], true);
    }
}
