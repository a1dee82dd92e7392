//! The closed method table.

use std::fmt;
use std::str::FromStr;

use mainframe_permissions::Capability;
use mainframe_rpc::RpcError;

macro_rules! methods {
    ($( $(#[$doc:meta])* $variant:ident => $name:literal, )+) => {
        /// Every method the daemon serves.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Method {
            $( $(#[$doc])* $variant, )+
        }

        impl Method {
            /// All methods, in table order.
            pub const ALL: &'static [Method] = &[ $( Method::$variant, )+ ];

            /// Wire name of the method.
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Method::$variant => $name, )+
                }
            }
        }

        impl FromStr for Method {
            type Err = RpcError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $name => Ok(Method::$variant), )+
                    other => Err(RpcError::MethodNotFound(other.to_owned())),
                }
            }
        }
    };
}

methods! {
    /// Returns the API version.
    ApiVersion => "api_version",

    /// Evaluate a session's grant.
    AppCheckPermission => "app_checkPermission",
    /// Close an app session.
    AppClose => "app_close",
    /// Install an app for an identity.
    AppInstall => "app_install",
    /// Remove an installed app.
    AppRemove => "app_remove",
    /// Remove an app the identity developed.
    AppRemoveOwn => "app_removeOwn",
    /// Open an app session.
    AppOpen => "app_open",
    /// List installed and own apps.
    AppGetAll => "app_getAll",
    /// Store a session's grant.
    AppSetPermission => "app_setPermission",
    /// Store an identity's settings for an app.
    AppSetUserSettings => "app_setUserSettings",
    /// Accepted, does nothing.
    AppUninstall => "app_uninstall",
    /// Accepted, does nothing.
    AppUpdate => "app_update",
    /// Create a new app as a developer.
    AppCreate => "app_create",
    /// Read an own app's manifest data.
    AppGetManifestData => "app_getManifestData",
    /// Change an own app's declared capabilities.
    AppSetPermissionsRequirements => "app_setPermissionsRequirements",
    /// Publish an own app's contents.
    AppPublishContents => "app_publishContents",
    /// Write an own app's manifest.
    AppWriteManifest => "app_writeManifest",

    /// Read contract events.
    BlockchainGetContractEvents => "blockchain_getContractEvents",
    /// Latest block number.
    BlockchainGetLatestBlock => "blockchain_getLatestBlock",
    /// Call a read-only contract method.
    BlockchainReadContract => "blockchain_readContract",
    /// Send a transaction. Needs chain-write.
    BlockchainSendTransaction => "blockchain_sendTransaction",

    /// Create a user identity.
    IdentityCreateUser => "identity_createUser",
    /// Create a developer identity.
    IdentityCreateDeveloper => "identity_createDeveloper",
    /// List own user identities.
    IdentityGetOwnUsers => "identity_getOwnUsers",
    /// List own developer identities.
    IdentityGetOwnDevelopers => "identity_getOwnDevelopers",

    /// Local pub/sub base address.
    PssBaseAddr => "pss_baseAddr",
    /// Subscribe to a topic. Streams messages.
    PssCreateTopicSubscription => "pss_createTopicSubscription",
    /// Local pub/sub public key.
    PssGetPublicKey => "pss_getPublicKey",
    /// Send an asymmetric message.
    PssSendAsym => "pss_sendAsym",
    /// Register a peer's public key.
    PssSetPeerPublicKey => "pss_setPeerPublicKey",
    /// Derive a topic from a string.
    PssStringToTopic => "pss_stringToTopic",

    /// Read a key from decentralized storage.
    BluzelleRead => "bluzelle_read",
    /// Write a key to decentralized storage.
    BluzelleWrite => "bluzelle_write",

    /// Tear down a subscription.
    SubUnsubscribe => "sub_unsubscribe",

    /// Create a vault.
    VaultCreate => "vault_create",
    /// Read the open vault's settings.
    VaultGetSettings => "vault_getSettings",
    /// Open a vault.
    VaultOpen => "vault_open",
    /// Change the open vault's settings.
    VaultSetSettings => "vault_setSettings",
}

impl Method {
    /// Namespace prefix (`app`, `pss`, ...). `api_version` has none.
    #[must_use]
    pub fn namespace(self) -> Option<&'static str> {
        self.as_str().split_once('_').map(|(ns, _)| ns).filter(|ns| *ns != "api")
    }

    /// Capability a caller must hold, if any.
    #[must_use]
    pub fn required_capability(self) -> Option<Capability> {
        match self {
            Self::BlockchainSendTransaction => Some(Capability::ChainWrite),
            _ => None,
        }
    }

    /// Whether the method may act on behalf of an app session.
    ///
    /// Such methods resolve a `sessID` parameter when present.
    #[must_use]
    pub fn is_session_scoped(self) -> bool {
        matches!(
            self,
            Self::AppClose | Self::AppCheckPermission | Self::AppSetPermission
        ) || matches!(self.namespace(), Some("blockchain" | "pss" | "bluzelle"))
    }

    /// Whether the method must be called with a `sessID`.
    #[must_use]
    pub fn requires_session(self) -> bool {
        matches!(
            self,
            Self::AppClose | Self::AppCheckPermission | Self::AppSetPermission
        ) || self.required_capability().is_some()
    }

    /// Whether the handler answers with a subscription handle.
    #[must_use]
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::PssCreateTopicSubscription)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for method in Method::ALL {
            assert_eq!(method.as_str().parse::<Method>().unwrap(), *method);
        }
        assert_eq!(Method::ALL.len(), 38);
    }

    #[test]
    fn unknown_names_are_method_not_found() {
        assert_eq!(
            "app_fly".parse::<Method>().unwrap_err(),
            RpcError::MethodNotFound("app_fly".into())
        );
    }

    #[test]
    fn namespaces() {
        assert_eq!(Method::ApiVersion.namespace(), None);
        assert_eq!(Method::AppOpen.namespace(), Some("app"));
        assert_eq!(Method::SubUnsubscribe.namespace(), Some("sub"));
    }

    #[test]
    fn privileged_methods() {
        let privileged: Vec<_> = Method::ALL
            .iter()
            .filter(|m| m.required_capability().is_some())
            .collect();
        assert_eq!(privileged, vec![&Method::BlockchainSendTransaction]);
        assert!(Method::BlockchainSendTransaction.requires_session());
        assert!(Method::PssSendAsym.is_session_scoped());
        assert!(!Method::PssSendAsym.requires_session());
        assert!(!Method::AppOpen.is_session_scoped());
    }
}
