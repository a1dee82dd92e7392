//! Capabilities and concrete checks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PermissionError, PermissionResult};

/// A privileged operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Outbound network requests, granted per destination host.
    #[serde(rename = "WEB_REQUEST")]
    NetworkEgress,
    /// Sending blockchain transactions, granted as a whole.
    #[serde(rename = "BLOCKCHAIN_SEND")]
    ChainWrite,
}

impl Capability {
    /// Wire key of the capability.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkEgress => "WEB_REQUEST",
            Self::ChainWrite => "BLOCKCHAIN_SEND",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WEB_REQUEST" => Ok(Self::NetworkEgress),
            "BLOCKCHAIN_SEND" => Ok(Self::ChainWrite),
            other => Err(PermissionError::UnknownCapability(other.to_owned())),
        }
    }
}

/// One concrete exercise of a capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PermissionCheck {
    /// A request to `host`. Hosts are lowercase.
    NetworkEgress {
        /// Destination host.
        host: String,
    },
    /// A transaction send.
    ChainWrite,
}

impl PermissionCheck {
    /// Check for a network request to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::InvalidDestination`] if the URL does not
    /// parse or has no host.
    pub fn network_request(url: &str) -> PermissionResult<Self> {
        let parsed = Url::parse(url)
            .map_err(|_| PermissionError::InvalidDestination("unparsable URL".into()))?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| PermissionError::InvalidDestination("URL has no host".into()))?;
        Ok(Self::host(host))
    }

    /// Check for a request to `host`.
    #[must_use]
    pub fn host(host: &str) -> Self {
        Self::NetworkEgress {
            host: host.to_ascii_lowercase(),
        }
    }

    /// The capability this check exercises.
    #[must_use]
    pub fn capability(&self) -> Capability {
        match self {
            Self::NetworkEgress { .. } => Capability::NetworkEgress,
            Self::ChainWrite => Capability::ChainWrite,
        }
    }
}
