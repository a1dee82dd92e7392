//! Prelude module - commonly used types for convenient import.
//!
//! Use `use mainframe_rpc::prelude::*;` to import all essential types.

// Errors
pub use crate::{RpcError, RpcResult};

// Peers
pub use crate::{PeerConfig, RpcPeer, Subscription, bridge};

// Serving
pub use crate::{CallContext, NoService, Reply, RpcService, SubscriptionManager};
