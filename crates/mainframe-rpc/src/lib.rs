//! Mainframe RPC - Bidirectional multiplexed JSON-RPC transport.
//!
//! This crate provides:
//! - JSON-RPC 2.0 [`Message`]s framed with a 4-byte big-endian length prefix
//! - [`RpcPeer`], one end of a connection that both issues and serves
//!   requests, with per-request deadlines and out-of-order completion
//! - Subscriptions: streaming handlers answer with an opaque handle and
//!   then push `mainframe_subscription` notifications
//! - Unix socket and in-process ([`bridge`]) bindings
//!
//! Closing a peer rejects every awaiting request with
//! [`RpcError::TransportClosed`] and tears down every subscription it opened.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod bridge;
pub mod error;
pub mod framing;
pub mod message;
pub mod peer;
pub mod service;
pub mod subscription;

pub use bridge::bridge;
pub use error::{ErrorObject, RpcError, RpcResult, error_codes};
pub use message::{Message, RequestId, SUBSCRIPTION_METHOD, UNSUBSCRIBE_METHOD};
pub use peer::{DEFAULT_REQUEST_TIMEOUT, PeerConfig, RpcPeer, Subscription};
pub use service::{CallContext, ConnectionId, NoService, Reply, RpcService};
pub use subscription::SubscriptionManager;
