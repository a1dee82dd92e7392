//! In-process transport binding.

use std::sync::Arc;

use crate::peer::{PeerConfig, RpcPeer};
use crate::service::RpcService;

/// Buffer size of each direction of an in-process bridge.
pub const BRIDGE_BUFFER: usize = 64 * 1024;

/// Connect two services through an in-memory pipe.
///
/// Returns `(left, right)`: `left` is served by `left_service` and talks to
/// `right`, and vice versa. Both peers inherit `config`'s timeout and get
/// child tokens of its cancel token, so cancelling it closes the pair.
#[must_use]
pub fn bridge(
    left_service: Arc<dyn RpcService>,
    right_service: Arc<dyn RpcService>,
    config: &PeerConfig,
) -> (RpcPeer, RpcPeer) {
    let (left_io, right_io) = tokio::io::duplex(BRIDGE_BUFFER);
    let side = |suffix: &str| PeerConfig {
        request_timeout: config.request_timeout,
        cancel: config.cancel.child_token(),
        label: format!("{}/{suffix}", config.label),
    };
    let left = RpcPeer::spawn(left_io, left_service, side("left"));
    let right = RpcPeer::spawn(right_io, right_service, side("right"));
    (left, right)
}
