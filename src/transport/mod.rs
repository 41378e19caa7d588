//! Message delivery from the host to connected peers.

mod channel;

pub use channel::ChannelTransport;

use crate::protocol::ServerMessage;
use crate::types::PeerId;
use std::sync::Arc;

/// Reliable, ordered delivery to peers.
///
/// Sends are fire-and-forget: the coordinator never waits for delivery and
/// a send to a peer that has gone away is silently dropped.
pub trait Transport: Send + Sync + 'static {
    /// Sends a message to one peer.
    fn send(&self, peer: PeerId, message: ServerMessage);

    /// Sends a message to every connected peer.
    fn broadcast(&self, message: ServerMessage);
}

impl<T: Transport> Transport for Arc<T> {
    fn send(&self, peer: PeerId, message: ServerMessage) {
        (**self).send(peer, message)
    }

    fn broadcast(&self, message: ServerMessage) {
        (**self).broadcast(message)
    }
}
