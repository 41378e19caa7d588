//! In-process transport over per-peer tokio channels.

use super::Transport;
use crate::protocol::ServerMessage;
use crate::types::PeerId;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, instrument, trace};

/// Routes messages to peers through unbounded channels.
///
/// Each peer owns the receiving end; a socket task (or a test) drains it.
/// Channel order is send order, so per-peer delivery is ordered.
#[derive(Debug, Default)]
pub struct ChannelTransport {
    next_peer: AtomicU64,
    peers: Mutex<BTreeMap<PeerId, UnboundedSender<ServerMessage>>>,
}

impl ChannelTransport {
    /// Creates a transport with no peers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection and assigns it a fresh [`PeerId`].
    #[instrument(skip(self))]
    pub fn register(&self) -> (PeerId, UnboundedReceiver<ServerMessage>) {
        let peer = PeerId(self.next_peer.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = unbounded_channel();
        self.peers().insert(peer, tx);
        debug!(%peer, "Peer registered with transport");
        (peer, rx)
    }

    /// Forgets a connection. Later sends to it are dropped.
    #[instrument(skip(self))]
    pub fn unregister(&self, peer: PeerId) {
        if self.peers().remove(&peer).is_some() {
            debug!(%peer, "Peer unregistered from transport");
        }
    }

    /// Number of registered connections.
    pub fn peer_count(&self) -> usize {
        self.peers().len()
    }

    fn peers(&self) -> MutexGuard<'_, BTreeMap<PeerId, UnboundedSender<ServerMessage>>> {
        // The map stays consistent even if a holder panicked.
        self.peers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for ChannelTransport {
    fn send(&self, peer: PeerId, message: ServerMessage) {
        match self.peers().get(&peer) {
            Some(tx) => {
                trace!(%peer, ?message, "Sending to peer");
                if tx.send(message).is_err() {
                    debug!(%peer, "Peer receiver dropped, message discarded");
                }
            }
            None => debug!(%peer, "Send to unknown peer dropped"),
        }
    }

    fn broadcast(&self, message: ServerMessage) {
        let peers = self.peers();
        trace!(recipients = peers.len(), ?message, "Broadcasting");
        for (peer, tx) in peers.iter() {
            if tx.send(message.clone()).is_err() {
                debug!(%peer, "Peer receiver dropped, broadcast discarded");
            }
        }
    }
}
