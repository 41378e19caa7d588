//! In-process notifications published by the coordinator.

use crate::types::{PeerId, Side, Square, TerminalReason};
use serde::{Deserialize, Serialize};

/// Something observable happened in the session.
///
/// Delivered over a tokio broadcast channel; a subscriber that drops its
/// receiver is unsubscribed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A peer took or reclaimed a seat.
    PeerJoined {
        /// Seated peer.
        peer: PeerId,
        /// Its side.
        side: Side,
    },
    /// A seated peer's connection closed.
    PeerLeft {
        /// Departed peer.
        peer: PeerId,
        /// Its side.
        side: Side,
        /// Whether the seat is held for a reconnect.
        seat_held: bool,
    },
    /// A move was applied.
    MoveExecuted {
        /// Side that moved.
        side: Side,
        /// Origin square.
        from: Square,
        /// Destination square.
        to: Square,
    },
    /// The game ended.
    GameEnded {
        /// Why it ended.
        reason: TerminalReason,
    },
    /// A new game started.
    GameRestarted,
    /// A saved game replaced the current one.
    GameLoaded {
        /// Half-moves in the restored game.
        half_moves: usize,
    },
    /// The game was rewound to an earlier half-move.
    GameRewound {
        /// Half-moves kept.
        half_moves: usize,
    },
    /// An internal fault ended the session.
    Faulted {
        /// Error description.
        detail: String,
    },
}
