//! JSON wire protocol between the authoritative host and its peers.
//!
//! Every frame is adjacently tagged: `{"type": "move", "payload": {...}}`.

use crate::error::{RejectionKind, SessionError};
use crate::types::{PeerId, PromotionPiece, Side, Square, TerminalReason};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Requests a peer may send to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Move the piece on `from` to `to`.
    Move {
        /// Origin square.
        from: Square,
        /// Destination square.
        to: Square,
    },
    /// Complete a parked promotion.
    ChoosePromotion {
        /// Id from the matching [`ServerMessage::PromotionRequired`].
        pending_id: u64,
        /// Piece to promote to.
        piece: PromotionPiece,
    },
    /// Concede the game.
    Resign,
    /// Start a new game (host only).
    Restart,
    /// Ask for a full board snapshot.
    Sync,
    /// Replace the game with a saved one (host only).
    LoadGame {
        /// Output of a previous save.
        snapshot: String,
    },
    /// Rewind the game to just after half-move `index` (host only).
    ResetToHalfMove {
        /// Half-moves to keep; zero is the starting position.
        index: usize,
    },
    /// Round-trip check, answered with [`ServerMessage::Pong`].
    Ping {
        /// Echoed back unchanged.
        nonce: u64,
    },
}

/// Messages the host sends to peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A move was applied to the authoritative board.
    BoardUpdated {
        /// Origin square.
        from: Square,
        /// Destination square.
        to: Square,
        /// Promotion piece, for promoting moves.
        promotion: Option<PromotionPiece>,
    },
    /// It is now `side`'s move.
    TurnChanged {
        /// Side to move.
        side: Side,
    },
    /// A peer took a seat.
    SideAssigned {
        /// Seated peer.
        peer_id: PeerId,
        /// Its side.
        side: Side,
    },
    /// The game reached a terminal state.
    GameEnded {
        /// Why the game ended.
        reason: TerminalReason,
        /// Winning side, if any.
        winner: Option<Side>,
    },
    /// A fresh game started; White moves first.
    GameRestarted,
    /// A player conceded.
    Resigned {
        /// Side that resigned.
        resigner: Side,
        /// Side that wins.
        winner: Side,
    },
    /// Sent only to a newly seated peer.
    Welcome {
        /// The peer's own id.
        peer_id: PeerId,
        /// The peer's side.
        side: Side,
        /// Side to move.
        turn: Side,
        /// Token for reclaiming the seat after a disconnect.
        resume_token: Uuid,
    },
    /// Full board state for a peer that cannot rebuild it from deltas.
    BoardSnapshot {
        /// Serialized board.
        board: String,
        /// Side to move.
        turn: Side,
        /// Terminal state, if the game is over.
        terminal: Option<TerminalReason>,
    },
    /// The move needs a promotion piece before it can be applied.
    PromotionRequired {
        /// Id to quote in [`ClientRequest::ChoosePromotion`].
        pending_id: u64,
        /// Origin square.
        from: Square,
        /// Destination square.
        to: Square,
    },
    /// Reply to [`ClientRequest::Ping`], sent to the requester only.
    Pong {
        /// Nonce from the ping.
        nonce: u64,
    },
    /// The peer's request was refused; nothing changed.
    Rejected {
        /// Error category.
        kind: RejectionKind,
        /// Human-readable detail.
        message: String,
    },
}

impl ServerMessage {
    /// Builds a rejection reply for `err`.
    pub fn rejected(err: &SessionError) -> Self {
        ServerMessage::Rejected {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Builds the end-of-game notification for `reason`.
    pub fn game_ended(reason: TerminalReason) -> Self {
        let winner = reason.winner();
        ServerMessage::GameEnded { reason, winner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_request_wire_format() {
        let json = r#"{"type":"move","payload":{"from":"e2","to":"e4"}}"#;
        let request: ClientRequest = serde_json::from_str(json).unwrap();
        assert_eq!(
            request,
            ClientRequest::Move {
                from: "e2".parse().unwrap(),
                to: "e4".parse().unwrap(),
            }
        );
    }

    #[test]
    fn test_unit_request_wire_format() {
        let request: ClientRequest = serde_json::from_str(r#"{"type":"resign"}"#).unwrap();
        assert_eq!(request, ClientRequest::Resign);
    }

    #[test]
    fn test_rewind_and_ping_wire_format() {
        let json = r#"{"type":"reset_to_half_move","payload":{"index":2}}"#;
        let request: ClientRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request, ClientRequest::ResetToHalfMove { index: 2 });

        let pong = serde_json::to_value(ServerMessage::Pong { nonce: 9 }).unwrap();
        assert_eq!(pong["type"], "pong");
        assert_eq!(pong["payload"]["nonce"], 9);
    }

    #[test]
    fn test_game_ended_carries_winner() {
        let message = ServerMessage::game_ended(TerminalReason::Checkmate { winner: Side::Black });
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "game_ended");
        assert_eq!(json["payload"]["winner"], "black");
        assert_eq!(json["payload"]["reason"]["kind"], "checkmate");
    }

    #[test]
    fn test_rejection_kind_is_snake_case() {
        let message = ServerMessage::rejected(&SessionError::NotYourTurn);
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["payload"]["kind"], "not_your_turn");
    }
}
