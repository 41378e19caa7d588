//! Boundary between the session core and a game rules implementation.
//!
//! The coordinator never inspects a board directly. It asks the engine for a
//! legal move, asks it to execute the move, and then reads back a summary of
//! the half-move that was just played.

use crate::error::RulesError;
use crate::types::{PromotionPiece, Side, Square, TerminalReason};
use derive_new::new;
use serde::{Deserialize, Serialize};

/// Summary of the most recently played half-move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct HalfMove {
    /// The move left the opponent checkmated.
    pub caused_checkmate: bool,
    /// The move left the opponent without legal moves and not in check.
    pub caused_stalemate: bool,
    /// Side that played the move.
    pub moving_side: Side,
}

impl HalfMove {
    /// Terminal state this half-move produced, if any.
    pub fn outcome(&self) -> Option<TerminalReason> {
        if self.caused_checkmate {
            Some(TerminalReason::Checkmate {
                winner: self.moving_side,
            })
        } else if self.caused_stalemate {
            Some(TerminalReason::Stalemate)
        } else {
            None
        }
    }
}

/// Move legality and board mutation.
///
/// Implementations hold no session or network state; everything they need
/// lives in the board value passed to each call.
pub trait RulesEngine: Send + 'static {
    /// Opaque board, including whatever history the engine needs.
    type Board: Clone + std::fmt::Debug + Send + 'static;
    /// A legal move produced by [`RulesEngine::try_get_legal_move`].
    type Move: Clone + std::fmt::Debug + Send + 'static;

    /// Board at the start of a fresh game.
    fn new_board(&self) -> Self::Board;

    /// Side whose move the board expects next.
    fn side_to_move(&self, board: &Self::Board) -> Side;

    /// Finds the legal move between two squares for the side to move.
    fn try_get_legal_move(&self, board: &Self::Board, from: Square, to: Square) -> Option<Self::Move>;

    /// True when the move cannot execute until a promotion piece is chosen.
    fn requires_promotion_choice(&self, mv: &Self::Move) -> bool;

    /// Attaches a promotion choice to a move.
    fn with_promotion(&self, mv: Self::Move, piece: PromotionPiece) -> Self::Move;

    /// Executes a move in place. Returns false and leaves the board untouched on failure.
    fn try_execute_move(&self, board: &mut Self::Board, mv: &Self::Move) -> bool;

    /// Summary of the last executed half-move, if any.
    fn latest_half_move(&self, board: &Self::Board) -> Option<HalfMove>;

    /// Number of half-moves played on this board.
    fn half_move_count(&self, board: &Self::Board) -> usize;

    /// Encodes the full board, history included.
    fn serialize_board(&self, board: &Self::Board) -> String;

    /// Restores a board produced by [`RulesEngine::serialize_board`].
    fn deserialize_board(&self, encoded: &str) -> Result<Self::Board, RulesError>;

    /// Board as it stood after the first `half_moves` half-moves.
    ///
    /// Fails when `half_moves` exceeds the number played.
    fn rewind(&self, board: &Self::Board, half_moves: usize) -> Result<Self::Board, RulesError>;
}
