//! Chess rules engine backed by shakmaty.

use crate::error::RulesError;
use crate::rules_engine::{HalfMove, RulesEngine};
use crate::types::{PromotionPiece, Side, Square};
use serde::{Deserialize, Serialize};
use shakmaty::{CastlingMode, Chess, Color, Move, Position, Role, fen::Fen, uci::UciMove};
use tracing::{debug, instrument, warn};

/// A legal move between two squares, possibly awaiting a promotion choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChessMove {
    from: Square,
    to: Square,
    promotes: bool,
    promotion: Option<PromotionPiece>,
}

impl ChessMove {
    /// Origin square.
    pub fn from(&self) -> Square {
        self.from
    }

    /// Destination square.
    pub fn to(&self) -> Square {
        self.to
    }

    /// True when a pawn reaches the last rank with this move.
    pub fn promotes(&self) -> bool {
        self.promotes
    }

    /// Chosen promotion piece, if any.
    pub fn promotion(&self) -> Option<PromotionPiece> {
        self.promotion
    }
}

/// One entry of the move history.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PlayedMove {
    uci: UciMove,
    half_move: HalfMove,
}

/// A chess position together with the moves that produced it.
#[derive(Debug, Clone)]
pub struct ChessBoard {
    start_fen: Option<String>,
    start: Chess,
    position: Chess,
    history: Vec<PlayedMove>,
}

impl ChessBoard {
    fn starting_at(start_fen: Option<String>, start: Chess) -> Self {
        Self {
            start_fen,
            position: start.clone(),
            start,
            history: Vec::new(),
        }
    }

    /// Current shakmaty position.
    pub fn position(&self) -> &Chess {
        &self.position
    }

    /// Played moves in UCI notation (`e2e4`, `a7a8q`).
    pub fn moves(&self) -> Vec<String> {
        self.history.iter().map(|m| m.uci.to_string()).collect()
    }

    /// Plays a legal engine move and records it.
    fn play(&mut self, engine_move: &Move) -> HalfMove {
        let uci = UciMove::from_move(engine_move, CastlingMode::Standard);
        let moving_side = Side::from(self.position.turn());
        self.position.play_unchecked(engine_move);

        let half_move = HalfMove::new(
            self.position.is_checkmate(),
            self.position.is_stalemate(),
            moving_side,
        );
        self.history.push(PlayedMove { uci, half_move });
        half_move
    }

    /// Replays a recorded UCI move, failing if it is illegal here.
    #[instrument(skip(self, uci), fields(ply = self.history.len() + 1, uci = %uci))]
    fn replay(&mut self, uci: &UciMove) -> Result<HalfMove, RulesError> {
        let engine_move = uci.to_move(&self.position).map_err(|e| {
            RulesError::new(format!(
                "Illegal move '{}' at ply {}: {}",
                uci,
                self.history.len() + 1,
                e
            ))
        })?;
        Ok(self.play(&engine_move))
    }
}

/// Serialized form of a [`ChessBoard`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BoardSnapshot {
    start_fen: Option<String>,
    moves: Vec<String>,
}

/// Standard chess rules.
#[derive(Debug, Clone)]
pub struct ChessRules {
    start_fen: Option<String>,
    start: Chess,
}

impl ChessRules {
    /// Rules starting from the standard initial position.
    pub fn standard() -> Self {
        Self {
            start_fen: None,
            start: Chess::default(),
        }
    }

    /// Rules starting from a custom position.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError`] if the FEN is invalid or Black is to move,
    /// since every game and restart begins with White.
    #[instrument]
    pub fn from_fen(fen: &str) -> Result<Self, RulesError> {
        let start = parse_fen(fen)?;
        if start.turn() != Color::White {
            warn!(fen, "Starting position has Black to move");
            return Err(RulesError::new("Starting position must have White to move"));
        }
        Ok(Self {
            start_fen: Some(fen.to_string()),
            start,
        })
    }

    /// Finds the shakmaty move matching the squares and promotion choice.
    fn find_engine_move(
        position: &Chess,
        from: Square,
        to: Square,
        promotion: Option<PromotionPiece>,
    ) -> Option<Move> {
        let from = shakmaty::Square::from(from);
        let to = shakmaty::Square::from(to);
        let turn = position.turn();
        let wanted = promotion.map(Role::from);
        position
            .legal_moves()
            .into_iter()
            .find(|m| connects(m, turn, from, to) && m.promotion() == wanted)
    }
}

/// True when the move goes from `from` to `to`.
///
/// Castling is reachable both by the king's destination and by the rook's square.
#[instrument(level = "trace", ret)]
fn connects(m: &Move, turn: Color, from: shakmaty::Square, to: shakmaty::Square) -> bool {
    let lands = match m.castling_side() {
        Some(side) => to == side.king_to(turn) || to == m.to(),
        None => to == m.to(),
    };
    m.from() == Some(from) && lands
}

impl Default for ChessRules {
    fn default() -> Self {
        Self::standard()
    }
}

#[instrument]
fn parse_fen(fen: &str) -> Result<Chess, RulesError> {
    let parsed: Fen = fen
        .parse()
        .map_err(|e| RulesError::new(format!("Invalid FEN '{}': {}", fen, e)))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| RulesError::new(format!("Illegal position '{}': {}", fen, e)))
}

impl RulesEngine for ChessRules {
    type Board = ChessBoard;
    type Move = ChessMove;

    fn new_board(&self) -> ChessBoard {
        ChessBoard::starting_at(self.start_fen.clone(), self.start.clone())
    }

    fn side_to_move(&self, board: &ChessBoard) -> Side {
        Side::from(board.position.turn())
    }

    #[instrument(skip(self, board, from, to), fields(from = %from, to = %to))]
    fn try_get_legal_move(&self, board: &ChessBoard, from: Square, to: Square) -> Option<ChessMove> {
        let engine_from = shakmaty::Square::from(from);
        let engine_to = shakmaty::Square::from(to);
        let turn = board.position.turn();

        let candidates: Vec<Move> = board
            .position
            .legal_moves()
            .into_iter()
            .filter(|m| connects(m, turn, engine_from, engine_to))
            .collect();

        if candidates.is_empty() {
            debug!("No legal move between squares");
            return None;
        }

        Some(ChessMove {
            from,
            to,
            promotes: candidates.iter().any(|m| m.promotion().is_some()),
            promotion: None,
        })
    }

    fn requires_promotion_choice(&self, mv: &ChessMove) -> bool {
        mv.promotes && mv.promotion.is_none()
    }

    fn with_promotion(&self, mv: ChessMove, piece: PromotionPiece) -> ChessMove {
        if !mv.promotes {
            return mv;
        }
        ChessMove {
            promotion: Some(piece),
            ..mv
        }
    }

    #[instrument(skip(self, board), fields(from = %mv.from, to = %mv.to))]
    fn try_execute_move(&self, board: &mut ChessBoard, mv: &ChessMove) -> bool {
        if self.requires_promotion_choice(mv) {
            warn!("Promotion move executed without a piece choice");
            return false;
        }

        let Some(engine_move) = Self::find_engine_move(&board.position, mv.from, mv.to, mv.promotion)
        else {
            warn!("Move is not legal in the current position");
            return false;
        };

        let half_move = board.play(&engine_move);
        debug!(?half_move, "Move executed");
        true
    }

    fn latest_half_move(&self, board: &ChessBoard) -> Option<HalfMove> {
        board.history.last().map(|m| m.half_move)
    }

    fn half_move_count(&self, board: &ChessBoard) -> usize {
        board.history.len()
    }

    fn serialize_board(&self, board: &ChessBoard) -> String {
        let snapshot = BoardSnapshot {
            start_fen: board.start_fen.clone(),
            moves: board.moves(),
        };
        // A struct of strings always serializes.
        serde_json::to_string(&snapshot).unwrap_or_default()
    }

    #[instrument(skip(self, encoded))]
    fn deserialize_board(&self, encoded: &str) -> Result<ChessBoard, RulesError> {
        let snapshot: BoardSnapshot = serde_json::from_str(encoded)
            .map_err(|e| RulesError::new(format!("Malformed snapshot: {}", e)))?;

        let start = match &snapshot.start_fen {
            Some(fen) => parse_fen(fen)?,
            None => Chess::default(),
        };
        let mut board = ChessBoard::starting_at(snapshot.start_fen, start);

        for (index, notation) in snapshot.moves.iter().enumerate() {
            let uci: UciMove = notation.parse().map_err(|_| {
                RulesError::new(format!("Bad move notation '{}' at ply {}", notation, index + 1))
            })?;
            board.replay(&uci)?;
        }

        debug!(plies = board.history.len(), "Snapshot restored");
        Ok(board)
    }

    #[instrument(skip(self, board), fields(played = board.history.len()))]
    fn rewind(&self, board: &ChessBoard, half_moves: usize) -> Result<ChessBoard, RulesError> {
        if half_moves > board.history.len() {
            return Err(RulesError::new(format!(
                "Cannot rewind to half-move {} of {}",
                half_moves,
                board.history.len()
            )));
        }

        let mut rewound = ChessBoard::starting_at(board.start_fen.clone(), board.start.clone());
        for played in &board.history[..half_moves] {
            rewound.replay(&played.uci)?;
        }
        debug!(half_moves, "Board rewound");
        Ok(rewound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(name: &str) -> Square {
        name.parse().unwrap()
    }

    fn play(rules: &ChessRules, board: &mut ChessBoard, from: &str, to: &str) {
        let mv = rules.try_get_legal_move(board, sq(from), sq(to)).unwrap();
        assert!(rules.try_execute_move(board, &mv));
    }

    #[test]
    fn test_opening_move_flips_side() {
        let rules = ChessRules::standard();
        let mut board = rules.new_board();
        assert_eq!(rules.side_to_move(&board), Side::White);

        play(&rules, &mut board, "e2", "e4");
        assert_eq!(rules.side_to_move(&board), Side::Black);
        assert_eq!(board.moves(), vec!["e2e4"]);
    }

    #[test]
    fn test_vacated_square_has_no_move() {
        let rules = ChessRules::standard();
        let mut board = rules.new_board();
        play(&rules, &mut board, "e2", "e4");
        assert!(rules.try_get_legal_move(&board, sq("e2"), sq("e4")).is_none());
    }

    #[test]
    fn test_castling_by_king_destination() {
        let rules = ChessRules::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();
        let mut board = rules.new_board();
        play(&rules, &mut board, "e1", "g1");
        assert_eq!(rules.side_to_move(&board), Side::Black);
    }

    #[test]
    fn test_black_to_move_start_rejected() {
        let result =
            ChessRules::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1");
        assert!(result.is_err());
    }

    #[test]
    fn test_promotion_requires_choice() {
        let rules = ChessRules::from_fen("8/P7/8/8/8/8/8/4K2k w - - 0 1").unwrap();
        let mut board = rules.new_board();
        let mv = rules.try_get_legal_move(&board, sq("a7"), sq("a8")).unwrap();
        assert!(rules.requires_promotion_choice(&mv));
        assert!(!rules.try_execute_move(&mut board, &mv));
        assert_eq!(rules.half_move_count(&board), 0);

        let mv = rules.with_promotion(mv, PromotionPiece::Knight);
        assert!(rules.try_execute_move(&mut board, &mv));
        assert_eq!(board.moves(), vec!["a7a8n"]);
    }

    #[test]
    fn test_snapshot_replays_history() {
        let rules = ChessRules::standard();
        let mut board = rules.new_board();
        play(&rules, &mut board, "e2", "e4");
        play(&rules, &mut board, "e7", "e5");
        play(&rules, &mut board, "g1", "f3");

        let encoded = rules.serialize_board(&board);
        let restored = rules.deserialize_board(&encoded).unwrap();
        assert_eq!(restored.moves(), board.moves());
        assert_eq!(rules.side_to_move(&restored), Side::Black);
    }

    #[test]
    fn test_castling_recorded_as_king_move() {
        let rules = ChessRules::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();
        let mut board = rules.new_board();
        play(&rules, &mut board, "e1", "h1");
        assert_eq!(board.moves(), vec!["e1g1"]);

        let restored = rules.deserialize_board(&rules.serialize_board(&board)).unwrap();
        assert_eq!(restored.position().board(), board.position().board());
    }

    #[test]
    fn test_snapshot_with_bad_notation_rejected() {
        let rules = ChessRules::standard();
        let encoded = r#"{"start_fen":null,"moves":["e2e4","zz"]}"#;
        assert!(rules.deserialize_board(encoded).is_err());
    }

    #[test]
    fn test_rewind_replays_prefix() {
        let rules = ChessRules::standard();
        let mut board = rules.new_board();
        play(&rules, &mut board, "e2", "e4");
        play(&rules, &mut board, "e7", "e5");
        play(&rules, &mut board, "g1", "f3");

        let rewound = rules.rewind(&board, 1).unwrap();
        assert_eq!(rewound.moves(), vec!["e2e4"]);
        assert_eq!(rules.side_to_move(&rewound), Side::Black);
        assert_eq!(rules.half_move_count(&board), 3);

        let start = rules.rewind(&board, 0).unwrap();
        assert_eq!(start.position().board(), Chess::default().board());
        assert!(rules.rewind(&board, 4).is_err());
    }

    #[test]
    fn test_snapshot_with_illegal_move_rejected() {
        let rules = ChessRules::standard();
        let encoded = r#"{"start_fen":null,"moves":["e2e5"]}"#;
        assert!(rules.deserialize_board(encoded).is_err());
    }
}
