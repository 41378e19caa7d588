//! Core domain types shared by the session, the rules engine and the wire protocol.

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use shakmaty::{Color, File, Rank, Role};
use std::str::FromStr;

/// One of the two competing parties.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// White always moves first.
    White,
    /// Black moves second.
    Black,
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl Side {
    /// Returns the complementary side.
    pub fn opponent(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

/// Transport-assigned identifier of a connected participant.
///
/// Stable for the lifetime of one connection; a reconnect yields a new id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[display("peer-{}", _0)]
#[serde(transparent)]
pub struct PeerId(pub u64);

/// A square on the board.
///
/// Displayed and serialized in algebraic form (`e2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(try_from = "String", into = "String")]
#[display("{}", _0)]
pub struct Square(shakmaty::Square);

impl Square {
    /// Creates a square from 1-based file (`a` = 1) and rank.
    pub fn new(file: u8, rank: u8) -> Result<Self, SquareParseError> {
        if !(1..=8).contains(&file) || !(1..=8).contains(&rank) {
            return Err(SquareParseError(format!("{}/{}", file, rank)));
        }
        Ok(Self(shakmaty::Square::from_coords(
            File::new(u32::from(file - 1)),
            Rank::new(u32::from(rank - 1)),
        )))
    }

    /// 1-based file (`a` = 1).
    pub fn file(&self) -> u8 {
        self.0.file() as u8 + 1
    }

    /// 1-based rank.
    pub fn rank(&self) -> u8 {
        self.0.rank() as u8 + 1
    }
}

impl From<shakmaty::Square> for Square {
    fn from(square: shakmaty::Square) -> Self {
        Self(square)
    }
}

impl From<Square> for shakmaty::Square {
    fn from(square: Square) -> Self {
        square.0
    }
}

impl FromStr for Square {
    type Err = SquareParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<shakmaty::Square>()
            .map(Self)
            .map_err(|_| SquareParseError(s.to_string()))
    }
}

impl TryFrom<String> for Square {
    type Error = SquareParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Square> for String {
    fn from(square: Square) -> Self {
        square.to_string()
    }
}

/// A string that does not name a board square.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("Not a board square: {}", _0)]
pub struct SquareParseError(#[error(not(source))] pub String);

/// Piece a pawn may be promoted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PromotionPiece {
    /// Queen.
    Queen,
    /// Rook.
    Rook,
    /// Bishop.
    Bishop,
    /// Knight.
    Knight,
}

impl From<PromotionPiece> for Role {
    fn from(piece: PromotionPiece) -> Self {
        match piece {
            PromotionPiece::Queen => Role::Queen,
            PromotionPiece::Rook => Role::Rook,
            PromotionPiece::Bishop => Role::Bishop,
            PromotionPiece::Knight => Role::Knight,
        }
    }
}

impl TryFrom<Role> for PromotionPiece {
    type Error = Role;

    fn try_from(role: Role) -> Result<Self, Self::Error> {
        match role {
            Role::Queen => Ok(PromotionPiece::Queen),
            Role::Rook => Ok(PromotionPiece::Rook),
            Role::Bishop => Ok(PromotionPiece::Bishop),
            Role::Knight => Ok(PromotionPiece::Knight),
            other => Err(other),
        }
    }
}

/// Why a game stopped accepting moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminalReason {
    /// The moving side delivered mate.
    #[display("{} wins by checkmate", winner)]
    Checkmate {
        /// Side that delivered mate.
        winner: Side,
    },
    /// Side to move has no legal move and is not in check.
    #[display("Draw by stalemate")]
    Stalemate,
    /// A player conceded.
    #[display("{} resigned, {} wins", resigner, resigner.opponent())]
    Resignation {
        /// Side that resigned.
        resigner: Side,
    },
    /// The session hit an internal consistency fault.
    #[display("Game aborted: {}", detail)]
    Aborted {
        /// What went wrong.
        detail: String,
    },
}

impl TerminalReason {
    /// Returns the winning side, if the game has one.
    pub fn winner(&self) -> Option<Side> {
        match self {
            TerminalReason::Checkmate { winner } => Some(*winner),
            TerminalReason::Resignation { resigner } => Some(resigner.opponent()),
            TerminalReason::Stalemate | TerminalReason::Aborted { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_parse_and_display() {
        let square: Square = "e2".parse().unwrap();
        assert_eq!(square.file(), 5);
        assert_eq!(square.rank(), 2);
        assert_eq!(square.to_string(), "e2");
    }

    #[test]
    fn test_square_rejects_off_board() {
        assert!("i1".parse::<Square>().is_err());
        assert!("a9".parse::<Square>().is_err());
        assert!("e".parse::<Square>().is_err());
        assert!(Square::new(0, 4).is_err());
    }

    #[test]
    fn test_square_serializes_as_algebraic() {
        let square = Square::new(1, 8).unwrap();
        assert_eq!(serde_json::to_string(&square).unwrap(), "\"a8\"");
        let back: Square = serde_json::from_str("\"h1\"").unwrap();
        assert_eq!(back, Square::new(8, 1).unwrap());
    }

    #[test]
    fn test_square_converts_to_engine_square() {
        let square: Square = "e2".parse().unwrap();
        assert_eq!(shakmaty::Square::from(square), shakmaty::Square::E2);
        assert_eq!(Square::from(shakmaty::Square::H8).to_string(), "h8");
    }

    #[test]
    fn test_only_minor_and_major_pieces_promote() {
        assert_eq!(Role::from(PromotionPiece::Knight), Role::Knight);
        assert_eq!(PromotionPiece::try_from(Role::Queen), Ok(PromotionPiece::Queen));
        assert_eq!(PromotionPiece::try_from(Role::King), Err(Role::King));
    }

    #[test]
    fn test_terminal_reason_text() {
        let reason = TerminalReason::Resignation { resigner: Side::White };
        assert_eq!(reason.to_string(), "White resigned, Black wins");
    }

    #[test]
    fn test_terminal_winner() {
        assert_eq!(
            TerminalReason::Resignation { resigner: Side::White }.winner(),
            Some(Side::Black)
        );
        assert_eq!(TerminalReason::Stalemate.winner(), None);
        assert_eq!(
            TerminalReason::Checkmate { winner: Side::Black }.winner(),
            Some(Side::Black)
        );
    }
}
