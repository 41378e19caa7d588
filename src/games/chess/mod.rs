//! Chess rules backed by shakmaty.

mod engine;

pub use engine::{ChessBoard, ChessMove, ChessRules};
