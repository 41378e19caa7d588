//! Error taxonomy for session operations.

use crate::types::Square;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Reasons the coordinator refuses a request or faults a session.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum SessionError {
    /// Both sides are already seated.
    #[display("Session already has two seated players")]
    SessionFull,

    /// The requester has no side, or its side is not the one to move.
    #[display("Not your turn")]
    NotYourTurn,

    /// The rules engine has no legal move between the squares.
    #[display("Illegal move {} -> {}", from, to)]
    IllegalMove {
        /// Origin square.
        from: Square,
        /// Destination square.
        to: Square,
    },

    /// A move that passed the legality check failed to execute.
    #[display("Legal move {} -> {} failed to execute", from, to)]
    ExecutionFailed {
        /// Origin square.
        from: Square,
        /// Destination square.
        to: Square,
    },

    /// The game has already ended.
    #[display("Game is already over")]
    AlreadyTerminal,

    /// A state mutation would have broken a session invariant.
    #[display("Invalid state transition: {}", _0)]
    InvalidTransition(#[error(not(source))] String),

    /// The requester holds no seat.
    #[display("Peer holds no seat in this session")]
    NotSeated,

    /// Only the host may issue this request.
    #[display("Only the host may do that")]
    NotAuthorized,

    /// No parked promotion with this id belongs to the requester.
    #[display("No pending promotion with id {}", _0)]
    UnknownPendingMove(#[error(not(source))] u64),

    /// A rewind target beyond the moves played so far.
    #[display("Cannot rewind to half-move {} of {}", index, played)]
    InvalidHalfMove {
        /// Requested half-move index.
        index: usize,
        /// Half-moves played in the current game.
        played: usize,
    },

    /// The resume token does not match a disconnected seat.
    #[display("Resume token does not match a vacant seat")]
    UnknownResumeToken,

    /// A serialized game could not be restored.
    #[display("Invalid game snapshot: {}", _0)]
    InvalidSnapshot(#[error(not(source))] String),

    /// The session host task is gone.
    #[display("Session host is not running")]
    HostUnavailable,
}

impl SessionError {
    /// Returns true for internal faults that end the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::ExecutionFailed { .. } | SessionError::InvalidTransition(_)
        )
    }

    /// Wire-level category of this error.
    pub fn kind(&self) -> RejectionKind {
        match self {
            SessionError::SessionFull => RejectionKind::SessionFull,
            SessionError::NotYourTurn => RejectionKind::NotYourTurn,
            SessionError::IllegalMove { .. } => RejectionKind::IllegalMove,
            SessionError::ExecutionFailed { .. } => RejectionKind::ExecutionFailed,
            SessionError::AlreadyTerminal => RejectionKind::AlreadyTerminal,
            SessionError::InvalidTransition(_) => RejectionKind::InvalidTransition,
            SessionError::NotSeated => RejectionKind::NotSeated,
            SessionError::NotAuthorized => RejectionKind::NotAuthorized,
            SessionError::UnknownPendingMove(_) => RejectionKind::UnknownPendingMove,
            SessionError::InvalidHalfMove { .. } => RejectionKind::InvalidHalfMove,
            SessionError::UnknownResumeToken => RejectionKind::UnknownResumeToken,
            SessionError::InvalidSnapshot(_) => RejectionKind::InvalidSnapshot,
            SessionError::HostUnavailable => RejectionKind::HostUnavailable,
        }
    }
}

/// Serializable error category sent back to a rejected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RejectionKind {
    /// See [`SessionError::SessionFull`].
    SessionFull,
    /// See [`SessionError::NotYourTurn`].
    NotYourTurn,
    /// See [`SessionError::IllegalMove`].
    IllegalMove,
    /// See [`SessionError::ExecutionFailed`].
    ExecutionFailed,
    /// See [`SessionError::AlreadyTerminal`].
    AlreadyTerminal,
    /// See [`SessionError::InvalidTransition`].
    InvalidTransition,
    /// See [`SessionError::NotSeated`].
    NotSeated,
    /// See [`SessionError::NotAuthorized`].
    NotAuthorized,
    /// See [`SessionError::UnknownPendingMove`].
    UnknownPendingMove,
    /// See [`SessionError::InvalidHalfMove`].
    InvalidHalfMove,
    /// See [`SessionError::UnknownResumeToken`].
    UnknownResumeToken,
    /// See [`SessionError::InvalidSnapshot`].
    InvalidSnapshot,
    /// See [`SessionError::HostUnavailable`].
    HostUnavailable,
    /// The request could not be decoded.
    MalformedRequest,
}

/// Rules engine error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Rules error: {} at {}:{}", message, file, line)]
pub struct RulesError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl RulesError {
    /// Creates a new rules error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

impl From<RulesError> for SessionError {
    fn from(err: RulesError) -> Self {
        SessionError::InvalidSnapshot(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let square: Square = "e2".parse().unwrap();
        assert!(SessionError::ExecutionFailed { from: square, to: square }.is_fatal());
        assert!(SessionError::InvalidTransition("x".into()).is_fatal());
        assert!(!SessionError::NotYourTurn.is_fatal());
        assert!(!SessionError::AlreadyTerminal.is_fatal());
    }

    #[test]
    fn test_errors_box_into_anyhow() {
        let missing = SessionError::UnknownPendingMove(7);
        assert!(std::error::Error::source(&missing).is_none());
        let err = anyhow::Error::from(missing);
        assert_eq!(err.to_string(), "No pending promotion with id 7");

        let err = anyhow::Error::from(RulesError::new("bad fen"));
        assert!(err.to_string().starts_with("Rules error: bad fen"));
    }

    #[test]
    fn test_rules_error_records_location() {
        let err = RulesError::new("bad fen");
        assert!(err.file.ends_with("error.rs"));
        assert!(err.to_string().contains("bad fen"));
    }
}
