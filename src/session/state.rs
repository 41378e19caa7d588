//! Authoritative session record.
//!
//! `SessionState` holds data only. Every setter checks the session
//! invariants first and, when a change would break one, returns
//! [`SessionError::InvalidTransition`] without touching anything.

use crate::error::SessionError;
use crate::types::{PeerId, Side, TerminalReason};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// A side bound to a peer.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct Seat {
    /// Side played from this seat.
    side: Side,
    /// Whether the peer's connection is currently open.
    connected: bool,
    /// Token that lets a reconnecting client reclaim the seat.
    resume_token: Uuid,
}

/// Single source of truth for one game session.
#[derive(Debug, Clone)]
pub struct SessionState<B> {
    seats: BTreeMap<PeerId, Seat>,
    turn: Side,
    board: B,
    half_moves: usize,
    terminal: Option<TerminalReason>,
}

#[instrument(skip(detail))]
fn invalid(detail: impl Into<String>) -> SessionError {
    let detail = detail.into();
    warn!(%detail, "Rejected invalid session transition");
    SessionError::InvalidTransition(detail)
}

impl<B> SessionState<B> {
    /// Creates an empty session around a fresh board. White moves first.
    #[instrument(skip(board))]
    pub fn new(board: B) -> Self {
        info!("Creating session state");
        Self {
            seats: BTreeMap::new(),
            turn: Side::White,
            board,
            half_moves: 0,
            terminal: None,
        }
    }

    /// Side whose move is currently legal.
    pub fn turn(&self) -> Side {
        self.turn
    }

    /// The opaque board.
    pub fn board(&self) -> &B {
        &self.board
    }

    /// Mutable board access for the rules engine.
    pub(crate) fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    /// Half-moves applied since the game started.
    pub fn half_moves(&self) -> usize {
        self.half_moves
    }

    /// Terminal reason, if the game is over.
    pub fn terminal(&self) -> Option<&TerminalReason> {
        self.terminal.as_ref()
    }

    /// True once the game has ended.
    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    /// True when at least one move was played and the game is not over.
    pub fn in_progress(&self) -> bool {
        self.half_moves > 0 && !self.is_terminal()
    }

    /// All seats, keyed by peer.
    pub fn seats(&self) -> &BTreeMap<PeerId, Seat> {
        &self.seats
    }

    /// The seat held by `peer`.
    pub fn seat(&self, peer: PeerId) -> Option<&Seat> {
        self.seats.get(&peer)
    }

    /// Side held by `peer`.
    pub fn side_of(&self, peer: PeerId) -> Option<Side> {
        self.seats.get(&peer).map(|seat| seat.side)
    }

    /// Peer seated on `side`.
    pub fn peer_of(&self, side: Side) -> Option<PeerId> {
        self.seats
            .iter()
            .find(|(_, seat)| seat.side == side)
            .map(|(peer, _)| *peer)
    }

    /// Peer whose seat carries `token`.
    pub fn peer_by_token(&self, token: Uuid) -> Option<PeerId> {
        self.seats
            .iter()
            .find(|(_, seat)| seat.resume_token == token)
            .map(|(peer, _)| *peer)
    }

    /// Binds `peer` to `side` with a new resume token.
    #[instrument(skip(self))]
    pub fn take_seat(&mut self, peer: PeerId, side: Side) -> Result<Uuid, SessionError> {
        if self.seats.contains_key(&peer) {
            return Err(invalid(format!("{} is already seated", peer)));
        }
        if let Some(holder) = self.peer_of(side) {
            return Err(invalid(format!("{} is already held by {}", side, holder)));
        }

        let resume_token = Uuid::new_v4();
        self.seats.insert(
            peer,
            Seat {
                side,
                connected: true,
                resume_token,
            },
        );
        info!(%peer, %side, "Seat taken");
        Ok(resume_token)
    }

    /// Frees the seat held by `peer`.
    #[instrument(skip(self))]
    pub fn release(&mut self, peer: PeerId) -> Result<Side, SessionError> {
        let seat = self
            .seats
            .remove(&peer)
            .ok_or_else(|| invalid(format!("{} holds no seat to release", peer)))?;
        info!(%peer, side = %seat.side, "Seat released");
        Ok(seat.side)
    }

    /// Records whether `peer`'s connection is open.
    #[instrument(skip(self))]
    pub fn set_connected(&mut self, peer: PeerId, connected: bool) -> Result<(), SessionError> {
        let seat = self
            .seats
            .get_mut(&peer)
            .ok_or_else(|| invalid(format!("{} holds no seat", peer)))?;
        seat.connected = connected;
        debug!(%peer, connected, "Seat connection updated");
        Ok(())
    }

    /// Moves a disconnected seat from `old` to the new connection `new`.
    #[instrument(skip(self))]
    pub fn rebind(&mut self, old: PeerId, new: PeerId) -> Result<Side, SessionError> {
        if self.seats.contains_key(&new) {
            return Err(invalid(format!("{} is already seated", new)));
        }
        match self.seats.get(&old) {
            None => return Err(invalid(format!("{} holds no seat", old))),
            Some(seat) if seat.connected => {
                return Err(invalid(format!("{} is still connected", old)));
            }
            Some(_) => {}
        }

        let mut seat = self
            .seats
            .remove(&old)
            .ok_or_else(|| invalid(format!("{} holds no seat", old)))?;
        seat.connected = true;
        let side = seat.side;
        self.seats.insert(new, seat);
        info!(%old, %new, %side, "Seat rebound to new connection");
        Ok(side)
    }

    /// Counts an applied half-move.
    pub fn record_half_move(&mut self) -> Result<(), SessionError> {
        if self.is_terminal() {
            return Err(invalid("cannot record a move after the game ended"));
        }
        self.half_moves += 1;
        Ok(())
    }

    /// Hands the move to the other side.
    #[instrument(skip(self), fields(turn = %self.turn))]
    pub fn advance_turn(&mut self) -> Result<Side, SessionError> {
        if self.is_terminal() {
            return Err(invalid("cannot change turn after the game ended"));
        }
        self.turn = self.turn.opponent();
        debug!(turn = %self.turn, "Turn advanced");
        Ok(self.turn)
    }

    /// Ends the game. The turn is frozen from here on.
    #[instrument(skip(self))]
    pub fn set_terminal(&mut self, reason: TerminalReason) -> Result<(), SessionError> {
        if let Some(existing) = &self.terminal {
            return Err(invalid(format!("game already ended: {}", existing)));
        }
        info!(%reason, "Game reached terminal state");
        self.terminal = Some(reason);
        Ok(())
    }

    /// Ends the game after an internal fault, overriding any previous outcome.
    #[instrument(skip(self))]
    pub fn abort(&mut self, detail: String) {
        warn!(%detail, "Session aborted");
        self.terminal = Some(TerminalReason::Aborted { detail });
    }

    /// Starts a new game on `board`.
    ///
    /// Seats of connected peers survive; disconnected seats are freed.
    #[instrument(skip(self, board))]
    pub fn reset(&mut self, board: B) {
        let before = self.seats.len();
        self.seats.retain(|_, seat| seat.connected);
        self.board = board;
        self.turn = Side::White;
        self.half_moves = 0;
        self.terminal = None;
        info!(
            seats_kept = self.seats.len(),
            seats_freed = before - self.seats.len(),
            "Session reset"
        );
    }

    /// Replaces the game with a restored one. Seats are untouched.
    #[instrument(skip(self, board))]
    pub fn load(
        &mut self,
        board: B,
        turn: Side,
        half_moves: usize,
        terminal: Option<TerminalReason>,
    ) {
        self.board = board;
        self.turn = turn;
        self.half_moves = half_moves;
        self.terminal = terminal;
        info!(%turn, half_moves, terminal = self.terminal.is_some(), "Game loaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState<()> {
        SessionState::new(())
    }

    #[test]
    fn test_new_state_starts_with_white() {
        let state = state();
        assert_eq!(state.turn(), Side::White);
        assert!(!state.is_terminal());
        assert!(state.seats().is_empty());
    }

    #[test]
    fn test_side_held_twice_is_invalid() {
        let mut state = state();
        state.take_seat(PeerId(1), Side::White).unwrap();
        let result = state.take_seat(PeerId(2), Side::White);
        assert!(matches!(result, Err(SessionError::InvalidTransition(_))));
        assert_eq!(state.seats().len(), 1);
    }

    #[test]
    fn test_peer_seated_twice_is_invalid() {
        let mut state = state();
        state.take_seat(PeerId(1), Side::White).unwrap();
        let result = state.take_seat(PeerId(1), Side::Black);
        assert!(matches!(result, Err(SessionError::InvalidTransition(_))));
    }

    #[test]
    fn test_turn_frozen_after_terminal() {
        let mut state = state();
        state.set_terminal(TerminalReason::Stalemate).unwrap();
        assert!(matches!(
            state.advance_turn(),
            Err(SessionError::InvalidTransition(_))
        ));
        assert_eq!(state.turn(), Side::White);
        assert!(matches!(
            state.set_terminal(TerminalReason::Stalemate),
            Err(SessionError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_rebind_requires_disconnected_seat() {
        let mut state = state();
        state.take_seat(PeerId(1), Side::White).unwrap();
        assert!(state.rebind(PeerId(1), PeerId(5)).is_err());

        state.set_connected(PeerId(1), false).unwrap();
        assert_eq!(state.rebind(PeerId(1), PeerId(5)).unwrap(), Side::White);
        assert_eq!(state.side_of(PeerId(5)), Some(Side::White));
        assert_eq!(state.side_of(PeerId(1)), None);
        assert!(*state.seat(PeerId(5)).unwrap().connected());
    }

    #[test]
    fn test_reset_frees_disconnected_seats_only() {
        let mut state = state();
        state.take_seat(PeerId(1), Side::White).unwrap();
        state.take_seat(PeerId(2), Side::Black).unwrap();
        state.record_half_move().unwrap();
        state.advance_turn().unwrap();
        state.set_connected(PeerId(2), false).unwrap();

        state.reset(());
        assert_eq!(state.turn(), Side::White);
        assert_eq!(state.half_moves(), 0);
        assert_eq!(state.side_of(PeerId(1)), Some(Side::White));
        assert_eq!(state.side_of(PeerId(2)), None);
    }

    #[test]
    fn test_abort_overrides_outcome() {
        let mut state = state();
        state.set_terminal(TerminalReason::Stalemate).unwrap();
        state.abort("desync".to_string());
        assert!(matches!(
            state.terminal(),
            Some(TerminalReason::Aborted { .. })
        ));
    }
}
