//! The authoritative decision-maker for one game session.
//!
//! `SessionCoordinator` is the only code allowed to mutate a
//! [`SessionState`]. Each operation validates the request, finishes every
//! state change, and only then hands the resulting messages to the
//! transport, so a broadcast never describes a half-applied move.

use super::events::SessionEvent;
use super::state::SessionState;
use crate::error::SessionError;
use crate::protocol::{ClientRequest, ServerMessage};
use crate::rules_engine::RulesEngine;
use crate::transport::Transport;
use crate::types::{PeerId, PromotionPiece, Side, Square, TerminalReason};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Default capacity of the session event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Result of an accepted move request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The move was applied to the board.
    Applied {
        /// Set when the move ended the game.
        terminal: Option<TerminalReason>,
    },
    /// The move is parked until the requester picks a promotion piece.
    AwaitingPromotion {
        /// Id to quote when choosing the piece.
        pending_id: u64,
    },
}

/// A promotion move waiting for its piece choice.
#[derive(Debug, Clone)]
struct PendingPromotion<M> {
    id: u64,
    peer: PeerId,
    side: Side,
    from: Square,
    to: Square,
    mv: M,
}

/// Serializable view of one seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatView {
    /// Seated peer.
    pub peer: PeerId,
    /// Its side.
    pub side: Side,
    /// Whether its connection is open.
    pub connected: bool,
}

/// Serializable view of the whole session, for local queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Seats in peer order.
    pub seats: Vec<SeatView>,
    /// Side to move.
    pub turn: Side,
    /// Half-moves played in the current game.
    pub half_moves: usize,
    /// Terminal state, if the game is over.
    pub terminal: Option<TerminalReason>,
    /// Id of the parked promotion, if any.
    pub pending_promotion: Option<u64>,
}

/// Message queued during an operation and sent once state is settled.
#[derive(Debug)]
enum Outgoing {
    To(PeerId, ServerMessage),
    All(ServerMessage),
}

/// Validates requests, mutates session state and decides what to broadcast.
pub struct SessionCoordinator<R: RulesEngine, T: Transport> {
    rules: R,
    transport: T,
    state: SessionState<R::Board>,
    pending: Option<PendingPromotion<R::Move>>,
    next_pending_id: u64,
    events: broadcast::Sender<SessionEvent>,
}

impl<R: RulesEngine, T: Transport> SessionCoordinator<R, T> {
    /// Creates a coordinator with a fresh board.
    pub fn new(rules: R, transport: T) -> Self {
        Self::with_event_capacity(rules, transport, DEFAULT_EVENT_CAPACITY)
    }

    /// Creates a coordinator whose event channel buffers `capacity` events.
    #[instrument(skip(rules, transport))]
    pub fn with_event_capacity(rules: R, transport: T, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let state = SessionState::new(rules.new_board());
        info!("Session coordinator ready");
        Self {
            rules,
            transport,
            state,
            pending: None,
            next_pending_id: 0,
            events,
        }
    }

    // ─────────────────────────────────────────────────────────────
    //  Local queries
    // ─────────────────────────────────────────────────────────────

    /// Side whose move is currently legal.
    pub fn current_turn(&self) -> Side {
        self.state.turn()
    }

    /// Side held by `peer`, if seated.
    pub fn side_of(&self, peer: PeerId) -> Option<Side> {
        self.state.side_of(peer)
    }

    /// True once the game has ended.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Why the game ended, if it has.
    pub fn terminal_reason(&self) -> Option<&TerminalReason> {
        self.state.terminal()
    }

    /// Read-only access to the authoritative state.
    pub fn state(&self) -> &SessionState<R::Board> {
        &self.state
    }

    /// The injected rules engine.
    pub fn rules(&self) -> &R {
        &self.rules
    }

    /// Id of the parked promotion, if any.
    pub fn pending_promotion(&self) -> Option<u64> {
        self.pending.as_ref().map(|p| p.id)
    }

    /// Serializable summary of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            seats: self
                .state
                .seats()
                .iter()
                .map(|(peer, seat)| SeatView {
                    peer: *peer,
                    side: *seat.side(),
                    connected: *seat.connected(),
                })
                .collect(),
            turn: self.state.turn(),
            half_moves: self.state.half_moves(),
            terminal: self.state.terminal().cloned(),
            pending_promotion: self.pending_promotion(),
        }
    }

    /// Subscribes to session events. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    // ─────────────────────────────────────────────────────────────
    //  Connection lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Seats a newly connected peer.
    ///
    /// The first seat is White and the second Black; a third peer is
    /// refused with [`SessionError::SessionFull`]. A peer that is already
    /// seated keeps its side and nothing changes.
    #[instrument(skip(self))]
    pub fn assign_side(&mut self, peer: PeerId) -> Result<Side, SessionError> {
        let result = self.try_assign_side(peer);
        self.settle(Some(peer), result)
    }

    fn try_assign_side(&mut self, peer: PeerId) -> Result<Side, SessionError> {
        if let Some(side) = self.state.side_of(peer) {
            debug!(%peer, %side, "Peer already seated");
            return Ok(side);
        }

        let side = match (self.state.peer_of(Side::White), self.state.peer_of(Side::Black)) {
            (None, _) => Side::White,
            (Some(_), None) => Side::Black,
            (Some(_), Some(_)) => return Err(SessionError::SessionFull),
        };

        let resume_token = self.state.take_seat(peer, side)?;
        let mut outbox = vec![
            Outgoing::To(peer, self.welcome(peer, side, resume_token)),
            Outgoing::All(ServerMessage::SideAssigned { peer_id: peer, side }),
        ];
        if self.rules.half_move_count(self.state.board()) > 0 {
            outbox.extend(self.sync_messages(peer));
        }

        self.flush(outbox);
        self.emit(SessionEvent::PeerJoined { peer, side });
        info!(%peer, %side, "Side assigned");
        Ok(side)
    }

    /// Handles a closed connection.
    ///
    /// While a game is in progress the seat is held for a reconnect;
    /// otherwise it is freed at once.
    #[instrument(skip(self))]
    pub fn handle_peer_disconnected(&mut self, peer: PeerId) -> Result<(), SessionError> {
        let result = self.try_disconnect(peer);
        self.settle(Some(peer), result)
    }

    fn try_disconnect(&mut self, peer: PeerId) -> Result<(), SessionError> {
        let Some(side) = self.state.side_of(peer) else {
            debug!(%peer, "Unseated peer disconnected");
            return Ok(());
        };

        if self.pending.as_ref().is_some_and(|p| p.peer == peer) {
            debug!(%peer, "Dropping parked promotion of departed peer");
            self.pending = None;
        }

        let seat_held = self.state.in_progress();
        if seat_held {
            self.state.set_connected(peer, false)?;
            info!(%peer, %side, "Peer disconnected mid-game, seat held");
        } else {
            self.state.release(peer)?;
            info!(%peer, %side, "Peer disconnected, seat freed");
        }

        self.emit(SessionEvent::PeerLeft {
            peer,
            side,
            seat_held,
        });
        Ok(())
    }

    /// Gives a held seat to a new connection presenting its resume token.
    #[instrument(skip(self, resume_token))]
    pub fn handle_reconnect(&mut self, peer: PeerId, resume_token: Uuid) -> Result<Side, SessionError> {
        let result = self.try_reconnect(peer, resume_token);
        self.settle(Some(peer), result)
    }

    fn try_reconnect(&mut self, peer: PeerId, resume_token: Uuid) -> Result<Side, SessionError> {
        let old = self
            .state
            .peer_by_token(resume_token)
            .filter(|old| {
                self.state
                    .seat(*old)
                    .is_some_and(|seat| !*seat.connected())
            })
            .ok_or(SessionError::UnknownResumeToken)?;

        let side = self.state.rebind(old, peer)?;
        let mut outbox = vec![
            Outgoing::To(peer, self.welcome(peer, side, resume_token)),
            Outgoing::All(ServerMessage::SideAssigned { peer_id: peer, side }),
        ];
        outbox.extend(self.sync_messages(peer));

        self.flush(outbox);
        self.emit(SessionEvent::PeerJoined { peer, side });
        info!(%old, %peer, %side, "Peer reclaimed seat");
        Ok(side)
    }

    /// Sends a late joiner the full board followed by the side to move.
    #[instrument(skip(self))]
    pub fn sync_new_peer(&mut self, peer: PeerId) {
        let outbox = self.sync_messages(peer);
        self.flush(outbox);
    }

    // ─────────────────────────────────────────────────────────────
    //  Moves
    // ─────────────────────────────────────────────────────────────

    /// Validates and applies a move request.
    ///
    /// On success the board update is broadcast first, followed by either
    /// the turn change or the end of the game.
    #[instrument(skip(self), fields(turn = %self.state.turn()))]
    pub fn handle_move_request(
        &mut self,
        peer: PeerId,
        from: Square,
        to: Square,
    ) -> Result<MoveOutcome, SessionError> {
        let result = self.try_move(peer, from, to);
        self.settle(Some(peer), result)
    }

    fn try_move(&mut self, peer: PeerId, from: Square, to: Square) -> Result<MoveOutcome, SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::AlreadyTerminal);
        }

        let side = self
            .state
            .side_of(peer)
            .filter(|side| *side == self.state.turn())
            .ok_or(SessionError::NotYourTurn)?;

        let mv = self
            .rules
            .try_get_legal_move(self.state.board(), from, to)
            .ok_or(SessionError::IllegalMove { from, to })?;

        if self.rules.requires_promotion_choice(&mv) {
            self.next_pending_id += 1;
            let pending_id = self.next_pending_id;
            if let Some(previous) = self.pending.replace(PendingPromotion {
                id: pending_id,
                peer,
                side,
                from,
                to,
                mv,
            }) {
                debug!(previous = previous.id, "Replaced parked promotion");
            }
            self.flush(vec![Outgoing::To(
                peer,
                ServerMessage::PromotionRequired { pending_id, from, to },
            )]);
            info!(%peer, pending_id, "Promotion move parked awaiting piece choice");
            return Ok(MoveOutcome::AwaitingPromotion { pending_id });
        }

        self.pending = None;
        self.apply_move(side, mv, from, to, None)
    }

    /// Resumes a parked promotion with the chosen piece.
    #[instrument(skip(self))]
    pub fn handle_promotion_choice(
        &mut self,
        peer: PeerId,
        pending_id: u64,
        piece: PromotionPiece,
    ) -> Result<MoveOutcome, SessionError> {
        let result = self.try_promotion_choice(peer, pending_id, piece);
        self.settle(Some(peer), result)
    }

    fn try_promotion_choice(
        &mut self,
        peer: PeerId,
        pending_id: u64,
        piece: PromotionPiece,
    ) -> Result<MoveOutcome, SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::AlreadyTerminal);
        }

        let pending = match self.pending.take() {
            Some(p) if p.id == pending_id && p.peer == peer => p,
            other => {
                self.pending = other;
                return Err(SessionError::UnknownPendingMove(pending_id));
            }
        };

        if pending.side != self.state.turn() {
            return Err(SessionError::InvalidTransition(format!(
                "parked promotion for {} while {} is to move",
                pending.side,
                self.state.turn()
            )));
        }

        let mv = self.rules.with_promotion(pending.mv, piece);
        self.apply_move(pending.side, mv, pending.from, pending.to, Some(piece))
    }

    /// Executes a validated move and publishes the outcome.
    fn apply_move(
        &mut self,
        side: Side,
        mv: R::Move,
        from: Square,
        to: Square,
        promotion: Option<PromotionPiece>,
    ) -> Result<MoveOutcome, SessionError> {
        if !self.rules.try_execute_move(self.state.board_mut(), &mv) {
            return Err(SessionError::ExecutionFailed { from, to });
        }

        let half_move = self.rules.latest_half_move(self.state.board()).ok_or_else(|| {
            SessionError::InvalidTransition("engine reported no half-move after executing".into())
        })?;
        if half_move.moving_side != side {
            return Err(SessionError::InvalidTransition(format!(
                "engine moved {} but {} was to move",
                half_move.moving_side, side
            )));
        }
        self.state.record_half_move()?;

        let mut outbox = vec![Outgoing::All(ServerMessage::BoardUpdated { from, to, promotion })];
        let terminal = half_move.outcome();

        match &terminal {
            Some(reason) => {
                self.state.set_terminal(reason.clone())?;
                outbox.push(Outgoing::All(ServerMessage::game_ended(reason.clone())));
            }
            None => {
                let next = self.state.advance_turn()?;
                let engine_turn = self.rules.side_to_move(self.state.board());
                if engine_turn != next {
                    return Err(SessionError::InvalidTransition(format!(
                        "session turn {} disagrees with board turn {}",
                        next, engine_turn
                    )));
                }
                outbox.push(Outgoing::All(ServerMessage::TurnChanged { side: next }));
            }
        }

        self.flush(outbox);
        self.emit(SessionEvent::MoveExecuted { side, from, to });
        if let Some(reason) = &terminal {
            self.emit(SessionEvent::GameEnded {
                reason: reason.clone(),
            });
        }

        info!(%side, %from, %to, terminal = ?terminal, "Move applied");
        Ok(MoveOutcome::Applied { terminal })
    }

    // ─────────────────────────────────────────────────────────────
    //  Game lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Concedes the game on behalf of `peer`.
    #[instrument(skip(self))]
    pub fn handle_resignation(&mut self, peer: PeerId) -> Result<TerminalReason, SessionError> {
        let result = self.try_resign(peer);
        self.settle(Some(peer), result)
    }

    fn try_resign(&mut self, peer: PeerId) -> Result<TerminalReason, SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::AlreadyTerminal);
        }
        let resigner = self.state.side_of(peer).ok_or(SessionError::NotSeated)?;

        let reason = TerminalReason::Resignation { resigner };
        self.state.set_terminal(reason.clone())?;
        self.pending = None;

        self.flush(vec![Outgoing::All(ServerMessage::Resigned {
            resigner,
            winner: resigner.opponent(),
        })]);
        self.emit(SessionEvent::GameEnded {
            reason: reason.clone(),
        });
        info!(%peer, %resigner, "Player resigned");
        Ok(reason)
    }

    /// Starts a new game. Connected seats are kept, held seats are freed.
    #[instrument(skip(self))]
    pub fn restart_session(&mut self) {
        let board = self.rules.new_board();
        self.state.reset(board);
        self.pending = None;

        self.flush(vec![Outgoing::All(ServerMessage::GameRestarted)]);
        self.emit(SessionEvent::GameRestarted);
        info!("Session restarted");
    }

    /// Encodes the current game for later [`SessionCoordinator::load_game`].
    pub fn save_game(&self) -> String {
        self.rules.serialize_board(self.state.board())
    }

    /// Replaces the current game with a saved one and resyncs every peer.
    #[instrument(skip(self, snapshot))]
    pub fn load_game(&mut self, snapshot: &str) -> Result<(), SessionError> {
        let result = self.try_load(snapshot);
        self.settle(None, result)
    }

    fn try_load(&mut self, snapshot: &str) -> Result<(), SessionError> {
        let board = self.rules.deserialize_board(snapshot)?;
        let turn = self.rules.side_to_move(&board);
        let half_moves = self.rules.half_move_count(&board);
        let terminal = self
            .rules
            .latest_half_move(&board)
            .and_then(|half_move| half_move.outcome());

        self.state.load(board, turn, half_moves, terminal.clone());
        self.pending = None;

        let follow_up = match &terminal {
            Some(reason) => ServerMessage::game_ended(reason.clone()),
            None => ServerMessage::TurnChanged { side: turn },
        };
        self.flush(vec![
            Outgoing::All(ServerMessage::BoardSnapshot {
                board: self.save_game(),
                turn,
                terminal,
            }),
            Outgoing::All(follow_up),
        ]);
        self.emit(SessionEvent::GameLoaded { half_moves });
        info!(%turn, half_moves, "Saved game loaded");
        Ok(())
    }

    /// Rewinds the game to just after half-move `index`.
    ///
    /// Zero returns to the starting position. Any parked promotion is
    /// dropped and every peer is resynced with the rewound board.
    #[instrument(skip(self))]
    pub fn rewind_to_half_move(&mut self, index: usize) -> Result<(), SessionError> {
        let result = self.try_rewind(index);
        self.settle(None, result)
    }

    fn try_rewind(&mut self, index: usize) -> Result<(), SessionError> {
        let played = self.rules.half_move_count(self.state.board());
        if index > played {
            return Err(SessionError::InvalidHalfMove { index, played });
        }

        let board = self.rules.rewind(self.state.board(), index)?;
        let turn = self.rules.side_to_move(&board);
        let terminal = self
            .rules
            .latest_half_move(&board)
            .and_then(|half_move| half_move.outcome());

        self.state.load(board, turn, index, terminal.clone());
        self.pending = None;

        let follow_up = match &terminal {
            Some(reason) => ServerMessage::game_ended(reason.clone()),
            None => ServerMessage::TurnChanged { side: turn },
        };
        self.flush(vec![
            Outgoing::All(ServerMessage::BoardSnapshot {
                board: self.save_game(),
                turn,
                terminal,
            }),
            Outgoing::All(follow_up),
        ]);
        self.emit(SessionEvent::GameRewound { half_moves: index });
        info!(%turn, index, played, "Game rewound");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    //  Wire dispatch
    // ─────────────────────────────────────────────────────────────

    /// Handles one request from a peer.
    ///
    /// A refused request leaves the session untouched and is answered
    /// with a [`ServerMessage::Rejected`] sent to the requester only.
    #[instrument(skip(self, request))]
    pub fn handle_request(&mut self, peer: PeerId, request: ClientRequest) -> Result<(), SessionError> {
        debug!(?request, "Dispatching request");
        let result = self.dispatch(peer, request);
        if let Err(err) = &result {
            self.transport.send(peer, ServerMessage::rejected(err));
        }
        result
    }

    fn dispatch(&mut self, peer: PeerId, request: ClientRequest) -> Result<(), SessionError> {
        match request {
            ClientRequest::Move { from, to } => self.handle_move_request(peer, from, to).map(drop),
            ClientRequest::ChoosePromotion { pending_id, piece } => self
                .handle_promotion_choice(peer, pending_id, piece)
                .map(drop),
            ClientRequest::Resign => self.handle_resignation(peer).map(drop),
            ClientRequest::Restart => {
                self.authorize_host(peer)?;
                self.restart_session();
                Ok(())
            }
            ClientRequest::Sync => {
                if self.state.side_of(peer).is_none() {
                    warn!(%peer, "Sync requested by unseated peer");
                    return Err(SessionError::NotSeated);
                }
                self.sync_new_peer(peer);
                Ok(())
            }
            ClientRequest::LoadGame { snapshot } => {
                self.authorize_host(peer)?;
                self.load_game(&snapshot)
            }
            ClientRequest::ResetToHalfMove { index } => {
                self.authorize_host(peer)?;
                self.rewind_to_half_move(index)
            }
            ClientRequest::Ping { nonce } => {
                self.transport.send(peer, ServerMessage::Pong { nonce });
                Ok(())
            }
        }
    }

    /// The host is whoever holds the White seat.
    ///
    /// While the White seat is empty or its peer is disconnected, any
    /// connected seat holder stands in, so the session cannot be stranded.
    #[instrument(level = "debug", skip(self))]
    fn authorize_host(&self, peer: PeerId) -> Result<(), SessionError> {
        let host = self.state.peer_of(Side::White);
        if host == Some(peer) {
            return Ok(());
        }

        let host_present = host
            .and_then(|host| self.state.seat(host))
            .is_some_and(|seat| *seat.connected());
        let requester_seated = self
            .state
            .seat(peer)
            .is_some_and(|seat| *seat.connected());
        if !host_present && requester_seated {
            info!(%peer, "Host absent, seated peer acting as host");
            return Ok(());
        }

        warn!(%peer, "Host-only request from non-host peer");
        Err(SessionError::NotAuthorized)
    }

    // ─────────────────────────────────────────────────────────────
    //  Helpers
    // ─────────────────────────────────────────────────────────────

    #[instrument(level = "trace", skip(self, resume_token))]
    fn welcome(&self, peer: PeerId, side: Side, resume_token: Uuid) -> ServerMessage {
        ServerMessage::Welcome {
            peer_id: peer,
            side,
            turn: self.state.turn(),
            resume_token,
        }
    }

    #[instrument(level = "trace", skip(self))]
    fn sync_messages(&self, peer: PeerId) -> Vec<Outgoing> {
        let turn = self.state.turn();
        vec![
            Outgoing::To(
                peer,
                ServerMessage::BoardSnapshot {
                    board: self.save_game(),
                    turn,
                    terminal: self.state.terminal().cloned(),
                },
            ),
            Outgoing::To(peer, ServerMessage::TurnChanged { side: turn }),
        ]
    }

    fn flush(&self, outbox: Vec<Outgoing>) {
        for message in outbox {
            match message {
                Outgoing::To(peer, message) => self.transport.send(peer, message),
                Outgoing::All(message) => self.transport.broadcast(message),
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error.
        self.events.send(event).ok();
    }

    /// Logs rejections and turns fatal errors into an aborted session.
    fn settle<V>(&mut self, peer: Option<PeerId>, result: Result<V, SessionError>) -> Result<V, SessionError> {
        match result {
            Ok(value) => Ok(value),
            Err(err) if err.is_fatal() => {
                self.fault(&err);
                Err(err)
            }
            Err(err) => {
                warn!(peer = ?peer, error = %err, "Request rejected");
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    fn fault(&mut self, err: &SessionError) {
        error!(error = %err, "Session fault, ending game");
        let detail = err.to_string();
        self.state.abort(detail.clone());
        self.pending = None;
        self.flush(vec![Outgoing::All(ServerMessage::game_ended(
            TerminalReason::Aborted {
                detail: detail.clone(),
            },
        ))]);
        self.emit(SessionEvent::Faulted { detail });
    }
}

impl<R: RulesEngine, T: Transport> std::fmt::Debug for SessionCoordinator<R, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("state", &self.state)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::chess::ChessRules;
    use crate::transport::ChannelTransport;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn sq(name: &str) -> Square {
        name.parse().unwrap()
    }

    fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn coordinator(rules: ChessRules) -> (SessionCoordinator<ChessRules, Arc<ChannelTransport>>, Arc<ChannelTransport>) {
        let transport = Arc::new(ChannelTransport::new());
        (SessionCoordinator::new(rules, Arc::clone(&transport)), transport)
    }

    #[test]
    fn test_sides_assigned_in_join_order() {
        let (mut session, transport) = coordinator(ChessRules::standard());
        let (a, _rx_a) = transport.register();
        let (b, _rx_b) = transport.register();
        let (c, _rx_c) = transport.register();

        assert_eq!(session.assign_side(a).unwrap(), Side::White);
        assert_eq!(session.assign_side(b).unwrap(), Side::Black);
        assert!(matches!(session.assign_side(c), Err(SessionError::SessionFull)));
        assert_eq!(session.side_of(c), None);
    }

    #[test]
    fn test_out_of_turn_move_changes_nothing() {
        let (mut session, transport) = coordinator(ChessRules::standard());
        let (white, mut rx_white) = transport.register();
        let (black, _rx_black) = transport.register();
        session.assign_side(white).unwrap();
        session.assign_side(black).unwrap();
        drain(&mut rx_white);

        let result = session.handle_move_request(black, sq("e7"), sq("e5"));
        assert!(matches!(result, Err(SessionError::NotYourTurn)));
        assert_eq!(session.current_turn(), Side::White);
        assert_eq!(session.state().half_moves(), 0);
        assert!(drain(&mut rx_white).is_empty());
    }

    #[test]
    fn test_promotion_is_parked_until_chosen() {
        let rules = ChessRules::from_fen("8/P7/8/8/8/8/8/4K2k w - - 0 1").unwrap();
        let (mut session, transport) = coordinator(rules);
        let (white, mut rx_white) = transport.register();
        session.assign_side(white).unwrap();
        drain(&mut rx_white);

        let outcome = session.handle_move_request(white, sq("a7"), sq("a8")).unwrap();
        let MoveOutcome::AwaitingPromotion { pending_id } = outcome else {
            panic!("expected a parked promotion, got {:?}", outcome);
        };
        assert_eq!(session.current_turn(), Side::White);
        assert_eq!(
            drain(&mut rx_white),
            vec![ServerMessage::PromotionRequired {
                pending_id,
                from: sq("a7"),
                to: sq("a8"),
            }]
        );

        assert!(matches!(
            session.handle_promotion_choice(white, pending_id + 1, PromotionPiece::Queen),
            Err(SessionError::UnknownPendingMove(_))
        ));
        assert_eq!(session.pending_promotion(), Some(pending_id));

        session
            .handle_promotion_choice(white, pending_id, PromotionPiece::Queen)
            .unwrap();
        assert_eq!(session.pending_promotion(), None);
        assert_eq!(session.current_turn(), Side::Black);
        assert!(session.rules().serialize_board(session.state().board()).contains("a7a8q"));
    }

    #[test]
    fn test_events_follow_moves() {
        let (mut session, transport) = coordinator(ChessRules::standard());
        let mut events = session.subscribe();
        let (white, _rx) = transport.register();
        session.assign_side(white).unwrap();
        session.handle_move_request(white, sq("e2"), sq("e4")).unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::PeerJoined { peer: white, side: Side::White }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::MoveExecuted {
                side: Side::White,
                from: sq("e2"),
                to: sq("e4"),
            }
        );
    }
}
