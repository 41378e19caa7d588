//! Single task that owns the coordinator.
//!
//! Every connect, disconnect and request travels over one bounded channel
//! and is handled to completion before the next, so turn checks and the
//! mutations they guard cannot interleave.

use crate::error::SessionError;
use crate::protocol::{ClientRequest, ServerMessage};
use crate::rules_engine::RulesEngine;
use crate::session::{SessionCoordinator, SessionEvent, SessionSnapshot};
use crate::transport::{ChannelTransport, Transport};
use crate::types::{PeerId, Side};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// A seated peer and its inbound message stream.
#[derive(Debug)]
pub struct Connection {
    /// Transport-assigned id.
    pub peer: PeerId,
    /// Seat the peer holds.
    pub side: Side,
    /// Messages addressed to this peer, in send order.
    pub receiver: UnboundedReceiver<ServerMessage>,
}

type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
enum Command {
    Connect {
        reply: Reply<Result<Connection, SessionError>>,
    },
    Reconnect {
        token: Uuid,
        reply: Reply<Result<Connection, SessionError>>,
    },
    Disconnect {
        peer: PeerId,
        reply: Reply<()>,
    },
    Request {
        peer: PeerId,
        request: ClientRequest,
        reply: Reply<Result<(), SessionError>>,
    },
    Restart {
        reply: Reply<()>,
    },
    Load {
        snapshot: String,
        reply: Reply<Result<(), SessionError>>,
    },
    Rewind {
        index: usize,
        reply: Reply<Result<(), SessionError>>,
    },
    Save {
        reply: Reply<String>,
    },
    Snapshot {
        reply: Reply<SessionSnapshot>,
    },
    Subscribe {
        reply: Reply<broadcast::Receiver<SessionEvent>>,
    },
    SendDirect {
        peer: PeerId,
        message: ServerMessage,
    },
}

/// Owns the coordinator and the transport registry.
pub struct SessionHost<R: RulesEngine> {
    coordinator: SessionCoordinator<R, Arc<ChannelTransport>>,
    transport: Arc<ChannelTransport>,
    commands: mpsc::Receiver<Command>,
}

impl<R: RulesEngine> SessionHost<R> {
    /// Starts the host task and returns its handle.
    ///
    /// The task stops once every [`SessionHandle`] is dropped.
    #[instrument(skip(rules))]
    pub fn spawn(rules: R, command_buffer: usize, event_capacity: usize) -> SessionHandle {
        let (tx, commands) = mpsc::channel(command_buffer.max(1));
        let transport = Arc::new(ChannelTransport::new());
        let coordinator =
            SessionCoordinator::with_event_capacity(rules, Arc::clone(&transport), event_capacity);
        let host = Self {
            coordinator,
            transport,
            commands,
        };
        tokio::spawn(host.run());
        info!("Session host started");
        SessionHandle { commands: tx }
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        info!("All session handles dropped, host stopping");
    }

    #[instrument(level = "trace", skip(self))]
    fn handle(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => {
                let result = self.connect();
                reply.send(result).ok();
            }
            Command::Reconnect { token, reply } => {
                let result = self.reconnect(token);
                reply.send(result).ok();
            }
            Command::Disconnect { peer, reply } => {
                self.coordinator.handle_peer_disconnected(peer).ok();
                self.transport.unregister(peer);
                reply.send(()).ok();
            }
            Command::Request {
                peer,
                request,
                reply,
            } => {
                let result = self.coordinator.handle_request(peer, request);
                reply.send(result).ok();
            }
            Command::Restart { reply } => {
                self.coordinator.restart_session();
                reply.send(()).ok();
            }
            Command::Load { snapshot, reply } => {
                let result = self.coordinator.load_game(&snapshot);
                reply.send(result).ok();
            }
            Command::Rewind { index, reply } => {
                let result = self.coordinator.rewind_to_half_move(index);
                reply.send(result).ok();
            }
            Command::Save { reply } => {
                reply.send(self.coordinator.save_game()).ok();
            }
            Command::Snapshot { reply } => {
                reply.send(self.coordinator.snapshot()).ok();
            }
            Command::Subscribe { reply } => {
                reply.send(self.coordinator.subscribe()).ok();
            }
            Command::SendDirect { peer, message } => {
                self.transport.send(peer, message);
            }
        }
    }

    #[instrument(skip(self))]
    fn connect(&mut self) -> Result<Connection, SessionError> {
        let (peer, receiver) = self.transport.register();
        match self.coordinator.assign_side(peer) {
            Ok(side) => Ok(Connection {
                peer,
                side,
                receiver,
            }),
            Err(err) => {
                self.transport.unregister(peer);
                Err(err)
            }
        }
    }

    #[instrument(skip(self, token))]
    fn reconnect(&mut self, token: Uuid) -> Result<Connection, SessionError> {
        let (peer, receiver) = self.transport.register();
        match self.coordinator.handle_reconnect(peer, token) {
            Ok(side) => Ok(Connection {
                peer,
                side,
                receiver,
            }),
            Err(err) => {
                self.transport.unregister(peer);
                Err(err)
            }
        }
    }
}

/// Cloneable front door to a running [`SessionHost`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
}

impl SessionHandle {
    async fn call<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(command(reply)).await.map_err(|_| {
            warn!("Session host is gone");
            SessionError::HostUnavailable
        })?;
        response.await.map_err(|_| SessionError::HostUnavailable)
    }

    /// Seats a new peer.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<Connection, SessionError> {
        self.call(|reply| Command::Connect { reply }).await?
    }

    /// Reclaims a held seat with its resume token.
    #[instrument(skip(self, token))]
    pub async fn reconnect(&self, token: Uuid) -> Result<Connection, SessionError> {
        self.call(|reply| Command::Reconnect { token, reply }).await?
    }

    /// Reports that a peer's connection closed.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, peer: PeerId) -> Result<(), SessionError> {
        self.call(|reply| Command::Disconnect { peer, reply }).await
    }

    /// Forwards a wire request from `peer`.
    #[instrument(skip(self, request))]
    pub async fn request(&self, peer: PeerId, request: ClientRequest) -> Result<(), SessionError> {
        debug!(?request, "Forwarding request to host");
        self.call(|reply| Command::Request {
            peer,
            request,
            reply,
        })
        .await?
    }

    /// Starts a new game without an authorization check.
    #[instrument(skip(self))]
    pub async fn restart(&self) -> Result<(), SessionError> {
        self.call(|reply| Command::Restart { reply }).await
    }

    /// Replaces the game with a saved one.
    #[instrument(skip(self, snapshot))]
    pub async fn load_game(&self, snapshot: String) -> Result<(), SessionError> {
        self.call(|reply| Command::Load { snapshot, reply }).await?
    }

    /// Rewinds the game without an authorization check.
    #[instrument(skip(self))]
    pub async fn rewind(&self, index: usize) -> Result<(), SessionError> {
        self.call(|reply| Command::Rewind { index, reply }).await?
    }

    /// Encodes the current game.
    pub async fn save_game(&self) -> Result<String, SessionError> {
        self.call(|reply| Command::Save { reply }).await
    }

    /// Current session summary.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    /// Subscribes to session events.
    pub async fn subscribe(&self) -> Result<broadcast::Receiver<SessionEvent>, SessionError> {
        self.call(|reply| Command::Subscribe { reply }).await
    }

    /// Queues a message for one peer, bypassing the coordinator.
    pub async fn send_direct(&self, peer: PeerId, message: ServerMessage) -> Result<(), SessionError> {
        self.commands
            .send(Command::SendDirect { peer, message })
            .await
            .map_err(|_| SessionError::HostUnavailable)
    }
}
