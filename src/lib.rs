//! Strictly Chess library - authoritative two-player chess sessions
//!
//! One peer hosts the game. Every move request is validated against the
//! rules engine and the turn order before the shared state changes, and
//! only then is the outcome broadcast to both players.
//!
//! # Architecture
//!
//! - **Rules**: the [`RulesEngine`] trait, with [`ChessRules`] backed by shakmaty
//! - **Session**: [`SessionState`] and the [`SessionCoordinator`] that mutates it
//! - **Transport**: fire-and-forget delivery to peers ([`ChannelTransport`])
//! - **Host**: a single task serializing every command ([`SessionHost`])
//! - **Server**: axum WebSocket and JSON endpoints
//!
//! # Example
//!
//! ```no_run
//! use strictly_chess::{ChessRules, SessionHost, ServerConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServerConfig::default();
//! let handle = SessionHost::spawn(ChessRules::standard(), 64, 64);
//! strictly_chess::serve(&config, handle).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod config;
mod error;
mod games;
mod host;
mod protocol;
mod rules_engine;
mod server;
mod session;
mod transport;
mod types;

// Crate-level exports - Configuration
pub use config::{ConfigError, HOST_ENV, PORT_ENV, ServerConfig};

// Crate-level exports - Errors
pub use error::{RejectionKind, RulesError, SessionError};

// Crate-level exports - Rules
pub use games::chess::{ChessBoard, ChessMove, ChessRules};
pub use rules_engine::{HalfMove, RulesEngine};

// Crate-level exports - Session core
pub use session::{
    DEFAULT_EVENT_CAPACITY, MoveOutcome, Seat, SeatView, SessionCoordinator, SessionEvent,
    SessionSnapshot, SessionState,
};

// Crate-level exports - Wire protocol and transport
pub use protocol::{ClientRequest, ServerMessage};
pub use transport::{ChannelTransport, Transport};

// Crate-level exports - Host and server
pub use host::{Connection, SessionHandle, SessionHost};
pub use server::{ConnectParams, router, serve};

// Crate-level exports - Domain types
pub use types::{PeerId, PromotionPiece, Side, Square, SquareParseError, TerminalReason};
