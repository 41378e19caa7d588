//! Session core: authoritative state, the coordinator that mutates it,
//! and the events it publishes.

mod coordinator;
mod events;
mod state;

pub use coordinator::{
    DEFAULT_EVENT_CAPACITY, MoveOutcome, SeatView, SessionCoordinator, SessionSnapshot,
};
pub use events::SessionEvent;
pub use state::{Seat, SessionState};
