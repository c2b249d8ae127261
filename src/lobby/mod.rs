//! Lobby shim - queues sessions and hands rosters to new matches

pub mod queue;
mod service;

pub use queue::{LobbyQueue, QueuedSession};
pub use service::{LobbyError, LobbyService};
