//! Game simulation modules

pub mod arena;
pub mod combat;
pub mod geometry;
pub mod r#match;
pub mod projectile;
pub mod snapshot;
pub mod state;
pub mod weapon;

pub use r#match::{GameMatch, MatchHandle, MatchRegistry};
pub use state::{MatchError, MatchPhase, MatchState, PlayerState, RosterEntry};

use crate::ws::protocol::{ClientMsg, ServerMsg};
use uuid::Uuid;

/// Player input received from WebSocket
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub session_id: Uuid,
    pub msg: ClientMsg,
    /// Server receive time (ms); the only clock used for legality checks
    pub received_at: u64,
}

/// Who an outbound message is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    AllExcept(Uuid),
    Only(Uuid),
}

/// A server message tagged with its audience
#[derive(Debug, Clone)]
pub struct Outbound {
    pub audience: Audience,
    pub msg: ServerMsg,
}

impl Outbound {
    pub fn all(msg: ServerMsg) -> Self {
        Self {
            audience: Audience::All,
            msg,
        }
    }

    pub fn except(session_id: Uuid, msg: ServerMsg) -> Self {
        Self {
            audience: Audience::AllExcept(session_id),
            msg,
        }
    }

    pub fn only(session_id: Uuid, msg: ServerMsg) -> Self {
        Self {
            audience: Audience::Only(session_id),
            msg,
        }
    }

    /// Whether `session_id` should receive this message
    pub fn is_for(&self, session_id: Uuid) -> bool {
        match self.audience {
            Audience::All => true,
            Audience::AllExcept(excluded) => excluded != session_id,
            Audience::Only(target) => target == session_id,
        }
    }
}
