//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use glam::Vec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Movement intent; position and facing are applied as reported
    Move {
        x: f32,
        z: f32,
        /// Facing angle in radians
        facing: f32,
        /// Client send time, informational only
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Standard attack with the equipped weapon
    Attack {
        #[serde(default)]
        timestamp: u64,
    },

    /// One animation frame of a tracked swing
    SwingSample {
        /// World-space weapon tip
        weapon_tip: Vec3,
        /// World-space weapon base (hilt)
        weapon_base: Vec3,
        #[serde(default)]
        timestamp: u64,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave current match
    Leave,
}

/// Why a player was eliminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EliminationReason {
    Killed,
    OutOfBounds,
    Disconnected,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        session_id: Uuid,
        server_time: u64,
    },

    /// Placed into a match
    MatchJoined {
        match_id: Uuid,
        /// Full roster at match creation
        players: Vec<PlayerInfo>,
    },

    /// Countdown before the match goes active
    MatchCountdown {
        seconds_remaining: u32,
    },

    /// Match has started
    MatchStarted {
        tick: u64,
    },

    /// Full roster snapshot
    Snapshot {
        /// Server tick number
        tick: u64,
        players: Vec<PlayerSnapshot>,
    },

    /// Another player began a tracked swing
    SwingStarted {
        session_id: Uuid,
        weapon_key: String,
    },

    /// Damage landed
    Hit {
        attacker_id: Uuid,
        target_id: Uuid,
        damage: f32,
    },

    /// A player is out
    Eliminated {
        player_id: Uuid,
        reason: EliminationReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        killer_id: Option<Uuid>,
    },

    ProjectileSpawned {
        id: Uuid,
        position: Vec3,
        direction: Vec3,
    },

    ProjectileUpdated {
        id: Uuid,
        position: Vec3,
    },

    ProjectileRemoved {
        id: Uuid,
    },

    /// Match has ended
    MatchEnded {
        winner_id: Option<Uuid>,
        winner_name: Option<String>,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
        server_time: u64,
    },
}

impl ServerMsg {
    /// Short name for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::MatchJoined { .. } => "match_joined",
            Self::MatchCountdown { .. } => "match_countdown",
            Self::MatchStarted { .. } => "match_started",
            Self::Snapshot { .. } => "snapshot",
            Self::SwingStarted { .. } => "swing_started",
            Self::Hit { .. } => "hit",
            Self::Eliminated { .. } => "eliminated",
            Self::ProjectileSpawned { .. } => "projectile_spawned",
            Self::ProjectileUpdated { .. } => "projectile_updated",
            Self::ProjectileRemoved { .. } => "projectile_removed",
            Self::MatchEnded { .. } => "match_ended",
            Self::Error { .. } => "error",
            Self::Pong { .. } => "pong",
        }
    }
}

/// Player info for match join
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerInfo {
    pub session_id: Uuid,
    pub display_name: String,
    pub weapon_key: String,
}

/// Player state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerSnapshot {
    pub session_id: Uuid,
    pub display_name: String,
    pub weapon_key: String,
    pub position: Vec3,
    /// Facing angle in radians
    pub facing: f32,
    pub hp: f32,
    pub max_hp: f32,
    pub alive: bool,
    pub attacking: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_messages() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"move","x":1.5,"z":-2.0,"facing":0.25}"#).unwrap();
        assert_eq!(
            msg,
            ClientMsg::Move {
                x: 1.5,
                z: -2.0,
                facing: 0.25,
                timestamp: None
            }
        );

        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"swing_sample","weapon_tip":[0,1,2],"weapon_base":[0,1,0.5],"timestamp":99}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMsg::SwingSample { timestamp: 99, .. }));

        let msg: ClientMsg = serde_json::from_str(r#"{"type":"attack"}"#).unwrap();
        assert_eq!(msg, ClientMsg::Attack { timestamp: 0 });
    }

    #[test]
    fn elimination_reason_wire_names() {
        let msg = ServerMsg::Eliminated {
            player_id: Uuid::nil(),
            reason: EliminationReason::OutOfBounds,
            killer_id: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "eliminated");
        assert_eq!(json["reason"], "out_of_bounds");
        assert!(json.get("killer_id").is_none());
    }

    #[test]
    fn rejects_unknown_message_type() {
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"teleport","x":0}"#).is_err());
    }
}
