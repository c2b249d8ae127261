//! Snapshot building and broadcast cadence

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::ws::protocol::{PlayerSnapshot, ServerMsg};

use super::state::PlayerState;

/// Decides which ticks carry a full roster snapshot
#[derive(Debug, Clone)]
pub struct BroadcastPolicy {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Regular snapshot interval in ticks
    snapshot_interval: u32,
    /// Snapshots sent on the regular cadence
    pub regular_sent: u64,
    /// Snapshots sent early because of a critical event
    pub forced_sent: u64,
}

impl BroadcastPolicy {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
            regular_sent: 0,
            forced_sent: 0,
        }
    }

    /// Called once per active tick. A tick with a critical event (hit,
    /// elimination, new projectile) always sends and restarts the cadence.
    pub fn should_send(&mut self, critical: bool) -> bool {
        self.ticks_since_snapshot += 1;
        if critical {
            self.ticks_since_snapshot = 0;
            self.forced_sent += 1;
            return true;
        }
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            self.regular_sent += 1;
            true
        } else {
            false
        }
    }
}

/// Wire view of one player
pub fn player_snapshot(p: &PlayerState) -> PlayerSnapshot {
    PlayerSnapshot {
        session_id: p.session_id,
        display_name: p.display_name.clone(),
        weapon_key: p.weapon_key.clone(),
        position: p.position,
        facing: p.facing,
        hp: p.hp,
        max_hp: p.max_hp,
        alive: p.alive,
        attacking: p.attacking,
    }
}

/// Build a full roster snapshot message
pub fn build_snapshot(tick: u64, players: &BTreeMap<Uuid, PlayerState>) -> ServerMsg {
    ServerMsg::Snapshot {
        tick,
        players: players.values().map(player_snapshot).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sends_every_nth_tick() {
        let mut policy = BroadcastPolicy::new(3);
        let sent: Vec<bool> = (0..9).map(|_| policy.should_send(false)).collect();
        assert_eq!(
            sent,
            vec![false, false, true, false, false, true, false, false, true]
        );
        assert_eq!(policy.regular_sent, 3);
    }

    #[test]
    fn critical_event_forces_immediate_send() {
        let mut policy = BroadcastPolicy::new(3);
        assert!(!policy.should_send(false));
        assert!(policy.should_send(true));
        // Cadence restarts after the forced snapshot
        assert!(!policy.should_send(false));
        assert!(!policy.should_send(false));
        assert!(policy.should_send(false));
        assert_eq!(policy.forced_sent, 1);
    }

    #[test]
    fn snapshot_lists_every_player() {
        use glam::Vec3;
        let mut players = BTreeMap::new();
        for _ in 0..3 {
            let p = PlayerState::new(
                Uuid::new_v4(),
                "p".into(),
                "spear".into(),
                Vec3::ZERO,
                0.0,
                100.0,
            );
            players.insert(p.session_id, p);
        }
        match build_snapshot(42, &players) {
            ServerMsg::Snapshot { tick, players } => {
                assert_eq!(tick, 42);
                assert_eq!(players.len(), 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
