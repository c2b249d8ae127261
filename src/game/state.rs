//! Canonical match state: players, projectiles, countdown and outcome

use std::collections::{BTreeMap, HashSet};

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::warn;
use uuid::Uuid;

use crate::config::MatchConfig;

use super::combat::SwingState;
use super::projectile::Projectile;
use super::weapon::WeaponTable;

/// Fraction of the arena radius used for the spawn ring
const SPAWN_RING_FRACTION: f32 = 0.6;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Countdown before start
    Countdown,
    /// Match in progress
    Active,
    /// Match ended
    Ended,
}

/// One lobby entry handed to a new match
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub session_id: Uuid,
    pub display_name: String,
    pub weapon_key: String,
}

/// Player state in a match (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub session_id: Uuid,
    pub display_name: String,
    pub weapon_key: String,

    // Position and facing
    pub position: Vec3,
    /// Facing angle in radians, see `geometry::facing_vector`
    pub facing: f32,

    // Combat
    pub hp: f32,
    pub max_hp: f32,
    pub alive: bool,
    /// Server time of the last accepted attack (ms)
    pub last_attack_at: Option<u64>,
    pub attacking: bool,
    pub swing: SwingState,
}

impl PlayerState {
    pub fn new(
        session_id: Uuid,
        display_name: String,
        weapon_key: String,
        position: Vec3,
        facing: f32,
        max_hp: f32,
    ) -> Self {
        Self {
            session_id,
            display_name,
            weapon_key,
            position,
            facing,
            hp: max_hp,
            max_hp,
            alive: true,
            last_attack_at: None,
            attacking: false,
            swing: SwingState::Idle,
        }
    }

    /// Record an accepted attack
    pub fn stamp_attack(&mut self, now: u64) {
        self.last_attack_at = Some(now);
        self.attacking = true;
    }

    /// Terminal elimination (`hp = 0`). Returns false if already out.
    pub fn eliminate(&mut self) -> bool {
        if !self.alive {
            return false;
        }
        self.hp = 0.0;
        self.alive = false;
        self.attacking = false;
        true
    }
}

/// Winner announcement data
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub winner_id: Option<Uuid>,
    pub winner_name: Option<String>,
}

/// What one countdown advance produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    Unchanged,
    /// A whole second elapsed
    Tick { seconds_remaining: u32 },
    /// Countdown reached zero; the match is now active
    Finished,
}

/// Match state (owned by the match task)
#[derive(Debug)]
pub struct MatchState {
    pub id: Uuid,
    pub seed: u64,
    pub phase: MatchPhase,
    pub tick: u64,
    pub countdown_remaining: u32,
    countdown_elapsed_ms: u64,
    pub players: BTreeMap<Uuid, PlayerState>,
    pub projectiles: Vec<Projectile>,
    pub outcome: Option<MatchOutcome>,
    pub config: MatchConfig,
}

impl MatchState {
    /// Build the state for a roster. Any failure aborts match creation.
    pub fn new(
        id: Uuid,
        seed: u64,
        roster: Vec<RosterEntry>,
        config: MatchConfig,
        weapons: &WeaponTable,
    ) -> Result<Self, MatchError> {
        config
            .validate()
            .map_err(|e| MatchError::InvalidConfig(e.to_string()))?;
        if roster.is_empty() {
            return Err(MatchError::EmptyRoster);
        }
        if roster.len() > config.max_players {
            return Err(MatchError::RosterTooLarge {
                size: roster.len(),
                max: config.max_players,
            });
        }
        let mut seen = HashSet::new();
        if let Some(dup) = roster.iter().find(|e| !seen.insert(e.session_id)) {
            return Err(MatchError::DuplicateSession(dup.session_id));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let spawns = spawn_ring(
            roster.len(),
            config.arena_radius * SPAWN_RING_FRACTION,
            rng.gen_range(0.0..std::f32::consts::TAU),
        );

        let players = roster
            .into_iter()
            .zip(spawns)
            .map(|(entry, (position, facing))| {
                if !weapons.contains(&entry.weapon_key) {
                    warn!(
                        match_id = %id,
                        session_id = %entry.session_id,
                        weapon = %entry.weapon_key,
                        "Unknown weapon archetype, attacks will be ignored"
                    );
                }
                let player = PlayerState::new(
                    entry.session_id,
                    entry.display_name,
                    entry.weapon_key,
                    position,
                    facing,
                    config.player_max_hp,
                );
                (player.session_id, player)
            })
            .collect();

        Ok(Self {
            id,
            seed,
            phase: MatchPhase::Countdown,
            tick: 0,
            countdown_remaining: config.countdown_seconds,
            countdown_elapsed_ms: 0,
            players,
            projectiles: Vec::new(),
            outcome: None,
            config,
        })
    }

    pub fn is_active(&self) -> bool {
        self.phase == MatchPhase::Active
    }

    pub fn is_ended(&self) -> bool {
        self.phase == MatchPhase::Ended
    }

    /// Count alive players
    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.alive).count()
    }

    /// Advance the countdown by `dt_ms`, one second at a time
    pub fn advance_countdown(&mut self, dt_ms: u64) -> CountdownStep {
        if self.phase != MatchPhase::Countdown {
            return CountdownStep::Unchanged;
        }
        let before = self.countdown_remaining;
        if self.countdown_remaining > 0 {
            self.countdown_elapsed_ms += dt_ms;
            while self.countdown_elapsed_ms >= 1000 && self.countdown_remaining > 0 {
                self.countdown_elapsed_ms -= 1000;
                self.countdown_remaining -= 1;
            }
        }
        if self.countdown_remaining == 0 {
            self.phase = MatchPhase::Active;
            CountdownStep::Finished
        } else if self.countdown_remaining != before {
            CountdownStep::Tick {
                seconds_remaining: self.countdown_remaining,
            }
        } else {
            CountdownStep::Unchanged
        }
    }

    /// End the match once at most one player is alive.
    /// Returns the outcome the first time it triggers.
    pub fn check_victory(&mut self) -> Option<MatchOutcome> {
        if self.phase == MatchPhase::Ended || self.alive_count() > 1 {
            return None;
        }
        let winner = self.players.values().find(|p| p.alive);
        let outcome = MatchOutcome {
            winner_id: winner.map(|p| p.session_id),
            winner_name: winner.map(|p| p.display_name.clone()),
        };
        self.phase = MatchPhase::Ended;
        self.projectiles.clear();
        for player in self.players.values_mut() {
            player.attacking = false;
        }
        self.outcome = Some(outcome.clone());
        Some(outcome)
    }
}

/// Evenly spaced positions on a ring, each facing the arena centre
fn spawn_ring(count: usize, radius: f32, offset: f32) -> Vec<(Vec3, f32)> {
    (0..count)
        .map(|i| {
            let angle = offset + std::f32::consts::TAU * i as f32 / count as f32;
            let position = Vec3::new(angle.sin() * radius, 0.0, angle.cos() * radius);
            let facing = (-position.x).atan2(-position.z);
            (position, facing)
        })
        .collect()
}

/// Failures constructing a match
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("Cannot start a match with an empty roster")]
    EmptyRoster,

    #[error("Roster of {size} exceeds the {max} player limit")]
    RosterTooLarge { size: usize, max: usize },

    #[error("Session {0} appears twice in the roster")]
    DuplicateSession(Uuid),

    #[error("Invalid match configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::geometry::{distance_from_center, facing_vector};

    fn roster(n: usize) -> Vec<RosterEntry> {
        (0..n)
            .map(|i| RosterEntry {
                session_id: Uuid::new_v4(),
                display_name: format!("player{}", i),
                weapon_key: "sword".into(),
            })
            .collect()
    }

    fn new_state(n: usize) -> MatchState {
        MatchState::new(
            Uuid::new_v4(),
            7,
            roster(n),
            MatchConfig::default(),
            &WeaponTable::default(),
        )
        .unwrap()
    }

    #[test]
    fn spawns_inside_arena_facing_centre() {
        let state = new_state(4);
        assert_eq!(state.phase, MatchPhase::Countdown);
        for p in state.players.values() {
            assert!(p.alive);
            assert_eq!(p.hp, p.max_hp);
            let r = distance_from_center(p.position);
            assert!((r - 12.0).abs() < 1e-3);
            let to_centre = (-p.position).normalize();
            assert!(facing_vector(p.facing).dot(to_centre) > 0.999);
        }
    }

    #[test]
    fn construction_failures() {
        let weapons = WeaponTable::default();
        assert!(matches!(
            MatchState::new(Uuid::new_v4(), 1, vec![], MatchConfig::default(), &weapons),
            Err(MatchError::EmptyRoster)
        ));
        assert!(matches!(
            MatchState::new(Uuid::new_v4(), 1, roster(9), MatchConfig::default(), &weapons),
            Err(MatchError::RosterTooLarge { size: 9, max: 8 })
        ));
        let mut dup = roster(2);
        dup[1].session_id = dup[0].session_id;
        assert!(matches!(
            MatchState::new(Uuid::new_v4(), 1, dup, MatchConfig::default(), &weapons),
            Err(MatchError::DuplicateSession(_))
        ));
        let bad = MatchConfig {
            arena_radius: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            MatchState::new(Uuid::new_v4(), 1, roster(2), bad, &weapons),
            Err(MatchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn countdown_ticks_once_per_second_then_activates() {
        let mut state = new_state(2);
        assert_eq!(state.countdown_remaining, 3);
        assert_eq!(state.advance_countdown(500), CountdownStep::Unchanged);
        assert_eq!(
            state.advance_countdown(500),
            CountdownStep::Tick { seconds_remaining: 2 }
        );
        assert_eq!(
            state.advance_countdown(1000),
            CountdownStep::Tick { seconds_remaining: 1 }
        );
        assert_eq!(state.advance_countdown(1000), CountdownStep::Finished);
        assert!(state.is_active());
        assert_eq!(state.advance_countdown(1000), CountdownStep::Unchanged);
    }

    #[test]
    fn two_players_one_dies_other_wins() {
        let mut state = new_state(2);
        state.phase = MatchPhase::Active;
        assert!(state.check_victory().is_none());

        let ids: Vec<Uuid> = state.players.keys().copied().collect();
        state.players.get_mut(&ids[0]).unwrap().eliminate();
        let outcome = state.check_victory().unwrap();
        assert_eq!(outcome.winner_id, Some(ids[1]));
        assert_eq!(
            outcome.winner_name.as_deref(),
            Some(state.players[&ids[1]].display_name.as_str())
        );
        assert!(state.is_ended());
        // Announced once only
        assert!(state.check_victory().is_none());
    }

    #[test]
    fn nobody_alive_means_no_winner() {
        let mut state = new_state(3);
        state.phase = MatchPhase::Active;
        for p in state.players.values_mut() {
            p.eliminate();
        }
        let outcome = state.check_victory().unwrap();
        assert_eq!(outcome.winner_id, None);
        assert_eq!(outcome.winner_name, None);
    }

    #[test]
    fn eliminate_is_idempotent() {
        let mut p = PlayerState::new(
            Uuid::new_v4(),
            "p".into(),
            "bow".into(),
            Vec3::ZERO,
            0.0,
            100.0,
        );
        assert!(p.eliminate());
        assert!(!p.eliminate());
        assert_eq!(p.hp, 0.0);
    }
}
