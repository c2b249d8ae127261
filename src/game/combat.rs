//! Combat system - attack legality, melee hit detection, damage

use std::collections::{BTreeMap, HashSet};

use glam::Vec3;
use tracing::debug;
use uuid::Uuid;

use super::geometry::{direction_2d, distance_2d, facing_vector, segment_intersects_sphere};
use super::projectile::Projectile;
use super::state::PlayerState;
use super::weapon::{WeaponKind, WeaponTable};

/// Full character height; swing targets are tested at half of it
pub const CHARACTER_HEIGHT: f32 = 1.8;
/// Radius of the sphere a weapon segment must touch to register a swing hit
pub const SWING_HITBOX_RADIUS: f32 = 0.6;
/// Length of the client swing animation
pub const SWING_DURATION_MS: u64 = 400;
/// Slack added to the swing window for late samples
pub const SWING_MARGIN_MS: u64 = 150;
/// How long a swing accepts samples after its first one
pub const SWING_WINDOW_MS: u64 = SWING_DURATION_MS + SWING_MARGIN_MS;

/// Per-attacker swing tracking: idle -> swinging(until deadline) -> idle
#[derive(Debug, Clone, Default)]
pub enum SwingState {
    #[default]
    Idle,
    /// A legal swing is in progress
    Swinging {
        deadline: u64,
        /// Targets already credited during this swing
        already_hit: HashSet<Uuid>,
    },
    /// The first sample failed the cooldown; the rest of this swing is void
    Blocked { deadline: u64 },
}

impl SwingState {
    pub fn is_swinging(&self) -> bool {
        matches!(self, Self::Swinging { .. })
    }

    fn deadline(&self) -> Option<u64> {
        match self {
            Self::Idle => None,
            Self::Swinging { deadline, .. } | Self::Blocked { deadline } => Some(*deadline),
        }
    }

    /// Return to idle once the window has closed. Returns true if the state changed.
    pub fn expire(&mut self, now: u64) -> bool {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                *self = Self::Idle;
                true
            }
            _ => false,
        }
    }
}

/// Why an attack input produced nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    UnknownPlayer,
    Dead,
    UnknownWeapon,
    /// Weapon kind does not stream swing samples
    NotSwingWeapon,
    Cooldown,
    /// Swing sample whose first sample was already rejected
    SwingBlocked,
    Malformed,
}

/// One credited hit, after damage was applied
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub attacker_id: Uuid,
    pub target_id: Uuid,
    pub damage: f32,
    pub killed: bool,
}

/// Result of a standard attack input
#[derive(Debug)]
pub enum AttackOutcome {
    Rejected(RejectReason),
    /// Melee resolved; `hits` may be empty when nobody was in reach
    Melee { hits: Vec<Hit> },
    /// Ranged attack spawned a projectile
    Fired(Projectile),
}

/// Result of a swing hitbox sample
#[derive(Debug)]
pub enum SwingOutcome {
    Rejected(RejectReason),
    Accepted {
        /// True when this sample opened a new swing
        started: bool,
        hits: Vec<Hit>,
    },
}

/// Result of applying damage to one player
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageResult {
    pub hp: f32,
    pub killed: bool,
}

/// Whether enough time has passed since the last attack
pub fn cooldown_ready(last_attack_at: Option<u64>, cooldown_ms: u64, now: u64) -> bool {
    match last_attack_at {
        None => true,
        Some(last) => now.saturating_sub(last) >= cooldown_ms,
    }
}

/// Apply damage: `hp = max(0, hp - damage)`, and `hp == 0` ends the player.
/// Returns None for players that are already out.
pub fn apply_damage(target: &mut PlayerState, damage: f32) -> Option<DamageResult> {
    if !target.alive {
        return None;
    }
    target.hp = (target.hp - damage).max(0.0);
    if target.hp <= 0.0 {
        target.hp = 0.0;
        target.alive = false;
    }
    Some(DamageResult {
        hp: target.hp,
        killed: !target.alive,
    })
}

/// Alive players other than `attacker` that are within `range` and in front of it
pub fn melee_targets(
    attacker: &PlayerState,
    players: &BTreeMap<Uuid, PlayerState>,
    range: f32,
) -> Vec<Uuid> {
    let forward = facing_vector(attacker.facing);
    players
        .values()
        .filter(|p| p.alive && p.session_id != attacker.session_id)
        .filter(|p| distance_2d(attacker.position, p.position) <= range)
        .filter(|p| {
            // Overlapping positions have no direction and count as not in front
            direction_2d(attacker.position, p.position)
                .is_some_and(|to_target| forward.dot(to_target) > 0.0)
        })
        .map(|p| p.session_id)
        .collect()
}

fn credit_hits(
    players: &mut BTreeMap<Uuid, PlayerState>,
    attacker_id: Uuid,
    targets: Vec<Uuid>,
    damage: f32,
) -> Vec<Hit> {
    targets
        .into_iter()
        .filter_map(|target_id| {
            let target = players.get_mut(&target_id)?;
            let result = apply_damage(target, damage)?;
            Some(Hit {
                attacker_id,
                target_id,
                damage,
                killed: result.killed,
            })
        })
        .collect()
}

/// Resolve one standard attack input at server time `now`.
///
/// Melee kinds hit every qualifying target at once; ranged kinds return a
/// projectile for the caller to simulate.
pub fn resolve_standard_attack(
    players: &mut BTreeMap<Uuid, PlayerState>,
    weapons: &WeaponTable,
    attacker_id: Uuid,
    now: u64,
) -> AttackOutcome {
    let Some(attacker) = players.get(&attacker_id) else {
        return AttackOutcome::Rejected(RejectReason::UnknownPlayer);
    };
    if !attacker.alive {
        return AttackOutcome::Rejected(RejectReason::Dead);
    }
    let Some(archetype) = weapons.get(&attacker.weapon_key) else {
        debug!(session_id = %attacker_id, weapon = %attacker.weapon_key, "Attack with unknown weapon ignored");
        return AttackOutcome::Rejected(RejectReason::UnknownWeapon);
    };
    if !cooldown_ready(attacker.last_attack_at, archetype.cooldown_ms, now) {
        return AttackOutcome::Rejected(RejectReason::Cooldown);
    }

    match archetype.kind {
        WeaponKind::Melee | WeaponKind::SwingMelee => {
            let targets = melee_targets(attacker, players, archetype.range);
            if let Some(attacker) = players.get_mut(&attacker_id) {
                attacker.stamp_attack(now);
            }
            let hits = credit_hits(players, attacker_id, targets, archetype.damage);
            AttackOutcome::Melee { hits }
        }
        WeaponKind::Ranged => {
            let Some(projectile) =
                Projectile::spawn(attacker_id, attacker.position, attacker.facing, archetype)
            else {
                return AttackOutcome::Rejected(RejectReason::UnknownWeapon);
            };
            if let Some(attacker) = players.get_mut(&attacker_id) {
                attacker.stamp_attack(now);
            }
            AttackOutcome::Fired(projectile)
        }
    }
}

/// Resolve one hitbox sample of a client-animated swing.
///
/// Only the first sample of a swing checks and stamps the cooldown. Every
/// accepted sample is tested against all other alive players, but a target is
/// credited at most once per swing.
pub fn resolve_swing_sample(
    players: &mut BTreeMap<Uuid, PlayerState>,
    weapons: &WeaponTable,
    attacker_id: Uuid,
    weapon_base: Vec3,
    weapon_tip: Vec3,
    now: u64,
) -> SwingOutcome {
    if !(weapon_base.is_finite() && weapon_tip.is_finite()) {
        return SwingOutcome::Rejected(RejectReason::Malformed);
    }
    let Some(attacker) = players.get_mut(&attacker_id) else {
        return SwingOutcome::Rejected(RejectReason::UnknownPlayer);
    };
    if !attacker.alive {
        return SwingOutcome::Rejected(RejectReason::Dead);
    }
    let Some(archetype) = weapons.get(&attacker.weapon_key) else {
        return SwingOutcome::Rejected(RejectReason::UnknownWeapon);
    };
    if !archetype.kind.tracks_swings() {
        return SwingOutcome::Rejected(RejectReason::NotSwingWeapon);
    }

    attacker.swing.expire(now);
    let started = match attacker.swing {
        SwingState::Blocked { .. } => return SwingOutcome::Rejected(RejectReason::SwingBlocked),
        SwingState::Swinging { .. } => false,
        SwingState::Idle => {
            let deadline = now + SWING_WINDOW_MS;
            if !cooldown_ready(attacker.last_attack_at, archetype.cooldown_ms, now) {
                attacker.swing = SwingState::Blocked { deadline };
                return SwingOutcome::Rejected(RejectReason::Cooldown);
            }
            attacker.stamp_attack(now);
            attacker.swing = SwingState::Swinging {
                deadline,
                already_hit: HashSet::new(),
            };
            true
        }
    };
    let damage = archetype.damage;

    let touched: Vec<Uuid> = players
        .values()
        .filter(|p| p.alive && p.session_id != attacker_id)
        .filter(|p| {
            let center = p.position + Vec3::Y * (CHARACTER_HEIGHT * 0.5);
            segment_intersects_sphere(weapon_base, weapon_tip, center, SWING_HITBOX_RADIUS)
        })
        .map(|p| p.session_id)
        .collect();

    let fresh: Vec<Uuid> = match players.get_mut(&attacker_id).map(|a| &mut a.swing) {
        Some(SwingState::Swinging { already_hit, .. }) => touched
            .into_iter()
            .filter(|id| already_hit.insert(*id))
            .collect(),
        _ => Vec::new(),
    };

    let hits = credit_hits(players, attacker_id, fresh, damage);
    SwingOutcome::Accepted { started, hits }
}
