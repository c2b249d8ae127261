//! Projectile simulation - constant-velocity flight, single-target collision

use std::collections::BTreeMap;

use glam::Vec3;
use uuid::Uuid;

use super::geometry::{distance_from_center, facing_vector, segment_intersects_sphere};
use super::state::PlayerState;
use super::weapon::WeaponArchetype;

/// Distance in front of the shooter where projectiles appear
pub const PROJECTILE_SPAWN_OFFSET: f32 = 1.0;
/// Flight height of every projectile
pub const PROJECTILE_HEIGHT: f32 = 1.0;
/// Horizontal distance from a player's centre that counts as a hit
pub const PROJECTILE_HIT_RADIUS: f32 = 0.7;

/// Active projectile in the match
#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub position: Vec3,
    /// Horizontal unit direction
    pub direction: Vec3,
    pub speed: f32,
    pub damage: f32,
    /// Monotonic, never exceeds `max_range`
    pub distance_traveled: f32,
    pub max_range: f32,
}

/// What happened to a projectile during one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectileFate {
    InFlight,
    /// Absorbed by this player
    Hit { target_id: Uuid },
    OutOfRange,
    LeftArena,
}

impl ProjectileFate {
    pub fn is_removed(self) -> bool {
        !matches!(self, Self::InFlight)
    }
}

impl Projectile {
    /// Spawn in front of a shooter standing at `origin` facing `facing`.
    /// Returns None for archetypes without a projectile speed.
    pub fn spawn(
        owner_id: Uuid,
        origin: Vec3,
        facing: f32,
        archetype: &WeaponArchetype,
    ) -> Option<Self> {
        let speed = archetype.projectile_speed?;
        let direction = facing_vector(facing);
        let mut position = origin + direction * PROJECTILE_SPAWN_OFFSET;
        position.y = PROJECTILE_HEIGHT;

        Some(Self {
            id: Uuid::new_v4(),
            owner_id,
            position,
            direction,
            speed,
            damage: archetype.damage,
            distance_traveled: 0.0,
            max_range: archetype.range,
        })
    }

    /// Advance along the direction, never past `max_range`.
    /// Returns the position before the move.
    pub fn advance(&mut self, dt: f32) -> Vec3 {
        let previous = self.position;
        let remaining = (self.max_range - self.distance_traveled).max(0.0);
        let step = self.speed * dt;
        if step >= remaining {
            self.position += self.direction * remaining;
            self.distance_traveled = self.max_range;
        } else {
            self.position += self.direction * step;
            self.distance_traveled += step;
        }
        previous
    }

    pub fn range_exhausted(&self) -> bool {
        self.distance_traveled >= self.max_range
    }

    /// Alive non-owner player whose hit circle the last move swept through,
    /// nearest along the flight path when several were crossed
    fn first_target(
        &self,
        from: Vec3,
        players: &BTreeMap<Uuid, PlayerState>,
    ) -> Option<Uuid> {
        let flat = |v: Vec3| Vec3::new(v.x, 0.0, v.z);
        let (start, end) = (flat(from), flat(self.position));
        let sweep = end - start;
        players
            .values()
            .filter(|p| p.alive && p.session_id != self.owner_id)
            .filter(|p| {
                segment_intersects_sphere(start, end, flat(p.position), PROJECTILE_HIT_RADIUS)
            })
            .map(|p| (p.session_id, (flat(p.position) - start).dot(sweep)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// One simulation step: move, then collide, then check range and arena
    pub fn step(
        &mut self,
        players: &BTreeMap<Uuid, PlayerState>,
        arena_radius: f32,
        dt: f32,
    ) -> ProjectileFate {
        let from = self.advance(dt);
        if let Some(target_id) = self.first_target(from, players) {
            return ProjectileFate::Hit { target_id };
        }
        if self.range_exhausted() {
            return ProjectileFate::OutOfRange;
        }
        if distance_from_center(self.position) > arena_radius {
            return ProjectileFate::LeftArena;
        }
        ProjectileFate::InFlight
    }
}

/// Step every projectile, dropping the ones that finished.
/// Returns `(projectile, fate)` for everything still in flight or just removed.
pub fn advance_all(
    projectiles: &mut Vec<Projectile>,
    players: &BTreeMap<Uuid, PlayerState>,
    arena_radius: f32,
    dt: f32,
) -> Vec<(Projectile, ProjectileFate)> {
    let mut results = Vec::with_capacity(projectiles.len());
    projectiles.retain_mut(|projectile| {
        let fate = projectile.step(players, arena_radius, dt);
        results.push((projectile.clone(), fate));
        !fate.is_removed()
    });
    results
}
