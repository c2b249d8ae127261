//! Arena boundary monitor

use std::collections::BTreeMap;

use glam::Vec3;
use uuid::Uuid;

use super::geometry::distance_from_center;
use super::state::PlayerState;

/// Whether a position lies outside the circular arena
pub fn is_out_of_bounds(position: Vec3, arena_radius: f32) -> bool {
    distance_from_center(position) > arena_radius
}

/// Eliminate every alive player standing outside the arena.
/// Returns the ids eliminated this call.
pub fn enforce_boundary(players: &mut BTreeMap<Uuid, PlayerState>, arena_radius: f32) -> Vec<Uuid> {
    players
        .values_mut()
        .filter(|p| p.alive && is_out_of_bounds(p.position, arena_radius))
        .filter_map(|p| p.eliminate().then_some(p.session_id))
        .collect()
}
