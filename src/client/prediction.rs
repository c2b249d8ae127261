//! Client-side prediction for the local player
//!
//! Local input moves the player immediately. Movement updates go to the
//! server on a throttle, and authoritative positions are folded back in:
//! small divergence is ignored, large divergence is blended out over the
//! following frames instead of snapping.

use glam::Vec3;

use crate::game::geometry::{angle_delta, distance_2d, distance_from_center};
use crate::ws::protocol::ClientMsg;

/// Local movement speed (units per second)
pub const MOVE_SPEED: f32 = 6.0;
/// Minimum gap between movement updates
pub const SEND_INTERVAL_MS: u64 = 50;
/// Movement smaller than this does not warrant an update
pub const MOVE_THRESHOLD: f32 = 0.01;
/// Facing change (radians) that warrants an update
pub const TURN_THRESHOLD: f32 = 0.01;
/// An update is sent at least this often, even when stationary
pub const HEARTBEAT_MS: u64 = 1000;
/// Divergence above which the local position is corrected
pub const CORRECTION_THRESHOLD: f32 = 0.5;
/// Fraction of the remaining correction removed per second
pub const BLEND_RATE: f32 = 10.0;
/// Cap on the fraction removed in a single frame
pub const MAX_BLEND_PER_FRAME: f32 = 0.5;
/// Residual correction below this is applied outright
const CORRECTION_EPSILON: f32 = 0.001;

/// Result of comparing the prediction with the server
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    /// Prediction close enough, nothing to do
    InSync { divergence: f32 },
    /// A correction toward the server position has started
    Correcting { divergence: f32 },
}

#[derive(Debug, Clone, Copy)]
struct SentState {
    at: u64,
    position: Vec3,
    facing: f32,
}

/// Optimistic local movement with smooth reconciliation
#[derive(Debug, Clone)]
pub struct PredictionEngine {
    position: Vec3,
    facing: f32,
    arena_radius: f32,
    /// Offset still to be blended into `position`
    pending_correction: Vec3,
    last_sent: Option<SentState>,
    /// Statistics: corrections started
    pub total_corrections: u32,
}

impl PredictionEngine {
    pub fn new(position: Vec3, facing: f32, arena_radius: f32) -> Self {
        Self {
            position,
            facing,
            arena_radius,
            pending_correction: Vec3::ZERO,
            last_sent: None,
            total_corrections: 0,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn facing(&self) -> f32 {
        self.facing
    }

    pub fn is_correcting(&self) -> bool {
        self.pending_correction != Vec3::ZERO
    }

    /// Hard reset, for spawns
    pub fn teleport(&mut self, position: Vec3, facing: f32) {
        self.position = position;
        self.facing = facing;
        self.pending_correction = Vec3::ZERO;
    }

    /// Integrate one frame of movement. Returns false when the step would
    /// leave the arena, in which case the player stays put.
    pub fn apply_input(&mut self, direction: Vec3, facing: Option<f32>, dt: f32) -> bool {
        if let Some(facing) = facing {
            self.facing = facing;
        }
        let direction = Vec3::new(direction.x, 0.0, direction.z);
        if direction == Vec3::ZERO {
            return true;
        }
        let step = direction.clamp_length_max(1.0) * MOVE_SPEED * dt;
        let candidate = self.position + step;
        if distance_from_center(candidate) > self.arena_radius {
            return false;
        }
        self.position = candidate;
        true
    }

    /// Movement update to send now, if one is due
    pub fn poll_emit(&mut self, now: u64) -> Option<ClientMsg> {
        let due = match self.last_sent {
            None => true,
            Some(sent) => {
                let elapsed = now.saturating_sub(sent.at);
                let changed = distance_2d(sent.position, self.position) > MOVE_THRESHOLD
                    || angle_delta(sent.facing, self.facing).abs() > TURN_THRESHOLD;
                (elapsed >= SEND_INTERVAL_MS && changed) || elapsed >= HEARTBEAT_MS
            }
        };
        if !due {
            return None;
        }

        self.last_sent = Some(SentState {
            at: now,
            position: self.position,
            facing: self.facing,
        });
        Some(ClientMsg::Move {
            x: self.position.x,
            z: self.position.z,
            facing: self.facing,
            timestamp: Some(now),
        })
    }

    /// Compare against the server's position for the local player
    pub fn reconcile(&mut self, authoritative: Vec3) -> Reconciliation {
        let divergence = distance_2d(self.position, authoritative);
        if divergence <= CORRECTION_THRESHOLD {
            return Reconciliation::InSync { divergence };
        }

        self.pending_correction = Vec3::new(
            authoritative.x - self.position.x,
            0.0,
            authoritative.z - self.position.z,
        );
        self.total_corrections += 1;
        Reconciliation::Correcting { divergence }
    }

    /// Blend part of the outstanding correction in. Call once per frame.
    pub fn advance_correction(&mut self, dt: f32) {
        if !self.is_correcting() {
            return;
        }
        let fraction = (BLEND_RATE * dt).clamp(0.0, MAX_BLEND_PER_FRAME);
        let applied = self.pending_correction * fraction;
        self.position += applied;
        self.pending_correction -= applied;

        if self.pending_correction.length() < CORRECTION_EPSILON {
            self.position += self.pending_correction;
            self.pending_correction = Vec3::ZERO;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: f32 = 1.0 / 60.0;

    #[test]
    fn moves_at_fixed_speed() {
        let mut engine = PredictionEngine::new(Vec3::ZERO, 0.0, 20.0);
        assert!(engine.apply_input(Vec3::X, None, 0.5));
        assert!((engine.position().x - 3.0).abs() < 1e-5);
    }

    #[test]
    fn refuses_to_leave_arena() {
        let start = Vec3::new(19.9, 0.0, 0.0);
        let mut engine = PredictionEngine::new(start, 0.0, 20.0);
        assert!(!engine.apply_input(Vec3::X, Some(1.0), 0.1));
        assert_eq!(engine.position(), start);
        assert_eq!(engine.facing(), 1.0);
        // Moving back inside is fine
        assert!(engine.apply_input(-Vec3::X, None, 0.1));
    }

    #[test]
    fn small_divergence_is_ignored() {
        let mut engine = PredictionEngine::new(Vec3::ZERO, 0.0, 20.0);
        let result = engine.reconcile(Vec3::new(0.05, 0.0, 0.0));
        assert!(matches!(result, Reconciliation::InSync { .. }));
        assert!(!engine.is_correcting());
        engine.advance_correction(FRAME);
        assert_eq!(engine.position(), Vec3::ZERO);
    }

    #[test]
    fn large_divergence_blends_without_snapping() {
        let target = Vec3::new(0.8, 0.0, 0.0);
        let mut engine = PredictionEngine::new(Vec3::ZERO, 0.0, 20.0);
        assert!(matches!(
            engine.reconcile(target),
            Reconciliation::Correcting { .. }
        ));

        // Even a long frame only takes part of the error
        engine.advance_correction(1.0);
        let after_first = engine.position().x;
        assert!(after_first > 0.0 && after_first < 0.8);

        let mut frames = 1;
        while engine.is_correcting() {
            let before = engine.position().x;
            engine.advance_correction(FRAME);
            assert!(engine.position().x >= before);
            frames += 1;
            assert!(frames < 500);
        }
        assert!(frames > 2);
        assert!((engine.position() - target).length() < 1e-3);
    }

    #[test]
    fn teleport_cancels_correction() {
        let mut engine = PredictionEngine::new(Vec3::ZERO, 0.0, 20.0);
        engine.reconcile(Vec3::new(3.0, 0.0, 0.0));
        assert!(engine.is_correcting());
        engine.teleport(Vec3::new(-5.0, 0.0, 5.0), 2.0);
        assert!(!engine.is_correcting());
        engine.advance_correction(FRAME);
        assert_eq!(engine.position(), Vec3::new(-5.0, 0.0, 5.0));
        assert_eq!(engine.total_corrections, 1);
    }

    #[test]
    fn emits_on_throttle_and_heartbeat() {
        let mut engine = PredictionEngine::new(Vec3::ZERO, 0.0, 20.0);
        assert!(matches!(
            engine.poll_emit(0),
            Some(ClientMsg::Move { timestamp: Some(0), .. })
        ));

        engine.apply_input(Vec3::X, None, FRAME);
        // Moved, but too soon
        assert!(engine.poll_emit(20).is_none());
        assert!(engine.poll_emit(50).is_some());

        // Stationary: nothing until the heartbeat
        assert!(engine.poll_emit(200).is_none());
        assert!(engine.poll_emit(1049).is_none());
        assert!(engine.poll_emit(1050).is_some());
    }

    #[test]
    fn turning_in_place_is_sent() {
        let mut engine = PredictionEngine::new(Vec3::ZERO, 0.0, 20.0);
        engine.poll_emit(0);
        engine.apply_input(Vec3::ZERO, Some(1.2), FRAME);
        match engine.poll_emit(60) {
            Some(ClientMsg::Move { facing, .. }) => assert_eq!(facing, 1.2),
            other => panic!("expected move, got {:?}", other),
        }
    }
}
