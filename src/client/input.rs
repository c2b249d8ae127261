//! Raw key state -> movement and attack intents
//!
//! Axes follow the usual camera setup: forward is -z, right is +x.

use glam::Vec3;

/// Held keys for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub attack: bool,
}

/// What one frame of input asks for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputIntent {
    /// Unit direction on the ground plane, or zero when idle
    pub movement: Vec3,
    /// True only on the frame the attack key goes down
    pub attack: bool,
}

impl InputIntent {
    pub fn is_moving(&self) -> bool {
        self.movement != Vec3::ZERO
    }

    /// Facing angle matching the movement direction
    pub fn facing(&self) -> Option<f32> {
        self.is_moving()
            .then(|| self.movement.x.atan2(self.movement.z))
    }
}

/// Turns key state into intents, tracking the attack edge between frames
#[derive(Debug, Default)]
pub struct InputTranslator {
    attack_held: bool,
}

impl InputTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate(&mut self, keys: KeyState) -> InputIntent {
        let axis = |pos: bool, neg: bool| (pos as i8 - neg as i8) as f32;
        let raw = Vec3::new(
            axis(keys.right, keys.left),
            0.0,
            axis(keys.back, keys.forward),
        );

        let attack = keys.attack && !self.attack_held;
        self.attack_held = keys.attack;

        InputIntent {
            movement: raw.normalize_or_zero(),
            attack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::geometry::facing_vector;

    #[test]
    fn diagonal_is_normalised() {
        let mut input = InputTranslator::new();
        let intent = input.translate(KeyState {
            forward: true,
            right: true,
            ..Default::default()
        });
        assert!((intent.movement.length() - 1.0).abs() < 1e-5);
        assert!(intent.movement.x > 0.0 && intent.movement.z < 0.0);
    }

    #[test]
    fn opposing_keys_cancel() {
        let mut input = InputTranslator::new();
        let intent = input.translate(KeyState {
            left: true,
            right: true,
            ..Default::default()
        });
        assert!(!intent.is_moving());
        assert!(intent.facing().is_none());
    }

    #[test]
    fn attack_fires_on_press_edge_only() {
        let mut input = InputTranslator::new();
        let held = KeyState {
            attack: true,
            ..Default::default()
        };
        assert!(input.translate(held).attack);
        assert!(!input.translate(held).attack);
        assert!(!input.translate(KeyState::default()).attack);
        assert!(input.translate(held).attack);
    }

    #[test]
    fn facing_points_along_movement() {
        let mut input = InputTranslator::new();
        let intent = input.translate(KeyState {
            back: true,
            left: true,
            ..Default::default()
        });
        let facing = intent.facing().unwrap();
        assert!((facing_vector(facing) - intent.movement).length() < 1e-5);
    }
}
