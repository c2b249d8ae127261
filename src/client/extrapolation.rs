//! Dead reckoning for remote entities whose updates are late

use glam::Vec3;

use super::interpolation::TimedSample;

/// Start guessing once the newest sample is older than this
pub const EXTRAPOLATE_AFTER_MS: u64 = 150;
/// Stop advancing the projection (hold still) after this
pub const GIVE_UP_AFTER_MS: u64 = 1000;
/// Share of the measured velocity used for projection
pub const VELOCITY_DAMPING: f32 = 0.9;

/// Last known motion of one entity
#[derive(Debug, Clone, Default)]
pub struct DeadReckoning {
    last: Option<TimedSample>,
    /// Damped ground-plane velocity (units per second)
    velocity: Vec3,
    extrapolating: bool,
}

impl DeadReckoning {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh sample: ends any extrapolation and re-derives velocity from the
    /// positional delta over elapsed time
    pub fn observe(&mut self, sample: TimedSample) {
        if let Some(prev) = self.last {
            if sample.timestamp <= prev.timestamp {
                return;
            }
            let dt = (sample.timestamp - prev.timestamp) as f32 / 1000.0;
            let delta = sample.position - prev.position;
            self.velocity = Vec3::new(delta.x, 0.0, delta.z) / dt * VELOCITY_DAMPING;
        }
        self.last = Some(sample);
        self.extrapolating = false;
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn is_extrapolating(&self) -> bool {
        self.extrapolating
    }

    /// Projected position at `now`, or None while the newest sample is fresh
    /// enough to interpolate.
    ///
    /// Projection runs from the last known position starting at the moment
    /// extrapolation begins, so the handover from the (delayed) interpolated
    /// view does not jump. Past the give-up threshold the projection stops
    /// advancing and the entity holds where it was last drawn.
    pub fn update(&mut self, now: u64) -> Option<Vec3> {
        let last = self.last?;
        let age = now.saturating_sub(last.timestamp);
        if age <= EXTRAPOLATE_AFTER_MS {
            self.extrapolating = false;
            return None;
        }
        self.extrapolating = age <= GIVE_UP_AFTER_MS;
        let span = age.min(GIVE_UP_AFTER_MS) - EXTRAPOLATE_AFTER_MS;
        Some(last.position + self.velocity * (span as f32 / 1000.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: u64, x: f32) -> TimedSample {
        TimedSample::new(t, Vec3::new(x, 0.0, 0.0), 0.0)
    }

    #[test]
    fn velocity_from_positional_delta() {
        let mut dr = DeadReckoning::new();
        dr.observe(sample(0, 0.0));
        assert_eq!(dr.velocity(), Vec3::ZERO);
        dr.observe(sample(100, 1.0));
        // 10 u/s, damped
        assert!((dr.velocity().x - 9.0).abs() < 1e-4);
    }

    #[test]
    fn projects_inside_window_then_holds() {
        let mut dr = DeadReckoning::new();
        dr.observe(sample(0, 0.0));
        dr.observe(sample(100, 1.0));

        assert!(dr.update(200).is_none());
        assert!(!dr.is_extrapolating());

        // Projection starts from x=1 at the threshold
        let start = dr.update(251).unwrap();
        assert!((start.x - 1.009).abs() < 1e-4);

        let guess = dr.update(350).unwrap();
        assert!(dr.is_extrapolating());
        // 1.0 + 9 u/s * 0.1 s
        assert!((guess.x - 1.9).abs() < 1e-4);

        // Given up: held at 1.0 + 9 u/s * 0.85 s
        let held = dr.update(1500).unwrap();
        assert!(!dr.is_extrapolating());
        assert!((held.x - 8.65).abs() < 1e-4);
        assert_eq!(dr.update(3000), Some(held));
    }

    #[test]
    fn fresh_sample_ends_extrapolation() {
        let mut dr = DeadReckoning::new();
        dr.observe(sample(0, 0.0));
        dr.observe(sample(100, 1.0));
        dr.update(400);
        assert!(dr.is_extrapolating());

        dr.observe(sample(420, 1.0));
        assert!(!dr.is_extrapolating());
        assert_eq!(dr.velocity(), Vec3::ZERO);
    }

    #[test]
    fn stale_sample_is_ignored() {
        let mut dr = DeadReckoning::new();
        dr.observe(sample(100, 1.0));
        dr.observe(sample(50, 5.0));
        assert_eq!(dr.velocity(), Vec3::ZERO);
    }
}
