//! Time-buffered interpolation for remote entities
//!
//! Remote players are drawn slightly in the past, between the two buffered
//! samples that straddle `now - render_delay`.

use std::collections::VecDeque;

use glam::Vec3;

use crate::game::geometry::lerp_angle;

/// How far behind real time remote entities are rendered
pub const RENDER_DELAY_MS: u64 = 100;
/// Samples older than this (relative to the newest) are dropped
pub const RETENTION_MS: u64 = 1000;

/// One received position/rotation sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedSample {
    /// Client receive time (ms)
    pub timestamp: u64,
    pub position: Vec3,
    /// Facing angle in radians
    pub rotation: f32,
}

impl TimedSample {
    pub fn new(timestamp: u64, position: Vec3, rotation: f32) -> Self {
        Self {
            timestamp,
            position,
            rotation,
        }
    }

    /// Blend toward `other`; rotation takes the shortest arc
    pub fn lerp(&self, other: &TimedSample, t: f32) -> TimedSample {
        let span = other.timestamp as f64 - self.timestamp as f64;
        TimedSample {
            timestamp: (self.timestamp as f64 + span * t as f64).round() as u64,
            position: self.position.lerp(other.position, t),
            rotation: lerp_angle(self.rotation, other.rotation, t),
        }
    }
}

/// Rolling, time-ordered buffer of samples for one entity
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    samples: VecDeque<TimedSample>,
    retention_ms: u64,
}

impl SnapshotBuffer {
    pub fn new(retention_ms: u64) -> Self {
        Self {
            samples: VecDeque::new(),
            retention_ms,
        }
    }

    /// Insert a sample and drop everything past the retention window
    pub fn push(&mut self, sample: TimedSample) {
        match self
            .samples
            .iter()
            .rposition(|s| s.timestamp <= sample.timestamp)
        {
            Some(i) if self.samples[i].timestamp == sample.timestamp => self.samples[i] = sample,
            Some(i) => self.samples.insert(i + 1, sample),
            None => self.samples.push_front(sample),
        }
        self.prune();
    }

    fn prune(&mut self) {
        let Some(newest) = self.samples.back().map(|s| s.timestamp) else {
            return;
        };
        let cutoff = newest.saturating_sub(self.retention_ms);
        while self.samples.len() > 1 && self.samples.front().is_some_and(|s| s.timestamp < cutoff) {
            self.samples.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&TimedSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// State at `target` time. Falls back to the nearest end of the buffer
    /// when `target` lies outside it, and to the latest sample when fewer
    /// than two are held.
    pub fn sample_at(&self, target: u64) -> Option<TimedSample> {
        let latest = *self.samples.back()?;
        if self.samples.len() < 2 || target >= latest.timestamp {
            return Some(latest);
        }
        let oldest = self.samples[0];
        if target <= oldest.timestamp {
            return Some(oldest);
        }

        let upper = self.samples.iter().position(|s| s.timestamp >= target)?;
        let (a, b) = (self.samples[upper - 1], self.samples[upper]);
        let span = (b.timestamp - a.timestamp) as f32;
        let t = if span > 0.0 {
            (target - a.timestamp) as f32 / span
        } else {
            1.0
        };
        Some(a.lerp(&b, t))
    }
}

impl Default for SnapshotBuffer {
    fn default() -> Self {
        Self::new(RETENTION_MS)
    }
}

/// Snapshot buffer rendered at a fixed delay
#[derive(Debug, Clone)]
pub struct Interpolator {
    buffer: SnapshotBuffer,
    render_delay_ms: u64,
}

impl Interpolator {
    pub fn new(render_delay_ms: u64, retention_ms: u64) -> Self {
        Self {
            buffer: SnapshotBuffer::new(retention_ms),
            render_delay_ms,
        }
    }

    pub fn push(&mut self, sample: TimedSample) {
        self.buffer.push(sample);
    }

    pub fn buffer(&self) -> &SnapshotBuffer {
        &self.buffer
    }

    /// What to draw at local time `now`
    pub fn render(&self, now: u64) -> Option<TimedSample> {
        self.buffer
            .sample_at(now.saturating_sub(self.render_delay_ms))
    }
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new(RENDER_DELAY_MS, RETENTION_MS)
    }
}
