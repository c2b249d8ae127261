//! Presentation state for every remote player
//!
//! Snapshots only write into per-entity buffers; `views` reads them once
//! per rendered frame.

use std::collections::BTreeMap;

use glam::Vec3;
use uuid::Uuid;

use crate::ws::protocol::PlayerSnapshot;

use super::extrapolation::DeadReckoning;
use super::interpolation::{Interpolator, TimedSample, RENDER_DELAY_MS, RETENTION_MS};

/// Time over which a guessed position is eased back onto the interpolated one
pub const RESUME_BLEND_MS: u64 = 100;

/// What the renderer needs for one remote player
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteView {
    pub position: Vec3,
    pub rotation: f32,
    pub hp: f32,
    pub max_hp: f32,
    pub alive: bool,
    pub attacking: bool,
    /// Position is a guess from last known velocity
    pub extrapolating: bool,
}

/// Leftover offset from the last guessed position when fresh data arrives
#[derive(Debug, Clone, Copy)]
struct ResumeBlend {
    started_at: u64,
    offset: Vec3,
}

impl ResumeBlend {
    fn offset_at(&self, now: u64) -> Option<Vec3> {
        let elapsed = now.saturating_sub(self.started_at);
        (elapsed < RESUME_BLEND_MS)
            .then(|| self.offset * (1.0 - elapsed as f32 / RESUME_BLEND_MS as f32))
    }
}

#[derive(Debug, Clone)]
struct RemoteEntity {
    interpolator: Interpolator,
    reckoning: DeadReckoning,
    hp: f32,
    max_hp: f32,
    alive: bool,
    attacking: bool,
    /// Last drawn position and whether it was a guess
    last_drawn: Option<(Vec3, bool)>,
    resume: Option<ResumeBlend>,
}

/// Remote players keyed by session id
#[derive(Debug, Clone)]
pub struct RemotePlayers {
    local_id: Option<Uuid>,
    entities: BTreeMap<Uuid, RemoteEntity>,
    render_delay_ms: u64,
    retention_ms: u64,
}

impl RemotePlayers {
    /// `local_id` is skipped in snapshots; it belongs to the prediction engine
    pub fn new(local_id: Option<Uuid>) -> Self {
        Self::with_timing(local_id, RENDER_DELAY_MS, RETENTION_MS)
    }

    /// Continuity at the extrapolation handover assumes `render_delay_ms`
    /// does not exceed the extrapolation threshold
    pub fn with_timing(local_id: Option<Uuid>, render_delay_ms: u64, retention_ms: u64) -> Self {
        Self {
            local_id,
            entities: BTreeMap::new(),
            render_delay_ms,
            retention_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Record a roster snapshot received at local time `received_at`.
    /// Players missing from it are forgotten.
    pub fn apply_snapshot(&mut self, players: &[PlayerSnapshot], received_at: u64) {
        let (render_delay_ms, retention_ms) = (self.render_delay_ms, self.retention_ms);

        for player in players {
            if Some(player.session_id) == self.local_id {
                continue;
            }
            let entity = self
                .entities
                .entry(player.session_id)
                .or_insert_with(|| RemoteEntity {
                    interpolator: Interpolator::new(render_delay_ms, retention_ms),
                    reckoning: DeadReckoning::new(),
                    hp: player.hp,
                    max_hp: player.max_hp,
                    alive: player.alive,
                    attacking: player.attacking,
                    last_drawn: None,
                    resume: None,
                });

            let sample = TimedSample::new(received_at, player.position, player.facing);
            entity.interpolator.push(sample);
            entity.reckoning.observe(sample);
            entity.hp = player.hp;
            entity.max_hp = player.max_hp;
            entity.alive = player.alive;
            entity.attacking = player.attacking;
        }

        self.entities
            .retain(|id, _| players.iter().any(|p| p.session_id == *id));
    }

    /// Current view of one player
    pub fn view(&mut self, session_id: &Uuid, now: u64) -> Option<RemoteView> {
        self.entities
            .get_mut(session_id)
            .and_then(|entity| entity.view(now))
    }

    /// Current view of every remote player
    pub fn views(&mut self, now: u64) -> Vec<(Uuid, RemoteView)> {
        self.entities
            .iter_mut()
            .filter_map(|(id, entity)| entity.view(now).map(|v| (*id, v)))
            .collect()
    }
}

impl RemoteEntity {
    fn view(&mut self, now: u64) -> Option<RemoteView> {
        let latest = *self.interpolator.buffer().latest()?;
        // The dead stay where they fell
        let guess = if self.alive {
            self.reckoning.update(now)
        } else {
            None
        };

        let (position, rotation, guessed) = match guess {
            Some(position) => {
                self.resume = None;
                (position, latest.rotation, true)
            }
            None => {
                let sample = self.interpolator.render(now).unwrap_or(latest);
                if let Some((drawn, true)) = self.last_drawn {
                    self.resume = Some(ResumeBlend {
                        started_at: now,
                        offset: drawn - sample.position,
                    });
                }
                let offset = self.resume.and_then(|blend| blend.offset_at(now));
                if offset.is_none() {
                    self.resume = None;
                }
                (
                    sample.position + offset.unwrap_or(Vec3::ZERO),
                    sample.rotation,
                    false,
                )
            }
        };
        self.last_drawn = Some((position, guessed));

        Some(RemoteView {
            position,
            rotation,
            hp: self.hp,
            max_hp: self.max_hp,
            alive: self.alive,
            attacking: self.attacking,
            extrapolating: self.reckoning.is_extrapolating() && guessed,
        })
    }
}
