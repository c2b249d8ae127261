//! Match orchestrator - authoritative tick loop
//!
//! Each match runs on its own task. Inbound messages are queued and applied
//! between ticks, so the state needs no locking:
//! drain inputs -> simulate -> broadcast.

use dashmap::DashMap;
use glam::Vec3;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::MatchConfig;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, EliminationReason, PlayerInfo, ServerMsg};

use super::arena::enforce_boundary;
use super::combat::{
    apply_damage, resolve_standard_attack, resolve_swing_sample, AttackOutcome, Hit,
    SwingOutcome, SWING_DURATION_MS,
};
use super::projectile::{advance_all, ProjectileFate};
use super::snapshot::{build_snapshot, BroadcastPolicy};
use super::state::{CountdownStep, MatchError, MatchPhase, MatchState, RosterEntry};
use super::weapon::WeaponTable;
use super::{Outbound, PlayerInput};

const INPUT_CHANNEL_CAPACITY: usize = 256;
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub input_tx: mpsc::Sender<PlayerInput>,
    pub outbound_tx: broadcast::Sender<Outbound>,
    /// Players still alive
    pub alive_count: Arc<AtomicUsize>,
}

impl MatchHandle {
    pub fn alive_count(&self) -> usize {
        self.alive_count.load(Ordering::Relaxed)
    }
}

/// Registry of all active matches
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, handle: MatchHandle) {
        self.matches.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.remove(id).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    /// Players still alive across every match
    pub fn alive_players(&self) -> usize {
        self.matches.iter().map(|m| m.value().alive_count()).sum()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative game match
pub struct GameMatch {
    state: MatchState,
    weapons: Arc<WeaponTable>,
    input_rx: mpsc::Receiver<PlayerInput>,
    outbound_tx: broadcast::Sender<Outbound>,
    broadcast: BroadcastPolicy,
    /// Inputs received since the last tick
    pending: Vec<PlayerInput>,
    /// Messages produced by the current tick, flushed after it
    outbox: Vec<Outbound>,
    last_step_at: Option<u64>,
    alive_count: Arc<AtomicUsize>,
}

impl GameMatch {
    /// Create a new match. Fails, creating nothing, if the state cannot be built.
    pub fn new(
        id: Uuid,
        seed: u64,
        roster: Vec<RosterEntry>,
        config: MatchConfig,
        weapons: Arc<WeaponTable>,
    ) -> Result<(Self, MatchHandle), MatchError> {
        let snapshot_interval = config.broadcast_interval_ticks;
        let state = MatchState::new(id, seed, roster, config, &weapons)?;

        let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        let (outbound_tx, _) = broadcast::channel(OUTBOUND_CHANNEL_CAPACITY);
        let alive_count = Arc::new(AtomicUsize::new(state.alive_count()));

        let handle = MatchHandle {
            id,
            input_tx,
            outbound_tx: outbound_tx.clone(),
            alive_count: alive_count.clone(),
        };

        let game_match = Self {
            state,
            weapons,
            input_rx,
            outbound_tx,
            broadcast: BroadcastPolicy::new(snapshot_interval),
            pending: Vec::new(),
            outbox: Vec::new(),
            last_step_at: None,
            alive_count,
        };

        Ok((game_match, handle))
    }

    /// Run the authoritative tick loop until the match ends, then hold for
    /// the post-match delay before returning.
    pub async fn run(mut self) {
        info!(
            match_id = %self.state.id,
            players = self.state.players.len(),
            "Match created"
        );

        self.announce();
        self.flush();

        let tick_duration = Duration::from_micros(1_000_000 / self.state.config.tick_rate as u64);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            self.drain_inputs();
            self.step(unix_millis());
            self.flush();

            if self.state.is_ended() {
                break;
            }
        }

        let delay = Duration::from_millis(self.state.config.post_match_delay_ms);
        tokio::time::sleep(delay).await;
        info!(
            match_id = %self.state.id,
            tick = self.state.tick,
            snapshots = self.broadcast.regular_sent,
            forced_snapshots = self.broadcast.forced_sent,
            "Match torn down"
        );
    }

    /// Roster and countdown announcement sent once at creation
    fn announce(&mut self) {
        let players = self
            .state
            .players
            .values()
            .map(|p| PlayerInfo {
                session_id: p.session_id,
                display_name: p.display_name.clone(),
                weapon_key: p.weapon_key.clone(),
            })
            .collect();
        self.emit(Outbound::all(ServerMsg::MatchJoined {
            match_id: self.state.id,
            players,
        }));
        self.emit(Outbound::all(ServerMsg::MatchCountdown {
            seconds_remaining: self.state.countdown_remaining,
        }));
    }

    /// Pull everything the channel holds into the pending buffer
    fn drain_inputs(&mut self) {
        while let Ok(input) = self.input_rx.try_recv() {
            self.accept_input(input);
        }
    }

    /// Queue an input for the next tick. Latency probes are answered at once.
    pub fn accept_input(&mut self, input: PlayerInput) {
        if let ClientMsg::Ping { t } = input.msg {
            self.emit(Outbound::only(
                input.session_id,
                ServerMsg::Pong {
                    t,
                    server_time: unix_millis(),
                },
            ));
            return;
        }
        self.pending.push(input);
    }

    /// Run a single simulation tick at server time `now`
    pub fn step(&mut self, now: u64) {
        let dt_ms = self
            .last_step_at
            .map(|last| now.saturating_sub(last))
            .unwrap_or_else(|| self.state.config.tick_millis());
        self.last_step_at = Some(now);
        self.state.tick += 1;

        match self.state.phase {
            MatchPhase::Countdown => {
                self.apply_countdown_inputs();
                match self.state.advance_countdown(dt_ms) {
                    CountdownStep::Unchanged => {}
                    CountdownStep::Tick { seconds_remaining } => {
                        self.emit(Outbound::all(ServerMsg::MatchCountdown { seconds_remaining }));
                    }
                    CountdownStep::Finished => {
                        info!(match_id = %self.state.id, tick = self.state.tick, "Match active");
                        self.emit(Outbound::all(ServerMsg::MatchStarted {
                            tick: self.state.tick,
                        }));
                        self.emit(Outbound::all(build_snapshot(
                            self.state.tick,
                            &self.state.players,
                        )));
                    }
                }
                self.check_victory();
            }
            MatchPhase::Active => {
                let mut critical = self.advance_projectiles();
                critical |= self.apply_inputs();
                self.expire_attack_state(now);
                critical |= self.check_boundary();
                self.broadcast_state(critical);
                self.check_victory();
            }
            MatchPhase::Ended => {
                self.pending.clear();
            }
        }

        self.alive_count
            .store(self.state.alive_count(), Ordering::Relaxed);
    }

    /// Before the start only disconnects matter
    fn apply_countdown_inputs(&mut self) {
        for input in std::mem::take(&mut self.pending) {
            match input.msg {
                ClientMsg::Leave => {
                    self.handle_disconnect(input.session_id);
                }
                _ => {
                    debug!(session_id = %input.session_id, "Input before match start ignored");
                }
            }
        }
    }

    /// Apply buffered inputs in arrival order. Returns true on a critical event.
    fn apply_inputs(&mut self) -> bool {
        let mut critical = false;
        for input in std::mem::take(&mut self.pending) {
            critical |= self.apply_input(input);
        }
        critical
    }

    fn apply_input(&mut self, input: PlayerInput) -> bool {
        let session_id = input.session_id;
        match input.msg {
            ClientMsg::Move { x, z, facing, .. } => {
                self.apply_move(session_id, x, z, facing);
                false
            }
            ClientMsg::Attack { .. } => self.apply_attack(session_id, input.received_at),
            ClientMsg::SwingSample {
                weapon_tip,
                weapon_base,
                ..
            } => self.apply_swing(session_id, weapon_base, weapon_tip, input.received_at),
            ClientMsg::Leave => self.handle_disconnect(session_id),
            ClientMsg::Ping { .. } => false,
        }
    }

    /// Movement is trusted as reported; the boundary check re-validates it
    fn apply_move(&mut self, session_id: Uuid, x: f32, z: f32, facing: f32) {
        if !(x.is_finite() && z.is_finite() && facing.is_finite()) {
            debug!(session_id = %session_id, "Malformed movement ignored");
            return;
        }
        match self.state.players.get_mut(&session_id) {
            Some(player) if player.alive => {
                player.position.x = x;
                player.position.z = z;
                player.facing = facing;
            }
            _ => debug!(session_id = %session_id, "Movement from eliminated player ignored"),
        }
    }

    fn apply_attack(&mut self, session_id: Uuid, now: u64) -> bool {
        match resolve_standard_attack(&mut self.state.players, &self.weapons, session_id, now) {
            AttackOutcome::Rejected(reason) => {
                debug!(session_id = %session_id, ?reason, "Attack rejected");
                false
            }
            AttackOutcome::Melee { hits } => self.record_hits(hits),
            AttackOutcome::Fired(projectile) => {
                self.emit(Outbound::all(ServerMsg::ProjectileSpawned {
                    id: projectile.id,
                    position: projectile.position,
                    direction: projectile.direction,
                }));
                self.state.projectiles.push(projectile);
                true
            }
        }
    }

    fn apply_swing(&mut self, session_id: Uuid, base: Vec3, tip: Vec3, now: u64) -> bool {
        match resolve_swing_sample(&mut self.state.players, &self.weapons, session_id, base, tip, now)
        {
            SwingOutcome::Rejected(reason) => {
                debug!(session_id = %session_id, ?reason, "Swing sample rejected");
                false
            }
            SwingOutcome::Accepted { started, hits } => {
                if started {
                    let weapon_key = self
                        .state
                        .players
                        .get(&session_id)
                        .map(|p| p.weapon_key.clone())
                        .unwrap_or_default();
                    self.emit(Outbound::except(
                        session_id,
                        ServerMsg::SwingStarted {
                            session_id,
                            weapon_key,
                        },
                    ));
                }
                self.record_hits(hits)
            }
        }
    }

    /// Announce hits and the kills they caused. Returns true if anything landed.
    fn record_hits(&mut self, hits: Vec<Hit>) -> bool {
        let landed = !hits.is_empty();
        for hit in hits {
            self.emit(Outbound::all(ServerMsg::Hit {
                attacker_id: hit.attacker_id,
                target_id: hit.target_id,
                damage: hit.damage,
            }));
            if hit.killed {
                info!(
                    match_id = %self.state.id,
                    killer_id = %hit.attacker_id,
                    victim_id = %hit.target_id,
                    "Player killed"
                );
                self.emit(Outbound::all(ServerMsg::Eliminated {
                    player_id: hit.target_id,
                    reason: EliminationReason::Killed,
                    killer_id: Some(hit.attacker_id),
                }));
            }
        }
        landed
    }

    /// A dropped connection eliminates the player but keeps the body in the roster
    fn handle_disconnect(&mut self, session_id: Uuid) -> bool {
        let Some(player) = self.state.players.get_mut(&session_id) else {
            return false;
        };
        if !player.eliminate() {
            return false;
        }
        info!(match_id = %self.state.id, session_id = %session_id, "Player disconnected");
        self.emit(Outbound::all(ServerMsg::Eliminated {
            player_id: session_id,
            reason: EliminationReason::Disconnected,
            killer_id: None,
        }));
        true
    }

    /// Move projectiles and resolve their hits. Returns true if any hit landed.
    fn advance_projectiles(&mut self) -> bool {
        if self.state.projectiles.is_empty() {
            return false;
        }
        let dt = self.state.config.tick_delta();
        let results = advance_all(
            &mut self.state.projectiles,
            &self.state.players,
            self.state.config.arena_radius,
            dt,
        );

        let mut critical = false;
        for (projectile, fate) in results {
            match fate {
                ProjectileFate::InFlight => continue,
                ProjectileFate::Hit { target_id } => {
                    let damage = self
                        .state
                        .players
                        .get_mut(&target_id)
                        .and_then(|target| apply_damage(target, projectile.damage));
                    if let Some(result) = damage {
                        critical |= self.record_hits(vec![Hit {
                            attacker_id: projectile.owner_id,
                            target_id,
                            damage: projectile.damage,
                            killed: result.killed,
                        }]);
                    }
                }
                ProjectileFate::OutOfRange | ProjectileFate::LeftArena => {}
            }
            self.emit(Outbound::all(ServerMsg::ProjectileRemoved { id: projectile.id }));
        }
        critical
    }

    /// Close finished swing windows and drop stale attack flags
    fn expire_attack_state(&mut self, now: u64) {
        for player in self.state.players.values_mut() {
            player.swing.expire(now);
            let finished = player
                .last_attack_at
                .map_or(true, |at| now.saturating_sub(at) >= SWING_DURATION_MS);
            if player.attacking && finished {
                player.attacking = false;
            }
        }
    }

    /// Eliminate anyone outside the arena. Returns true if someone was.
    fn check_boundary(&mut self) -> bool {
        let eliminated = enforce_boundary(&mut self.state.players, self.state.config.arena_radius);
        for player_id in &eliminated {
            info!(match_id = %self.state.id, session_id = %player_id, "Player out of bounds");
            self.emit(Outbound::all(ServerMsg::Eliminated {
                player_id: *player_id,
                reason: EliminationReason::OutOfBounds,
                killer_id: None,
            }));
        }
        !eliminated.is_empty()
    }

    fn broadcast_state(&mut self, critical: bool) {
        if !self.broadcast.should_send(critical) {
            return;
        }
        self.emit(Outbound::all(build_snapshot(
            self.state.tick,
            &self.state.players,
        )));
        let updates: Vec<Outbound> = self
            .state
            .projectiles
            .iter()
            .map(|p| {
                Outbound::all(ServerMsg::ProjectileUpdated {
                    id: p.id,
                    position: p.position,
                })
            })
            .collect();
        self.outbox.extend(updates);
    }

    fn check_victory(&mut self) {
        if let Some(outcome) = self.state.check_victory() {
            info!(
                match_id = %self.state.id,
                winner_id = ?outcome.winner_id,
                tick = self.state.tick,
                "Match ended"
            );
            self.emit(Outbound::all(ServerMsg::MatchEnded {
                winner_id: outcome.winner_id,
                winner_name: outcome.winner_name,
            }));
        }
    }

    fn emit(&mut self, outbound: Outbound) {
        self.outbox.push(outbound);
    }

    /// Send everything produced since the last flush
    fn flush(&mut self) {
        for outbound in self.outbox.drain(..) {
            // No receivers just means nobody is listening right now
            let _ = self.outbound_tx.send(outbound);
        }
    }

    #[cfg(test)]
    fn take_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }
}
