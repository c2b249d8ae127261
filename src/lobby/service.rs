//! Lobby service - session registry, queue processing and match creation

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MatchConfig;
use crate::game::weapon::WeaponTable;
use crate::game::{GameMatch, MatchError, MatchRegistry, Outbound, PlayerInput, RosterEntry};
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::queue::{LobbyQueue, QueuedSession};

/// Buffered outbound messages per session
pub const SESSION_CHANNEL_CAPACITY: usize = 256;
/// How often the queue is checked for a playable roster
const LOBBY_INTERVAL_MS: u64 = 500;

/// Lobby request failures
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("Session {0} is not connected")]
    UnknownSession(Uuid),

    #[error("Session {0} is already in a match")]
    AlreadyInMatch(Uuid),
}

/// Lobby service
pub struct LobbyService {
    match_config: MatchConfig,
    weapons: Arc<WeaponTable>,
    queue: Arc<Mutex<LobbyQueue>>,
    registry: Arc<MatchRegistry>,
    /// Connected sessions and their outbound sinks
    sessions: Arc<DashMap<Uuid, mpsc::Sender<ServerMsg>>>,
    /// Map of session -> current match
    session_matches: Arc<DashMap<Uuid, Uuid>>,
}

impl LobbyService {
    pub fn new(
        match_config: MatchConfig,
        weapons: Arc<WeaponTable>,
        registry: Arc<MatchRegistry>,
    ) -> Self {
        let queue = LobbyQueue::new(match_config.min_players_to_start, match_config.max_players);
        Self {
            match_config,
            weapons,
            queue: Arc::new(Mutex::new(queue)),
            registry,
            sessions: Arc::new(DashMap::new()),
            session_matches: Arc::new(DashMap::new()),
        }
    }

    /// Register a session (called when the WebSocket connects).
    /// Returns the receiver the connection's writer drains.
    pub fn register_session(&self, session_id: Uuid) -> mpsc::Receiver<ServerMsg> {
        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        self.sessions.insert(session_id, tx);
        debug!(session_id = %session_id, "Session registered");
        rx
    }

    /// Unregister a session (called when the WebSocket disconnects).
    /// A session still in a match is eliminated there.
    pub async fn unregister_session(&self, session_id: Uuid) {
        self.sessions.remove(&session_id);
        self.queue.lock().await.dequeue(session_id);

        if let Some(handle) = self.current_match(&session_id) {
            let leave = PlayerInput {
                session_id,
                msg: ClientMsg::Leave,
                received_at: unix_millis(),
            };
            if handle.input_tx.send(leave).await.is_err() {
                debug!(session_id = %session_id, match_id = %handle.id, "Match already finished");
            }
        }

        info!(session_id = %session_id, "Session unregistered from lobby");
    }

    /// Join the lobby queue
    pub async fn enqueue(&self, session: QueuedSession) -> Result<(), LobbyError> {
        let session_id = session.session_id;
        if !self.sessions.contains_key(&session_id) {
            return Err(LobbyError::UnknownSession(session_id));
        }
        if self.session_matches.contains_key(&session_id) {
            return Err(LobbyError::AlreadyInMatch(session_id));
        }

        let mut queue = self.queue.lock().await;
        queue.enqueue(session);
        info!(session_id = %session_id, queue_size = queue.len(), "Session joined lobby queue");
        Ok(())
    }

    /// Route a client message to the session's match, or handle it in the
    /// lobby when the session has not been placed yet.
    ///
    /// Never waits on the match: an ended match stops draining its queue,
    /// and a full queue drops the message.
    pub async fn route_input(&self, session_id: Uuid, msg: ClientMsg) {
        let received_at = unix_millis();
        let Some(handle) = self.current_match(&session_id) else {
            self.handle_lobby_input(session_id, msg).await;
            return;
        };

        let input = PlayerInput {
            session_id,
            msg,
            received_at,
        };
        match handle.input_tx.try_send(input) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(session_id = %session_id, match_id = %handle.id, "Match input queue full, input dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(session_id = %session_id, match_id = %handle.id, "Match input channel closed");
            }
        }
    }

    async fn handle_lobby_input(&self, session_id: Uuid, msg: ClientMsg) {
        match msg {
            ClientMsg::Ping { t } => {
                self.notify(
                    session_id,
                    ServerMsg::Pong {
                        t,
                        server_time: unix_millis(),
                    },
                )
                .await;
            }
            ClientMsg::Leave => {
                if self.queue.lock().await.dequeue(session_id).is_some() {
                    info!(session_id = %session_id, "Session left lobby queue");
                }
            }
            _ => debug!(session_id = %session_id, "Input outside a match ignored"),
        }
    }

    /// Send a message straight to one session
    pub async fn notify(&self, session_id: Uuid, msg: ServerMsg) {
        let tx = self.sessions.get(&session_id).map(|s| s.value().clone());
        if let Some(tx) = tx {
            if tx.send(msg).await.is_err() {
                debug!(session_id = %session_id, "Session outbound channel closed");
            }
        }
    }

    /// Turn queued sessions into matches. Returns how many were created.
    pub async fn form_matches(&self) -> usize {
        let mut queue = self.queue.lock().await;
        let mut created = 0;

        while let Some(batch) = queue.try_form_match() {
            match self.create_match(&batch) {
                Ok(_) => created += 1,
                Err(e) => {
                    error!(error = %e, sessions = batch.len(), "Failed to create match");
                    queue.requeue_front(batch);
                    break;
                }
            }
        }

        if created == 0 {
            if let Some(wait) = queue.oldest_wait() {
                debug!(
                    queue_size = queue.len(),
                    oldest_wait_ms = wait.as_millis() as u64,
                    "Waiting for more players"
                );
            }
        }
        created
    }

    /// Create a match with the given sessions
    fn create_match(&self, sessions: &[QueuedSession]) -> Result<Uuid, MatchError> {
        let match_id = Uuid::new_v4();
        let seed = rand::random::<u64>();
        let roster: Vec<RosterEntry> = sessions.iter().map(RosterEntry::from).collect();

        let (game_match, handle) = GameMatch::new(
            match_id,
            seed,
            roster,
            self.match_config.clone(),
            self.weapons.clone(),
        )?;

        self.registry.insert(handle.clone());

        // Subscriptions are taken before the match task starts so no session
        // misses the roster announcement
        for session in sessions {
            let session_id = session.session_id;
            self.session_matches.insert(session_id, match_id);

            let sink = self.sessions.get(&session_id).map(|s| s.value().clone());
            match sink {
                Some(tx) => {
                    tokio::spawn(forward_outbound(
                        session_id,
                        handle.outbound_tx.subscribe(),
                        tx,
                    ));
                }
                None => {
                    // Dropped between dequeue and creation
                    let _ = handle.input_tx.try_send(PlayerInput {
                        session_id,
                        msg: ClientMsg::Leave,
                        received_at: unix_millis(),
                    });
                }
            }
        }

        info!(
            match_id = %match_id,
            player_count = sessions.len(),
            "Created new match"
        );

        let registry = self.registry.clone();
        let session_matches = self.session_matches.clone();
        let session_ids: Vec<Uuid> = sessions.iter().map(|s| s.session_id).collect();

        tokio::spawn(async move {
            game_match.run().await;

            registry.remove(&match_id);
            for session_id in session_ids {
                session_matches.remove_if(&session_id, |_, current| *current == match_id);
            }

            info!(match_id = %match_id, "Match removed from registry");
        });

        Ok(match_id)
    }

    /// Run the lobby loop (periodic queue processing)
    pub async fn run(&self) {
        info!(
            min_players = self.match_config.min_players_to_start,
            max_players = self.match_config.max_players,
            "Lobby loop started"
        );
        let mut interval = tokio::time::interval(Duration::from_millis(LOBBY_INTERVAL_MS));

        loop {
            interval.tick().await;
            self.form_matches().await;
        }
    }

    /// Get current queue size
    pub async fn queue_size(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Get a session's current match ID
    pub fn session_match(&self, session_id: &Uuid) -> Option<Uuid> {
        self.session_matches.get(session_id).map(|r| *r)
    }

    pub fn connected_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn current_match(&self, session_id: &Uuid) -> Option<crate::game::MatchHandle> {
        self.session_match(session_id)
            .and_then(|match_id| self.registry.get(&match_id))
    }
}

/// Copy match messages addressed to one session into its outbound sink
async fn forward_outbound(
    session_id: Uuid,
    mut match_rx: broadcast::Receiver<Outbound>,
    session_tx: mpsc::Sender<ServerMsg>,
) {
    loop {
        match match_rx.recv().await {
            Ok(outbound) => {
                if !outbound.is_for(session_id) {
                    continue;
                }
                if session_tx.send(outbound.msg).await.is_err() {
                    debug!(session_id = %session_id, "Session gone, stopping match forwarder");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                // Keep going: the next snapshot supersedes what was skipped
                warn!(session_id = %session_id, lagged = n, "Session lagged behind match");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::MatchHandle;
    use crate::ws::protocol::EliminationReason;
    use std::sync::atomic::AtomicUsize;

    fn lobby(config: MatchConfig) -> LobbyService {
        LobbyService::new(
            config,
            Arc::new(WeaponTable::default()),
            Arc::new(MatchRegistry::new()),
        )
    }

    async fn join(lobby: &LobbyService, name: &str) -> (Uuid, mpsc::Receiver<ServerMsg>) {
        let id = Uuid::new_v4();
        let rx = lobby.register_session(id);
        lobby
            .enqueue(QueuedSession::new(id, name.to_string(), "spear".to_string()))
            .await
            .unwrap();
        (id, rx)
    }

    #[test]
    fn queued_session_can_leave() {
        tokio_test::block_on(async {
            let lobby = lobby(MatchConfig::default());
            let (id, _rx) = join(&lobby, "a").await;
            assert_eq!(lobby.queue_size().await, 1);
            lobby.route_input(id, ClientMsg::Leave).await;
            assert_eq!(lobby.queue_size().await, 0);
        });
    }

    #[test]
    fn unknown_session_cannot_enqueue() {
        tokio_test::block_on(async {
            let lobby = lobby(MatchConfig::default());
            let result = lobby
                .enqueue(QueuedSession::new(Uuid::new_v4(), "x".into(), "bow".into()))
                .await;
            assert!(matches!(result, Err(LobbyError::UnknownSession(_))));
        });
    }

    #[test]
    fn ping_in_lobby_is_answered() {
        tokio_test::block_on(async {
            let lobby = lobby(MatchConfig::default());
            let (id, mut rx) = join(&lobby, "a").await;
            lobby.route_input(id, ClientMsg::Ping { t: 7 }).await;
            assert!(matches!(rx.try_recv(), Ok(ServerMsg::Pong { t: 7, .. })));
        });
    }

    #[tokio::test]
    async fn forms_match_and_announces_roster() {
        let lobby = lobby(MatchConfig {
            countdown_seconds: 1,
            ..Default::default()
        });
        let (a, mut rx_a) = join(&lobby, "a").await;
        let (b, mut rx_b) = join(&lobby, "b").await;

        assert_eq!(lobby.form_matches().await, 1);
        assert_eq!(lobby.queue_size().await, 0);
        let match_id = lobby.session_match(&a).unwrap();
        assert_eq!(lobby.session_match(&b), Some(match_id));
        assert!(matches!(
            lobby.enqueue(QueuedSession::new(a, "a".into(), "spear".into())).await,
            Err(LobbyError::AlreadyInMatch(_))
        ));

        for rx in [&mut rx_a, &mut rx_b] {
            let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(
                msg,
                ServerMsg::MatchJoined { match_id: m, ref players } if m == match_id && players.len() == 2
            ));
        }
    }

    #[tokio::test]
    async fn failed_creation_keeps_sessions_queued() {
        let lobby = lobby(MatchConfig {
            tick_rate: 0,
            ..Default::default()
        });
        join(&lobby, "a").await;
        join(&lobby, "b").await;

        assert_eq!(lobby.form_matches().await, 0);
        assert_eq!(lobby.queue_size().await, 2);
        assert_eq!(lobby.registry.active_matches(), 0);
    }

    #[tokio::test]
    async fn disconnect_is_an_elimination() {
        let lobby = lobby(MatchConfig {
            countdown_seconds: 0,
            post_match_delay_ms: 0,
            ..Default::default()
        });
        let (a, mut rx_a) = join(&lobby, "a").await;
        let (b, _rx_b) = join(&lobby, "b").await;
        lobby.form_matches().await;

        lobby.unregister_session(b).await;
        assert_eq!(lobby.connected_sessions(), 1);

        let mut saw_disconnect = false;
        let winner = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(msg) = rx_a.recv().await {
                match msg {
                    ServerMsg::Eliminated {
                        player_id,
                        reason: EliminationReason::Disconnected,
                        ..
                    } if player_id == b => saw_disconnect = true,
                    ServerMsg::MatchEnded { winner_id, .. } => return winner_id,
                    _ => {}
                }
            }
            None
        })
        .await
        .unwrap();

        assert!(saw_disconnect);
        assert_eq!(winner, Some(a));
    }

    #[tokio::test]
    async fn stalled_match_does_not_block_input() {
        let lobby = lobby(MatchConfig::default());
        let id = Uuid::new_v4();
        let _rx = lobby.register_session(id);

        // A match that never drains, like one waiting out its post-match delay
        let (input_tx, mut input_rx) = mpsc::channel(1);
        let (outbound_tx, _) = broadcast::channel(1);
        let handle = MatchHandle {
            id: Uuid::new_v4(),
            input_tx,
            outbound_tx,
            alive_count: Arc::new(AtomicUsize::new(1)),
        };
        lobby.session_matches.insert(id, handle.id);
        lobby.registry.insert(handle);

        let routed = tokio::time::timeout(Duration::from_secs(1), async {
            for t in 0..10 {
                lobby.route_input(id, ClientMsg::Ping { t }).await;
            }
        })
        .await;
        assert!(routed.is_ok());

        // Only the first fit
        assert!(matches!(
            input_rx.try_recv(),
            Ok(PlayerInput { msg: ClientMsg::Ping { t: 0 }, .. })
        ));
        assert!(input_rx.try_recv().is_err());
    }
}
