//! Lobby queue implementation

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::game::RosterEntry;

/// Session waiting for a match
#[derive(Debug, Clone)]
pub struct QueuedSession {
    pub session_id: Uuid,
    pub display_name: String,
    pub weapon_key: String,
    pub queued_at: Instant,
}

impl QueuedSession {
    pub fn new(session_id: Uuid, display_name: String, weapon_key: String) -> Self {
        Self {
            session_id,
            display_name,
            weapon_key,
            queued_at: Instant::now(),
        }
    }

    /// How long this session has been waiting
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }
}

impl From<&QueuedSession> for RosterEntry {
    fn from(session: &QueuedSession) -> Self {
        RosterEntry {
            session_id: session.session_id,
            display_name: session.display_name.clone(),
            weapon_key: session.weapon_key.clone(),
        }
    }
}

/// FIFO of sessions waiting for a match
pub struct LobbyQueue {
    queue: VecDeque<QueuedSession>,
    /// Minimum sessions to start a match
    min_players: usize,
    /// Maximum sessions per match
    max_players: usize,
}

impl LobbyQueue {
    pub fn new(min_players: usize, max_players: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            min_players,
            max_players,
        }
    }

    /// Add a session to the back of the queue
    pub fn enqueue(&mut self, session: QueuedSession) {
        // Rejoin replaces the old entry
        self.queue.retain(|s| s.session_id != session.session_id);
        self.queue.push_back(session);
    }

    /// Remove a session from the queue
    pub fn dequeue(&mut self, session_id: Uuid) -> Option<QueuedSession> {
        let pos = self.queue.iter().position(|s| s.session_id == session_id)?;
        self.queue.remove(pos)
    }

    pub fn contains(&self, session_id: &Uuid) -> bool {
        self.queue.iter().any(|s| &s.session_id == session_id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Longest current wait, if anyone is queued
    pub fn oldest_wait(&self) -> Option<Duration> {
        self.queue.front().map(|s| s.wait_time())
    }

    /// Take up to `max_players` sessions once at least `min_players` wait
    pub fn try_form_match(&mut self) -> Option<Vec<QueuedSession>> {
        if self.queue.len() < self.min_players {
            return None;
        }
        let count = self.queue.len().min(self.max_players);
        Some(self.queue.drain(..count).collect())
    }

    /// Put sessions back at the front, keeping their order and wait times
    pub fn requeue_front(&mut self, sessions: Vec<QueuedSession>) {
        for session in sessions.into_iter().rev() {
            if !self.contains(&session.session_id) {
                self.queue.push_front(session);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(name: &str) -> QueuedSession {
        QueuedSession::new(Uuid::new_v4(), name.to_string(), "sword".to_string())
    }

    #[test]
    fn forms_match_only_at_minimum() {
        let mut queue = LobbyQueue::new(2, 3);
        queue.enqueue(session("a"));
        assert!(queue.try_form_match().is_none());
        queue.enqueue(session("b"));
        let batch = queue.try_form_match().unwrap();
        assert_eq!(batch.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn takes_at_most_max_players_in_arrival_order() {
        let mut queue = LobbyQueue::new(2, 3);
        for name in ["a", "b", "c", "d"] {
            queue.enqueue(session(name));
        }
        let batch = queue.try_form_match().unwrap();
        let names: Vec<&str> = batch.iter().map(|s| s.display_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn rejoin_does_not_duplicate() {
        let mut queue = LobbyQueue::new(2, 8);
        let s = session("a");
        queue.enqueue(s.clone());
        queue.enqueue(s.clone());
        assert_eq!(queue.len(), 1);
        assert!(queue.dequeue(s.session_id).is_some());
        assert!(queue.dequeue(s.session_id).is_none());
    }

    #[test]
    fn requeued_sessions_go_first() {
        let mut queue = LobbyQueue::new(2, 2);
        queue.enqueue(session("a"));
        queue.enqueue(session("b"));
        let batch = queue.try_form_match().unwrap();
        queue.enqueue(session("c"));
        queue.requeue_front(batch);
        let names: Vec<String> = queue
            .try_form_match()
            .unwrap()
            .into_iter()
            .map(|s| s.display_name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn roster_entry_from_session() {
        let s = session("a");
        let entry = RosterEntry::from(&s);
        assert_eq!(entry.session_id, s.session_id);
        assert_eq!(entry.weapon_key, "sword");
    }
}
