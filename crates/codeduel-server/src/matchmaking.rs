use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use codeduel_core::player::ConnectionId;

pub type SharedQueue = Arc<Mutex<MatchmakingQueue>>;

/// A connection waiting for a random opponent.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub connection_id: ConnectionId,
    pub name: String,
    pub enqueued_at: Instant,
}

/// Strict arrival-order queue. Pairing always takes the two oldest entries.
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    entries: VecDeque<QueueEntry>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a connection. Returns false (and changes nothing) if it is
    /// already waiting.
    pub fn enqueue(&mut self, connection_id: ConnectionId, name: String) -> bool {
        if self.contains(connection_id) {
            return false;
        }
        self.entries.push_back(QueueEntry {
            connection_id,
            name,
            enqueued_at: Instant::now(),
        });
        true
    }

    /// Remove and return the two longest-waiting entries, if there are two.
    pub fn dequeue_pair_if_ready(&mut self) -> Option<[QueueEntry; 2]> {
        if self.entries.len() < 2 {
            return None;
        }
        let first = self.entries.pop_front()?;
        let second = self.entries.pop_front()?;
        Some([first, second])
    }

    /// Return a claimed entry to the head of the queue, keeping its original
    /// wait time. Used when its partner turned out to be gone.
    pub fn push_front(&mut self, entry: QueueEntry) {
        if !self.contains(entry.connection_id) {
            self.entries.push_front(entry);
        }
    }

    /// Remove a waiting connection. A connection already claimed by a pairing
    /// is no longer here, so this is a no-op for it.
    pub fn remove(&mut self, connection_id: ConnectionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.connection_id != connection_id);
        self.entries.len() != before
    }

    pub fn rename(&mut self, connection_id: ConnectionId, name: &str) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.connection_id == connection_id)
        {
            entry.name = name.to_string();
        }
    }

    /// Drop entries that have waited longer than `ttl`, returning them.
    pub fn expire(&mut self, ttl: Duration) -> Vec<QueueEntry> {
        let now = Instant::now();
        let (expired, kept): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|e| now.duration_since(e.enqueued_at) >= ttl);
        self.entries = kept.into();
        expired
    }

    /// 1-based queue position.
    pub fn position(&self, connection_id: ConnectionId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.connection_id == connection_id)
            .map(|i| i + 1)
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.entries.iter().any(|e| e.connection_id == connection_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
