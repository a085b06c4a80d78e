//! Session registry — the single source of truth for presence
//!
//! The registry is the only shared mutable structure in the hub. Membership
//! mutations go through one write lock over an insertion-ordered list so
//! that roster snapshots are linearizable and preserve connection order.

use crate::envelope::{ServerMessage, TARGET_ALL};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Process-unique connection id, assigned by the transport adapter.
pub type SessionId = Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The transport adapter registered the same id twice. This is an
    /// adapter bug, not a recoverable user error.
    #[error("session {0} is already registered")]
    DuplicateSession(SessionId),

    #[error("unknown session {0}")]
    UnknownSession(SessionId),
}

/// Server-side state for one live connection.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    /// Human-chosen display name; empty until set, not unique.
    username: RwLock<String>,
    /// Informational only.
    pub connected_at: SystemTime,
    /// Bounded outbound queue drained by the transport adapter.
    tx: mpsc::Sender<ServerMessage>,
    /// Messages dropped because the queue was full.
    dropped: AtomicU64,
}

impl Session {
    fn new(id: SessionId, tx: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            username: RwLock::new(String::new()),
            connected_at: SystemTime::now(),
            tx,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn username(&self) -> String {
        self.username.read().clone()
    }

    fn set_username(&self, username: &str) {
        *self.username.write() = username.to_string();
    }

    /// Whether `target` selects this session, by id or by current username.
    pub fn matches(&self, target: &str) -> bool {
        if self.id.to_string() == target {
            return true;
        }
        let username = self.username.read();
        !username.is_empty() && *username == target
    }

    /// Queue a message for this session without blocking.
    ///
    /// Overflow policy: if the queue is full the newest message is dropped
    /// for this session only — the sender and other recipients are never
    /// delayed. Returns whether the message was queued.
    pub fn send(&self, msg: ServerMessage) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(session_id = %self.id, "outbound queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Expected during rapid disconnect
                debug!(session_id = %self.id, "outbound queue closed, dropping message");
                false
            }
        }
    }

    /// Number of messages dropped due to a full queue.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Holds the set of currently connected sessions in insertion order.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<Vec<Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session. Fails if the id is already present.
    pub fn add(
        &self,
        id: SessionId,
        tx: mpsc::Sender<ServerMessage>,
    ) -> Result<Arc<Session>, RegistryError> {
        let mut sessions = self.sessions.write();
        if sessions.iter().any(|s| s.id == id) {
            return Err(RegistryError::DuplicateSession(id));
        }
        let session = Arc::new(Session::new(id, tx));
        sessions.push(session.clone());
        Ok(session)
    }

    /// Remove a session. Idempotent: removing an absent id is a no-op.
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write();
        let idx = sessions.iter().position(|s| s.id == id)?;
        Some(sessions.remove(idx))
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.read().iter().find(|s| s.id == id).cloned()
    }

    /// Change a session's display name. Surrounding whitespace is trimmed;
    /// there is no uniqueness constraint. Returns the accepted name.
    pub fn rename(&self, id: SessionId, username: &str) -> Result<String, RegistryError> {
        let sessions = self.sessions.read();
        let session = sessions
            .iter()
            .find(|s| s.id == id)
            .ok_or(RegistryError::UnknownSession(id))?;
        let accepted = username.trim().to_string();
        session.set_username(&accepted);
        Ok(accepted)
    }

    /// Resolve a target string to its recipient set.
    ///
    /// `"all"` resolves to every session; anything else matches sessions by
    /// id or username. Usernames are not unique, so a specific target can
    /// fan out to several sessions — accepted behavior, not an error.
    pub fn resolve(&self, target: &str) -> Vec<Arc<Session>> {
        let sessions = self.sessions.read();
        if target == TARGET_ALL {
            return sessions.clone();
        }
        sessions.iter().filter(|s| s.matches(target)).cloned().collect()
    }

    /// All sessions in insertion order.
    pub fn all(&self) -> Vec<Arc<Session>> {
        self.sessions.read().clone()
    }

    /// Current usernames in insertion order.
    pub fn snapshot(&self) -> Vec<String> {
        self.sessions.read().iter().map(|s| s.username()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> mpsc::Sender<ServerMessage> {
        let (tx, _rx) = mpsc::channel(8);
        tx
    }

    #[test]
    fn test_add_duplicate_fails() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();

        registry.add(id, channel()).unwrap();
        assert_eq!(
            registry.add(id, channel()).unwrap_err(),
            RegistryError::DuplicateSession(id)
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        registry.add(id, channel()).unwrap();

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_rename_unknown_session() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        assert_eq!(
            registry.rename(id, "ghost").unwrap_err(),
            RegistryError::UnknownSession(id)
        );
    }

    #[test]
    fn test_rename_trims_and_returns_accepted() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        registry.add(id, channel()).unwrap();

        let accepted = registry.rename(id, "  Alice ").unwrap();
        assert_eq!(accepted, "Alice");
        assert_eq!(registry.get(id).unwrap().username(), "Alice");
    }

    #[test]
    fn test_resolve_all_and_specific() {
        let registry = SessionRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        registry.add(a, channel()).unwrap();
        registry.add(b, channel()).unwrap();
        registry.rename(b, "beatrix").unwrap();

        assert_eq!(registry.resolve("all").len(), 2);
        // By id
        let by_id = registry.resolve(&a.to_string());
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].id, a);
        // By username
        let by_name = registry.resolve("beatrix");
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].id, b);
        // No match
        assert!(registry.resolve("nobody").is_empty());
    }

    #[test]
    fn test_duplicate_usernames_fan_out() {
        let registry = SessionRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        for id in [a, b, c] {
            registry.add(id, channel()).unwrap();
        }
        registry.rename(a, "perf").unwrap();
        registry.rename(b, "perf").unwrap();

        assert_eq!(registry.resolve("perf").len(), 2);
    }

    #[test]
    fn test_resolve_by_id_stable_across_rename() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        registry.add(id, channel()).unwrap();

        registry.rename(id, "first").unwrap();
        assert_eq!(registry.resolve(&id.to_string()).len(), 1);
        registry.rename(id, "second").unwrap();
        assert_eq!(registry.resolve(&id.to_string()).len(), 1);
    }

    #[test]
    fn test_snapshot_preserves_insertion_order() {
        let registry = SessionRegistry::new();
        let ids: Vec<SessionId> = (0..4).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            registry.add(*id, channel()).unwrap();
            registry.rename(*id, &format!("user-{}", i)).unwrap();
        }

        assert_eq!(registry.snapshot(), vec!["user-0", "user-1", "user-2", "user-3"]);

        registry.remove(ids[1]);
        assert_eq!(registry.snapshot(), vec!["user-0", "user-2", "user-3"]);
    }

    #[test]
    fn test_empty_username_never_matches() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        registry.add(id, channel()).unwrap();

        assert!(registry.resolve("").is_empty());
    }

    #[test]
    fn test_send_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(2);
        let session = Session::new(Uuid::new_v4(), tx);

        assert!(session.send(ServerMessage::AllUsers { usernames: vec![] }));
        assert!(session.send(ServerMessage::AllUsers { usernames: vec![] }));
        assert!(!session.send(ServerMessage::AllUsers { usernames: vec![] }));
        assert_eq!(session.dropped_count(), 1);

        // Draining makes room again
        rx.try_recv().unwrap();
        assert!(session.send(ServerMessage::AllUsers { usernames: vec![] }));
    }
}
