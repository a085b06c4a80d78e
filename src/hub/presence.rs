//! Roster broadcasting
//!
//! Fires synchronously after every successful registry mutation. The
//! "all users" roster is computed once; "other users" differs per recipient
//! (self excluded) so it is derived per session by removing that session's
//! own position — which stays correct even when usernames collide.

use crate::envelope::ServerMessage;
use crate::hub::registry::{Session, SessionRegistry};
use std::sync::Arc;

/// Pushes roster snapshots to affected sessions on membership changes.
#[derive(Clone)]
pub struct PresenceBroadcaster {
    registry: Arc<SessionRegistry>,
}

impl PresenceBroadcaster {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Push the full roster and per-recipient "other users" roster to every
    /// connected session. The network push itself is each session's queue
    /// drain; nothing here blocks.
    pub fn broadcast(&self) {
        let sessions = self.registry.all();
        let usernames: Vec<String> = sessions.iter().map(|s| s.username()).collect();

        for session in &sessions {
            session.send(ServerMessage::AllUsers {
                usernames: usernames.clone(),
            });
        }

        for (i, session) in sessions.iter().enumerate() {
            let mut others = usernames.clone();
            others.remove(i);
            session.send(ServerMessage::OtherUsers { usernames: others });
        }
    }

    /// Private ack carrying the accepted username back to the renamed
    /// session only.
    pub fn ack_rename(&self, session: &Session, accepted: &str) {
        session.send(ServerMessage::Username {
            username: accepted.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[test]
    fn test_other_users_excludes_self_by_position() {
        let registry = Arc::new(SessionRegistry::new());
        let presence = PresenceBroadcaster::new(registry.clone());

        let mut receivers = vec![];
        for _ in 0..3 {
            let (tx, rx) = mpsc::channel(16);
            let session = registry.add(Uuid::new_v4(), tx).unwrap();
            // Everyone picks the same name
            registry.rename(session.id, "twin").unwrap();
            receivers.push(rx);
        }

        presence.broadcast();

        for rx in receivers.iter_mut() {
            match rx.try_recv().unwrap() {
                ServerMessage::AllUsers { usernames } => assert_eq!(usernames.len(), 3),
                other => panic!("expected all_users, got {:?}", other),
            }
            match rx.try_recv().unwrap() {
                ServerMessage::OtherUsers { usernames } => assert_eq!(usernames.len(), 2),
                other => panic!("expected other_users, got {:?}", other),
            }
        }
    }
}
