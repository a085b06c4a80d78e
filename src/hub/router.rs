//! Envelope routing and fan-out
//!
//! Delivery is best-effort at-most-once: a target resolving to zero
//! recipients is a silent drop, and there is no ack channel back to the
//! sender. Per-recipient delivery is fire-and-forget into that session's
//! bounded queue, so one slow client never stalls the others.

use crate::envelope::{Envelope, Kind, ServerMessage};
use crate::hub::registry::{Session, SessionRegistry};
use std::sync::Arc;
use tracing::debug;

/// Routes envelopes to their resolved recipient sessions.
#[derive(Clone)]
pub struct Router {
    registry: Arc<SessionRegistry>,
}

impl Router {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Dispatch an envelope from `sender`, returning the number of sessions
    /// it was queued for.
    ///
    /// Control and event envelopes are forwarded unchanged, including to the
    /// sender itself when it matches its own target. Chat is re-stamped with
    /// the sender's session id; chat that is empty after trimming is a no-op.
    pub fn dispatch(&self, sender: &Session, envelope: Envelope) -> usize {
        let target = envelope.target.clone();

        let msg = match envelope.kind {
            Kind::Control | Kind::Event => {
                let Some(header) = envelope.header else {
                    debug!(kind = %envelope.kind, session_id = %sender.id, "dropping envelope with no header");
                    return 0;
                };
                match envelope.kind {
                    Kind::Control => ServerMessage::Control {
                        header,
                        values: envelope.values,
                        target: envelope.target,
                        mode: envelope.mode,
                    },
                    _ => ServerMessage::Event {
                        header,
                        values: envelope.values,
                        target: envelope.target,
                        mode: envelope.mode,
                    },
                }
            }
            Kind::Chat => {
                // Trimming is only the emptiness test; the text itself is
                // forwarded verbatim
                let text = envelope.chat_text().unwrap_or("");
                if text.trim().is_empty() {
                    return 0;
                }
                ServerMessage::Chat {
                    id: sender.id.to_string(),
                    chat: text.to_string(),
                }
            }
        };

        let recipients = self.registry.resolve(&target);
        if recipients.is_empty() {
            debug!(target = %target, "no recipients for target");
            return 0;
        }

        let mut delivered = 0;
        for recipient in recipients {
            if recipient.send(msg.clone()) {
                delivered += 1;
            }
        }

        debug!(target = %target, delivered, "dispatched envelope");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Scalar, Values, MODE_PUSH};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn setup(
        registry: &Arc<SessionRegistry>,
        n: usize,
    ) -> Vec<(Arc<Session>, mpsc::Receiver<ServerMessage>)> {
        (0..n)
            .map(|_| {
                let (tx, rx) = mpsc::channel(16);
                let session = registry.add(Uuid::new_v4(), tx).unwrap();
                (session, rx)
            })
            .collect()
    }

    #[test]
    fn test_control_without_header_dropped() {
        let registry = Arc::new(SessionRegistry::new());
        let router = Router::new(registry.clone());
        let sessions = setup(&registry, 2);

        let envelope = Envelope::control(
            None,
            Values::Scalar(Scalar::Int(1)),
            "all".to_string(),
            MODE_PUSH.to_string(),
        );
        assert_eq!(router.dispatch(&sessions[0].0, envelope), 0);
    }

    #[test]
    fn test_broadcast_includes_sender() {
        let registry = Arc::new(SessionRegistry::new());
        let router = Router::new(registry.clone());
        let mut sessions = setup(&registry, 3);

        let envelope = Envelope::control(
            Some("bright".to_string()),
            Values::Scalar(Scalar::Int(80)),
            "all".to_string(),
            MODE_PUSH.to_string(),
        );
        assert_eq!(router.dispatch(&sessions[0].0, envelope), 3);

        for (_, rx) in sessions.iter_mut() {
            match rx.try_recv().unwrap() {
                ServerMessage::Control { header, values, .. } => {
                    assert_eq!(header, "bright");
                    assert_eq!(values, Values::Scalar(Scalar::Int(80)));
                }
                other => panic!("expected control, got {:?}", other),
            }
            assert!(rx.try_recv().is_err(), "exactly one delivery per session");
        }
    }

    #[test]
    fn test_empty_chat_is_noop() {
        let registry = Arc::new(SessionRegistry::new());
        let router = Router::new(registry.clone());
        let mut sessions = setup(&registry, 2);

        let envelope = Envelope::chat("   \t ".to_string(), "all".to_string());
        assert_eq!(router.dispatch(&sessions[0].0, envelope), 0);
        assert!(sessions[1].1.try_recv().is_err());
    }

    #[test]
    fn test_chat_stamped_with_sender_id() {
        let registry = Arc::new(SessionRegistry::new());
        let router = Router::new(registry.clone());
        let mut sessions = setup(&registry, 2);
        let sender_id = sessions[0].0.id;
        registry.rename(sessions[1].0.id, "B").unwrap();

        let envelope = Envelope::chat("hi".to_string(), "B".to_string());
        assert_eq!(router.dispatch(&sessions[0].0, envelope), 1);

        match sessions[1].1.try_recv().unwrap() {
            ServerMessage::Chat { id, chat } => {
                assert_eq!(id, sender_id.to_string());
                assert_eq!(chat, "hi");
            }
            other => panic!("expected chat, got {:?}", other),
        }
        assert!(sessions[0].1.try_recv().is_err(), "sender gets nothing back");
    }

    #[test]
    fn test_chat_text_forwarded_verbatim() {
        let registry = Arc::new(SessionRegistry::new());
        let router = Router::new(registry.clone());
        let mut sessions = setup(&registry, 2);
        registry.rename(sessions[1].0.id, "B").unwrap();

        let envelope = Envelope::chat("  hi there  ".to_string(), "B".to_string());
        assert_eq!(router.dispatch(&sessions[0].0, envelope), 1);

        match sessions[1].1.try_recv().unwrap() {
            ServerMessage::Chat { chat, .. } => assert_eq!(chat, "  hi there  "),
            other => panic!("expected chat, got {:?}", other),
        }
    }

    #[test]
    fn test_unresolved_target_silent_drop() {
        let registry = Arc::new(SessionRegistry::new());
        let router = Router::new(registry.clone());
        let sessions = setup(&registry, 1);

        let envelope = Envelope::event(
            Some("go".to_string()),
            Values::None,
            "nobody".to_string(),
            MODE_PUSH.to_string(),
        );
        assert_eq!(router.dispatch(&sessions[0].0, envelope), 0);
    }

    #[test]
    fn test_mode_forwarded_unchanged() {
        let registry = Arc::new(SessionRegistry::new());
        let router = Router::new(registry.clone());
        let mut sessions = setup(&registry, 1);

        let envelope = Envelope::event(
            Some("cue".to_string()),
            Values::None,
            "all".to_string(),
            "request".to_string(),
        );
        router.dispatch(&sessions[0].0, envelope);

        match sessions[0].1.try_recv().unwrap() {
            ServerMessage::Event { mode, .. } => assert_eq!(mode, "request"),
            other => panic!("expected event, got {:?}", other),
        }
    }
}
