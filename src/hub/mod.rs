//! The hub: session registry, envelope routing, and presence
//!
//! The hub is transport-agnostic. Adapters drive it through three calls —
//! [`Hub::connect`], [`Hub::disconnect`], [`Hub::handle`] — and receive
//! pushes through the bounded per-session queue handed over at connect time.

mod presence;
mod registry;
mod router;
pub mod websocket;

pub use presence::PresenceBroadcaster;
pub use registry::{RegistryError, Session, SessionId, SessionRegistry};
pub use router::Router;

use crate::envelope::{ClientMessage, Scalar, ServerMessage, Values};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Hub identity and tuning.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Display name announced in the connect greeting.
    pub name: String,
    /// Version announced in the connect greeting.
    pub version: String,
    /// Capacity of each session's outbound queue.
    pub queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            name: "stagelink-hub".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            queue_capacity: 64,
        }
    }
}

/// Composition root owning the registry and wiring inbound transport events
/// to the router and presence broadcaster.
pub struct Hub {
    config: HubConfig,
    registry: Arc<SessionRegistry>,
    router: Router,
    presence: PresenceBroadcaster,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let router = Router::new(registry.clone());
        let presence = PresenceBroadcaster::new(registry.clone());

        Self {
            config,
            registry,
            router,
            presence,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Create an outbound queue sized per the hub config. The adapter keeps
    /// the receiver and hands the sender to [`Hub::connect`].
    pub fn channel(&self) -> (mpsc::Sender<ServerMessage>, mpsc::Receiver<ServerMessage>) {
        mpsc::channel(self.config.queue_capacity)
    }

    /// Called once per accepted connection. Registers the session, greets
    /// it, and pushes fresh rosters to everyone.
    pub fn connect(
        &self,
        id: SessionId,
        tx: mpsc::Sender<ServerMessage>,
    ) -> Result<Arc<Session>, RegistryError> {
        let session = self.registry.add(id, tx).map_err(|e| {
            error!(session_id = %id, error = %e, "transport adapter bug");
            e
        })?;

        info!(session_id = %id, sessions = self.registry.len(), "session connected");

        session.send(ServerMessage::Notice {
            header: "connected".to_string(),
            values: Values::List(vec![
                Scalar::Text(self.config.name.clone()),
                Scalar::Text(self.config.version.clone()),
            ]),
        });
        self.presence.broadcast();

        Ok(session)
    }

    /// Called exactly once when the transport reports closure. Idempotent:
    /// rosters are only rebroadcast if a session was actually removed.
    pub fn disconnect(&self, id: SessionId) {
        if let Some(session) = self.registry.remove(id) {
            info!(
                session_id = %id,
                username = %session.username(),
                sessions = self.registry.len(),
                "session disconnected"
            );
            self.presence.broadcast();
        }
    }

    /// Called for every decoded inbound message.
    pub fn handle(&self, id: SessionId, msg: ClientMessage) {
        let Some(session) = self.registry.get(id) else {
            warn!(session_id = %id, "message from unregistered session");
            return;
        };

        match msg {
            ClientMessage::Control { .. } | ClientMessage::Event { .. } | ClientMessage::Chat { .. } => {
                if let Some(envelope) = msg.into_envelope() {
                    self.router.dispatch(&session, envelope);
                }
            }
            ClientMessage::Username { username } => match self.registry.rename(id, &username) {
                Ok(accepted) => {
                    info!(session_id = %id, username = %accepted, "session renamed");
                    self.presence.ack_rename(&session, &accepted);
                    self.presence.broadcast();
                }
                Err(e) => warn!(session_id = %id, error = %e, "rename failed"),
            },
            // Stateless echo back to the same session; no server clock
            ClientMessage::Ping { start } => {
                session.send(ServerMessage::Pong { start });
            }
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}
