//! Message envelopes and the JSON wire protocol
//!
//! Every routed message is an envelope of one of three kinds: `control`,
//! `event`, or `chat`. Control and event carry a sender-defined `header`
//! naming the channel plus opaque `values`; chat carries text. The hub never
//! interprets `values` — they pass through verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel target addressing every connected session.
pub const TARGET_ALL: &str = "all";

/// The only delivery mode defined today. `mode` is forwarded opaquely so
/// future modes don't require a schema break; anything unrecognized behaves
/// as push because routing never branches on it.
pub const MODE_PUSH: &str = "push";

/// The three envelope kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Control,
    Event,
    Chat,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Control => write!(f, "control"),
            Kind::Event => write!(f, "event"),
            Kind::Chat => write!(f, "chat"),
        }
    }
}

/// A single payload value.
///
/// Order matters for deserialization: integers must be tried before floats
/// so that `80` stays an `Int` and `80.5` becomes a `Float`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Envelope payload: absent, a single scalar, or an ordered list of scalars.
///
/// Never an object — a JSON object in the `values` position fails to
/// deserialize, which drops the whole frame as malformed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Values {
    /// Absent or `null`.
    #[default]
    None,
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl Values {
    pub fn is_none(&self) -> bool {
        matches!(self, Values::None)
    }
}

/// The unit of routed communication. Immutable once dispatched; the router
/// only re-stamps sender identity on chat, never `header` or `values`.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub kind: Kind,
    /// Channel name; required for control/event, absent for chat.
    pub header: Option<String>,
    pub values: Values,
    /// `"all"` or a session id/username string.
    pub target: String,
    pub mode: String,
}

impl Envelope {
    pub fn control(header: Option<String>, values: Values, target: String, mode: String) -> Self {
        Self {
            kind: Kind::Control,
            header,
            values,
            target,
            mode,
        }
    }

    pub fn event(header: Option<String>, values: Values, target: String, mode: String) -> Self {
        Self {
            kind: Kind::Event,
            header,
            values,
            target,
            mode,
        }
    }

    pub fn chat(text: String, target: String) -> Self {
        Self {
            kind: Kind::Chat,
            header: None,
            values: Values::Scalar(Scalar::Text(text)),
            target,
            mode: MODE_PUSH.to_string(),
        }
    }

    /// Chat text, if this is a chat envelope carrying text.
    pub fn chat_text(&self) -> Option<&str> {
        match &self.values {
            Values::Scalar(Scalar::Text(s)) => Some(s),
            _ => None,
        }
    }
}

fn default_target() -> String {
    TARGET_ALL.to_string()
}

fn default_mode() -> String {
    MODE_PUSH.to_string()
}

/// Messages from client to hub
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Continuous-control envelope (faders, XY pads, sensors)
    Control {
        #[serde(default)]
        header: Option<String>,
        #[serde(default)]
        values: Values,
        #[serde(default = "default_target")]
        target: String,
        #[serde(default = "default_mode")]
        mode: String,
    },
    /// Discrete trigger envelope (buttons, cues)
    Event {
        #[serde(default)]
        header: Option<String>,
        #[serde(default)]
        values: Values,
        #[serde(default = "default_target")]
        target: String,
        #[serde(default = "default_mode")]
        mode: String,
    },
    /// Chat text for a target
    Chat {
        chat: String,
        #[serde(default = "default_target")]
        target: String,
    },
    /// Rename request for this session
    Username { username: String },
    /// Latency probe; `start` is an opaque client timestamp
    Ping { start: serde_json::Value },
}

impl ClientMessage {
    /// Convert an inbound message into an envelope, if it is one of the
    /// three routed kinds. Username/ping are lifecycle messages, not
    /// envelopes.
    pub fn into_envelope(self) -> Option<Envelope> {
        match self {
            ClientMessage::Control {
                header,
                values,
                target,
                mode,
            } => Some(Envelope::control(header, values, target, mode)),
            ClientMessage::Event {
                header,
                values,
                target,
                mode,
            } => Some(Envelope::event(header, values, target, mode)),
            ClientMessage::Chat { chat, target } => Some(Envelope::chat(chat, target)),
            ClientMessage::Username { .. } | ClientMessage::Ping { .. } => None,
        }
    }
}

/// Messages from hub to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Forwarded control envelope, unchanged
    Control {
        header: String,
        values: Values,
        target: String,
        mode: String,
    },
    /// Forwarded event envelope, unchanged
    Event {
        header: String,
        values: Values,
        target: String,
        mode: String,
    },
    /// Chat stamped with the sender's session id
    Chat { id: String, chat: String },
    /// Private ack carrying the accepted username after a rename
    Username { username: String },
    /// Full roster, insertion order
    AllUsers { usernames: Vec<String> },
    /// Roster minus the receiving session
    OtherUsers { usernames: Vec<String> },
    /// Probe echo; `start` is returned untouched
    Pong { start: serde_json::Value },
    /// Informational notice (e.g. connect greeting)
    #[serde(rename = "server_message")]
    Notice { header: String, values: Values },
}
