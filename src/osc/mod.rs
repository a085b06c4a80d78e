//! OSC ↔ envelope transcoding
//!
//! Address paths take the form `/target?/type/header?`:
//! - `/control/bright`, `/event/go`, `/chat` — target defaults to `all`
//! - `/alice/control/bright` — explicit target first
//!
//! The transcoder is an external client of the hub: anything it cannot map
//! to a well-formed envelope is dropped, never errored loudly.

pub mod bridge;

use crate::envelope::{ClientMessage, Kind, Scalar, ServerMessage, Values, MODE_PUSH, TARGET_ALL};
use rosc::{OscMessage, OscType};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must start with '/'")]
    NotAbsolute,

    #[error("empty address")]
    Empty,

    #[error("missing message type segment")]
    MissingType,

    #[error("unknown message type '{0}': expected control, event, or chat")]
    UnknownType(String),
}

/// Parsed form of an OSC address path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub target: String,
    pub kind: Kind,
    pub header: Option<String>,
}

impl Address {
    pub fn parse(address: &str) -> Result<Self, AddressError> {
        if !address.starts_with('/') {
            return Err(AddressError::NotAbsolute);
        }

        let parts: Vec<&str> = address.split('/').filter(|p| !p.is_empty()).collect();
        if parts.is_empty() {
            return Err(AddressError::Empty);
        }

        if let Some(kind) = kind_of(parts[0]) {
            // /<type>/<header?>
            Ok(Self {
                target: TARGET_ALL.to_string(),
                kind,
                header: parts.get(1).map(|s| s.to_string()),
            })
        } else {
            // /<target>/<type>/<header?>
            let type_part = parts.get(1).ok_or(AddressError::MissingType)?;
            let kind = kind_of(type_part)
                .ok_or_else(|| AddressError::UnknownType(type_part.to_string()))?;
            Ok(Self {
                target: parts[0].to_string(),
                kind,
                header: parts.get(2).map(|s| s.to_string()),
            })
        }
    }
}

fn kind_of(segment: &str) -> Option<Kind> {
    match segment {
        "control" => Some(Kind::Control),
        "event" => Some(Kind::Event),
        "chat" => Some(Kind::Chat),
        _ => None,
    }
}

fn scalar_from_osc(arg: OscType) -> Option<Scalar> {
    match arg {
        OscType::Int(i) => Some(Scalar::Int(i as i64)),
        OscType::Long(i) => Some(Scalar::Int(i)),
        OscType::Float(f) => Some(Scalar::Float(f as f64)),
        OscType::Double(f) => Some(Scalar::Float(f)),
        OscType::String(s) => Some(Scalar::Text(s)),
        OscType::Bool(b) => Some(Scalar::Bool(b)),
        OscType::Char(c) => Some(Scalar::Text(c.to_string())),
        // Blobs, colors, midi etc. have no envelope representation
        _ => None,
    }
}

fn scalar_to_osc(scalar: &Scalar) -> OscType {
    match scalar {
        Scalar::Bool(b) => OscType::Bool(*b),
        Scalar::Int(i) => match i32::try_from(*i) {
            Ok(v) => OscType::Int(v),
            Err(_) => OscType::Long(*i),
        },
        Scalar::Float(f) => OscType::Float(*f as f32),
        Scalar::Text(s) => OscType::String(s.clone()),
    }
}

/// Collapse OSC args the way envelope values are shaped: zero args is
/// absent, one is a scalar, several are an ordered list.
fn values_from_args(args: Vec<OscType>) -> Values {
    let mut scalars: Vec<Scalar> = args.into_iter().filter_map(scalar_from_osc).collect();
    match scalars.len() {
        0 => Values::None,
        1 => Values::Scalar(scalars.remove(0)),
        _ => Values::List(scalars),
    }
}

fn values_to_args(values: &Values) -> Vec<OscType> {
    match values {
        Values::None => vec![],
        Values::Scalar(s) => vec![scalar_to_osc(s)],
        Values::List(list) => list.iter().map(scalar_to_osc).collect(),
    }
}

/// Map an inbound OSC message to a hub client message.
///
/// Returns `None` for anything malformed: unparseable addresses, control or
/// event without a header, chat with no text.
pub fn inbound(msg: OscMessage) -> Option<ClientMessage> {
    let address = Address::parse(&msg.addr).ok()?;

    match address.kind {
        Kind::Control | Kind::Event => {
            let header = address.header?;
            let values = values_from_args(msg.args);
            Some(match address.kind {
                Kind::Control => ClientMessage::Control {
                    header: Some(header),
                    values,
                    target: address.target,
                    mode: MODE_PUSH.to_string(),
                },
                _ => ClientMessage::Event {
                    header: Some(header),
                    values,
                    target: address.target,
                    mode: MODE_PUSH.to_string(),
                },
            })
        }
        Kind::Chat => {
            let text = msg
                .args
                .into_iter()
                .filter_map(scalar_from_osc)
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            if text.is_empty() {
                return None;
            }
            Some(ClientMessage::Chat {
                chat: text,
                target: address.target,
            })
        }
    }
}

/// Map a hub push to an OSC message for the rig, if it has an OSC shape.
///
/// Rosters, rename acks, pongs, and notices stay on the hub side.
pub fn outbound(msg: &ServerMessage) -> Option<OscMessage> {
    match msg {
        ServerMessage::Control { header, values, .. } => Some(OscMessage {
            addr: format!("/control/{}", header),
            args: values_to_args(values),
        }),
        ServerMessage::Event { header, values, .. } => Some(OscMessage {
            addr: format!("/event/{}", header),
            args: values_to_args(values),
        }),
        ServerMessage::Chat { id, chat } => Some(OscMessage {
            addr: format!("/chat/{}", id),
            args: vec![OscType::String(chat.clone())],
        }),
        _ => None,
    }
}
