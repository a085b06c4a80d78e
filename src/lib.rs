//! Stagelink - always-on message relay for live rigs
//!
//! A hub that lets browser widgets and an OSC UDP bridge exchange control,
//! event, and chat messages so that a sensor, a touchscreen, and a
//! sound/lighting program can all react to the same live state without
//! knowing about each other.

pub mod envelope;
pub mod hub;
pub mod osc;

pub use envelope::{ClientMessage, Envelope, Kind, Scalar, ServerMessage, Values};
pub use hub::{Hub, HubConfig, Session, SessionId, SessionRegistry};
