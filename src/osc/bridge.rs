//! OSC UDP bridge runtime
//!
//! Connects to a hub as an ordinary WebSocket client and shuttles messages
//! between a UDP/OSC port pair and the hub: inbound OSC packets become
//! envelopes, hub pushes with an OSC shape go back out as OSC messages.

use super::{inbound, outbound};
use crate::envelope::{ClientMessage, ServerMessage};
use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use rosc::{decoder, encoder, OscPacket};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Configuration for a bridge instance.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Hub WebSocket URL, e.g. `ws://127.0.0.1:3000/hub`
    pub hub_url: String,
    /// Display name the bridge registers under
    pub username: String,
    /// Local UDP port to receive OSC on
    pub osc_in: u16,
    /// UDP port OSC output is sent to
    pub osc_out: u16,
    /// Host OSC output is sent to
    pub osc_host: String,
    /// Initial delay before reconnecting to the hub
    pub reconnect_delay: Duration,
    /// Maximum delay between reconnection attempts
    pub max_reconnect_delay: Duration,
}

impl BridgeConfig {
    pub fn new(hub_url: impl Into<String>) -> Self {
        Self {
            hub_url: hub_url.into(),
            username: "osc-bridge".to_string(),
            osc_in: 57120,
            osc_out: 57121,
            osc_host: "127.0.0.1".to_string(),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

/// The UDP/OSC ↔ hub bridge.
pub struct OscBridge {
    config: BridgeConfig,
}

impl OscBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Run the bridge until the process is stopped. The hub connection is
    /// re-established with doubling backoff; the UDP socket stays bound for
    /// the bridge's lifetime.
    pub async fn run(&self) -> Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", self.config.osc_in))
            .await
            .with_context(|| format!("Failed to bind OSC port {}", self.config.osc_in))?;

        let target = tokio::net::lookup_host((self.config.osc_host.as_str(), self.config.osc_out))
            .await
            .context("Failed to resolve OSC target host")?
            .next()
            .context("OSC target host resolved to no addresses")?;

        info!(port = self.config.osc_in, "OSC listening");
        info!(target = %target, "OSC target");

        let mut delay = self.config.reconnect_delay;
        loop {
            let started = Instant::now();
            match self.session(&socket, target).await {
                Ok(()) => info!("hub connection closed"),
                Err(e) => warn!(error = %e, "hub connection failed"),
            }

            // A session that held for a while earns a fresh backoff
            if started.elapsed() > self.config.max_reconnect_delay {
                delay = self.config.reconnect_delay;
            }

            info!(delay_ms = delay.as_millis() as u64, "reconnecting to hub");
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.config.max_reconnect_delay);
        }
    }

    /// One hub connection: runs until the socket closes or errors.
    async fn session(&self, socket: &UdpSocket, target: SocketAddr) -> Result<()> {
        let url = format!("{}?username={}", self.config.hub_url, self.config.username);
        let (ws, _) = connect_async(url).await.context("Failed to connect to hub")?;
        info!(url = %self.config.hub_url, "connected to hub");

        let (mut sink, mut stream) = ws.split();
        let mut buf = vec![0u8; 65536];

        loop {
            tokio::select! {
                recv = socket.recv_from(&mut buf) => {
                    let (n, from) = match recv {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(error = %e, "UDP receive error");
                            continue;
                        }
                    };
                    match decoder::decode_udp(&buf[..n]) {
                        Ok((_, packet)) => {
                            let mut messages = Vec::new();
                            collect_messages(packet, &mut messages);
                            for msg in messages {
                                let text = serde_json::to_string(&msg)?;
                                sink.send(Message::Text(text))
                                    .await
                                    .context("Failed to send to hub")?;
                            }
                        }
                        Err(e) => debug!(from = %from, error = %e, "undecodable OSC packet"),
                    }
                }
                frame = stream.next() => {
                    let Some(frame) = frame else {
                        return Ok(());
                    };
                    match frame.context("hub stream error")? {
                        Message::Text(text) => {
                            if let Ok(msg) = serde_json::from_str::<ServerMessage>(&text) {
                                if let Some(osc_msg) = outbound(&msg) {
                                    let bytes = encoder::encode(&OscPacket::Message(osc_msg))
                                        .context("Failed to encode OSC message")?;
                                    if let Err(e) = socket.send_to(&bytes, target).await {
                                        warn!(error = %e, "UDP send error");
                                    }
                                }
                            }
                        }
                        Message::Close(_) => return Ok(()),
                        _ => {}
                    }
                }
            }
        }
    }
}

/// Flatten a packet into client messages, recursing into bundles. Packets
/// that don't map to an envelope are skipped.
fn collect_messages(packet: OscPacket, out: &mut Vec<ClientMessage>) {
    match packet {
        OscPacket::Message(msg) => {
            if let Some(m) = inbound(msg) {
                out.push(m);
            }
        }
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                collect_messages(inner, out);
            }
        }
    }
}
