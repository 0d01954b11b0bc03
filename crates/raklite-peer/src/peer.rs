//! Connection state machine and internal message handling.
//!
//! [`RakPeer`] owns one [`ReliabilityLayer`] and layers the connection
//! lifecycle on top: the password exchange that upgrades an admitted peer to
//! connected, keepalive pings, disconnection notification, and the idle
//! timeout. Application payloads pass through untouched; opcodes below the
//! user range are consumed here.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Instant,
};

use raklite_core::{
    config::Config,
    error::{ErrorKind, Result},
};
use raklite_protocol::{BitStream, MessageId, Reliability};
use tracing::{debug, info, trace, warn};

use crate::reliability_layer::{build_message, ReliabilityLayer};

/// Lifecycle of one remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Client side: the offline request is out, no reply yet.
    Unconnected,
    /// Admitted by the offline handshake; the password exchange is pending.
    UnverifiedConnected,
    /// Fully connected; user packets flow.
    Connected,
    /// Closed; the peer is awaiting removal from the table.
    Disconnected,
}

/// Why a peer went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// No traffic or acknowledgment within the limits.
    Timeout,
    /// The remote side sent a disconnection notification.
    RemoteDisconnect,
    /// The remote side refused the connection request.
    Refused,
}

/// What a peer wants the host to surface to the application.
#[derive(Debug, PartialEq, Eq)]
pub enum PeerEvent {
    /// The handshake completed.
    Connected,
    /// A user payload arrived, deduplicated and in channel order.
    Packet(Vec<u8>),
    /// The peer is gone; emitted exactly once.
    Disconnected(DisconnectReason),
}

/// One remote peer: reliability engine plus connection lifecycle.
#[derive(Debug)]
pub struct RakPeer {
    remote_address: SocketAddr,
    local_address: SocketAddr,
    state: ConnectionState,
    reliability: ReliabilityLayer,
    /// Client side carries the password to present; None on the server side.
    outgoing_password: Option<Vec<u8>>,
    incoming_password: Vec<u8>,
    ping_interval: Option<std::time::Duration>,
    idle_timeout: std::time::Duration,
    last_heard: Instant,
    last_sent: Instant,
    /// Set once the peer should leave the table on the next reap pass.
    dead: bool,
    /// Set by `close`; removal happens after the notification flushes.
    remove_after_flush: bool,
}

impl RakPeer {
    /// Creates the server-side peer for a client admitted by the offline
    /// handshake.
    pub fn new_incoming(
        config: &Config,
        remote_address: SocketAddr,
        local_address: SocketAddr,
        now: Instant,
    ) -> Self {
        Self::new(config, remote_address, local_address, None, now, ConnectionState::UnverifiedConnected)
    }

    /// Creates the client-side peer for an outbound connection attempt.
    pub fn new_outgoing(
        config: &Config,
        remote_address: SocketAddr,
        local_address: SocketAddr,
        password: Vec<u8>,
        now: Instant,
    ) -> Self {
        Self::new(config, remote_address, local_address, Some(password), now, ConnectionState::Unconnected)
    }

    fn new(
        config: &Config,
        remote_address: SocketAddr,
        local_address: SocketAddr,
        outgoing_password: Option<Vec<u8>>,
        now: Instant,
        state: ConnectionState,
    ) -> Self {
        Self {
            remote_address,
            local_address,
            state,
            reliability: ReliabilityLayer::new(config, now),
            outgoing_password,
            incoming_password: config.incoming_password.clone(),
            ping_interval: config.ping_interval,
            idle_timeout: config.idle_connection_timeout,
            last_heard: now,
            last_sent: now,
            dead: false,
            remove_after_flush: false,
        }
    }

    /// The remote address this peer talks to.
    pub fn remote_address(&self) -> SocketAddr {
        self.remote_address
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True once the handshake completed.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Smoothed round-trip estimate for this peer.
    pub fn smoothed_rtt(&self) -> Option<std::time::Duration> {
        self.reliability.smoothed_rtt()
    }

    /// Enqueues a user payload. Only valid once connected.
    pub fn send_user(
        &mut self,
        payload: &[u8],
        reliability: Reliability,
        channel: u8,
        now: Instant,
    ) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(ErrorKind::NotConnected(self.remote_address));
        }
        self.reliability.send(payload, reliability, channel, now)
    }

    /// Client side: the server answered the offline request, so present the
    /// password in a reliable ConnectionRequest.
    pub fn on_offline_reply(&mut self, now: Instant) {
        if self.state != ConnectionState::Unconnected {
            return;
        }
        let password = self.outgoing_password.clone().unwrap_or_default();
        let request = build_message(MessageId::ConnectionRequest as u8, |stream| {
            stream.write_bytes(&password);
        });
        if let Err(err) = self.reliability.send(&request, Reliability::Reliable, 0, now) {
            warn!("failed to queue connection request: {}", err);
            return;
        }
        debug!(remote = %self.remote_address, "offline handshake accepted, requesting connection");
        self.state = ConnectionState::UnverifiedConnected;
    }

    /// Client side: the server has no free slots.
    pub fn on_offline_refusal(&mut self, events: &mut Vec<PeerEvent>) {
        if self.state == ConnectionState::Unconnected {
            self.state = ConnectionState::Disconnected;
            self.dead = true;
            events.push(PeerEvent::Disconnected(DisconnectReason::Refused));
        }
    }

    /// Decodes one reliability-framed datagram and reacts to everything
    /// internal; user payloads come back as events.
    pub fn process_datagram(&mut self, bytes: &[u8], now: Instant) -> Vec<PeerEvent> {
        self.last_heard = now;
        let mut events = Vec::new();
        let delivered = match self.reliability.handle_datagram(bytes, now) {
            Ok(delivered) => delivered,
            Err(err) => {
                // recovered locally: the datagram is dropped, the peer lives
                warn!(remote = %self.remote_address, "dropping undecodable datagram: {}", err);
                return events;
            }
        };
        for payload in delivered {
            self.handle_packet(payload, now, &mut events);
            if self.dead {
                break;
            }
        }
        events
    }

    fn handle_packet(&mut self, payload: Vec<u8>, now: Instant, events: &mut Vec<PeerEvent>) {
        let Some(opcode) = payload.first().copied() else {
            trace!("ignoring empty packet");
            return;
        };
        if !MessageId::is_internal(opcode) {
            if self.state == ConnectionState::Connected {
                events.push(PeerEvent::Packet(payload));
            } else {
                warn!(opcode, "dropping user packet from unconnected peer");
            }
            return;
        }
        match MessageId::try_from(opcode) {
            Ok(MessageId::InternalPing) => self.on_ping(&payload[1..], now),
            Ok(MessageId::ConnectedPong) => trace!("pong received"),
            Ok(MessageId::ConnectionRequest) => self.on_connection_request(&payload[1..], now, events),
            Ok(MessageId::ConnectionRequestAccepted) => self.on_connection_accepted(now, events),
            Ok(MessageId::ConnectionRequestRefused) => {
                info!(remote = %self.remote_address, "connection refused");
                self.state = ConnectionState::Disconnected;
                self.dead = true;
                events.push(PeerEvent::Disconnected(DisconnectReason::Refused));
            }
            Ok(MessageId::NewIncomingConnection) => {
                info!(remote = %self.remote_address, "new incoming connection");
            }
            Ok(MessageId::DisconnectionNotification) | Ok(MessageId::ConnectionLost) => {
                info!(remote = %self.remote_address, "remote disconnected");
                let was_connected = self.state == ConnectionState::Connected;
                self.state = ConnectionState::Disconnected;
                self.dead = true;
                if was_connected {
                    events.push(PeerEvent::Disconnected(DisconnectReason::RemoteDisconnect));
                }
            }
            Ok(_) | Err(_) => {
                // unknown or out-of-place opcode: drop the packet, keep the
                // rest of the datagram
                warn!(opcode, "no handler for internal opcode");
            }
        }
    }

    fn on_ping(&mut self, body: &[u8], now: Instant) {
        let mut stream = BitStream::from_bytes(body);
        let ping_time = match stream.read_u32() {
            Ok(time) => time,
            Err(err) => {
                warn!("malformed ping: {}", err);
                return;
            }
        };
        let local_time = self.reliability.local_time_ms(now);
        let pong = build_message(MessageId::ConnectedPong as u8, |stream| {
            stream.write_u32(ping_time);
            stream.write_u32(local_time);
        });
        if let Err(err) = self.reliability.send(&pong, Reliability::Unreliable, 0, now) {
            warn!("failed to queue pong: {}", err);
        }
    }

    fn on_connection_request(&mut self, password: &[u8], now: Instant, events: &mut Vec<PeerEvent>) {
        if self.state != ConnectionState::UnverifiedConnected {
            trace!("ignoring connection request in state {:?}", self.state);
            return;
        }
        if password != self.incoming_password.as_slice() {
            info!(remote = %self.remote_address, "refusing connection: wrong password");
            let refusal = build_message(MessageId::ConnectionRequestRefused as u8, |_| {});
            if let Err(err) = self.reliability.send(&refusal, Reliability::Unreliable, 0, now) {
                warn!("failed to queue refusal: {}", err);
            }
            self.remove_after_flush = true;
            return;
        }
        let remote = self.remote_address;
        let local = self.local_address;
        let accepted = build_message(MessageId::ConnectionRequestAccepted as u8, |stream| {
            write_address(stream, remote);
            stream.write_u16(0); // connection index, ignored by RakNet
            write_address(stream, local);
        });
        if let Err(err) = self.reliability.send(&accepted, Reliability::Reliable, 0, now) {
            warn!("failed to queue acceptance: {}", err);
            return;
        }
        info!(remote = %self.remote_address, "connection established");
        self.state = ConnectionState::Connected;
        events.push(PeerEvent::Connected);
    }

    fn on_connection_accepted(&mut self, now: Instant, events: &mut Vec<PeerEvent>) {
        if self.state != ConnectionState::UnverifiedConnected {
            trace!("ignoring acceptance in state {:?}", self.state);
            return;
        }
        let remote = self.remote_address;
        let local = self.local_address;
        let reply = build_message(MessageId::NewIncomingConnection as u8, |stream| {
            write_address(stream, remote);
            write_address(stream, local);
        });
        if let Err(err) = self.reliability.send(&reply, Reliability::Reliable, 0, now) {
            warn!("failed to queue new-incoming-connection: {}", err);
        }
        info!(remote = %self.remote_address, "connected");
        self.state = ConnectionState::Connected;
        events.push(PeerEvent::Connected);
    }

    /// Sends the disconnection notification and schedules removal once it
    /// has been put on the wire.
    pub fn close(&mut self, now: Instant) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        let notification = build_message(MessageId::DisconnectionNotification as u8, |_| {});
        if let Err(err) = self.reliability.send(&notification, Reliability::Reliable, 0, now) {
            warn!("failed to queue disconnection notification: {}", err);
        }
        self.state = ConnectionState::Disconnected;
        self.remove_after_flush = true;
    }

    /// Runs keepalive and the reliability tick; returns the datagrams to
    /// put on the wire plus any lifecycle events.
    pub fn update(&mut self, now: Instant) -> (Vec<Vec<u8>>, Vec<PeerEvent>) {
        let mut events = Vec::new();

        if self.state == ConnectionState::Connected {
            if let Some(interval) = self.ping_interval {
                if now.duration_since(self.last_sent) >= interval
                    && !self.reliability.has_queued_sends()
                {
                    let local_time = self.reliability.local_time_ms(now);
                    let ping = build_message(MessageId::InternalPing as u8, |stream| {
                        stream.write_u32(local_time);
                    });
                    if let Err(err) = self.reliability.send(&ping, Reliability::Reliable, 0, now) {
                        warn!("failed to queue keepalive ping: {}", err);
                    } else {
                        trace!(remote = %self.remote_address, "keepalive ping");
                    }
                }
            }
        }

        let output = self.reliability.tick(now);
        if output.connection_lost && !self.dead {
            info!(remote = %self.remote_address, "connection lost: resend limit exhausted");
            let was_connected = self.state == ConnectionState::Connected;
            self.state = ConnectionState::Disconnected;
            self.dead = true;
            if was_connected {
                events.push(PeerEvent::Disconnected(DisconnectReason::Timeout));
            }
        }
        if !output.datagrams.is_empty() {
            self.last_sent = now;
        }
        if self.remove_after_flush && !self.reliability.has_queued_sends() {
            // the notification (or refusal) has been handed to the wire
            self.dead = true;
        }
        (output.datagrams, events)
    }

    /// Whether the table should drop this peer now, with any final events.
    pub fn should_drop(&mut self, now: Instant) -> (bool, Vec<PeerEvent>) {
        if self.dead {
            return (true, Vec::new());
        }
        if now.duration_since(self.last_heard) >= self.idle_timeout {
            info!(remote = %self.remote_address, "peer idle for too long, reaping");
            let was_connected = self.state == ConnectionState::Connected;
            self.state = ConnectionState::Disconnected;
            self.dead = true;
            let mut events = Vec::new();
            if was_connected {
                events.push(PeerEvent::Disconnected(DisconnectReason::Timeout));
            }
            return (true, events);
        }
        (false, Vec::new())
    }
}

/// Writes an address as four IPv4 octets and a little-endian port, the way
/// the acceptance packet echoes endpoints.
fn write_address(stream: &mut BitStream, address: SocketAddr) {
    let octets = match address.ip() {
        IpAddr::V4(ip) => ip.octets(),
        IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED.octets(),
    };
    stream.write_bytes(&octets);
    stream.write_u16(address.port());
}
