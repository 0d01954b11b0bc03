//! Event and action types for the host layer.
//!
//! This module defines the types used for communication between the peer
//! layer and the user:
//! - `Action`: instructions from peers to the host (send bytes or emit events)
//! - `SocketEvent`: events emitted to the user (packets, connections, disconnections)
//! - `Command`: user requests marshaled onto the poll loop

use std::net::SocketAddr;

use raklite_peer::DisconnectReason;
use raklite_protocol::Reliability;

/// Actions that peers can request from the host.
#[derive(Debug)]
pub enum Action<E> {
    /// Send the given bytes to the peer's remote address.
    Send(Vec<u8>),
    /// Emit an event to the user.
    Emit(E),
}

/// Events pushed through the event receiver, invoked on the loop thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A peer completed the connection handshake.
    Connected(SocketAddr),
    /// A user payload arrived, deduplicated and in channel order.
    Packet {
        /// Sender of the payload.
        address: SocketAddr,
        /// The payload bytes.
        payload: Vec<u8>,
    },
    /// A peer went away; emitted exactly once per connection.
    Disconnected(SocketAddr, DisconnectReason),
}

/// User requests marshaled onto the poll loop over the command channel.
#[derive(Debug, Clone)]
pub enum Command {
    /// Start the offline handshake towards a server.
    Connect {
        /// Server to connect to.
        address: SocketAddr,
        /// Password presented in the connection request.
        password: Vec<u8>,
    },
    /// Enqueue one message to a connected peer.
    Send {
        /// Destination peer.
        address: SocketAddr,
        /// Payload bytes (first byte is the application opcode).
        payload: Vec<u8>,
        /// Delivery class.
        reliability: Reliability,
        /// Ordering channel (0..32).
        channel: u8,
    },
    /// Close the connection to one peer.
    Disconnect {
        /// Peer to drop.
        address: SocketAddr,
    },
}

/// Returns the address an event or command belongs to.
pub trait SessionEventAddress {
    /// Returns the event address.
    fn address(&self) -> SocketAddr;
}

impl SessionEventAddress for SocketEvent {
    fn address(&self) -> SocketAddr {
        match self {
            SocketEvent::Connected(addr) => *addr,
            SocketEvent::Packet { address, .. } => *address,
            SocketEvent::Disconnected(addr, _) => *addr,
        }
    }
}

impl SessionEventAddress for Command {
    fn address(&self) -> SocketAddr {
        match self {
            Command::Connect { address, .. } => *address,
            Command::Send { address, .. } => *address,
            Command::Disconnect { address } => *address,
        }
    }
}
