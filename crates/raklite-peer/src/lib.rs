#![warn(missing_docs)]

//! raklite-peer: the per-peer reliability engine.
//!
//! One [`ReliabilityLayer`] per remote address turns `send(payload,
//! reliability, channel)` calls into encapsulated packets, coalesces them
//! into datagrams on each tick, retransmits unacknowledged reliable packets,
//! and reassembles the inbound stream into deduplicated, per-channel-ordered
//! application messages. [`RakPeer`] wraps it with the connection handshake
//! and the internal message handlers (ping/pong, disconnection).

/// Per-channel ordering and sequencing state.
pub mod channel;
/// Sliding received-set for reliable message deduplication.
pub mod dedup;
/// Connection state machine and internal message handling.
pub mod peer;
/// The send/receive reliability engine.
pub mod reliability_layer;
/// Smoothed round-trip estimation and retransmission timeout.
pub mod rto;

pub use peer::{ConnectionState, DisconnectReason, PeerEvent, RakPeer};
pub use reliability_layer::{ReliabilityLayer, TickOutput};
