#![warn(missing_docs)]

//! raklite-core: foundational types and utilities.
//!
//! This crate provides the minimal set of core utilities shared across all
//! layers:
//! - Configuration types
//! - Error handling
//! - Protocol constants
//! - Transport and interceptor traits
//!
//! Protocol-specific logic lives in the specialized crates:
//! - `raklite-protocol`: bit-level framing, message identifiers, ACK ranges
//! - `raklite-peer`: per-peer reliability and connection state
//! - `raklite-host`: socket handling, session management, public API

/// Protocol constants shared across layers.
pub mod constants {
    /// Maximum on-wire datagram size handled by RakNet 3.25 (Ethernet MTU).
    pub const MTU_SIZE: usize = 1492;
    /// IP + UDP header overhead subtracted from the MTU.
    pub const UDP_HEADER_SIZE: usize = 28;
    /// Worst-case datagram header: is_ack bit, has_time bit, padding to the
    /// byte boundary, then an aligned u32 timestamp.
    pub const DATAGRAM_HEADER_SIZE: usize = 5;
    /// Worst-case encapsulated packet header: reliability + ordering channel
    /// (1 byte), aligned u32 ordering index, aligned u32 message number,
    /// aligned u16 bit-length.
    pub const PACKET_HEADER_SIZE: usize = 11;
    /// Number of ordering channels per peer. The wire field is 5 bits.
    pub const ORDERING_CHANNEL_COUNT: u8 = 32;
    /// The fixed identifier prefixing every offline (pre-connection) message.
    pub const OFFLINE_MESSAGE_ID: [u8; 16] = [
        0x00, 0xff, 0xff, 0x00, 0xfe, 0xfe, 0xfe, 0xfe, 0xfd, 0xfd, 0xfd, 0xfd, 0x12, 0x34, 0x56,
        0x78,
    ];

    /// Largest user payload that fits a single datagram. Larger sends are
    /// rejected rather than fragmented.
    pub const fn max_user_payload() -> usize {
        MTU_SIZE - UDP_HEADER_SIZE - DATAGRAM_HEADER_SIZE - PACKET_HEADER_SIZE
    }
}

/// Configuration options for the protocol and host.
pub mod config;
/// Error types and results.
pub mod error;
/// Datagram interception for link conditioning and capture.
pub mod interceptor;
/// Transport abstraction for pluggable I/O.
pub mod transport;
