#![warn(missing_docs)]

//! raklite-protocol: bit-level framing and protocol vocabulary.
//!
//! Everything that touches the wire lives here: the bit-granular
//! serialization buffer, the canonical message identifier table, the 3-bit
//! reliability classes, the run-length-encoded acknowledgment list, the
//! encapsulated packet and datagram codecs, and the offline handshake
//! messages.

/// Run-length-encoded acknowledgment ranges.
pub mod acks;
/// Bit-granular serialization buffer.
pub mod bitstream;
/// Datagram and encapsulated packet codecs.
pub mod frame;
/// The protocol's fixed one-byte opcodes.
pub mod message_id;
/// Offline (pre-connection) message codec.
pub mod offline;
/// Reliability classes carried in the 3-bit frame header.
pub mod reliability;

pub use acks::AckRanges;
pub use bitstream::BitStream;
pub use frame::{Datagram, DatagramBuilder, EncapsulatedPacket};
pub use message_id::MessageId;
pub use offline::OfflineMessage;
pub use reliability::Reliability;
