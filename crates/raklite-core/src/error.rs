//! Error types shared across all layers.
//!
//! Per-packet failures (truncated datagrams, unknown opcodes) are recovered
//! where they occur and logged; only peer-wide and endpoint-wide failures
//! reach the application.

use std::{io, net::SocketAddr};

use thiserror::Error;

/// Convenience result alias over [`ErrorKind`].
pub type Result<T> = std::result::Result<T, ErrorKind>;

/// Errors that can occur within the protocol or host.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Failure at the socket layer, fatal at bind time.
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    /// The requested local address is already bound.
    #[error("address already in use: {0}")]
    AddressInUse(io::Error),
    /// The payload does not fit a single datagram and fragmentation is out
    /// of scope.
    #[error("payload of {size} bytes exceeds the {max} byte datagram limit")]
    PayloadTooLarge {
        /// Size of the rejected payload.
        size: usize,
        /// Largest payload a single datagram carries.
        max: usize,
    },
    /// A protocol feature the implementation deliberately omits.
    #[error("not supported: {0}")]
    NotSupported(&'static str),
    /// Attempted to talk to an address without an established peer.
    #[error("not connected to {0}")]
    NotConnected(SocketAddr),
    /// The ordering channel does not fit the 5-bit wire field.
    #[error("ordering channel {0} is outside the configured range")]
    InvalidOrderingChannel(u8),
    /// An incoming value could not be decoded.
    #[error("could not decode {0}")]
    Decoding(DecodingErrorKind),
    /// Bit-level read or write failed.
    #[error(transparent)]
    BitStream(#[from] BitStreamError),
}

/// The wire field that failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodingErrorKind {
    /// The 3-bit reliability field held an unknown value.
    #[error("reliability flag")]
    Reliability,
    /// The one-byte message identifier was not in the canonical table.
    #[error("message identifier")]
    MessageId,
    /// An offline datagram did not start with the offline message id.
    #[error("offline message magic")]
    OfflineMagic,
    /// The acknowledgment range list was malformed.
    #[error("acknowledgment ranges")]
    AckRanges,
}

/// Cursor violations raised by the bit-level serialization buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BitStreamError {
    /// A read ran past the end of the buffer.
    #[error("bitstream underflow: needed {needed} bits but only {remaining} remain")]
    Underflow {
        /// Bits the read required.
        needed: usize,
        /// Bits left in the buffer.
        remaining: usize,
    },
    /// A value does not fit the requested bit width.
    #[error("bitstream overflow: value {value} does not fit in {width} bits")]
    Overflow {
        /// The value that was written.
        value: u64,
        /// The requested field width.
        width: usize,
    },
}
