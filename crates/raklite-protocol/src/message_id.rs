//! The protocol's fixed one-byte opcodes.
//!
//! Values mirror the RakNet 3.25 canonical table. Opcodes below
//! [`MessageId::UserMessage`] are consumed by the transport itself;
//! everything at or above it belongs to the application.

use raklite_core::error::{DecodingErrorKind, ErrorKind};

/// One-byte message identifiers leading every connected-mode packet and
/// every offline message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    /// Keepalive probe carrying the sender's 32-bit local time.
    InternalPing = 0x00,
    /// Answer to a ping: the echoed time plus the responder's local time.
    ConnectedPong = 0x03,
    /// Offline: asks the server to admit a new peer.
    OpenConnectionRequest = 0x09,
    /// Offline: the server admitted the peer.
    OpenConnectionReply = 0x0a,
    /// The remote side is closing the connection.
    DisconnectionNotification = 0x13,
    /// The remote side detected the connection as dead.
    ConnectionLost = 0x14,
    /// Reliable, first connected-mode packet: carries the password.
    ConnectionRequest = 0x1d,
    /// The password was wrong; the peer is being dropped.
    ConnectionRequestRefused = 0x1e,
    /// Handshake complete: echoes the client's external address.
    ConnectionRequestAccepted = 0x22,
    /// Client's final handshake packet after acceptance.
    NewIncomingConnection = 0x23,
    /// Offline: the server's connection table is full.
    NoFreeIncomingConnections = 0x24,
    /// First identifier available to the application.
    UserMessage = 0x50,
}

impl MessageId {
    /// Returns the opcode of a packet, if it has at least one byte.
    pub fn of(payload: &[u8]) -> Option<u8> {
        payload.first().copied()
    }

    /// True when the opcode is handled by the transport rather than
    /// delivered to the application.
    pub fn is_internal(opcode: u8) -> bool {
        opcode < MessageId::UserMessage as u8
    }
}

impl TryFrom<u8> for MessageId {
    type Error = ErrorKind;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(MessageId::InternalPing),
            0x03 => Ok(MessageId::ConnectedPong),
            0x09 => Ok(MessageId::OpenConnectionRequest),
            0x0a => Ok(MessageId::OpenConnectionReply),
            0x13 => Ok(MessageId::DisconnectionNotification),
            0x14 => Ok(MessageId::ConnectionLost),
            0x1d => Ok(MessageId::ConnectionRequest),
            0x1e => Ok(MessageId::ConnectionRequestRefused),
            0x22 => Ok(MessageId::ConnectionRequestAccepted),
            0x23 => Ok(MessageId::NewIncomingConnection),
            0x24 => Ok(MessageId::NoFreeIncomingConnections),
            0x50 => Ok(MessageId::UserMessage),
            _ => Err(ErrorKind::Decoding(DecodingErrorKind::MessageId)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn published_values_are_stable() {
        assert_eq!(MessageId::InternalPing as u8, 0x00);
        assert_eq!(MessageId::DisconnectionNotification as u8, 0x13);
        assert_eq!(MessageId::ConnectionRequest as u8, 0x1d);
        assert_eq!(MessageId::ConnectionRequestAccepted as u8, 0x22);
    }

    #[test]
    fn internal_range_ends_at_user_base() {
        assert!(MessageId::is_internal(0x00));
        assert!(MessageId::is_internal(0x4f));
        assert!(!MessageId::is_internal(0x50));
        assert!(!MessageId::is_internal(0xff));
    }

    #[test]
    fn round_trip_known_opcodes() {
        for id in [
            MessageId::InternalPing,
            MessageId::ConnectedPong,
            MessageId::OpenConnectionRequest,
            MessageId::OpenConnectionReply,
            MessageId::DisconnectionNotification,
            MessageId::ConnectionLost,
            MessageId::ConnectionRequest,
            MessageId::ConnectionRequestRefused,
            MessageId::ConnectionRequestAccepted,
            MessageId::NewIncomingConnection,
            MessageId::NoFreeIncomingConnections,
        ] {
            assert_eq!(MessageId::try_from(id as u8).unwrap(), id);
        }
        assert!(MessageId::try_from(0x42).is_err());
    }
}
