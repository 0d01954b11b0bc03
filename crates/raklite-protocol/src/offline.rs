//! Offline (pre-connection) message codec.
//!
//! Before a peer is connected, the handshake travels in raw datagrams with
//! no reliability framing: the fixed 16-byte offline message id, the opcode,
//! and a protocol byte. Anything not starting with the magic belongs to the
//! reliability layer.

use raklite_core::{
    constants::OFFLINE_MESSAGE_ID,
    error::{DecodingErrorKind, ErrorKind},
};

use crate::message_id::MessageId;

/// RakNet 3.25 speaks protocol revision zero in the offline handshake.
const OFFLINE_PROTOCOL_VERSION: u8 = 0;

/// The handshake messages exchanged before a peer is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineMessage {
    /// A client asks the server to admit it.
    OpenConnectionRequest {
        /// Offline protocol revision; this implementation only knows 0.
        protocol_version: u8,
    },
    /// The server admitted the client.
    OpenConnectionReply,
    /// The server's connection table is full.
    NoFreeIncomingConnections,
}

impl OfflineMessage {
    /// True when a raw datagram is an offline message (magic prefix).
    pub fn is_offline_datagram(data: &[u8]) -> bool {
        data.len() > OFFLINE_MESSAGE_ID.len() && data[..OFFLINE_MESSAGE_ID.len()] == OFFLINE_MESSAGE_ID
    }

    /// Serializes the message: magic, opcode, protocol byte.
    pub fn encode(&self) -> Vec<u8> {
        let (opcode, version) = match self {
            OfflineMessage::OpenConnectionRequest { protocol_version } => {
                (MessageId::OpenConnectionRequest, *protocol_version)
            }
            OfflineMessage::OpenConnectionReply => {
                (MessageId::OpenConnectionReply, OFFLINE_PROTOCOL_VERSION)
            }
            OfflineMessage::NoFreeIncomingConnections => {
                (MessageId::NoFreeIncomingConnections, OFFLINE_PROTOCOL_VERSION)
            }
        };
        let mut out = Vec::with_capacity(OFFLINE_MESSAGE_ID.len() + 2);
        out.extend_from_slice(&OFFLINE_MESSAGE_ID);
        out.push(opcode as u8);
        out.push(version);
        out
    }

    /// Parses an offline datagram. Fails on a missing magic or an opcode
    /// that is not part of the offline exchange.
    pub fn decode(data: &[u8]) -> Result<Self, ErrorKind> {
        if !Self::is_offline_datagram(data) {
            return Err(ErrorKind::Decoding(DecodingErrorKind::OfflineMagic));
        }
        let body = &data[OFFLINE_MESSAGE_ID.len()..];
        let opcode = body[0];
        match MessageId::try_from(opcode)? {
            MessageId::OpenConnectionRequest => Ok(OfflineMessage::OpenConnectionRequest {
                protocol_version: body.get(1).copied().unwrap_or(OFFLINE_PROTOCOL_VERSION),
            }),
            MessageId::OpenConnectionReply => Ok(OfflineMessage::OpenConnectionReply),
            MessageId::NoFreeIncomingConnections => Ok(OfflineMessage::NoFreeIncomingConnections),
            _ => Err(ErrorKind::Decoding(DecodingErrorKind::MessageId)),
        }
    }

    /// Creates the standard connection request.
    pub fn request() -> Self {
        OfflineMessage::OpenConnectionRequest { protocol_version: OFFLINE_PROTOCOL_VERSION }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trip() {
        let bytes = OfflineMessage::request().encode();
        assert!(OfflineMessage::is_offline_datagram(&bytes));
        assert_eq!(
            OfflineMessage::decode(&bytes).unwrap(),
            OfflineMessage::OpenConnectionRequest { protocol_version: 0 }
        );
    }

    #[test]
    fn reply_round_trip() {
        let bytes = OfflineMessage::OpenConnectionReply.encode();
        assert_eq!(OfflineMessage::decode(&bytes).unwrap(), OfflineMessage::OpenConnectionReply);
    }

    #[test]
    fn magic_is_the_published_sixteen_bytes() {
        let bytes = OfflineMessage::request().encode();
        assert_eq!(
            &bytes[..16],
            &[0x00, 0xff, 0xff, 0x00, 0xfe, 0xfe, 0xfe, 0xfe, 0xfd, 0xfd, 0xfd, 0xfd, 0x12, 0x34,
                0x56, 0x78]
        );
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut bytes = OfflineMessage::request().encode();
        bytes[0] ^= 0xff;
        assert!(!OfflineMessage::is_offline_datagram(&bytes));
        assert!(matches!(
            OfflineMessage::decode(&bytes),
            Err(ErrorKind::Decoding(DecodingErrorKind::OfflineMagic))
        ));
    }

    #[test]
    fn rejects_connected_opcodes() {
        let mut bytes = OfflineMessage::request().encode();
        bytes[16] = MessageId::ConnectionRequest as u8;
        assert!(OfflineMessage::decode(&bytes).is_err());
    }

    #[test]
    fn reliability_framed_datagrams_are_not_offline() {
        assert!(!OfflineMessage::is_offline_datagram(&[0x00, 0x12, 0x34]));
        assert!(!OfflineMessage::is_offline_datagram(&[]));
    }
}
