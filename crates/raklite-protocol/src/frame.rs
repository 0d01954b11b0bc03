//! Datagram and encapsulated packet codecs.
//!
//! Every outgoing datagram is either an acknowledgment datagram (a single
//! `is_ack` bit followed by the RLE ack list) or a data datagram (the
//! `is_ack` bit cleared, a `has_remote_system_time` bit with an optional
//! aligned u32 timestamp, then one or more encapsulated packets).
//!
//! An encapsulated packet carries:
//! - reliability, 3 bits;
//! - if sequenced or ordered: the ordering channel (5 bits) and an aligned
//!   u32 ordering index;
//! - if anything above unreliable: an aligned u32 reliable message number;
//! - an aligned u16 payload length in bits, then the payload bytes.
//!
//! Headers and payloads pad to whole bytes, so packets coalesce into a
//! datagram by plain byte concatenation.

use raklite_core::{
    constants::{MTU_SIZE, UDP_HEADER_SIZE},
    error::ErrorKind,
};

use crate::{acks::AckRanges, bitstream::BitStream, reliability::Reliability};

/// One reliability-framed unit inside a datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncapsulatedPacket {
    /// Delivery class of this packet.
    pub reliability: Reliability,
    /// Ordering channel, present for sequenced and ordered classes.
    pub ordering_channel: Option<u8>,
    /// Per-channel ordering index, present for sequenced and ordered classes.
    pub ordering_index: Option<u32>,
    /// Reliable message number, present for everything above unreliable.
    pub message_number: Option<u32>,
    /// The application payload.
    pub payload: Vec<u8>,
}

impl EncapsulatedPacket {
    /// Serializes this packet onto a fresh stream and returns the bytes.
    /// The encoding starts at a byte boundary, so the result can be
    /// appended to a datagram verbatim.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ErrorKind> {
        let mut stream = BitStream::new();
        self.encode(&mut stream)?;
        Ok(stream.into_bytes())
    }

    /// Serializes this packet at the stream's current position.
    pub fn encode(&self, stream: &mut BitStream) -> Result<(), ErrorKind> {
        stream.write_bits(u32::from(self.reliability.to_bits()), 3)?;
        if self.reliability.is_sequenced_or_ordered() {
            stream.write_bits(u32::from(self.ordering_channel.unwrap_or(0)), 5)?;
            stream.align_write();
            stream.write_u32(self.ordering_index.unwrap_or(0));
        }
        if self.reliability.has_message_number() {
            stream.align_write();
            stream.write_u32(self.message_number.unwrap_or(0));
        }
        stream.align_write();
        stream.write_u16((self.payload.len() * 8) as u16);
        stream.write_bytes(&self.payload);
        Ok(())
    }

    /// Parses one packet at the stream's current position.
    pub fn decode(stream: &mut BitStream) -> Result<Self, ErrorKind> {
        let reliability = Reliability::try_from(stream.read_bits(3)? as u8)?;

        let (ordering_channel, ordering_index) = if reliability.is_sequenced_or_ordered() {
            let channel = stream.read_bits(5)? as u8;
            stream.align_read();
            (Some(channel), Some(stream.read_u32()?))
        } else {
            (None, None)
        };

        let message_number = if reliability.has_message_number() {
            stream.align_read();
            Some(stream.read_u32()?)
        } else {
            None
        };

        stream.align_read();
        let bit_length = usize::from(stream.read_u16()?);
        let payload = stream.read_bytes(bit_length.div_ceil(8))?;

        Ok(Self { reliability, ordering_channel, ordering_index, message_number, payload })
    }
}

/// A fully parsed incoming datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram {
    /// Acknowledged message numbers.
    Ack(AckRanges),
    /// Remote system time (when present) and the encapsulated packets.
    Data {
        /// The sender's millisecond clock at send time.
        system_time: Option<u32>,
        /// The packets, in wire order.
        packets: Vec<EncapsulatedPacket>,
    },
}

impl Datagram {
    /// Parses a received datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self, ErrorKind> {
        let mut stream = BitStream::from_bytes(bytes);
        if stream.read_bit()? {
            return Ok(Datagram::Ack(AckRanges::read(&mut stream)?));
        }
        let system_time = if stream.read_bit()? {
            stream.align_read();
            Some(stream.read_u32()?)
        } else {
            None
        };
        let mut packets = Vec::new();
        while !stream.all_read() {
            packets.push(EncapsulatedPacket::decode(&mut stream)?);
        }
        Ok(Datagram::Data { system_time, packets })
    }

    /// Serializes an acknowledgment-only datagram.
    pub fn encode_ack(acks: &AckRanges) -> Result<Vec<u8>, ErrorKind> {
        let mut stream = BitStream::new();
        stream.write_bit(true);
        acks.write(&mut stream)?;
        Ok(stream.into_bytes())
    }
}

/// Assembles one data datagram from pre-encoded encapsulated packets,
/// keeping the total under the on-wire MTU budget.
#[derive(Debug)]
pub struct DatagramBuilder {
    stream: BitStream,
    packet_count: usize,
}

impl DatagramBuilder {
    /// Starts a datagram stamped with the sender's millisecond clock.
    pub fn new(system_time: u32) -> Self {
        let mut stream = BitStream::new();
        stream.write_bit(false); // not an ack datagram
        stream.write_bit(true); // remote system time follows
        stream.align_write();
        stream.write_u32(system_time);
        Self { stream, packet_count: 0 }
    }

    /// Returns true if a packet of `encoded_len` bytes still fits.
    pub fn fits(&self, encoded_len: usize) -> bool {
        self.stream.len() + encoded_len <= MTU_SIZE - UDP_HEADER_SIZE
    }

    /// Appends one pre-encoded encapsulated packet.
    pub fn push(&mut self, encoded: &[u8]) {
        self.stream.write_bytes(encoded);
        self.packet_count += 1;
    }

    /// Returns the number of packets appended so far.
    pub fn packet_count(&self) -> usize {
        self.packet_count
    }

    /// Returns true when no packets have been appended.
    pub fn is_empty(&self) -> bool {
        self.packet_count == 0
    }

    /// Finishes the datagram and returns the wire bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.stream.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(packet: EncapsulatedPacket) -> EncapsulatedPacket {
        let bytes = packet.to_bytes().unwrap();
        let mut stream = BitStream::from_bytes(bytes);
        let decoded = EncapsulatedPacket::decode(&mut stream).unwrap();
        assert!(stream.all_read());
        decoded
    }

    #[test]
    fn unreliable_packet_round_trip() {
        let packet = EncapsulatedPacket {
            reliability: Reliability::Unreliable,
            ordering_channel: None,
            ordering_index: None,
            message_number: None,
            payload: b"fire and forget".to_vec(),
        };
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn reliable_packet_round_trip() {
        let packet = EncapsulatedPacket {
            reliability: Reliability::Reliable,
            ordering_channel: None,
            ordering_index: None,
            message_number: Some(4242),
            payload: vec![0x51, 1, 2, 3],
        };
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn reliable_ordered_packet_round_trip() {
        let packet = EncapsulatedPacket {
            reliability: Reliability::ReliableOrdered,
            ordering_channel: Some(7),
            ordering_index: Some(99),
            message_number: Some(100),
            payload: vec![0u8; 300],
        };
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn sequenced_packet_round_trip() {
        let packet = EncapsulatedPacket {
            reliability: Reliability::UnreliableSequenced,
            ordering_channel: Some(31),
            ordering_index: Some(5),
            message_number: Some(6),
            payload: vec![0xaa],
        };
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn empty_payload_round_trip() {
        let packet = EncapsulatedPacket {
            reliability: Reliability::Reliable,
            ordering_channel: None,
            ordering_index: None,
            message_number: Some(0),
            payload: Vec::new(),
        };
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn data_datagram_carries_multiple_packets() {
        let first = EncapsulatedPacket {
            reliability: Reliability::Reliable,
            ordering_channel: None,
            ordering_index: None,
            message_number: Some(1),
            payload: b"first".to_vec(),
        };
        let second = EncapsulatedPacket {
            reliability: Reliability::Unreliable,
            ordering_channel: None,
            ordering_index: None,
            message_number: None,
            payload: b"second".to_vec(),
        };

        let mut builder = DatagramBuilder::new(12345);
        builder.push(&first.to_bytes().unwrap());
        builder.push(&second.to_bytes().unwrap());
        assert_eq!(builder.packet_count(), 2);

        match Datagram::decode(&builder.into_bytes()).unwrap() {
            Datagram::Data { system_time, packets } => {
                assert_eq!(system_time, Some(12345));
                assert_eq!(packets, vec![first, second]);
            }
            other => panic!("expected data datagram, got {:?}", other),
        }
    }

    #[test]
    fn ack_datagram_round_trip() {
        let mut acks = AckRanges::new();
        for n in [3u32, 4, 5, 9] {
            acks.insert(n);
        }
        let bytes = Datagram::encode_ack(&acks).unwrap();
        match Datagram::decode(&bytes).unwrap() {
            Datagram::Ack(decoded) => assert_eq!(decoded, acks),
            other => panic!("expected ack datagram, got {:?}", other),
        }
    }

    #[test]
    fn truncated_datagram_is_an_error() {
        let packet = EncapsulatedPacket {
            reliability: Reliability::Reliable,
            ordering_channel: None,
            ordering_index: None,
            message_number: Some(1),
            payload: b"truncate me".to_vec(),
        };
        let mut builder = DatagramBuilder::new(0);
        builder.push(&packet.to_bytes().unwrap());
        let mut bytes = builder.into_bytes();
        bytes.truncate(bytes.len() - 4);
        assert!(Datagram::decode(&bytes).is_err());
    }

    #[test]
    fn unknown_reliability_is_an_error() {
        let mut stream = BitStream::new();
        stream.write_bit(false); // data datagram
        stream.write_bit(false); // no system time
        stream.write_bits(7, 3).unwrap(); // reserved reliability value
        stream.align_write();
        stream.write_u32(0);
        assert!(Datagram::decode(stream.as_bytes()).is_err());
    }

    #[test]
    fn builder_respects_the_mtu_budget() {
        let builder = DatagramBuilder::new(0);
        assert!(builder.fits(1400));
        assert!(!builder.fits(MTU_SIZE));
    }
}
