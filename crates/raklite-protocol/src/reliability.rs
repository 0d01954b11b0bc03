//! Reliability classes carried in the 3-bit frame header.

use raklite_core::error::{DecodingErrorKind, ErrorKind};

/// How an encapsulated packet is delivered.
///
/// `ReliableSequenced` exists in the wire vocabulary but is never produced
/// by this implementation; sends requesting it are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[repr(u8)]
pub enum Reliability {
    /// Fire and forget.
    Unreliable = 0,
    /// Fire and forget, but stale arrivals on the channel are dropped.
    UnreliableSequenced = 1,
    /// Retransmitted until acknowledged.
    Reliable = 2,
    /// Retransmitted until acknowledged and delivered in channel order.
    ReliableOrdered = 3,
    /// Retransmitted, newest-wins. Not produced by this implementation.
    ReliableSequenced = 4,
}

impl Reliability {
    /// Returns the 3-bit wire value.
    pub fn to_bits(self) -> u8 {
        self as u8
    }

    /// True when delivery is guaranteed and the packet enters the resend
    /// queue and dedup set.
    pub fn is_reliable(self) -> bool {
        matches!(
            self,
            Reliability::Reliable | Reliability::ReliableOrdered | Reliability::ReliableSequenced
        )
    }

    /// True for the ordered class that buffers out-of-order arrivals.
    pub fn is_ordered(self) -> bool {
        matches!(self, Reliability::ReliableOrdered)
    }

    /// True for the newest-wins classes.
    pub fn is_sequenced(self) -> bool {
        matches!(self, Reliability::UnreliableSequenced | Reliability::ReliableSequenced)
    }

    /// True when the frame carries an ordering channel and index.
    pub fn is_sequenced_or_ordered(self) -> bool {
        self.is_sequenced() || self.is_ordered()
    }

    /// True when the frame carries a reliable message number. Everything
    /// above plain `Unreliable` does.
    pub fn has_message_number(self) -> bool {
        !matches!(self, Reliability::Unreliable)
    }
}

impl TryFrom<u8> for Reliability {
    type Error = ErrorKind;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Reliability::Unreliable),
            1 => Ok(Reliability::UnreliableSequenced),
            2 => Ok(Reliability::Reliable),
            3 => Ok(Reliability::ReliableOrdered),
            4 => Ok(Reliability::ReliableSequenced),
            _ => Err(ErrorKind::Decoding(DecodingErrorKind::Reliability)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_round_trip() {
        for value in 0u8..=4 {
            let reliability = Reliability::try_from(value).unwrap();
            assert_eq!(reliability.to_bits(), value);
        }
        assert!(Reliability::try_from(5).is_err());
    }

    #[test]
    fn classification() {
        assert!(!Reliability::Unreliable.is_reliable());
        assert!(!Reliability::Unreliable.has_message_number());
        assert!(Reliability::UnreliableSequenced.has_message_number());
        assert!(Reliability::UnreliableSequenced.is_sequenced_or_ordered());
        assert!(!Reliability::UnreliableSequenced.is_reliable());
        assert!(Reliability::Reliable.is_reliable());
        assert!(!Reliability::Reliable.is_sequenced_or_ordered());
        assert!(Reliability::ReliableOrdered.is_ordered());
        assert!(Reliability::ReliableOrdered.is_sequenced_or_ordered());
    }
}
