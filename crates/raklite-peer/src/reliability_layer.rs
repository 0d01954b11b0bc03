//! The send/receive reliability engine.
//!
//! UDP guarantees neither delivery nor ordering, so this is where the
//! transport provides optional support for both. The layer owns everything
//! message-number-shaped for one remote address: outbound numbering, the
//! resend queue, the acknowledgment set, the dedup window, and the 32
//! ordering channels. For the retransmission scheme see
//! <http://www.saminiir.com/lets-code-tcp-ip-stack-5-tcp-retransmission>.

use std::{
    collections::{BTreeMap, VecDeque},
    time::Instant,
};

use raklite_core::{
    config::Config,
    constants::max_user_payload,
    error::{ErrorKind, Result},
};
use raklite_protocol::{
    AckRanges, BitStream, Datagram, DatagramBuilder, EncapsulatedPacket, Reliability,
};
use tracing::{debug, error, trace, warn};

use crate::{
    channel::{OrderedDisposition, OrderingChannel},
    dedup::ReceivedSet,
    rto::RtoEstimator,
};

/// A reliable packet awaiting acknowledgment.
#[derive(Debug, Clone)]
struct ResendEntry {
    encoded: Vec<u8>,
    first_send: Instant,
    next_resend: Instant,
    resend_count: u32,
}

/// What one tick produced.
#[derive(Debug, Default)]
pub struct TickOutput {
    /// Datagrams to put on the wire, in order (ACK datagram first).
    pub datagrams: Vec<Vec<u8>>,
    /// Set when a resend entry exhausted its attempts and the peer must be
    /// considered lost.
    pub connection_lost: bool,
}

/// Sequencing, reliability, ordering, acknowledgment, and retransmission
/// state for one remote address.
#[derive(Debug)]
pub struct ReliabilityLayer {
    start_time: Instant,
    max_resends: u32,
    channel_count: u8,
    /// The remote's millisecond clock, as last seen in a datagram header.
    remote_system_time: u32,
    /// Message numbers to acknowledge on the next tick.
    acks: AckRanges,
    rto: RtoEstimator,
    next_message_number: u32,
    channels: Vec<OrderingChannel>,
    received: ReceivedSet,
    /// Encoded encapsulated packets waiting to be coalesced.
    send_queue: VecDeque<Vec<u8>>,
    /// Reliable packets in flight, keyed by message number.
    resends: BTreeMap<u32, ResendEntry>,
}

impl ReliabilityLayer {
    /// Creates the engine for one peer.
    pub fn new(config: &Config, now: Instant) -> Self {
        let channel_count = config.ordering_channel_count;
        Self {
            start_time: now,
            max_resends: config.max_resends,
            channel_count,
            remote_system_time: 0,
            acks: AckRanges::new(),
            rto: RtoEstimator::new(config.min_rto),
            next_message_number: 0,
            channels: (0..channel_count).map(|_| OrderingChannel::new()).collect(),
            received: ReceivedSet::new(),
            send_queue: VecDeque::new(),
            resends: BTreeMap::new(),
        }
    }

    /// Milliseconds since this layer was created, the clock stamped into
    /// outgoing datagram headers.
    pub fn local_time_ms(&self, now: Instant) -> u32 {
        now.duration_since(self.start_time).as_millis() as u32
    }

    /// The remote's millisecond clock from the last datagram header.
    pub fn remote_system_time(&self) -> u32 {
        self.remote_system_time
    }

    /// Smoothed round-trip estimate, if any acknowledgment arrived yet.
    pub fn smoothed_rtt(&self) -> Option<std::time::Duration> {
        self.rto.smoothed_rtt()
    }

    /// True while reliable packets are awaiting acknowledgment.
    pub fn has_packets_in_flight(&self) -> bool {
        !self.resends.is_empty()
    }

    /// True while encoded packets are waiting for the next tick.
    pub fn has_queued_sends(&self) -> bool {
        !self.send_queue.is_empty()
    }

    /// True when acknowledgments are waiting to be flushed.
    pub fn has_pending_acks(&self) -> bool {
        !self.acks.is_empty()
    }

    /// Enqueues one payload for transmission on the next tick.
    ///
    /// Fails synchronously on oversize payloads, out-of-range channels, and
    /// the sequenced-reliable class this implementation omits.
    pub fn send(
        &mut self,
        payload: &[u8],
        reliability: Reliability,
        channel: u8,
        now: Instant,
    ) -> Result<()> {
        if reliability == Reliability::ReliableSequenced {
            return Err(ErrorKind::NotSupported("sequenced reliable delivery"));
        }
        if channel >= self.channel_count {
            return Err(ErrorKind::InvalidOrderingChannel(channel));
        }
        if payload.len() > max_user_payload() {
            return Err(ErrorKind::PayloadTooLarge {
                size: payload.len(),
                max: max_user_payload(),
            });
        }

        let ordering_index = match reliability {
            Reliability::ReliableOrdered => {
                Some(self.channels[usize::from(channel)].next_ordered_index())
            }
            Reliability::UnreliableSequenced => {
                Some(self.channels[usize::from(channel)].next_sequenced_index())
            }
            _ => None,
        };
        let message_number = reliability.has_message_number().then(|| {
            let number = self.next_message_number;
            self.next_message_number += 1;
            number
        });

        let packet = EncapsulatedPacket {
            reliability,
            ordering_channel: reliability.is_sequenced_or_ordered().then_some(channel),
            ordering_index,
            message_number,
            payload: payload.to_vec(),
        };
        let encoded = packet.to_bytes()?;

        if reliability.is_reliable() {
            // `message_number` is always assigned for reliable classes
            let number = message_number.unwrap_or(0);
            self.resends.insert(number, ResendEntry {
                encoded: encoded.clone(),
                first_send: now,
                next_resend: now + self.rto.rto(),
                resend_count: 0,
            });
            trace!(message_number = number, "queued reliable packet");
        }

        self.send_queue.push_back(encoded);
        Ok(())
    }

    /// Decodes one inbound datagram and returns the application payloads it
    /// released, fully deduplicated and ordered.
    pub fn handle_datagram(&mut self, bytes: &[u8], now: Instant) -> Result<Vec<Vec<u8>>> {
        match Datagram::decode(bytes)? {
            Datagram::Ack(ranges) => {
                self.handle_acks(&ranges, now);
                Ok(Vec::new())
            }
            Datagram::Data { system_time, packets } => {
                if let Some(time) = system_time {
                    self.remote_system_time = time;
                }
                let mut delivered = Vec::new();
                for packet in packets {
                    self.process_packet(packet, &mut delivered);
                }
                Ok(delivered)
            }
        }
    }

    fn handle_acks(&mut self, ranges: &AckRanges, now: Instant) {
        for message_number in ranges.iter() {
            if let Some(entry) = self.resends.remove(&message_number) {
                self.rto.sample(now.duration_since(entry.first_send));
                trace!(message_number, "acknowledged");
            }
        }
    }

    fn process_packet(&mut self, packet: EncapsulatedPacket, delivered: &mut Vec<Vec<u8>>) {
        if packet.reliability.is_reliable() {
            let message_number = packet.message_number.unwrap_or(0);
            // Always re-acknowledge: the remote keeps resending until an ACK
            // makes it through, duplicate or not.
            self.acks.insert(message_number);
            if !self.received.insert(message_number) {
                warn!(message_number, "dropping reliable duplicate");
                return;
            }
        }

        match packet.reliability {
            Reliability::ReliableOrdered | Reliability::UnreliableSequenced => {
                let channel = packet.ordering_channel.unwrap_or(0);
                let index = packet.ordering_index.unwrap_or(0);
                let Some(state) = self.channels.get_mut(usize::from(channel)) else {
                    warn!(channel, "dropping packet on out-of-range ordering channel");
                    return;
                };
                if packet.reliability.is_ordered() {
                    match state.process_ordered(index, packet.payload) {
                        OrderedDisposition::Deliver(ready) => {
                            if ready.len() > 1 {
                                debug!(
                                    channel,
                                    released = ready.len() - 1,
                                    "released buffered ordered packets"
                                );
                            }
                            delivered.extend(ready);
                        }
                        OrderedDisposition::Buffered => {
                            debug!(
                                channel,
                                index,
                                expected = state.expected_index(),
                                "ordered packet arrived early"
                            );
                        }
                        OrderedDisposition::Stale => {
                            warn!(channel, index, "dropping stale ordered packet");
                        }
                    }
                } else {
                    match state.process_sequenced(index, packet.payload) {
                        Some(payload) => delivered.push(payload),
                        None => trace!(channel, index, "dropping stale sequenced packet"),
                    }
                }
            }
            Reliability::Unreliable | Reliability::Reliable => delivered.push(packet.payload),
            Reliability::ReliableSequenced => {
                // never produced by a compliant 3.25 peer
                warn!("dropping reliable-sequenced packet");
            }
        }
    }

    /// Runs one scheduling pass: flushes pending acknowledgments into an
    /// ACK-only datagram, then coalesces due resends and queued sends into
    /// at most one payload datagram.
    pub fn tick(&mut self, now: Instant) -> TickOutput {
        let mut output = TickOutput::default();

        if !self.acks.is_empty() {
            match Datagram::encode_ack(&self.acks) {
                Ok(bytes) => {
                    debug!(count = self.acks.len(), "flushing acknowledgments");
                    output.datagrams.push(bytes);
                    self.acks.clear();
                }
                Err(err) => error!("failed to encode acknowledgment datagram: {}", err),
            }
        }

        let mut builder = DatagramBuilder::new(self.local_time_ms(now));

        // due retransmissions first, in message-number order
        let due: Vec<u32> = self
            .resends
            .iter()
            .filter(|(_, entry)| entry.next_resend <= now)
            .map(|(number, _)| *number)
            .collect();
        for message_number in due {
            let rto = self.rto.rto();
            let Some(entry) = self.resends.get_mut(&message_number) else { continue };
            if entry.resend_count >= self.max_resends {
                warn!(message_number, "resend limit exhausted, peer is lost");
                output.connection_lost = true;
                break;
            }
            if !builder.fits(entry.encoded.len()) {
                break;
            }
            entry.resend_count += 1;
            entry.next_resend = now + rto;
            debug!(message_number, attempt = entry.resend_count, "retransmitting");
            builder.push(&entry.encoded);
        }

        if !output.connection_lost {
            while let Some(front) = self.send_queue.front() {
                if !builder.fits(front.len()) {
                    break;
                }
                // already checked the front exists
                if let Some(encoded) = self.send_queue.pop_front() {
                    builder.push(&encoded);
                }
            }
        }

        if !builder.is_empty() {
            output.datagrams.push(builder.into_bytes());
        }
        output
    }
}

/// Builds a single connected-mode message: opcode byte plus body.
pub(crate) fn build_message(opcode: u8, body: impl FnOnce(&mut BitStream)) -> Vec<u8> {
    let mut stream = BitStream::new();
    stream.write_u8(opcode);
    body(&mut stream);
    stream.into_bytes()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use raklite_protocol::MessageId;

    use super::*;

    fn layer() -> (ReliabilityLayer, Instant) {
        let now = Instant::now();
        (ReliabilityLayer::new(&Config::default(), now), now)
    }

    fn deliver(from: &mut ReliabilityLayer, to: &mut ReliabilityLayer, now: Instant) -> Vec<Vec<u8>> {
        let mut delivered = Vec::new();
        for datagram in from.tick(now).datagrams {
            delivered.extend(to.handle_datagram(&datagram, now).unwrap());
        }
        delivered
    }

    #[test]
    fn oversize_payload_is_rejected_synchronously() {
        let (mut layer, now) = layer();
        let result = layer.send(&vec![0u8; 2000], Reliability::Reliable, 0, now);
        assert!(matches!(result, Err(ErrorKind::PayloadTooLarge { size: 2000, .. })));
        assert!(!layer.has_queued_sends());
        assert!(!layer.has_packets_in_flight());
    }

    #[test]
    fn sequenced_reliable_is_not_supported() {
        let (mut layer, now) = layer();
        assert!(matches!(
            layer.send(b"x", Reliability::ReliableSequenced, 0, now),
            Err(ErrorKind::NotSupported(_))
        ));
    }

    #[test]
    fn out_of_range_channel_is_rejected() {
        let (mut layer, now) = layer();
        assert!(matches!(
            layer.send(b"x", Reliability::ReliableOrdered, 32, now),
            Err(ErrorKind::InvalidOrderingChannel(32))
        ));
    }

    #[test]
    fn reliable_send_reaches_the_other_side() {
        let (mut alice, now) = layer();
        let mut bob = ReliabilityLayer::new(&Config::default(), now);

        alice.send(b"\x51hello", Reliability::Reliable, 0, now).unwrap();
        let delivered = deliver(&mut alice, &mut bob, now);
        assert_eq!(delivered, vec![b"\x51hello".to_vec()]);

        // bob acks on his next tick, which clears alice's resend queue
        assert!(alice.has_packets_in_flight());
        let later = now + Duration::from_millis(30);
        deliver(&mut bob, &mut alice, later);
        assert!(!alice.has_packets_in_flight());
        assert!(alice.smoothed_rtt().is_some());
    }

    #[test]
    fn replayed_datagram_delivers_at_most_once() {
        let (mut alice, now) = layer();
        let mut bob = ReliabilityLayer::new(&Config::default(), now);

        alice.send(b"\x51once", Reliability::Reliable, 0, now).unwrap();
        let datagrams = alice.tick(now).datagrams;
        assert_eq!(datagrams.len(), 1);

        let first = bob.handle_datagram(&datagrams[0], now).unwrap();
        assert_eq!(first.len(), 1);
        for _ in 0..5 {
            assert!(bob.handle_datagram(&datagrams[0], now).unwrap().is_empty());
        }
        // the duplicate still got re-acknowledged
        assert!(bob.has_pending_acks());
    }

    #[test]
    fn unacked_packet_retransmits_after_the_rto() {
        let (mut alice, now) = layer();
        alice.send(b"\x51r", Reliability::Reliable, 0, now).unwrap();

        // first transmission
        assert_eq!(alice.tick(now).datagrams.len(), 1);
        // nothing due yet
        assert!(alice.tick(now + Duration::from_millis(500)).datagrams.is_empty());
        // past the 1s minimum RTO the same bytes go out again
        let resent = alice.tick(now + Duration::from_millis(1100)).datagrams;
        assert_eq!(resent.len(), 1);
    }

    #[test]
    fn resend_limit_marks_the_connection_lost() {
        let (mut alice, now) = layer();
        alice.send(b"\x51doomed", Reliability::Reliable, 0, now).unwrap();

        let mut time = now;
        let mut lost = false;
        for _ in 0..20 {
            time += Duration::from_secs(2);
            let output = alice.tick(time);
            if output.connection_lost {
                lost = true;
                break;
            }
        }
        assert!(lost);
    }

    #[test]
    fn queued_sends_coalesce_into_one_datagram() {
        let (mut alice, now) = layer();
        let mut bob = ReliabilityLayer::new(&Config::default(), now);

        for payload in [b"\x51A".as_slice(), b"\x51B", b"\x51C"] {
            alice.send(payload, Reliability::ReliableOrdered, 0, now).unwrap();
        }
        let datagrams = alice.tick(now).datagrams;
        assert_eq!(datagrams.len(), 1);
        let delivered = bob.handle_datagram(&datagrams[0], now).unwrap();
        assert_eq!(delivered, vec![b"\x51A".to_vec(), b"\x51B".to_vec(), b"\x51C".to_vec()]);
    }

    #[test]
    fn ordered_packets_survive_reordering() {
        let (mut alice, now) = layer();
        let mut bob = ReliabilityLayer::new(&Config::default(), now);

        // one tick per send so each packet rides its own datagram
        let mut singles = Vec::new();
        for payload in [b"\x51A".as_slice(), b"\x51B", b"\x51C"] {
            alice.send(payload, Reliability::ReliableOrdered, 0, now).unwrap();
            let datagrams = alice.tick(now).datagrams;
            assert_eq!(datagrams.len(), 1);
            singles.extend(datagrams);
        }

        // deliver C, A, B; the application must still see A, B, C
        let mut delivered = Vec::new();
        delivered.extend(bob.handle_datagram(&singles[2], now).unwrap());
        delivered.extend(bob.handle_datagram(&singles[0], now).unwrap());
        delivered.extend(bob.handle_datagram(&singles[1], now).unwrap());
        assert_eq!(delivered, vec![b"\x51A".to_vec(), b"\x51B".to_vec(), b"\x51C".to_vec()]);
    }

    #[test]
    fn ordering_channels_are_independent() {
        let (mut alice, now) = layer();
        let mut bob = ReliabilityLayer::new(&Config::default(), now);

        alice.send(b"\x51ch0", Reliability::ReliableOrdered, 0, now).unwrap();
        alice.send(b"\x51ch1", Reliability::ReliableOrdered, 1, now).unwrap();
        let delivered = deliver(&mut alice, &mut bob, now);
        assert_eq!(delivered.len(), 2);
    }

    #[test]
    fn sequenced_drops_stale_arrivals() {
        let (mut alice, now) = layer();
        let mut bob = ReliabilityLayer::new(&Config::default(), now);

        let mut singles = Vec::new();
        for payload in [b"\x51old".as_slice(), b"\x51new"] {
            alice.send(payload, Reliability::UnreliableSequenced, 0, now).unwrap();
            singles.extend(alice.tick(now).datagrams);
        }
        // newest first; the older one must be dropped
        let mut delivered = Vec::new();
        delivered.extend(bob.handle_datagram(&singles[1], now).unwrap());
        delivered.extend(bob.handle_datagram(&singles[0], now).unwrap());
        assert_eq!(delivered, vec![b"\x51new".to_vec()]);
    }

    #[test]
    fn unreliable_packets_carry_no_resend_state() {
        let (mut alice, now) = layer();
        alice.send(b"\x51u", Reliability::Unreliable, 0, now).unwrap();
        assert!(!alice.has_packets_in_flight());
        assert_eq!(alice.tick(now).datagrams.len(), 1);
        // nothing left to retransmit
        assert!(alice.tick(now + Duration::from_secs(5)).datagrams.is_empty());
    }

    #[test]
    fn acks_flush_in_their_own_datagram_first() {
        let (mut alice, now) = layer();
        let mut bob = ReliabilityLayer::new(&Config::default(), now);

        alice.send(b"\x51ping", Reliability::Reliable, 0, now).unwrap();
        for datagram in alice.tick(now).datagrams {
            bob.handle_datagram(&datagram, now).unwrap();
        }

        bob.send(b"\x51pong", Reliability::Reliable, 0, now).unwrap();
        let datagrams = bob.tick(now).datagrams;
        assert_eq!(datagrams.len(), 2);
        assert!(matches!(Datagram::decode(&datagrams[0]).unwrap(), Datagram::Ack(_)));
        assert!(matches!(Datagram::decode(&datagrams[1]).unwrap(), Datagram::Data { .. }));
    }

    #[test]
    fn corrupt_datagram_is_an_error_not_a_panic() {
        let (mut layer, now) = layer();
        // empty buffer
        assert!(layer.handle_datagram(&[], now).is_err());
        // claims to carry acks, then ends
        assert!(layer.handle_datagram(&[0x80], now).is_err());
        // claims to carry a timestamp, then ends
        assert!(layer.handle_datagram(&[0x40], now).is_err());
    }

    #[test]
    fn build_message_prefixes_the_opcode() {
        let bytes = build_message(MessageId::InternalPing as u8, |stream| {
            stream.write_u32(0x11223344);
        });
        assert_eq!(bytes, vec![0x00, 0x44, 0x33, 0x22, 0x11]);
    }
}
