//! Property tests for sequence arithmetic, acknowledgement bookkeeping and
//! decoder robustness against arbitrary datagrams.

use std::collections::BTreeSet;
use std::time::Instant;

use proptest::prelude::*;
use ripple::net::{
    ACK_BITFIELD_BITS, Channel, Msg, PacketBuffer, SEQUENCE_DOMAIN, loopback_pair,
    sequence_distance, sequence_greater_than, wrap_sequence,
};
use ripple::{ClientSession, SessionConfig, Snapshot, UserCommand};

proptest! {
    /// Within half the domain, newness agrees with modular distance and is anti-symmetric.
    #[test]
    fn greater_than_matches_distance(a in any::<u16>(), offset in 1u16..32768) {
        let b = a.wrapping_add(offset);

        prop_assert!(sequence_greater_than(b, a));
        prop_assert!(!sequence_greater_than(a, b));
        prop_assert_eq!(sequence_distance(b, a), offset);
        prop_assert!(!sequence_greater_than(a, a));
    }

    #[test]
    fn wrap_reduces_into_domain(value in any::<i64>()) {
        let wrapped = wrap_sequence(value);
        prop_assert_eq!(wrapped as i64, value.rem_euclid(SEQUENCE_DOMAIN as i64));
    }

    /// The peer acknowledges exactly the received subset, and only once.
    #[test]
    fn ack_bitfield_marks_exactly_received(
        start in any::<u16>(),
        received in prop::collection::btree_set(0u16..ACK_BITFIELD_BITS, 1..20),
    ) {
        let now = Instant::now();
        let newest = *received.iter().max().unwrap();

        let mut local = PacketBuffer::new(64);
        for i in 0..=newest {
            local.allocate(start.wrapping_add(i), now);
        }

        let mut remote = PacketBuffer::new(64);
        for i in &received {
            remote.allocate(start.wrapping_add(*i), now);
        }
        let ack = start.wrapping_add(newest);
        let bits = remote.ack_bitfield(ack);

        let acked: BTreeSet<u16> = local
            .acknowledge(ack, bits, now)
            .iter()
            .map(|r| r.sequence.wrapping_sub(start))
            .collect();
        prop_assert_eq!(&acked, &received);
        prop_assert!(local.acknowledge(ack, bits, now).is_empty());
    }

    #[test]
    fn msg_i32_roundtrip(value in any::<i32>(), angle in -3.14f32..3.14) {
        let mut msg = Msg::with_capacity(6);
        msg.write_i32(value).unwrap();
        msg.write_angle16(angle).unwrap();

        let mut read = Msg::new(msg.as_bytes());
        prop_assert_eq!(read.read_i32().unwrap(), value);
        let decoded = read.read_angle16().unwrap();
        prop_assert!((decoded - angle).abs() <= std::f32::consts::TAU / 65536.0);
    }

    #[test]
    fn arbitrary_bytes_dont_crash_channel(
        datagrams in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..1100), 1..8),
    ) {
        let (socket, _peer) = loopback_pair();
        let mut channel = Channel::new(socket);
        for datagram in &datagrams {
            let _ = channel.receive(datagram);
        }
    }

    #[test]
    fn arbitrary_bytes_dont_crash_snapshot_decoder(
        bytes in prop::collection::vec(any::<u8>(), 0..600),
    ) {
        let _ = Snapshot::decode(&mut Msg::new(&bytes[..]));
        let _ = UserCommand::decode(&mut Msg::new(&bytes[..]), 0);
    }

    /// Garbage frames behind a valid header are discarded without touching state.
    #[test]
    fn garbage_frames_dont_crash_session(
        bodies in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..200), 1..8),
    ) {
        use ripple::DatagramSocket;

        let (a, mut b) = loopback_pair();
        let mut session = ClientSession::new(1, a, SessionConfig::default());
        session.pump();

        for (i, body) in bodies.iter().enumerate() {
            let mut datagram = vec![i as u8, 0, 0, 0, 0, 0, 0, 0];
            datagram.extend_from_slice(body);
            b.send(&datagram).unwrap();
        }
        session.pump();
        prop_assert!(session.is_connected());
    }
}
