//! Sequenced, acknowledged datagram channel.
//!
//! A `Channel` stamps every outgoing datagram with a sequence number and the
//! acknowledgement state of the peer's traffic, discards anything that is not
//! newer than what it already accepted, and measures round-trip time from the
//! acknowledgements it receives. It never retransmits.

use std::time::{Duration, Instant};

use super::history::{HISTORY_CAPACITY, PacketBuffer};
use super::msg::Msg;
use super::protocol::{HEADER_SIZE, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE, PacketError, PacketHeader};
use super::sequence::sequence_greater_than;
use super::stats::NetworkStats;
use super::transport::DatagramSocket;

/// Acknowledgements averaged arithmetically before switching to the moving average.
pub const PING_MIN_ACKS: u32 = 10;
/// Packets older than this without an acknowledgement count as lost.
pub const MAX_RTT: Duration = Duration::from_millis(1000);

const PING_SMOOTHING: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub sequence: u16,
    pub tag: u32,
    pub rtt: Duration,
}

/// An accepted datagram together with the acknowledgements it carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
    pub acks: Vec<Ack>,
}

#[derive(Debug)]
pub struct Channel<S> {
    socket: S,
    local_sequence: u16,
    remote_sequence: Option<u16>,
    local_history: PacketBuffer,
    remote_history: PacketBuffer,
    average_rtt_ms: f32,
    ack_count: u32,
    stats: NetworkStats,
    send_buffer: Msg<Vec<u8>>,
}

impl<S: DatagramSocket> Channel<S> {
    pub fn new(socket: S) -> Self {
        Self::with_history(socket, HISTORY_CAPACITY)
    }

    pub fn with_history(socket: S, capacity: usize) -> Self {
        Self {
            socket,
            local_sequence: 0,
            remote_sequence: None,
            local_history: PacketBuffer::new(capacity),
            remote_history: PacketBuffer::new(capacity),
            average_rtt_ms: 0.0,
            ack_count: 0,
            stats: NetworkStats::default(),
            send_buffer: Msg::with_capacity(MAX_PACKET_SIZE),
        }
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    pub fn local_sequence(&self) -> u16 {
        self.local_sequence
    }

    pub fn remote_sequence(&self) -> Option<u16> {
        self.remote_sequence
    }

    pub fn local_history(&self) -> &PacketBuffer {
        &self.local_history
    }

    pub fn remote_history(&self) -> &PacketBuffer {
        &self.remote_history
    }

    pub fn ack_count(&self) -> u32 {
        self.ack_count
    }

    /// Smoothed round-trip time in milliseconds, or `None` while fewer than
    /// [`PING_MIN_ACKS`] packets have been acknowledged.
    pub fn ping(&self) -> Option<f32> {
        (self.ack_count >= PING_MIN_ACKS).then_some(self.average_rtt_ms)
    }

    pub fn packet_loss(&self) -> f32 {
        self.packet_loss_at(Instant::now())
    }

    /// Fraction of sent packets older than [`MAX_RTT`] that were never acknowledged.
    pub fn packet_loss_at(&self, now: Instant) -> f32 {
        let (old, lost) = self
            .local_history
            .iter()
            .filter(|record| now.saturating_duration_since(record.time) > MAX_RTT)
            .fold((0u32, 0u32), |(old, lost), record| {
                (old + 1, lost + u32::from(!record.acknowledged))
            });

        if old == 0 {
            0.0
        } else {
            lost as f32 / old as f32
        }
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            rtt_ms: self.ping(),
            packet_loss: self.packet_loss(),
            ..self.stats.clone()
        }
    }

    /// Ack and bitfield describing the peer traffic accepted so far.
    pub fn ack_data(&self) -> (u16, u32) {
        match self.remote_sequence {
            Some(remote) => (remote, self.remote_history.ack_bitfield(remote)),
            None => (0, 0),
        }
    }

    pub fn send(&mut self, payload: &[u8], tag: Option<u32>) -> Result<u16, PacketError> {
        self.send_at(payload, tag, Instant::now())
    }

    /// Sends `payload` under the next sequence number and returns that number.
    /// Oversized payloads are refused without consuming a sequence number.
    pub fn send_at(
        &mut self,
        payload: &[u8],
        tag: Option<u32>,
        now: Instant,
    ) -> Result<u16, PacketError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            log::error!(
                "Refusing to send {} byte payload: too large for buffer",
                payload.len()
            );
            return Err(PacketError::TooLarge(payload.len()));
        }

        let sequence = self.local_sequence;
        let (ack, ack_bitfield) = self.ack_data();
        let header = PacketHeader::new(sequence, ack, ack_bitfield);

        self.send_buffer.reset();
        header.write(&mut self.send_buffer)?;
        self.send_buffer.write_bytes(payload)?;

        let record = self.local_history.allocate(sequence, now);
        record.ack = ack;
        record.ack_bitfield = ack_bitfield;
        if let Some(tag) = tag {
            record.tag = tag;
        }
        self.local_sequence = self.local_sequence.wrapping_add(1);

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += self.send_buffer.offset() as u64;
        self.socket.send(self.send_buffer.as_bytes())?;

        Ok(sequence)
    }

    pub fn receive(&mut self, datagram: &[u8]) -> Result<Option<Delivery>, PacketError> {
        self.receive_at(datagram, Instant::now())
    }

    /// Accepts a datagram from the peer.
    ///
    /// Returns `Ok(None)` for stale or duplicate datagrams. Those are expected
    /// on an unordered link and leave the channel untouched.
    pub fn receive_at(
        &mut self,
        datagram: &[u8],
        now: Instant,
    ) -> Result<Option<Delivery>, PacketError> {
        if datagram.len() > MAX_PACKET_SIZE {
            self.stats.packets_malformed += 1;
            return Err(PacketError::TooLarge(datagram.len()));
        }
        if datagram.len() < HEADER_SIZE {
            self.stats.packets_malformed += 1;
            return Err(PacketError::Truncated(datagram.len()));
        }

        let mut msg = Msg::new(datagram);
        let header = PacketHeader::read(&mut msg)?;

        if let Some(remote) = self.remote_sequence {
            if !sequence_greater_than(header.sequence, remote) {
                self.stats.packets_stale += 1;
                log::trace!(
                    "Dropping stale packet {} (remote sequence {})",
                    header.sequence,
                    remote
                );
                return Ok(None);
            }
        }
        self.remote_sequence = Some(header.sequence);

        let record = self.remote_history.allocate(header.sequence, now);
        record.ack = header.ack;
        record.ack_bitfield = header.ack_bitfield;

        let acked = self
            .local_history
            .acknowledge(header.ack, header.ack_bitfield, now);
        let mut acks = Vec::with_capacity(acked.len());
        for record in acked {
            let rtt = record.rtt().unwrap_or_default();
            self.update_rtt(rtt);
            acks.push(Ack {
                sequence: record.sequence,
                tag: record.tag,
                rtt,
            });
        }

        self.stats.packets_received += 1;
        self.stats.packets_acked += acks.len() as u64;
        self.stats.bytes_received += datagram.len() as u64;

        Ok(Some(Delivery {
            header,
            payload: datagram[HEADER_SIZE..].to_vec(),
            acks,
        }))
    }

    fn update_rtt(&mut self, rtt: Duration) {
        let sample = rtt.as_secs_f32() * 1000.0;
        self.ack_count = self.ack_count.saturating_add(1);

        if self.ack_count <= PING_MIN_ACKS {
            self.average_rtt_ms += (sample - self.average_rtt_ms) / self.ack_count as f32;
        } else {
            self.average_rtt_ms += (sample - self.average_rtt_ms) * PING_SMOOTHING;
        }
    }

    pub fn close(&mut self) {
        self.socket.close();
    }
}
