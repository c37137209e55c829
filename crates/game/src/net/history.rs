use std::time::{Duration, Instant};

use super::sequence::sequence_distance;

/// Roughly eight seconds of traffic at 60 packets per second.
pub const HISTORY_CAPACITY: usize = 512;
pub const ACK_BITFIELD_BITS: u16 = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketRecord {
    pub sequence: u16,
    pub ack: u16,
    pub ack_bitfield: u32,
    /// Application correlation id; equals `sequence` unless the sender chose one.
    pub tag: u32,
    pub time: Instant,
    pub acknowledged: bool,
    pub ack_time: Option<Instant>,
}

impl PacketRecord {
    fn new(sequence: u16, time: Instant) -> Self {
        Self {
            sequence,
            ack: 0,
            ack_bitfield: 0,
            tag: sequence as u32,
            time,
            acknowledged: false,
            ack_time: None,
        }
    }

    pub fn rtt(&self) -> Option<Duration> {
        self.ack_time
            .map(|ack_time| ack_time.saturating_duration_since(self.time))
    }
}

/// Fixed-capacity ring of packet records, oldest overwritten first.
///
/// `read` and `write` are free-running counters; occupancy is always derived
/// from their difference.
#[derive(Debug)]
pub struct PacketBuffer {
    records: Vec<PacketRecord>,
    capacity: usize,
    read: usize,
    write: usize,
}

impl PacketBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "packet buffer capacity must be non-zero");
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
            read: 0,
            write: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn count(&self) -> usize {
        self.write.wrapping_sub(self.read)
    }

    pub fn is_full(&self) -> bool {
        self.count() == self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Claims the next slot, evicting the oldest record when full.
    pub fn allocate(&mut self, sequence: u16, now: Instant) -> &mut PacketRecord {
        if self.is_full() {
            self.read = self.read.wrapping_add(1);
        }

        let index = self.write % self.capacity;
        let record = PacketRecord::new(sequence, now);
        if index < self.records.len() {
            self.records[index] = record;
        } else {
            self.records.push(record);
        }
        self.write = self.write.wrapping_add(1);

        &mut self.records[index]
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &PacketRecord> + '_ {
        (0..self.count()).map(move |i| &self.records[self.read.wrapping_add(i) % self.capacity])
    }

    pub fn newest(&self) -> Option<&PacketRecord> {
        self.iter().next_back()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.read = 0;
        self.write = 0;
    }

    /// Looks up a record assuming sequences were allocated consecutively,
    /// which holds for locally sent packets.
    pub fn find_mut(&mut self, sequence: u16) -> Option<&mut PacketRecord> {
        let newest = self.newest()?.sequence;
        let distance = sequence_distance(newest, sequence) as usize;
        if distance >= self.count() {
            return None;
        }

        let index = self.write.wrapping_sub(1 + distance) % self.capacity;
        let record = &mut self.records[index];
        if record.sequence == sequence {
            Some(record)
        } else {
            None
        }
    }

    /// Builds the bitfield describing which of the 32 sequences ending at
    /// `ack` are held here. Bit `i` stands for `ack - i`.
    ///
    /// Records must have been allocated in increasing sequence order, so the
    /// 32 newest records cover every sequence the field can describe.
    pub fn ack_bitfield(&self, ack: u16) -> u32 {
        self.iter()
            .rev()
            .take(ACK_BITFIELD_BITS as usize)
            .map(|record| sequence_distance(ack, record.sequence))
            .filter(|&distance| distance < ACK_BITFIELD_BITS)
            .fold(0u32, |bits, distance| bits | (1 << distance))
    }

    /// Marks every record named by `(ack, ack_bitfield)` as acknowledged and
    /// returns the records that transitioned, each exactly once.
    pub fn acknowledge(&mut self, ack: u16, ack_bitfield: u32, now: Instant) -> Vec<PacketRecord> {
        let mut acked = Vec::new();

        for bit in 0..ACK_BITFIELD_BITS {
            if ack_bitfield & (1 << bit) == 0 {
                continue;
            }

            let sequence = ack.wrapping_sub(bit);
            if let Some(record) = self.find_mut(sequence) {
                if !record.acknowledged {
                    record.acknowledged = true;
                    record.ack_time = Some(now);
                    acked.push(*record);
                }
            }
        }

        acked
    }
}
