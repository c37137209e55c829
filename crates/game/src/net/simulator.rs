use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::stats::PacketLossSimulation;

#[derive(Debug)]
struct DelayedDatagram {
    release_time: Instant,
    order: u64,
    data: Vec<u8>,
}

impl PartialEq for DelayedDatagram {
    fn eq(&self, other: &Self) -> bool {
        self.release_time == other.release_time && self.order == other.order
    }
}

impl Eq for DelayedDatagram {}

impl PartialOrd for DelayedDatagram {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedDatagram {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .release_time
            .cmp(&self.release_time)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Drops and delays datagrams according to a [`PacketLossSimulation`].
#[derive(Debug)]
pub struct LinkSimulator {
    config: PacketLossSimulation,
    rng: StdRng,
    queue: BinaryHeap<DelayedDatagram>,
    next_order: u64,
}

impl Default for LinkSimulator {
    fn default() -> Self {
        Self::new(PacketLossSimulation::default())
    }
}

impl LinkSimulator {
    pub fn new(config: PacketLossSimulation) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn seeded(config: PacketLossSimulation, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: PacketLossSimulation, rng: StdRng) -> Self {
        Self {
            config,
            rng,
            queue: BinaryHeap::new(),
            next_order: 0,
        }
    }

    pub fn config(&self) -> &PacketLossSimulation {
        &self.config
    }

    pub fn set_config(&mut self, config: PacketLossSimulation) {
        self.config = config;
    }

    pub fn should_drop(&mut self) -> bool {
        if !self.config.enabled || self.config.loss_percent <= 0.0 {
            return false;
        }
        self.rng.r#gen::<f32>() * 100.0 < self.config.loss_percent
    }

    pub fn delay(&mut self) -> Duration {
        if !self.config.enabled || (self.config.max_latency_ms == 0 && self.config.jitter_ms == 0) {
            return Duration::ZERO;
        }
        let base = self.config.min_latency_ms;
        let range = self
            .config
            .max_latency_ms
            .saturating_sub(self.config.min_latency_ms);
        let spread = if range > 0 { self.rng.gen_range(0..=range) } else { 0 };
        let jitter = if self.config.jitter_ms > 0 {
            self.rng.gen_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        Duration::from_millis((base + spread + jitter) as u64)
    }

    /// Runs a datagram through the link. Returns it immediately when it
    /// passes undelayed, queues it when delayed, and swallows it when dropped.
    pub fn admit(&mut self, data: Vec<u8>, now: Instant) -> Option<Vec<u8>> {
        if self.should_drop() {
            log::trace!("Link simulator dropped {} byte datagram", data.len());
            return None;
        }

        let delay = self.delay();
        if delay.is_zero() && self.queue.is_empty() {
            return Some(data);
        }

        let order = self.next_order;
        self.next_order = self.next_order.wrapping_add(1);
        self.queue.push(DelayedDatagram {
            release_time: now + delay,
            order,
            data,
        });
        None
    }

    pub fn pop_ready(&mut self, now: Instant) -> Option<Vec<u8>> {
        if self.queue.peek()?.release_time > now {
            return None;
        }
        self.queue.pop().map(|delayed| delayed.data)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_when_disabled() {
        let mut link = LinkSimulator::default();
        let now = Instant::now();
        assert_eq!(link.admit(vec![1, 2, 3], now), Some(vec![1, 2, 3]));
        assert_eq!(link.pending(), 0);
    }

    #[test]
    fn total_loss_drops_everything() {
        let config = PacketLossSimulation {
            enabled: true,
            loss_percent: 100.0,
            ..Default::default()
        };
        let mut link = LinkSimulator::seeded(config, 7);
        let now = Instant::now();
        for _ in 0..50 {
            assert!(link.admit(vec![0], now).is_none());
        }
        assert_eq!(link.pending(), 0);
    }

    #[test]
    fn latency_releases_in_order() {
        let config = PacketLossSimulation {
            enabled: true,
            min_latency_ms: 20,
            max_latency_ms: 20,
            ..Default::default()
        };
        let mut link = LinkSimulator::seeded(config, 1);
        let now = Instant::now();

        assert!(link.admit(vec![1], now).is_none());
        assert!(link.admit(vec![2], now).is_none());
        assert!(link.pop_ready(now).is_none());

        let later = now + Duration::from_millis(20);
        assert_eq!(link.pop_ready(later), Some(vec![1]));
        assert_eq!(link.pop_ready(later), Some(vec![2]));
        assert!(link.pop_ready(later).is_none());
    }
}
