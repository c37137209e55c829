/// How the data for one simulation frame reached the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum FrameStatus {
    #[default]
    Missing,
    /// Arrived in the datagram that first carried it.
    Received,
    /// Recovered from a later datagram's redundant copy, or skipped over.
    Filled,
    /// Arrived after the simulation had already asked for it.
    Late,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCounts {
    pub missing: usize,
    pub received: usize,
    pub filled: usize,
    pub late: usize,
}

/// Debug ring recording a [`FrameStatus`] for each recent frame.
#[derive(Debug, Clone)]
pub struct FrameGraph {
    slots: Vec<(i32, FrameStatus)>,
}

impl FrameGraph {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "frame graph capacity must be non-zero");
        Self {
            slots: vec![(i32::MIN, FrameStatus::Missing); capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn index(&self, frame: i32) -> usize {
        frame.rem_euclid(self.slots.len() as i32) as usize
    }

    pub fn mark(&mut self, frame: i32, status: FrameStatus) {
        let index = self.index(frame);
        self.slots[index] = (frame, status);
    }

    pub fn status(&self, frame: i32) -> FrameStatus {
        match self.slots[self.index(frame)] {
            (f, status) if f == frame => status,
            _ => FrameStatus::Missing,
        }
    }

    /// Tally over the `capacity` frames ending at `latest`.
    pub fn counts(&self, latest: i32) -> FrameCounts {
        let mut counts = FrameCounts::default();
        for back in 0..self.slots.len() as i32 {
            match self.status(latest.wrapping_sub(back)) {
                FrameStatus::Missing => counts.missing += 1,
                FrameStatus::Received => counts.received += 1,
                FrameStatus::Filled => counts.filled += 1,
                FrameStatus::Late => counts.late += 1,
            }
        }
        counts
    }

    /// Statuses oldest first over the `capacity` frames ending at `latest`.
    pub fn history(&self, latest: i32) -> impl Iterator<Item = FrameStatus> + '_ {
        let len = self.slots.len() as i32;
        (0..len).rev().map(move |back| self.status(latest.wrapping_sub(back)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmarked_frames_are_missing() {
        let graph = FrameGraph::new(8);
        assert_eq!(graph.status(3), FrameStatus::Missing);
        assert_eq!(graph.counts(7).missing, 8);
    }

    #[test]
    fn reused_slot_forgets_old_frame() {
        let mut graph = FrameGraph::new(8);
        graph.mark(2, FrameStatus::Received);
        graph.mark(10, FrameStatus::Late);

        assert_eq!(graph.status(2), FrameStatus::Missing);
        assert_eq!(graph.status(10), FrameStatus::Late);
    }

    #[test]
    fn counts_window() {
        let mut graph = FrameGraph::new(4);
        graph.mark(0, FrameStatus::Received);
        graph.mark(1, FrameStatus::Filled);
        graph.mark(3, FrameStatus::Late);

        let counts = graph.counts(3);
        assert_eq!(
            counts,
            FrameCounts {
                missing: 1,
                received: 1,
                filled: 1,
                late: 1
            }
        );
        assert_eq!(
            graph.history(3).collect::<Vec<_>>(),
            vec![
                FrameStatus::Received,
                FrameStatus::Filled,
                FrameStatus::Missing,
                FrameStatus::Late
            ]
        );
    }
}
