use super::frame::Snapshot;

/// Ring of recent snapshots addressed by `frame % capacity`.
#[derive(Debug)]
pub struct SnapshotBuffer {
    snapshots: Vec<Option<Snapshot>>,
    capacity: usize,
    latest: Option<i32>,
}

impl SnapshotBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "snapshot buffer capacity must be non-zero");
        Self {
            snapshots: (0..capacity).map(|_| None).collect(),
            capacity,
            latest: None,
        }
    }

    fn index(&self, frame: i32) -> usize {
        frame.rem_euclid(self.capacity as i32) as usize
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stores `snapshot`, replacing the older frame that occupied its slot.
    /// Returns false if the frame is already present or has fallen out of the
    /// ring.
    pub fn push(&mut self, snapshot: Snapshot) -> bool {
        let frame = snapshot.frame;
        if let Some(latest) = self.latest {
            if frame <= latest.saturating_sub(self.capacity as i32) {
                return false;
            }
        }
        if self.contains(frame) {
            return false;
        }
        let index = self.index(frame);
        self.snapshots[index] = Some(snapshot);
        if self.latest.is_none_or(|latest| frame > latest) {
            self.latest = Some(frame);
        }
        true
    }

    pub fn contains(&self, frame: i32) -> bool {
        self.get(frame).is_some()
    }

    pub fn get(&self, frame: i32) -> Option<&Snapshot> {
        self.snapshots[self.index(frame)]
            .as_ref()
            .filter(|s| s.frame == frame)
    }

    pub fn latest_frame(&self) -> Option<i32> {
        self.latest
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.get(self.latest?)
    }

    /// Newest stored frame at or before `frame`, looking back at most one
    /// ring's worth.
    pub fn nearest_at_or_before(&self, frame: i32) -> Option<&Snapshot> {
        (0..self.capacity as i32)
            .map_while(|back| frame.checked_sub(back))
            .find_map(|f| self.get(f))
    }

    /// Interpolates the world at fractional frame `time` into `dst`.
    ///
    /// When the frame after `floor(time)` has not arrived, or `floor(time)`
    /// itself is missing, the newest earlier snapshot is held. Returns false
    /// only when nothing at or before `time` is buffered.
    pub fn lerp_snapshot(&self, time: f64, dst: &mut Snapshot) -> bool {
        let floor = time.floor();
        let base = floor as i32;
        let t = (time - floor) as f32;

        let Some(from) = self.nearest_at_or_before(base) else {
            return false;
        };

        match self.get(base + 1) {
            Some(to) if from.frame == base => Snapshot::lerp_into(from, to, t, dst),
            _ => Snapshot::lerp_into(from, from, 0.0, dst),
        }
        true
    }

    pub fn clear(&mut self) {
        for slot in &mut self.snapshots {
            *slot = None;
        }
        self.latest = None;
    }

    pub fn len(&self) -> usize {
        self.snapshots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
