use std::collections::HashMap;

use crate::net::{Msg, PacketError};

use super::entity::EntityState;

pub const SNAPSHOT_VERSION: u8 = 1;

/// World state at one simulation frame.
///
/// A snapshot with a `baseline` is a delta: it carries only the entities that
/// changed since that frame and the ids of the entities removed since then.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub frame: i32,
    pub baseline: Option<i32>,
    pub entities: Vec<EntityState>,
    pub removed: Vec<u16>,
}

impl Snapshot {
    pub fn new(frame: i32) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }

    pub fn with_entities(frame: i32, mut entities: Vec<EntityState>) -> Self {
        entities.sort_by_key(|e| e.id);
        Self {
            frame,
            baseline: None,
            entities,
            removed: Vec::new(),
        }
    }

    pub fn is_delta(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn entity(&self, id: u16) -> Option<&EntityState> {
        self.entities
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|index| &self.entities[index])
    }

    pub fn encoded_len(&self) -> usize {
        1 + 4 + 4 + 2 + self.entities.len() * EntityState::WIRE_SIZE + 2 + self.removed.len() * 2
    }

    pub fn encode<B: AsRef<[u8]> + AsMut<[u8]>>(&self, msg: &mut Msg<B>) -> Result<(), PacketError> {
        let count = u16::try_from(self.entities.len())
            .map_err(|_| PacketError::TooLarge(self.encoded_len()))?;
        let removed = u16::try_from(self.removed.len())
            .map_err(|_| PacketError::TooLarge(self.encoded_len()))?;

        msg.write_u8(SNAPSHOT_VERSION)?;
        msg.write_i32(self.frame)?;
        msg.write_i32(self.baseline.unwrap_or(-1))?;
        msg.write_u16(count)?;
        for entity in &self.entities {
            entity.encode(msg)?;
        }
        msg.write_u16(removed)?;
        for id in &self.removed {
            msg.write_u16(*id)?;
        }
        Ok(())
    }

    pub fn decode<B: AsRef<[u8]>>(msg: &mut Msg<B>) -> Result<Self, PacketError> {
        let version = msg.read_u8()?;
        if version != SNAPSHOT_VERSION {
            return Err(PacketError::UnsupportedVersion(version));
        }

        let frame = msg.read_i32()?;
        if frame < 0 {
            return Err(PacketError::Malformed("negative frame"));
        }
        let baseline = match msg.read_i32()? {
            -1 => None,
            b if b < 0 || b >= frame => return Err(PacketError::Malformed("baseline not before frame")),
            b => Some(b),
        };

        let count = msg.read_u16()? as usize;
        if count * EntityState::WIRE_SIZE > msg.remaining() {
            return Err(PacketError::Malformed("entity count exceeds frame"));
        }
        let mut entities = Vec::with_capacity(count);
        for _ in 0..count {
            entities.push(EntityState::decode(msg)?);
        }
        if entities.windows(2).any(|w| w[0].id >= w[1].id) {
            return Err(PacketError::Malformed("entities not ordered by id"));
        }

        let removed_count = msg.read_u16()? as usize;
        if removed_count * 2 > msg.remaining() {
            return Err(PacketError::Malformed("removed count exceeds frame"));
        }
        let mut removed = Vec::with_capacity(removed_count);
        for _ in 0..removed_count {
            removed.push(msg.read_u16()?);
        }

        Ok(Self {
            frame,
            baseline,
            entities,
            removed,
        })
    }

    /// Entities that differ from `baseline`, plus the ids it held that are gone.
    pub fn delta_from(&self, baseline: &Snapshot) -> Snapshot {
        let entities = self
            .entities
            .iter()
            .filter(|e| baseline.entity(e.id) != Some(*e))
            .copied()
            .collect();
        let removed = baseline
            .entities
            .iter()
            .filter(|e| self.entity(e.id).is_none())
            .map(|e| e.id)
            .collect();

        Snapshot {
            frame: self.frame,
            baseline: Some(baseline.frame),
            entities,
            removed,
        }
    }

    /// Rebuilds the full snapshot this delta was taken against `baseline`.
    pub fn apply_to(&self, baseline: &Snapshot) -> Result<Snapshot, PacketError> {
        match self.baseline {
            None => return Ok(self.clone()),
            Some(frame) if frame != baseline.frame => {
                return Err(PacketError::MissingBaseline(frame));
            }
            Some(_) => {}
        }

        let mut merged: HashMap<u16, EntityState> =
            baseline.entities.iter().map(|e| (e.id, *e)).collect();
        for id in &self.removed {
            merged.remove(id);
        }
        for entity in &self.entities {
            merged.insert(entity.id, *entity);
        }

        Ok(Snapshot::with_entities(
            self.frame,
            merged.into_values().collect(),
        ))
    }

    /// Writes the interpolation of `from` towards `to` into `dst`. Entities
    /// present only in `from` are held; entities only in `to` are left out
    /// until they exist on both sides.
    pub fn lerp_into(from: &Snapshot, to: &Snapshot, t: f32, dst: &mut Snapshot) {
        dst.frame = from.frame;
        dst.baseline = None;
        dst.removed.clear();
        dst.entities.clear();
        dst.entities.extend(from.entities.iter().map(|a| match to.entity(a.id) {
            Some(b) => a.lerp(b, t),
            None => *a,
        }));
    }
}
