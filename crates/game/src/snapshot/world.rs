use std::collections::BTreeMap;

use glam::Vec3;

use crate::simulation::{Actions, UserCommand};

use super::entity::{EntityState, wrap_angle};
use super::frame::Snapshot;

pub const WALK_SPEED: f32 = 4.0;
pub const SPRINT_MULTIPLIER: f32 = 1.8;
pub const CROUCH_MULTIPLIER: f32 = 0.5;

/// Flag bits carried in [`EntityState::flags`].
pub const FLAG_CROUCHING: u8 = 1 << 0;
pub const FLAG_FIRING: u8 = 1 << 1;

/// Authoritative entity set, one avatar per connected session.
#[derive(Debug, Default)]
pub struct World {
    frame: i32,
    entities: BTreeMap<u16, EntityState>,
    next_entity_id: u16,
}

impl World {
    pub fn new() -> Self {
        Self {
            frame: 0,
            entities: BTreeMap::new(),
            next_entity_id: 1,
        }
    }

    pub fn frame(&self) -> i32 {
        self.frame
    }

    pub fn set_frame(&mut self, frame: i32) {
        self.frame = frame;
    }

    pub fn advance_frame(&mut self) {
        self.frame = self.frame.wrapping_add(1);
    }

    pub fn spawn(&mut self, position: Vec3) -> u16 {
        let mut id = self.next_entity_id.max(1);
        while self.entities.contains_key(&id) {
            id = id.wrapping_add(1).max(1);
        }
        self.next_entity_id = id.wrapping_add(1);
        self.entities.insert(id, EntityState::at(id, position));
        id
    }

    pub fn spawn_with_id(&mut self, id: u16, position: Vec3) {
        self.entities.insert(id, EntityState::at(id, position));
    }

    pub fn despawn(&mut self, id: u16) -> Option<EntityState> {
        self.entities.remove(&id)
    }

    pub fn get(&self, id: u16) -> Option<&EntityState> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut EntityState> {
        self.entities.get_mut(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityState> {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Moves entity `id` on the XZ plane along the command's heading.
    pub fn apply_command(&mut self, id: u16, command: &UserCommand, dt: f32) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };

        let forward = Vec3::new(command.heading_x, 0.0, command.heading_z).normalize_or_zero();
        let right = Vec3::new(-forward.z, 0.0, forward.x);
        let wish = (forward * command.vertical_axis() + right * command.horizontal_axis())
            .clamp_length_max(1.0);

        let mut speed = WALK_SPEED;
        if command.actions.contains(Actions::SPRINT) {
            speed *= SPRINT_MULTIPLIER;
        }
        if command.actions.contains(Actions::CROUCH) {
            speed *= CROUCH_MULTIPLIER;
        }

        entity.position += wish * speed * dt;
        if forward != Vec3::ZERO {
            entity.yaw = wrap_angle(f32::atan2(-forward.x, -forward.z));
        }

        entity.flags = 0;
        if command.actions.contains(Actions::CROUCH) {
            entity.flags |= FLAG_CROUCHING;
        }
        if command.actions.contains(Actions::PRIMARY) {
            entity.flags |= FLAG_FIRING;
        }
    }

    /// Full snapshot of the current state, entities ordered by id.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            frame: self.frame,
            baseline: None,
            entities: self.entities.values().copied().collect(),
            removed: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    #[test]
    fn spawn_allocates_unique_ids() {
        let mut world = World::new();
        let a = world.spawn(Vec3::ZERO);
        let b = world.spawn(Vec3::ONE);

        assert_ne!(a, b);
        assert_eq!(world.entity_count(), 2);
        assert_eq!(world.get(b).unwrap().position, Vec3::ONE);

        world.despawn(a);
        assert!(world.get(a).is_none());
    }

    #[test]
    fn snapshot_is_ordered() {
        let mut world = World::new();
        world.spawn_with_id(9, Vec3::ZERO);
        world.spawn_with_id(3, Vec3::ZERO);
        world.advance_frame();

        let snapshot = world.snapshot();
        assert_eq!(snapshot.frame, 1);
        assert_eq!(
            snapshot.entities.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![3, 9]
        );
    }

    #[test]
    fn command_moves_along_heading() {
        let mut world = World::new();
        let id = world.spawn(Vec3::ZERO);

        // Facing -X, pushing forward.
        let command = UserCommand {
            heading_x: -1.0,
            heading_z: 0.0,
            vertical: 127,
            ..UserCommand::idle(0)
        };
        world.apply_command(id, &command, 0.5);

        let entity = world.get(id).unwrap();
        assert!((entity.position - Vec3::new(-WALK_SPEED * 0.5, 0.0, 0.0)).length() < 1e-5);
        assert!((entity.yaw - FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn crouch_slows_and_flags() {
        let mut world = World::new();
        let id = world.spawn(Vec3::ZERO);

        let command = UserCommand {
            heading_z: -1.0,
            vertical: 127,
            actions: Actions::CROUCH | Actions::PRIMARY,
            ..UserCommand::idle(0)
        };
        world.apply_command(id, &command, 1.0);

        let entity = world.get(id).unwrap();
        assert!((entity.position.z + WALK_SPEED * CROUCH_MULTIPLIER).abs() < 1e-5);
        assert_eq!(entity.flags, FLAG_CROUCHING | FLAG_FIRING);
    }
}
