mod buffer;
mod entity;
mod frame;
mod world;

pub use buffer::SnapshotBuffer;
pub use entity::{EntityState, lerp_angle, wrap_angle};
pub use frame::{SNAPSHOT_VERSION, Snapshot};
pub use world::{CROUCH_MULTIPLIER, FLAG_CROUCHING, FLAG_FIRING, SPRINT_MULTIPLIER, WALK_SPEED, World};
