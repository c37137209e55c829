use std::f32::consts::TAU;

use glam::Vec2;
use ripple::{Actions, UserCommand};

#[derive(Debug, Clone, Default)]
pub struct InputState {
    /// Planar movement intent; x strafes right, y moves forward.
    pub move_direction: Vec2,
    pub view_yaw: f32,
    pub sprint: bool,
    pub jump: bool,
    pub crouch: bool,
    pub fire1: bool,
    pub fire2: bool,
    pub use_key: bool,
}

impl InputState {
    pub fn to_command(&self, frame: i32) -> UserCommand {
        let mut actions = Actions::empty();
        actions.set(Actions::SPRINT, self.sprint);
        actions.set(Actions::JUMP, self.jump);
        actions.set(Actions::CROUCH, self.crouch);
        actions.set(Actions::PRIMARY, self.fire1);
        actions.set(Actions::SECONDARY, self.fire2);
        actions.set(Actions::USE, self.use_key);

        // Yaw 0 looks down -Z.
        UserCommand {
            frame,
            heading_x: -self.view_yaw.sin(),
            heading_z: -self.view_yaw.cos(),
            horizontal: UserCommand::quantize_axis(self.move_direction.x),
            vertical: UserCommand::quantize_axis(self.move_direction.y),
            actions,
        }
    }
}

/// Drives the avatar without a keyboard: walks a slow circle, sprinting and
/// firing on a fixed cadence.
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    tick_rate: u32,
    /// Seconds per full turn.
    period_secs: f32,
}

impl ScriptedInput {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            tick_rate: tick_rate.max(1),
            period_secs: 8.0,
        }
    }

    pub fn sample(&self, frame: i32) -> InputState {
        let secs = frame.max(0) as f32 / self.tick_rate as f32;
        let whole_secs = secs as u32;

        InputState {
            move_direction: Vec2::Y,
            view_yaw: (secs / self.period_secs).fract() * TAU,
            sprint: whole_secs % 4 >= 2,
            fire1: whole_secs % 3 == 0,
            ..InputState::default()
        }
    }
}
