use bitflags::bitflags;

use crate::net::{CodecError, Msg};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Actions: u8 {
        const JUMP = 1 << 0;
        const SPRINT = 1 << 1;
        const CROUCH = 1 << 2;
        const PRIMARY = 1 << 3;
        const SECONDARY = 1 << 4;
        const USE = 1 << 5;
    }
}

const AXIS_SCALE: f32 = 127.0;

/// Player input sampled for one simulation frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UserCommand {
    pub frame: i32,
    pub heading_x: f32,
    pub heading_z: f32,
    /// Strafe axis, -127 (left) to 127 (right).
    pub horizontal: i8,
    /// Forward axis, -127 (back) to 127 (forward).
    pub vertical: i8,
    pub actions: Actions,
}

impl UserCommand {
    pub const WIRE_SIZE: usize = 11;

    /// No input, facing -Z.
    pub fn idle(frame: i32) -> Self {
        Self {
            frame,
            heading_x: 0.0,
            heading_z: -1.0,
            ..Default::default()
        }
    }

    pub fn quantize_axis(value: f32) -> i8 {
        (value.clamp(-1.0, 1.0) * AXIS_SCALE).round() as i8
    }

    pub fn horizontal_axis(&self) -> f32 {
        (self.horizontal as f32 / AXIS_SCALE).clamp(-1.0, 1.0)
    }

    pub fn vertical_axis(&self) -> f32 {
        (self.vertical as f32 / AXIS_SCALE).clamp(-1.0, 1.0)
    }

    /// Frame numbers are implied by position in a client frame and are not
    /// part of the record.
    pub fn encode<B: AsRef<[u8]> + AsMut<[u8]>>(&self, msg: &mut Msg<B>) -> Result<(), CodecError> {
        msg.write_f32(self.heading_x)?;
        msg.write_f32(self.heading_z)?;
        msg.write_i8(self.horizontal)?;
        msg.write_i8(self.vertical)?;
        msg.write_u8(self.actions.bits())
    }

    pub fn decode<B: AsRef<[u8]>>(msg: &mut Msg<B>, frame: i32) -> Result<Self, CodecError> {
        Ok(Self {
            frame,
            heading_x: msg.read_f32()?,
            heading_z: msg.read_f32()?,
            horizontal: msg.read_i8()?,
            vertical: msg.read_i8()?,
            actions: Actions::from_bits_truncate(msg.read_u8()?),
        })
    }
}

/// Ring of user commands addressed by `frame % capacity`.
#[derive(Debug)]
pub struct UserCommandBuffer {
    commands: Vec<Option<UserCommand>>,
    capacity: usize,
    latest: Option<i32>,
}

impl UserCommandBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "command buffer capacity must be non-zero");
        Self {
            commands: vec![None; capacity],
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

    pub fn latest_frame(&self) -> Option<i32> {
        self.latest
    }

    fn in_window(&self, frame: i32) -> bool {
        match self.latest {
            Some(latest) => frame <= latest && frame > latest.saturating_sub(self.capacity as i32),
            None => false,
        }
    }

    /// Stores `command` under its frame. Returns true only when the frame was
    /// not already held; frames that have fallen out of the ring are refused.
    pub fn set(&mut self, command: UserCommand) -> bool {
        let frame = command.frame;
        if let Some(latest) = self.latest {
            if frame <= latest.saturating_sub(self.capacity as i32) {
                return false;
            }
        }
        if self.get(frame).is_some() {
            return false;
        }

        let index = self.index(frame);
        self.commands[index] = Some(command);
        if self.latest.is_none_or(|latest| frame > latest) {
            self.latest = Some(frame);
        }
        true
    }

    /// The command recorded for `frame`, or `None` if it was never written or
    /// its slot has since been reused by a later frame.
    pub fn get(&self, frame: i32) -> Option<&UserCommand> {
        if !self.in_window(frame) {
            return None;
        }
        self.commands[self.index(frame)]
            .as_ref()
            .filter(|command| command.frame == frame)
    }

    pub fn latest(&self) -> Option<&UserCommand> {
        self.get(self.latest?)
    }

    /// Newest recorded command at or before `frame` still inside the ring.
    pub fn nearest_at_or_before(&self, frame: i32) -> Option<&UserCommand> {
        let latest = self.latest?;
        let start = frame.min(latest);
        (0..self.capacity as i32)
            .map_while(|back| start.checked_sub(back))
            .find_map(|f| self.get(f))
    }

    pub fn clear(&mut self) {
        self.commands.fill(None);
        self.latest = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(frame: i32, vertical: i8) -> UserCommand {
        UserCommand {
            vertical,
            ..UserCommand::idle(frame)
        }
    }

    #[test]
    fn wire_record() {
        let original = UserCommand {
            frame: 12,
            heading_x: 0.6,
            heading_z: -0.8,
            horizontal: -127,
            vertical: 64,
            actions: Actions::JUMP | Actions::USE,
        };

        let mut msg = Msg::with_capacity(32);
        original.encode(&mut msg).unwrap();
        assert_eq!(msg.offset(), UserCommand::WIRE_SIZE);

        let mut read = Msg::new(msg.as_bytes());
        assert_eq!(UserCommand::decode(&mut read, 12).unwrap(), original);
    }

    #[test]
    fn axis_quantization() {
        assert_eq!(UserCommand::quantize_axis(1.0), 127);
        assert_eq!(UserCommand::quantize_axis(-3.0), -127);
        assert_eq!(UserCommand::quantize_axis(0.5), 64);
        assert!((command(0, 127).vertical_axis() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn set_reports_new_writes() {
        let mut buffer = UserCommandBuffer::new(8);
        assert!(buffer.set(command(3, 1)));
        assert!(!buffer.set(command(3, 2)));
        assert_eq!(buffer.get(3).unwrap().vertical, 1);
        assert!(buffer.get(4).is_none());
        assert_eq!(buffer.latest_frame(), Some(3));
    }

    #[test]
    fn overwritten_slot_is_not_reinterpreted() {
        let mut buffer = UserCommandBuffer::new(64);
        assert!(buffer.set(command(5, 10)));
        assert!(buffer.set(command(5 + 64, 20)));

        assert!(buffer.get(5).is_none());
        assert_eq!(buffer.get(69).unwrap().vertical, 20);

        // Too old to store once the ring has moved past it.
        assert!(!buffer.set(command(5, 10)));
    }

    #[test]
    fn nearest_falls_back_to_older_frame() {
        let mut buffer = UserCommandBuffer::new(16);
        buffer.set(command(10, 1));
        buffer.set(command(12, 2));

        assert_eq!(buffer.nearest_at_or_before(11).unwrap().frame, 10);
        assert_eq!(buffer.nearest_at_or_before(40).unwrap().frame, 12);
        assert!(buffer.nearest_at_or_before(9).is_none());
    }

    #[test]
    fn out_of_order_arrival() {
        let mut buffer = UserCommandBuffer::new(16);
        buffer.set(command(9, 1));
        assert!(buffer.set(command(7, 1)));
        assert_eq!(buffer.latest_frame(), Some(9));
        assert!(buffer.get(7).is_some());
    }
}
