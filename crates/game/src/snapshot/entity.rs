use std::f32::consts::{PI, TAU};

use glam::{EulerRot, Quat, Vec3};

use crate::net::{CodecError, Msg};

/// Replicated state of one entity as carried by a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityState {
    pub id: u16,
    pub position: Vec3,
    /// Radians about +Y.
    pub yaw: f32,
    /// Radians about +X.
    pub pitch: f32,
    pub flags: u8,
}

impl EntityState {
    pub const WIRE_SIZE: usize = 19;

    pub fn new(id: u16) -> Self {
        Self {
            id,
            position: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            flags: 0,
        }
    }

    pub fn at(id: u16, position: Vec3) -> Self {
        Self {
            position,
            ..Self::new(id)
        }
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    pub fn encode<B: AsRef<[u8]> + AsMut<[u8]>>(&self, msg: &mut Msg<B>) -> Result<(), CodecError> {
        msg.write_u16(self.id)?;
        msg.write_f32(self.position.x)?;
        msg.write_f32(self.position.y)?;
        msg.write_f32(self.position.z)?;
        msg.write_angle16(self.yaw)?;
        msg.write_angle16(self.pitch)?;
        msg.write_u8(self.flags)
    }

    pub fn decode<B: AsRef<[u8]>>(msg: &mut Msg<B>) -> Result<Self, CodecError> {
        Ok(Self {
            id: msg.read_u16()?,
            position: Vec3::new(msg.read_f32()?, msg.read_f32()?, msg.read_f32()?),
            yaw: msg.read_angle16()?,
            pitch: msg.read_angle16()?,
            flags: msg.read_u8()?,
        })
    }

    /// Positions interpolate linearly, angles along the shorter arc, and
    /// flags switch over halfway.
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            id: self.id,
            position: self.position.lerp(other.position, t),
            yaw: lerp_angle(self.yaw, other.yaw, t),
            pitch: lerp_angle(self.pitch, other.pitch, t),
            flags: if t < 0.5 { self.flags } else { other.flags },
        }
    }
}

/// Wraps an angle into `[-PI, PI)`.
pub fn wrap_angle(radians: f32) -> f32 {
    (radians + PI).rem_euclid(TAU) - PI
}

pub fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    let delta = wrap_angle(to - from);
    wrap_angle(from + delta * t)
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    const ANGLE_EPSILON: f32 = TAU / 65536.0;

    #[test]
    fn test_wire_layout() {
        let state = EntityState {
            id: 7,
            position: Vec3::new(1.5, -2.0, 100.25),
            yaw: FRAC_PI_2,
            pitch: -0.25,
            flags: 0b101,
        };

        let mut msg = Msg::with_capacity(64);
        state.encode(&mut msg).unwrap();
        assert_eq!(msg.offset(), EntityState::WIRE_SIZE);

        let mut read = Msg::new(msg.as_bytes());
        let decoded = EntityState::decode(&mut read).unwrap();
        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.position, state.position);
        assert!((decoded.yaw - FRAC_PI_2).abs() <= ANGLE_EPSILON);
        assert!((decoded.pitch + 0.25).abs() <= ANGLE_EPSILON);
        assert_eq!(decoded.flags, 0b101);
    }

    #[test]
    fn test_truncated_entity() {
        let mut read = Msg::new(&[0u8; 10][..]);
        assert!(EntityState::decode(&mut read).is_err());
    }

    #[test]
    fn test_lerp_angle_takes_short_way() {
        let from = PI - 0.1;
        let to = -PI + 0.1;

        let mid = lerp_angle(from, to, 0.5);
        assert!((mid.abs() - PI).abs() < 1e-4);

        let quarter = lerp_angle(from, to, 0.25);
        assert!((quarter - (PI - 0.05)).abs() < 1e-4);
    }

    #[test]
    fn test_state_lerp() {
        let a = EntityState {
            flags: 1,
            ..EntityState::at(3, Vec3::ZERO)
        };
        let b = EntityState {
            yaw: 1.0,
            flags: 2,
            ..EntityState::at(3, Vec3::new(10.0, 0.0, -4.0))
        };

        let early = a.lerp(&b, 0.25);
        assert_eq!(early.position, Vec3::new(2.5, 0.0, -1.0));
        assert!((early.yaw - 0.25).abs() < 1e-6);
        assert_eq!(early.flags, 1);
        assert_eq!(a.lerp(&b, 0.5).flags, 2);
    }

    #[test]
    fn test_orientation_from_yaw() {
        let state = EntityState {
            yaw: FRAC_PI_2,
            ..EntityState::new(1)
        };
        let forward = state.orientation() * Vec3::NEG_Z;
        assert!((forward - Vec3::NEG_X).length() < 1e-5);
    }
}
