use std::io;

use super::msg::{CodecError, Msg};

pub const HEADER_SIZE: usize = 8;
pub const MAX_PAYLOAD_SIZE: usize = 1024;
pub const MAX_PACKET_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;
pub const DEFAULT_PORT: u16 = 27015;
pub const DEFAULT_TICK_RATE: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeader {
    pub sequence: u16,
    pub ack: u16,
    pub ack_bitfield: u32,
}

impl PacketHeader {
    pub fn new(sequence: u16, ack: u16, ack_bitfield: u32) -> Self {
        Self {
            sequence,
            ack,
            ack_bitfield,
        }
    }

    pub fn write<B: AsRef<[u8]> + AsMut<[u8]>>(&self, msg: &mut Msg<B>) -> Result<(), CodecError> {
        msg.write_u16(self.sequence)?;
        msg.write_u16(self.ack)?;
        msg.write_u32(self.ack_bitfield)
    }

    pub fn read<B: AsRef<[u8]>>(msg: &mut Msg<B>) -> Result<Self, CodecError> {
        Ok(Self {
            sequence: msg.read_u16()?,
            ack: msg.read_u16()?,
            ack_bitfield: msg.read_u32()?,
        })
    }
}

/// Discriminator written at offset 0 of every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Server = 0,
    Client = 1,
}

impl TryFrom<u8> for FrameKind {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Server),
            1 => Ok(Self::Client),
            other => Err(PacketError::UnknownFrameKind(other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("{0} bytes is too large for buffer")]
    TooLarge(usize),
    #[error("packet of {0} bytes is shorter than the header")]
    Truncated(usize),
    #[error("unknown frame kind {0}")]
    UnknownFrameKind(u8),
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u8),
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
    #[error("delta baseline frame {0} is not buffered")]
    MissingBaseline(i32),
    #[error("no user command recorded for frame {0}")]
    MissingCommand(i32),
    #[error("session is not connected")]
    NotConnected,
    #[error("server full")]
    ServerFull,
    #[error("address already has a session")]
    DuplicatePeer,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = PacketHeader::new(0x0102, 0xFFFE, 0x8000_0001);
        let mut msg = Msg::with_capacity(HEADER_SIZE);
        header.write(&mut msg).unwrap();

        assert_eq!(msg.as_bytes(), &[0x02, 0x01, 0xFE, 0xFF, 0x01, 0x00, 0x00, 0x80]);

        let mut read = Msg::new(msg.as_bytes());
        assert_eq!(PacketHeader::read(&mut read).unwrap(), header);
    }

    #[test]
    fn test_frame_kind_discriminator() {
        assert_eq!(FrameKind::try_from(0).unwrap(), FrameKind::Server);
        assert_eq!(FrameKind::try_from(1).unwrap(), FrameKind::Client);
        assert!(matches!(
            FrameKind::try_from(9),
            Err(PacketError::UnknownFrameKind(9))
        ));
    }
}
