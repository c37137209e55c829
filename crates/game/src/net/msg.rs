//! Cursor-based binary reader/writer over a fixed byte buffer.
//!
//! All multi-byte values are little-endian. A `Msg` is generic over its
//! storage so the same cursor reads borrowed datagrams (`Msg<&[u8]>`) and
//! writes into caller-owned scratch space (`Msg<Vec<u8>>`).

use std::f32::consts::TAU;

pub const MAX_STRING_LEN: usize = u8::MAX as usize;

const ANGLE_SCALE: f32 = 65536.0 / TAU;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("{requested} bytes at offset {offset} exceed buffer of {capacity} bytes")]
    Overflow {
        offset: usize,
        requested: usize,
        capacity: usize,
    },
    #[error("string of {0} bytes exceeds the 255 byte limit")]
    StringTooLong(usize),
    #[error("string is not ASCII")]
    InvalidString,
}

#[derive(Debug, Clone)]
pub struct Msg<B> {
    buf: B,
    offset: usize,
    allow_overflow: bool,
    overflowed: bool,
}

impl Msg<Vec<u8>> {
    /// Zeroed, owned buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(vec![0u8; capacity])
    }
}

impl<B: AsRef<[u8]>> Msg<B> {
    /// Strict cursor: any access past the end is an error.
    pub fn new(buf: B) -> Self {
        Self {
            buf,
            offset: 0,
            allow_overflow: false,
            overflowed: false,
        }
    }

    /// Lenient cursor: an overflowing access rewinds to the start and sets
    /// [`Msg::is_overflowed`] instead of failing. Only for diagnostics output
    /// where a clobbered buffer is acceptable.
    pub fn with_overflow(buf: B) -> Self {
        Self {
            allow_overflow: true,
            ..Self::new(buf)
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn capacity(&self) -> usize {
        self.buf.as_ref().len()
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.offset
    }

    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn reset(&mut self) {
        self.offset = 0;
        self.overflowed = false;
    }

    /// Bytes between the start of the buffer and the cursor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf.as_ref()[..self.offset]
    }

    pub fn into_inner(self) -> B {
        self.buf
    }

    /// Advances the cursor by `n` and returns the offset before the advance.
    pub fn alloc(&mut self, n: usize) -> Result<usize, CodecError> {
        let capacity = self.capacity();
        if let Some(end) = self.offset.checked_add(n).filter(|&end| end <= capacity) {
            let at = self.offset;
            self.offset = end;
            return Ok(at);
        }

        if self.allow_overflow && n <= capacity {
            self.overflowed = true;
            self.offset = n;
            return Ok(0);
        }

        Err(CodecError::Overflow {
            offset: self.offset,
            requested: n,
            capacity,
        })
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let at = self.alloc(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf.as_ref()[at..at + N]);
        Ok(out)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&[u8], CodecError> {
        let at = self.alloc(n)?;
        Ok(&self.buf.as_ref()[at..at + n])
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(u8::from_le_bytes(self.take()?))
    }

    pub fn read_i8(&mut self) -> Result<i8, CodecError> {
        Ok(i8::from_le_bytes(self.take()?))
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        Ok(i16::from_le_bytes(self.take()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    /// Inverse of [`Msg::write_angle16`]; yields radians in `[-PI, PI)`.
    pub fn read_angle16(&mut self) -> Result<f32, CodecError> {
        Ok(self.read_i16()? as f32 / ANGLE_SCALE)
    }

    pub fn read_str(&mut self) -> Result<String, CodecError> {
        let len = self.read_u8()? as usize;
        let bytes = self.read_bytes(len)?;
        if !bytes.is_ascii() {
            return Err(CodecError::InvalidString);
        }
        Ok(bytes.iter().map(|&b| b as char).collect())
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Msg<B> {
    fn put(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let at = self.alloc(bytes.len())?;
        self.buf.as_mut()[at..at + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        self.put(bytes)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), CodecError> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_i8(&mut self, value: i8) -> Result<(), CodecError> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), CodecError> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_i16(&mut self, value: i16) -> Result<(), CodecError> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), CodecError> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), CodecError> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), CodecError> {
        self.put(&value.to_le_bytes())
    }

    /// Quantizes an angle so the full circle spans the 16-bit domain.
    /// Angles outside `[-PI, PI)` wrap to their equivalent.
    pub fn write_angle16(&mut self, radians: f32) -> Result<(), CodecError> {
        debug_assert!(radians.is_finite(), "angle {radians} is not finite");
        let quantized = (radians * ANGLE_SCALE).round() as i64;
        self.write_i16(quantized as i16)
    }

    pub fn write_str(&mut self, value: &str) -> Result<(), CodecError> {
        debug_assert!(value.is_ascii(), "string {value:?} is not ASCII");
        if value.len() > MAX_STRING_LEN {
            return Err(CodecError::StringTooLong(value.len()));
        }
        self.write_u8(value.len() as u8)?;
        self.put(value.as_bytes())
    }
}
