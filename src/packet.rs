//! Length-prefixed binary packet codec.
//!
//! A writable packet is an append-only byte buffer; a readable packet is a
//! cursor over a borrowed byte slice. The codec provides *no* schema -
//! higher layers (entity `serialize`/`deserialize`, command payloads, the
//! wire protocol envelope) must pair every write with a matching read in the
//! same order.
//!
//! Primitive encoding is little-endian, two's complement, IEEE 754. A
//! boolean is one byte, zero or one. A length prefix is a signed 32-bit
//! integer; `-1` denotes a null blob, distinct from an empty blob (length
//! zero). Reading past the end of the buffer fails with
//! [`TssError::Truncated`].

use crate::TssError;

/// An append-only byte buffer written with the packet codec's primitives.
#[derive(Debug, Clone, Default)]
pub struct WritePacket {
    buf: Vec<u8>,
}

impl WritePacket {
    /// Creates an empty packet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty packet with at least `capacity` bytes reserved.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Consumes the packet, returning the underlying bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Borrows the bytes written so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Writes a boolean as one byte (0 or 1).
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    /// Writes a little-endian `i16`.
    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian `u16`.
    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian `i32`.
    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian `u32`.
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian `i64`.
    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian `u64`.
    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian IEEE 754 `f32`.
    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian IEEE 754 `f64`.
    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a length-prefixed byte blob. `None` is encoded as length `-1`
    /// (a null blob, distinct from `Some(&[])`, the empty blob).
    pub fn write_blob(&mut self, blob: Option<&[u8]>) {
        match blob {
            None => self.write_i32(-1),
            Some(bytes) => {
                self.write_i32(bytes.len() as i32);
                self.buf.extend_from_slice(bytes);
            },
        }
    }

    /// Writes a UTF-8 string as a length-prefixed blob of its bytes.
    pub fn write_str(&mut self, value: &str) {
        self.write_blob(Some(value.as_bytes()));
    }

    /// Writes a nested packet as a length-prefixed blob of its bytes.
    pub fn write_packet(&mut self, nested: &WritePacket) {
        self.write_blob(Some(nested.as_bytes()));
    }
}

/// A cursor over a borrowed byte slice, read with the packet codec's
/// primitives.
#[derive(Debug, Clone, Copy)]
pub struct ReadPacket<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ReadPacket<'a> {
    /// Wraps `buf` for reading from the start.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TssError> {
        if self.remaining() < n {
            return Err(TssError::Truncated {
                requested: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn peek(&self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n {
            return None;
        }
        Some(&self.buf[self.pos..self.pos + n])
    }

    /// `true` iff a `read_u8` would currently succeed.
    #[must_use]
    pub fn has_u8(&self) -> bool {
        self.remaining() >= 1
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8, TssError> {
        Ok(self.take(1)?[0])
    }

    /// Peeks a single byte without advancing the cursor.
    pub fn peek_u8(&self) -> Result<u8, TssError> {
        self.peek(1)
            .map(|b| b[0])
            .ok_or(TssError::Truncated {
                requested: 1,
                remaining: self.remaining(),
            })
    }

    /// Reads a boolean (one byte, zero or one treated as false/true).
    pub fn read_bool(&mut self) -> Result<bool, TssError> {
        Ok(self.read_u8()? != 0)
    }

    /// `true` iff a `read_i16`/`read_u16` would currently succeed.
    #[must_use]
    pub fn has_u16(&self) -> bool {
        self.remaining() >= 2
    }

    /// Reads a little-endian `i16`.
    pub fn read_i16(&mut self) -> Result<i16, TssError> {
        let bytes: [u8; 2] = self.take(2)?.try_into().expect("exactly 2 bytes");
        Ok(i16::from_le_bytes(bytes))
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, TssError> {
        let bytes: [u8; 2] = self.take(2)?.try_into().expect("exactly 2 bytes");
        Ok(u16::from_le_bytes(bytes))
    }

    /// `true` iff a `read_i32`/`read_u32` would currently succeed.
    #[must_use]
    pub fn has_u32(&self) -> bool {
        self.remaining() >= 4
    }

    /// Reads a little-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32, TssError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("exactly 4 bytes");
        Ok(i32::from_le_bytes(bytes))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, TssError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("exactly 4 bytes");
        Ok(u32::from_le_bytes(bytes))
    }

    /// `true` iff a `read_i64`/`read_u64`/`read_f64` would currently succeed.
    #[must_use]
    pub fn has_u64(&self) -> bool {
        self.remaining() >= 8
    }

    /// Reads a little-endian `i64`.
    pub fn read_i64(&mut self) -> Result<i64, TssError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("exactly 8 bytes");
        Ok(i64::from_le_bytes(bytes))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, TssError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("exactly 8 bytes");
        Ok(u64::from_le_bytes(bytes))
    }

    /// Reads a little-endian IEEE 754 `f32`.
    pub fn read_f32(&mut self) -> Result<f32, TssError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("exactly 4 bytes");
        Ok(f32::from_le_bytes(bytes))
    }

    /// Reads a little-endian IEEE 754 `f64`.
    pub fn read_f64(&mut self) -> Result<f64, TssError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("exactly 8 bytes");
        Ok(f64::from_le_bytes(bytes))
    }

    /// Reads a length-prefixed byte blob. `-1` decodes to `None`; any other
    /// non-negative length (including zero) decodes to `Some`.
    pub fn read_blob(&mut self) -> Result<Option<Vec<u8>>, TssError> {
        let len = self.read_i32()?;
        if len < 0 {
            return Ok(None);
        }
        Ok(Some(self.take(len as usize)?.to_vec()))
    }

    /// Reads a UTF-8 string written with [`WritePacket::write_str`].
    ///
    /// A null blob decodes to an empty string, matching the absence of a
    /// distinct "null string" concept at this layer.
    pub fn read_str(&mut self) -> Result<String, TssError> {
        let bytes = self.read_blob()?.unwrap_or_default();
        String::from_utf8(bytes).map_err(|_| TssError::MalformedCommand {
            reason: "blob is not valid UTF-8",
        })
    }

    /// Reads a nested packet written with [`WritePacket::write_packet`].
    pub fn read_packet(&mut self) -> Result<ReadPacket<'a>, TssError> {
        let bytes = self.read_blob()?.unwrap_or_default();
        // `bytes` is owned; re-borrow a sub-slice of the parent buffer so the
        // returned cursor keeps the original lifetime instead of a leak.
        let start = self.pos - bytes.len();
        Ok(ReadPacket::new(&self.buf[start..self.pos]))
    }
}
