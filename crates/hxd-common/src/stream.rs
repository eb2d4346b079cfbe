// stream.rs — Typed little-endian binary stream primitives
//
// Every other part of the save subsystem sits on top of these two types.
// A save body is composed entirely in memory by a Writer and flushed to
// disk once; a Reader always operates over an in-memory buffer because
// the compression filter only supports whole-buffer operation.

use thiserror::Error;

/// Failure at the raw stream level. Format-level mismatches are detected
/// by the callers, never here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("unexpected end of stream: wanted {wanted} bytes, {remaining} remain")]
    EndOfStream { wanted: usize, remaining: usize },

    #[error("string of {len} bytes exceeds the stream limit")]
    StringTooLong { len: usize },
}

/// Strings longer than this are refused on read; a length prefix beyond
/// it always means a corrupt or misaligned stream.
pub const MAX_STRING_LEN: usize = 0x10000;

// ============================================================
// Writer
// ============================================================

/// Sequential typed writer over a growable byte buffer.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::with_capacity(4096) }
    }

    /// Bytes written so far.
    pub fn pos(&self) -> usize {
        self.buf.len()
    }

    /// Consume the writer, yielding the composed byte buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_raw(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Length-prefixed string: i32 byte count followed by the raw bytes.
    pub fn write_string(&mut self, s: &str) {
        self.write_i32(s.len() as i32);
        if !s.is_empty() {
            self.buf.extend_from_slice(s.as_bytes());
        }
    }
}

// ============================================================
// Reader
// ============================================================

/// Sequential typed reader over an owned byte buffer.
#[derive(Debug)]
pub struct Reader {
    buf: Vec<u8>,
    pos: usize,
}

impl Reader {
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&[u8], StreamError> {
        if self.remaining() < n {
            return Err(StreamError::EndOfStream { wanted: n, remaining: self.remaining() });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_raw(&mut self, n: usize) -> Result<Vec<u8>, StreamError> {
        Ok(self.take(n)?.to_vec())
    }

    /// Skip n bytes without interpreting them. Used when decoding padded
    /// legacy record layouts whose transient fields carry no state.
    pub fn skip(&mut self, n: usize) -> Result<(), StreamError> {
        self.take(n)?;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, StreamError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, StreamError> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_i16(&mut self) -> Result<i16, StreamError> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u16(&mut self) -> Result<u16, StreamError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, StreamError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, StreamError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_f32(&mut self) -> Result<f32, StreamError> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Inverse of `Writer::write_string`.
    pub fn read_string(&mut self) -> Result<String, StreamError> {
        let len = self.read_i32()?;
        if len <= 0 {
            return Ok(String::new());
        }
        let len = len as usize;
        if len > MAX_STRING_LEN {
            return Err(StreamError::StringTooLong { len });
        }
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Fixed-size C-style string cell: `n` bytes, NUL-terminated or full.
    pub fn read_fixed_string(&mut self, n: usize) -> Result<String, StreamError> {
        let bytes = self.take(n)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(n);
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

impl Writer {
    /// Fixed-size C-style string cell, NUL-padded, silently truncated.
    pub fn write_fixed_string(&mut self, s: &str, n: usize) {
        let mut cell = vec![0u8; n];
        let bytes = s.as_bytes();
        let len = bytes.len().min(n);
        cell[..len].copy_from_slice(&bytes[..len]);
        self.buf.extend_from_slice(&cell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_roundtrip() {
        let mut w = Writer::new();
        w.write_u8(0xAB);
        w.write_i16(-1234);
        w.write_i32(0x1DEA_D666u32 as i32);
        w.write_f32(128.5);
        w.write_string("MAP01");

        let mut r = Reader::new(w.into_inner());
        assert_eq!(r.read_u8().unwrap(), 0xAB);
        assert_eq!(r.read_i16().unwrap(), -1234);
        assert_eq!(r.read_i32().unwrap(), 0x1DEA_D666u32 as i32);
        assert_eq!(r.read_f32().unwrap(), 128.5);
        assert_eq!(r.read_string().unwrap(), "MAP01");
        assert!(r.is_at_end());
    }

    #[test]
    fn test_read_past_end() {
        let mut r = Reader::new(vec![1, 2]);
        assert_eq!(
            r.read_i32(),
            Err(StreamError::EndOfStream { wanted: 4, remaining: 2 })
        );
    }

    #[test]
    fn test_fixed_string_cell() {
        let mut w = Writer::new();
        w.write_fixed_string("FLOOR7_2", 8);
        w.write_fixed_string("F", 8);

        let mut r = Reader::new(w.into_inner());
        assert_eq!(r.read_fixed_string(8).unwrap(), "FLOOR7_2");
        assert_eq!(r.read_fixed_string(8).unwrap(), "F");
    }

    #[test]
    fn test_bogus_string_length_is_an_error() {
        let mut w = Writer::new();
        w.write_i32(0x7FFF_FFFF);
        let mut r = Reader::new(w.into_inner());
        assert!(r.read_string().is_err());
    }

    #[test]
    fn test_empty_string() {
        let mut w = Writer::new();
        w.write_string("");
        let mut r = Reader::new(w.into_inner());
        assert_eq!(r.read_string().unwrap(), "");
    }
}
