//! Bounds-checked byte cursor used by every decoder layer.

use bytes::Bytes;

use crate::error::{Error, Result};

/// Cursor over a shared byte buffer.
///
/// All reads are bounds-checked and never panic on malformed input.
/// Multi-byte integers are big-endian unless the method says otherwise.
#[derive(Debug, Clone)]
pub struct Reader {
    buf: Bytes,
    pos: usize,
}

impl Reader {
    /// Create a reader positioned at the start of `buf`.
    #[must_use]
    pub fn new(buf: Bytes) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset from the start of the buffer.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Returns `true` once every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Borrow the unread tail without consuming it.
    #[must_use]
    pub fn peek_rest(&self) -> &[u8] {
        &self.buf[self.pos.min(self.buf.len())..]
    }

    /// Peek at the next byte.
    #[must_use]
    pub fn peek_u8(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn ensure(&self, field: &'static str, needed: usize) -> Result<()> {
        if self.remaining() < needed {
            return Err(Error::InsufficientData {
                field,
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    fn read_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N]> {
        self.ensure(field, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    /// Read one byte.
    pub fn read_u8(&mut self, field: &'static str) -> Result<u8> {
        Ok(self.read_array::<1>(field)?[0])
    }

    /// Read a big-endian `u16`.
    pub fn read_u16(&mut self, field: &'static str) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array(field)?))
    }

    /// Read a big-endian `u32`.
    pub fn read_u32(&mut self, field: &'static str) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array(field)?))
    }

    /// Read a big-endian `i32`.
    pub fn read_i32(&mut self, field: &'static str) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_array(field)?))
    }

    /// Read a little-endian `u32`.
    pub fn read_u32_le(&mut self, field: &'static str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array(field)?))
    }

    /// Read a fixed-size array.
    pub fn read_fixed<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N]> {
        self.read_array(field)
    }

    /// Read exactly `len` bytes as a zero-copy view.
    pub fn read_bytes(&mut self, field: &'static str, len: usize) -> Result<Bytes> {
        self.ensure(field, len)?;
        let out = self.buf.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(out)
    }

    /// Read up to `len` bytes, returning the view and whether it was clamped.
    pub fn read_clamped(&mut self, len: usize) -> (Bytes, bool) {
        let take = len.min(self.remaining());
        let out = self.buf.slice(self.pos..self.pos + take);
        self.pos += take;
        (out, take < len)
    }

    /// Consume every remaining byte.
    pub fn read_rest(&mut self) -> Bytes {
        let start = self.pos.min(self.buf.len());
        self.pos = self.buf.len();
        self.buf.slice(start..)
    }

    /// Skip `len` bytes.
    pub fn skip(&mut self, field: &'static str, len: usize) -> Result<()> {
        self.ensure(field, len)?;
        self.pos += len;
        Ok(())
    }

    /// Read a NUL-terminated string, consuming the terminator.
    pub fn read_cstring(&mut self, field: &'static str) -> Result<String> {
        let rest = self.peek_rest();
        let Some(nul) = rest.iter().position(|&b| b == 0) else {
            return Err(Error::UnterminatedString {
                field,
                offset: self.pos,
            });
        };
        let text = String::from_utf8_lossy(&rest[..nul]).into_owned();
        self.pos += nul + 1;
        Ok(text)
    }

    /// Read a NUL-terminated string, accepting the end of the buffer as terminator.
    pub fn read_cstring_lenient(&mut self) -> String {
        let rest = self.peek_rest();
        let end = rest.iter().position(|&b| b == 0);
        let text_len = end.unwrap_or(rest.len());
        let text = String::from_utf8_lossy(&rest[..text_len]).into_owned();
        self.pos += end.map_or(text_len, |nul| nul + 1);
        text
    }

    /// Read a fixed-width ASCII field, trimming trailing NULs and spaces.
    pub fn read_fixed_string(&mut self, field: &'static str, len: usize) -> Result<String> {
        let raw = self.read_bytes(field, len)?;
        Ok(trim_text(&raw))
    }

    /// Split off a sub-reader over the next `len` bytes.
    pub fn sub_reader(&mut self, field: &'static str, len: usize) -> Result<Self> {
        Ok(Self::new(self.read_bytes(field, len)?))
    }
}

/// Decode bytes as text, dropping trailing NULs and padding spaces.
#[must_use]
pub fn trim_text(raw: &[u8]) -> String {
    let end = raw
        .iter()
        .rposition(|&b| b != 0 && b != b' ')
        .map_or(0, |idx| idx + 1);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Decode UTF-16LE text, stopping at the first NUL code unit.
#[must_use]
pub fn utf16le_text(raw: &[u8]) -> String {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_reads_are_big_endian() {
        let mut reader = Reader::new(Bytes::from_static(&[0x01, 0x02, 0x00, 0x00, 0x01, 0x00]));
        assert_eq!(reader.read_u16("a").unwrap(), 0x0102);
        assert_eq!(reader.read_u32("b").unwrap(), 0x0000_0100);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_little_endian_read() {
        let mut reader = Reader::new(Bytes::from_static(&[0x10, 0x00, 0x00, 0x00]));
        assert_eq!(reader.read_u32_le("len").unwrap(), 16);
    }

    #[test]
    fn test_short_read_reports_needed_bytes() {
        let mut reader = Reader::new(Bytes::from_static(&[0x01]));
        let err = reader.read_u32("field").unwrap_err();
        assert_eq!(
            err,
            Error::InsufficientData {
                field: "field",
                needed: 4,
                available: 1
            }
        );
        // A failed read does not move the cursor.
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_cstring_requires_terminator() {
        let mut reader = Reader::new(Bytes::from_static(b"host\0svc"));
        assert_eq!(reader.read_cstring("host").unwrap(), "host");
        assert!(matches!(
            reader.read_cstring("svc"),
            Err(Error::UnterminatedString { offset: 5, .. })
        ));
        assert_eq!(reader.read_cstring_lenient(), "svc");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_clamped_read() {
        let mut reader = Reader::new(Bytes::from_static(&[1, 2, 3]));
        let (data, clamped) = reader.read_clamped(8);
        assert!(clamped);
        assert_eq!(data.as_ref(), &[1, 2, 3]);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_trim_and_utf16() {
        assert_eq!(trim_text(b"TERM  \0\0"), "TERM");
        assert_eq!(utf16le_text(&[b'o', 0, b'k', 0, 0, 0, b'x', 0]), "ok");
    }
}
