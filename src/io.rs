//! Bounds-checked byte cursors.
//!
//! [`ByteReader`] never reads past the end of its slice: every accessor checks
//! the remaining length first and reports [`NrbfError::Truncated`] instead of
//! panicking. [`ByteWriter`] is a growable little-endian append buffer.

use crate::error::{NrbfError, Result};

/// Largest length a `LengthPrefixedString` may declare.
const MAX_STRING_LEN: u32 = i32::MAX as u32;

/// A forward-only cursor over an input buffer.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

macro_rules! read_le {
    ($($name:ident => $t:ty),* $(,)?) => {
        $(
            #[doc = concat!("Reads a little-endian `", stringify!($t), "`.")]
            pub fn $name(&mut self) -> Result<$t> {
                Ok(<$t>::from_le_bytes(self.read_array()?))
            }
        )*
    };
}

impl<'a> ByteReader<'a> {
    /// Creates a cursor positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns true once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Consumes exactly `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(NrbfError::Truncated {
                needed: n,
                remaining,
            });
        }
        let start = self.pos;
        self.pos += n;
        self.buf
            .get(start..self.pos)
            .ok_or_else(|| NrbfError::Internal("cursor out of bounds".into()))
    }

    /// Looks at the next byte without consuming it.
    pub fn peek_u8(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    /// Consumes a fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        let [b] = self.read_array::<1>()?;
        Ok(b)
    }

    read_le! {
        read_i8 => i8,
        read_i16 => i16,
        read_u16 => u16,
        read_i32 => i32,
        read_u32 => u32,
        read_i64 => i64,
        read_u64 => u64,
        read_f32 => f32,
        read_f64 => f64,
    }

    /// Reads an `i32` that must be a non-negative count or length.
    ///
    /// `what` names the field for the error message.
    pub fn read_count(&mut self, what: &str) -> Result<usize> {
        let raw = self.read_i32()?;
        usize::try_from(raw).map_err(|_| NrbfError::format(format!("negative {what}: {raw}")))
    }

    /// Reads the 7-bit encoded length prefix of a `LengthPrefixedString`.
    pub fn read_length_prefix(&mut self) -> Result<usize> {
        let mut value: u32 = 0;
        for i in 0..5 {
            let byte = self.read_u8()?;
            if i == 4 && byte & 0xF8 != 0 {
                return Err(NrbfError::format("string length prefix exceeds 31 bits"));
            }
            value |= u32::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value as usize);
            }
        }
        Err(NrbfError::format("string length prefix longer than 5 bytes"))
    }

    /// Reads a `LengthPrefixedString`.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_length_prefix()?;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| NrbfError::format(format!("string is not valid UTF-8: {e}")))
    }
}

/// A little-endian append buffer.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

macro_rules! write_le {
    ($($name:ident => $t:ty),* $(,)?) => {
        $(
            #[doc = concat!("Appends a little-endian `", stringify!($t), "`.")]
            pub fn $name(&mut self, value: $t) {
                self.buf.extend_from_slice(&value.to_le_bytes());
            }
        )*
    };
}

impl ByteWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Borrows the written bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the writer, returning the buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Appends raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Appends one byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    write_le! {
        write_i8 => i8,
        write_i16 => i16,
        write_u16 => u16,
        write_i32 => i32,
        write_u32 => u32,
        write_i64 => i64,
        write_u64 => u64,
        write_f32 => f32,
        write_f64 => f64,
    }

    /// Appends a count or length as a non-negative `i32`.
    pub fn write_count(&mut self, count: usize, what: &str) -> Result<()> {
        let value = i32::try_from(count)
            .map_err(|_| NrbfError::unsupported(format!("{what} {count} does not fit in i32")))?;
        self.write_i32(value);
        Ok(())
    }

    /// Appends a `LengthPrefixedString`.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        let len = u32::try_from(value.len())
            .ok()
            .filter(|len| *len <= MAX_STRING_LEN)
            .ok_or_else(|| NrbfError::unsupported("string longer than i32::MAX bytes"))?;
        let mut rest = len;
        loop {
            let byte = (rest & 0x7F) as u8;
            rest >>= 7;
            if rest == 0 {
                self.buf.push(byte);
                break;
            }
            self.buf.push(byte | 0x80);
        }
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }
}
