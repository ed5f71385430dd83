use crate::error::{NrbfError, Result};
use crate::format::PrimitiveType;
use crate::io::{ByteReader, ByteWriter};

/// An inline primitive value.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    /// `Boolean`.
    Boolean(bool),
    /// `Byte`.
    Byte(u8),
    /// `Char`.
    Char(char),
    /// `Decimal`, kept as its invariant-culture literal.
    Decimal(String),
    /// `Double`.
    Double(f64),
    /// `Int16`.
    Int16(i16),
    /// `Int32`.
    Int32(i32),
    /// `Int64`.
    Int64(i64),
    /// `SByte`.
    SByte(i8),
    /// `Single`.
    Single(f32),
    /// `TimeSpan` in 100ns ticks.
    TimeSpan(i64),
    /// `DateTime` as its raw 64-bit encoding (see [`PrimitiveValue::date_time`]).
    DateTime(u64),
    /// `UInt16`.
    UInt16(u16),
    /// `UInt32`.
    UInt32(u32),
    /// `UInt64`.
    UInt64(u64),
}

impl PrimitiveValue {
    /// Builds a `DateTime` from a tick count and a 2-bit kind
    /// (0 unspecified, 1 UTC, 2 local).
    pub fn date_time(ticks: u64, kind: u8) -> Self {
        Self::DateTime((ticks & 0x3FFF_FFFF_FFFF_FFFF) | (u64::from(kind & 0x03) << 62))
    }

    /// The wire kind of this value.
    pub fn kind(&self) -> PrimitiveType {
        match self {
            Self::Boolean(_) => PrimitiveType::Boolean,
            Self::Byte(_) => PrimitiveType::Byte,
            Self::Char(_) => PrimitiveType::Char,
            Self::Decimal(_) => PrimitiveType::Decimal,
            Self::Double(_) => PrimitiveType::Double,
            Self::Int16(_) => PrimitiveType::Int16,
            Self::Int32(_) => PrimitiveType::Int32,
            Self::Int64(_) => PrimitiveType::Int64,
            Self::SByte(_) => PrimitiveType::SByte,
            Self::Single(_) => PrimitiveType::Single,
            Self::TimeSpan(_) => PrimitiveType::TimeSpan,
            Self::DateTime(_) => PrimitiveType::DateTime,
            Self::UInt16(_) => PrimitiveType::UInt16,
            Self::UInt32(_) => PrimitiveType::UInt32,
            Self::UInt64(_) => PrimitiveType::UInt64,
        }
    }

    /// Reads an untyped value of the given kind.
    pub fn read(kind: PrimitiveType, input: &mut ByteReader<'_>) -> Result<Self> {
        Ok(match kind {
            PrimitiveType::Boolean => match input.read_u8()? {
                0 => Self::Boolean(false),
                1 => Self::Boolean(true),
                other => return Err(NrbfError::format(format!("invalid boolean byte {other}"))),
            },
            PrimitiveType::Byte => Self::Byte(input.read_u8()?),
            PrimitiveType::Char => Self::Char(read_char(input)?),
            PrimitiveType::Decimal => {
                let literal = input.read_string()?;
                if !is_decimal_literal(&literal) {
                    return Err(NrbfError::format(format!("invalid decimal literal {literal:?}")));
                }
                Self::Decimal(literal)
            }
            PrimitiveType::Double => Self::Double(input.read_f64()?),
            PrimitiveType::Int16 => Self::Int16(input.read_i16()?),
            PrimitiveType::Int32 => Self::Int32(input.read_i32()?),
            PrimitiveType::Int64 => Self::Int64(input.read_i64()?),
            PrimitiveType::SByte => Self::SByte(input.read_i8()?),
            PrimitiveType::Single => Self::Single(input.read_f32()?),
            PrimitiveType::TimeSpan => Self::TimeSpan(input.read_i64()?),
            PrimitiveType::DateTime => Self::DateTime(input.read_u64()?),
            PrimitiveType::UInt16 => Self::UInt16(input.read_u16()?),
            PrimitiveType::UInt32 => Self::UInt32(input.read_u32()?),
            PrimitiveType::UInt64 => Self::UInt64(input.read_u64()?),
            PrimitiveType::Null | PrimitiveType::String => {
                return Err(NrbfError::format(format!(
                    "primitive type {kind:?} is not valid as a value"
                )));
            }
        })
    }

    /// Writes the value without a type tag.
    pub fn write(&self, out: &mut ByteWriter) -> Result<()> {
        match self {
            Self::Boolean(v) => out.write_u8(u8::from(*v)),
            Self::Byte(v) => out.write_u8(*v),
            Self::Char(c) => {
                let mut buf = [0u8; 4];
                out.write_bytes(c.encode_utf8(&mut buf).as_bytes());
            }
            Self::Decimal(literal) => {
                if !is_decimal_literal(literal) {
                    return Err(NrbfError::unsupported(format!(
                        "invalid decimal literal {literal:?}"
                    )));
                }
                out.write_string(literal)?;
            }
            Self::Double(v) => out.write_f64(*v),
            Self::Int16(v) => out.write_i16(*v),
            Self::Int32(v) => out.write_i32(*v),
            Self::Int64(v) => out.write_i64(*v),
            Self::SByte(v) => out.write_i8(*v),
            Self::Single(v) => out.write_f32(*v),
            Self::TimeSpan(v) => out.write_i64(*v),
            Self::DateTime(v) => out.write_u64(*v),
            Self::UInt16(v) => out.write_u16(*v),
            Self::UInt32(v) => out.write_u32(*v),
            Self::UInt64(v) => out.write_u64(*v),
        }
        Ok(())
    }

    /// Smallest possible encoded size of one value of `kind`.
    ///
    /// Used to reject array lengths the remaining input cannot hold.
    pub fn min_size(kind: PrimitiveType) -> usize {
        match kind {
            PrimitiveType::Double
            | PrimitiveType::Int64
            | PrimitiveType::TimeSpan
            | PrimitiveType::DateTime
            | PrimitiveType::UInt64 => 8,
            PrimitiveType::Int32 | PrimitiveType::Single | PrimitiveType::UInt32 => 4,
            PrimitiveType::Int16 | PrimitiveType::UInt16 => 2,
            _ => 1,
        }
    }
}

fn read_char(input: &mut ByteReader<'_>) -> Result<char> {
    let lead = input.peek_u8().ok_or(NrbfError::Truncated {
        needed: 1,
        remaining: 0,
    })?;
    let width = match lead {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return Err(NrbfError::format(format!("invalid UTF-8 lead byte {lead:#04x}"))),
    };
    let bytes = input.take(width)?;
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.chars().next())
        .ok_or_else(|| NrbfError::format("invalid UTF-8 character"))
}

/// Accepts `-?digits(.digits)?`, the invariant-culture decimal form.
fn is_decimal_literal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let mut parts = digits.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_ok = parts
        .next()
        .is_none_or(|f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()));
    !int_part.is_empty() && int_part.bytes().all(|b| b.is_ascii_digit()) && frac_ok
}
