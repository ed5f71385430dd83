//! Defines the wire enumerations and the stream header of the binary format.
//!
//! # Stream Layout
//! A stream is a flat sequence of records, each introduced by a one-byte
//! [`RecordType`] tag:
//!
//! `[SerializedStreamHeader] [Record]* [MessageEnd]`
//!
//! All multi-byte integers are little-endian. Strings are
//! `LengthPrefixedString`s (7-bit varint byte length + UTF-8).

use serde::Serialize;

use crate::error::{NrbfError, Result};
use crate::io::{ByteReader, ByteWriter};

/// Major version written into, and required from, the stream header.
pub const MAJOR_VERSION: i32 = 1;

/// Minor version written into, and required from, the stream header.
pub const MINOR_VERSION: i32 = 0;

/// `HeaderId` emitted by the writer (no remoting headers follow).
pub const NO_HEADER_ID: i32 = -1;

/// Size of a serialized header record including its tag byte.
pub const HEADER_SIZE: usize = 17;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value,)*
        }

        impl $name {
            /// Returns the wire byte.
            pub fn as_u8(self) -> u8 {
                self as u8
            }
        }

        impl TryFrom<u8> for $name {
            type Error = NrbfError;

            fn try_from(byte: u8) -> Result<Self> {
                match byte {
                    $($value => Ok(Self::$variant),)*
                    other => Err(NrbfError::format(format!(concat!("unknown ", $what, " {}"), other))),
                }
            }
        }
    };
}

wire_enum! {
    /// Tag byte introducing every record.
    RecordType, "record type" {
        /// `SerializedStreamHeader`.
        SerializedStreamHeader = 0,
        /// `ClassWithId`.
        ClassWithId = 1,
        /// `SystemClassWithMembers`.
        SystemClassWithMembers = 2,
        /// `ClassWithMembers`.
        ClassWithMembers = 3,
        /// `SystemClassWithMembersAndTypes`.
        SystemClassWithMembersAndTypes = 4,
        /// `ClassWithMembersAndTypes`.
        ClassWithMembersAndTypes = 5,
        /// `BinaryObjectString`.
        BinaryObjectString = 6,
        /// `BinaryArray`.
        BinaryArray = 7,
        /// `MemberPrimitiveTyped`.
        MemberPrimitiveTyped = 8,
        /// `MemberReference`.
        MemberReference = 9,
        /// `ObjectNull`.
        ObjectNull = 10,
        /// `MessageEnd`.
        MessageEnd = 11,
        /// `BinaryLibrary`.
        BinaryLibrary = 12,
        /// `ObjectNullMultiple256`.
        ObjectNullMultiple256 = 13,
        /// `ObjectNullMultiple`.
        ObjectNullMultiple = 14,
        /// `ArraySinglePrimitive`.
        ArraySinglePrimitive = 15,
        /// `ArraySingleObject`.
        ArraySingleObject = 16,
        /// `ArraySingleString`.
        ArraySingleString = 17,
        /// `MethodCall` (remoting; rejected).
        MethodCall = 21,
        /// `MethodReturn` (remoting; rejected).
        MethodReturn = 22,
    }
}

wire_enum! {
    /// How a member or array element is encoded.
    BinaryType, "binary type" {
        /// Inline primitive; additional info is a [`PrimitiveType`].
        Primitive = 0,
        /// A `BinaryObjectString` record.
        String = 1,
        /// Any record.
        Object = 2,
        /// A class from the system library; additional info is the class name.
        SystemClass = 3,
        /// A class from a user library; additional info is `ClassTypeInfo`.
        Class = 4,
        /// An array of objects.
        ObjectArray = 5,
        /// An array of strings.
        StringArray = 6,
        /// An array of primitives; additional info is a [`PrimitiveType`].
        PrimitiveArray = 7,
    }
}

wire_enum! {
    /// Primitive kinds.
    PrimitiveType, "primitive type" {
        /// 1 byte, 0 or 1.
        Boolean = 1,
        /// Unsigned 8-bit.
        Byte = 2,
        /// One UTF-8 encoded scalar value.
        Char = 3,
        /// Decimal literal as a length-prefixed string.
        Decimal = 5,
        /// IEEE 754 binary64.
        Double = 6,
        /// Signed 16-bit.
        Int16 = 7,
        /// Signed 32-bit.
        Int32 = 8,
        /// Signed 64-bit.
        Int64 = 9,
        /// Signed 8-bit.
        SByte = 10,
        /// IEEE 754 binary32.
        Single = 11,
        /// 64-bit tick count.
        TimeSpan = 12,
        /// 62-bit ticks plus 2-bit kind.
        DateTime = 13,
        /// Unsigned 16-bit.
        UInt16 = 14,
        /// Unsigned 32-bit.
        UInt32 = 15,
        /// Unsigned 64-bit.
        UInt64 = 16,
        /// Null marker; never valid inline.
        Null = 17,
        /// String marker; never valid inline.
        String = 18,
    }
}

wire_enum! {
    /// Shape of a `BinaryArray`.
    BinaryArrayType, "binary array type" {
        /// One dimension.
        Single = 0,
        /// Array of arrays.
        Jagged = 1,
        /// Multi-dimensional.
        Rectangular = 2,
        /// One dimension with a lower bound.
        SingleOffset = 3,
        /// Jagged with lower bounds.
        JaggedOffset = 4,
        /// Multi-dimensional with lower bounds.
        RectangularOffset = 5,
    }
}

impl PrimitiveType {
    /// Returns an error for kinds that cannot appear as an inline value.
    pub fn ensure_inline(self) -> Result<Self> {
        match self {
            Self::Null | Self::String => Err(NrbfError::format(format!(
                "primitive type {self:?} is not valid as a value"
            ))),
            other => Ok(other),
        }
    }
}

impl BinaryArrayType {
    /// Returns true for the variants that carry lower bounds.
    pub fn has_lower_bounds(self) -> bool {
        matches!(
            self,
            Self::SingleOffset | Self::JaggedOffset | Self::RectangularOffset
        )
    }
}

/// The first record of every stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializationHeader {
    /// Object id of the root object.
    pub root_id: i32,
    /// Id of the remoting header array, `-1` when absent.
    pub header_id: i32,
    /// Format major version.
    pub major_version: i32,
    /// Format minor version.
    pub minor_version: i32,
}

impl SerializationHeader {
    /// Creates a header pointing at `root_id`.
    pub fn new(root_id: i32) -> Self {
        Self {
            root_id,
            header_id: NO_HEADER_ID,
            major_version: MAJOR_VERSION,
            minor_version: MINOR_VERSION,
        }
    }

    /// Serializes the header including its tag byte.
    pub fn write(&self, out: &mut ByteWriter) {
        out.write_u8(RecordType::SerializedStreamHeader.as_u8());
        out.write_i32(self.root_id);
        out.write_i32(self.header_id);
        out.write_i32(self.major_version);
        out.write_i32(self.minor_version);
    }

    /// Parses the header including its tag byte and validates the version.
    pub fn read(input: &mut ByteReader<'_>) -> Result<Self> {
        let tag = input.read_u8()?;
        if tag != RecordType::SerializedStreamHeader.as_u8() {
            return Err(NrbfError::format(format!(
                "stream must start with a header record, found tag {tag}"
            )));
        }
        let header = Self {
            root_id: input.read_i32()?,
            header_id: input.read_i32()?,
            major_version: input.read_i32()?,
            minor_version: input.read_i32()?,
        };
        if header.major_version != MAJOR_VERSION || header.minor_version != MINOR_VERSION {
            return Err(NrbfError::format(format!(
                "unsupported format version {}.{}",
                header.major_version, header.minor_version
            )));
        }
        if header.root_id == 0 {
            return Err(NrbfError::format("header root id is the null id"));
        }
        Ok(header)
    }
}
