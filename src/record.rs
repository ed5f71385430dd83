//! The closed set of records that make up a stream.
//!
//! [`Record`] is a tagged union with one variant per wire record. Each variant
//! holds the record's fixed-layout part; values that are themselves records
//! (class members, object/string array elements) follow it in the stream and
//! are handled by the reader and writer, which need the session tables to
//! interpret them.
//!
//! The four class-record variants share one payload type, [`ClassRecord`],
//! so every consumer interprets members the same way regardless of which
//! variant carried the metadata. `ClassWithId` only names a metadata id; its
//! layout is whatever the referenced [`ClassRecord`] declared.

use crate::error::{NrbfError, Result};
use crate::format::{BinaryArrayType, BinaryType, PrimitiveType, RecordType, SerializationHeader};
use crate::graph::{ObjectId, PrimitiveValue};
use crate::io::{ByteReader, ByteWriter};
use crate::metadata::{ClassInfo, MemberTypeInfo, TypeInfo};

/// Which of the four class-record variants carried the metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassRecordKind {
    /// `ClassWithMembersAndTypes`.
    MembersAndTypes,
    /// `SystemClassWithMembersAndTypes`.
    SystemMembersAndTypes,
    /// `ClassWithMembers`.
    Members,
    /// `SystemClassWithMembers`.
    SystemMembers,
}

impl ClassRecordKind {
    /// The tag byte of this variant.
    pub fn record_type(self) -> RecordType {
        match self {
            Self::MembersAndTypes => RecordType::ClassWithMembersAndTypes,
            Self::SystemMembersAndTypes => RecordType::SystemClassWithMembersAndTypes,
            Self::Members => RecordType::ClassWithMembers,
            Self::SystemMembers => RecordType::SystemClassWithMembers,
        }
    }

    /// Returns true for the variants that carry `MemberTypeInfo`.
    pub fn has_types(self) -> bool {
        matches!(self, Self::MembersAndTypes | Self::SystemMembersAndTypes)
    }

    /// Returns true for the variants that carry a library id.
    pub fn has_library(self) -> bool {
        matches!(self, Self::MembersAndTypes | Self::Members)
    }
}

/// Shared payload of every class record that defines a layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRecord {
    /// Variant.
    pub kind: ClassRecordKind,
    /// Id, name and member names.
    pub info: ClassInfo,
    /// Member types; `None` for the untyped variants.
    pub member_types: Option<MemberTypeInfo>,
    /// Owning library; `None` for system classes.
    pub library_id: Option<ObjectId>,
}

impl ClassRecord {
    fn read(kind: ClassRecordKind, input: &mut ByteReader<'_>) -> Result<Self> {
        let info = ClassInfo::read(input)?;
        let member_types = if kind.has_types() {
            Some(MemberTypeInfo::read(info.member_names.len(), input)?)
        } else {
            None
        };
        let library_id = if kind.has_library() {
            Some(ObjectId::new(input.read_i32()?))
        } else {
            None
        };
        Ok(Self {
            kind,
            info,
            member_types,
            library_id,
        })
    }

    fn write(&self, out: &mut ByteWriter) -> Result<()> {
        self.info.write(out)?;
        match (&self.member_types, self.kind.has_types()) {
            (Some(types), true) if types.0.len() == self.info.member_names.len() => {
                types.write(out)?
            }
            (None, false) => {}
            _ => {
                return Err(NrbfError::Internal(format!(
                    "class record {:?} has inconsistent member type info",
                    self.kind
                )));
            }
        }
        match (self.library_id, self.kind.has_library()) {
            (Some(id), true) => out.write_i32(id.as_i32()),
            (None, false) => {}
            _ => {
                return Err(NrbfError::Internal(format!(
                    "class record {:?} has inconsistent library id",
                    self.kind
                )));
            }
        }
        Ok(())
    }
}

/// Fixed part of a `BinaryArray` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryArrayRecord {
    /// Id of the array.
    pub object_id: ObjectId,
    /// Array shape.
    pub array_type: BinaryArrayType,
    /// Length of each dimension.
    pub lengths: Vec<usize>,
    /// Lower bound of each dimension, present for the offset variants.
    pub lower_bounds: Option<Vec<i32>>,
    /// Element type.
    pub element: TypeInfo,
}

impl BinaryArrayRecord {
    /// Total number of element slots that follow the record.
    pub fn slot_count(&self) -> Result<usize> {
        self.lengths
            .iter()
            .try_fold(1usize, |acc, len| acc.checked_mul(*len))
            .ok_or_else(|| NrbfError::format("array dimensions overflow"))
    }

    fn read(input: &mut ByteReader<'_>) -> Result<Self> {
        let object_id = ObjectId::new(input.read_i32()?);
        let array_type = BinaryArrayType::try_from(input.read_u8()?)?;
        let rank = input.read_count("array rank")?;
        if rank == 0 {
            return Err(NrbfError::format("array rank must be at least 1"));
        }
        if matches!(
            array_type,
            BinaryArrayType::Single
                | BinaryArrayType::SingleOffset
                | BinaryArrayType::Jagged
                | BinaryArrayType::JaggedOffset
        ) && rank != 1
        {
            return Err(NrbfError::format(format!(
                "{array_type:?} array must have rank 1, found {rank}"
            )));
        }
        // Each dimension needs four bytes for its length.
        if rank > input.remaining() / 4 {
            return Err(NrbfError::Truncated {
                needed: rank * 4,
                remaining: input.remaining(),
            });
        }
        let lengths = (0..rank)
            .map(|_| input.read_count("array length"))
            .collect::<Result<Vec<_>>>()?;
        let lower_bounds = if array_type.has_lower_bounds() {
            Some(
                (0..rank)
                    .map(|_| input.read_i32())
                    .collect::<Result<Vec<_>>>()?,
            )
        } else {
            None
        };
        let element_kind = BinaryType::try_from(input.read_u8()?)?;
        let element = TypeInfo::read_additional(element_kind, input)?;
        Ok(Self {
            object_id,
            array_type,
            lengths,
            lower_bounds,
            element,
        })
    }

    fn write(&self, out: &mut ByteWriter) -> Result<()> {
        out.write_i32(self.object_id.as_i32());
        out.write_u8(self.array_type.as_u8());
        out.write_count(self.lengths.len(), "array rank")?;
        for len in &self.lengths {
            out.write_count(*len, "array length")?;
        }
        match (&self.lower_bounds, self.array_type.has_lower_bounds()) {
            (Some(bounds), true) if bounds.len() == self.lengths.len() => {
                for bound in bounds {
                    out.write_i32(*bound);
                }
            }
            (None, false) => {}
            _ => {
                return Err(NrbfError::unsupported(format!(
                    "lower bounds do not match array type {:?}",
                    self.array_type
                )));
            }
        }
        out.write_u8(self.element.binary_type().as_u8());
        self.element.write_additional(out)
    }
}

/// One wire record.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// `SerializedStreamHeader`.
    Header(SerializationHeader),
    /// Any of the four layout-defining class records.
    Class(ClassRecord),
    /// `ClassWithId`: a new instance reusing an earlier layout.
    ClassWithId {
        /// Id of the new object.
        object_id: ObjectId,
        /// Id of the class record whose layout applies.
        metadata_id: ObjectId,
    },
    /// `BinaryObjectString`.
    BinaryObjectString {
        /// Id of the string.
        object_id: ObjectId,
        /// Contents.
        value: String,
    },
    /// `BinaryArray`.
    BinaryArray(BinaryArrayRecord),
    /// `ArraySinglePrimitive`, including its inline elements.
    ArraySinglePrimitive {
        /// Id of the array.
        object_id: ObjectId,
        /// Element kind.
        kind: PrimitiveType,
        /// Elements.
        values: Vec<PrimitiveValue>,
    },
    /// `ArraySingleObject`; `length` element records follow.
    ArraySingleObject {
        /// Id of the array.
        object_id: ObjectId,
        /// Element count.
        length: usize,
    },
    /// `ArraySingleString`; `length` element records follow.
    ArraySingleString {
        /// Id of the array.
        object_id: ObjectId,
        /// Element count.
        length: usize,
    },
    /// `MemberPrimitiveTyped`: a boxed primitive.
    MemberPrimitiveTyped(PrimitiveValue),
    /// `MemberReference`.
    MemberReference {
        /// Referenced object.
        id_ref: ObjectId,
    },
    /// `ObjectNull`.
    ObjectNull,
    /// `ObjectNullMultiple256`.
    ObjectNullMultiple256(u8),
    /// `ObjectNullMultiple`.
    ObjectNullMultiple(u32),
    /// `BinaryLibrary`.
    BinaryLibrary {
        /// Id of the library.
        library_id: ObjectId,
        /// Library (assembly) name.
        name: String,
    },
    /// `MessageEnd`.
    MessageEnd,
}

impl Record {
    /// The record for a run of `count` nulls, choosing the compact form
    /// whenever it fits.
    pub fn null_run(count: usize) -> Result<Self> {
        Ok(match count {
            0 => return Err(NrbfError::Internal("empty null run".into())),
            1 => Self::ObjectNull,
            2..=255 => Self::ObjectNullMultiple256(count as u8),
            _ => Self::ObjectNullMultiple(u32::try_from(count).map_err(|_| {
                NrbfError::unsupported(format!("null run of {count} does not fit in i32"))
            })?),
        })
    }

    /// The tag byte of this record.
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Header(_) => RecordType::SerializedStreamHeader,
            Self::Class(c) => c.kind.record_type(),
            Self::ClassWithId { .. } => RecordType::ClassWithId,
            Self::BinaryObjectString { .. } => RecordType::BinaryObjectString,
            Self::BinaryArray(_) => RecordType::BinaryArray,
            Self::ArraySinglePrimitive { .. } => RecordType::ArraySinglePrimitive,
            Self::ArraySingleObject { .. } => RecordType::ArraySingleObject,
            Self::ArraySingleString { .. } => RecordType::ArraySingleString,
            Self::MemberPrimitiveTyped(_) => RecordType::MemberPrimitiveTyped,
            Self::MemberReference { .. } => RecordType::MemberReference,
            Self::ObjectNull => RecordType::ObjectNull,
            Self::ObjectNullMultiple256(_) => RecordType::ObjectNullMultiple256,
            Self::ObjectNullMultiple(_) => RecordType::ObjectNullMultiple,
            Self::BinaryLibrary { .. } => RecordType::BinaryLibrary,
            Self::MessageEnd => RecordType::MessageEnd,
        }
    }

    /// The id this record defines, if any.
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Self::Class(c) => Some(c.info.object_id),
            Self::ClassWithId { object_id, .. }
            | Self::BinaryObjectString { object_id, .. }
            | Self::ArraySinglePrimitive { object_id, .. }
            | Self::ArraySingleObject { object_id, .. }
            | Self::ArraySingleString { object_id, .. } => Some(*object_id),
            Self::BinaryArray(a) => Some(a.object_id),
            Self::BinaryLibrary { library_id, .. } => Some(*library_id),
            _ => None,
        }
    }

    /// Number of value slots a null record fills, `None` for other records.
    pub fn null_count(&self) -> Option<usize> {
        match self {
            Self::ObjectNull => Some(1),
            Self::ObjectNullMultiple256(n) => Some(usize::from(*n)),
            Self::ObjectNullMultiple(n) => Some(*n as usize),
            _ => None,
        }
    }

    /// Parses one record: tag byte plus fixed-layout part.
    pub fn read(input: &mut ByteReader<'_>) -> Result<Self> {
        let tag = input.read_u8()?;
        let record_type = RecordType::try_from(tag)?;
        Ok(match record_type {
            RecordType::SerializedStreamHeader => {
                return Err(NrbfError::format("header record inside the stream body"));
            }
            RecordType::ClassWithId => Self::ClassWithId {
                object_id: ObjectId::new(input.read_i32()?),
                metadata_id: ObjectId::new(input.read_i32()?),
            },
            RecordType::SystemClassWithMembers => {
                Self::Class(ClassRecord::read(ClassRecordKind::SystemMembers, input)?)
            }
            RecordType::ClassWithMembers => {
                Self::Class(ClassRecord::read(ClassRecordKind::Members, input)?)
            }
            RecordType::SystemClassWithMembersAndTypes => {
                Self::Class(ClassRecord::read(ClassRecordKind::SystemMembersAndTypes, input)?)
            }
            RecordType::ClassWithMembersAndTypes => {
                Self::Class(ClassRecord::read(ClassRecordKind::MembersAndTypes, input)?)
            }
            RecordType::BinaryObjectString => Self::BinaryObjectString {
                object_id: ObjectId::new(input.read_i32()?),
                value: input.read_string()?,
            },
            RecordType::BinaryArray => Self::BinaryArray(BinaryArrayRecord::read(input)?),
            RecordType::MemberPrimitiveTyped => {
                let kind = PrimitiveType::try_from(input.read_u8()?)?.ensure_inline()?;
                Self::MemberPrimitiveTyped(PrimitiveValue::read(kind, input)?)
            }
            RecordType::MemberReference => Self::MemberReference {
                id_ref: ObjectId::new(input.read_i32()?),
            },
            RecordType::ObjectNull => Self::ObjectNull,
            RecordType::MessageEnd => Self::MessageEnd,
            RecordType::BinaryLibrary => Self::BinaryLibrary {
                library_id: ObjectId::new(input.read_i32()?),
                name: input.read_string()?,
            },
            RecordType::ObjectNullMultiple256 => match input.read_u8()? {
                0 => return Err(NrbfError::format("empty null run")),
                n => Self::ObjectNullMultiple256(n),
            },
            RecordType::ObjectNullMultiple => match input.read_count("null count")? {
                0 => return Err(NrbfError::format("empty null run")),
                n => Self::ObjectNullMultiple(n as u32),
            },
            RecordType::ArraySinglePrimitive => {
                let object_id = ObjectId::new(input.read_i32()?);
                let length = input.read_count("array length")?;
                let kind = PrimitiveType::try_from(input.read_u8()?)?.ensure_inline()?;
                let needed = length.saturating_mul(PrimitiveValue::min_size(kind));
                if needed > input.remaining() {
                    return Err(NrbfError::Truncated {
                        needed,
                        remaining: input.remaining(),
                    });
                }
                let values = (0..length)
                    .map(|_| PrimitiveValue::read(kind, input))
                    .collect::<Result<Vec<_>>>()?;
                Self::ArraySinglePrimitive {
                    object_id,
                    kind,
                    values,
                }
            }
            RecordType::ArraySingleObject => Self::ArraySingleObject {
                object_id: ObjectId::new(input.read_i32()?),
                length: input.read_count("array length")?,
            },
            RecordType::ArraySingleString => Self::ArraySingleString {
                object_id: ObjectId::new(input.read_i32()?),
                length: input.read_count("array length")?,
            },
            RecordType::MethodCall | RecordType::MethodReturn => {
                return Err(NrbfError::format(format!(
                    "unsupported record type {record_type:?}"
                )));
            }
        })
    }

    /// Serializes the record: tag byte plus fixed-layout part.
    pub fn write(&self, out: &mut ByteWriter) -> Result<()> {
        if let Self::Header(header) = self {
            header.write(out);
            return Ok(());
        }
        out.write_u8(self.record_type().as_u8());
        match self {
            Self::Header(_) | Self::ObjectNull | Self::MessageEnd => {}
            Self::Class(class) => class.write(out)?,
            Self::ClassWithId {
                object_id,
                metadata_id,
            } => {
                out.write_i32(object_id.as_i32());
                out.write_i32(metadata_id.as_i32());
            }
            Self::BinaryObjectString { object_id, value } => {
                out.write_i32(object_id.as_i32());
                out.write_string(value)?;
            }
            Self::BinaryArray(array) => array.write(out)?,
            Self::ArraySinglePrimitive {
                object_id,
                kind,
                values,
            } => {
                out.write_i32(object_id.as_i32());
                out.write_count(values.len(), "array length")?;
                out.write_u8(kind.as_u8());
                for value in values {
                    if value.kind() != *kind {
                        return Err(NrbfError::unsupported(format!(
                            "{:?} element in {kind:?} array",
                            value.kind()
                        )));
                    }
                    value.write(out)?;
                }
            }
            Self::ArraySingleObject { object_id, length }
            | Self::ArraySingleString { object_id, length } => {
                out.write_i32(object_id.as_i32());
                out.write_count(*length, "array length")?;
            }
            Self::MemberPrimitiveTyped(value) => {
                out.write_u8(value.kind().as_u8());
                value.write(out)?;
            }
            Self::MemberReference { id_ref } => out.write_i32(id_ref.as_i32()),
            Self::ObjectNullMultiple256(n) => out.write_u8(*n),
            Self::ObjectNullMultiple(n) => out.write_count(*n as usize, "null count")?,
            Self::BinaryLibrary { library_id, name } => {
                out.write_i32(library_id.as_i32());
                out.write_string(name)?;
            }
        }
        Ok(())
    }
}
