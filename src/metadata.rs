//! Class metadata: shapes, their wire encoding, and the writer-side cache.
//!
//! A [`ClassShape`] is the in-memory description of a class layout: name,
//! owning library and the ordered `(member name, member type)` list. On the
//! wire the same information is split into a [`ClassInfo`] (id, name, member
//! names) and a [`MemberTypeInfo`] (one [`TypeInfo`] per member), with library
//! names replaced by library ids.
//!
//! The [`ShapeCache`] decides, per encode call, whether a shape has already
//! been written. Lookup is structural: two shapes are the same only when the
//! class name, library, and every member name and type match in order.

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::Arc;

use twox_hash::XxHash64;

use crate::error::{NrbfError, Result};
use crate::format::{BinaryType, PrimitiveType};
use crate::graph::ObjectId;
use crate::io::{ByteReader, ByteWriter};

/// Declared type of a class member or array element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberType {
    /// Inline primitive of the given kind.
    Primitive(PrimitiveType),
    /// A string (or null).
    String,
    /// Any object, including boxed primitives.
    Object,
    /// A class from the system library, by name.
    SystemClass(String),
    /// A class from a named library.
    Class {
        /// Fully qualified class name.
        name: String,
        /// Library (assembly) name.
        library: String,
    },
    /// An array of objects.
    ObjectArray,
    /// An array of strings.
    StringArray,
    /// An array of primitives of the given kind.
    PrimitiveArray(PrimitiveType),
}

impl MemberType {
    /// The wire discriminant.
    pub fn binary_type(&self) -> BinaryType {
        match self {
            Self::Primitive(_) => BinaryType::Primitive,
            Self::String => BinaryType::String,
            Self::Object => BinaryType::Object,
            Self::SystemClass(_) => BinaryType::SystemClass,
            Self::Class { .. } => BinaryType::Class,
            Self::ObjectArray => BinaryType::ObjectArray,
            Self::StringArray => BinaryType::StringArray,
            Self::PrimitiveArray(_) => BinaryType::PrimitiveArray,
        }
    }

    /// Returns true when values of this type are written inline.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Primitive(_))
    }
}

/// One member of a class shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberDef {
    /// Member (field) name as it appears on the wire.
    pub name: String,
    /// Declared type.
    pub ty: MemberType,
}

/// A class layout.
///
/// ```rust
/// use nrbf::{ClassShape, MemberType, PrimitiveType};
///
/// let shape = ClassShape::new("Demo.Point", Some("Demo"))
///     .member("x", MemberType::Primitive(PrimitiveType::Int32))
///     .member("y", MemberType::Primitive(PrimitiveType::Int32));
/// assert_eq!(shape.members.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassShape {
    /// Fully qualified class name.
    pub name: String,
    /// Owning library, `None` for system classes.
    pub library: Option<String>,
    /// Members in declaration order.
    pub members: Vec<MemberDef>,
}

impl ClassShape {
    /// Creates a shape with no members.
    pub fn new(name: impl Into<String>, library: Option<&str>) -> Self {
        Self {
            name: name.into(),
            library: library.map(str::to_owned),
            members: Vec::new(),
        }
    }

    /// Appends a member.
    pub fn member(mut self, name: impl Into<String>, ty: MemberType) -> Self {
        self.members.push(MemberDef {
            name: name.into(),
            ty,
        });
        self
    }

    /// Returns true for classes defined by the system library.
    pub fn is_system(&self) -> bool {
        self.library.is_none()
    }

    /// Position of the member called `name`.
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }
}

/// Wire form of a member type: like [`MemberType`] with library ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeInfo {
    /// See [`MemberType::Primitive`].
    Primitive(PrimitiveType),
    /// See [`MemberType::String`].
    String,
    /// See [`MemberType::Object`].
    Object,
    /// See [`MemberType::SystemClass`].
    SystemClass(String),
    /// `ClassTypeInfo`.
    Class {
        /// Fully qualified class name.
        name: String,
        /// Id of a `BinaryLibrary` record.
        library_id: ObjectId,
    },
    /// See [`MemberType::ObjectArray`].
    ObjectArray,
    /// See [`MemberType::StringArray`].
    StringArray,
    /// See [`MemberType::PrimitiveArray`].
    PrimitiveArray(PrimitiveType),
}

impl TypeInfo {
    /// The wire discriminant.
    pub fn binary_type(&self) -> BinaryType {
        match self {
            Self::Primitive(_) => BinaryType::Primitive,
            Self::String => BinaryType::String,
            Self::Object => BinaryType::Object,
            Self::SystemClass(_) => BinaryType::SystemClass,
            Self::Class { .. } => BinaryType::Class,
            Self::ObjectArray => BinaryType::ObjectArray,
            Self::StringArray => BinaryType::StringArray,
            Self::PrimitiveArray(_) => BinaryType::PrimitiveArray,
        }
    }

    /// Reads the additional info that follows a `BinaryType` byte.
    pub fn read_additional(binary_type: BinaryType, input: &mut ByteReader<'_>) -> Result<Self> {
        Ok(match binary_type {
            BinaryType::Primitive => {
                Self::Primitive(PrimitiveType::try_from(input.read_u8()?)?.ensure_inline()?)
            }
            BinaryType::String => Self::String,
            BinaryType::Object => Self::Object,
            BinaryType::SystemClass => Self::SystemClass(input.read_string()?),
            BinaryType::Class => Self::Class {
                name: input.read_string()?,
                library_id: ObjectId::new(input.read_i32()?),
            },
            BinaryType::ObjectArray => Self::ObjectArray,
            BinaryType::StringArray => Self::StringArray,
            BinaryType::PrimitiveArray => {
                Self::PrimitiveArray(PrimitiveType::try_from(input.read_u8()?)?.ensure_inline()?)
            }
        })
    }

    /// Writes the additional info (nothing for types that carry none).
    pub fn write_additional(&self, out: &mut ByteWriter) -> Result<()> {
        match self {
            Self::Primitive(kind) | Self::PrimitiveArray(kind) => out.write_u8(kind.as_u8()),
            Self::SystemClass(name) => out.write_string(name)?,
            Self::Class { name, library_id } => {
                out.write_string(name)?;
                out.write_i32(library_id.as_i32());
            }
            Self::String | Self::Object | Self::ObjectArray | Self::StringArray => {}
        }
        Ok(())
    }
}

/// `ClassInfo` structure: object id, class name and member names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    /// Id of the object this record defines; also its metadata id.
    pub object_id: ObjectId,
    /// Fully qualified class name.
    pub name: String,
    /// Member names in order.
    pub member_names: Vec<String>,
}

impl ClassInfo {
    /// Parses a `ClassInfo`.
    pub fn read(input: &mut ByteReader<'_>) -> Result<Self> {
        let object_id = ObjectId::new(input.read_i32()?);
        let name = input.read_string()?;
        let count = input.read_count("member count")?;
        // Each name needs at least its one-byte length prefix.
        if count > input.remaining() {
            return Err(NrbfError::Truncated {
                needed: count,
                remaining: input.remaining(),
            });
        }
        let member_names = (0..count)
            .map(|_| input.read_string())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            object_id,
            name,
            member_names,
        })
    }

    /// Serializes the `ClassInfo`.
    pub fn write(&self, out: &mut ByteWriter) -> Result<()> {
        out.write_i32(self.object_id.as_i32());
        out.write_string(&self.name)?;
        out.write_count(self.member_names.len(), "member count")?;
        for name in &self.member_names {
            out.write_string(name)?;
        }
        Ok(())
    }
}

/// `MemberTypeInfo` structure: one [`TypeInfo`] per member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberTypeInfo(pub Vec<TypeInfo>);

impl MemberTypeInfo {
    /// Parses type info for `count` members: all discriminants first, then
    /// the additional infos in the same order.
    pub fn read(count: usize, input: &mut ByteReader<'_>) -> Result<Self> {
        let kinds = input
            .take(count)?
            .iter()
            .map(|b| BinaryType::try_from(*b))
            .collect::<Result<Vec<_>>>()?;
        let infos = kinds
            .into_iter()
            .map(|kind| TypeInfo::read_additional(kind, input))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(infos))
    }

    /// Serializes the type info.
    pub fn write(&self, out: &mut ByteWriter) -> Result<()> {
        for info in &self.0 {
            out.write_u8(info.binary_type().as_u8());
        }
        for info in &self.0 {
            info.write_additional(out)?;
        }
        Ok(())
    }
}

/// Deterministic hasher for shape lookups.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapeHasher;

impl BuildHasher for ShapeHasher {
    type Hasher = XxHash64;

    fn build_hasher(&self) -> XxHash64 {
        XxHash64::with_seed(0)
    }
}

/// Writer-side record of which shapes were already emitted in full.
#[derive(Debug, Default)]
pub struct ShapeCache {
    written: HashMap<Arc<ClassShape>, ObjectId, ShapeHasher>,
}

impl ShapeCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the metadata id of a structurally identical shape written
    /// earlier in this call.
    pub fn lookup(&self, shape: &ClassShape) -> Option<ObjectId> {
        self.written.get(shape).copied()
    }

    /// Records that `shape` was written in full by the record `id`.
    pub fn insert(&mut self, shape: Arc<ClassShape>, id: ObjectId) {
        self.written.entry(shape).or_insert(id);
    }

    /// Number of distinct shapes written.
    pub fn len(&self) -> usize {
        self.written.len()
    }

    /// Returns true if no shape has been written yet.
    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
    }
}
