//! Typed layer: maps Rust values onto graph nodes.
//!
//! `#[derive(NrbfClass)]` implements [`NrbfClass`] and [`NrbfField`] for a
//! struct; the impls here cover the field types such a struct may hold. The
//! typed layer always builds trees. Shared instances and cycles are expressed
//! with the [`ObjectGraph`] API directly.

use crate::error::{NrbfError, Result};
use crate::format::PrimitiveType;
use crate::graph::{ArrayObject, ClassInstance, NodeId, ObjectGraph, PrimitiveValue, Value};
use crate::metadata::MemberType;

#[doc(hidden)]
pub use crate::metadata::ClassShape;
#[doc(hidden)]
pub use std::sync::{Arc, OnceLock};

/// A type that can occupy a class member slot.
pub trait NrbfField: Sized {
    /// Declared type of the member.
    fn member_type() -> MemberType;

    /// Converts the value into a slot value, adding nodes to `graph` as needed.
    fn to_value(&self, graph: &mut ObjectGraph) -> Result<Value>;

    /// Rebuilds the value from a slot of `graph`.
    fn from_value(graph: &ObjectGraph, value: &Value) -> Result<Self>;
}

/// A struct mapped onto a class.
pub trait NrbfClass: Sized {
    /// The class layout, shared by every instance.
    fn shape() -> Arc<ClassShape>;

    /// Adds `self` (and everything it owns) to `graph`.
    fn to_node(&self, graph: &mut ObjectGraph) -> Result<NodeId>;

    /// Rebuilds a value from the class node `node`.
    fn from_node(graph: &ObjectGraph, node: NodeId) -> Result<Self>;
}

/// Rust types with a matching inline primitive.
pub trait NrbfPrimitive: Sized + Clone {
    /// Wire kind.
    const KIND: PrimitiveType;

    /// Wraps the value.
    fn into_primitive(self) -> PrimitiveValue;

    /// Unwraps a primitive of kind [`Self::KIND`].
    fn from_primitive(value: &PrimitiveValue) -> Option<Self>;
}

fn type_mismatch(expected: &str, found: &Value) -> NrbfError {
    NrbfError::unsupported(format!("expected {expected}, found {found:?}"))
}

macro_rules! impl_primitive {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl NrbfPrimitive for $t {
                const KIND: PrimitiveType = PrimitiveType::$variant;

                fn into_primitive(self) -> PrimitiveValue {
                    PrimitiveValue::$variant(self)
                }

                fn from_primitive(value: &PrimitiveValue) -> Option<Self> {
                    match value {
                        PrimitiveValue::$variant(v) => Some(*v),
                        _ => None,
                    }
                }
            }

            impl NrbfField for $t {
                fn member_type() -> MemberType {
                    MemberType::Primitive(PrimitiveType::$variant)
                }

                fn to_value(&self, _graph: &mut ObjectGraph) -> Result<Value> {
                    Ok(Value::Primitive(PrimitiveValue::$variant(*self)))
                }

                fn from_value(_graph: &ObjectGraph, value: &Value) -> Result<Self> {
                    value
                        .as_primitive()
                        .and_then(<$t as NrbfPrimitive>::from_primitive)
                        .ok_or_else(|| type_mismatch(stringify!($variant), value))
                }
            }
        )*
    };
}

impl_primitive! {
    bool => Boolean,
    u8 => Byte,
    char => Char,
    f64 => Double,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    i8 => SByte,
    f32 => Single,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
}

impl NrbfField for String {
    fn member_type() -> MemberType {
        MemberType::String
    }

    fn to_value(&self, graph: &mut ObjectGraph) -> Result<Value> {
        Ok(Value::Ref(graph.add_string(self.as_str())))
    }

    fn from_value(graph: &ObjectGraph, value: &Value) -> Result<Self> {
        let node = expect_ref(value, "string")?;
        graph.string(node).map(str::to_owned)
    }
}

/// `None` is written as null. Optional primitives are boxed into an
/// `Object` slot, since inline primitives have no null.
impl<T: NrbfField> NrbfField for Option<T> {
    fn member_type() -> MemberType {
        match T::member_type() {
            MemberType::Primitive(_) => MemberType::Object,
            other => other,
        }
    }

    fn to_value(&self, graph: &mut ObjectGraph) -> Result<Value> {
        match self {
            Some(inner) => inner.to_value(graph),
            None => Ok(Value::Null),
        }
    }

    fn from_value(graph: &ObjectGraph, value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(graph, other).map(Some),
        }
    }
}

impl<T: NrbfPrimitive> NrbfField for Vec<T> {
    fn member_type() -> MemberType {
        MemberType::PrimitiveArray(T::KIND)
    }

    fn to_value(&self, graph: &mut ObjectGraph) -> Result<Value> {
        let items = self
            .iter()
            .map(|v| Value::Primitive(v.clone().into_primitive()))
            .collect();
        Ok(Value::Ref(graph.add_array(ArrayObject::single(
            MemberType::Primitive(T::KIND),
            items,
        ))))
    }

    fn from_value(graph: &ObjectGraph, value: &Value) -> Result<Self> {
        let node = expect_ref(value, "primitive array")?;
        graph
            .array(node)?
            .items
            .iter()
            .map(|item| {
                item.as_primitive()
                    .and_then(T::from_primitive)
                    .ok_or_else(|| type_mismatch(&format!("{:?}", T::KIND), item))
            })
            .collect()
    }
}

/// Returns the node referenced by a non-null slot.
pub fn expect_ref(value: &Value, expected: &str) -> Result<NodeId> {
    value
        .as_ref_node()
        .ok_or_else(|| type_mismatch(expected, value))
}

/// Returns the class node `node`, checking it is an instance of `shape`'s
/// class.
pub fn expect_class<'g>(
    graph: &'g ObjectGraph,
    node: NodeId,
    shape: &ClassShape,
) -> Result<&'g ClassInstance> {
    let instance = graph.class(node)?;
    if instance.shape.name != shape.name {
        return Err(NrbfError::unsupported(format!(
            "expected an instance of {}, found {}",
            shape.name, instance.shape.name
        )));
    }
    Ok(instance)
}

/// Reads member `name` of `instance` as a `T`.
pub fn member<T: NrbfField>(graph: &ObjectGraph, instance: &ClassInstance, name: &str) -> Result<T> {
    let value = instance.field(name).ok_or_else(|| {
        NrbfError::unsupported(format!("class {} has no member {name}", instance.shape.name))
    })?;
    T::from_value(graph, value)
}

/// [`NrbfField::member_type`] for a class-valued member.
pub fn class_member_type(shape: &ClassShape) -> MemberType {
    match &shape.library {
        Some(library) => MemberType::Class {
            name: shape.name.clone(),
            library: library.clone(),
        },
        None => MemberType::SystemClass(shape.name.clone()),
    }
}
