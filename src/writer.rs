//! The write-side engine: walks an [`ObjectGraph`] once and emits records.
//!
//! Traversal is depth-first from the root in member declaration order, so
//! encoding the same graph twice yields identical bytes. Every object gets its
//! id *before* its members are visited; any later encounter of the same node,
//! including one that closes a cycle, is written as a `MemberReference`.
//! Referenced objects are therefore always defined earlier in the stream and
//! the output never contains forward references.

use std::sync::Arc;

use crate::api::NrbfOptions;
use crate::error::{NrbfError, Result};
use crate::format::{BinaryArrayType, SerializationHeader};
use crate::graph::{ArrayLayout, ArrayObject, ClassInstance, NodeId, Object, ObjectGraph, ObjectId, Value};
use crate::metadata::{ClassInfo, MemberType, MemberTypeInfo, TypeInfo};
use crate::record::{BinaryArrayRecord, ClassRecord, ClassRecordKind, Record};
use crate::session::WriteSession;

/// Encodes `graph` into a complete stream.
pub fn encode(graph: &ObjectGraph, options: &NrbfOptions) -> Result<Vec<u8>> {
    let root = graph
        .root()
        .ok_or_else(|| NrbfError::unsupported("graph has no root object"))?;
    if graph.get(root).is_none() {
        return Err(NrbfError::unsupported(format!("root {root} is not in the graph")));
    }

    let mut writer = GraphWriter {
        graph,
        session: WriteSession::new(),
        max_depth: options.max_depth,
    };

    let root_id = writer.session.reserve_root(root)?;
    writer.session.emit(&Record::Header(SerializationHeader::new(root_id.as_i32())))?;
    writer.write_object(root, 0)?;
    writer.session.emit(&Record::MessageEnd)?;

    tracing::debug!(
        objects = graph.len(),
        records = writer.session.record_count(),
        shapes = writer.session.shape_count(),
        "encoded object graph"
    );
    Ok(writer.session.finish())
}

struct GraphWriter<'g> {
    graph: &'g ObjectGraph,
    session: WriteSession,
    max_depth: usize,
}

impl<'g> GraphWriter<'g> {
    fn node(&self, id: NodeId) -> Result<&'g Object> {
        self.graph
            .get(id)
            .ok_or_else(|| NrbfError::unsupported(format!("reference to {id} outside the graph")))
    }

    /// Writes the record for `node`, which must not have been written yet.
    fn write_object(&mut self, node: NodeId, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(NrbfError::LimitExceeded(format!(
                "object nesting deeper than {}",
                self.max_depth
            )));
        }
        let object = self.node(node)?;
        let id = self.session.open(node)?;
        match object {
            Object::String(value) => self.session.emit(&Record::BinaryObjectString {
                object_id: id,
                value: value.clone(),
            })?,
            Object::Class(instance) => self.write_class(id, instance, depth)?,
            Object::Array(array) => self.write_array(id, array, depth)?,
        }
        self.session.close(node);
        Ok(())
    }

    fn write_class(&mut self, id: ObjectId, instance: &ClassInstance, depth: usize) -> Result<()> {
        let shape = &instance.shape;
        if instance.values.len() != shape.members.len() {
            return Err(NrbfError::unsupported(format!(
                "instance of {} has {} values for {} members",
                shape.name,
                instance.values.len(),
                shape.members.len()
            )));
        }

        match self.session.cached_shape(shape) {
            Some(metadata_id) => self.session.emit(&Record::ClassWithId {
                object_id: id,
                metadata_id,
            })?,
            None => {
                // Libraries must precede the record that names them.
                let library_id = match &shape.library {
                    Some(name) => Some(self.session.library(name)?),
                    None => None,
                };
                let types = shape
                    .members
                    .iter()
                    .map(|m| self.type_info(&m.ty))
                    .collect::<Result<Vec<_>>>()?;
                let kind = if library_id.is_some() {
                    ClassRecordKind::MembersAndTypes
                } else {
                    ClassRecordKind::SystemMembersAndTypes
                };
                self.session.emit(&Record::Class(ClassRecord {
                    kind,
                    info: ClassInfo {
                        object_id: id,
                        name: shape.name.clone(),
                        member_names: shape.members.iter().map(|m| m.name.clone()).collect(),
                    },
                    member_types: Some(MemberTypeInfo(types)),
                    library_id,
                }))?;
                self.session.cache_shape(Arc::clone(shape), id);
            }
        }

        for (member, value) in shape.members.iter().zip(&instance.values) {
            self.write_value(value, &member.ty, depth)
                .map_err(|e| match e {
                    NrbfError::UnsupportedType(msg) => NrbfError::UnsupportedType(format!(
                        "{}.{}: {msg}",
                        shape.name, member.name
                    )),
                    other => other,
                })?;
        }
        Ok(())
    }

    fn write_array(&mut self, id: ObjectId, array: &ArrayObject, depth: usize) -> Result<()> {
        let lengths = array.lengths();
        if lengths.is_empty() {
            return Err(NrbfError::unsupported("array with rank 0"));
        }
        let slots = lengths
            .iter()
            .try_fold(1usize, |acc, len| acc.checked_mul(*len))
            .ok_or_else(|| NrbfError::unsupported("array dimensions overflow"))?;
        if slots != array.items.len() {
            return Err(NrbfError::unsupported(format!(
                "array declares {slots} elements but holds {}",
                array.items.len()
            )));
        }

        if array.layout == ArrayLayout::Single && array.lower_bounds.is_none() {
            match &array.element {
                MemberType::Primitive(kind) => {
                    let values = array
                        .items
                        .iter()
                        .map(|item| match item {
                            Value::Primitive(p) if p.kind() == *kind => Ok(p.clone()),
                            other => Err(NrbfError::unsupported(format!(
                                "{other:?} in a {kind:?} array"
                            ))),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    return self.session.emit(&Record::ArraySinglePrimitive {
                        object_id: id,
                        kind: *kind,
                        values,
                    });
                }
                MemberType::String => {
                    self.session.emit(&Record::ArraySingleString {
                        object_id: id,
                        length: array.items.len(),
                    })?;
                    return self.write_elements(&array.items, &array.element, depth);
                }
                MemberType::Object => {
                    self.session.emit(&Record::ArraySingleObject {
                        object_id: id,
                        length: array.items.len(),
                    })?;
                    return self.write_elements(&array.items, &array.element, depth);
                }
                _ => {}
            }
        }

        let offset = array.lower_bounds.is_some();
        let array_type = match (&array.layout, offset) {
            (ArrayLayout::Single, false) => BinaryArrayType::Single,
            (ArrayLayout::Single, true) => BinaryArrayType::SingleOffset,
            (ArrayLayout::Jagged, false) => BinaryArrayType::Jagged,
            (ArrayLayout::Jagged, true) => BinaryArrayType::JaggedOffset,
            (ArrayLayout::Rectangular(_), false) => BinaryArrayType::Rectangular,
            (ArrayLayout::Rectangular(_), true) => BinaryArrayType::RectangularOffset,
        };
        let element = self.type_info(&array.element)?;
        self.session.emit(&Record::BinaryArray(BinaryArrayRecord {
            object_id: id,
            array_type,
            lengths,
            lower_bounds: array.lower_bounds.clone(),
            element,
        }))?;
        self.write_elements(&array.items, &array.element, depth)
    }

    /// Writes array elements, folding consecutive nulls into one record.
    fn write_elements(&mut self, items: &[Value], element: &MemberType, depth: usize) -> Result<()> {
        let mut nulls = 0usize;
        for item in items {
            if item.is_null() && !element.is_primitive() {
                nulls += 1;
                continue;
            }
            if nulls > 0 {
                self.session.emit(&Record::null_run(nulls)?)?;
                nulls = 0;
            }
            self.write_value(item, element, depth)?;
        }
        if nulls > 0 {
            self.session.emit(&Record::null_run(nulls)?)?;
        }
        Ok(())
    }

    /// Writes one slot value according to its declared type.
    fn write_value(&mut self, value: &Value, declared: &MemberType, depth: usize) -> Result<()> {
        match (declared, value) {
            (MemberType::Primitive(kind), Value::Primitive(p)) if p.kind() == *kind => {
                p.write(self.session.out())
            }
            (MemberType::Primitive(kind), other) => Err(NrbfError::unsupported(format!(
                "{other:?} in a {kind:?} slot"
            ))),
            (_, Value::Null) => self.session.emit(&Record::ObjectNull),
            (MemberType::Object, Value::Primitive(p)) => {
                self.session.emit(&Record::MemberPrimitiveTyped(p.clone()))
            }
            (_, Value::Primitive(p)) => Err(NrbfError::unsupported(format!(
                "boxed {:?} in a {declared:?} slot",
                p.kind()
            ))),
            (_, Value::Ref(node)) => {
                let object = self.node(*node)?;
                if !object.fits(declared) {
                    return Err(NrbfError::unsupported(format!(
                        "{} {node} in a {declared:?} slot",
                        object.kind_name()
                    )));
                }
                if let Some(id) = self.session.assigned(*node) {
                    return self.session.emit(&Record::MemberReference { id_ref: id });
                }
                if self.session.is_open(*node) {
                    return Err(NrbfError::CyclicWithoutIdentity(*node));
                }
                self.write_object(*node, depth + 1)
            }
        }
    }

    /// Converts a member type to its wire form, emitting any library it names.
    fn type_info(&mut self, ty: &MemberType) -> Result<TypeInfo> {
        Ok(match ty {
            MemberType::Primitive(kind) => TypeInfo::Primitive(kind.ensure_inline().map_err(
                |_| NrbfError::unsupported(format!("{kind:?} is not a member primitive")),
            )?),
            MemberType::String => TypeInfo::String,
            MemberType::Object => TypeInfo::Object,
            MemberType::SystemClass(name) => TypeInfo::SystemClass(name.clone()),
            MemberType::Class { name, library } => TypeInfo::Class {
                name: name.clone(),
                library_id: self.session.library(library)?,
            },
            MemberType::ObjectArray => TypeInfo::ObjectArray,
            MemberType::StringArray => TypeInfo::StringArray,
            MemberType::PrimitiveArray(kind) => {
                TypeInfo::PrimitiveArray(kind.ensure_inline().map_err(|_| {
                    NrbfError::unsupported(format!("{kind:?} is not an array element primitive"))
                })?)
            }
        })
    }
}
