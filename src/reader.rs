//! The read-side engine: rebuilds an [`ObjectGraph`] from a stream.
//!
//! The stream is consumed in a single forward pass. Each object record gets a
//! graph node and an id binding *before* its members are read, so a member
//! that refers back to an enclosing object (a cycle) resolves to the node
//! under construction. A `MemberReference` whose target has not been defined
//! yet is rejected: streams produced by [`crate::writer`] never need forward
//! references.
//!
//! Every count and length read from the input is checked against the bytes
//! that remain and against the configured caps before anything is allocated.

use std::sync::Arc;

use crate::api::{NrbfOptions, TrailingBytes};
use crate::binder::TypeBinder;
use crate::error::{NrbfError, Result};
use crate::format::{BinaryArrayType, RecordType, SerializationHeader};
use crate::graph::{ArrayLayout, ArrayObject, NodeId, Object, ObjectGraph, ObjectId, PrimitiveValue, Value};
use crate::io::ByteReader;
use crate::metadata::{ClassShape, MemberDef, MemberType, TypeInfo};
use crate::record::{BinaryArrayRecord, ClassRecord, Record};
use crate::session::{ReadSession, RecordEvent};

/// Everything a decode call learned about the stream.
#[derive(Debug)]
pub struct DecodedStream {
    /// The reconstructed graph, root set.
    pub graph: ObjectGraph,
    /// Root id named by the header.
    pub root_id: ObjectId,
    /// One event per record, when requested.
    pub events: Vec<RecordEvent>,
    /// Bytes left after `MessageEnd`.
    pub trailing_bytes: usize,
}

/// Decodes a complete stream into a graph.
pub fn decode(bytes: &[u8], options: &NrbfOptions) -> Result<ObjectGraph> {
    decode_stream(bytes, options, false).map(|decoded| decoded.graph)
}

/// Decodes a complete stream, optionally recording one event per record.
pub fn decode_stream(bytes: &[u8], options: &NrbfOptions, events: bool) -> Result<DecodedStream> {
    tracing::debug!(bytes = bytes.len(), "decoding object graph");
    read_stream(bytes, options, events)
        .inspect_err(|err| tracing::debug!(%err, "decode aborted"))
}

fn read_stream(bytes: &[u8], options: &NrbfOptions, events: bool) -> Result<DecodedStream> {
    let mut session = ReadSession::new(options.max_objects, options.slot_budget(bytes.len()));
    if events {
        session.record_events();
    }
    let mut reader = GraphReader {
        input: ByteReader::new(bytes),
        session,
        binder: options.binder.as_ref(),
        max_depth: options.max_depth,
    };

    let header = SerializationHeader::read(&mut reader.input)?;
    reader.session.log(RecordEvent {
        offset: 0,
        record_type: RecordType::SerializedStreamHeader,
        object_id: Some(header.root_id),
        depth: 0,
    });

    loop {
        match reader.next_record(0)? {
            Record::MessageEnd => break,
            Record::BinaryLibrary { library_id, name } => {
                reader.session.define_library(library_id, name)?;
            }
            record @ (Record::ObjectNull
            | Record::ObjectNullMultiple256(_)
            | Record::ObjectNullMultiple(_)
            | Record::MemberReference { .. }
            | Record::MemberPrimitiveTyped(_)) => {
                return Err(NrbfError::format(format!(
                    "{:?} record outside of an object",
                    record.record_type()
                )));
            }
            record => {
                reader.read_object(record, 0)?;
            }
        }
    }

    let trailing_bytes = reader.input.remaining();
    if trailing_bytes > 0 {
        match options.trailing {
            TrailingBytes::Ignore => {
                tracing::warn!(trailing_bytes, "ignoring bytes after MessageEnd");
            }
            TrailingBytes::Reject => {
                return Err(NrbfError::format(format!(
                    "{trailing_bytes} trailing bytes after MessageEnd"
                )));
            }
        }
    }

    let root_id = ObjectId::new(header.root_id);
    let root = reader.session.resolve_object(root_id)?;
    let objects = reader.session.object_count();
    let (mut graph, events) = reader.session.finish();
    graph.set_root(root);

    tracing::debug!(objects, bytes = bytes.len(), "decoded object graph");
    Ok(DecodedStream {
        graph,
        root_id,
        events,
        trailing_bytes,
    })
}

/// Result of reading one value position.
enum Slot {
    Value(Value),
    Nulls(usize),
}

/// Declared types of a run of slots.
#[derive(Clone, Copy)]
enum SlotTypes<'s> {
    Members(&'s [MemberDef]),
    Uniform(&'s MemberType),
}

impl<'s> SlotTypes<'s> {
    fn at(self, index: usize) -> Result<&'s MemberType> {
        match self {
            Self::Members(members) => members
                .get(index)
                .map(|m| &m.ty)
                .ok_or_else(|| NrbfError::Internal(format!("no member at index {index}"))),
            Self::Uniform(ty) => Ok(ty),
        }
    }
}

struct GraphReader<'a> {
    input: ByteReader<'a>,
    session: ReadSession,
    binder: &'a dyn TypeBinder,
    max_depth: usize,
}

impl GraphReader<'_> {
    /// Reads the next record, logging it for the inspector.
    fn next_record(&mut self, depth: usize) -> Result<Record> {
        let offset = self.input.position();
        let record = Record::read(&mut self.input)?;
        tracing::trace!(offset, record = ?record.record_type(), depth, "read");
        self.session.log(RecordEvent {
            offset,
            record_type: record.record_type(),
            object_id: record.object_id().map(|id| id.as_i32()),
            depth,
        });
        Ok(record)
    }

    /// Materializes an object-defining record and everything nested in it.
    fn read_object(&mut self, record: Record, depth: usize) -> Result<NodeId> {
        if depth > self.max_depth {
            return Err(NrbfError::LimitExceeded(format!(
                "object nesting deeper than {}",
                self.max_depth
            )));
        }
        match record {
            Record::Class(class) => self.read_class(class, depth),
            Record::ClassWithId {
                object_id,
                metadata_id,
            } => {
                let shape = self.session.resolve_layout(metadata_id)?;
                self.instantiate(object_id, shape, false, depth)
            }
            Record::BinaryObjectString { object_id, value } => {
                let node = self.session.graph_mut().add_string(value);
                self.session.define_object(object_id, node)?;
                Ok(node)
            }
            Record::ArraySinglePrimitive {
                object_id,
                kind,
                values,
            } => {
                self.session.charge_slots(values.len())?;
                let items = values.into_iter().map(Value::Primitive).collect();
                let node = self
                    .session
                    .graph_mut()
                    .add_array(ArrayObject::single(MemberType::Primitive(kind), items));
                self.session.define_object(object_id, node)?;
                Ok(node)
            }
            Record::ArraySingleObject { object_id, length } => {
                self.read_single_array(object_id, MemberType::Object, length, depth)
            }
            Record::ArraySingleString { object_id, length } => {
                self.read_single_array(object_id, MemberType::String, length, depth)
            }
            Record::BinaryArray(array) => self.read_binary_array(array, depth),
            other => Err(NrbfError::format(format!(
                "{:?} record does not define an object",
                other.record_type()
            ))),
        }
    }

    fn read_class(&mut self, class: ClassRecord, depth: usize) -> Result<NodeId> {
        let library = match class.library_id {
            Some(id) => Some(self.session.resolve_library(id)?.to_owned()),
            None => None,
        };
        self.binder.bind(&class.info.name, library.as_deref())?;

        let members = match class.member_types {
            Some(types) => class
                .info
                .member_names
                .into_iter()
                .zip(types.0)
                .map(|(name, info)| {
                    Ok(MemberDef {
                        name,
                        ty: self.member_type(info)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            // Untyped layouts: every member arrives as its own record.
            None => class
                .info
                .member_names
                .into_iter()
                .map(|name| MemberDef {
                    name,
                    ty: MemberType::Object,
                })
                .collect(),
        };
        let shape = Arc::new(ClassShape {
            name: class.info.name,
            library,
            members,
        });
        self.instantiate(class.info.object_id, shape, true, depth)
    }

    /// Creates a class node, binds `object_id` to it, then reads its members.
    ///
    /// A layout-defining record registers its layout before the members are
    /// read, since a nested instance of the same class may already refer to it.
    fn instantiate(
        &mut self,
        object_id: ObjectId,
        shape: Arc<ClassShape>,
        defines_layout: bool,
        depth: usize,
    ) -> Result<NodeId> {
        let node = self
            .session
            .graph_mut()
            .add_class(Arc::clone(&shape), Vec::new());
        self.session.define_object(object_id, node)?;
        if defines_layout {
            self.session.define_layout(object_id, Arc::clone(&shape));
        }
        let values = self.read_slots(SlotTypes::Members(&shape.members), shape.members.len(), depth)?;
        match self.session.graph_mut().get_mut(node) {
            Some(Object::Class(instance)) => instance.values = values,
            _ => return Err(NrbfError::Internal(format!("class node {node} vanished"))),
        }
        Ok(node)
    }

    fn read_single_array(
        &mut self,
        object_id: ObjectId,
        element: MemberType,
        length: usize,
        depth: usize,
    ) -> Result<NodeId> {
        let node = self
            .session
            .graph_mut()
            .add_array(ArrayObject::single(element.clone(), Vec::new()));
        self.session.define_object(object_id, node)?;
        let items = self.read_slots(SlotTypes::Uniform(&element), length, depth)?;
        self.fill_array(node, items)?;
        Ok(node)
    }

    fn read_binary_array(&mut self, array: BinaryArrayRecord, depth: usize) -> Result<NodeId> {
        let element = self.member_type(array.element.clone())?;
        let slots = array.slot_count()?;
        if let MemberType::Primitive(kind) = &element {
            let needed = slots.saturating_mul(PrimitiveValue::min_size(*kind));
            if needed > self.input.remaining() {
                return Err(NrbfError::Truncated {
                    needed,
                    remaining: self.input.remaining(),
                });
            }
        }
        let layout = match array.array_type {
            BinaryArrayType::Single | BinaryArrayType::SingleOffset => ArrayLayout::Single,
            BinaryArrayType::Jagged | BinaryArrayType::JaggedOffset => ArrayLayout::Jagged,
            BinaryArrayType::Rectangular | BinaryArrayType::RectangularOffset => {
                ArrayLayout::Rectangular(array.lengths.clone())
            }
        };
        let node = self.session.graph_mut().add_array(ArrayObject {
            layout,
            lower_bounds: array.lower_bounds,
            element: element.clone(),
            items: Vec::new(),
        });
        self.session.define_object(array.object_id, node)?;
        let items = self.read_slots(SlotTypes::Uniform(&element), slots, depth)?;
        self.fill_array(node, items)?;
        Ok(node)
    }

    fn fill_array(&mut self, node: NodeId, items: Vec<Value>) -> Result<()> {
        match self.session.graph_mut().get_mut(node) {
            Some(Object::Array(array)) => {
                array.items = items;
                Ok(())
            }
            _ => Err(NrbfError::Internal(format!("array node {node} vanished"))),
        }
    }

    /// Reads `count` consecutive slots. Primitive slots are inline; the rest
    /// are records, where one null run may cover several slots.
    fn read_slots(&mut self, types: SlotTypes<'_>, count: usize, depth: usize) -> Result<Vec<Value>> {
        self.session.charge_slots(count)?;
        let mut values = Vec::with_capacity(count.min(self.input.remaining()));
        while values.len() < count {
            let declared = types.at(values.len())?;
            if let MemberType::Primitive(kind) = declared {
                values.push(Value::Primitive(PrimitiveValue::read(*kind, &mut self.input)?));
                continue;
            }
            match self.read_slot(declared, depth)? {
                Slot::Value(value) => values.push(value),
                Slot::Nulls(run) => {
                    let left = count - values.len();
                    if run > left {
                        return Err(NrbfError::format(format!(
                            "null run of {run} overflows the {left} remaining slots"
                        )));
                    }
                    for _ in 0..run {
                        if types.at(values.len())?.is_primitive() {
                            return Err(NrbfError::format("null run covers a primitive member"));
                        }
                        values.push(Value::Null);
                    }
                }
            }
        }
        Ok(values)
    }

    /// Reads the record(s) filling one non-primitive slot of an object at
    /// `depth`.
    fn read_slot(&mut self, declared: &MemberType, depth: usize) -> Result<Slot> {
        loop {
            let value = match self.next_record(depth + 1)? {
                Record::BinaryLibrary { library_id, name } => {
                    self.session.define_library(library_id, name)?;
                    continue;
                }
                Record::ObjectNull => return Ok(Slot::Nulls(1)),
                Record::ObjectNullMultiple256(n) => return Ok(Slot::Nulls(usize::from(n))),
                Record::ObjectNullMultiple(n) => return Ok(Slot::Nulls(n as usize)),
                Record::MemberReference { id_ref } => {
                    let node = self.session.resolve_object(id_ref)?;
                    self.check_fits(node, declared)?;
                    Value::Ref(node)
                }
                Record::MemberPrimitiveTyped(value) => {
                    if *declared != MemberType::Object {
                        return Err(NrbfError::format(format!(
                            "boxed {:?} in a {declared:?} slot",
                            value.kind()
                        )));
                    }
                    Value::Primitive(value)
                }
                Record::MessageEnd => {
                    return Err(NrbfError::format("MessageEnd inside an object"));
                }
                record => {
                    let node = self.read_object(record, depth + 1)?;
                    self.check_fits(node, declared)?;
                    Value::Ref(node)
                }
            };
            return Ok(Slot::Value(value));
        }
    }

    fn check_fits(&self, node: NodeId, declared: &MemberType) -> Result<()> {
        let object = self
            .session
            .graph()
            .get(node)
            .ok_or_else(|| NrbfError::Internal(format!("node {node} is not in the graph")))?;
        if object.fits(declared) {
            Ok(())
        } else {
            Err(NrbfError::format(format!(
                "{} in a slot declared {declared:?}",
                object.kind_name()
            )))
        }
    }

    /// Replaces library ids with library names.
    fn member_type(&self, info: TypeInfo) -> Result<MemberType> {
        Ok(match info {
            TypeInfo::Primitive(kind) => MemberType::Primitive(kind),
            TypeInfo::String => MemberType::String,
            TypeInfo::Object => MemberType::Object,
            TypeInfo::SystemClass(name) => MemberType::SystemClass(name),
            TypeInfo::Class { name, library_id } => MemberType::Class {
                name,
                library: self.session.resolve_library(library_id)?.to_owned(),
            },
            TypeInfo::ObjectArray => MemberType::ObjectArray,
            TypeInfo::StringArray => MemberType::StringArray,
            TypeInfo::PrimitiveArray(kind) => MemberType::PrimitiveArray(kind),
        })
    }
}
