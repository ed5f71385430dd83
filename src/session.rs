//! Call-scoped tables shared by the recursive writer and reader.
//!
//! A session is created at the start of one encode or decode call, passed by
//! `&mut` through every recursive step, and dropped when the call returns.
//! Nothing in here is global, so independent calls never share state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{NrbfError, ReferenceKind, Result};
use crate::format::RecordType;
use crate::graph::{IdAllocator, NodeId, ObjectGraph, ObjectId};
use crate::io::ByteWriter;
use crate::metadata::{ClassShape, ShapeCache};
use crate::record::Record;

/// Writer-side state: id allocation, visited map, shape cache, library table.
#[derive(Debug)]
pub struct WriteSession {
    ids: IdAllocator,
    /// Nodes that already own an id. Filled before a node's members are
    /// written, so re-entering a node yields a `MemberReference`.
    assigned: HashMap<NodeId, ObjectId>,
    /// Nodes whose record has been started but not finished.
    open: HashSet<NodeId>,
    /// Id handed to the root before the header was written.
    reserved: Option<(NodeId, ObjectId)>,
    shapes: ShapeCache,
    libraries: HashMap<String, ObjectId>,
    out: ByteWriter,
    records: usize,
}

impl WriteSession {
    /// Creates an empty session.
    pub fn new() -> Self {
        Self {
            ids: IdAllocator::new(),
            assigned: HashMap::new(),
            open: HashSet::new(),
            reserved: None,
            shapes: ShapeCache::new(),
            libraries: HashMap::new(),
            out: ByteWriter::new(),
            records: 0,
        }
    }

    fn allocate(&mut self) -> Result<ObjectId> {
        self.ids
            .next_id()
            .ok_or_else(|| NrbfError::LimitExceeded("object id space exhausted".into()))
    }

    /// Allocates the root's id ahead of time; the header needs it first.
    pub fn reserve_root(&mut self, node: NodeId) -> Result<ObjectId> {
        let id = self.allocate()?;
        self.reserved = Some((node, id));
        Ok(id)
    }

    /// The id already owned by `node`, if any.
    pub fn assigned(&self, node: NodeId) -> Option<ObjectId> {
        self.assigned.get(&node).copied()
    }

    /// Returns true while `node`'s record is being written.
    pub fn is_open(&self, node: NodeId) -> bool {
        self.open.contains(&node)
    }

    /// Gives `node` its id and marks it open. Must precede writing any of
    /// its members.
    pub fn open(&mut self, node: NodeId) -> Result<ObjectId> {
        let id = match self.reserved {
            Some((reserved, id)) if reserved == node => {
                self.reserved = None;
                id
            }
            _ => self.allocate()?,
        };
        self.assigned.insert(node, id);
        self.open.insert(node);
        Ok(id)
    }

    /// Marks `node` finished.
    pub fn close(&mut self, node: NodeId) {
        self.open.remove(&node);
    }

    /// Metadata id of an identical shape written earlier.
    pub fn cached_shape(&self, shape: &ClassShape) -> Option<ObjectId> {
        self.shapes.lookup(shape)
    }

    /// Remembers that `shape` was written in full by record `id`.
    pub fn cache_shape(&mut self, shape: Arc<ClassShape>, id: ObjectId) {
        self.shapes.insert(shape, id);
    }

    /// Returns the id of library `name`, emitting its `BinaryLibrary`
    /// record on first use.
    pub fn library(&mut self, name: &str) -> Result<ObjectId> {
        if let Some(id) = self.libraries.get(name) {
            return Ok(*id);
        }
        let id = self.allocate()?;
        self.emit(&Record::BinaryLibrary {
            library_id: id,
            name: name.to_owned(),
        })?;
        self.libraries.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Appends one record.
    pub fn emit(&mut self, record: &Record) -> Result<()> {
        tracing::trace!(
            record = ?record.record_type(),
            id = record.object_id().map(|id| id.as_i32()),
            "emit"
        );
        self.records += 1;
        record.write(&mut self.out)
    }

    /// Direct access to the output for inline (untagged) values.
    pub fn out(&mut self) -> &mut ByteWriter {
        &mut self.out
    }

    /// Number of records emitted.
    pub fn record_count(&self) -> usize {
        self.records
    }

    /// Number of distinct class shapes written in full.
    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// Consumes the session, returning the encoded bytes.
    pub fn finish(self) -> Vec<u8> {
        self.out.into_inner()
    }
}

impl Default for WriteSession {
    fn default() -> Self {
        Self::new()
    }
}

/// One record consumed by the reader, as reported to the inspector.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RecordEvent {
    /// Offset of the tag byte.
    pub offset: usize,
    /// Record kind.
    pub record_type: RecordType,
    /// Id defined by the record, if any.
    pub object_id: Option<i32>,
    /// Nesting depth (0 for top-level records).
    pub depth: usize,
}

/// Reader-side state: id table, metadata table, library table and the graph
/// under construction.
#[derive(Debug)]
pub struct ReadSession {
    objects: HashMap<ObjectId, NodeId>,
    layouts: HashMap<ObjectId, Arc<ClassShape>>,
    libraries: HashMap<ObjectId, String>,
    graph: ObjectGraph,
    max_objects: usize,
    slots_left: usize,
    events: Option<Vec<RecordEvent>>,
}

impl ReadSession {
    /// Creates an empty session with the given caps.
    pub fn new(max_objects: usize, max_slots: usize) -> Self {
        Self {
            objects: HashMap::new(),
            layouts: HashMap::new(),
            libraries: HashMap::new(),
            graph: ObjectGraph::new(),
            max_objects,
            slots_left: max_slots,
            events: None,
        }
    }

    /// Starts collecting a [`RecordEvent`] per record.
    pub fn record_events(&mut self) {
        self.events = Some(Vec::new());
    }

    /// Appends an event when collection is on.
    pub fn log(&mut self, event: RecordEvent) {
        if let Some(events) = self.events.as_mut() {
            events.push(event);
        }
    }

    fn ensure_fresh(&self, id: ObjectId) -> Result<()> {
        if id.is_null() {
            return Err(NrbfError::format("record defines the null id 0"));
        }
        if self.objects.contains_key(&id) || self.libraries.contains_key(&id) {
            return Err(NrbfError::format(format!("{id} is defined twice")));
        }
        if self.objects.len() + self.libraries.len() >= self.max_objects {
            return Err(NrbfError::LimitExceeded(format!(
                "stream defines more than {} ids",
                self.max_objects
            )));
        }
        Ok(())
    }

    /// Binds a freshly read object record to its graph node.
    pub fn define_object(&mut self, id: ObjectId, node: NodeId) -> Result<()> {
        self.ensure_fresh(id)?;
        self.objects.insert(id, node);
        Ok(())
    }

    /// Registers the layout declared by a class record under its id.
    pub fn define_layout(&mut self, id: ObjectId, shape: Arc<ClassShape>) {
        self.layouts.insert(id, shape);
    }

    /// Registers a `BinaryLibrary` record.
    pub fn define_library(&mut self, id: ObjectId, name: String) -> Result<()> {
        self.ensure_fresh(id)?;
        self.libraries.insert(id, name);
        Ok(())
    }

    /// Resolves a `MemberReference` target.
    pub fn resolve_object(&self, id: ObjectId) -> Result<NodeId> {
        if let Some(node) = self.objects.get(&id) {
            return Ok(*node);
        }
        if self.libraries.contains_key(&id) {
            return Err(NrbfError::format(format!("member reference to library {id}")));
        }
        Err(NrbfError::DanglingReference {
            id,
            kind: ReferenceKind::Member,
        })
    }

    /// Resolves the `MetadataId` of a `ClassWithId`.
    pub fn resolve_layout(&self, id: ObjectId) -> Result<Arc<ClassShape>> {
        if let Some(shape) = self.layouts.get(&id) {
            return Ok(Arc::clone(shape));
        }
        if self.objects.contains_key(&id) || self.libraries.contains_key(&id) {
            return Err(NrbfError::format(format!(
                "metadata id {} does not name a class metadata record",
                id.as_i32()
            )));
        }
        Err(NrbfError::DanglingReference {
            id,
            kind: ReferenceKind::Metadata,
        })
    }

    /// Resolves a library id.
    pub fn resolve_library(&self, id: ObjectId) -> Result<&str> {
        self.libraries
            .get(&id)
            .map(String::as_str)
            .ok_or(NrbfError::DanglingReference {
                id,
                kind: ReferenceKind::Library,
            })
    }

    /// Charges `count` value slots against the slot budget.
    pub fn charge_slots(&mut self, count: usize) -> Result<()> {
        self.slots_left = self.slots_left.checked_sub(count).ok_or_else(|| {
            NrbfError::LimitExceeded("stream declares too many value slots".into())
        })?;
        Ok(())
    }

    /// The graph under construction.
    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    /// The graph under construction, mutably.
    pub fn graph_mut(&mut self) -> &mut ObjectGraph {
        &mut self.graph
    }

    /// Number of object ids defined so far.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Consumes the session, returning the graph and any collected events.
    pub fn finish(self) -> (ObjectGraph, Vec<RecordEvent>) {
        (self.graph, self.events.unwrap_or_default())
    }
}
