//! Public entry points: the [`Nrbf`] facade and the [`NrbfOptions`] builder.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use rayon::prelude::*;

use crate::binder::{AcceptAll, TypeBinder};
use crate::error::{NrbfError, Result};
use crate::graph::ObjectGraph;
use crate::rt::NrbfClass;
use crate::{reader, writer};

/// Default nesting limit for inline records.
///
/// Encode and decode recurse once per level; 128 levels fit a 2 MiB thread
/// stack in unoptimized builds.
pub const DEFAULT_MAX_DEPTH: usize = 128;
/// Default cap on ids defined by one stream.
pub const DEFAULT_MAX_OBJECTS: usize = 1 << 20;
/// Default cap on member and element slots declared by one stream.
pub const DEFAULT_MAX_SLOTS: usize = 1 << 24;
/// Default cap on slots declared per input byte.
pub const DEFAULT_MAX_SLOTS_PER_BYTE: usize = 64;

/// What to do with bytes that follow `MessageEnd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailingBytes {
    /// Log a warning and return the decoded graph.
    #[default]
    Ignore,
    /// Fail with a format error.
    Reject,
}

/// The main entry point for encoding and decoding object graphs.
///
/// ```rust
/// use std::sync::Arc;
/// use nrbf::{ClassShape, MemberType, Nrbf, ObjectGraph, PrimitiveType, Value};
///
/// let shape = Arc::new(
///     ClassShape::new("Demo.Point", Some("Demo"))
///         .member("x", MemberType::Primitive(PrimitiveType::Int32)),
/// );
/// let mut graph = ObjectGraph::new();
/// let root = graph.add_class(shape, vec![Value::from(7i32)]);
/// graph.set_root(root);
///
/// let bytes = Nrbf::encode(&graph)?;
/// let decoded = Nrbf::decode(&bytes)?;
/// assert!(graph.structurally_eq(root, &decoded, decoded.root().unwrap_or(root)));
/// # Ok::<(), nrbf::NrbfError>(())
/// ```
#[derive(Debug)]
pub struct Nrbf;

impl Nrbf {
    /// Returns a configuration builder.
    pub fn builder() -> NrbfOptions {
        NrbfOptions::default()
    }

    /// Encodes `graph` with default options.
    pub fn encode(graph: &ObjectGraph) -> Result<Vec<u8>> {
        NrbfOptions::default().encode(graph)
    }

    /// Decodes a stream with default options.
    pub fn decode(bytes: &[u8]) -> Result<ObjectGraph> {
        NrbfOptions::default().decode(bytes)
    }

    /// Encodes `graph` into `writer`.
    pub fn write<W: Write>(writer: &mut W, graph: &ObjectGraph) -> Result<()> {
        NrbfOptions::default().write(writer, graph)
    }

    /// Encodes `graph` into a new file at `path`.
    pub fn save<P: AsRef<Path>>(path: P, graph: &ObjectGraph) -> Result<()> {
        NrbfOptions::default().save(path, graph)
    }

    /// Decodes the file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ObjectGraph> {
        NrbfOptions::default().load(path)
    }

    /// Encodes several graphs in parallel.
    pub fn encode_batch(graphs: &[ObjectGraph]) -> Vec<Result<Vec<u8>>> {
        NrbfOptions::default().encode_batch(graphs)
    }

    /// Decodes several streams in parallel.
    pub fn decode_batch(streams: &[&[u8]]) -> Vec<Result<ObjectGraph>> {
        NrbfOptions::default().decode_batch(streams)
    }

    /// Encodes a typed value as the root of a new graph.
    pub fn to_bytes<T: NrbfClass>(value: &T) -> Result<Vec<u8>> {
        NrbfOptions::default().to_bytes(value)
    }

    /// Decodes a stream whose root is a `T`.
    pub fn from_bytes<T: NrbfClass>(bytes: &[u8]) -> Result<T> {
        NrbfOptions::default().from_bytes(bytes)
    }
}

/// Configuration for encode and decode calls.
#[derive(Debug, Clone)]
pub struct NrbfOptions {
    pub(crate) max_depth: usize,
    pub(crate) max_objects: usize,
    pub(crate) max_slots: usize,
    pub(crate) max_slots_per_byte: usize,
    pub(crate) trailing: TrailingBytes,
    pub(crate) binder: Arc<dyn TypeBinder>,
}

impl Default for NrbfOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_objects: DEFAULT_MAX_OBJECTS,
            max_slots: DEFAULT_MAX_SLOTS,
            max_slots_per_byte: DEFAULT_MAX_SLOTS_PER_BYTE,
            trailing: TrailingBytes::Ignore,
            binder: Arc::new(AcceptAll),
        }
    }
}

impl NrbfOptions {
    /// Sets the nesting limit for inline records, applied on both sides.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets the cap on ids a decoded stream may define.
    pub fn max_objects(mut self, count: usize) -> Self {
        self.max_objects = count;
        self
    }

    /// Sets the cap on member and element slots a decoded stream may declare.
    pub fn max_slots(mut self, count: usize) -> Self {
        self.max_slots = count;
        self
    }

    /// Sets how many slots a decoded stream may declare per byte of input.
    ///
    /// A null run record covers any number of slots in a few bytes; this
    /// ties the memory a decode can allocate to the size of its input.
    pub fn max_slots_per_byte(mut self, count: usize) -> Self {
        self.max_slots_per_byte = count;
        self
    }

    /// Slot budget for decoding an input of `len` bytes.
    pub(crate) fn slot_budget(&self, len: usize) -> usize {
        self.max_slots.min(len.saturating_mul(self.max_slots_per_byte))
    }

    /// Sets the trailing-bytes policy.
    pub fn trailing(mut self, policy: TrailingBytes) -> Self {
        self.trailing = policy;
        self
    }

    /// Installs the binder consulted for every decoded class record.
    pub fn binder(mut self, binder: Arc<dyn TypeBinder>) -> Self {
        self.binder = binder;
        self
    }

    /// Encodes `graph`.
    pub fn encode(&self, graph: &ObjectGraph) -> Result<Vec<u8>> {
        writer::encode(graph, self)
    }

    /// Decodes a stream.
    pub fn decode(&self, bytes: &[u8]) -> Result<ObjectGraph> {
        reader::decode(bytes, self)
    }

    /// Encodes `graph` into `writer`.
    pub fn write<W: Write>(&self, writer: &mut W, graph: &ObjectGraph) -> Result<()> {
        let bytes = self.encode(graph)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Encodes `graph` into a new file at `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P, graph: &ObjectGraph) -> Result<()> {
        let path = path.as_ref();
        let mut out = BufWriter::new(File::create(path)?);
        self.write(&mut out, graph)?;
        tracing::debug!(path = %path.display(), "saved object graph");
        Ok(())
    }

    /// Decodes the file at `path` through a memory map.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<ObjectGraph> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(NrbfError::Truncated {
                needed: 1,
                remaining: 0,
            });
        }
        // Safety: the map is read-only and dropped before returning. A file
        // truncated underneath us by another process is outside our control.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        self.decode(&mmap)
    }

    /// Encodes several graphs in parallel; each call owns its session.
    pub fn encode_batch(&self, graphs: &[ObjectGraph]) -> Vec<Result<Vec<u8>>> {
        graphs.par_iter().map(|graph| self.encode(graph)).collect()
    }

    /// Decodes several streams in parallel; each call owns its session.
    pub fn decode_batch(&self, streams: &[&[u8]]) -> Vec<Result<ObjectGraph>> {
        streams.par_iter().map(|bytes| self.decode(bytes)).collect()
    }

    /// Encodes a typed value as the root of a new graph.
    pub fn to_bytes<T: NrbfClass>(&self, value: &T) -> Result<Vec<u8>> {
        let mut graph = ObjectGraph::new();
        let root = value.to_node(&mut graph)?;
        graph.set_root(root);
        self.encode(&graph)
    }

    /// Decodes a stream whose root is a `T`.
    pub fn from_bytes<T: NrbfClass>(&self, bytes: &[u8]) -> Result<T> {
        let graph = self.decode(bytes)?;
        let root = graph
            .root()
            .ok_or_else(|| NrbfError::Internal("decoded graph has no root".into()))?;
        T::from_node(&graph, root)
    }
}
