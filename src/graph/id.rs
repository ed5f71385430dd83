use std::fmt;

use serde::Serialize;

/// Identifier carried on the wire by objects, strings, arrays and libraries.
///
/// Ids are unique within one stream. `0` is the null sentinel and is never
/// assigned by [`IdAllocator`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectId(i32);

impl ObjectId {
    /// The null sentinel.
    pub const NULL: Self = Self(0);

    /// Wraps a raw wire value.
    pub fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Returns the raw wire value.
    pub fn as_i32(&self) -> i32 {
        self.0
    }

    /// Returns true for the null sentinel.
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id {}", self.0)
    }
}

/// A handle to an object inside an [`ObjectGraph`](super::ObjectGraph).
///
/// Two values that hold the same `NodeId` point at the same instance.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Restricted to the graph module so handles only come from an arena.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the arena index.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out object ids for one encode call.
///
/// Monotonic, starts at 1, never yields [`ObjectId::NULL`].
#[derive(Debug)]
pub struct IdAllocator {
    next: i64,
}

impl IdAllocator {
    /// Creates an allocator whose first id is 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Returns a fresh id, or `None` once `i32::MAX` has been handed out.
    pub fn next_id(&mut self) -> Option<ObjectId> {
        let id = i32::try_from(self.next).ok()?;
        self.next += 1;
        Some(ObjectId(id))
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> usize {
        usize::try_from(self.next - 1).unwrap_or(usize::MAX)
    }

    /// Positions the allocator so the next id is `next`.
    pub fn starting_at(next: i32) -> Self {
        Self {
            next: i64::from(next),
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
