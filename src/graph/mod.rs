//! The in-memory object graph.
//!
//! An [`ObjectGraph`] is an arena of [`Object`]s addressed by [`NodeId`].
//! The writer walks it from the root; the reader rebuilds one from a stream.

/// Defines the `ObjectGraph` arena and its node types.
pub mod core;
/// Defines `ObjectId`, `NodeId` and the `IdAllocator`.
pub mod id;
/// Defines `PrimitiveValue` and its inline codec.
pub mod primitive;

pub use core::{ArrayLayout, ArrayObject, ClassInstance, Object, ObjectGraph, Value};
pub use id::{IdAllocator, NodeId, ObjectId};
pub use primitive::PrimitiveValue;
