//! # nrbf
//!
//! An encoder and decoder for the .NET Remoting Binary Format: a record-oriented
//! binary encoding of object graphs with class metadata, shared references and
//! cycles.
//!
//! ## Overview
//!
//! A stream is a flat sequence of records. Each object (class instance, string
//! or array) appears exactly once and carries an integer id; every later use of
//! the same object is a `MemberReference` to that id. Class layouts are
//! described once per stream and reused by id, so a list of a thousand
//! instances of one class carries its member names and types only once.
//!
//! ### Key Features
//!
//! *   **Identity preserving:** shared references stay shared and cycles close on
//!     the original object after a round trip.
//! *   **Metadata reuse:** structurally identical class layouts are written once
//!     per stream.
//! *   **Deterministic output:** the same graph always encodes to the same bytes.
//! *   **Hostile-input safe:** the decoder never panics and never allocates more
//!     than the input can justify; depth, object and slot caps are configurable.
//! *   **Parallel batches:** independent streams are encoded or decoded on
//!     Rayon's pool, each call with its own session.
//!
//! ## Architecture
//!
//! ### The Graph Model
//!
//! Data lives in an [`ObjectGraph`]: an arena of [`Object`]s addressed by
//! [`NodeId`]. Slots hold a [`Value`]: null, an inline [`PrimitiveValue`], or a
//! reference to another node. Two slots holding the same `NodeId` share one
//! instance.
//!
//! ### Stream Layout
//!
//! ```text
//! [SerializedStreamHeader] [BinaryLibrary | object record]* [MessageEnd]
//! ```
//!
//! Object records are followed by their member (or element) values, which are
//! either inline primitives or further records. See [`format`] and [`record`].
//!
//! ### Sessions
//!
//! The [`writer`] and [`reader`] engines thread a call-scoped session
//! ([`session`]) through their recursion. It holds the id tables, the class
//! layout cache and the library table; nothing is shared between calls.
//!
//! ## Usage Patterns
//!
//! ### Graph API
//!
//! ```rust
//! use std::sync::Arc;
//! use nrbf::{ClassShape, MemberType, Nrbf, ObjectGraph, Value};
//!
//! let shape = Arc::new(
//!     ClassShape::new("Demo.Node", Some("Demo"))
//!         .member("name", MemberType::String)
//!         .member("next", MemberType::Object),
//! );
//! let mut graph = ObjectGraph::new();
//! let name = graph.add_string("a");
//! let node = graph.add_class(shape, vec![Value::Ref(name), Value::Null]);
//! graph.set_field(node, "next", Value::Ref(node))?;
//! graph.set_root(node);
//!
//! let decoded = Nrbf::decode(&Nrbf::encode(&graph)?)?;
//! let root = decoded.root().ok_or(nrbf::NrbfError::Internal("no root".into()))?;
//! assert_eq!(decoded.follow(root, "next")?, Some(root));
//! # Ok::<(), nrbf::NrbfError>(())
//! ```
//!
//! ### Typed API
//!
//! ```rust
//! use nrbf::{Nrbf, NrbfClass};
//!
//! #[derive(Debug, PartialEq, NrbfClass)]
//! #[nrbf(class = "Demo.Point", library = "Demo")]
//! struct Point {
//!     x: i32,
//!     y: i32,
//!     label: Option<String>,
//! }
//!
//! let p = Point { x: 1, y: 2, label: None };
//! let back: Point = Nrbf::from_bytes(&Nrbf::to_bytes(&p)?)?;
//! assert_eq!(p, back);
//! # Ok::<(), nrbf::NrbfError>(())
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **Encapsulated Unsafe:** the only `unsafe` block memory-maps a file in
//!   [`Nrbf::load`].
//! * **No Panics:** No `unwrap()` or `panic!()` calls in the library (enforced by
//!   clippy lints).
//! * **Comprehensive Errors:** All failures correspond to a [`NrbfError`].

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod api;
pub mod binder;
pub mod error;
pub mod format;
pub mod graph;
pub mod inspector;
pub mod metadata;
pub mod record;

// --- ENGINE MODULES ---
pub mod reader;
pub mod session;
pub mod writer;

// --- INTERNAL IMPLEMENTATION MODULES (Hidden from Docs) ---
#[doc(hidden)]
pub mod io;

// --- MACRO SUPPORT MODULES ---

/// Typed layer used by the derived code.
pub mod rt;

// --- RE-EXPORTS ---

pub use api::{Nrbf, NrbfOptions, TrailingBytes};
pub use binder::{AcceptAll, AllowList, TypeBinder};
pub use error::{NrbfError, ReferenceKind, Result};
pub use format::{BinaryArrayType, PrimitiveType, RecordType};
pub use graph::{
    ArrayLayout, ArrayObject, ClassInstance, NodeId, Object, ObjectGraph, ObjectId, PrimitiveValue,
    Value,
};
pub use inspector::{NrbfInspector, StreamReport};
pub use metadata::{ClassShape, MemberDef, MemberType};
pub use rt::{NrbfClass, NrbfField};

// Re-export the derive macro so it is accessible as `nrbf::NrbfClass`
pub use nrbf_derive::NrbfClass;
