//! Centralized error handling for nrbf.
//!
//! Every failure in the encoder and decoder is reported through [`NrbfError`].
//! The library never panics on malformed input: a stream that does not follow
//! the record grammar ends the current call with an error and the partially
//! reconstructed graph is dropped, never handed to the caller.
//!
//! ## Error Categories
//!
//! - **Format errors** ([`NrbfError::Format`], [`NrbfError::DanglingReference`],
//!   [`NrbfError::Rejected`]): the stream is malformed, inconsistent, or names a
//!   type the host refused. [`NrbfError::is_format`] groups them.
//! - **Truncation** ([`NrbfError::Truncated`]): the input ended inside a record.
//! - **Encoding errors** ([`NrbfError::UnsupportedType`],
//!   [`NrbfError::CyclicWithoutIdentity`]): the graph handed to the writer has
//!   no valid wire representation.
//! - **Limits** ([`NrbfError::LimitExceeded`]): a configured depth or object cap
//!   was hit.
//! - **I/O** ([`NrbfError::Io`]) and **Internal** ([`NrbfError::Internal`]).
//!
//! ## Usage
//!
//! ```rust
//! use nrbf::{Nrbf, NrbfError};
//!
//! match Nrbf::decode(&[0xFF]) {
//!     Ok(_) => unreachable!(),
//!     Err(e) if e.is_format() => eprintln!("malformed stream: {e}"),
//!     Err(e) => eprintln!("other failure: {e}"),
//! }
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

use crate::graph::{NodeId, ObjectId};

/// A specialized `Result` type for nrbf operations.
pub type Result<T> = std::result::Result<T, NrbfError>;

/// What kind of back-reference failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// The `MetadataId` of a `ClassWithId` record.
    Metadata,
    /// The target of a `MemberReference` record.
    Member,
    /// The `LibraryId` of a class record or a `ClassTypeInfo`.
    Library,
}

/// The master error enum covering all failure domains in nrbf.
///
/// The type is `Clone` so batch APIs can hand the same failure to several
/// consumers; I/O errors are wrapped in `Arc` for that reason.
#[derive(Debug, Clone)]
pub enum NrbfError {
    /// Low-level I/O failure while reading or writing a file.
    Io(Arc<io::Error>),

    /// The record stream is malformed: unknown tag, invalid enumeration value,
    /// reference to the wrong kind of record, id redefinition, bad ordering.
    Format(String),

    /// A `MemberReference`, `MetadataId` or `LibraryId` names an id that was
    /// not defined earlier in the stream. Forward references are not supported.
    DanglingReference {
        /// The id that could not be resolved.
        id: ObjectId,
        /// Which field carried it.
        kind: ReferenceKind,
    },

    /// The input ended before the current record was complete.
    Truncated {
        /// Bytes the current field required.
        needed: usize,
        /// Bytes that were left in the input.
        remaining: usize,
    },

    /// The writer met a value that has no encodable shape in the slot it
    /// occupies (e.g. a string in an `Int32` field).
    UnsupportedType(String),

    /// The writer re-entered a node that is being written but has no object
    /// id. Traversal assigns ids before recursing, so this indicates a bug.
    CyclicWithoutIdentity(NodeId),

    /// The configured [`TypeBinder`](crate::binder::TypeBinder) refused a class.
    Rejected {
        /// Fully qualified class name from the stream.
        class: String,
        /// Library name, `None` for system classes.
        library: Option<String>,
    },

    /// A configured resource limit (nesting depth, object count) was exceeded.
    LimitExceeded(String),

    /// Logic error inside the library. Should not occur.
    Internal(String),
}

impl NrbfError {
    /// Returns true for errors that mean "this stream is not valid NRBF".
    ///
    /// Dangling references and binder rejections count as format errors.
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            Self::Format(_) | Self::DanglingReference { .. } | Self::Rejected { .. }
        )
    }

    /// Returns true if the input ended inside a record.
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedType(msg.into())
    }
}

impl fmt::Display for NrbfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O Error: {e}"),
            Self::Format(s) => write!(f, "Format Error: {s}"),
            Self::DanglingReference { id, kind } => match kind {
                ReferenceKind::Metadata => write!(f, "Format Error: unknown metadata id {id}"),
                ReferenceKind::Member => write!(f, "Format Error: dangling reference to {id}"),
                ReferenceKind::Library => write!(f, "Format Error: unknown library id {id}"),
            },
            Self::Truncated { needed, remaining } => write!(
                f,
                "Truncated Stream: needed {needed} more bytes, {remaining} remaining"
            ),
            Self::UnsupportedType(s) => write!(f, "Unsupported Type: {s}"),
            Self::CyclicWithoutIdentity(node) => {
                write!(f, "Cycle reached node {node} before it was assigned an id")
            }
            Self::Rejected { class, library } => match library {
                Some(lib) => write!(f, "Format Error: type '{class}' from '{lib}' rejected"),
                None => write!(f, "Format Error: system type '{class}' rejected"),
            },
            Self::LimitExceeded(s) => write!(f, "Limit Exceeded: {s}"),
            Self::Internal(s) => write!(f, "Internal Logic Error: {s}"),
        }
    }
}

impl std::error::Error for NrbfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for NrbfError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
