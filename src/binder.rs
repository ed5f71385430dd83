//! Type resolution for decoded class records.
//!
//! Every class record the reader meets is offered to a [`TypeBinder`] before
//! any of its members are read. A binder that refuses the type aborts the
//! decode with [`NrbfError::Rejected`]. The default, [`AcceptAll`], never
//! refuses; [`AllowList`] accepts only the pairs it was given.

use std::collections::HashSet;
use std::fmt::Debug;

use crate::error::{NrbfError, Result};

/// Decides whether a class named in the stream may be materialized.
pub trait TypeBinder: Send + Sync + Debug {
    /// Returns `Ok(())` to accept `class` from `library` (`None` for system
    /// classes), or an error to abort the decode.
    fn bind(&self, class: &str, library: Option<&str>) -> Result<()>;
}

/// Accepts every class.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl TypeBinder for AcceptAll {
    fn bind(&self, _class: &str, _library: Option<&str>) -> Result<()> {
        Ok(())
    }
}

/// Accepts only explicitly listed classes.
///
/// ```rust
/// use std::sync::Arc;
/// use nrbf::{AllowList, Nrbf};
///
/// let binder = AllowList::new()
///     .allow("Demo", "Demo.Point")
///     .allow_system("System.Version");
/// let options = Nrbf::builder().binder(Arc::new(binder));
/// # let _ = options;
/// ```
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    allowed: HashSet<(Option<String>, String)>,
}

impl AllowList {
    /// Creates an empty list that rejects everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows `class` from `library`.
    pub fn allow(mut self, library: &str, class: &str) -> Self {
        self.allowed
            .insert((Some(library.to_owned()), class.to_owned()));
        self
    }

    /// Allows the system class `class`.
    pub fn allow_system(mut self, class: &str) -> Self {
        self.allowed.insert((None, class.to_owned()));
        self
    }

    /// Returns true if the pair is listed.
    pub fn contains(&self, class: &str, library: Option<&str>) -> bool {
        self.allowed
            .contains(&(library.map(str::to_owned), class.to_owned()))
    }
}

impl TypeBinder for AllowList {
    fn bind(&self, class: &str, library: Option<&str>) -> Result<()> {
        if self.contains(class, library) {
            return Ok(());
        }
        tracing::warn!(class, library, "rejected class");
        Err(NrbfError::Rejected {
            class: class.to_owned(),
            library: library.map(str::to_owned),
        })
    }
}
