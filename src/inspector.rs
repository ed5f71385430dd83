//! Tools for looking at the record structure of a stream.
//! Useful for debugging metadata reuse and reference layout.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::api::NrbfOptions;
use crate::error::Result;
use crate::format::RecordType;
use crate::reader;
use crate::session::RecordEvent;

/// A structural report of one stream.
#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    /// Total size of the input.
    pub total_bytes: usize,
    /// Root id named by the header.
    pub root_id: i32,
    /// Every record consumed, in stream order.
    pub records: Vec<RecordEvent>,
    /// Number of records per type.
    pub counts: BTreeMap<RecordType, usize>,
    /// Bytes after `MessageEnd`.
    pub trailing_bytes: usize,
}

impl StreamReport {
    /// Number of records of type `kind`.
    pub fn count(&self, kind: RecordType) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Record types in stream order.
    pub fn sequence(&self) -> Vec<RecordType> {
        self.records.iter().map(|r| r.record_type).collect()
    }
}

impl fmt::Display for StreamReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "stream: {} bytes, root id {}, {} records",
            self.total_bytes,
            self.root_id,
            self.records.len()
        )?;
        for record in &self.records {
            let indent = "  ".repeat(record.depth + 1);
            write!(f, "{indent}@{:<6} {:?}", record.offset, record.record_type)?;
            if let Some(id) = record.object_id {
                write!(f, " id={id}")?;
            }
            writeln!(f)?;
        }
        if self.trailing_bytes > 0 {
            writeln!(f, "  {} trailing bytes", self.trailing_bytes)?;
        }
        Ok(())
    }
}

/// The stream inspector.
#[derive(Debug)]
pub struct NrbfInspector;

impl NrbfInspector {
    /// Decodes `bytes` with default options and reports every record seen.
    pub fn inspect(bytes: &[u8]) -> Result<StreamReport> {
        Self::inspect_with(&NrbfOptions::default(), bytes)
    }

    /// Like [`NrbfInspector::inspect`] with explicit options.
    pub fn inspect_with(options: &NrbfOptions, bytes: &[u8]) -> Result<StreamReport> {
        let decoded = reader::decode_stream(bytes, options, true)?;
        let mut counts = BTreeMap::new();
        for event in &decoded.events {
            *counts.entry(event.record_type).or_insert(0) += 1;
        }
        Ok(StreamReport {
            total_bytes: bytes.len(),
            root_id: decoded.root_id.as_i32(),
            records: decoded.events,
            counts,
            trailing_bytes: decoded.trailing_bytes,
        })
    }

    /// Reads the file at `path` and inspects it.
    pub fn inspect_file<P: AsRef<Path>>(path: P) -> Result<StreamReport> {
        let bytes = std::fs::read(path)?;
        Self::inspect(&bytes)
    }
}
