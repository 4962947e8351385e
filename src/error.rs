//! Error types for snapshot loading and index construction

use crate::store::{ElementType, EntryType};
use thiserror::Error;

/// Errors that can occur while reading a capture or building its indices
///
/// Everything here fails the snapshot load. Integrity problems that have a
/// safe degraded answer (e.g. a resident-page query outside its region) are
/// logged instead and never surface as an error.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Connection endpoint {identifier:#x} has no unified index (edge {edge})")]
    UnknownIdentifier { identifier: u64, edge: usize },

    #[error("Identifier {identifier:#x} claims unified indices {first} and {second}")]
    DuplicateIdentifier {
        identifier: u64,
        first: u32,
        second: u32,
    },

    #[error("Native object row {row} references managed handle {handle}, but only {handle_count} handles exist")]
    InvalidManagedHandle {
        row: usize,
        handle: i64,
        handle_count: usize,
    },

    #[error("Column {entry:?} has {actual} entries, expected {expected}")]
    ColumnLengthMismatch {
        entry: EntryType,
        expected: u64,
        actual: u64,
    },

    #[error("Read of {count} entries at offset {offset} exceeds {entry:?} ({available} entries)")]
    EntryOutOfRange {
        entry: EntryType,
        offset: u64,
        count: u64,
        available: u64,
    },

    #[error("Column buffer truncated: needed {needed} bytes at position {position}, {remaining} remaining")]
    Truncated {
        position: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("Column {entry:?} holds {actual:?} values, decoded as {requested:?}")]
    ElementTypeMismatch {
        entry: EntryType,
        actual: ElementType,
        requested: ElementType,
    },

    #[error("System region {region} spans {expected} pages but its bitmap slice holds {actual}")]
    PageBitmapLength {
        region: usize,
        expected: u64,
        actual: u64,
    },

    #[error("Resident page array claims {page_count} pages but its bitmap holds {available}")]
    PageArrayLength { page_count: u64, available: u64 },

    #[error("Invalid page size {0}")]
    InvalidPageSize(u64),

    #[error("Failed to parse capture: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;
