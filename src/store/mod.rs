//! Columnar entry store boundary
//!
//! A capture is a set of independent columns. Each [`EntryType`] names one
//! column and declares its element type; a table (native objects, regions,
//! allocations, ...) is a group of parallel columns with equal length.
//!
//! The derived indices never touch capture bytes directly. They go through
//! [`EntryStore`], decode with [`ByteCursor`], and own the resulting vectors.

mod capture;
mod cursor;
mod memory;

pub use capture::{
    CaptureAllocation, CaptureConnections, CaptureFile, CaptureNativeObject, CaptureRegion,
    CaptureResidentPages, CaptureRootReference, CaptureSystemRegion,
};
pub use cursor::ByteCursor;
pub use memory::MemoryEntryStore;

use crate::error::{SnapshotError, SnapshotResult};

/// Element type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    U8,
    I32,
    U32,
    I64,
    U64,
    /// Variable-length byte strings (names)
    Bytes,
}

impl ElementType {
    /// Width in bytes of one element, `None` for variable-length columns
    pub fn width(self) -> Option<usize> {
        match self {
            ElementType::U8 => Some(1),
            ElementType::I32 | ElementType::U32 => Some(4),
            ElementType::I64 | ElementType::U64 => Some(8),
            ElementType::Bytes => None,
        }
    }
}

/// One column of the capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    NativeObjectAddress,
    NativeObjectSize,
    NativeObjectInstanceId,
    NativeObjectManagedHandle,
    NativeObjectName,

    GcHandleTarget,

    ConnectionFrom,
    ConnectionTo,
    /// Single u8: 1 when From/To already hold unified indices
    ConnectionsUnified,

    NativeRegionAddress,
    NativeRegionSize,
    NativeRegionName,

    NativeAllocationAddress,
    NativeAllocationSize,
    NativeAllocationOverhead,
    NativeAllocationPadding,
    NativeAllocationRegionIndex,
    NativeAllocationRootReferenceId,

    NativeRootReferenceId,
    NativeRootReferenceAreaName,
    NativeRootReferenceObjectName,
    NativeRootReferenceAccumulatedSize,

    MemoryLabelName,

    SystemRegionAddress,
    SystemRegionSize,
    SystemRegionName,
    SystemRegionFirstPageIndex,

    /// Single u64
    ResidentPageSize,
    /// Single u64, length of the page array in pages
    ResidentPageCount,
    /// Packed page bits, 64 pages per word, least significant bit first
    ResidentPageBits,
}

impl EntryType {
    pub fn element_type(self) -> ElementType {
        use EntryType::*;
        match self {
            NativeObjectName | NativeRegionName | NativeRootReferenceAreaName
            | NativeRootReferenceObjectName | MemoryLabelName | SystemRegionName => {
                ElementType::Bytes
            }
            NativeObjectManagedHandle | NativeAllocationRegionIndex => ElementType::I32,
            NativeAllocationRootReferenceId | NativeRootReferenceId
            | SystemRegionFirstPageIndex => ElementType::I64,
            ConnectionsUnified => ElementType::U8,
            _ => ElementType::U64,
        }
    }
}

/// A fixed-width element that can be decoded from a little-endian column
pub trait FixedWidth: Sized + Copy {
    const ELEMENT: ElementType;

    fn read(cursor: &mut ByteCursor<'_>) -> SnapshotResult<Self>;

    fn write(self, out: &mut Vec<u8>);
}

macro_rules! fixed_width {
    ($ty:ty, $element:ident, $read:ident) => {
        impl FixedWidth for $ty {
            const ELEMENT: ElementType = ElementType::$element;

            #[inline]
            fn read(cursor: &mut ByteCursor<'_>) -> SnapshotResult<Self> {
                cursor.$read()
            }

            #[inline]
            fn write(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
    };
}

fixed_width!(u8, U8, read_u8);
fixed_width!(i32, I32, read_i32);
fixed_width!(u32, U32, read_u32);
fixed_width!(i64, I64, read_i64);
fixed_width!(u64, U64, read_u64);

/// Raw result of a column read
#[derive(Debug, Clone)]
pub enum ColumnBuffer {
    Fixed { entry: EntryType, bytes: Vec<u8> },
    Variable { entry: EntryType, items: Vec<Vec<u8>> },
}

impl ColumnBuffer {
    pub fn entry(&self) -> EntryType {
        match self {
            ColumnBuffer::Fixed { entry, .. } | ColumnBuffer::Variable { entry, .. } => *entry,
        }
    }

    /// Decode a fixed-width column into typed values
    pub fn decode<T: FixedWidth>(&self) -> SnapshotResult<Vec<T>> {
        let entry = self.entry();
        let actual = entry.element_type();
        if actual != T::ELEMENT {
            return Err(SnapshotError::ElementTypeMismatch {
                entry,
                actual,
                requested: T::ELEMENT,
            });
        }
        let ColumnBuffer::Fixed { bytes, .. } = self else {
            return Err(SnapshotError::ElementTypeMismatch {
                entry,
                actual: ElementType::Bytes,
                requested: T::ELEMENT,
            });
        };

        let width = actual.width().unwrap_or(1);
        let mut cursor = ByteCursor::new(bytes);
        let mut values = Vec::with_capacity(bytes.len() / width);
        while !cursor.is_empty() {
            values.push(T::read(&mut cursor)?);
        }
        Ok(values)
    }

    /// Decode a variable-length column as UTF-8 (lossy) strings
    pub fn decode_strings(&self) -> SnapshotResult<Vec<String>> {
        match self {
            ColumnBuffer::Variable { items, .. } => Ok(items
                .iter()
                .map(|raw| String::from_utf8_lossy(raw).into_owned())
                .collect()),
            ColumnBuffer::Fixed { entry, .. } => Err(SnapshotError::ElementTypeMismatch {
                entry: *entry,
                actual: entry.element_type(),
                requested: ElementType::Bytes,
            }),
        }
    }
}

/// Read-only source of capture columns
pub trait EntryStore {
    /// Number of entries in a column (0 when the capture lacks it)
    fn entry_count(&self, entry: EntryType) -> u64;

    /// Read `count` entries starting at `offset`
    fn read(&self, entry: EntryType, offset: u64, count: u64) -> SnapshotResult<ColumnBuffer>;

    /// Byte length of an entry range (variable-length columns sum their items)
    fn size_for_entry_range(&self, entry: EntryType, offset: u64, count: u64)
        -> SnapshotResult<u64>;
}

/// Read a whole fixed-width column
pub fn read_column<T: FixedWidth>(
    store: &dyn EntryStore,
    entry: EntryType,
) -> SnapshotResult<Vec<T>> {
    let count = store.entry_count(entry);
    store.read(entry, 0, count)?.decode()
}

/// Read a whole fixed-width column that must be parallel to a table of `expected` rows
pub fn read_parallel_column<T: FixedWidth>(
    store: &dyn EntryStore,
    entry: EntryType,
    expected: u64,
) -> SnapshotResult<Vec<T>> {
    let actual = store.entry_count(entry);
    if actual != expected {
        return Err(SnapshotError::ColumnLengthMismatch {
            entry,
            expected,
            actual,
        });
    }
    store.read(entry, 0, actual)?.decode()
}

/// Read a name column parallel to a table; a missing column yields empty names
pub fn read_names(
    store: &dyn EntryStore,
    entry: EntryType,
    expected: u64,
) -> SnapshotResult<Vec<String>> {
    let actual = store.entry_count(entry);
    if actual == 0 {
        return Ok(vec![String::new(); expected as usize]);
    }
    if actual != expected {
        return Err(SnapshotError::ColumnLengthMismatch {
            entry,
            expected,
            actual,
        });
    }
    store.read(entry, 0, actual)?.decode_strings()
}

/// Read a single-value column, `None` when absent
pub fn read_scalar<T: FixedWidth>(
    store: &dyn EntryStore,
    entry: EntryType,
) -> SnapshotResult<Option<T>> {
    if store.entry_count(entry) == 0 {
        return Ok(None);
    }
    Ok(store.read(entry, 0, 1)?.decode::<T>()?.first().copied())
}
