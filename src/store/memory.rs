//! In-memory entry store

use super::{ColumnBuffer, ElementType, EntryStore, EntryType, FixedWidth};
use crate::error::{SnapshotError, SnapshotResult};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
enum StoredColumn {
    /// Little-endian encoded values
    Fixed(Vec<u8>),
    Variable(Vec<Vec<u8>>),
}

/// Entry store holding every column in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryEntryStore {
    columns: FxHashMap<EntryType, StoredColumn>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fixed-width column. Panics if `T` does not match the column's element type.
    pub fn insert_fixed<T: FixedWidth>(&mut self, entry: EntryType, values: &[T]) {
        assert_eq!(
            entry.element_type(),
            T::ELEMENT,
            "column {:?} cannot hold {:?} values",
            entry,
            T::ELEMENT
        );
        let width = T::ELEMENT.width().unwrap_or(1);
        let mut bytes = Vec::with_capacity(values.len() * width);
        for value in values {
            value.write(&mut bytes);
        }
        self.columns.insert(entry, StoredColumn::Fixed(bytes));
    }

    /// Store a variable-length (name) column
    pub fn insert_strings<I, S>(&mut self, entry: EntryType, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        assert_eq!(
            entry.element_type(),
            ElementType::Bytes,
            "column {:?} is fixed-width",
            entry
        );
        let items = values
            .into_iter()
            .map(|s| s.as_ref().as_bytes().to_vec())
            .collect();
        self.columns.insert(entry, StoredColumn::Variable(items));
    }

    /// Store a column from raw little-endian bytes, as read from a capture
    pub fn insert_raw(&mut self, entry: EntryType, bytes: Vec<u8>) -> SnapshotResult<()> {
        let width = entry.element_type().width().ok_or(SnapshotError::ElementTypeMismatch {
            entry,
            actual: ElementType::Bytes,
            requested: ElementType::U8,
        })?;
        if bytes.len() % width != 0 {
            return Err(SnapshotError::Truncated {
                position: bytes.len() - bytes.len() % width,
                needed: width,
                remaining: bytes.len() % width,
            });
        }
        self.columns.insert(entry, StoredColumn::Fixed(bytes));
        Ok(())
    }

    pub fn contains(&self, entry: EntryType) -> bool {
        self.columns.contains_key(&entry)
    }

    fn check_range(&self, entry: EntryType, offset: u64, count: u64) -> SnapshotResult<()> {
        let available = self.entry_count(entry);
        match offset.checked_add(count) {
            Some(end) if end <= available => Ok(()),
            _ => Err(SnapshotError::EntryOutOfRange {
                entry,
                offset,
                count,
                available,
            }),
        }
    }
}

impl EntryStore for MemoryEntryStore {
    fn entry_count(&self, entry: EntryType) -> u64 {
        match self.columns.get(&entry) {
            None => 0,
            Some(StoredColumn::Fixed(bytes)) => {
                (bytes.len() / entry.element_type().width().unwrap_or(1)) as u64
            }
            Some(StoredColumn::Variable(items)) => items.len() as u64,
        }
    }

    fn read(&self, entry: EntryType, offset: u64, count: u64) -> SnapshotResult<ColumnBuffer> {
        self.check_range(entry, offset, count)?;
        let (start, end) = (offset as usize, (offset + count) as usize);

        Ok(match self.columns.get(&entry) {
            None if entry.element_type() == ElementType::Bytes => ColumnBuffer::Variable {
                entry,
                items: Vec::new(),
            },
            None => ColumnBuffer::Fixed {
                entry,
                bytes: Vec::new(),
            },
            Some(StoredColumn::Fixed(bytes)) => {
                let width = entry.element_type().width().unwrap_or(1);
                ColumnBuffer::Fixed {
                    entry,
                    bytes: bytes[start * width..end * width].to_vec(),
                }
            }
            Some(StoredColumn::Variable(items)) => ColumnBuffer::Variable {
                entry,
                items: items[start..end].to_vec(),
            },
        })
    }

    fn size_for_entry_range(
        &self,
        entry: EntryType,
        offset: u64,
        count: u64,
    ) -> SnapshotResult<u64> {
        self.check_range(entry, offset, count)?;
        let (start, end) = (offset as usize, (offset + count) as usize);

        Ok(match self.columns.get(&entry) {
            None => 0,
            Some(StoredColumn::Fixed(_)) => {
                count * entry.element_type().width().unwrap_or(1) as u64
            }
            Some(StoredColumn::Variable(items)) => {
                items[start..end].iter().map(|item| item.len() as u64).sum()
            }
        })
    }
}
