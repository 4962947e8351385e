//! Typed snapshot tables read from an entry store

use crate::error::SnapshotResult;
use crate::range_index::RangeSource;
use crate::store::{read_names, read_parallel_column, EntryStore, EntryType};

#[derive(Debug, Clone, Default)]
pub struct NativeObjectTable {
    pub address: Vec<u64>,
    pub size: Vec<u64>,
    pub instance_id: Vec<u64>,
    /// Managed shell handle, -1 for none
    pub managed_handle: Vec<i32>,
    pub name: Vec<String>,
}

impl NativeObjectTable {
    pub fn read(store: &dyn EntryStore) -> SnapshotResult<Self> {
        let rows = store.entry_count(EntryType::NativeObjectAddress);
        Ok(Self {
            address: read_parallel_column(store, EntryType::NativeObjectAddress, rows)?,
            size: read_parallel_column(store, EntryType::NativeObjectSize, rows)?,
            instance_id: read_parallel_column(store, EntryType::NativeObjectInstanceId, rows)?,
            managed_handle: read_parallel_column(
                store,
                EntryType::NativeObjectManagedHandle,
                rows,
            )?,
            name: read_names(store, EntryType::NativeObjectName, rows)?,
        })
    }

    pub fn len(&self) -> usize {
        self.address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
    }
}

impl RangeSource for NativeObjectTable {
    fn count(&self) -> usize {
        self.len()
    }
    fn address(&self, row: usize) -> u64 {
        self.address[row]
    }
    fn size(&self, row: usize) -> u64 {
        self.size[row]
    }
}

#[derive(Debug, Clone, Default)]
pub struct NativeRegionTable {
    pub address: Vec<u64>,
    pub size: Vec<u64>,
    pub name: Vec<String>,
}

impl NativeRegionTable {
    pub fn read(store: &dyn EntryStore) -> SnapshotResult<Self> {
        let rows = store.entry_count(EntryType::NativeRegionAddress);
        Ok(Self {
            address: read_parallel_column(store, EntryType::NativeRegionAddress, rows)?,
            size: read_parallel_column(store, EntryType::NativeRegionSize, rows)?,
            name: read_names(store, EntryType::NativeRegionName, rows)?,
        })
    }

    pub fn len(&self) -> usize {
        self.address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
    }
}

impl RangeSource for NativeRegionTable {
    fn count(&self) -> usize {
        self.len()
    }
    fn address(&self, row: usize) -> u64 {
        self.address[row]
    }
    fn size(&self, row: usize) -> u64 {
        self.size[row]
    }
}

#[derive(Debug, Clone, Default)]
pub struct NativeAllocationTable {
    pub address: Vec<u64>,
    pub size: Vec<u64>,
    pub overhead: Vec<u64>,
    pub padding: Vec<u64>,
    /// Native region row, -1 if unknown
    pub region: Vec<i32>,
    /// Native root reference id, -1 for none
    pub root_reference_id: Vec<i64>,
}

impl NativeAllocationTable {
    pub fn read(store: &dyn EntryStore) -> SnapshotResult<Self> {
        let rows = store.entry_count(EntryType::NativeAllocationAddress);
        Ok(Self {
            address: read_parallel_column(store, EntryType::NativeAllocationAddress, rows)?,
            size: read_parallel_column(store, EntryType::NativeAllocationSize, rows)?,
            overhead: read_parallel_column(store, EntryType::NativeAllocationOverhead, rows)?,
            padding: read_parallel_column(store, EntryType::NativeAllocationPadding, rows)?,
            region: read_parallel_column(store, EntryType::NativeAllocationRegionIndex, rows)?,
            root_reference_id: read_parallel_column(
                store,
                EntryType::NativeAllocationRootReferenceId,
                rows,
            )?,
        })
    }

    pub fn len(&self) -> usize {
        self.address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
    }
}

impl RangeSource for NativeAllocationTable {
    fn count(&self) -> usize {
        self.len()
    }
    fn address(&self, row: usize) -> u64 {
        self.address[row]
    }
    fn size(&self, row: usize) -> u64 {
        self.size[row]
    }
    fn full_size(&self, row: usize) -> u64 {
        self.size[row]
            .saturating_add(self.overhead[row])
            .saturating_add(self.padding[row])
    }
}

#[derive(Debug, Clone, Default)]
pub struct RootReferenceTable {
    pub id: Vec<i64>,
    pub area_name: Vec<String>,
    pub object_name: Vec<String>,
    pub accumulated_size: Vec<u64>,
}

impl RootReferenceTable {
    pub fn read(store: &dyn EntryStore) -> SnapshotResult<Self> {
        let rows = store.entry_count(EntryType::NativeRootReferenceId);
        Ok(Self {
            id: read_parallel_column(store, EntryType::NativeRootReferenceId, rows)?,
            area_name: read_names(store, EntryType::NativeRootReferenceAreaName, rows)?,
            object_name: read_names(store, EntryType::NativeRootReferenceObjectName, rows)?,
            accumulated_size: read_parallel_column(
                store,
                EntryType::NativeRootReferenceAccumulatedSize,
                rows,
            )?,
        })
    }

    pub fn len(&self) -> usize {
        self.id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SystemRegionTable {
    pub address: Vec<u64>,
    pub size: Vec<u64>,
    pub name: Vec<String>,
    /// Index into the process page array, -1 without residency data
    pub first_page_index: Vec<i64>,
}

impl SystemRegionTable {
    pub fn read(store: &dyn EntryStore) -> SnapshotResult<Self> {
        let rows = store.entry_count(EntryType::SystemRegionAddress);
        Ok(Self {
            address: read_parallel_column(store, EntryType::SystemRegionAddress, rows)?,
            size: read_parallel_column(store, EntryType::SystemRegionSize, rows)?,
            name: read_names(store, EntryType::SystemRegionName, rows)?,
            first_page_index: read_parallel_column(
                store,
                EntryType::SystemRegionFirstPageIndex,
                rows,
            )?,
        })
    }

    pub fn len(&self) -> usize {
        self.address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
    }

    /// (base, size, first page index) per region
    pub fn page_spans(&self) -> Vec<(u64, u64, i64)> {
        self.address
            .iter()
            .zip(&self.size)
            .zip(&self.first_page_index)
            .map(|((&address, &size), &first)| (address, size, first))
            .collect()
    }
}

impl RangeSource for SystemRegionTable {
    fn count(&self) -> usize {
        self.len()
    }
    fn address(&self, row: usize) -> u64 {
        self.address[row]
    }
    fn size(&self, row: usize) -> u64 {
        self.size[row]
    }
}
