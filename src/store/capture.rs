//! JSON capture documents
//!
//! A readable row-oriented form of a capture, used for fixtures and for
//! captures exported by tooling. Loading converts it into columns so the
//! rest of the crate only ever sees an [`EntryStore`](super::EntryStore).
//!
//! ```json
//! {
//!   "gc_handle_targets": [4096, 8192],
//!   "native_objects": [
//!     { "address": 65536, "size": 64, "instance_id": 7, "managed_handle": 0, "name": "Player" }
//!   ],
//!   "connections": { "unified": false, "from": [7], "to": [9] },
//!   "resident_pages": { "page_size": 4096, "page_count": 16, "resident": [0, 1, 2] }
//! }
//! ```

use super::{EntryType, MemoryEntryStore};
use crate::error::SnapshotResult;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureNativeObject {
    pub address: u64,
    #[serde(default)]
    pub size: u64,
    pub instance_id: u64,
    #[serde(default = "no_handle")]
    pub managed_handle: i32,
    #[serde(default)]
    pub name: String,
}

fn no_handle() -> i32 {
    -1
}

fn no_index() -> i64 {
    -1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureConnections {
    /// From/To already hold unified indices
    #[serde(default)]
    pub unified: bool,
    #[serde(default)]
    pub from: Vec<u64>,
    #[serde(default)]
    pub to: Vec<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub address: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureAllocation {
    pub address: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub overhead: u64,
    #[serde(default)]
    pub padding: u64,
    #[serde(default = "no_handle")]
    pub region: i32,
    #[serde(default = "no_index")]
    pub root_reference_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureRootReference {
    pub id: i64,
    #[serde(default)]
    pub area_name: String,
    #[serde(default)]
    pub object_name: String,
    #[serde(default)]
    pub accumulated_size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureSystemRegion {
    pub address: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default = "no_index")]
    pub first_page_index: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureResidentPages {
    pub page_size: u64,
    /// Length of the process-wide page array
    pub page_count: u64,
    /// Indices of resident pages
    #[serde(default)]
    pub resident: Vec<u64>,
}

impl CaptureResidentPages {
    /// Pack into 64-page words, least significant bit first
    fn words(&self) -> Vec<u64> {
        let mut words = vec![0u64; self.page_count.div_ceil(64) as usize];
        for &page in &self.resident {
            if page >= self.page_count {
                warn!(
                    page,
                    page_count = self.page_count,
                    "Resident page index past the page array; dropping it"
                );
                continue;
            }
            words[(page / 64) as usize] |= 1u64 << (page % 64);
        }
        words
    }
}

/// Row-oriented capture document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureFile {
    #[serde(default)]
    pub gc_handle_targets: Vec<u64>,
    #[serde(default)]
    pub native_objects: Vec<CaptureNativeObject>,
    #[serde(default)]
    pub connections: CaptureConnections,
    #[serde(default)]
    pub native_regions: Vec<CaptureRegion>,
    #[serde(default)]
    pub native_allocations: Vec<CaptureAllocation>,
    #[serde(default)]
    pub root_references: Vec<CaptureRootReference>,
    #[serde(default)]
    pub memory_labels: Vec<String>,
    #[serde(default)]
    pub system_regions: Vec<CaptureSystemRegion>,
    #[serde(default)]
    pub resident_pages: Option<CaptureResidentPages>,
}

impl CaptureFile {
    /// Map a capture file and parse it
    pub fn open(path: &Path) -> SnapshotResult<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(serde_json::from_slice(b"{}")?);
        }
        // SAFETY: the map is read-only and dropped before this function returns
        let mmap = unsafe { Mmap::map(&file)? };
        let capture: CaptureFile = serde_json::from_slice(&mmap)?;
        debug!(
            "Loaded capture {}: {} native objects, {} connections, {} allocations",
            path.display(),
            capture.native_objects.len(),
            capture.connections.from.len(),
            capture.native_allocations.len()
        );
        Ok(capture)
    }

    pub fn parse(json: &str) -> SnapshotResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Split rows into columns
    pub fn into_store(self) -> MemoryEntryStore {
        use EntryType::*;

        let mut store = MemoryEntryStore::new();

        store.insert_fixed(GcHandleTarget, &self.gc_handle_targets);

        let objects = &self.native_objects;
        store.insert_fixed(
            NativeObjectAddress,
            &objects.iter().map(|o| o.address).collect::<Vec<_>>(),
        );
        store.insert_fixed(
            NativeObjectSize,
            &objects.iter().map(|o| o.size).collect::<Vec<_>>(),
        );
        store.insert_fixed(
            NativeObjectInstanceId,
            &objects.iter().map(|o| o.instance_id).collect::<Vec<_>>(),
        );
        store.insert_fixed(
            NativeObjectManagedHandle,
            &objects.iter().map(|o| o.managed_handle).collect::<Vec<_>>(),
        );
        store.insert_strings(NativeObjectName, objects.iter().map(|o| &o.name));

        store.insert_fixed(ConnectionFrom, &self.connections.from);
        store.insert_fixed(ConnectionTo, &self.connections.to);
        store.insert_fixed(ConnectionsUnified, &[self.connections.unified as u8]);

        let regions = &self.native_regions;
        store.insert_fixed(
            NativeRegionAddress,
            &regions.iter().map(|r| r.address).collect::<Vec<_>>(),
        );
        store.insert_fixed(
            NativeRegionSize,
            &regions.iter().map(|r| r.size).collect::<Vec<_>>(),
        );
        store.insert_strings(NativeRegionName, regions.iter().map(|r| &r.name));

        let allocations = &self.native_allocations;
        store.insert_fixed(
            NativeAllocationAddress,
            &allocations.iter().map(|a| a.address).collect::<Vec<_>>(),
        );
        store.insert_fixed(
            NativeAllocationSize,
            &allocations.iter().map(|a| a.size).collect::<Vec<_>>(),
        );
        store.insert_fixed(
            NativeAllocationOverhead,
            &allocations.iter().map(|a| a.overhead).collect::<Vec<_>>(),
        );
        store.insert_fixed(
            NativeAllocationPadding,
            &allocations.iter().map(|a| a.padding).collect::<Vec<_>>(),
        );
        store.insert_fixed(
            NativeAllocationRegionIndex,
            &allocations.iter().map(|a| a.region).collect::<Vec<_>>(),
        );
        store.insert_fixed(
            NativeAllocationRootReferenceId,
            &allocations
                .iter()
                .map(|a| a.root_reference_id)
                .collect::<Vec<_>>(),
        );

        let roots = &self.root_references;
        store.insert_fixed(
            NativeRootReferenceId,
            &roots.iter().map(|r| r.id).collect::<Vec<_>>(),
        );
        store.insert_strings(NativeRootReferenceAreaName, roots.iter().map(|r| &r.area_name));
        store.insert_strings(
            NativeRootReferenceObjectName,
            roots.iter().map(|r| &r.object_name),
        );
        store.insert_fixed(
            NativeRootReferenceAccumulatedSize,
            &roots.iter().map(|r| r.accumulated_size).collect::<Vec<_>>(),
        );

        store.insert_strings(MemoryLabelName, &self.memory_labels);

        let system = &self.system_regions;
        store.insert_fixed(
            SystemRegionAddress,
            &system.iter().map(|r| r.address).collect::<Vec<_>>(),
        );
        store.insert_fixed(
            SystemRegionSize,
            &system.iter().map(|r| r.size).collect::<Vec<_>>(),
        );
        store.insert_strings(SystemRegionName, system.iter().map(|r| &r.name));
        store.insert_fixed(
            SystemRegionFirstPageIndex,
            &system.iter().map(|r| r.first_page_index).collect::<Vec<_>>(),
        );

        if let Some(pages) = &self.resident_pages {
            store.insert_fixed(ResidentPageSize, &[pages.page_size]);
            store.insert_fixed(ResidentPageCount, &[pages.page_count]);
            store.insert_fixed(ResidentPageBits, &pages.words());
        }

        store
    }
}
