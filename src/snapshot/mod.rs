//! Snapshot index
//!
//! Loads every table of a capture once, builds the unified index map and the
//! reference graph eagerly, and keeps the range indices lazy until the first
//! query or an explicit [`SnapshotIndex::preload`].

mod tables;

#[cfg(test)]
mod tests;

pub use tables::{
    NativeAllocationTable, NativeObjectTable, NativeRegionTable, RootReferenceTable,
    SystemRegionTable,
};

use crate::config::MemscopeConfig;
use crate::entity::{EntityKind, EntityReference};
use crate::error::SnapshotResult;
use crate::graph::{RawConnections, ReferenceGraph, UnifiedIndexMap};
use crate::range_index::{
    AddressOrdering, AddressSizeOrdering, NestedRangeIndex, RangeIndex, RangeSource,
};
use crate::resident::{ResidentPageAccountant, ResidentPages};
use crate::store::{
    read_column, read_names, read_parallel_column, read_scalar, CaptureFile, EntryStore,
    EntryType,
};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Summary counts for a loaded snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    pub managed_handles: u32,
    pub native_objects: usize,
    pub connections: usize,
    pub synthesized_connections: usize,
    pub native_regions: usize,
    pub max_region_depth: u32,
    pub native_allocations: usize,
    pub allocated_bytes: u64,
    pub root_references: usize,
    pub memory_labels: usize,
    pub system_regions: usize,
    pub page_size: Option<u64>,
    pub resident_bytes: Option<u64>,
}

/// Analytical index over one capture
pub struct SnapshotIndex {
    objects: RangeIndex<NativeObjectTable, AddressOrdering>,
    regions: NestedRangeIndex<NativeRegionTable>,
    allocations: RangeIndex<NativeAllocationTable, AddressSizeOrdering>,
    system_regions: RangeIndex<SystemRegionTable, AddressSizeOrdering>,
    root_references: RootReferenceTable,
    root_rows: FxHashMap<i64, u32>,
    memory_labels: Vec<String>,
    unified: UnifiedIndexMap,
    graph: ReferenceGraph,
    resident: Option<ResidentPageAccountant>,
}

impl SnapshotIndex {
    /// Open a JSON capture file
    pub fn open(path: &Path, config: &MemscopeConfig) -> SnapshotResult<Self> {
        let store = CaptureFile::open(path)?.into_store();
        Self::load(&store, config)
    }

    /// Read all tables from `store` and build the derived indices
    pub fn load(store: &dyn EntryStore, config: &MemscopeConfig) -> SnapshotResult<Self> {
        let start = Instant::now();
        let threshold = config.index.parallel_sort_threshold;

        let objects = NativeObjectTable::read(store)?;
        let managed_targets: Vec<u64> = read_column(store, EntryType::GcHandleTarget)?;
        let unified = UnifiedIndexMap::build(
            &managed_targets,
            &objects.instance_id,
            &objects.managed_handle,
        )?;
        let graph = ReferenceGraph::build(&unified, read_connections(store)?)?;

        let regions = NativeRegionTable::read(store)?;
        let allocations = NativeAllocationTable::read(store)?;
        let system_regions = SystemRegionTable::read(store)?;
        let root_references = RootReferenceTable::read(store)?;
        let root_rows = root_rows(&root_references);
        let label_count = store.entry_count(EntryType::MemoryLabelName);
        let memory_labels = read_names(store, EntryType::MemoryLabelName, label_count)?;
        let resident = read_resident(store, &system_regions, config)?;

        info!(
            "Loaded snapshot: {} native objects, {} regions, {} allocations, {} system regions in {:?}",
            objects.len(),
            regions.len(),
            allocations.len(),
            system_regions.len(),
            start.elapsed()
        );

        Ok(Self {
            objects: RangeIndex::new(objects, AddressOrdering).with_parallel_threshold(threshold),
            regions: NestedRangeIndex::from_index(
                RangeIndex::new(
                    regions,
                    AddressSizeOrdering::new(config.overlap.native_regions),
                )
                .with_parallel_threshold(threshold),
            ),
            allocations: RangeIndex::new(
                allocations,
                AddressSizeOrdering::new(config.overlap.allocations),
            )
            .with_parallel_threshold(threshold),
            system_regions: RangeIndex::new(
                system_regions,
                AddressSizeOrdering::new(config.overlap.system_regions),
            )
            .with_parallel_threshold(threshold),
            root_references,
            root_rows,
            memory_labels,
            unified,
            graph,
            resident,
        })
    }

    /// Sort every range index and compute the region hierarchy
    pub fn preload(&self) {
        let start = Instant::now();
        rayon::join(
            || rayon::join(|| self.objects.preload(), || self.regions.preload()),
            || {
                rayon::join(
                    || self.allocations.preload(),
                    || self.system_regions.preload(),
                )
            },
        );
        debug!("Preloaded range indices in {:?}", start.elapsed());
    }

    pub fn native_objects(&self) -> &NativeObjectTable {
        self.objects.source()
    }

    pub fn native_regions(&self) -> &NativeRegionTable {
        self.regions.index().source()
    }

    pub fn native_allocations(&self) -> &NativeAllocationTable {
        self.allocations.source()
    }

    pub fn system_regions(&self) -> &SystemRegionTable {
        self.system_regions.source()
    }

    pub fn root_references(&self) -> &RootReferenceTable {
        &self.root_references
    }

    pub fn memory_labels(&self) -> &[String] {
        &self.memory_labels
    }

    pub fn unified(&self) -> &UnifiedIndexMap {
        &self.unified
    }

    pub fn graph(&self) -> &ReferenceGraph {
        &self.graph
    }

    pub fn resident(&self) -> Option<&ResidentPageAccountant> {
        self.resident.as_ref()
    }

    /// Native object row covering `address`
    pub fn native_object_at(&self, address: u64) -> Option<u32> {
        let sorted = self.objects.find(address, false)?;
        Some(self.objects.row(sorted) as u32)
    }

    /// Innermost allocation row covering `address`, overhead and padding included
    pub fn allocation_at(&self, address: u64) -> Option<u32> {
        let sorted = self.allocations.find(address, false)?;
        Some(self.allocations.row(sorted) as u32)
    }

    /// Most specific owner of the byte at `address`: a native object, else a
    /// native allocation, else [`EntityReference::NONE`]
    pub fn entity_at(&self, address: u64) -> EntityReference {
        if let Some(row) = self.native_object_at(address) {
            return EntityReference::native(row);
        }
        self.allocation_at(address)
            .map(EntityReference::allocation)
            .unwrap_or(EntityReference::NONE)
    }

    /// Innermost native region row covering `address`
    pub fn native_region_at(&self, address: u64) -> Option<u32> {
        let sorted = self.regions.find_containing(address)?;
        Some(self.regions.index().row(sorted) as u32)
    }

    /// Region directly enclosing native region `region`
    pub fn enclosing_region(&self, region: u32) -> Option<u32> {
        self.check_region(region);
        self.regions
            .enclosing_row(region as usize)
            .map(|row| row as u32)
    }

    /// Nesting depth of native region `region`, 0 for top level
    pub fn region_layer(&self, region: u32) -> u32 {
        self.check_region(region);
        let hierarchy = self.regions.hierarchy();
        hierarchy.layer(hierarchy.position_of_row(region as usize))
    }

    /// Native regions in address order as (row, layer)
    pub fn regions_in_order(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let hierarchy = self.regions.hierarchy();
        self.regions
            .index()
            .rows()
            .enumerate()
            .map(move |(sorted, row)| (row as u32, hierarchy.layer(sorted)))
    }

    fn check_region(&self, region: u32) {
        assert!(
            (region as usize) < self.regions.count(),
            "native region {} out of range ({} regions)",
            region,
            self.regions.count()
        );
    }

    /// Native region recorded for an allocation, falling back to an address lookup
    pub fn allocation_region(&self, allocation: u32) -> Option<u32> {
        let table = self.native_allocations();
        let recorded = table.region[allocation as usize];
        if recorded >= 0 {
            if (recorded as usize) < self.regions.count() {
                return Some(recorded as u32);
            }
            warn!(
                allocation,
                region = recorded,
                "Allocation names a region outside the region table"
            );
        }
        self.native_region_at(table.address[allocation as usize])
    }

    /// Root reference owning an allocation
    pub fn allocation_root(&self, allocation: u32) -> Option<EntityReference> {
        let id = self.native_allocations().root_reference_id[allocation as usize];
        if id < 0 {
            return None;
        }
        self.root_rows
            .get(&id)
            .map(|&row| EntityReference::root_reference(row))
    }

    /// System region row covering `address`
    pub fn system_region_at(&self, address: u64) -> Option<u32> {
        let sorted = self.system_regions.find(address, false)?;
        Some(self.system_regions.row(sorted) as u32)
    }

    /// Resident bytes of `[address, address + size)`; `None` when no system
    /// region with residency data covers `address`
    pub fn resident_bytes(&self, address: u64, size: u64) -> Option<u64> {
        let resident = self.resident.as_ref()?;
        let region = self.system_region_at(address)?;
        resident.resident_bytes(region as usize, address, size)
    }

    /// Resident bytes of an allocation, overhead and padding included
    pub fn allocation_resident_bytes(&self, allocation: u32) -> Option<u64> {
        let table = self.native_allocations();
        let row = allocation as usize;
        assert!(
            row < table.len(),
            "allocation {} out of range ({} allocations)",
            allocation,
            table.len()
        );
        self.resident_bytes(table.address[row], table.full_size(row))
    }

    pub fn system_region_resident_bytes(&self, region: u32) -> Option<u64> {
        self.resident
            .as_ref()?
            .region_resident_bytes(region as usize)
    }

    /// Entities `entity` references, in capture order
    pub fn references_to(&self, entity: EntityReference) -> &[EntityReference] {
        self.graph.references_to(entity)
    }

    /// Entities referencing `entity`, in capture order
    pub fn referenced_by(&self, entity: EntityReference) -> &[EntityReference] {
        self.graph.referenced_by(entity)
    }

    /// Human-readable label for an entity
    pub fn display_name(&self, entity: EntityReference) -> String {
        let index = entity.index as usize;
        match entity.kind {
            EntityKind::NativeObject => {
                let objects = self.native_objects();
                match objects.name.get(index) {
                    Some(name) if !name.is_empty() => name.clone(),
                    Some(_) => format!("native object @ {:#x}", objects.address[index]),
                    None => format!("{} (missing)", entity),
                }
            }
            EntityKind::ManagedObject => match self.unified.identifier_of(entity.index) {
                Some(target) => format!("managed object @ {:#x}", target),
                None => format!("managed handle {}", entity.index),
            },
            EntityKind::NativeAllocation => {
                let allocations = self.native_allocations();
                match allocations.address.get(index) {
                    Some(address) => format!(
                        "allocation @ {:#x} ({} bytes)",
                        address, allocations.size[index]
                    ),
                    None => format!("{} (missing)", entity),
                }
            }
            EntityKind::NativeRootReference => {
                let roots = &self.root_references;
                match roots.area_name.get(index) {
                    Some(area) => format!("{} / {}", area, roots.object_name[index]),
                    None => format!("{} (missing)", entity),
                }
            }
            EntityKind::MemoryLabel => self
                .memory_labels
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("{} (missing)", entity)),
            EntityKind::None => "<none>".to_string(),
        }
    }

    pub fn stats(&self) -> SnapshotStats {
        let allocations = self.native_allocations();
        SnapshotStats {
            managed_handles: self.unified.managed_handle_count(),
            native_objects: self.native_objects().len(),
            connections: self.graph.edge_count(),
            synthesized_connections: self.graph.synthesized_edge_count(),
            native_regions: self.regions.count(),
            max_region_depth: self.regions.hierarchy().max_layer(),
            native_allocations: allocations.len(),
            allocated_bytes: allocations
                .size
                .iter()
                .fold(0u64, |total, &size| total.saturating_add(size)),
            root_references: self.root_references.len(),
            memory_labels: self.memory_labels.len(),
            system_regions: self.system_regions.count(),
            page_size: self.resident.as_ref().map(|r| r.pages().page_size()),
            resident_bytes: self.resident.as_ref().map(|r| r.total_resident_bytes()),
        }
    }
}

fn read_connections(store: &dyn EntryStore) -> SnapshotResult<RawConnections> {
    let from: Vec<u64> = read_column(store, EntryType::ConnectionFrom)?;
    let to: Vec<u64> = read_parallel_column(store, EntryType::ConnectionTo, from.len() as u64)?;
    let unified = read_scalar::<u8>(store, EntryType::ConnectionsUnified)? == Some(1);
    Ok(if unified {
        RawConnections::Unified { from, to }
    } else {
        RawConnections::Identifiers { from, to }
    })
}

fn root_rows(roots: &RootReferenceTable) -> FxHashMap<i64, u32> {
    let mut rows = FxHashMap::with_capacity_and_hasher(roots.len(), Default::default());
    for (row, &id) in roots.id.iter().enumerate() {
        if rows.insert(id, row as u32).is_some() {
            warn!(id, row, "Duplicate root reference id; later row wins");
        }
    }
    rows
}

fn read_resident(
    store: &dyn EntryStore,
    system_regions: &SystemRegionTable,
    config: &MemscopeConfig,
) -> SnapshotResult<Option<ResidentPageAccountant>> {
    if store.entry_count(EntryType::ResidentPageBits) == 0 {
        debug!("Capture carries no resident page data");
        return Ok(None);
    }
    let page_size = read_scalar::<u64>(store, EntryType::ResidentPageSize)?
        .unwrap_or(config.resident.default_page_size);
    let words: Vec<u64> = read_column(store, EntryType::ResidentPageBits)?;
    let page_count = match read_scalar::<u64>(store, EntryType::ResidentPageCount)? {
        Some(count) => count,
        None => {
            debug!("No resident page count; using the full bitmap length");
            words.len() as u64 * 64
        }
    };
    let pages = ResidentPages::from_words(page_size, words, page_count)?;
    debug!(
        "Resident page array: {} pages of {} bytes",
        pages.page_count(),
        page_size
    );
    ResidentPageAccountant::build(pages, &system_regions.page_spans()).map(Some)
}
