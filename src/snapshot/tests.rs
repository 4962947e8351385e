use super::*;
use crate::error::SnapshotError;
use crate::store::{
    CaptureAllocation, CaptureNativeObject, CaptureRegion, CaptureResidentPages,
    CaptureRootReference, CaptureSystemRegion, MemoryEntryStore,
};

const PAGE: u64 = 0x1000;

fn object(
    address: u64,
    size: u64,
    instance_id: u64,
    managed_handle: i32,
    name: &str,
) -> CaptureNativeObject {
    CaptureNativeObject {
        address,
        size,
        instance_id,
        managed_handle,
        name: name.to_string(),
    }
}

fn region(address: u64, size: u64, name: &str) -> CaptureRegion {
    CaptureRegion {
        address,
        size,
        name: name.to_string(),
    }
}

fn allocation(address: u64, size: u64, overhead: u64, region: i32, root: i64) -> CaptureAllocation {
    CaptureAllocation {
        address,
        size,
        overhead,
        padding: 0,
        region,
        root_reference_id: root,
    }
}

/// Two managed handles, three native objects (two with shells), nested
/// regions, one heap system region with residency for pages 2, 3 and 5
fn sample_capture() -> CaptureFile {
    let mut capture = CaptureFile {
        gc_handle_targets: vec![0x9000, 0x9100],
        native_objects: vec![
            object(0x1000, 0x100, 0xA, 1, "Player"),
            object(0x2000, 0x40, 0xB, -1, ""),
            object(0x3000, 0x10, 0xC, 0, "Camera"),
        ],
        native_regions: vec![
            region(0x10000, 0x10000, "Main"),
            region(0x10000, 0x4000, "Sub"),
            region(0x18000, 0x1000, "Pool"),
            region(0x40000, 0x1000, "Other"),
        ],
        native_allocations: vec![
            allocation(0x10000, 0x800, 0x10, 1, 7),
            allocation(0x11000, 0x1000, 0, -1, -1),
            allocation(0x3000, 0x100, 0, -1, -1),
        ],
        root_references: vec![CaptureRootReference {
            id: 7,
            area_name: "Textures".to_string(),
            object_name: "Atlas".to_string(),
            accumulated_size: 0x810,
        }],
        memory_labels: vec!["Default".to_string()],
        system_regions: vec![
            CaptureSystemRegion {
                address: 0x10000,
                size: 8 * PAGE,
                name: "heap".to_string(),
                first_page_index: 2,
            },
            CaptureSystemRegion {
                address: 0x40000,
                size: PAGE,
                name: "mapped".to_string(),
                first_page_index: -1,
            },
        ],
        resident_pages: Some(CaptureResidentPages {
            page_size: PAGE,
            page_count: 16,
            resident: vec![2, 3, 5],
        }),
        ..Default::default()
    };
    capture.connections.from = vec![0xA, 0xB];
    capture.connections.to = vec![0xB, 0xC];
    capture
}

fn load(capture: CaptureFile) -> SnapshotIndex {
    SnapshotIndex::load(&capture.into_store(), &MemscopeConfig::default()).unwrap()
}

#[test]
fn test_graph_includes_shell_edges() {
    let index = load(sample_capture());

    assert_eq!(index.graph().edge_count(), 4);
    assert_eq!(index.graph().synthesized_edge_count(), 2);
    assert_eq!(
        index.references_to(EntityReference::native(0)),
        &[EntityReference::native(1), EntityReference::managed(1)]
    );
    assert_eq!(
        index.referenced_by(EntityReference::managed(0)),
        &[EntityReference::native(2)]
    );
}

#[test]
fn test_unified_connections() {
    let mut capture = sample_capture();
    capture.connections.unified = true;
    capture.connections.from = vec![3];
    capture.connections.to = vec![0];

    let index = load(capture);
    assert_eq!(index.graph().edge_count(), 1);
    assert_eq!(
        index.referenced_by(EntityReference::managed(0)),
        &[EntityReference::native(1)]
    );
}

#[test]
fn test_entity_at_prefers_native_object() {
    let index = load(sample_capture());

    assert_eq!(index.entity_at(0x1080), EntityReference::native(0));
    assert_eq!(index.entity_at(0x3008), EntityReference::native(2));
    assert_eq!(index.entity_at(0x3050), EntityReference::allocation(2));
    assert_eq!(index.entity_at(0x5000), EntityReference::NONE);
}

#[test]
fn test_allocation_lookup_includes_overhead() {
    let index = load(sample_capture());
    assert_eq!(index.allocation_at(0x10805), Some(0));
    assert_eq!(index.allocation_at(0x10810), None);
}

#[test]
fn test_region_hierarchy() {
    let index = load(sample_capture());

    let layers: Vec<u32> = (0..4).map(|r| index.region_layer(r)).collect();
    assert_eq!(layers, vec![0, 1, 1, 0]);
    assert_eq!(index.enclosing_region(2), Some(0));
    assert_eq!(index.enclosing_region(0), None);
    assert_eq!(index.stats().max_region_depth, 1);

    let order: Vec<u32> = index.regions_in_order().map(|(row, _)| row).collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
}

#[test]
fn test_native_region_at() {
    let index = load(sample_capture());

    assert_eq!(index.native_region_at(0x10010), Some(1));
    assert_eq!(index.native_region_at(0x18800), Some(2));
    // Past Pool, still inside Main
    assert_eq!(index.native_region_at(0x1A000), Some(0));
    assert_eq!(index.native_region_at(0x30000), None);
}

#[test]
#[should_panic(expected = "out of range")]
fn test_unknown_region_panics() {
    let index = load(sample_capture());
    index.enclosing_region(9);
}

#[test]
fn test_allocation_region_and_root() {
    let index = load(sample_capture());

    assert_eq!(index.allocation_region(0), Some(1));
    assert_eq!(index.allocation_region(1), Some(1));
    assert_eq!(index.allocation_region(2), None);

    assert_eq!(
        index.allocation_root(0),
        Some(EntityReference::root_reference(0))
    );
    assert_eq!(index.allocation_root(1), None);
}

#[test]
fn test_resident_accounting() {
    let index = load(sample_capture());

    assert_eq!(index.system_region_resident_bytes(0), Some(3 * PAGE));
    assert_eq!(index.system_region_resident_bytes(1), None);

    // First page of the heap, overhead included
    assert_eq!(index.allocation_resident_bytes(0), Some(0x810));
    assert_eq!(index.allocation_resident_bytes(1), Some(PAGE));
    assert_eq!(index.allocation_resident_bytes(2), None);

    // Pages 4 and 5 of the process array, only 5 resident
    assert_eq!(index.resident_bytes(0x12000, 2 * PAGE), Some(PAGE));
}

#[test]
fn test_no_resident_data() {
    let mut capture = sample_capture();
    capture.resident_pages = None;

    let index = load(capture);
    assert!(index.resident().is_none());
    assert_eq!(index.allocation_resident_bytes(0), None);
    assert_eq!(index.stats().resident_bytes, None);
}

#[test]
fn test_region_past_page_count_rejected() {
    let mut capture = sample_capture();
    capture.system_regions[0].first_page_index = 40;
    capture.resident_pages = Some(CaptureResidentPages {
        page_size: PAGE,
        page_count: 16,
        resident: vec![40],
    });

    let err = SnapshotIndex::load(&capture.into_store(), &MemscopeConfig::default())
        .err()
        .expect("region outside the page array");
    assert!(matches!(
        err,
        SnapshotError::PageBitmapLength {
            region: 0,
            expected: 8,
            actual: 0
        }
    ));
}

#[test]
fn test_oversized_allocation_saturates() {
    let mut capture = sample_capture();
    capture
        .native_allocations
        .push(allocation(0x50000, u64::MAX, 0x10, -1, -1));

    let index = load(capture);
    assert_eq!(index.native_allocations().full_size(3), u64::MAX);
    assert_eq!(index.entity_at(0x60000), EntityReference::allocation(3));
    assert_eq!(index.stats().allocated_bytes, u64::MAX);
}

#[test]
fn test_display_names() {
    let index = load(sample_capture());

    assert_eq!(index.display_name(EntityReference::native(0)), "Player");
    assert_eq!(
        index.display_name(EntityReference::native(1)),
        "native object @ 0x2000"
    );
    assert_eq!(
        index.display_name(EntityReference::managed(0)),
        "managed object @ 0x9000"
    );
    assert_eq!(
        index.display_name(EntityReference::root_reference(0)),
        "Textures / Atlas"
    );
    assert_eq!(
        index.display_name(EntityReference::new(EntityKind::MemoryLabel, 0)),
        "Default"
    );
    assert_eq!(index.display_name(EntityReference::NONE), "<none>");
}

#[test]
fn test_stats() {
    let index = load(sample_capture());
    index.preload();

    let stats = index.stats();
    assert_eq!(stats.managed_handles, 2);
    assert_eq!(stats.native_objects, 3);
    assert_eq!(stats.connections, 4);
    assert_eq!(stats.native_regions, 4);
    assert_eq!(stats.native_allocations, 3);
    assert_eq!(stats.allocated_bytes, 0x1900);
    assert_eq!(stats.root_references, 1);
    assert_eq!(stats.memory_labels, 1);
    assert_eq!(stats.system_regions, 2);
    assert_eq!(stats.page_size, Some(PAGE));
    assert_eq!(stats.resident_bytes, Some(3 * PAGE));
}

#[test]
fn test_preload_does_not_change_answers() {
    let lazy = load(sample_capture());
    let eager = load(sample_capture());
    eager.preload();

    for address in [0x1000, 0x3008, 0x10010, 0x1A000, 0x40000] {
        assert_eq!(lazy.entity_at(address), eager.entity_at(address));
        assert_eq!(lazy.native_region_at(address), eager.native_region_at(address));
    }
}

#[test]
fn test_empty_store() {
    let index = SnapshotIndex::load(&MemoryEntryStore::new(), &MemscopeConfig::default()).unwrap();

    assert_eq!(index.entity_at(0x1000), EntityReference::NONE);
    assert_eq!(index.native_region_at(0x1000), None);
    assert_eq!(index.stats(), SnapshotStats::default());
}

#[test]
fn test_parallel_columns_must_match() {
    let mut store = MemoryEntryStore::new();
    store.insert_fixed(EntryType::NativeObjectAddress, &[0x1000u64, 0x2000]);
    store.insert_fixed(EntryType::NativeObjectSize, &[16u64]);

    let err = SnapshotIndex::load(&store, &MemscopeConfig::default())
        .err()
        .expect("length mismatch");
    assert!(matches!(
        err,
        SnapshotError::ColumnLengthMismatch {
            entry: EntryType::NativeObjectSize,
            expected: 2,
            actual: 1
        }
    ));
}

#[test]
fn test_unknown_connection_endpoint_fails_load() {
    let mut capture = sample_capture();
    capture.connections.to[1] = 0xDEAD;

    let err = SnapshotIndex::load(&capture.into_store(), &MemscopeConfig::default())
        .err()
        .expect("unknown identifier");
    assert!(matches!(
        err,
        SnapshotError::UnknownIdentifier {
            identifier: 0xDEAD,
            edge: 1
        }
    ));
}
