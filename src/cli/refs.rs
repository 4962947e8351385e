//! Refs command - references of one entity

use crate::entity::{EntityKind, EntityReference};
use crate::snapshot::SnapshotIndex;
use anyhow::{bail, Result};
use console::style;

fn entity_exists(index: &SnapshotIndex, entity: EntityReference) -> bool {
    let row = entity.index as usize;
    match entity.kind {
        EntityKind::ManagedObject => entity.index < index.unified().managed_handle_count(),
        EntityKind::NativeObject => row < index.native_objects().len(),
        EntityKind::NativeAllocation => row < index.native_allocations().len(),
        EntityKind::NativeRootReference => row < index.root_references().len(),
        EntityKind::MemoryLabel => row < index.memory_labels().len(),
        EntityKind::None => false,
    }
}

fn print_edges(
    index: &SnapshotIndex,
    title: &str,
    arrow: &str,
    edges: &[EntityReference],
    top: usize,
) {
    println!("  {} ({})", style(title).bold(), edges.len());
    for edge in edges.iter().take(top) {
        println!(
            "    {} {} ({})",
            arrow,
            style(index.display_name(*edge)).green(),
            edge
        );
    }
    if edges.len() > top {
        println!("    ... and {} more", edges.len() - top);
    }
}

pub fn run(index: &SnapshotIndex, entity: EntityReference, top: usize) -> Result<()> {
    if !entity_exists(index, entity) {
        bail!("No such entity: {}", entity);
    }

    println!(
        "\n  {} ({})\n",
        style(index.display_name(entity)).cyan(),
        entity
    );
    print_edges(index, "References", "->", index.references_to(entity), top);
    println!();
    print_edges(index, "Referenced by", "<-", index.referenced_by(entity), top);
    println!();

    Ok(())
}
