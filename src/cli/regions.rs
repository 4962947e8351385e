//! Regions command - native region tree

use crate::snapshot::SnapshotIndex;
use anyhow::Result;
use console::style;

pub fn run(index: &SnapshotIndex, depth: Option<u32>, top: usize) -> Result<()> {
    let table = index.native_regions();
    let regions: Vec<(u32, u32)> = index
        .regions_in_order()
        .filter(|&(_, layer)| depth.map_or(true, |max| layer <= max))
        .collect();

    println!(
        "\n{} ({} of {})\n",
        style("Native Regions").bold(),
        regions.len().min(top),
        table.len()
    );

    for &(row, layer) in regions.iter().take(top) {
        let row = row as usize;
        println!(
            "  {}{} {:#x}..{:#x} ({} bytes)",
            "  ".repeat(layer as usize),
            style(&table.name[row]).cyan(),
            table.address[row],
            table.address[row].saturating_add(table.size[row]),
            table.size[row]
        );
    }
    if regions.len() > top {
        println!("  ... and {} more", regions.len() - top);
    }
    println!();

    Ok(())
}
