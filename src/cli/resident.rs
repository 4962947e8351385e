//! Resident command - resident memory of regions, allocations and ranges

use crate::range_index::RangeSource;
use crate::snapshot::SnapshotIndex;
use anyhow::{bail, Result};
use console::style;

pub fn run(
    index: &SnapshotIndex,
    allocation: Option<u32>,
    range: Option<(u64, u64)>,
) -> Result<()> {
    if index.resident().is_none() {
        bail!("Capture has no resident page data");
    }

    if let Some(allocation) = allocation {
        let table = index.native_allocations();
        if allocation as usize >= table.len() {
            bail!(
                "No such allocation: {} ({} allocations)",
                allocation,
                table.len()
            );
        }
        let row = allocation as usize;
        print_range(
            &format!("allocation#{}", allocation),
            table.address[row],
            table.full_size(row),
            index.allocation_resident_bytes(allocation),
        );
        return Ok(());
    }

    if let Some((address, size)) = range {
        print_range("range", address, size, index.resident_bytes(address, size));
        return Ok(());
    }

    let table = index.system_regions();
    println!("\n{}\n", style("System Regions").bold());
    for region in 0..table.len() {
        let resident = index.system_region_resident_bytes(region as u32);
        println!(
            "  {} {:#x} {} / {} bytes",
            style(&table.name[region]).cyan(),
            table.address[region],
            resident.map_or_else(|| "-".to_string(), |bytes| bytes.to_string()),
            table.size[region]
        );
    }
    println!();

    Ok(())
}

fn print_range(label: &str, address: u64, size: u64, resident: Option<u64>) {
    println!("\n  {} {:#x} ({} bytes)", style(label).cyan(), address, size);
    match resident {
        Some(bytes) => println!("  Resident: {} bytes", style(bytes).bold()),
        None => println!(
            "  Resident: {}",
            style("not inside a system region with page data").dim()
        ),
    }
    println!();
}
