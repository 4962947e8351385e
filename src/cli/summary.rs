//! Summary command - table sizes and totals

use crate::snapshot::SnapshotIndex;
use anyhow::{Context, Result};
use console::style;
use std::path::Path;

pub fn run(index: &SnapshotIndex, capture: &Path, format: &str) -> Result<()> {
    let stats = index.stats();

    if format == "json" {
        let json = serde_json::to_string_pretty(&stats)
            .with_context(|| "Failed to serialize snapshot stats")?;
        println!("{}", json);
        return Ok(());
    }

    println!("\n{}\n", style("Snapshot Summary").bold());
    println!("  Capture: {}", style(capture.display()).cyan());
    println!();
    println!(
        "  {}: {}",
        style("Managed handles").cyan(),
        style(stats.managed_handles).bold()
    );
    println!(
        "  {}: {}",
        style("Native objects").cyan(),
        style(stats.native_objects).bold()
    );
    println!(
        "  {}: {} ({} synthesized)",
        style("Connections").cyan(),
        style(stats.connections).bold(),
        stats.synthesized_connections
    );
    println!(
        "  {}: {} (max depth {})",
        style("Native regions").cyan(),
        style(stats.native_regions).bold(),
        stats.max_region_depth
    );
    println!(
        "  {}: {} ({} bytes)",
        style("Allocations").cyan(),
        style(stats.native_allocations).bold(),
        stats.allocated_bytes
    );
    println!(
        "  {}: {}",
        style("Root references").cyan(),
        style(stats.root_references).bold()
    );
    println!(
        "  {}: {}",
        style("Memory labels").cyan(),
        style(stats.memory_labels).bold()
    );
    println!(
        "  {}: {}",
        style("System regions").cyan(),
        style(stats.system_regions).bold()
    );

    println!();
    match (stats.page_size, stats.resident_bytes) {
        (Some(page_size), Some(resident)) => println!(
            "  Resident: {} bytes ({} pages of {} bytes)",
            style(resident).bold(),
            resident / page_size,
            page_size
        ),
        _ => println!("  Resident: {}", style("no page data in capture").dim()),
    }
    println!();

    Ok(())
}
