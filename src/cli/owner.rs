//! Owner command - who owns the byte at an address

use crate::entity::{EntityKind, EntityReference};
use crate::snapshot::SnapshotIndex;
use anyhow::{Context, Result};
use console::style;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Ownership {
    address: u64,
    entity: EntityReference,
    entity_name: Option<String>,
    native_region: Option<u32>,
    native_region_name: Option<String>,
    region_layer: Option<u32>,
    system_region: Option<u32>,
    system_region_name: Option<String>,
    root_reference: Option<EntityReference>,
}

fn ownership(index: &SnapshotIndex, address: u64) -> Ownership {
    let entity = index.entity_at(address);
    let native_region = index.native_region_at(address);
    let system_region = index.system_region_at(address);
    let root_reference = if entity.kind == EntityKind::NativeAllocation {
        index.allocation_root(entity.index)
    } else {
        None
    };

    Ownership {
        address,
        entity,
        entity_name: (!entity.is_none()).then(|| index.display_name(entity)),
        native_region,
        native_region_name: native_region
            .map(|r| index.native_regions().name[r as usize].clone()),
        region_layer: native_region.map(|r| index.region_layer(r)),
        system_region,
        system_region_name: system_region
            .map(|r| index.system_regions().name[r as usize].clone()),
        root_reference,
    }
}

pub fn run(index: &SnapshotIndex, address: u64, format: &str) -> Result<()> {
    let owner = ownership(index, address);

    if format == "json" {
        let json =
            serde_json::to_string_pretty(&owner).with_context(|| "Failed to serialize owner")?;
        println!("{}", json);
        return Ok(());
    }

    println!("\n  Address: {}\n", style(format!("{:#x}", address)).cyan());

    match &owner.entity_name {
        Some(name) => println!(
            "  {} {} ({})",
            style("Entity:").bold(),
            style(name).green(),
            owner.entity
        ),
        None => println!("  {} {}", style("Entity:").bold(), style("none").dim()),
    }

    if let Some(root) = owner.root_reference {
        println!(
            "  {} {}",
            style("Root:").bold(),
            style(index.display_name(root)).yellow()
        );
    }

    match (owner.native_region, &owner.native_region_name) {
        (Some(region), Some(name)) => {
            println!(
                "  {} {} (#{}, layer {})",
                style("Region:").bold(),
                style(name).cyan(),
                region,
                owner.region_layer.unwrap_or(0)
            );
            let mut parent = index.enclosing_region(region);
            while let Some(p) = parent {
                println!(
                    "    in {} (#{})",
                    style(&index.native_regions().name[p as usize]).dim(),
                    p
                );
                parent = index.enclosing_region(p);
            }
        }
        _ => println!("  {} {}", style("Region:").bold(), style("none").dim()),
    }

    match (owner.system_region, &owner.system_region_name) {
        (Some(region), Some(name)) => println!(
            "  {} {} (#{})",
            style("System region:").bold(),
            style(name).cyan(),
            region
        ),
        _ => println!("  {} {}", style("System region:").bold(), style("none").dim()),
    }
    println!();

    Ok(())
}
