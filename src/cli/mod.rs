//! CLI command definitions and handlers

mod owner;
mod refs;
mod regions;
mod resident;
mod summary;

use crate::config::MemscopeConfig;
use crate::entity::EntityReference;
use crate::snapshot::SnapshotIndex;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Parse a decimal or `0x`-prefixed hexadecimal address
pub(crate) fn parse_address(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| format!("'{}' is not a valid address", s))
}

/// memscope - inspect memory snapshot captures
#[derive(Parser, Debug)]
#[command(name = "memscope")]
#[command(
    version,
    about = "Address-space index for memory snapshot captures",
    after_help = "\
Examples:
  memscope capture.json summary                   Table sizes and residency totals
  memscope capture.json owner 0x7f3a10            Which entity owns a byte
  memscope capture.json regions --depth 1         Region tree, two levels deep
  memscope capture.json refs native#12            Edges of a native object
  memscope capture.json resident --allocation 4   Resident bytes of an allocation

Configuration: memscope.toml next to the capture, or ~/.config/memscope/config.toml"
)]
pub struct Cli {
    /// Capture file (JSON)
    pub capture: PathBuf,

    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true, value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: Option<String>,

    /// Sort every index up front instead of on first use
    #[arg(long, global = true)]
    pub preload: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Table sizes, graph size, region depth and residency totals
    Summary {
        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Entity, region and system region owning an address
    #[command(after_help = "\
Examples:
  memscope capture.json owner 0x7f3a10
  memscope capture.json owner 140737488355328 --format json")]
    Owner {
        /// Address, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_address)]
        address: u64,

        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Native region tree in address order
    Regions {
        /// Deepest layer to show (default: all)
        #[arg(long)]
        depth: Option<u32>,

        /// Maximum regions to show
        #[arg(long, default_value = "200")]
        top: usize,
    },

    /// Outgoing and incoming references of an entity
    #[command(after_help = "\
Entities are written kind#index: managed#3, native#12, allocation#0, root#1, label#2")]
    Refs {
        /// Entity as kind#index
        entity: EntityReference,

        /// Maximum edges to show per direction
        #[arg(long, default_value = "50")]
        top: usize,
    },

    /// Resident bytes per system region, or for one allocation or address range
    Resident {
        /// Allocation row
        #[arg(long, conflicts_with = "address")]
        allocation: Option<u32>,

        /// Start of an address range, decimal or 0x-prefixed hex
        #[arg(long, value_parser = parse_address, requires = "size")]
        address: Option<u64>,

        /// Length of the address range in bytes
        #[arg(long, requires = "address")]
        size: Option<u64>,
    },
}

/// Load the capture with its applicable configuration
fn open_snapshot(capture: &Path, preload: bool) -> Result<SnapshotIndex> {
    let start = Instant::now();
    let config = MemscopeConfig::load(capture);
    let index = SnapshotIndex::open(capture, &config)
        .with_context(|| format!("Failed to load capture {}", capture.display()))?;
    if preload {
        index.preload();
    }
    info!("Snapshot ready in {:?}", start.elapsed());
    Ok(index)
}

pub fn run(cli: Cli) -> Result<()> {
    let index = open_snapshot(&cli.capture, cli.preload)?;

    match cli.command {
        Commands::Summary { format } => summary::run(&index, &cli.capture, &format),
        Commands::Owner { address, format } => owner::run(&index, address, &format),
        Commands::Regions { depth, top } => regions::run(&index, depth, top),
        Commands::Refs { entity, top } => refs::run(&index, entity, top),
        Commands::Resident {
            allocation,
            address,
            size,
        } => resident::run(&index, allocation, address.zip(size)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x10"), Ok(16));
        assert_eq!(parse_address("0XfF"), Ok(255));
        assert_eq!(parse_address("4096"), Ok(4096));
        assert!(parse_address("0xzz").is_err());
        assert!(parse_address("-1").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["memscope", "cap.json", "owner", "0x1000"])
            .expect("owner parses");
        assert!(matches!(
            cli.command,
            Commands::Owner {
                address: 0x1000,
                ..
            }
        ));

        let cli = Cli::try_parse_from(["memscope", "cap.json", "refs", "native#3"])
            .expect("refs parses");
        assert!(matches!(
            cli.command,
            Commands::Refs { entity, .. } if entity == EntityReference::native(3)
        ));
    }

    #[test]
    fn test_cli_rejects_bad_input() {
        assert!(Cli::try_parse_from(["memscope", "cap.json", "refs", "heap#3"]).is_err());
        assert!(
            Cli::try_parse_from(["memscope", "cap.json", "resident", "--address", "0x10"])
                .is_err()
        );
        assert!(
            Cli::try_parse_from(["memscope", "cap.json", "resident", "--size", "16"]).is_err()
        );
        assert!(Cli::try_parse_from(["memscope", "cap.json", "summary", "-f", "xml"]).is_err());
    }
}
