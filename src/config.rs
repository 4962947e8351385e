//! Configuration for snapshot indexing
//!
//! Loaded from `memscope.toml` next to the capture, falling back to
//! `~/.config/memscope/config.toml`, then built-in defaults.
//!
//! ```toml
//! [index]
//! parallel_sort_threshold = 65536
//!
//! [overlap]
//! native_regions = true
//! system_regions = false
//! allocations = false
//!
//! [resident]
//! default_page_size = 4096
//! ```
//!
//! `MEMSCOPE_PAGE_SIZE` overrides `resident.default_page_size`.

use crate::range_index::DEFAULT_PARALLEL_SORT_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CONFIG_FILE_NAME: &str = "memscope.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Item count at which range indices sort in parallel
    pub parallel_sort_threshold: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            parallel_sort_threshold: DEFAULT_PARALLEL_SORT_THRESHOLD,
        }
    }
}

/// Whether each address+size index accepts items with identical address and size
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlapConfig {
    pub native_regions: bool,
    pub system_regions: bool,
    pub allocations: bool,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            // Allocators and GPU heaps register the same block under several names
            native_regions: true,
            system_regions: false,
            allocations: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidentConfig {
    /// Used when the capture carries no page size
    pub default_page_size: u64,
}

impl Default for ResidentConfig {
    fn default() -> Self {
        Self {
            default_page_size: 4096,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemscopeConfig {
    pub index: IndexConfig,
    pub overlap: OverlapConfig,
    pub resident: ResidentConfig,
}

impl MemscopeConfig {
    /// Load the configuration that applies to a capture file
    pub fn load(capture_path: &Path) -> Self {
        let candidates = [
            capture_path.parent().map(|dir| dir.join(CONFIG_FILE_NAME)),
            Self::user_config_path(),
        ];

        let mut config = candidates
            .into_iter()
            .flatten()
            .find(|path| path.exists())
            .and_then(|path| Self::load_file(&path))
            .unwrap_or_default();

        config.apply_env();
        config
    }

    fn load_file(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };
        match Self::from_toml(&content) {
            Ok(config) => {
                debug!("Loaded config from {}", path.display());
                Some(config)
            }
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// `~/.config/memscope/config.toml`
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("memscope").join("config.toml"))
    }

    fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("MEMSCOPE_PAGE_SIZE") {
            match value.parse::<u64>() {
                Ok(page_size) if page_size > 0 => self.resident.default_page_size = page_size,
                _ => warn!("Ignoring invalid MEMSCOPE_PAGE_SIZE '{}'", value),
            }
        }
    }
}
