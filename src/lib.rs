//! memscope - address-space index for memory snapshot captures
//!
//! Loads a columnar capture and answers ownership, nesting and residency
//! questions in logarithmic time: which entity owns the byte at an address,
//! which region encloses another, how many bytes of an allocation are
//! actually resident.

pub mod cli;
pub mod config;
pub mod entity;
pub mod error;
pub mod graph;
pub mod range_index;
pub mod resident;
pub mod snapshot;
pub mod store;

pub use config::MemscopeConfig;
pub use entity::{EntityKind, EntityReference};
pub use error::{SnapshotError, SnapshotResult};
pub use snapshot::{SnapshotIndex, SnapshotStats};
