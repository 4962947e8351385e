//! Object reference graph
//!
//! Native objects and managed handles share one dense index space
//! ([`UnifiedIndexMap`]); connections are stored as parallel From/To arrays
//! over that space and expanded into forward and reverse adjacency keyed by
//! [`EntityReference`](crate::entity::EntityReference).

pub mod references;
pub mod unified;

pub use references::{ConnectionTable, RawConnections, ReferenceGraph};
pub use unified::{UnifiedIndexMap, UnifiedTarget};
