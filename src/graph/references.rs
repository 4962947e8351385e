//! Reference graph over the unified index space
//!
//! Edges keep the order the capture reported them in. Consumers depend on
//! that: a GameObject's first edge is its Transform, a Transform's first edge
//! is its GameObject and its last is its parent, a Component's first edge is
//! its GameObject. Nothing here sorts or deduplicates.

use super::unified::UnifiedIndexMap;
use crate::entity::EntityReference;
use crate::error::{SnapshotError, SnapshotResult};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

/// Raw connection endpoints as read from the capture
#[derive(Debug, Clone)]
pub enum RawConnections {
    /// Endpoints already in the unified space
    Unified { from: Vec<u64>, to: Vec<u64> },
    /// Native identifiers that must be remapped
    Identifiers { from: Vec<u64>, to: Vec<u64> },
}

impl RawConnections {
    pub fn len(&self) -> usize {
        match self {
            RawConnections::Unified { from, .. } | RawConnections::Identifiers { from, .. } => {
                from.len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parallel From/To arrays; edge `i` is `(from[i], to[i])`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionTable {
    from: Vec<u32>,
    to: Vec<u32>,
}

impl ConnectionTable {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            from: Vec::with_capacity(capacity),
            to: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, from: u32, to: u32) {
        self.from.push(from);
        self.to.push(to);
    }

    pub fn len(&self) -> usize {
        self.from.len()
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_empty()
    }

    /// Edge `i`. Panics if out of range.
    pub fn get(&self, i: usize) -> (u32, u32) {
        (self.from[i], self.to[i])
    }

    pub fn from(&self) -> &[u32] {
        &self.from
    }

    pub fn to(&self) -> &[u32] {
        &self.to
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.from.iter().copied().zip(self.to.iter().copied())
    }
}

/// Forward and reverse adjacency built from a [`ConnectionTable`]
#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    connections: ConnectionTable,
    synthesized: usize,
    references_to: FxHashMap<EntityReference, Vec<EntityReference>>,
    referenced_by: FxHashMap<EntityReference, Vec<EntityReference>>,
}

impl ReferenceGraph {
    /// Build the graph. Any endpoint without a unified index fails the build.
    pub fn build(map: &UnifiedIndexMap, raw: RawConnections) -> SnapshotResult<Self> {
        let reported = raw.len();
        let (connections, synthesized) = match raw {
            RawConnections::Unified { from, to } => (check_unified(map, &from, &to)?, 0),
            RawConnections::Identifiers { from, to } => remap(map, from, to)?,
        };

        let mut references_to: FxHashMap<EntityReference, Vec<EntityReference>> =
            FxHashMap::default();
        let mut referenced_by: FxHashMap<EntityReference, Vec<EntityReference>> =
            FxHashMap::default();

        for (from, to) in connections.iter() {
            // Both endpoints were validated above
            let (Some(source), Some(target)) = (map.entity(from), map.entity(to)) else {
                continue;
            };
            references_to.entry(source).or_default().push(target);
            referenced_by.entry(target).or_default().push(source);
        }

        info!(
            "Built reference graph: {} edges ({} reported, {} synthesized), {} referencing entities",
            connections.len(),
            reported,
            synthesized,
            references_to.len()
        );

        Ok(Self {
            connections,
            synthesized,
            references_to,
            referenced_by,
        })
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    pub fn edge_count(&self) -> usize {
        self.connections.len()
    }

    /// Native-to-shell edges appended after the reported ones
    pub fn synthesized_edge_count(&self) -> usize {
        self.synthesized
    }

    /// Entities `entity` references, in edge order
    pub fn references_to(&self, entity: EntityReference) -> &[EntityReference] {
        self.references_to
            .get(&entity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Entities referencing `entity`, in edge order
    pub fn referenced_by(&self, entity: EntityReference) -> &[EntityReference] {
        self.referenced_by
            .get(&entity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_edges(&self, entity: EntityReference) -> bool {
        self.references_to.contains_key(&entity) || self.referenced_by.contains_key(&entity)
    }
}

fn check_unified(
    map: &UnifiedIndexMap,
    from: &[u64],
    to: &[u64],
) -> SnapshotResult<ConnectionTable> {
    let mut table = ConnectionTable::with_capacity(from.len());
    for (edge, (&f, &t)) in from.iter().zip(to).enumerate() {
        let f = in_range(map, f, edge)?;
        let t = in_range(map, t, edge)?;
        table.push(f, t);
    }
    Ok(table)
}

fn in_range(map: &UnifiedIndexMap, index: u64, edge: usize) -> SnapshotResult<u32> {
    if index < map.len() as u64 {
        Ok(index as u32)
    } else {
        Err(SnapshotError::UnknownIdentifier {
            identifier: index,
            edge,
        })
    }
}

/// Translate identifier endpoints and append missing native-to-shell edges.
/// The identifier buffers are released as soon as the unified arrays exist.
fn remap(
    map: &UnifiedIndexMap,
    from: Vec<u64>,
    to: Vec<u64>,
) -> SnapshotResult<(ConnectionTable, usize)> {
    let g = map.managed_handle_count();
    let mut table = ConnectionTable::with_capacity(from.len() + map.shells().len());
    let mut reported_shell_edges: FxHashSet<(u32, u32)> = FxHashSet::default();

    for (edge, (&f, &t)) in from.iter().zip(&to).enumerate() {
        let f = map.unified_of(f).ok_or(SnapshotError::UnknownIdentifier {
            identifier: f,
            edge,
        })?;
        let t = map.unified_of(t).ok_or(SnapshotError::UnknownIdentifier {
            identifier: t,
            edge,
        })?;
        if f >= g && t < g {
            reported_shell_edges.insert((f, t));
        }
        table.push(f, t);
    }
    drop(from);
    drop(to);

    let mut synthesized = 0;
    for &(row, handle) in map.shells() {
        let native = map.unified_of_native_row(row);
        if !reported_shell_edges.contains(&(native, handle)) {
            table.push(native, handle);
            synthesized += 1;
        }
    }
    debug!("Synthesized {} native-to-shell connections", synthesized);

    Ok((table, synthesized))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Managed handles targeting 0x1000 and 0x2000; natives 0xA (shell 1), 0xB, 0xC (shell 0)
    fn sample_map() -> UnifiedIndexMap {
        UnifiedIndexMap::build(&[0x1000, 0x2000], &[0xA, 0xB, 0xC], &[1, -1, 0]).unwrap()
    }

    #[test]
    fn test_remap_and_classify() {
        let map = sample_map();
        let graph = ReferenceGraph::build(
            &map,
            RawConnections::Identifiers {
                from: vec![0xA, 0xB],
                to: vec![0xB, 0xC],
            },
        )
        .unwrap();

        assert_eq!(graph.connections().get(0), (2, 3));
        assert_eq!(graph.connections().get(1), (3, 4));
        assert_eq!(
            graph.references_to(EntityReference::native(0))[0],
            EntityReference::native(1)
        );
        assert_eq!(
            graph.referenced_by(EntityReference::native(2)),
            &[EntityReference::native(1)]
        );
    }

    #[test]
    fn test_shell_edges_synthesized_after_reported() {
        let map = sample_map();
        let graph = ReferenceGraph::build(
            &map,
            RawConnections::Identifiers {
                from: vec![0xB],
                to: vec![0xA],
            },
        )
        .unwrap();

        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.synthesized_edge_count(), 2);
        // Appended in native row order: 0xA -> handle 1, then 0xC -> handle 0
        assert_eq!(graph.connections().get(1), (2, 1));
        assert_eq!(graph.connections().get(2), (4, 0));
        assert_eq!(
            graph.referenced_by(EntityReference::managed(1)),
            &[EntityReference::native(0)]
        );
    }

    #[test]
    fn test_reported_shell_edge_not_duplicated() {
        let map = sample_map();
        // 0xA -> its shell (handle 1, target 0x2000) is already in the capture
        let graph = ReferenceGraph::build(
            &map,
            RawConnections::Identifiers {
                from: vec![0xA],
                to: vec![0x2000],
            },
        )
        .unwrap();

        assert_eq!(graph.synthesized_edge_count(), 1);
        assert_eq!(graph.connections().get(0), (2, 1));
        assert_eq!(graph.connections().get(1), (4, 0));
        assert_eq!(
            graph.references_to(EntityReference::native(0)),
            &[EntityReference::managed(1)]
        );
    }

    #[test]
    fn test_unified_connections_taken_as_is() {
        let map = sample_map();
        let graph = ReferenceGraph::build(
            &map,
            RawConnections::Unified {
                from: vec![3],
                to: vec![0],
            },
        )
        .unwrap();

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.synthesized_edge_count(), 0);
        assert_eq!(
            graph.referenced_by(EntityReference::managed(0)),
            &[EntityReference::native(1)]
        );
    }

    #[test]
    fn test_edge_order_preserved() {
        // GameObject(0xA) -> Transform(0xB) first, then Component(0xC)
        let map = UnifiedIndexMap::build(&[], &[0xA, 0xB, 0xC], &[-1, -1, -1]).unwrap();
        let graph = ReferenceGraph::build(
            &map,
            RawConnections::Identifiers {
                from: vec![0xA, 0xB, 0xA, 0xC],
                to: vec![0xB, 0xA, 0xC, 0xA],
            },
        )
        .unwrap();

        assert_eq!(
            graph.references_to(EntityReference::native(0)),
            &[EntityReference::native(1), EntityReference::native(2)]
        );
        assert_eq!(
            graph.referenced_by(EntityReference::native(0)),
            &[EntityReference::native(1), EntityReference::native(2)]
        );
    }

    #[test]
    fn test_unknown_identifier_is_fatal() {
        let map = sample_map();
        let err = ReferenceGraph::build(
            &map,
            RawConnections::Identifiers {
                from: vec![0xA, 0xD],
                to: vec![0xB, 0xA],
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::UnknownIdentifier {
                identifier: 0xD,
                edge: 1
            }
        ));
    }

    #[test]
    fn test_unified_endpoint_out_of_range_is_fatal() {
        let map = sample_map();
        let err = ReferenceGraph::build(
            &map,
            RawConnections::Unified {
                from: vec![0],
                to: vec![5],
            },
        )
        .unwrap_err();
        assert!(matches!(err, SnapshotError::UnknownIdentifier { identifier: 5, .. }));
    }

    #[test]
    fn test_entity_without_edges_has_no_entry() {
        let map = sample_map();
        let graph = ReferenceGraph::build(
            &map,
            RawConnections::Unified {
                from: vec![],
                to: vec![],
            },
        )
        .unwrap();
        assert!(graph.references_to(EntityReference::native(1)).is_empty());
        assert!(!graph.has_edges(EntityReference::native(1)));
    }
}
