//! Nesting depth for overlapping regions
//!
//! One linear scan over the address+size order with a stack of open
//! regions. A region closes the open regions it outgrows (its end is past
//! theirs, or it starts at or after their end); whatever is left on top is
//! its parent. Regions that partially overlap attach to whatever is open, so
//! parents are only meaningful for properly nested sets.

use super::{AddressSizeOrdering, RangeIndex, RangeSource};
use std::sync::OnceLock;
use tracing::debug;

/// Per-region nesting layer and parent, indexed by sorted position
#[derive(Debug, Clone, Default)]
pub struct RegionHierarchy {
    layers: Vec<u32>,
    parents: Vec<Option<u32>>,
    /// Row -> sorted position
    positions: Vec<u32>,
}

impl RegionHierarchy {
    pub fn build<S: RangeSource + Sync>(index: &RangeIndex<S, AddressSizeOrdering>) -> Self {
        let count = index.count();
        let mut layers = Vec::with_capacity(count);
        let mut parents = Vec::with_capacity(count);
        let mut positions = vec![0u32; count];
        // (layer, end, sorted position)
        let mut stack: Vec<(u32, u64, u32)> = Vec::new();

        for (sorted, row) in index.rows().enumerate() {
            let start = index.source().address(row);
            let end = start.saturating_add(index.source().full_size(row));

            while let Some(&(_, open_end, _)) = stack.last() {
                if end > open_end || start >= open_end {
                    stack.pop();
                } else {
                    break;
                }
            }

            let layer = stack.last().map_or(0, |&(layer, _, _)| layer + 1);
            layers.push(layer);
            parents.push(stack.last().map(|&(_, _, parent)| parent));
            positions[row] = sorted as u32;
            stack.push((layer, end, sorted as u32));
        }

        debug!(
            "Computed region hierarchy for {} regions, max depth {}",
            count,
            layers.iter().max().copied().unwrap_or(0)
        );

        Self {
            layers,
            parents,
            positions,
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// 0 for top-level regions
    pub fn layer(&self, sorted: usize) -> u32 {
        self.layers[sorted]
    }

    pub fn parent(&self, sorted: usize) -> Option<usize> {
        self.parents[sorted].map(|p| p as usize)
    }

    pub fn position_of_row(&self, row: usize) -> usize {
        self.positions[row] as usize
    }

    /// Enclosing regions from the direct parent outwards
    pub fn ancestors(&self, sorted: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.parent(sorted), move |&p| self.parent(p))
    }

    pub fn max_layer(&self) -> u32 {
        self.layers.iter().max().copied().unwrap_or(0)
    }
}

/// Address+size [`RangeIndex`] with a lazily computed [`RegionHierarchy`]
#[derive(Debug)]
pub struct NestedRangeIndex<S> {
    index: RangeIndex<S, AddressSizeOrdering>,
    hierarchy: OnceLock<RegionHierarchy>,
}

impl<S: RangeSource + Sync> NestedRangeIndex<S> {
    pub fn new(source: S, allow_exact_overlap: bool) -> Self {
        Self::from_index(RangeIndex::new(
            source,
            AddressSizeOrdering::new(allow_exact_overlap),
        ))
    }

    pub fn from_index(index: RangeIndex<S, AddressSizeOrdering>) -> Self {
        Self {
            index,
            hierarchy: OnceLock::new(),
        }
    }

    pub fn index(&self) -> &RangeIndex<S, AddressSizeOrdering> {
        &self.index
    }

    /// Sort and compute layers
    pub fn preload(&self) {
        self.hierarchy();
    }

    pub fn hierarchy(&self) -> &RegionHierarchy {
        self.hierarchy
            .get_or_init(|| RegionHierarchy::build(&self.index))
    }

    pub fn count(&self) -> usize {
        self.index.count()
    }

    pub fn layer(&self, sorted: usize) -> u32 {
        self.hierarchy().layer(sorted)
    }

    /// Innermost region covering `address`: the nearest region starting at
    /// or below it, or the first of that region's ancestors that covers it
    pub fn find_containing(&self, address: u64) -> Option<usize> {
        let candidate = self.index.floor(address)?;
        if self.index.covers(candidate, address) {
            return Some(candidate);
        }
        self.hierarchy()
            .ancestors(candidate)
            .find(|&ancestor| self.index.covers(ancestor, address))
    }

    /// Row of the region directly enclosing region `row`
    pub fn enclosing_row(&self, row: usize) -> Option<usize> {
        let hierarchy = self.hierarchy();
        let sorted = hierarchy.position_of_row(row);
        hierarchy.parent(sorted).map(|parent| self.index.row(parent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range_index::tests::Ranges;

    fn layers_by_row(index: &NestedRangeIndex<Ranges>) -> Vec<u32> {
        let hierarchy = index.hierarchy();
        (0..index.count())
            .map(|row| hierarchy.layer(hierarchy.position_of_row(row)))
            .collect()
    }

    #[test]
    fn test_nesting_layers() {
        let index = NestedRangeIndex::new(Ranges(vec![(0, 100), (0, 50), (60, 10)]), false);
        assert_eq!(layers_by_row(&index), vec![0, 1, 1]);
        assert_eq!(index.enclosing_row(1), Some(0));
        assert_eq!(index.enclosing_row(2), Some(0));
        assert_eq!(index.enclosing_row(0), None);
    }

    #[test]
    fn test_siblings_and_deep_nesting() {
        let index = NestedRangeIndex::new(
            Ranges(vec![
                (0, 100),
                (10, 40),
                (20, 10),
                (22, 2),
                (200, 50),
            ]),
            false,
        );
        assert_eq!(layers_by_row(&index), vec![0, 1, 2, 3, 0]);
        assert_eq!(index.hierarchy().max_layer(), 3);

        let innermost = index.hierarchy().position_of_row(3);
        let chain: Vec<usize> = index
            .hierarchy()
            .ancestors(innermost)
            .map(|sorted| index.index().row(sorted))
            .collect();
        assert_eq!(chain, vec![2, 1, 0]);
    }

    #[test]
    fn test_zero_size_regions() {
        // Zero-size at the start of a region nests; at its end it does not
        let index = NestedRangeIndex::new(Ranges(vec![(10, 10), (10, 0), (20, 0)]), false);
        assert_eq!(layers_by_row(&index), vec![0, 1, 0]);
    }

    #[test]
    fn test_zero_size_at_start_and_end_of_siblings() {
        let index = NestedRangeIndex::new(
            Ranges(vec![
                (0, 100),
                (0, 50),
                (60, 10),
                (0, 0),
                (100, 0),
                (50, 0),
            ]),
            false,
        );
        // Starts nest, ends close the enclosing region
        assert_eq!(layers_by_row(&index), vec![0, 1, 1, 2, 0, 1]);
        assert_eq!(index.enclosing_row(3), Some(1));
        assert_eq!(index.enclosing_row(5), Some(0));
        assert_eq!(index.enclosing_row(4), None);
    }

    #[test]
    fn test_exact_overlap_nests() {
        let index = NestedRangeIndex::new(Ranges(vec![(0, 16), (0, 16)]), true);
        assert_eq!(layers_by_row(&index), vec![0, 1]);
        // The later duplicate is the innermost
        assert_eq!(index.index().find(0, true).map(|s| index.index().row(s)), Some(1));
    }

    #[test]
    fn test_find_containing_walks_ancestors() {
        let index = NestedRangeIndex::new(
            Ranges(vec![(0, 100), (10, 10), (30, 10)]),
            false,
        );
        let found = |address| index.find_containing(address).map(|s| index.index().row(s));

        assert_eq!(found(35), Some(2));
        assert_eq!(found(50), Some(0));
        assert_eq!(found(15), Some(1));
        assert_eq!(found(100), None);
        // Plain find stops at the nearest candidate
        assert_eq!(index.index().find(50, false), None);
    }

    #[test]
    fn test_empty_hierarchy() {
        let index = NestedRangeIndex::new(Ranges(Vec::new()), false);
        assert!(index.hierarchy().is_empty());
        assert_eq!(index.find_containing(0), None);
    }
}
