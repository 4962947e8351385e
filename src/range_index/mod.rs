//! Indirectly sorted address index over range items
//!
//! A [`RangeIndex`] never copies the columns it indexes. It keeps a
//! permutation `sorting[i] = row of the i-th item in address order`, built
//! once on first use and immutable afterwards, and answers point and
//! containment queries with a binary search over that permutation.
//!
//! Two orderings are provided (see [`ordering`]): address only, for tables
//! whose items never share an address, and address+size for nested or
//! overlapping regions. [`NestedRangeIndex`] adds the nesting-depth layer on
//! top of the address+size ordering.

pub mod hierarchy;
pub mod ordering;

pub use hierarchy::{NestedRangeIndex, RegionHierarchy};
pub use ordering::{AddressOrdering, AddressSizeOrdering, SortPolicy};

use rayon::prelude::*;
use std::ops::Index;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Sort in parallel at or above this many items unless configured otherwise
pub const DEFAULT_PARALLEL_SORT_THRESHOLD: usize = 64 * 1024;

/// Anything with a per-row address and size
pub trait RangeSource {
    fn count(&self) -> usize;

    fn address(&self, row: usize) -> u64;

    fn size(&self, _row: usize) -> u64 {
        0
    }

    /// Size including any overhead or padding owned by the item
    fn full_size(&self, row: usize) -> u64 {
        self.size(row)
    }
}

impl<T: RangeSource + ?Sized> RangeSource for &T {
    fn count(&self) -> usize {
        (**self).count()
    }
    fn address(&self, row: usize) -> u64 {
        (**self).address(row)
    }
    fn size(&self, row: usize) -> u64 {
        (**self).size(row)
    }
    fn full_size(&self, row: usize) -> u64 {
        (**self).full_size(row)
    }
}

/// Address-ordered view over a [`RangeSource`]
#[derive(Debug)]
pub struct RangeIndex<S, P> {
    source: S,
    policy: P,
    parallel_threshold: usize,
    sorting: OnceLock<Box<[u32]>>,
}

impl<S, P> RangeIndex<S, P>
where
    S: RangeSource + Sync,
    P: SortPolicy,
{
    pub fn new(source: S, policy: P) -> Self {
        Self {
            source,
            policy,
            parallel_threshold: DEFAULT_PARALLEL_SORT_THRESHOLD,
            sorting: OnceLock::new(),
        }
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn count(&self) -> usize {
        self.source.count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Build the permutation if it does not exist yet.
    ///
    /// Safe to call from several threads; every caller returns only after
    /// the permutation is complete.
    pub fn preload(&self) {
        self.sorting();
    }

    pub fn is_loaded(&self) -> bool {
        self.sorting.get().is_some()
    }

    fn sorting(&self) -> &[u32] {
        self.sorting.get_or_init(|| self.sort())
    }

    fn sort(&self) -> Box<[u32]> {
        let count = self.source.count();
        assert!(
            count <= u32::MAX as usize,
            "range index of {} items exceeds u32 row indices",
            count
        );
        let mut sorting: Vec<u32> = (0..count as u32).collect();
        let source = &self.source;
        let policy = &self.policy;
        let compare = |a: &u32, b: &u32| policy.compare(source, *a as usize, *b as usize);

        if count >= self.parallel_threshold {
            sorting.par_sort_unstable_by(compare);
        } else {
            sorting.sort_unstable_by(compare);
        }

        let duplicates = sorting
            .windows(2)
            .filter(|pair| policy.is_forbidden_duplicate(source, pair[0] as usize, pair[1] as usize))
            .count();
        if duplicates > 0 {
            warn!(
                duplicates,
                "Range index holds exactly overlapping items where none are allowed"
            );
        }
        debug!("Sorted range index of {} items", count);

        sorting.into_boxed_slice()
    }

    /// Row at sorted position `sorted`. Panics if out of range.
    pub fn row(&self, sorted: usize) -> usize {
        let sorting = self.sorting();
        assert!(
            sorted < sorting.len(),
            "sorted index {} out of range for range index of {} items",
            sorted,
            sorting.len()
        );
        sorting[sorted] as usize
    }

    pub fn address(&self, sorted: usize) -> u64 {
        self.source.address(self.row(sorted))
    }

    pub fn size(&self, sorted: usize) -> u64 {
        self.source.size(self.row(sorted))
    }

    pub fn full_size(&self, sorted: usize) -> u64 {
        self.source.full_size(self.row(sorted))
    }

    /// Rows in address order
    pub fn rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.sorting().iter().map(|&row| row as usize)
    }

    /// Sorted position of the last item whose address is `<= address`
    pub(crate) fn floor(&self, address: u64) -> Option<usize> {
        let sorting = self.sorting();
        let after = sorting.partition_point(|&row| self.source.address(row as usize) <= address);
        after.checked_sub(1)
    }

    /// Whether the item at `sorted` covers `address`. Zero-size items only
    /// cover their own start address.
    pub fn covers(&self, sorted: usize, address: u64) -> bool {
        let row = self.row(sorted);
        let start = self.source.address(row);
        if address == start {
            return true;
        }
        address > start && address - start < self.source.full_size(row)
    }

    /// Find the item at `address`.
    ///
    /// With `only_direct_matches` the item must start exactly at `address`;
    /// otherwise the nearest item starting at or below `address` is returned
    /// if its range covers it. Among items sharing a start address the last
    /// in sort order wins, which under [`AddressSizeOrdering`] is the
    /// innermost one.
    pub fn find(&self, address: u64, only_direct_matches: bool) -> Option<usize> {
        let candidate = self.floor(address)?;
        if self.address(candidate) == address {
            return Some(candidate);
        }
        if only_direct_matches {
            return None;
        }
        self.covers(candidate, address).then_some(candidate)
    }
}

impl<S, P> Index<usize> for RangeIndex<S, P>
where
    S: RangeSource + Sync,
    P: SortPolicy,
{
    type Output = u32;

    fn index(&self, sorted: usize) -> &u32 {
        let sorting = self.sorting();
        assert!(
            sorted < sorting.len(),
            "sorted index {} out of range for range index of {} items",
            sorted,
            sorting.len()
        );
        &sorting[sorted]
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Plain (address, size) rows
    pub(crate) struct Ranges(pub Vec<(u64, u64)>);

    impl RangeSource for Ranges {
        fn count(&self) -> usize {
            self.0.len()
        }
        fn address(&self, row: usize) -> u64 {
            self.0[row].0
        }
        fn size(&self, row: usize) -> u64 {
            self.0[row].1
        }
    }

    /// Allocation-like rows whose full size adds a fixed overhead
    struct Padded(Vec<(u64, u64)>, u64);

    impl RangeSource for Padded {
        fn count(&self) -> usize {
            self.0.len()
        }
        fn address(&self, row: usize) -> u64 {
            self.0[row].0
        }
        fn size(&self, row: usize) -> u64 {
            self.0[row].1
        }
        fn full_size(&self, row: usize) -> u64 {
            self.0[row].1 + self.1
        }
    }

    #[test]
    fn test_sort_is_permutation() {
        let index = RangeIndex::new(Ranges(vec![(30, 0), (10, 0), (20, 0)]), AddressOrdering);
        assert!(!index.is_loaded());

        assert!(index.address(0) <= index.address(1));
        assert!(index.address(1) <= index.address(2));
        assert!(index.is_loaded());

        let mut rows: Vec<usize> = index.rows().collect();
        assert_eq!(rows, vec![1, 2, 0]);
        rows.sort();
        assert_eq!(rows, vec![0, 1, 2]);
        assert_eq!(index[0], 1);
    }

    /// Claims more rows than a u32 permutation can hold
    struct Oversized;

    impl RangeSource for Oversized {
        fn count(&self) -> usize {
            u32::MAX as usize + 1
        }
        fn address(&self, row: usize) -> u64 {
            row as u64
        }
    }

    #[test]
    #[should_panic(expected = "exceeds u32 row indices")]
    fn test_sort_rejects_more_rows_than_u32() {
        RangeIndex::new(Oversized, AddressOrdering).preload();
    }

    #[test]
    fn test_preload_is_idempotent() {
        let index = RangeIndex::new(Ranges(vec![(2, 1), (1, 1)]), AddressOrdering);
        index.preload();
        let first: Vec<usize> = index.rows().collect();
        index.preload();
        assert_eq!(index.rows().collect::<Vec<_>>(), first);
    }

    #[test]
    fn test_parallel_sort_matches_serial() {
        let items: Vec<(u64, u64)> = (0..500u64).map(|i| ((i * 7919) % 503, i % 3)).collect();
        let serial = RangeIndex::new(Ranges(items.clone()), AddressSizeOrdering::new(true));
        let parallel =
            RangeIndex::new(Ranges(items), AddressSizeOrdering::new(true)).with_parallel_threshold(1);

        assert_eq!(
            serial.rows().collect::<Vec<_>>(),
            parallel.rows().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_ties_broken_by_row() {
        let index = RangeIndex::new(Ranges(vec![(5, 0), (5, 0), (1, 0)]), AddressOrdering);
        assert_eq!(index.rows().collect::<Vec<_>>(), vec![2, 0, 1]);
    }

    #[test]
    fn test_address_size_puts_enclosing_first() {
        let index = RangeIndex::new(
            Ranges(vec![(0, 50), (60, 10), (0, 100)]),
            AddressSizeOrdering::new(false),
        );
        assert_eq!(index.rows().collect::<Vec<_>>(), vec![2, 0, 1]);
    }

    #[test]
    fn test_exact_duplicates_keep_row_order() {
        for allow in [true, false] {
            let index = RangeIndex::new(
                Ranges(vec![(8, 4), (8, 4), (0, 4)]),
                AddressSizeOrdering::new(allow),
            );
            assert_eq!(index.rows().collect::<Vec<_>>(), vec![2, 0, 1]);
        }
    }

    #[test]
    fn test_find_exact_and_containing() {
        let index = RangeIndex::new(Ranges(vec![(30, 5), (10, 5), (20, 5)]), AddressOrdering);

        let hit = index.find(20, true).unwrap();
        assert_eq!(index.address(hit), 20);
        assert_eq!(index.find(21, true), None);

        let covering = index.find(21, false).unwrap();
        assert_eq!(index.address(covering), 20);
        assert_eq!(index.find(25, false), None);
        assert_eq!(index.find(5, false), None);
        assert_eq!(index.find(34, false).map(|i| index.address(i)), Some(30));
    }

    #[test]
    fn test_zero_size_matches_only_start() {
        let index = RangeIndex::new(Ranges(vec![(10, 0)]), AddressOrdering);
        assert_eq!(index.find(10, false), Some(0));
        assert_eq!(index.find(11, false), None);
    }

    #[test]
    fn test_find_uses_full_size() {
        let index = RangeIndex::new(Padded(vec![(100, 16)], 8), AddressOrdering);
        assert_eq!(index.full_size(0), 24);
        assert_eq!(index.find(120, false), Some(0));
        assert_eq!(index.find(124, false), None);
    }

    #[test]
    fn test_find_returns_innermost_of_same_start() {
        let index = RangeIndex::new(
            Ranges(vec![(0, 100), (0, 50)]),
            AddressSizeOrdering::new(false),
        );
        let hit = index.find(0, true).unwrap();
        assert_eq!(index.row(hit), 1);
        // Past the inner region the candidate no longer covers; ancestors
        // come from the hierarchy layer
        assert_eq!(index.find(70, false), None);
    }

    #[test]
    fn test_empty_index() {
        let index = RangeIndex::new(Ranges(Vec::new()), AddressOrdering);
        assert!(index.is_empty());
        assert_eq!(index.find(0, false), None);
        assert_eq!(index.find(u64::MAX, true), None);
    }

    #[test]
    fn test_borrowed_source() {
        let ranges = Ranges(vec![(4, 4), (0, 4)]);
        let index = RangeIndex::new(&ranges, AddressOrdering);
        assert_eq!(index.row(0), 1);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_sorted_index_panics() {
        let index = RangeIndex::new(Ranges(vec![(1, 1)]), AddressOrdering);
        index.row(1);
    }
}
