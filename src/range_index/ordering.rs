//! Sort policies for [`RangeIndex`](super::RangeIndex)

use super::RangeSource;
use std::cmp::Ordering;

/// Total order over the rows of a [`RangeSource`]
///
/// Implementations must break every tie (ultimately by row) so the sorted
/// permutation is deterministic.
pub trait SortPolicy: Send + Sync {
    fn compare<S: RangeSource + ?Sized>(&self, source: &S, a: usize, b: usize) -> Ordering;

    /// Whether two adjacent sorted rows are an exact duplicate the policy
    /// does not permit. Checked once after the sort.
    fn is_forbidden_duplicate<S: RangeSource + ?Sized>(
        &self,
        _source: &S,
        _a: usize,
        _b: usize,
    ) -> bool {
        false
    }
}

/// Ascending address. For items that never share an address.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressOrdering;

impl SortPolicy for AddressOrdering {
    #[inline]
    fn compare<S: RangeSource + ?Sized>(&self, source: &S, a: usize, b: usize) -> Ordering {
        source
            .address(a)
            .cmp(&source.address(b))
            .then(a.cmp(&b))
    }
}

/// Ascending address, then descending full size, then row.
///
/// Enclosing ranges sort before the ranges they contain when both start at
/// the same address, which is what the hierarchy scan relies on.
/// `allow_exact_overlap` decides whether two items with identical address
/// and size are legitimate (kept in row order) or an integrity problem that
/// gets reported after the sort.
#[derive(Debug, Clone, Copy)]
pub struct AddressSizeOrdering {
    pub allow_exact_overlap: bool,
}

impl AddressSizeOrdering {
    pub fn new(allow_exact_overlap: bool) -> Self {
        Self {
            allow_exact_overlap,
        }
    }
}

impl SortPolicy for AddressSizeOrdering {
    #[inline]
    fn compare<S: RangeSource + ?Sized>(&self, source: &S, a: usize, b: usize) -> Ordering {
        source
            .address(a)
            .cmp(&source.address(b))
            .then_with(|| source.full_size(b).cmp(&source.full_size(a)))
            .then(a.cmp(&b))
    }

    fn is_forbidden_duplicate<S: RangeSource + ?Sized>(
        &self,
        source: &S,
        a: usize,
        b: usize,
    ) -> bool {
        !self.allow_exact_overlap
            && source.address(a) == source.address(b)
            && source.full_size(a) == source.full_size(b)
    }
}
