//! Resident memory accounting
//!
//! The capture records one bit per page for the whole process. Each system
//! region owns a contiguous slice of that bit array starting at its first
//! page index; a sub-range of a region is resident to the extent its pages
//! are, minus the parts of the first and last page it does not cover.

use crate::error::{SnapshotError, SnapshotResult};
use bitvec::prelude::*;
use tracing::warn;

/// Process-wide page residency bits
#[derive(Debug, Clone)]
pub struct ResidentPages {
    page_size: u64,
    bits: BitVec<u64, Lsb0>,
}

impl ResidentPages {
    pub fn new(page_size: u64, bits: BitVec<u64, Lsb0>) -> SnapshotResult<Self> {
        if page_size == 0 {
            return Err(SnapshotError::InvalidPageSize(page_size));
        }
        Ok(Self { page_size, bits })
    }

    /// From packed words, 64 pages per word, least significant bit first.
    /// Padding bits past `page_count` in the last word are dropped.
    pub fn from_words(page_size: u64, words: Vec<u64>, page_count: u64) -> SnapshotResult<Self> {
        let mut bits = BitVec::<u64, Lsb0>::from_vec(words);
        let available = bits.len() as u64;
        if page_count > available {
            return Err(SnapshotError::PageArrayLength {
                page_count,
                available,
            });
        }
        bits.truncate(page_count as usize);
        Self::new(page_size, bits)
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn page_count(&self) -> u64 {
        self.bits.len() as u64
    }

    pub fn is_resident(&self, page: u64) -> bool {
        self.bits.get(page as usize).map_or(false, |bit| *bit)
    }

    /// Resident pages in `first..=last`
    pub fn count_resident(&self, first: u64, last: u64) -> u64 {
        self.bits[first as usize..=last as usize].count_ones() as u64
    }

    pub fn total_resident(&self) -> u64 {
        self.bits.count_ones() as u64
    }
}

/// A region's slice of the page array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionPages {
    pub region: u32,
    pub base: u64,
    pub size: u64,
    pub first_page: u64,
    /// Inclusive
    pub last_page: u64,
}

impl RegionPages {
    /// Assign `ceil(size / page_size)` pages starting at `first_page`.
    /// Fails if the page array is too short. `None` for an empty region.
    pub fn new(
        region: u32,
        base: u64,
        size: u64,
        first_page: u64,
        pages: &ResidentPages,
    ) -> SnapshotResult<Option<Self>> {
        let span = size.div_ceil(pages.page_size());
        if span == 0 {
            return Ok(None);
        }
        let available = pages.page_count().saturating_sub(first_page);
        if span > available {
            return Err(SnapshotError::PageBitmapLength {
                region: region as usize,
                expected: span,
                actual: available,
            });
        }
        Ok(Some(Self {
            region,
            base,
            size,
            first_page,
            last_page: first_page + span - 1,
        }))
    }

    /// Resident bytes of `[address, address + size)`.
    ///
    /// A range that maps outside this region's pages is corrupt input: it is
    /// reported and counts as 0.
    pub fn resident_bytes(&self, pages: &ResidentPages, address: u64, size: u64) -> u64 {
        if size == 0 {
            return 0;
        }
        let page_size = pages.page_size();

        let span = address
            .checked_sub(self.base)
            .and_then(|offset| offset.checked_add(size - 1).map(|last| (offset, last)));
        let Some((offset, last_offset)) = span else {
            self.report_out_of_bounds(address, size, None);
            return 0;
        };

        let first = offset / page_size + self.first_page;
        let last = last_offset / page_size + self.first_page;
        if first < self.first_page || last > self.last_page {
            self.report_out_of_bounds(address, size, Some((first, last)));
            return 0;
        }

        let mut bytes = pages.count_resident(first, last) * page_size;
        if pages.is_resident(first) {
            bytes -= offset % page_size;
        }
        let end_in_page = (last_offset + 1) % page_size;
        if pages.is_resident(last) && end_in_page != 0 {
            bytes -= page_size - end_in_page;
        }
        bytes
    }

    /// Resident bytes of the whole region
    pub fn total_resident_bytes(&self, pages: &ResidentPages) -> u64 {
        self.resident_bytes(pages, self.base, self.size)
    }

    fn report_out_of_bounds(&self, address: u64, size: u64, page_span: Option<(u64, u64)>) {
        warn!(
            region = self.region,
            address,
            size,
            first_page = page_span.map(|(first, _)| first),
            last_page = page_span.map(|(_, last)| last),
            region_first_page = self.first_page,
            region_last_page = self.last_page,
            "Resident query outside region pages; counting it as not resident"
        );
    }
}

/// Residency for every system region of a snapshot
#[derive(Debug, Clone)]
pub struct ResidentPageAccountant {
    pages: ResidentPages,
    regions: Vec<Option<RegionPages>>,
}

impl ResidentPageAccountant {
    /// `regions[i]` is `(base, size, first_page_index)`; a negative first page
    /// index means the capture has no residency data for that region
    pub fn build(pages: ResidentPages, regions: &[(u64, u64, i64)]) -> SnapshotResult<Self> {
        let regions = regions
            .iter()
            .enumerate()
            .map(|(i, &(base, size, first_page))| {
                if first_page < 0 {
                    return Ok(None);
                }
                RegionPages::new(i as u32, base, size, first_page as u64, &pages)
            })
            .collect::<SnapshotResult<Vec<_>>>()?;
        Ok(Self { pages, regions })
    }

    pub fn pages(&self) -> &ResidentPages {
        &self.pages
    }

    /// Page slice of a region, `None` when it has no residency data.
    /// Panics if `region` is not a system region row.
    pub fn region(&self, region: usize) -> Option<&RegionPages> {
        assert!(
            region < self.regions.len(),
            "system region {} out of range ({} regions)",
            region,
            self.regions.len()
        );
        self.regions[region].as_ref()
    }

    /// Resident bytes of a sub-range of `region`; `None` without residency data
    pub fn resident_bytes(&self, region: usize, address: u64, size: u64) -> Option<u64> {
        self.region(region)
            .map(|pages| pages.resident_bytes(&self.pages, address, size))
    }

    pub fn region_resident_bytes(&self, region: usize) -> Option<u64> {
        self.region(region)
            .map(|pages| pages.total_resident_bytes(&self.pages))
    }

    pub fn total_resident_bytes(&self) -> u64 {
        self.pages.total_resident() * self.pages.page_size()
    }
}
