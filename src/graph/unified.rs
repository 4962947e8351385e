//! Unified index space over managed handles and native objects
//!
//! Managed handles keep their own index `[0, G)`; native object row `r`
//! becomes `G + r`. The two ranges never overlap, so one `u32` is enough to
//! name either kind of object in the connection arrays.

use crate::entity::EntityReference;
use crate::error::{SnapshotError, SnapshotResult};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::hash_map::Entry;
use tracing::debug;

/// What a unified index refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnifiedTarget {
    /// Managed handle index
    Managed(u32),
    /// Native object row
    Native(u32),
}

/// Bidirectional mapping between capture identifiers and unified indices
///
/// Native identifiers (instance ids or addresses) map to `G + row`. Managed
/// objects are identified by their GC handle target address and map to the
/// handle index, but only when no native object claims the same identifier.
/// Null targets and repeated targets are only reachable by index, since a
/// target shared by two handles names neither uniquely.
#[derive(Debug, Clone, Default)]
pub struct UnifiedIndexMap {
    managed_handle_count: u32,
    /// Handle -> target address
    managed_identifiers: Vec<u64>,
    /// Native row -> identifier
    native_identifiers: Vec<u64>,
    identifier_to_unified: FxHashMap<u64, u32>,
    target_to_managed: FxHashMap<u64, u32>,
    identifier_to_managed_handle: FxHashMap<u64, u32>,
    /// (native row, managed handle) in native row order
    shells: Vec<(u32, u32)>,
}

impl UnifiedIndexMap {
    /// Build the map with one pass over each table.
    ///
    /// `managed_handles[r]` is the managed shell of native row `r`, or -1.
    /// A native identifier seen twice or an out-of-range handle fails the
    /// build.
    pub fn build(
        managed_identifiers: &[u64],
        native_identifiers: &[u64],
        managed_handles: &[i32],
    ) -> SnapshotResult<Self> {
        debug_assert_eq!(native_identifiers.len(), managed_handles.len());

        let managed_handle_count = managed_identifiers.len();
        let g = managed_handle_count as u32;
        let mut identifier_to_unified: FxHashMap<u64, u32> =
            FxHashMap::with_capacity_and_hasher(native_identifiers.len(), Default::default());
        let mut target_to_managed: FxHashMap<u64, u32> =
            FxHashMap::with_capacity_and_hasher(managed_identifiers.len(), Default::default());
        let mut identifier_to_managed_handle = FxHashMap::default();
        let mut shells = Vec::new();

        let mut shared: FxHashSet<u64> = FxHashSet::default();
        for (handle, &target) in managed_identifiers.iter().enumerate() {
            if target != 0 && target_to_managed.insert(target, handle as u32).is_some() {
                shared.insert(target);
            }
        }
        for target in &shared {
            target_to_managed.remove(target);
        }
        if !shared.is_empty() {
            debug!("{} managed targets are shared by several handles", shared.len());
        }

        for (row, (&identifier, &handle)) in
            native_identifiers.iter().zip(managed_handles).enumerate()
        {
            match identifier_to_unified.entry(identifier) {
                Entry::Occupied(existing) => {
                    return Err(SnapshotError::DuplicateIdentifier {
                        identifier,
                        first: *existing.get(),
                        second: g + row as u32,
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(g + row as u32);
                }
            }

            if handle == -1 {
                continue;
            }
            if handle < 0 || handle as usize >= managed_handle_count {
                return Err(SnapshotError::InvalidManagedHandle {
                    row,
                    handle: handle as i64,
                    handle_count: managed_handle_count,
                });
            }
            identifier_to_managed_handle.insert(identifier, handle as u32);
            shells.push((row as u32, handle as u32));
        }

        let shadowed = target_to_managed
            .keys()
            .filter(|target| identifier_to_unified.contains_key(target))
            .count();
        if shadowed > 0 {
            debug!("{} managed targets share a native identifier; native wins", shadowed);
        }

        Ok(Self {
            managed_handle_count: g,
            managed_identifiers: managed_identifiers.to_vec(),
            native_identifiers: native_identifiers.to_vec(),
            identifier_to_unified,
            target_to_managed,
            identifier_to_managed_handle,
            shells,
        })
    }

    /// G
    pub fn managed_handle_count(&self) -> u32 {
        self.managed_handle_count
    }

    /// N
    pub fn native_count(&self) -> u32 {
        self.native_identifiers.len() as u32
    }

    /// G + N
    pub fn len(&self) -> u32 {
        self.managed_handle_count + self.native_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Native identifiers win over managed targets with the same value
    pub fn unified_of(&self, identifier: u64) -> Option<u32> {
        self.identifier_to_unified
            .get(&identifier)
            .or_else(|| self.target_to_managed.get(&identifier))
            .copied()
    }

    /// Managed shell of the native object with this identifier
    pub fn managed_handle_of(&self, identifier: u64) -> Option<u32> {
        self.identifier_to_managed_handle.get(&identifier).copied()
    }

    pub fn unified_of_native_row(&self, row: u32) -> u32 {
        self.managed_handle_count + row
    }

    pub fn resolve(&self, unified: u32) -> Option<UnifiedTarget> {
        if unified < self.managed_handle_count {
            Some(UnifiedTarget::Managed(unified))
        } else if unified < self.len() {
            Some(UnifiedTarget::Native(unified - self.managed_handle_count))
        } else {
            None
        }
    }

    /// Identifier for a unified index, `None` for managed handles that are
    /// only reachable by index
    pub fn identifier_of(&self, unified: u32) -> Option<u64> {
        match self.resolve(unified)? {
            UnifiedTarget::Native(row) => Some(self.native_identifiers[row as usize]),
            UnifiedTarget::Managed(handle) => {
                let target = self.managed_identifiers[handle as usize];
                (self.unified_of(target) == Some(handle)).then_some(target)
            }
        }
    }

    /// Classify a unified index as a tagged entity reference
    pub fn entity(&self, unified: u32) -> Option<EntityReference> {
        self.resolve(unified).map(|target| match target {
            UnifiedTarget::Managed(handle) => EntityReference::managed(handle),
            UnifiedTarget::Native(row) => EntityReference::native(row),
        })
    }

    /// Native objects that own a managed shell, as (native row, handle), in row order
    pub fn shells(&self) -> &[(u32, u32)] {
        &self.shells
    }
}
