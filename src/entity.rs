//! Tagged references to indexed snapshot entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which table an [`EntityReference`] points into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    ManagedObject,
    NativeObject,
    NativeAllocation,
    NativeRootReference,
    MemoryLabel,
    None,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::ManagedObject => "managed",
            EntityKind::NativeObject => "native",
            EntityKind::NativeAllocation => "allocation",
            EntityKind::NativeRootReference => "root",
            EntityKind::MemoryLabel => "label",
            EntityKind::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "managed" => Some(EntityKind::ManagedObject),
            "native" => Some(EntityKind::NativeObject),
            "allocation" => Some(EntityKind::NativeAllocation),
            "root" => Some(EntityKind::NativeRootReference),
            "label" => Some(EntityKind::MemoryLabel),
            _ => None,
        }
    }
}

/// A lookup key into one of the snapshot tables: `index` is a row number
/// in the table named by `kind`. Never owns anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityReference {
    pub kind: EntityKind,
    pub index: u32,
}

impl EntityReference {
    pub const NONE: EntityReference = EntityReference {
        kind: EntityKind::None,
        index: 0,
    };

    pub fn new(kind: EntityKind, index: u32) -> Self {
        Self { kind, index }
    }

    pub fn managed(index: u32) -> Self {
        Self::new(EntityKind::ManagedObject, index)
    }

    pub fn native(index: u32) -> Self {
        Self::new(EntityKind::NativeObject, index)
    }

    pub fn allocation(index: u32) -> Self {
        Self::new(EntityKind::NativeAllocation, index)
    }

    pub fn root_reference(index: u32) -> Self {
        Self::new(EntityKind::NativeRootReference, index)
    }

    pub fn is_none(&self) -> bool {
        self.kind == EntityKind::None
    }
}

impl Default for EntityReference {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("none");
        }
        write!(f, "{}#{}", self.kind.as_str(), self.index)
    }
}

/// Parses `kind#index` (e.g. `native#12`) or `none`
impl FromStr for EntityReference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "none" {
            return Ok(Self::NONE);
        }
        let (kind, index) = s
            .split_once('#')
            .ok_or_else(|| format!("'{}' is not of the form kind#index", s))?;
        let kind = EntityKind::parse(kind).ok_or_else(|| {
            format!(
                "unknown entity kind '{}' (managed, native, allocation, root, label)",
                kind
            )
        })?;
        let index = index
            .parse()
            .map_err(|_| format!("'{}' is not a valid index", index))?;
        Ok(Self::new(kind, index))
    }
}
