//! Column and archetype identifiers.
//!
//! A `ColumnId` exists 1:1 with a component `DataTypeId` — relation types
//! never produce a column, they live in the sparse relation tables instead.
//! An `ArchetypeId` names a node in the archetype graph: `EMPTY` is the
//! archetype with no columns (every `World::create`d entity starts there),
//! `INVALID` marks an entity that hasn't been archetyped yet (reserved but
//! not yet created) or a query target that matched nothing.

use crate::type_registry::DataTypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnId(u32);

impl ColumnId {
    pub const INVALID: ColumnId = ColumnId(u32::MAX);

    /// Derive the column id for a component's data type. Never call this
    /// with a relation's `DataTypeId` — relations have no column.
    pub fn make(data_type: DataTypeId) -> Self {
        ColumnId(data_type.index() as u32)
    }

    pub fn data_type(self) -> DataTypeId {
        DataTypeId::from_index(self.0 as usize)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_invalid(self) -> bool {
        self.0 == u32::MAX
    }
}

impl std::fmt::Display for ColumnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_invalid() {
            write!(f, "Column(invalid)")
        } else {
            write!(f, "Column({})", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    pub const INVALID: ArchetypeId = ArchetypeId(u32::MAX);
    pub const EMPTY: ArchetypeId = ArchetypeId(0);

    pub(crate) fn new(index: u32) -> Self {
        ArchetypeId(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_invalid(self) -> bool {
        self.0 == u32::MAX
    }
}

impl std::fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_invalid() {
            write!(f, "Archetype(invalid)")
        } else {
            write!(f, "Archetype({})", self.0)
        }
    }
}
