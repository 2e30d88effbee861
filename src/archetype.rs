// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The archetype graph: every distinct set of component columns an entity
//! can carry is a node, reached from the empty archetype by `with`/`without`
//! edges. Edges are memoized and never removed — once two archetypes are
//! known to be a column apart, that fact is cheap to ask again. Column
//! membership is also tracked in a [`BitSet`] per node so `contains` is O(1)
//! regardless of how many columns the archetype has.

use crate::bitset::BitSet;
use crate::ids::{ArchetypeId, ColumnId};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

type ColumnSet = SmallVec<[ColumnId; 8]>;

struct Node {
    columns: ColumnSet,
    bits: BitSet,
    with_edges: FxHashMap<ColumnId, ArchetypeId>,
    without_edges: FxHashMap<ColumnId, ArchetypeId>,
}

impl Node {
    fn contains(&self, column: ColumnId) -> bool {
        self.bits.contains(column.index())
    }
}

/// Owns every archetype node ever created. Nodes are append-only and
/// indexed by `ArchetypeId`, which also makes `collect`'s incremental
/// discovery (new nodes appear only at the end) trivial: a cursor is just
/// "how many nodes existed last time we looked".
pub struct ArchetypeGraph {
    nodes: Vec<Node>,
    index: FxHashMap<ColumnSet, ArchetypeId>,
}

impl ArchetypeGraph {
    pub fn new() -> Self {
        let empty = Node {
            columns: ColumnSet::new(),
            bits: BitSet::with_capacity(64),
            with_edges: FxHashMap::default(),
            without_edges: FxHashMap::default(),
        };
        let mut index = FxHashMap::default();
        index.insert(ColumnSet::new(), ArchetypeId::EMPTY);
        Self {
            nodes: vec![empty],
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, archetype: ArchetypeId) -> &Node {
        &self.nodes[archetype.index()]
    }

    pub fn contains(&self, archetype: ArchetypeId, column: ColumnId) -> bool {
        self.node(archetype).contains(column)
    }

    pub fn columns(&self, archetype: ArchetypeId) -> Vec<ColumnId> {
        self.node(archetype).columns.to_vec()
    }

    pub fn column_count(&self, archetype: ArchetypeId) -> usize {
        self.node(archetype).columns.len()
    }

    /// First column in this archetype's sorted column set, in graph order.
    /// Returns `ColumnId::INVALID` for the empty archetype. Backs the
    /// per-entity component iteration facade.
    pub fn first(&self, archetype: ArchetypeId) -> ColumnId {
        self.node(archetype)
            .columns
            .first()
            .copied()
            .unwrap_or(ColumnId::INVALID)
    }

    /// Column that follows `column` in this archetype's sorted set, or
    /// `ColumnId::INVALID` if `column` was the last (or absent).
    pub fn next(&self, archetype: ArchetypeId, column: ColumnId) -> ColumnId {
        let columns = &self.node(archetype).columns;
        match columns.iter().position(|&c| c == column) {
            Some(pos) => columns.get(pos + 1).copied().unwrap_or(ColumnId::INVALID),
            None => ColumnId::INVALID,
        }
    }

    fn find_or_insert(&mut self, columns: ColumnSet) -> ArchetypeId {
        if let Some(&id) = self.index.get(&columns) {
            return id;
        }
        let mut bits = BitSet::with_capacity(64);
        for &col in &columns {
            bits.set(col.index());
        }
        let id = ArchetypeId::new(self.nodes.len() as u32);
        self.nodes.push(Node {
            columns: columns.clone(),
            bits,
            with_edges: FxHashMap::default(),
            without_edges: FxHashMap::default(),
        });
        self.index.insert(columns, id);
        id
    }

    /// Archetype reached by adding `column` to `archetype`'s set. Idempotent:
    /// if `archetype` already has `column`, returns `archetype` unchanged.
    /// Always returns the same id for the same resulting column set, no
    /// matter which path of `with`/`without` calls produced it.
    pub fn with(&mut self, archetype: ArchetypeId, column: ColumnId) -> ArchetypeId {
        if self.contains(archetype, column) {
            return archetype;
        }
        if let Some(&cached) = self.node(archetype).with_edges.get(&column) {
            return cached;
        }
        let mut columns = self.node(archetype).columns.clone();
        let pos = columns.partition_point(|&c| c < column);
        columns.insert(pos, column);
        let next = self.find_or_insert(columns);

        self.nodes[archetype.index()].with_edges.insert(column, next);
        self.nodes[next.index()].without_edges.insert(column, archetype);
        next
    }

    /// Archetype reached by removing `column` from `archetype`'s set.
    /// Idempotent if `archetype` doesn't have `column`.
    pub fn without(&mut self, archetype: ArchetypeId, column: ColumnId) -> ArchetypeId {
        if !self.contains(archetype, column) {
            return archetype;
        }
        if let Some(&cached) = self.node(archetype).without_edges.get(&column) {
            return cached;
        }
        let mut columns = self.node(archetype).columns.clone();
        columns.retain(|&c| c != column);
        let prev = self.find_or_insert(columns);

        self.nodes[archetype.index()].without_edges.insert(column, prev);
        self.nodes[prev.index()].with_edges.insert(column, archetype);
        prev
    }

    /// Append every archetype created since `cursor` whose column set is a
    /// superset of `base`'s to `out`, and return the new cursor. Used by
    /// query filters to discover newly-created matching archetypes without
    /// rescanning the whole graph each time.
    pub fn collect(&self, base: ArchetypeId, out: &mut Vec<ArchetypeId>, cursor: usize) -> usize {
        let base_bits = &self.node(base).bits;
        for (offset, node) in self.nodes[cursor..].iter().enumerate() {
            if base_bits.is_subset_of(&node.bits) {
                out.push(ArchetypeId::new((cursor + offset) as u32));
            }
        }
        self.nodes.len()
    }
}

impl Default for ArchetypeGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_registry::DataTypeId;

    fn col(index: usize) -> ColumnId {
        ColumnId::make(DataTypeId::from_index(index))
    }

    #[test]
    fn with_and_without_are_inverses() {
        let mut graph = ArchetypeGraph::new();
        let a = graph.with(ArchetypeId::EMPTY, col(0));
        let b = graph.with(a, col(1));
        assert!(graph.contains(b, col(0)));
        assert!(graph.contains(b, col(1)));

        let back = graph.without(b, col(1));
        assert_eq!(back, a);
    }

    #[test]
    fn order_of_add_does_not_matter() {
        let mut graph = ArchetypeGraph::new();
        let path1 = {
            let a = graph.with(ArchetypeId::EMPTY, col(0));
            graph.with(a, col(1))
        };
        let path2 = {
            let a = graph.with(ArchetypeId::EMPTY, col(1));
            graph.with(a, col(0))
        };
        assert_eq!(path1, path2);
    }

    #[test]
    fn with_is_idempotent() {
        let mut graph = ArchetypeGraph::new();
        let a = graph.with(ArchetypeId::EMPTY, col(0));
        let a2 = graph.with(a, col(0));
        assert_eq!(a, a2);
    }

    #[test]
    fn collect_finds_supersets_incrementally() {
        let mut graph = ArchetypeGraph::new();
        let base = graph.with(ArchetypeId::EMPTY, col(0));

        let mut out = Vec::new();
        let cursor = graph.collect(base, &mut out, 0);
        assert!(out.contains(&base));

        let extended = graph.with(base, col(1));
        let mut out2 = Vec::new();
        let cursor2 = graph.collect(base, &mut out2, cursor);
        assert_eq!(out2, vec![extended]);
        assert_eq!(cursor2, graph.len());
    }

    #[test]
    fn first_and_next_walk_sorted_columns() {
        let mut graph = ArchetypeGraph::new();
        let a = graph.with(ArchetypeId::EMPTY, col(5));
        let a = graph.with(a, col(2));
        assert_eq!(graph.first(a), col(2));
        assert_eq!(graph.next(a, col(2)), col(5));
        assert_eq!(graph.next(a, col(5)), ColumnId::INVALID);
        assert_eq!(graph.first(ArchetypeId::EMPTY), ColumnId::INVALID);
    }
}
