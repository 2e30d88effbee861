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

//! The world: owns the type registry, entity pool, archetype graph, dense
//! component tables and sparse relation tables, and is the only thing that
//! mutates any of them. Structural mutation (`add`/`remove`/`relate`/
//! `unrelate`/`destroy`) is never safe to call while a query iterator built
//! from this world is alive — see `query.rs`.

use crate::archetype::ArchetypeGraph;
use crate::dense_table::DenseTableRegistry;
use crate::entity::{Entity, EntityPool};
use crate::ids::{ArchetypeId, ColumnId};
use crate::sparse_table::{SparseRelationRegistry, SparseRelationTableId, Transformation};
use crate::type_registry::{DataTypeId, TypeRegistry};

/// One edge reported by [`World::relations_from`]/[`World::relations_to`]:
/// the relation type, the entity on the other side, and the payload.
pub struct RelationEdge {
    pub rel: DataTypeId,
    pub other: Entity,
    pub payload: *const u8,
}

pub struct World {
    types: TypeRegistry,
    entities: EntityPool,
    graph: ArchetypeGraph,
    dense: DenseTableRegistry,
    sparse: SparseRelationRegistry,
}

impl World {
    pub fn new() -> Self {
        let types = TypeRegistry::new();
        let entities = EntityPool::new();
        let graph = ArchetypeGraph::new();
        let mut dense = DenseTableRegistry::new();
        dense.get_or_create(ArchetypeId::EMPTY, &graph, &types);
        let sparse = SparseRelationRegistry::new();
        Self {
            types,
            entities,
            graph,
            dense,
            sparse,
        }
    }

    // -- registration -----------------------------------------------------

    pub fn register_component<T>(&mut self, name: impl Into<String>) -> DataTypeId
    where
        T: Send + Sync + Clone + 'static,
    {
        self.types.register_component::<T>(name)
    }

    pub fn register_relation<T>(&mut self, name: impl Into<String>, symmetric: bool, tree: bool) -> DataTypeId
    where
        T: Send + Sync + Clone + 'static,
    {
        self.types.register_relation::<T>(name, symmetric, tree)
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    // -- crate-internal accessors for the query compiler -------------------

    pub(crate) fn graph(&self) -> &ArchetypeGraph {
        &self.graph
    }

    /// Mutable graph access for the query compiler, which needs `with` to
    /// materialize a target's base archetype before any entity has ever
    /// carried that column combination.
    pub(crate) fn graph_mut(&mut self) -> &mut ArchetypeGraph {
        &mut self.graph
    }

    pub(crate) fn dense(&self) -> &DenseTableRegistry {
        &self.dense
    }

    pub(crate) fn sparse(&self) -> &SparseRelationRegistry {
        &self.sparse
    }

    pub(crate) fn entity_pool(&self) -> &EntityPool {
        &self.entities
    }

    // -- entity lifecycle ---------------------------------------------------

    pub fn reserve(&mut self) -> Entity {
        self.entities.reserve()
    }

    pub fn create_at(&mut self, entity: Entity) {
        self.entities.create_at(entity);
        self.dense
            .get_or_create(ArchetypeId::EMPTY, &self.graph, &self.types)
            .push_empty_row(entity.index());
    }

    pub fn create(&mut self) -> Entity {
        #[cfg(feature = "profiling")]
        let _span = tracing::info_span!("world_create").entered();
        let entity = self.reserve();
        self.create_at(entity);
        entity
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn archetype(&self, entity: Entity) -> ArchetypeId {
        self.entities.archetype(entity)
    }

    /// Destroy `entity`: for every tree relation it participates in, its
    /// children become roots first (their depth resets to 0 and propagates
    /// downward), then every sparse row touching it as either side is
    /// erased, then its dense row is erased. Panics if `entity` is dead.
    pub fn destroy(&mut self, entity: Entity) {
        assert!(self.is_alive(entity), "destroy called on dead {entity}");
        let arch = self.entities.archetype(entity);

        let rel_ids: Vec<DataTypeId> = self.types.relation_ids().collect();
        for rel in rel_ids {
            if self.types.is_tree(rel) {
                self.propagate_depth_from_children(entity, rel, 0);
            }
            self.erase_all_sparse_for_entity(entity, arch, rel);
        }

        self.dense.at_mut(arch).swap_erase(entity.index());
        self.entities.destroy(entity);
        tracing::trace!(%entity, "entity destroyed");
    }

    fn erase_all_sparse_for_entity(&mut self, entity: Entity, arch: ArchetypeId, rel: DataTypeId) {
        let idx = entity.index();
        let from_tables: Vec<SparseRelationTableId> = self.sparse.tables_from(rel, arch).to_vec();
        for id in from_tables {
            if let Some(table) = self.sparse.at_mut(id) {
                table.erase_all_from(idx);
            }
        }
        let to_tables: Vec<SparseRelationTableId> = self.sparse.tables_to(rel, arch).to_vec();
        for id in to_tables {
            if let Some(table) = self.sparse.at_mut(id) {
                table.erase_all_to(idx);
            }
        }
    }

    // -- components ----------------------------------------------------------

    pub fn has<T: 'static>(&self, entity: Entity) -> bool {
        match self.types.id_of::<T>() {
            Some(id) => self.has_component_dyn(entity, id),
            None => false,
        }
    }

    pub fn get<T: 'static>(&self, entity: Entity) -> Option<&T> {
        let id = self.types.id_of::<T>()?;
        let ptr = self.get_component_ptr(entity, id)?;
        Some(unsafe { &*(ptr as *const T) })
    }

    pub fn get_mut<T: 'static>(&mut self, entity: Entity) -> Option<&mut T> {
        let id = self.types.id_of::<T>()?;
        let ptr = self.get_component_ptr(entity, id)?;
        Some(unsafe { &mut *ptr.cast::<T>() })
    }

    /// Add (or overwrite) component `T` on `entity`. Panics if `T` was never
    /// registered via [`World::register_component`].
    pub fn add<T>(&mut self, entity: Entity, value: T)
    where
        T: Send + Sync + Clone + 'static,
    {
        let id = self
            .types
            .id_of::<T>()
            .unwrap_or_else(|| panic!("add: type {} was never registered as a component", std::any::type_name::<T>()));
        unsafe { self.add_component_dyn(entity, id, (&value as *const T).cast()) };
        std::mem::forget(value);
    }

    /// Remove component `T` from `entity`. A no-op (returns `false`) if the
    /// entity doesn't carry it — never an error, per the recoverable-outcome
    /// rule for absent-component removal.
    pub fn remove<T: 'static>(&mut self, entity: Entity) -> bool {
        let id = self
            .types
            .id_of::<T>()
            .unwrap_or_else(|| panic!("remove: type {} was never registered", std::any::type_name::<T>()));
        self.remove_component_dyn(entity, id)
    }

    fn get_component_ptr(&self, entity: Entity, data_type: DataTypeId) -> Option<*mut u8> {
        assert!(self.is_alive(entity), "{entity} is dead");
        let column = ColumnId::make(data_type);
        let arch = self.entities.archetype(entity);
        if !self.graph.contains(arch, column) {
            return None;
        }
        let table = self.dense.at(arch);
        let row = table.row(entity.index())?;
        Some(table.column_ptr(column, row))
    }

    fn has_component_dyn(&self, entity: Entity, data_type: DataTypeId) -> bool {
        assert!(self.is_alive(entity), "{entity} is dead");
        self.graph.contains(self.entities.archetype(entity), ColumnId::make(data_type))
    }

    /// # Safety
    /// `src` must point to a live value of the type registered under
    /// `data_type`.
    unsafe fn add_component_dyn(&mut self, entity: Entity, data_type: DataTypeId, src: *const u8) {
        assert!(self.is_alive(entity), "add_component: {entity} is dead");
        assert!(
            self.types.is_component(data_type),
            "add_component: {} is not a component type",
            self.types.name(data_type)
        );
        let column = ColumnId::make(data_type);
        let old_arch = self.entities.archetype(entity);

        if self.graph.contains(old_arch, column) {
            let table = self.dense.at_mut(old_arch);
            let row = table.row(entity.index()).expect("entity must have a row in its own archetype");
            table.set_column_move(column, row, src);
            return;
        }

        let new_arch = self.graph.with(old_arch, column);
        self.dense.get_or_create(new_arch, &self.graph, &self.types);
        self.dense.move_row(entity.index(), old_arch, new_arch);
        self.dense.at_mut(new_arch).push_column_move(column, src);
        self.entities.set_archetype(entity, new_arch);
        self.move_sparse(entity, old_arch, new_arch);
        tracing::trace!(%entity, component = %self.types.name(data_type), "component added");
    }

    fn remove_component_dyn(&mut self, entity: Entity, data_type: DataTypeId) -> bool {
        assert!(self.is_alive(entity), "remove_component: {entity} is dead");
        let column = ColumnId::make(data_type);
        let old_arch = self.entities.archetype(entity);
        if !self.graph.contains(old_arch, column) {
            return false;
        }
        let new_arch = self.graph.without(old_arch, column);
        self.dense.get_or_create(new_arch, &self.graph, &self.types);
        self.dense.move_row(entity.index(), old_arch, new_arch);
        self.entities.set_archetype(entity, new_arch);
        self.move_sparse(entity, old_arch, new_arch);
        tracing::trace!(%entity, component = %self.types.name(data_type), "component removed");
        true
    }

    /// Iterate `entity`'s current components in archetype-graph order,
    /// yielding `(type, pointer-to-value)` pairs. Read-only: the pointers
    /// are invalidated by any structural mutation on `self`.
    pub fn components(&self, entity: Entity) -> Vec<(DataTypeId, *const u8)> {
        assert!(self.is_alive(entity), "{entity} is dead");
        let arch = self.entities.archetype(entity);
        let table = self.dense.at(arch);
        let row = table.row(entity.index()).expect("entity must have a row in its own archetype");
        let mut out = Vec::new();
        let mut column = self.graph.first(arch);
        while !column.is_invalid() {
            out.push((column.data_type(), table.column_ptr(column, row) as *const u8));
            column = self.graph.next(arch, column);
        }
        out
    }

    // -- relations ------------------------------------------------------------

    pub fn relate<T>(&mut self, from: Entity, to: Entity, value: T)
    where
        T: Send + Sync + Clone + 'static,
    {
        let id = self
            .types
            .id_of::<T>()
            .unwrap_or_else(|| panic!("relate: type {} was never registered as a relation", std::any::type_name::<T>()));
        unsafe { self.relate_dyn(from, to, id, (&value as *const T).cast()) };
        std::mem::forget(value);
    }

    pub fn unrelate<T: 'static>(&mut self, from: Entity, to: Entity) -> bool {
        let id = self
            .types
            .id_of::<T>()
            .unwrap_or_else(|| panic!("unrelate: type {} was never registered", std::any::type_name::<T>()));
        self.unrelate_dyn(from, to, id)
    }

    pub fn related<T: 'static>(&self, from: Entity, to: Entity) -> bool {
        match self.types.id_of::<T>() {
            Some(id) => self.related_dyn(from, to, id),
            None => false,
        }
    }

    pub fn relation<T: 'static + Clone>(&self, from: Entity, to: Entity) -> Option<T> {
        let id = self.types.id_of::<T>()?;
        self.relation_dyn(from, to, id).map(|ptr| unsafe { (*ptr.cast::<T>()).clone() })
    }

    pub fn is_ancestor<T: 'static>(&self, candidate: Entity, entity: Entity) -> bool {
        match self.types.id_of::<T>() {
            Some(id) => self.is_ancestor_dyn(candidate, entity, id),
            None => false,
        }
    }

    /// # Safety
    /// `src` must point to a live value of the type registered under `rel`.
    unsafe fn relate_dyn(&mut self, from: Entity, to: Entity, rel: DataTypeId, src: *const u8) {
        assert!(self.is_alive(from), "relate: {from} is dead");
        assert!(self.is_alive(to), "relate: {to} is dead");
        assert!(self.types.is_relation(rel), "relate: {} is not a relation type", self.types.name(rel));

        let tree = self.types.is_tree(rel);
        let symmetric = self.types.is_symmetric(rel);

        if tree {
            assert!(from != to, "relate: tree relation {} cannot self-relate", self.types.name(rel));
            assert!(
                !self.is_ancestor_dyn(from, to, rel),
                "relate: would introduce a cycle in tree relation {}",
                self.types.name(rel)
            );
            if let Some(old_parent) = self.parent_of(from, rel) {
                self.unrelate_dyn(from, old_parent, rel);
            }
        }

        let (mut from, mut to) = (from, to);
        if symmetric && self.canonical_key(from) > self.canonical_key(to) {
            std::mem::swap(&mut from, &mut to);
        }

        let depth = if tree { self.depth_of(to, rel).saturating_add(1) } else { 0 };
        assert!(
            depth != u32::MAX,
            "relate: tree relation {} depth saturated at u32::MAX",
            self.types.name(rel)
        );
        let from_arch = self.entities.archetype(from);
        let to_arch = self.entities.archetype(to);
        let table_id = SparseRelationTableId {
            data_type: rel,
            from: from_arch,
            to: to_arch,
            depth,
        };
        let info = self.types.get(rel);
        let table = self
            .sparse
            .get_or_create(table_id, info.size, info.align, info.copy, info.move_ctor, info.drop);
        table.insert(from.index(), to.index(), src);

        if tree {
            self.propagate_depth_from_children(from, rel, depth.saturating_add(1));
        }
        tracing::trace!(%from, %to, rel = %self.types.name(rel), "relate");
    }

    fn unrelate_dyn(&mut self, from: Entity, to: Entity, rel: DataTypeId) -> bool {
        assert!(self.types.is_relation(rel), "unrelate: {} is not a relation type", self.types.name(rel));
        let tree = self.types.is_tree(rel);
        let symmetric = self.types.is_symmetric(rel);

        let (mut from, mut to) = (from, to);
        if symmetric && self.canonical_key(from) > self.canonical_key(to) {
            std::mem::swap(&mut from, &mut to);
        }

        let depth = if tree { self.depth_of(from, rel) } else { 0 };
        let table_id = SparseRelationTableId {
            data_type: rel,
            from: self.entities.archetype(from),
            to: self.entities.archetype(to),
            depth,
        };
        let removed = match self.sparse.at_mut(table_id) {
            Some(table) => table.erase(from.index(), to.index()),
            None => false,
        };
        if removed && tree {
            self.propagate_depth_from_children(from, rel, 1);
        }
        removed
    }

    fn related_dyn(&self, from: Entity, to: Entity, rel: DataTypeId) -> bool {
        self.find_edge(from, to, rel).is_some()
    }

    fn relation_dyn(&self, from: Entity, to: Entity, rel: DataTypeId) -> Option<*mut u8> {
        let (table_id, row) = self.find_edge(from, to, rel)?;
        Some(self.sparse.at(table_id).unwrap().payload_ptr(row))
    }

    /// Find the row for edge `(from, to)` of relation `rel`, searching every
    /// depth for tree relations (whose table id depends on the child's
    /// current depth, which the caller doesn't necessarily know) and the
    /// canonical pair for symmetric ones.
    fn find_edge(&self, from: Entity, to: Entity, rel: DataTypeId) -> Option<(SparseRelationTableId, usize)> {
        let tree = self.types.is_tree(rel);
        let symmetric = self.types.is_symmetric(rel);
        let (from, to) = if symmetric && self.canonical_key(from) > self.canonical_key(to) {
            (to, from)
        } else {
            (from, to)
        };
        let from_arch = self.entities.archetype(from);
        let to_arch = self.entities.archetype(to);
        if tree {
            for &id in self.sparse.tables_from(rel, from_arch) {
                if id.to == to_arch {
                    if let Some(table) = self.sparse.at(id) {
                        if let Some(row) = table.row(from.index(), to.index()) {
                            return Some((id, row));
                        }
                    }
                }
            }
            None
        } else {
            let id = SparseRelationTableId {
                data_type: rel,
                from: from_arch,
                to: to_arch,
                depth: 0,
            };
            self.sparse.at(id).and_then(|t| t.row(from.index(), to.index())).map(|row| (id, row))
        }
    }

    fn canonical_key(&self, entity: Entity) -> (ArchetypeId, u32) {
        (self.entities.archetype(entity), entity.index())
    }

    fn parent_of(&self, entity: Entity, rel: DataTypeId) -> Option<Entity> {
        let arch = self.entities.archetype(entity);
        let idx = entity.index();
        for &table_id in self.sparse.tables_from(rel, arch) {
            let table = self.sparse.at(table_id)?;
            if let Some(&row) = table.rows_from(idx).first() {
                let (_, to_idx) = table.indices(row as usize);
                return Some(self.entities.entity_at(to_idx));
            }
        }
        None
    }

    fn depth_of(&self, entity: Entity, rel: DataTypeId) -> u32 {
        let arch = self.entities.archetype(entity);
        let idx = entity.index();
        for &table_id in self.sparse.tables_from(rel, arch) {
            if let Some(table) = self.sparse.at(table_id) {
                if !table.rows_from(idx).is_empty() {
                    return table_id.depth;
                }
            }
        }
        0
    }

    fn is_ancestor_dyn(&self, candidate: Entity, entity: Entity, rel: DataTypeId) -> bool {
        let mut current = entity;
        loop {
            match self.parent_of(current, rel) {
                Some(parent) => {
                    if parent == candidate {
                        return true;
                    }
                    current = parent;
                }
                None => return false,
            }
        }
    }

    /// Re-bucket `parent`'s children (rows where `parent` is the `to` side
    /// of this tree relation) into tables at `new_child_depth`, recursing
    /// into grandchildren. Also used by `destroy`/`unrelate` with an
    /// explicit target depth rather than `parent`'s own depth + 1.
    fn propagate_depth_from_children(&mut self, parent: Entity, rel: DataTypeId, new_child_depth: u32) {
        let parent_arch = self.entities.archetype(parent);
        let parent_idx = parent.index();
        let child_table_ids: Vec<SparseRelationTableId> = self.sparse.tables_to(rel, parent_arch).to_vec();
        let info = self.types.get(rel);
        let (size, align, copy, move_ctor, drop) = (info.size, info.align, info.copy, info.move_ctor, info.drop);

        for old_id in child_table_ids {
            let rows: Vec<(u32, u32)> = match self.sparse.at(old_id) {
                Some(table) => table
                    .rows_to(parent_idx)
                    .iter()
                    .map(|&r| table.indices(r as usize))
                    .collect(),
                None => continue,
            };
            if rows.is_empty() {
                continue;
            }

            if old_id.depth == new_child_depth {
                for (child_idx, _) in rows {
                    let child = self.entities.entity_at(child_idx);
                    self.propagate_depth_from_children(child, rel, new_child_depth.saturating_add(1));
                }
                continue;
            }

            let new_id = SparseRelationTableId {
                data_type: rel,
                from: old_id.from,
                to: old_id.to,
                depth: new_child_depth,
            };
            let mut buf = vec![0u8; size.max(1)];
            for (child_idx, to_idx) in rows {
                let moved = unsafe {
                    self.sparse
                        .at_mut(old_id)
                        .map(|t| t.extract(child_idx, to_idx, buf.as_mut_ptr()))
                        .unwrap_or(false)
                };
                if moved {
                    let new_table = self.sparse.get_or_create(new_id, size, align, copy, move_ctor, drop);
                    unsafe { new_table.insert(child_idx, to_idx, buf.as_ptr()) };
                }
                let child = self.entities.entity_at(child_idx);
                self.propagate_depth_from_children(child, rel, new_child_depth.saturating_add(1));
            }
        }
    }

    /// After `entity` moves from `old_arch` to `new_arch` (component
    /// add/remove), every sparse row where it appears as `from` or `to`
    /// lives in a table keyed by the stale archetype and must be relocated.
    /// Symmetric relations may also need their canonical pair re-ordered if
    /// the archetype change flips which side sorts first.
    fn move_sparse(&mut self, entity: Entity, old_arch: ArchetypeId, new_arch: ArchetypeId) {
        let idx = entity.index();
        let rel_ids: Vec<DataTypeId> = self.types.relation_ids().collect();

        for rel in rel_ids {
            let symmetric = self.types.is_symmetric(rel);
            let mut candidate_ids: Vec<SparseRelationTableId> = self.sparse.tables_from(rel, old_arch).to_vec();
            for &id in self.sparse.tables_to(rel, old_arch) {
                if !candidate_ids.contains(&id) {
                    candidate_ids.push(id);
                }
            }
            if candidate_ids.is_empty() {
                continue;
            }
            let info = self.types.get(rel);
            let (size, align, copy, move_ctor, drop) = (info.size, info.align, info.copy, info.move_ctor, info.drop);

            for old_id in candidate_ids {
                let rows: Vec<(u32, u32)> = match self.sparse.at(old_id) {
                    Some(table) => {
                        let mut seen = std::collections::BTreeSet::new();
                        for &r in table.rows_from(idx) {
                            seen.insert(r);
                        }
                        for &r in table.rows_to(idx) {
                            seen.insert(r);
                        }
                        seen.into_iter().map(|r| table.indices(r as usize)).collect()
                    }
                    None => continue,
                };

                for (f, t) in rows {
                    let new_from_arch = if old_id.from == old_arch && f == idx { new_arch } else { old_id.from };
                    let new_to_arch = if old_id.to == old_arch && t == idx { new_arch } else { old_id.to };

                    let transformation = if symmetric {
                        Transformation::SwapIfGreater
                    } else {
                        Transformation::None
                    };
                    let (final_f, final_t, final_from_arch, final_to_arch) = match transformation {
                        Transformation::None => (f, t, new_from_arch, new_to_arch),
                        Transformation::SwapIfGreater => {
                            if (new_from_arch, f) > (new_to_arch, t) {
                                (t, f, new_to_arch, new_from_arch)
                            } else {
                                (f, t, new_from_arch, new_to_arch)
                            }
                        }
                        Transformation::Swap => (t, f, new_to_arch, new_from_arch),
                    };

                    let new_id = SparseRelationTableId {
                        data_type: rel,
                        from: final_from_arch,
                        to: final_to_arch,
                        depth: old_id.depth,
                    };
                    if new_id == old_id {
                        continue;
                    }

                    let mut buf = vec![0u8; size.max(1)];
                    let moved = unsafe {
                        self.sparse
                            .at_mut(old_id)
                            .map(|table| table.extract(f, t, buf.as_mut_ptr()))
                            .unwrap_or(false)
                    };
                    if moved {
                        let new_table = self.sparse.get_or_create(new_id, size, align, copy, move_ctor, drop);
                        unsafe { new_table.insert(final_f, final_t, buf.as_ptr()) };
                    }
                }
            }
        }
    }

    /// Every outgoing edge of every relation type touching `entity`,
    /// transparently folding in the reverse direction for symmetric
    /// relations (an edge `relate(other, entity, R)` of a symmetric `R`
    /// shows up here too, same as if it had been stored the other way).
    pub fn relations_from(&self, entity: Entity) -> Vec<RelationEdge> {
        assert!(self.is_alive(entity), "{entity} is dead");
        let arch = self.entities.archetype(entity);
        let idx = entity.index();
        let mut out = Vec::new();
        for rel in self.types.relation_ids() {
            for &id in self.sparse.tables_from(rel, arch) {
                if let Some(table) = self.sparse.at(id) {
                    for &row in table.rows_from(idx) {
                        let (_, to_idx) = table.indices(row as usize);
                        out.push(RelationEdge {
                            rel,
                            other: self.entities.entity_at(to_idx),
                            payload: table.payload_ptr(row as usize),
                        });
                    }
                }
            }
            if self.types.is_symmetric(rel) {
                for &id in self.sparse.tables_to(rel, arch) {
                    if let Some(table) = self.sparse.at(id) {
                        for &row in table.rows_to(idx) {
                            let (from_idx, _) = table.indices(row as usize);
                            out.push(RelationEdge {
                                rel,
                                other: self.entities.entity_at(from_idx),
                                payload: table.payload_ptr(row as usize),
                            });
                        }
                    }
                }
            }
        }
        out
    }

    /// Mirror of [`World::relations_from`] over incoming edges.
    pub fn relations_to(&self, entity: Entity) -> Vec<RelationEdge> {
        assert!(self.is_alive(entity), "{entity} is dead");
        let arch = self.entities.archetype(entity);
        let idx = entity.index();
        let mut out = Vec::new();
        for rel in self.types.relation_ids() {
            for &id in self.sparse.tables_to(rel, arch) {
                if let Some(table) = self.sparse.at(id) {
                    for &row in table.rows_to(idx) {
                        let (from_idx, _) = table.indices(row as usize);
                        out.push(RelationEdge {
                            rel,
                            other: self.entities.entity_at(from_idx),
                            payload: table.payload_ptr(row as usize),
                        });
                    }
                }
            }
            if self.types.is_symmetric(rel) {
                for &id in self.sparse.tables_from(rel, arch) {
                    if let Some(table) = self.sparse.at(id) {
                        for &row in table.rows_from(idx) {
                            let (_, to_idx) = table.indices(row as usize);
                            out.push(RelationEdge {
                                rel,
                                other: self.entities.entity_at(to_idx),
                                payload: table.payload_ptr(row as usize),
                            });
                        }
                    }
                }
            }
        }
        out
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Clone, Debug, PartialEq)]
    struct ChildOf;

    #[derive(Clone, Debug, PartialEq)]
    struct Likes(f32);

    #[test]
    fn spawn_add_get_remove() {
        let mut world = World::new();
        world.register_component::<Position>("Position");
        world.register_component::<Velocity>("Velocity");

        let e = world.create();
        assert!(world.is_alive(e));
        assert!(!world.has::<Position>(e));

        world.add(e, Position { x: 1.0, y: 2.0 });
        assert!(world.has::<Position>(e));
        assert_eq!(world.get::<Position>(e), Some(&Position { x: 1.0, y: 2.0 }));

        world.add(e, Velocity { dx: 0.5, dy: 0.0 });
        assert_eq!(world.get::<Velocity>(e), Some(&Velocity { dx: 0.5, dy: 0.0 }));
        assert_eq!(world.get::<Position>(e), Some(&Position { x: 1.0, y: 2.0 }));

        assert!(world.remove::<Position>(e));
        assert!(!world.has::<Position>(e));
        assert!(world.has::<Velocity>(e));
        assert!(!world.remove::<Position>(e));
    }

    #[test]
    fn archetype_id_independent_of_add_order() {
        let mut world = World::new();
        world.register_component::<Position>("Position");
        world.register_component::<Velocity>("Velocity");

        let a = world.create();
        world.add(a, Position { x: 0.0, y: 0.0 });
        world.add(a, Velocity { dx: 0.0, dy: 0.0 });

        let b = world.create();
        world.add(b, Velocity { dx: 0.0, dy: 0.0 });
        world.add(b, Position { x: 0.0, y: 0.0 });

        assert_eq!(world.archetype(a), world.archetype(b));
    }

    #[test]
    fn destroy_recycles_and_clears_components() {
        let mut world = World::new();
        world.register_component::<Position>("Position");
        let e = world.create();
        world.add(e, Position { x: 9.0, y: 9.0 });
        world.destroy(e);
        assert!(!world.is_alive(e));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn tree_relation_depth_and_cycle_rejection() {
        let mut world = World::new();
        world.register_relation::<ChildOf>("ChildOf", false, true);

        let root = world.create();
        let child = world.create();
        let grandchild = world.create();

        world.relate(child, root, ChildOf);
        world.relate(grandchild, child, ChildOf);

        assert!(world.related::<ChildOf>(child, root));
        assert!(world.is_ancestor::<ChildOf>(root, grandchild));
        assert!(!world.is_ancestor::<ChildOf>(grandchild, root));
    }

    #[test]
    #[should_panic]
    fn tree_relation_cycle_panics() {
        let mut world = World::new();
        world.register_relation::<ChildOf>("ChildOf", false, true);
        let a = world.create();
        let b = world.create();
        world.relate(a, b, ChildOf);
        world.relate(b, a, ChildOf);
    }

    #[test]
    fn reparenting_moves_a_single_parent_edge() {
        let mut world = World::new();
        world.register_relation::<ChildOf>("ChildOf", false, true);
        let parent_a = world.create();
        let parent_b = world.create();
        let child = world.create();

        world.relate(child, parent_a, ChildOf);
        assert!(world.related::<ChildOf>(child, parent_a));

        world.relate(child, parent_b, ChildOf);
        assert!(!world.related::<ChildOf>(child, parent_a));
        assert!(world.related::<ChildOf>(child, parent_b));
    }

    #[test]
    fn symmetric_relation_matches_either_order() {
        let mut world = World::new();
        world.register_relation::<Likes>("Likes", true, false);
        let a = world.create();
        let b = world.create();
        world.relate(a, b, Likes(1.0));
        assert!(world.related::<Likes>(a, b));
        assert!(world.related::<Likes>(b, a));
        assert_eq!(world.relation::<Likes>(b, a), Some(Likes(1.0)));
    }

    #[test]
    fn unrelate_is_a_no_op_for_absent_edge() {
        let mut world = World::new();
        world.register_relation::<Likes>("Likes", true, false);
        let a = world.create();
        let b = world.create();
        assert!(!world.unrelate::<Likes>(a, b));
    }

    #[test]
    fn components_iterates_in_graph_order() {
        let mut world = World::new();
        world.register_component::<Position>("Position");
        world.register_component::<Velocity>("Velocity");
        let e = world.create();
        world.add(e, Velocity { dx: 1.0, dy: 1.0 });
        world.add(e, Position { x: 0.0, y: 0.0 });
        let types: Vec<DataTypeId> = world.components(e).into_iter().map(|(t, _)| t).collect();
        assert_eq!(types.len(), 2);
    }
}
