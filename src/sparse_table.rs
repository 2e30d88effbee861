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

//! Sparse relation storage. Unlike components, a relation is keyed by a
//! pair of entities, not one, and most entities don't participate in most
//! relation types — hence a table per `(relation type, from archetype, to
//! archetype, tree depth)` combination rather than one column per
//! archetype. `depth` is always 0 for non-tree relations.

use crate::ids::ArchetypeId;
use crate::type_registry::{CopyFn, DataTypeId, DropFn, MoveFn};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::alloc::{alloc, dealloc, realloc, Layout};
use std::ptr::NonNull;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SparseRelationTableId {
    pub data_type: DataTypeId,
    pub from: ArchetypeId,
    pub to: ArchetypeId,
    pub depth: u32,
}

/// How a row's `(from, to)` pair is rewritten when moved into another table,
/// used when an entity changes archetype and its relation rows need to
/// follow it into a table keyed by the new archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transformation {
    /// Keep the pair as-is.
    None,
    /// Swap `from`/`to` (used when the entity moved is the "to" side).
    Swap,
    /// Swap only if doing so keeps `from < to` — used for symmetric
    /// relations' canonical ordering.
    SwapIfGreater,
}

/// Type-erased growable buffer for relation payloads, identical in shape to
/// `dense_table::Column` but kept separate since a sparse table's removal
/// pattern (swap-remove driven by row index, not by entity) is different
/// enough that sharing one generic type would obscure more than it saves.
struct PayloadColumn {
    data: NonNull<u8>,
    len: usize,
    cap: usize,
    elem_size: usize,
    elem_align: usize,
    copy: CopyFn,
    move_ctor: MoveFn,
    drop: Option<DropFn>,
}

impl PayloadColumn {
    fn new(elem_size: usize, elem_align: usize, copy: CopyFn, move_ctor: MoveFn, drop: Option<DropFn>) -> Self {
        Self {
            data: NonNull::dangling(),
            len: 0,
            cap: 0,
            elem_size,
            elem_align,
            copy,
            move_ctor,
            drop,
        }
    }

    fn layout(&self, cap: usize) -> Layout {
        Layout::from_size_align(self.elem_size * cap, self.elem_align).expect("layout overflow")
    }

    fn grow(&mut self) {
        let new_cap = if self.cap == 0 { 4 } else { self.cap * 2 };
        if self.elem_size == 0 {
            self.cap = new_cap;
            return;
        }
        let new_layout = self.layout(new_cap);
        let new_data = unsafe {
            if self.cap == 0 {
                alloc(new_layout)
            } else {
                realloc(self.data.as_ptr(), self.layout(self.cap), new_layout.size())
            }
        };
        self.data = NonNull::new(new_data).unwrap_or_else(|| std::alloc::handle_alloc_error(new_layout));
        self.cap = new_cap;
    }

    fn ptr(&self, row: usize) -> *mut u8 {
        if self.elem_size == 0 {
            self.data.as_ptr()
        } else {
            unsafe { self.data.as_ptr().add(row * self.elem_size) }
        }
    }

    unsafe fn push_move(&mut self, src: *const u8) {
        if self.len == self.cap {
            self.grow();
        }
        (self.move_ctor)(self.ptr(self.len), src);
        self.len += 1;
    }

    unsafe fn set_move(&mut self, row: usize, src: *const u8) {
        if let Some(drop) = self.drop {
            drop(self.ptr(row));
        }
        (self.move_ctor)(self.ptr(row), src);
    }

    fn swap_remove(&mut self, row: usize) {
        unsafe {
            if let Some(drop) = self.drop {
                drop(self.ptr(row));
            }
            let last = self.len - 1;
            if row != last {
                std::ptr::copy_nonoverlapping(self.ptr(last), self.ptr(row), self.elem_size);
            }
        }
        self.len -= 1;
    }

    /// Compact away `row` without dropping its value — used when the value
    /// has already been moved out to `dst` via `move_ctor` first.
    fn swap_remove_no_drop(&mut self, row: usize) {
        unsafe {
            let last = self.len - 1;
            if row != last {
                std::ptr::copy_nonoverlapping(self.ptr(last), self.ptr(row), self.elem_size);
            }
        }
        self.len -= 1;
    }
}

impl Drop for PayloadColumn {
    fn drop(&mut self) {
        if let Some(drop_fn) = self.drop {
            for row in 0..self.len {
                unsafe { drop_fn(self.ptr(row)) };
            }
        }
        if self.cap > 0 && self.elem_size > 0 {
            unsafe { dealloc(self.data.as_ptr(), self.layout(self.cap)) };
        }
    }
}

type RowBucket = SmallVec<[u32; 4]>;

/// One `(relation type, from archetype, to archetype, depth)` table: rows of
/// `(from_index, to_index, payload)`, with `from_rows`/`to_rows` giving the
/// set of row indices touching a given entity index from either side. This
/// plays the role the original's intrusive `firstFrom`/`nextFrom` linked
/// lists play, expressed as small inline vectors instead of raw list links
/// — cheaper to keep correct across swap-removes, just as fast for the
/// bucket sizes relations actually have in practice.
pub struct SparseRelationTable {
    from: Vec<u32>,
    to: Vec<u32>,
    payload: PayloadColumn,
    from_rows: FxHashMap<u32, RowBucket>,
    to_rows: FxHashMap<u32, RowBucket>,
    row_of_pair: FxHashMap<(u32, u32), u32>,
}

impl SparseRelationTable {
    pub(crate) fn new(elem_size: usize, elem_align: usize, copy: CopyFn, move_ctor: MoveFn, drop: Option<DropFn>) -> Self {
        Self {
            from: Vec::new(),
            to: Vec::new(),
            payload: PayloadColumn::new(elem_size, elem_align, copy, move_ctor, drop),
            from_rows: FxHashMap::default(),
            to_rows: FxHashMap::default(),
            row_of_pair: FxHashMap::default(),
        }
    }

    pub fn size(&self) -> usize {
        self.from.len()
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_empty()
    }

    pub fn contains(&self, from: u32, to: u32) -> bool {
        self.row_of_pair.contains_key(&(from, to))
    }

    pub fn row(&self, from: u32, to: u32) -> Option<usize> {
        self.row_of_pair.get(&(from, to)).map(|&r| r as usize)
    }

    pub fn indices(&self, row: usize) -> (u32, u32) {
        (self.from[row], self.to[row])
    }

    pub fn payload_ptr(&self, row: usize) -> *mut u8 {
        self.payload.ptr(row)
    }

    /// Rows whose `from` side is `index`, in no particular order.
    pub fn rows_from(&self, index: u32) -> &[u32] {
        self.from_rows.get(&index).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Rows whose `to` side is `index`, in no particular order.
    pub fn rows_to(&self, index: u32) -> &[u32] {
        self.to_rows.get(&index).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Insert a new edge, or overwrite the payload of an existing one.
    /// # Safety: `src` must point to a live value of this table's payload type.
    pub(crate) unsafe fn insert(&mut self, from: u32, to: u32, src: *const u8) {
        if let Some(&row) = self.row_of_pair.get(&(from, to)) {
            self.payload.set_move(row as usize, src);
            return;
        }
        let row = self.from.len() as u32;
        self.from.push(from);
        self.to.push(to);
        self.payload.push_move(src);
        self.from_rows.entry(from).or_default().push(row);
        self.to_rows.entry(to).or_default().push(row);
        self.row_of_pair.insert((from, to), row);
    }

    fn remove_from_bucket(bucket: &mut RowBucket, row: u32) {
        if let Some(pos) = bucket.iter().position(|&r| r == row) {
            bucket.swap_remove(pos);
        }
    }

    fn erase_row(&mut self, row: usize, drop_value: bool) {
        let last = self.from.len() - 1;
        let (f, t) = (self.from[row], self.to[row]);
        self.row_of_pair.remove(&(f, t));
        if let Some(bucket) = self.from_rows.get_mut(&f) {
            Self::remove_from_bucket(bucket, row as u32);
            if bucket.is_empty() {
                self.from_rows.remove(&f);
            }
        }
        if let Some(bucket) = self.to_rows.get_mut(&t) {
            Self::remove_from_bucket(bucket, row as u32);
            if bucket.is_empty() {
                self.to_rows.remove(&t);
            }
        }

        if drop_value {
            self.payload.swap_remove(row);
        } else {
            self.payload.swap_remove_no_drop(row);
        }
        if row != last {
            let (lf, lt) = (self.from[last], self.to[last]);
            self.from[row] = lf;
            self.to[row] = lt;
            self.row_of_pair.insert((lf, lt), row as u32);
            if let Some(bucket) = self.from_rows.get_mut(&lf) {
                Self::remove_from_bucket(bucket, last as u32);
                bucket.push(row as u32);
            }
            if let Some(bucket) = self.to_rows.get_mut(&lt) {
                Self::remove_from_bucket(bucket, last as u32);
                bucket.push(row as u32);
            }
        }
        self.from.pop();
        self.to.pop();
    }

    /// Remove the edge `(from, to)` if present. Returns whether it was.
    pub(crate) fn erase(&mut self, from: u32, to: u32) -> bool {
        match self.row(from, to) {
            Some(row) => {
                self.erase_row(row, true);
                true
            }
            None => false,
        }
    }

    /// Remove every edge with `from` side `index`.
    pub(crate) fn erase_all_from(&mut self, index: u32) {
        while let Some(&row) = self.from_rows.get(&index).and_then(|b| b.first()) {
            self.erase_row(row as usize, true);
        }
    }

    /// Remove every edge with `to` side `index`.
    pub(crate) fn erase_all_to(&mut self, index: u32) {
        while let Some(&row) = self.to_rows.get(&index).and_then(|b| b.first()) {
            self.erase_row(row as usize, true);
        }
    }

    /// Move the edge `(from, to)`'s payload out into `dst` (uninitialized
    /// memory of this table's element type) and remove the row bookkeeping
    /// without dropping — used when relocating a row to another table
    /// (depth propagation, archetype moves). Returns whether the edge
    /// existed.
    ///
    /// # Safety
    /// `dst` must point to `elem_size` bytes of uninitialized, properly
    /// aligned memory for this table's payload type.
    pub(crate) unsafe fn extract(&mut self, from: u32, to: u32, dst: *mut u8) -> bool {
        match self.row(from, to) {
            Some(row) => {
                (self.payload.move_ctor)(dst, self.payload.ptr(row));
                self.erase_row(row, false);
                true
            }
            None => false,
        }
    }
}

/// Per relation-type index of which tables touch a given archetype, letting
/// `World` and the query compiler ask "which relation tables might have
/// edges starting in this archetype" without scanning every registered
/// table.
#[derive(Default)]
struct RelationTypeIndex {
    from_archetypes: FxHashMap<ArchetypeId, SmallVec<[SparseRelationTableId; 4]>>,
    to_archetypes: FxHashMap<ArchetypeId, SmallVec<[SparseRelationTableId; 4]>>,
}

/// Owns every [`SparseRelationTable`] ever created, keyed by
/// [`SparseRelationTableId`], plus the per-type from/to archetype index and
/// a registration-order log used for incremental query discovery (mirrors
/// [`crate::archetype::ArchetypeGraph::collect`]'s cursor pattern).
#[derive(Default)]
pub struct SparseRelationRegistry {
    tables: FxHashMap<SparseRelationTableId, SparseRelationTable>,
    type_index: FxHashMap<DataTypeId, RelationTypeIndex>,
    order: Vec<SparseRelationTableId>,
}

impl SparseRelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: SparseRelationTableId) -> bool {
        self.tables.contains_key(&id)
    }

    pub fn get_or_create(
        &mut self,
        id: SparseRelationTableId,
        elem_size: usize,
        elem_align: usize,
        copy: CopyFn,
        move_ctor: MoveFn,
        drop: Option<DropFn>,
    ) -> &mut SparseRelationTable {
        self.tables.entry(id).or_insert_with(|| {
            let type_entry = self.type_index.entry(id.data_type).or_default();
            type_entry.from_archetypes.entry(id.from).or_default().push(id);
            type_entry.to_archetypes.entry(id.to).or_default().push(id);
            self.order.push(id);
            SparseRelationTable::new(elem_size, elem_align, copy, move_ctor, drop)
        })
    }

    pub fn at(&self, id: SparseRelationTableId) -> Option<&SparseRelationTable> {
        self.tables.get(&id)
    }

    pub fn at_mut(&mut self, id: SparseRelationTableId) -> Option<&mut SparseRelationTable> {
        self.tables.get_mut(&id)
    }

    /// Every table id registered for `data_type` whose `from` archetype is
    /// `archetype`.
    pub fn tables_from(&self, data_type: DataTypeId, archetype: ArchetypeId) -> &[SparseRelationTableId] {
        self.type_index
            .get(&data_type)
            .and_then(|idx| idx.from_archetypes.get(&archetype))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Every table id registered for `data_type` whose `to` archetype is
    /// `archetype`.
    pub fn tables_to(&self, data_type: DataTypeId, archetype: ArchetypeId) -> &[SparseRelationTableId] {
        self.type_index
            .get(&data_type)
            .and_then(|idx| idx.to_archetypes.get(&archetype))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Append every table id registered since `cursor` to `out`, returning
    /// the new cursor. Used by the query iterator's incremental `update()`.
    pub fn collect_new(&self, cursor: usize, out: &mut Vec<SparseRelationTableId>) -> usize {
        out.extend_from_slice(&self.order[cursor..]);
        self.order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_registry::TypeRegistry;

    #[derive(Clone, Debug, PartialEq)]
    struct Weight(f32);

    fn make_table() -> SparseRelationTable {
        let mut registry = TypeRegistry::new();
        let id = registry.register_relation::<Weight>("Weight", false, false);
        let info = registry.get(id);
        SparseRelationTable::new(info.size, info.align, info.copy, info.move_ctor, info.drop)
    }

    #[test]
    fn insert_contains_erase() {
        let mut table = make_table();
        let w = Weight(4.0);
        unsafe { table.insert(1, 2, &w as *const Weight as *const u8) };
        std::mem::forget(w);

        assert!(table.contains(1, 2));
        assert_eq!(table.size(), 1);

        let value = unsafe { &*(table.payload_ptr(0) as *const Weight) };
        assert_eq!(*value, Weight(4.0));

        assert!(table.erase(1, 2));
        assert!(!table.contains(1, 2));
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn erase_all_from_removes_every_outgoing_edge() {
        let mut table = make_table();
        for to in 0..3u32 {
            let w = Weight(to as f32);
            unsafe { table.insert(9, to, &w as *const Weight as *const u8) };
            std::mem::forget(w);
        }
        assert_eq!(table.size(), 3);
        table.erase_all_from(9);
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn swap_erase_updates_moved_row_bucket() {
        let mut table = make_table();
        for i in 0..3u32 {
            let w = Weight(i as f32);
            unsafe { table.insert(i, i + 100, &w as *const Weight as *const u8) };
            std::mem::forget(w);
        }
        table.erase(0, 100);
        assert!(table.contains(1, 101));
        assert!(table.contains(2, 102));
        assert_eq!(table.size(), 2);
        let row = table.row(2, 102).unwrap();
        let (f, t) = table.indices(row);
        assert_eq!((f, t), (2, 102));
    }
}
