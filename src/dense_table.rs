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

//! Dense per-archetype component storage: struct-of-arrays tables holding
//! one typed column per component the archetype carries, plus the entity
//! index each row belongs to. Rows are packed (swap-erase on removal) so
//! iteration never walks a hole.

use crate::archetype::ArchetypeGraph;
use crate::ids::{ArchetypeId, ColumnId};
use crate::type_registry::{CopyFn, DropFn, MoveFn, TypeRegistry};
use rustc_hash::FxHashMap;
use std::alloc::{alloc, dealloc, realloc, Layout};
use std::ptr::NonNull;

/// A single type-erased, growable column. Storage is a raw byte buffer laid
/// out according to the owning type's size/align, grown geometrically like
/// `Vec`. This is the same shape hecs-style archetype storage uses: one
/// allocation per column rather than one interleaved allocation per table.
struct Column {
    data: NonNull<u8>,
    len: usize,
    cap: usize,
    elem_size: usize,
    elem_align: usize,
    copy: CopyFn,
    move_ctor: MoveFn,
    drop: Option<DropFn>,
}

impl Column {
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
        Layout::from_size_align(self.elem_size * cap, self.elem_align)
            .expect("column layout overflow")
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

    /// Append a value by moving it out of `src`.
    /// # Safety: `src` must point at a live value of this column's type.
    unsafe fn push_move(&mut self, src: *const u8) {
        if self.len == self.cap {
            self.grow();
        }
        (self.move_ctor)(self.ptr(self.len), src);
        self.len += 1;
    }

    /// Overwrite `row` in place, dropping the previous value first.
    /// # Safety: `src` must point at a live value of this column's type, and
    /// `row` must be in bounds.
    unsafe fn set_move(&mut self, row: usize, src: *const u8) {
        if let Some(drop) = self.drop {
            drop(self.ptr(row));
        }
        (self.move_ctor)(self.ptr(row), src);
    }

    /// Remove `row` by swapping the last element into its place (or just
    /// truncating if `row` is last). Drops the removed value.
    fn swap_remove(&mut self, row: usize) {
        debug_assert!(row < self.len);
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
    /// has already been moved out to another table's column via
    /// `push_move` first.
    fn swap_remove_no_drop(&mut self, row: usize) {
        debug_assert!(row < self.len);
        unsafe {
            let last = self.len - 1;
            if row != last {
                std::ptr::copy_nonoverlapping(self.ptr(last), self.ptr(row), self.elem_size);
            }
        }
        self.len -= 1;
    }
}

impl Drop for Column {
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

/// All of one archetype's component data: one row per entity, swap-erase
/// packed, with an auxiliary index for O(1) entity -> row lookup (the
/// original's `mEntities`/row-index pair inside `World::Table`).
pub struct DenseTable {
    archetype: ArchetypeId,
    entities: Vec<u32>,
    row_of: FxHashMap<u32, usize>,
    columns: FxHashMap<ColumnId, Column>,
}

impl DenseTable {
    pub(crate) fn new(archetype: ArchetypeId, columns: &[ColumnId], registry: &TypeRegistry) -> Self {
        let mut table_columns = FxHashMap::default();
        for &col in columns {
            let info = registry.get(col.data_type());
            table_columns.insert(
                col,
                Column::new(info.size, info.align, info.copy, info.move_ctor, info.drop),
            );
        }
        Self {
            archetype,
            entities: Vec::new(),
            row_of: FxHashMap::default(),
            columns: table_columns,
        }
    }

    pub fn archetype(&self) -> ArchetypeId {
        self.archetype
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn has_column(&self, column: ColumnId) -> bool {
        self.columns.contains_key(&column)
    }

    pub fn columns(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.columns.keys().copied()
    }

    pub fn row(&self, entity_index: u32) -> Option<usize> {
        self.row_of.get(&entity_index).copied()
    }

    pub fn entity(&self, row: usize) -> u32 {
        self.entities[row]
    }

    /// Append a row for `entity_index` with no component data written yet;
    /// callers must follow up with `set_column`/`push_column_uninit` writes
    /// for every column (or copy from a source row via
    /// [`DenseTable::copy_row_into`]) before the row is observed.
    pub(crate) fn push_empty_row(&mut self, entity_index: u32) -> usize {
        let row = self.entities.len();
        self.entities.push(entity_index);
        self.row_of.insert(entity_index, row);
        row
    }

    /// Write `value` into `column` at `row` by moving out of `src`. Used
    /// right after `push_empty_row` for columns that have fresh data, and
    /// is also how `components().add` installs the new component.
    ///
    /// # Safety: `src` must point to a live value of `column`'s registered
    /// type.
    pub(crate) unsafe fn push_column_move(&mut self, column: ColumnId, src: *const u8) {
        self.columns
            .get_mut(&column)
            .expect("column must exist in this table")
            .push_move(src);
    }

    /// # Safety: `src` must point to a live value of `column`'s registered
    /// type.
    pub(crate) unsafe fn set_column_move(&mut self, column: ColumnId, row: usize, src: *const u8) {
        self.columns
            .get_mut(&column)
            .expect("column must exist in this table")
            .set_move(row, src);
    }

    pub fn column_ptr(&self, column: ColumnId, row: usize) -> *mut u8 {
        self.columns
            .get(&column)
            .expect("column must exist in this table")
            .ptr(row)
    }

    /// Remove `entity_index`'s row, dropping every column value, swapping
    /// the last row into its place. Returns the entity index that now
    /// occupies `row` (the one that used to be last), if any moved.
    pub(crate) fn swap_erase(&mut self, entity_index: u32) -> Option<u32> {
        let row = *self.row_of.get(&entity_index)?;
        for column in self.columns.values_mut() {
            column.swap_remove(row);
        }
        self.erase_row_bookkeeping(entity_index, row)
    }

    /// Remove `row`'s slot from the entity/row-index bookkeeping only.
    /// Callers that have already reconciled every column's storage for this
    /// row themselves (`move_row_into`, which moves shared columns out and
    /// drops the rest) call this instead of `swap_erase` so columns are
    /// never touched twice.
    fn erase_row_bookkeeping(&mut self, entity_index: u32, row: usize) -> Option<u32> {
        self.row_of.remove(&entity_index);
        let last = self.entities.len() - 1;
        let moved = if row != last {
            self.entities.swap(row, last);
            let moved_entity = self.entities[row];
            self.row_of.insert(moved_entity, row);
            Some(moved_entity)
        } else {
            None
        };
        self.entities.pop();
        moved
    }

    /// Move every shared column from `self`'s row for `entity_index` into a
    /// freshly pushed row in `dst`, then erase the row from `self`. Columns
    /// present only in `dst` are left for the caller to fill in (new
    /// component add); columns present only in `self` are dropped. Shared
    /// columns are moved out via `push_move` and then compacted with
    /// `swap_remove_no_drop` — they must never also go through `swap_erase`'s
    /// unconditional `swap_remove`, which would drop the value a second time.
    pub(crate) fn move_row_into(&mut self, entity_index: u32, dst: &mut DenseTable) -> usize {
        let row = *self
            .row_of
            .get(&entity_index)
            .expect("entity must have a row in this table");
        let dst_row = dst.push_empty_row(entity_index);
        for (&column, src_column) in self.columns.iter_mut() {
            match dst.columns.get_mut(&column) {
                Some(dst_column) => {
                    unsafe {
                        let src_ptr = src_column.ptr(row);
                        dst_column.push_move(src_ptr);
                    }
                    src_column.swap_remove_no_drop(row);
                }
                None => src_column.swap_remove(row),
            }
        }
        self.erase_row_bookkeeping(entity_index, row);
        dst_row
    }
}

/// Owns one [`DenseTable`] per archetype that has ever held an entity,
/// indexed directly by `ArchetypeId`.
#[derive(Default)]
pub struct DenseTableRegistry {
    tables: Vec<Option<DenseTable>>,
}

impl DenseTableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &mut self,
        archetype: ArchetypeId,
        graph: &ArchetypeGraph,
        registry: &TypeRegistry,
    ) -> &mut DenseTable {
        let index = archetype.index();
        if self.tables.len() <= index {
            self.tables.resize_with(index + 1, || None);
        }
        if self.tables[index].is_none() {
            let columns = graph.columns(archetype);
            self.tables[index] = Some(DenseTable::new(archetype, &columns, registry));
        }
        self.tables[index].as_mut().unwrap()
    }

    pub fn at(&self, archetype: ArchetypeId) -> &DenseTable {
        self.tables[archetype.index()]
            .as_ref()
            .expect("archetype has no dense table yet")
    }

    pub fn at_mut(&mut self, archetype: ArchetypeId) -> &mut DenseTable {
        self.tables[archetype.index()]
            .as_mut()
            .expect("archetype has no dense table yet")
    }

    pub fn contains(&self, archetype: ArchetypeId) -> bool {
        self.tables
            .get(archetype.index())
            .map(|t| t.is_some())
            .unwrap_or(false)
    }

    /// Move `entity_index`'s row from `from` to `to`, both of which must
    /// already have tables (via `get_or_create`). Returns the row the entity
    /// now occupies in `to`. Needs both tables mutably at once, which a
    /// single `Vec<Option<DenseTable>>` can't hand out through two plain
    /// `&mut` calls — split the slice instead.
    pub(crate) fn move_row(&mut self, entity_index: u32, from: ArchetypeId, to: ArchetypeId) -> usize {
        let (from_idx, to_idx) = (from.index(), to.index());
        assert_ne!(from_idx, to_idx, "cannot move a row within the same archetype");
        let split = from_idx.max(to_idx);
        let (left, right) = self.tables.split_at_mut(split);
        let (from_table, to_table) = if from_idx < to_idx {
            (left[from_idx].as_mut().unwrap(), right[0].as_mut().unwrap())
        } else {
            (right[0].as_mut().unwrap(), left[to_idx].as_mut().unwrap())
        };
        from_table.move_row_into(entity_index, to_table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::ArchetypeGraph;
    use crate::type_registry::TypeRegistry;

    #[derive(Clone, Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[test]
    fn push_and_swap_erase() {
        let mut types = TypeRegistry::new();
        let pos_type = types.register_component::<Position>("Position");
        let col = ColumnId::make(pos_type);

        let mut graph = ArchetypeGraph::new();
        let arch = graph.with(ArchetypeId::EMPTY, col);

        let mut registry = DenseTableRegistry::new();
        let table = registry.get_or_create(arch, &graph, &types);

        let p0 = Position { x: 1.0, y: 2.0 };
        let row0 = table.push_empty_row(10);
        unsafe { table.push_column_move(col, &p0 as *const Position as *const u8) };
        std::mem::forget(p0);

        let p1 = Position { x: 3.0, y: 4.0 };
        let row1 = table.push_empty_row(11);
        unsafe { table.push_column_move(col, &p1 as *const Position as *const u8) };
        std::mem::forget(p1);

        assert_eq!(table.len(), 2);
        assert_eq!(row0, 0);
        assert_eq!(row1, 1);

        let moved = table.swap_erase(10);
        assert_eq!(moved, Some(11));
        assert_eq!(table.len(), 1);
        assert_eq!(table.row(11), Some(0));
        assert_eq!(table.row(10), None);

        let remaining = unsafe { &*(table.column_ptr(col, 0) as *const Position) };
        assert_eq!(*remaining, Position { x: 3.0, y: 4.0 });
    }

    #[test]
    fn move_row_into_drops_a_shared_non_trivial_column_exactly_once() {
        use std::cell::RefCell;
        use std::rc::Rc;

        #[derive(Clone)]
        struct Counted(Rc<RefCell<i32>>);
        impl Drop for Counted {
            fn drop(&mut self) {
                *self.0.borrow_mut() += 1;
            }
        }

        let mut types = TypeRegistry::new();
        let shared_ty = types.register_component::<Counted>("Counted");
        let extra_ty = types.register_component::<Position>("Position");
        let shared_col = ColumnId::make(shared_ty);
        let extra_col = ColumnId::make(extra_ty);

        let mut graph = ArchetypeGraph::new();
        let src_arch = graph.with(ArchetypeId::EMPTY, shared_col);
        let dst_arch = graph.with(src_arch, extra_col);

        let mut registry = DenseTableRegistry::new();
        registry.get_or_create(src_arch, &graph, &types);
        registry.get_or_create(dst_arch, &graph, &types);

        let counter = Rc::new(RefCell::new(0));
        let value = Counted(counter.clone());
        {
            let src = registry.at_mut(src_arch);
            src.push_empty_row(0);
            unsafe { src.push_column_move(shared_col, &value as *const Counted as *const u8) };
            std::mem::forget(value);
        }

        // `Position` is left uninitialized in the destination row on purpose
        // here (the caller would normally `set_column_move` it right after);
        // moving the shared `Counted` column is the only thing under test.
        registry.move_row(0, src_arch, dst_arch);

        drop(registry);
        assert_eq!(*counter.borrow(), 1, "Counted must be dropped exactly once, not zero or twice");
    }
}
