//! External type registry.
//!
//! The core never sees a Rust generic parameter once a value has crossed
//! into a table: every stored component or relation payload is moved,
//! copied, and dropped through a handful of function-pointer thunks supplied
//! at registration time. This is deliberate — it lets the same archetype
//! graph and table machinery serve components and relations registered by a
//! scripting runtime, a hot-reloaded plugin, or an external reflection
//! system, none of which can hand us a `T: 'static` to monomorphize over.
//!
//! `TypeRegistry` here is the crate's own default, in-process implementation
//! of that provider contract — the thing an embedder is free to replace with
//! a registry backed by its own reflection system, as long as it exposes the
//! same thunks.

use rustc_hash::FxHashMap;
use std::any::TypeId as RustTypeId;

/// A type handle issued by a [`TypeRegistry`]. Dense, starting at zero, in
/// registration order — this is what makes `ColumnId::make` a trivial
/// identity map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataTypeId(u32);

impl DataTypeId {
    pub const INVALID: DataTypeId = DataTypeId(u32::MAX);

    pub(crate) fn from_index(index: usize) -> Self {
        DataTypeId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_invalid(self) -> bool {
        self.0 == u32::MAX
    }
}

impl std::fmt::Display for DataTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DataType({})", self.0)
    }
}

/// Closed classification of how a type's value is shaped, per the registry's
/// redesign away from open-ended trait registration. Kept even though the
/// core itself only branches on `is_component`/`is_relation` today — an
/// embedding reflection system uses this to drive its own editor/serializer
/// without needing a second parallel registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Primitive,
    Struct,
    Array,
    Dictionary,
    Enum,
    Bitmask,
    StringConvertible,
    Wrapper,
}

/// Whether a registered type is usable as a component (dense table column)
/// or a relation (sparse table edge payload), and the relation-only flags
/// that change how `World::relate` behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Component,
    Relation { symmetric: bool, tree: bool },
}

/// Copy a value of this type from `src` into uninitialized memory at `dst`.
/// # Safety
/// `src` must point to a live, properly aligned value of the registered
/// type; `dst` must point to `size` bytes of uninitialized, properly
/// aligned memory.
pub type CopyFn = unsafe fn(dst: *mut u8, src: *const u8);

/// Move a value of this type from `src` into uninitialized memory at `dst`,
/// logically invalidating `src` (the caller must not drop it again).
/// # Safety: same as [`CopyFn`].
pub type MoveFn = unsafe fn(dst: *mut u8, src: *const u8);

/// Drop the value in place.
/// # Safety
/// `ptr` must point to a live, properly aligned value of the registered
/// type that has not already been dropped.
pub type DropFn = unsafe fn(ptr: *mut u8);

pub struct TypeInfo {
    pub name: String,
    pub size: usize,
    pub align: usize,
    pub copy: CopyFn,
    pub move_ctor: MoveFn,
    pub drop: Option<DropFn>,
    pub kind: TypeKind,
    pub classification: Classification,
}

impl TypeInfo {
    pub fn is_component(&self) -> bool {
        matches!(self.classification, Classification::Component)
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.classification, Classification::Relation { .. })
    }

    pub fn is_symmetric(&self) -> bool {
        matches!(
            self.classification,
            Classification::Relation { symmetric: true, .. }
        )
    }

    pub fn is_tree(&self) -> bool {
        matches!(self.classification, Classification::Relation { tree: true, .. })
    }
}

/// The crate's own implementation of the external type-registry contract
/// described in spec.md §6. Types are registered once, in any order, and
/// never unregistered — a `DataTypeId` is valid for the lifetime of the
/// registry.
#[derive(Default)]
pub struct TypeRegistry {
    types: Vec<TypeInfo>,
    rust_ids: FxHashMap<RustTypeId, DataTypeId>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            rust_ids: FxHashMap::default(),
        }
    }

    fn push(&mut self, info: TypeInfo) -> DataTypeId {
        let id = DataTypeId::from_index(self.types.len());
        tracing::debug!(name = %info.name, id = %id, "type registered");
        self.types.push(info);
        id
    }

    /// Register `T` as a component type with default kind [`TypeKind::Struct`].
    pub fn register_component<T>(&mut self, name: impl Into<String>) -> DataTypeId
    where
        T: Send + Sync + Clone + 'static,
    {
        self.register_component_kind::<T>(name, TypeKind::Struct)
    }

    pub fn register_component_kind<T>(&mut self, name: impl Into<String>, kind: TypeKind) -> DataTypeId
    where
        T: Send + Sync + Clone + 'static,
    {
        let id = self.push(TypeInfo {
            name: name.into(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            copy: copy_fn::<T>,
            move_ctor: move_fn::<T>,
            drop: drop_fn::<T>(),
            kind,
            classification: Classification::Component,
        });
        self.rust_ids.insert(RustTypeId::of::<T>(), id);
        id
    }

    /// Register `T` as a relation type. `symmetric` relations are stored
    /// canonicalized so `relate(a, b, R)` and `relate(b, a, R)` are the same
    /// edge; `tree` relations additionally enforce single-parent-per-child
    /// and expose depth bookkeeping.
    pub fn register_relation<T>(&mut self, name: impl Into<String>, symmetric: bool, tree: bool) -> DataTypeId
    where
        T: Send + Sync + Clone + 'static,
    {
        assert!(
            !(symmetric && tree),
            "a relation cannot be both symmetric and a tree relation"
        );
        let id = self.push(TypeInfo {
            name: name.into(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            copy: copy_fn::<T>,
            move_ctor: move_fn::<T>,
            drop: drop_fn::<T>(),
            kind: TypeKind::Struct,
            classification: Classification::Relation { symmetric, tree },
        });
        self.rust_ids.insert(RustTypeId::of::<T>(), id);
        id
    }

    pub fn id_of<T: 'static>(&self) -> Option<DataTypeId> {
        self.rust_ids.get(&RustTypeId::of::<T>()).copied()
    }

    pub fn get(&self, id: DataTypeId) -> &TypeInfo {
        &self.types[id.index()]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn is_component(&self, id: DataTypeId) -> bool {
        self.get(id).is_component()
    }

    pub fn is_relation(&self, id: DataTypeId) -> bool {
        self.get(id).is_relation()
    }

    pub fn is_symmetric(&self, id: DataTypeId) -> bool {
        self.get(id).is_symmetric()
    }

    pub fn is_tree(&self, id: DataTypeId) -> bool {
        self.get(id).is_tree()
    }

    pub fn name(&self, id: DataTypeId) -> &str {
        &self.get(id).name
    }

    /// Every registered relation type, in registration order. `World` walks
    /// this whenever a structural change (destroy, archetype move) needs to
    /// touch every relation an entity might participate in.
    pub fn relation_ids(&self) -> impl Iterator<Item = DataTypeId> + '_ {
        self.types
            .iter()
            .enumerate()
            .filter(|(_, info)| info.is_relation())
            .map(|(i, _)| DataTypeId::from_index(i))
    }
}

unsafe fn copy_fn<T: Clone>(dst: *mut u8, src: *const u8) {
    let value = (*src.cast::<T>()).clone();
    std::ptr::write(dst.cast::<T>(), value);
}

unsafe fn move_fn<T>(dst: *mut u8, src: *const u8) {
    let value = std::ptr::read(src.cast::<T>());
    std::ptr::write(dst.cast::<T>(), value);
}

fn drop_fn<T>() -> Option<DropFn> {
    if std::mem::needs_drop::<T>() {
        unsafe fn drop_impl<T>(ptr: *mut u8) {
            std::ptr::drop_in_place(ptr.cast::<T>());
        }
        Some(drop_impl::<T>)
    } else {
        None
    }
}
