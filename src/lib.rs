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

//! Archetype-graph ECS core for a voxel game engine.
//!
//! Every component and relation type is registered at runtime through a
//! [`type_registry::TypeRegistry`] rather than discovered from a Rust
//! generic parameter at compile time — the same archetype graph and table
//! machinery can then back types a scripting layer or hot-reloaded plugin
//! hands in, not just ones the engine itself was compiled with. [`World`]
//! ties the pieces together: entity identity and recycling
//! ([`entity::EntityPool`]), the dense per-archetype component tables
//! ([`dense_table`]), the sparse per-relation-type edge tables
//! ([`sparse_table`]), and the archetype graph that links them
//! ([`archetype::ArchetypeGraph`]). [`query`] compiles term lists against a
//! world into cached, incrementally-updated result sets; [`command`] defers
//! world mutations recorded from read-only contexts until they can be
//! replayed exclusively.

pub mod archetype;
pub mod bitset;
pub mod command;
pub mod dense_table;
pub mod entity;
pub mod error;
pub mod ids;
pub mod query;
pub mod sparse_table;
pub mod type_registry;
pub mod world;

pub use command::{CommandBuffer, EntityRef};
pub use entity::Entity;
pub use error::{EcsError, Result};
pub use ids::{ArchetypeId, ColumnId};
pub use query::{Match, QueryFilter, Term, Traversal, View};
pub use type_registry::{Classification, DataTypeId, TypeKind, TypeRegistry};
pub use world::World;
