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

//! Entity identifiers and the pool that recycles their indices.

use crate::ids::ArchetypeId;

/// A generational entity handle. Two `Entity`s with the same `index` but
/// different `generation` never refer to the same logical entity — the
/// older one is dead the moment its index is recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    pub const NULL: Entity = Entity {
        index: u32::MAX,
        generation: 0,
    };

    pub fn is_null(self) -> bool {
        self.index == u32::MAX
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "Entity(null)")
        } else {
            write!(f, "Entity({}#{})", self.index, self.generation)
        }
    }
}

/// Owns the `index -> (generation, archetype)` table and the LIFO free list
/// that recycles dead indices. Mirrors `World::mEntities` in the original
/// source: `reserve` hands out an index with no archetype yet (it is not
/// alive until `create_at` places it in the empty archetype), `destroy`
/// bumps the generation and frees the index for reuse.
#[derive(Default)]
pub struct EntityPool {
    generations: Vec<u32>,
    archetypes: Vec<ArchetypeId>,
    free_list: Vec<u32>,
    alive_count: usize,
}

impl EntityPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.alive_count
    }

    pub fn is_empty(&self) -> bool {
        self.alive_count == 0
    }

    /// Reserve an index without placing the entity in any archetype. The
    /// entity is not alive until [`EntityPool::create_at`] is called on it.
    pub fn reserve(&mut self) -> Entity {
        let index = if let Some(index) = self.free_list.pop() {
            index
        } else {
            let index = self.generations.len() as u32;
            self.generations.push(0);
            self.archetypes.push(ArchetypeId::INVALID);
            index
        };
        self.archetypes[index as usize] = ArchetypeId::INVALID;
        Entity {
            index,
            generation: self.generations[index as usize],
        }
    }

    /// Place a previously reserved (but not-yet-alive) entity into the empty
    /// archetype, making it alive. Panics if `entity` wasn't reserved with a
    /// matching generation, or is already alive.
    pub fn create_at(&mut self, entity: Entity) {
        assert!(
            self.matches_generation(entity),
            "{entity} was not reserved with a live generation"
        );
        let slot = &mut self.archetypes[entity.index as usize];
        assert!(
            slot.is_invalid(),
            "{entity} is already alive, cannot create_at twice"
        );
        *slot = ArchetypeId::EMPTY;
        self.alive_count += 1;
    }

    /// Reserve and immediately create an entity in the empty archetype.
    pub fn create(&mut self) -> Entity {
        let entity = self.reserve();
        self.create_at(entity);
        entity
    }

    fn matches_generation(&self, entity: Entity) -> bool {
        (entity.index as usize) < self.generations.len()
            && self.generations[entity.index as usize] == entity.generation
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.matches_generation(entity) && !self.archetypes[entity.index as usize].is_invalid()
    }

    /// Bump the generation and return the index to the free list. Panics if
    /// `entity` is not currently alive — callers must check first (this is
    /// a programmer error, per the dead-entity rule in spec.md §7).
    pub fn destroy(&mut self, entity: Entity) {
        assert!(self.is_alive(entity), "destroy called on dead {entity}");
        let index = entity.index as usize;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.archetypes[index] = ArchetypeId::INVALID;
        self.free_list.push(entity.index);
        self.alive_count -= 1;
    }

    pub fn archetype(&self, entity: Entity) -> ArchetypeId {
        assert!(self.is_alive(entity), "{entity} is dead");
        self.archetypes[entity.index as usize]
    }

    pub fn set_archetype(&mut self, entity: Entity, archetype: ArchetypeId) {
        assert!(self.is_alive(entity), "{entity} is dead");
        self.archetypes[entity.index as usize] = archetype;
    }

    /// Reconstruct the live `Entity` for an index recorded elsewhere (e.g.
    /// in a sparse relation table row, which only stores the bare index).
    /// Panics if the index isn't currently alive.
    pub(crate) fn entity_at(&self, index: u32) -> Entity {
        assert!(
            (index as usize) < self.generations.len() && !self.archetypes[index as usize].is_invalid(),
            "index {index} is not currently alive"
        );
        Entity {
            index,
            generation: self.generations[index as usize],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_destroy_recycles_with_bumped_generation() {
        let mut pool = EntityPool::new();
        let e0 = pool.create();
        assert!(pool.is_alive(e0));
        assert_eq!(pool.len(), 1);

        pool.destroy(e0);
        assert!(!pool.is_alive(e0));
        assert_eq!(pool.len(), 0);

        let e1 = pool.create();
        assert_eq!(e1.index(), e0.index());
        assert_ne!(e1.generation(), e0.generation());
        assert!(!pool.is_alive(e0));
        assert!(pool.is_alive(e1));
    }

    #[test]
    fn reserve_then_create_at() {
        let mut pool = EntityPool::new();
        let e = pool.reserve();
        assert!(!pool.is_alive(e));
        pool.create_at(e);
        assert!(pool.is_alive(e));
        assert_eq!(pool.archetype(e), ArchetypeId::EMPTY);
    }

    #[test]
    #[should_panic]
    fn destroy_dead_entity_panics() {
        let mut pool = EntityPool::new();
        let e = pool.create();
        pool.destroy(e);
        pool.destroy(e);
    }

    #[test]
    fn null_entity_is_never_alive() {
        let pool = EntityPool::new();
        assert!(Entity::NULL.is_null());
        assert!(!pool.is_alive(Entity::NULL));
    }
}
