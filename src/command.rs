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

//! Deferred world mutation.
//!
//! Systems that only hold `&World` (read access, under a scheduler that
//! parallelizes readers) still need a way to spawn, destroy, and edit
//! entities — they record the intent here instead, and the caller applies
//! the whole batch exclusively via [`CommandBuffer::commit`] once readers
//! are done. A command recorded against an entity spawned earlier in the
//! *same* buffer can refer to it before that entity exists anywhere, via
//! [`EntityRef::Pending`].

use crate::entity::Entity;
use crate::error::EcsError;
use crate::world::World;

/// Either an entity that already exists, or a placeholder for one that will
/// be created by an earlier [`Command::Spawn`] in the same buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Real(Entity),
    Pending(usize),
}

impl From<Entity> for EntityRef {
    fn from(entity: Entity) -> Self {
        EntityRef::Real(entity)
    }
}

fn resolve(r: EntityRef, resolved: &[Entity]) -> Option<Entity> {
    match r {
        EntityRef::Real(e) => Some(e),
        EntityRef::Pending(i) => resolved.get(i).copied(),
    }
}

enum Command {
    Spawn,
    Destroy(EntityRef),
    Mutate(EntityRef, Box<dyn FnOnce(&mut World, Entity) + Send>),
    MutatePair(EntityRef, EntityRef, Box<dyn FnOnce(&mut World, Entity, Entity) + Send>),
}

/// Records spawn/destroy/add/remove/relate/unrelate operations for later,
/// exclusive, FIFO replay against a [`World`].
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    pending_count: usize,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
            pending_count: 0,
        }
    }

    /// Record a spawn, returning a reference usable by later commands in
    /// this same buffer before the entity actually exists.
    pub fn spawn(&mut self) -> EntityRef {
        let token = EntityRef::Pending(self.pending_count);
        self.pending_count += 1;
        self.commands.push(Command::Spawn);
        token
    }

    pub fn destroy(&mut self, entity: impl Into<EntityRef>) {
        self.commands.push(Command::Destroy(entity.into()));
    }

    pub fn add<T>(&mut self, entity: impl Into<EntityRef>, value: T)
    where
        T: Send + Sync + Clone + 'static,
    {
        self.commands
            .push(Command::Mutate(entity.into(), Box::new(move |world, e| world.add(e, value))));
    }

    pub fn remove<T: 'static>(&mut self, entity: impl Into<EntityRef>) {
        self.commands.push(Command::Mutate(
            entity.into(),
            Box::new(move |world, e| {
                world.remove::<T>(e);
            }),
        ));
    }

    pub fn relate<T>(&mut self, from: impl Into<EntityRef>, to: impl Into<EntityRef>, value: T)
    where
        T: Send + Sync + Clone + 'static,
    {
        self.commands.push(Command::MutatePair(
            from.into(),
            to.into(),
            Box::new(move |world, f, t| world.relate(f, t, value)),
        ));
    }

    pub fn unrelate<T: 'static>(&mut self, from: impl Into<EntityRef>, to: impl Into<EntityRef>) {
        self.commands.push(Command::MutatePair(
            from.into(),
            to.into(),
            Box::new(move |world, f, t| {
                world.unrelate::<T>(f, t);
            }),
        ));
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.pending_count = 0;
    }

    /// Replay every recorded command against `world`, in order. Best-effort:
    /// a command whose entity turned out dead (destroyed by an earlier
    /// command in the same buffer, or already dead when recorded) is
    /// skipped and reported, the rest of the buffer still runs. Consumes
    /// the buffer.
    pub fn commit(self, world: &mut World) -> Vec<EcsError> {
        let mut resolved = Vec::with_capacity(self.pending_count);
        let mut failures = Vec::new();

        for command in self.commands {
            match command {
                Command::Spawn => {
                    resolved.push(world.create());
                }
                Command::Destroy(r) => match resolve(r, &resolved) {
                    Some(e) if world.is_alive(e) => world.destroy(e),
                    _ => failures.push(EcsError::DeadEntity),
                },
                Command::Mutate(r, f) => match resolve(r, &resolved) {
                    Some(e) if world.is_alive(e) => f(world, e),
                    _ => failures.push(EcsError::DeadEntity),
                },
                Command::MutatePair(a, b, f) => match (resolve(a, &resolved), resolve(b, &resolved)) {
                    (Some(ea), Some(eb)) if world.is_alive(ea) && world.is_alive(eb) => f(world, ea, eb),
                    _ => failures.push(EcsError::DeadEntity),
                },
            }
        }

        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;

    #[derive(Clone, Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Clone)]
    struct ChildOf;

    #[test]
    fn commit_applies_spawn_and_add_in_order() {
        let mut world = World::new();
        world.register_component::<Position>("Position");

        let mut buffer = CommandBuffer::new();
        let e = buffer.spawn();
        buffer.add(e, Position { x: 1.0, y: 2.0 });
        assert_eq!(buffer.len(), 2);

        let failures = buffer.commit(&mut world);
        assert!(failures.is_empty());
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn commit_is_best_effort_past_a_dead_entity() {
        let mut world = World::new();
        world.register_component::<Position>("Position");
        let alive = world.create();
        let dead = world.create();
        world.destroy(dead);

        let mut buffer = CommandBuffer::new();
        buffer.add(dead, Position { x: 0.0, y: 0.0 });
        buffer.add(alive, Position { x: 9.0, y: 9.0 });

        let failures = buffer.commit(&mut world);
        assert_eq!(failures.len(), 1);
        assert!(world.has::<Position>(alive));
    }

    #[test]
    fn pending_entity_can_be_related_to_before_it_exists() {
        let mut world = World::new();
        world.register_relation::<ChildOf>("ChildOf", false, true);
        let parent = world.create();

        let mut buffer = CommandBuffer::new();
        let child = buffer.spawn();
        buffer.relate(child, parent, ChildOf);

        let failures = buffer.commit(&mut world);
        assert!(failures.is_empty());
        assert_eq!(world.entity_count(), 2);
    }
}
