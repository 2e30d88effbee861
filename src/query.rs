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

//! Query compilation and iteration.
//!
//! A query is a small list of [`Term`]s naming one or more *targets* (slots
//! to be filled with entities) and the constraints that bind them: required
//! or excluded components, and relations linking one target to another.
//! [`QueryFilter::compile`] turns that list into cached archetype sets and
//! relation-table lists; [`View`] pins targets to specific entities and
//! produces an iterator of [`Match`]es.
//!
//! Discovery is incremental: both the archetype graph and the sparse
//! relation registry are append-only, so a filter only has to look at
//! whatever was created since it last looked (`ArchetypeGraph::collect`,
//! `SparseRelationRegistry::collect_new`), not rescan from scratch.

use crate::archetype::ArchetypeGraph;
use crate::entity::Entity;
use crate::ids::{ArchetypeId, ColumnId};
use crate::sparse_table::SparseRelationTableId;
use crate::type_registry::DataTypeId;
use crate::world::World;
use rustc_hash::FxHashSet;
use smallvec::{smallvec, SmallVec};

/// Direction a relation's matched rows should be visited in, for queries
/// that care about hierarchy order (e.g. "process parents before
/// children"). Only meaningful for tree relations; ignored otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// No particular order.
    None,
    /// Shallowest depth first (roots toward leaves).
    Down,
    /// Deepest depth first (leaves toward roots).
    Up,
}

/// One clause of a query, naming the `usize` target index it constrains.
#[derive(Debug, Clone, Copy)]
pub enum Term {
    /// Target must carry this component.
    With(DataTypeId, usize),
    /// Target must not carry this component.
    Without(DataTypeId, usize),
    /// Target may or may not carry this component; doesn't affect which
    /// archetypes match, present so the caller can record intent alongside
    /// the other terms.
    Optional(DataTypeId, usize),
    /// Binds a target with no component constraints at all.
    EntityTerm(usize),
    /// `from` and `to` targets are linked by an edge of this relation type.
    Relation {
        data_type: DataTypeId,
        from: usize,
        to: usize,
        traversal: Traversal,
    },
}

impl Term {
    fn max_target(&self) -> usize {
        match *self {
            Term::With(_, t) | Term::Without(_, t) | Term::Optional(_, t) | Term::EntityTerm(t) => t,
            Term::Relation { from, to, .. } => from.max(to),
        }
    }
}

struct TargetSpec {
    with: SmallVec<[ColumnId; 4]>,
    without: SmallVec<[ColumnId; 4]>,
    #[allow(dead_code)]
    optional: SmallVec<[ColumnId; 4]>,
    base: ArchetypeId,
    archetypes: Vec<ArchetypeId>,
    archetype_set: FxHashSet<ArchetypeId>,
    cursor: usize,
}

impl TargetSpec {
    fn new() -> Self {
        Self {
            with: SmallVec::new(),
            without: SmallVec::new(),
            optional: SmallVec::new(),
            base: ArchetypeId::EMPTY,
            archetypes: Vec::new(),
            archetype_set: FxHashSet::default(),
            cursor: 0,
        }
    }

    fn refresh(&mut self, graph: &ArchetypeGraph) {
        let mut discovered = Vec::new();
        self.cursor = graph.collect(self.base, &mut discovered, self.cursor);
        for arch in discovered {
            if self.without.iter().any(|&c| graph.contains(arch, c)) {
                continue;
            }
            if self.archetype_set.insert(arch) {
                self.archetypes.push(arch);
            }
        }
    }
}

/// One `Relation` term after compilation: the relation type, whether it's
/// symmetric/tree (cached off the registry so iteration never has to ask
/// again), and the growing lists of sparse tables that currently satisfy
/// it. `reverse_tables` holds tables matched with `from`/`to` swapped —
/// only populated for symmetric relations, since an asymmetric relation's
/// `related(a, b)` is never the same fact as `related(b, a)`.
struct Link {
    data_type: DataTypeId,
    symmetric: bool,
    #[allow(dead_code)]
    tree: bool,
    traversal: Traversal,
    from_target: usize,
    to_target: usize,
    tables: Vec<SparseRelationTableId>,
    reverse_tables: Vec<SparseRelationTableId>,
    cursor: usize,
}

impl Link {
    fn refresh(&mut self, world: &World, targets: &[TargetSpec]) {
        let mut discovered = Vec::new();
        self.cursor = world.sparse().collect_new(self.cursor, &mut discovered);
        let from_set = &targets[self.from_target].archetype_set;
        let to_set = &targets[self.to_target].archetype_set;
        for id in discovered {
            if id.data_type != self.data_type {
                continue;
            }
            let forward = from_set.contains(&id.from) && to_set.contains(&id.to);
            if forward {
                self.tables.push(id);
            }
            // A table already counted via the forward direction must never
            // also be scanned in reverse — for a symmetric relation whose
            // `from`/`to` targets both accept the same archetype pair, that
            // would report both (a, b) and (b, a) for a single stored edge
            // instead of the one canonical match the edge represents.
            if self.symmetric && !forward && from_set.contains(&id.to) && to_set.contains(&id.from) {
                self.reverse_tables.push(id);
            }
        }
        if !matches!(self.traversal, Traversal::None) {
            let ascending = matches!(self.traversal, Traversal::Down);
            let key = |id: &SparseRelationTableId| if ascending { id.depth } else { u32::MAX - id.depth };
            self.tables.sort_by_key(key);
            self.reverse_tables.sort_by_key(key);
        }
    }
}

/// A compiled, reusable query. Cheap to `update()` repeatedly as the world
/// grows; expensive part (walking terms, materializing base archetypes) is
/// paid once in [`QueryFilter::compile`].
pub struct QueryFilter {
    target_count: usize,
    targets: Vec<TargetSpec>,
    links: Vec<Link>,
}

impl QueryFilter {
    /// Compile `terms` against `world`. Needs `&mut World` because a
    /// target's base archetype (the node reached by adding all its `With`
    /// columns to the empty archetype) may not exist yet — materializing it
    /// is exactly what `ArchetypeGraph::with` is for.
    pub fn compile(world: &mut World, terms: &[Term]) -> Self {
        let target_count = terms.iter().map(Term::max_target).max().map(|m| m + 1).unwrap_or(1);
        let mut targets: Vec<TargetSpec> = (0..target_count).map(|_| TargetSpec::new()).collect();
        let mut links = Vec::new();

        for term in terms {
            match *term {
                Term::With(ty, t) => targets[t].with.push(ColumnId::make(ty)),
                Term::Without(ty, t) => targets[t].without.push(ColumnId::make(ty)),
                Term::Optional(ty, t) => targets[t].optional.push(ColumnId::make(ty)),
                Term::EntityTerm(_) => {}
                Term::Relation { data_type, from, to, traversal } => {
                    assert!(
                        world.types().is_relation(data_type),
                        "{} is not registered as a relation type",
                        world.types().name(data_type)
                    );
                    links.push(Link {
                        data_type,
                        symmetric: world.types().is_symmetric(data_type),
                        tree: world.types().is_tree(data_type),
                        traversal,
                        from_target: from,
                        to_target: to,
                        tables: Vec::new(),
                        reverse_tables: Vec::new(),
                        cursor: 0,
                    });
                }
            }
        }

        for target in &mut targets {
            let mut arch = ArchetypeId::EMPTY;
            for &col in &target.with {
                arch = world.graph_mut().with(arch, col);
            }
            target.base = arch;
        }

        Self { target_count, targets, links }
    }

    fn update(&mut self, world: &World) {
        for target in &mut self.targets {
            target.refresh(world.graph());
        }
        for link in &mut self.links {
            link.refresh(world, &self.targets);
        }
    }

    /// Number of target slots this filter binds.
    pub fn target_count(&self) -> usize {
        self.target_count
    }

    /// Bring this filter up to date and wrap it in a [`View`] ready to pin
    /// targets and iterate.
    pub fn view(self, world: &World) -> View<'_> {
        View::new(world, self)
    }
}

/// A single result row: one entity per target, in target order.
#[derive(Debug, Clone)]
pub struct Match {
    pub entities: SmallVec<[Entity; 4]>,
}

/// A compiled filter bound to a world, with zero or more targets pinned to
/// a specific entity. Pinning a target that turns out dead, or whose
/// archetype no longer matches the filter, makes the view yield nothing —
/// it is never a programmer error to pin a stale entity.
pub struct View<'w> {
    world: &'w World,
    filter: QueryFilter,
    pins: Vec<Option<Entity>>,
}

impl<'w> View<'w> {
    pub(crate) fn new(world: &'w World, mut filter: QueryFilter) -> Self {
        filter.update(world);
        let pins = vec![None; filter.target_count];
        Self { world, filter, pins }
    }

    /// Constrain `target` to a single entity. Returns `self` for chaining:
    /// `filter.view(&world).pin(0, e)`.
    pub fn pin(mut self, target: usize, entity: Entity) -> Self {
        assert!(target < self.filter.target_count, "target {target} out of range");
        self.pins[target] = Some(entity);
        self
    }

    pub fn iter(&self) -> QueryIter {
        QueryIter {
            matches: self.collect_matches().into_iter(),
        }
    }

    fn entity_at(&self, index: u32) -> Entity {
        self.world.entity_pool().entity_at(index)
    }

    fn target_rows(&self, target: usize) -> Vec<Entity> {
        if let Some(pin) = self.pins[target] {
            if self.world.is_alive(pin) && self.filter.targets[target].archetype_set.contains(&self.world.archetype(pin)) {
                return vec![pin];
            }
            return Vec::new();
        }
        let mut out = Vec::new();
        for &arch in &self.filter.targets[target].archetypes {
            if !self.world.dense().contains(arch) {
                continue;
            }
            let table = self.world.dense().at(arch);
            for row in 0..table.len() {
                out.push(self.entity_at(table.entity(row)));
            }
        }
        out
    }

    fn collect_matches(&self) -> Vec<Match> {
        match (self.filter.target_count, self.filter.links.len()) {
            (1, 0) => self
                .target_rows(0)
                .into_iter()
                .map(|e| Match { entities: smallvec![e] })
                .collect(),
            (2, 1) => self.matches_single_link(),
            (n, 0) => self.matches_independent(n),
            (n, l) => panic!("query with {n} targets and {l} relation links is not a supported shape"),
        }
    }

    /// Cross product of every unlinked target's rows. Fine for the small
    /// target counts queries actually use; not meant for wide joins.
    fn matches_independent(&self, target_count: usize) -> Vec<Match> {
        let rows: Vec<Vec<Entity>> = (0..target_count).map(|t| self.target_rows(t)).collect();
        let mut out = Vec::new();
        let mut combo = SmallVec::<[Entity; 4]>::new();
        fn recurse(rows: &[Vec<Entity>], idx: usize, combo: &mut SmallVec<[Entity; 4]>, out: &mut Vec<Match>) {
            if idx == rows.len() {
                out.push(Match { entities: combo.clone() });
                return;
            }
            for &e in &rows[idx] {
                combo.push(e);
                recurse(rows, idx + 1, combo, out);
                combo.pop();
            }
        }
        recurse(&rows, 0, &mut combo, &mut out);
        out
    }

    fn find_link_row(&self, link: &Link, from: Entity, to: Entity) -> bool {
        let (f, t) = (from.index(), to.index());
        for &id in &link.tables {
            if let Some(table) = self.world.sparse().at(id) {
                if table.row(f, t).is_some() {
                    return true;
                }
            }
        }
        for &id in &link.reverse_tables {
            if let Some(table) = self.world.sparse().at(id) {
                if table.row(t, f).is_some() {
                    return true;
                }
            }
        }
        false
    }

    fn matches_single_link(&self) -> Vec<Match> {
        let link = &self.filter.links[0];
        let from_target = link.from_target;
        let to_target = link.to_target;
        let target_count = self.filter.target_count;
        let push = move |from_e: Entity, to_e: Entity, out: &mut Vec<Match>| {
            let mut entities = smallvec![Entity::NULL; target_count];
            entities[from_target] = from_e;
            entities[to_target] = to_e;
            out.push(Match { entities });
        };

        let mut out = Vec::new();
        match (self.pins[from_target], self.pins[to_target]) {
            (Some(f), Some(t)) => {
                if self.world.is_alive(f) && self.world.is_alive(t) && self.find_link_row(link, f, t) {
                    push(f, t, &mut out);
                }
            }
            (Some(f), None) => {
                if self.world.is_alive(f) {
                    let idx = f.index();
                    for &id in &link.tables {
                        if let Some(table) = self.world.sparse().at(id) {
                            for &row in table.rows_from(idx) {
                                let (_, to_idx) = table.indices(row as usize);
                                push(f, self.entity_at(to_idx), &mut out);
                            }
                        }
                    }
                    for &id in &link.reverse_tables {
                        if let Some(table) = self.world.sparse().at(id) {
                            for &row in table.rows_to(idx) {
                                let (from_idx, to_idx) = table.indices(row as usize);
                                if from_idx == to_idx {
                                    continue;
                                }
                                push(f, self.entity_at(from_idx), &mut out);
                            }
                        }
                    }
                }
            }
            (None, Some(t)) => {
                if self.world.is_alive(t) {
                    let idx = t.index();
                    for &id in &link.tables {
                        if let Some(table) = self.world.sparse().at(id) {
                            for &row in table.rows_to(idx) {
                                let (from_idx, _) = table.indices(row as usize);
                                push(self.entity_at(from_idx), t, &mut out);
                            }
                        }
                    }
                    for &id in &link.reverse_tables {
                        if let Some(table) = self.world.sparse().at(id) {
                            for &row in table.rows_from(idx) {
                                let (from_idx, to_idx) = table.indices(row as usize);
                                if from_idx == to_idx {
                                    continue;
                                }
                                push(self.entity_at(to_idx), t, &mut out);
                            }
                        }
                    }
                }
            }
            (None, None) => {
                for &id in &link.tables {
                    if let Some(table) = self.world.sparse().at(id) {
                        for row in 0..table.size() {
                            let (from_idx, to_idx) = table.indices(row);
                            push(self.entity_at(from_idx), self.entity_at(to_idx), &mut out);
                        }
                    }
                }
                for &id in &link.reverse_tables {
                    if let Some(table) = self.world.sparse().at(id) {
                        for row in 0..table.size() {
                            let (from_idx, to_idx) = table.indices(row);
                            if from_idx == to_idx {
                                continue;
                            }
                            push(self.entity_at(to_idx), self.entity_at(from_idx), &mut out);
                        }
                    }
                }
            }
        }
        out
    }
}

/// Iterates the [`Match`]es a [`View`] produced. Materialized up front at
/// `iter()` time rather than pulled lazily table-by-table — the relation
/// joins this supports stay small enough that the simpler implementation
/// wins, and nothing about the public surface (an `Iterator<Item = Match>`)
/// promises otherwise.
pub struct QueryIter {
    matches: std::vec::IntoIter<Match>,
}

impl Iterator for QueryIter {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        self.matches.next()
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
    struct Velocity {
        #[allow(dead_code)]
        dx: f32,
    }

    #[derive(Clone)]
    struct ChildOf;

    #[derive(Clone)]
    struct Likes;

    #[test]
    fn single_target_with_without_filters_archetypes() {
        let mut world = World::new();
        let pos = world.register_component::<Position>("Position");
        let vel = world.register_component::<Velocity>("Velocity");

        let moving = world.create();
        world.add(moving, Position { x: 1.0, y: 2.0 });
        world.add(moving, Velocity { dx: 1.0 });

        let still = world.create();
        world.add(still, Position { x: 5.0, y: 5.0 });

        let filter = QueryFilter::compile(&mut world, &[Term::With(pos, 0), Term::Without(vel, 0)]);
        let view = filter.view(&world);
        let matches: Vec<_> = view.iter().collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entities[0], still);
    }

    #[test]
    fn single_link_two_targets_finds_tree_edge() {
        let mut world = World::new();
        let child_of = world.register_relation::<ChildOf>("ChildOf", false, true);

        let parent = world.create();
        let child = world.create();
        world.relate(child, parent, ChildOf);

        let filter = QueryFilter::compile(
            &mut world,
            &[Term::Relation { data_type: child_of, from: 0, to: 1, traversal: Traversal::None }],
        );
        let view = filter.view(&world);
        let matches: Vec<_> = view.iter().collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entities[0], child);
        assert_eq!(matches[0].entities[1], parent);
    }

    #[test]
    fn pinning_a_dead_entity_yields_nothing() {
        let mut world = World::new();
        let pos = world.register_component::<Position>("Position");
        let e = world.create();
        world.add(e, Position { x: 0.0, y: 0.0 });
        world.destroy(e);

        let filter = QueryFilter::compile(&mut world, &[Term::With(pos, 0)]);
        let view = filter.view(&world).pin(0, e);
        assert_eq!(view.iter().count(), 0);
    }

    #[test]
    fn symmetric_relation_matches_regardless_of_storage_direction() {
        let mut world = World::new();
        let likes = world.register_relation::<Likes>("Likes", true, false);

        let a = world.create();
        let b = world.create();
        world.relate(a, b, Likes);

        let filter = QueryFilter::compile(
            &mut world,
            &[Term::Relation { data_type: likes, from: 0, to: 1, traversal: Traversal::None }],
        );
        let view = filter.view(&world).pin(0, b);
        let matches: Vec<_> = view.iter().collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entities[1], a);
    }

    #[test]
    fn independent_targets_cross_product_without_a_link() {
        let mut world = World::new();
        let pos = world.register_component::<Position>("Position");

        let a = world.create();
        world.add(a, Position { x: 0.0, y: 0.0 });
        let b = world.create();
        world.add(b, Position { x: 1.0, y: 1.0 });

        let filter = QueryFilter::compile(&mut world, &[Term::With(pos, 0), Term::With(pos, 1)]);
        let view = filter.view(&world);
        assert_eq!(view.iter().count(), 4);
    }
}
