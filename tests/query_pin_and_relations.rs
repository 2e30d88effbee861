//! Two-target pin edge cases and symmetric-relation overwrite behavior that
//! the in-module query/world tests don't already cover.

use voxel_ecs_core::query::{QueryFilter, Term, Traversal};
use voxel_ecs_core::World;

#[derive(Clone, Debug, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone)]
struct ChildOf;

#[derive(Clone, Debug, PartialEq)]
struct Likes(u32);

#[test]
fn pinning_both_targets_of_a_link_to_an_unrelated_pair_yields_nothing() {
    let mut world = World::new();
    let child_of = world.register_relation::<ChildOf>("ChildOf", false, true);

    let parent = world.create();
    let child = world.create();
    let stranger = world.create();
    world.relate(child, parent, ChildOf);

    let filter = QueryFilter::compile(
        &mut world,
        &[Term::Relation { data_type: child_of, from: 0, to: 1, traversal: Traversal::None }],
    );
    let view = filter.view(&world).pin(0, child).pin(1, stranger);
    assert_eq!(view.iter().count(), 0);
}

#[test]
fn pinning_one_side_of_a_link_enumerates_only_that_sides_matches() {
    let mut world = World::new();
    let child_of = world.register_relation::<ChildOf>("ChildOf", false, true);

    let parent = world.create();
    let child_a = world.create();
    let child_b = world.create();
    world.relate(child_a, parent, ChildOf);
    world.relate(child_b, parent, ChildOf);

    let filter = QueryFilter::compile(
        &mut world,
        &[Term::Relation { data_type: child_of, from: 0, to: 1, traversal: Traversal::None }],
    );
    let view = filter.view(&world).pin(1, parent);
    let matches: Vec<_> = view.iter().collect();
    assert_eq!(matches.len(), 2);
    let children: std::collections::HashSet<_> = matches.iter().map(|m| m.entities[0]).collect();
    assert!(children.contains(&child_a));
    assert!(children.contains(&child_b));
}

#[test]
fn pinning_a_destroyed_entity_mid_session_yields_nothing_even_if_recycled() {
    let mut world = World::new();
    let pos = world.register_component::<Position>("Position");

    let e = world.create();
    world.add(e, Position { x: 0.0, y: 0.0 });
    world.destroy(e);

    // Recycle the index with a fresh entity that does NOT carry Position.
    let recycled = world.create();
    assert_eq!(recycled.index(), e.index());
    assert_ne!(recycled.generation(), e.generation());

    let filter = QueryFilter::compile(&mut world, &[Term::With(pos, 0)]);
    let view = filter.view(&world).pin(0, e);
    assert_eq!(view.iter().count(), 0);
}

#[test]
fn relating_the_same_symmetric_pair_twice_does_not_duplicate_the_match() {
    let mut world = World::new();
    let likes = world.register_relation::<Likes>("Likes", true, false);

    let a = world.create();
    let b = world.create();
    world.relate(a, b, Likes(1));
    world.relate(a, b, Likes(2));
    assert_eq!(world.relation::<Likes>(a, b).map(|l| l.0), Some(2));

    let filter = QueryFilter::compile(
        &mut world,
        &[Term::Relation { data_type: likes, from: 0, to: 1, traversal: Traversal::None }],
    );
    let view = filter.view(&world);
    assert_eq!(view.iter().count(), 1);
}

#[test]
fn relating_swapped_order_overwrites_the_same_symmetric_edge() {
    let mut world = World::new();
    let likes = world.register_relation::<Likes>("Likes", true, false);

    let a = world.create();
    let b = world.create();
    world.relate(a, b, Likes(1));
    world.relate(b, a, Likes(2));

    assert!(world.related::<Likes>(a, b));
    assert!(world.related::<Likes>(b, a));
    assert_eq!(world.relation::<Likes>(a, b).map(|l| l.0), Some(2));

    let filter = QueryFilter::compile(
        &mut world,
        &[Term::Relation { data_type: likes, from: 0, to: 1, traversal: Traversal::None }],
    );
    let view = filter.view(&world);
    assert_eq!(view.iter().count(), 1);
}
