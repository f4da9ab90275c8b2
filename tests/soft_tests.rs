use std::sync::Arc;

use sector_physics::*;

fn anchor_body(system: &CollisionSystem, position: Vec3) -> CollisionObject {
    let mut object = system.create_rigid_body();
    object
        .add_collider(system.create_collider_sphere(0.25), Transform::IDENTITY)
        .expect("sphere");
    object.set_transform(Transform::from_position(position));
    if let Some(body) = object.rigid_body_mut() {
        body.set_state(RigidBodyState::Kinematic);
    }
    object
}

#[test]
fn rigid_anchor_drags_the_vertex_along() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let rope = system.create_soft_rope(Vec3::new(0.0, 5.0, 0.0), Vec3::new(4.0, 5.0, 0.0), 4);
    let body = anchor_body(&system, Vec3::new(0.0, 6.0, 0.0));

    let sector = system.sector_mut(sector_id).expect("sector");
    let rope = sector.add_collision_object(rope).expect("rope");
    let body = sector.add_collision_object(body).expect("body");
    sector.anchor_soft_vertex_to_body(rope, 0, body).expect("anchored");

    let target = Vec3::new(0.0, 5.0, 2.0);
    if let Some(object) = sector.object_mut(body) {
        object.set_transform(Transform::from_position(Vec3::new(0.0, 6.0, 2.0)));
    }
    let before = sector
        .object(rope)
        .and_then(|o| o.soft_body())
        .expect("soft")
        .vertex_position(0)
        .expect("vertex 0");

    sector.step(1.0 / 60.0);

    let after = sector
        .object(rope)
        .and_then(|o| o.soft_body())
        .expect("soft")
        .vertex_position(0)
        .expect("vertex 0");
    assert!(
        after.distance(target) < before.distance(target),
        "vertex moved from {before} to {after}"
    );
}

#[test]
fn fixed_anchor_holds_while_the_rest_sags() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let mut rope = system.create_soft_rope(Vec3::new(0.0, 5.0, 0.0), Vec3::new(4.0, 5.0, 0.0), 8);
    rope.soft_body_mut().expect("soft").anchor_vertex(0).expect("anchored");

    let sector = system.sector_mut(sector_id).expect("sector");
    let handle = sector.add_collision_object(rope).expect("rope");
    for _ in 0..30 {
        sector.step(1.0 / 60.0);
    }
    let soft = sector.object(handle).and_then(|o| o.soft_body()).expect("soft");
    let pinned = soft.vertex_position(0).expect("vertex 0");
    let free = soft.vertex_position(8).expect("vertex 8");
    assert!(pinned.distance(Vec3::new(0.0, 5.0, 0.0)) < 1e-3, "pinned vertex drifted to {pinned}");
    assert!(free.y < 5.0, "free end stayed at {free}");
}

#[test]
fn updated_anchor_pulls_the_vertex() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let mut rope = system.create_soft_rope(Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0), 2);
    rope.soft_body_mut().expect("soft").anchor_vertex(2).expect("anchored");
    let sector = system.sector_mut(sector_id).expect("sector");
    sector.set_gravity(Vec3::ZERO);
    let handle = sector.add_collision_object(rope).expect("rope");

    let goal = Vec3::new(2.0, 1.0, 0.0);
    if let Some(soft) = sector.object_mut(handle).and_then(|o| o.soft_body_mut()) {
        soft.update_anchor(2, goal).expect("anchored vertex");
    }
    sector.step(1.0 / 60.0);
    let moved = sector
        .object(handle)
        .and_then(|o| o.soft_body())
        .expect("soft")
        .vertex_position(2)
        .expect("vertex 2");
    assert!(moved.distance(goal) < 1.0, "vertex at {moved}");
}

struct Orbit;

impl AnchorAnimationControl for Orbit {
    fn anchor_position(&self) -> Vec3 {
        Vec3::new(0.0, 3.0, 0.0)
    }
}

#[test]
fn animated_anchor_is_sampled_every_step() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let mut rope = system.create_soft_rope(Vec3::ZERO, Vec3::X, 1);
    rope.soft_body_mut()
        .expect("soft")
        .anchor_vertex_animated(0, Arc::new(Orbit))
        .expect("anchored");
    let sector = system.sector_mut(sector_id).expect("sector");
    sector.set_gravity(Vec3::ZERO);
    let handle = sector.add_collision_object(rope).expect("rope");
    for _ in 0..10 {
        sector.step(1.0 / 60.0);
    }
    let vertex = sector
        .object(handle)
        .and_then(|o| o.soft_body())
        .expect("soft")
        .vertex_position(0)
        .expect("vertex 0");
    assert!(vertex.y > 1.0, "vertex at {vertex}");
}

#[test]
fn out_of_range_vertices_are_rejected() {
    let system = CollisionSystem::new();
    let mut rope = system.create_soft_rope(Vec3::ZERO, Vec3::X, 2);
    let soft = rope.soft_body_mut().expect("soft");
    assert_eq!(soft.vertex_count(), 3);
    assert!(matches!(
        soft.anchor_vertex(3),
        Err(CollisionError::VertexOutOfRange { index: 3, count: 3 })
    ));
    assert!(matches!(soft.vertex_position(7), Err(CollisionError::VertexOutOfRange { .. })));
    assert_eq!(soft.anchor_count(), 0);
}

#[test]
fn disabled_soft_simulation_freezes_bodies() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let cloth = system.create_soft_cloth(
        [
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(1.0, 2.0, 0.0),
            Vec3::new(0.0, 2.0, 1.0),
            Vec3::new(1.0, 2.0, 1.0),
        ],
        4,
        4,
        true,
    );
    let sector = system.sector_mut(sector_id).expect("sector");
    sector.set_soft_body_enabled(false);
    let handle = sector.add_collision_object(cloth).expect("cloth");
    assert_eq!(sector.soft_body_count(), 1);
    sector.step(0.1);
    let soft = sector.object(handle).and_then(|o| o.soft_body()).expect("soft");
    assert_eq!(soft.vertex_position(0).expect("vertex"), Vec3::new(0.0, 2.0, 0.0));
    assert!(soft.triangle_count() > 0);
}
