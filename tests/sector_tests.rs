use std::sync::Arc;

use approx::assert_relative_eq;
use sector_physics::*;

fn cube(system: &CollisionSystem, position: Vec3) -> CollisionObject {
    let mut object = system.create_collision_object();
    object
        .add_collider(system.create_collider_box(Vec3::ONE), Transform::IDENTITY)
        .expect("box");
    object.set_transform(Transform::from_position(position));
    object
}

fn setup() -> (CollisionSystem, SectorId) {
    let mut system = CollisionSystem::new();
    let sector = system.create_sector();
    (system, sector)
}

#[test]
fn overlapping_static_boxes_report_penetration() {
    let (mut system, sector_id) = setup();
    let a = cube(&system, Vec3::ZERO);
    let b = cube(&system, Vec3::new(3.0, 0.0, 0.0));
    let sector = system.sector_mut(sector_id).expect("sector");
    let a = sector.add_collision_object(a).expect("a");
    let b = sector.add_collision_object(b).expect("b");

    let mut points = Vec::new();
    assert_eq!(sector.collision_test(a, &mut points), Ok(false));
    assert!(points.is_empty());
    assert_eq!(sector.collide(a, b), Ok(false));

    if let Some(object) = sector.object_mut(b) {
        object.set_transform(Transform::from_position(Vec3::new(0.8, 0.0, 0.0)));
    }
    assert_eq!(sector.collision_test(a, &mut points), Ok(true));
    assert!(!points.is_empty());
    assert!(points.iter().all(|p| p.penetration < 0.0));
    assert_relative_eq!(points[0].penetration, -0.2, epsilon = 0.1);
    assert_eq!(sector.collide(a, b), Ok(true));
    assert_eq!(sector.collide(b, a), Ok(true));
}

#[test]
fn beam_hits_the_nearest_object() {
    let (mut system, sector_id) = setup();
    let near = cube(&system, Vec3::new(3.0, 0.0, 0.0));
    let far = cube(&system, Vec3::new(6.0, 0.0, 0.0));
    let sector = system.sector_mut(sector_id).expect("sector");
    let near = sector.add_collision_object(near).expect("near");
    let far = sector.add_collision_object(far).expect("far");

    let hit = sector.hit_beam(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0));
    assert!(hit.has_hit);
    assert_eq!(hit.object, Some(near));
    assert_relative_eq!(hit.isect.x, 2.5, epsilon = 1e-3);
    assert_relative_eq!(hit.normal.x, -1.0, epsilon = 1e-3);
    assert_relative_eq!(hit.distance, 2.5, epsilon = 1e-3);

    let only_far = sector
        .hit_beam_object(far, Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0))
        .expect("live handle");
    assert_eq!(only_far.object, Some(far));
    assert_relative_eq!(only_far.isect.x, 5.5, epsilon = 1e-3);

    assert!(!sector.hit_beam(Vec3::new(0.0, 5.0, 0.0), Vec3::new(10.0, 5.0, 0.0)).has_hit);
}

#[test]
fn beam_on_a_mesh_reports_a_vertex() {
    let (mut system, sector_id) = setup();
    let mesh = Arc::new(
        TriangleMesh::builder(
            vec![Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 0.0, -1.0), Vec3::new(0.0, 0.0, 1.0)],
            vec![[0, 2, 1]],
        )
        .build(),
    );
    let mut ground = system.create_collision_object();
    ground
        .add_collider(system.create_collider_concave_mesh(mesh), Transform::IDENTITY)
        .expect("mesh");
    let sector = system.sector_mut(sector_id).expect("sector");
    sector.add_collision_object(ground).expect("ground");
    let hit = sector.hit_beam(Vec3::new(0.0, 2.0, 0.5), Vec3::new(0.0, -2.0, 0.5));
    assert!(hit.has_hit);
    assert_eq!(hit.vertex_index, Some(2));
}

#[test]
fn move_test_stops_at_the_first_blocker() {
    let (mut system, sector_id) = setup();
    let wall = cube(&system, Vec3::new(5.0, 0.0, 0.0));
    let mut mover = system.create_rigid_body();
    mover
        .add_collider(system.create_collider_sphere(0.5), Transform::IDENTITY)
        .expect("sphere");
    let sector = system.sector_mut(sector_id).expect("sector");
    let wall = sector.add_collision_object(wall).expect("wall");
    let mover = sector.add_collision_object(mover).expect("mover");

    let result = sector
        .move_test(
            mover,
            Transform::from_position(Vec3::ZERO),
            Transform::from_position(Vec3::new(10.0, 0.0, 0.0)),
        )
        .expect("rigid mover");
    assert!(result.has_hit);
    assert_eq!(result.object, Some(wall));
    assert_relative_eq!(result.position.x, 4.0, epsilon = 0.1);
    assert_relative_eq!(result.normal.x, -1.0, epsilon = 0.1);

    let clear = sector
        .move_test(
            mover,
            Transform::from_position(Vec3::ZERO),
            Transform::from_position(Vec3::new(0.0, 0.0, 3.0)),
        )
        .expect("rigid mover");
    assert!(!clear.has_hit);
    assert_eq!(clear.fraction, 1.0);
}

#[test]
fn move_test_rejects_soft_bodies() {
    let (mut system, sector_id) = setup();
    let rope = system.create_soft_rope(Vec3::ZERO, Vec3::X, 2);
    let sector = system.sector_mut(sector_id).expect("sector");
    let rope = sector.add_collision_object(rope).expect("rope");
    let result = sector.move_test(rope, Transform::IDENTITY, Transform::from_position(Vec3::Y));
    assert_eq!(result.err(), Some(CollisionError::SoftBodyCollider));
}

#[test]
fn ghost_reports_overlaps_after_a_step() {
    let (mut system, sector_id) = setup();
    let mut ghost = system.create_ghost_collision_object();
    ghost
        .add_collider(system.create_collider_sphere(1.0), Transform::IDENTITY)
        .expect("sphere");
    let inside = cube(&system, Vec3::new(0.5, 0.0, 0.0));
    let outside = cube(&system, Vec3::new(10.0, 0.0, 0.0));
    let sector = system.sector_mut(sector_id).expect("sector");
    let ghost = sector.add_collision_object(ghost).expect("ghost");
    let inside = sector.add_collision_object(inside).expect("inside");
    let outside = sector.add_collision_object(outside).expect("outside");

    sector.step(1.0 / 60.0);
    let object = sector.object(ghost).expect("ghost");
    assert_eq!(object.overlapping_objects(), &[inside]);
    assert_eq!(sector.contact_objects(ghost), Ok(vec![inside]));
    assert_eq!(sector.contact_objects(inside), Ok(vec![ghost]));
    assert_eq!(sector.collide(ghost, outside), Ok(false));

    let mut points = Vec::new();
    assert_eq!(sector.collision_test(ghost, &mut points), Ok(true));
    assert!(!points.is_empty());

    sector.remove_collision_object(inside).expect("removed");
    assert!(sector.object(ghost).expect("ghost").overlapping_objects().is_empty());
    assert!(sector.contact_objects(ghost).expect("alive").is_empty());
}

#[test]
fn counts_track_each_kind() {
    let (mut system, sector_id) = setup();
    let rigid = {
        let mut object = system.create_rigid_body();
        object
            .add_collider(system.create_collider_sphere(0.5), Transform::IDENTITY)
            .expect("sphere");
        object
    };
    let rope = system.create_soft_rope(Vec3::new(0.0, 5.0, 0.0), Vec3::new(1.0, 5.0, 0.0), 2);
    let wall = cube(&system, Vec3::new(0.0, 0.0, 5.0));
    let sector = system.sector_mut(sector_id).expect("sector");
    sector.add_collision_object(rigid).expect("rigid");
    sector.add_collision_object(rope).expect("rope");
    sector.add_collision_object(wall).expect("wall");
    assert_eq!(sector.object_count(), 3);
    assert_eq!(sector.rigid_body_count(), 1);
    assert_eq!(sector.soft_body_count(), 1);
    assert_eq!(sector.object_handles().len(), 3);
}

#[test]
fn simulation_speed_scales_time() {
    let (mut system, sector_id) = setup();
    let sector = system.sector_mut(sector_id).expect("sector");
    sector.set_simulation_speed(2.0);
    assert_eq!(sector.step(1.0 / 60.0), 2);
    sector.set_simulation_speed(0.0);
    assert_eq!(sector.step(1.0), 0);
    sector.set_simulation_speed(-3.0);
    assert_eq!(sector.simulation_speed(), 0.0);
}

#[test]
fn step_parameters_control_sub_steps() {
    let (mut system, sector_id) = setup();
    let sector = system.sector_mut(sector_id).expect("sector");
    sector.set_step_parameters(0.01, 5, 4).expect("valid");
    assert_eq!(sector.solver_iterations(), 4);
    assert_eq!(sector.step(0.035), 3);
    assert_eq!(sector.step(0.005), 1);
    assert_eq!(sector.step(1.0), 5);
    assert_eq!(sector.profile().sub_steps, 5);
    sector.profile().report();
}

#[test]
fn dampeners_and_auto_disable_are_configurable() {
    let (mut system, sector_id) = setup();
    let sector = system.sector_mut(sector_id).expect("sector");
    sector.set_linear_dampener(0.3);
    sector.set_rolling_dampener(0.1);
    assert_eq!(sector.linear_dampener(), 0.3);
    assert_eq!(sector.rolling_dampener(), 0.1);

    sector.set_auto_disable_params(0.5, 0.6, 1.5);
    let params = sector.auto_disable_params();
    assert_eq!((params.linear_threshold, params.angular_threshold, params.time), (0.5, 0.6, 1.5));
    sector.set_auto_disable(false);
    assert!(!sector.auto_disable());
}

#[test]
fn resting_body_falls_asleep_and_wakes_on_demand() {
    let (mut system, sector_id) = setup();
    let floor = {
        let mut object = system.create_collision_object();
        object
            .add_collider(system.create_collider_box(Vec3::new(10.0, 1.0, 10.0)), Transform::IDENTITY)
            .expect("box");
        object.set_transform(Transform::from_position(Vec3::new(0.0, -0.5, 0.0)));
        object
    };
    let mut body = system.create_rigid_body();
    body.add_collider(system.create_collider_box(Vec3::ONE), Transform::IDENTITY)
        .expect("box");
    body.set_transform(Transform::from_position(Vec3::new(0.0, 0.5, 0.0)));

    let sector = system.sector_mut(sector_id).expect("sector");
    sector.set_auto_disable_params(0.8, 1.0, 0.5);
    sector.add_collision_object(floor).expect("floor");
    let handle = sector.add_collision_object(body).expect("body");
    for _ in 0..120 {
        sector.step(1.0 / 60.0);
    }
    let enabled = |s: &CollisionSector| s.object(handle).and_then(|o| o.rigid_body()).map(|b| b.is_enabled());
    assert_eq!(enabled(sector), Some(false));

    sector.set_gravity(Vec3::new(0.0, -20.0, 0.0));
    assert_eq!(enabled(sector), Some(true));
}
