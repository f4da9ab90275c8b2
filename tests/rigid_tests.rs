use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use approx::assert_relative_eq;
use sector_physics::*;

fn sphere_body(system: &CollisionSystem, position: Vec3) -> CollisionObject {
    let mut object = system.create_rigid_body();
    object
        .add_collider(system.create_collider_sphere(0.5), Transform::IDENTITY)
        .expect("sphere");
    object.set_transform(Transform::from_position(position));
    object
}

fn floor(system: &CollisionSystem) -> CollisionObject {
    let mut object = system.create_collision_object();
    object
        .add_collider(system.create_collider_box(Vec3::new(20.0, 1.0, 20.0)), Transform::IDENTITY)
        .expect("box");
    object.set_transform(Transform::from_position(Vec3::new(0.0, -0.5, 0.0)));
    object
}

fn height(sector: &CollisionSector, handle: ObjectHandle) -> f32 {
    sector.object(handle).expect("alive").transform().position.y
}

#[test]
fn dropped_sphere_falls_every_sub_step() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let body = sphere_body(&system, Vec3::new(0.0, 10.0, 0.0));
    let sector = system.sector_mut(sector_id).expect("sector");
    sector.set_gravity(Vec3::new(0.0, -9.8, 0.0));
    let handle = sector.add_collision_object(body).expect("added");

    let mut previous = height(sector, handle);
    for _ in 0..60 {
        assert_eq!(sector.step(1.0 / 60.0), 1);
        let current = height(sector, handle);
        assert!(current < previous, "{current} !< {previous}");
        previous = current;
    }
    // Semi-implicit Euler lands close to the analytic 10 - g/2.
    assert!((previous - (10.0 - 4.9)).abs() < 0.2, "height after 1s: {previous}");
}

#[test]
fn one_long_step_matches_many_short_ones() {
    let mut system = CollisionSystem::new();
    let a = system.create_sector();
    let b = system.create_sector();
    let starts = [Vec3::new(0.0, 10.0, 0.0), Vec3::new(5.0, 20.0, 0.0), Vec3::new(-5.0, 15.0, 3.0)];

    let mut handles = Vec::new();
    for sector_id in [a, b] {
        let bodies: Vec<CollisionObject> = starts.iter().map(|p| sphere_body(&system, *p)).collect();
        let sector = system.sector_mut(sector_id).expect("sector");
        sector.set_step_parameters(1.0 / 60.0, 120, 10).expect("valid");
        let mut ids = Vec::new();
        for (i, mut body) in bodies.into_iter().enumerate() {
            if let Some(rigid) = body.rigid_body_mut() {
                rigid.set_linear_velocity(Vec3::new(i as f32, 0.0, 1.0));
            }
            ids.push(sector.add_collision_object(body).expect("added"));
        }
        handles.push(ids);
    }

    system.sector_mut(a).expect("sector").step(1.0);
    for _ in 0..10 {
        system.sector_mut(b).expect("sector").step(0.1);
    }

    let (sa, sb) = (system.sector(a).expect("a"), system.sector(b).expect("b"));
    for (ha, hb) in handles[0].iter().zip(&handles[1]) {
        let pa = sa.object(*ha).expect("alive").transform().position;
        let pb = sb.object(*hb).expect("alive").transform().position;
        assert_relative_eq!(pa.x, pb.x, epsilon = 1e-3);
        assert_relative_eq!(pa.y, pb.y, epsilon = 1e-3);
        assert_relative_eq!(pa.z, pb.z, epsilon = 1e-3);
    }
}

#[test]
fn sphere_comes_to_rest_on_the_floor() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let ground = floor(&system);
    let body = sphere_body(&system, Vec3::new(0.0, 2.0, 0.0));
    let sector = system.sector_mut(sector_id).expect("sector");
    let floor_handle = sector.add_collision_object(ground).expect("floor");
    let handle = sector.add_collision_object(body).expect("body");

    for _ in 0..180 {
        sector.step(1.0 / 60.0);
    }
    let y = height(sector, handle);
    assert!((y - 0.5).abs() < 0.1, "resting height {y}");
    assert_eq!(sector.contact_objects(handle), Ok(vec![floor_handle]));
    assert_eq!(sector.contact_objects(floor_handle), Ok(vec![handle]));
}

struct Counter(AtomicUsize);

impl CollisionCallback for Counter {
    fn on_collision(
        &self,
        _sector: SectorId,
        _this: &CollisionObject,
        _other: &CollisionObject,
        points: &[CollisionData],
        steps: usize,
    ) {
        assert!(!points.is_empty());
        assert!(steps > 0);
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn collision_callback_fires_on_landing() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let counter = Arc::new(Counter(AtomicUsize::new(0)));
    let mut body = sphere_body(&system, Vec3::new(0.0, 1.0, 0.0));
    body.set_collision_callback(Some(counter.clone()));
    let ground = floor(&system);
    let sector = system.sector_mut(sector_id).expect("sector");
    sector.add_collision_object(ground).expect("floor");
    sector.add_collision_object(body).expect("body");

    sector.step(1.0 / 60.0);
    assert_eq!(counter.0.load(Ordering::Relaxed), 0);
    for _ in 0..60 {
        sector.step(1.0 / 60.0);
    }
    assert!(counter.0.load(Ordering::Relaxed) > 0);
}

struct Elevator;

impl KinematicCallback for Elevator {
    fn body_transform(&self, body: &CollisionObject) -> Transform {
        let mut transform = body.transform();
        transform.position.y += 0.1;
        transform
    }
}

#[test]
fn kinematic_body_follows_its_callback() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let mut body = sphere_body(&system, Vec3::ZERO);
    if let Some(rigid) = body.rigid_body_mut() {
        rigid.set_state(RigidBodyState::Kinematic);
        rigid.set_kinematic_callback(Some(Arc::new(Elevator)));
    }
    let mut still = sphere_body(&system, Vec3::new(5.0, 0.0, 0.0));
    if let Some(rigid) = still.rigid_body_mut() {
        rigid.set_state(RigidBodyState::Kinematic);
    }
    let sector = system.sector_mut(sector_id).expect("sector");
    let handle = sector.add_collision_object(body).expect("body");
    let still = sector.add_collision_object(still).expect("body");

    sector.step(3.0 / 60.0);
    assert_relative_eq!(height(sector, handle), 0.3, epsilon = 1e-4);
    assert_eq!(height(sector, still), 0.0);
}

#[test]
fn static_body_ignores_gravity_and_forces() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let mut body = sphere_body(&system, Vec3::new(0.0, 3.0, 0.0));
    if let Some(rigid) = body.rigid_body_mut() {
        rigid.set_state(RigidBodyState::Static);
    }
    let sector = system.sector_mut(sector_id).expect("sector");
    let handle = sector.add_collision_object(body).expect("body");
    if let Some(object) = sector.object_mut(handle) {
        object.add_rel_force(Vec3::new(100.0, 0.0, 0.0)).expect("physical");
    }
    for _ in 0..10 {
        sector.step(1.0 / 60.0);
    }
    assert_eq!(sector.object(handle).expect("alive").transform().position, Vec3::new(0.0, 3.0, 0.0));
}

#[test]
fn applied_force_accelerates_for_one_sub_step() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let body = sphere_body(&system, Vec3::ZERO);
    let sector = system.sector_mut(sector_id).expect("sector");
    sector.set_gravity(Vec3::ZERO);
    let handle = sector.add_collision_object(body).expect("body");
    if let Some(rigid) = sector.object_mut(handle).and_then(|o| o.rigid_body_mut()) {
        rigid.set_mass(2.0);
        rigid.add_force(Vec3::new(12.0, 0.0, 0.0));
    }
    sector.step(1.0 / 60.0);
    let velocity = sector
        .object(handle)
        .and_then(|o| o.rigid_body())
        .expect("rigid")
        .linear_velocity();
    assert_relative_eq!(velocity.x, 6.0 / 60.0, epsilon = 1e-4);

    // Forces are cleared after the sub-step that used them.
    sector.step(1.0 / 60.0);
    let after = sector
        .object(handle)
        .and_then(|o| o.rigid_body())
        .expect("rigid")
        .linear_velocity();
    assert_relative_eq!(after.x, velocity.x, epsilon = 1e-4);
}

#[test]
fn mass_and_density_follow_the_last_write() {
    let system = CollisionSystem::new();
    let mut object = system.create_rigid_body();
    object
        .add_collider(system.create_collider_box(Vec3::new(1.0, 2.0, 2.0)), Transform::IDENTITY)
        .expect("box");
    let body = object.rigid_body_mut().expect("rigid");
    body.set_density(3.0);
    assert_relative_eq!(body.mass(), 12.0, epsilon = 1e-3);
    body.set_mass(2.0);
    assert_relative_eq!(body.density(), 0.5, epsilon = 1e-3);
}
