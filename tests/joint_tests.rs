use approx::assert_relative_eq;
use sector_physics::*;

fn ball(system: &CollisionSystem, position: Vec3) -> CollisionObject {
    let mut object = system.create_rigid_body();
    object
        .add_collider(system.create_collider_sphere(0.25), Transform::IDENTITY)
        .expect("sphere");
    object.set_transform(Transform::from_position(position));
    object
}

fn add(system: &mut CollisionSystem, sector: SectorId, object: CollisionObject) -> ObjectHandle {
    system
        .sector_mut(sector)
        .expect("sector")
        .add_collision_object(object)
        .expect("added")
}

#[test]
fn p2p_joint_keeps_the_pendulum_length() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let pivot = Vec3::new(0.0, 5.0, 0.0);
    let bob = ball(&system, Vec3::new(1.0, 5.0, 0.0));
    let bob = add(&mut system, sector_id, bob);

    let mut joint = system.create_rigid_p2p_joint(pivot);
    let sector = system.sector_mut(sector_id).expect("sector");
    joint.attach(sector.object(bob).expect("bob"), None).expect("attached");
    let handle = sector.add_joint(joint).expect("joint");
    assert!(sector.joint(handle).is_some_and(|j| j.is_built()));

    for _ in 0..90 {
        sector.step(1.0 / 60.0);
    }
    let position = sector.object(bob).expect("bob").transform().position;
    assert_relative_eq!(position.distance(pivot), 1.0, epsilon = 0.1);
    assert!(position.y < 5.0, "pendulum never swung: {position}");
}

#[test]
fn static_body_becomes_the_first_side() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let mut anchor = ball(&system, Vec3::ZERO);
    if let Some(body) = anchor.rigid_body_mut() {
        body.set_state(RigidBodyState::Static);
    }
    let anchor = add(&mut system, sector_id, anchor);
    let moving = ball(&system, Vec3::new(0.0, -1.0, 0.0));
    let moving = add(&mut system, sector_id, moving);

    let mut joint = system.create_rigid_hinge_joint(Vec3::ZERO, Vec3::Z, 1.0, -1.0);
    let sector = system.sector(sector_id).expect("sector");
    joint
        .attach(sector.object(moving).expect("moving"), sector.object(anchor))
        .expect("attached");
    assert_eq!(joint.body(0), Some(anchor));
    assert_eq!(joint.body(1), Some(moving));
    assert_eq!(joint.joint_type(), JointType::Hinge);
}

#[test]
fn soft_body_routes_to_the_soft_family() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let rope = system.create_soft_rope(Vec3::ZERO, Vec3::new(0.0, -2.0, 0.0), 4);
    let rope = add(&mut system, sector_id, rope);
    let weight = ball(&system, Vec3::new(0.0, -2.0, 0.0));
    let weight = add(&mut system, sector_id, weight);

    let mut joint = system.create_rigid_p2p_joint(Vec3::new(0.0, -2.0, 0.0));
    let sector = system.sector_mut(sector_id).expect("sector");
    joint
        .attach(sector.object(weight).expect("weight"), sector.object(rope))
        .expect("attached");
    assert_eq!(joint.joint_type(), JointType::SoftLinear);
    assert_eq!(joint.body(0), Some(rope));
    sector.add_joint(joint).expect("joint");
}

#[test]
fn joints_cannot_span_sectors() {
    let mut system = CollisionSystem::new();
    let a = system.create_sector();
    let b = system.create_sector();
    let first = ball(&system, Vec3::ZERO);
    let first = add(&mut system, a, first);
    let second = ball(&system, Vec3::X);
    let second = add(&mut system, b, second);

    let mut joint = system.create_joint();
    let result = joint.attach(
        system.sector(a).expect("a").object(first).expect("first"),
        system.sector(b).expect("b").object(second),
    );
    assert_eq!(result, Err(CollisionError::CrossSectorJoint));
    assert!(joint.body(0).is_none());
}

#[test]
fn detached_joint_is_refused() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let joint = system.create_rigid_pivot_joint(Vec3::ZERO);
    let result = system.sector_mut(sector_id).expect("sector").add_joint(joint);
    assert_eq!(result.err(), Some(CollisionError::InvalidJoint));
}

#[test]
fn non_physical_objects_cannot_be_jointed() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let mut wall = system.create_collision_object();
    wall.add_collider(system.create_collider_box(Vec3::ONE), Transform::IDENTITY)
        .expect("box");
    let wall = add(&mut system, sector_id, wall);
    let mut joint = system.create_rigid_p2p_joint(Vec3::ZERO);
    let sector = system.sector(sector_id).expect("sector");
    assert_eq!(
        joint.attach(sector.object(wall).expect("wall"), None),
        Err(CollisionError::NotPhysical)
    );
}

#[test]
fn weak_joint_breaks_under_load() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let bob = ball(&system, Vec3::new(0.0, 4.0, 0.0));
    let bob = add(&mut system, sector_id, bob);

    let mut joint = system.create_rigid_p2p_joint(Vec3::new(0.0, 5.0, 0.0));
    joint.set_breaking_impulse_threshold(1e-4);
    let sector = system.sector_mut(sector_id).expect("sector");
    joint.attach(sector.object(bob).expect("bob"), None).expect("attached");
    let handle = sector.add_joint(joint).expect("joint");
    for _ in 0..5 {
        sector.step(1.0 / 60.0);
    }
    assert!(sector.joint(handle).is_some_and(|j| j.is_broken()));

    sector.rebuild_joint(handle).expect("rebuilt");
    assert!(sector.joint(handle).is_some_and(|j| !j.is_broken()));
}

#[test]
fn slide_joint_limits_apply_live() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let slider = ball(&system, Vec3::ZERO);
    let slider = add(&mut system, sector_id, slider);
    let mut joint = system.create_rigid_slide_joint(Vec3::ZERO, Vec3::X, -1.0, 1.0);
    let sector = system.sector_mut(sector_id).expect("sector");
    sector.set_gravity(Vec3::ZERO);
    joint.attach(sector.object(slider).expect("slider"), None).expect("attached");
    let handle = sector.add_joint(joint).expect("joint");

    if let Some(joint) = sector.joint_mut(handle) {
        joint.set_maximum_distance(Vec3::new(0.5, 0.0, 0.0));
    }
    if let Some(body) = sector.object_mut(slider).and_then(|o| o.rigid_body_mut()) {
        body.set_linear_velocity(Vec3::new(3.0, 2.0, 0.0));
    }
    for _ in 0..60 {
        sector.step(1.0 / 60.0);
    }
    let position = sector.object(slider).expect("slider").transform().position;
    assert!(position.x <= 0.7, "slid past the limit: {position}");
    assert!(position.y.abs() < 0.1, "left the rail: {position}");
}

#[test]
fn slide_limits_bound_the_body_on_each_side() {
    for (speed, stop) in [(3.0, 0.5), (-3.0, -1.0)] {
        let mut system = CollisionSystem::new();
        let sector_id = system.create_sector();
        let slider = ball(&system, Vec3::ZERO);
        let slider = add(&mut system, sector_id, slider);
        let mut joint = system.create_rigid_slide_joint(Vec3::ZERO, Vec3::X, -1.0, 0.5);
        let sector = system.sector_mut(sector_id).expect("sector");
        sector.set_gravity(Vec3::ZERO);
        joint.attach(sector.object(slider).expect("slider"), None).expect("attached");
        sector.add_joint(joint).expect("joint");
        if let Some(body) = sector.object_mut(slider).and_then(|o| o.rigid_body_mut()) {
            body.set_linear_velocity(Vec3::new(speed, 0.0, 0.0));
        }
        for _ in 0..60 {
            sector.step(1.0 / 60.0);
        }
        let x = sector.object(slider).expect("slider").transform().position.x;
        assert_relative_eq!(x, stop, epsilon = 0.1);
    }
}
