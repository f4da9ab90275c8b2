use std::sync::{Arc, Mutex};

use sector_physics::*;

struct Node {
    transform: Mutex<Transform>,
}

impl Movable for Node {
    fn transform(&self) -> Transform {
        *self.transform.lock().expect("lock")
    }

    fn set_transform(&self, transform: Transform) {
        *self.transform.lock().expect("lock") = transform;
    }
}

struct Scene {
    movables: Mutex<usize>,
}

impl SceneSector for Scene {
    fn add_movable(&self, _movable: &Arc<dyn Movable>) {
        *self.movables.lock().expect("lock") += 1;
    }

    fn remove_movable(&self, _movable: &Arc<dyn Movable>) {
        *self.movables.lock().expect("lock") -= 1;
    }
}

struct FlatTerrain;

impl TerrainSystem for FlatTerrain {
    fn loaded_cells(&self) -> Vec<Arc<dyn TerrainCell>> {
        Vec::new()
    }

    fn add_cell_listener(&self, _listener: Arc<dyn TerrainCellListener>) {}
}

#[test]
fn static_only_colliders_pin_the_object_type() {
    let system = CollisionSystem::new();
    let mut object = system.create_collision_object();
    object
        .add_collider(
            system.create_collider_plane(Plane::from_point_normal(Vec3::ZERO, Vec3::Y)),
            Transform::IDENTITY,
        )
        .expect("plane");
    assert!(matches!(
        object.set_object_type(CollisionObjectType::Ghost),
        Err(CollisionError::ForbiddenTypeTransition { .. })
    ));
    assert_eq!(object.object_type(), CollisionObjectType::Base);

    object.remove_collider_at(0).expect("removed");
    object.set_object_type(CollisionObjectType::Ghost).expect("no static colliders left");
    assert_eq!(object.object_type(), CollisionObjectType::Ghost);
}

#[test]
fn actor_and_physical_need_dedicated_construction() {
    let system = CollisionSystem::new();
    let mut object = system.create_collision_object();
    assert!(object.set_object_type(CollisionObjectType::Actor).is_err());
    assert!(object.set_object_type(CollisionObjectType::Physical).is_err());
    assert_eq!(system.create_collision_actor().object_type(), CollisionObjectType::Actor);
    assert_eq!(system.create_rigid_body().object_type(), CollisionObjectType::Physical);
}

#[test]
fn terrain_collider_replaces_the_list_and_rejects_others() {
    let system = CollisionSystem::new();
    let terrain: Arc<dyn TerrainSystem> = Arc::new(FlatTerrain);
    let mut object = system.create_collision_object();
    object
        .add_collider(system.create_collider_box(Vec3::ONE), Transform::IDENTITY)
        .expect("box");
    object
        .add_collider(system.create_collider_terrain(&terrain, -10.0, 10.0), Transform::IDENTITY)
        .expect("terrain");
    assert_eq!(object.object_type(), CollisionObjectType::Terrain);
    assert_eq!(object.collider_count(), 1);

    let result = object.add_collider(system.create_collider_sphere(1.0), Transform::IDENTITY);
    assert_eq!(result, Err(CollisionError::TerrainMixed));
    assert_eq!(object.collider_count(), 1);
}

#[test]
fn soft_bodies_take_no_colliders() {
    let system = CollisionSystem::new();
    let mut rope = system.create_soft_rope(Vec3::ZERO, Vec3::X, 4);
    let result = rope.add_collider(system.create_collider_sphere(1.0), Transform::IDENTITY);
    assert_eq!(result, Err(CollisionError::SoftBodyCollider));
}

#[test]
fn lifecycle_follows_the_sector() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let mut object = system.create_ghost_collision_object();
    object
        .add_collider(system.create_collider_sphere(1.0), Transform::IDENTITY)
        .expect("sphere");
    assert!(!object.is_in_world());
    assert!(object.is_dirty());

    let sector = system.sector_mut(sector_id).expect("sector");
    let handle = sector.add_collision_object(object).expect("added");
    assert_eq!(handle.sector, sector_id);
    assert!(sector.object(handle).is_some_and(|o| o.is_in_world()));
    assert_eq!(sector.object_count(), 1);

    let object = sector.remove_collision_object(handle).expect("removed");
    assert!(!object.is_in_world());
    assert!(object.handle().is_none());
    assert_eq!(sector.object_count(), 0);
    assert_eq!(sector.remove_collision_object(handle).err(), Some(CollisionError::InvalidHandle));
}

#[test]
fn attached_movable_follows_transform_and_scene_sector() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    let scene = Arc::new(Scene {
        movables: Mutex::new(0),
    });
    let node = Arc::new(Node {
        transform: Mutex::new(Transform::IDENTITY),
    });
    let movable: Arc<dyn Movable> = node.clone();

    let mut object = system.create_collision_object();
    object
        .add_collider(system.create_collider_box(Vec3::ONE), Transform::IDENTITY)
        .expect("box");
    object.set_attached_movable(Some(&movable));
    object.set_transform(Transform::from_position(Vec3::new(1.0, 2.0, 3.0)));
    assert_eq!(node.transform().position, Vec3::new(1.0, 2.0, 3.0));

    let sector = system.sector_mut(sector_id).expect("sector");
    let render: Arc<dyn SceneSector> = scene.clone();
    sector.set_sector(Some(render));
    let handle = sector.add_collision_object(object).expect("added");
    assert_eq!(*scene.movables.lock().expect("lock"), 1);
    sector.remove_collision_object(handle).expect("removed");
    assert_eq!(*scene.movables.lock().expect("lock"), 0);
}

#[test]
fn collision_group_is_resolved_by_name() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    system.create_group("props").expect("group");
    let mut object = system.create_collision_object();
    object
        .add_collider(system.create_collider_box(Vec3::ONE), Transform::IDENTITY)
        .expect("box");
    let sector = system.sector_mut(sector_id).expect("sector");
    let handle = sector.add_collision_object(object).expect("added");

    sector.set_collision_group(handle, "props").expect("known group");
    let props = system.find_group("props").expect("group").index;
    let sector = system.sector_mut(sector_id).expect("sector");
    assert_eq!(sector.object(handle).map(|o| o.collision_group()), Some(props));
    assert!(matches!(
        sector.set_collision_group(handle, "missing"),
        Err(CollisionError::UnknownGroup(_))
    ));
    assert_eq!(sector.object(handle).map(|o| o.collision_group()), Some(props));
}
