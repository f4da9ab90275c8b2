use std::sync::Arc;

use sector_physics::*;

#[test]
fn disabling_any_pair_is_symmetric() {
    let system = CollisionSystem::new();
    for name in ["Water", "Props", "Projectiles"] {
        system.create_group(name).expect("room for a group");
    }
    let names: Vec<String> = {
        let table = system.group_table();
        let table = table.read();
        (0..table.len() as u8)
            .filter_map(|index| table.get(index).map(|g| g.name.clone()))
            .collect()
    };
    for a in &names {
        for b in &names {
            system.set_group_collision(a, b, false).expect("known groups");
            assert_eq!(system.group_collision(a, b), Ok(false), "{a} / {b}");
            assert_eq!(system.group_collision(b, a), Ok(false), "{b} / {a}");
            system.set_group_collision(a, b, true).expect("known groups");
            assert_eq!(system.group_collision(b, a), Ok(true), "{b} / {a}");
        }
    }
}

#[test]
fn unknown_group_names_are_reported() {
    let system = CollisionSystem::new();
    assert!(matches!(
        system.set_group_collision("Default", "Nope", false),
        Err(CollisionError::UnknownGroup(name)) if name == "Nope"
    ));
    assert!(system.find_group("Nope").is_none());
}

#[test]
fn filtered_groups_do_not_collide_in_a_sector() {
    let mut system = CollisionSystem::new();
    let sector_id = system.create_sector();
    system.create_group("A").expect("group");
    system.create_group("B").expect("group");
    system.set_group_collision("A", "B", false).expect("known groups");

    let shape = system.create_collider_box(Vec3::ONE);
    let mut handles = Vec::new();
    for x in [0.0, 0.5] {
        let mut object = system.create_collision_object();
        object.add_collider(Arc::clone(&shape), Transform::IDENTITY).expect("box");
        object.set_transform(Transform::from_position(Vec3::new(x, 0.0, 0.0)));
        handles.push(
            system
                .sector_mut(sector_id)
                .expect("sector")
                .add_collision_object(object)
                .expect("added"),
        );
    }
    let sector = system.sector_mut(sector_id).expect("sector");
    sector.set_collision_group(handles[0], "A").expect("group A");
    sector.set_collision_group(handles[1], "B").expect("group B");

    let mut points = Vec::new();
    assert_eq!(sector.collision_test(handles[0], &mut points), Ok(false));
    assert!(points.is_empty());
    assert_eq!(sector.collide(handles[0], handles[1]), Ok(false));

    sector.set_collision_group(handles[1], "A").expect("group A");
    assert_eq!(sector.collision_test(handles[0], &mut points), Ok(true));
    assert!(!points.is_empty());
}
