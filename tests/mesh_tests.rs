use std::sync::Arc;

use approx::assert_relative_eq;
use sector_physics::*;

fn grid(resolution: usize) -> (Vec<Vec3>, Vec<[u32; 3]>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    for z in 0..=resolution {
        for x in 0..=resolution {
            vertices.push(Vec3::new(x as f32, 0.0, z as f32));
        }
    }
    let width = resolution + 1;
    for z in 0..resolution {
        for x in 0..resolution {
            let i = (z * width + x) as u32;
            let w = width as u32;
            indices.push([i, i + w, i + 1]);
            indices.push([i + 1, i + w, i + w + 1]);
        }
    }
    (vertices, indices)
}

#[test]
fn welded_duplicates_keep_the_surface() {
    let (mut vertices, mut indices) = grid(2);
    let base = vertices.len() as u32;
    vertices.extend([Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0)]);
    indices.push([base, base + 2, base + 1]);

    let mesh = TriangleMesh::builder(vertices, indices).weld_vertices(1e-3).build();
    assert_eq!(mesh.vertex_count(), 9);
    assert_eq!(mesh.triangle_count(), 9);
}

#[test]
fn recentered_mesh_is_centered_on_the_origin() {
    let (vertices, indices) = grid(4);
    let mesh = TriangleMesh::builder(vertices, indices).recenter().build();
    assert_relative_eq!(mesh.bounds.center().x, 0.0, epsilon = 1e-5);
    assert_relative_eq!(mesh.bounds.center().z, 0.0, epsilon = 1e-5);
}

#[test]
fn concave_ground_stops_a_falling_body() {
    let mut system = CollisionSystem::new();
    let id = system.create_sector();
    let (vertices, indices) = grid(8);
    let mesh = Arc::new(TriangleMesh::builder(vertices, indices).recenter().build());

    let mut ground = system.create_collision_object();
    ground
        .add_collider(system.create_collider_concave_mesh(mesh), Transform::IDENTITY)
        .expect("mesh collider");
    let mut ball = system.create_rigid_body();
    ball.add_collider(system.create_collider_sphere(0.5), Transform::IDENTITY)
        .expect("sphere");
    ball.set_transform(Transform::from_position(Vec3::new(0.3, 2.0, 0.3)));

    let sector = system.sector_mut(id).expect("sector");
    sector.add_collision_object(ground).expect("ground");
    let ball = sector.add_collision_object(ball).expect("ball");
    for _ in 0..180 {
        sector.step(1.0 / 60.0);
    }
    let y = sector.object(ball).expect("ball").transform().position.y;
    assert!(y > 0.3 && y < 0.7, "ball settled at {y}");
}
