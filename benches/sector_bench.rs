use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sector_physics::*;
use std::hint::black_box;

const DT: f32 = 1.0 / 60.0;

/// A floor with `count` spheres stacked in loose columns above it.
fn prepare_sector(count: usize) -> (CollisionSystem, SectorId) {
    let mut system = CollisionSystem::new();
    let id = system.create_sector();
    let mut floor = system.create_collision_object();
    floor
        .add_collider(system.create_collider_box(Vec3::new(200.0, 1.0, 200.0)), Transform::IDENTITY)
        .expect("floor collider");
    floor.set_transform(Transform::from_position(Vec3::new(0.0, -0.5, 0.0)));

    let mut bodies = Vec::with_capacity(count);
    for i in 0..count {
        let mut body = system.create_rigid_body();
        body.add_collider(system.create_collider_sphere(0.4), Transform::IDENTITY)
            .expect("sphere collider");
        let column = (i % 16) as f32;
        let row = (i / 16 % 16) as f32;
        let layer = (i / 256) as f32;
        body.set_transform(Transform::from_position(Vec3::new(column * 1.2, 1.0 + layer, row * 1.2)));
        bodies.push(body);
    }

    let sector = system.sector_mut(id).expect("sector");
    sector.add_collision_object(floor).expect("floor");
    for body in bodies {
        sector.add_collision_object(body).expect("body");
    }
    (system, id)
}

fn bench_sector_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("sector_step");
    for &count in &[64usize, 256, 1024] {
        group.bench_with_input(BenchmarkId::new("spheres", count), &count, |b, &count| {
            b.iter(|| {
                let (mut system, id) = prepare_sector(count);
                let sector = system.sector_mut(id).expect("sector");
                black_box(sector.step(black_box(DT)))
            })
        });
    }
    group.finish();
}

fn bench_hit_beam(c: &mut Criterion) {
    let (system, id) = prepare_sector(1024);
    let sector = system.sector(id).expect("sector");
    c.bench_function("hit_beam_through_columns", |b| {
        b.iter(|| {
            black_box(sector.hit_beam(
                black_box(Vec3::new(-5.0, 1.0, 6.0)),
                black_box(Vec3::new(30.0, 1.0, 6.0)),
            ))
        })
    });
}

fn bench_soft_cloth(c: &mut Criterion) {
    let mut group = c.benchmark_group("soft_cloth");
    for &resolution in &[8usize, 16, 32] {
        group.bench_with_input(BenchmarkId::new("step", resolution), &resolution, |b, &resolution| {
            let mut system = CollisionSystem::new();
            let id = system.create_sector();
            let corners = [
                Vec3::new(-2.0, 4.0, -2.0),
                Vec3::new(2.0, 4.0, -2.0),
                Vec3::new(-2.0, 4.0, 2.0),
                Vec3::new(2.0, 4.0, 2.0),
            ];
            let cloth = system.create_soft_cloth(corners, resolution, resolution, true);
            system.sector_mut(id).expect("sector").add_collision_object(cloth).expect("cloth");
            b.iter(|| {
                let sector = system.sector_mut(id).expect("sector");
                black_box(sector.step(black_box(DT)))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sector_step, bench_hit_beam, bench_soft_cloth);
criterion_main!(benches);
