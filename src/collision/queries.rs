use glam::Vec3;

use crate::{
    collision::shapes::Shape,
    core::{mesh::Aabb, types::Transform},
    utils::math::ray_triangle,
};

/// Ray intersection with a single shape, in backend units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
    /// Nearest mesh vertex of the hit triangle, when the shape has indexed vertices.
    pub vertex_index: Option<usize>,
}

/// A ray with unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastQuery {
    pub origin: Vec3,
    pub direction: Vec3,
    pub max_distance: f32,
}

impl RaycastQuery {
    /// Segment from `from` to `to`; `None` when both ends coincide.
    pub fn segment(from: Vec3, to: Vec3) -> Option<Self> {
        let delta = to - from;
        let length = delta.length();
        (length > 1e-9).then(|| Self {
            origin: from,
            direction: delta / length,
            max_distance: length,
        })
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

pub struct Raycast;

impl Raycast {
    const MARCH_STEPS: usize = 64;
    const BISECTION_STEPS: usize = 24;

    /// First entry of the ray into `shape` posed at `pose`.
    pub fn cast_shape(query: &RaycastQuery, shape: &Shape, pose: &Transform) -> Option<RaycastHit> {
        match shape {
            Shape::Sphere { radius } => Self::ray_sphere(query, pose.position, *radius).map(|(point, distance)| {
                RaycastHit {
                    point,
                    normal: (point - pose.position).normalize_or(-query.direction),
                    distance,
                    vertex_index: None,
                }
            }),
            Shape::Box { half_extents } => {
                let local = Self::to_local(query, pose);
                Self::ray_aabb(&local, Vec3::ZERO, *half_extents).map(|(_, distance, normal)| RaycastHit {
                    point: query.at(distance),
                    normal: pose.transform_vector(normal),
                    distance,
                    vertex_index: None,
                })
            }
            Shape::Plane { plane } => {
                let plane = plane.transformed(pose);
                let denom = plane.normal.dot(query.direction);
                let start = plane.signed_distance(query.origin);
                if denom >= -1e-9 || start < 0.0 {
                    return None;
                }
                let distance = -start / denom;
                (distance <= query.max_distance).then(|| RaycastHit {
                    point: query.at(distance),
                    normal: plane.normal,
                    distance,
                    vertex_index: None,
                })
            }
            Shape::ConvexHull { mesh, scale, .. } | Shape::TriMesh { mesh, scale } => {
                let triangles = mesh.indices.iter().filter_map(|t| {
                    let ids = [t[0] as usize, t[1] as usize, t[2] as usize];
                    let corners = [
                        pose.transform_point(*mesh.vertices.get(ids[0])? * *scale),
                        pose.transform_point(*mesh.vertices.get(ids[1])? * *scale),
                        pose.transform_point(*mesh.vertices.get(ids[2])? * *scale),
                    ];
                    Some((corners, Some(ids)))
                });
                Self::ray_triangles(query, triangles)
            }
            Shape::Terrain { terrain, scale } => {
                let end = query.at(query.max_distance);
                let region = Aabb::from_points(&[
                    pose.inverse_transform_point(query.origin),
                    pose.inverse_transform_point(end),
                ]);
                let triangles = terrain
                    .triangles(&region, *scale)
                    .into_iter()
                    .map(|t| (t.map(|v| pose.transform_point(v)), None));
                Self::ray_triangles(query, triangles)
            }
            Shape::Capsule { .. } | Shape::Cylinder { .. } | Shape::Cone { .. } => Self::march(query, shape, pose),
        }
    }

    fn to_local(query: &RaycastQuery, pose: &Transform) -> RaycastQuery {
        RaycastQuery {
            origin: pose.inverse_transform_point(query.origin),
            direction: pose.rotation.conjugate() * query.direction,
            max_distance: query.max_distance,
        }
    }

    /// Nearest front or back face hit among `triangles`.
    pub fn ray_triangles(
        query: &RaycastQuery,
        triangles: impl Iterator<Item = ([Vec3; 3], Option<[usize; 3]>)>,
    ) -> Option<RaycastHit> {
        let mut best: Option<RaycastHit> = None;
        for ([a, b, c], ids) in triangles {
            let Some(t) = ray_triangle(query.origin, query.direction, a, b, c) else {
                continue;
            };
            if t > query.max_distance || best.is_some_and(|hit| hit.distance <= t) {
                continue;
            }
            let point = query.at(t);
            let mut normal = (b - a).cross(c - a).normalize_or_zero();
            if normal.dot(query.direction) > 0.0 {
                normal = -normal;
            }
            let vertex_index = ids.map(|ids| {
                let corners = [a, b, c];
                let nearest = (0..3)
                    .min_by(|&i, &j| {
                        corners[i]
                            .distance_squared(point)
                            .total_cmp(&corners[j].distance_squared(point))
                    })
                    .unwrap_or(0);
                ids[nearest]
            });
            best = Some(RaycastHit {
                point,
                normal,
                distance: t,
                vertex_index,
            });
        }
        best
    }

    pub fn ray_sphere(query: &RaycastQuery, center: Vec3, radius: f32) -> Option<(Vec3, f32)> {
        let oc = query.origin - center;
        let dir = query.direction;
        let b = oc.dot(dir);
        let c = oc.length_squared() - radius * radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let t = -b - discriminant.sqrt();
        if t < 0.0 || t > query.max_distance {
            return None;
        }
        Some((query.at(t), t))
    }

    fn ray_aabb(query: &RaycastQuery, center: Vec3, half_extents: Vec3) -> Option<(Vec3, f32, Vec3)> {
        let dir = query.direction;
        let mut t_min = 0.0;
        let mut t_max = query.max_distance;
        let mut normal = Vec3::ZERO;

        for i in 0..3 {
            let origin_component = query.origin[i];
            let dir_component = dir[i];
            let min = center[i] - half_extents[i];
            let max = center[i] + half_extents[i];

            if dir_component.abs() < 1e-6 {
                if origin_component < min || origin_component > max {
                    return None;
                }
            } else {
                let inv_dir = 1.0 / dir_component;
                let mut t1 = (min - origin_component) * inv_dir;
                let mut t2 = (max - origin_component) * inv_dir;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                if t1 > t_min {
                    t_min = t1;
                    normal = Vec3::ZERO;
                    normal[i] = -dir_component.signum();
                }
                t_max = t_max.min(t2);
                if t_min > t_max {
                    return None;
                }
            }
        }

        // Rays starting inside report no entry.
        if normal == Vec3::ZERO {
            return None;
        }
        Some((query.at(t_min), t_min, normal))
    }

    /// Fixed-step march through the shape bounds, refined by bisection.
    fn march(query: &RaycastQuery, shape: &Shape, pose: &Transform) -> Option<RaycastHit> {
        let local = Self::to_local(query, pose);
        let bounds = shape.local_aabb();
        let entry = bounds.ray_entry(local.origin, local.direction, local.max_distance)?;
        if shape.contains_local(local.origin) {
            return None;
        }
        let end = (entry + 2.0 * bounds.radius()).min(local.max_distance);
        let step = (end - entry) / Self::MARCH_STEPS as f32;

        let mut outside = entry;
        for i in 1..=Self::MARCH_STEPS {
            let t = entry + step * i as f32;
            if shape.contains_local(local.at(t)) {
                let mut inside = t;
                for _ in 0..Self::BISECTION_STEPS {
                    let mid = 0.5 * (outside + inside);
                    if shape.contains_local(local.at(mid)) {
                        inside = mid;
                    } else {
                        outside = mid;
                    }
                }
                let normal = pose.transform_vector(shape.normal_local(local.at(inside)));
                return Some(RaycastHit {
                    point: query.at(inside),
                    normal,
                    distance: inside,
                    vertex_index: None,
                });
            }
            outside = t;
        }
        None
    }
}
