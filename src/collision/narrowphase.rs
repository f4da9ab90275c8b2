//! Exact contact generation between posed backend shapes.
//!
//! Everything here works in backend units. Contact normals point from the
//! first shape towards the second.

use std::sync::Arc;

use glam::Vec3;

use crate::{
    collision::{contact::Contact, shapes::Shape},
    core::{
        mesh::Aabb,
        types::{Plane, Transform},
    },
    utils::math::closest_point_on_triangle,
};

/// Convex set described by its support function.
pub trait SupportMap {
    fn support(&self, direction: Vec3) -> Vec3;
    fn center(&self) -> Vec3;
}

/// A shape placed in the world.
#[derive(Debug, Clone, Copy)]
pub struct PosedShape<'a> {
    pub shape: &'a Shape,
    pub pose: Transform,
}

impl SupportMap for PosedShape<'_> {
    fn support(&self, direction: Vec3) -> Vec3 {
        self.shape.support_world(&self.pose, direction)
    }

    fn center(&self) -> Vec3 {
        self.pose.position
    }
}

/// World-space triangle of a concave shape.
#[derive(Debug, Clone, Copy)]
pub struct Triangle(pub [Vec3; 3]);

impl Triangle {
    pub fn normal(&self) -> Vec3 {
        let [a, b, c] = self.0;
        (b - a).cross(c - a).normalize_or_zero()
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(&self.0)
    }

    /// True when `p` projects inside the triangle.
    fn contains_projection(&self, p: Vec3) -> bool {
        let [a, b, c] = self.0;
        let n = (b - a).cross(c - a);
        [(a, b), (b, c), (c, a)]
            .iter()
            .all(|(u, v)| (*v - *u).cross(p - *u).dot(n) >= -1e-6)
    }
}

impl SupportMap for Triangle {
    fn support(&self, direction: Vec3) -> Vec3 {
        let [a, b, c] = self.0;
        let (da, db, dc) = (a.dot(direction), b.dot(direction), c.dot(direction));
        if da >= db && da >= dc {
            a
        } else if db >= dc {
            b
        } else {
            c
        }
    }

    fn center(&self) -> Vec3 {
        (self.0[0] + self.0[1] + self.0[2]) / 3.0
    }
}

/// Gilbert-Johnson-Keerthi intersection test with EPA penetration depth.
pub struct GjkAlgorithm;

impl GjkAlgorithm {
    const MAX_ITERATIONS: usize = 32;
    const EPSILON: f32 = 1e-6;

    fn minkowski(a: &dyn SupportMap, b: &dyn SupportMap, direction: Vec3) -> Vec3 {
        a.support(direction) - b.support(-direction)
    }

    /// Returns the terminating simplex when the sets overlap.
    fn run(a: &dyn SupportMap, b: &dyn SupportMap) -> Option<Vec<Vec3>> {
        let mut simplex: Vec<Vec3> = Vec::with_capacity(4);
        let mut direction = b.center() - a.center();
        if direction.length_squared() < Self::EPSILON {
            direction = Vec3::X;
        }

        for _ in 0..Self::MAX_ITERATIONS {
            let point = Self::minkowski(a, b, direction);
            if point.dot(direction) < 0.0 {
                return None;
            }
            simplex.push(point);
            if Self::contains_origin(&mut simplex, &mut direction) {
                return Some(simplex);
            }
            if direction.length_squared() < Self::EPSILON * Self::EPSILON {
                // Origin lies on the simplex boundary.
                return Some(simplex);
            }
        }
        None
    }

    pub fn overlaps(a: &dyn SupportMap, b: &dyn SupportMap) -> bool {
        Self::run(a, b).is_some()
    }

    pub fn intersect(a: &dyn SupportMap, b: &dyn SupportMap) -> Option<Contact> {
        let simplex = Self::run(a, b)?;
        let (depth, mut normal) = EpaAlgorithm::compute_penetration(&simplex, a, b);

        let relative = b.center() - a.center();
        if normal.dot(relative) < 0.0 {
            normal = -normal;
        }
        // Touching contacts can leave EPA with a sideways face; prefer the center axis.
        let center_distance_sq = relative.length_squared();
        if center_distance_sq > Self::EPSILON {
            let center_dir = relative / center_distance_sq.sqrt();
            if normal.dot(center_dir) < 0.5 && depth < 0.01 {
                normal = center_dir;
            }
        }

        // Anchor the point on whichever side touches with the narrower feature.
        let (feature_a, spread_a) = Self::feature_center(a, normal);
        let (feature_b, spread_b) = Self::feature_center(b, -normal);
        let point = if spread_a <= spread_b {
            feature_a - normal * depth * 0.5
        } else {
            feature_b + normal * depth * 0.5
        };
        Some(Contact::new(point, normal, depth))
    }

    /// Mean of the support points around `direction` and how far they scatter.
    ///
    /// Rounded surfaces scatter little; faces and edges scatter across their extent.
    fn feature_center(shape: &dyn SupportMap, direction: Vec3) -> (Vec3, f32) {
        const TILT: f32 = 0.2;
        let tangent = direction.any_orthogonal_vector().normalize_or_zero();
        let bitangent = direction.cross(tangent).normalize_or_zero();
        let samples = [
            direction,
            direction + tangent * TILT,
            direction - tangent * TILT,
            direction + bitangent * TILT,
            direction - bitangent * TILT,
        ]
        .map(|d| shape.support(d));
        let center = samples.iter().copied().sum::<Vec3>() / samples.len() as f32;
        let spread = samples.iter().map(|p| p.distance(center)).fold(0.0, f32::max);
        (center, spread)
    }

    fn contains_origin(simplex: &mut Vec<Vec3>, direction: &mut Vec3) -> bool {
        match simplex.len() {
            1 => {
                *direction = -simplex[0];
                false
            }
            2 => {
                let a = simplex[1];
                let b = simplex[0];
                let ab = b - a;
                let ao = -a;
                let dir = ab.cross(ao).cross(ab);
                if dir.length_squared() < Self::EPSILON {
                    let axis = if ab.x.abs() < 0.1 { Vec3::X } else { Vec3::Y };
                    *direction = ab.cross(axis);
                } else {
                    *direction = dir;
                }
                false
            }
            3 => {
                let a = simplex[2];
                let b = simplex[1];
                let c = simplex[0];
                let ab = b - a;
                let ac = c - a;
                let ao = -a;
                let abc = ab.cross(ac);

                if abc.cross(ac).dot(ao) > 0.0 {
                    simplex.remove(1);
                    *direction = ac.cross(ao).cross(ac);
                } else if ab.cross(abc).dot(ao) > 0.0 {
                    simplex.remove(0);
                    *direction = ab.cross(ao).cross(ab);
                } else if abc.length_squared() < Self::EPSILON {
                    *direction = Vec3::Y;
                } else if abc.dot(ao) > 0.0 {
                    *direction = abc;
                } else {
                    simplex.swap(0, 1);
                    *direction = -abc;
                }
                false
            }
            4 => {
                let a = simplex[3];
                let b = simplex[2];
                let c = simplex[1];
                let d = simplex[0];
                let ab = b - a;
                let ac = c - a;
                let ad = d - a;
                let ao = -a;
                let abc = ab.cross(ac);
                let acd = ac.cross(ad);
                let adb = ad.cross(ab);

                if abc.dot(ao) > 0.0 {
                    simplex.remove(0);
                    *direction = abc;
                    false
                } else if acd.dot(ao) > 0.0 {
                    simplex.remove(2);
                    *direction = acd;
                    false
                } else if adb.dot(ao) > 0.0 {
                    simplex.remove(1);
                    *direction = adb;
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }
}

/// Expanding Polytope Algorithm for the penetration depth of an overlapping pair.
struct EpaAlgorithm;

impl EpaAlgorithm {
    const MAX_ITERATIONS: usize = 64;
    const EPSILON: f32 = 1e-6;
    /// Support gain below which the closest face is accepted, backend units.
    const TOLERANCE: f32 = 1e-4;

    const SEARCH_DIRECTIONS: [Vec3; 6] = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];

    fn fallback(a: &dyn SupportMap, b: &dyn SupportMap) -> (f32, Vec3) {
        let normal = (b.center() - a.center()).normalize_or(Vec3::X);
        let depth = (a.support(normal) - b.support(-normal)).dot(normal).max(0.0);
        (depth, normal)
    }

    fn compute_penetration(simplex: &[Vec3], a: &dyn SupportMap, b: &dyn SupportMap) -> (f32, Vec3) {
        let Some(mut polytope) = Self::complete_simplex(simplex, a, b) else {
            return Self::fallback(a, b);
        };
        let mut faces = Self::build_initial_faces(&polytope);

        for _ in 0..Self::MAX_ITERATIONS {
            let Some((min_dist, normal)) = Self::find_closest_face(&polytope, &faces) else {
                return Self::fallback(a, b);
            };
            // A face through the origin still has an outward normal to expand along.
            let support = GjkAlgorithm::minkowski(a, b, normal);
            if support.dot(normal) - min_dist < Self::TOLERANCE {
                return (min_dist.max(0.0), normal);
            }
            if polytope.iter().any(|p| p.distance_squared(support) < Self::EPSILON) {
                return (min_dist.max(0.0), normal);
            }
            Self::expand_polytope(&mut polytope, &mut faces, support);
        }

        match Self::find_closest_face(&polytope, &faces) {
            Some((depth, normal)) => (depth.max(0.0), normal),
            None => Self::fallback(a, b),
        }
    }

    /// Grows a GJK simplex that ended on the origin into a full tetrahedron.
    fn complete_simplex(simplex: &[Vec3], a: &dyn SupportMap, b: &dyn SupportMap) -> Option<Vec<Vec3>> {
        let mut points: Vec<Vec3> = Vec::with_capacity(4);
        for &p in simplex {
            if Self::is_independent(&points, p) {
                points.push(p);
            }
        }
        while points.len() < 4 {
            let mut directions: Vec<Vec3> = match points.as_slice() {
                [p, q] => {
                    let edge = *q - *p;
                    let side = edge.any_orthogonal_vector().normalize_or_zero();
                    let other = edge.cross(side).normalize_or_zero();
                    vec![side, -side, other, -other]
                }
                [p, q, r] => {
                    let normal = (*q - *p).cross(*r - *p).normalize_or_zero();
                    vec![normal, -normal]
                }
                _ => Vec::new(),
            };
            directions.extend(Self::SEARCH_DIRECTIONS);
            let next = directions
                .into_iter()
                .filter(|d| *d != Vec3::ZERO)
                .map(|d| GjkAlgorithm::minkowski(a, b, d))
                .find(|p| Self::is_independent(&points, *p))?;
            points.push(next);
        }
        Some(points)
    }

    fn is_independent(points: &[Vec3], p: Vec3) -> bool {
        match points {
            [] => true,
            [a] => a.distance_squared(p) > Self::EPSILON,
            [a, b] => (*b - *a).cross(p - *a).length_squared() > Self::EPSILON,
            [a, b, c] => (*b - *a).cross(*c - *a).dot(p - *a).abs() > Self::EPSILON,
            _ => false,
        }
    }

    /// Tetrahedron faces wound so their normals point away from its centroid.
    fn build_initial_faces(polytope: &[Vec3]) -> Vec<(usize, usize, usize)> {
        let centroid = polytope.iter().copied().sum::<Vec3>() / polytope.len() as f32;
        let mut faces = vec![(0, 1, 2), (0, 2, 3), (0, 3, 1), (1, 3, 2)];
        for face in &mut faces {
            let ab = polytope[face.1] - polytope[face.0];
            let ac = polytope[face.2] - polytope[face.0];
            if (polytope[face.0] - centroid).dot(ab.cross(ac)) < 0.0 {
                std::mem::swap(&mut face.1, &mut face.2);
            }
        }
        faces
    }

    fn find_closest_face(polytope: &[Vec3], faces: &[(usize, usize, usize)]) -> Option<(f32, Vec3)> {
        faces
            .iter()
            .filter_map(|&(a, b, c)| {
                let normal = (polytope[b] - polytope[a])
                    .cross(polytope[c] - polytope[a])
                    .normalize_or_zero();
                (normal != Vec3::ZERO).then(|| (polytope[a].dot(normal), normal))
            })
            .min_by(|x, y| x.0.total_cmp(&y.0))
    }

    fn expand_polytope(polytope: &mut Vec<Vec3>, faces: &mut Vec<(usize, usize, usize)>, support: Vec3) {
        let new_index = polytope.len();
        polytope.push(support);

        let mut edges = Vec::new();
        let mut i = 0;
        while i < faces.len() {
            let (a, b, c) = faces[i];
            let normal = (polytope[b] - polytope[a])
                .cross(polytope[c] - polytope[a])
                .normalize_or_zero();
            if normal.dot(support - polytope[a]) > 0.0 {
                edges.extend([(a, b), (b, c), (c, a)]);
                faces.swap_remove(i);
            } else {
                i += 1;
            }
        }

        let mut boundary: Vec<(usize, usize)> = Vec::new();
        for (u, v) in edges {
            if let Some(j) = boundary.iter().position(|&e| e == (v, u)) {
                boundary.remove(j);
            } else {
                boundary.push((u, v));
            }
        }
        faces.extend(boundary.into_iter().map(|(u, v)| (u, v, new_index)));
    }
}

/// Separating axis test for oriented boxes.
pub struct SatAlgorithm;

impl SatAlgorithm {
    /// Minimum overlap axis (oriented from A to B) and its depth.
    pub fn box_box_axis(
        half_a: Vec3,
        pose_a: &Transform,
        half_b: Vec3,
        pose_b: &Transform,
    ) -> Option<(Vec3, f32)> {
        let relative = pose_b.position - pose_a.position;
        let axes_a = [pose_a.rotation * Vec3::X, pose_a.rotation * Vec3::Y, pose_a.rotation * Vec3::Z];
        let axes_b = [pose_b.rotation * Vec3::X, pose_b.rotation * Vec3::Y, pose_b.rotation * Vec3::Z];

        let mut test_axes = Vec::with_capacity(15);
        test_axes.extend_from_slice(&axes_a);
        test_axes.extend_from_slice(&axes_b);
        for axis_a in &axes_a {
            for axis_b in &axes_b {
                let axis = axis_a.cross(*axis_b);
                if axis.length_squared() > 1e-6 {
                    test_axes.push(axis.normalize());
                }
            }
        }

        let mut min_overlap = f32::MAX;
        let mut min_axis = Vec3::ZERO;
        for axis in test_axes {
            let extent_a = axes_a[0].dot(axis).abs() * half_a.x
                + axes_a[1].dot(axis).abs() * half_a.y
                + axes_a[2].dot(axis).abs() * half_a.z;
            let extent_b = axes_b[0].dot(axis).abs() * half_b.x
                + axes_b[1].dot(axis).abs() * half_b.y
                + axes_b[2].dot(axis).abs() * half_b.z;
            let projection = relative.dot(axis);
            let overlap = extent_a + extent_b - projection.abs();
            if overlap <= 0.0 {
                return None;
            }
            // Face axes win ties so resting boxes keep a stable normal.
            if overlap < min_overlap - 1e-5 {
                min_overlap = overlap;
                min_axis = if projection < 0.0 { -axis } else { axis };
            }
        }
        Some((min_axis, min_overlap))
    }

    /// Box-box manifold: the corners of each box lying inside the other.
    pub fn box_box(half_a: Vec3, pose_a: &Transform, half_b: Vec3, pose_b: &Transform) -> Vec<Contact> {
        let Some((normal, depth)) = Self::box_box_axis(half_a, pose_a, half_b, pose_b) else {
            return Vec::new();
        };
        let shape_a = Shape::Box { half_extents: half_a };
        let shape_b = Shape::Box { half_extents: half_b };
        let face_a = shape_a.support_world(pose_a, normal).dot(normal);
        let face_b = shape_b.support_world(pose_b, -normal).dot(normal);
        let tolerance = 1e-3 + depth * 0.1;

        let mut contacts = Vec::new();
        for corner in box_corners(half_b, pose_b) {
            let local = pose_a.inverse_transform_point(corner);
            if local.abs().cmple(half_a + Vec3::splat(tolerance)).all() {
                let d = face_a - corner.dot(normal);
                if d > 0.0 {
                    contacts.push(Contact::new(corner + normal * d * 0.5, normal, d));
                }
            }
        }
        for corner in box_corners(half_a, pose_a) {
            let local = pose_b.inverse_transform_point(corner);
            if local.abs().cmple(half_b + Vec3::splat(tolerance)).all() {
                let d = corner.dot(normal) - face_b;
                if d > 0.0 {
                    contacts.push(Contact::new(corner - normal * d * 0.5, normal, d));
                }
            }
        }
        if contacts.is_empty() {
            let point = (shape_a.support_world(pose_a, normal) + shape_b.support_world(pose_b, -normal)) * 0.5;
            contacts.push(Contact::new(point, normal, depth));
        }
        contacts
    }
}

fn box_corners(half: Vec3, pose: &Transform) -> [Vec3; 8] {
    let mut corners = [Vec3::ZERO; 8];
    for (i, corner) in corners.iter_mut().enumerate() {
        let sign = Vec3::new(
            if i & 1 == 0 { -1.0 } else { 1.0 },
            if i & 2 == 0 { -1.0 } else { 1.0 },
            if i & 4 == 0 { -1.0 } else { 1.0 },
        );
        *corner = pose.transform_point(half * sign);
    }
    corners
}

/// Candidate surface points used against planes and triangles.
fn feature_points(shape: &Shape, pose: &Transform, direction: Vec3) -> Vec<Vec3> {
    match shape {
        Shape::Box { half_extents } => box_corners(*half_extents, pose).to_vec(),
        Shape::ConvexHull { mesh, scale, margin } => mesh
            .vertices
            .iter()
            .map(|v| pose.transform_point(*v * *scale) + direction.normalize_or_zero() * *margin)
            .collect(),
        Shape::Cylinder { radius, half_height } => {
            // Rim samples give resting cylinders a stable footprint.
            let mut points = vec![shape.support_world(pose, direction)];
            for y in [-half_height, *half_height] {
                for k in 0..8 {
                    let angle = k as f32 * std::f32::consts::FRAC_PI_4;
                    let local = Vec3::new(angle.cos() * radius, y, angle.sin() * radius);
                    points.push(pose.transform_point(local));
                }
            }
            points
        }
        _ => vec![shape.support_world(pose, direction)],
    }
}

/// Contact generation between posed shapes.
pub struct NarrowPhase;

impl NarrowPhase {
    pub fn shape_contacts(a: &Shape, pose_a: &Transform, b: &Shape, pose_b: &Transform) -> Vec<Contact> {
        match (a, b) {
            (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) => {
                Self::sphere_sphere(pose_a.position, *ra, pose_b.position, *rb)
                    .into_iter()
                    .collect()
            }
            (Shape::Box { half_extents: ha }, Shape::Box { half_extents: hb }) => {
                SatAlgorithm::box_box(*ha, pose_a, *hb, pose_b)
            }
            (Shape::Box { half_extents }, Shape::Sphere { radius }) => {
                Self::box_sphere(*half_extents, pose_a, pose_b.position, *radius)
                    .into_iter()
                    .collect()
            }
            (Shape::Sphere { radius }, Shape::Box { half_extents }) => {
                Self::box_sphere(*half_extents, pose_b, pose_a.position, *radius)
                    .map(|c| c.flipped())
                    .into_iter()
                    .collect()
            }
            (Shape::Plane { plane }, other) if other.is_convex() => {
                Self::plane_convex(plane, pose_a, other, pose_b)
            }
            (other, Shape::Plane { plane }) if other.is_convex() => flip_all(Self::plane_convex(plane, pose_b, other, pose_a)),
            (concave, other) if !concave.is_convex() && other.is_convex() => {
                Self::concave_convex(concave, pose_a, other, pose_b)
            }
            (other, concave) if other.is_convex() && !concave.is_convex() => {
                flip_all(Self::concave_convex(concave, pose_b, other, pose_a))
            }
            (sa, sb) if sa.is_convex() && sb.is_convex() => GjkAlgorithm::intersect(
                &PosedShape { shape: sa, pose: *pose_a },
                &PosedShape { shape: sb, pose: *pose_b },
            )
            .into_iter()
            .collect(),
            // Two static-only shapes never collide.
            _ => Vec::new(),
        }
    }

    /// Contacts between every child pair of two compound objects.
    pub fn compound_contacts(
        shapes_a: &[(Arc<Shape>, Transform)],
        pose_a: &Transform,
        shapes_b: &[(Arc<Shape>, Transform)],
        pose_b: &Transform,
    ) -> Vec<Contact> {
        let mut contacts = Vec::new();
        for (shape_a, relative_a) in shapes_a {
            let child_a = pose_a.combine(relative_a);
            let bounds_a = shape_a.local_aabb().transformed(&child_a);
            for (shape_b, relative_b) in shapes_b {
                let child_b = pose_b.combine(relative_b);
                let bounds_b = shape_b.local_aabb().transformed(&child_b);
                if !bounds_a.overlaps(&bounds_b) {
                    continue;
                }
                contacts.extend(Self::shape_contacts(shape_a, &child_a, shape_b, &child_b));
            }
        }
        contacts
    }

    pub fn sphere_sphere(center_a: Vec3, radius_a: f32, center_b: Vec3, radius_b: f32) -> Option<Contact> {
        let delta = center_b - center_a;
        let distance = delta.length();
        let depth = radius_a + radius_b - distance;
        if depth <= 0.0 {
            return None;
        }
        let normal = if distance > 1e-6 { delta / distance } else { Vec3::Y };
        let point = center_a + normal * (radius_a - depth * 0.5);
        Some(Contact::new(point, normal, depth))
    }

    /// Box as A, sphere as B.
    pub fn box_sphere(half: Vec3, pose: &Transform, center: Vec3, radius: f32) -> Option<Contact> {
        let local = pose.inverse_transform_point(center);
        let clamped = local.clamp(-half, half);
        let (surface, normal_local, depth) = if clamped != local {
            let delta = local - clamped;
            let distance = delta.length();
            if distance >= radius {
                return None;
            }
            (clamped, delta / distance, radius - distance)
        } else {
            // Center inside the box: push out through the nearest face.
            let gap = half - local.abs();
            let axis = if gap.x <= gap.y && gap.x <= gap.z {
                0
            } else if gap.y <= gap.z {
                1
            } else {
                2
            };
            let sign = if local[axis] < 0.0 { -1.0 } else { 1.0 };
            let mut normal = Vec3::ZERO;
            normal[axis] = sign;
            let mut surface = local;
            surface[axis] = half[axis] * sign;
            (surface, normal, gap[axis] + radius)
        };
        let normal = pose.rotation * normal_local;
        let point = pose.transform_point(surface) - normal * depth * 0.5;
        Some(Contact::new(point, normal, depth))
    }

    /// Plane as A, convex shape as B.
    fn plane_convex(plane: &Plane, plane_pose: &Transform, shape: &Shape, pose: &Transform) -> Vec<Contact> {
        let plane = plane.transformed(plane_pose);
        let n = plane.normal;
        feature_points(shape, pose, -n)
            .into_iter()
            .filter_map(|p| {
                let distance = plane.signed_distance(p);
                (distance < 0.0).then(|| Contact::new(p - n * distance * 0.5, n, -distance))
            })
            .collect()
    }

    /// Concave shape (mesh or terrain) as A, convex shape as B.
    fn concave_convex(concave: &Shape, concave_pose: &Transform, shape: &Shape, pose: &Transform) -> Vec<Contact> {
        let bounds = shape.local_aabb().transformed(pose).expanded(1e-3);
        let triangles = Self::triangles_near(concave, concave_pose, &bounds);
        let convex = PosedShape { shape, pose: *pose };
        let mut contacts = Vec::new();
        for triangle in triangles {
            if let Shape::Sphere { radius } = shape {
                contacts.extend(Self::sphere_triangle(pose.position, *radius, &triangle));
                continue;
            }
            let mut n = triangle.normal();
            if n == Vec3::ZERO {
                continue;
            }
            let a = triangle.0[0];
            if n.dot(pose.position - a) < 0.0 {
                n = -n;
            }
            if !GjkAlgorithm::overlaps(&triangle, &convex) {
                continue;
            }
            let before = contacts.len();
            for p in feature_points(shape, pose, -n) {
                let depth = n.dot(a - p);
                if depth > 0.0 && triangle.contains_projection(p) {
                    contacts.push(Contact::new(p + n * depth * 0.5, n, depth));
                }
            }
            if contacts.len() == before {
                let deepest = shape.support_world(pose, -n);
                let depth = n.dot(a - deepest);
                if depth > 0.0 {
                    contacts.push(Contact::new(deepest + n * depth * 0.5, n, depth));
                }
            }
        }
        contacts
    }

    fn sphere_triangle(center: Vec3, radius: f32, triangle: &Triangle) -> Option<Contact> {
        let [a, b, c] = triangle.0;
        let closest = closest_point_on_triangle(center, a, b, c);
        let delta = center - closest;
        let distance = delta.length();
        if distance >= radius {
            return None;
        }
        let normal = if distance > 1e-6 {
            delta / distance
        } else {
            triangle.normal()
        };
        let depth = radius - distance;
        Some(Contact::new(closest - normal * depth * 0.5, normal, depth))
    }

    /// World triangles of a concave shape overlapping `region`.
    pub fn triangles_near(concave: &Shape, pose: &Transform, region: &Aabb) -> Vec<Triangle> {
        match concave {
            Shape::TriMesh { mesh, scale } => mesh
                .triangles()
                .map(|t| Triangle(t.map(|v| pose.transform_point(v * *scale))))
                .filter(|t| t.bounds().overlaps(region))
                .collect(),
            Shape::Terrain { terrain, scale } => {
                let local_region = region.transformed(&pose.inverse());
                terrain
                    .triangles(&local_region, *scale)
                    .into_iter()
                    .map(|t| Triangle(t.map(|v| pose.transform_point(v))))
                    .filter(|t| t.bounds().overlaps(region))
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// Penetration of a small sphere at `point` into a posed shape, normal pointing out of the shape.
    pub fn point_contact(shape: &Shape, pose: &Transform, point: Vec3, radius: f32) -> Option<Contact> {
        let bead = Shape::Sphere { radius };
        let bead_pose = Transform::from_position(point);
        Self::shape_contacts(shape, pose, &bead, &bead_pose)
            .into_iter()
            .max_by(|x, y| x.depth.total_cmp(&y.depth))
    }
}

fn flip_all(contacts: Vec<Contact>) -> Vec<Contact> {
    contacts.into_iter().map(|c| c.flipped()).collect()
}
