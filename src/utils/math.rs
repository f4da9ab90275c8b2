//! Additional math helpers layered on top of `glam`.

use glam::{Mat3, Quat, Vec3};

/// Converts angular velocity vector (radians/sec) into a quaternion delta.
pub fn angular_velocity_to_quat(angular: Vec3, dt: f32) -> Quat {
    let angle = angular.length() * dt;
    if angle.abs() < 1e-6 {
        return Quat::IDENTITY;
    }
    let axis = angular.normalize();
    Quat::from_axis_angle(axis, angle)
}

/// Rotation vector (axis * angle) of a quaternion, with the angle wrapped to [-PI, PI].
pub fn quat_to_rotation_vector(q: Quat) -> Vec3 {
    let (axis, angle) = q.to_axis_angle();
    let angle = if angle > std::f32::consts::PI {
        angle - 2.0 * std::f32::consts::PI
    } else {
        angle
    };
    axis * angle
}

/// Cross-product matrix such that `skew(r) * v == r.cross(v)`.
pub fn skew(r: Vec3) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(0.0, r.z, -r.y),
        Vec3::new(-r.z, 0.0, r.x),
        Vec3::new(r.y, -r.x, 0.0),
    )
}

/// Rotates a body-space inertia tensor into world space.
pub fn world_inertia(rotation: Quat, local: Mat3) -> Mat3 {
    let r = Mat3::from_quat(rotation);
    r * local * r.transpose()
}

/// Builds an inertia tensor for a solid capsule aligned along Y.
pub fn inertia_capsule(radius: f32, height: f32, mass: f32) -> Mat3 {
    let cylinder_mass = mass * 0.6;
    let sphere_mass = (mass - cylinder_mass) / 2.0;

    let cylinder_inertia = Mat3::from_diagonal(Vec3::new(
        (1.0 / 12.0) * cylinder_mass * (3.0 * radius * radius + height * height),
        0.5 * cylinder_mass * radius * radius,
        (1.0 / 12.0) * cylinder_mass * (3.0 * radius * radius + height * height),
    ));

    let sphere_inertia = Mat3::from_diagonal(Vec3::splat(0.4 * sphere_mass * radius * radius));

    cylinder_inertia + sphere_inertia
}

/// Solid cylinder aligned along Y.
pub fn inertia_cylinder(radius: f32, height: f32, mass: f32) -> Mat3 {
    let lateral = (1.0 / 12.0) * mass * (3.0 * radius * radius + height * height);
    Mat3::from_diagonal(Vec3::new(lateral, 0.5 * mass * radius * radius, lateral))
}

/// Solid cone aligned along Y, about its centroid.
pub fn inertia_cone(radius: f32, height: f32, mass: f32) -> Mat3 {
    let axial = 0.3 * mass * radius * radius;
    let lateral = mass * (0.15 * radius * radius + 0.0375 * height * height);
    Mat3::from_diagonal(Vec3::new(lateral, axial, lateral))
}

/// Closest point to `p` on triangle `(a, b, c)`.
pub fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// Möller–Trumbore ray/triangle test returning the ray parameter.
pub fn ray_triangle(origin: Vec3, dir: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    let e1 = b - a;
    let e2 = c - a;
    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < 1e-9 {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv_det;
    (t >= 0.0).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn closest_point_projects_onto_face_interior() {
        let p = closest_point_on_triangle(
            Vec3::new(0.25, 1.0, 0.25),
            Vec3::ZERO,
            Vec3::X,
            Vec3::Z,
        );
        assert_relative_eq!(p.x, 0.25, epsilon = 1e-6);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(p.z, 0.25, epsilon = 1e-6);
    }

    #[test]
    fn ray_triangle_reports_distance() {
        let t = ray_triangle(
            Vec3::new(0.2, 2.0, 0.2),
            Vec3::NEG_Y,
            Vec3::ZERO,
            Vec3::X,
            Vec3::Z,
        )
        .expect("ray points at triangle");
        assert_relative_eq!(t, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn skew_matches_cross_product() {
        let r = Vec3::new(1.0, -2.0, 0.5);
        let v = Vec3::new(0.3, 0.7, -1.1);
        let lhs = skew(r) * v;
        let rhs = r.cross(v);
        assert_relative_eq!(lhs.x, rhs.x, epsilon = 1e-6);
        assert_relative_eq!(lhs.y, rhs.y, epsilon = 1e-6);
        assert_relative_eq!(lhs.z, rhs.z, epsilon = 1e-6);
    }
}
