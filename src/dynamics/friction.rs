use glam::Vec3;

use crate::dynamics::solver::{SolverBody, SolverContact};

/// Applies Coulomb and rolling friction bounded by the accumulated normal impulse.
pub fn apply_friction(body_a: &mut SolverBody, body_b: &mut SolverBody, contact: &mut SolverContact) {
    let normal_impulse = contact.accumulated_normal_impulse;
    apply_tangential_friction(body_a, body_b, contact, normal_impulse);
    apply_rolling_friction(body_a, body_b, contact, normal_impulse);
}

fn apply_tangential_friction(
    body_a: &mut SolverBody,
    body_b: &mut SolverBody,
    contact: &mut SolverContact,
    normal_impulse: f32,
) {
    if body_a.is_static() && body_b.is_static() {
        return;
    }

    let normal_impulse = normal_impulse.max(0.0);
    if normal_impulse <= f32::EPSILON {
        contact.accumulated_tangent_impulse = Vec3::ZERO;
        return;
    }

    let r_a = contact.point - body_a.position;
    let r_b = contact.point - body_b.position;
    let relative_vel = body_b.point_velocity(contact.point) - body_a.point_velocity(contact.point);
    let tangent_velocity = project_onto_tangent(relative_vel, contact.normal);

    let tangent_dir = pick_tangent_direction(tangent_velocity, contact.accumulated_tangent_impulse, contact.normal);
    let effective = body_a.inverse_mass
        + body_b.inverse_mass
        + tangent_dir.dot((body_a.inverse_inertia * r_a.cross(tangent_dir)).cross(r_a))
        + tangent_dir.dot((body_b.inverse_inertia * r_b.cross(tangent_dir)).cross(r_b))
        + 1e-6;
    let mut new_impulse = contact.accumulated_tangent_impulse - tangent_velocity / effective;

    // Remove any numerical drift along the normal axis.
    new_impulse = project_onto_tangent(new_impulse, contact.normal);

    let max_friction = contact.material.friction.max(0.0) * normal_impulse;
    if new_impulse.length() > max_friction {
        new_impulse = new_impulse.normalize_or_zero() * max_friction;
    }

    let impulse_delta = new_impulse - contact.accumulated_tangent_impulse;
    contact.accumulated_tangent_impulse = new_impulse;
    if impulse_delta.length_squared() <= 1e-12 {
        return;
    }
    body_a.apply_impulse(-impulse_delta, contact.point);
    body_b.apply_impulse(impulse_delta, contact.point);
}

fn apply_rolling_friction(
    body_a: &mut SolverBody,
    body_b: &mut SolverBody,
    contact: &mut SolverContact,
    normal_impulse: f32,
) {
    let limit = contact.material.rolling_friction.max(0.0) * normal_impulse.max(0.0);
    if limit <= f32::EPSILON {
        contact.accumulated_rolling_impulse = Vec3::ZERO;
        return;
    }

    let relative_ang = body_b.velocity.angular - body_a.velocity.angular;
    let rolling_axis = project_onto_tangent(relative_ang, contact.normal);
    let axis = rolling_axis.normalize_or_zero();
    if axis == Vec3::ZERO {
        return;
    }

    let eff_mass = axis.dot(body_a.inverse_inertia * axis) + axis.dot(body_b.inverse_inertia * axis) + 1e-6;
    let lambda = -axis.dot(relative_ang) / eff_mass;
    let desired = contact.accumulated_rolling_impulse + axis * lambda;
    let clamped = if desired.length() > limit {
        desired.normalize() * limit
    } else {
        desired
    };

    let delta = clamped - contact.accumulated_rolling_impulse;
    if delta.length_squared() <= 1e-12 {
        return;
    }
    contact.accumulated_rolling_impulse = clamped;
    body_a.apply_angular_impulse(-delta);
    body_b.apply_angular_impulse(delta);
}

fn pick_tangent_direction(candidate: Vec3, fallback: Vec3, normal: Vec3) -> Vec3 {
    let projected_candidate = project_onto_tangent(candidate, normal);
    if projected_candidate.length_squared() > 1e-12 {
        return projected_candidate.normalize();
    }

    let projected_fallback = project_onto_tangent(fallback, normal);
    if projected_fallback.length_squared() > 1e-12 {
        return projected_fallback.normalize();
    }

    orthogonal_to_normal(normal)
}

fn project_onto_tangent(vector: Vec3, normal: Vec3) -> Vec3 {
    vector - normal * vector.dot(normal)
}

fn orthogonal_to_normal(normal: Vec3) -> Vec3 {
    let mut tangent = normal.cross(Vec3::X);
    if tangent.length_squared() <= 1e-6 {
        tangent = normal.cross(Vec3::Y);
    }
    tangent.normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collision::contact::Contact,
        core::types::{MaterialPairProperties, Transform, Velocity},
    };
    use glam::{Mat3, Quat};

    fn sliding_box(speed: f32) -> SolverBody {
        SolverBody {
            id: None,
            position: Vec3::new(0.0, 0.5, 0.0),
            rotation: Quat::IDENTITY,
            velocity: Velocity {
                linear: Vec3::new(speed, 0.0, 0.0),
                angular: Vec3::ZERO,
            },
            inverse_mass: 1.0,
            inverse_inertia: Mat3::ZERO,
        }
    }

    fn contact_with(friction: f32, normal_impulse: f32) -> SolverContact {
        let material = MaterialPairProperties {
            friction,
            restitution: 0.0,
            rolling_friction: 0.0,
        };
        let mut contact = SolverContact::new(0, 1, (0, 0), &Contact::new(Vec3::ZERO, Vec3::Y, 0.0), material);
        contact.accumulated_normal_impulse = normal_impulse;
        contact
    }

    #[test]
    fn friction_limits_tangent_impulse() {
        let mut ground = SolverBody::fixed(None, &Transform::IDENTITY);
        let mut body = sliding_box(10.0);
        let mut contact = contact_with(0.5, 1.0);
        apply_friction(&mut ground, &mut body, &mut contact);
        assert!((contact.accumulated_tangent_impulse.length() - 0.5).abs() < 1e-4);
        assert!((body.velocity.linear.x - 9.5).abs() < 1e-4);
    }

    #[test]
    fn sticking_contact_cancels_slow_sliding() {
        let mut ground = SolverBody::fixed(None, &Transform::IDENTITY);
        let mut body = sliding_box(0.2);
        let mut contact = contact_with(0.5, 1.0);
        apply_friction(&mut ground, &mut body, &mut contact);
        assert!(body.velocity.linear.x.abs() < 1e-4);
    }
}
