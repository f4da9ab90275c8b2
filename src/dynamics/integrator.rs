use glam::Vec3;

use crate::{
    core::{rigidbody::RigidBody, types::Transform},
    dynamics::solver::SolverBody,
    utils::math::{angular_velocity_to_quat, world_inertia},
};

/// Semi-implicit Euler integration of rigid bodies, in backend units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integrator {
    /// Sector-wide damping added to every body's own damping.
    pub linear_damping: f32,
    pub angular_damping: f32,
}

impl Default for Integrator {
    fn default() -> Self {
        Self {
            linear_damping: 0.0,
            angular_damping: 0.0,
        }
    }
}

impl Integrator {
    pub fn new(linear_damping: f32, angular_damping: f32) -> Self {
        Self {
            linear_damping,
            angular_damping,
        }
    }

    /// Applies accumulated forces, gravity and damping, then clears the forces.
    pub fn integrate_velocity(&self, body: &mut RigidBody, transform: &Transform, gravity: Vec3, dt: f32) {
        if !body.is_dynamic() || !body.is_enabled() {
            body.clear_forces();
            return;
        }

        let inverse_mass = body.inverse_mass();
        let mut acceleration = body.force * inverse_mass;
        if body.gravity_enabled() {
            acceleration += gravity;
        }
        body.velocity.linear += acceleration * dt;
        let inverse_inertia = world_inertia(transform.rotation, body.inverse_inertia());
        body.velocity.angular += inverse_inertia * body.torque * dt;

        let linear = (body.linear_damping() + self.linear_damping).max(0.0);
        let angular = (body.angular_damping() + self.angular_damping).max(0.0);
        body.velocity.linear *= (1.0 - linear * dt).max(0.0);
        body.velocity.angular *= (1.0 - angular * dt).max(0.0);

        body.clear_forces();
    }

    pub fn integrate_position(&self, body: &mut SolverBody, dt: f32) {
        if body.is_static() {
            return;
        }

        body.position += body.velocity.linear * dt;

        let delta = angular_velocity_to_quat(body.velocity.angular, dt);
        body.rotation = (delta * body.rotation).normalize();
    }
}
