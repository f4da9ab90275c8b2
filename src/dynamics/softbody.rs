//! Position-based dynamics for soft bodies.
//!
//! A sub-step is split in three calls so the sector can run the rigid
//! pipeline in between: [`SoftBodySolver::predict`] before collision
//! detection, [`SoftBodySolver::solve`] after the rigid solver and
//! [`SoftBodySolver::finalize`] last.

use std::sync::Arc;

use glam::Vec3;

use crate::{
    collision::{narrowphase::NarrowPhase, shapes::Shape},
    core::{mesh::Aabb, softbody::SoftBody, types::Transform},
    utils::allocator::EntityId,
};

/// Rigid geometry the nodes of a soft body collide with.
#[derive(Debug, Clone)]
pub struct SoftCollider<'a> {
    pub id: EntityId,
    pub shapes: &'a [(Arc<Shape>, Transform)],
    pub pose: Transform,
    pub bounds: Aabb,
}

/// Node pinned to a point that moves with another body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftPin {
    pub node: usize,
    pub target: Vec3,
}

pub struct SoftBodySolver;

impl SoftBodySolver {
    /// Integrates external forces and predicts node positions.
    pub fn predict(body: &mut SoftBody, gravity: Vec3, dt: f32) {
        let config = body.config;
        let wind = body.wind;
        let gravity = if body.gravity_enabled() { gravity } else { Vec3::ZERO };
        let pressure_forces = Self::pressure_forces(body);

        for (index, node) in body.nodes.iter_mut().enumerate() {
            let inverse_mass = node.inverse_mass();
            if inverse_mass <= 0.0 || body.anchors.contains_key(&index) {
                node.force = Vec3::ZERO;
                node.previous = node.position;
                continue;
            }
            let mut acceleration = gravity + node.force * inverse_mass;
            if let Some(pressure) = pressure_forces.get(index) {
                acceleration += *pressure * inverse_mass;
            }
            node.velocity += acceleration * dt;

            let relative = node.velocity - wind;
            if config.drag > 0.0 {
                node.velocity -= relative * (config.drag * dt).min(1.0);
            }
            if config.lift > 0.0 {
                let along_normal = node.normal * relative.dot(node.normal);
                node.velocity -= along_normal * (config.lift * dt).min(1.0);
            }

            node.force = Vec3::ZERO;
            node.previous = node.position;
            node.position += node.velocity * dt;
        }

        let hardness = config.anchor_hardness.clamp(0.0, 1.0);
        for (&index, slot) in &body.anchors {
            if let (Some(node), Some(target)) = (body.nodes.get_mut(index), slot.target) {
                node.position = node.position.lerp(target, hardness);
            }
        }
    }

    /// Outward force per node from the internal pressure of a closed mesh.
    fn pressure_forces(body: &SoftBody) -> Vec<Vec3> {
        let pressure = body.config.pressure;
        if pressure <= 0.0 || body.triangles.is_empty() {
            return Vec::new();
        }
        let mut forces = vec![Vec3::ZERO; body.nodes.len()];
        for t in &body.triangles {
            let (a, b, c) = (body.nodes[t[0]].position, body.nodes[t[1]].position, body.nodes[t[2]].position);
            // Cross product length is twice the area.
            let area_normal = (b - a).cross(c - a) * 0.5;
            for &i in t {
                forces[i] += area_normal * (pressure / 3.0);
            }
        }
        forces
    }

    /// Projects links, volume, pins and collisions; returns the colliders touched.
    pub fn solve(body: &mut SoftBody, pins: &[SoftPin], colliders: &[SoftCollider<'_>]) -> Vec<EntityId> {
        let config = body.config;
        let iterations = config.position_iterations.max(1);
        let radius = config.node_radius * body.unit_scale;
        let mut touched = Vec::new();

        for _ in 0..iterations {
            Self::project_links(body);
            if config.volume_stiffness > 0.0 && body.rest_volume.abs() > 1e-9 {
                Self::project_volume(body, config.volume_stiffness);
            }
            for pin in pins {
                if let Some(node) = body.nodes.get_mut(pin.node) {
                    node.position = pin.target;
                }
            }
            for (&index, slot) in &body.anchors {
                if let (Some(node), Some(target)) = (body.nodes.get_mut(index), slot.target) {
                    node.position = node.position.lerp(target, config.anchor_hardness.clamp(0.0, 1.0));
                }
            }
            for collider in colliders {
                if Self::project_collisions(body, collider, radius) && !touched.contains(&collider.id) {
                    touched.push(collider.id);
                }
            }
        }
        touched.sort_unstable();
        touched
    }

    fn project_links(body: &mut SoftBody) {
        let config = body.config;
        for link in &body.links {
            let stiffness = if link.bending {
                config.angular_stiffness
            } else {
                config.linear_stiffness
            };
            if stiffness <= 0.0 {
                continue;
            }
            let wa = Self::node_weight(body, link.a);
            let wb = Self::node_weight(body, link.b);
            let total = wa + wb;
            if total <= 0.0 {
                continue;
            }
            let delta = body.nodes[link.b].position - body.nodes[link.a].position;
            let length = delta.length();
            if length < 1e-9 {
                continue;
            }
            let correction = delta * ((length - link.rest_length) / (length * total) * stiffness.min(1.0));
            body.nodes[link.a].position += correction * wa;
            body.nodes[link.b].position -= correction * wb;
        }
    }

    fn node_weight(body: &SoftBody, index: usize) -> f32 {
        if body.anchors.contains_key(&index) {
            0.0
        } else {
            body.nodes[index].inverse_mass()
        }
    }

    fn project_volume(body: &mut SoftBody, stiffness: f32) {
        let volume = body.enclosed_volume();
        if volume.abs() < 1e-9 || volume.signum() != body.rest_volume.signum() {
            return;
        }
        let factor = (body.rest_volume / volume).cbrt();
        let blend = 1.0 + (factor - 1.0) * stiffness.min(1.0);
        let center = body.backend_centroid();
        for index in 0..body.nodes.len() {
            if Self::node_weight(body, index) > 0.0 {
                let node = &mut body.nodes[index];
                node.position = center + (node.position - center) * blend;
            }
        }
    }

    fn project_collisions(body: &mut SoftBody, collider: &SoftCollider<'_>, radius: f32) -> bool {
        let friction = body.config.friction.clamp(0.0, 1.0);
        let bounds = collider.bounds.expanded(radius);
        let mut hit = false;
        for node in &mut body.nodes {
            if node.inverse_mass() <= 0.0 || !bounds.contains_point(node.position) {
                continue;
            }
            for (shape, relative) in collider.shapes {
                let pose = collider.pose.combine(relative);
                let Some(contact) = NarrowPhase::point_contact(shape, &pose, node.position, radius) else {
                    continue;
                };
                node.position += contact.normal * contact.depth;
                let moved = node.position - node.previous;
                let tangential = moved - contact.normal * moved.dot(contact.normal);
                node.position -= tangential * friction;
                hit = true;
            }
        }
        hit
    }

    /// Derives velocities from the corrected positions.
    pub fn finalize(body: &mut SoftBody, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let damping = body.config.damping.clamp(0.0, 1.0);
        for node in &mut body.nodes {
            node.velocity = (node.position - node.previous) / dt * (1.0 - damping);
        }
        body.update_normals();
    }

    /// Spins the nodes around `axis` through the centroid at `angular_speed`.
    pub fn apply_twist(body: &mut SoftBody, axis: Vec3, angular_speed: f32, dt: f32) {
        let axis = axis.normalize_or_zero();
        if axis == Vec3::ZERO || angular_speed == 0.0 {
            return;
        }
        let center = body.backend_centroid();
        let rotation = glam::Quat::from_axis_angle(axis, angular_speed * dt);
        for index in 0..body.nodes.len() {
            if Self::node_weight(body, index) > 0.0 {
                let node = &mut body.nodes[index];
                node.position = center + rotation * (node.position - center);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Plane;
    use approx::assert_relative_eq;

    fn step(body: &mut SoftBody, colliders: &[SoftCollider<'_>], dt: f32) -> Vec<EntityId> {
        SoftBodySolver::predict(body, Vec3::new(0.0, -9.81, 0.0), dt);
        let touched = SoftBodySolver::solve(body, &[], colliders);
        SoftBodySolver::finalize(body, dt);
        touched
    }

    #[test]
    fn anchored_rope_keeps_its_pin_and_length() {
        let mut rope = SoftBody::rope(Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0), 4);
        rope.anchor_vertex(0).expect("vertex 0 exists");
        for _ in 0..120 {
            step(&mut rope, &[], 1.0 / 60.0);
        }
        assert_eq!(rope.nodes[0].position, Vec3::ZERO);
        let tip = rope.nodes[4].position;
        assert!(tip.y < -1.0, "rope should swing down, tip at {tip:?}");
        assert!(tip.length() < 2.5);
    }

    #[test]
    fn nodes_rest_on_a_ground_plane() {
        let ground = [(
            Arc::new(Shape::Plane {
                plane: Plane::new(Vec3::Y, 0.0),
            }),
            Transform::IDENTITY,
        )];
        let collider = SoftCollider {
            id: EntityId::new(7, 0),
            shapes: &ground,
            pose: Transform::IDENTITY,
            bounds: Aabb::new(Vec3::splat(f32::NEG_INFINITY), Vec3::splat(f32::INFINITY)),
        };
        let mut rope = SoftBody::rope(Vec3::new(0.0, 0.5, 0.0), Vec3::new(1.0, 0.5, 0.0), 2);
        let mut touched = Vec::new();
        for _ in 0..120 {
            touched = step(&mut rope, std::slice::from_ref(&collider), 1.0 / 60.0);
        }
        let radius = rope.config.node_radius;
        for node in &rope.nodes {
            assert!(node.position.y > radius * 0.5, "node sank to {}", node.position.y);
            assert!(node.position.y < 0.2);
        }
        assert_eq!(touched, vec![EntityId::new(7, 0)]);
    }

    #[test]
    fn pins_override_node_positions() {
        let mut rope = SoftBody::rope(Vec3::ZERO, Vec3::X, 1);
        SoftBodySolver::predict(&mut rope, Vec3::ZERO, 0.1);
        SoftBodySolver::solve(
            &mut rope,
            &[SoftPin {
                node: 1,
                target: Vec3::new(1.0, 1.0, 0.0),
            }],
            &[],
        );
        assert_relative_eq!(rope.nodes[1].position.y, 1.0);
    }
}
