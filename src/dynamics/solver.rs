use glam::{Mat3, Quat, Vec3};

use crate::{
    collision::contact::Contact,
    core::{
        joint::{AxisMode, Joint, JointType},
        rigidbody::RigidBody,
        types::{MaterialPairProperties, Transform, Velocity},
    },
    utils::{
        allocator::EntityId,
        math::{quat_to_rotation_vector, skew, world_inertia},
    },
};

/// Dense per-step copy of a body seen by the solver, in backend units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverBody {
    pub id: Option<EntityId>,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Velocity,
    pub inverse_mass: f32,
    pub inverse_inertia: Mat3,
}

impl SolverBody {
    /// Immovable body; used for the world anchor and static objects.
    pub fn fixed(id: Option<EntityId>, transform: &Transform) -> Self {
        Self {
            id,
            position: transform.position,
            rotation: transform.rotation,
            velocity: Velocity::default(),
            inverse_mass: 0.0,
            inverse_inertia: Mat3::ZERO,
        }
    }

    pub fn from_rigid(id: EntityId, transform: &Transform, body: &RigidBody) -> Self {
        let active = body.is_dynamic() && body.is_enabled();
        Self {
            id: Some(id),
            position: transform.position,
            rotation: transform.rotation,
            velocity: body.velocity,
            inverse_mass: if active { body.inverse_mass() } else { 0.0 },
            inverse_inertia: if active {
                world_inertia(transform.rotation, body.inverse_inertia())
            } else {
                Mat3::ZERO
            },
        }
    }

    pub fn is_static(&self) -> bool {
        self.inverse_mass <= 0.0
    }

    pub fn apply_impulse(&mut self, impulse: Vec3, position: Vec3) {
        if self.is_static() {
            return;
        }
        self.velocity.linear += impulse * self.inverse_mass;
        let torque = (position - self.position).cross(impulse);
        self.velocity.angular += self.inverse_inertia * torque;
    }

    pub fn apply_angular_impulse(&mut self, impulse: Vec3) {
        if self.is_static() {
            return;
        }
        self.velocity.angular += self.inverse_inertia * impulse;
    }

    pub fn point_velocity(&self, point: Vec3) -> Vec3 {
        self.velocity.linear + self.velocity.angular.cross(point - self.position)
    }

    /// Inverse effective mass along `axis` at offset `r`.
    fn linear_response(&self, r: Vec3, axis: Vec3) -> f32 {
        self.inverse_mass + axis.dot((self.inverse_inertia * r.cross(axis)).cross(r))
    }
}

/// Mutable pair of distinct solver bodies.
fn pair_mut(bodies: &mut [SolverBody], a: usize, b: usize) -> Option<(&mut SolverBody, &mut SolverBody)> {
    if a == b || a >= bodies.len() || b >= bodies.len() {
        return None;
    }
    if a < b {
        let (left, right) = bodies.split_at_mut(b);
        Some((&mut left[a], &mut right[0]))
    } else {
        let (left, right) = bodies.split_at_mut(a);
        Some((&mut right[0], &mut left[b]))
    }
}

/// One contact point between two solver bodies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverContact {
    pub body_a: usize,
    pub body_b: usize,
    /// Position of the source manifold and of the point inside it.
    pub manifold: usize,
    pub slot: usize,
    pub point: Vec3,
    pub normal: Vec3,
    pub depth: f32,
    pub material: MaterialPairProperties,
    pub accumulated_normal_impulse: f32,
    pub accumulated_tangent_impulse: Vec3,
    pub accumulated_rolling_impulse: Vec3,
    restitution_target: f32,
}

impl SolverContact {
    pub fn new(
        body_a: usize,
        body_b: usize,
        (manifold, slot): (usize, usize),
        contact: &Contact,
        material: MaterialPairProperties,
    ) -> Self {
        Self {
            body_a,
            body_b,
            manifold,
            slot,
            point: contact.point,
            normal: contact.normal,
            depth: contact.depth,
            material,
            accumulated_normal_impulse: contact.normal_impulse,
            accumulated_tangent_impulse: contact.tangent_impulse,
            accumulated_rolling_impulse: contact.rolling_impulse,
            restitution_target: 0.0,
        }
    }

    /// Copies the accumulated impulses back for warm starting.
    pub fn store(&self, contact: &mut Contact) {
        contact.normal_impulse = self.accumulated_normal_impulse;
        contact.tangent_impulse = self.accumulated_tangent_impulse;
        contact.rolling_impulse = self.accumulated_rolling_impulse;
    }
}

/// Joint data resolved for one sub-step, in backend units.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverJoint {
    pub id: EntityId,
    pub body_a: usize,
    pub body_b: usize,
    local_a: Transform,
    local_b: Transform,
    trans_modes: [AxisMode; 3],
    rot_modes: [AxisMode; 3],
    linear_min: Vec3,
    linear_max: Vec3,
    angular_min: Vec3,
    angular_max: Vec3,
    bounce: Vec3,
    linear_motor: Option<(Vec3, Vec3)>,
    angular_motor: Option<(Vec3, Vec3)>,
    spring: Option<JointSpring>,
    breaking_threshold: f32,
    pub applied_impulse: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct JointSpring {
    linear_stiffness: Vec3,
    angular_stiffness: Vec3,
    linear_damping: Vec3,
    angular_damping: Vec3,
    linear_equilibrium: Vec3,
    angular_equilibrium: Vec3,
}

impl SolverJoint {
    /// Snapshot of a built rigid joint; `None` for unbuilt, broken or soft joints.
    pub fn from_joint(id: EntityId, joint: &Joint, body_a: usize, body_b: usize) -> Option<Self> {
        let frame = joint.frame?;
        if joint.broken || joint.joint_type().is_soft() {
            return None;
        }
        let scale = joint.unit_scale;
        let (linear_min, linear_max) = joint.scaled_distance_limits();
        let motor_active = joint.max_force().cmpgt(Vec3::ZERO).any();
        let (linear_motor, angular_motor) = match joint.joint_type() {
            JointType::Hinge if motor_active => (None, Some((joint.desired_velocity(), joint.max_force() * scale * scale))),
            JointType::Slide | JointType::SixDof if motor_active => {
                (Some((joint.desired_velocity() * scale, joint.max_force() * scale)), None)
            }
            _ => (None, None),
        };
        let spring = joint.spring().then(|| JointSpring {
            linear_stiffness: joint.linear_stiffness(),
            angular_stiffness: joint.angular_stiffness() * scale * scale,
            linear_damping: joint.linear_damping(),
            angular_damping: joint.angular_damping() * scale * scale,
            linear_equilibrium: joint.scaled_linear_equilibrium(),
            angular_equilibrium: joint.angular_equilibrium_point(),
        });

        // A joint anchored to the world measures its body against the world frame.
        let (body_a, body_b, local_a, local_b) = if joint.body(1).is_none() {
            (body_b, body_a, frame.local_b, frame.local_a)
        } else {
            (body_a, body_b, frame.local_a, frame.local_b)
        };

        Some(Self {
            id,
            body_a,
            body_b,
            local_a,
            local_b,
            trans_modes: [0, 1, 2].map(|axis| joint.trans_axis_mode(axis)),
            rot_modes: [0, 1, 2].map(|axis| joint.rot_axis_mode(axis)),
            linear_min,
            linear_max,
            angular_min: joint.minimum_angle(),
            angular_max: joint.maximum_angle(),
            bounce: joint.bounce(),
            linear_motor,
            angular_motor,
            spring,
            breaking_threshold: joint.breaking_impulse_threshold() * scale,
            applied_impulse: 0.0,
        })
    }

    pub fn is_broken(&self) -> bool {
        self.applied_impulse > self.breaking_threshold
    }
}

/// Accumulated solver statistics for profiling.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SolverStepMetrics {
    pub contacts_solved: usize,
    pub joints_solved: usize,
    pub normal_impulse_sum: f32,
    pub tangent_impulse_sum: f32,
}

impl SolverStepMetrics {
    pub fn merge(&mut self, other: &Self) {
        self.contacts_solved += other.contacts_solved;
        self.joints_solved += other.joints_solved;
        self.normal_impulse_sum += other.normal_impulse_sum;
        self.tangent_impulse_sum += other.tangent_impulse_sum;
    }
}

/// Projected Gauss-Seidel solver for contacts and joints.
#[derive(Debug, Clone)]
pub struct ConstraintSolver {
    pub iterations: u32,
    pub position_iterations: u32,
    pub bias_factor: f32,
    /// Penetration allowed before positional correction, in backend units.
    pub slop: f32,
    /// Cap on the velocity used to close joint errors, in backend units.
    pub max_bias: f32,
    /// Approach speed below which restitution is ignored, in backend units.
    pub restitution_threshold: f32,
}

impl ConstraintSolver {
    pub fn new(iterations: u32, unit_scale: f32) -> Self {
        Self {
            iterations: iterations.max(1),
            position_iterations: 1,
            bias_factor: 0.2,
            slop: 0.01 * unit_scale,
            max_bias: 20.0 * unit_scale,
            restitution_threshold: 1.0 * unit_scale,
        }
    }

    pub fn solve(
        &self,
        bodies: &mut [SolverBody],
        contacts: &mut [SolverContact],
        joints: &mut [SolverJoint],
        dt: f32,
    ) -> SolverStepMetrics {
        if dt <= 0.0 {
            return SolverStepMetrics::default();
        }
        self.prepare_contacts(bodies, contacts);
        Self::warm_start_contacts(bodies, contacts);
        for joint in joints.iter_mut() {
            joint.applied_impulse = 0.0;
            if let Some((body_a, body_b)) = pair_mut(bodies, joint.body_a, joint.body_b) {
                Self::apply_joint_spring(body_a, body_b, joint, dt);
            }
        }

        let inv_iterations = 1.0 / self.iterations as f32;
        for _ in 0..self.iterations {
            for joint in joints.iter_mut() {
                if joint.is_broken() {
                    continue;
                }
                if let Some((body_a, body_b)) = pair_mut(bodies, joint.body_a, joint.body_b) {
                    self.resolve_velocity_joint(body_a, body_b, joint, dt, inv_iterations);
                }
            }

            for contact in contacts.iter_mut() {
                if let Some((body_a, body_b)) = pair_mut(bodies, contact.body_a, contact.body_b) {
                    self.resolve_contact(body_a, body_b, contact, dt);
                }
            }
        }

        let mut metrics = SolverStepMetrics {
            contacts_solved: contacts.len(),
            joints_solved: joints.len(),
            ..Default::default()
        };
        for contact in contacts.iter() {
            metrics.normal_impulse_sum += contact.accumulated_normal_impulse.abs();
            metrics.tangent_impulse_sum += contact.accumulated_tangent_impulse.length();
        }
        metrics
    }

    /// Pushes overlapping bodies apart after integration.
    pub fn correct_positions(&self, bodies: &mut [SolverBody], contacts: &[SolverContact]) {
        for _ in 0..self.position_iterations {
            for contact in contacts {
                if let Some((body_a, body_b)) = pair_mut(bodies, contact.body_a, contact.body_b) {
                    self.correct_position(body_a, body_b, contact);
                }
            }
        }
    }

    fn prepare_contacts(&self, bodies: &[SolverBody], contacts: &mut [SolverContact]) {
        for contact in contacts.iter_mut() {
            let (Some(body_a), Some(body_b)) = (bodies.get(contact.body_a), bodies.get(contact.body_b)) else {
                continue;
            };
            let approach = (body_b.point_velocity(contact.point) - body_a.point_velocity(contact.point)).dot(contact.normal);
            contact.restitution_target = if approach < -self.restitution_threshold {
                -approach * contact.material.restitution
            } else {
                0.0
            };
        }
    }

    fn warm_start_contacts(bodies: &mut [SolverBody], contacts: &[SolverContact]) {
        for contact in contacts {
            if let Some((body_a, body_b)) = pair_mut(bodies, contact.body_a, contact.body_b) {
                Self::apply_cached_impulse(body_a, body_b, contact);
            }
        }
    }

    fn apply_cached_impulse(body_a: &mut SolverBody, body_b: &mut SolverBody, contact: &SolverContact) {
        if body_a.is_static() && body_b.is_static() {
            return;
        }
        let cached = contact.normal * contact.accumulated_normal_impulse + contact.accumulated_tangent_impulse;
        if cached.length_squared() > f32::EPSILON {
            body_a.apply_impulse(-cached, contact.point);
            body_b.apply_impulse(cached, contact.point);
        }
        if contact.accumulated_rolling_impulse.length_squared() > f32::EPSILON {
            body_a.apply_angular_impulse(-contact.accumulated_rolling_impulse);
            body_b.apply_angular_impulse(contact.accumulated_rolling_impulse);
        }
    }

    fn resolve_contact(&self, body_a: &mut SolverBody, body_b: &mut SolverBody, contact: &mut SolverContact, dt: f32) {
        if body_a.is_static() && body_b.is_static() {
            return;
        }

        let r_a = contact.point - body_a.position;
        let r_b = contact.point - body_b.position;
        let relative_vel = body_b.point_velocity(contact.point) - body_a.point_velocity(contact.point);
        let vel_along_normal = relative_vel.dot(contact.normal);

        // Baumgarte stabilization on the penetration beyond the slop.
        let bias = self.bias_factor * (contact.depth - self.slop).max(0.0) / dt;
        let target = bias.max(contact.restitution_target);

        let effective = body_a.linear_response(r_a, contact.normal) + body_b.linear_response(r_b, contact.normal);
        if effective <= 1e-9 {
            return;
        }
        let impulse_mag = (target - vel_along_normal) / effective;

        let accumulated = (contact.accumulated_normal_impulse + impulse_mag).max(0.0);
        let impulse_delta = accumulated - contact.accumulated_normal_impulse;
        contact.accumulated_normal_impulse = accumulated;

        let impulse = contact.normal * impulse_delta;
        body_a.apply_impulse(-impulse, contact.point);
        body_b.apply_impulse(impulse, contact.point);

        crate::dynamics::friction::apply_friction(body_a, body_b, contact);
    }

    fn correct_position(&self, body_a: &mut SolverBody, body_b: &mut SolverBody, contact: &SolverContact) {
        if body_a.is_static() && body_b.is_static() {
            return;
        }
        let correction = (contact.depth - self.slop).max(0.0) * self.bias_factor;
        let total_inv_mass = body_a.inverse_mass + body_b.inverse_mass;
        if total_inv_mass <= 1e-9 || correction <= 0.0 {
            return;
        }
        let impulse = contact.normal * (correction / total_inv_mass);
        body_a.position -= impulse * body_a.inverse_mass;
        body_b.position += impulse * body_b.inverse_mass;
    }

    /// Spring forces act once per sub-step, before the iterations.
    fn apply_joint_spring(body_a: &mut SolverBody, body_b: &mut SolverBody, joint: &mut SolverJoint, dt: f32) {
        let Some(spring) = joint.spring else {
            return;
        };
        let frame_a = pose(body_a).combine(&joint.local_a);
        let frame_b = pose(body_b).combine(&joint.local_b);
        let axes = axes_of(frame_a.rotation);
        let delta = frame_b.position - frame_a.position;
        let relative_vel = body_b.point_velocity(frame_b.position) - body_a.point_velocity(frame_a.position);
        let angles = relative_angles(&frame_a, &frame_b);
        let relative_ang = body_b.velocity.angular - body_a.velocity.angular;

        for (i, axis) in axes.iter().enumerate() {
            let stretch = delta.dot(*axis) - spring.linear_equilibrium[i];
            let force = -spring.linear_stiffness[i] * stretch - spring.linear_damping[i] * relative_vel.dot(*axis);
            if force != 0.0 {
                let impulse = *axis * force * dt;
                body_a.apply_impulse(-impulse, frame_a.position);
                body_b.apply_impulse(impulse, frame_b.position);
            }

            let twist = angles[i] - spring.angular_equilibrium[i];
            let torque = -spring.angular_stiffness[i] * twist - spring.angular_damping[i] * relative_ang.dot(*axis);
            if torque != 0.0 {
                let impulse = *axis * torque * dt;
                body_a.apply_angular_impulse(-impulse);
                body_b.apply_angular_impulse(impulse);
            }
        }
    }

    fn resolve_velocity_joint(
        &self,
        body_a: &mut SolverBody,
        body_b: &mut SolverBody,
        joint: &mut SolverJoint,
        dt: f32,
        inv_iterations: f32,
    ) {
        if body_a.is_static() && body_b.is_static() {
            return;
        }
        let frame_a = pose(body_a).combine(&joint.local_a);
        let frame_b = pose(body_b).combine(&joint.local_b);
        let axes = axes_of(frame_a.rotation);
        let r_a = frame_a.position - body_a.position;
        let r_b = frame_b.position - body_b.position;
        let mut applied = 0.0;

        // 1. Translation
        if joint.trans_modes.iter().all(|m| *m == AxisMode::Locked) && joint.linear_min == Vec3::ZERO {
            let delta = frame_b.position - frame_a.position;
            let bias = clamp_length(delta * (0.3 / dt), self.max_bias);
            let relative_vel = body_b.point_velocity(frame_b.position) - body_a.point_velocity(frame_a.position);

            let r_a_skew = skew(r_a);
            let r_b_skew = skew(r_b);
            let k = Mat3::IDENTITY * (body_a.inverse_mass + body_b.inverse_mass)
                - r_a_skew * body_a.inverse_inertia * r_a_skew
                - r_b_skew * body_b.inverse_inertia * r_b_skew;
            if k.determinant().abs() > 1e-12 {
                let impulse = k.inverse() * -(relative_vel + bias);
                body_a.apply_impulse(-impulse, frame_a.position);
                body_b.apply_impulse(impulse, frame_b.position);
                applied += impulse.length();
            }
        } else {
            for (i, axis) in axes.iter().enumerate() {
                let delta = frame_b.position - frame_a.position;
                let distance = delta.dot(*axis);
                let k = body_a.linear_response(r_a, *axis) + body_b.linear_response(r_b, *axis);
                if k <= 1e-9 {
                    continue;
                }
                let rel_v = (body_b.point_velocity(frame_b.position) - body_a.point_velocity(frame_a.position)).dot(*axis);

                if let Some((velocity, max_force)) = joint.linear_motor {
                    if joint.trans_modes[i] != AxisMode::Locked && max_force[i] > 0.0 {
                        let max_impulse = max_force[i] * dt * inv_iterations;
                        let impulse = ((velocity[i] - rel_v) / k).clamp(-max_impulse, max_impulse);
                        let impulse = *axis * impulse;
                        body_a.apply_impulse(-impulse, frame_a.position);
                        body_b.apply_impulse(impulse, frame_b.position);
                    }
                }

                let rel_v = (body_b.point_velocity(frame_b.position) - body_a.point_velocity(frame_a.position)).dot(*axis);
                let impulse_mag = limit_impulse(
                    joint.trans_modes[i],
                    distance,
                    joint.linear_min[i],
                    joint.linear_max[i],
                    rel_v,
                    joint.bounce[i],
                    k,
                    dt,
                    self.max_bias,
                );
                if impulse_mag != 0.0 {
                    let impulse = *axis * impulse_mag;
                    body_a.apply_impulse(-impulse, frame_a.position);
                    body_b.apply_impulse(impulse, frame_b.position);
                    applied += impulse_mag.abs();
                }
            }
        }

        // 2. Rotation
        if joint.rot_modes.iter().all(|m| *m == AxisMode::Locked) && joint.angular_min == Vec3::ZERO {
            let q_error = frame_b.rotation * frame_a.rotation.inverse();
            let rotation_error = quat_to_rotation_vector(q_error);
            let bias = clamp_length(rotation_error * (0.3 / dt), 10.0);
            let rel_ang_vel = body_b.velocity.angular - body_a.velocity.angular;
            let k = body_a.inverse_inertia + body_b.inverse_inertia;
            if k.determinant().abs() > 1e-12 {
                let impulse = k.inverse() * -(rel_ang_vel + bias);
                body_a.apply_angular_impulse(-impulse);
                body_b.apply_angular_impulse(impulse);
                applied += impulse.length();
            }
        } else {
            let angles = relative_angles(&frame_a, &frame_b);
            for (i, axis) in axes.iter().enumerate() {
                let k = axis.dot(body_a.inverse_inertia * *axis) + axis.dot(body_b.inverse_inertia * *axis);
                if k <= 1e-9 {
                    continue;
                }

                if let Some((velocity, max_torque)) = joint.angular_motor {
                    if joint.rot_modes[i] != AxisMode::Locked && max_torque[i] > 0.0 {
                        let speed = (body_b.velocity.angular - body_a.velocity.angular).dot(*axis);
                        let max_impulse = max_torque[i] * dt * inv_iterations;
                        let impulse = ((velocity[i] - speed) / k).clamp(-max_impulse, max_impulse);
                        body_a.apply_angular_impulse(-*axis * impulse);
                        body_b.apply_angular_impulse(*axis * impulse);
                    }
                }

                let speed = (body_b.velocity.angular - body_a.velocity.angular).dot(*axis);
                let impulse_mag = limit_impulse(
                    joint.rot_modes[i],
                    angles[i],
                    joint.angular_min[i],
                    joint.angular_max[i],
                    speed,
                    joint.bounce[i],
                    k,
                    dt,
                    10.0,
                );
                if impulse_mag != 0.0 {
                    body_a.apply_angular_impulse(-*axis * impulse_mag);
                    body_b.apply_angular_impulse(*axis * impulse_mag);
                    applied += impulse_mag.abs();
                }
            }
        }

        joint.applied_impulse += applied;
    }
}

fn pose(body: &SolverBody) -> Transform {
    Transform::from_position_rotation(body.position, body.rotation)
}

fn axes_of(rotation: Quat) -> [Vec3; 3] {
    [rotation * Vec3::X, rotation * Vec3::Y, rotation * Vec3::Z]
}

fn clamp_length(v: Vec3, max: f32) -> Vec3 {
    if v.length_squared() > max * max {
        v.normalize() * max
    } else {
        v
    }
}

/// Twist of frame B relative to frame A about each axis of frame A.
fn relative_angles(frame_a: &Transform, frame_b: &Transform) -> Vec3 {
    let a = axes_of(frame_a.rotation);
    let b = axes_of(frame_b.rotation);
    let mut angles = Vec3::ZERO;
    for i in 0..3 {
        let j = (i + 1) % 3;
        angles[i] = f32::atan2(a[j].cross(b[j]).dot(a[i]), a[j].dot(b[j]));
    }
    angles
}

/// Scalar impulse keeping `value` inside `[min, max]` for a limited or locked axis.
#[allow(clippy::too_many_arguments)]
fn limit_impulse(
    mode: AxisMode,
    value: f32,
    min: f32,
    max: f32,
    relative_velocity: f32,
    bounce: f32,
    k: f32,
    dt: f32,
    max_bias: f32,
) -> f32 {
    match mode {
        AxisMode::Free => 0.0,
        AxisMode::Locked => {
            let bias = ((value - min) * 0.3 / dt).clamp(-max_bias, max_bias);
            -(relative_velocity + bias) / k
        }
        AxisMode::Limited => {
            if value <= min {
                let error = value - min;
                let bias = (-0.2 * error / dt).min(max_bias);
                let target = bias.max(-bounce * relative_velocity);
                ((target - relative_velocity) / k).max(0.0)
            } else if value >= max {
                let error = value - max;
                let bias = (-0.2 * error / dt).max(-max_bias);
                let target = bias.min(-bounce * relative_velocity);
                ((target - relative_velocity) / k).min(0.0)
            } else {
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn dynamic(position: Vec3, velocity: Vec3) -> SolverBody {
        SolverBody {
            id: None,
            position,
            rotation: Quat::IDENTITY,
            velocity: Velocity {
                linear: velocity,
                angular: Vec3::ZERO,
            },
            inverse_mass: 1.0,
            inverse_inertia: Mat3::IDENTITY * 2.5,
        }
    }

    #[test]
    fn contact_stops_approach_without_pulling() {
        let mut bodies = vec![
            SolverBody::fixed(None, &Transform::IDENTITY),
            dynamic(Vec3::new(0.0, 0.5, 0.0), Vec3::new(0.0, -3.0, 0.0)),
        ];
        let contact = Contact::new(Vec3::ZERO, Vec3::Y, 0.0);
        let mut contacts = vec![SolverContact::new(0, 1, (0, 0), &contact, MaterialPairProperties::default())];
        ConstraintSolver::new(10, 1.0).solve(&mut bodies, &mut contacts, &mut [], 1.0 / 60.0);
        assert!(bodies[1].velocity.linear.y.abs() < 1e-3);
        assert!(contacts[0].accumulated_normal_impulse > 0.0);

        // Separating bodies receive no impulse.
        let mut bodies = vec![
            SolverBody::fixed(None, &Transform::IDENTITY),
            dynamic(Vec3::new(0.0, 0.5, 0.0), Vec3::new(0.0, 2.0, 0.0)),
        ];
        let mut contacts = vec![SolverContact::new(0, 1, (0, 0), &contact, MaterialPairProperties::default())];
        ConstraintSolver::new(10, 1.0).solve(&mut bodies, &mut contacts, &mut [], 1.0 / 60.0);
        assert_relative_eq!(bodies[1].velocity.linear.y, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn restitution_reflects_fast_impacts() {
        let mut bodies = vec![
            SolverBody::fixed(None, &Transform::IDENTITY),
            dynamic(Vec3::new(0.0, 0.5, 0.0), Vec3::new(0.0, -4.0, 0.0)),
        ];
        let material = MaterialPairProperties {
            friction: 0.0,
            restitution: 0.5,
            rolling_friction: 0.0,
        };
        let mut contacts = vec![SolverContact::new(0, 1, (0, 0), &Contact::new(Vec3::ZERO, Vec3::Y, 0.0), material)];
        ConstraintSolver::new(10, 1.0).solve(&mut bodies, &mut contacts, &mut [], 1.0 / 60.0);
        assert_relative_eq!(bodies[1].velocity.linear.y, 2.0, epsilon = 1e-3);
    }

    #[test]
    fn relative_angles_measure_twist_about_each_axis() {
        let a = Transform::IDENTITY;
        let b = Transform::from_position_rotation(Vec3::ZERO, Quat::from_rotation_x(0.4));
        let angles = relative_angles(&a, &b);
        assert_relative_eq!(angles.x, 0.4, epsilon = 1e-5);
        assert_relative_eq!(angles.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn limited_axis_only_pushes_back_inside() {
        assert_eq!(limit_impulse(AxisMode::Limited, 0.5, 0.0, 1.0, 3.0, 0.0, 1.0, 0.1, 10.0), 0.0);
        assert!(limit_impulse(AxisMode::Limited, 1.2, 0.0, 1.0, 1.0, 0.0, 1.0, 0.1, 10.0) < 0.0);
        assert!(limit_impulse(AxisMode::Limited, -0.1, 0.0, 1.0, -1.0, 0.0, 1.0, 0.1, 10.0) > 0.0);
        assert_eq!(limit_impulse(AxisMode::Free, 5.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.1, 10.0), 0.0);
    }
}
