//! Constraint descriptors over one or two physical bodies.
//!
//! A joint carries its configuration in world units. `rebuild_joint` on the
//! owning sector resolves the body-local frames the solver works with;
//! structural changes (kind, constrained axes, bodies, frame) only take effect
//! after a rebuild while numeric limits, motors and springs apply live.

use glam::{Quat, Vec3};
use log::warn;

use crate::{
    core::{
        handle::{JointHandle, ObjectHandle},
        object::{CollisionObject, CollisionObjectType},
        types::Transform,
    },
    error::{CollisionError, CollisionResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointType {
    /// Generic joint with per-axis limits and springs.
    SixDof,
    /// Ball joint: positions locked, rotations free.
    P2p,
    /// Single rotational axis, optionally limited and motorized.
    Hinge,
    /// Translation along the frame X axis, rotation locked.
    Slide,
    /// Drags one body towards a movable world position.
    Pivot,
    /// Pins a soft body vertex to another body.
    SoftLinear,
    /// Couples the twist of a soft body to another body.
    SoftAngular,
}

impl JointType {
    pub fn is_soft(self) -> bool {
        matches!(self, JointType::SoftLinear | JointType::SoftAngular)
    }
}

/// How one degree of freedom is treated by the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisMode {
    Free,
    Limited,
    Locked,
}

/// Body-local frames resolved when the joint is rebuilt, in backend units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct JointFrame {
    pub local_a: Transform,
    pub local_b: Transform,
    /// Soft body vertices bound by the soft constraint family.
    pub soft_nodes: [Option<usize>; 2],
}

#[derive(Debug, Clone)]
pub struct Joint {
    joint_type: JointType,
    pub(crate) bodies: [Option<ObjectHandle>; 2],
    transform: Transform,
    trans_constraints: [bool; 3],
    rot_constraints: [bool; 3],
    min_distance: Vec3,
    max_distance: Vec3,
    min_angle: Vec3,
    max_angle: Vec3,
    bounce: Vec3,
    desired_velocity: Vec3,
    max_force: Vec3,
    spring: bool,
    linear_stiffness: Vec3,
    angular_stiffness: Vec3,
    linear_damping: Vec3,
    angular_damping: Vec3,
    linear_equilibrium: Vec3,
    angular_equilibrium: Vec3,
    breaking_threshold: f32,
    pub(crate) frame: Option<JointFrame>,
    pub(crate) broken: bool,
    pub(crate) handle: Option<JointHandle>,
    pub(crate) unit_scale: f32,
}

impl Joint {
    /// Unconstrained 6-DOF joint.
    pub fn new(joint_type: JointType) -> Self {
        Self {
            joint_type,
            bodies: [None, None],
            transform: Transform::IDENTITY,
            trans_constraints: [false; 3],
            rot_constraints: [false; 3],
            min_distance: Vec3::ZERO,
            max_distance: Vec3::ZERO,
            min_angle: Vec3::ZERO,
            max_angle: Vec3::ZERO,
            bounce: Vec3::ZERO,
            desired_velocity: Vec3::ZERO,
            max_force: Vec3::ZERO,
            spring: false,
            linear_stiffness: Vec3::ZERO,
            angular_stiffness: Vec3::ZERO,
            linear_damping: Vec3::ZERO,
            angular_damping: Vec3::ZERO,
            linear_equilibrium: Vec3::ZERO,
            angular_equilibrium: Vec3::ZERO,
            breaking_threshold: f32::INFINITY,
            frame: None,
            broken: false,
            handle: None,
            unit_scale: 1.0,
        }
    }

    pub fn p2p(position: Vec3) -> Self {
        let mut joint = Self::new(JointType::P2p);
        joint.transform = Transform::from_position(position);
        joint.trans_constraints = [true; 3];
        joint
    }

    /// Slides along `axis` between `min_distance` and `max_distance`.
    pub fn slide(position: Vec3, axis: Vec3, min_distance: f32, max_distance: f32) -> Self {
        let mut joint = Self::new(JointType::Slide);
        joint.transform = Transform::from_position_rotation(position, axis_frame(axis));
        joint.trans_constraints = [true; 3];
        joint.rot_constraints = [true; 3];
        joint.min_distance.x = min_distance;
        joint.max_distance.x = max_distance;
        joint
    }

    /// Rotates about `axis`; a range with `min_angle > max_angle` leaves it free.
    pub fn hinge(position: Vec3, axis: Vec3, min_angle: f32, max_angle: f32) -> Self {
        let mut joint = Self::new(JointType::Hinge);
        joint.transform = Transform::from_position_rotation(position, axis_frame(axis));
        joint.trans_constraints = [true; 3];
        joint.rot_constraints = [true; 3];
        joint.min_angle.x = min_angle;
        joint.max_angle.x = max_angle;
        joint
    }

    pub fn pivot(position: Vec3) -> Self {
        let mut joint = Self::p2p(position);
        joint.joint_type = JointType::Pivot;
        joint
    }

    pub fn soft_linear(position: Vec3) -> Self {
        let mut joint = Self::p2p(position);
        joint.joint_type = JointType::SoftLinear;
        joint
    }

    pub fn soft_angular(axis: Vec3) -> Self {
        let mut joint = Self::new(JointType::SoftAngular);
        joint.transform = Transform::from_position_rotation(Vec3::ZERO, axis_frame(axis));
        joint.rot_constraints = [false, true, true];
        joint
    }

    pub fn joint_type(&self) -> JointType {
        self.joint_type
    }

    pub fn handle(&self) -> Option<JointHandle> {
        self.handle
    }

    pub fn body(&self, index: usize) -> Option<ObjectHandle> {
        self.bodies.get(index).copied().flatten()
    }

    /// Binds the joint to one or two physical bodies of the same sector.
    ///
    /// When exactly one body is a static rigid body it becomes the first one.
    /// Any soft body routes the joint to the soft constraint family.
    pub fn attach(
        &mut self,
        body_a: &CollisionObject,
        body_b: Option<&CollisionObject>,
    ) -> CollisionResult<()> {
        let handle_a = physical_handle(body_a)?;
        let handle_b = body_b.map(physical_handle).transpose()?;

        if let Some(b) = handle_b {
            if b.sector != handle_a.sector {
                warn!("joint bodies live in different sectors; joint not attached");
                return Err(CollisionError::CrossSectorJoint);
            }
        }

        let any_soft =
            body_a.soft_body().is_some() || body_b.is_some_and(|b| b.soft_body().is_some());
        if any_soft {
            if !self.joint_type.is_soft() {
                self.joint_type = if self.joint_type == JointType::Hinge {
                    JointType::SoftAngular
                } else {
                    JointType::SoftLinear
                };
            }
        } else if self.joint_type.is_soft() {
            self.joint_type = JointType::P2p;
        }

        let static_a = body_a.is_static();
        let static_b = body_b.is_some_and(|b| b.is_static());
        self.bodies = match handle_b {
            Some(b) if static_b && !static_a => [Some(b), Some(handle_a)],
            _ => [Some(handle_a), handle_b],
        };
        // Soft bodies go first so the solver knows which side carries vertices.
        if any_soft {
            if let (Some(b), true) = (body_b, body_a.soft_body().is_none()) {
                if b.soft_body().is_some() {
                    self.bodies = [handle_b, Some(handle_a)];
                }
            }
        }
        self.frame = None;
        Ok(())
    }

    /// Joint frame in world units.
    pub fn transform(&self) -> Transform {
        self.transform.scaled_translation(1.0 / self.unit_scale)
    }

    /// Replaces the joint frame. Takes effect after a rebuild.
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform.scaled_translation(self.unit_scale);
        self.frame = None;
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position / self.unit_scale
    }

    /// Moves the anchor point; pivot joints follow it live.
    pub fn set_position(&mut self, position: Vec3) {
        self.transform.position = position * self.unit_scale;
        if self.joint_type == JointType::Pivot {
            if let Some(frame) = &mut self.frame {
                frame.local_b = Transform::from_position(self.transform.position);
            }
        } else {
            self.frame = None;
        }
    }

    pub(crate) fn backend_transform(&self) -> Transform {
        self.transform
    }

    pub fn set_trans_constraints(&mut self, x: bool, y: bool, z: bool) {
        self.trans_constraints = [x, y, z];
        self.frame = None;
    }

    pub fn set_rot_constraints(&mut self, x: bool, y: bool, z: bool) {
        self.rot_constraints = [x, y, z];
        self.frame = None;
    }

    pub fn trans_constraints(&self) -> [bool; 3] {
        self.trans_constraints
    }

    pub fn rot_constraints(&self) -> [bool; 3] {
        self.rot_constraints
    }

    pub fn trans_axis_mode(&self, axis: usize) -> AxisMode {
        axis_mode(
            self.trans_constraints[axis],
            self.min_distance[axis],
            self.max_distance[axis],
        )
    }

    pub fn rot_axis_mode(&self, axis: usize) -> AxisMode {
        axis_mode(
            self.rot_constraints[axis],
            self.min_angle[axis],
            self.max_angle[axis],
        )
    }

    pub fn minimum_distance(&self) -> Vec3 {
        self.min_distance
    }

    pub fn set_minimum_distance(&mut self, distance: Vec3) {
        self.min_distance = distance;
    }

    pub fn maximum_distance(&self) -> Vec3 {
        self.max_distance
    }

    pub fn set_maximum_distance(&mut self, distance: Vec3) {
        self.max_distance = distance;
    }

    pub fn minimum_angle(&self) -> Vec3 {
        self.min_angle
    }

    pub fn set_minimum_angle(&mut self, angle: Vec3) {
        self.min_angle = angle;
    }

    pub fn maximum_angle(&self) -> Vec3 {
        self.max_angle
    }

    pub fn set_maximum_angle(&mut self, angle: Vec3) {
        self.max_angle = angle;
    }

    pub(crate) fn scaled_distance_limits(&self) -> (Vec3, Vec3) {
        (
            self.min_distance * self.unit_scale,
            self.max_distance * self.unit_scale,
        )
    }

    pub fn bounce(&self) -> Vec3 {
        self.bounce
    }

    pub fn set_bounce(&mut self, bounce: Vec3) {
        self.bounce = bounce.clamp(Vec3::ZERO, Vec3::ONE);
    }

    /// Target angular velocity of the motor, per frame axis.
    pub fn desired_velocity(&self) -> Vec3 {
        self.desired_velocity
    }

    pub fn set_desired_velocity(&mut self, velocity: Vec3) {
        self.desired_velocity = velocity;
    }

    pub fn max_force(&self) -> Vec3 {
        self.max_force
    }

    pub fn set_max_force(&mut self, force: Vec3) {
        self.max_force = force.max(Vec3::ZERO);
    }

    pub fn spring(&self) -> bool {
        self.spring
    }

    pub fn set_spring(&mut self, enabled: bool) {
        self.spring = enabled;
    }

    pub fn linear_stiffness(&self) -> Vec3 {
        self.linear_stiffness
    }

    pub fn set_linear_stiffness(&mut self, stiffness: Vec3) {
        self.linear_stiffness = stiffness.max(Vec3::ZERO);
    }

    pub fn angular_stiffness(&self) -> Vec3 {
        self.angular_stiffness
    }

    pub fn set_angular_stiffness(&mut self, stiffness: Vec3) {
        self.angular_stiffness = stiffness.max(Vec3::ZERO);
    }

    pub fn linear_damping(&self) -> Vec3 {
        self.linear_damping
    }

    pub fn set_linear_damping(&mut self, damping: Vec3) {
        self.linear_damping = damping.max(Vec3::ZERO);
    }

    pub fn angular_damping(&self) -> Vec3 {
        self.angular_damping
    }

    pub fn set_angular_damping(&mut self, damping: Vec3) {
        self.angular_damping = damping.max(Vec3::ZERO);
    }

    pub fn linear_equilibrium_point(&self) -> Vec3 {
        self.linear_equilibrium
    }

    pub fn set_linear_equilibrium_point(&mut self, point: Vec3) {
        self.linear_equilibrium = point;
    }

    pub fn angular_equilibrium_point(&self) -> Vec3 {
        self.angular_equilibrium
    }

    pub fn set_angular_equilibrium_point(&mut self, point: Vec3) {
        self.angular_equilibrium = point;
    }

    pub(crate) fn scaled_linear_equilibrium(&self) -> Vec3 {
        self.linear_equilibrium * self.unit_scale
    }

    pub fn breaking_impulse_threshold(&self) -> f32 {
        self.breaking_threshold
    }

    pub fn set_breaking_impulse_threshold(&mut self, threshold: f32) {
        self.breaking_threshold = if threshold > 0.0 {
            threshold
        } else {
            f32::INFINITY
        };
    }

    /// True once an impulse above the breaking threshold disabled the joint.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn is_built(&self) -> bool {
        self.frame.is_some()
    }

    pub(crate) fn rescale(&mut self, scale: f32) {
        let ratio = scale / self.unit_scale;
        self.transform.position *= ratio;
        if let Some(frame) = &mut self.frame {
            frame.local_a.position *= ratio;
            frame.local_b.position *= ratio;
        }
        self.unit_scale = scale;
    }
}

fn axis_mode(constrained: bool, min: f32, max: f32) -> AxisMode {
    if !constrained {
        AxisMode::Free
    } else if min == max {
        AxisMode::Locked
    } else if min < max {
        AxisMode::Limited
    } else {
        AxisMode::Free
    }
}

/// Rotation taking the frame X axis onto `axis`.
fn axis_frame(axis: Vec3) -> Quat {
    Quat::from_rotation_arc(Vec3::X, axis.normalize_or(Vec3::X))
}

fn physical_handle(object: &CollisionObject) -> CollisionResult<ObjectHandle> {
    if object.object_type() != CollisionObjectType::Physical {
        warn!("joints can only bind physical bodies, got {:?}", object.object_type());
        return Err(CollisionError::NotPhysical);
    }
    object.handle().ok_or_else(|| {
        warn!("joint body is not part of a sector");
        CollisionError::NotInSector
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_modes_follow_constraints_and_limits() {
        let mut joint = Joint::new(JointType::SixDof);
        assert_eq!(joint.trans_axis_mode(0), AxisMode::Free);
        joint.set_trans_constraints(true, true, false);
        joint.set_minimum_distance(Vec3::new(0.0, -1.0, 0.0));
        joint.set_maximum_distance(Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(joint.trans_axis_mode(0), AxisMode::Locked);
        assert_eq!(joint.trans_axis_mode(1), AxisMode::Limited);
        assert_eq!(joint.trans_axis_mode(2), AxisMode::Free);
    }

    #[test]
    fn hinge_with_inverted_range_is_free() {
        let hinge = Joint::hinge(Vec3::ZERO, Vec3::Z, 1.0, -1.0);
        assert_eq!(hinge.rot_axis_mode(0), AxisMode::Free);
        assert_eq!(hinge.rot_axis_mode(1), AxisMode::Locked);
        let axis = hinge.transform().rotation * Vec3::X;
        assert!((axis - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn non_positive_threshold_means_unbreakable() {
        let mut joint = Joint::p2p(Vec3::ZERO);
        joint.set_breaking_impulse_threshold(0.0);
        assert!(joint.breaking_impulse_threshold().is_infinite());
        joint.set_breaking_impulse_threshold(5.0);
        assert_eq!(joint.breaking_impulse_threshold(), 5.0);
    }
}
