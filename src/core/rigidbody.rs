use std::sync::Arc;

use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

use super::types::{Material, Velocity};
use crate::{config::DEFAULT_LINEAR_DAMPING, scene::KinematicCallback};

/// Motion state of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RigidBodyState {
    /// Never moves; zero inverse mass.
    Static,
    /// Follows a transform supplied by its [`KinematicCallback`].
    Kinematic,
    /// Integrated from forces, torques and contacts.
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MassSource {
    Mass,
    Density,
}

/// Mass and motion state of a rigid physical body.
///
/// Setters and getters take world units. Internally the linear quantities
/// are stored in backend units (`unit_scale` times world units).
#[derive(Clone)]
pub struct RigidBody {
    state: RigidBodyState,
    mass: f32,
    density: f32,
    mass_source: MassSource,
    volume: f32,
    pub(crate) velocity: Velocity,
    pub(crate) force: Vec3,
    pub(crate) torque: Vec3,
    pub(crate) material: Material,
    linear_damping: f32,
    angular_damping: f32,
    gravity_enabled: bool,
    enabled: bool,
    pub(crate) sleep_timer: f32,
    kinematic_callback: Option<Arc<dyn KinematicCallback>>,
    pub(crate) local_inertia: Mat3,
    pub(crate) inverse_inertia_local: Mat3,
    pub(crate) unit_scale: f32,
}

impl std::fmt::Debug for RigidBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigidBody")
            .field("state", &self.state)
            .field("mass", &self.mass)
            .field("density", &self.density)
            .field("velocity", &self.velocity)
            .field("enabled", &self.enabled)
            .field("kinematic_callback", &self.kinematic_callback.is_some())
            .finish()
    }
}

impl Default for RigidBody {
    fn default() -> Self {
        let mut body = Self {
            state: RigidBodyState::Dynamic,
            mass: 1.0,
            density: 0.0,
            mass_source: MassSource::Mass,
            volume: 0.0,
            velocity: Velocity::default(),
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            material: Material::default(),
            linear_damping: DEFAULT_LINEAR_DAMPING,
            angular_damping: DEFAULT_LINEAR_DAMPING,
            gravity_enabled: true,
            enabled: true,
            sleep_timer: 0.0,
            kinematic_callback: None,
            local_inertia: Mat3::IDENTITY,
            inverse_inertia_local: Mat3::IDENTITY,
            unit_scale: 1.0,
        };
        body.recompute_inverses();
        body
    }
}

impl RigidBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RigidBodyState {
        self.state
    }

    pub fn set_state(&mut self, state: RigidBodyState) {
        if self.state == state {
            return;
        }
        self.state = state;
        if state != RigidBodyState::Dynamic {
            self.velocity = Velocity::default();
            self.force = Vec3::ZERO;
            self.torque = Vec3::ZERO;
        }
        self.sleep_timer = 0.0;
    }

    pub fn is_dynamic(&self) -> bool {
        self.state == RigidBodyState::Dynamic
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Sets the mass; density follows from the collider volume.
    pub fn set_mass(&mut self, mass: f32) {
        self.mass = mass.max(0.0);
        self.mass_source = MassSource::Mass;
        if self.volume > f32::EPSILON {
            self.density = self.mass / self.volume;
        }
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    /// Sets the density; mass follows from the collider volume.
    pub fn set_density(&mut self, density: f32) {
        self.density = density.max(0.0);
        self.mass_source = MassSource::Density;
        self.mass = self.density * self.volume;
    }

    /// Total collider volume in world units.
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Re-derives mass or density after the collider volume changed.
    pub(crate) fn set_volume(&mut self, volume: f32) {
        self.volume = volume.max(0.0);
        match self.mass_source {
            MassSource::Mass => {
                if self.volume > f32::EPSILON {
                    self.density = self.mass / self.volume;
                }
            }
            MassSource::Density => self.mass = self.density * self.volume,
        }
    }

    /// Body-space inertia per unit mass, in backend units.
    pub(crate) fn set_local_inertia(&mut self, inertia: Mat3) {
        self.local_inertia = inertia;
        self.recompute_inverses();
    }

    /// Inverse mass seen by the solver; zero unless the body is dynamic.
    pub fn inverse_mass(&self) -> f32 {
        if self.is_dynamic() && self.mass > f32::EPSILON {
            1.0 / self.mass
        } else {
            0.0
        }
    }

    /// Body-space inverse inertia for the current mass.
    pub(crate) fn inverse_inertia(&self) -> Mat3 {
        self.inverse_inertia_local * self.inverse_mass()
    }

    fn recompute_inverses(&mut self) {
        let inverse = self.local_inertia.inverse();
        self.inverse_inertia_local =
            if self.local_inertia.determinant().abs() < f32::EPSILON || !inverse.is_finite() {
                Mat3::ZERO
            } else {
                inverse
            };
    }

    pub fn linear_velocity(&self) -> Vec3 {
        self.velocity.linear / self.unit_scale
    }

    pub fn set_linear_velocity(&mut self, velocity: Vec3) {
        if self.is_dynamic() {
            self.velocity.linear = velocity * self.unit_scale;
            self.sleep_timer = 0.0;
        }
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.velocity.angular
    }

    pub fn set_angular_velocity(&mut self, velocity: Vec3) {
        if self.is_dynamic() {
            self.velocity.angular = velocity;
            self.sleep_timer = 0.0;
        }
    }

    /// Adds a world-space force through the center of mass.
    pub fn add_force(&mut self, force: Vec3) {
        if self.is_dynamic() {
            self.force += force * self.unit_scale;
            self.sleep_timer = 0.0;
        }
    }

    pub fn add_torque(&mut self, torque: Vec3) {
        if self.is_dynamic() {
            self.torque += torque * self.unit_scale * self.unit_scale;
            self.sleep_timer = 0.0;
        }
    }

    /// Force accumulated since the last step.
    pub fn force(&self) -> Vec3 {
        self.force / self.unit_scale
    }

    pub fn torque(&self) -> Vec3 {
        self.torque / (self.unit_scale * self.unit_scale)
    }

    pub(crate) fn clear_forces(&mut self) {
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }

    pub fn friction(&self) -> f32 {
        self.material.friction
    }

    pub fn set_friction(&mut self, friction: f32) {
        self.material.friction = friction.max(0.0);
    }

    pub fn elasticity(&self) -> f32 {
        self.material.elasticity
    }

    pub fn set_elasticity(&mut self, elasticity: f32) {
        self.material.elasticity = elasticity.clamp(0.0, 1.0);
    }

    pub fn rolling_friction(&self) -> f32 {
        self.material.rolling_friction
    }

    pub fn set_rolling_friction(&mut self, friction: f32) {
        self.material.rolling_friction = friction.max(0.0);
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn linear_damping(&self) -> f32 {
        self.linear_damping
    }

    pub fn set_linear_damping(&mut self, damping: f32) {
        self.linear_damping = damping.clamp(0.0, 1.0);
    }

    pub fn angular_damping(&self) -> f32 {
        self.angular_damping
    }

    pub fn set_angular_damping(&mut self, damping: f32) {
        self.angular_damping = damping.clamp(0.0, 1.0);
    }

    pub fn gravity_enabled(&self) -> bool {
        self.gravity_enabled
    }

    pub fn set_gravity_enabled(&mut self, enabled: bool) {
        self.gravity_enabled = enabled;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
        self.sleep_timer = 0.0;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        self.velocity = Velocity::default();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn kinematic_callback(&self) -> Option<&Arc<dyn KinematicCallback>> {
        self.kinematic_callback.as_ref()
    }

    pub fn set_kinematic_callback(&mut self, callback: Option<Arc<dyn KinematicCallback>>) {
        self.kinematic_callback = callback;
    }

    /// Converts backend-unit state from the current scale to `scale`.
    pub(crate) fn rescale(&mut self, scale: f32) {
        let ratio = scale / self.unit_scale;
        self.velocity.linear *= ratio;
        self.force *= ratio;
        self.torque *= ratio * ratio;
        self.local_inertia *= ratio * ratio;
        self.recompute_inverses();
        self.unit_scale = scale;
    }
}
