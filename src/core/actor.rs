//! Kinematic character controller state carried by actor objects.
//!
//! The controller itself runs inside the sector step; this type only holds
//! the walking, jumping and slope parameters in world units.

use glam::{EulerRot, Quat, Vec3};

#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    walk_velocity: Vec3,
    pub(crate) vertical_speed: f32,
    timed_remaining: Option<f32>,
    up_axis: usize,
    rotation: Vec3,
    pub(crate) rotation_dirty: bool,
    fall_speed: f32,
    jump_speed: f32,
    max_jump_height: Option<f32>,
    max_slope: f32,
    step_height: f32,
    pub(crate) on_ground: bool,
    pub(crate) jump_requested: bool,
}

impl Default for Actor {
    fn default() -> Self {
        Self {
            walk_velocity: Vec3::ZERO,
            vertical_speed: 0.0,
            timed_remaining: None,
            up_axis: 1,
            rotation: Vec3::ZERO,
            rotation_dirty: false,
            fall_speed: 55.0,
            jump_speed: 10.0,
            max_jump_height: None,
            max_slope: 45f32.to_radians(),
            step_height: 0.35,
            on_ground: false,
            jump_requested: false,
        }
    }
}

impl Actor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on_ground(&self) -> bool {
        self.on_ground
    }

    /// Euler angles (X, Y, Z) applied to the object and its camera on the next step.
    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: Vec3) {
        self.rotation = rotation;
        self.rotation_dirty = true;
    }

    pub(crate) fn rotation_quat(&self) -> Quat {
        Quat::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z)
    }

    pub fn up_axis(&self) -> usize {
        self.up_axis
    }

    /// Selects the world axis (0, 1 or 2) treated as up; other values are ignored.
    pub fn set_up_axis(&mut self, axis: usize) {
        if axis < 3 {
            self.up_axis = axis;
        }
    }

    pub(crate) fn up(&self) -> Vec3 {
        Vec3::AXES[self.up_axis]
    }

    pub fn velocity(&self) -> Vec3 {
        self.walk_velocity
    }

    /// Walking velocity; the component along the up axis is ignored.
    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.walk_velocity = velocity;
        self.timed_remaining = None;
    }

    /// Walks with `velocity` for `interval` seconds, then stops.
    pub fn set_velocity_for_time_interval(&mut self, velocity: Vec3, interval: f32) {
        if interval > 0.0 {
            self.walk_velocity = velocity;
            self.timed_remaining = Some(interval);
        } else {
            self.walk_velocity = Vec3::ZERO;
            self.timed_remaining = None;
        }
    }

    pub(crate) fn horizontal_velocity(&self) -> Vec3 {
        let up = self.up();
        self.walk_velocity - up * self.walk_velocity.dot(up)
    }

    /// Counts down a timed walk.
    pub(crate) fn advance_timer(&mut self, dt: f32) {
        if let Some(remaining) = &mut self.timed_remaining {
            *remaining -= dt;
            if *remaining <= 0.0 {
                self.walk_velocity = Vec3::ZERO;
                self.timed_remaining = None;
            }
        }
    }

    pub fn fall_speed(&self) -> f32 {
        self.fall_speed
    }

    /// Terminal falling speed.
    pub fn set_fall_speed(&mut self, speed: f32) {
        self.fall_speed = speed.abs();
    }

    pub fn jump_speed(&self) -> f32 {
        self.jump_speed
    }

    pub fn set_jump_speed(&mut self, speed: f32) {
        self.jump_speed = speed.abs();
    }

    pub fn max_jump_height(&self) -> Option<f32> {
        self.max_jump_height
    }

    pub fn set_max_jump_height(&mut self, height: f32) {
        self.max_jump_height = (height > 0.0).then_some(height);
    }

    /// Takeoff speed under `gravity`, capped by the maximum jump height.
    pub(crate) fn takeoff_speed(&self, gravity: f32) -> f32 {
        match self.max_jump_height {
            Some(height) if gravity > 0.0 => self.jump_speed.min((2.0 * gravity * height).sqrt()),
            _ => self.jump_speed,
        }
    }

    /// Requests a jump; ignored unless the actor stands on the ground.
    pub fn jump(&mut self) {
        if self.on_ground {
            self.jump_requested = true;
        }
    }

    pub fn max_slope(&self) -> f32 {
        self.max_slope
    }

    /// Steepest walkable slope, in radians.
    pub fn set_max_slope(&mut self, radians: f32) {
        self.max_slope = radians.clamp(0.0, std::f32::consts::FRAC_PI_2);
    }

    pub fn step_height(&self) -> f32 {
        self.step_height
    }

    pub fn set_step_height(&mut self, height: f32) {
        self.step_height = height.max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn timed_velocity_expires() {
        let mut actor = Actor::new();
        actor.set_velocity_for_time_interval(Vec3::X, 0.5);
        actor.advance_timer(0.25);
        assert_eq!(actor.velocity(), Vec3::X);
        actor.advance_timer(0.3);
        assert_eq!(actor.velocity(), Vec3::ZERO);

        actor.set_velocity_for_time_interval(Vec3::X, -1.0);
        assert_eq!(actor.velocity(), Vec3::ZERO);
    }

    #[test]
    fn jump_height_caps_takeoff_speed() {
        let mut actor = Actor::new();
        actor.set_jump_speed(20.0);
        actor.set_max_jump_height(1.0);
        assert_relative_eq!(actor.takeoff_speed(9.8), (2.0f32 * 9.8).sqrt(), epsilon = 1e-5);
        assert_relative_eq!(actor.takeoff_speed(0.0), 20.0);
    }

    #[test]
    fn jump_needs_ground() {
        let mut actor = Actor::new();
        actor.jump();
        assert!(!actor.jump_requested);
        actor.on_ground = true;
        actor.jump();
        assert!(actor.jump_requested);
    }

    #[test]
    fn horizontal_velocity_drops_up_component() {
        let mut actor = Actor::new();
        actor.set_velocity(Vec3::new(1.0, 3.0, 2.0));
        assert_eq!(actor.horizontal_velocity(), Vec3::new(1.0, 0.0, 2.0));
        actor.set_up_axis(2);
        assert_eq!(actor.horizontal_velocity(), Vec3::new(1.0, 3.0, 0.0));
    }
}
