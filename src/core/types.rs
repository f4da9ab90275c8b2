use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position, orientation and non-uniform scale of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Self::IDENTITY
        }
    }

    /// Applies another transform on top of this one, returning the composition.
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * (self.scale * other.position),
            rotation: (self.rotation * other.rotation).normalize(),
            scale: self.scale * other.scale,
        }
    }

    /// Inverse of a rigid (unit scale) transform.
    pub fn inverse(&self) -> Transform {
        let inv_rot = self.rotation.conjugate();
        let inv_scale = self.scale.recip();
        Transform {
            position: inv_scale * (inv_rot * -self.position),
            rotation: inv_rot,
            scale: inv_scale,
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * (self.scale * point)
    }

    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        (self.rotation.conjugate() * (point - self.position)) / self.scale
    }

    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * vector
    }

    /// Position and rotation only.
    pub fn rigid(&self) -> Transform {
        Transform {
            scale: Vec3::ONE,
            ..*self
        }
    }

    /// Same transform with its translation multiplied by `factor`.
    pub fn scaled_translation(&self, factor: f32) -> Transform {
        Transform {
            position: self.position * factor,
            ..*self
        }
    }
}

/// Linear and angular velocity pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

/// Surface response coefficients of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub friction: f32,
    pub elasticity: f32,
    /// Resistance to rolling at the contact patch.
    pub rolling_friction: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            friction: 0.5,
            elasticity: 0.0,
            rolling_friction: 0.0,
        }
    }
}

impl Material {
    pub fn combine_with(&self, other: &Self) -> MaterialPairProperties {
        MaterialPairProperties {
            friction: (self.friction.max(0.0) * other.friction.max(0.0)).sqrt(),
            restitution: (self.elasticity.max(0.0) * other.elasticity.max(0.0)).sqrt(),
            rolling_friction: 0.5 * (self.rolling_friction + other.rolling_friction),
        }
    }
}

/// Coefficients resolved for one contacting pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialPairProperties {
    pub friction: f32,
    pub restitution: f32,
    pub rolling_friction: f32,
}

impl Default for MaterialPairProperties {
    fn default() -> Self {
        Material::default().combine_with(&Material::default())
    }
}

/// Infinite plane `normal · p = distance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self {
            normal: normal.normalize_or(Vec3::Y),
            distance,
        }
    }

    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize_or(Vec3::Y);
        Self {
            normal,
            distance: normal.dot(point),
        }
    }

    /// Signed distance of `point`, positive on the side the normal points to.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }

    pub fn transformed(&self, transform: &Transform) -> Plane {
        let point = transform.transform_point(self.normal * self.distance);
        Plane::from_point_normal(point, transform.rotation * self.normal)
    }
}

/// Helper methods for inertia calculations.
pub trait InertiaTensorExt {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Mat3;
    fn for_solid_sphere(radius: f32, mass: f32) -> Mat3;
}

impl InertiaTensorExt for Mat3 {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Mat3 {
        let lx = half_extents.x * 2.0;
        let ly = half_extents.y * 2.0;
        let lz = half_extents.z * 2.0;
        let factor = mass / 12.0;
        Mat3::from_diagonal(Vec3::new(
            factor * (ly * ly + lz * lz),
            factor * (lx * lx + lz * lz),
            factor * (lx * lx + ly * ly),
        ))
    }

    fn for_solid_sphere(radius: f32, mass: f32) -> Mat3 {
        let value = 0.4 * mass * radius * radius;
        Mat3::from_diagonal(Vec3::splat(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn inverse_undoes_rigid_transform() {
        let t = Transform::from_position_rotation(
            Vec3::new(1.0, 2.0, -3.0),
            Quat::from_rotation_y(0.7),
        );
        let p = Vec3::new(0.5, -0.25, 4.0);
        let back = t.inverse().transform_point(t.transform_point(p));
        assert_relative_eq!(back.x, p.x, epsilon = 1e-5);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-5);
        assert_relative_eq!(back.z, p.z, epsilon = 1e-5);
    }

    #[test]
    fn material_pair_uses_geometric_mean() {
        let a = Material {
            friction: 0.8,
            elasticity: 0.5,
            rolling_friction: 0.0,
        };
        let b = Material {
            friction: 0.2,
            elasticity: 0.5,
            rolling_friction: 0.1,
        };
        let pair = a.combine_with(&b);
        assert_relative_eq!(pair.friction, 0.4, epsilon = 1e-6);
        assert_relative_eq!(pair.restitution, 0.5, epsilon = 1e-6);
        assert_relative_eq!(pair.rolling_friction, 0.05, epsilon = 1e-6);
    }

    #[test]
    fn plane_signed_distance_follows_normal() {
        let plane = Plane::from_point_normal(Vec3::new(0.0, 2.0, 0.0), Vec3::Y);
        assert_relative_eq!(plane.signed_distance(Vec3::new(5.0, 3.0, 1.0)), 1.0);
        assert_relative_eq!(plane.signed_distance(Vec3::ZERO), -2.0);
    }
}
