//! Backend collision shapes, materialized from colliders in backend units.
//!
//! Round shapes are aligned with the local Y axis and centered on the origin.

use std::{f32::consts::PI, sync::Arc};

use glam::{Mat3, Vec3};

use crate::{
    core::{
        mesh::{Aabb, TriangleMesh},
        terrain::TerrainCollider,
        types::{InertiaTensorExt, Plane, Transform},
    },
    utils::math::{inertia_capsule, inertia_cone, inertia_cylinder},
};

/// Shape handed to the narrow phase and the ray caster.
#[derive(Debug, Clone)]
pub enum Shape {
    Sphere {
        radius: f32,
    },
    Box {
        half_extents: Vec3,
    },
    Capsule {
        radius: f32,
        half_height: f32,
    },
    Cylinder {
        radius: f32,
        half_height: f32,
    },
    Cone {
        radius: f32,
        half_height: f32,
    },
    Plane {
        plane: Plane,
    },
    ConvexHull {
        mesh: Arc<TriangleMesh>,
        scale: Vec3,
        margin: f32,
    },
    TriMesh {
        mesh: Arc<TriangleMesh>,
        scale: Vec3,
    },
    Terrain {
        terrain: Arc<TerrainCollider>,
        scale: f32,
    },
}

impl PartialEq for Shape {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Shape::Sphere { radius: a }, Shape::Sphere { radius: b }) => a == b,
            (Shape::Box { half_extents: a }, Shape::Box { half_extents: b }) => a == b,
            (
                Shape::Capsule {
                    radius: ra,
                    half_height: ha,
                },
                Shape::Capsule {
                    radius: rb,
                    half_height: hb,
                },
            )
            | (
                Shape::Cylinder {
                    radius: ra,
                    half_height: ha,
                },
                Shape::Cylinder {
                    radius: rb,
                    half_height: hb,
                },
            )
            | (
                Shape::Cone {
                    radius: ra,
                    half_height: ha,
                },
                Shape::Cone {
                    radius: rb,
                    half_height: hb,
                },
            ) => ra == rb && ha == hb,
            (Shape::Plane { plane: a }, Shape::Plane { plane: b }) => a == b,
            (
                Shape::ConvexHull {
                    mesh: ma,
                    scale: sa,
                    margin: ga,
                },
                Shape::ConvexHull {
                    mesh: mb,
                    scale: sb,
                    margin: gb,
                },
            ) => Arc::ptr_eq(ma, mb) && sa == sb && ga == gb,
            (
                Shape::TriMesh {
                    mesh: ma,
                    scale: sa,
                },
                Shape::TriMesh {
                    mesh: mb,
                    scale: sb,
                },
            ) => Arc::ptr_eq(ma, mb) && sa == sb,
            (
                Shape::Terrain {
                    terrain: ta,
                    scale: sa,
                },
                Shape::Terrain {
                    terrain: tb,
                    scale: sb,
                },
            ) => Arc::ptr_eq(ta, tb) && sa == sb,
            _ => false,
        }
    }
}

impl Shape {
    /// Convex shapes can go through GJK/EPA directly.
    pub fn is_convex(&self) -> bool {
        !matches!(
            self,
            Shape::Plane { .. } | Shape::TriMesh { .. } | Shape::Terrain { .. }
        )
    }

    /// Shapes that may only be attached to static objects.
    pub fn is_static_only(&self) -> bool {
        !self.is_convex()
    }

    /// Local-space support point in direction `dir`.
    pub fn support(&self, dir: Vec3) -> Vec3 {
        match self {
            Shape::Sphere { radius } => dir.normalize_or_zero() * *radius,
            Shape::Box { half_extents } => Vec3::new(
                half_extents.x.copysign(dir.x),
                half_extents.y.copysign(dir.y),
                half_extents.z.copysign(dir.z),
            ),
            Shape::Capsule {
                radius,
                half_height,
            } => {
                let cap = Vec3::Y * half_height.copysign(dir.y);
                cap + dir.normalize_or_zero() * *radius
            }
            Shape::Cylinder {
                radius,
                half_height,
            } => {
                let lateral = Vec3::new(dir.x, 0.0, dir.z).normalize_or_zero() * *radius;
                lateral + Vec3::Y * half_height.copysign(dir.y)
            }
            Shape::Cone {
                radius,
                half_height,
            } => {
                let height = 2.0 * half_height;
                let sin_angle = radius / (radius * radius + height * height).sqrt();
                let len = dir.length();
                if len < 1e-12 {
                    return Vec3::Y * *half_height;
                }
                if dir.y > len * sin_angle {
                    Vec3::Y * *half_height
                } else {
                    let lateral = Vec3::new(dir.x, 0.0, dir.z).normalize_or_zero() * *radius;
                    lateral - Vec3::Y * *half_height
                }
            }
            Shape::ConvexHull {
                mesh,
                scale,
                margin,
            } => {
                mesh.support_point(dir * *scale) * *scale + dir.normalize_or_zero() * *margin
            }
            Shape::TriMesh { mesh, scale } => mesh.support_point(dir * *scale) * *scale,
            Shape::Plane { .. } | Shape::Terrain { .. } => Vec3::ZERO,
        }
    }

    /// World-space support point of this shape posed by `transform`.
    pub fn support_world(&self, transform: &Transform, dir: Vec3) -> Vec3 {
        let local_dir = transform.rotation.conjugate() * dir;
        transform.position + transform.rotation * self.support(local_dir)
    }

    /// Local bounds; infinite for planes.
    pub fn local_aabb(&self) -> Aabb {
        match self {
            Shape::Sphere { radius } => Aabb::from_center_extent(Vec3::ZERO, Vec3::splat(*radius)),
            Shape::Box { half_extents } => Aabb::from_center_extent(Vec3::ZERO, *half_extents),
            Shape::Capsule {
                radius,
                half_height,
            } => Aabb::from_center_extent(
                Vec3::ZERO,
                Vec3::new(*radius, half_height + radius, *radius),
            ),
            Shape::Cylinder {
                radius,
                half_height,
            }
            | Shape::Cone {
                radius,
                half_height,
            } => Aabb::from_center_extent(Vec3::ZERO, Vec3::new(*radius, *half_height, *radius)),
            Shape::ConvexHull {
                mesh,
                scale,
                margin,
            } => scaled_bounds(&mesh.bounds, *scale).expanded(*margin),
            Shape::TriMesh { mesh, scale } => scaled_bounds(&mesh.bounds, *scale),
            Shape::Terrain { terrain, scale } => terrain.bounds(*scale),
            Shape::Plane { .. } => Aabb::new(
                Vec3::splat(f32::NEG_INFINITY),
                Vec3::splat(f32::INFINITY),
            ),
        }
    }

    /// Enclosed volume; zero for shapes that cannot carry mass.
    pub fn volume(&self) -> f32 {
        match self {
            Shape::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
            Shape::Box { half_extents } => 8.0 * half_extents.x * half_extents.y * half_extents.z,
            Shape::Capsule {
                radius,
                half_height,
            } => PI * radius * radius * 2.0 * half_height + 4.0 / 3.0 * PI * radius.powi(3),
            Shape::Cylinder {
                radius,
                half_height,
            } => PI * radius * radius * 2.0 * half_height,
            Shape::Cone {
                radius,
                half_height,
            } => PI * radius * radius * 2.0 * half_height / 3.0,
            Shape::ConvexHull { mesh, scale, .. } => {
                let closed = mesh.signed_volume().abs();
                let volume = if closed > 1e-9 {
                    closed
                } else {
                    let size = mesh.bounds.extent() * 2.0;
                    size.x * size.y * size.z
                };
                volume * (scale.x * scale.y * scale.z).abs()
            }
            Shape::Plane { .. } | Shape::TriMesh { .. } | Shape::Terrain { .. } => 0.0,
        }
    }

    /// Body-space inertia of this shape carrying `mass`.
    pub fn inertia(&self, mass: f32) -> Mat3 {
        match self {
            Shape::Sphere { radius } => Mat3::for_solid_sphere(*radius, mass),
            Shape::Box { half_extents } => Mat3::for_solid_box(*half_extents, mass),
            Shape::Capsule {
                radius,
                half_height,
            } => inertia_capsule(*radius, 2.0 * half_height, mass),
            Shape::Cylinder {
                radius,
                half_height,
            } => inertia_cylinder(*radius, 2.0 * half_height, mass),
            Shape::Cone {
                radius,
                half_height,
            } => inertia_cone(*radius, 2.0 * half_height, mass),
            _ => {
                let bounds = self.local_aabb();
                if bounds.is_finite() {
                    Mat3::for_solid_box(bounds.extent(), mass)
                } else {
                    Mat3::IDENTITY * mass
                }
            }
        }
    }

    /// Point containment used by the marching ray caster.
    pub fn contains_local(&self, p: Vec3) -> bool {
        match self {
            Shape::Sphere { radius } => p.length_squared() <= radius * radius,
            Shape::Box { half_extents } => p.abs().cmple(*half_extents).all(),
            Shape::Capsule {
                radius,
                half_height,
            } => {
                let axis_point = Vec3::Y * p.y.clamp(-half_height, *half_height);
                (p - axis_point).length_squared() <= radius * radius
            }
            Shape::Cylinder {
                radius,
                half_height,
            } => p.y.abs() <= *half_height && p.x * p.x + p.z * p.z <= radius * radius,
            Shape::Cone {
                radius,
                half_height,
            } => {
                if p.y.abs() > *half_height {
                    return false;
                }
                let allowed = radius * (half_height - p.y) / (2.0 * half_height);
                p.x * p.x + p.z * p.z <= allowed * allowed
            }
            Shape::Plane { plane } => plane.signed_distance(p) <= 0.0,
            _ => false,
        }
    }

    /// Outward surface normal of a round shape near local point `p`.
    pub fn normal_local(&self, p: Vec3) -> Vec3 {
        match self {
            Shape::Sphere { .. } => p.normalize_or(Vec3::Y),
            Shape::Capsule { half_height, .. } => {
                let axis_point = Vec3::Y * p.y.clamp(-half_height, *half_height);
                (p - axis_point).normalize_or(Vec3::Y)
            }
            Shape::Cylinder {
                radius,
                half_height,
            } => {
                let radial = Vec3::new(p.x, 0.0, p.z);
                let side_gap = radius - radial.length();
                let cap_gap = half_height - p.y.abs();
                if cap_gap < side_gap {
                    Vec3::Y * p.y.signum()
                } else {
                    radial.normalize_or(Vec3::X)
                }
            }
            Shape::Cone {
                radius,
                half_height,
            } => {
                let height = 2.0 * half_height;
                if (p.y + half_height).abs() < 1e-3 * height.max(1.0) {
                    return Vec3::NEG_Y;
                }
                let radial = Vec3::new(p.x, 0.0, p.z).normalize_or(Vec3::X);
                (radial * height + Vec3::Y * *radius).normalize_or(Vec3::Y)
            }
            Shape::Box { half_extents } => {
                let gap = *half_extents - p.abs();
                if gap.x <= gap.y && gap.x <= gap.z {
                    Vec3::X * p.x.signum()
                } else if gap.y <= gap.z {
                    Vec3::Y * p.y.signum()
                } else {
                    Vec3::Z * p.z.signum()
                }
            }
            Shape::Plane { plane } => plane.normal,
            _ => Vec3::Y,
        }
    }
}

fn scaled_bounds(bounds: &Aabb, scale: Vec3) -> Aabb {
    if !bounds.is_finite() {
        return *bounds;
    }
    let a = bounds.min * scale;
    let b = bounds.max * scale;
    Aabb::new(a.min(b), a.max(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn box_support_picks_corner() {
        let shape = Shape::Box {
            half_extents: Vec3::new(1.0, 2.0, 3.0),
        };
        let p = shape.support(Vec3::new(-1.0, 0.5, -0.1));
        assert_eq!(p, Vec3::new(-1.0, 2.0, -3.0));
    }

    #[test]
    fn cone_support_prefers_apex_upwards() {
        let shape = Shape::Cone {
            radius: 1.0,
            half_height: 1.0,
        };
        assert_eq!(shape.support(Vec3::Y), Vec3::Y);
        let rim = shape.support(Vec3::new(1.0, -0.1, 0.0));
        assert_relative_eq!(rim.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(rim.y, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn volumes_match_closed_forms() {
        let sphere = Shape::Sphere { radius: 1.0 };
        assert_relative_eq!(sphere.volume(), 4.0 / 3.0 * PI, epsilon = 1e-5);
        let cube = Shape::Box {
            half_extents: Vec3::splat(0.5),
        };
        assert_relative_eq!(cube.volume(), 1.0, epsilon = 1e-6);
        let plane = Shape::Plane {
            plane: Plane::new(Vec3::Y, 0.0),
        };
        assert_eq!(plane.volume(), 0.0);
        assert!(!plane.local_aabb().is_finite());
    }

    #[test]
    fn cone_containment_narrows_towards_apex() {
        let cone = Shape::Cone {
            radius: 1.0,
            half_height: 1.0,
        };
        assert!(cone.contains_local(Vec3::new(0.9, -0.99, 0.0)));
        assert!(!cone.contains_local(Vec3::new(0.9, 0.9, 0.0)));
    }
}
