//! Geometry descriptors shared between collision objects.
//!
//! A [`Collider`] keeps its parameters in world units. The backend [`Shape`]
//! is materialized lazily for a given internal scale and cached until the
//! local scale or margin changes.

use std::sync::Arc;

use glam::Vec3;
use log::debug;
use parking_lot::RwLock;

use crate::{
    collision::shapes::Shape,
    config::DEFAULT_COLLIDER_MARGIN,
    core::{mesh::TriangleMesh, terrain::TerrainCollider, types::Plane},
    error::{CollisionError, CollisionResult},
    utils::logging::ReportOnce,
};

/// Kind tag of a collider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColliderType {
    Box,
    Sphere,
    Cylinder,
    Capsule,
    Cone,
    Plane,
    ConvexMesh,
    ConcaveMesh,
    ConcaveMeshScaled,
    Terrain,
}

/// Kind-specific parameters of a collider, in world units.
///
/// Round shapes are aligned with the local Y axis; `length` is the full
/// height of the straight section.
#[derive(Debug, Clone)]
pub enum ColliderGeometry {
    Box { size: Vec3 },
    Sphere { radius: f32 },
    Cylinder { length: f32, radius: f32 },
    Capsule { length: f32, radius: f32 },
    Cone { length: f32, radius: f32 },
    Plane { plane: Plane },
    ConvexMesh { mesh: Arc<TriangleMesh> },
    ConcaveMesh { mesh: Arc<TriangleMesh> },
    ConcaveMeshScaled { parent: Arc<Collider>, scale: Vec3 },
    Terrain { terrain: Arc<TerrainCollider> },
}

#[derive(Debug)]
struct ColliderState {
    local_scale: Vec3,
    margin: f32,
    cache: Option<(u32, Option<Arc<Shape>>)>,
}

#[derive(Debug)]
pub struct Collider {
    geometry: ColliderGeometry,
    state: RwLock<ColliderState>,
    degenerate: ReportOnce,
}

impl Collider {
    fn from_geometry(geometry: ColliderGeometry) -> Self {
        let collider = Self {
            geometry,
            state: RwLock::new(ColliderState {
                local_scale: Vec3::ONE,
                margin: DEFAULT_COLLIDER_MARGIN,
                cache: None,
            }),
            degenerate: ReportOnce::new(),
        };
        if let Some(reason) = collider.degeneracy() {
            collider
                .degenerate
                .warn(&format!("{:?} collider is degenerate: {reason}", collider.geometry_type()));
        }
        collider
    }

    /// Box of full `size` along each axis.
    pub fn new_box(size: Vec3) -> Self {
        Self::from_geometry(ColliderGeometry::Box { size })
    }

    pub fn new_sphere(radius: f32) -> Self {
        Self::from_geometry(ColliderGeometry::Sphere { radius })
    }

    pub fn new_cylinder(length: f32, radius: f32) -> Self {
        Self::from_geometry(ColliderGeometry::Cylinder { length, radius })
    }

    pub fn new_capsule(length: f32, radius: f32) -> Self {
        Self::from_geometry(ColliderGeometry::Capsule { length, radius })
    }

    pub fn new_cone(length: f32, radius: f32) -> Self {
        Self::from_geometry(ColliderGeometry::Cone { length, radius })
    }

    pub fn new_plane(plane: Plane) -> Self {
        Self::from_geometry(ColliderGeometry::Plane { plane })
    }

    pub fn new_convex_mesh(mesh: Arc<TriangleMesh>) -> Self {
        Self::from_geometry(ColliderGeometry::ConvexMesh { mesh })
    }

    pub fn new_concave_mesh(mesh: Arc<TriangleMesh>) -> Self {
        Self::from_geometry(ColliderGeometry::ConcaveMesh { mesh })
    }

    /// Reuses the triangle data of a concave `parent` with a per-axis scale.
    pub fn new_concave_mesh_scaled(parent: Arc<Collider>, scale: Vec3) -> CollisionResult<Self> {
        if parent.geometry_type() != ColliderType::ConcaveMesh {
            log::warn!(
                "scaled concave collider needs a concave mesh parent, got {:?}",
                parent.geometry_type()
            );
            return Err(CollisionError::DegenerateGeometry(
                "scaled concave parent is not a concave mesh",
            ));
        }
        Ok(Self::from_geometry(ColliderGeometry::ConcaveMeshScaled {
            parent,
            scale,
        }))
    }

    pub fn new_terrain(terrain: Arc<TerrainCollider>) -> Self {
        Self::from_geometry(ColliderGeometry::Terrain { terrain })
    }

    pub fn geometry(&self) -> &ColliderGeometry {
        &self.geometry
    }

    pub fn geometry_type(&self) -> ColliderType {
        match &self.geometry {
            ColliderGeometry::Box { .. } => ColliderType::Box,
            ColliderGeometry::Sphere { .. } => ColliderType::Sphere,
            ColliderGeometry::Cylinder { .. } => ColliderType::Cylinder,
            ColliderGeometry::Capsule { .. } => ColliderType::Capsule,
            ColliderGeometry::Cone { .. } => ColliderType::Cone,
            ColliderGeometry::Plane { .. } => ColliderType::Plane,
            ColliderGeometry::ConvexMesh { .. } => ColliderType::ConvexMesh,
            ColliderGeometry::ConcaveMesh { .. } => ColliderType::ConcaveMesh,
            ColliderGeometry::ConcaveMeshScaled { .. } => ColliderType::ConcaveMeshScaled,
            ColliderGeometry::Terrain { .. } => ColliderType::Terrain,
        }
    }

    /// Kinds that may only be used by objects that never move.
    pub fn is_static_only(&self) -> bool {
        matches!(
            self.geometry_type(),
            ColliderType::Plane | ColliderType::ConcaveMesh | ColliderType::ConcaveMeshScaled
        )
    }

    pub fn is_terrain(&self) -> bool {
        matches!(self.geometry, ColliderGeometry::Terrain { .. })
    }

    pub fn box_geometry(&self) -> Option<Vec3> {
        match self.geometry {
            ColliderGeometry::Box { size } => Some(size),
            _ => None,
        }
    }

    pub fn sphere_geometry(&self) -> Option<f32> {
        match self.geometry {
            ColliderGeometry::Sphere { radius } => Some(radius),
            _ => None,
        }
    }

    /// `(length, radius)` of a cylinder.
    pub fn cylinder_geometry(&self) -> Option<(f32, f32)> {
        match self.geometry {
            ColliderGeometry::Cylinder { length, radius } => Some((length, radius)),
            _ => None,
        }
    }

    pub fn capsule_geometry(&self) -> Option<(f32, f32)> {
        match self.geometry {
            ColliderGeometry::Capsule { length, radius } => Some((length, radius)),
            _ => None,
        }
    }

    pub fn cone_geometry(&self) -> Option<(f32, f32)> {
        match self.geometry {
            ColliderGeometry::Cone { length, radius } => Some((length, radius)),
            _ => None,
        }
    }

    pub fn plane_geometry(&self) -> Option<Plane> {
        match self.geometry {
            ColliderGeometry::Plane { plane } => Some(plane),
            _ => None,
        }
    }

    /// Triangle data of a mesh collider; scaled colliders report their parent's.
    pub fn mesh(&self) -> Option<&Arc<TriangleMesh>> {
        match &self.geometry {
            ColliderGeometry::ConvexMesh { mesh } | ColliderGeometry::ConcaveMesh { mesh } => {
                Some(mesh)
            }
            ColliderGeometry::ConcaveMeshScaled { parent, .. } => parent.mesh(),
            _ => None,
        }
    }

    pub fn scaled_parent(&self) -> Option<(&Arc<Collider>, Vec3)> {
        match &self.geometry {
            ColliderGeometry::ConcaveMeshScaled { parent, scale } => Some((parent, *scale)),
            _ => None,
        }
    }

    pub fn terrain(&self) -> Option<&Arc<TerrainCollider>> {
        match &self.geometry {
            ColliderGeometry::Terrain { terrain } => Some(terrain),
            _ => None,
        }
    }

    pub fn local_scale(&self) -> Vec3 {
        self.state.read().local_scale
    }

    /// Changes the scale applied to the geometry. Owners must rebuild to pick it up.
    pub fn set_local_scale(&self, scale: Vec3) {
        let mut state = self.state.write();
        state.local_scale = scale;
        state.cache = None;
    }

    pub fn margin(&self) -> f32 {
        self.state.read().margin
    }

    pub fn set_margin(&self, margin: f32) {
        let mut state = self.state.write();
        state.margin = margin.max(0.0);
        state.cache = None;
    }

    /// True when the source geometry cannot produce any collision shape.
    pub fn is_degenerate(&self) -> bool {
        self.degeneracy().is_some()
    }

    fn degeneracy(&self) -> Option<&'static str> {
        let positive = |v: f32| v.is_finite() && v > 0.0;
        match &self.geometry {
            ColliderGeometry::Box { size } => {
                (!size.cmpgt(Vec3::ZERO).all() || !size.is_finite()).then_some("non-positive box size")
            }
            ColliderGeometry::Sphere { radius } => {
                (!positive(*radius)).then_some("non-positive sphere radius")
            }
            ColliderGeometry::Cylinder { length, radius }
            | ColliderGeometry::Capsule { length, radius }
            | ColliderGeometry::Cone { length, radius } => (!positive(*radius)
                || !length.is_finite()
                || *length < 0.0)
                .then_some("invalid radius or length"),
            ColliderGeometry::Plane { plane } => {
                (!plane.normal.is_finite()).then_some("invalid plane normal")
            }
            ColliderGeometry::ConvexMesh { mesh } | ColliderGeometry::ConcaveMesh { mesh } => {
                mesh.is_degenerate().then_some("mesh has no triangles")
            }
            ColliderGeometry::ConcaveMeshScaled { parent, scale } => {
                if parent.is_degenerate() {
                    Some("parent mesh has no triangles")
                } else if scale.cmpeq(Vec3::ZERO).any() {
                    Some("zero scale component")
                } else {
                    None
                }
            }
            ColliderGeometry::Terrain { .. } => None,
        }
    }

    /// Backend shape for `internal_scale`, or `None` for degenerate geometry.
    pub fn shape(&self, internal_scale: f32) -> Option<Arc<Shape>> {
        let key = internal_scale.to_bits();
        if let Some((cached_key, shape)) = &self.state.read().cache {
            if *cached_key == key {
                return shape.clone();
            }
        }

        let (local_scale, margin) = {
            let state = self.state.read();
            (state.local_scale, state.margin)
        };
        let shape = self.generate_shape(internal_scale, local_scale, margin).map(Arc::new);
        if shape.is_some() {
            debug!(
                "generated {:?} shape at internal scale {internal_scale}",
                self.geometry_type()
            );
        }
        self.state.write().cache = Some((key, shape.clone()));
        shape
    }

    fn generate_shape(&self, s: f32, local_scale: Vec3, margin: f32) -> Option<Shape> {
        if self.is_degenerate() {
            return None;
        }
        let radial = local_scale.x.abs().max(local_scale.z.abs());
        let axial = local_scale.y.abs();
        let shape = match &self.geometry {
            ColliderGeometry::Box { size } => Shape::Box {
                half_extents: (*size * local_scale.abs()) * 0.5 * s,
            },
            ColliderGeometry::Sphere { radius } => Shape::Sphere {
                radius: radius * local_scale.abs().max_element() * s,
            },
            ColliderGeometry::Cylinder { length, radius } => Shape::Cylinder {
                radius: radius * radial * s,
                half_height: length * axial * 0.5 * s,
            },
            ColliderGeometry::Capsule { length, radius } => Shape::Capsule {
                radius: radius * radial * s,
                half_height: length * axial * 0.5 * s,
            },
            ColliderGeometry::Cone { length, radius } => Shape::Cone {
                radius: radius * radial * s,
                half_height: length * axial * 0.5 * s,
            },
            ColliderGeometry::Plane { plane } => Shape::Plane {
                plane: Plane::new(plane.normal, plane.distance * s),
            },
            ColliderGeometry::ConvexMesh { mesh } => Shape::ConvexHull {
                mesh: mesh.clone(),
                scale: local_scale * s,
                margin: margin * s,
            },
            ColliderGeometry::ConcaveMesh { mesh } => Shape::TriMesh {
                mesh: mesh.clone(),
                scale: local_scale * s,
            },
            ColliderGeometry::ConcaveMeshScaled { parent, scale } => Shape::TriMesh {
                mesh: parent.mesh()?.clone(),
                scale: *scale * parent.local_scale() * local_scale * s,
            },
            ColliderGeometry::Terrain { terrain } => Shape::Terrain {
                terrain: terrain.clone(),
                scale: s,
            },
        };
        Some(shape)
    }

    /// Enclosed volume in world units; zero for static-only kinds.
    pub fn volume(&self) -> f32 {
        self.shape(1.0).map(|shape| shape.volume()).unwrap_or(0.0)
    }
}
