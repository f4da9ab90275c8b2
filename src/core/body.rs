//! Physical payload of a collision object and the capability traits shared
//! by the body kinds.

use glam::Vec3;

use super::{mesh::TriangleMesh, rigidbody::RigidBody, softbody::SoftBody};

/// Rigid or deformable body carried by a physical collision object.
#[derive(Debug, Clone)]
pub enum PhysicalBody {
    Rigid(RigidBody),
    Soft(SoftBody),
}

impl PhysicalBody {
    pub fn as_rigid(&self) -> Option<&RigidBody> {
        match self {
            PhysicalBody::Rigid(body) => Some(body),
            PhysicalBody::Soft(_) => None,
        }
    }

    pub fn as_rigid_mut(&mut self) -> Option<&mut RigidBody> {
        match self {
            PhysicalBody::Rigid(body) => Some(body),
            PhysicalBody::Soft(_) => None,
        }
    }

    pub fn as_soft(&self) -> Option<&SoftBody> {
        match self {
            PhysicalBody::Soft(body) => Some(body),
            PhysicalBody::Rigid(_) => None,
        }
    }

    pub fn as_soft_mut(&mut self) -> Option<&mut SoftBody> {
        match self {
            PhysicalBody::Soft(body) => Some(body),
            PhysicalBody::Rigid(_) => None,
        }
    }

    pub(crate) fn rescale(&mut self, scale: f32) {
        match self {
            PhysicalBody::Rigid(body) => body.rescale(scale),
            PhysicalBody::Soft(body) => body.rescale(scale),
        }
    }
}

/// Anything carrying a total mass.
pub trait HasMass {
    fn total_mass(&self) -> f32;
    fn set_total_mass(&mut self, mass: f32);
}

impl HasMass for RigidBody {
    fn total_mass(&self) -> f32 {
        self.mass()
    }

    fn set_total_mass(&mut self, mass: f32) {
        self.set_mass(mass);
    }
}

impl HasMass for SoftBody {
    fn total_mass(&self) -> f32 {
        self.mass()
    }

    fn set_total_mass(&mut self, mass: f32) {
        self.set_mass(mass);
    }
}

impl HasMass for PhysicalBody {
    fn total_mass(&self) -> f32 {
        match self {
            PhysicalBody::Rigid(body) => body.total_mass(),
            PhysicalBody::Soft(body) => body.total_mass(),
        }
    }

    fn set_total_mass(&mut self, mass: f32) {
        match self {
            PhysicalBody::Rigid(body) => body.set_total_mass(mass),
            PhysicalBody::Soft(body) => body.set_total_mass(mass),
        }
    }
}

/// Indexed vertex and triangle access.
pub trait HasVertices {
    fn vertex_total(&self) -> usize;
    fn vertex(&self, index: usize) -> Option<Vec3>;
    fn triangle_indices(&self, index: usize) -> Option<[usize; 3]>;
}

impl HasVertices for SoftBody {
    fn vertex_total(&self) -> usize {
        self.vertex_count()
    }

    fn vertex(&self, index: usize) -> Option<Vec3> {
        self.nodes
            .get(index)
            .map(|node| node.position / self.unit_scale)
    }

    fn triangle_indices(&self, index: usize) -> Option<[usize; 3]> {
        self.triangle(index)
    }
}

impl HasVertices for TriangleMesh {
    fn vertex_total(&self) -> usize {
        self.vertex_count()
    }

    fn vertex(&self, index: usize) -> Option<Vec3> {
        self.vertices.get(index).copied()
    }

    fn triangle_indices(&self, index: usize) -> Option<[usize; 3]> {
        self.indices
            .get(index)
            .map(|t| [t[0] as usize, t[1] as usize, t[2] as usize])
    }
}
