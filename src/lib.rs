//! Sector Physics – sector-partitioned collision and dynamics for Rust.
//!
//! The world is split into [`CollisionSector`]s joined by portals. Each
//! sector owns its collision objects, rigid and soft bodies and joints, runs
//! an impulse-based backend (grid broad phase, GJK/EPA narrow phase, PGS
//! solver) and replicates objects straddling a portal into the neighboring
//! sector. A [`CollisionSystem`] creates the detached pieces, owns the
//! sectors and routes portal traffic between them.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod scene;
pub mod sector;
pub mod system;
pub mod utils;

pub use glam::{Mat3, Mat4, Quat, Vec2, Vec3};

pub use collision::{
    contact::{CollisionData, Contact},
    queries::{Raycast, RaycastHit, RaycastQuery},
};
pub use config::{AutoDisableParams, SoftBodyConfig, StepParameters};
pub use core::{
    actor::Actor,
    collider::{Collider, ColliderGeometry, ColliderType},
    group::{CollisionGroup, GroupTable},
    handle::{JointHandle, ObjectHandle, SectorId},
    joint::{AxisMode, Joint, JointType},
    mesh::{Aabb, MeshBuilder, TriangleMesh},
    object::{CollisionObject, CollisionObjectType},
    rigidbody::{RigidBody, RigidBodyState},
    softbody::{SoftAnchor, SoftBody},
    terrain::TerrainCollider,
    types::{Material, Plane, Transform},
};
pub use error::{CollisionError, CollisionResult};
pub use scene::{
    AnchorAnimationControl, Camera, CollisionCallback, KinematicCallback, Movable, SceneSector,
    ScenePortal, TerrainCell, TerrainCellListener, TerrainSystem,
};
pub use sector::{CollisionSector, HitBeamResult, MoveResult, PortalId, PortalMessage, ShadowKey};
pub use system::CollisionSystem;
pub use utils::{
    allocator::{Arena, EntityId, GenerationalId},
    profiling::SectorProfile,
};
