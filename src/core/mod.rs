//! Entities of the collision layer: geometry, objects, bodies and joints.

pub mod actor;
pub mod body;
pub mod collider;
pub mod group;
pub mod handle;
pub mod joint;
pub mod mesh;
pub mod object;
pub mod rigidbody;
pub mod softbody;
pub mod terrain;
pub mod types;

pub use actor::Actor;
pub use body::{HasMass, HasVertices, PhysicalBody};
pub use collider::{Collider, ColliderGeometry, ColliderType};
pub use group::{CollisionGroup, GroupTable};
pub use handle::{JointHandle, ObjectHandle, SectorId};
pub use joint::{AxisMode, Joint, JointType};
pub use mesh::{Aabb, MeshBuilder, TriangleMesh};
pub use object::{CollisionObject, CollisionObjectType};
pub use rigidbody::{RigidBody, RigidBodyState};
pub use softbody::{SoftAnchor, SoftBody};
pub use terrain::{Heightfield, TerrainCollider};
pub use types::{Material, Plane, Transform, Velocity};
