//! Collision detection modules: backend shapes, broad-phase, narrow-phase, contact manifolds, queries.

pub mod shapes;
pub mod broadphase;
pub mod narrowphase;
pub mod contact;
pub mod queries;

pub use broadphase::{BroadPhase, BroadPhaseProxy, SpatialGrid};
pub use contact::{CollisionData, Contact, ContactManifold, ManifoldCache};
pub use narrowphase::NarrowPhase;
pub use queries::{Raycast, RaycastHit, RaycastQuery};
pub use shapes::Shape;
