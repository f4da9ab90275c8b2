//! Error taxonomy for configuration and contract violations.
//!
//! Every failure is logged where it is detected and handed back as a
//! [`CollisionError`]; the state that was being modified is left untouched.

use crate::core::object::CollisionObjectType;

/// Configuration and contract errors reported by the collision layer.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CollisionError {
    #[error("collision object is not part of a sector")]
    NotInSector,
    #[error("collision object has no collider to build from")]
    NoCollider,
    #[error("soft bodies take no colliders")]
    SoftBodyCollider,
    #[error("terrain colliders cannot be mixed with other colliders")]
    TerrainMixed,
    #[error("cannot change object type from {from:?} to {to:?}")]
    ForbiddenTypeTransition {
        from: CollisionObjectType,
        to: CollisionObjectType,
    },
    #[error("joint bodies live in different sectors")]
    CrossSectorJoint,
    #[error("handle does not refer to a live entry")]
    InvalidHandle,
    #[error("collision object is not a physical body")]
    NotPhysical,
    #[error("vertex index {index} out of range (vertex count {count})")]
    VertexOutOfRange { index: usize, count: usize },
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(&'static str),
    #[error("unknown collision group '{0}'")]
    UnknownGroup(String),
    #[error("collision group table is full")]
    GroupTableFull,
    #[error("built-in collision group '{0}' cannot be redefined")]
    BuiltinGroup(String),
    #[error("operation requires an empty sector")]
    SectorNotEmpty,
    #[error("portal is incomplete or unresolved")]
    IncompletePortal,
    #[error("unknown collision sector")]
    UnknownSector,
    #[error("joint is not attached to any body")]
    InvalidJoint,
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("object is the sensor of a portal")]
    PortalSensor,
}

pub type CollisionResult<T> = Result<T, CollisionError>;
