use serde::{Deserialize, Serialize};

use crate::utils::allocator::EntityId;

/// Identifier of a collision sector inside its system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectorId(pub EntityId);

/// Stable address of a collision object: the sector owning it plus its arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHandle {
    pub sector: SectorId,
    pub id: EntityId,
}

/// Stable address of a joint inside a sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JointHandle {
    pub sector: SectorId,
    pub id: EntityId,
}
