//! Interfaces of the host engine consumed by the collision layer, and the
//! callback interfaces it exposes.
//!
//! All spatial values crossing these traits are in world units.

use std::sync::Arc;

use glam::{Vec2, Vec3};

use crate::{
    collision::contact::CollisionData,
    core::{handle::SectorId, object::CollisionObject, types::Plane, types::Transform},
};

/// Scene-graph node whose transform follows a collision object.
pub trait Movable: Send + Sync {
    fn transform(&self) -> Transform;
    fn set_transform(&self, transform: Transform);
}

/// Camera driven by an actor or another collision object.
pub trait Camera: Send + Sync {
    fn transform(&self) -> Transform;
    fn set_transform(&self, transform: Transform);
}

/// Render-side sector holding the movables visible in it.
pub trait SceneSector: Send + Sync {
    fn add_movable(&self, movable: &Arc<dyn Movable>);
    fn remove_movable(&self, movable: &Arc<dyn Movable>);
}

/// Engine portal connecting two sectors.
pub trait ScenePortal: Send + Sync {
    /// Center of the portal opening in source-sector coordinates.
    fn center(&self) -> Vec3;
    /// Radius of the sphere enclosing the portal opening.
    fn radius(&self) -> f32;
    /// Portal plane in source-sector coordinates; the normal faces the source side.
    fn plane(&self) -> Plane;
    /// Maps source-sector coordinates into destination-sector coordinates.
    fn warp(&self) -> Transform {
        Transform::IDENTITY
    }
    /// False while the destination is unresolved.
    fn is_complete(&self) -> bool {
        true
    }
}

/// Identifier of a streamed terrain cell.
pub type CellKey = (i32, i32);

/// One streamed block of terrain height samples.
pub trait TerrainCell: Send + Sync {
    fn key(&self) -> CellKey;
    /// World position of the cell's minimum (x, z) corner.
    fn position(&self) -> Vec2;
    /// World size of the cell: x and z extents, y is the height scale.
    fn size(&self) -> Vec3;
    fn grid_width(&self) -> usize;
    fn grid_height(&self) -> usize;
    /// Row-major samples in `[0, 1]`, `grid_width * grid_height` long.
    fn heights(&self) -> Vec<f32>;
}

/// Receives terrain streaming notifications.
pub trait TerrainCellListener: Send + Sync {
    fn on_cell_load(&self, cell: &dyn TerrainCell);
    fn on_cell_preload(&self, cell: &dyn TerrainCell);
    fn on_cell_unload(&self, cell: &dyn TerrainCell);
}

/// Host terrain streaming system.
pub trait TerrainSystem: Send + Sync {
    /// Cells that are currently resident.
    fn loaded_cells(&self) -> Vec<Arc<dyn TerrainCell>>;
    fn add_cell_listener(&self, listener: Arc<dyn TerrainCellListener>);
}

/// Raised after a step for every pair that is touching.
///
/// Implementations receive shared references only and must not try to reach
/// back into the sector that is stepping.
pub trait CollisionCallback: Send + Sync {
    fn on_collision(
        &self,
        sector: SectorId,
        this: &CollisionObject,
        other: &CollisionObject,
        points: &[CollisionData],
        steps: usize,
    );
}

/// Supplies the transform of a kinematic rigid body every sub-step.
pub trait KinematicCallback: Send + Sync {
    fn body_transform(&self, body: &CollisionObject) -> Transform;
}

/// Supplies the target position of an animated soft-body anchor.
pub trait AnchorAnimationControl: Send + Sync {
    fn anchor_position(&self) -> Vec3;
}
