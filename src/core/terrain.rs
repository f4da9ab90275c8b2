//! Heightfield terrain fed by the host's cell streaming.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use glam::{Vec2, Vec3};
use log::debug;
use parking_lot::RwLock;

use crate::{
    core::mesh::Aabb,
    scene::{CellKey, TerrainCell, TerrainCellListener, TerrainSystem},
};

/// Height samples of one resident terrain cell, in world units.
#[derive(Debug, Clone, PartialEq)]
pub struct Heightfield {
    pub key: CellKey,
    pub origin: Vec2,
    pub size: Vec2,
    pub width: usize,
    pub depth: usize,
    pub heights: Vec<f32>,
    pub bounds: Aabb,
}

impl Heightfield {
    /// Builds the heightfield of `cell`, clamping heights to `[min_height, max_height]`.
    pub fn from_cell(cell: &dyn TerrainCell, min_height: f32, max_height: f32) -> Option<Self> {
        let width = cell.grid_width();
        let depth = cell.grid_height();
        let samples = cell.heights();
        if width < 2 || depth < 2 || samples.len() != width * depth {
            return None;
        }
        let size = cell.size();
        let heights: Vec<f32> = samples
            .iter()
            .map(|h| (h * size.y).clamp(min_height, max_height))
            .collect();
        let low = heights.iter().copied().fold(f32::INFINITY, f32::min);
        let high = heights.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let origin = cell.position();
        let bounds = Aabb::new(
            Vec3::new(origin.x, low, origin.y),
            Vec3::new(origin.x + size.x, high, origin.y + size.z),
        );
        Some(Self {
            key: cell.key(),
            origin,
            size: Vec2::new(size.x, size.z),
            width,
            depth,
            heights,
            bounds,
        })
    }

    fn step(&self) -> Vec2 {
        Vec2::new(
            self.size.x / (self.width - 1) as f32,
            self.size.y / (self.depth - 1) as f32,
        )
    }

    pub fn sample(&self, ix: usize, iz: usize) -> Vec3 {
        let step = self.step();
        Vec3::new(
            self.origin.x + ix as f32 * step.x,
            self.heights[iz * self.width + ix],
            self.origin.y + iz as f32 * step.y,
        )
    }

    /// Triangles whose grid quads overlap `region` (world units).
    pub fn triangles_in(&self, region: &Aabb) -> Vec<[Vec3; 3]> {
        let mut out = Vec::new();
        if !self.bounds.overlaps(region) {
            return out;
        }
        let step = self.step();
        let to_index = |value: f32, origin: f32, step: f32, max: usize| -> usize {
            (((value - origin) / step).floor().max(0.0) as usize).min(max)
        };
        let x0 = to_index(region.min.x, self.origin.x, step.x, self.width - 2);
        let x1 = to_index(region.max.x, self.origin.x, step.x, self.width - 2);
        let z0 = to_index(region.min.z, self.origin.y, step.y, self.depth - 2);
        let z1 = to_index(region.max.z, self.origin.y, step.y, self.depth - 2);
        for iz in z0..=z1 {
            for ix in x0..=x1 {
                let a = self.sample(ix, iz);
                let b = self.sample(ix + 1, iz);
                let c = self.sample(ix, iz + 1);
                let d = self.sample(ix + 1, iz + 1);
                out.push([a, c, b]);
                out.push([b, c, d]);
            }
        }
        out
    }

    /// Interpolated height at world `(x, z)` if it lies over this cell.
    pub fn height_at(&self, x: f32, z: f32) -> Option<f32> {
        let step = self.step();
        let fx = (x - self.origin.x) / step.x;
        let fz = (z - self.origin.y) / step.y;
        if fx < 0.0 || fz < 0.0 || fx > (self.width - 1) as f32 || fz > (self.depth - 1) as f32 {
            return None;
        }
        let ix = (fx.floor() as usize).min(self.width - 2);
        let iz = (fz.floor() as usize).min(self.depth - 2);
        let tx = fx - ix as f32;
        let tz = fz - iz as f32;
        let h = |i: usize, j: usize| self.heights[j * self.width + i];
        let top = h(ix, iz) * (1.0 - tx) + h(ix + 1, iz) * tx;
        let bottom = h(ix, iz + 1) * (1.0 - tx) + h(ix + 1, iz + 1) * tx;
        Some(top * (1.0 - tz) + bottom * tz)
    }
}

/// Collision geometry of a streamed terrain: one heightfield per resident cell.
#[derive(Debug)]
pub struct TerrainCollider {
    cells: RwLock<BTreeMap<CellKey, Arc<Heightfield>>>,
    preloaded: RwLock<BTreeSet<CellKey>>,
    min_height: f32,
    max_height: f32,
}

impl TerrainCollider {
    pub fn new(min_height: f32, max_height: f32) -> Self {
        Self {
            cells: RwLock::new(BTreeMap::new()),
            preloaded: RwLock::new(BTreeSet::new()),
            min_height: min_height.min(max_height),
            max_height: max_height.max(min_height),
        }
    }

    /// Loads the resident cells of `terrain` and subscribes to its streaming.
    pub fn attach(self: &Arc<Self>, terrain: &Arc<dyn TerrainSystem>) {
        for cell in terrain.loaded_cells() {
            self.on_cell_load(cell.as_ref());
        }
        let listener: Arc<dyn TerrainCellListener> = self.clone();
        terrain.add_cell_listener(listener);
    }

    pub fn height_range(&self) -> (f32, f32) {
        (self.min_height, self.max_height)
    }

    pub fn cell_count(&self) -> usize {
        self.cells.read().len()
    }

    pub fn is_preloaded(&self, key: CellKey) -> bool {
        self.preloaded.read().contains(&key)
    }

    pub fn cells(&self) -> Vec<Arc<Heightfield>> {
        self.cells.read().values().cloned().collect()
    }

    /// Union of all resident cells, multiplied by the backend scale.
    pub fn bounds(&self, scale: f32) -> Aabb {
        let mut bounds = Aabb::empty();
        for cell in self.cells.read().values() {
            bounds.merge(&cell.bounds);
        }
        if bounds.is_empty() {
            return bounds;
        }
        Aabb::new(bounds.min * scale, bounds.max * scale)
    }

    /// Backend-unit triangles overlapping a backend-unit `region`.
    pub fn triangles(&self, region: &Aabb, scale: f32) -> Vec<[Vec3; 3]> {
        let inv = 1.0 / scale;
        let world_region = Aabb::new(region.min * inv, region.max * inv);
        self.cells
            .read()
            .values()
            .flat_map(|cell| cell.triangles_in(&world_region))
            .map(|[a, b, c]| [a * scale, b * scale, c * scale])
            .collect()
    }

    pub fn height_at(&self, x: f32, z: f32) -> Option<f32> {
        self.cells
            .read()
            .values()
            .find_map(|cell| cell.height_at(x, z))
    }
}

impl TerrainCellListener for TerrainCollider {
    fn on_cell_load(&self, cell: &dyn TerrainCell) {
        let key = cell.key();
        self.preloaded.write().remove(&key);
        match Heightfield::from_cell(cell, self.min_height, self.max_height) {
            Some(field) => {
                debug!("terrain cell {key:?} loaded");
                self.cells.write().insert(key, Arc::new(field));
            }
            None => {
                log::warn!("terrain cell {key:?} has an unusable height grid; skipped");
            }
        }
    }

    fn on_cell_preload(&self, cell: &dyn TerrainCell) {
        self.preloaded.write().insert(cell.key());
    }

    fn on_cell_unload(&self, cell: &dyn TerrainCell) {
        let key = cell.key();
        self.preloaded.write().remove(&key);
        if self.cells.write().remove(&key).is_some() {
            debug!("terrain cell {key:?} unloaded");
        }
    }
}
