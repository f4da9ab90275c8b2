use std::collections::{BTreeSet, HashMap};

use glam::Vec3;

use crate::{
    core::{group::GroupTable, mesh::Aabb},
    utils::allocator::EntityId,
};

/// Bounds registered for one collision object during a sub-step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BroadPhaseProxy {
    pub id: EntityId,
    pub bounds: Aabb,
    pub group: u8,
    /// Static objects never pair with each other.
    pub is_static: bool,
}

/// Uniform grid spatial partitioning used by the broad-phase.
#[derive(Debug)]
pub struct SpatialGrid {
    cell_size: f32,
    grid: HashMap<(i32, i32, i32), Vec<usize>>,
}

impl SpatialGrid {
    /// Objects spanning more cells than this per axis go to the oversized list.
    const MAX_SPAN: i32 = 16;

    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(1e-3),
            grid: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    fn world_to_grid(&self, pos: Vec3) -> (i32, i32, i32) {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
            (pos.z / self.cell_size).floor() as i32,
        )
    }

    fn fits(&self, bounds: &Aabb) -> bool {
        if !bounds.is_finite() {
            return false;
        }
        let min = self.world_to_grid(bounds.min);
        let max = self.world_to_grid(bounds.max);
        max.0 - min.0 < Self::MAX_SPAN && max.1 - min.1 < Self::MAX_SPAN && max.2 - min.2 < Self::MAX_SPAN
    }

    pub fn clear(&mut self) {
        self.grid.clear();
    }

    pub fn insert(&mut self, slot: usize, bounds: &Aabb) {
        let min_cell = self.world_to_grid(bounds.min);
        let max_cell = self.world_to_grid(bounds.max);

        for x in min_cell.0..=max_cell.0 {
            for y in min_cell.1..=max_cell.1 {
                for z in min_cell.2..=max_cell.2 {
                    self.grid.entry((x, y, z)).or_default().push(slot);
                }
            }
        }
    }

    /// Slots sharing a cell with `bounds`, sorted and deduplicated.
    pub fn query(&self, bounds: &Aabb) -> Vec<usize> {
        let mut results = Vec::new();
        let min_cell = self.world_to_grid(bounds.min);
        let max_cell = self.world_to_grid(bounds.max);

        for x in min_cell.0..=max_cell.0 {
            for y in min_cell.1..=max_cell.1 {
                for z in min_cell.2..=max_cell.2 {
                    if let Some(slots) = self.grid.get(&(x, y, z)) {
                        results.extend(slots);
                    }
                }
            }
        }

        results.sort_unstable();
        results.dedup();
        results
    }
}

/// Broad phase driver returning potential object pairs.
#[derive(Debug)]
pub struct BroadPhase {
    grid: SpatialGrid,
    proxies: Vec<BroadPhaseProxy>,
    oversized: Vec<usize>,
}

impl BroadPhase {
    pub fn new(cell_size: f32) -> Self {
        Self {
            grid: SpatialGrid::new(cell_size),
            proxies: Vec::new(),
            oversized: Vec::new(),
        }
    }

    /// Replaces the registered proxies; empty bounds are ignored.
    pub fn rebuild(&mut self, proxies: impl IntoIterator<Item = BroadPhaseProxy>) {
        self.grid.clear();
        self.oversized.clear();
        self.proxies = proxies.into_iter().filter(|p| !p.bounds.is_empty()).collect();
        for (slot, proxy) in self.proxies.iter().enumerate() {
            if self.grid.fits(&proxy.bounds) {
                self.grid.insert(slot, &proxy.bounds);
            } else {
                self.oversized.push(slot);
            }
        }
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    fn candidates(&self, bounds: &Aabb) -> Vec<usize> {
        let mut slots = if self.grid.fits(bounds) {
            self.grid.query(bounds)
        } else {
            (0..self.proxies.len()).collect()
        };
        slots.extend(&self.oversized);
        slots.sort_unstable();
        slots.dedup();
        slots
    }

    /// Overlapping pairs allowed by the group table, ordered `(low, high)` and sorted.
    pub fn potential_pairs(&self, groups: &GroupTable) -> Vec<(EntityId, EntityId)> {
        let mut pairs = BTreeSet::new();
        for (slot, proxy) in self.proxies.iter().enumerate() {
            for other_slot in self.candidates(&proxy.bounds) {
                if other_slot <= slot {
                    continue;
                }
                let other = &self.proxies[other_slot];
                if proxy.is_static && other.is_static {
                    continue;
                }
                if !groups.collides(proxy.group, other.group) || !proxy.bounds.overlaps(&other.bounds) {
                    continue;
                }
                let key = if proxy.id < other.id {
                    (proxy.id, other.id)
                } else {
                    (other.id, proxy.id)
                };
                pairs.insert(key);
            }
        }
        pairs.into_iter().collect()
    }

    /// Objects whose bounds overlap `bounds`.
    pub fn query_aabb(&self, bounds: &Aabb) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .candidates(bounds)
            .into_iter()
            .map(|slot| &self.proxies[slot])
            .filter(|proxy| proxy.bounds.overlaps(bounds))
            .map(|proxy| proxy.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Objects whose bounds a segment from `origin` along `dir` enters before `max_t`, nearest first.
    pub fn query_ray(&self, origin: Vec3, dir: Vec3, max_t: f32) -> Vec<(f32, EntityId)> {
        let mut hits: Vec<(f32, EntityId)> = self
            .proxies
            .iter()
            .filter_map(|proxy| proxy.bounds.ray_entry(origin, dir, max_t).map(|t| (t, proxy.id)))
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::group::builtin;

    fn proxy(index: usize, center: Vec3, extent: f32, group: u8, is_static: bool) -> BroadPhaseProxy {
        BroadPhaseProxy {
            id: EntityId::new(index, 0),
            bounds: Aabb::from_center_extent(center, Vec3::splat(extent)),
            group,
            is_static,
        }
    }

    #[test]
    fn grid_returns_only_nearby_pairs() {
        let mut broad = BroadPhase::new(2.0);
        broad.rebuild([
            proxy(0, Vec3::ZERO, 0.5, builtin::DEFAULT, false),
            proxy(1, Vec3::new(0.8, 0.0, 0.0), 0.5, builtin::DEFAULT, false),
            proxy(2, Vec3::new(50.0, 0.0, 0.0), 0.5, builtin::DEFAULT, false),
        ]);
        let pairs = broad.potential_pairs(&GroupTable::new());
        assert_eq!(pairs, vec![(EntityId::new(0, 0), EntityId::new(1, 0))]);
    }

    #[test]
    fn infinite_bounds_pair_with_everything_but_statics() {
        let mut broad = BroadPhase::new(2.0);
        let plane = BroadPhaseProxy {
            id: EntityId::new(0, 0),
            bounds: Aabb::new(Vec3::splat(f32::NEG_INFINITY), Vec3::splat(f32::INFINITY)),
            group: builtin::STATIC,
            is_static: true,
        };
        broad.rebuild([
            plane,
            proxy(1, Vec3::new(100.0, 3.0, -40.0), 0.5, builtin::DEFAULT, false),
            proxy(2, Vec3::new(-7.0, 0.0, 0.0), 0.5, builtin::STATIC, true),
        ]);
        let pairs = broad.potential_pairs(&GroupTable::new());
        assert_eq!(pairs, vec![(EntityId::new(0, 0), EntityId::new(1, 0))]);
    }

    #[test]
    fn group_filter_rejects_portal_pairs() {
        let mut broad = BroadPhase::new(2.0);
        broad.rebuild([
            proxy(0, Vec3::ZERO, 1.0, builtin::PORTAL, false),
            proxy(1, Vec3::ZERO, 1.0, builtin::PORTAL, false),
        ]);
        assert!(broad.potential_pairs(&GroupTable::new()).is_empty());
    }

    #[test]
    fn ray_query_orders_by_entry() {
        let mut broad = BroadPhase::new(2.0);
        broad.rebuild([
            proxy(0, Vec3::new(10.0, 0.0, 0.0), 0.5, builtin::DEFAULT, false),
            proxy(1, Vec3::new(4.0, 0.0, 0.0), 0.5, builtin::DEFAULT, false),
        ]);
        let hits = broad.query_ray(Vec3::ZERO, Vec3::X, 20.0);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].1, EntityId::new(1, 0));
    }
}
