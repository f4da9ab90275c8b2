//! Entry point of the collision layer: creates detached colliders, objects
//! and joints, owns the sectors and the shared group table, and routes
//! portal traffic between sectors after every step.

use std::sync::Arc;

use glam::Vec3;
use log::{debug, trace, warn};
use parking_lot::RwLock;

use crate::{
    config::MAX_PORTAL_HOPS,
    core::{
        collider::Collider,
        group::{CollisionGroup, GroupTable},
        handle::SectorId,
        joint::Joint,
        mesh::TriangleMesh,
        object::CollisionObject,
        rigidbody::RigidBody,
        softbody::SoftBody,
        terrain::TerrainCollider,
        types::{Plane, Transform},
    },
    error::{CollisionError, CollisionResult},
    scene::{ScenePortal, TerrainSystem},
    sector::{CollisionSector, HitBeamResult, PortalId, PortalMessage},
    utils::{
        allocator::{Arena, EntityId},
        logging::ScopedTimer,
    },
};

pub struct CollisionSystem {
    internal_scale: f32,
    groups: Arc<RwLock<GroupTable>>,
    sectors: Arena<CollisionSector>,
}

impl Default for CollisionSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CollisionSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionSystem")
            .field("internal_scale", &self.internal_scale)
            .field("sectors", &self.sectors.len())
            .field("groups", &self.groups.read().len())
            .finish()
    }
}

impl CollisionSystem {
    pub fn new() -> Self {
        Self {
            internal_scale: 1.0,
            groups: Arc::new(RwLock::new(GroupTable::new())),
            sectors: Arena::new(),
        }
    }

    /// Factor converting world units into backend units.
    pub fn internal_scale(&self) -> f32 {
        self.internal_scale
    }

    /// Changes the unit conversion; only allowed while every sector is empty.
    pub fn set_internal_scale(&mut self, scale: f32) -> CollisionResult<()> {
        if !(scale.is_finite() && scale > 0.0) {
            warn!("internal scale must be positive, got {scale}");
            return Err(CollisionError::InvalidParameter("internal scale must be positive"));
        }
        if self.sectors.values().any(|s| !s.is_empty()) {
            warn!("internal scale can only change while all sectors are empty");
            return Err(CollisionError::SectorNotEmpty);
        }
        self.internal_scale = scale;
        for (_, sector) in self.sectors.iter_mut() {
            sector.set_unit_scale(scale);
        }
        debug!("internal scale set to {scale}");
        Ok(())
    }

    // Colliders

    pub fn create_collider_box(&self, size: Vec3) -> Arc<Collider> {
        Arc::new(Collider::new_box(size))
    }

    pub fn create_collider_sphere(&self, radius: f32) -> Arc<Collider> {
        Arc::new(Collider::new_sphere(radius))
    }

    pub fn create_collider_cylinder(&self, length: f32, radius: f32) -> Arc<Collider> {
        Arc::new(Collider::new_cylinder(length, radius))
    }

    pub fn create_collider_capsule(&self, length: f32, radius: f32) -> Arc<Collider> {
        Arc::new(Collider::new_capsule(length, radius))
    }

    pub fn create_collider_cone(&self, length: f32, radius: f32) -> Arc<Collider> {
        Arc::new(Collider::new_cone(length, radius))
    }

    pub fn create_collider_plane(&self, plane: Plane) -> Arc<Collider> {
        Arc::new(Collider::new_plane(plane))
    }

    pub fn create_collider_convex_mesh(&self, mesh: Arc<TriangleMesh>) -> Arc<Collider> {
        Arc::new(Collider::new_convex_mesh(mesh))
    }

    pub fn create_collider_concave_mesh(&self, mesh: Arc<TriangleMesh>) -> Arc<Collider> {
        Arc::new(Collider::new_concave_mesh(mesh))
    }

    /// Concave mesh sharing the triangles of `parent`.
    pub fn create_collider_concave_mesh_scaled(
        &self,
        parent: Arc<Collider>,
        scale: Vec3,
    ) -> CollisionResult<Arc<Collider>> {
        Collider::new_concave_mesh_scaled(parent, scale).map(Arc::new)
    }

    /// Heightfield collider following the cell streaming of `terrain`.
    pub fn create_collider_terrain(
        &self,
        terrain: &Arc<dyn TerrainSystem>,
        min_height: f32,
        max_height: f32,
    ) -> Arc<Collider> {
        let collider = Arc::new(TerrainCollider::new(min_height, max_height));
        collider.attach(terrain);
        Arc::new(Collider::new_terrain(collider))
    }

    // Objects and joints

    pub fn create_collision_object(&self) -> CollisionObject {
        CollisionObject::new()
    }

    pub fn create_ghost_collision_object(&self) -> CollisionObject {
        CollisionObject::new_ghost()
    }

    pub fn create_collision_actor(&self) -> CollisionObject {
        CollisionObject::new_actor()
    }

    pub fn create_rigid_body(&self) -> CollisionObject {
        CollisionObject::new_rigid_body(RigidBody::new())
    }

    pub fn create_soft_rope(&self, start: Vec3, end: Vec3, segments: usize) -> CollisionObject {
        CollisionObject::new_soft_body(SoftBody::rope(start, end, segments))
    }

    pub fn create_soft_rope_from_vertices(&self, vertices: &[Vec3]) -> CollisionResult<CollisionObject> {
        SoftBody::rope_from_vertices(vertices).map(CollisionObject::new_soft_body)
    }

    pub fn create_soft_cloth(
        &self,
        corners: [Vec3; 4],
        segments_u: usize,
        segments_v: usize,
        with_diagonals: bool,
    ) -> CollisionObject {
        CollisionObject::new_soft_body(SoftBody::cloth(corners, segments_u, segments_v, with_diagonals))
    }

    pub fn create_soft_body_from_mesh(
        &self,
        vertices: &[Vec3],
        triangles: &[[u32; 3]],
        transform: &Transform,
    ) -> CollisionResult<CollisionObject> {
        SoftBody::from_mesh(vertices, triangles, transform).map(CollisionObject::new_soft_body)
    }

    /// Unconstrained 6-DOF joint; lock axes before adding it to a sector.
    pub fn create_joint(&self) -> Joint {
        Joint::new(crate::core::joint::JointType::SixDof)
    }

    pub fn create_rigid_p2p_joint(&self, position: Vec3) -> Joint {
        Joint::p2p(position)
    }

    pub fn create_rigid_slide_joint(&self, position: Vec3, axis: Vec3, min_distance: f32, max_distance: f32) -> Joint {
        Joint::slide(position, axis, min_distance, max_distance)
    }

    pub fn create_rigid_hinge_joint(&self, position: Vec3, axis: Vec3, min_angle: f32, max_angle: f32) -> Joint {
        Joint::hinge(position, axis, min_angle, max_angle)
    }

    pub fn create_rigid_pivot_joint(&self, position: Vec3) -> Joint {
        Joint::pivot(position)
    }

    pub fn create_soft_linear_joint(&self, position: Vec3) -> Joint {
        Joint::soft_linear(position)
    }

    pub fn create_soft_angular_joint(&self, axis: Vec3) -> Joint {
        Joint::soft_angular(axis)
    }

    // Sectors

    pub fn create_sector(&mut self) -> SectorId {
        let placeholder = SectorId(EntityId::default());
        let sector = CollisionSector::new(placeholder, self.internal_scale, Arc::clone(&self.groups));
        let id = SectorId(self.sectors.insert(sector));
        if let Some(sector) = self.sectors.get_mut(id.0) {
            sector.set_id(id);
        }
        debug!("created sector {id:?}");
        id
    }

    pub fn sector(&self, id: SectorId) -> CollisionResult<&CollisionSector> {
        self.sectors.get(id.0).ok_or_else(|| {
            warn!("unknown sector {id:?}");
            CollisionError::UnknownSector
        })
    }

    pub fn sector_mut(&mut self, id: SectorId) -> CollisionResult<&mut CollisionSector> {
        self.sectors.get_mut(id.0).ok_or_else(|| {
            warn!("unknown sector {id:?}");
            CollisionError::UnknownSector
        })
    }

    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    pub fn sector_ids(&self) -> Vec<SectorId> {
        self.sectors.ids().into_iter().map(SectorId).collect()
    }

    /// Drops a sector together with everything it holds.
    pub fn remove_sector(&mut self, id: SectorId) -> CollisionResult<CollisionSector> {
        let sector = self.sectors.remove(id.0).ok_or_else(|| {
            warn!("unknown sector {id:?}");
            CollisionError::UnknownSector
        })?;
        debug!("removed sector {id:?}");
        Ok(sector)
    }

    /// Opens a portal in `source` leading into `destination`.
    pub fn add_portal(
        &mut self,
        source: SectorId,
        portal: Arc<dyn ScenePortal>,
        destination: SectorId,
    ) -> CollisionResult<PortalId> {
        self.sector(destination)?;
        self.sector_mut(source)?.add_portal(portal, destination)
    }

    // Groups

    pub fn group_table(&self) -> Arc<RwLock<GroupTable>> {
        Arc::clone(&self.groups)
    }

    pub fn create_group(&self, name: &str) -> CollisionResult<CollisionGroup> {
        self.groups.write().create_group(name)
    }

    pub fn find_group(&self, name: &str) -> Option<CollisionGroup> {
        self.groups.read().find(name).cloned()
    }

    /// Enables or disables collisions between two groups, in both directions.
    pub fn set_group_collision(&self, a: &str, b: &str, collide: bool) -> CollisionResult<()> {
        self.groups.write().set_group_collision(a, b, collide)
    }

    pub fn group_collision(&self, a: &str, b: &str) -> CollisionResult<bool> {
        self.groups.read().group_collision(a, b)
    }

    // Simulation

    /// Steps every sector, then delivers the portal traffic they produced.
    pub fn step(&mut self, duration: f32) {
        let _timer = ScopedTimer::new("CollisionSystem::step");
        for (_, sector) in self.sectors.iter_mut() {
            sector.step(duration);
        }
        self.deliver_portal_traffic();
    }

    /// Routes queued shadow and transfer messages to their destination sectors.
    pub fn deliver_portal_traffic(&mut self) {
        for source in self.sectors.ids() {
            let messages = match self.sectors.get_mut(source) {
                Some(sector) => sector.take_portal_messages(),
                None => continue,
            };
            for message in messages {
                self.deliver(SectorId(source), message);
            }
        }
    }

    fn deliver(&mut self, source: SectorId, message: PortalMessage) {
        let destination = message.destination();
        if self.sectors.contains(destination.0) {
            let key = message.key();
            if let Some(Err(err)) = self.sectors.get_mut(destination.0).map(|s| s.receive_portal_message(message)) {
                warn!("portal message {key:?} rejected by {destination:?}: {err}");
            }
            return;
        }
        match message {
            PortalMessage::Transfer { key, mut object, .. } => {
                warn!("destination {destination:?} is gone; object {:?} stays in {source:?}", key.object);
                let Some(sector) = self.sectors.get_mut(source.0) else {
                    return;
                };
                if let Some(warp) = sector.portal(key.portal).map(|p| p.warp()) {
                    let transform = object.transform();
                    object.set_transform(warp.inverse().combine(&transform));
                }
                if let Err(err) = sector.add_collision_object(*object) {
                    warn!("could not restore object {:?}: {err}", key.object);
                }
            }
            other => trace!("dropping portal message {:?} for missing sector", other.key()),
        }
    }

    /// Casts a beam that continues through the portals it crosses.
    ///
    /// The reported distance is measured along the whole path. Incomplete
    /// portals stop the query with an error.
    pub fn hit_beam_portal(&self, sector: SectorId, start: Vec3, end: Vec3) -> CollisionResult<HitBeamResult> {
        let (mut sector_id, mut start, mut end) = (sector, start, end);
        let mut travelled = 0.0;
        for _ in 0..=MAX_PORTAL_HOPS {
            let sector = self.sector(sector_id)?;
            let mut hit = sector.hit_beam(start, end);
            match sector.first_portal_crossing(start, end) {
                Some(crossing) if !hit.has_hit || crossing.distance < hit.distance => {
                    if !crossing.complete {
                        warn!("beam reached incomplete portal {:?}", crossing.portal);
                        return Err(CollisionError::IncompletePortal);
                    }
                    travelled += crossing.distance;
                    start = crossing.warp.transform_point(crossing.point);
                    end = crossing.warp.transform_point(end);
                    sector_id = crossing.destination;
                }
                _ => {
                    if hit.has_hit {
                        hit.distance += travelled;
                    }
                    return Ok(hit);
                }
            }
        }
        warn!("beam crossed more than {MAX_PORTAL_HOPS} portals; giving up");
        Ok(HitBeamResult::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_scale_needs_empty_sectors() {
        let mut system = CollisionSystem::new();
        let id = system.create_sector();
        assert_eq!(system.set_internal_scale(0.0), Err(CollisionError::InvalidParameter("internal scale must be positive")));
        system.set_internal_scale(2.0).expect("empty sector");
        assert_eq!(system.sector(id).expect("sector").unit_scale(), 2.0);

        let mut object = system.create_collision_object();
        object
            .add_collider(system.create_collider_sphere(1.0), Transform::IDENTITY)
            .expect("collider");
        system.sector_mut(id).expect("sector").add_collision_object(object).expect("added");
        assert_eq!(system.set_internal_scale(1.0), Err(CollisionError::SectorNotEmpty));
        assert_eq!(system.internal_scale(), 2.0);
    }

    #[test]
    fn removed_sector_is_unknown() {
        let mut system = CollisionSystem::new();
        let id = system.create_sector();
        assert_eq!(system.sector(id).expect("sector").id(), id);
        system.remove_sector(id).expect("removed");
        assert!(matches!(system.sector(id), Err(CollisionError::UnknownSector)));
    }

    #[test]
    fn groups_are_shared_with_sectors() {
        let mut system = CollisionSystem::new();
        let id = system.create_sector();
        system.create_group("props").expect("group");
        let table = system.sector(id).expect("sector").group_table();
        assert!(table.read().find("props").is_some());
    }
}
