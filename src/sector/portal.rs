//! Portals between sectors and the shadow traffic that keeps an object
//! consistent on both sides while it straddles one.
//!
//! A sector never touches its neighbors. It queues [`PortalMessage`]s that
//! the system routes to the destination after every step.

use std::{collections::BTreeSet, sync::Arc};

use glam::Vec3;
use log::{debug, trace, warn};

use super::CollisionSector;
use crate::{
    core::{
        collider::Collider,
        mesh::Aabb,
        group::builtin,
        handle::SectorId,
        object::{CollisionObject, CollisionObjectType},
        types::Transform,
    },
    error::{CollisionError, CollisionResult},
    scene::ScenePortal,
    utils::allocator::EntityId,
};

/// Portal slot inside its source sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortalId(pub EntityId);

/// Identifies the shadow of one object replicated through one portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShadowKey {
    pub source: SectorId,
    pub portal: PortalId,
    /// Object in the source sector.
    pub object: EntityId,
}

/// Replication traffic queued by a source sector for a destination sector.
#[derive(Debug)]
pub enum PortalMessage {
    CreateShadow {
        key: ShadowKey,
        destination: SectorId,
        object: Box<CollisionObject>,
    },
    /// New pose and velocities of a shadow, world units of the destination.
    UpdateShadow {
        key: ShadowKey,
        destination: SectorId,
        transform: Transform,
        linear_velocity: Vec3,
        angular_velocity: Vec3,
    },
    DestroyShadow {
        key: ShadowKey,
        destination: SectorId,
    },
    /// Ownership handover after the object fully crossed the portal plane.
    Transfer {
        key: ShadowKey,
        destination: SectorId,
        object: Box<CollisionObject>,
    },
}

impl PortalMessage {
    pub fn destination(&self) -> SectorId {
        match self {
            PortalMessage::CreateShadow { destination, .. }
            | PortalMessage::UpdateShadow { destination, .. }
            | PortalMessage::DestroyShadow { destination, .. }
            | PortalMessage::Transfer { destination, .. } => *destination,
        }
    }

    pub fn key(&self) -> ShadowKey {
        match self {
            PortalMessage::CreateShadow { key, .. }
            | PortalMessage::UpdateShadow { key, .. }
            | PortalMessage::DestroyShadow { key, .. }
            | PortalMessage::Transfer { key, .. } => *key,
        }
    }
}

pub(super) struct Portal {
    pub portal: Arc<dyn ScenePortal>,
    pub destination: SectorId,
    /// Ghost sphere sensing the objects near the opening.
    pub sensor: EntityId,
    /// Source objects that currently have a shadow on the far side.
    pub tracked: BTreeSet<EntityId>,
}

/// First portal crossed by a segment, world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PortalCrossing {
    pub portal: PortalId,
    pub distance: f32,
    pub point: Vec3,
    pub destination: SectorId,
    pub warp: Transform,
    pub complete: bool,
}

impl CollisionSector {
    /// Opens a portal towards `destination` and creates its sensor.
    pub fn add_portal(&mut self, portal: Arc<dyn ScenePortal>, destination: SectorId) -> CollisionResult<PortalId> {
        let radius = portal.radius();
        if !(radius.is_finite() && radius > 0.0) {
            warn!("portal radius must be positive, got {radius}");
            return Err(CollisionError::InvalidParameter("portal radius must be positive"));
        }
        let mut sensor = CollisionObject::new_ghost();
        sensor.add_collider(Arc::new(Collider::new_sphere(radius)), Transform::IDENTITY)?;
        sensor.set_transform(Transform::from_position(portal.center()));
        sensor.set_group_index(builtin::PORTAL);
        let sensor = self.add_collision_object(sensor)?;

        let id = self.portals.insert(Portal {
            portal,
            destination,
            sensor: sensor.id,
            tracked: BTreeSet::new(),
        });
        debug!("sector {:?} opened portal {id:?} towards {destination:?}", self.id);
        Ok(PortalId(id))
    }

    /// Closes a portal; every shadow it maintained is destroyed.
    pub fn remove_portal(&mut self, id: PortalId) -> CollisionResult<()> {
        let Some(portal) = self.portals.remove(id.0) else {
            warn!("portal {:?} is not part of sector {:?}", id.0, self.id);
            return Err(CollisionError::InvalidHandle);
        };
        for object in &portal.tracked {
            self.outbox.push(PortalMessage::DestroyShadow {
                key: ShadowKey {
                    source: self.id,
                    portal: id,
                    object: *object,
                },
                destination: portal.destination,
            });
        }
        self.detach_object(portal.sensor);
        Ok(())
    }

    pub fn portal_count(&self) -> usize {
        self.portals.len()
    }

    pub fn portal(&self, id: PortalId) -> Option<&Arc<dyn ScenePortal>> {
        self.portals.get(id.0).map(|p| &p.portal)
    }

    pub fn portal_destination(&self, id: PortalId) -> Option<SectorId> {
        self.portals.get(id.0).map(|p| p.destination)
    }

    /// Shadows of foreign objects currently hosted here.
    pub fn shadow_count(&self) -> usize {
        self.shadows.len()
    }

    pub fn shadow(&self, key: &ShadowKey) -> Option<crate::core::handle::ObjectHandle> {
        self.shadows.get(key).map(|id| self.handle(*id))
    }

    /// Drains the replication traffic queued by the last steps.
    pub fn take_portal_messages(&mut self) -> Vec<PortalMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Applies replication traffic coming from a neighboring sector.
    pub fn receive_portal_message(&mut self, message: PortalMessage) -> CollisionResult<()> {
        match message {
            PortalMessage::CreateShadow { key, object, .. } => {
                if self.shadows.contains_key(&key) {
                    trace!("shadow {key:?} already exists");
                    return Ok(());
                }
                let handle = self.add_collision_object(*object)?;
                self.shadows.insert(key, handle.id);
            }
            PortalMessage::UpdateShadow {
                key,
                transform,
                linear_velocity,
                angular_velocity,
                ..
            } => {
                let Some(object) = self.shadows.get(&key).and_then(|id| self.objects.get_mut(*id)) else {
                    trace!("update for unknown shadow {key:?}");
                    return Ok(());
                };
                object.set_transform(transform);
                if let Some(body) = object.rigid_body_mut() {
                    if body.is_dynamic() {
                        body.set_linear_velocity(linear_velocity);
                        body.set_angular_velocity(angular_velocity);
                    }
                }
            }
            PortalMessage::DestroyShadow { key, .. } => {
                if let Some(id) = self.shadows.remove(&key) {
                    self.detach_object(id);
                }
            }
            PortalMessage::Transfer { key, object, .. } => {
                if let Some(id) = self.shadows.remove(&key) {
                    self.detach_object(id);
                }
                let handle = self.add_collision_object(*object)?;
                debug!("sector {:?} took ownership of object {:?}", self.id, handle.id);
            }
        }
        Ok(())
    }

    /// Stops tracking a removed object and destroys its shadows.
    pub(super) fn forget_portal_tracking(&mut self, id: EntityId) {
        let source = self.id;
        for (portal_id, portal) in self.portals.iter_mut() {
            if portal.tracked.remove(&id) {
                self.outbox.push(PortalMessage::DestroyShadow {
                    key: ShadowKey {
                        source,
                        portal: PortalId(portal_id),
                        object: id,
                    },
                    destination: portal.destination,
                });
            }
        }
    }

    fn is_replicable(&self, id: EntityId) -> bool {
        let Some(object) = self.objects.get(id) else {
            return false;
        };
        if object.is_shadow() || self.is_portal_sensor(id) {
            return false;
        }
        match object.object_type() {
            CollisionObjectType::Ghost | CollisionObjectType::Actor => true,
            CollisionObjectType::Physical => object.rigid_body().is_some(),
            CollisionObjectType::Base | CollisionObjectType::Terrain => false,
        }
    }

    /// Queues shadow traffic for every portal from the overlaps of the last sub-step.
    pub(super) fn update_portals(&mut self) {
        for portal_id in self.portals.ids() {
            self.update_portal(portal_id);
        }
    }

    fn update_portal(&mut self, portal_id: EntityId) {
        let Some(portal) = self.portals.get(portal_id) else {
            return;
        };
        let scene = Arc::clone(&portal.portal);
        if !scene.is_complete() {
            trace!("portal {portal_id:?} is incomplete; replication paused");
            return;
        }
        let destination = portal.destination;
        let previous = portal.tracked.clone();
        let overlapping: Vec<EntityId> = self
            .objects
            .get(portal.sensor)
            .map(|sensor| sensor.overlaps.iter().map(|h| h.id).collect())
            .unwrap_or_default();

        let plane = scene.plane();
        let warp = scene.warp();
        let key = |object| ShadowKey {
            source: self.id,
            portal: PortalId(portal_id),
            object,
        };

        let replicable: Vec<EntityId> = overlapping
            .into_iter()
            .filter(|id| self.is_replicable(*id))
            .collect();
        let inverse_scale = 1.0 / self.unit_scale;

        let mut tracked = BTreeSet::new();
        let mut crossed = Vec::new();
        for id in replicable {
            let Some(object) = self.objects.get(id) else {
                continue;
            };
            let transform = object.transform();
            let behind = match object.world_aabb() {
                Some(bounds) => {
                    let bounds = Aabb::new(bounds.min * inverse_scale, bounds.max * inverse_scale);
                    let reach = bounds.extent().dot(plane.normal.abs());
                    plane.signed_distance(bounds.center()) + reach < 0.0
                }
                None => plane.signed_distance(transform.position) < 0.0,
            };
            if behind {
                // Only a shadowed object can cross.
                if previous.contains(&id) {
                    crossed.push(id);
                }
                continue;
            }
            let warped = warp.combine(&transform);
            let (linear, angular) = object
                .rigid_body()
                .map(|b| (b.linear_velocity(), b.angular_velocity()))
                .unwrap_or_default();
            let message = if previous.contains(&id) {
                PortalMessage::UpdateShadow {
                    key: key(id),
                    destination,
                    transform: warped,
                    linear_velocity: warp.rotation * linear,
                    angular_velocity: warp.rotation * angular,
                }
            } else {
                let mut shadow = object.replicate(warped);
                if let Some(body) = shadow.rigid_body_mut() {
                    body.set_linear_velocity(warp.rotation * linear);
                    body.set_angular_velocity(warp.rotation * angular);
                }
                trace!("object {id:?} entered portal {portal_id:?}");
                PortalMessage::CreateShadow {
                    key: key(id),
                    destination,
                    object: Box::new(shadow),
                }
            };
            self.outbox.push(message);
            tracked.insert(id);
        }

        for gone in previous.difference(&tracked).filter(|id| !crossed.contains(*id)) {
            self.outbox.push(PortalMessage::DestroyShadow {
                key: key(*gone),
                destination,
            });
        }
        if let Some(portal) = self.portals.get_mut(portal_id) {
            portal.tracked = tracked;
        }

        for id in crossed {
            let Some(mut object) = self.detach_object(id) else {
                continue;
            };
            let transform = object.transform();
            object.set_transform(warp.combine(&transform));
            if let Some(body) = object.rigid_body_mut() {
                let (linear, angular) = (body.linear_velocity(), body.angular_velocity());
                body.set_linear_velocity(warp.rotation * linear);
                body.set_angular_velocity(warp.rotation * angular);
            }
            debug!("object {id:?} crossed portal {portal_id:?} into {destination:?}");
            self.outbox.push(PortalMessage::Transfer {
                key: ShadowKey {
                    source: self.id,
                    portal: PortalId(portal_id),
                    object: id,
                },
                destination,
                object: Box::new(object),
            });
        }
    }

    /// Nearest portal whose opening the segment enters from the front, world units.
    pub(crate) fn first_portal_crossing(&self, start: Vec3, end: Vec3) -> Option<PortalCrossing> {
        let delta = end - start;
        let mut best: Option<PortalCrossing> = None;
        for (id, portal) in self.portals.iter() {
            let scene = &portal.portal;
            let plane = scene.plane();
            let (front, back) = (plane.signed_distance(start), plane.signed_distance(end));
            if front < 0.0 || back >= 0.0 {
                continue;
            }
            let t = front / (front - back);
            let point = start + delta * t;
            if point.distance(scene.center()) > scene.radius() {
                continue;
            }
            let distance = delta.length() * t;
            if best.as_ref().is_some_and(|b| b.distance <= distance) {
                continue;
            }
            best = Some(PortalCrossing {
                portal: PortalId(id),
                distance,
                point,
                destination: portal.destination,
                warp: scene.warp(),
                complete: scene.is_complete(),
            });
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{group::GroupTable, types::Plane};
    use parking_lot::RwLock;

    struct Doorway;

    impl ScenePortal for Doorway {
        fn center(&self) -> Vec3 {
            Vec3::ZERO
        }
        fn radius(&self) -> f32 {
            2.0
        }
        fn plane(&self) -> Plane {
            Plane::from_point_normal(Vec3::ZERO, Vec3::X)
        }
        fn warp(&self) -> Transform {
            Transform::from_position(Vec3::new(100.0, 0.0, 0.0))
        }
    }

    fn sector(index: usize) -> CollisionSector {
        CollisionSector::new(
            SectorId(EntityId::new(index, 0)),
            1.0,
            Arc::new(RwLock::new(GroupTable::new())),
        )
    }

    fn orb(x: f32, radius: f32) -> CollisionObject {
        let mut object = CollisionObject::new_ghost();
        object
            .add_collider(Arc::new(Collider::new_sphere(radius)), Transform::IDENTITY)
            .expect("sphere collider");
        object.set_transform(Transform::from_position(Vec3::new(x, 0.0, 0.0)));
        object
    }

    fn kinds(messages: &[PortalMessage]) -> Vec<&'static str> {
        messages
            .iter()
            .map(|m| match m {
                PortalMessage::CreateShadow { .. } => "create",
                PortalMessage::UpdateShadow { .. } => "update",
                PortalMessage::DestroyShadow { .. } => "destroy",
                PortalMessage::Transfer { .. } => "transfer",
            })
            .collect()
    }

    #[test]
    fn sensor_is_hidden_from_object_counts() {
        let mut sector = sector(0);
        let portal = sector.add_portal(Arc::new(Doorway), SectorId(EntityId::new(1, 0))).expect("portal");
        assert_eq!(sector.object_count(), 0);
        assert_eq!(sector.portal_count(), 1);
        assert!(sector.is_empty());
        sector.remove_portal(portal).expect("removed");
        assert_eq!(sector.portal_count(), 0);
    }

    #[test]
    fn object_is_shadowed_then_transferred() {
        let mut sector = sector(0);
        sector.set_gravity(Vec3::ZERO);
        sector.add_portal(Arc::new(Doorway), SectorId(EntityId::new(1, 0))).expect("portal");
        let handle = sector.add_collision_object(orb(1.0, 0.25)).expect("added");

        sector.step(1.0 / 60.0);
        assert_eq!(kinds(&sector.take_portal_messages()), vec!["create"]);

        sector.step(1.0 / 60.0);
        assert_eq!(kinds(&sector.take_portal_messages()), vec!["update"]);

        if let Some(object) = sector.object_mut(handle) {
            object.set_transform(Transform::from_position(Vec3::new(-0.5, 0.0, 0.0)));
        }
        sector.step(1.0 / 60.0);
        let messages = sector.take_portal_messages();
        assert_eq!(kinds(&messages), vec!["transfer"]);
        assert!(sector.object(handle).is_none());
        let PortalMessage::Transfer { object, .. } = &messages[0] else {
            unreachable!("checked above");
        };
        assert!((object.transform().position.x - 99.5).abs() < 1e-4);
    }

    #[test]
    fn straddling_object_is_shadowed_not_transferred() {
        let mut sector = sector(0);
        sector.add_portal(Arc::new(Doorway), SectorId(EntityId::new(1, 0))).expect("portal");
        let handle = sector.add_collision_object(orb(-0.1, 0.5)).expect("added");

        sector.step(1.0 / 60.0);
        assert_eq!(kinds(&sector.take_portal_messages()), vec!["create"]);
        assert_eq!(sector.object_count(), 1);
        assert!(sector.object(handle).is_some());
    }

    #[test]
    fn object_behind_the_plane_without_a_shadow_stays() {
        let mut sector = sector(0);
        sector.add_portal(Arc::new(Doorway), SectorId(EntityId::new(1, 0))).expect("portal");
        let handle = sector.add_collision_object(orb(-1.0, 0.25)).expect("added");

        sector.step(1.0 / 60.0);
        assert!(sector.take_portal_messages().is_empty());
        assert!(sector.object(handle).is_some());
    }

    #[test]
    fn leaving_the_sensor_destroys_the_shadow() {
        let mut sector = sector(0);
        sector.add_portal(Arc::new(Doorway), SectorId(EntityId::new(1, 0))).expect("portal");
        let handle = sector.add_collision_object(orb(1.0, 0.25)).expect("added");
        sector.step(1.0 / 60.0);
        sector.take_portal_messages();
        if let Some(object) = sector.object_mut(handle) {
            object.set_transform(Transform::from_position(Vec3::new(10.0, 0.0, 0.0)));
        }
        sector.step(1.0 / 60.0);
        assert_eq!(kinds(&sector.take_portal_messages()), vec!["destroy"]);
    }

    #[test]
    fn segment_crosses_portal_from_the_front_only() {
        let mut sector = sector(0);
        sector.add_portal(Arc::new(Doorway), SectorId(EntityId::new(1, 0))).expect("portal");
        let crossing = sector
            .first_portal_crossing(Vec3::new(1.0, 0.0, 0.0), Vec3::new(-3.0, 0.0, 0.0))
            .expect("crosses");
        assert!((crossing.distance - 1.0).abs() < 1e-5);
        assert!(sector
            .first_portal_crossing(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(3.0, 0.0, 0.0))
            .is_none());
        assert!(sector
            .first_portal_crossing(Vec3::new(1.0, 5.0, 0.0), Vec3::new(-1.0, 5.0, 0.0))
            .is_none());
    }
}
