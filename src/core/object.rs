//! Collision objects: a transform, one or more colliders and a group.
//!
//! Objects are created detached. Adding one to a sector assigns its handle
//! and builds the backend proxy; after changing the collider list the owner
//! calls `CollisionSector::rebuild_object`.

use std::sync::{Arc, Weak};

use glam::{Mat3, Vec3};
use log::{debug, warn};

use crate::{
    collision::shapes::Shape,
    core::{
        actor::Actor,
        body::PhysicalBody,
        collider::Collider,
        group::{builtin, GroupTable},
        handle::{ObjectHandle, SectorId},
        mesh::Aabb,
        rigidbody::{RigidBody, RigidBodyState},
        softbody::SoftBody,
        types::Transform,
    },
    error::{CollisionError, CollisionResult},
    scene::{Camera, CollisionCallback, Movable},
};

/// Behavioral kind of a collision object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollisionObjectType {
    /// Static geometry.
    Base,
    /// Overlap sensor without collision response.
    Ghost,
    /// Kinematic character controller.
    Actor,
    /// Streamed heightfield.
    Terrain,
    /// Rigid or soft body driven by the solver.
    Physical,
}

/// Backend view of an object, rebuilt by `rebuild_object`. Backend units.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BackendProxy {
    pub shapes: Vec<(Arc<Shape>, Transform)>,
    pub local_aabb: Aabb,
    pub group: u8,
}

pub struct CollisionObject {
    kind: CollisionObjectType,
    colliders: Vec<(Arc<Collider>, Transform)>,
    pub(crate) transform: Transform,
    pub(crate) unit_scale: f32,
    pub(crate) group: u8,
    movable: Option<Weak<dyn Movable>>,
    camera: Option<Weak<dyn Camera>>,
    callback: Option<Arc<dyn CollisionCallback>>,
    pub(crate) contacts: Vec<ObjectHandle>,
    pub(crate) overlaps: Vec<ObjectHandle>,
    pub(crate) inside_world: bool,
    dirty: bool,
    static_colliders: usize,
    pub(crate) handle: Option<ObjectHandle>,
    pub(crate) shadow: bool,
    pub(crate) body: Option<PhysicalBody>,
    pub(crate) actor: Option<Actor>,
    pub(crate) proxy: Option<BackendProxy>,
}

impl std::fmt::Debug for CollisionObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionObject")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .field("colliders", &self.colliders.len())
            .field("transform", &self.transform())
            .field("group", &self.group)
            .field("inside_world", &self.inside_world)
            .field("shadow", &self.shadow)
            .field("body", &self.body)
            .finish()
    }
}

impl CollisionObject {
    fn with_kind(kind: CollisionObjectType) -> Self {
        Self {
            kind,
            colliders: Vec::new(),
            transform: Transform::IDENTITY,
            unit_scale: 1.0,
            group: builtin::DEFAULT,
            movable: None,
            camera: None,
            callback: None,
            contacts: Vec::new(),
            overlaps: Vec::new(),
            inside_world: false,
            dirty: true,
            static_colliders: 0,
            handle: None,
            shadow: false,
            body: None,
            actor: None,
            proxy: None,
        }
    }

    /// Static object.
    pub fn new() -> Self {
        Self::with_kind(CollisionObjectType::Base)
    }

    pub fn new_ghost() -> Self {
        Self::with_kind(CollisionObjectType::Ghost)
    }

    pub fn new_actor() -> Self {
        let mut object = Self::with_kind(CollisionObjectType::Actor);
        object.actor = Some(Actor::new());
        object.group = builtin::CHARACTER;
        object
    }

    pub fn new_rigid_body(body: RigidBody) -> Self {
        let mut object = Self::with_kind(CollisionObjectType::Physical);
        object.body = Some(PhysicalBody::Rigid(body));
        object
    }

    /// Soft bodies carry no colliders; their triangles are the shape.
    pub fn new_soft_body(body: SoftBody) -> Self {
        let mut object = Self::with_kind(CollisionObjectType::Physical);
        object.body = Some(PhysicalBody::Soft(body));
        object
    }

    pub fn object_type(&self) -> CollisionObjectType {
        self.kind
    }

    /// Changes between static and sensor behavior.
    ///
    /// Actor and physical objects need dedicated construction; terrain and
    /// objects holding static-only colliders stay static.
    pub fn set_object_type(&mut self, kind: CollisionObjectType) -> CollisionResult<()> {
        if kind == self.kind {
            return Ok(());
        }
        let allowed = matches!(
            (self.kind, kind),
            (CollisionObjectType::Base, CollisionObjectType::Ghost)
                | (CollisionObjectType::Ghost, CollisionObjectType::Base)
        ) && (self.static_colliders == 0 || kind == CollisionObjectType::Base);
        if !allowed {
            warn!("cannot change collision object type from {:?} to {kind:?}", self.kind);
            return Err(CollisionError::ForbiddenTypeTransition {
                from: self.kind,
                to: kind,
            });
        }
        self.kind = kind;
        self.dirty = true;
        Ok(())
    }

    pub fn handle(&self) -> Option<ObjectHandle> {
        self.handle
    }

    pub fn sector(&self) -> Option<SectorId> {
        self.handle.map(|h| h.sector)
    }

    pub fn is_in_world(&self) -> bool {
        self.inside_world
    }

    /// True when the collider list changed since the last rebuild.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Replica of an object straddling a portal from a neighboring sector.
    pub fn is_shadow(&self) -> bool {
        self.shadow
    }

    pub fn add_collider(&mut self, collider: Arc<Collider>, relative: Transform) -> CollisionResult<()> {
        if self.soft_body().is_some() {
            warn!("soft bodies do not take colliders");
            return Err(CollisionError::SoftBodyCollider);
        }
        if collider.is_terrain() {
            if !matches!(self.kind, CollisionObjectType::Base | CollisionObjectType::Terrain) {
                warn!("terrain colliders need a static object, got {:?}", self.kind);
                return Err(CollisionError::ForbiddenTypeTransition {
                    from: self.kind,
                    to: CollisionObjectType::Terrain,
                });
            }
            self.colliders.clear();
            self.static_colliders = 0;
            self.kind = CollisionObjectType::Terrain;
        } else if self.kind == CollisionObjectType::Terrain {
            warn!("terrain objects cannot hold other colliders");
            return Err(CollisionError::TerrainMixed);
        }
        if collider.is_static_only() {
            self.static_colliders += 1;
        }
        self.colliders.push((collider, relative));
        self.dirty = true;
        self.update_mass_properties();
        Ok(())
    }

    /// Removes the first occurrence of `collider`.
    pub fn remove_collider(&mut self, collider: &Arc<Collider>) -> CollisionResult<()> {
        match self.colliders.iter().position(|(c, _)| Arc::ptr_eq(c, collider)) {
            Some(index) => self.remove_collider_at(index),
            None => {
                warn!("collider is not attached to this object");
                Err(CollisionError::InvalidHandle)
            }
        }
    }

    pub fn remove_collider_at(&mut self, index: usize) -> CollisionResult<()> {
        if index >= self.colliders.len() {
            warn!(
                "collider index {index} out of range ({} colliders)",
                self.colliders.len()
            );
            return Err(CollisionError::InvalidHandle);
        }
        let (collider, _) = self.colliders.remove(index);
        if collider.is_static_only() {
            self.static_colliders = self.static_colliders.saturating_sub(1);
        }
        if collider.is_terrain() {
            self.kind = CollisionObjectType::Base;
        }
        self.dirty = true;
        self.update_mass_properties();
        Ok(())
    }

    pub fn collider(&self, index: usize) -> Option<&Arc<Collider>> {
        self.colliders.get(index).map(|(c, _)| c)
    }

    pub fn collider_transform(&self, index: usize) -> Option<Transform> {
        self.colliders.get(index).map(|(_, t)| *t)
    }

    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    pub fn colliders(&self) -> impl Iterator<Item = (&Arc<Collider>, &Transform)> + '_ {
        self.colliders.iter().map(|(c, t)| (c, t))
    }

    /// Transform in world units.
    pub fn transform(&self) -> Transform {
        self.transform.scaled_translation(1.0 / self.unit_scale)
    }

    pub fn set_transform(&mut self, transform: Transform) {
        let scaled = transform.scaled_translation(self.unit_scale);
        if let Some(PhysicalBody::Soft(soft)) = &mut self.body {
            soft.translate(scaled.position - soft.backend_centroid());
        }
        self.transform = scaled;
        if let Some(body) = self.rigid_body_mut() {
            body.sleep_timer = 0.0;
            body.enable();
        }
        self.sync_attachments();
    }

    /// Pushes the current transform to the attached movable and camera.
    pub(crate) fn sync_attachments(&self) {
        let transform = self.transform();
        if let Some(movable) = self.attached_movable() {
            movable.set_transform(transform);
        }
        if let Some(camera) = self.attached_camera() {
            camera.set_transform(transform);
        }
    }

    pub fn collision_group(&self) -> u8 {
        self.group
    }

    /// Moves the object to the named group of `groups`.
    pub fn set_collision_group(&mut self, groups: &GroupTable, name: &str) -> CollisionResult<()> {
        self.group = groups.index_of(name)?;
        if let Some(proxy) = &mut self.proxy {
            proxy.group = self.group;
        }
        Ok(())
    }

    pub(crate) fn set_group_index(&mut self, group: u8) {
        self.group = group;
        if let Some(proxy) = &mut self.proxy {
            proxy.group = group;
        }
    }

    pub fn collision_callback(&self) -> Option<&Arc<dyn CollisionCallback>> {
        self.callback.as_ref()
    }

    pub fn set_collision_callback(&mut self, callback: Option<Arc<dyn CollisionCallback>>) {
        self.callback = callback;
    }

    pub fn attached_movable(&self) -> Option<Arc<dyn Movable>> {
        self.movable.as_ref().and_then(Weak::upgrade)
    }

    /// Attaches a scene node; it follows the object after every step.
    pub fn set_attached_movable(&mut self, movable: Option<&Arc<dyn Movable>>) {
        self.movable = movable.map(Arc::downgrade);
    }

    pub fn attached_camera(&self) -> Option<Arc<dyn Camera>> {
        self.camera.as_ref().and_then(Weak::upgrade)
    }

    pub fn set_attached_camera(&mut self, camera: Option<&Arc<dyn Camera>>) {
        self.camera = camera.map(Arc::downgrade);
    }

    /// Objects touching this one after the last step.
    pub fn contact_objects(&self) -> &[ObjectHandle] {
        &self.contacts
    }

    /// Broad-phase overlaps of a ghost or actor after the last step.
    pub fn overlapping_objects(&self) -> &[ObjectHandle] {
        &self.overlaps
    }

    pub fn body(&self) -> Option<&PhysicalBody> {
        self.body.as_ref()
    }

    pub fn rigid_body(&self) -> Option<&RigidBody> {
        self.body.as_ref().and_then(PhysicalBody::as_rigid)
    }

    pub fn rigid_body_mut(&mut self) -> Option<&mut RigidBody> {
        self.body.as_mut().and_then(PhysicalBody::as_rigid_mut)
    }

    pub fn soft_body(&self) -> Option<&SoftBody> {
        self.body.as_ref().and_then(PhysicalBody::as_soft)
    }

    pub fn soft_body_mut(&mut self) -> Option<&mut SoftBody> {
        self.body.as_mut().and_then(PhysicalBody::as_soft_mut)
    }

    pub fn actor(&self) -> Option<&Actor> {
        self.actor.as_ref()
    }

    pub fn actor_mut(&mut self) -> Option<&mut Actor> {
        self.actor.as_mut()
    }

    /// Never moves under the solver: static geometry or a static rigid body.
    pub fn is_static(&self) -> bool {
        match self.kind {
            CollisionObjectType::Base | CollisionObjectType::Terrain => true,
            CollisionObjectType::Physical => self
                .rigid_body()
                .is_some_and(|b| b.state() == RigidBodyState::Static),
            CollisionObjectType::Ghost | CollisionObjectType::Actor => false,
        }
    }

    fn rigid_for_forces(&mut self) -> CollisionResult<(&mut RigidBody, Transform)> {
        let transform = self.transform();
        match self.rigid_body_mut() {
            Some(body) => Ok((body, transform)),
            None => {
                warn!("forces need a rigid body");
                Err(CollisionError::NotPhysical)
            }
        }
    }

    /// Force given in body space, applied at the center of mass.
    pub fn add_rel_force(&mut self, force: Vec3) -> CollisionResult<()> {
        let (body, transform) = self.rigid_for_forces()?;
        body.add_force(transform.rotation * force);
        Ok(())
    }

    pub fn add_rel_torque(&mut self, torque: Vec3) -> CollisionResult<()> {
        let (body, transform) = self.rigid_for_forces()?;
        body.add_torque(transform.rotation * torque);
        Ok(())
    }

    /// World force applied at a world position.
    pub fn add_force_at_pos(&mut self, force: Vec3, position: Vec3) -> CollisionResult<()> {
        let (body, transform) = self.rigid_for_forces()?;
        body.add_force(force);
        body.add_torque((position - transform.position).cross(force));
        Ok(())
    }

    /// World force applied at a body-space position.
    pub fn add_force_at_rel_pos(&mut self, force: Vec3, position: Vec3) -> CollisionResult<()> {
        let world = self.transform().rigid().transform_point(position);
        self.add_force_at_pos(force, world)
    }

    pub fn add_rel_force_at_pos(&mut self, force: Vec3, position: Vec3) -> CollisionResult<()> {
        let world = self.transform().rotation * force;
        self.add_force_at_pos(world, position)
    }

    pub fn add_rel_force_at_rel_pos(&mut self, force: Vec3, position: Vec3) -> CollisionResult<()> {
        let transform = self.transform().rigid();
        self.add_force_at_pos(transform.rotation * force, transform.transform_point(position))
    }

    /// Re-derives volume and unit-mass inertia from the colliders.
    pub(crate) fn update_mass_properties(&mut self) {
        let scale = self.unit_scale;
        let parts: Vec<(f32, Mat3)> = self
            .colliders
            .iter()
            .filter_map(|(collider, relative)| {
                let shape = collider.shape(scale)?;
                Some((collider.volume(), local_unit_inertia(&shape, relative, scale)))
            })
            .collect();
        let Some(body) = self.rigid_body_mut() else {
            return;
        };
        let total: f32 = parts.iter().map(|(v, _)| v).sum();
        body.set_volume(total);
        if parts.is_empty() {
            body.set_local_inertia(Mat3::IDENTITY * scale * scale);
            return;
        }
        let count = parts.len() as f32;
        let inertia = parts.iter().fold(Mat3::ZERO, |acc, (volume, unit)| {
            let weight = if total > f32::EPSILON {
                volume / total
            } else {
                1.0 / count
            };
            acc + *unit * weight
        });
        body.set_local_inertia(inertia);
    }

    /// Builds the backend view of this object.
    pub(crate) fn build_proxy(&self) -> CollisionResult<BackendProxy> {
        if let Some(soft) = self.soft_body() {
            return Ok(BackendProxy {
                shapes: Vec::new(),
                local_aabb: soft.aabb(),
                group: self.group,
            });
        }
        if self.colliders.is_empty() {
            return Err(CollisionError::NoCollider);
        }
        let mut shapes = Vec::with_capacity(self.colliders.len());
        let mut local_aabb = Aabb::empty();
        for (collider, relative) in &self.colliders {
            let Some(shape) = collider.shape(self.unit_scale) else {
                continue;
            };
            let relative = relative.rigid().scaled_translation(self.unit_scale);
            local_aabb.merge(&shape.local_aabb().transformed(&relative));
            shapes.push((shape, relative));
        }
        if shapes.is_empty() {
            debug!("collision object has only degenerate colliders; it will not collide");
        }
        Ok(BackendProxy {
            shapes,
            local_aabb,
            group: self.group,
        })
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Backend-unit world bounds, or `None` when nothing is built.
    pub(crate) fn world_aabb(&self) -> Option<Aabb> {
        if let Some(soft) = self.soft_body() {
            return Some(soft.aabb());
        }
        let proxy = self.proxy.as_ref()?;
        if proxy.shapes.is_empty() {
            return None;
        }
        // Streamed terrain grows and shrinks between rebuilds.
        let local = if self.kind == CollisionObjectType::Terrain {
            proxy.shapes.iter().fold(Aabb::empty(), |mut bounds, (shape, relative)| {
                bounds.merge(&shape.local_aabb().transformed(relative));
                bounds
            })
        } else {
            proxy.local_aabb
        };
        Some(local.transformed(&self.transform.rigid()))
    }

    /// Copy standing in for this object on the far side of a portal.
    ///
    /// The copy shares colliders, lives in the portal group and ignores
    /// gravity; `transform` is in world units.
    pub(crate) fn replicate(&self, transform: Transform) -> CollisionObject {
        let kind = match self.kind {
            CollisionObjectType::Actor => CollisionObjectType::Ghost,
            kind => kind,
        };
        let mut copy = Self::with_kind(kind);
        copy.colliders = self.colliders.clone();
        copy.static_colliders = self.static_colliders;
        copy.unit_scale = self.unit_scale;
        copy.transform = transform.scaled_translation(self.unit_scale);
        copy.group = builtin::PORTAL;
        copy.shadow = true;
        copy.body = self.body.clone();
        if let Some(body) = copy.rigid_body_mut() {
            body.set_gravity_enabled(false);
            body.set_kinematic_callback(None);
        }
        copy
    }

    /// Converts backend state from the current scale to `scale`.
    pub(crate) fn rescale(&mut self, scale: f32) {
        if (scale - self.unit_scale).abs() <= f32::EPSILON {
            return;
        }
        let ratio = scale / self.unit_scale;
        self.transform.position *= ratio;
        if let Some(body) = &mut self.body {
            body.rescale(scale);
        }
        self.unit_scale = scale;
        self.update_mass_properties();
        self.proxy = None;
        self.dirty = true;
    }
}

impl Default for CollisionObject {
    fn default() -> Self {
        Self::new()
    }
}

/// Unit-mass inertia of one collider about the body origin.
fn local_unit_inertia(shape: &Shape, relative: &Transform, scale: f32) -> Mat3 {
    let rotation = Mat3::from_quat(relative.rotation);
    let offset = relative.position * scale;
    let rotated = rotation * shape.inertia(1.0) * rotation.transpose();
    let parallel = Mat3::IDENTITY * offset.length_squared()
        - Mat3::from_cols(offset * offset.x, offset * offset.y, offset * offset.z);
    rotated + parallel
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{terrain::TerrainCollider, types::Plane};
    use approx::assert_relative_eq;

    #[test]
    fn terrain_collider_replaces_list_and_locks_kind() {
        let mut object = CollisionObject::new();
        object
            .add_collider(Arc::new(Collider::new_box(Vec3::ONE)), Transform::IDENTITY)
            .expect("box on a static object");
        let terrain = Arc::new(TerrainCollider::new(0.0, 10.0));
        object
            .add_collider(Arc::new(Collider::new_terrain(terrain)), Transform::IDENTITY)
            .expect("terrain on a static object");
        assert_eq!(object.collider_count(), 1);
        assert_eq!(object.object_type(), CollisionObjectType::Terrain);
        assert_eq!(
            object.add_collider(Arc::new(Collider::new_sphere(1.0)), Transform::IDENTITY),
            Err(CollisionError::TerrainMixed)
        );
        assert!(object.set_object_type(CollisionObjectType::Ghost).is_err());
    }

    #[test]
    fn static_colliders_pin_the_object_type() {
        let mut object = CollisionObject::new();
        object
            .add_collider(
                Arc::new(Collider::new_plane(Plane::new(Vec3::Y, 0.0))),
                Transform::IDENTITY,
            )
            .expect("plane on a static object");
        assert!(matches!(
            object.set_object_type(CollisionObjectType::Ghost),
            Err(CollisionError::ForbiddenTypeTransition { .. })
        ));
        assert_eq!(object.object_type(), CollisionObjectType::Base);
        object.remove_collider_at(0).expect("one collider");
        object
            .set_object_type(CollisionObjectType::Ghost)
            .expect("plain objects may become ghosts");
        assert!(object.set_object_type(CollisionObjectType::Actor).is_err());
    }

    #[test]
    fn rigid_inertia_includes_offsets() {
        let sphere = Arc::new(Collider::new_sphere(0.5));
        let mut object = CollisionObject::new_rigid_body(RigidBody::new());
        object
            .add_collider(sphere.clone(), Transform::from_position(Vec3::new(1.0, 0.0, 0.0)))
            .expect("sphere");
        let body = object.rigid_body().expect("rigid");
        let centered = 0.4 * 0.25;
        assert_relative_eq!(body.local_inertia.x_axis.x, centered, epsilon = 1e-5);
        assert_relative_eq!(body.local_inertia.y_axis.y, centered + 1.0, epsilon = 1e-5);
        assert_relative_eq!(body.volume(), sphere.volume(), epsilon = 1e-5);
    }

    #[test]
    fn soft_bodies_refuse_colliders() {
        let mut object = CollisionObject::new_soft_body(SoftBody::rope(Vec3::ZERO, Vec3::X, 2));
        assert_eq!(
            object.add_collider(Arc::new(Collider::new_sphere(1.0)), Transform::IDENTITY),
            Err(CollisionError::SoftBodyCollider)
        );
    }

    #[test]
    fn rel_force_follows_orientation() {
        let mut object = CollisionObject::new_rigid_body(RigidBody::new());
        object.set_transform(Transform::from_position_rotation(
            Vec3::ZERO,
            glam::Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
        ));
        object.add_rel_force(Vec3::X).expect("rigid");
        let force = object.rigid_body().expect("rigid").force();
        assert_relative_eq!(force.y, 1.0, epsilon = 1e-5);

        let mut ghost = CollisionObject::new_ghost();
        assert_eq!(ghost.add_rel_force(Vec3::X), Err(CollisionError::NotPhysical));
    }
}
