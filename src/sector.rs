//! A collision sector owns the objects, joints and backend state of one
//! region of the world. Sectors are joined by portals and stepped by the
//! [`CollisionSystem`](crate::system::CollisionSystem).

mod character;
mod pipeline;
mod portal;
mod queries;

pub use portal::{PortalId, PortalMessage, ShadowKey};
pub use queries::{HitBeamResult, MoveResult};

use std::{collections::BTreeMap, sync::Arc};

use glam::Vec3;
use log::{debug, warn};
use parking_lot::RwLock;

use crate::{
    collision::{broadphase::BroadPhase, contact::ManifoldCache},
    config::{
        AutoDisableParams, StepParameters, DEFAULT_BROADPHASE_CELL_SIZE, DEFAULT_GRAVITY,
        DEFAULT_LINEAR_DAMPING, DEFAULT_ROLLING_DAMPING,
    },
    core::{
        group::GroupTable,
        handle::{JointHandle, ObjectHandle, SectorId},
        joint::{Joint, JointFrame},
        object::CollisionObject,
        softbody::SoftAnchor,
        types::Transform,
    },
    dynamics::{integrator::Integrator, island::IslandManager},
    error::{CollisionError, CollisionResult},
    scene::SceneSector,
    utils::{
        allocator::{Arena, EntityId},
        profiling::SectorProfile,
    },
};

pub struct CollisionSector {
    id: SectorId,
    unit_scale: f32,
    groups: Arc<RwLock<GroupTable>>,
    objects: Arena<CollisionObject>,
    joints: Arena<Joint>,
    gravity: Vec3,
    step_parameters: StepParameters,
    simulation_speed: f32,
    integrator: Integrator,
    auto_disable: bool,
    auto_disable_params: AutoDisableParams,
    soft_bodies_enabled: bool,
    scene_sector: Option<Arc<dyn SceneSector>>,
    portals: Arena<portal::Portal>,
    /// Shadows hosted here for objects of neighboring sectors.
    shadows: BTreeMap<ShadowKey, EntityId>,
    outbox: Vec<PortalMessage>,
    broad_phase: BroadPhase,
    manifolds: ManifoldCache,
    islands: IslandManager,
    /// Soft body and collider pairs touching during the last sub-step.
    soft_touches: Vec<(EntityId, EntityId)>,
    accumulator: f64,
    profile: SectorProfile,
}

impl std::fmt::Debug for CollisionSector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionSector")
            .field("id", &self.id)
            .field("unit_scale", &self.unit_scale)
            .field("objects", &self.objects.len())
            .field("joints", &self.joints.len())
            .field("portals", &self.portals.len())
            .field("gravity", &self.gravity)
            .field("step_parameters", &self.step_parameters)
            .finish()
    }
}

impl CollisionSector {
    pub(crate) fn new(id: SectorId, unit_scale: f32, groups: Arc<RwLock<GroupTable>>) -> Self {
        Self {
            id,
            unit_scale,
            groups,
            objects: Arena::new(),
            joints: Arena::new(),
            gravity: Vec3::from_array(DEFAULT_GRAVITY),
            step_parameters: StepParameters::default(),
            simulation_speed: 1.0,
            integrator: Integrator::new(DEFAULT_LINEAR_DAMPING, DEFAULT_ROLLING_DAMPING),
            auto_disable: true,
            auto_disable_params: AutoDisableParams::default(),
            soft_bodies_enabled: true,
            scene_sector: None,
            portals: Arena::new(),
            shadows: BTreeMap::new(),
            outbox: Vec::new(),
            broad_phase: BroadPhase::new(DEFAULT_BROADPHASE_CELL_SIZE * unit_scale),
            manifolds: ManifoldCache::new(),
            islands: IslandManager::new(),
            soft_touches: Vec::new(),
            accumulator: 0.0,
            profile: SectorProfile::default(),
        }
    }

    pub fn id(&self) -> SectorId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: SectorId) {
        self.id = id;
    }

    pub fn unit_scale(&self) -> f32 {
        self.unit_scale
    }

    /// Only valid while the sector holds nothing.
    pub(crate) fn set_unit_scale(&mut self, scale: f32) {
        self.unit_scale = scale;
        self.broad_phase = BroadPhase::new(DEFAULT_BROADPHASE_CELL_SIZE * scale);
        self.manifolds.clear();
        // Portal sensors are the only objects an empty sector still holds.
        for (_, object) in self.objects.iter_mut() {
            object.rescale(scale);
            object.proxy = object.build_proxy().ok();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.objects.len() == self.sensor_count() && self.joints.is_empty()
    }

    fn sensor_count(&self) -> usize {
        self.portals.len()
    }

    pub fn group_table(&self) -> Arc<RwLock<GroupTable>> {
        Arc::clone(&self.groups)
    }

    pub(crate) fn handle(&self, id: EntityId) -> ObjectHandle {
        ObjectHandle { sector: self.id, id }
    }

    /// Resolves a handle to a live object of this sector.
    fn check_handle(&self, handle: ObjectHandle) -> CollisionResult<EntityId> {
        if handle.sector != self.id {
            warn!("object {:?} belongs to another sector", handle.id);
            return Err(CollisionError::NotInSector);
        }
        if !self.objects.contains(handle.id) {
            warn!("object {:?} is not alive in sector {:?}", handle.id, self.id);
            return Err(CollisionError::InvalidHandle);
        }
        Ok(handle.id)
    }

    fn check_joint(&self, handle: JointHandle) -> CollisionResult<EntityId> {
        if handle.sector != self.id || !self.joints.contains(handle.id) {
            warn!("joint {:?} is not alive in sector {:?}", handle.id, self.id);
            return Err(CollisionError::InvalidHandle);
        }
        Ok(handle.id)
    }

    // ---- settings ----

    /// Gravity in world units.
    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
        for (_, object) in self.objects.iter_mut() {
            if let Some(body) = object.rigid_body_mut() {
                body.enable();
            }
        }
    }

    pub fn step_parameters(&self) -> StepParameters {
        self.step_parameters
    }

    /// Sub-step duration, sub-step cap per `step` call and solver iterations.
    pub fn set_step_parameters(&mut self, time_step: f32, max_steps: u32, iterations: u32) -> CollisionResult<()> {
        if !(time_step.is_finite() && time_step > 0.0) || max_steps == 0 || iterations == 0 {
            warn!("rejected step parameters ({time_step}, {max_steps}, {iterations})");
            return Err(CollisionError::InvalidParameter("step parameters must be positive"));
        }
        self.step_parameters = StepParameters {
            time_step,
            max_steps,
            iterations,
        };
        Ok(())
    }

    pub fn solver_iterations(&self) -> u32 {
        self.step_parameters.iterations
    }

    pub fn simulation_speed(&self) -> f32 {
        self.simulation_speed
    }

    /// Multiplier applied to every `step` duration; zero pauses the sector.
    pub fn set_simulation_speed(&mut self, speed: f32) {
        self.simulation_speed = if speed.is_finite() { speed.max(0.0) } else { 0.0 };
    }

    pub fn linear_dampener(&self) -> f32 {
        self.integrator.linear_damping
    }

    pub fn set_linear_dampener(&mut self, damping: f32) {
        self.integrator.linear_damping = damping.max(0.0);
    }

    pub fn rolling_dampener(&self) -> f32 {
        self.integrator.angular_damping
    }

    pub fn set_rolling_dampener(&mut self, damping: f32) {
        self.integrator.angular_damping = damping.max(0.0);
    }

    pub fn auto_disable(&self) -> bool {
        self.auto_disable
    }

    /// Turning auto-disable off wakes every body.
    pub fn set_auto_disable(&mut self, enabled: bool) {
        self.auto_disable = enabled;
        if !enabled {
            for (_, object) in self.objects.iter_mut() {
                if let Some(body) = object.rigid_body_mut() {
                    body.enable();
                }
            }
        }
    }

    pub fn auto_disable_params(&self) -> AutoDisableParams {
        self.auto_disable_params
    }

    pub fn set_auto_disable_params(&mut self, linear_threshold: f32, angular_threshold: f32, time: f32) {
        self.auto_disable_params = AutoDisableParams {
            linear_threshold: linear_threshold.max(0.0),
            angular_threshold: angular_threshold.max(0.0),
            time: time.max(0.0),
        };
    }

    pub fn soft_body_enabled(&self) -> bool {
        self.soft_bodies_enabled
    }

    /// Disabled soft bodies stay frozen in place.
    pub fn set_soft_body_enabled(&mut self, enabled: bool) {
        self.soft_bodies_enabled = enabled;
    }

    pub fn sector(&self) -> Option<&Arc<dyn SceneSector>> {
        self.scene_sector.as_ref()
    }

    /// Binds the engine sector whose render list follows the objects added here.
    pub fn set_sector(&mut self, sector: Option<Arc<dyn SceneSector>>) {
        let movables: Vec<_> = self
            .objects
            .values()
            .filter_map(CollisionObject::attached_movable)
            .collect();
        if let Some(old) = &self.scene_sector {
            for movable in &movables {
                old.remove_movable(movable);
            }
        }
        if let Some(new) = &sector {
            for movable in &movables {
                new.add_movable(movable);
            }
        }
        self.scene_sector = sector;
    }

    pub fn profile(&self) -> &SectorProfile {
        &self.profile
    }

    // ---- objects ----

    /// Objects added by the user, without portal sensors.
    pub fn object_count(&self) -> usize {
        self.objects.len() - self.sensor_count()
    }

    pub fn rigid_body_count(&self) -> usize {
        self.objects.values().filter(|o| o.rigid_body().is_some()).count()
    }

    pub fn soft_body_count(&self) -> usize {
        self.objects.values().filter(|o| o.soft_body().is_some()).count()
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&CollisionObject> {
        (handle.sector == self.id).then(|| self.objects.get(handle.id)).flatten()
    }

    /// Mutable access; call [`Self::rebuild_object`] after changing colliders.
    pub fn object_mut(&mut self, handle: ObjectHandle) -> Option<&mut CollisionObject> {
        if handle.sector != self.id {
            return None;
        }
        self.objects.get_mut(handle.id)
    }

    pub fn object_handles(&self) -> Vec<ObjectHandle> {
        self.objects
            .iter()
            .map(|(id, _)| id)
            .filter(|id| !self.is_portal_sensor(*id))
            .map(|id| self.handle(id))
            .collect()
    }

    pub(crate) fn is_portal_sensor(&self, id: EntityId) -> bool {
        self.portals.values().any(|portal| portal.sensor == id)
    }

    /// Binds a detached object into this sector and builds its backend proxy.
    ///
    /// An object without usable colliders is still added; it simply never
    /// collides until colliders are added and it is rebuilt.
    pub fn add_collision_object(&mut self, mut object: CollisionObject) -> CollisionResult<ObjectHandle> {
        if object.is_in_world() {
            warn!("collision object is already part of a sector");
            return Err(CollisionError::InvalidHandle);
        }
        object.rescale(self.unit_scale);
        object.update_mass_properties();
        match object.build_proxy() {
            Ok(proxy) => {
                object.proxy = Some(proxy);
                object.mark_clean();
            }
            Err(error) => {
                debug!("collision object added without a backend proxy: {error}");
                object.proxy = None;
            }
        }
        let movable = object.attached_movable();
        let kind = object.object_type();

        let id = self.objects.insert(object);
        let handle = self.handle(id);
        if let Some(stored) = self.objects.get_mut(id) {
            stored.handle = Some(handle);
            stored.inside_world = true;
        }
        if let (Some(scene), Some(movable)) = (&self.scene_sector, movable) {
            scene.add_movable(&movable);
        }
        self.resolve_rigid_anchors();
        debug!("added {kind:?} object {id:?} to sector {:?}", self.id);
        Ok(handle)
    }

    /// Detaches an object, returning it in the state it had.
    pub fn remove_collision_object(&mut self, handle: ObjectHandle) -> CollisionResult<CollisionObject> {
        let id = self.check_handle(handle)?;
        if self.is_portal_sensor(id) {
            warn!("portal sensors are removed with their portal");
            return Err(CollisionError::PortalSensor);
        }
        self.detach_object(id).ok_or(CollisionError::InvalidHandle)
    }

    pub(crate) fn detach_object(&mut self, id: EntityId) -> Option<CollisionObject> {
        let mut object = self.objects.remove(id)?;
        let handle = self.handle(id);
        self.manifolds.remove_object(handle);
        for (_, other) in self.objects.iter_mut() {
            other.contacts.retain(|h| *h != handle);
            other.overlaps.retain(|h| *h != handle);
            if let Some(soft) = other.soft_body_mut() {
                soft.anchors.retain(|_, slot| {
                    !matches!(&slot.anchor, SoftAnchor::Rigid { body, .. } if *body == handle)
                });
            }
        }

        let orphaned: Vec<EntityId> = self
            .joints
            .iter()
            .filter(|(_, joint)| joint.bodies.iter().flatten().any(|b| *b == handle))
            .map(|(joint_id, _)| joint_id)
            .collect();
        for joint_id in orphaned {
            debug!("dropping joint {joint_id:?} bound to removed object {id:?}");
            self.joints.remove(joint_id);
        }

        self.forget_portal_tracking(id);
        self.shadows.retain(|_, shadow| *shadow != id);

        if let (Some(scene), Some(movable)) = (&self.scene_sector, object.attached_movable()) {
            scene.remove_movable(&movable);
        }
        object.handle = None;
        object.inside_world = false;
        object.proxy = None;
        object.contacts.clear();
        object.overlaps.clear();
        debug!("removed object {id:?} from sector {:?}", self.id);
        Some(object)
    }

    /// Recreates the backend proxy of an object after its colliders changed.
    ///
    /// Rebuilding twice without changes yields the same proxy.
    pub fn rebuild_object(&mut self, handle: ObjectHandle) -> CollisionResult<()> {
        let id = self.check_handle(handle)?;
        let Some(object) = self.objects.get_mut(id) else {
            return Err(CollisionError::InvalidHandle);
        };
        object.update_mass_properties();
        match object.build_proxy() {
            Ok(proxy) => {
                object.proxy = Some(proxy);
                object.mark_clean();
                if let Some(body) = object.rigid_body_mut() {
                    body.enable();
                }
                Ok(())
            }
            Err(error) => {
                warn!("cannot rebuild object {id:?}: {error}");
                object.proxy = None;
                object.mark_clean();
                self.manifolds.remove_object(handle);
                Err(error)
            }
        }
    }

    /// Moves an object to the named group of the system's group table.
    pub fn set_collision_group(&mut self, handle: ObjectHandle, group: &str) -> CollisionResult<()> {
        let id = self.check_handle(handle)?;
        let index = self.groups.read().index_of(group)?;
        if let Some(object) = self.objects.get_mut(id) {
            object.set_group_index(index);
        }
        Ok(())
    }

    /// Objects touching `handle` after the last step.
    pub fn contact_objects(&self, handle: ObjectHandle) -> CollisionResult<Vec<ObjectHandle>> {
        let id = self.check_handle(handle)?;
        Ok(self
            .objects
            .get(id)
            .map(|o| o.contact_objects().to_vec())
            .unwrap_or_default())
    }

    /// Pins a soft body vertex to a rigid body at their current relative placement.
    pub fn anchor_soft_vertex_to_body(
        &mut self,
        soft: ObjectHandle,
        index: usize,
        body: ObjectHandle,
    ) -> CollisionResult<()> {
        let soft_id = self.check_handle(soft)?;
        let body_id = self.check_handle(body)?;
        if self.objects.get(body_id).and_then(|o| o.rigid_body()).is_none() {
            warn!("soft body anchors need a rigid body");
            return Err(CollisionError::NotPhysical);
        }
        let Some(object) = self.objects.get_mut(soft_id) else {
            return Err(CollisionError::InvalidHandle);
        };
        let Some(soft_body) = object.soft_body_mut() else {
            warn!("object {soft_id:?} is not a soft body");
            return Err(CollisionError::NotPhysical);
        };
        soft_body.anchor_vertex_to_body(index, body)?;
        self.resolve_rigid_anchors();
        Ok(())
    }

    /// Fixes the body-local offset of rigid anchors that do not have one yet.
    fn resolve_rigid_anchors(&mut self) {
        let poses: BTreeMap<EntityId, Transform> = self
            .objects
            .iter()
            .filter(|(_, o)| o.rigid_body().is_some())
            .map(|(id, o)| (id, o.transform.rigid()))
            .collect();
        let sector = self.id;
        for (_, object) in self.objects.iter_mut() {
            let Some(soft) = object.soft_body_mut() else {
                continue;
            };
            let positions: Vec<Vec3> = soft.nodes.iter().map(|n| n.position).collect();
            for (index, slot) in soft.anchors.iter_mut() {
                if let SoftAnchor::Rigid { body, local } = &mut slot.anchor {
                    if local.is_some() || body.sector != sector {
                        continue;
                    }
                    if let (Some(pose), Some(position)) = (poses.get(&body.id), positions.get(*index)) {
                        *local = Some(pose.inverse_transform_point(*position));
                    }
                }
            }
        }
    }

    /// Recomputes the target of every soft body anchor for this sub-step.
    fn refresh_anchor_targets(&mut self) {
        self.resolve_rigid_anchors();
        let poses: BTreeMap<EntityId, Transform> = self
            .objects
            .iter()
            .filter(|(_, o)| o.rigid_body().is_some())
            .map(|(id, o)| (id, o.transform.rigid()))
            .collect();
        let scale = self.unit_scale;
        for (_, object) in self.objects.iter_mut() {
            let Some(soft) = object.soft_body_mut() else {
                continue;
            };
            for slot in soft.anchors.values_mut() {
                slot.target = match &slot.anchor {
                    SoftAnchor::Fixed(position) => Some(*position),
                    SoftAnchor::Rigid { body, local } => local
                        .zip(poses.get(&body.id))
                        .map(|(local, pose)| pose.transform_point(local)),
                    SoftAnchor::Animated(control) => Some(control.anchor_position() * scale),
                };
            }
        }
    }

    // ---- joints ----

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn joint(&self, handle: JointHandle) -> Option<&Joint> {
        (handle.sector == self.id).then(|| self.joints.get(handle.id)).flatten()
    }

    /// Live access; structural changes need [`Self::rebuild_joint`].
    pub fn joint_mut(&mut self, handle: JointHandle) -> Option<&mut Joint> {
        if handle.sector != self.id {
            return None;
        }
        self.joints.get_mut(handle.id)
    }

    /// Adds an attached joint whose bodies live in this sector, then builds it.
    pub fn add_joint(&mut self, mut joint: Joint) -> CollisionResult<JointHandle> {
        let Some(first) = joint.body(0) else {
            warn!("joint must be attached before it is added");
            return Err(CollisionError::InvalidJoint);
        };
        for body in [Some(first), joint.body(1)].into_iter().flatten() {
            if body.sector != self.id {
                warn!("joint spans sectors {:?} and {:?}; not added", body.sector, self.id);
                return Err(CollisionError::CrossSectorJoint);
            }
            if !self.objects.contains(body.id) {
                warn!("joint body {:?} is not alive", body.id);
                return Err(CollisionError::InvalidHandle);
            }
        }
        joint.rescale(self.unit_scale);
        let id = self.joints.insert(joint);
        let handle = JointHandle { sector: self.id, id };
        if let Some(stored) = self.joints.get_mut(id) {
            stored.handle = Some(handle);
        }
        if let Err(error) = self.rebuild_joint(handle) {
            self.joints.remove(id);
            return Err(error);
        }
        debug!("added joint {id:?} to sector {:?}", self.id);
        Ok(handle)
    }

    pub fn remove_joint(&mut self, handle: JointHandle) -> CollisionResult<Joint> {
        let id = self.check_joint(handle)?;
        let mut joint = self.joints.remove(id).ok_or(CollisionError::InvalidHandle)?;
        joint.handle = None;
        joint.frame = None;
        Ok(joint)
    }

    /// Resolves the body-local frames of a joint from its current world frame.
    pub fn rebuild_joint(&mut self, handle: JointHandle) -> CollisionResult<()> {
        let id = self.check_joint(handle)?;
        let Some(joint) = self.joints.get(id) else {
            return Err(CollisionError::InvalidHandle);
        };
        let world = joint.backend_transform().rigid();
        let Some(first) = joint.body(0) else {
            return Err(CollisionError::InvalidJoint);
        };
        let (local_a, node_a) = self.joint_side(Some(first), &world)?;
        let (local_b, node_b) = self.joint_side(joint.body(1), &world)?;
        if let Some(joint) = self.joints.get_mut(id) {
            joint.frame = Some(JointFrame {
                local_a,
                local_b,
                soft_nodes: [node_a, node_b],
            });
            joint.broken = false;
        }
        for body in [Some(first), self.joints.get(id).and_then(|j| j.body(1))].into_iter().flatten() {
            if let Some(rigid) = self.objects.get_mut(body.id).and_then(|o| o.rigid_body_mut()) {
                rigid.enable();
            }
        }
        Ok(())
    }

    /// Body-local frame of one joint side, or the nearest vertex of a soft body.
    fn joint_side(
        &self,
        body: Option<ObjectHandle>,
        world: &Transform,
    ) -> CollisionResult<(Transform, Option<usize>)> {
        let Some(body) = body else {
            return Ok((*world, None));
        };
        if body.sector != self.id {
            warn!("joint body {:?} lives in another sector", body.id);
            return Err(CollisionError::CrossSectorJoint);
        }
        let object = self.objects.get(body.id).ok_or(CollisionError::InvalidHandle)?;
        if let Some(soft) = object.soft_body() {
            let nearest = soft
                .nodes
                .iter()
                .enumerate()
                .min_by(|(_, x), (_, y)| {
                    x.position
                        .distance_squared(world.position)
                        .total_cmp(&y.position.distance_squared(world.position))
                })
                .map(|(index, _)| index);
            return Ok((*world, nearest));
        }
        let pose = object.transform.rigid();
        Ok((pose.inverse().combine(world), None))
    }
}
