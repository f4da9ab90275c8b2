//! Fixed sub-step simulation of a sector.

use std::{collections::BTreeMap, time::Instant};

use glam::Vec3;
use log::{trace, warn};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::CollisionSector;
use crate::{
    collision::{
        broadphase::BroadPhaseProxy,
        contact::{CollisionData, Contact, ContactManifold},
        narrowphase::NarrowPhase,
    },
    config::TIME_ACCUMULATOR_EPSILON,
    core::{
        joint::JointType,
        object::{CollisionObject, CollisionObjectType},
        rigidbody::RigidBodyState,
        types::{Material, MaterialPairProperties, Transform},
    },
    dynamics::{
        softbody::{SoftBodySolver, SoftCollider, SoftPin},
        solver::{ConstraintSolver, SolverBody, SolverContact, SolverJoint},
    },
    utils::{
        allocator::EntityId,
        logging::ScopedTimer,
        math::quat_to_rotation_vector,
        profiling::{PhaseTimer, SectorProfile},
    },
};

type Pair = (EntityId, EntityId);

/// Ghosts and actors sense overlaps instead of colliding.
pub(super) fn is_sensing(object: &CollisionObject) -> bool {
    matches!(
        object.object_type(),
        CollisionObjectType::Ghost | CollisionObjectType::Actor
    )
}

pub(super) fn ordered(a: EntityId, b: EntityId) -> Pair {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl CollisionSector {
    /// Advances the sector by `duration` seconds of wall time.
    ///
    /// The duration is scaled by the simulation speed and consumed in fixed
    /// sub-steps; the remainder carries over to the next call. Returns the
    /// number of sub-steps taken.
    pub fn step(&mut self, duration: f32) -> usize {
        let _scope = ScopedTimer::new("sector::step");
        let started = Instant::now();
        let mut profile = SectorProfile::default();

        let params = self.step_parameters;
        let time_step = f64::from(params.time_step);
        if duration.is_finite() && duration > 0.0 {
            self.accumulator += f64::from(duration) * f64::from(self.simulation_speed);
        }

        let mut steps = 0usize;
        while self.accumulator + TIME_ACCUMULATOR_EPSILON >= time_step && steps < params.max_steps as usize {
            self.sub_step(params.time_step, &mut profile);
            self.accumulator -= time_step;
            steps += 1;
        }
        if self.accumulator >= time_step {
            trace!(
                "sector {:?} dropped {:.4}s beyond {} sub-steps",
                self.id,
                self.accumulator,
                params.max_steps
            );
            self.accumulator %= time_step;
        }
        self.accumulator = self.accumulator.max(0.0);

        if steps > 0 {
            for object in self.objects.values() {
                if !object.is_static() {
                    object.sync_attachments();
                }
            }
            {
                let _timer = PhaseTimer::new(&mut profile.portal_time);
                self.update_portals();
            }
            self.update_contacts(steps);
        }

        profile.sub_steps = steps as u32;
        profile.object_count = self.object_count();
        profile.contact_count = self.manifolds.contact_count();
        profile.active_island_count = self.islands.active_count();
        profile.total_step_time = started.elapsed();
        self.profile = profile;
        steps
    }

    fn sub_step(&mut self, dt: f32, profile: &mut SectorProfile) {
        {
            let _timer = PhaseTimer::new(&mut profile.anchors_time);
            self.apply_kinematic_callbacks(dt);
            self.refresh_anchor_targets();
        }

        let gravity = self.gravity * self.unit_scale;
        for (_, object) in self.objects.iter_mut() {
            let pose = object.transform.rigid();
            if let Some(body) = object.rigid_body_mut() {
                self.integrator.integrate_velocity(body, &pose, gravity, dt);
            }
        }
        if self.soft_bodies_enabled {
            for (_, object) in self.objects.iter_mut() {
                if let Some(soft) = object.soft_body_mut() {
                    SoftBodySolver::predict(soft, gravity, dt);
                }
            }
        }

        let pairs = {
            let _scope = ScopedTimer::new("broadphase");
            let _timer = PhaseTimer::new(&mut profile.broad_phase_time);
            self.rebuild_broad_phase();
            let groups = self.groups.read();
            self.broad_phase.potential_pairs(&groups)
        };

        let mut rigid_pairs = Vec::new();
        let mut soft_pairs = Vec::new();
        let mut sensed_pairs = Vec::new();
        for (a, b) in pairs {
            let (Some(object_a), Some(object_b)) = (self.objects.get(a), self.objects.get(b)) else {
                continue;
            };
            if is_sensing(object_a) || is_sensing(object_b) {
                sensed_pairs.push((a, b));
                continue;
            }
            match (object_a.soft_body().is_some(), object_b.soft_body().is_some()) {
                (false, false) => rigid_pairs.push((a, b)),
                (true, false) => soft_pairs.push((a, b)),
                (false, true) => soft_pairs.push((b, a)),
                (true, true) => {}
            }
        }
        self.record_overlaps(&sensed_pairs);

        {
            let _scope = ScopedTimer::new("narrowphase");
            let _timer = PhaseTimer::new(&mut profile.narrow_phase_time);
            let found = self.narrow_phase(&rigid_pairs);
            self.manifolds.begin_frame();
            for ((a, b), contacts) in found {
                if contacts.is_empty() {
                    continue;
                }
                let material = self.pair_material(a, b);
                let (handle_a, handle_b) = (self.handle(a), self.handle(b));
                self.manifolds
                    .update(handle_a, handle_b, contacts, material, self.unit_scale);
            }
            self.manifolds.end_frame();
        }

        {
            let _scope = ScopedTimer::new("solver");
            let _timer = PhaseTimer::new(&mut profile.solver_time);
            self.solve_rigid_bodies(dt);
        }

        {
            let _timer = PhaseTimer::new(&mut profile.soft_body_time);
            self.solve_soft_bodies(dt, &soft_pairs);
        }

        self.move_actors(dt);

        if self.auto_disable {
            self.islands
                .update_sleeping(&mut self.objects, &self.auto_disable_params, self.unit_scale, dt);
        }
    }

    /// Moves kinematic bodies to the pose their callback supplies and derives their velocity.
    fn apply_kinematic_callbacks(&mut self, dt: f32) {
        let scale = self.unit_scale;
        for (_, object) in self.objects.iter_mut() {
            let Some(body) = object.rigid_body() else {
                continue;
            };
            if body.state() != RigidBodyState::Kinematic {
                continue;
            }
            let Some(callback) = body.kinematic_callback().cloned() else {
                continue;
            };
            let target = callback.body_transform(object).scaled_translation(scale);
            let previous = object.transform.rigid();
            let linear = (target.position - previous.position) / dt;
            let angular = quat_to_rotation_vector(target.rotation * previous.rotation.inverse()) / dt;
            object.transform.position = target.position;
            object.transform.rotation = target.rotation;
            if let Some(body) = object.rigid_body_mut() {
                body.velocity.linear = linear;
                body.velocity.angular = angular;
            }
        }
    }

    pub(super) fn rebuild_broad_phase(&mut self) {
        let proxies: Vec<BroadPhaseProxy> = self
            .objects
            .iter()
            .filter_map(|(id, object)| {
                let mut bounds = object.world_aabb()?;
                if let Some(soft) = object.soft_body() {
                    bounds = bounds.expanded(soft.config.node_radius * soft.unit_scale);
                }
                Some(BroadPhaseProxy {
                    id,
                    bounds,
                    group: object.group,
                    is_static: object.is_static(),
                })
            })
            .collect();
        self.broad_phase.rebuild(proxies);
    }

    /// Refreshes the overlap lists of ghosts and actors from broad-phase pairs.
    fn record_overlaps(&mut self, pairs: &[Pair]) {
        for (_, object) in self.objects.iter_mut() {
            object.overlaps.clear();
        }
        for &(a, b) in pairs {
            let (handle_a, handle_b) = (self.handle(a), self.handle(b));
            for (id, other) in [(a, handle_b), (b, handle_a)] {
                if let Some(object) = self.objects.get_mut(id) {
                    if is_sensing(object) {
                        object.overlaps.push(other);
                    }
                }
            }
        }
    }

    fn narrow_phase(&self, pairs: &[Pair]) -> Vec<(Pair, Vec<Contact>)> {
        let objects = &self.objects;
        let collide = |&(a, b): &Pair| {
            let contacts = match (objects.get(a), objects.get(b)) {
                (Some(object_a), Some(object_b)) => match (&object_a.proxy, &object_b.proxy) {
                    (Some(proxy_a), Some(proxy_b)) => NarrowPhase::compound_contacts(
                        &proxy_a.shapes,
                        &object_a.transform.rigid(),
                        &proxy_b.shapes,
                        &object_b.transform.rigid(),
                    ),
                    _ => Vec::new(),
                },
                _ => Vec::new(),
            };
            ((a, b), contacts)
        };
        #[cfg(feature = "parallel")]
        let found = pairs.par_iter().map(collide).collect();
        #[cfg(not(feature = "parallel"))]
        let found = pairs.iter().map(collide).collect();
        found
    }

    fn pair_material(&self, a: EntityId, b: EntityId) -> MaterialPairProperties {
        let material = |id| {
            self.objects
                .get(id)
                .and_then(|o| o.rigid_body())
                .map(|body| *body.material())
                .unwrap_or_default()
        };
        let (material_a, material_b): (Material, Material) = (material(a), material(b));
        material_a.combine_with(&material_b)
    }

    fn solve_rigid_bodies(&mut self, dt: f32) {
        // Index 0 is the immovable world; static geometry maps onto it.
        let mut bodies = vec![SolverBody::fixed(None, &Transform::IDENTITY)];
        let mut slots: BTreeMap<EntityId, usize> = BTreeMap::new();
        for (id, object) in self.objects.iter() {
            if let Some(body) = object.rigid_body() {
                slots.insert(id, bodies.len());
                bodies.push(SolverBody::from_rigid(id, &object.transform.rigid(), body));
            }
        }
        let slot = |id: EntityId| slots.get(&id).copied().unwrap_or(0);

        let mut links = Vec::new();
        let mut contacts = Vec::new();
        for (manifold_index, manifold) in self.manifolds.iter().enumerate() {
            let (a, b) = (slot(manifold.a.id), slot(manifold.b.id));
            if a == b {
                continue;
            }
            links.push((manifold.a.id, manifold.b.id));
            for (contact_index, contact) in manifold.contacts.iter().enumerate() {
                contacts.push(SolverContact::new(
                    a,
                    b,
                    (manifold_index, contact_index),
                    contact,
                    manifold.material,
                ));
            }
        }

        let mut joints = Vec::new();
        for (id, joint) in self.joints.iter() {
            let a = joint.body(0).map_or(0, |h| slot(h.id));
            let b = joint.body(1).map_or(0, |h| slot(h.id));
            if let Some(solver_joint) = SolverJoint::from_joint(id, joint, a, b) {
                if let (Some(x), Some(y)) = (joint.body(0), joint.body(1)) {
                    links.push((x.id, y.id));
                }
                joints.push(solver_joint);
            }
        }

        let dynamic: Vec<EntityId> = self
            .objects
            .iter()
            .filter(|(_, o)| o.rigid_body().is_some_and(|b| b.is_dynamic()))
            .map(|(id, _)| id)
            .collect();
        self.islands.build_islands(&dynamic, &links);

        let solver = ConstraintSolver::new(self.step_parameters.iterations, self.unit_scale);
        let metrics = solver.solve(&mut bodies, &mut contacts, &mut joints, dt);
        trace!(
            "solved {} contacts and {} joints (normal impulse {:.3})",
            metrics.contacts_solved,
            metrics.joints_solved,
            metrics.normal_impulse_sum
        );

        let mut manifolds: Vec<&mut ContactManifold> = self.manifolds.iter_mut().collect();
        for contact in &contacts {
            if let Some(target) = manifolds
                .get_mut(contact.manifold)
                .and_then(|m| m.contacts.get_mut(contact.slot))
            {
                contact.store(target);
            }
        }
        for solver_joint in joints.iter().filter(|j| j.is_broken()) {
            if let Some(joint) = self.joints.get_mut(solver_joint.id) {
                warn!(
                    "joint {:?} broke under impulse {:.3}",
                    solver_joint.id,
                    solver_joint.applied_impulse / joint.unit_scale
                );
                joint.broken = true;
            }
        }

        for body in bodies.iter_mut().skip(1) {
            self.integrator.integrate_position(body, dt);
        }
        solver.correct_positions(&mut bodies, &contacts);

        for body in bodies.iter().skip(1) {
            let Some(object) = body.id.and_then(|id| self.objects.get_mut(id)) else {
                continue;
            };
            let active = object
                .rigid_body()
                .is_some_and(|b| b.is_dynamic() && b.is_enabled());
            if !active {
                continue;
            }
            object.transform.position = body.position;
            object.transform.rotation = body.rotation;
            if let Some(rigid) = object.rigid_body_mut() {
                rigid.velocity = body.velocity;
            }
        }
    }

    fn solve_soft_bodies(&mut self, dt: f32, soft_pairs: &[Pair]) {
        self.soft_touches.clear();
        if !self.soft_bodies_enabled {
            return;
        }
        let soft_ids: Vec<EntityId> = self
            .objects
            .iter()
            .filter(|(_, o)| o.soft_body().is_some())
            .map(|(id, _)| id)
            .collect();

        for soft_id in soft_ids {
            let twists = self.soft_twists(soft_id);
            let pins = self.soft_pins(soft_id);
            let Some(mut body) = self.objects.get_mut(soft_id).and_then(|o| o.body.take()) else {
                continue;
            };
            let touched = match body.as_soft_mut() {
                Some(soft) => {
                    let colliders: Vec<SoftCollider<'_>> = soft_pairs
                        .iter()
                        .filter(|(soft_side, _)| *soft_side == soft_id)
                        .filter_map(|&(_, other)| {
                            let object = self.objects.get(other)?;
                            let proxy = object.proxy.as_ref()?;
                            Some(SoftCollider {
                                id: other,
                                shapes: &proxy.shapes,
                                pose: object.transform.rigid(),
                                bounds: object.world_aabb()?,
                            })
                        })
                        .collect();
                    for (axis, speed) in twists {
                        SoftBodySolver::apply_twist(soft, axis, speed, dt);
                    }
                    let touched = SoftBodySolver::solve(soft, &pins, &colliders);
                    SoftBodySolver::finalize(soft, dt);
                    touched
                }
                None => Vec::new(),
            };
            if let Some(object) = self.objects.get_mut(soft_id) {
                object.body = Some(body);
            }
            self.soft_touches
                .extend(touched.into_iter().map(|other| (soft_id, other)));
        }
    }

    /// Twist axes and speeds imposed on a soft body by its angular joints.
    fn soft_twists(&self, soft_id: EntityId) -> Vec<(Vec3, f32)> {
        self.joints
            .values()
            .filter(|j| j.joint_type() == JointType::SoftAngular && !j.broken && j.frame.is_some())
            .filter(|j| j.body(0).is_some_and(|h| h.id == soft_id))
            .filter_map(|joint| {
                let other = self.objects.get(joint.body(1)?.id)?;
                let body = other.rigid_body()?;
                let axis = joint.backend_transform().rotation * Vec3::X;
                Some((axis, body.velocity.angular.dot(axis)))
            })
            .collect()
    }

    /// Vertices held by linear joints at the current position of their other side.
    fn soft_pins(&self, soft_id: EntityId) -> Vec<SoftPin> {
        self.joints
            .values()
            .filter(|j| j.joint_type() == JointType::SoftLinear && !j.broken)
            .filter(|j| j.body(0).is_some_and(|h| h.id == soft_id))
            .filter_map(|joint| {
                let frame = joint.frame?;
                let node = frame.soft_nodes[0]?;
                let target = match joint.body(1) {
                    None => frame.local_b.position,
                    Some(handle) => {
                        let other = self.objects.get(handle.id)?;
                        match other.soft_body() {
                            Some(soft) => soft.nodes.get(frame.soft_nodes[1]?)?.position,
                            None => other.transform.rigid().transform_point(frame.local_b.position),
                        }
                    }
                };
                Some(SoftPin { node, target })
            })
            .collect()
    }

    /// Rebuilds the touching sets and raises collision callbacks.
    fn update_contacts(&mut self, steps: usize) {
        let inverse_scale = 1.0 / self.unit_scale;
        let mut touching: BTreeMap<Pair, Vec<CollisionData>> = BTreeMap::new();

        for manifold in self.manifolds.iter() {
            let points: Vec<CollisionData> = manifold
                .contacts
                .iter()
                .filter(|c| c.depth >= 0.0)
                .map(|c| CollisionData::from_contact(c, inverse_scale))
                .collect();
            if !points.is_empty() {
                touching.insert(ordered(manifold.a.id, manifold.b.id), points);
            }
        }
        for &(soft, other) in &self.soft_touches {
            touching.entry(ordered(soft, other)).or_default();
        }
        for (id, object) in self.objects.iter() {
            if !is_sensing(object) || self.is_portal_sensor(id) {
                continue;
            }
            for other in &object.overlaps {
                let key = ordered(id, other.id);
                if touching.contains_key(&key) || self.is_portal_sensor(other.id) {
                    continue;
                }
                let points: Vec<CollisionData> = self
                    .pair_contacts(key.0, key.1)
                    .iter()
                    .map(|c| CollisionData::from_contact(c, inverse_scale))
                    .collect();
                if !points.is_empty() {
                    touching.insert(key, points);
                }
            }
        }

        for (_, object) in self.objects.iter_mut() {
            object.contacts.clear();
        }
        for &(a, b) in touching.keys() {
            let (handle_a, handle_b) = (self.handle(a), self.handle(b));
            if let Some(object) = self.objects.get_mut(a) {
                object.contacts.push(handle_b);
            }
            if let Some(object) = self.objects.get_mut(b) {
                object.contacts.push(handle_a);
            }
        }
        for (_, object) in self.objects.iter_mut() {
            object.contacts.sort_unstable();
            object.contacts.dedup();
        }

        for (&(a, b), points) in &touching {
            let (Some(object_a), Some(object_b)) = (self.objects.get(a), self.objects.get(b)) else {
                continue;
            };
            if let Some(callback) = object_a.collision_callback() {
                callback.on_collision(self.id, object_a, object_b, points, steps);
            }
            if let Some(callback) = object_b.collision_callback() {
                let swapped: Vec<CollisionData> = points.iter().map(CollisionData::swapped).collect();
                callback.on_collision(self.id, object_b, object_a, &swapped, steps);
            }
        }
    }
}
