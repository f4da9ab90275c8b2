//! Read-only queries against the current state of a sector.

use std::sync::Arc;

use glam::Vec3;
use log::warn;

use super::{pipeline::is_sensing, CollisionSector};
use crate::{
    collision::{
        contact::{CollisionData, Contact},
        narrowphase::NarrowPhase,
        queries::{Raycast, RaycastHit, RaycastQuery},
        shapes::Shape,
    },
    core::{
        group::builtin, handle::ObjectHandle, mesh::Aabb, object::CollisionObject, softbody::SoftBody,
        types::Transform,
    },
    error::{CollisionError, CollisionResult},
    utils::allocator::EntityId,
};

/// Nearest intersection of a beam, in world units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HitBeamResult {
    pub has_hit: bool,
    pub object: Option<ObjectHandle>,
    pub isect: Vec3,
    pub normal: Vec3,
    /// Nearest vertex of the hit triangle for meshes and soft bodies.
    pub vertex_index: Option<usize>,
    /// Distance from the beam start to `isect`.
    pub distance: f32,
}

/// Outcome of sweeping an object between two poses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveResult {
    pub has_hit: bool,
    pub object: Option<ObjectHandle>,
    /// Fraction of the path that can be travelled without contact.
    pub fraction: f32,
    /// Position reached at `fraction`, world units.
    pub position: Vec3,
    /// Surface normal of the blocker, facing the moving object.
    pub normal: Vec3,
}

/// Sampling of a swept path.
#[derive(Debug, Clone, Copy)]
pub(super) struct SweepOptions {
    pub samples: usize,
    pub bisections: usize,
    /// Penetration depth (backend units) still treated as free.
    pub tolerance: f32,
}

impl SweepOptions {
    const QUERY: Self = Self {
        samples: 64,
        bisections: 16,
        tolerance: 0.0,
    };
}

/// First blocker met by a sweep.
#[derive(Debug, Clone, Copy)]
pub(super) struct Sweep {
    pub other: EntityId,
    pub contact: Contact,
    /// Fraction of the path travelled before contact.
    pub fraction: f32,
    pub pose: Transform,
}

impl CollisionSector {
    /// Casts a segment from `start` to `end` against every object of the sector.
    pub fn hit_beam(&self, start: Vec3, end: Vec3) -> HitBeamResult {
        self.cast_beam(start, end, None)
    }

    /// Casts a segment against a single object.
    pub fn hit_beam_object(&self, handle: ObjectHandle, start: Vec3, end: Vec3) -> CollisionResult<HitBeamResult> {
        let id = self.check_handle(handle)?;
        Ok(self.cast_beam(start, end, Some(id)))
    }

    fn cast_beam(&self, start: Vec3, end: Vec3, only: Option<EntityId>) -> HitBeamResult {
        let scale = self.unit_scale;
        let Some(query) = RaycastQuery::segment(start * scale, end * scale) else {
            return HitBeamResult::default();
        };
        let mut best: Option<(EntityId, RaycastHit)> = None;
        for (id, object) in self.objects.iter() {
            if only.is_some_and(|only| only != id) || self.is_portal_sensor(id) {
                continue;
            }
            let Some(bounds) = object.world_aabb() else {
                continue;
            };
            let Some(entry) = bounds.ray_entry(query.origin, query.direction, query.max_distance) else {
                continue;
            };
            if best.as_ref().is_some_and(|(_, hit)| hit.distance < entry) {
                continue;
            }
            let Some(hit) = cast_object(&query, object) else {
                continue;
            };
            if best.as_ref().map_or(true, |(_, current)| hit.distance < current.distance) {
                best = Some((id, hit));
            }
        }
        match best {
            Some((id, hit)) => HitBeamResult {
                has_hit: true,
                object: Some(self.handle(id)),
                isect: hit.point / scale,
                normal: hit.normal,
                vertex_index: hit.vertex_index,
                distance: hit.distance / scale,
            },
            None => HitBeamResult::default(),
        }
    }

    /// Collects the penetrating contacts of `handle` into `out`.
    ///
    /// Ghosts and actors report against the overlap list of the last step;
    /// other objects are tested against the current state of the sector.
    /// Returns whether anything was found.
    pub fn collision_test(&self, handle: ObjectHandle, out: &mut Vec<CollisionData>) -> CollisionResult<bool> {
        let id = self.check_handle(handle)?;
        let Some(object) = self.objects.get(id) else {
            return Err(CollisionError::InvalidHandle);
        };
        let inverse_scale = 1.0 / self.unit_scale;
        let before = out.len();

        let others: Vec<EntityId> = if is_sensing(object) {
            object.overlaps.iter().map(|h| h.id).collect()
        } else {
            self.touching_candidates(id)
        };
        for other in others {
            if self.is_portal_sensor(other) {
                continue;
            }
            out.extend(
                self.pair_contacts(id, other)
                    .iter()
                    .filter(|c| c.depth > 0.0)
                    .map(|c| CollisionData::from_contact(c, inverse_scale)),
            );
        }
        Ok(out.len() > before)
    }

    /// Objects whose bounds overlap `id` now and whose groups collide with it.
    fn touching_candidates(&self, id: EntityId) -> Vec<EntityId> {
        let Some(object) = self.objects.get(id) else {
            return Vec::new();
        };
        let Some(bounds) = self.query_bounds(object) else {
            return Vec::new();
        };
        let groups = self.groups.read();
        self.objects
            .iter()
            .filter(|(other_id, other)| *other_id != id && groups.collides(object.group, other.group))
            .filter(|(_, other)| self.query_bounds(other).is_some_and(|b| b.overlaps(&bounds)))
            .map(|(other_id, _)| other_id)
            .collect()
    }

    fn query_bounds(&self, object: &CollisionObject) -> Option<Aabb> {
        let bounds = object.world_aabb()?;
        Some(match object.soft_body() {
            Some(soft) => bounds.expanded(soft.config.node_radius * soft.unit_scale),
            None => bounds,
        })
    }

    /// Whether two objects of this sector touch.
    ///
    /// A ghost or actor answers from its overlap list of the last step, so
    /// this may disagree with [`Self::collision_test`] until the next step.
    pub fn collide(&self, a: ObjectHandle, b: ObjectHandle) -> CollisionResult<bool> {
        let id_a = self.check_handle(a)?;
        let id_b = self.check_handle(b)?;
        let (Some(object_a), Some(object_b)) = (self.objects.get(id_a), self.objects.get(id_b)) else {
            return Err(CollisionError::InvalidHandle);
        };
        if is_sensing(object_a) {
            return Ok(object_a.overlaps.contains(&b));
        }
        if is_sensing(object_b) {
            return Ok(object_b.overlaps.contains(&a));
        }
        if !self.groups.read().collides(object_a.group, object_b.group) {
            return Ok(false);
        }
        Ok(self.pair_contacts(id_a, id_b).iter().any(|c| c.depth > 0.0))
    }

    /// Sweeps an object from `from` to `to` (world units) and reports the first blocker.
    ///
    /// The object itself does not move.
    pub fn move_test(&self, handle: ObjectHandle, from: Transform, to: Transform) -> CollisionResult<MoveResult> {
        let id = self.check_handle(handle)?;
        let Some(object) = self.objects.get(id) else {
            return Err(CollisionError::InvalidHandle);
        };
        if object.soft_body().is_some() {
            warn!("move tests need an object with colliders");
            return Err(CollisionError::SoftBodyCollider);
        }
        if object.proxy.as_ref().map_or(true, |p| p.shapes.is_empty()) {
            warn!("object {id:?} has no built colliders to sweep");
            return Err(CollisionError::NoCollider);
        }

        let scale = self.unit_scale;
        let (from, to) = (from.rigid().scaled_translation(scale), to.rigid().scaled_translation(scale));
        let Some(sweep) = self.sweep(id, &from, &to, SweepOptions::QUERY) else {
            return Ok(MoveResult {
                has_hit: false,
                object: None,
                fraction: 1.0,
                position: to.position / scale,
                normal: Vec3::ZERO,
            });
        };
        Ok(MoveResult {
            has_hit: true,
            object: Some(self.handle(sweep.other)),
            fraction: sweep.fraction,
            position: sweep.pose.position / scale,
            normal: -sweep.contact.normal,
        })
    }

    /// Moves `id` from `from` towards `to` (backend units) and stops before the first blocker.
    ///
    /// Returns `None` when the whole path is free.
    pub(super) fn sweep(&self, id: EntityId, from: &Transform, to: &Transform, options: SweepOptions) -> Option<Sweep> {
        let pose_at = |t: f32| Transform {
            position: from.position.lerp(to.position, t),
            rotation: from.rotation.slerp(to.rotation, t),
            ..*from
        };
        let blocked = |t: f32| {
            self.deepest_blocker(id, &pose_at(t))
                .filter(|(_, contact)| contact.depth > options.tolerance)
        };

        let mut free = 0.0;
        let mut hit = blocked(0.0).map(|b| (0.0, b));
        if hit.is_none() {
            for sample in 1..=options.samples {
                let t = sample as f32 / options.samples as f32;
                if let Some(blocker) = blocked(t) {
                    hit = Some((t, blocker));
                    break;
                }
                free = t;
            }
        }

        let (mut hit_t, mut blocker) = hit?;
        if hit_t > 0.0 {
            for _ in 0..options.bisections {
                let middle = 0.5 * (free + hit_t);
                match blocked(middle) {
                    Some(found) => {
                        hit_t = middle;
                        blocker = found;
                    }
                    None => free = middle,
                }
            }
        }
        let (other, contact) = blocker;
        Some(Sweep {
            other,
            contact,
            fraction: free,
            pose: pose_at(free),
        })
    }

    /// Deepest penetration of `id` placed at `pose` (backend units), ignoring its own state.
    pub(super) fn deepest_blocker(&self, id: EntityId, pose: &Transform) -> Option<(EntityId, Contact)> {
        self.blocking_contacts(id, pose)
            .into_iter()
            .max_by(|x, y| x.1.depth.total_cmp(&y.1.depth))
    }

    /// Penetrating contacts of `id` placed at `pose` against solid objects; the object is always side A.
    pub(super) fn blocking_contacts(&self, id: EntityId, pose: &Transform) -> Vec<(EntityId, Contact)> {
        let Some(object) = self.objects.get(id) else {
            return Vec::new();
        };
        let Some(proxy) = object.proxy.as_ref() else {
            return Vec::new();
        };
        let bounds = proxy.local_aabb.transformed(pose);
        let groups = self.groups.read();
        let mut found = Vec::new();
        for (other_id, other) in self.objects.iter() {
            if other_id == id || self.is_portal_sensor(other_id) || !groups.collides(object.group, other.group) {
                continue;
            }
            if is_sensing(other) || other.soft_body().is_some() || other.group == builtin::SENSOR {
                continue;
            }
            if !self.query_bounds(other).is_some_and(|b| b.overlaps(&bounds)) {
                continue;
            }
            found.extend(
                contacts_against(&proxy.shapes, pose, &bounds, other)
                    .into_iter()
                    .filter(|c| c.depth > 0.0)
                    .map(|c| (other_id, c)),
            );
        }
        found
    }

    /// Fresh contacts between two objects, `a` as side A, backend units.
    pub(crate) fn pair_contacts(&self, a: EntityId, b: EntityId) -> Vec<Contact> {
        let (Some(object_a), Some(object_b)) = (self.objects.get(a), self.objects.get(b)) else {
            return Vec::new();
        };
        if object_a.soft_body().is_some() {
            if object_b.soft_body().is_some() {
                return Vec::new();
            }
            return solid_contacts(object_b, object_a)
                .into_iter()
                .map(|c| c.flipped())
                .collect();
        }
        solid_contacts(object_a, object_b)
    }
}

fn solid_contacts(solid: &CollisionObject, other: &CollisionObject) -> Vec<Contact> {
    let (Some(proxy), Some(bounds)) = (solid.proxy.as_ref(), solid.world_aabb()) else {
        return Vec::new();
    };
    contacts_against(&proxy.shapes, &solid.transform.rigid(), &bounds, other)
}

/// Contacts of posed shapes (side A) against another object.
fn contacts_against(
    shapes: &[(Arc<Shape>, Transform)],
    pose: &Transform,
    bounds: &Aabb,
    other: &CollisionObject,
) -> Vec<Contact> {
    if let Some(soft) = other.soft_body() {
        return soft_node_contacts(shapes, pose, bounds, soft);
    }
    match other.proxy.as_ref() {
        Some(proxy) => NarrowPhase::compound_contacts(shapes, pose, &proxy.shapes, &other.transform.rigid()),
        None => Vec::new(),
    }
}

fn soft_node_contacts(shapes: &[(Arc<Shape>, Transform)], pose: &Transform, bounds: &Aabb, soft: &SoftBody) -> Vec<Contact> {
    let radius = soft.config.node_radius * soft.unit_scale;
    let region = bounds.expanded(radius);
    let mut contacts = Vec::new();
    for node in soft.nodes.iter().filter(|n| region.contains_point(n.position)) {
        for (shape, relative) in shapes {
            contacts.extend(NarrowPhase::point_contact(shape, &pose.combine(relative), node.position, radius));
        }
    }
    contacts
}

fn cast_object(query: &RaycastQuery, object: &CollisionObject) -> Option<RaycastHit> {
    if let Some(soft) = object.soft_body() {
        if !soft.triangles.is_empty() {
            let triangles = soft.triangles.iter().filter_map(|t| {
                let corners = [soft.nodes.get(t[0])?, soft.nodes.get(t[1])?, soft.nodes.get(t[2])?];
                Some((corners.map(|n| n.position), Some(*t)))
            });
            return Raycast::ray_triangles(query, triangles);
        }
        let radius = soft.config.node_radius * soft.unit_scale;
        return soft
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(index, node)| {
                let (point, distance) = Raycast::ray_sphere(query, node.position, radius)?;
                Some(RaycastHit {
                    point,
                    normal: (point - node.position).normalize_or(-query.direction),
                    distance,
                    vertex_index: Some(index),
                })
            })
            .min_by(|x, y| x.distance.total_cmp(&y.distance));
    }
    let proxy = object.proxy.as_ref()?;
    let pose = object.transform.rigid();
    proxy
        .shapes
        .iter()
        .filter_map(|(shape, relative)| Raycast::cast_shape(query, shape, &pose.combine(relative)))
        .min_by(|x, y| x.distance.total_cmp(&y.distance))
}
