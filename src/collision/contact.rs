//! Contact points, per-pair manifolds and the persistent manifold cache.

use std::collections::BTreeMap;

use glam::Vec3;

use crate::{
    config::{CONTACT_MATCH_DISTANCE, MAX_MANIFOLD_POINTS},
    core::{handle::ObjectHandle, types::MaterialPairProperties},
};

/// Contact between two shapes in backend units.
///
/// The normal points from A towards B and `depth` is positive while the
/// shapes overlap. `point` lies halfway between both surfaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub point: Vec3,
    pub normal: Vec3,
    pub depth: f32,
    pub normal_impulse: f32,
    pub tangent_impulse: Vec3,
    pub rolling_impulse: Vec3,
}

impl Contact {
    pub fn new(point: Vec3, normal: Vec3, depth: f32) -> Self {
        Self {
            point,
            normal,
            depth,
            normal_impulse: 0.0,
            tangent_impulse: Vec3::ZERO,
            rolling_impulse: Vec3::ZERO,
        }
    }

    /// Deepest point of A inside B.
    pub fn position_on_a(&self) -> Vec3 {
        self.point + self.normal * (self.depth * 0.5)
    }

    pub fn position_on_b(&self) -> Vec3 {
        self.point - self.normal * (self.depth * 0.5)
    }

    /// Same contact seen from B.
    pub fn flipped(&self) -> Contact {
        Contact {
            normal: -self.normal,
            tangent_impulse: -self.tangent_impulse,
            rolling_impulse: -self.rolling_impulse,
            ..*self
        }
    }
}

/// Contact point handed to callers, in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionData {
    pub position_on_a: Vec3,
    pub position_on_b: Vec3,
    /// Unit normal on B pointing towards A.
    pub normal_world_on_b: Vec3,
    /// Signed separation; negative while the objects overlap.
    pub penetration: f32,
}

impl CollisionData {
    pub(crate) fn from_contact(contact: &Contact, inverse_scale: f32) -> Self {
        Self {
            position_on_a: contact.position_on_a() * inverse_scale,
            position_on_b: contact.position_on_b() * inverse_scale,
            normal_world_on_b: -contact.normal,
            penetration: -contact.depth * inverse_scale,
        }
    }

    /// Same data seen from the other object.
    pub fn swapped(&self) -> CollisionData {
        CollisionData {
            position_on_a: self.position_on_b,
            position_on_b: self.position_on_a,
            normal_world_on_b: -self.normal_world_on_b,
            penetration: self.penetration,
        }
    }
}

/// Contacts of one ordered object pair; `a < b`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactManifold {
    pub a: ObjectHandle,
    pub b: ObjectHandle,
    pub contacts: Vec<Contact>,
    pub material: MaterialPairProperties,
    stamp: u64,
}

impl ContactManifold {
    pub fn is_touching(&self) -> bool {
        self.contacts.iter().any(|c| c.depth >= 0.0)
    }
}

/// Persistent manifolds keyed by ordered object pair, refreshed once per sub-step.
#[derive(Debug, Default)]
pub struct ManifoldCache {
    manifolds: BTreeMap<(ObjectHandle, ObjectHandle), ContactManifold>,
    stamp: u64,
}

impl ManifoldCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a refresh; manifolds not updated before `end_frame` are dropped.
    pub fn begin_frame(&mut self) {
        self.stamp += 1;
    }

    /// Stores fresh contacts for a pair, inheriting impulses from nearby cached points.
    pub fn update(
        &mut self,
        a: ObjectHandle,
        b: ObjectHandle,
        mut contacts: Vec<Contact>,
        material: MaterialPairProperties,
        match_scale: f32,
    ) {
        let (key, swap) = if a <= b { ((a, b), false) } else { ((b, a), true) };
        if swap {
            for contact in &mut contacts {
                *contact = contact.flipped();
            }
        }
        if contacts.len() > MAX_MANIFOLD_POINTS {
            contacts.sort_by(|x, y| y.depth.total_cmp(&x.depth));
            contacts.truncate(MAX_MANIFOLD_POINTS);
        }

        let threshold = CONTACT_MATCH_DISTANCE * match_scale;
        let stamp = self.stamp;
        let entry = self
            .manifolds
            .entry(key)
            .or_insert_with(|| ContactManifold {
                a: key.0,
                b: key.1,
                contacts: Vec::new(),
                material,
                stamp,
            });
        for contact in &mut contacts {
            let cached = entry
                .contacts
                .iter()
                .filter(|old| old.point.distance_squared(contact.point) < threshold * threshold)
                .min_by(|x, y| {
                    x.point
                        .distance_squared(contact.point)
                        .total_cmp(&y.point.distance_squared(contact.point))
                });
            if let Some(old) = cached {
                contact.normal_impulse = old.normal_impulse;
                contact.tangent_impulse = old.tangent_impulse;
                contact.rolling_impulse = old.rolling_impulse;
            }
        }
        entry.contacts = contacts;
        entry.material = material;
        entry.stamp = stamp;
    }

    /// Drops manifolds that were not refreshed since `begin_frame`.
    pub fn end_frame(&mut self) {
        let stamp = self.stamp;
        self.manifolds.retain(|_, m| m.stamp == stamp && !m.contacts.is_empty());
    }

    pub fn get(&self, a: ObjectHandle, b: ObjectHandle) -> Option<&ContactManifold> {
        let key = if a <= b { (a, b) } else { (b, a) };
        self.manifolds.get(&key)
    }

    /// Forgets every manifold involving `object`.
    pub fn remove_object(&mut self, object: ObjectHandle) {
        self.manifolds
            .retain(|(a, b), _| *a != object && *b != object);
    }

    pub fn clear(&mut self) {
        self.manifolds.clear();
    }

    pub fn len(&self) -> usize {
        self.manifolds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifolds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContactManifold> + '_ {
        self.manifolds.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ContactManifold> + '_ {
        self.manifolds.values_mut()
    }

    pub fn contact_count(&self) -> usize {
        self.manifolds.values().map(|m| m.contacts.len()).sum()
    }
}
