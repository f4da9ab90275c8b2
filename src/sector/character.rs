//! Kinematic character controller for actor objects.
//!
//! Actors are never driven by the solver. Each sub-step they sweep up by the
//! step height, walk while sliding along walls, sweep back down and resolve
//! any penetration left against solid objects.

use glam::Vec3;
use log::trace;

use super::{queries::SweepOptions, CollisionSector};
use crate::{core::types::Transform, utils::allocator::EntityId};

const RECOVER_ITERATIONS: usize = 4;
const SLIDE_ITERATIONS: usize = 3;

/// Penetration an actor may keep against what it stands on, world units.
const SKIN: f32 = 0.005;

/// Floor and ceiling touches gathered during one move.
#[derive(Debug, Default, Clone, Copy)]
struct Touch {
    floor: bool,
    ceiling: bool,
}

impl Touch {
    /// Classifies a contact normal pointing from the actor into the obstacle.
    fn from_normal(normal: Vec3, up: Vec3, floor_cos: f32) -> Self {
        let facing = (-normal).dot(up);
        Self {
            floor: facing >= floor_cos,
            ceiling: facing < 0.0 && facing <= -floor_cos,
        }
    }

    fn merge(&mut self, other: Touch) {
        self.floor |= other.floor;
        self.ceiling |= other.ceiling;
    }
}

impl CollisionSector {
    pub(super) fn move_actors(&mut self, dt: f32) {
        let actors: Vec<EntityId> = self
            .objects
            .iter()
            .filter(|(_, o)| o.actor.is_some() && o.proxy.is_some() && !o.is_shadow())
            .map(|(id, _)| id)
            .collect();
        for id in actors {
            self.move_actor(id, dt);
        }
    }

    fn move_actor(&mut self, id: EntityId, dt: f32) {
        let Some(object) = self.objects.get(id) else {
            return;
        };
        let Some(mut actor) = object.actor.clone() else {
            return;
        };
        let scale = self.unit_scale;
        let mut pose = object.transform.rigid();
        if actor.rotation_dirty {
            pose.rotation = actor.rotation_quat();
            actor.rotation_dirty = false;
        }

        let up = actor.up();
        let floor_cos = actor.max_slope().cos();
        let options = SweepOptions {
            samples: 4,
            bisections: 10,
            tolerance: SKIN * scale,
        };
        let gravity = (-self.gravity.dot(up)).max(0.0);
        actor.advance_timer(dt);
        if actor.jump_requested {
            actor.vertical_speed = actor.takeoff_speed(gravity);
            actor.jump_requested = false;
            actor.on_ground = false;
            trace!("actor {id:?} jumps at {}", actor.vertical_speed);
        }
        actor.vertical_speed = (actor.vertical_speed - gravity * dt).max(-actor.fall_speed());

        self.recover(id, &mut pose, up, floor_cos);
        let mut touch = Touch::default();

        let step = actor.step_height() * scale;
        let lifted = match self.sweep_by(id, &mut pose, up * step, options) {
            Some((fraction, normal)) => {
                touch.merge(Touch::from_normal(normal, up, floor_cos));
                step * fraction
            }
            None => step,
        };

        let mut motion = actor.horizontal_velocity() * scale * dt;
        for _ in 0..SLIDE_ITERATIONS {
            if motion.length_squared() <= f32::EPSILON * scale * scale {
                break;
            }
            let Some((fraction, normal)) = self.sweep_by(id, &mut pose, motion, options) else {
                break;
            };
            let remaining = motion * (1.0 - fraction);
            motion = remaining - normal * remaining.dot(normal).max(0.0);
        }

        let fall = actor.vertical_speed * scale * dt - lifted;
        if let Some((_, normal)) = self.sweep_by(id, &mut pose, up * fall, options) {
            touch.merge(Touch::from_normal(normal, up, floor_cos));
        }
        touch.merge(self.recover(id, &mut pose, up, floor_cos));

        actor.on_ground = touch.floor;
        if touch.floor && actor.vertical_speed < 0.0 {
            actor.vertical_speed = 0.0;
        }
        if touch.ceiling && actor.vertical_speed > 0.0 {
            actor.vertical_speed = 0.0;
        }

        if let Some(object) = self.objects.get_mut(id) {
            object.transform.position = pose.position;
            object.transform.rotation = pose.rotation;
            object.actor = Some(actor);
        }
    }

    /// Translates `pose` by `motion` up to the first blocker.
    ///
    /// Returns the travelled fraction and the blocker normal when stopped.
    fn sweep_by(
        &self,
        id: EntityId,
        pose: &mut Transform,
        motion: Vec3,
        options: SweepOptions,
    ) -> Option<(f32, Vec3)> {
        let target = Transform {
            position: pose.position + motion,
            ..*pose
        };
        match self.sweep(id, pose, &target, options) {
            Some(sweep) => {
                *pose = sweep.pose;
                Some((sweep.fraction, sweep.contact.normal))
            }
            None => {
                *pose = target;
                None
            }
        }
    }

    /// Pushes the actor out of solid objects, deepest contact per object first.
    fn recover(&self, id: EntityId, pose: &mut Transform, up: Vec3, floor_cos: f32) -> Touch {
        let mut touch = Touch::default();
        for _ in 0..RECOVER_ITERATIONS {
            let contacts = self.blocking_contacts(id, pose);
            if contacts.is_empty() {
                break;
            }
            let mut deepest: Vec<(EntityId, Vec3, f32)> = Vec::new();
            for (other, contact) in contacts {
                match deepest.iter_mut().find(|(o, _, _)| *o == other) {
                    Some(slot) if slot.2 >= contact.depth => {}
                    Some(slot) => *slot = (other, contact.normal, contact.depth),
                    None => deepest.push((other, contact.normal, contact.depth)),
                }
            }
            for (_, normal, depth) in deepest {
                pose.position -= normal * depth;
                touch.merge(Touch::from_normal(normal, up, floor_cos));
            }
        }
        touch
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::RwLock;

    use super::*;
    use crate::core::{
        collider::Collider, group::GroupTable, handle::SectorId, object::CollisionObject,
    };

    fn sector_with_floor() -> CollisionSector {
        let mut sector = CollisionSector::new(
            SectorId(EntityId::new(0, 0)),
            1.0,
            Arc::new(RwLock::new(GroupTable::new())),
        );
        let mut floor = CollisionObject::new();
        floor
            .add_collider(Arc::new(Collider::new_box(Vec3::new(20.0, 1.0, 20.0))), Transform::IDENTITY)
            .expect("box collider");
        floor.set_transform(Transform::from_position(Vec3::new(0.0, -0.5, 0.0)));
        sector.add_collision_object(floor).expect("floor");
        sector
    }

    fn walker(height: f32) -> CollisionObject {
        let mut actor = CollisionObject::new_actor();
        actor
            .add_collider(Arc::new(Collider::new_sphere(0.5)), Transform::IDENTITY)
            .expect("sphere collider");
        actor.set_transform(Transform::from_position(Vec3::new(0.0, height, 0.0)));
        actor
    }

    #[test]
    fn actor_falls_and_lands() {
        let mut sector = sector_with_floor();
        let handle = sector.add_collision_object(walker(3.0)).expect("actor");
        for _ in 0..180 {
            sector.step(1.0 / 60.0);
        }
        let object = sector.object(handle).expect("still here");
        assert!(object.actor().is_some_and(|a| a.is_on_ground()));
        let y = object.transform().position.y;
        assert!((y - 0.5).abs() < 0.1, "resting height {y}");
    }

    #[test]
    fn actor_walks_along_the_floor() {
        let mut sector = sector_with_floor();
        let handle = sector.add_collision_object(walker(0.5)).expect("actor");
        if let Some(actor) = sector.object_mut(handle).and_then(|o| o.actor_mut()) {
            actor.set_velocity(Vec3::new(2.0, 0.0, 0.0));
        }
        for _ in 0..60 {
            sector.step(1.0 / 60.0);
        }
        let position = sector.object(handle).expect("still here").transform().position;
        assert!((position.x - 2.0).abs() < 0.1, "walked to {}", position.x);
        assert!((position.y - 0.5).abs() < 0.1);
    }
}
