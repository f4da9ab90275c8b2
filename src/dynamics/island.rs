use std::collections::{BTreeMap, BTreeSet};

use log::trace;

use crate::{
    config::AutoDisableParams,
    core::object::CollisionObject,
    utils::allocator::{Arena, EntityId},
};

/// Connected set of dynamic bodies linked by contacts or joints.
#[derive(Debug, Clone, PartialEq)]
pub struct Island {
    pub bodies: Vec<EntityId>,
    pub is_awake: bool,
}

/// Builds islands each sub-step and manages the sleeping state.
#[derive(Debug, Default)]
pub struct IslandManager {
    islands: Vec<Island>,
    adjacency: BTreeMap<EntityId, Vec<EntityId>>,
}

impl IslandManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups `bodies` through `links`; links to bodies outside the list do not merge islands.
    pub fn build_islands(&mut self, bodies: &[EntityId], links: &[(EntityId, EntityId)]) {
        self.islands.clear();
        self.adjacency.clear();

        let members: BTreeSet<EntityId> = bodies.iter().copied().collect();
        for &(a, b) in links {
            if members.contains(&a) && members.contains(&b) {
                self.adjacency.entry(a).or_default().push(b);
                self.adjacency.entry(b).or_default().push(a);
            }
        }

        let mut visited = BTreeSet::new();
        for &body_id in bodies {
            if visited.contains(&body_id) {
                continue;
            }
            let mut island = self.depth_first_collect(body_id, &mut visited);
            island.sort_unstable();
            self.islands.push(Island {
                bodies: island,
                is_awake: true,
            });
        }
    }

    fn depth_first_collect(&self, start: EntityId, visited: &mut BTreeSet<EntityId>) -> Vec<EntityId> {
        let mut stack = vec![start];
        let mut result = Vec::new();

        while let Some(node) = stack.pop() {
            if visited.insert(node) {
                result.push(node);
                if let Some(neighbors) = self.adjacency.get(&node) {
                    stack.extend(neighbors.iter().copied());
                }
            }
        }

        result
    }

    /// Puts islands to sleep once every body stayed slow for the configured time.
    ///
    /// An island with any enabled body above the thresholds wakes up entirely.
    pub fn update_sleeping(
        &mut self,
        objects: &mut Arena<CollisionObject>,
        params: &AutoDisableParams,
        unit_scale: f32,
        dt: f32,
    ) {
        for island in &mut self.islands {
            let mut restless = false;
            let mut all_tired = true;
            for id in &island.bodies {
                let Some(body) = objects.get_mut(*id).and_then(|o| o.rigid_body_mut()) else {
                    continue;
                };
                if !body.is_enabled() {
                    continue;
                }
                let slow = body.velocity.linear.length() <= params.linear_threshold * unit_scale
                    && body.velocity.angular.length() <= params.angular_threshold;
                if slow {
                    body.sleep_timer += dt;
                } else {
                    body.sleep_timer = 0.0;
                    restless = true;
                }
                all_tired &= body.sleep_timer >= params.time;
            }

            let any_enabled = island.bodies.iter().any(|id| {
                objects
                    .get(*id)
                    .and_then(|o| o.rigid_body())
                    .is_some_and(|b| b.is_enabled())
            });

            if restless {
                island.is_awake = true;
                for id in &island.bodies {
                    if let Some(body) = objects.get_mut(*id).and_then(|o| o.rigid_body_mut()) {
                        if !body.is_enabled() {
                            body.enable();
                        }
                    }
                }
            } else if any_enabled && all_tired {
                trace!("island of {} bodies goes to sleep", island.bodies.len());
                island.is_awake = false;
                for id in &island.bodies {
                    if let Some(body) = objects.get_mut(*id).and_then(|o| o.rigid_body_mut()) {
                        body.disable();
                    }
                }
            } else {
                island.is_awake = any_enabled;
            }
        }
    }

    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    pub fn active_count(&self) -> usize {
        self.islands.iter().filter(|i| i.is_awake).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rigidbody::RigidBody;
    use glam::Vec3;

    fn id(index: usize) -> EntityId {
        EntityId::new(index, 0)
    }

    #[test]
    fn links_merge_islands_but_outsiders_do_not() {
        let mut manager = IslandManager::new();
        let bodies = [id(0), id(1), id(2), id(3)];
        // id(9) stands for static ground touching everyone.
        let links = [(id(0), id(1)), (id(1), id(9)), (id(2), id(9))];
        manager.build_islands(&bodies, &links);
        assert_eq!(manager.islands().len(), 3);
        assert_eq!(manager.islands()[0].bodies, vec![id(0), id(1)]);
    }

    #[test]
    fn slow_island_sleeps_after_timeout() {
        let mut objects = Arena::new();
        let resting = objects.insert(CollisionObject::new_rigid_body(RigidBody::new()));
        let mut moving_body = RigidBody::new();
        moving_body.set_linear_velocity(Vec3::X * 5.0);
        let moving = objects.insert(CollisionObject::new_rigid_body(moving_body));

        let mut manager = IslandManager::new();
        manager.build_islands(&[resting, moving], &[]);
        let params = AutoDisableParams {
            time: 0.5,
            ..Default::default()
        };
        for _ in 0..40 {
            manager.update_sleeping(&mut objects, &params, 1.0, 1.0 / 60.0);
        }
        let state = |id| objects.get(id).and_then(|o| o.rigid_body()).map(|b| b.is_enabled());
        assert_eq!(state(resting), Some(false));
        assert_eq!(state(moving), Some(true));
        assert_eq!(manager.active_count(), 1);
    }
}
