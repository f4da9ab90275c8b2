//! Named collision groups and their pairwise filter masks.

use log::{debug, warn};

use crate::error::{CollisionError, CollisionResult};

/// Indices of the groups every table starts with.
pub mod builtin {
    pub const DEFAULT: u8 = 0;
    pub const STATIC: u8 = 1;
    pub const KINEMATIC: u8 = 2;
    pub const DEBRIS: u8 = 3;
    pub const SENSOR: u8 = 4;
    pub const CHARACTER: u8 = 5;
    pub const PORTAL: u8 = 6;
}

pub const BUILTIN_GROUP_NAMES: [&str; 7] = [
    "Default",
    "Static",
    "Kinematic",
    "Debris",
    "Sensor",
    "Character",
    "Portal",
];

/// A group is a bit index plus the mask of groups it may collide with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionGroup {
    pub name: String,
    pub index: u8,
    pub mask: u32,
}

impl CollisionGroup {
    pub fn bit(&self) -> u32 {
        1 << self.index
    }
}

#[derive(Debug, Clone)]
pub struct GroupTable {
    groups: Vec<CollisionGroup>,
}

impl Default for GroupTable {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupTable {
    pub const MAX_GROUPS: usize = 32;

    pub fn new() -> Self {
        let groups = BUILTIN_GROUP_NAMES
            .iter()
            .enumerate()
            .map(|(index, name)| CollisionGroup {
                name: (*name).to_string(),
                index: index as u8,
                mask: u32::MAX,
            })
            .collect();
        let mut table = Self { groups };
        let portal = 1u32 << builtin::PORTAL;
        table.groups[builtin::PORTAL as usize].mask &= !portal;
        table
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn is_builtin(index: u8) -> bool {
        (index as usize) < BUILTIN_GROUP_NAMES.len()
    }

    pub fn get(&self, index: u8) -> Option<&CollisionGroup> {
        self.groups.get(index as usize)
    }

    pub fn find(&self, name: &str) -> Option<&CollisionGroup> {
        self.groups.iter().find(|group| group.name == name)
    }

    pub fn index_of(&self, name: &str) -> CollisionResult<u8> {
        self.find(name).map(|group| group.index).ok_or_else(|| {
            warn!("unknown collision group '{name}'");
            CollisionError::UnknownGroup(name.to_string())
        })
    }

    /// Registers a new group colliding with every other group.
    ///
    /// Asking again for an existing custom group returns it unchanged.
    pub fn create_group(&mut self, name: &str) -> CollisionResult<CollisionGroup> {
        if let Some(existing) = self.find(name) {
            if Self::is_builtin(existing.index) {
                warn!("collision group '{name}' is built in and cannot be redefined");
                return Err(CollisionError::BuiltinGroup(name.to_string()));
            }
            return Ok(existing.clone());
        }
        if self.groups.len() >= Self::MAX_GROUPS {
            warn!("cannot create collision group '{name}': table is full");
            return Err(CollisionError::GroupTableFull);
        }
        let index = self.groups.len() as u8;
        let bit = 1u32 << index;
        for group in &mut self.groups {
            group.mask |= bit;
        }
        let group = CollisionGroup {
            name: name.to_string(),
            index,
            mask: u32::MAX,
        };
        debug!("created collision group '{name}' at bit {index}");
        self.groups.push(group.clone());
        Ok(group)
    }

    /// Enables or disables collisions between two groups, symmetrically.
    pub fn set_group_collision(&mut self, a: &str, b: &str, collide: bool) -> CollisionResult<()> {
        let ia = self.index_of(a)?;
        let ib = self.index_of(b)?;
        self.set_group_collision_by_index(ia, ib, collide);
        Ok(())
    }

    pub(crate) fn set_group_collision_by_index(&mut self, a: u8, b: u8, collide: bool) {
        let (bit_a, bit_b) = (1u32 << a, 1u32 << b);
        for (index, other_bit) in [(a, bit_b), (b, bit_a)] {
            if let Some(group) = self.groups.get_mut(index as usize) {
                if collide {
                    group.mask |= other_bit;
                } else {
                    group.mask &= !other_bit;
                }
            }
        }
    }

    pub fn group_collision(&self, a: &str, b: &str) -> CollisionResult<bool> {
        let ia = self.index_of(a)?;
        let ib = self.index_of(b)?;
        Ok(self.collides(ia, ib))
    }

    /// Pairwise filter: each group's mask must include the other's bit.
    pub fn collides(&self, a: u8, b: u8) -> bool {
        match (self.get(a), self.get(b)) {
            (Some(ga), Some(gb)) => (ga.mask & gb.bit()) != 0 && (gb.mask & ga.bit()) != 0,
            _ => false,
        }
    }
}
