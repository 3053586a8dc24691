//! Entity/position store access.
//!
//! The movement core does not own entities. It reads identity, position,
//! radius, and speed through [`MoveWorld`] and writes back position and
//! rotation through the same trait. [`WorldStore`] is a deterministic
//! in-memory implementation for hosts that have no store of their own
//! (tests, benches, the reference adapter).

use std::collections::BTreeMap;

use crate::math::{Quat, Vec2, Vec3};

/// Stable identifier for an entity, unique for the entity's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityId(pub u32);

/// Entity flag bits the movement core cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityFlags(pub u32);

impl EntityFlags {
    /// Entity never moves and is not simulated by the steering tick.
    pub const STATIC: Self = Self(1 << 0);
    /// Entity participates in combat (motion-end hooks fire for it).
    pub const COMBATABLE: Self = Self(1 << 1);
    /// Entity is a transient UI marker, not a real unit.
    pub const MARKER: Self = Self(1 << 2);

    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Read/write surface of the entity store as seen by the movement core.
///
/// Implementations must answer queries for every id handed to the movement
/// registry; asking about an unknown id is a host bug.
pub trait MoveWorld {
    fn pos(&self, id: EntityId) -> Vec3;

    fn pos_xz(&self, id: EntityId) -> Vec2 {
        self.pos(id).xz()
    }

    fn set_pos(&mut self, id: EntityId, pos: Vec3);

    fn set_rotation(&mut self, id: EntityId, rotation: Quat);

    fn selection_radius(&self, id: EntityId) -> f32;

    fn max_speed(&self, id: EntityId) -> f32;

    fn flags(&self, id: EntityId) -> EntityFlags;

    fn faction(&self, id: EntityId) -> u32;

    /// Collect every entity whose XZ position lies within `radius` of
    /// `center` into `out` (cleared first), in ascending id order.
    fn entities_in_circle(&self, center: Vec2, radius: f32, out: &mut Vec<EntityId>);
}

/// One record in [`WorldStore`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentRecord {
    pub pos: Vec3,
    pub rotation: Quat,
    pub selection_radius: f32,
    pub max_speed: f32,
    pub flags: EntityFlags,
    pub faction: u32,
}

impl Default for AgentRecord {
    fn default() -> Self {
        Self {
            pos: Vec3::new(0.0, 0.0, 0.0),
            rotation: Quat::IDENTITY,
            selection_radius: 1.0,
            max_speed: 6.0,
            flags: EntityFlags::default(),
            faction: 0,
        }
    }
}

/// Deterministic in-memory entity store.
///
/// Spatial queries are a linear scan over the id-ordered map; hosts with
/// real entity systems are expected to back [`MoveWorld`] with their own
/// indexed store instead.
#[derive(Debug, Default)]
pub struct WorldStore {
    records: BTreeMap<EntityId, AgentRecord>,
}

impl WorldStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: EntityId, record: AgentRecord) {
        self.records.insert(id, record);
    }

    pub fn remove(&mut self, id: EntityId) -> Option<AgentRecord> {
        self.records.remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&AgentRecord> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut AgentRecord> {
        self.records.get_mut(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.records.keys().copied()
    }

    fn record(&self, id: EntityId) -> &AgentRecord {
        self.records
            .get(&id)
            .unwrap_or_else(|| panic!("unknown entity {id:?}"))
    }
}

impl MoveWorld for WorldStore {
    fn pos(&self, id: EntityId) -> Vec3 {
        self.record(id).pos
    }

    fn set_pos(&mut self, id: EntityId, pos: Vec3) {
        self.records
            .get_mut(&id)
            .unwrap_or_else(|| panic!("unknown entity {id:?}"))
            .pos = pos;
    }

    fn set_rotation(&mut self, id: EntityId, rotation: Quat) {
        self.records
            .get_mut(&id)
            .unwrap_or_else(|| panic!("unknown entity {id:?}"))
            .rotation = rotation;
    }

    fn selection_radius(&self, id: EntityId) -> f32 {
        self.record(id).selection_radius
    }

    fn max_speed(&self, id: EntityId) -> f32 {
        self.record(id).max_speed
    }

    fn flags(&self, id: EntityId) -> EntityFlags {
        self.record(id).flags
    }

    fn faction(&self, id: EntityId) -> u32 {
        self.record(id).faction
    }

    fn entities_in_circle(&self, center: Vec2, radius: f32, out: &mut Vec<EntityId>) {
        out.clear();
        for (id, record) in &self.records {
            if record.pos.xz().distance(center) <= radius {
                out.push(*id);
            }
        }
    }
}
