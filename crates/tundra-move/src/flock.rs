//! Flocks: groups of agents sharing a destination.

use std::collections::BTreeSet;

use crate::math::Vec2;
use crate::nav::DestId;
use crate::world::{EntityId, MoveWorld};

/// A set of agents commanded to the same destination.
///
/// Membership is exclusive: an agent belongs to at most one flock. The
/// registry keeps flocks in a `Vec` and deletes during reverse iteration
/// with swap-removal, so the element order is not meaningful.
#[derive(Debug, Clone, PartialEq)]
pub struct Flock {
    pub members: BTreeSet<EntityId>,
    pub target_xz: Vec2,
    pub dest_id: DestId,
}

impl Flock {
    pub fn new(target_xz: Vec2, dest_id: DestId) -> Self {
        Self {
            members: BTreeSet::new(),
            target_xz,
            dest_id,
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.members.contains(&id)
    }

    /// Flockmates within touching distance of `id`: centres closer than the
    /// combined radii plus the adjacency gap.
    pub fn adjacent_members(
        &self,
        world: &dyn MoveWorld,
        id: EntityId,
        sep_dist: f32,
        out: &mut Vec<EntityId>,
    ) {
        out.clear();
        let pos = world.pos_xz(id);
        let radius = world.selection_radius(id);
        for &other in &self.members {
            if other == id {
                continue;
            }
            let dist = pos.distance(world.pos_xz(other));
            if dist <= radius + world.selection_radius(other) + sep_dist {
                out.push(other);
            }
        }
    }
}
