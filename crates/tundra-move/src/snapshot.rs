//! Saving and restoring movement state.
//!
//! A [`MoveSnapshot`] captures everything the simulation needs to resume:
//! flock membership and destinations, per-agent state-machine variables,
//! velocities, and the orientation history. Blocker circles are *not*
//! captured; they are reconstructed from each agent's loaded position so
//! the blocker grid can never drift from where agents actually stand.

use thiserror::Error;

use crate::config::VEL_HIST_LEN;
use crate::flock::Flock;
use crate::math::Vec2;
use crate::nav::{DestId, NavQuery};
use crate::registry::MoveRegistry;
use crate::state::ArrivalState;
use crate::world::EntityId;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlockSnapshot {
    pub members: Vec<u32>,
    pub target_xz: Vec2,
    pub dest_id: u32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentSnapshot {
    pub uid: u32,
    pub state: ArrivalState,
    pub vdes: Vec2,
    pub velocity: Vec2,
    pub blocking: bool,
    pub wait_prev: ArrivalState,
    pub wait_ticks_left: u32,
    pub vel_hist: Vec<Vec2>,
    pub vel_hist_idx: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MoveSnapshot {
    pub flocks: Vec<FlockSnapshot>,
    pub agents: Vec<AgentSnapshot>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot references unknown entity {0}")]
    UnknownEntity(u32),
    #[error("velocity history has {got} samples, expected {expected}")]
    HistoryLength { expected: usize, got: usize },
    #[error("velocity history index {0} out of range")]
    HistoryIndex(usize),
}

impl MoveRegistry {
    /// Capture the full movement state.
    pub fn snapshot(&self) -> MoveSnapshot {
        let flocks = self
            .flocks
            .iter()
            .map(|flock| FlockSnapshot {
                members: flock.members.iter().map(|id| id.0).collect(),
                target_xz: flock.target_xz,
                dest_id: flock.dest_id.0,
            })
            .collect();

        let agents = self
            .states
            .iter()
            .map(|(id, ms)| AgentSnapshot {
                uid: id.0,
                state: ms.state,
                vdes: ms.vdes,
                velocity: ms.velocity,
                blocking: ms.blocking,
                wait_prev: ms.wait_prev,
                wait_ticks_left: ms.wait_ticks_left,
                vel_hist: ms.vel_hist.to_vec(),
                vel_hist_idx: ms.vel_hist_idx,
            })
            .collect();

        MoveSnapshot { flocks, agents }
    }

    /// Restore a previously captured snapshot.
    ///
    /// Every agent in the snapshot must already have been re-added (so each
    /// holds a fresh blocker at its loaded position). On error, parsing
    /// stops and state applied so far is left in place.
    pub fn restore(
        &mut self,
        nav: &mut dyn NavQuery,
        snapshot: &MoveSnapshot,
    ) -> Result<(), SnapshotError> {
        assert!(
            self.flocks.is_empty(),
            "restore expects a world without flocks"
        );

        for flock_snap in &snapshot.flocks {
            let mut flock = Flock::new(flock_snap.target_xz, DestId(flock_snap.dest_id));
            for &uid in &flock_snap.members {
                if !self.states.contains_key(&EntityId(uid)) {
                    return Err(SnapshotError::UnknownEntity(uid));
                }
                flock.members.insert(EntityId(uid));
            }
            self.flocks.push(flock);
        }

        for agent in &snapshot.agents {
            let id = EntityId(agent.uid);
            if !self.states.contains_key(&id) {
                return Err(SnapshotError::UnknownEntity(agent.uid));
            }
            if agent.vel_hist.len() != VEL_HIST_LEN {
                return Err(SnapshotError::HistoryLength {
                    expected: VEL_HIST_LEN,
                    got: agent.vel_hist.len(),
                });
            }
            if agent.vel_hist_idx >= VEL_HIST_LEN {
                return Err(SnapshotError::HistoryIndex(agent.vel_hist_idx));
            }

            {
                let ms = self.states.get_mut(&id).expect("checked above");
                ms.state = agent.state;
                ms.vdes = agent.vdes;
                ms.velocity = agent.velocity;
                ms.wait_prev = agent.wait_prev;
                ms.wait_ticks_left = agent.wait_ticks_left;
                ms.vel_hist.copy_from_slice(&agent.vel_hist);
                ms.vel_hist_idx = agent.vel_hist_idx;
            }

            // Re-adding the agent acquired a blocker at its loaded position;
            // drop it again when the save says the agent was not blocking.
            let blocking_now = self.states[&id].blocking;
            assert!(blocking_now, "freshly added agent {id:?} must be blocking");
            if !agent.blocking {
                self.entity_unblock(nav, id);
            }
        }

        Ok(())
    }
}
