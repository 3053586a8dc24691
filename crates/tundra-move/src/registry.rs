//! The movement registry: flock bookkeeping, the arrival state machine,
//! and the fixed-rate steering tick.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::avoid::{CpAgent, LocalAvoidance};
use crate::config::MoveConfig;
use crate::flock::Flock;
use crate::forces::{enemy_seek_vpref, point_seek_vpref};
use crate::math::{facing_from_velocity, truncate, Vec2, Vec3, EPSILON};
use crate::nav::{DestId, NavQuery};
use crate::state::{ArrivalState, MoveState};
use crate::world::{EntityFlags, EntityId, MoveWorld};

/// Motion notifications emitted when agents leave or enter a still state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionEventKind {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionEvent {
    pub entity: EntityId,
    pub kind: MotionEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

/// What a click should do, resolved against the pending click-mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOrder {
    Move,
    AttackMove,
}

/// Reusable per-tick buffers; the steady-state tick allocates nothing.
#[derive(Debug, Default)]
struct TickScratch {
    agents: Vec<EntityId>,
    near: Vec<EntityId>,
    cp_near: Vec<EntityId>,
    dynamic: Vec<CpAgent>,
    statics: Vec<CpAgent>,
    adjacent: Vec<EntityId>,
}

/// Owns all movement state for one world: per-agent records, flocks,
/// pending click modes, and the motion event queue. Dropping it releases
/// everything.
#[derive(Debug, Default)]
pub struct MoveRegistry {
    pub(crate) cfg: MoveConfig,
    pub(crate) states: BTreeMap<EntityId, MoveState>,
    pub(crate) flocks: Vec<Flock>,
    events: Vec<MotionEvent>,
    move_on_lclick: bool,
    attack_on_lclick: bool,
    last_cmd_dest: Option<DestId>,
    scratch: TickScratch,
}

impl MoveRegistry {
    pub fn new(cfg: MoveConfig) -> Self {
        Self {
            cfg,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &MoveConfig {
        &self.cfg
    }

    /// Movement state of an agent, if it is tracked.
    pub fn state(&self, id: EntityId) -> Option<&MoveState> {
        self.states.get(&id)
    }

    pub fn arrival_state(&self, id: EntityId) -> Option<ArrivalState> {
        self.states.get(&id).map(|ms| ms.state)
    }

    /// Destination of the most recent move command, for debug overlays.
    pub fn last_cmd_dest(&self) -> Option<DestId> {
        self.last_cmd_dest
    }

    /// Number of live flocks.
    pub fn flock_count(&self) -> usize {
        self.flocks.len()
    }

    /// All live flocks, for inspection and debug overlays.
    pub fn flocks(&self) -> &[Flock] {
        &self.flocks
    }

    /// Drain the motion events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<MotionEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- agent lifecycle ------------------------------------------------

    /// Start tracking an agent. It begins arrived and holding a blocker.
    pub fn add_entity(
        &mut self,
        world: &dyn MoveWorld,
        nav: &mut dyn NavQuery,
        id: EntityId,
    ) {
        let prev = self.states.insert(id, MoveState::new());
        assert!(prev.is_none(), "agent {id:?} already tracked");
        self.entity_block(world, nav, id);
    }

    /// Stop tracking an agent, releasing its blocker and flock membership.
    pub fn remove_entity(
        &mut self,
        world: &dyn MoveWorld,
        nav: &mut dyn NavQuery,
        id: EntityId,
    ) {
        if !self.states.contains_key(&id) {
            return;
        }
        self.stop(world, nav, id);
        self.entity_unblock(nav, id);
        self.states.remove(&id);
    }

    fn entity_block(&mut self, world: &dyn MoveWorld, nav: &mut dyn NavQuery, id: EntityId) {
        let pos = world.pos_xz(id);
        let radius = world.selection_radius(id);
        nav.blockers_incref(pos, radius);

        let ms = self.state_mut(id);
        assert!(!ms.blocking, "agent {id:?} already blocking");
        ms.blocking = true;
        ms.last_stop_pos = pos;
        ms.last_stop_radius = radius;
    }

    pub(crate) fn entity_unblock(&mut self, nav: &mut dyn NavQuery, id: EntityId) {
        let ms = self.state_mut(id);
        assert!(ms.blocking, "agent {id:?} is not blocking");
        let pos = ms.last_stop_pos;
        let radius = ms.last_stop_radius;
        ms.blocking = false;
        nav.blockers_decref(pos, radius);
    }

    fn state_mut(&mut self, id: EntityId) -> &mut MoveState {
        self.states
            .get_mut(&id)
            .unwrap_or_else(|| panic!("agent {id:?} has no movement state"))
    }

    fn stationary(world: &dyn MoveWorld, id: EntityId) -> bool {
        world.flags(id).contains(EntityFlags::STATIC) || world.max_speed(id) == 0.0
    }

    // ---- flock bookkeeping ----------------------------------------------

    pub fn flock_for_agent(&self, id: EntityId) -> Option<&Flock> {
        self.flocks.iter().find(|f| f.contains(id))
    }

    fn flock_index_for_agent(&self, id: EntityId) -> Option<usize> {
        self.flocks.iter().position(|f| f.contains(id))
    }

    pub fn flock_for_dest(&self, dest_id: DestId) -> Option<&Flock> {
        self.flocks.iter().find(|f| f.dest_id == dest_id)
    }

    fn flock_index_for_dest(&self, dest_id: DestId) -> Option<usize> {
        self.flocks.iter().position(|f| f.dest_id == dest_id)
    }

    /// Remove the agent from any flock it belongs to, destroying flocks
    /// that become empty. Iterates in reverse so swap-removal is safe.
    pub fn remove_from_flocks(&mut self, id: EntityId) {
        for i in (0..self.flocks.len()).rev() {
            self.flocks[i].members.remove(&id);
            if self.flocks[i].members.is_empty() {
                self.flocks.swap_remove(i);
            }
        }
        debug_assert!(self.flock_for_agent(id).is_none());
    }

    fn disband_done_flocks(&mut self) {
        for i in (0..self.flocks.len()).rev() {
            let done = self.flocks[i].members.iter().all(|member| {
                let ms = self
                    .states
                    .get(member)
                    .unwrap_or_else(|| panic!("flock member {member:?} has no movement state"));
                ms.state == ArrivalState::Arrived
            });
            if done {
                debug!(flock = i, "disbanding finished flock");
                self.flocks.swap_remove(i);
            }
        }
    }

    /// Build a flock from a selection and point it at `target_xz`.
    ///
    /// Returns false (committing nothing) when the selection is empty or
    /// contains only stationary agents.
    pub fn make_flock_from_selection(
        &mut self,
        world: &dyn MoveWorld,
        nav: &mut dyn NavQuery,
        selection: &[EntityId],
        target_xz: Vec2,
    ) -> bool {
        let Some(&first) = selection.first() else {
            return false;
        };

        // Snapping from the first agent's position is not optimal when the
        // selection spans multiple islands; that case is not a priority.
        let target_xz = nav.closest_reachable_dest(world.pos_xz(first), target_xz);

        for &id in selection {
            if Self::stationary(world, id) {
                continue;
            }
            self.remove_from_flocks(id);
        }

        let dest_id = nav.dest_id_for_pos(target_xz);
        let mut new_flock = Flock::new(target_xz, dest_id);

        for &id in selection {
            if Self::stationary(world, id) {
                continue;
            }

            if self.state_mut(id).still() {
                self.entity_unblock(nav, id);
                self.events.push(MotionEvent {
                    entity: id,
                    kind: MotionEventKind::Start,
                });
            }

            new_flock.members.insert(id);
            self.state_mut(id).state = ArrivalState::Moving;
        }

        if new_flock.members.is_empty() {
            return false;
        }

        // Flow fields for the destination are computed on demand during the
        // next movement tick.
        match self.flock_index_for_dest(dest_id) {
            Some(existing) => {
                let members = std::mem::take(&mut new_flock.members);
                self.flocks[existing].members.extend(members);
            }
            None => self.flocks.push(new_flock),
        }

        self.last_cmd_dest = Some(dest_id);
        true
    }

    // ---- host commands --------------------------------------------------

    /// Halt an agent wherever it is. Unknown agents are a no-op.
    pub fn stop(&mut self, world: &dyn MoveWorld, nav: &mut dyn NavQuery, id: EntityId) -> bool {
        if !self.states.contains_key(&id) {
            return false;
        }
        if !self.states[&id].still() {
            self.finish_moving(world, nav, id, ArrivalState::Arrived);
        }
        self.remove_from_flocks(id);
        self.state_mut(id).state = ArrivalState::Arrived;
        true
    }

    /// Current flock destination of an agent, if it has one.
    pub fn get_dest(&self, id: EntityId) -> Option<Vec2> {
        self.flock_for_agent(id).map(|f| f.target_xz)
    }

    /// Send a single agent toward `dest_xz`, joining an existing flock for
    /// the same destination when one exists.
    pub fn set_dest(
        &mut self,
        world: &dyn MoveWorld,
        nav: &mut dyn NavQuery,
        id: EntityId,
        dest_xz: Vec2,
    ) -> bool {
        let snapped = nav.closest_reachable_dest(world.pos_xz(id), dest_xz);
        let dest_id = nav.dest_id_for_pos(snapped);

        if let Some(existing) = self.flock_index_for_dest(dest_id) {
            if self.flocks[existing].contains(id) {
                return true;
            }

            self.remove_from_flocks(id);
            let existing = self
                .flock_index_for_dest(dest_id)
                .expect("destination flock disappeared during transfer");
            self.flocks[existing].members.insert(id);

            if self.state_mut(id).still() {
                self.entity_unblock(nav, id);
                self.events.push(MotionEvent {
                    entity: id,
                    kind: MotionEventKind::Start,
                });
            }
            self.state_mut(id).state = ArrivalState::Moving;
            self.last_cmd_dest = Some(dest_id);
            return true;
        }

        self.make_flock_from_selection(world, nav, &[id], dest_xz)
    }

    /// Switch an agent to chasing the nearest enemy.
    pub fn set_seek_enemies(
        &mut self,
        nav: &mut dyn NavQuery,
        id: EntityId,
    ) {
        assert!(
            self.states.contains_key(&id),
            "agent {id:?} has no movement state"
        );

        self.remove_from_flocks(id);

        if self.states[&id].still() {
            self.entity_unblock(nav, id);
            self.events.push(MotionEvent {
                entity: id,
                kind: MotionEventKind::Start,
            });
        }
        self.state_mut(id).state = ArrivalState::SeekEnemies;
    }

    /// Re-register the blocker after the host teleported the agent.
    pub fn update_pos(
        &mut self,
        world: &dyn MoveWorld,
        nav: &mut dyn NavQuery,
        id: EntityId,
        pos: Vec2,
    ) {
        let Some(ms) = self.states.get(&id) else {
            return;
        };
        if !ms.blocking {
            return;
        }

        let radius = world.selection_radius(id);
        let ms = self.state_mut(id);
        nav.blockers_decref(ms.last_stop_pos, ms.last_stop_radius);
        nav.blockers_incref(pos, radius);
        ms.last_stop_pos = pos;
        ms.last_stop_radius = radius;
    }

    /// Re-register the blocker after the host resized the agent.
    pub fn update_selection_radius(
        &mut self,
        nav: &mut dyn NavQuery,
        id: EntityId,
        radius: f32,
    ) {
        let Some(ms) = self.states.get_mut(&id) else {
            return;
        };
        if !ms.blocking {
            return;
        }

        nav.blockers_decref(ms.last_stop_pos, ms.last_stop_radius);
        nav.blockers_incref(ms.last_stop_pos, radius);
        ms.last_stop_radius = radius;
    }

    // ---- click orders ---------------------------------------------------

    pub fn set_move_on_left_click(&mut self) {
        self.move_on_lclick = true;
        self.attack_on_lclick = false;
    }

    pub fn set_attack_on_left_click(&mut self) {
        self.attack_on_lclick = true;
        self.move_on_lclick = false;
    }

    /// Resolve a click against the pending click-mode flags. The flags
    /// reset after any click, whatever it resolved to.
    pub fn resolve_click(&mut self, button: MouseButton) -> Option<ClickOrder> {
        debug_assert!(!(self.move_on_lclick && self.attack_on_lclick));
        let attack = self.attack_on_lclick && button == MouseButton::Left;
        let movement = if self.move_on_lclick {
            button == MouseButton::Left
        } else {
            button == MouseButton::Right
        };

        self.attack_on_lclick = false;
        self.move_on_lclick = false;

        if attack {
            Some(ClickOrder::AttackMove)
        } else if movement {
            Some(ClickOrder::Move)
        } else {
            None
        }
    }

    /// Apply a click at `point` for the given selection.
    pub fn click_order(
        &mut self,
        world: &dyn MoveWorld,
        nav: &mut dyn NavQuery,
        selection: &[EntityId],
        button: MouseButton,
        point: Vec2,
    ) -> bool {
        if self.resolve_click(button).is_none() {
            return false;
        }
        self.make_flock_from_selection(world, nav, selection, point)
    }

    // ---- state machine --------------------------------------------------

    /// Move an agent into a still state: emit the end event, remember how
    /// to wake up when waiting, zero velocities, and acquire a blocker.
    fn finish_moving(
        &mut self,
        world: &dyn MoveWorld,
        nav: &mut dyn NavQuery,
        id: EntityId,
        newstate: ArrivalState,
    ) {
        self.events.push(MotionEvent {
            entity: id,
            kind: MotionEventKind::End,
        });

        let wait_ticks = self.cfg.wait_ticks;
        let ms = self.state_mut(id);
        assert!(!ms.still(), "agent {id:?} finished moving twice");

        if newstate == ArrivalState::Waiting {
            ms.wait_prev = ms.state;
            ms.wait_ticks_left = wait_ticks;
        }

        debug!(agent = id.0, from = ?ms.state, to = ?newstate, "motion end");
        ms.state = newstate;
        ms.velocity = Vec2::ZERO;
        ms.vnew = Vec2::ZERO;

        self.entity_block(world, nav, id);
        debug_assert!(self.states[&id].still());
    }

    fn desired_velocity(
        &self,
        world: &dyn MoveWorld,
        nav: &dyn NavQuery,
        id: EntityId,
    ) -> Vec2 {
        let pos = world.pos_xz(id);
        match self.states[&id].state {
            ArrivalState::SeekEnemies => {
                nav.desired_enemy_seek_velocity(pos, world.faction(id))
            }
            _ => {
                let flock = self
                    .flock_for_agent(id)
                    .unwrap_or_else(|| panic!("moving agent {id:?} has no flock"));
                nav.desired_point_seek_velocity(flock.dest_id, pos, flock.target_xz)
            }
        }
    }

    /// Integration hook between avoidance output and the committed
    /// velocity; a smoothing or damping term would apply to the delta here.
    fn apply_velocity_delta(velocity: Vec2, vnew: Vec2) -> Vec2 {
        let vel_diff = vnew - velocity;
        velocity + vel_diff
    }

    /// Partition nearby agents into still and moving avoidance neighbours.
    ///
    /// Agents flagged STATIC never dodge and are excluded outright; still
    /// agents will not dodge this tick and go into the static list.
    fn find_neighbours(
        &self,
        world: &dyn MoveWorld,
        id: EntityId,
        cp_near: &mut Vec<EntityId>,
        dynamic: &mut Vec<CpAgent>,
        statics: &mut Vec<CpAgent>,
    ) {
        world.entities_in_circle(
            world.pos_xz(id),
            self.cfg.clearpath_neighbour_radius,
            cp_near,
        );
        dynamic.clear();
        statics.clear();

        for &other in cp_near.iter() {
            if other == id {
                continue;
            }
            if world.flags(other).contains(EntityFlags::STATIC) {
                continue;
            }
            if world.selection_radius(other) == 0.0 {
                continue;
            }

            let ms = self
                .states
                .get(&other)
                .unwrap_or_else(|| panic!("neighbour {other:?} has no movement state"));
            let desc = CpAgent {
                xz_pos: world.pos_xz(other),
                xz_vel: ms.velocity,
                radius: world.selection_radius(other),
            };

            if ms.still() {
                statics.push(desc);
            } else {
                dynamic.push(desc);
            }
        }
    }

    /// One 20 Hz movement tick.
    ///
    /// Velocities for every non-still agent are computed first, against a
    /// consistent snapshot of last tick's velocities; positions and state
    /// transitions commit in a second pass.
    pub fn tick(
        &mut self,
        world: &mut dyn MoveWorld,
        nav: &mut dyn NavQuery,
        avoid: &dyn LocalAvoidance,
    ) {
        self.disband_done_flocks();

        let cfg = self.cfg;
        let mut scratch = std::mem::take(&mut self.scratch);

        scratch.agents.clear();
        scratch.agents.extend(
            self.states
                .keys()
                .copied()
                .filter(|&id| !world.flags(id).contains(EntityFlags::STATIC)),
        );
        trace!(agents = scratch.agents.len(), "movement tick");

        for &id in &scratch.agents {
            if self.states[&id].still() {
                continue;
            }

            let vdes = self.desired_velocity(world, nav, id);
            let velocity = self.states[&id].velocity;

            let vpref = match self.states[&id].state {
                ArrivalState::SeekEnemies => {
                    debug_assert!(self.flock_for_agent(id).is_none());
                    enemy_seek_vpref(world, nav, &cfg, id, velocity, vdes, &mut scratch.near)
                }
                _ => {
                    let flock = self
                        .flock_for_agent(id)
                        .unwrap_or_else(|| panic!("moving agent {id:?} has no flock"));
                    point_seek_vpref(
                        world,
                        nav,
                        &cfg,
                        id,
                        velocity,
                        vdes,
                        flock,
                        &mut scratch.near,
                    )
                }
            };

            self.find_neighbours(
                world,
                id,
                &mut scratch.cp_near,
                &mut scratch.dynamic,
                &mut scratch.statics,
            );
            let self_desc = CpAgent {
                xz_pos: world.pos_xz(id),
                xz_vel: velocity,
                radius: world.selection_radius(id),
            };
            let reconciled =
                avoid.new_velocity(self_desc, id, vpref, &scratch.dynamic, &scratch.statics);

            let vnew = truncate(
                Self::apply_velocity_delta(velocity, reconciled),
                world.max_speed(id) / cfg.tick_res,
            );

            let ms = self.state_mut(id);
            ms.vdes = vdes;
            ms.push_vel_hist(reconciled);
            ms.vnew = vnew;
        }

        for &id in &scratch.agents {
            let vnew = self.states[&id].vnew;
            self.entity_update(world, nav, id, vnew, &mut scratch.adjacent);
        }

        self.scratch = scratch;
    }

    /// Commit one agent's position for this tick and run its state machine.
    fn entity_update(
        &mut self,
        world: &mut dyn MoveWorld,
        nav: &mut dyn NavQuery,
        id: EntityId,
        new_vel: Vec2,
        adjacent: &mut Vec<EntityId>,
    ) {
        let new_pos_xz = world.pos_xz(id) + new_vel;

        if new_vel.length() > 0.0 && nav.position_pathable(new_pos_xz) {
            let new_pos = Vec3::new(new_pos_xz.x, nav.height_at(new_pos_xz), new_pos_xz.z);
            world.set_pos(id, new_pos);

            let ms = self.state_mut(id);
            ms.velocity = new_vel;

            // Orient along a weighted average of past velocities: the
            // visible facing lags the true heading slightly, which smooths
            // turning.
            let wma = ms.vel_wma();
            if wma.length() > EPSILON {
                world.set_rotation(id, facing_from_velocity(wma));
            }
        } else {
            self.state_mut(id).velocity = Vec2::ZERO;
        }

        // A non-pathable current position can only come from the host
        // force-placing the agent (e.g. a script); keep it stuck in its
        // current state rather than transitioning.
        if !nav.position_pathable(world.pos_xz(id)) {
            return;
        }

        match self.states[&id].state {
            ArrivalState::Moving => {
                let flock_idx = self
                    .flock_index_for_agent(id)
                    .unwrap_or_else(|| panic!("moving agent {id:?} has no flock"));
                let target_xz = self.flocks[flock_idx].target_xz;
                let pos = world.pos_xz(id);
                let arrive_thresh = world.selection_radius(id) * 1.5;

                if (target_xz - pos).length() < arrive_thresh
                    || nav.is_maximally_close(pos, target_xz, arrive_thresh)
                {
                    self.finish_moving(world, nav, id, ArrivalState::Arrived);
                    return;
                }

                self.flocks[flock_idx].adjacent_members(
                    world,
                    id,
                    self.cfg.adjacency_sep_dist,
                    adjacent,
                );
                let cascade = adjacent.iter().any(|adj| {
                    let ms = self
                        .states
                        .get(adj)
                        .unwrap_or_else(|| panic!("flock member {adj:?} has no movement state"));
                    ms.state == ArrivalState::Arrived
                });
                if cascade {
                    self.finish_moving(world, nav, id, ArrivalState::Arrived);
                    return;
                }

                // A zero desired velocity means navigation cannot guide the
                // agent any closer right now: stop, wait, and retry later.
                if self.states[&id].vdes.length() < EPSILON {
                    self.finish_moving(world, nav, id, ArrivalState::Waiting);
                }
            }
            ArrivalState::SeekEnemies => {
                if self.states[&id].vdes.length() < EPSILON {
                    self.finish_moving(world, nav, id, ArrivalState::Waiting);
                }
            }
            ArrivalState::Waiting => {
                let ms = self.state_mut(id);
                assert!(ms.wait_ticks_left > 0, "waiting agent with no ticks left");
                ms.wait_ticks_left -= 1;
                if ms.wait_ticks_left == 0 {
                    let wait_prev = ms.wait_prev;
                    assert!(matches!(
                        wait_prev,
                        ArrivalState::Moving | ArrivalState::SeekEnemies
                    ));

                    self.entity_unblock(nav, id);
                    self.events.push(MotionEvent {
                        entity: id,
                        kind: MotionEventKind::Start,
                    });
                    debug!(agent = id.0, to = ?wait_prev, "wait over, motion start");
                    self.state_mut(id).state = wait_prev;
                }
            }
            ArrivalState::Arrived => {}
        }
    }
}
