//! Steering forces and the preferred-velocity cascade.
//!
//! Every force returns a vector truncated to `MoveConfig::max_force`. The
//! decay curves are smooth exponentials; discontinuous cutoffs at the
//! neighbour-circle boundary cause oscillating forces, so the falloff must
//! stay smooth.

use crate::config::MoveConfig;
use crate::flock::Flock;
use crate::math::{truncate, Vec2, EPSILON};
use crate::nav::{DestId, NavQuery};
use crate::world::{EntityFlags, EntityId, MoveWorld};

/// Seek steers straight at a destination point at full speed.
pub fn seek_force(
    world: &dyn MoveWorld,
    cfg: &MoveConfig,
    id: EntityId,
    velocity: Vec2,
    target_xz: Vec2,
) -> Vec2 {
    let pos = world.pos_xz(id);
    let desired =
        (target_xz - pos).normalized_or_zero() * (world.max_speed(id) / cfg.tick_res);
    desired - velocity
}

/// Arrive is seek with deceleration inside the slowing radius. Without line
/// of sight to the destination the flow-field guidance (`vdes`) supplies
/// the desired direction instead.
pub fn arrive_force(
    world: &dyn MoveWorld,
    nav: &dyn NavQuery,
    cfg: &MoveConfig,
    id: EntityId,
    velocity: Vec2,
    vdes: Vec2,
    dest: Option<DestId>,
    target_xz: Vec2,
) -> Vec2 {
    debug_assert!(!world.flags(id).contains(EntityFlags::STATIC));
    let pos = world.pos_xz(id);
    let per_tick_speed = world.max_speed(id) / cfg.tick_res;

    let desired = match dest {
        Some(dest) if nav.has_dest_los(dest, pos) => {
            let to_target = target_xz - pos;
            let distance = to_target.length();
            let mut desired = to_target.normalized_or_zero() * per_tick_speed;
            if distance < cfg.arrive_slowing_radius {
                desired = desired * (distance / cfg.arrive_slowing_radius);
            }
            desired
        }
        _ => vdes * per_tick_speed,
    };

    truncate(desired - velocity, cfg.max_force)
}

/// Alignment lines an agent up with nearby flockmates.
///
/// The averaging loop reads the agent's own velocity for each qualifying
/// neighbour, so the net force cancels to zero whenever the agent is
/// moving. This reproduces the shipped behaviour; see DESIGN.md before
/// changing it.
pub fn alignment_force(
    world: &dyn MoveWorld,
    cfg: &MoveConfig,
    id: EntityId,
    flock: &Flock,
    velocity: Vec2,
) -> Vec2 {
    let pos = world.pos_xz(id);
    let mut sum = Vec2::ZERO;
    let mut neighbour_count = 0usize;

    for &other in &flock.members {
        if other == id {
            continue;
        }
        if pos.distance(world.pos_xz(other)) < cfg.align_neighbour_radius {
            if velocity.length() < EPSILON {
                continue;
            }
            sum = sum + velocity;
            neighbour_count += 1;
        }
    }

    if neighbour_count == 0 {
        return Vec2::ZERO;
    }

    let avg = sum * (1.0 / neighbour_count as f32);
    truncate(avg - velocity, cfg.max_force)
}

/// Cohesion steers toward a distance-weighted centre of mass of the flock.
pub fn cohesion_force(
    world: &dyn MoveWorld,
    cfg: &MoveConfig,
    id: EntityId,
    flock: &Flock,
) -> Vec2 {
    let pos = world.pos_xz(id);
    let mut com = Vec2::ZERO;
    let mut neighbour_count = 0usize;

    for &other in &flock.members {
        if other == id {
            continue;
        }
        let other_pos = world.pos_xz(other);
        let dist = pos.distance(other_pos);

        // Exponential falloff centred at 3/4 of the neighbour radius.
        let t = (dist - cfg.cohesion_neighbour_radius * 0.75) / cfg.cohesion_neighbour_radius;
        let scale = (-6.0 * t).exp();

        com = com + other_pos * scale;
        neighbour_count += 1;
    }

    if neighbour_count == 0 {
        return Vec2::ZERO;
    }

    let com = com * (1.0 / neighbour_count as f32);
    truncate(com - pos, cfg.max_force)
}

/// Separation pushes away from non-static agents that are too close.
pub fn separation_force(
    world: &dyn MoveWorld,
    cfg: &MoveConfig,
    id: EntityId,
    buffer_dist: f32,
    near: &mut Vec<EntityId>,
) -> Vec2 {
    let pos = world.pos_xz(id);
    world.entities_in_circle(pos, cfg.separation_neighb_radius, near);
    if near.is_empty() {
        return Vec2::ZERO;
    }

    let radius_self = world.selection_radius(id);
    let mut sum = Vec2::ZERO;

    for &other in near.iter() {
        if other == id {
            continue;
        }
        if world.flags(other).contains(EntityFlags::STATIC) {
            continue;
        }

        let diff = world.pos_xz(other) - pos;
        let dist = diff.length();
        if dist <= f32::EPSILON {
            continue;
        }

        // Exponential decay with y=1 when the gap hits 85% of the combined
        // radii; smooth curves curb oscillation near the boundary circle.
        let radius = radius_self + world.selection_radius(other) + buffer_dist;
        let t = (dist - radius * 0.85) / dist;
        let scale = (-20.0 * t).exp();

        sum = sum + diff * scale;
    }

    truncate(-sum, cfg.max_force)
}

/// Combined force for point-seek agents: arrive + cohesion + separation,
/// each at its tuned scale.
pub fn point_seek_total_force(
    world: &dyn MoveWorld,
    nav: &dyn NavQuery,
    cfg: &MoveConfig,
    id: EntityId,
    velocity: Vec2,
    vdes: Vec2,
    flock: &Flock,
    near: &mut Vec<EntityId>,
) -> Vec2 {
    let arrive = arrive_force(
        world,
        nav,
        cfg,
        id,
        velocity,
        vdes,
        Some(flock.dest_id),
        flock.target_xz,
    ) * cfg.arrive_force_scale;
    let cohesion = cohesion_force(world, cfg, id, flock) * cfg.cohesion_force_scale;
    let separation =
        separation_force(world, cfg, id, cfg.separation_buffer_dist, near)
            * cfg.separation_force_scale;

    truncate(arrive + separation + cohesion, cfg.max_force)
}

/// Combined force for enemy-seek agents: dest-less arrive + separation.
pub fn enemy_seek_total_force(
    world: &dyn MoveWorld,
    nav: &dyn NavQuery,
    cfg: &MoveConfig,
    id: EntityId,
    velocity: Vec2,
    vdes: Vec2,
    near: &mut Vec<EntityId>,
) -> Vec2 {
    let arrive =
        arrive_force(world, nav, cfg, id, velocity, vdes, None, Vec2::ZERO)
            * cfg.arrive_force_scale;
    let separation =
        separation_force(world, cfg, id, cfg.separation_buffer_dist, near)
            * cfg.separation_force_scale;

    truncate(arrive + separation, cfg.max_force)
}

/// Zero the force components that point into an impassable neighbour tile.
pub fn nullify_impass_components(
    world: &dyn MoveWorld,
    nav: &dyn NavQuery,
    id: EntityId,
    force: &mut Vec2,
) {
    let tile = nav.tile_dims();
    let pos = world.pos_xz(id);

    let pos_x = Vec2::new(pos.x + tile.x, pos.z);
    let neg_x = Vec2::new(pos.x - tile.x, pos.z);
    let pos_z = Vec2::new(pos.x, pos.z + tile.z);
    let neg_z = Vec2::new(pos.x, pos.z - tile.z);

    if (force.x > 0.0 && !nav.position_pathable(pos_x))
        || (force.x < 0.0 && !nav.position_pathable(neg_x))
    {
        force.x = 0.0;
    }
    if (force.z > 0.0 && !nav.position_pathable(pos_z))
        || (force.z < 0.0 && !nav.position_pathable(neg_z))
    {
        force.z = 0.0;
    }
}

fn integrate(cfg: &MoveConfig, max_speed: f32, velocity: Vec2, steer_force: Vec2) -> Vec2 {
    let accel = steer_force * (1.0 / cfg.entity_mass);
    truncate(velocity + accel, max_speed / cfg.tick_res)
}

/// Preferred velocity for a point-seek agent.
///
/// The force is chosen by a priority cascade: the full blend first, then
/// separation alone, then arrive alone, moving down whenever nullifying
/// impassable components leaves a degenerate force.
pub fn point_seek_vpref(
    world: &dyn MoveWorld,
    nav: &dyn NavQuery,
    cfg: &MoveConfig,
    id: EntityId,
    velocity: Vec2,
    vdes: Vec2,
    flock: &Flock,
    near: &mut Vec<EntityId>,
) -> Vec2 {
    let mut steer_force = Vec2::ZERO;
    for prio in 0..3 {
        steer_force = match prio {
            0 => point_seek_total_force(world, nav, cfg, id, velocity, vdes, flock, near),
            1 => separation_force(world, cfg, id, cfg.separation_buffer_dist, near),
            _ => arrive_force(
                world,
                nav,
                cfg,
                id,
                velocity,
                vdes,
                Some(flock.dest_id),
                flock.target_xz,
            ),
        };

        nullify_impass_components(world, nav, id, &mut steer_force);
        if steer_force.length() > cfg.max_force * 0.01 {
            break;
        }
    }

    integrate(cfg, world.max_speed(id), velocity, steer_force)
}

/// Preferred velocity for an enemy-seek agent.
pub fn enemy_seek_vpref(
    world: &dyn MoveWorld,
    nav: &dyn NavQuery,
    cfg: &MoveConfig,
    id: EntityId,
    velocity: Vec2,
    vdes: Vec2,
    near: &mut Vec<EntityId>,
) -> Vec2 {
    let steer_force = enemy_seek_total_force(world, nav, cfg, id, velocity, vdes, near);
    integrate(cfg, world.max_speed(id), velocity, steer_force)
}
