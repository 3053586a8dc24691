//! Local collision avoidance boundary.
//!
//! The real avoidance primitive (a ClearPath-style velocity-obstacle
//! solver) lives outside this crate; the tick only needs a function from
//! `(self, preferred velocity, neighbours)` to a safe velocity. Two
//! implementations ship here: a passthrough for hosts that do their own
//! avoidance, and a separation blend good enough for tests and demos.

use crate::math::{truncate, Vec2};
use crate::world::EntityId;

/// Neighbour descriptor handed to the avoidance solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpAgent {
    pub xz_pos: Vec2,
    pub xz_vel: Vec2,
    pub radius: f32,
}

/// Velocity reconciliation against nearby agents.
///
/// `dynamic` holds moving neighbours (they will dodge too), `statics`
/// holds still ones (they will not). Implementations return the velocity
/// closest to `vpref` that avoids imminent collision with the listed
/// neighbours.
pub trait LocalAvoidance {
    fn new_velocity(
        &self,
        agent: CpAgent,
        id: EntityId,
        vpref: Vec2,
        dynamic: &[CpAgent],
        statics: &[CpAgent],
    ) -> Vec2;
}

/// No-op solver: the preferred velocity is taken as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferredVelocity;

impl LocalAvoidance for PreferredVelocity {
    fn new_velocity(
        &self,
        _agent: CpAgent,
        _id: EntityId,
        vpref: Vec2,
        _dynamic: &[CpAgent],
        _statics: &[CpAgent],
    ) -> Vec2 {
        vpref
    }
}

/// Separation-blend solver: nudges the preferred velocity away from
/// neighbours with a linear falloff, boosted on overlap. Still neighbours
/// weigh double since they will not move out of the way.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendAvoidance {
    /// Radius inside which neighbours contribute.
    pub neighbor_radius: f32,
    /// Strength of the avoidance nudge.
    pub weight: f32,
}

impl Default for BlendAvoidance {
    fn default() -> Self {
        Self {
            neighbor_radius: 10.0,
            weight: 0.5,
        }
    }
}

impl BlendAvoidance {
    fn push_from(&self, agent: CpAgent, other: CpAgent, boost: f32) -> Vec2 {
        let delta = agent.xz_pos - other.xz_pos;
        let dist = delta.length();
        if dist <= f32::EPSILON || dist > self.neighbor_radius {
            return Vec2::ZERO;
        }

        let min_dist = (agent.radius + other.radius).max(1e-6);
        let mut weight = (self.neighbor_radius - dist) / self.neighbor_radius;
        if dist < min_dist {
            weight = 1.0 + (min_dist - dist) / min_dist;
        }
        delta * (weight * boost / dist)
    }
}

impl LocalAvoidance for BlendAvoidance {
    fn new_velocity(
        &self,
        agent: CpAgent,
        _id: EntityId,
        vpref: Vec2,
        dynamic: &[CpAgent],
        statics: &[CpAgent],
    ) -> Vec2 {
        let mut push = Vec2::ZERO;
        for &other in dynamic {
            push = push + self.push_from(agent, other, 1.0);
        }
        for &other in statics {
            push = push + self.push_from(agent, other, 2.0);
        }

        let speed_cap = vpref.length();
        truncate(vpref + push * self.weight, speed_cap.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_at(x: f32, z: f32) -> CpAgent {
        CpAgent {
            xz_pos: Vec2::new(x, z),
            xz_vel: Vec2::ZERO,
            radius: 1.0,
        }
    }

    #[test]
    fn passthrough_returns_vpref() {
        let v = PreferredVelocity.new_velocity(
            agent_at(0.0, 0.0),
            EntityId(1),
            Vec2::new(0.3, 0.0),
            &[agent_at(1.0, 0.0)],
            &[],
        );
        assert_eq!(v, Vec2::new(0.3, 0.0));
    }

    #[test]
    fn blend_steers_around_a_still_neighbour() {
        let solver = BlendAvoidance::default();
        let vpref = Vec2::new(0.3, 0.0);
        let v = solver.new_velocity(
            agent_at(0.0, 0.1),
            EntityId(1),
            vpref,
            &[],
            &[agent_at(1.5, 0.0)],
        );
        assert!(v.z > 0.0, "should be deflected off the obstacle's axis");
        assert!(v.length() <= vpref.length() + 1e-5);
    }

    #[test]
    fn blend_never_exceeds_preferred_speed() {
        let solver = BlendAvoidance::default();
        let vpref = Vec2::new(0.2, 0.2);
        let v = solver.new_velocity(
            agent_at(0.0, 0.0),
            EntityId(1),
            vpref,
            &[agent_at(0.5, 0.0), agent_at(0.0, 0.5)],
            &[agent_at(-0.5, 0.0)],
        );
        assert!(v.length() <= vpref.length() + 1e-5);
    }
}
