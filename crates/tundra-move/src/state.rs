//! Per-agent movement state.

use crate::config::VEL_HIST_LEN;
use crate::math::Vec2;

/// Where an agent is in its journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ArrivalState {
    /// Moving toward its flock's destination point.
    Moving,
    /// Considered to have arrived; no longer moving.
    Arrived,
    /// Approaching the nearest enemy entity.
    SeekEnemies,
    /// Navigation could not guide the agent closer to its goal; it stops
    /// and waits before retrying.
    Waiting,
}

/// Movement bookkeeping for one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveState {
    pub state: ArrivalState,
    /// Desired velocity last returned by the navigation system.
    pub vdes: Vec2,
    /// Velocity chosen for the next integration step (desired velocity
    /// constrained by flocking forces and local avoidance).
    pub vnew: Vec2,
    /// Velocity used in the last integration step.
    pub velocity: Vec2,
    /// Whether this agent currently holds a navigation blocker, and the
    /// circle it was registered with.
    pub blocking: bool,
    pub last_stop_pos: Vec2,
    pub last_stop_radius: f32,
    /// State to restore when a waiting period ends.
    pub wait_prev: ArrivalState,
    pub wait_ticks_left: u32,
    /// Ring of previous tick velocities, used for orientation smoothing.
    pub vel_hist: [Vec2; VEL_HIST_LEN],
    pub vel_hist_idx: usize,
}

impl MoveState {
    pub fn new() -> Self {
        Self {
            state: ArrivalState::Arrived,
            vdes: Vec2::ZERO,
            vnew: Vec2::ZERO,
            velocity: Vec2::ZERO,
            blocking: false,
            last_stop_pos: Vec2::ZERO,
            last_stop_radius: 0.0,
            wait_prev: ArrivalState::Arrived,
            wait_ticks_left: 0,
            vel_hist: [Vec2::ZERO; VEL_HIST_LEN],
            vel_hist_idx: 0,
        }
    }

    /// Still agents hold their position (and a blocker) instead of steering.
    pub fn still(&self) -> bool {
        matches!(self.state, ArrivalState::Arrived | ArrivalState::Waiting)
    }

    pub fn push_vel_hist(&mut self, vnew: Vec2) {
        debug_assert!(self.vel_hist_idx < VEL_HIST_LEN);
        self.vel_hist[self.vel_hist_idx] = vnew;
        self.vel_hist_idx = (self.vel_hist_idx + 1) % VEL_HIST_LEN;
    }

    /// Simple moving average of the velocity history.
    pub fn vel_sma(&self) -> Vec2 {
        let mut sum = Vec2::ZERO;
        for v in &self.vel_hist {
            sum = sum + *v;
        }
        sum * (1.0 / VEL_HIST_LEN as f32)
    }

    /// Weighted moving average of the velocity history. The most recent
    /// sample carries weight `VEL_HIST_LEN`, the oldest weight 1.
    pub fn vel_wma(&self) -> Vec2 {
        let mut sum = Vec2::ZERO;
        let mut denom = 0.0f32;
        for i in 0..VEL_HIST_LEN {
            let weight = (VEL_HIST_LEN - i) as f32;
            let slot = (self.vel_hist_idx + VEL_HIST_LEN - 1 - i) % VEL_HIST_LEN;
            sum = sum + self.vel_hist[slot] * weight;
            denom += weight;
        }
        sum * (1.0 / denom)
    }
}

impl Default for MoveState {
    fn default() -> Self {
        Self::new()
    }
}
