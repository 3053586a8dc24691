//! Tuned parameters for the steering simulation.

/// Length of the per-agent velocity history ring used for orientation
/// smoothing.
pub const VEL_HIST_LEN: usize = 14;

/// Parameters controlling steering and flocking behaviours.
///
/// The defaults are the tuned values the simulation ships with; the decay
/// curves in the force code assume radii of this order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveConfig {
    /// Force-to-acceleration divisor. All agents share the same mass.
    pub entity_mass: f32,
    /// Steering force truncation bound.
    pub max_force: f32,
    /// Divisor converting per-second speed into per-tick speed. The
    /// movement tick runs at this rate in Hz.
    pub tick_res: f32,
    /// Separation neighbour query radius.
    pub separation_neighb_radius: f32,
    /// Cohesion centre-of-mass weighting radius.
    pub cohesion_neighbour_radius: f32,
    /// Alignment neighbour radius.
    pub align_neighbour_radius: f32,
    /// Radius within which the arrive behaviour decelerates.
    pub arrive_slowing_radius: f32,
    /// Extra gap allowed by the flockmate adjacency test.
    pub adjacency_sep_dist: f32,
    /// Extra gap added to combined radii by the separation force.
    pub separation_buffer_dist: f32,
    /// Ticks an agent spends in the waiting state before retrying.
    pub wait_ticks: u32,
    /// Neighbour discovery radius for local-avoidance reconciliation.
    pub clearpath_neighbour_radius: f32,
    /// Separation force scale.
    pub separation_force_scale: f32,
    /// Arrive force scale.
    pub arrive_force_scale: f32,
    /// Cohesion force scale.
    pub cohesion_force_scale: f32,
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self {
            entity_mass: 1.0,
            max_force: 0.75,
            tick_res: 20.0,
            separation_neighb_radius: 30.0,
            cohesion_neighbour_radius: 50.0,
            align_neighbour_radius: 10.0,
            arrive_slowing_radius: 10.0,
            adjacency_sep_dist: 5.0,
            separation_buffer_dist: 0.0,
            wait_ticks: 60,
            clearpath_neighbour_radius: 30.0,
            separation_force_scale: 0.6,
            arrive_force_scale: 0.5,
            cohesion_force_scale: 0.15,
        }
    }
}
