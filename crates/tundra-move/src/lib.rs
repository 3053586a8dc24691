//! Flock-based movement core for real-time strategy simulations.
//!
//! Agents are grouped into flocks that share a destination. Each 20 Hz tick
//! turns flow-field guidance into a preferred velocity through a
//! prioritised blend of steering forces, reconciles it against nearby
//! agents, then commits positions and runs the arrival state machine. The
//! crate is engine-agnostic: hosts supply the entity store ([`MoveWorld`]),
//! navigation queries ([`NavQuery`]), and the local-avoidance solver
//! ([`LocalAvoidance`]).

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod avoid;
pub mod config;
pub mod flock;
pub mod forces;
pub mod math;
pub mod nav;
pub mod registry;
pub mod snapshot;
pub mod state;
pub mod world;

pub use avoid::{BlendAvoidance, CpAgent, LocalAvoidance, PreferredVelocity};
pub use config::{MoveConfig, VEL_HIST_LEN};
pub use flock::Flock;
pub use math::{facing_from_velocity, truncate, Quat, Vec2, Vec3, EPSILON};
pub use nav::{DestId, GridNav, NavQuery};
pub use registry::{ClickOrder, MotionEvent, MotionEventKind, MouseButton, MoveRegistry};
pub use snapshot::{AgentSnapshot, FlockSnapshot, MoveSnapshot, SnapshotError};
pub use state::{ArrivalState, MoveState};
pub use world::{AgentRecord, EntityFlags, EntityId, MoveWorld, WorldStore};
