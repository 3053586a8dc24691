//! Bevy adapter for the `tundra-move` crate.
//!
//! This crate provides a minimal integration layer that:
//! - keeps `tundra-move` engine-agnostic,
//! - drives the movement tick from a Bevy schedule,
//! - and converts move/stop orders and motion notifications to Bevy events.
//!
//! ## Scheduling
//!
//! The movement tick is designed for a fixed 20 Hz cadence, so
//! [`bevy_app::FixedUpdate`] is the natural home — configure your app's
//! fixed timestep accordingly. The fixed loop is driven by Bevy's time
//! plugins; if you're running a minimal `App` without time, pick
//! [`TickSchedule::Update`] and call `app.update()` at your own cadence.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

use bevy_app::{App, FixedUpdate, Plugin, Update};
use bevy_ecs::event::{Event, EventReader, EventWriter};
use bevy_ecs::prelude::{ResMut, Resource};
use bevy_ecs::schedule::IntoScheduleConfigs;

use tundra_move::{
    AgentRecord, BlendAvoidance, EntityId, GridNav, MotionEvent, MouseButton, MoveConfig,
    MoveRegistry, Vec2, WorldStore,
};

/// Everything the movement simulation needs, bundled as one resource.
///
/// Hosts with their own entity store or navigation stack should skip this
/// adapter and drive [`MoveRegistry`] directly.
#[derive(Resource)]
pub struct MoveHost {
    pub registry: MoveRegistry,
    pub world: WorldStore,
    pub nav: GridNav,
    pub avoid: BlendAvoidance,
}

impl Default for MoveHost {
    fn default() -> Self {
        Self::new(GridNav::new(64, 64, 8.0))
    }
}

impl MoveHost {
    pub fn new(nav: GridNav) -> Self {
        Self {
            registry: MoveRegistry::new(MoveConfig::default()),
            world: WorldStore::new(),
            nav,
            avoid: BlendAvoidance::default(),
        }
    }

    /// Add an agent to both the store and the registry.
    pub fn spawn_agent(&mut self, id: u32, record: AgentRecord) -> EntityId {
        let id = EntityId(id);
        self.world.insert(id, record);
        self.registry.add_entity(&self.world, &mut self.nav, id);
        id
    }

    /// Remove an agent from both.
    pub fn despawn_agent(&mut self, id: EntityId) {
        self.registry.remove_entity(&self.world, &mut self.nav, id);
        self.world.remove(id);
    }
}

/// Command a selection toward a destination point.
#[derive(Event, Debug, Clone)]
pub struct MoveOrder {
    pub selection: Vec<EntityId>,
    pub target: Vec2,
}

/// Halt a single agent.
#[derive(Event, Debug, Clone, Copy)]
pub struct StopOrder(pub EntityId);

/// A click at a world position, resolved against the pending click modes.
#[derive(Event, Debug, Clone)]
pub struct ClickAt {
    pub selection: Vec<EntityId>,
    pub button: MouseButton,
    pub point: Vec2,
}

/// Motion start/end notification re-emitted as a Bevy event.
#[derive(Event, Debug, Clone, Copy)]
pub struct AgentMotion(pub MotionEvent);

/// Which schedule runs the movement tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickSchedule {
    #[default]
    FixedUpdate,
    Update,
}

/// Plugin wiring orders in, the tick, and motion events out.
#[derive(Debug, Clone, Copy, Default)]
pub struct MovePlugin {
    pub schedule: TickSchedule,
}

impl Plugin for MovePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<MoveHost>();
        app.add_event::<MoveOrder>();
        app.add_event::<StopOrder>();
        app.add_event::<ClickAt>();
        app.add_event::<AgentMotion>();

        match self.schedule {
            TickSchedule::FixedUpdate => {
                app.add_systems(FixedUpdate, (apply_orders, movement_tick).chain());
            }
            TickSchedule::Update => {
                app.add_systems(Update, (apply_orders, movement_tick).chain());
            }
        }
    }
}

fn apply_orders(
    mut host: ResMut<MoveHost>,
    mut moves: EventReader<MoveOrder>,
    mut stops: EventReader<StopOrder>,
    mut clicks: EventReader<ClickAt>,
) {
    let MoveHost {
        registry,
        world,
        nav,
        ..
    } = &mut *host;

    for order in moves.read() {
        registry.make_flock_from_selection(world, nav, &order.selection, order.target);
    }
    for click in clicks.read() {
        registry.click_order(world, nav, &click.selection, click.button, click.point);
    }
    for stop in stops.read() {
        registry.stop(world, nav, stop.0);
    }
}

fn movement_tick(mut host: ResMut<MoveHost>, mut motion: EventWriter<AgentMotion>) {
    let MoveHost {
        registry,
        world,
        nav,
        avoid,
    } = &mut *host;

    registry.tick(world, nav, avoid);
    for event in registry.take_events() {
        motion.write(AgentMotion(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::event::Events;
    use tundra_move::{ArrivalState, MotionEventKind, Vec3};

    fn test_app() -> App {
        let mut app = App::new();
        app.add_plugins(MovePlugin {
            schedule: TickSchedule::Update,
        });
        app
    }

    fn spawn_at(app: &mut App, id: u32, x: f32, z: f32) -> EntityId {
        app.world_mut()
            .resource_mut::<MoveHost>()
            .spawn_agent(
                id,
                AgentRecord {
                    pos: Vec3::new(x, 0.0, z),
                    ..AgentRecord::default()
                },
            )
    }

    #[test]
    fn a_move_order_starts_and_finishes_with_motion_events() {
        let mut app = test_app();
        let agent = spawn_at(&mut app, 1, 10.0, 10.0);

        app.world_mut().send_event(MoveOrder {
            selection: vec![agent],
            target: Vec2::new(13.0, 10.0),
        });

        let mut kinds = Vec::new();
        for _ in 0..200 {
            app.update();
            let mut events = app.world_mut().resource_mut::<Events<AgentMotion>>();
            kinds.extend(events.drain().map(|AgentMotion(e)| e.kind));

            let host = app.world().resource::<MoveHost>();
            if host.registry.arrival_state(agent) == Some(ArrivalState::Arrived)
                && kinds.contains(&MotionEventKind::End)
            {
                break;
            }
        }

        assert_eq!(kinds.first(), Some(&MotionEventKind::Start));
        assert_eq!(kinds.last(), Some(&MotionEventKind::End));
    }

    #[test]
    fn stop_orders_halt_the_agent() {
        let mut app = test_app();
        let agent = spawn_at(&mut app, 1, 10.0, 10.0);

        app.world_mut().send_event(MoveOrder {
            selection: vec![agent],
            target: Vec2::new(200.0, 200.0),
        });
        app.update();
        {
            let host = app.world().resource::<MoveHost>();
            assert_eq!(
                host.registry.arrival_state(agent),
                Some(ArrivalState::Moving)
            );
        }

        app.world_mut().send_event(StopOrder(agent));
        app.update();
        let host = app.world().resource::<MoveHost>();
        assert_eq!(
            host.registry.arrival_state(agent),
            Some(ArrivalState::Arrived)
        );
        assert_eq!(host.registry.flock_count(), 0);
    }

    #[test]
    fn clicks_respect_the_pending_mode() {
        let mut app = test_app();
        let agent = spawn_at(&mut app, 1, 10.0, 10.0);

        app.world_mut()
            .resource_mut::<MoveHost>()
            .registry
            .set_move_on_left_click();
        app.world_mut().send_event(ClickAt {
            selection: vec![agent],
            button: MouseButton::Left,
            point: Vec2::new(100.0, 100.0),
        });
        app.update();

        let host = app.world().resource::<MoveHost>();
        assert_eq!(
            host.registry.arrival_state(agent),
            Some(ArrivalState::Moving)
        );
        assert_eq!(host.registry.get_dest(agent), Some(Vec2::new(100.0, 100.0)));
    }
}
